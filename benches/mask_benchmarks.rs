use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use design_mask::{
    adapt_and_compose, alpha_bounding_box, compose, encode_png, MaskAdjustment,
    PngCompression, Rectangle, ReplicationPlanner,
};
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use tokio_util::sync::CancellationToken;

fn photo(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 251) as u8, (y % 241) as u8, ((x ^ y) % 256) as u8])
    }))
}

fn benchmark_bounding_box(c: &mut Criterion) {
    let mut group = c.benchmark_group("alpha_bounding_box");

    for (width, height) in [(800, 600), (2000, 2000), (4000, 3000)] {
        let files = compose(&photo(width, height), Rectangle::new(100, 100, 400, 300))
            .expect("compose benchmark input");
        let opaque = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));

        group.bench_with_input(
            BenchmarkId::new("with_hole", format!("{width}x{height}")),
            &files.mask,
            |b, mask| b.iter(|| alpha_bounding_box(black_box(mask))),
        );
        group.bench_with_input(
            BenchmarkId::new("all_opaque", format!("{width}x{height}")),
            &opaque,
            |b, mask| b.iter(|| alpha_bounding_box(black_box(mask))),
        );
    }

    group.finish();
}

fn benchmark_compose(c: &mut Criterion) {
    let source = photo(4000, 3000);
    c.bench_function("compose_12mp", |b| {
        b.iter(|| compose(black_box(&source), Rectangle::new(1000, 800, 1500, 1200)))
    });
}

fn benchmark_custom_mask(c: &mut Criterion) {
    let source = photo(2000, 2000);
    let custom = DynamicImage::ImageRgba8(RgbaImage::from_fn(640, 480, |x, y| {
        let dark = (200..440).contains(&x) && (120..360).contains(&y);
        if dark {
            Rgba([0, 0, 0, 255])
        } else {
            Rgba([255, 255, 255, 255])
        }
    }));

    let mut group = c.benchmark_group("adapt_and_compose");
    for size_pct in [50.0, 100.0, 250.0] {
        let adjustment = MaskAdjustment {
            size_pct,
            ..MaskAdjustment::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(size_pct), &adjustment, |b, adj| {
            b.iter(|| adapt_and_compose(black_box(&source), &custom, adj))
        });
    }
    group.finish();
}

fn benchmark_replication(c: &mut Criterion) {
    let targets: Vec<_> = (0..16).map(|_| photo(1500, 1500)).collect();
    let planner = ReplicationPlanner::default();
    let cancel = CancellationToken::new();

    c.bench_function("replicate_16_targets", |b| {
        b.iter(|| planner.clone_with_rectangle(Rectangle::new(300, 300, 600, 600), &targets, &cancel))
    });
}

fn benchmark_png_encoding(c: &mut Criterion) {
    let files = compose(&photo(2000, 2000), Rectangle::new(500, 500, 800, 800))
        .expect("compose benchmark input");

    let mut group = c.benchmark_group("encode_png");
    group.sample_size(10);
    for compression in [PngCompression::Fast, PngCompression::Default, PngCompression::Best] {
        group.bench_with_input(
            BenchmarkId::from_parameter(compression),
            &compression,
            |b, &level| b.iter(|| encode_png(black_box(&files.mask), level)),
        );
    }
    group.finish();
}

criterion_group!(
    mask_benches,
    benchmark_bounding_box,
    benchmark_compose,
    benchmark_custom_mask,
    benchmark_replication,
    benchmark_png_encoding
);
criterion_main!(mask_benches);
