//! End-to-end workflows through `DesignMaskService`
//!
//! Covers the four external operations against both the in-memory and the
//! filesystem image store.

use design_mask::{
    load_design_files, CopiedDesign, DesignFileRefs, DesignMaskService, FileSystemImageStore, ImageRef,
    ImageStore, MaskAdjustment, MaskError, MaskingConfig, MemoryImageStore, Rectangle, Result,
    TRANSPARENT_ALPHA,
};
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn photo(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 200) as u8, (y % 200) as u8, 90])
    }))
}

fn memory_service() -> DesignMaskService<MemoryImageStore> {
    DesignMaskService::new(MemoryImageStore::new(), MaskingConfig::default()).unwrap()
}

#[tokio::test]
async fn test_create_masked_image_800x600() -> Result<()> {
    let service = memory_service();
    let source = service.store().insert_image("shirt.jpg", &photo(800, 600))?;

    let refs = service
        .create_masked_image(&source, Rectangle::new(100, 100, 200, 150))
        .await?;
    assert_ne!(refs.background_ref, refs.mask_ref);

    let files = load_design_files(service.store(), &refs).await?;
    assert_eq!(files.dimensions(), (800, 600));
    assert!(files.background.pixels().all(|p| p[3] == 255));
    for (x, y, pixel) in files.mask.enumerate_pixels() {
        let inside = (100..300).contains(&x) && (100..250).contains(&y);
        assert_eq!(pixel[3], if inside { TRANSPARENT_ALPHA } else { 255 });
    }

    let rect = service.extract_rectangle_from_mask(&refs.mask_ref).await?;
    assert_eq!(rect, Some(Rectangle::new(100, 100, 200, 150)));
    Ok(())
}

#[tokio::test]
async fn test_create_masked_image_is_deterministic() -> Result<()> {
    let service = memory_service();
    let source = service.store().insert_image("mug.png", &photo(64, 64))?;

    let first = service
        .create_masked_image(&source, Rectangle::new(8, 8, 16, 16))
        .await?;
    let second = service
        .create_masked_image(&source, Rectangle::new(8, 8, 16, 16))
        .await?;

    // Content-addressed store: identical output maps to identical keys
    assert_eq!(first, second);
    Ok(())
}

#[tokio::test]
async fn test_create_masked_image_degenerate_rect() {
    let service = memory_service();
    let source = service
        .store()
        .insert_image("tiny.png", &photo(1, 1))
        .unwrap();

    let err = service
        .create_masked_image(&source, Rectangle::new(50, 50, 50, 50))
        .await
        .unwrap_err();
    assert!(matches!(err, MaskError::InvalidGeometry(_)));
}

#[tokio::test]
async fn test_missing_source_is_unavailable() {
    let service = memory_service();
    let err = service
        .create_masked_image(&ImageRef::from("nowhere.png"), Rectangle::new(0, 0, 1, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, MaskError::SourceUnavailable(_)));
}

#[tokio::test]
async fn test_custom_mask_workflow() -> Result<()> {
    let service = memory_service();
    let source = service.store().insert_image("tote.jpg", &photo(100, 100))?;

    // White 50x50 mask with a black 10x10 square in the middle
    let mut custom = RgbaImage::from_pixel(50, 50, Rgba([255, 255, 255, 255]));
    for y in 20..30 {
        for x in 20..30 {
            custom.put_pixel(x, y, Rgba([0, 0, 0, 255]));
        }
    }
    let custom_ref = service
        .store()
        .insert_image("logo-mask.png", &DynamicImage::ImageRgba8(custom))?;

    let adjustment = MaskAdjustment {
        size_pct: 200.0,
        ..MaskAdjustment::default()
    };
    let refs = service
        .create_masked_image_with_custom_mask(&source, &custom_ref, Some(adjustment))
        .await?;

    let rect = service.extract_rectangle_from_mask(&refs.mask_ref).await?;
    assert_eq!(rect, Some(Rectangle::new(40, 40, 20, 20)));
    Ok(())
}

#[tokio::test]
async fn test_custom_mask_default_adjustment() -> Result<()> {
    let service = memory_service();
    let source = service.store().insert_image("cap.jpg", &photo(30, 30))?;
    let black = DynamicImage::ImageRgb8(RgbImage::new(30, 30));
    let custom_ref = service.store().insert_image("black.png", &black)?;

    let refs = service
        .create_masked_image_with_custom_mask(&source, &custom_ref, None)
        .await?;
    let files = load_design_files(service.store(), &refs).await?;
    assert!(files.mask.pixels().all(|p| p[3] == TRANSPARENT_ALPHA));
    Ok(())
}

#[tokio::test]
async fn test_custom_mask_rejects_bad_adjustment() {
    let service = memory_service();
    let adjustment = MaskAdjustment {
        size_pct: 0.0,
        ..MaskAdjustment::default()
    };
    // Validation happens before any load, so the refs need not exist
    let err = service
        .create_masked_image_with_custom_mask(
            &ImageRef::from("a.png"),
            &ImageRef::from("b.png"),
            Some(adjustment),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MaskError::InvalidAdjustment(_)));
}

#[tokio::test]
async fn test_partial_replication() -> Result<()> {
    let service = memory_service();
    let seed = service.store().insert_image("front.jpg", &photo(200, 200))?;
    let refs = service
        .create_masked_image(&seed, Rectangle::new(50, 50, 50, 50))
        .await?;

    let targets = vec![
        service.store().insert_image("red.jpg", &photo(200, 200))?,
        service.store().insert_image("tiny.jpg", &photo(1, 1))?,
        service.store().insert_image("blue.jpg", &photo(120, 300))?,
    ];

    let outcomes = service.replicate(&refs.mask_ref, &targets).await?;
    assert_eq!(outcomes.len(), 3);
    for (outcome, target) in outcomes.iter().zip(&targets) {
        assert_eq!(&outcome.target_ref, target);
    }
    assert!(outcomes[0].result.is_ok());
    assert!(matches!(outcomes[1].result, Err(MaskError::InvalidGeometry(_))));
    assert!(outcomes[2].result.is_ok());

    let blue = outcomes[2].result.as_ref().unwrap();
    let rect = service.extract_rectangle_from_mask(&blue.mask_ref).await?;
    assert_eq!(rect, Some(Rectangle::new(50, 50, 50, 50)));
    Ok(())
}

#[tokio::test]
async fn test_replication_isolates_unloadable_targets() -> Result<()> {
    let service = memory_service();
    let seed = service.store().insert_image("front.jpg", &photo(40, 40))?;
    let refs = service
        .create_masked_image(&seed, Rectangle::new(5, 5, 10, 10))
        .await?;

    let good = service.store().insert_image("good.jpg", &photo(40, 40))?;
    let outcomes = service
        .replicate(&refs.mask_ref, &[ImageRef::from("missing.jpg"), good])
        .await?;

    assert!(matches!(outcomes[0].result, Err(MaskError::SourceUnavailable(_))));
    assert!(outcomes[1].result.is_ok());
    Ok(())
}

#[tokio::test]
async fn test_replicate_without_design_area() -> Result<()> {
    let service = memory_service();
    let opaque = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255])));
    let mask = service.store().insert_image("opaque.png", &opaque)?;
    let target = service.store().insert_image("t.png", &photo(10, 10))?;

    assert_eq!(service.extract_rectangle_from_mask(&mask).await?, None);
    let err = service.replicate(&mask, &[target]).await.unwrap_err();
    assert!(matches!(err, MaskError::NoDesignAreaFound(_)));
    Ok(())
}

#[tokio::test]
async fn test_paste_design_uses_copied_rect() -> Result<()> {
    let service = memory_service();
    let seed = service.store().insert_image("front.jpg", &photo(60, 60))?;
    let refs = service
        .create_masked_image(&seed, Rectangle::new(10, 10, 20, 20))
        .await?;
    let target = service.store().insert_image("back.jpg", &photo(60, 60))?;

    // The cached rect wins over the mask contents
    let copied = CopiedDesign::new(refs.clone(), Some(Rectangle::new(0, 0, 5, 5)));
    let outcomes = service.paste_design(&copied, std::slice::from_ref(&target)).await?;
    let pasted = outcomes[0].result.as_ref().unwrap();
    assert_eq!(
        service.extract_rectangle_from_mask(&pasted.mask_ref).await?,
        Some(Rectangle::new(0, 0, 5, 5))
    );

    // Without a cached rect the mask is scanned
    let copied = CopiedDesign::new(refs, None);
    let outcomes = service.paste_design(&copied, &[target]).await?;
    let pasted = outcomes[0].result.as_ref().unwrap();
    assert_eq!(
        service.extract_rectangle_from_mask(&pasted.mask_ref).await?,
        Some(Rectangle::new(10, 10, 20, 20))
    );
    Ok(())
}

#[tokio::test]
async fn test_cancellation_is_scoped_to_one_call() -> Result<()> {
    let service = memory_service();
    let target = service.store().insert_image("t.png", &photo(10, 10))?;
    let copied = CopiedDesign {
        background_ref: target.clone(),
        mask_ref: target.clone(),
        rect: Some(Rectangle::new(0, 0, 5, 5)),
    };

    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcomes = service
        .paste_design_with_cancellation(&copied, std::slice::from_ref(&target), &cancel)
        .await?;
    assert!(matches!(outcomes[0].result, Err(MaskError::Cancelled(_))));

    // A later call on the same service is unaffected
    let outcomes = service.paste_design(&copied, std::slice::from_ref(&target)).await?;
    assert!(outcomes[0].result.is_ok());
    Ok(())
}

#[tokio::test]
async fn test_replication_streams_more_targets_than_workers() -> Result<()> {
    let config = MaskingConfig::builder().worker_threads(2).build()?;
    let service = DesignMaskService::new(MemoryImageStore::new(), config)?;
    let seed = service.store().insert_image("front.jpg", &photo(30, 30))?;
    let refs = service
        .create_masked_image(&seed, Rectangle::new(5, 5, 10, 10))
        .await?;

    let mut targets = Vec::new();
    for i in 0..7u32 {
        let side = if i == 3 { 2 } else { 20 + i };
        targets.push(service.store().insert_image(format!("v{i}.jpg"), &photo(side, side))?);
    }
    targets.insert(5, ImageRef::from("gone.jpg"));

    let outcomes = service.replicate(&refs.mask_ref, &targets).await?;
    assert_eq!(outcomes.len(), 8);
    for (index, (outcome, target)) in outcomes.iter().zip(&targets).enumerate() {
        assert_eq!(&outcome.target_ref, target);
        match index {
            3 => assert!(matches!(outcome.result, Err(MaskError::InvalidGeometry(_)))),
            5 => assert!(matches!(outcome.result, Err(MaskError::SourceUnavailable(_)))),
            _ => assert!(outcome.result.is_ok(), "target {index}: {:?}", outcome.result),
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_filesystem_store_workflow() -> Result<()> {
    let temp = TempDir::new()?;
    let input_path = temp.path().join("hoodie.png");
    photo(50, 40).save(&input_path)?;

    let store_dir = temp.path().join("store");
    let config = MaskingConfig::builder()
        .store_dir(&store_dir)
        .fetch_timeout(Duration::from_secs(5))
        .worker_threads(2)
        .build()?;
    let store = FileSystemImageStore::from_config(&config)?;
    let service = DesignMaskService::new(store, config)?;

    let source = ImageRef::new(input_path.to_string_lossy().into_owned());
    let refs = service
        .create_masked_image(&source, Rectangle::new(10, 10, 100, 100))
        .await?;

    assert!(refs.mask_ref.as_str().starts_with("hoodie-mask-"));
    assert!(refs.background_ref.as_str().starts_with("hoodie-background-"));
    assert!(store_dir.join(refs.mask_ref.as_str()).is_file());
    assert!(service
        .store()
        .url_for(&refs.mask_ref)
        .is_some_and(|url| url.starts_with("file://")));

    // Store keys resolve under the root
    let rect = service.extract_rectangle_from_mask(&refs.mask_ref).await?;
    assert_eq!(rect, Some(Rectangle::new(10, 10, 40, 30)));

    let saved = std::fs::read_dir(&store_dir)?.count();
    assert_eq!(saved, 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_replicating_onto_repeated_target_into_filesystem_store() -> Result<()> {
    let temp = TempDir::new()?;
    let input_path = temp.path().join("polo.png");
    photo(60, 60).save(&input_path)?;

    let config = MaskingConfig::builder()
        .store_dir(temp.path().join("store"))
        .worker_threads(3)
        .build()?;
    let store = FileSystemImageStore::from_config(&config)?;
    let service = DesignMaskService::new(store, config)?;

    // Identical targets produce identical content keys written concurrently
    let target = ImageRef::new(input_path.to_string_lossy().into_owned());
    let targets = vec![target; 6];
    let copied = CopiedDesign::new(
        DesignFileRefs {
            background_ref: targets[0].clone(),
            mask_ref: targets[0].clone(),
        },
        Some(Rectangle::new(10, 10, 20, 20)),
    );

    for _ in 0..5 {
        let outcomes = service.paste_design(&copied, &targets).await?;
        for outcome in &outcomes {
            assert!(outcome.result.is_ok(), "{:?}", outcome.result);
        }
        let first = outcomes[0].result.as_ref().unwrap();
        assert!(outcomes
            .iter()
            .all(|o| o.result.as_ref().is_ok_and(|refs| refs == first)));
    }
    assert_eq!(std::fs::read_dir(temp.path().join("store"))?.count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_filesystem_store_dedupes_identical_bytes() -> Result<()> {
    let temp = TempDir::new()?;
    let store = FileSystemImageStore::new(temp.path(), Duration::from_secs(5))?;

    let a = store.save_png(b"\x89PNG fake".to_vec(), "x").await?;
    let b = store.save_png(b"\x89PNG fake".to_vec(), "x").await?;
    assert_eq!(a, b);
    assert_eq!(std::fs::read_dir(temp.path())?.count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_filesystem_store_missing_path() {
    let temp = TempDir::new().unwrap();
    let store = FileSystemImageStore::new(temp.path(), Duration::from_secs(5)).unwrap();
    let err = store
        .load(&ImageRef::from("/definitely/not/here.png"))
        .await
        .unwrap_err();
    assert!(matches!(err, MaskError::SourceUnavailable(_)));
    assert!(store.url_for(&ImageRef::from("/definitely/not/here.png")).is_none());
}
