//! Custom mask adaptation
//!
//! An externally supplied mask image is scaled and positioned over the source
//! canvas, then thresholded by brightness: dark areas of the custom mask
//! become the design hole, bright areas keep the source opaque. Pixels of the
//! canvas the custom mask does not cover stay black and therefore also become
//! part of the hole.

use crate::{
    compositor::{apply_hole_selection, background_from},
    error::{MaskError, Result},
    types::{DesignFileSet, MaskAdjustment, BRIGHTNESS_THRESHOLD},
};
use image::{DynamicImage, RgbaImage};
use ndarray::{s, Array2, Array3, Axis};
use std::ops::Range;
use tracing::{debug, instrument, trace};

/// Where the resized custom mask lands on the source canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Top-left corner in canvas pixels; may be negative or beyond the canvas
    pub x: i64,
    pub y: i64,
    /// Size of the resized custom mask
    pub width: u32,
    pub height: u32,
}

impl Placement {
    /// Compute the placement of `mask_size` over `canvas_size`.
    ///
    /// The custom mask is scaled by `size_pct` and its center is put on the
    /// point (`x_pct`, `y_pct`) of the canvas. Coordinates are rounded to whole
    /// pixels; placement is not clamped to the canvas.
    pub fn compute(
        canvas_size: (u32, u32),
        mask_size: (u32, u32),
        adjustment: &MaskAdjustment,
    ) -> Result<Self> {
        let scale = f64::from(adjustment.scale());
        if !scale.is_finite() || scale <= 0.0 {
            return Err(MaskError::invalid_adjustment(format!(
                "scale must be positive, got {}",
                scale
            )));
        }

        let scaled_w = f64::from(mask_size.0) * scale;
        let scaled_h = f64::from(mask_size.1) * scale;
        let pos_x = f64::from(canvas_size.0) * f64::from(adjustment.x_pct) / 100.0 - scaled_w / 2.0;
        let pos_y = f64::from(canvas_size.1) * f64::from(adjustment.y_pct) / 100.0 - scaled_h / 2.0;

        let to_extent = |v: f64| -> Result<u32> {
            let rounded = v.round();
            if rounded > f64::from(u32::MAX) {
                return Err(MaskError::invalid_adjustment(format!(
                    "scaled mask extent {} is too large",
                    v
                )));
            }
            Ok((rounded as u32).max(1))
        };

        Ok(Self {
            x: pos_x.round() as i64,
            y: pos_y.round() as i64,
            width: to_extent(scaled_w)?,
            height: to_extent(scaled_h)?,
        })
    }

    /// Columns and rows of the resized mask that fall on the canvas
    fn visible(&self, canvas_size: (u32, u32)) -> Option<(Range<u32>, Range<u32>)> {
        let span = |pos: i64, len: u32, canvas: u32| -> Option<Range<u32>> {
            let start = (-pos).clamp(0, i64::from(len));
            let end = (i64::from(canvas) - pos).clamp(0, i64::from(len));
            (start < end).then(|| start as u32..end as u32)
        };
        Some((
            span(self.x, self.width, canvas_size.0)?,
            span(self.y, self.height, canvas_size.1)?,
        ))
    }
}

/// Build the design file pair for `source` using a custom mask.
///
/// `adjustment.opacity_pct` is ignored here; it only drives
/// [`render_preview`].
#[instrument(level = "debug", skip_all, fields(
    width = source.width(),
    height = source.height(),
    mask_width = custom_mask.width(),
    mask_height = custom_mask.height(),
))]
pub fn adapt_and_compose(
    source: &DynamicImage,
    custom_mask: &DynamicImage,
    adjustment: &MaskAdjustment,
) -> Result<DesignFileSet> {
    adjustment.validate()?;
    let canvas = (source.width(), source.height());
    let placement = Placement::compute(canvas, (custom_mask.width(), custom_mask.height()), adjustment)?;
    debug!(?placement, "Placing custom mask");

    let intermediate = render_intermediate(&custom_mask.to_rgba8(), placement, canvas);
    let hole = dark_pixels(&intermediate);

    let background = background_from(source);
    let mut mask = background.clone();
    apply_hole_selection(&mut mask, &hole);

    trace!(
        hole_pixels = hole.iter().filter(|&&h| h).count(),
        "Applied custom mask"
    );
    Ok(DesignFileSet { background, mask })
}

/// Alpha-blend the placed custom mask over the source at `opacity_pct`.
///
/// This is the operator's on-screen preview. The persisted mask is always
/// the hard binary cut from [`adapt_and_compose`], whatever the opacity.
pub fn render_preview(
    source: &DynamicImage,
    custom_mask: &DynamicImage,
    adjustment: &MaskAdjustment,
) -> Result<RgbaImage> {
    adjustment.validate()?;
    let canvas = (source.width(), source.height());
    let placement = Placement::compute(canvas, (custom_mask.width(), custom_mask.height()), adjustment)?;
    let mut preview = source.to_rgba8();

    let Some((cols, rows)) = placement.visible(canvas) else {
        return Ok(preview);
    };
    let overlay = resample_area_average(&custom_mask.to_rgba8(), placement, cols.clone(), rows.clone());
    let opacity = adjustment.opacity_pct / 100.0;

    for (j, row) in rows.clone().enumerate() {
        for (i, col) in cols.clone().enumerate() {
            let cx = (placement.x + i64::from(col)) as u32;
            let cy = (placement.y + i64::from(row)) as u32;
            let coverage = overlay[[j, i, 3]] / 255.0 * opacity;
            let pixel = preview.get_pixel_mut(cx, cy);
            for c in 0..3 {
                let blended =
                    f32::from(pixel.0[c]) * (1.0 - coverage) + overlay[[j, i, c]] * opacity;
                pixel.0[c] = blended.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    Ok(preview)
}

/// Opaque black canvas with the custom mask drawn over it, as `(height, width, rgb)`
fn render_intermediate(custom_mask: &RgbaImage, placement: Placement, canvas: (u32, u32)) -> Array3<u8> {
    let mut intermediate = Array3::<u8>::zeros((canvas.1 as usize, canvas.0 as usize, 3));

    let Some((cols, rows)) = placement.visible(canvas) else {
        debug!("Custom mask does not overlap the canvas");
        return intermediate;
    };
    let resampled = resample_area_average(custom_mask, placement, cols.clone(), rows.clone());

    // Source-over onto opaque black leaves the premultiplied colour
    let x0 = (placement.x + i64::from(cols.start)) as usize;
    let y0 = (placement.y + i64::from(rows.start)) as usize;
    let mut window = intermediate.slice_mut(s![
        y0..y0 + rows.len(),
        x0..x0 + cols.len(),
        ..
    ]);
    window.assign(
        &resampled
            .slice(s![.., .., 0..3])
            .mapv(|v| v.round().clamp(0.0, 255.0) as u8),
    );
    intermediate
}

/// Pixels whose mean of R, G and B is below the brightness threshold
fn dark_pixels(intermediate: &Array3<u8>) -> Array2<bool> {
    intermediate.map_axis(Axis(2), |rgb| {
        let sum: u16 = rgb.iter().map(|&c| u16::from(c)).sum();
        sum / 3 < BRIGHTNESS_THRESHOLD
    })
}

/// Area-averaging resample of `src` to the placement size.
///
/// Only the `cols` × `rows` window of the resized image is produced, and only
/// the source rows under that window are read. Each output pixel is the
/// coverage-weighted mean of the source pixels under it. Output is
/// premultiplied RGBA as `(rows, cols, 4)` floats in `0..=255`.
fn resample_area_average(
    src: &RgbaImage,
    placement: Placement,
    cols: Range<u32>,
    rows: Range<u32>,
) -> Array3<f32> {
    let (src_w, src_h) = src.dimensions();
    let col_weights = axis_weights(src_w, placement.width, cols);
    let row_weights = axis_weights(src_h, placement.height, rows);

    let first_row = row_weights.iter().flatten().map(|&(sy, _)| sy).min().unwrap_or(0);
    let end_row = row_weights
        .iter()
        .flatten()
        .map(|&(sy, _)| sy + 1)
        .max()
        .unwrap_or(first_row);

    // Horizontal pass over the source rows the window reads
    let mut horizontal = Array3::<f32>::zeros((end_row - first_row, col_weights.len(), 4));
    for (offset, sy) in (first_row..end_row).enumerate() {
        for (i, weights) in col_weights.iter().enumerate() {
            let mut acc = [0.0f32; 4];
            for &(sx, w) in weights {
                let pixel = src.get_pixel(sx as u32, sy as u32).0;
                let alpha = f32::from(pixel[3]);
                for (c, value) in acc.iter_mut().take(3).enumerate() {
                    *value += w * (f32::from(pixel[c]) * alpha / 255.0);
                }
                acc[3] += w * alpha;
            }
            for (c, value) in acc.into_iter().enumerate() {
                horizontal[[offset, i, c]] = value;
            }
        }
    }

    // Vertical pass produces the visible window only
    let mut output = Array3::<f32>::zeros((row_weights.len(), col_weights.len(), 4));
    for (j, weights) in row_weights.iter().enumerate() {
        for &(sy, w) in weights {
            let source_row = horizontal.slice(s![sy - first_row, .., ..]);
            let mut target = output.slice_mut(s![j, .., ..]);
            target.scaled_add(w, &source_row);
        }
    }
    output
}

/// Source indices and normalised weights feeding each destination index in `range`
fn axis_weights(src_len: u32, dst_len: u32, range: Range<u32>) -> Vec<Vec<(usize, f32)>> {
    let ratio = f64::from(src_len) / f64::from(dst_len);
    range
        .map(|d| {
            let start = f64::from(d) * ratio;
            let end = (f64::from(d) + 1.0) * ratio;
            let first = start.floor() as u32;
            let last = (end.ceil() as u32).min(src_len);
            (first..last)
                .filter_map(|s| {
                    let overlap = end.min(f64::from(s) + 1.0) - start.max(f64::from(s));
                    (overlap > 0.0).then(|| (s as usize, (overlap / ratio) as f32))
                })
                .collect()
        })
        .collect()
}
