//! Rectangle clamping and alpha-channel bounding boxes

use crate::{
    error::{MaskError, Result},
    types::{Rectangle, TRANSPARENCY_THRESHOLD},
};
use image::{DynamicImage, RgbaImage};
use std::borrow::Cow;
use tracing::trace;

/// Clamp `rect` to an `image_width` × `image_height` canvas.
///
/// The origin is moved onto the canvas first and the size is then cut at the
/// right and bottom edges. A rectangle left without area is rejected with
/// [`MaskError::InvalidGeometry`].
pub fn clamp_rectangle(rect: Rectangle, image_width: u32, image_height: u32) -> Result<Rectangle> {
    let x = i64::from(rect.x.max(0));
    let y = i64::from(rect.y.max(0));
    let width = i64::from(rect.width).min(i64::from(image_width) - x);
    let height = i64::from(rect.height).min(i64::from(image_height) - y);

    if width <= 0 || height <= 0 {
        return Err(MaskError::degenerate_rectangle(&rect, image_width, image_height));
    }

    // x, y < canvas size and width, height <= canvas size, so all fit in i32
    let clamped = Rectangle::new(x as i32, y as i32, width as i32, height as i32);
    trace!(requested = %rect, clamped = %clamped, "Clamped rectangle");
    Ok(clamped)
}

/// Smallest rectangle enclosing every pixel with alpha below 128.
///
/// Returns `None` when the image has no transparent pixel (including images
/// without an alpha channel, which are fully opaque). Runs in one pass over
/// the pixel buffer.
#[must_use]
pub fn extract_alpha_bounding_box(mask_image: &DynamicImage) -> Option<Rectangle> {
    if !mask_image.color().has_alpha() {
        return None;
    }

    let rgba: Cow<'_, RgbaImage> = match mask_image {
        DynamicImage::ImageRgba8(buffer) => Cow::Borrowed(buffer),
        other => Cow::Owned(other.to_rgba8()),
    };

    alpha_bounding_box(&rgba)
}

/// [`extract_alpha_bounding_box`] over an RGBA buffer
#[must_use]
pub fn alpha_bounding_box(image: &RgbaImage) -> Option<Rectangle> {
    let width = image.width() as usize;
    if width == 0 {
        return None;
    }

    let mut bounds: Option<(usize, usize, usize, usize)> = None;

    for (row_index, row) in image.as_raw().chunks_exact(width * 4).enumerate() {
        let mut alphas = row.chunks_exact(4).map(|px| px[3]);
        let Some(first) = alphas.position(|a| a < TRANSPARENCY_THRESHOLD) else {
            continue;
        };
        // Continue the same iterator so each pixel is visited once
        let last = alphas
            .enumerate()
            .filter(|&(_, a)| a < TRANSPARENCY_THRESHOLD)
            .last()
            .map_or(first, |(offset, _)| first + 1 + offset);

        bounds = Some(match bounds {
            None => (first, row_index, last, row_index),
            Some((min_x, min_y, max_x, _)) => {
                (min_x.min(first), min_y, max_x.max(last), row_index)
            },
        });
    }

    bounds.map(|(min_x, min_y, max_x, max_y)| {
        Rectangle::new(
            min_x as i32,
            min_y as i32,
            (max_x - min_x + 1) as i32,
            (max_y - min_y + 1) as i32,
        )
    })
}
