//! Rectangle-to-mask compositing
//!
//! Produces the background/mask pair for a source photo by punching a
//! semi-transparent hole (alpha [`TRANSPARENT_ALPHA`]) into a copy of it.
//! The alpha-application helpers here are shared with the custom mask
//! adapter so both paths write the hole the same way.

use crate::{
    error::Result,
    geometry::clamp_rectangle,
    types::{DesignFileSet, Rectangle, TRANSPARENT_ALPHA},
};
use image::{DynamicImage, RgbaImage};
use ndarray::Array2;
use tracing::{debug, instrument};

/// Build the design file pair for `source` with a hole at `rect`.
///
/// `rect` is clamped to the source bounds first; a rectangle with no area on
/// the canvas fails with [`crate::MaskError::InvalidGeometry`]. The function is
/// pure: the same inputs always give byte-identical output.
#[instrument(level = "debug", skip_all, fields(width = source.width(), height = source.height(), rect = %rect))]
pub fn compose(source: &DynamicImage, rect: Rectangle) -> Result<DesignFileSet> {
    let rect = clamp_rectangle(rect, source.width(), source.height())?;

    let background = background_from(source);
    let mut mask = background.clone();
    apply_rect_hole(&mut mask, rect);

    debug!(hole = %rect, hole_pixels = rect.area(), "Composed design files");
    Ok(DesignFileSet { background, mask })
}

/// Opaque RGBA copy of the source.
///
/// Sources without an alpha channel come out with alpha 255 everywhere;
/// sources with alpha keep their values.
#[must_use]
pub fn background_from(source: &DynamicImage) -> RgbaImage {
    source.to_rgba8()
}

/// Set alpha to the hole sentinel for every pixel inside an already clamped `rect`
pub(crate) fn apply_rect_hole(mask: &mut RgbaImage, rect: Rectangle) {
    let (x, y) = (rect.x.max(0) as usize, rect.y.max(0) as usize);
    let (w, h) = (rect.width.max(0) as usize, rect.height.max(0) as usize);

    for row in mask.rows_mut().skip(y).take(h) {
        for pixel in row.skip(x).take(w) {
            pixel.0[3] = TRANSPARENT_ALPHA;
        }
    }
}

/// Set alpha to the hole sentinel wherever `hole` is true.
///
/// `hole` has shape `(height, width)` matching `mask`.
pub(crate) fn apply_hole_selection(mask: &mut RgbaImage, hole: &Array2<bool>) {
    debug_assert_eq!(
        hole.dim(),
        (mask.height() as usize, mask.width() as usize),
        "hole selection must match the mask dimensions"
    );

    for (pixel, &is_hole) in mask.pixels_mut().zip(hole.iter()) {
        if is_hole {
            pixel.0[3] = TRANSPARENT_ALPHA;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::MaskError, geometry::extract_alpha_bounding_box};
    use image::{Rgb, RgbImage, Rgba};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        }))
    }

    #[test]
    fn test_compose_scenario_800x600() {
        let source = gradient(800, 600);
        let files = compose(&source, Rectangle::new(100, 100, 200, 150)).unwrap();

        assert_eq!(files.dimensions(), (800, 600));
        for (x, y, pixel) in files.mask.enumerate_pixels() {
            let inside = (100..=299).contains(&x) && (100..=249).contains(&y);
            let expected = if inside { 127 } else { 255 };
            assert_eq!(pixel[3], expected, "alpha at ({x}, {y})");
        }
        assert!(files.background.pixels().all(|p| p[3] == 255));
    }

    #[test]
    fn test_compose_preserves_colour() {
        let source = gradient(40, 30);
        let files = compose(&source, Rectangle::new(5, 5, 10, 10)).unwrap();
        let rgb = source.to_rgb8();

        for (x, y, pixel) in files.mask.enumerate_pixels() {
            let original = rgb.get_pixel(x, y);
            assert_eq!(&pixel.0[..3], &original.0[..]);
        }
    }

    #[test]
    fn test_compose_keeps_source_alpha_outside_hole() {
        let mut rgba = RgbaImage::from_pixel(10, 10, Rgba([1, 2, 3, 200]));
        rgba.put_pixel(9, 9, Rgba([1, 2, 3, 40]));
        let files = compose(&DynamicImage::ImageRgba8(rgba), Rectangle::new(0, 0, 2, 2)).unwrap();

        assert_eq!(files.mask.get_pixel(0, 0)[3], TRANSPARENT_ALPHA);
        assert_eq!(files.mask.get_pixel(5, 5)[3], 200);
        assert_eq!(files.mask.get_pixel(9, 9)[3], 40);
    }

    #[test]
    fn test_compose_is_deterministic() {
        let source = gradient(64, 48);
        let rect = Rectangle::new(3, 7, 20, 11);
        assert_eq!(compose(&source, rect).unwrap(), compose(&source, rect).unwrap());
    }

    #[test]
    fn test_compose_then_extract_round_trip() {
        let source = gradient(120, 90);
        for rect in [
            Rectangle::new(0, 0, 1, 1),
            Rectangle::new(10, 20, 30, 40),
            Rectangle::new(100, 80, 500, 500),
            Rectangle::new(-20, -20, 50, 10),
        ] {
            let clamped = clamp_rectangle(rect, 120, 90).unwrap();
            let files = compose(&source, rect).unwrap();
            let found = extract_alpha_bounding_box(&DynamicImage::ImageRgba8(files.mask));
            assert_eq!(found, Some(clamped));
        }
    }

    #[test]
    fn test_compose_rejects_degenerate_rect() {
        let err = compose(&gradient(10, 10), Rectangle::new(10, 0, 5, 5)).unwrap_err();
        assert!(matches!(err, MaskError::InvalidGeometry(_)));
    }

    #[test]
    fn test_apply_hole_selection() {
        let mut mask = RgbaImage::from_pixel(3, 2, Rgba([0, 0, 0, 255]));
        let hole = Array2::from_shape_fn((2, 3), |(row, col)| row == 1 && col != 1);
        apply_hole_selection(&mut mask, &hole);

        assert_eq!(mask.get_pixel(0, 1)[3], TRANSPARENT_ALPHA);
        assert_eq!(mask.get_pixel(2, 1)[3], TRANSPARENT_ALPHA);
        assert_eq!(mask.get_pixel(1, 1)[3], 255);
        assert_eq!(mask.get_pixel(0, 0)[3], 255);
    }
}
