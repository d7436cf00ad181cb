//! PNG encoding service
//!
//! Every persisted design file is PNG; this is the single place that turns
//! an RGBA buffer into bytes.

use crate::{
    config::PngCompression,
    error::{MaskError, Result},
};
use image::{
    codecs::png::{CompressionType, FilterType, PngEncoder},
    ExtendedColorType, ImageEncoder, RgbaImage,
};

/// Encode an RGBA image as PNG bytes
///
/// # Errors
/// - The encoder rejects the buffer
///
/// # Examples
/// ```rust
/// use design_mask::{services::png::encode_png, PngCompression};
/// use image::RgbaImage;
///
/// let bytes = encode_png(&RgbaImage::new(4, 4), PngCompression::Fast)?;
/// assert_eq!(&bytes[1..4], b"PNG");
/// # Ok::<(), design_mask::MaskError>(())
/// ```
pub fn encode_png(image: &RgbaImage, compression: PngCompression) -> Result<Vec<u8>> {
    let (compression_type, filter) = match compression {
        PngCompression::Default => (CompressionType::Default, FilterType::Adaptive),
        PngCompression::Fast => (CompressionType::Fast, FilterType::NoFilter),
        PngCompression::Best => (CompressionType::Best, FilterType::Adaptive),
    };

    let mut bytes = Vec::new();
    PngEncoder::new_with_quality(&mut bytes, compression_type, filter)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|e| {
            MaskError::encoding(format!(
                "Failed to encode {}x{} PNG: {}",
                image.width(),
                image.height(),
                e
            ))
        })?;

    log::trace!(
        "Encoded {}x{} PNG ({} compression, {} bytes)",
        image.width(),
        image.height(),
        compression,
        bytes.len()
    );
    Ok(bytes)
}
