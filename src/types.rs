//! Core value types shared by the compositing pipeline

use crate::error::{MaskError, Result};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Alpha value written into the design hole.
///
/// Downstream tooling treats anything below [`TRANSPARENCY_THRESHOLD`] as
/// transparent, and the bounding-box scan relies on the same threshold.
pub const TRANSPARENT_ALPHA: u8 = 127;

/// Pixels with alpha strictly below this value count as transparent.
pub const TRANSPARENCY_THRESHOLD: u8 = 128;

/// Brightness below which a custom-mask pixel becomes part of the hole.
pub const BRIGHTNESS_THRESHOLD: u16 = 128;

/// Axis-aligned rectangle in source-image pixel space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rectangle {
    #[must_use]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge
    #[must_use]
    pub fn right(&self) -> i64 {
        i64::from(self.x) + i64::from(self.width)
    }

    /// Exclusive bottom edge
    #[must_use]
    pub fn bottom(&self) -> i64 {
        i64::from(self.y) + i64::from(self.height)
    }

    #[must_use]
    pub fn area(&self) -> u64 {
        if self.width <= 0 || self.height <= 0 {
            return 0;
        }
        self.width as u64 * self.height as u64
    }

    /// Whether the pixel at `(px, py)` lies inside `[x, x+width) × [y, y+height)`
    #[must_use]
    pub fn contains(&self, px: u32, py: u32) -> bool {
        let (px, py) = (i64::from(px), i64::from(py));
        px >= i64::from(self.x) && px < self.right() && py >= i64::from(self.y) && py < self.bottom()
    }
}

impl fmt::Display for Rectangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}+{}+{}",
            self.width, self.height, self.x, self.y
        )
    }
}

impl FromStr for Rectangle {
    type Err = MaskError;

    /// Parse `x,y,width,height`
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let [x, y, w, h] = parts.as_slice() else {
            return Err(MaskError::invalid_geometry(format!(
                "expected x,y,width,height but got '{}'",
                s
            )));
        };
        let parse = |name: &str, v: &str| {
            v.parse::<i32>().map_err(|e| {
                MaskError::invalid_geometry(format!("invalid {} '{}': {}", name, v, e))
            })
        };
        Ok(Self::new(
            parse("x", *x)?,
            parse("y", *y)?,
            parse("width", *w)?,
            parse("height", *h)?,
        ))
    }
}

/// Placement of a custom mask over the source canvas.
///
/// All values are percentages. `size_pct` scales the custom mask, `x_pct` and
/// `y_pct` position its center on the canvas, and `opacity_pct` only affects
/// the on-screen preview.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskAdjustment {
    pub size_pct: f32,
    pub x_pct: f32,
    pub y_pct: f32,
    pub opacity_pct: f32,
}

impl Default for MaskAdjustment {
    fn default() -> Self {
        Self {
            size_pct: 100.0,
            x_pct: 50.0,
            y_pct: 50.0,
            opacity_pct: 70.0,
        }
    }
}

impl MaskAdjustment {
    /// Scale factor applied to the custom mask
    #[must_use]
    pub fn scale(&self) -> f32 {
        self.size_pct / 100.0
    }

    /// Check that every field is finite and inside its range
    pub fn validate(&self) -> Result<()> {
        if !self.size_pct.is_finite() || self.scale() <= 0.0 {
            return Err(MaskError::invalid_adjustment(format!(
                "size must be a positive percentage, got {}",
                self.size_pct
            )));
        }
        for (name, value) in [
            ("x", self.x_pct),
            ("y", self.y_pct),
            ("opacity", self.opacity_pct),
        ] {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(MaskError::invalid_adjustment(format!(
                    "{} must be between 0 and 100, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// Parse loosely typed request parameters.
    ///
    /// Recognised keys are `size`, `x`, `y` and `opacity`; values may be JSON
    /// numbers or numeric strings. Missing or null keys fall back to the
    /// defaults and the result is validated before it is returned.
    pub fn from_params(params: &Map<String, Value>) -> Result<Self> {
        let defaults = Self::default();
        let adjustment = Self {
            size_pct: param_or(params, "size", defaults.size_pct)?,
            x_pct: param_or(params, "x", defaults.x_pct)?,
            y_pct: param_or(params, "y", defaults.y_pct)?,
            opacity_pct: param_or(params, "opacity", defaults.opacity_pct)?,
        };
        adjustment.validate()?;
        Ok(adjustment)
    }
}

fn param_or(params: &Map<String, Value>, key: &str, default: f32) -> Result<f32> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => n.as_f64().map(|v| v as f32).ok_or_else(|| {
            MaskError::invalid_adjustment(format!("{} is not representable: {}", key, n))
        }),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(default),
        Some(Value::String(s)) => s.trim().parse::<f32>().map_err(|_| {
            MaskError::invalid_adjustment(format!("{} must be numeric, got '{}'", key, s))
        }),
        Some(other) => Err(MaskError::invalid_adjustment(format!(
            "{} must be numeric, got {}",
            key, other
        ))),
    }
}

/// Background and mask derived from one source image
#[derive(Debug, Clone, PartialEq)]
pub struct DesignFileSet {
    /// Opaque copy of the source
    pub background: RgbaImage,
    /// Copy of the source with the design area at [`TRANSPARENT_ALPHA`]
    pub mask: RgbaImage,
}

impl DesignFileSet {
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.background.dimensions()
    }
}

/// Opaque reference to an image held by an [`crate::services::ImageStore`].
///
/// Depending on the store this is a storage key, a filesystem path or an
/// `http(s)` URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new<S: Into<String>>(reference: S) -> Self {
        Self(reference.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.0.starts_with("http://") || self.0.starts_with("https://")
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ImageRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Persisted background/mask pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignFileRefs {
    pub background_ref: ImageRef,
    pub mask_ref: ImageRef,
}

/// A design pair the operator copied for pasting onto sibling variants.
///
/// Callers hold this value and pass it into
/// [`crate::service::DesignMaskService::paste_design`]. When `rect` is known
/// the mask is not re-scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopiedDesign {
    pub background_ref: ImageRef,
    pub mask_ref: ImageRef,
    pub rect: Option<Rectangle>,
}

impl CopiedDesign {
    #[must_use]
    pub fn new(refs: DesignFileRefs, rect: Option<Rectangle>) -> Self {
        Self {
            background_ref: refs.background_ref,
            mask_ref: refs.mask_ref,
            rect,
        }
    }
}
