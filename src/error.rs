//! Error types for mask and background derivation

use thiserror::Error;

/// Result type alias for masking operations
pub type Result<T> = std::result::Result<T, MaskError>;

/// Error types for design-area masking operations
#[derive(Error, Debug)]
pub enum MaskError {
    /// Rectangle is degenerate after clamping to the image bounds
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Image could not be fetched or decoded
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// Custom mask adjustment parameters are out of range
    #[error("Invalid adjustment: {0}")]
    InvalidAdjustment(String),

    /// The seed mask has no transparent region to clone
    #[error("No design area found: {0}")]
    NoDesignAreaFound(String),

    /// Operation was cancelled before this item was processed
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image codec errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// PNG encoding errors
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MaskError {
    /// Create a new invalid geometry error
    pub fn invalid_geometry<S: Into<String>>(msg: S) -> Self {
        Self::InvalidGeometry(msg.into())
    }

    /// Create a new source unavailable error
    pub fn source_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::SourceUnavailable(msg.into())
    }

    /// Create a new invalid adjustment error
    pub fn invalid_adjustment<S: Into<String>>(msg: S) -> Self {
        Self::InvalidAdjustment(msg.into())
    }

    /// Create a new "no design area" error
    pub fn no_design_area<S: Into<String>>(msg: S) -> Self {
        Self::NoDesignAreaFound(msg.into())
    }

    /// Create a new cancellation error
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new encoding error
    pub fn encoding<S: Into<String>>(msg: S) -> Self {
        Self::Encoding(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a geometry error describing the rectangle and the canvas it missed
    pub fn degenerate_rectangle(rect: &crate::types::Rectangle, width: u32, height: u32) -> Self {
        Self::InvalidGeometry(format!(
            "rectangle {}x{} at ({}, {}) has no area inside {}x{} image",
            rect.width, rect.height, rect.x, rect.y, width, height
        ))
    }

    /// Create a source error with the reference that failed and the underlying cause
    pub fn source_error_with_context(reference: &str, operation: &str, cause: &str) -> Self {
        Self::SourceUnavailable(format!(
            "Failed to {} '{}': {}",
            operation, reference, cause
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Short machine-friendly name of the error kind
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidGeometry(_) => "invalid_geometry",
            Self::SourceUnavailable(_) => "source_unavailable",
            Self::InvalidAdjustment(_) => "invalid_adjustment",
            Self::NoDesignAreaFound(_) => "no_design_area_found",
            Self::Cancelled(_) => "cancelled",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Io(_) => "io",
            Self::Image(_) => "image",
            Self::Encoding(_) => "encoding",
            Self::Internal(_) => "internal",
        }
    }
}
