//! Configuration types for design-mask operations

use crate::error::MaskError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound for the replication worker pool
pub const MAX_WORKER_THREADS: usize = 256;

/// Default timeout for fetching remote images
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// PNG compression level for persisted design files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PngCompression {
    /// Balanced speed and size
    #[default]
    Default,
    /// Fastest encoding, larger files
    Fast,
    /// Smallest files, slowest encoding
    Best,
}

impl std::fmt::Display for PngCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Fast => write!(f, "fast"),
            Self::Best => write!(f, "best"),
        }
    }
}

impl std::str::FromStr for PngCompression {
    type Err = MaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "fast" => Ok(Self::Fast),
            "best" => Ok(Self::Best),
            other => Err(MaskError::invalid_config(format!(
                "Unknown PNG compression '{}'. Expected one of: default, fast, best",
                other
            ))),
        }
    }
}

/// Configuration for design-mask operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskingConfig {
    /// Number of replication worker threads (0 = auto)
    pub worker_threads: usize,

    /// Timeout for fetching http(s) image references
    pub fetch_timeout: Duration,

    /// Compression level for persisted PNG files
    pub png_compression: PngCompression,

    /// Root directory of the filesystem image store (None = default location)
    pub store_dir: Option<PathBuf>,
}

impl Default for MaskingConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            png_compression: PngCompression::default(),
            store_dir: None,
        }
    }
}

impl MaskingConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use design_mask::{MaskingConfig, PngCompression};
    /// use std::time::Duration;
    ///
    /// let config = MaskingConfig::builder()
    ///     .worker_threads(4)
    ///     .fetch_timeout(Duration::from_secs(10))
    ///     .png_compression(PngCompression::Fast)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.worker_threads, 4);
    /// ```
    #[must_use]
    pub fn builder() -> MaskingConfigBuilder {
        MaskingConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Validation Rules
    ///
    /// - Worker threads: 0-256 (0 = auto-detect)
    /// - Fetch timeout: greater than zero
    ///
    /// # Errors
    /// - Worker thread count above 256
    /// - Zero fetch timeout
    pub fn validate(&self) -> crate::Result<()> {
        if self.worker_threads > MAX_WORKER_THREADS {
            return Err(MaskError::config_value_error(
                "worker threads",
                self.worker_threads,
                "0-256",
                Some(0),
            ));
        }

        if self.fetch_timeout.is_zero() {
            return Err(MaskError::config_value_error(
                "fetch timeout (seconds)",
                self.fetch_timeout.as_secs(),
                "> 0",
                Some(DEFAULT_FETCH_TIMEOUT.as_secs()),
            ));
        }

        Ok(())
    }
}

/// Builder for `MaskingConfig`
#[derive(Debug, Default)]
pub struct MaskingConfigBuilder {
    config: MaskingConfig,
}

impl MaskingConfigBuilder {
    /// Set the replication worker count (0 = auto)
    #[must_use]
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.config.worker_threads = threads;
        self
    }

    /// Set the remote fetch timeout
    #[must_use]
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetch_timeout = timeout;
        self
    }

    /// Set the PNG compression level
    #[must_use]
    pub fn png_compression(mut self, compression: PngCompression) -> Self {
        self.config.png_compression = compression;
        self
    }

    /// Set the filesystem store root
    #[must_use]
    pub fn store_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.store_dir = Some(dir.into());
        self
    }

    /// Build the configuration, validating all parameters
    ///
    /// # Errors
    /// - Any rule of [`MaskingConfig::validate`] is violated
    pub fn build(self) -> crate::Result<MaskingConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}
