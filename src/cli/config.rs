//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliCompression};
use crate::config::{MaskingConfig, PngCompression, MAX_WORKER_THREADS};
use anyhow::{Context, Result};
use std::time::Duration;

/// Convert CLI arguments to `MaskingConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build `MaskingConfig` from CLI arguments
    pub(crate) fn from_cli(cli: &Cli) -> Result<MaskingConfig> {
        let compression = match cli.compression {
            CliCompression::Default => PngCompression::Default,
            CliCompression::Fast => PngCompression::Fast,
            CliCompression::Best => PngCompression::Best,
        };

        let mut builder = MaskingConfig::builder()
            .worker_threads(cli.threads)
            .fetch_timeout(Duration::from_secs(cli.timeout))
            .png_compression(compression);
        if let Some(dir) = &cli.store_dir {
            builder = builder.store_dir(dir.clone());
        }

        builder.build().context("Invalid configuration")
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if cli.threads > MAX_WORKER_THREADS {
            anyhow::bail!(
                "--threads must be at most {} (got {})",
                MAX_WORKER_THREADS,
                cli.threads
            );
        }

        if cli.timeout == 0 {
            anyhow::bail!("--timeout must be at least 1 second");
        }

        if let Some(dir) = &cli.store_dir {
            if dir.is_file() {
                anyhow::bail!(
                    "Store path exists and is a file, not a directory: {}",
                    dir.display()
                );
            }
        }

        Ok(())
    }
}
