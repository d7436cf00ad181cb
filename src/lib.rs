#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Design Mask
//!
//! Derives the two design files a print-on-demand storefront needs for every
//! product photo: an opaque **background** and a **mask** whose design area
//! is semi-transparent (alpha 127).
//!
//! The design area comes from one of three places:
//!
//! - **A rectangle** drawn by the operator ([`compose`])
//! - **A custom mask image** scaled, positioned and brightness-thresholded
//!   over the photo ([`adapt_and_compose`])
//! - **An existing mask**, whose hole is recovered and cloned onto sibling
//!   variant photos ([`clone_design_area`])
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use design_mask::{
//!     DesignMaskService, FileSystemImageStore, ImageRef, MaskingConfig, Rectangle,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = MaskingConfig::builder().worker_threads(4).build()?;
//! let store = FileSystemImageStore::from_config(&config)?;
//! let service = DesignMaskService::new(store, config)?;
//!
//! let refs = service
//!     .create_masked_image(&ImageRef::from("shirt-front.jpg"), Rectangle::new(100, 100, 200, 150))
//!     .await?;
//!
//! // Clone the same design area onto the other colour variants
//! let targets = [ImageRef::from("shirt-red.jpg"), ImageRef::from("shirt-blue.jpg")];
//! for target in service.replicate(&refs.mask_ref, &targets).await? {
//!     println!("{}: {:?}", target.target_ref, target.result.map(|r| r.mask_ref));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The algorithms are also usable directly on decoded images:
//!
//! ```rust
//! use design_mask::{compose, extract_alpha_bounding_box, Rectangle};
//! use image::{DynamicImage, RgbImage};
//!
//! let photo = DynamicImage::ImageRgb8(RgbImage::new(800, 600));
//! let files = compose(&photo, Rectangle::new(100, 100, 200, 150))?;
//! let found = extract_alpha_bounding_box(&DynamicImage::ImageRgba8(files.mask));
//! assert_eq!(found, Some(Rectangle::new(100, 100, 200, 150)));
//! # Ok::<(), design_mask::MaskError>(())
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): `design-mask` binary, progress bars and subscriber setup
//! - `tracing-json`: JSON log output for the CLI
//!
//! ### Library-Only Usage
//!
//! ```toml
//! [dependencies]
//! design-mask = { version = "0.1", default-features = false }
//! ```

#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod custom_mask;
pub mod error;
pub mod geometry;
pub mod replication;
pub mod service;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;

// Public API exports
pub use compositor::{background_from, compose};
pub use config::{MaskingConfig, MaskingConfigBuilder, PngCompression};
pub use custom_mask::{adapt_and_compose, render_preview, Placement};
pub use error::{MaskError, Result};
pub use geometry::{alpha_bounding_box, clamp_rectangle, extract_alpha_bounding_box};
pub use replication::{clone_design_area, ReplicationPlanner, ReplicationProgress, ReplicationReport};
pub use service::{load_design_files, DesignMaskService, ReplicatedTarget};
pub use services::{
    encode_png, BatchSummary, ConsoleProgressReporter, FileSystemImageStore, ImageStore,
    MemoryImageStore, NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressUpdate,
};
pub use types::{
    CopiedDesign, DesignFileRefs, DesignFileSet, ImageRef, MaskAdjustment, Rectangle,
    BRIGHTNESS_THRESHOLD, TRANSPARENCY_THRESHOLD, TRANSPARENT_ALPHA,
};

#[cfg(feature = "cli")]
pub use tracing_config::{events, init_cli_tracing, spans, TracingConfig, TracingFormat};

/// Create design files from encoded image bytes
///
/// Stream-friendly entry point for callers that hold an upload in memory
/// rather than a store reference.
///
/// # Examples
///
/// ```rust,no_run
/// use design_mask::{design_files_from_bytes, encode_png, PngCompression, Rectangle};
///
/// # async fn example(upload_bytes: Vec<u8>) -> anyhow::Result<()> {
/// let files = design_files_from_bytes(upload_bytes, Rectangle::new(10, 10, 50, 50)).await?;
/// let mask_png = encode_png(&files.mask, PngCompression::Default)?;
/// # Ok(())
/// # }
/// ```
pub async fn design_files_from_bytes(image_bytes: Vec<u8>, rect: Rectangle) -> Result<DesignFileSet> {
    tokio::task::spawn_blocking(move || {
        let source = image::load_from_memory(&image_bytes).map_err(|e| {
            MaskError::source_error_with_context("<bytes>", "decode image", &e.to_string())
        })?;
        compose(&source, rect)
    })
    .await
    .map_err(|e| MaskError::internal(format!("Blocking task failed: {}", e)))?
}
