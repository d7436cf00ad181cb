//! Design mask service
//!
//! The async entry points used by admin frontends and the CLI. Each call
//! loads its inputs from an [`ImageStore`], runs the CPU-bound masking work
//! on the blocking pool, encodes PNG output and persists it back to the
//! store.

use crate::{
    compositor::compose,
    config::MaskingConfig,
    custom_mask::adapt_and_compose,
    error::{MaskError, Result},
    geometry::extract_alpha_bounding_box,
    replication::{ReplicationPlanner, ReplicationProgress},
    services::{
        png::encode_png,
        progress::{ProcessingStage, ProgressReporter},
        store::ImageStore,
    },
    types::{CopiedDesign, DesignFileRefs, DesignFileSet, ImageRef, MaskAdjustment, Rectangle},
};
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use instant::Instant;
use std::{path::Path, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Outcome of replicating onto one target
#[derive(Debug)]
pub struct ReplicatedTarget {
    pub target_ref: ImageRef,
    pub result: Result<DesignFileRefs>,
}

/// Encoded background and mask, ready to persist
struct EncodedPair {
    background: Vec<u8>,
    mask: Vec<u8>,
}

/// Async façade over the masking algorithms and an image store
pub struct DesignMaskService<S: ImageStore> {
    store: Arc<S>,
    config: MaskingConfig,
    planner: ReplicationPlanner,
}

impl<S: ImageStore> DesignMaskService<S> {
    /// Create a service over `store`
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Failed to build the replication worker pool
    pub fn new(store: S, config: MaskingConfig) -> Result<Self> {
        config.validate()?;
        let planner = ReplicationPlanner::new(config.worker_threads)?;

        Ok(Self {
            store: Arc::new(store),
            config,
            planner,
        })
    }

    /// Report replication progress to `reporter`
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.planner = self.planner.with_reporter(reporter);
        self
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &MaskingConfig {
        &self.config
    }

    /// Create the background/mask pair for `image_ref` with a hole at `rect`
    ///
    /// # Errors
    /// - [`MaskError::SourceUnavailable`] when the image cannot be loaded
    /// - [`MaskError::InvalidGeometry`] when `rect` misses the image
    #[instrument(skip_all, fields(image = %image_ref, rect = %rect))]
    pub async fn create_masked_image(
        &self,
        image_ref: &ImageRef,
        rect: Rectangle,
    ) -> Result<DesignFileRefs> {
        let start = Instant::now();
        let source = self.store.load(image_ref).await?;

        let compression = self.config.png_compression;
        let encoded = run_blocking(move || {
            let files = compose(&source, rect)?;
            encode_pair(&files, compression)
        })
        .await?;

        let refs = self.persist(encoded, image_ref).await?;
        info!(
            mask = %refs.mask_ref,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Created masked image"
        );
        Ok(refs)
    }

    /// Create the background/mask pair from an operator-supplied mask image
    ///
    /// `adjustment` defaults to centred at 100% size when `None`.
    ///
    /// # Errors
    /// - [`MaskError::InvalidAdjustment`] for out-of-range adjustment values
    /// - [`MaskError::SourceUnavailable`] when either image cannot be loaded
    #[instrument(skip_all, fields(image = %image_ref, custom_mask = %custom_mask_ref))]
    pub async fn create_masked_image_with_custom_mask(
        &self,
        image_ref: &ImageRef,
        custom_mask_ref: &ImageRef,
        adjustment: Option<MaskAdjustment>,
    ) -> Result<DesignFileRefs> {
        let adjustment = adjustment.unwrap_or_default();
        adjustment.validate()?;
        debug!(?adjustment, "Applying custom mask");

        let (source, custom_mask) = tokio::try_join!(
            self.store.load(image_ref),
            self.store.load(custom_mask_ref)
        )?;

        let compression = self.config.png_compression;
        let encoded = run_blocking(move || {
            let files = adapt_and_compose(&source, &custom_mask, &adjustment)?;
            encode_pair(&files, compression)
        })
        .await?;

        self.persist(encoded, image_ref).await
    }

    /// Recover the design rectangle from a persisted mask
    ///
    /// Returns `Ok(None)` when the mask has no transparent pixel.
    #[instrument(skip_all, fields(mask = %mask_ref))]
    pub async fn extract_rectangle_from_mask(&self, mask_ref: &ImageRef) -> Result<Option<Rectangle>> {
        let mask = self.store.load(mask_ref).await?;
        let rect = run_blocking(move || Ok(extract_alpha_bounding_box(&mask))).await?;
        debug!(rect = ?rect, "Scanned mask for design area");
        Ok(rect)
    }

    /// Clone the design area of `mask_ref` onto every target
    ///
    /// Per-target failures are reported in the returned list, in target
    /// order.
    ///
    /// # Errors
    /// - [`MaskError::NoDesignAreaFound`] when the seed mask has no hole
    /// - [`MaskError::SourceUnavailable`] when the seed mask cannot be loaded
    pub async fn replicate(
        &self,
        mask_ref: &ImageRef,
        target_refs: &[ImageRef],
    ) -> Result<Vec<ReplicatedTarget>> {
        self.replicate_with_cancellation(mask_ref, target_refs, &CancellationToken::new())
            .await
    }

    /// [`Self::replicate`], stopping at `cancel`
    ///
    /// Targets not started when `cancel` fires report [`MaskError::Cancelled`].
    /// The token belongs to this call only.
    #[instrument(skip_all, fields(mask = %mask_ref, targets = target_refs.len()))]
    pub async fn replicate_with_cancellation(
        &self,
        mask_ref: &ImageRef,
        target_refs: &[ImageRef],
        cancel: &CancellationToken,
    ) -> Result<Vec<ReplicatedTarget>> {
        let rect = self
            .extract_rectangle_from_mask(mask_ref)
            .await?
            .ok_or_else(|| {
                MaskError::no_design_area(format!("mask '{}' has no transparent pixels", mask_ref))
            })?;
        self.replicate_rectangle(rect, target_refs, cancel).await
    }

    /// Replicate a previously copied design onto every target
    ///
    /// Uses the copied rectangle when present and scans the copied mask
    /// otherwise.
    ///
    /// # Errors
    /// Same as [`Self::replicate`].
    pub async fn paste_design(
        &self,
        copied: &CopiedDesign,
        target_refs: &[ImageRef],
    ) -> Result<Vec<ReplicatedTarget>> {
        self.paste_design_with_cancellation(copied, target_refs, &CancellationToken::new())
            .await
    }

    /// [`Self::paste_design`], stopping at `cancel`
    #[instrument(skip_all, fields(mask = %copied.mask_ref, targets = target_refs.len()))]
    pub async fn paste_design_with_cancellation(
        &self,
        copied: &CopiedDesign,
        target_refs: &[ImageRef],
        cancel: &CancellationToken,
    ) -> Result<Vec<ReplicatedTarget>> {
        match copied.rect {
            Some(rect) => self.replicate_rectangle(rect, target_refs, cancel).await,
            None => {
                self.replicate_with_cancellation(&copied.mask_ref, target_refs, cancel)
                    .await
            },
        }
    }

    /// Stream targets through load, compose, encode and save in batches of
    /// the planner's worker count, so at most one batch of decoded images is
    /// held at a time.
    async fn replicate_rectangle(
        &self,
        rect: Rectangle,
        target_refs: &[ImageRef],
        cancel: &CancellationToken,
    ) -> Result<Vec<ReplicatedTarget>> {
        let batch_size = self.planner.batch_size();
        let progress = self.planner.progress(target_refs.len());
        debug!(rect = %rect, batch_size, "Replicating design area");

        let mut targets = Vec::with_capacity(target_refs.len());
        for (batch_index, batch) in target_refs.chunks(batch_size).enumerate() {
            let offset = batch_index * batch_size;
            let results = self
                .replicate_batch(rect, batch, offset, cancel, &progress)
                .await?;
            targets.extend(
                batch
                    .iter()
                    .zip(results)
                    .map(|(target_ref, result)| ReplicatedTarget {
                        target_ref: target_ref.clone(),
                        result,
                    }),
            );
        }

        progress.finish();
        Ok(targets)
    }

    async fn replicate_batch(
        &self,
        rect: Rectangle,
        batch: &[ImageRef],
        offset: usize,
        cancel: &CancellationToken,
        progress: &ReplicationProgress,
    ) -> Result<Vec<Result<DesignFileRefs>>> {
        let concurrency = batch.len().max(1);
        let loaded: Vec<Result<DynamicImage>> = stream::iter(batch)
            .map(|target_ref| async move {
                if cancel.is_cancelled() {
                    return Err(MaskError::cancelled(format!("target '{}' skipped", target_ref)));
                }
                self.store.load(target_ref).await
            })
            .buffered(concurrency)
            .collect()
            .await;

        let mut results: Vec<Option<Result<DesignFileRefs>>> = Vec::with_capacity(batch.len());
        let mut images = Vec::new();
        let mut positions = Vec::new();
        for (position, outcome) in loaded.into_iter().enumerate() {
            match outcome {
                Ok(image) => {
                    images.push(image);
                    positions.push(position);
                    results.push(None);
                },
                Err(e) => {
                    let outcome: Result<DesignFileRefs> = Err(e);
                    progress.record(ProcessingStage::ImageLoading, offset + position, &outcome);
                    results.push(Some(outcome));
                },
            }
        }

        let planner = self.planner.clone();
        let batch_cancel = cancel.clone();
        let compression = self.config.png_compression;
        let encoded = run_blocking(move || {
            Ok(planner.clone_each(rect, &images, &batch_cancel, None, |_, files| {
                encode_pair(&files, compression)
            }))
        })
        .await?;

        let saved: Vec<(usize, Result<DesignFileRefs>)> = stream::iter(encoded.into_iter().zip(positions))
            .map(|(outcome, position)| async move {
                let target_ref = &batch[position];
                let (stage, result) = match outcome {
                    Ok(pair) => (ProcessingStage::Saving, self.persist(pair, target_ref).await),
                    Err(e) => (ProcessingStage::Compositing, Err(e)),
                };
                progress.record(stage, offset + position, &result);
                (position, result)
            })
            .buffered(concurrency)
            .collect()
            .await;

        for (position, result) in saved {
            if let Some(slot) = results.get_mut(position) {
                *slot = Some(result);
            }
        }

        Ok(batch
            .iter()
            .zip(results)
            .map(|(target_ref, result)| {
                result.unwrap_or_else(|| {
                    Err(MaskError::internal(format!("no outcome recorded for '{}'", target_ref)))
                })
            })
            .collect())
    }

    async fn persist(&self, encoded: EncodedPair, source_ref: &ImageRef) -> Result<DesignFileRefs> {
        let stem = file_stem(source_ref);
        let background_ref = self
            .store
            .save_png(encoded.background, &format!("{stem}-background"))
            .await?;
        let mask_ref = self.store.save_png(encoded.mask, &format!("{stem}-mask")).await?;
        Ok(DesignFileRefs {
            background_ref,
            mask_ref,
        })
    }
}

fn encode_pair(files: &DesignFileSet, compression: crate::config::PngCompression) -> Result<EncodedPair> {
    Ok(EncodedPair {
        background: encode_png(&files.background, compression)?,
        mask: encode_png(&files.mask, compression)?,
    })
}

/// Name hint for files derived from `reference`
fn file_stem(reference: &ImageRef) -> String {
    let trimmed = reference
        .as_str()
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    Path::new(trimmed)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image")
        .to_string()
}

async fn run_blocking<T, F>(job: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| MaskError::internal(format!("Blocking task failed: {}", e)))?
}

/// Decode a stored design file, mainly for callers that want the pixels back
pub async fn load_design_files<S: ImageStore>(store: &S, refs: &DesignFileRefs) -> Result<DesignFileSet> {
    let (background, mask): (DynamicImage, DynamicImage) =
        tokio::try_join!(store.load(&refs.background_ref), store.load(&refs.mask_ref))?;
    Ok(DesignFileSet {
        background: background.to_rgba8(),
        mask: mask.to_rgba8(),
    })
}
