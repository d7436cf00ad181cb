//! Design-area replication across sibling images
//!
//! The rectangle is recovered once from an existing mask and then composed
//! onto every target independently. Targets run in parallel on a rayon pool
//! and never share mutable state, so one failing target does not affect the
//! others.

use crate::{
    compositor::compose,
    error::{MaskError, Result},
    geometry::extract_alpha_bounding_box,
    services::progress::{
        BatchSummary, NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressUpdate,
    },
    types::{DesignFileSet, Rectangle},
};
use image::DynamicImage;
use instant::Instant;
use rayon::prelude::*;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn};

/// Per-target outcomes of a replication, in target order
#[derive(Debug)]
pub struct ReplicationReport<T = DesignFileSet> {
    /// Rectangle shared by every target before per-target clamping
    pub rect: Rectangle,
    pub outcomes: Vec<Result<T>>,
}

impl<T> ReplicationReport<T> {
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    #[must_use]
    pub fn is_complete_success(&self) -> bool {
        self.failed() == 0
    }

    /// Transform the successful outcomes, keeping failures in place
    pub fn map_outcomes<U>(self, mut f: impl FnMut(usize, T) -> Result<U>) -> ReplicationReport<U> {
        ReplicationReport {
            rect: self.rect,
            outcomes: self
                .outcomes
                .into_iter()
                .enumerate()
                .map(|(i, outcome)| outcome.and_then(|value| f(i, value)))
                .collect(),
        }
    }
}

/// Clone the design area of `source_mask` onto every target.
///
/// Uses the global rayon pool and cannot be cancelled; see
/// [`ReplicationPlanner`] for the configurable variant.
pub fn clone_design_area(
    source_mask: &DynamicImage,
    targets: &[DynamicImage],
) -> Result<ReplicationReport> {
    ReplicationPlanner::default().clone_design_area(source_mask, targets, &CancellationToken::new())
}

/// Runs replication on a dedicated or global rayon pool
#[derive(Clone)]
pub struct ReplicationPlanner {
    pool: Option<Arc<rayon::ThreadPool>>,
    reporter: Arc<dyn ProgressReporter>,
}

impl Default for ReplicationPlanner {
    fn default() -> Self {
        Self {
            pool: None,
            reporter: Arc::new(NoOpProgressReporter),
        }
    }
}

impl ReplicationPlanner {
    /// Create a planner with `worker_threads` workers (0 = rayon's global pool)
    pub fn new(worker_threads: usize) -> Result<Self> {
        if worker_threads == 0 {
            return Ok(Self::default());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_threads)
            .thread_name(|i| format!("design-mask-worker-{i}"))
            .build()
            .map_err(|e| MaskError::internal(format!("Failed to build worker pool: {}", e)))?;
        Ok(Self {
            pool: Some(Arc::new(pool)),
            reporter: Arc::new(NoOpProgressReporter),
        })
    }

    /// Report per-target progress to `reporter`
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Recover the design rectangle from `source_mask` and compose it onto each target.
    ///
    /// Fails as a whole with [`MaskError::NoDesignAreaFound`] when the mask has
    /// no transparent pixel; otherwise every target gets its own outcome.
    pub fn clone_design_area(
        &self,
        source_mask: &DynamicImage,
        targets: &[DynamicImage],
        cancel: &CancellationToken,
    ) -> Result<ReplicationReport> {
        let rect = extract_alpha_bounding_box(source_mask).ok_or_else(|| {
            MaskError::no_design_area(format!(
                "source mask {}x{} has no transparent pixels",
                source_mask.width(),
                source_mask.height()
            ))
        })?;
        debug!(rect = %rect, "Recovered design area from source mask");
        Ok(self.clone_with_rectangle(rect, targets, cancel))
    }

    /// Targets handled per batch when the caller streams targets through the planner
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.pool
            .as_ref()
            .map_or_else(rayon::current_num_threads, |pool| pool.current_num_threads())
            .max(1)
    }

    /// Progress tracker for a replication over `total` targets
    #[must_use]
    pub fn progress(&self, total: usize) -> ReplicationProgress {
        ReplicationProgress::new(Arc::clone(&self.reporter), total)
    }

    /// Compose `rect` onto each target.
    ///
    /// The rectangle is clamped per target; a target it misses entirely
    /// reports [`MaskError::InvalidGeometry`]. Targets not yet started when
    /// `cancel` fires report [`MaskError::Cancelled`].
    pub fn clone_with_rectangle(
        &self,
        rect: Rectangle,
        targets: &[DynamicImage],
        cancel: &CancellationToken,
    ) -> ReplicationReport {
        let span = info_span!("replication", rect = %rect, targets = targets.len());
        let _guard = span.enter();

        let progress = self.progress(targets.len());
        let outcomes = self.clone_each(rect, targets, cancel, Some(&progress), |_, files| Ok(files));
        progress.finish();
        ReplicationReport { rect, outcomes }
    }

    /// Compose `rect` onto each target and hand every pair to `finish` as soon
    /// as it is built.
    ///
    /// Pixels of a target are dropped once `finish` returns, so only the pairs
    /// currently being worked on are held in memory. When `progress` is given,
    /// each target's final outcome is recorded against its index.
    pub fn clone_each<T, F>(
        &self,
        rect: Rectangle,
        targets: &[DynamicImage],
        cancel: &CancellationToken,
        progress: Option<&ReplicationProgress>,
        finish: F,
    ) -> Vec<Result<T>>
    where
        T: Send,
        F: Fn(usize, DesignFileSet) -> Result<T> + Sync,
    {
        let run = || -> Vec<Result<T>> {
            targets
                .par_iter()
                .enumerate()
                .map(|(index, target)| {
                    let outcome = if cancel.is_cancelled() {
                        Err(MaskError::cancelled(format!("target {} skipped", index)))
                    } else {
                        compose(target, rect).and_then(|files| finish(index, files))
                    };
                    if let Some(progress) = progress {
                        progress.record(ProcessingStage::Compositing, index, &outcome);
                    }
                    outcome
                })
                .collect()
        };

        match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }
}

/// Running totals of one replication, shared by every batch and stage
pub struct ReplicationProgress {
    reporter: Arc<dyn ProgressReporter>,
    start: Instant,
    total: usize,
    completed: AtomicUsize,
    failed: AtomicUsize,
}

impl ReplicationProgress {
    #[must_use]
    pub fn new(reporter: Arc<dyn ProgressReporter>, total: usize) -> Self {
        Self {
            reporter,
            start: Instant::now(),
            total,
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    /// Record the final outcome of target `index`, reached at `stage`
    pub fn record<T>(&self, stage: ProcessingStage, index: usize, outcome: &Result<T>) {
        let done = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        let label = format!("target {}", index);
        match outcome {
            Ok(_) => self.reporter.report_progress(ProgressUpdate::new(
                stage,
                done,
                self.total,
                label,
                self.start,
            )),
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(index, error = %e, "Replication target failed");
                self.reporter.report_error(stage, &label, &e.to_string());
            },
        }
    }

    /// Log and report the totals
    pub fn finish(&self) -> BatchSummary {
        let completed = self.completed.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let summary = BatchSummary {
            succeeded: completed - failed,
            failed,
            elapsed_ms: self.start.elapsed().as_millis() as u64,
        };
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            elapsed_ms = summary.elapsed_ms,
            "Replication finished"
        );
        self.reporter.report_completion(summary);
        summary
    }
}
