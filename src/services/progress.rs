//! Progress reporting service
//!
//! This module separates progress reporting concerns from business logic,
//! allowing different frontends to implement their own progress handling.
//! Reporters must be `Send + Sync` because bulk replication reports from
//! worker threads.

use instant::Instant;

/// Stages of a masking operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Fetching and decoding input images
    ImageLoading,
    /// Recovering the design rectangle from a mask
    RectangleExtraction,
    /// Building background/mask pairs
    Compositing,
    /// Encoding PNG output
    Encoding,
    /// Persisting output to the image store
    Saving,
    /// Processing completed
    Completed,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::ImageLoading => "Loading images",
            ProcessingStage::RectangleExtraction => "Extracting design area",
            ProcessingStage::Compositing => "Compositing design files",
            ProcessingStage::Encoding => "Encoding PNG output",
            ProcessingStage::Saving => "Saving design files",
            ProcessingStage::Completed => "Processing completed",
        }
    }
}

/// Progress update for one finished item of a batch
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Current processing stage
    pub stage: ProcessingStage,
    /// Items finished so far, including this one
    pub completed: usize,
    /// Total number of items
    pub total: usize,
    /// Label of the item that just finished
    pub item: String,
    /// Elapsed time since processing started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(
        stage: ProcessingStage,
        completed: usize,
        total: usize,
        item: String,
        start_time: Instant,
    ) -> Self {
        Self {
            stage,
            completed,
            total,
            item,
            elapsed_ms: start_time.elapsed().as_millis() as u64,
        }
    }

    /// Progress percentage (0-100)
    #[must_use]
    pub fn percentage(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.completed.min(self.total) * 100) / self.total) as u8
    }
}

/// Summary reported once a batch has finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
}

/// Trait for reporting progress during masking operations
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report an error for a single item
    fn report_error(&self, stage: ProcessingStage, item: &str, error: &str);

    /// Report batch completion
    fn report_completion(&self, summary: BatchSummary);
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_error(&self, _stage: ProcessingStage, _item: &str, _error: &str) {}

    fn report_completion(&self, _summary: BatchSummary) {}
}

/// Console progress reporter that logs progress through `log`
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    ///
    /// # Arguments
    /// * `verbose` - Whether to log every item or only errors and the summary
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::info!(
                "[{}%] {} {}/{}: {} ({}ms elapsed)",
                update.percentage(),
                update.stage.description(),
                update.completed,
                update.total,
                update.item,
                update.elapsed_ms
            );
        }
    }

    fn report_error(&self, stage: ProcessingStage, item: &str, error: &str) {
        log::error!("❌ Error during {} for {}: {}", stage.description(), item, error);
    }

    fn report_completion(&self, summary: BatchSummary) {
        log::info!(
            "✅ Completed in {}ms: {} succeeded, {} failed",
            summary.elapsed_ms,
            summary.succeeded,
            summary.failed
        );
    }
}

/// Progress bar reporter for interactive CLI use
#[cfg(feature = "cli")]
pub struct IndicatifProgressReporter {
    bar: indicatif::ProgressBar,
}

#[cfg(feature = "cli")]
impl IndicatifProgressReporter {
    /// Create a bar sized for `total` items
    #[must_use]
    pub fn new(total: usize) -> Self {
        let bar = indicatif::ProgressBar::new(total as u64);
        if let Ok(style) = indicatif::ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        Self { bar }
    }
}

#[cfg(feature = "cli")]
impl ProgressReporter for IndicatifProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        self.bar.set_message(update.item);
        self.bar.inc(1);
    }

    fn report_error(&self, stage: ProcessingStage, item: &str, error: &str) {
        self.bar
            .println(format!("❌ {} failed during {}: {}", item, stage.description(), error));
        self.bar.inc(1);
    }

    fn report_completion(&self, summary: BatchSummary) {
        self.bar.finish_with_message(format!(
            "{} succeeded, {} failed",
            summary.succeeded, summary.failed
        ));
    }
}

/// Create the reporter the CLI uses for a batch of `total` items
///
/// A progress bar is shown for multi-item batches unless verbose logging is
/// on, where per-item log lines are more useful.
#[cfg(feature = "cli")]
#[must_use]
pub fn create_cli_progress_reporter(verbose: bool, total: usize) -> Box<dyn ProgressReporter> {
    if verbose || total <= 1 {
        Box::new(ConsoleProgressReporter::new(verbose))
    } else {
        Box::new(IndicatifProgressReporter::new(total))
    }
}
