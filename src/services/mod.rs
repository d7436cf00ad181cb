//! Service layer separating storage, encoding and progress reporting from the
//! masking algorithms

pub mod png;
pub mod progress;
pub mod store;

pub use png::encode_png;
pub use progress::{
    BatchSummary, ConsoleProgressReporter, NoOpProgressReporter, ProcessingStage,
    ProgressReporter, ProgressUpdate,
};
pub use store::{FileSystemImageStore, ImageStore, MemoryImageStore};
