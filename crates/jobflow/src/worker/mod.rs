pub mod job;
pub mod pool;

pub use job::{RunInput, RunReport, RunRequest};
pub use pool::WorkerPool;

// Re-export crossbeam_channel for callers that select over reports
pub use crossbeam_channel;
