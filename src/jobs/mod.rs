//! Tracked, cancellable jobs
//!
//! - `spec`: the request shape of every job kind and its validation
//! - `runners`: the bodies that drive a job from Running to a terminal state
//! - `orchestrator`: admission, per-kind queues, cancellation and recovery

mod orchestrator;
mod runners;
mod spec;

pub use orchestrator::{CancelError, JobOrchestrator, SubmitError};
pub use runners::RunError;
pub use spec::{BatchItem, BatchJob, CrawlJob, JobSpec, MapJob, ScrapeJob, SearchJob, ValidationError};
