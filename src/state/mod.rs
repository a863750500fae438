//! State module for tracking job progress
//!
//! # Components
//!
//! - `JobStatus`: lifecycle of a job and its allowed transitions
//! - `JobKind`: the five kinds of work, also used as rate-limit classes

mod job_kind;
mod job_status;

pub use job_kind::JobKind;
pub use job_status::JobStatus;
