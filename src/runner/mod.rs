//! Job runner: wraps requests in mutable execution state and schedules them.
//!
//! - `state`: `JobStatus` state machine, `Job`, `JobHandle`
//! - `progress`: progress callback type and panic-safe notification
//! - `scheduler`: `TaskRunner`: serial/parallel passes, cancel, retry, reset

pub mod progress;
pub mod scheduler;
pub mod state;

pub use progress::ProgressCallback;
pub use scheduler::TaskRunner;
pub use state::{Job, JobHandle, JobStatus};
