//! Progress callback plumbing.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::dispatch::panic_message;
use crate::runner::state::Job;

/// Called once per settled job with `(job, completed, total)`.
pub type ProgressCallback = Arc<dyn Fn(&Job, usize, usize) + Send + Sync>;

/// Invoke the callback, swallowing any panic so it never reaches the scheduler.
pub(crate) fn notify(callback: Option<&ProgressCallback>, job: &Job, completed: usize, total: usize) {
    let Some(callback) = callback else {
        return;
    };
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(job, completed, total))) {
        tracing::debug!(
            task_id = %job.task_id(),
            "Progress callback panicked: {}",
            panic_message(payload.as_ref())
        );
    }
}
