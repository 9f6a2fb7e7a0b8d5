//! Job state machine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::{Request, Response};

/// State of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting to be started.
    Pending,
    /// Job has been handed to dispatch.
    Running,
    /// Adapter returned normally.
    Success,
    /// Dispatch returned a non-cancellation error.
    Failed,
    /// Job was cancelled before or during execution.
    Cancelled,
}

impl JobStatus {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        use JobStatus::*;

        matches!(
            (self, target),
            // From Pending
            (Pending, Running) | (Pending, Cancelled) |
            // From Running
            (Running, Success) | (Running, Failed) | (Running, Cancelled) |
            // Explicit retry
            (Failed, Pending)
        )
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }

    /// Derive the final status from a dispatch response.
    ///
    /// Only an explicit `CANCELLED` code yields `Cancelled`, so a job that
    /// failed for real during a cancellation is still reported as `Failed`.
    pub fn from_response(response: &Response) -> Self {
        if response.ok {
            Self::Success
        } else if response.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Failed
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// A request plus its execution state, owned by a `TaskRunner`.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    /// Runner-local identity, distinct from the request's `task_id`.
    pub id: Uuid,
    pub request: Request,
    pub status: JobStatus,
    pub response: Option<Response>,
    pub retries: u32,
}

impl Job {
    pub fn new(request: Request) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            status: JobStatus::Pending,
            response: None,
            retries: 0,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.request.task_id
    }

    /// Transition to a new state.
    pub fn transition_to(&mut self, new_status: JobStatus) -> Result<(), String> {
        if !self.status.can_transition_to(new_status) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.status, new_status
            ));
        }
        self.status = new_status;
        Ok(())
    }

    /// Put a failed job back in the queue for another attempt.
    pub fn reset_for_retry(&mut self) -> Result<(), String> {
        self.transition_to(JobStatus::Pending)?;
        self.retries += 1;
        self.response = None;
        Ok(())
    }
}

/// Caller-side reference to a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle {
    pub job_id: Uuid,
    pub task_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorEnvelope;
    use crate::task::Summary;

    #[test]
    fn state_transitions_valid() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Success));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Failed.can_transition_to(JobStatus::Pending));
    }

    #[test]
    fn state_transitions_invalid() {
        assert!(!JobStatus::Success.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Cancelled.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Success.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Success));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Running));
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Success.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
    }

    #[test]
    fn status_from_response() {
        let ok = Response::success("t", Summary::default());
        assert_eq!(JobStatus::from_response(&ok), JobStatus::Success);

        let cancelled = Response::failure("t", ErrorEnvelope::cancelled(""));
        assert_eq!(JobStatus::from_response(&cancelled), JobStatus::Cancelled);

        let failed = Response::failure("t", ErrorEnvelope::process_failed("boom"));
        assert_eq!(JobStatus::from_response(&failed), JobStatus::Failed);

        let internal = Response::failure("t", ErrorEnvelope::internal("boom", "panic"));
        assert_eq!(JobStatus::from_response(&internal), JobStatus::Failed);
    }

    #[test]
    fn retry_resets_and_counts() {
        let mut job = Job::new(Request::new("t", "/x"));
        job.transition_to(JobStatus::Running).unwrap();
        job.transition_to(JobStatus::Failed).unwrap();
        job.response = Some(Response::failure("t", ErrorEnvelope::process_failed("x")));

        job.reset_for_retry().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retries, 1);
        assert!(job.response.is_none());
    }

    #[test]
    fn retry_rejected_for_success() {
        let mut job = Job::new(Request::new("t", "/x"));
        job.transition_to(JobStatus::Running).unwrap();
        job.transition_to(JobStatus::Success).unwrap();
        assert!(job.reset_for_retry().is_err());
        assert_eq!(job.retries, 0);
    }

    #[test]
    fn job_status_display_and_serde() {
        assert_eq!(JobStatus::Cancelled.to_string(), "cancelled");
        let json = serde_json::to_string(&JobStatus::Success).unwrap();
        assert_eq!(json, "\"success\"");
        let parsed: JobStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, JobStatus::Success);
    }
}
