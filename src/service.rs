//! Task service: fire-and-track single requests for interactive front-ends.
//!
//! Each `start` dispatches one request on its own tokio task with its own
//! cancel signal. Records stay queryable until the service is dropped; the
//! task handle and signal are released as soon as the task settles.
//!
//! With a log directory configured, every task also gets its own log file
//! (`<log_dir>/<YYYY-MM-DD>/<task_id>.log`) holding the events emitted while
//! it runs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;

use crate::adapter::AdapterRegistry;
use crate::dispatch::dispatch;
use crate::error::{ErrorEnvelope, ServiceError};
use crate::logging;
use crate::runner::JobStatus;
use crate::task::{CancelSignal, Options, Request, Response, Summary};

/// Queryable state of one background task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub task_type: String,
    pub input_path: String,
    pub output_dir: Option<String>,
    pub options: Options,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub summary: Option<Summary>,
    pub error: Option<ErrorEnvelope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
}

impl TaskRecord {
    fn running(request: &Request) -> Self {
        Self {
            task_id: request.task_id.clone(),
            task_type: request.task_type.clone(),
            input_path: request.input_path.clone(),
            output_dir: request.output_dir.clone(),
            options: request.options.clone(),
            status: JobStatus::Running,
            created_at: Utc::now(),
            finished_at: None,
            summary: None,
            error: None,
            log_path: None,
        }
    }

    /// Fold a dispatch response in. A record the user already cancelled
    /// stays cancelled whatever the adapter reported.
    fn complete(&mut self, response: Response) {
        self.finished_at = Some(Utc::now());
        if self.status == JobStatus::Cancelled {
            if response.is_cancelled() {
                self.error = response.error;
            }
            return;
        }

        self.status = JobStatus::from_response(&response);
        self.summary = response.summary;
        self.error = response.error;
    }
}

struct ActiveTask {
    signal: CancelSignal,
    /// Taken by `wait`; the entry itself stays so `cancel` still works.
    handle: Option<JoinHandle<()>>,
}

type ActiveMap = Arc<Mutex<HashMap<String, ActiveTask>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Starts, cancels and reports on individual background tasks.
pub struct TaskService {
    registry: Arc<AdapterRegistry>,
    /// Insertion order is creation order.
    records: Arc<Mutex<Vec<TaskRecord>>>,
    /// Tasks that have not settled yet. Each task removes its own entry.
    active: ActiveMap,
    log_dir: Option<PathBuf>,
}

impl TaskService {
    pub fn new(registry: Arc<AdapterRegistry>) -> Self {
        Self {
            registry,
            records: Arc::new(Mutex::new(Vec::new())),
            active: Arc::new(Mutex::new(HashMap::new())),
            log_dir: None,
        }
    }

    /// Give every task started from now on its own log file under `dir`.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }

    /// Record the request as running and dispatch it in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, request: Request) -> Result<TaskRecord, ServiceError> {
        let mut record = TaskRecord::running(&request);
        let task_log = {
            let mut records = lock(&self.records);
            if records.iter().any(|r| r.task_id == record.task_id) {
                return Err(ServiceError::Duplicate {
                    task_id: record.task_id,
                });
            }
            let task_log = self.log_dir.as_deref().and_then(|dir| {
                logging::open_task_log(dir, &record.task_id)
                    .inspect_err(|e| {
                        tracing::warn!(task_id = %record.task_id, "Task log unavailable: {}", e);
                    })
                    .ok()
            });
            if let Some(log) = &task_log {
                record.log_path = Some(log.path.clone());
            }
            records.push(record.clone());
            task_log
        };

        let signal = CancelSignal::new();
        let registry = Arc::clone(&self.registry);
        let records = Arc::clone(&self.records);
        let active = Arc::clone(&self.active);
        let task_signal = signal.clone();
        let task_id = record.task_id.clone();
        let (log_dispatch, log_guard) = match task_log {
            Some(log) => (Some(log.dispatch), Some(log.guard)),
            None => (None, None),
        };

        tracing::info!(task_id = %task_id, task_type = %record.task_type, "Task started");
        let work = async move {
            tracing::debug!(task_id = %request.task_id, input_path = %request.input_path, "Dispatching");
            let response = dispatch(&registry, &request, Some(&task_signal)).await;
            if let Some(record) = lock(&records)
                .iter_mut()
                .find(|r| r.task_id == request.task_id)
            {
                record.complete(response);
                tracing::info!(task_id = %record.task_id, status = %record.status, "Task finished");
            }
            lock(&active).remove(&request.task_id);
            drop(log_guard);
        };

        // Held across the spawn so the task's own removal can't run before the insert.
        let mut active = lock(&self.active);
        let handle = match log_dispatch {
            Some(subscriber) => tokio::spawn(work.with_subscriber(subscriber)),
            None => tokio::spawn(work),
        };
        active.insert(
            task_id,
            ActiveTask {
                signal,
                handle: Some(handle),
            },
        );
        Ok(record)
    }

    /// Cancel a task. Already-finished tasks are left alone.
    pub fn cancel(&self, task_id: &str) -> Result<(), ServiceError> {
        {
            let mut records = lock(&self.records);
            let record = records
                .iter_mut()
                .find(|r| r.task_id == task_id)
                .ok_or_else(|| ServiceError::NotFound {
                    task_id: task_id.to_string(),
                })?;
            if record.status.is_terminal() {
                return Ok(());
            }
            record.status = JobStatus::Cancelled;
        }

        if let Some(active) = lock(&self.active).get(task_id) {
            active.signal.cancel();
        }
        tracing::info!(task_id, "Task cancellation requested");
        Ok(())
    }

    pub fn get_status(&self, task_id: &str) -> Result<TaskRecord, ServiceError> {
        lock(&self.records)
            .iter()
            .find(|r| r.task_id == task_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound {
                task_id: task_id.to_string(),
            })
    }

    /// All records, most recent first.
    pub fn list_all(&self) -> Vec<TaskRecord> {
        lock(&self.records).iter().rev().cloned().collect()
    }

    /// Path of the task's own log file, if one was opened.
    pub fn get_log_path(&self, task_id: &str) -> Result<Option<PathBuf>, ServiceError> {
        self.get_status(task_id).map(|record| record.log_path)
    }

    /// Number of tasks that have not settled yet.
    pub fn active_count(&self) -> usize {
        lock(&self.active).len()
    }

    /// Wait for a task's background work to finish, then return its record.
    ///
    /// A task that already settled returns its record straight away.
    pub async fn wait(&self, task_id: &str) -> Result<TaskRecord, ServiceError> {
        let handle = lock(&self.active)
            .get_mut(task_id)
            .and_then(|active| active.handle.take());
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::error!(task_id, "Task join failed: {}", e);
        }
        self.get_status(task_id)
    }
}

impl Drop for TaskService {
    fn drop(&mut self) {
        for (_, active) in lock(&self.active).drain() {
            active.signal.cancel();
        }
    }
}
