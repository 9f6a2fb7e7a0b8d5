//! Task runner: serial or bounded-parallel execution with cancel and retry.
//!
//! One pass (`run_all` or `retry_failed`) takes a snapshot of the jobs it
//! owns, installs a fresh cancel signal, and drives every one of them to a
//! terminal status:
//! - serial (`max_workers == 1`): inline on the caller's task, in order
//! - parallel: up to `max_workers` dispatches in a `JoinSet`, backfilled as
//!   each one completes; progress is reported in completion order
//!
//! On cancellation, jobs that never reached dispatch are marked `Cancelled`
//! directly and in-flight ones are left to the adapter's cooperative check.

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use futures::FutureExt;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::adapter::AdapterRegistry;
use crate::config::RunnerConfig;
use crate::dispatch::{dispatch, panic_message};
use crate::error::ErrorEnvelope;
use crate::runner::progress::{ProgressCallback, notify};
use crate::runner::state::{Job, JobHandle, JobStatus};
use crate::task::{CancelSignal, Request, Response};

/// What a worker slot reports back for one job.
enum Settled {
    /// The signal was set before dispatch began.
    NotStarted,
    Finished(Response),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs a list of jobs against an adapter registry.
pub struct TaskRunner {
    registry: Arc<AdapterRegistry>,
    max_workers: usize,
    /// Limit used by `retry_failed_default`.
    max_retries: u32,
    jobs: Mutex<Vec<Job>>,
    /// Signal for the current pass. Replaced, never un-set.
    signal: Mutex<CancelSignal>,
    /// Caller-owned signal every pass signal descends from.
    parent_signal: Option<CancelSignal>,
    on_progress: RwLock<Option<ProgressCallback>>,
    /// Serialises passes on one runner.
    pass_gate: tokio::sync::Mutex<()>,
}

impl TaskRunner {
    /// Create a runner. `max_workers` below 1 is clamped to 1.
    pub fn new(registry: Arc<AdapterRegistry>, max_workers: usize) -> Self {
        Self {
            registry,
            max_workers: max_workers.max(1),
            max_retries: 1,
            jobs: Mutex::new(Vec::new()),
            signal: Mutex::new(CancelSignal::new()),
            parent_signal: None,
            on_progress: RwLock::new(None),
            pass_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn from_config(registry: Arc<AdapterRegistry>, config: &RunnerConfig) -> Self {
        Self::new(registry, config.max_workers).with_max_retries(config.max_retries)
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Tie every pass's signal to `parent`: cancelling it cancels the current
    /// pass, and a pass started after it was cancelled starts cancelled.
    pub fn with_parent_signal(mut self, parent: CancelSignal) -> Self {
        *lock(&self.signal) = parent.child();
        self.parent_signal = Some(parent);
        self
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn set_progress_callback<F>(&self, callback: F)
    where
        F: Fn(&Job, usize, usize) + Send + Sync + 'static,
    {
        let callback: ProgressCallback = Arc::new(callback);
        *self
            .on_progress
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    /// Queue a request as a new `Pending` job.
    pub fn submit(&self, request: Request) -> JobHandle {
        let job = Job::new(request);
        let handle = JobHandle {
            job_id: job.id,
            task_id: job.task_id().to_string(),
        };
        tracing::debug!(
            task_id = %handle.task_id,
            task_type = %job.request.task_type,
            "Job submitted"
        );
        lock(&self.jobs).push(job);
        handle
    }

    /// Request cancellation of the current pass. Idempotent.
    pub fn cancel(&self) {
        tracing::info!("Cancellation requested");
        lock(&self.signal).cancel();
    }

    /// Whether the current pass's signal is set.
    pub fn is_cancelled(&self) -> bool {
        lock(&self.signal).is_cancelled()
    }

    /// Clear the signal and drop every job.
    pub fn reset(&self) {
        self.fresh_signal();
        lock(&self.jobs).clear();
    }

    /// Snapshot of all jobs in submission order.
    pub fn jobs(&self) -> Vec<Job> {
        lock(&self.jobs).clone()
    }

    pub fn job(&self, handle: &JobHandle) -> Option<Job> {
        lock(&self.jobs)
            .iter()
            .find(|job| job.id == handle.job_id)
            .cloned()
    }

    /// Run every `Pending` job and return all jobs afterwards.
    pub async fn run_all(&self) -> Vec<Job> {
        let _pass = self.pass_gate.lock().await;
        let signal = self.fresh_signal();
        let ids: Vec<Uuid> = lock(&self.jobs)
            .iter()
            .filter(|job| job.status == JobStatus::Pending)
            .map(|job| job.id)
            .collect();

        tracing::info!(total = ids.len(), max_workers = self.max_workers, "Running jobs");
        self.run_pass(ids, signal).await;
        self.jobs()
    }

    /// Re-run failed jobs that have been retried fewer than `max_retries`
    /// times. Returns only the re-run jobs.
    pub async fn retry_failed(&self, max_retries: u32) -> Vec<Job> {
        let _pass = self.pass_gate.lock().await;
        let ids: Vec<Uuid> = {
            let mut jobs = lock(&self.jobs);
            jobs.iter_mut()
                .filter(|job| job.status == JobStatus::Failed && job.retries < max_retries)
                .filter_map(|job| match job.reset_for_retry() {
                    Ok(()) => Some(job.id),
                    Err(e) => {
                        tracing::error!(task_id = %job.task_id(), "Retry reset rejected: {}", e);
                        None
                    }
                })
                .collect()
        };
        let signal = self.fresh_signal();

        tracing::info!(total = ids.len(), max_retries, "Retrying failed jobs");
        self.run_pass(ids.clone(), signal).await;

        let jobs = lock(&self.jobs);
        ids.iter()
            .filter_map(|id| jobs.iter().find(|job| job.id == *id).cloned())
            .collect()
    }

    /// `retry_failed` with the runner's configured limit.
    pub async fn retry_failed_default(&self) -> Vec<Job> {
        self.retry_failed(self.max_retries).await
    }

    fn fresh_signal(&self) -> CancelSignal {
        let signal = match &self.parent_signal {
            Some(parent) => parent.child(),
            None => CancelSignal::new(),
        };
        *lock(&self.signal) = signal.clone();
        signal
    }

    async fn run_pass(&self, ids: Vec<Uuid>, signal: CancelSignal) {
        if self.max_workers <= 1 {
            self.run_serial(ids, signal).await;
        } else {
            self.run_parallel(ids, signal).await;
        }
    }

    async fn run_serial(&self, ids: Vec<Uuid>, signal: CancelSignal) {
        let total = ids.len();
        let mut completed = 0;

        for id in ids {
            if signal.is_cancelled() {
                if let Some(job) = self.cancel_unstarted(id) {
                    completed += 1;
                    self.report(&job, completed, total);
                }
                continue;
            }

            let Some(request) = self.begin(id) else {
                continue;
            };
            let outcome = AssertUnwindSafe(dispatch(&self.registry, &request, Some(&signal)))
                .catch_unwind()
                .await;
            let settled = match outcome {
                Ok(response) => Ok(Settled::Finished(response)),
                Err(payload) => Err(panic_message(payload.as_ref())),
            };

            if let Some(job) = self.settle(id, settled) {
                completed += 1;
                self.report(&job, completed, total);
            }
        }
    }

    async fn run_parallel(&self, ids: Vec<Uuid>, signal: CancelSignal) {
        let total = ids.len();
        let mut completed = 0;
        let mut queue: VecDeque<Uuid> = ids.into();
        let mut in_flight: JoinSet<Settled> = JoinSet::new();
        let mut owners: HashMap<tokio::task::Id, Uuid> = HashMap::new();
        let mut swept = false;

        loop {
            if !signal.is_cancelled() {
                while in_flight.len() < self.max_workers {
                    let Some(id) = queue.pop_front() else {
                        break;
                    };
                    let Some(request) = self.begin(id) else {
                        continue;
                    };
                    let registry = Arc::clone(&self.registry);
                    let signal = signal.clone();
                    let handle = in_flight.spawn(async move {
                        if signal.is_cancelled() {
                            return Settled::NotStarted;
                        }
                        Settled::Finished(dispatch(&registry, &request, Some(&signal)).await)
                    });
                    owners.insert(handle.id(), id);
                }
            } else if !swept {
                swept = true;
                let remaining = queue.len();
                for id in queue.drain(..) {
                    if let Some(job) = self.cancel_unstarted(id) {
                        completed += 1;
                        self.report(&job, completed, total);
                    }
                }
                tracing::info!(
                    swept = remaining,
                    in_flight = in_flight.len(),
                    "Cancelled queued jobs"
                );
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                joined = in_flight.join_next_with_id() => {
                    let (task, settled) = match joined {
                        Some(Ok((task, settled))) => (task, Ok(settled)),
                        Some(Err(err)) => {
                            let task = err.id();
                            let reason = if err.is_panic() {
                                panic_message(err.into_panic().as_ref())
                            } else {
                                err.to_string()
                            };
                            (task, Err(reason))
                        }
                        None => break,
                    };
                    let Some(id) = owners.remove(&task) else {
                        continue;
                    };
                    if let Some(job) = self.settle(id, settled) {
                        completed += 1;
                        self.report(&job, completed, total);
                    }
                }
                _ = signal.cancelled(), if !swept => {}
            }
        }
    }

    /// Mark a queued job `Running` and hand back its request.
    fn begin(&self, id: Uuid) -> Option<Request> {
        let mut jobs = lock(&self.jobs);
        let job = jobs.iter_mut().find(|job| job.id == id)?;
        if let Err(e) = job.transition_to(JobStatus::Running) {
            tracing::warn!(task_id = %job.task_id(), "Skipping job: {}", e);
            return None;
        }
        tracing::info!(
            task_id = %job.task_id(),
            task_type = %job.request.task_type,
            retries = job.retries,
            "Job started"
        );
        Some(job.request.clone())
    }

    /// Mark a job that never reached dispatch as `Cancelled`.
    fn cancel_unstarted(&self, id: Uuid) -> Option<Job> {
        let mut jobs = lock(&self.jobs);
        let job = jobs.iter_mut().find(|job| job.id == id)?;
        if let Err(e) = job.transition_to(JobStatus::Cancelled) {
            tracing::warn!(task_id = %job.task_id(), "Cannot cancel job: {}", e);
            return None;
        }
        tracing::info!(task_id = %job.task_id(), "Job cancelled before start");
        Some(job.clone())
    }

    /// Record the outcome of a started job. `Err` is a fault in the
    /// scheduling machinery itself and always yields `Failed`.
    fn settle(&self, id: Uuid, settled: Result<Settled, String>) -> Option<Job> {
        let mut jobs = lock(&self.jobs);
        let job = jobs.iter_mut().find(|job| job.id == id)?;

        let (status, response) = match settled {
            Ok(Settled::NotStarted) => (JobStatus::Cancelled, None),
            Ok(Settled::Finished(response)) => (JobStatus::from_response(&response), Some(response)),
            Err(reason) => {
                tracing::error!(task_id = %job.task_id(), "Scheduler fault: {}", reason);
                let error = ErrorEnvelope::internal(reason, "scheduler fault");
                (JobStatus::Failed, Some(Response::failure(job.task_id(), error)))
            }
        };

        if let Err(e) = job.transition_to(status) {
            tracing::error!(task_id = %job.task_id(), "{}; forcing {}", e, status);
            job.status = status;
        }
        job.response = response;

        match job.status {
            JobStatus::Success => tracing::info!(task_id = %job.task_id(), "Job succeeded"),
            JobStatus::Cancelled => tracing::info!(task_id = %job.task_id(), "Job cancelled"),
            _ => tracing::warn!(
                task_id = %job.task_id(),
                code = ?job.response.as_ref().and_then(Response::error_code),
                "Job failed"
            ),
        }
        Some(job.clone())
    }

    fn report(&self, job: &Job, completed: usize, total: usize) {
        let callback = self
            .on_progress
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        notify(callback.as_ref(), job, completed, total);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::adapter::Adapter;
    use crate::error::{AdapterError, ErrorKind};
    use crate::task::Summary;

    struct CountingAdapter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Adapter for CountingAdapter {
        fn task_type(&self) -> &str {
            "count"
        }
        async fn execute(&self, request: &Request) -> Result<Summary, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request.input_path.ends_with("bad") {
                return Err(ErrorEnvelope::process_failed("bad input").into());
            }
            Ok(Summary {
                processed: 1,
                ..Default::default()
            })
        }
    }

    fn runner(workers: usize) -> (TaskRunner, Arc<CountingAdapter>) {
        let adapter = Arc::new(CountingAdapter {
            calls: AtomicUsize::new(0),
        });
        let registry = Arc::new(AdapterRegistry::with_adapters([adapter.clone() as Arc<dyn Adapter>]));
        (TaskRunner::new(registry, workers), adapter)
    }

    #[test]
    fn max_workers_clamped() {
        assert_eq!(runner(0).0.max_workers(), 1);
        assert_eq!(runner(4).0.max_workers(), 4);
        let config = RunnerConfig {
            max_workers: 0,
            ..Default::default()
        };
        let registry = Arc::new(AdapterRegistry::new());
        assert_eq!(TaskRunner::from_config(registry, &config).max_workers(), 1);
    }

    #[tokio::test]
    async fn configured_retry_limit() {
        let adapter: Arc<dyn Adapter> = Arc::new(CountingAdapter {
            calls: AtomicUsize::new(0),
        });
        let registry = Arc::new(AdapterRegistry::with_adapters([adapter]));
        let config = RunnerConfig {
            max_retries: 2,
            ..Default::default()
        };
        let runner = TaskRunner::from_config(registry, &config);
        assert_eq!(runner.max_retries(), 2);

        let handle = runner.submit(Request::new("count", "/bad"));
        runner.run_all().await;
        assert_eq!(runner.retry_failed_default().await.len(), 1);
        assert_eq!(runner.retry_failed_default().await.len(), 1);
        assert!(runner.retry_failed_default().await.is_empty());

        let job = runner.job(&handle).unwrap();
        assert_eq!(job.retries, 2);
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn scheduler_fault_forces_failed() {
        let (runner, _) = runner(1);
        let handle = runner.submit(Request::new("count", "/a"));
        assert!(runner.begin(handle.job_id).is_some());

        let job = runner
            .settle(handle.job_id, Err("worker vanished".to_string()))
            .unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        let error = job.response.unwrap().error.unwrap();
        assert_eq!(error.code, ErrorKind::Internal);
        assert_eq!(error.message, "worker vanished");
        assert_eq!(error.detail, "scheduler fault");
    }

    #[test]
    fn scheduler_fault_on_unstarted_job_is_still_terminal() {
        let (runner, _) = runner(1);
        let handle = runner.submit(Request::new("count", "/a"));

        // Pending -> Failed is not a legal transition; settle forces it anyway.
        let job = runner.settle(handle.job_id, Err("lost".to_string())).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.status.is_terminal());
    }

    #[test]
    fn submit_and_reset() {
        let (runner, _) = runner(1);
        let handle = runner.submit(Request::new("count", "/x"));
        assert_eq!(runner.jobs().len(), 1);
        assert_eq!(runner.job(&handle).unwrap().status, JobStatus::Pending);

        runner.cancel();
        runner.reset();
        assert!(runner.jobs().is_empty());
        assert!(runner.job(&handle).is_none());
        assert!(!runner.is_cancelled());
    }

    #[tokio::test]
    async fn run_all_only_runs_pending() {
        let (runner, adapter) = runner(1);
        runner.submit(Request::new("count", "/a"));
        runner.run_all().await;
        runner.submit(Request::new("count", "/b"));
        let jobs = runner.run_all().await;

        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| j.status == JobStatus::Success));
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancel_between_passes_is_cleared() {
        let (runner, adapter) = runner(2);
        runner.submit(Request::new("count", "/a"));
        runner.cancel();
        let jobs = runner.run_all().await;
        assert_eq!(jobs[0].status, JobStatus::Success);
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_job_keeps_response() {
        let (runner, _) = runner(1);
        let handle = runner.submit(Request::new("count", "/bad"));
        runner.run_all().await;

        let job = runner.job(&handle).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(
            job.response.unwrap().error_code(),
            Some(ErrorKind::ProcessFailed)
        );
    }

    #[tokio::test]
    async fn unknown_task_type_fails_job() {
        let (runner, adapter) = runner(3);
        runner.submit(Request::new("nope", "/a"));
        let jobs = runner.run_all().await;
        assert_eq!(jobs[0].status, JobStatus::Failed);
        assert_eq!(
            jobs[0].response.as_ref().unwrap().error_code(),
            Some(ErrorKind::InvalidInput)
        );
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
    }
}
