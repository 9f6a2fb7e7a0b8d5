//! Request model: an immutable description of one unit of work.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::task::signal::CancelSignal;

/// Opaque, key-ordered options interpreted only by the adapter.
pub type Options = BTreeMap<String, serde_json::Value>;

/// Execution knobs passed through to the adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeOptions {
    /// Parallelism hint for the adapter's own sub-work. Always >= 1.
    #[serde(default = "default_workers", deserialize_with = "deserialize_workers")]
    workers: usize,
    #[serde(default)]
    pub dry_run: bool,
    /// Injected by the caller or the runner; never serialised.
    #[serde(skip)]
    pub cancel_signal: CancelSignal,
}

fn default_workers() -> usize {
    1
}

fn deserialize_workers<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = i64::deserialize(deserializer)?;
    Ok(usize::try_from(raw).unwrap_or(0).max(1))
}

impl RuntimeOptions {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            ..Default::default()
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_cancel_signal(mut self, signal: CancelSignal) -> Self {
        self.cancel_signal = signal;
        self
    }
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            dry_run: false,
            cancel_signal: CancelSignal::new(),
        }
    }
}

/// Missing, null and empty ids all get a generated one.
fn deserialize_task_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|id| !id.is_empty()).unwrap_or_else(generate_task_id))
}

/// Generate a short task id: 12 lowercase hex characters.
pub fn generate_task_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

/// One unit of work. Immutable once submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub task_type: String,
    pub input_path: String,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub options: Options,
    #[serde(default)]
    pub runtime: RuntimeOptions,
    #[serde(default = "generate_task_id", deserialize_with = "deserialize_task_id")]
    pub task_id: String,
}

impl Request {
    pub fn builder(task_type: impl Into<String>, input_path: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            task_type: task_type.into(),
            input_path: input_path.into(),
            output_dir: None,
            options: Options::new(),
            runtime: RuntimeOptions::default(),
            task_id: None,
        }
    }

    /// Shorthand for a request with default options.
    pub fn new(task_type: impl Into<String>, input_path: impl Into<String>) -> Self {
        Self::builder(task_type, input_path).build()
    }

    /// Parse a front-end JSON payload.
    pub fn from_payload(payload: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(payload)
    }

    pub fn option(&self, key: &str) -> Option<&serde_json::Value> {
        self.options.get(key)
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.runtime.cancel_signal
    }

    /// Copy of this request observing a different cancel signal.
    pub(crate) fn with_signal(&self, signal: CancelSignal) -> Self {
        let mut request = self.clone();
        request.runtime.cancel_signal = signal;
        request
    }
}

/// Builder for [`Request`].
#[derive(Debug)]
pub struct RequestBuilder {
    task_type: String,
    input_path: String,
    output_dir: Option<String>,
    options: Options,
    runtime: RuntimeOptions,
    task_id: Option<String>,
}

impl RequestBuilder {
    pub fn output_dir(mut self, dir: impl Into<String>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn runtime(mut self, runtime: RuntimeOptions) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn build(self) -> Request {
        Request {
            task_type: self.task_type,
            input_path: self.input_path,
            output_dir: self.output_dir,
            options: self.options,
            runtime: self.runtime,
            task_id: self
                .task_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(generate_task_id),
        }
    }
}
