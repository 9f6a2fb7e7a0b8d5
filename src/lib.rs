//! docx-toolbox: execution core for document-processing jobs.
//!
//! Front-ends build a [`Request`], hand it to a [`TaskRunner`] (batches) or
//! [`TaskService`] (single background tasks), and read back [`Job`]s or
//! [`Response`]s. The actual conversions are [`Adapter`]s looked up by task
//! type in an injected [`AdapterRegistry`].

pub mod adapter;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod runner;
pub mod service;
pub mod task;

pub use adapter::{Adapter, AdapterRegistry};
pub use config::{LogConfig, RunnerConfig};
pub use dispatch::dispatch;
pub use error::{AdapterError, ErrorEnvelope, ErrorKind};
pub use runner::{Job, JobHandle, JobStatus, TaskRunner};
pub use service::{TaskRecord, TaskService};
pub use task::{CancelSignal, Request, Response, RuntimeOptions, Summary};
