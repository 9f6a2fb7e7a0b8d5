//! Adapter contract: the converter capability the core consumes.
//!
//! Adapters are external collaborators. The core only needs:
//! - `task_type()` to key the registry
//! - `execute()` to run one request and report a [`Summary`]
//!
//! An adapter validates its own inputs, checks
//! `request.runtime.cancel_signal` before expensive work and once per
//! sub-unit (e.g. per file), and returns [`AdapterError::Cancelled`] when it
//! stops because of that signal. Blocking conversions belong on
//! `tokio::task::spawn_blocking`.

pub mod registry;
pub mod support;

use async_trait::async_trait;

use crate::error::AdapterError;
use crate::task::{Request, Summary};

pub use registry::AdapterRegistry;

/// One document-conversion capability.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Registry key, e.g. `"image_extract"`.
    fn task_type(&self) -> &str;

    /// Run the request to completion or until cancelled.
    async fn execute(&self, request: &Request) -> Result<Summary, AdapterError>;
}
