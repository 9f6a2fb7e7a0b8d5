//! Dispatch entry point: one request in, one response out.
//!
//! The boundary is total. Typed adapter errors pass through unchanged,
//! cancellation faults become `CANCELLED`, and anything else (including a
//! panicking adapter) becomes `INTERNAL`. Nothing unwinds past `dispatch`.
//!
//! `CANCELLED` only ever leaves here when a cancel signal is involved: an
//! adapter that hand-builds a `CANCELLED` envelope while its signal is clear
//! gets `INTERNAL` instead.

use std::any::Any;
use std::borrow::Cow;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use crate::adapter::AdapterRegistry;
use crate::error::{AdapterError, ErrorEnvelope, ErrorKind};
use crate::task::{CancelSignal, Request, Response};

/// Run `request` through the adapter registered for its task type.
///
/// When `cancel_signal` is given it replaces the request's own signal for the
/// duration of the call, so a batch-level signal dominates.
pub async fn dispatch(
    registry: &AdapterRegistry,
    request: &Request,
    cancel_signal: Option<&CancelSignal>,
) -> Response {
    let request: Cow<'_, Request> = match cancel_signal {
        Some(signal) => Cow::Owned(request.with_signal(signal.clone())),
        None => Cow::Borrowed(request),
    };
    let task_id = request.task_id.as_str();

    if request.cancel_signal().is_cancelled() {
        tracing::debug!(task_id, "Cancelled before adapter start");
        return Response::failure(task_id, ErrorEnvelope::cancelled("cancelled before start"));
    }

    let Some(adapter) = registry.get(&request.task_type).await else {
        tracing::warn!(task_id, task_type = %request.task_type, "Unknown task type");
        return Response::failure(
            task_id,
            ErrorEnvelope::invalid_input(format!("unknown task type: {}", request.task_type)),
        );
    };

    let outcome = AssertUnwindSafe(adapter.execute(&request))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(summary)) => Response::success(task_id, summary),
        Ok(Err(AdapterError::Task(error))) if error.code == ErrorKind::Cancelled => {
            if request.cancel_signal().is_cancelled() {
                Response::failure(task_id, ErrorEnvelope::cancelled(error.detail))
            } else {
                tracing::error!(task_id, "Adapter reported CANCELLED without a cancel signal");
                Response::failure(
                    task_id,
                    ErrorEnvelope::internal(error.message, "CANCELLED raised without cancel signal"),
                )
            }
        }
        Ok(Err(AdapterError::Task(error))) => Response::failure(task_id, error),
        Ok(Err(AdapterError::Cancelled { detail })) => {
            Response::failure(task_id, ErrorEnvelope::cancelled(detail))
        }
        Ok(Err(AdapterError::Unexpected { type_name, message })) => {
            tracing::error!(task_id, type_name, "Adapter failed unexpectedly: {}", message);
            Response::failure(task_id, ErrorEnvelope::internal(message, type_name))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(task_id, "Adapter panicked: {}", message);
            Response::failure(task_id, ErrorEnvelope::internal(message, "panic"))
        }
    }
}

/// Best-effort text from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
