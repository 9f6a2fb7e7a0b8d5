//! Task data model: requests, responses, and the cancel signal.
//!
//! - `request`: `Request`, `RuntimeOptions`, builder and payload parsing
//! - `response`: `Response`, `Summary`
//! - `signal`: `CancelSignal`, the shared cooperative-cancellation flag

pub mod request;
pub mod response;
pub mod signal;

pub use request::{Options, Request, RequestBuilder, RuntimeOptions, generate_task_id};
pub use response::{Response, ResponseStatus, Summary};
pub use signal::CancelSignal;
