//! Shared primitives for Tributary crates
//!
//! Holds the error taxonomy every stream error is classified into, the
//! cancellation signal bound to a request, and the per-request context handed
//! to providers and tool executors.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod cancel;
pub mod context;
pub mod error;

pub use cancel::{CancelReason, CancelSignal};
pub use context::RequestContext;
pub use error::{ClassifiedError, ErrorCategory};
