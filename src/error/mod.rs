//! Unified error handling for the request layer.
//!
//! | Kind | Meaning | Who handles it |
//! |------|---------|----------------|
//! | `TransportFailure` | no response reached the client | calling screen |
//! | `ExpiredSession` | HTTP 401 | absorbed by the reauthentication layer |
//! | `Rejected` | other 4xx/5xx | calling screen |
//! | `RefreshFailure` | refresh failed or replay got 401 | forced sign-out |
//!
//! Channel failures are retried inside the realtime manager and live at the
//! channel seam as [`crate::traits::ChannelError`].

mod api;
mod category;
mod client;

pub use api::{ApiError, TransportKind};
pub use category::ErrorCategory;
pub use client::ClientError;

/// Type alias for results of the request layer.
pub type ApiResult<T> = Result<T, ApiError>;

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
