//! Authenticated request layer.
//!
//! - [`Dispatcher`] - one call with credentials and metadata headers
//! - [`ReauthCoordinator`] - single-flight refresh and replay on 401

pub mod dispatcher;
pub mod reauth;
pub mod request;

pub use dispatcher::Dispatcher;
pub use reauth::ReauthCoordinator;
pub use request::{ApiRequest, ApiResponse};
