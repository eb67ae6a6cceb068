//! Trait abstractions for dependency injection and testability.
//!
//! # Traits
//!
//! - [`HttpClient`] - HTTP request/response transport
//! - [`SecureStorage`] - Durable encrypted key/value storage
//! - [`ChannelConnector`] / [`ChannelTransport`] - Persistent realtime channel

pub mod credentials;
pub mod http;
pub mod websocket;

pub use credentials::{CredentialsError, SecureStorage, StorageKey};
pub use http::{Headers, HttpClient, HttpError, Method, Response};
pub use websocket::{ChannelConnector, ChannelError, ChannelTransport};
