//! Concrete implementations of trait abstractions.
//!
//! Production adapters for the traits defined in `crate::traits`, plus
//! test doubles under [`mock`].
//!
//! # Adapters
//!
//! - [`ReqwestHttpClient`] - HTTP client using reqwest
//! - [`TungsteniteConnector`] - Realtime channel using tokio-tungstenite
//! - [`EncryptedFileStorage`] - AES-GCM encrypted file storage
//!
//! # Mock Implementations
//!
//! - [`mock::MockHttpClient`] - Configurable HTTP responses
//! - [`mock::MockConnector`] - Scripted channel connections
//! - [`mock::InMemoryStorage`] - In-memory secure storage

pub mod file_storage;
pub mod mock;
pub mod reqwest_http;
pub mod tungstenite_ws;

pub use file_storage::EncryptedFileStorage;
pub use mock::{InMemoryStorage, MockConnector, MockHttpClient};
pub use reqwest_http::ReqwestHttpClient;
pub use tungstenite_ws::TungsteniteConnector;
