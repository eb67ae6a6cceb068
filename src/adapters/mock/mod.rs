//! Mock implementations for testing.
//!
//! This module provides mock implementations of all trait abstractions,
//! enabling unit testing without network dependencies or file system access.
//!
//! # Available Mocks
//!
//! - [`MockHttpClient`] - HTTP client with configurable responses
//! - [`MockConnector`] - Scripted realtime channel connections
//! - [`InMemoryStorage`] - In-memory secure storage

pub mod http;
pub mod storage;
pub mod websocket;

pub use http::{MockHttpClient, MockResponse, RecordedRequest};
pub use storage::InMemoryStorage;
pub use websocket::{AuthReply, ConnectPlan, MockConnector, MockServerHandle};
