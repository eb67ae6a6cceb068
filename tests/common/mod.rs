//! Common test utilities for integration tests.
//!
//! # Example
//!
//! ```ignore
//! let server = MockServer::start().await;
//! let harness = TestClientBuilder::new(&server.uri())
//!     .signed_in(EXPIRED_TOKEN, REFRESH_TOKEN)
//!     .build();
//! ```
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use pocketbank::adapters::mock::{InMemoryStorage, MockConnector};
use pocketbank::adapters::ReqwestHttpClient;
use pocketbank::config::{ChannelConfig, ClientConfig};
use pocketbank::realtime::ChannelState;
use pocketbank::traits::StorageKey;
use pocketbank::BankClient;
use serde_json::{json, Value};

pub const EXPIRED_TOKEN: &str = "expired-access-token";
pub const FRESH_TOKEN: &str = "fresh-access-token";
pub const REFRESH_TOKEN: &str = "test-refresh-token";
pub const ROTATED_REFRESH_TOKEN: &str = "rotated-refresh-token";

/// Body the refresh endpoint returns on success.
pub fn refresh_body() -> Value {
    json!({
        "accessToken": FRESH_TOKEN,
        "refreshToken": ROTATED_REFRESH_TOKEN
    })
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

/// Client wired to real HTTP and mock storage and channel.
pub struct TestClient {
    pub client: BankClient,
    pub storage: InMemoryStorage,
    pub connector: MockConnector,
}

pub struct TestClientBuilder {
    config: ClientConfig,
    storage: InMemoryStorage,
}

impl TestClientBuilder {
    pub fn new(api_url: &str) -> Self {
        let channel = ChannelConfig::default()
            .with_url("ws://rt.test/ws")
            .with_backoff(Duration::from_millis(10), Duration::from_millis(50))
            .with_heartbeat(None);
        Self {
            config: ClientConfig::default()
                .with_api_url(api_url)
                .with_channel(channel),
            storage: InMemoryStorage::new(),
        }
    }

    /// Start with a stored credential pair.
    pub fn signed_in(self, access: &str, refresh: &str) -> Self {
        self.storage.set_value(StorageKey::AccessToken, Some(access));
        self.storage.set_value(StorageKey::RefreshToken, Some(refresh));
        self
    }

    pub fn config(mut self, f: impl FnOnce(ClientConfig) -> ClientConfig) -> Self {
        self.config = f(self.config);
        self
    }

    pub fn build(self) -> TestClient {
        let connector = MockConnector::new();
        let client = BankClient::new(
            self.config,
            Arc::new(ReqwestHttpClient::with_timeout(Duration::from_secs(5))),
            Arc::new(self.storage.clone()),
            Arc::new(connector.clone()),
        );
        TestClient {
            client,
            storage: self.storage,
            connector,
        }
    }
}

/// Wait until the channel reaches `target`, failing after `limit`.
pub async fn wait_for_channel(client: &BankClient, target: ChannelState, limit: Duration) {
    let mut rx = client.channel().subscribe();
    tokio::time::timeout(limit, async {
        while *rx.borrow_and_update() != target {
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("channel never reached {:?}", target));
}

/// Poll `check` until it holds, failing after `limit`.
pub async fn eventually(limit: Duration, mut check: impl FnMut() -> bool) {
    tokio::time::timeout(limit, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never became true");
}
