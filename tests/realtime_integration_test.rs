//! End-to-end tests for pushed events keeping the cache consistent.
//!
//! The client runs against the mock HTTP client and the scripted mock
//! channel, so every step from server push to refetch is observable.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use pocketbank::adapters::mock::{InMemoryStorage, MockConnector, MockHttpClient, MockResponse};
use pocketbank::api::ApiRequest;
use pocketbank::cache::tag::{ACCOUNTS, NOTIFICATIONS, TRANSACTIONS};
use pocketbank::cache::{Freshness, Tag};
use pocketbank::config::{ChannelConfig, ClientConfig};
use pocketbank::realtime::messages::{
    BALANCE_UPDATED, NOTIFICATION_CREATED, SECURITY_ALERT, TRANSACTION_CREATED, UNREAD_COUNT,
};
use pocketbank::realtime::ChannelState;
use pocketbank::session::UserProfile;
use pocketbank::traits::StorageKey;
use pocketbank::BankClient;
use serde_json::json;

const API: &str = "http://api.test";
const LIMIT: Duration = Duration::from_secs(2);

struct Fixture {
    client: BankClient,
    http: MockHttpClient,
    storage: InMemoryStorage,
    connector: MockConnector,
}

async fn connected_fixture() -> Fixture {
    let http = MockHttpClient::new();
    http.set_default_response(MockResponse::json(200, json!({"ok": true})));
    let storage = InMemoryStorage::new();
    storage.set_value(StorageKey::AccessToken, Some(FRESH_TOKEN));
    storage.set_value(StorageKey::RefreshToken, Some(REFRESH_TOKEN));
    let connector = MockConnector::new();

    let channel = ChannelConfig::default()
        .with_url("ws://rt.test/ws")
        .with_backoff(Duration::from_millis(10), Duration::from_millis(40))
        .with_heartbeat(None);
    let client = BankClient::new(
        ClientConfig::default().with_api_url(API).with_channel(channel),
        Arc::new(http.clone()),
        Arc::new(storage.clone()),
        Arc::new(connector.clone()),
    );
    client.start().await;
    wait_for_channel(&client, ChannelState::Connected, LIMIT).await;

    Fixture {
        client,
        http,
        storage,
        connector,
    }
}

fn url(path: &str) -> String {
    format!("{}{}", API, path)
}

#[tokio::test]
async fn test_channel_authenticates_with_stored_token() {
    let f = connected_fixture().await;
    let server = f.connector.last_server().unwrap();
    assert_eq!(server.auth_token().as_deref(), Some(FRESH_TOKEN));
    assert_eq!(f.connector.urls(), vec!["ws://rt.test/ws".to_string()]);
}

#[tokio::test]
async fn test_balance_event_refetches_subscribed_account() {
    let f = connected_fixture().await;
    let query = f.client.query_for(
        ApiRequest::get("/accounts/acc-1"),
        vec![Tag::item(ACCOUNTS, "acc-1")],
    );
    let other = f.client.query_for(
        ApiRequest::get("/accounts/acc-2"),
        vec![Tag::item(ACCOUNTS, "acc-2")],
    );
    let _subscription = f.client.cache().subscribe(&query);
    f.client.cache().read(&other).await.unwrap();
    eventually(LIMIT, || f.http.request_count(&url("/accounts/acc-1")) == 1).await;

    f.connector
        .last_server()
        .unwrap()
        .push_event(BALANCE_UPDATED, json!({"accountId": "acc-1", "currency": "EUR"}));

    eventually(LIMIT, || f.http.request_count(&url("/accounts/acc-1")) == 2).await;
    assert_eq!(f.http.request_count(&url("/accounts/acc-2")), 1);
    assert_eq!(
        f.client.cache().snapshot(other.key()).unwrap().freshness,
        Freshness::Fresh
    );
}

#[tokio::test]
async fn test_transaction_event_marks_lists_stale() {
    let f = connected_fixture().await;
    let history = f.client.query_for(
        ApiRequest::get("/transactions").query("account", "acc-1"),
        vec![Tag::list(TRANSACTIONS), Tag::item(TRANSACTIONS, "acc-1")],
    );
    f.client.cache().read(&history).await.unwrap();

    f.connector.last_server().unwrap().push_event(
        TRANSACTION_CREATED,
        json!({"transactionId": "tx-9", "accountId": "acc-1"}),
    );

    let cache = f.client.cache().clone();
    let key = history.key().to_string();
    eventually(LIMIT, || {
        cache.snapshot(&key).map(|s| s.freshness) == Some(Freshness::Stale)
    })
    .await;

    f.client.cache().read(&history).await.unwrap();
    assert_eq!(f.http.request_count(&url("/transactions")), 2);
}

#[tokio::test]
async fn test_unread_count_and_notifications() {
    let f = connected_fixture().await;
    let inbox = f.client.query_for(
        ApiRequest::get("/notifications"),
        vec![Tag::list(NOTIFICATIONS)],
    );
    f.client.cache().read(&inbox).await.unwrap();
    let server = f.connector.last_server().unwrap();

    server.push_event(UNREAD_COUNT, json!({"count": 4}));
    server.push_event(
        NOTIFICATION_CREATED,
        json!({"notificationId": "n-1", "title": "Salary received"}),
    );

    let unread = f.client.unread().clone();
    eventually(LIMIT, || unread.get() == 4).await;
    let cache = f.client.cache().clone();
    let key = inbox.key().to_string();
    eventually(LIMIT, || {
        cache.snapshot(&key).map(|s| s.freshness) == Some(Freshness::Stale)
    })
    .await;
}

#[tokio::test]
async fn test_unknown_and_malformed_events_are_skipped() {
    let f = connected_fixture().await;
    let server = f.connector.last_server().unwrap();

    server.push_event("loyalty.points_awarded", json!({"points": 10}));
    server.push_event(UNREAD_COUNT, json!({"count": "many"}));
    server.push_event(UNREAD_COUNT, json!({"count": 7}));

    let unread = f.client.unread().clone();
    eventually(LIMIT, || unread.get() == 7).await;
    assert_eq!(f.client.channel().state(), ChannelState::Connected);
}

#[tokio::test]
async fn test_dropped_connection_reconnects_and_keeps_delivering() {
    let f = connected_fixture().await;
    f.connector.last_server().unwrap().drop_connection();

    let connector = f.connector.clone();
    eventually(LIMIT, || connector.connection_count() == 2).await;
    wait_for_channel(&f.client, ChannelState::Connected, LIMIT).await;

    f.connector
        .last_server()
        .unwrap()
        .push_event(UNREAD_COUNT, json!({"count": 1}));
    let unread = f.client.unread().clone();
    eventually(LIMIT, || unread.get() == 1).await;
}

#[tokio::test]
async fn test_security_alert_forces_logout() {
    let f = connected_fixture().await;
    f.client
        .query(ApiRequest::get("/accounts"), vec![Tag::list(ACCOUNTS)])
        .await
        .unwrap();
    f.client.unread().set(2);
    let server = f.connector.last_server().unwrap();

    server.push_event(
        SECURITY_ALERT,
        json!({
            "kind": "new_device_login",
            "message": "Signed in on another device",
            "severity": "critical",
            "forceLogout": true
        }),
    );

    let session = f.client.session().clone();
    eventually(LIMIT, || !session.is_authenticated()).await;
    wait_for_channel(&f.client, ChannelState::Disconnected, LIMIT).await;
    eventually(LIMIT, || f.client.cache().is_empty()).await;
    assert_eq!(f.client.unread().get(), 0);
    assert!(f.storage.value(StorageKey::AccessToken).is_none());
    eventually(LIMIT, || server.is_closed()).await;
}

#[tokio::test]
async fn test_informational_alert_keeps_session() {
    let f = connected_fixture().await;
    f.connector.last_server().unwrap().push_event(
        SECURITY_ALERT,
        json!({"kind": "password_changed", "message": "Password updated"}),
    );
    f.connector
        .last_server()
        .unwrap()
        .push_event(UNREAD_COUNT, json!({"count": 3}));

    let unread = f.client.unread().clone();
    eventually(LIMIT, || unread.get() == 3).await;
    assert!(f.client.session().is_authenticated());
}

#[tokio::test]
async fn test_profile_update_after_giving_up_stays_disconnected() {
    let http = MockHttpClient::new();
    let storage = InMemoryStorage::new();
    storage.set_value(StorageKey::AccessToken, Some(FRESH_TOKEN));
    storage.set_value(StorageKey::RefreshToken, Some(REFRESH_TOKEN));
    let connector = MockConnector::new();
    connector.refuse_next(100);

    let channel = ChannelConfig::default()
        .with_url("ws://rt.test/ws")
        .with_backoff(Duration::from_millis(10), Duration::from_millis(20))
        .with_max_attempts(1)
        .with_heartbeat(None);
    let client = BankClient::new(
        ClientConfig::default().with_api_url(API).with_channel(channel),
        Arc::new(http),
        Arc::new(storage),
        Arc::new(connector.clone()),
    );
    client.start().await;

    eventually(LIMIT, || connector.attempt_count() == 2).await;
    wait_for_channel(&client, ChannelState::Disconnected, LIMIT).await;

    assert!(client.session().set_user(UserProfile {
        id: "user-1".to_string(),
        name: Some("Ada".to_string()),
        phone: None,
    }));
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(connector.attempt_count(), 2);
    assert_eq!(client.channel().state(), ChannelState::Disconnected);
}
