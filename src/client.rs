//! Client facade wiring every component together.
//!
//! ```text
//! CredentialStore ─► Dispatcher ─► ReauthCoordinator ─► TaggedCache
//!        │                               │                   ▲
//!        └──────────► Session ◄──────────┘                   │
//!                        │                                   │
//!                        └─► ChannelManager ─► CacheEventSink┘
//! ```

use serde::Deserialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::adapters::{EncryptedFileStorage, ReqwestHttpClient, TungsteniteConnector};
use crate::api::{ApiRequest, Dispatcher, ReauthCoordinator};
use crate::auth::{CredentialStore, Credentials};
use crate::cache::{Query, Tag, TaggedCache};
use crate::config::ClientConfig;
use crate::error::{ApiResult, ClientError};
use crate::realtime::{CacheEventSink, ChannelManager, UnreadCounter};
use crate::session::{LogoutReason, Session, SessionEvent, SessionState, UserProfile};
use crate::traits::{ChannelConnector, HttpClient, SecureStorage};

/// Body of a successful login.
#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(flatten)]
    credentials: Credentials,
    #[serde(default)]
    user: Option<UserProfile>,
}

pub struct BankClient {
    config: ClientConfig,
    store: CredentialStore,
    session: Session,
    coordinator: ReauthCoordinator,
    cache: TaggedCache,
    channel: ChannelManager,
    unread: UnreadCounter,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BankClient {
    pub fn new(
        config: ClientConfig,
        http: Arc<dyn HttpClient>,
        storage: Arc<dyn SecureStorage>,
        connector: Arc<dyn ChannelConnector>,
    ) -> Self {
        let store = CredentialStore::new(storage);
        let session = Session::new(store.clone());
        let dispatcher = Dispatcher::new(http, store.clone(), config.api.clone());
        let coordinator = ReauthCoordinator::new(dispatcher, session.clone());
        let cache = TaggedCache::new(config.cache.clone());
        let unread = UnreadCounter::new();
        let sink = CacheEventSink::new(cache.clone(), unread.clone(), session.clone());
        let channel = ChannelManager::new(
            connector,
            store.clone(),
            Arc::new(sink),
            config.channel.clone(),
        );

        Self {
            config,
            store,
            session,
            coordinator,
            cache,
            channel,
            unread,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Client with the production adapters.
    pub fn with_defaults(config: ClientConfig) -> Result<Self, ClientError> {
        let storage = match &config.storage_dir {
            Some(dir) => EncryptedFileStorage::new(dir),
            None => EncryptedFileStorage::default_location().ok_or_else(|| {
                ClientError::NoStorageLocation("home directory not found".to_string())
            })?,
        };
        let http = ReqwestHttpClient::with_timeout(config.api.request_timeout);
        Ok(Self::new(
            config,
            Arc::new(http),
            Arc::new(storage),
            Arc::new(TungsteniteConnector::new()),
        ))
    }

    /// Load the session, reset the cache on every sign-out and let the
    /// channel follow the session.
    pub async fn start(&self) -> SessionState {
        let state = self.session.initialize().await;

        let mut events = self.session.events();
        let cache = self.cache.clone();
        let unread = self.unread.clone();
        let reset = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::SignedOut { reason }) => {
                        info!(reason = %reason, "Dropping cached data after sign-out");
                        cache.reset();
                        unread.set(0);
                    }
                    Ok(SessionEvent::SignedIn) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Missed session events");
                        cache.reset();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        let follow = self.channel.follow_session(&self.session);

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.push(reset);
        tasks.push(follow);
        state
    }

    /// Exchange `body` for credentials and sign in.
    pub async fn login(&self, body: Value) -> Result<SessionState, ClientError> {
        let request = ApiRequest::post(self.config.api.login_path.clone())
            .json(body)
            .unauthenticated();
        let response: LoginResponse = self.coordinator.send_json(&request).await?;
        self.session
            .sign_in(&response.credentials, response.user)
            .await?;
        Ok(self.session.state())
    }

    /// Tell the server (best effort) and sign out locally.
    pub async fn logout(&self) {
        let request = ApiRequest::post(self.config.api.logout_path.clone());
        if let Err(e) = self.coordinator.dispatcher().send(&request).await {
            warn!(code = e.error_code(), "Server logout failed: {}", e);
        }
        self.session.sign_out(LogoutReason::UserRequested).await;
        self.cache.reset();
        self.unread.set(0);
    }

    /// Cacheable read of `request`, providing `tags`.
    pub fn query_for(&self, request: ApiRequest, tags: Vec<Tag>) -> Query {
        let key = format!("{} {}", request.method, request.path_and_query());
        let coordinator = self.coordinator.clone();
        let request = Arc::new(request);
        Query::new(key, move || {
            let coordinator = coordinator.clone();
            let request = request.clone();
            async move { Ok(coordinator.send(&request).await?.data) }
        })
        .provides(tags)
    }

    /// Read through the cache.
    pub async fn query(&self, request: ApiRequest, tags: Vec<Tag>) -> ApiResult<Value> {
        let query = self.query_for(request, tags);
        self.cache.read(&query).await
    }

    /// Send a mutation and invalidate `invalidates` once it succeeds.
    pub async fn mutate(&self, request: ApiRequest, invalidates: &[Tag]) -> ApiResult<Value> {
        let coordinator = &self.coordinator;
        self.cache
            .mutate(
                async move { Ok(coordinator.send(&request).await?.data) },
                invalidates,
            )
            .await
    }

    /// Stop background tasks and close the channel.
    pub fn shutdown(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            task.abort();
        }
        self.channel.disconnect();
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn coordinator(&self) -> &ReauthCoordinator {
        &self.coordinator
    }

    pub fn cache(&self) -> &TaggedCache {
        &self.cache
    }

    pub fn channel(&self) -> &ChannelManager {
        &self.channel
    }

    pub fn unread(&self) -> &UnreadCounter {
        &self.unread
    }
}

impl Drop for BankClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{InMemoryStorage, MockConnector, MockHttpClient, MockResponse};
    use crate::cache::tag::ACCOUNTS;
    use crate::realtime::ChannelState;
    use crate::traits::StorageKey;
    use serde_json::json;
    use std::time::Duration;

    const BASE: &str = "http://api.test";

    struct Harness {
        client: BankClient,
        http: MockHttpClient,
        storage: InMemoryStorage,
        connector: MockConnector,
    }

    fn harness() -> Harness {
        let http = MockHttpClient::new();
        let storage = InMemoryStorage::new();
        let connector = MockConnector::new();
        let config = ClientConfig::default()
            .with_api_url(BASE)
            .with_ws_url("ws://rt.test/ws");
        let client = BankClient::new(
            config,
            Arc::new(http.clone()),
            Arc::new(storage.clone()),
            Arc::new(connector.clone()),
        );
        Harness {
            client,
            http,
            storage,
            connector,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_connects_channel() {
        let h = harness();
        h.http.set_response(
            "http://api.test/auth/login",
            MockResponse::json(
                200,
                json!({
                    "accessToken": "a-1",
                    "refreshToken": "r-1",
                    "user": {"id": "user-1", "name": "Ada"}
                }),
            ),
        );
        assert!(!h.client.start().await.authenticated);

        let state = h
            .client
            .login(json!({"phone": "+15550100", "pin": "0000"}))
            .await
            .unwrap();

        assert!(state.authenticated);
        assert_eq!(state.user.unwrap().id, "user-1");
        assert_eq!(h.storage.value(StorageKey::AccessToken).as_deref(), Some("a-1"));

        let mut rx = h.client.channel().subscribe();
        while *rx.borrow_and_update() != ChannelState::Connected {
            rx.changed().await.unwrap();
        }
        assert_eq!(
            h.connector.last_server().unwrap().auth_token().as_deref(),
            Some("a-1")
        );
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let h = harness();
        h.http
            .set_response("http://api.test/auth/login", MockResponse::status(403));
        h.client.start().await;

        let err = h.client.login(json!({})).await.unwrap_err();

        assert_eq!(err.as_api().and_then(|e| e.status()), Some(403));
        assert!(!h.client.session().is_authenticated());
    }

    #[tokio::test]
    async fn test_query_and_mutate() {
        let h = harness();
        h.storage.set_value(StorageKey::AccessToken, Some("a-1"));
        h.storage.set_value(StorageKey::RefreshToken, Some("r-1"));
        h.http.set_response(
            "http://api.test/accounts",
            MockResponse::json(200, json!([{"id": "acc-1"}])),
        );
        h.http.set_response(
            "http://api.test/transfers",
            MockResponse::json(201, json!({"id": "tr-1"})),
        );

        let tags = vec![Tag::list(ACCOUNTS)];
        h.client
            .query(ApiRequest::get("/accounts"), tags.clone())
            .await
            .unwrap();
        h.client
            .query(ApiRequest::get("/accounts"), tags.clone())
            .await
            .unwrap();
        assert_eq!(h.http.request_count("http://api.test/accounts"), 1);

        let created = h
            .client
            .mutate(
                ApiRequest::post("/transfers").json(json!({"amount": 5})),
                &[Tag::list(ACCOUNTS)],
            )
            .await
            .unwrap();
        assert_eq!(created["id"], "tr-1");

        h.client
            .query(ApiRequest::get("/accounts"), tags)
            .await
            .unwrap();
        assert_eq!(h.http.request_count("http://api.test/accounts"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_clears_everything() {
        let h = harness();
        h.storage.set_value(StorageKey::AccessToken, Some("a-1"));
        h.storage.set_value(StorageKey::RefreshToken, Some("r-1"));
        h.http.set_default_response(MockResponse::json(200, json!([])));
        h.client.start().await;
        h.client
            .query(ApiRequest::get("/accounts"), vec![])
            .await
            .unwrap();
        h.client.unread().set(3);

        h.client.logout().await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(!h.client.session().is_authenticated());
        assert!(h.client.cache().is_empty());
        assert_eq!(h.client.unread().get(), 0);
        assert!(h.storage.value(StorageKey::AccessToken).is_none());
        assert_eq!(h.client.channel().state(), ChannelState::Disconnected);
        assert_eq!(h.http.request_count("http://api.test/auth/logout"), 1);
    }
}
