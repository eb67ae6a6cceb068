//! Expired-session recovery around the dispatcher.
//!
//! A 401 from the dispatcher starts (or joins) the one refresh that may be
//! in flight, then replays the failed request once with the new access
//! token. The refresh itself runs in a spawned task held in a single slot,
//! so it completes even if every caller waiting on it goes away.

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

use super::dispatcher::Dispatcher;
use super::request::{ApiRequest, ApiResponse};
use crate::auth::{CredentialKind, Credentials};
use crate::error::{panic_message, ApiError, ApiResult};
use crate::session::{LogoutReason, Session};

/// Resolves to the new access token, or the reason the refresh failed.
type RefreshFuture = Shared<BoxFuture<'static, Result<String, String>>>;

struct RefreshTicket {
    id: u64,
    future: RefreshFuture,
}

#[derive(Clone)]
pub struct ReauthCoordinator {
    dispatcher: Dispatcher,
    session: Session,
    ticket: Arc<Mutex<Option<RefreshTicket>>>,
    refreshes: Arc<AtomicU64>,
}

impl ReauthCoordinator {
    pub fn new(dispatcher: Dispatcher, session: Session) -> Self {
        Self {
            dispatcher,
            session,
            ticket: Arc::new(Mutex::new(None)),
            refreshes: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Number of refresh calls started since creation.
    pub fn refreshes_started(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Whether a refresh is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        self.lock_ticket().is_some()
    }

    /// Send a request, recovering from one expired session.
    ///
    /// Errors other than an expired session pass through untouched. If the
    /// refresh fails, or the replayed request is rejected again with 401,
    /// the session is expired and [`ApiError::RefreshFailure`] is returned.
    pub async fn send(&self, request: &ApiRequest) -> ApiResult<ApiResponse> {
        if !request.authenticated {
            return self.dispatcher.send(request).await;
        }

        let sent_token = self.dispatcher.store().get(CredentialKind::Access).await;
        let original = match self
            .dispatcher
            .send_with_token(request, sent_token.as_deref())
            .await
        {
            Err(e) if e.is_expired_session() => e,
            other => return other,
        };

        let token = self.recover(sent_token.as_deref(), &original).await?;

        match self.dispatcher.send_with_token(request, Some(&token)).await {
            Err(e) if e.is_expired_session() => {
                warn!(path = %request.path, "Request rejected again after refresh");
                self.session.expire(LogoutReason::SessionExpired).await;
                Err(ApiError::refresh_failure(
                    Some(401),
                    "request rejected with refreshed credentials",
                ))
            }
            other => other,
        }
    }

    /// Send and deserialize the response body.
    pub async fn send_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> ApiResult<T> {
        self.send(request).await?.into_json()
    }

    /// Obtain a token to replay with after `original` came back as 401.
    async fn recover(&self, sent_token: Option<&str>, original: &ApiError) -> ApiResult<String> {
        if let Some(current) = self.dispatcher.store().get(CredentialKind::Access).await {
            if sent_token != Some(current.as_str()) {
                debug!("Credentials changed since the request was sent, replaying");
                return Ok(current);
            }
        }

        self.join_refresh()
            .await
            .map_err(|message| ApiError::refresh_failure(original.status(), message))
    }

    /// The outstanding refresh, or a newly started one.
    fn join_refresh(&self) -> RefreshFuture {
        let mut slot = self.lock_ticket();
        if let Some(ticket) = slot.as_ref() {
            debug!(ticket = ticket.id, "Joining in-flight refresh");
            return ticket.future.clone();
        }

        let id = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        let this = self.clone();
        let handle = tokio::spawn(async move {
            let result = match AssertUnwindSafe(this.refresh()).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => {
                    let message = format!("refresh panicked: {}", panic_message(&*panic));
                    error!("{}", message);
                    this.session.expire(LogoutReason::SessionExpired).await;
                    Err(message)
                }
            };
            this.release(id);
            result
        });
        let this = self.clone();
        let future = async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => {
                    this.release(id);
                    Err(format!("refresh task failed: {}", e))
                }
            }
        }
        .boxed()
        .shared();

        *slot = Some(RefreshTicket {
            id,
            future: future.clone(),
        });
        future
    }

    fn release(&self, id: u64) {
        let mut slot = self.lock_ticket();
        if slot.as_ref().is_some_and(|t| t.id == id) {
            *slot = None;
        }
    }

    fn lock_ticket(&self) -> std::sync::MutexGuard<'_, Option<RefreshTicket>> {
        self.ticket.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn refresh(&self) -> Result<String, String> {
        let epoch = self.session.epoch();
        match self.try_refresh(epoch).await {
            Ok(credentials) => {
                info!("Session refreshed");
                Ok(credentials.access_token)
            }
            Err(message) if self.session.epoch() != epoch => {
                info!("Session ended during refresh: {}", message);
                Err(message)
            }
            Err(message) => {
                error!("Session refresh failed: {}", message);
                self.session.expire(LogoutReason::SessionExpired).await;
                Err(message)
            }
        }
    }

    async fn try_refresh(&self, epoch: u64) -> Result<Credentials, String> {
        let refresh_token = self
            .dispatcher
            .store()
            .get(CredentialKind::Refresh)
            .await
            .ok_or_else(|| "no refresh token stored".to_string())?;

        info!("Refreshing session credentials");
        let request = ApiRequest::post(self.dispatcher.config().refresh_path.clone())
            .json(json!({ "refreshToken": refresh_token }))
            .unauthenticated();

        let credentials: Credentials = self
            .dispatcher
            .send(&request)
            .await
            .and_then(ApiResponse::into_json)
            .map_err(|e| e.to_string())?;

        let stored = self
            .session
            .store_refreshed(epoch, &credentials)
            .await
            .map_err(|e| format!("failed to persist refreshed credentials: {}", e))?;
        if !stored {
            return Err("signed out during refresh".to_string());
        }
        Ok(credentials)
    }
}
