//! Session lifecycle.
//!
//! [`Session`] is the one authentication state of the process. It is
//! initialized from the credential store at startup and changes only
//! through sign-in and sign-out. Consumers watch it instead of reading
//! globals: the channel manager connects and tears down with it and the
//! client facade resets the cache on every sign-out.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{info, warn};

use crate::auth::{CredentialStore, Credentials};
use crate::realtime::messages::SecurityAlert;
use crate::traits::CredentialsError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub user: Option<UserProfile>,
    pub authenticated: bool,
    /// True until the stored credentials have been read at startup
    pub loading: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    UserRequested,
    SessionExpired,
    SecurityAlert,
}

impl LogoutReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogoutReason::UserRequested => "user_requested",
            LogoutReason::SessionExpired => "session_expired",
            LogoutReason::SecurityAlert => "security_alert",
        }
    }
}

impl std::fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SignedIn,
    SignedOut { reason: LogoutReason },
}

/// Shared session handle. Clones observe and mutate the same state.
#[derive(Clone)]
pub struct Session {
    store: CredentialStore,
    state: Arc<watch::Sender<SessionState>>,
    events: broadcast::Sender<SessionEvent>,
    /// Bumped on every sign-out
    epoch: Arc<AtomicU64>,
    /// Serializes credential writes against sign-out
    writes: Arc<Mutex<()>>,
}

impl Session {
    pub fn new(store: CredentialStore) -> Self {
        let (state, _) = watch::channel(SessionState {
            user: None,
            authenticated: false,
            loading: true,
        });
        let (events, _) = broadcast::channel(16);
        Self {
            store,
            state: Arc::new(state),
            events,
            epoch: Arc::new(AtomicU64::new(0)),
            writes: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Read the stored pair and leave the loading state.
    pub async fn initialize(&self) -> SessionState {
        let authenticated = self.store.load().await.is_some();
        self.state.send_modify(|state| {
            state.authenticated = authenticated;
            state.loading = false;
            if !authenticated {
                state.user = None;
            }
        });
        info!(authenticated, "Session initialized");
        self.state()
    }

    /// Persist a fresh pair and enter the authenticated state.
    pub async fn sign_in(
        &self,
        credentials: &Credentials,
        user: Option<UserProfile>,
    ) -> Result<(), CredentialsError> {
        let _writes = self.writes.lock().await;
        self.store.save(credentials).await?;
        self.state.send_modify(|state| {
            state.authenticated = true;
            state.loading = false;
            state.user = user;
        });
        info!("Signed in");
        let _ = self.events.send(SessionEvent::SignedIn);
        Ok(())
    }

    /// Attach a profile to the authenticated session. Ignored when signed out.
    pub fn set_user(&self, user: UserProfile) -> bool {
        self.state.send_if_modified(|state| {
            if !state.authenticated {
                return false;
            }
            state.user = Some(user);
            true
        })
    }

    /// Explicit sign-out.
    pub async fn sign_out(&self, reason: LogoutReason) {
        info!(reason = %reason, "Signing out");
        self.end(reason).await;
    }

    /// Forced sign-out after the session could not be recovered.
    pub async fn expire(&self, reason: LogoutReason) {
        warn!(reason = %reason, "Session expired, forcing sign-out");
        self.end(reason).await;
    }

    /// Decide whether a pushed security alert ends the session.
    pub async fn handle_security_alert(&self, alert: &SecurityAlert) -> bool {
        if !alert.requires_logout() {
            info!(kind = %alert.kind, severity = ?alert.severity, "Security alert received");
            return false;
        }
        warn!(kind = %alert.kind, "Security alert requires sign-out");
        self.expire(LogoutReason::SecurityAlert).await;
        true
    }

    /// Sign-out generation. Work started under one epoch must not write
    /// credentials once it has moved on.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Persist a refreshed pair unless the session ended after `epoch`.
    ///
    /// Returns `Ok(false)` without writing when the pair belongs to a
    /// session that has since been signed out.
    pub async fn store_refreshed(
        &self,
        epoch: u64,
        credentials: &Credentials,
    ) -> Result<bool, CredentialsError> {
        let _writes = self.writes.lock().await;
        if self.epoch() != epoch {
            return Ok(false);
        }
        self.store.save(credentials).await?;
        Ok(true)
    }

    async fn end(&self, reason: LogoutReason) {
        {
            let _writes = self.writes.lock().await;
            self.epoch.fetch_add(1, Ordering::SeqCst);
            if let Err(e) = self.store.clear().await {
                warn!("Failed to clear credentials on sign-out: {}", e);
            }
        }
        let changed = self.state.send_if_modified(|state| {
            if !state.authenticated && !state.loading {
                return false;
            }
            *state = SessionState::default();
            true
        });
        if changed {
            let _ = self.events.send(SessionEvent::SignedOut { reason });
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().authenticated
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}
