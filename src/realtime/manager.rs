//! Persistent realtime channel.
//!
//! One background task owns the connection: it connects, authenticates
//! with the stored access token, pumps events into the [`EventSink`] and
//! reconnects with exponential backoff until the attempt budget is spent.
//! [`ChannelManager::follow_session`] ties the task to the session so that
//! signing out tears the connection down immediately.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::messages::{ClientFrame, ServerEvent, ServerFrame};
use super::sink::{deliver, EventSink};
use crate::auth::{CredentialKind, CredentialStore};
use crate::config::ChannelConfig;
use crate::session::Session;
use crate::traits::{ChannelConnector, ChannelError, ChannelTransport};

/// Connection state of the realtime channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Not connected (initial state, after sign-out and after giving up)
    Disconnected,
    Connecting,
    /// Connected, waiting for the server to accept the handshake
    Authenticating,
    Connected,
    /// Waiting before reconnect attempt `attempt`
    Reconnecting { attempt: u32 },
}

#[derive(Clone)]
pub struct ChannelManager {
    connector: Arc<dyn ChannelConnector>,
    store: CredentialStore,
    sink: Arc<dyn EventSink>,
    config: ChannelConfig,
    state: Arc<watch::Sender<ChannelState>>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
    /// Identifies the current run; state writes from older runs are dropped
    run_id: Arc<AtomicU64>,
}

impl ChannelManager {
    pub fn new(
        connector: Arc<dyn ChannelConnector>,
        store: CredentialStore,
        sink: Arc<dyn EventSink>,
        config: ChannelConfig,
    ) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        Self {
            connector,
            store,
            sink,
            config,
            state: Arc::new(state),
            task: Arc::new(Mutex::new(None)),
            run_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    /// Whether the connection task is alive (connected or retrying).
    pub fn is_running(&self) -> bool {
        self.lock_task().as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Start the connection task unless one is already running.
    pub fn connect(&self) {
        let mut task = self.lock_task();
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("Channel already running");
            return;
        }
        let run_id = self.run_id.fetch_add(1, Ordering::SeqCst) + 1;
        let this = self.clone();
        *task = Some(tokio::spawn(async move { this.run(run_id).await }));
    }

    /// Tear the connection down now, whatever state it is in.
    pub fn disconnect(&self) {
        let handle = self.lock_task().take();
        self.run_id.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = handle {
            handle.abort();
            info!("Realtime channel torn down");
        }
        self.state.send_if_modified(|state| {
            if *state == ChannelState::Disconnected {
                return false;
            }
            *state = ChannelState::Disconnected;
            true
        });
    }

    /// Manual reconnect with a fresh attempt budget.
    pub fn reconnect(&self) {
        self.disconnect();
        self.connect();
    }

    /// Connect when the session becomes authenticated and disconnect as
    /// soon as it is not. Other session changes, such as a profile update,
    /// leave the channel alone so an exhausted retry budget stays spent.
    /// Runs until the session is dropped.
    pub fn follow_session(&self, session: &Session) -> JoinHandle<()> {
        let mut rx = session.subscribe();
        let manager = self.clone();
        tokio::spawn(async move {
            let mut was_authenticated = false;
            loop {
                let authenticated = rx.borrow_and_update().authenticated;
                if !authenticated {
                    manager.disconnect();
                } else if !was_authenticated {
                    manager.connect();
                }
                was_authenticated = authenticated;
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    fn lock_task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, run_id: u64, next: ChannelState) {
        if self.run_id.load(Ordering::SeqCst) != run_id {
            return;
        }
        self.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            debug!(from = ?*state, to = ?next, "Channel state");
            *state = next;
            true
        });
    }

    async fn run(&self, run_id: u64) {
        let mut attempt: u32 = 0;
        loop {
            if attempt > 0 {
                if attempt > self.config.max_attempts {
                    error!(
                        attempts = self.config.max_attempts,
                        "Realtime channel reconnect budget exhausted, giving up"
                    );
                    self.set_state(run_id, ChannelState::Disconnected);
                    return;
                }
                let delay = self.config.backoff_delay(attempt);
                info!(
                    attempt,
                    max = self.config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Reconnecting realtime channel"
                );
                self.set_state(run_id, ChannelState::Reconnecting { attempt });
                tokio::time::sleep(delay).await;
            }

            self.set_state(run_id, ChannelState::Connecting);
            match self.run_connection(run_id, &mut attempt).await {
                Ok(()) => info!("Realtime channel closed by server"),
                Err(e) => warn!(attempt, "Realtime channel failure: {}", e),
            }
            attempt += 1;
        }
    }

    /// One connection from connect to close. Resets `attempt` once the
    /// handshake succeeds.
    async fn run_connection(&self, run_id: u64, attempt: &mut u32) -> Result<(), ChannelError> {
        let token = self
            .store
            .get(CredentialKind::Access)
            .await
            .ok_or(ChannelError::NotAuthenticated)?;

        let mut transport = self.connector.connect(&self.config.url).await?;
        self.set_state(run_id, ChannelState::Authenticating);

        let handshake = async {
            transport.send(ClientFrame::Authenticate { token }).await?;
            await_authenticated(transport.as_mut()).await
        };
        let result = match tokio::time::timeout(self.config.auth_timeout, handshake).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout("authentication".to_string())),
        };
        if let Err(e) = result {
            transport.close().await;
            return Err(e);
        }

        *attempt = 0;
        self.set_state(run_id, ChannelState::Connected);
        info!("Realtime channel authenticated");

        let result = self.pump(transport.as_mut()).await;
        transport.close().await;
        match result {
            Err(ChannelError::Disconnected) => Ok(()),
            other => other,
        }
    }

    async fn pump(&self, transport: &mut dyn ChannelTransport) -> Result<(), ChannelError> {
        let heartbeat = self.config.heartbeat_interval;
        let mut ticker = heartbeat.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        let mut last_seen = Instant::now();

        loop {
            tokio::select! {
                frame = transport.recv() => match frame {
                    Some(Ok(frame)) => {
                        last_seen = Instant::now();
                        self.handle_frame(frame).await?;
                    }
                    Some(Err(e)) => return Err(e),
                    None => return Err(ChannelError::Disconnected),
                },
                _ = tick(&mut ticker) => {
                    let period = heartbeat.unwrap_or(Duration::MAX);
                    if last_seen.elapsed() >= period.saturating_mul(2) {
                        return Err(ChannelError::Timeout("no frames from server".to_string()));
                    }
                    transport.send(ClientFrame::Ping).await?;
                }
            }
        }
    }

    async fn handle_frame(&self, frame: ServerFrame) -> Result<(), ChannelError> {
        match frame {
            ServerFrame::Event { event, data } => match ServerEvent::decode(&event, data) {
                Ok(Some(decoded)) => {
                    debug!(event = decoded.name(), "Delivering event");
                    deliver(self.sink.as_ref(), decoded).await;
                }
                Ok(None) => debug!(event = %event, "Ignoring unknown event"),
                Err(e) => warn!(event = %event, "Malformed event payload: {}", e),
            },
            ServerFrame::Pong => debug!("Heartbeat acknowledged"),
            ServerFrame::Authenticated => debug!("Duplicate authentication ack"),
            ServerFrame::AuthError { message } => return Err(ChannelError::AuthRejected(message)),
        }
        Ok(())
    }
}

/// Wait for the server to accept the handshake.
async fn await_authenticated(transport: &mut dyn ChannelTransport) -> Result<(), ChannelError> {
    loop {
        match transport.recv().await {
            Some(Ok(ServerFrame::Authenticated)) => return Ok(()),
            Some(Ok(ServerFrame::AuthError { message })) => {
                return Err(ChannelError::AuthRejected(message))
            }
            Some(Ok(other)) => debug!(frame = ?other, "Frame before authentication ignored"),
            Some(Err(e)) => return Err(e),
            None => return Err(ChannelError::Disconnected),
        }
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
