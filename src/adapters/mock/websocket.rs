//! Mock realtime channel for testing.
//!
//! [`MockConnector`] hands out in-memory transports following a script of
//! connection outcomes. Each accepted connection has a [`MockServerHandle`]
//! through which a test pushes server frames, inspects what the client
//! sent, and drops the connection.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::realtime::messages::{ClientFrame, ServerFrame};
use crate::traits::{ChannelConnector, ChannelError, ChannelTransport};

/// How the mock server answers the authentication handshake.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthReply {
    /// Reply `authenticated`
    Accept,
    /// Reply `auth_error` with the message
    Reject(String),
    /// Never reply
    Silent,
}

/// Scripted outcome of one connection attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectPlan {
    /// Fail the attempt
    Refuse,
    /// Open a connection with the given handshake behavior
    Open(AuthReply),
}

enum Push {
    Frame(ServerFrame),
    Drop,
}

/// Server side of one mock connection.
#[derive(Clone)]
pub struct MockServerHandle {
    tx: mpsc::UnboundedSender<Push>,
    sent: Arc<Mutex<Vec<ClientFrame>>>,
    closed: Arc<AtomicBool>,
}

impl MockServerHandle {
    /// Push a frame to the client.
    pub fn push(&self, frame: ServerFrame) {
        let _ = self.tx.send(Push::Frame(frame));
    }

    /// Push a named event to the client.
    pub fn push_event(&self, name: &str, data: serde_json::Value) {
        self.push(ServerFrame::event(name, data));
    }

    /// Close the connection from the server side.
    pub fn drop_connection(&self) {
        let _ = self.tx.send(Push::Drop);
    }

    /// Frames the client has sent on this connection.
    pub fn sent(&self) -> Vec<ClientFrame> {
        self.sent.lock().unwrap().clone()
    }

    /// Token carried by the first `authenticate` frame, if any.
    pub fn auth_token(&self) -> Option<String> {
        self.sent().into_iter().find_map(|frame| match frame {
            ClientFrame::Authenticate { token } => Some(token),
            ClientFrame::Ping => None,
        })
    }

    /// Whether the client closed this connection.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct MockTransport {
    rx: mpsc::UnboundedReceiver<Push>,
    tx: mpsc::UnboundedSender<Push>,
    sent: Arc<Mutex<Vec<ClientFrame>>>,
    closed: Arc<AtomicBool>,
    auth: AuthReply,
}

#[async_trait]
impl ChannelTransport for MockTransport {
    async fn send(&mut self, frame: ClientFrame) -> Result<(), ChannelError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::SendFailed("connection closed".to_string()));
        }
        self.sent.lock().unwrap().push(frame.clone());

        let reply = match (&frame, &self.auth) {
            (ClientFrame::Authenticate { .. }, AuthReply::Accept) => {
                Some(ServerFrame::Authenticated)
            }
            (ClientFrame::Authenticate { .. }, AuthReply::Reject(message)) => {
                Some(ServerFrame::AuthError {
                    message: message.clone(),
                })
            }
            (ClientFrame::Authenticate { .. }, AuthReply::Silent) => None,
            (ClientFrame::Ping, _) => Some(ServerFrame::Pong),
        };
        if let Some(reply) = reply {
            let _ = self.tx.send(Push::Frame(reply));
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<ServerFrame, ChannelError>> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        match self.rx.recv().await {
            Some(Push::Frame(frame)) => Some(Ok(frame)),
            Some(Push::Drop) | None => {
                self.closed.store(true, Ordering::SeqCst);
                None
            }
        }
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct ConnectorState {
    script: VecDeque<ConnectPlan>,
    urls: Vec<String>,
    servers: Vec<MockServerHandle>,
}

/// Mock [`ChannelConnector`].
///
/// Attempts follow the queued [`ConnectPlan`]s; once the script is empty
/// every attempt opens a connection that accepts the handshake. Clones
/// share state.
///
/// # Example
///
/// ```ignore
/// use pocketbank::adapters::mock::MockConnector;
///
/// let connector = MockConnector::new();
/// connector.refuse_next(2);
/// // ... third attempt succeeds
/// let server = connector.last_server().unwrap();
/// server.push_event("balance.updated", json!({"accountId": "acc-1"}));
/// ```
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a plan for the next unscripted attempt.
    pub fn push_plan(&self, plan: ConnectPlan) {
        self.state.lock().unwrap().script.push_back(plan);
    }

    /// Refuse the next `count` attempts.
    pub fn refuse_next(&self, count: usize) {
        for _ in 0..count {
            self.push_plan(ConnectPlan::Refuse);
        }
    }

    /// Number of connection attempts so far, refused ones included.
    pub fn attempt_count(&self) -> usize {
        self.state.lock().unwrap().urls.len()
    }

    /// URLs passed to each attempt.
    pub fn urls(&self) -> Vec<String> {
        self.state.lock().unwrap().urls.clone()
    }

    /// Number of connections actually opened.
    pub fn connection_count(&self) -> usize {
        self.state.lock().unwrap().servers.len()
    }

    /// Server handle for the `index`th opened connection.
    pub fn server(&self, index: usize) -> Option<MockServerHandle> {
        self.state.lock().unwrap().servers.get(index).cloned()
    }

    /// Server handle for the most recent connection.
    pub fn last_server(&self) -> Option<MockServerHandle> {
        self.state.lock().unwrap().servers.last().cloned()
    }
}

#[async_trait]
impl ChannelConnector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn ChannelTransport>, ChannelError> {
        let mut state = self.state.lock().unwrap();
        state.urls.push(url.to_string());

        let plan = state
            .script
            .pop_front()
            .unwrap_or(ConnectPlan::Open(AuthReply::Accept));
        let auth = match plan {
            ConnectPlan::Refuse => {
                return Err(ChannelError::ConnectionFailed(
                    "Mock connection refused".to_string(),
                ))
            }
            ConnectPlan::Open(auth) => auth,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        state.servers.push(MockServerHandle {
            tx: tx.clone(),
            sent: sent.clone(),
            closed: closed.clone(),
        });

        Ok(Box::new(MockTransport {
            rx,
            tx,
            sent,
            closed,
            auth,
        }))
    }
}
