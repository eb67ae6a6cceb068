//! Realtime channel wire format.
//!
//! Frames are JSON text messages tagged by `type`. Server-pushed events
//! arrive as `{"type":"event","event":"<name>","data":{...}}` and are
//! decoded into [`ServerEvent`] by name.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const BALANCE_UPDATED: &str = "balance.updated";
pub const TRANSACTION_CREATED: &str = "transaction.created";
pub const NOTIFICATION_CREATED: &str = "notification.created";
pub const UNREAD_COUNT: &str = "notification.unread_count";
pub const SECURITY_ALERT: &str = "security.alert";

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Handshake carrying the bearer credential.
    Authenticate { token: String },
    Ping,
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Handshake accepted.
    Authenticated,
    /// Handshake rejected.
    AuthError {
        #[serde(default)]
        message: String,
    },
    Pong,
    Event {
        event: String,
        #[serde(default)]
        data: Value,
    },
}

impl ServerFrame {
    /// Build an event frame (used by tests and the debug tooling).
    pub fn event(name: &str, data: Value) -> Self {
        ServerFrame::Event {
            event: name.to_string(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceUpdate {
    pub account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionCreated {
    pub transaction_id: String,
    pub account_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationCreated {
    pub notification_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnreadCount {
    pub count: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    #[default]
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityAlert {
    #[serde(default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub severity: AlertSeverity,
    #[serde(default)]
    pub force_logout: bool,
}

impl SecurityAlert {
    /// Whether the alert asks for the session to end.
    pub fn requires_logout(&self) -> bool {
        self.force_logout || self.severity == AlertSeverity::Critical
    }
}

/// Decoded server-pushed event.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    BalanceUpdated(BalanceUpdate),
    TransactionCreated(TransactionCreated),
    NotificationCreated(NotificationCreated),
    UnreadCount(UnreadCount),
    SecurityAlert(SecurityAlert),
}

impl ServerEvent {
    /// Decode an event by name. Unknown names yield `Ok(None)`.
    pub fn decode(name: &str, data: Value) -> Result<Option<Self>, serde_json::Error> {
        let event = match name {
            BALANCE_UPDATED => ServerEvent::BalanceUpdated(serde_json::from_value(data)?),
            TRANSACTION_CREATED => ServerEvent::TransactionCreated(serde_json::from_value(data)?),
            NOTIFICATION_CREATED => {
                ServerEvent::NotificationCreated(serde_json::from_value(data)?)
            }
            UNREAD_COUNT => ServerEvent::UnreadCount(serde_json::from_value(data)?),
            SECURITY_ALERT => ServerEvent::SecurityAlert(serde_json::from_value(data)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::BalanceUpdated(_) => BALANCE_UPDATED,
            ServerEvent::TransactionCreated(_) => TRANSACTION_CREATED,
            ServerEvent::NotificationCreated(_) => NOTIFICATION_CREATED,
            ServerEvent::UnreadCount(_) => UNREAD_COUNT,
            ServerEvent::SecurityAlert(_) => SECURITY_ALERT,
        }
    }
}
