//! Realtime channel.
//!
//! - [`messages`] - wire frames and decoded events
//! - [`sink`] - typed event delivery into the cache and session
//! - [`manager`] - connection lifecycle, handshake and reconnects

pub mod manager;
pub mod messages;
pub mod sink;

pub use manager::{ChannelManager, ChannelState};
pub use messages::{ClientFrame, ServerEvent, ServerFrame};
pub use sink::{CacheEventSink, EventSink, UnreadCounter};
