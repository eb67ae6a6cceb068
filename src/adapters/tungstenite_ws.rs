//! Tungstenite-based realtime channel adapter.
//!
//! Frames are exchanged as JSON text messages. Malformed text frames are
//! logged and skipped; protocol pings are answered inline.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::realtime::messages::{ClientFrame, ServerFrame};
use crate::traits::{ChannelConnector, ChannelError, ChannelTransport};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Production [`ChannelConnector`] using tokio-tungstenite.
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector;

impl TungsteniteConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChannelConnector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn ChannelTransport>, ChannelError> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;
        info!("Connected to realtime channel at {}", url);
        Ok(Box::new(TungsteniteTransport { stream }))
    }
}

struct TungsteniteTransport {
    stream: WsStream,
}

/// Decode one text frame. `None` for anything that is not a known frame.
fn parse_frame(text: &str) -> Option<ServerFrame> {
    match serde_json::from_str::<ServerFrame>(text) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!("Failed to parse frame: {} - {}", e, text);
            None
        }
    }
}

#[async_trait]
impl ChannelTransport for TungsteniteTransport {
    async fn send(&mut self, frame: ClientFrame) -> Result<(), ChannelError> {
        let json =
            serde_json::to_string(&frame).map_err(|e| ChannelError::SendFailed(e.to_string()))?;
        self.stream
            .send(Message::Text(json))
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<ServerFrame, ChannelError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => {
                    if let Some(frame) = parse_frame(&text) {
                        return Some(Ok(frame));
                    }
                }
                Ok(Message::Ping(data)) => {
                    debug!("Received ping, sending pong");
                    let _ = self.stream.send(Message::Pong(data)).await;
                }
                Ok(Message::Close(_)) => {
                    info!("Received close frame from server");
                    return None;
                }
                Ok(_) => {}
                Err(e) => return Some(Err(ChannelError::ConnectionFailed(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
