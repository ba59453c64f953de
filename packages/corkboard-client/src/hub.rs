/// WebSocket transport for the board push hub.
///
/// Each `connect` opens a fresh socket, performs the JSON hub handshake and
/// joins the requested scope. The returned connection sends keepalives and
/// surfaces `BoardUpdated` / `DashboardUpdated` invocations. Socket-level
/// pings are answered by tungstenite itself.
use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use corkboard_core::hub::{handshake_request, parse_handshake, HubMessage, PushEvent, JOIN_INVOCATION_ID};
use corkboard_core::realtime::{PushConnection, PushTransport};
use corkboard_core::{Scope, SyncError};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const TARGET: &str = "corkboard.hub";
const KEEPALIVE: Duration = Duration::from_secs(15);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct SignalRTransport {
    hub_url: String,
}

impl SignalRTransport {
    pub fn new(hub_url: impl Into<String>) -> Self {
        Self {
            hub_url: hub_url.into(),
        }
    }
}

fn connect_error(e: tungstenite::Error) -> SyncError {
    match e {
        tungstenite::Error::Http(response) if response.status().as_u16() == 429 => {
            SyncError::RateLimited
        }
        tungstenite::Error::Http(response) => {
            SyncError::ChannelDisconnected(format!("upgrade refused with {}", response.status()))
        }
        other => SyncError::ChannelDisconnected(other.to_string()),
    }
}

fn channel_error(e: impl std::fmt::Display) -> SyncError {
    SyncError::ChannelDisconnected(e.to_string())
}

pub struct HubConnection {
    sink: SplitSink<Socket, Message>,
    stream: SplitStream<Socket>,
    inbox: VecDeque<HubMessage>,
    keepalive: tokio::time::Interval,
}

impl HubConnection {
    async fn send(&mut self, message: &HubMessage) -> Result<(), SyncError> {
        let frame = message.encode().map_err(channel_error)?;
        self.sink
            .send(Message::Text(frame.into()))
            .await
            .map_err(channel_error)
    }

    /// Next text payload from the socket; `None` once the socket closed.
    async fn next_text(&mut self) -> Result<Option<String>, SyncError> {
        loop {
            tokio::select! {
                _ = self.keepalive.tick() => {
                    self.send(&HubMessage::Ping).await?;
                }
                msg = self.stream.next() => {
                    let Some(msg) = msg else {
                        return Ok(None);
                    };
                    match msg.map_err(channel_error)? {
                        Message::Text(text) => return Ok(Some(text.to_string())),
                        Message::Close(_) => return Ok(None),
                        _ => {}
                    }
                }
            }
        }
    }

    fn absorb(&mut self, text: &str) {
        for decoded in HubMessage::decode_all(text) {
            match decoded {
                Ok(message) => self.inbox.push_back(message),
                Err(e) => log::warn!(target: TARGET, "Skipping frame: {}", e),
            }
        }
    }

    async fn next_message(&mut self) -> Result<Option<HubMessage>, SyncError> {
        loop {
            if let Some(message) = self.inbox.pop_front() {
                return Ok(Some(message));
            }
            match self.next_text().await? {
                Some(text) => self.absorb(&text),
                None => return Ok(None),
            }
        }
    }

    async fn handshake(&mut self) -> Result<(), SyncError> {
        self.sink
            .send(Message::Text(handshake_request().into()))
            .await
            .map_err(channel_error)?;
        let reply = self
            .next_text()
            .await?
            .ok_or_else(|| channel_error("closed during handshake"))?;
        let rest = parse_handshake(&reply).map_err(channel_error)?.to_string();
        self.absorb(&rest);
        Ok(())
    }

    /// Invoke the join for `scope` and wait for its completion. Events that
    /// race ahead of the completion are kept.
    async fn join(&mut self, scope: &Scope) -> Result<(), SyncError> {
        self.send(&HubMessage::join(scope)).await?;
        let mut early = VecDeque::new();
        loop {
            match self.next_message().await? {
                Some(HubMessage::Completion {
                    invocation_id,
                    error,
                }) if invocation_id == JOIN_INVOCATION_ID => {
                    if let Some(error) = error {
                        return Err(SyncError::ChannelDisconnected(format!(
                            "join {} failed: {}",
                            scope, error
                        )));
                    }
                    early.append(&mut self.inbox);
                    self.inbox = early;
                    return Ok(());
                }
                Some(HubMessage::Close { error }) => {
                    return Err(channel_error(
                        error.unwrap_or_else(|| "closed during join".to_string()),
                    ));
                }
                Some(message) => early.push_back(message),
                None => return Err(channel_error("closed during join")),
            }
        }
    }
}

#[async_trait]
impl PushConnection for HubConnection {
    async fn next_event(&mut self) -> Result<Option<PushEvent>, SyncError> {
        loop {
            match self.next_message().await? {
                Some(HubMessage::Close { error }) => {
                    if let Some(error) = error {
                        log::info!(target: TARGET, "Hub closed the channel: {}", error);
                    }
                    return Ok(None);
                }
                Some(message) => {
                    if let Some(event) = message.event() {
                        return Ok(Some(event));
                    }
                }
                None => return Ok(None),
            }
        }
    }
}

#[async_trait]
impl PushTransport for SignalRTransport {
    async fn connect(&self, scope: &Scope) -> Result<Box<dyn PushConnection>, SyncError> {
        log::debug!(target: TARGET, "Connecting to {}", self.hub_url);
        let (socket, _) = connect_async(self.hub_url.as_str())
            .await
            .map_err(connect_error)?;
        let (sink, stream) = socket.split();
        let mut keepalive = tokio::time::interval(KEEPALIVE);
        keepalive.tick().await;
        let mut connection = HubConnection {
            sink,
            stream,
            inbox: VecDeque::new(),
            keepalive,
        };
        connection.handshake().await?;
        connection.join(scope).await?;
        Ok(Box::new(connection))
    }
}
