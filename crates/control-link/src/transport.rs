//! WebSocket transport for the control link
//!
//! Each connection attempt runs in its own task and reports back to the link
//! through the link's input channel, tagged with the attempt's
//! [`ConnectionId`] so that late events from an abandoned attempt can be
//! recognized and ignored.

use std::collections::HashMap;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::error::ProtocolError as WsProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use crate::{CloseReason, LinkInput, TransportError, TransportResult};

/// Generation counter for connection attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opens, feeds and releases transport connections on behalf of the link.
///
/// `connect` must not block: the outcome arrives later as
/// `TransportOpened` or `TransportClosed` on the link's input channel.
/// After `close(id)` the connector reports nothing more for `id`.
pub trait Connector: Send {
    fn connect(&mut self, id: ConnectionId, url: &str);
    fn send(&mut self, id: ConnectionId, frame: String) -> TransportResult<()>;
    fn close(&mut self, id: ConnectionId);
}

enum Outbound {
    Frame(String),
    Close,
}

/// Connector speaking WebSocket text frames via tokio-tungstenite
pub struct WebSocketConnector {
    tx: mpsc::UnboundedSender<LinkInput>,
    handshake_timeout: Duration,
    connections: HashMap<ConnectionId, mpsc::UnboundedSender<Outbound>>,
}

impl WebSocketConnector {
    pub fn new(tx: mpsc::UnboundedSender<LinkInput>, handshake_timeout: Duration) -> Self {
        Self {
            tx,
            handshake_timeout,
            connections: HashMap::new(),
        }
    }
}

impl Connector for WebSocketConnector {
    fn connect(&mut self, id: ConnectionId, url: &str) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        self.connections.insert(id, out_tx);

        tokio::spawn(run_connection(
            id,
            url.to_string(),
            self.handshake_timeout,
            self.tx.clone(),
            out_rx,
        ));
    }

    fn send(&mut self, id: ConnectionId, frame: String) -> TransportResult<()> {
        let sender = self
            .connections
            .get(&id)
            .ok_or(TransportError::NotConnected)?;

        sender
            .send(Outbound::Frame(frame))
            .map_err(|_| TransportError::NotConnected)
    }

    fn close(&mut self, id: ConnectionId) {
        if let Some(sender) = self.connections.remove(&id) {
            let _ = sender.send(Outbound::Close);
        }
    }
}

impl Drop for WebSocketConnector {
    fn drop(&mut self) {
        for (_, sender) in self.connections.drain() {
            let _ = sender.send(Outbound::Close);
        }
    }
}

async fn run_connection(
    id: ConnectionId,
    url: String,
    handshake_timeout: Duration,
    events: mpsc::UnboundedSender<LinkInput>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    info!("Connecting {} to {}", id, url);

    let stream = match tokio::time::timeout(handshake_timeout, connect_async(url.as_str())).await {
        Ok(Ok((stream, _))) => stream,
        Ok(Err(e)) => {
            warn!("Connection {} failed: {}", id, e);
            let _ = events.send(LinkInput::TransportClosed(id, classify(&e)));
            return;
        }
        Err(_) => {
            warn!("Connection {} handshake timed out", id);
            let reason = CloseReason::Unreachable(TransportError::Timeout.to_string());
            let _ = events.send(LinkInput::TransportClosed(id, reason));
            return;
        }
    };

    info!("Connection {} open", id);
    if events.send(LinkInput::TransportOpened(id)).is_err() {
        return;
    }

    let (mut ws_tx, mut ws_rx) = stream.split();

    let reason = loop {
        tokio::select! {
            // Outgoing: link -> vehicle
            out = outbound.recv() => match out {
                Some(Outbound::Frame(frame)) => {
                    if let Err(e) = ws_tx.send(Message::Text(frame.into())).await {
                        warn!("Connection {} send failed: {}", id, e);
                        break classify(&e);
                    }
                }
                // Released by the link, nothing more to report
                Some(Outbound::Close) | None => {
                    debug!("Connection {} released", id);
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return;
                }
            },

            // Incoming: vehicle -> link
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(LinkInput::Inbound(id, text.as_str().to_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.map(|f| u16::from(f.code));
                    info!("Connection {} closed by vehicle ({:?})", id, code);
                    break CloseReason::from_close_code(code);
                }
                Some(Ok(Message::Binary(data))) => {
                    debug!("Connection {} ignoring {} byte binary frame", id, data.len());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Connection {} receive error: {}", id, e);
                    break classify(&e);
                }
                None => break CloseReason::ClosedByPeer { code: None },
            },
        }
    };

    let _ = events.send(LinkInput::TransportClosed(id, reason));
}

fn classify(error: &WsError) -> CloseReason {
    match error {
        WsError::Protocol(WsProtocolError::ResetWithoutClosingHandshake) => {
            CloseReason::Unreachable(error.to_string())
        }
        WsError::Protocol(_) | WsError::Capacity(_) => CloseReason::ProtocolError { code: 1002 },
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            CloseReason::ClosedByPeer { code: None }
        }
        other => CloseReason::Unreachable(other.to_string()),
    }
}
