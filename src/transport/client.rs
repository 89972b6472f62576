use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use super::error::{DisconnectReason, TransportError};
use super::frame::{self, InboundFrame};
use crate::model::AttemptResponseFrame;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Keepalive ping interval (spec §4.A: "every ≤30s").
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Command sent from a [`TransportSender`] to the background task.
enum TransportCommand {
    Send(AttemptResponseFrame),
    Stop,
}

/// Cheaply-clonable handle for enqueueing outbound frames (spec §4.A `Send`).
///
/// Dispatched attempts complete concurrently, so this is the half of the
/// transport the Attempt Dispatcher holds; `Transport` itself (inbound
/// frames, lifecycle signals) is owned solely by the control loop.
#[derive(Clone)]
pub struct TransportSender {
    command_tx: mpsc::Sender<TransportCommand>,
}

impl TransportSender {
    /// # Errors
    /// Returns `TransportError::Closed` if the transport task has exited.
    pub async fn send(&self, frame: AttemptResponseFrame) -> Result<(), TransportError> {
        self.command_tx
            .send(TransportCommand::Send(frame))
            .await
            .map_err(|_| TransportError::Closed)
    }
}

/// Open connection to a configured base URL with session/auth query params
/// (spec §4.A `Open`).
///
/// # Errors
/// Returns `TransportError::Connect`/`ConnectTimeout` if the handshake
/// cannot be completed within `connect_timeout`.
pub async fn open(
    ws_base: &str,
    session_id: &str,
    api_key: &str,
    project_id: Option<&str>,
    no_tls: bool,
    connect_timeout: Duration,
) -> Result<Transport, TransportError> {
    let url = build_url(ws_base, session_id, api_key, project_id, no_tls)?;
    let ws_stream = connect_ws(url.as_str(), connect_timeout).await?;

    let (command_tx, command_rx) = mpsc::channel(64);
    let (inbound_tx, inbound_rx) = mpsc::channel(256);
    let (connected_tx, connected_rx) = watch::channel(false);
    let (expired_tx, expired_rx) = oneshot::channel();

    let sender = TransportSender { command_tx };

    tokio::spawn(
        TransportTask {
            ws_stream,
            command_rx,
            inbound_tx,
            connected_tx,
            expired_tx: Some(expired_tx),
            last_pong: tokio::time::Instant::now(),
        }
        .run(),
    );

    Ok(Transport {
        inbound_rx,
        connected_rx,
        expired_rx,
        sender,
    })
}

fn build_url(
    ws_base: &str,
    session_id: &str,
    api_key: &str,
    project_id: Option<&str>,
    no_tls: bool,
) -> Result<Url, TransportError> {
    let mut url = Url::parse(ws_base).map_err(|e| TransportError::Connect(e.to_string()))?;
    url.set_scheme(if no_tls { "ws" } else { "wss" })
        .map_err(|()| TransportError::Connect(format!("invalid base url: {ws_base}")))?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("id", session_id);
        pairs.append_pair("key", api_key);
        if let Some(project_id) = project_id {
            pairs.append_pair("project_id", project_id);
        }
    }
    Ok(url)
}

async fn connect_ws(url: &str, timeout: Duration) -> Result<WsStream, TransportError> {
    match tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url)).await {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(e)) => Err(TransportError::Connect(e.to_string())),
        Err(_) => Err(TransportError::ConnectTimeout),
    }
}

/// Result of [`Transport::next_event`]: either a frame arrived, or the
/// transport expired before one did.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Frame(InboundFrame),
    Expired(DisconnectReason),
}

/// Owned half of the transport: inbound frames and lifecycle signals. Held
/// exclusively by the control loop (spec §4.H).
pub struct Transport {
    inbound_rx: mpsc::Receiver<InboundFrame>,
    connected_rx: watch::Receiver<bool>,
    expired_rx: oneshot::Receiver<DisconnectReason>,
    sender: TransportSender,
}

impl Transport {
    /// A clone of the outbound-sending half, given to the dispatcher.
    #[must_use]
    pub fn sender(&self) -> TransportSender {
        self.sender.clone()
    }

    /// Await the next inbound frame. Returns `None` once the transport task
    /// has exited (spec §4.A `Recv`).
    pub async fn recv(&mut self) -> Option<InboundFrame> {
        self.inbound_rx.recv().await
    }

    /// Await whichever comes first: the next inbound frame, or the transport
    /// expiring. `Recv` and `NotifyExpired` are two `&mut self` futures over
    /// the same handle (spec §4.A), so a caller that needs to race them
    /// against each other in one `tokio::select!` can't just call both
    /// separately — that's two concurrent mutable borrows of `self`. This
    /// combinator does the multiplexing inside a single method instead.
    pub async fn next_event(&mut self) -> TransportEvent {
        tokio::select! {
            frame = self.inbound_rx.recv() => match frame {
                Some(frame) => TransportEvent::Frame(frame),
                None => TransportEvent::Expired(DisconnectReason::PeerClosed),
            },
            result = &mut self.expired_rx => {
                TransportEvent::Expired(
                    result.unwrap_or(DisconnectReason::StreamError("transport task exited".into())),
                )
            }
        }
    }

    /// Resolves once the handshake `connect_response` has been observed
    /// (spec §4.A `Connected`, "one-shot signal").
    pub async fn connected(&mut self) {
        if *self.connected_rx.borrow() {
            return;
        }
        while self.connected_rx.changed().await.is_ok() {
            if *self.connected_rx.borrow() {
                return;
            }
        }
    }

    /// Resolves once the peer closes the stream or a write fails (spec
    /// §4.A `NotifyExpired`). The caller decides whether to reconnect.
    pub async fn wait_expired(&mut self) -> DisconnectReason {
        (&mut self.expired_rx)
            .await
            .unwrap_or(DisconnectReason::StreamError("transport task exited".into()))
    }

    /// Gracefully close the connection (spec §4.A `Stop`).
    pub async fn stop(self) {
        let _ = self.sender.command_tx.send(TransportCommand::Stop).await;
    }
}

struct TransportTask {
    ws_stream: WsStream,
    command_rx: mpsc::Receiver<TransportCommand>,
    inbound_tx: mpsc::Sender<InboundFrame>,
    connected_tx: watch::Sender<bool>,
    expired_tx: Option<oneshot::Sender<DisconnectReason>>,
    last_pong: tokio::time::Instant,
}

impl TransportTask {
    async fn run(mut self) {
        let mut ping_timer = tokio::time::interval(PING_INTERVAL);
        ping_timer.tick().await; // first tick fires immediately; consume it

        loop {
            tokio::select! {
                ws_msg = self.ws_stream.next() => {
                    match ws_msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text).await,
                        Some(Ok(Message::Pong(_))) => self.last_pong = tokio::time::Instant::now(),
                        Some(Ok(Message::Close(_))) => {
                            self.expire(DisconnectReason::PeerClosed);
                            return;
                        }
                        Some(Ok(_)) => {} // binary, ping, frame — ignore
                        Some(Err(e)) => {
                            self.expire(DisconnectReason::StreamError(e.to_string()));
                            return;
                        }
                        None => {
                            self.expire(DisconnectReason::PeerClosed);
                            return;
                        }
                    }
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(TransportCommand::Send(frame)) => {
                            if let Err(e) = self.send_frame(&frame).await {
                                self.expire(DisconnectReason::StreamError(e.to_string()));
                                return;
                            }
                        }
                        Some(TransportCommand::Stop) | None => {
                            let _ = self.ws_stream.close(None).await;
                            return;
                        }
                    }
                }

                _ = ping_timer.tick() => {
                    if self.last_pong.elapsed() > PING_INTERVAL * 2 {
                        self.expire(DisconnectReason::KeepaliveTimeout);
                        return;
                    }
                    if self.ws_stream.send(Message::Ping(Vec::new().into())).await.is_err() {
                        self.expire(DisconnectReason::StreamError("ping write failed".into()));
                        return;
                    }
                }
            }
        }
    }

    async fn handle_text(&mut self, text: &str) {
        match frame::classify(text) {
            Ok(Some(InboundFrame::ConnectResponse)) => {
                let _ = self.connected_tx.send(true);
            }
            Ok(Some(attempt_frame @ InboundFrame::Attempt(_))) => {
                let _ = self.inbound_tx.send(attempt_frame).await;
            }
            Ok(None) => {
                tracing::debug!(frame = text, "ignoring unrecognized inbound frame");
            }
            Err(e) => {
                tracing::debug!(error = %e, "ignoring malformed inbound frame");
            }
        }
    }

    async fn send_frame(&mut self, frame: &AttemptResponseFrame) -> Result<(), TransportError> {
        let json = serde_json::to_string(frame)
            .map_err(|e| TransportError::SerializeFailed(e.to_string()))?;
        self.ws_stream
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn expire(&mut self, reason: DisconnectReason) {
        if let Some(tx) = self.expired_tx.take() {
            let _ = tx.send(reason);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_url_forces_scheme_and_appends_auth_query() {
        let url = build_url("ws://ws.example.com/", "sess_1", "key_1", None, false).unwrap();
        assert_eq!(url.scheme(), "wss");
        let query: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query.get("id").unwrap(), "sess_1");
        assert_eq!(query.get("key").unwrap(), "key_1");
        assert!(!query.contains_key("project_id"));
    }

    #[test]
    fn build_url_uses_ws_scheme_when_no_tls() {
        let url = build_url("wss://ws.example.com", "s", "k", Some("proj_1"), true).unwrap();
        assert_eq!(url.scheme(), "ws");
        let query: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query.get("project_id").unwrap(), "proj_1");
    }
}
