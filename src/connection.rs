//! Shared WebSocket connection to the event channel.
//!
//! Provides a single connection multiplexed across every subscription in the
//! process. Handles:
//!
//! - One socket for all topics (no per-subscription connections)
//! - Topic registry: per-topic handler lists, fan-out in registration order
//! - Automatic reconnection at a fixed delay, without an attempt cap
//! - Replay of all registered topics after reconnect, before readiness is
//!   announced
//! - Connection lifecycle events (`on_connect`, `on_disconnect`, `on_error`)
//! - Keepalive pings with a pong timeout
//!
//! The public API lives on [`QueueLinkClient`](crate::QueueLinkClient); this
//! module is the actor behind it. Only the background task touches the socket
//! and the registry; everything else communicates over channels.

use crate::{
    error::{QueueLinkError, Result},
    event_handlers::{ConnectionError, DisconnectReason, EventHandlers},
    models::{ClientFrame, ConnectionOptions, ServerFrame, Topic, TopicMessage, TopicPayload},
    subscription::Subscription,
    timeouts::QueueLinkTimeouts,
};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant as TokioInstant;
use tokio_tungstenite::tungstenite::protocol::Message;

/// Shorthand for the connected WebSocket stream type.
pub(crate) type WebSocketStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<TcpStream>>;

/// Capacity of the command channel into the connection task.
const CMD_CHANNEL_CAPACITY: usize = 256;

/// Maximum text message size (16 MiB). Larger frames are dropped.
const MAX_WS_TEXT_MESSAGE_BYTES: usize = 16 << 20;

/// Maximum sleep duration that won't overflow `Instant + Duration`.
/// ~100 years is far enough into the future to be effectively "never".
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

// ── Connection state ────────────────────────────────────────────────────────

/// Lifecycle state of the shared connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none pending (before `connect()`, after `disconnect()`).
    Disconnected,
    /// Establishing the socket or awaiting the connect acknowledgement.
    Connecting,
    /// Channel open and acknowledged; events flow.
    Connected,
    /// The last attempt failed or the channel dropped; a retry is pending.
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Point-in-time view of the connection, published on a watch channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionStatus {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Most recent transport failure, if any. Cleared on successful connect.
    pub last_error: Option<String>,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            last_error: None,
        }
    }
}

fn set_state(
    status_tx: &watch::Sender<ConnectionStatus>,
    state: ConnectionState,
    error: Option<String>,
) {
    status_tx.send_modify(|status| {
        status.state = state;
        if state == ConnectionState::Connected {
            status.last_error = None;
        } else if let Some(message) = error {
            status.last_error = Some(message);
        }
    });
}

// ── Commands ────────────────────────────────────────────────────────────────

/// Commands sent from the public API to the background connection task.
pub(crate) enum ConnCmd {
    /// Attach a handler to a topic. The first handler for a topic creates
    /// the wire subscription; later handlers share it.
    Subscribe {
        topic: Topic,
        handler_id: u64,
        event_tx: mpsc::Sender<TopicMessage>,
        result_tx: oneshot::Sender<Result<()>>,
    },
    /// Detach one handler, releasing the wire subscription with the last
    /// one. Handler ids are never reused, so a removal from a superseded
    /// handle can never hit a newer entry.
    RemoveHandler { topic: Topic, handler_id: u64 },
    /// Drop one topic wholesale, all handlers included. No-op if absent.
    UnsubscribeTopic {
        topic: Topic,
        result_tx: oneshot::Sender<()>,
    },
    /// Drop every topic.
    UnsubscribeAll { result_tx: oneshot::Sender<()> },
    /// Send a payload to a topic.
    Publish {
        topic: Topic,
        body: String,
        result_tx: oneshot::Sender<Result<()>>,
    },
    /// Gracefully shut down the connection.
    Shutdown,
}

// ── Topic registry ──────────────────────────────────────────────────────────

/// One registered handler: its unique id and the channel it receives on.
struct HandlerEntry {
    id: u64,
    event_tx: mpsc::Sender<TopicMessage>,
}

/// Registry entry for one topic. Existence of the entry means a wire
/// subscription is active (or queued for replay while disconnected).
struct TopicEntry {
    topic: Topic,
    handlers: Vec<HandlerEntry>,
}

// ── SharedConnection (crate-internal handle) ────────────────────────────────

/// A single shared WebSocket connection multiplexing all topics.
///
/// Created via [`SharedConnection::open`]. Operations send commands to a
/// background task that owns the socket and the topic registry.
pub(crate) struct SharedConnection {
    cmd_tx: mpsc::Sender<ConnCmd>,
    /// Whether the channel is currently open and acknowledged.
    connected: Arc<AtomicBool>,
    status_rx: watch::Receiver<ConnectionStatus>,
    /// Monotonic handler-id source; ids are process-unique and never reused.
    next_handler_id: Arc<AtomicU64>,
    event_buffer: usize,
    send_timeout: Duration,
    _task: JoinHandle<()>,
}

impl SharedConnection {
    /// Spawn the connection actor and start its first connection attempt.
    ///
    /// Returns immediately; callers observe readiness through the status
    /// watch (see [`wait_connected`](Self::wait_connected)). The task keeps
    /// retrying on its own until [`disconnect`](Self::disconnect).
    pub(crate) fn open(
        base_url: String,
        timeouts: QueueLinkTimeouts,
        options: ConnectionOptions,
        event_handlers: EventHandlers,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel::<ConnCmd>(CMD_CHANNEL_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));
        let (status_tx, status_rx) = watch::channel(ConnectionStatus {
            state: ConnectionState::Connecting,
            last_error: None,
        });

        let event_buffer = options.event_buffer.max(1);
        let send_timeout = timeouts.send_timeout;
        let connected_clone = connected.clone();

        let task = tokio::spawn(connection_task(
            cmd_rx,
            base_url,
            timeouts,
            options,
            event_handlers,
            connected_clone,
            status_tx,
        ));

        Self {
            cmd_tx,
            connected,
            status_rx,
            next_handler_id: Arc::new(AtomicU64::new(1)),
            event_buffer,
            send_timeout,
            _task: task,
        }
    }

    /// Whether the channel is currently open and acknowledged.
    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Snapshot of the connection state and last error.
    pub(crate) fn status(&self) -> ConnectionStatus {
        self.status_rx.borrow().clone()
    }

    /// A receiver for connection status transitions.
    pub(crate) fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Wait until the in-flight attempt settles: `Connected`, or `Failed`
    /// with its error captured in the status.
    ///
    /// Returns `Ok(None)` if `limit` expired while still connecting. `Err`
    /// only if the connection task is gone.
    pub(crate) async fn wait_settled(&self, limit: Duration) -> Result<Option<ConnectionStatus>> {
        let mut status_rx = self.status_rx.clone();
        let wait = status_rx.wait_for(|s| {
            matches!(
                s.state,
                ConnectionState::Connected | ConnectionState::Failed
            )
        });
        if QueueLinkTimeouts::is_no_timeout(limit) {
            wait.await
                .map(|status| Some((*status).clone()))
                .map_err(|_| QueueLinkError::InternalError("Connection task stopped".to_string()))
        } else {
            match tokio::time::timeout(limit, wait).await {
                Ok(Ok(status)) => Ok(Some((*status).clone())),
                Ok(Err(_)) => Err(QueueLinkError::InternalError(
                    "Connection task stopped".to_string(),
                )),
                Err(_) => Ok(None),
            }
        }
    }

    /// Wait until the `Connected` state is reached.
    ///
    /// Returns `Ok(true)` once connected, `Ok(false)` if `limit` expired
    /// first; callers map the timeout to their own error. `Err` only if the
    /// connection task is gone.
    pub(crate) async fn wait_connected(&self, limit: Duration) -> Result<bool> {
        let mut status_rx = self.status_rx.clone();
        if status_rx.borrow().state == ConnectionState::Connected {
            return Ok(true);
        }
        let wait = status_rx.wait_for(|s| s.state == ConnectionState::Connected);
        if QueueLinkTimeouts::is_no_timeout(limit) {
            wait.await
                .map(|_| true)
                .map_err(|_| QueueLinkError::InternalError("Connection task stopped".to_string()))
        } else {
            match tokio::time::timeout(limit, wait).await {
                Ok(Ok(_)) => Ok(true),
                Ok(Err(_)) => Err(QueueLinkError::InternalError(
                    "Connection task stopped".to_string(),
                )),
                Err(_) => Ok(false),
            }
        }
    }

    /// Attach a handler to `topic` and return its receive handle.
    pub(crate) async fn subscribe(&self, topic: Topic) -> Result<Subscription> {
        let handler_id = self.next_handler_id.fetch_add(1, Ordering::Relaxed);
        let (event_tx, event_rx) = mpsc::channel(self.event_buffer);
        let (result_tx, result_rx) = oneshot::channel();

        self.cmd_tx
            .send(ConnCmd::Subscribe {
                topic: topic.clone(),
                handler_id,
                event_tx,
                result_tx,
            })
            .await
            .map_err(|_| {
                QueueLinkError::InternalError("Connection task is not running".to_string())
            })?;

        result_rx.await.map_err(|_| {
            QueueLinkError::InternalError(
                "Connection task dropped before confirming subscribe".to_string(),
            )
        })??;

        Ok(Subscription::new(
            topic,
            handler_id,
            self.cmd_tx.clone(),
            event_rx,
        ))
    }

    /// Remove a whole topic from the registry. No-op if absent.
    ///
    /// Resolves only after the registry has been updated, so no message
    /// arriving afterwards can reach the removed handlers.
    pub(crate) async fn unsubscribe(&self, topic: &Topic) -> Result<()> {
        let (result_tx, result_rx) = oneshot::channel();
        self.cmd_tx
            .send(ConnCmd::UnsubscribeTopic {
                topic: topic.clone(),
                result_tx,
            })
            .await
            .map_err(|_| {
                QueueLinkError::InternalError("Connection task is not running".to_string())
            })?;
        result_rx.await.map_err(|_| {
            QueueLinkError::InternalError(
                "Connection task dropped before confirming unsubscribe".to_string(),
            )
        })
    }

    /// Remove every topic from the registry.
    pub(crate) async fn unsubscribe_all(&self) -> Result<()> {
        let (result_tx, result_rx) = oneshot::channel();
        self.cmd_tx
            .send(ConnCmd::UnsubscribeAll { result_tx })
            .await
            .map_err(|_| {
                QueueLinkError::InternalError("Connection task is not running".to_string())
            })?;
        result_rx.await.map_err(|_| {
            QueueLinkError::InternalError(
                "Connection task dropped before confirming unsubscribe".to_string(),
            )
        })
    }

    /// Send a serialized payload to a topic.
    ///
    /// Fails with `NotConnectedError` while the channel is down; outbound
    /// messages are never queued. Subscription state is untouched either way.
    pub(crate) async fn publish(&self, topic: &Topic, body: String) -> Result<()> {
        if !self.is_connected() {
            return Err(QueueLinkError::NotConnectedError);
        }
        let (result_tx, result_rx) = oneshot::channel();
        self.cmd_tx
            .send(ConnCmd::Publish {
                topic: topic.clone(),
                body,
                result_tx,
            })
            .await
            .map_err(|_| {
                QueueLinkError::InternalError("Connection task is not running".to_string())
            })?;

        let reply = if QueueLinkTimeouts::is_no_timeout(self.send_timeout) {
            result_rx.await
        } else {
            match tokio::time::timeout(self.send_timeout, result_rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    return Err(QueueLinkError::TimeoutError(format!(
                        "Publish not confirmed within {:?}",
                        self.send_timeout
                    )))
                }
            }
        };
        reply.map_err(|_| {
            QueueLinkError::InternalError(
                "Connection task dropped before confirming publish".to_string(),
            )
        })?
    }

    /// Gracefully disconnect: unsubscribe everything, close the socket, stop
    /// the task. Waits briefly for the `Disconnected` state so callers
    /// observe a settled connection.
    pub(crate) async fn disconnect(&self) {
        let _ = self.cmd_tx.send(ConnCmd::Shutdown).await;
        let mut status_rx = self.status_rx.clone();
        let _ = tokio::time::timeout(
            Duration::from_secs(5),
            status_rx.wait_for(|s| s.state == ConnectionState::Disconnected),
        )
        .await;
    }
}

impl Drop for SharedConnection {
    fn drop(&mut self) {
        // Best-effort shutdown signal.
        let _ = self.cmd_tx.try_send(ConnCmd::Shutdown);
    }
}

// ── WebSocket helpers ───────────────────────────────────────────────────────

/// Derive the WebSocket URL from the HTTP base URL and endpoint path.
fn resolve_ws_url(base_url: &str, ws_path: &str) -> Result<String> {
    let trimmed = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
        trimmed.to_string()
    } else {
        return Err(QueueLinkError::ConfigurationError(format!(
            "Unsupported base URL scheme: {}",
            base_url
        )));
    };
    let path = if ws_path.starts_with('/') {
        ws_path.to_string()
    } else {
        format!("/{}", ws_path)
    };
    Ok(format!("{}{}", ws_base, path))
}

/// Serialize and send one client frame.
async fn send_frame(ws: &mut WebSocketStream, frame: &ClientFrame) -> Result<()> {
    let payload = serde_json::to_string(frame).map_err(|e| {
        QueueLinkError::InternalError(format!("Failed to serialize frame: {}", e))
    })?;
    ws.send(Message::Text(payload.into()))
        .await
        .map_err(|e| QueueLinkError::TransportError(format!("Failed to send frame: {}", e)))
}

/// Send a Subscribe frame for a topic path.
async fn send_subscribe(ws: &mut WebSocketStream, topic: &str) -> Result<()> {
    send_frame(
        ws,
        &ClientFrame::Subscribe {
            topic: topic.to_string(),
        },
    )
    .await
}

/// Send an Unsubscribe frame for a topic path.
async fn send_unsubscribe(ws: &mut WebSocketStream, topic: &str) -> Result<()> {
    send_frame(
        ws,
        &ClientFrame::Unsubscribe {
            topic: topic.to_string(),
        },
    )
    .await
}

/// Establish the WebSocket and complete the connect handshake.
async fn establish_ws(
    base_url: &str,
    options: &ConnectionOptions,
    timeouts: &QueueLinkTimeouts,
    event_handlers: &EventHandlers,
) -> Result<WebSocketStream> {
    let url = resolve_ws_url(base_url, &options.ws_path)?;
    log::debug!("[queue-link] Establishing WebSocket connection to {}", url);

    let connect_result = if !QueueLinkTimeouts::is_no_timeout(timeouts.connect_timeout) {
        tokio::time::timeout(
            timeouts.connect_timeout,
            tokio_tungstenite::connect_async(url.as_str()),
        )
        .await
    } else {
        Ok(tokio_tungstenite::connect_async(url.as_str()).await)
    };

    let mut ws_stream = match connect_result {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(tokio_tungstenite::tungstenite::error::Error::Http(response))) => {
            let status = response.status();
            let body_text = response
                .into_body()
                .as_ref()
                .and_then(|b| {
                    if b.is_empty() {
                        None
                    } else {
                        Some(String::from_utf8_lossy(b).into_owned())
                    }
                })
                .unwrap_or_default();
            let message = if body_text.is_empty() {
                format!("WebSocket HTTP error: {}", status.as_u16())
            } else {
                format!("WebSocket HTTP error {}: {}", status.as_u16(), body_text)
            };
            event_handlers.emit_error(ConnectionError::new(&message, true));
            return Err(QueueLinkError::TransportError(message));
        }
        Ok(Err(e)) => {
            let msg = format!("Connection failed: {}", e);
            event_handlers.emit_error(ConnectionError::new(&msg, true));
            return Err(QueueLinkError::TransportError(msg));
        }
        Err(_) => {
            let msg = format!("Connection timeout ({:?})", timeouts.connect_timeout);
            event_handlers.emit_error(ConnectionError::new(&msg, true));
            return Err(QueueLinkError::TransportError(msg));
        }
    };

    // Connect handshake: open the logical channel and wait for the ack.
    log::debug!(
        "[queue-link] Sending connect handshake (timeout={:?})",
        timeouts.handshake_timeout
    );
    send_frame(&mut ws_stream, &ClientFrame::Connect).await?;
    wait_for_connected_ack(&mut ws_stream, timeouts.handshake_timeout).await?;
    log::info!("[queue-link] Event channel connected");

    Ok(ws_stream)
}

/// Wait for the server's `connected` acknowledgement.
async fn wait_for_connected_ack(ws: &mut WebSocketStream, limit: Duration) -> Result<()> {
    let wait = async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerFrame>(&text) {
                        Ok(ServerFrame::Connected) => return Ok(()),
                        Ok(other) => {
                            log::debug!("[queue-link] Ignoring pre-ack frame: {:?}", other);
                        }
                        Err(e) => {
                            log::warn!(
                                "[queue-link] Unparseable frame before connect ack: {}",
                                e
                            );
                        }
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = ws.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) => {
                    return Err(QueueLinkError::TransportError(
                        "Server closed connection during handshake".to_string(),
                    ));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return Err(QueueLinkError::TransportError(format!(
                        "Handshake failed: {}",
                        e
                    )));
                }
                None => {
                    return Err(QueueLinkError::TransportError(
                        "Connection closed during handshake".to_string(),
                    ));
                }
            }
        }
    };

    if QueueLinkTimeouts::is_no_timeout(limit) {
        wait.await
    } else {
        match tokio::time::timeout(limit, wait).await {
            Ok(result) => result,
            Err(_) => Err(QueueLinkError::TransportError(format!(
                "No connect acknowledgement within {:?}",
                limit
            ))),
        }
    }
}

/// Replay every registered topic after a reconnect.
async fn resubscribe_all(ws: &mut WebSocketStream, registry: &HashMap<String, TopicEntry>) {
    if registry.is_empty() {
        return;
    }
    log::info!(
        "[queue-link] Re-subscribing {} active topic(s) after reconnect",
        registry.len()
    );
    for key in registry.keys() {
        if let Err(e) = send_subscribe(ws, key).await {
            log::warn!("[queue-link] Failed to re-subscribe {}: {}", key, e);
        }
    }
}

/// Fan one inbound message out to every handler registered for its topic,
/// in registration order.
///
/// The body is parsed once; a body that is not JSON is passed through raw.
/// A handler with a full channel misses this event (the periodic pull heals
/// it); a handler with a dropped receiver is pruned, and the wire
/// subscription is released when the last handler goes.
async fn dispatch_message(
    ws: &mut WebSocketStream,
    registry: &mut HashMap<String, TopicEntry>,
    topic_str: &str,
    body: String,
) {
    let Some(entry) = registry.get_mut(topic_str) else {
        log::debug!("[queue-link] No subscription for topic {}", topic_str);
        return;
    };

    let payload = TopicPayload::parse(body);
    if payload.as_raw().is_some() {
        log::warn!(
            "[queue-link] Non-JSON payload on {}, passing through raw",
            topic_str
        );
    }

    let topic = entry.topic.clone();
    entry.handlers.retain(|handler| {
        let message = TopicMessage {
            topic: topic.clone(),
            payload: payload.clone(),
        };
        match handler.event_tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!(
                    "[queue-link] Handler {} on {} is lagging, dropping event",
                    handler.id,
                    topic
                );
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::debug!(
                    "[queue-link] Handler {} on {} dropped its receiver, pruning",
                    handler.id,
                    topic
                );
                false
            }
        }
    });

    let emptied = entry.handlers.is_empty();
    if emptied {
        registry.remove(topic_str);
        let _ = send_unsubscribe(ws, topic_str).await;
        log::debug!(
            "[queue-link] Released wire subscription for {} (no handlers left)",
            topic_str
        );
    }
}

// ── Command processing ──────────────────────────────────────────────────────

/// Outcome of processing one command.
enum CmdOutcome {
    Continue,
    Shutdown,
    /// An outbound send failed; the socket must be torn down for reconnect.
    TransportBroken,
}

/// Process one command against the registry and (when present) the socket.
///
/// With `ws` absent the task is between reconnect attempts: subscribes are
/// queued for replay, unsubscribes edit the registry only, publishes fail
/// with `NotConnectedError`.
async fn handle_command(
    cmd: ConnCmd,
    ws: Option<&mut WebSocketStream>,
    registry: &mut HashMap<String, TopicEntry>,
) -> CmdOutcome {
    match cmd {
        ConnCmd::Subscribe {
            topic,
            handler_id,
            event_tx,
            result_tx,
        } => {
            let key = topic.as_str().to_string();
            let needs_wire_subscribe = !registry.contains_key(&key);

            if needs_wire_subscribe {
                if let Some(ws) = ws {
                    if let Err(e) = send_subscribe(ws, &key).await {
                        let _ = result_tx.send(Err(e));
                        return CmdOutcome::TransportBroken;
                    }
                    log::info!("[queue-link] Subscribed to {}", key);
                } else {
                    // Queued while disconnected; replay sends the frame.
                    log::debug!("[queue-link] Queueing subscription to {} for replay", key);
                }
            }

            registry
                .entry(key)
                .or_insert_with(|| TopicEntry {
                    topic: topic.clone(),
                    handlers: Vec::new(),
                })
                .handlers
                .push(HandlerEntry {
                    id: handler_id,
                    event_tx,
                });
            let _ = result_tx.send(Ok(()));
            CmdOutcome::Continue
        }

        ConnCmd::RemoveHandler { topic, handler_id } => {
            let key = topic.as_str();
            let mut emptied = false;
            if let Some(entry) = registry.get_mut(key) {
                let before = entry.handlers.len();
                entry.handlers.retain(|h| h.id != handler_id);
                if entry.handlers.len() == before {
                    log::debug!(
                        "[queue-link] Ignoring stale handler removal for {} (id {})",
                        key,
                        handler_id
                    );
                }
                emptied = entry.handlers.is_empty();
            }
            if emptied {
                registry.remove(key);
                if let Some(ws) = ws {
                    let _ = send_unsubscribe(ws, key).await;
                }
                log::debug!(
                    "[queue-link] Unsubscribed from {} (last handler removed)",
                    key
                );
            }
            CmdOutcome::Continue
        }

        ConnCmd::UnsubscribeTopic { topic, result_tx } => {
            let key = topic.as_str();
            if registry.remove(key).is_some() {
                if let Some(ws) = ws {
                    let _ = send_unsubscribe(ws, key).await;
                }
                log::info!("[queue-link] Unsubscribed from {}", key);
            }
            let _ = result_tx.send(());
            CmdOutcome::Continue
        }

        ConnCmd::UnsubscribeAll { result_tx } => {
            if let Some(ws) = ws {
                for key in registry.keys() {
                    let _ = send_unsubscribe(ws, key).await;
                }
            }
            let count = registry.len();
            registry.clear();
            if count > 0 {
                log::info!("[queue-link] Cleared {} subscription(s)", count);
            }
            let _ = result_tx.send(());
            CmdOutcome::Continue
        }

        ConnCmd::Publish {
            topic,
            body,
            result_tx,
        } => match ws {
            Some(ws) => {
                let result = send_frame(
                    ws,
                    &ClientFrame::Send {
                        topic: topic.as_str().to_string(),
                        body,
                    },
                )
                .await;
                let broke = result.is_err();
                let _ = result_tx.send(result);
                if broke {
                    CmdOutcome::TransportBroken
                } else {
                    CmdOutcome::Continue
                }
            }
            None => {
                let _ = result_tx.send(Err(QueueLinkError::NotConnectedError));
                CmdOutcome::Continue
            }
        },

        ConnCmd::Shutdown => CmdOutcome::Shutdown,
    }
}

// ── Background connection task ──────────────────────────────────────────────

/// The actor owning the socket and the topic registry.
///
/// Lifecycle:
/// 1. Attempt the initial connection and handshake
/// 2. Event loop: read frames + process commands + keepalive pings
/// 3. On unexpected loss: retry at a fixed delay, forever, processing
///    commands during the wait
/// 4. On reconnect: replay all registered topics, then announce `Connected`
async fn connection_task(
    mut cmd_rx: mpsc::Receiver<ConnCmd>,
    base_url: String,
    timeouts: QueueLinkTimeouts,
    options: ConnectionOptions,
    event_handlers: EventHandlers,
    connected: Arc<AtomicBool>,
    status_tx: watch::Sender<ConnectionStatus>,
) {
    let mut registry: HashMap<String, TopicEntry> = HashMap::new();
    let mut ws_stream: Option<WebSocketStream> = None;
    let mut shutdown_requested = false;

    let reconnect_delay = Duration::from_millis(options.reconnect_delay_ms);

    let keepalive_dur = if timeouts.keepalive_interval.is_zero() {
        FAR_FUTURE
    } else {
        timeouts.keepalive_interval
    };
    let has_keepalive = !timeouts.keepalive_interval.is_zero();
    let mut idle_deadline = TokioInstant::now() + keepalive_dur;

    // Pong timeout: after sending a Ping, some frame must arrive within this
    // window or the connection is considered dead.
    let pong_timeout_dur = timeouts.pong_timeout;
    let has_pong_timeout = has_keepalive && !pong_timeout_dur.is_zero();
    let mut awaiting_pong = false;
    let mut pong_deadline = TokioInstant::now() + FAR_FUTURE;

    // Initial attempt. Failure is not fatal: the retry loop below keeps
    // going, and callers see the error through the status watch.
    match establish_ws(&base_url, &options, &timeouts, &event_handlers).await {
        Ok(stream) => {
            ws_stream = Some(stream);
            connected.store(true, Ordering::SeqCst);
            set_state(&status_tx, ConnectionState::Connected, None);
            event_handlers.emit_connect();
            idle_deadline = TokioInstant::now() + keepalive_dur;
        }
        Err(e) => {
            log::warn!("[queue-link] Initial connection failed: {}", e);
            set_state(&status_tx, ConnectionState::Failed, Some(e.to_string()));
        }
    }

    loop {
        if shutdown_requested {
            if let Some(ref mut ws) = ws_stream {
                for key in registry.keys() {
                    let _ = send_unsubscribe(ws, key).await;
                }
                let _ = ws.close(None).await;
            }
            let was_connected = connected.swap(false, Ordering::SeqCst);
            set_state(&status_tx, ConnectionState::Disconnected, None);
            if was_connected {
                event_handlers.emit_disconnect(DisconnectReason::new("Client disconnected"));
            }
            log::debug!("[queue-link] Connection task stopped");
            return;
        }

        if let Some(ref mut ws) = ws_stream {
            // Connected: multiplex frames, commands, keepalive, pong timeout.
            let idle_sleep = tokio::time::sleep_until(idle_deadline);
            tokio::pin!(idle_sleep);

            let pong_sleep = tokio::time::sleep_until(pong_deadline);
            tokio::pin!(pong_sleep);

            tokio::select! {
                biased;

                // Pong timeout: no frame arrived since our Ping went out.
                _ = &mut pong_sleep, if has_pong_timeout && awaiting_pong => {
                    log::warn!(
                        "[queue-link] Pong timeout ({:?}), treating connection as dead",
                        pong_timeout_dur,
                    );
                    let reason = format!("Pong timeout ({:?}): server unresponsive", pong_timeout_dur);
                    event_handlers.emit_disconnect(DisconnectReason::new(&reason));
                    connected.store(false, Ordering::SeqCst);
                    set_state(&status_tx, ConnectionState::Failed, Some(reason));
                    awaiting_pong = false;
                    ws_stream = None;
                    continue;
                }

                // Commands from the public API.
                cmd = cmd_rx.recv() => {
                    let outcome = match cmd {
                        Some(cmd) => handle_command(cmd, Some(&mut *ws), &mut registry).await,
                        None => CmdOutcome::Shutdown, // all handles dropped
                    };
                    match outcome {
                        CmdOutcome::Shutdown => {
                            shutdown_requested = true;
                            continue;
                        }
                        CmdOutcome::TransportBroken => {
                            let reason = "Outbound send failed".to_string();
                            event_handlers.emit_disconnect(DisconnectReason::new(&reason));
                            connected.store(false, Ordering::SeqCst);
                            set_state(&status_tx, ConnectionState::Failed, Some(reason));
                            awaiting_pong = false;
                            ws_stream = None;
                            continue;
                        }
                        CmdOutcome::Continue => {}
                    }
                }

                // Keepalive ping.
                _ = &mut idle_sleep, if has_keepalive && !awaiting_pong => {
                    log::debug!("[queue-link] Keepalive: sending Ping");
                    if let Err(e) = ws.send(Message::Ping(Bytes::new())).await {
                        let reason = format!("Keepalive ping failed: {}", e);
                        log::warn!("[queue-link] {}", reason);
                        event_handlers.emit_disconnect(DisconnectReason::new(&reason));
                        connected.store(false, Ordering::SeqCst);
                        set_state(&status_tx, ConnectionState::Failed, Some(reason));
                        awaiting_pong = false;
                        ws_stream = None;
                        continue;
                    }
                    if has_pong_timeout {
                        awaiting_pong = true;
                        pong_deadline = TokioInstant::now() + pong_timeout_dur;
                    }
                    idle_deadline = TokioInstant::now() + keepalive_dur;
                }

                // Inbound frames.
                frame = ws.next() => {
                    // Any frame proves the connection is alive.
                    idle_deadline = TokioInstant::now() + keepalive_dur;
                    if awaiting_pong {
                        awaiting_pong = false;
                        pong_deadline = TokioInstant::now() + FAR_FUTURE;
                    }

                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if text.len() > MAX_WS_TEXT_MESSAGE_BYTES {
                                log::warn!("[queue-link] Text frame too large ({} bytes)", text.len());
                                continue;
                            }
                            match serde_json::from_str::<ServerFrame>(&text) {
                                Ok(ServerFrame::Message { topic, body }) => {
                                    dispatch_message(ws, &mut registry, &topic, body).await;
                                }
                                Ok(ServerFrame::Error { message }) => {
                                    log::warn!("[queue-link] Server error: {}", message);
                                    event_handlers.emit_error(ConnectionError::new(message, true));
                                }
                                Ok(ServerFrame::Connected) => {
                                    log::debug!("[queue-link] Duplicate connect acknowledgement");
                                }
                                Err(e) => {
                                    log::warn!("[queue-link] Failed to parse frame: {}", e);
                                }
                            }
                        }
                        Some(Ok(Message::Binary(_))) => {
                            log::debug!("[queue-link] Ignoring unexpected binary frame");
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let reason = if let Some(f) = frame {
                                DisconnectReason::with_code(f.reason.to_string(), f.code.into())
                            } else {
                                DisconnectReason::new("Server closed connection")
                            };
                            let message = reason.to_string();
                            event_handlers.emit_disconnect(reason);
                            connected.store(false, Ordering::SeqCst);
                            set_state(&status_tx, ConnectionState::Failed, Some(message));
                            awaiting_pong = false;
                            ws_stream = None;
                            continue;
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = ws.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            log::debug!("[queue-link] Keepalive: received Pong");
                        }
                        Some(Ok(Message::Frame(_))) => {}
                        Some(Err(e)) => {
                            let msg = e.to_string();
                            event_handlers.emit_error(ConnectionError::new(&msg, true));
                            event_handlers.emit_disconnect(
                                DisconnectReason::new(format!("WebSocket error: {}", msg)),
                            );
                            connected.store(false, Ordering::SeqCst);
                            set_state(&status_tx, ConnectionState::Failed, Some(msg));
                            awaiting_pong = false;
                            ws_stream = None;
                            continue;
                        }
                        None => {
                            event_handlers.emit_disconnect(
                                DisconnectReason::new("WebSocket stream ended"),
                            );
                            connected.store(false, Ordering::SeqCst);
                            set_state(
                                &status_tx,
                                ConnectionState::Failed,
                                Some("WebSocket stream ended".to_string()),
                            );
                            awaiting_pong = false;
                            ws_stream = None;
                            continue;
                        }
                    }
                }
            }
        } else {
            // ── Disconnected: fixed-delay retry, commands still serviced ──

            log::info!("[queue-link] Reconnecting in {:?}", reconnect_delay);
            let sleep_fut = tokio::time::sleep(reconnect_delay);
            tokio::pin!(sleep_fut);

            let mut got_shutdown = false;
            loop {
                tokio::select! {
                    biased;
                    cmd = cmd_rx.recv() => {
                        let outcome = match cmd {
                            Some(cmd) => handle_command(cmd, None, &mut registry).await,
                            None => CmdOutcome::Shutdown,
                        };
                        if matches!(outcome, CmdOutcome::Shutdown) {
                            got_shutdown = true;
                            break;
                        }
                    }
                    _ = &mut sleep_fut => {
                        break;
                    }
                }
            }

            if got_shutdown {
                shutdown_requested = true;
                continue;
            }

            set_state(&status_tx, ConnectionState::Connecting, None);
            match establish_ws(&base_url, &options, &timeouts, &event_handlers).await {
                Ok(mut stream) => {
                    log::info!("[queue-link] Reconnection successful");
                    // Replay before announcing readiness, so subscribers
                    // only ever observe Connected with their topics live.
                    resubscribe_all(&mut stream, &registry).await;
                    ws_stream = Some(stream);
                    connected.store(true, Ordering::SeqCst);
                    set_state(&status_tx, ConnectionState::Connected, None);
                    event_handlers.emit_connect();
                    idle_deadline = TokioInstant::now() + keepalive_dur;
                    awaiting_pong = false;
                    pong_deadline = TokioInstant::now() + FAR_FUTURE;
                }
                Err(e) => {
                    log::warn!("[queue-link] Reconnection attempt failed: {}", e);
                    set_state(&status_tx, ConnectionState::Failed, Some(e.to_string()));
                }
            }
        }
    }
}
