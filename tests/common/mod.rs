//! Shared test infrastructure: an in-process queue backend speaking the
//! client's wire protocol on a single port, with WebSocket upgrades on `/ws`
//! and canned HTTP responses for everything else. Tests drive it directly:
//! push messages to topics, swap pull responses, drop connections.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;

/// One canned HTTP response.
#[derive(Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

/// One recorded HTTP request.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// `"METHOD /path"`, e.g. `"GET /api/tokens/department/3"`.
    pub key: String,
    pub body: String,
    pub authorization: Option<String>,
}

struct SessionHandle {
    outbound: mpsc::UnboundedSender<Message>,
    topics: HashSet<String>,
}

struct WsState {
    sessions: Mutex<HashMap<u64, SessionHandle>>,
    handshakes: AtomicUsize,
    subscribe_log: Mutex<Vec<String>>,
    published: Mutex<Vec<(String, String)>>,
    answer_handshake: AtomicBool,
}

impl WsState {
    fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            handshakes: AtomicUsize::new(0),
            subscribe_log: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            answer_handshake: AtomicBool::new(true),
        }
    }
}

#[derive(Default)]
struct ApiState {
    routes: Mutex<HashMap<String, ApiResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// The in-process backend.
pub struct MockBackend {
    addr: SocketAddr,
    ws: Arc<WsState>,
    api: Arc<ApiState>,
    _accept_task: JoinHandle<()>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let ws = Arc::new(WsState::new());
        let api = Arc::new(ApiState::default());

        let ws_state = ws.clone();
        let api_state = api.clone();
        let accept_task = tokio::spawn(async move {
            let mut next_id = 0u64;
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                next_id += 1;
                tokio::spawn(dispatch(
                    ws_state.clone(),
                    api_state.clone(),
                    next_id,
                    stream,
                ));
            }
        });

        Self {
            addr,
            ws,
            api,
            _accept_task: accept_task,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    // ── WebSocket side ──────────────────────────────────────────────────────

    /// Number of connect handshakes completed so far.
    pub fn handshake_count(&self) -> usize {
        self.ws.handshakes.load(Ordering::SeqCst)
    }

    /// Stop acknowledging connect frames (handshake timeout tests).
    pub fn silence_handshake(&self) {
        self.ws.answer_handshake.store(false, Ordering::SeqCst);
    }

    pub async fn session_count(&self) -> usize {
        self.ws.sessions.lock().await.len()
    }

    /// Topics with a live wire subscription, sorted and deduplicated.
    pub async fn subscribed_topics(&self) -> Vec<String> {
        let sessions = self.ws.sessions.lock().await;
        let mut topics: Vec<String> = sessions
            .values()
            .flat_map(|s| s.topics.iter().cloned())
            .collect();
        topics.sort();
        topics.dedup();
        topics
    }

    /// Every subscribe frame seen, in arrival order, reconnects included.
    pub async fn subscribe_log(&self) -> Vec<String> {
        self.ws.subscribe_log.lock().await.clone()
    }

    /// Messages clients published over the channel, as `(topic, body)`.
    pub async fn published(&self) -> Vec<(String, String)> {
        self.ws.published.lock().await.clone()
    }

    /// Push a JSON payload to every session subscribed to `topic`.
    pub async fn push_json(&self, topic: &str, payload: serde_json::Value) {
        self.push_raw(topic, payload.to_string()).await;
    }

    /// Push a raw body, JSON or not.
    pub async fn push_raw(&self, topic: &str, body: impl Into<String>) {
        let frame = json!({"type": "message", "topic": topic, "body": body.into()}).to_string();
        let sessions = self.ws.sessions.lock().await;
        for session in sessions.values() {
            if session.topics.contains(topic) {
                let _ = session.outbound.send(Message::Text(frame.clone().into()));
            }
        }
    }

    /// Abruptly drop every live connection.
    pub async fn drop_connections(&self) {
        self.ws.sessions.lock().await.clear();
    }

    // ── HTTP side ───────────────────────────────────────────────────────────

    /// Respond 200 with `payload` for `"METHOD /path"`.
    pub async fn set_json(&self, key: &str, payload: serde_json::Value) {
        self.api.routes.lock().await.insert(
            key.to_string(),
            ApiResponse {
                status: 200,
                body: payload.to_string(),
            },
        );
    }

    /// Respond with an arbitrary status and body.
    pub async fn set_response(&self, key: &str, status: u16, body: &str) {
        self.api.routes.lock().await.insert(
            key.to_string(),
            ApiResponse {
                status,
                body: body.to_string(),
            },
        );
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.api.requests.lock().await.clone()
    }

    pub async fn request_count(&self, key: &str) -> usize {
        self.api
            .requests
            .lock()
            .await
            .iter()
            .filter(|r| r.key == key)
            .count()
    }

    pub async fn last_request(&self, key: &str) -> Option<RecordedRequest> {
        self.api
            .requests
            .lock()
            .await
            .iter()
            .rev()
            .find(|r| r.key == key)
            .cloned()
    }
}

/// Route one accepted connection: `/ws` upgrades become sessions, anything
/// else is served as plain HTTP. The request line is peeked, not consumed,
/// so the WebSocket handshake still sees a pristine stream.
async fn dispatch(ws: Arc<WsState>, api: Arc<ApiState>, id: u64, stream: TcpStream) {
    let mut head = [0u8; 512];
    let mut seen = 0usize;
    for _ in 0..100 {
        match stream.peek(&mut head).await {
            Ok(n) => {
                seen = n;
                if head[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(_) => return,
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let request_line = String::from_utf8_lossy(&head[..seen]);
    if request_line.starts_with("GET /ws") {
        run_ws_session(ws, id, stream).await;
    } else {
        serve_http(api, stream).await;
    }
}

async fn run_ws_session(state: Arc<WsState>, id: u64, stream: TcpStream) {
    let mut ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(_) => return,
    };

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
    state.sessions.lock().await.insert(
        id,
        SessionHandle {
            outbound: outbound_tx,
            topics: HashSet::new(),
        },
    );

    loop {
        tokio::select! {
            queued = outbound_rx.recv() => {
                match queued {
                    Some(message) => {
                        if ws_stream.send(message).await.is_err() {
                            break;
                        }
                    }
                    // Sender gone: the test dropped this connection.
                    None => break,
                }
            }
            frame = ws_stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_client_frame(&state, id, &text).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = ws_stream.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    let _ = ws_stream.close(None).await;
    state.sessions.lock().await.remove(&id);
}

/// Returns false once the session has been dropped out from under us.
async fn handle_client_frame(state: &Arc<WsState>, id: u64, text: &str) -> bool {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        return true;
    };
    match value["type"].as_str() {
        Some("connect") => {
            state.handshakes.fetch_add(1, Ordering::SeqCst);
            if state.answer_handshake.load(Ordering::SeqCst) {
                let ack = json!({"type": "connected"}).to_string();
                let sessions = state.sessions.lock().await;
                match sessions.get(&id) {
                    Some(session) => {
                        let _ = session.outbound.send(Message::Text(ack.into()));
                    }
                    None => return false,
                }
            }
        }
        Some("subscribe") => {
            if let Some(topic) = value["topic"].as_str() {
                state.subscribe_log.lock().await.push(topic.to_string());
                let mut sessions = state.sessions.lock().await;
                match sessions.get_mut(&id) {
                    Some(session) => {
                        session.topics.insert(topic.to_string());
                    }
                    None => return false,
                }
            }
        }
        Some("unsubscribe") => {
            if let Some(topic) = value["topic"].as_str() {
                let mut sessions = state.sessions.lock().await;
                match sessions.get_mut(&id) {
                    Some(session) => {
                        session.topics.remove(topic);
                    }
                    None => return false,
                }
            }
        }
        Some("send") => {
            let topic = value["topic"].as_str().unwrap_or_default().to_string();
            let body = value["body"].as_str().unwrap_or_default().to_string();
            state.published.lock().await.push((topic, body));
        }
        _ => {}
    }
    true
}

async fn serve_http(api: Arc<ApiState>, mut stream: TcpStream) {
    let mut buf: Vec<u8> = Vec::with_capacity(2048);
    let mut chunk = [0u8; 2048];

    let header_end = loop {
        let Ok(n) = stream.read(&mut chunk).await else {
            return;
        };
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        if buf.len() > 64 * 1024 {
            return;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let Ok(n) = stream.read(&mut chunk).await else {
            return;
        };
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let request_line = head.lines().next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let path = parts.next().unwrap_or_default();
    let key = format!("{} {}", method, path);

    let authorization = head.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.eq_ignore_ascii_case("authorization") {
            Some(value.trim().to_string())
        } else {
            None
        }
    });

    let body = String::from_utf8_lossy(&buf[header_end..]).into_owned();
    api.requests.lock().await.push(RecordedRequest {
        key: key.clone(),
        body,
        authorization,
    });

    let response = api
        .routes
        .lock()
        .await
        .get(&key)
        .cloned()
        .unwrap_or(ApiResponse {
            status: 404,
            body: "{\"error\":\"no route\"}".to_string(),
        });

    let reason = match response.status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Status",
    };
    let raw = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        response.status,
        reason,
        response.body.len(),
        response.body
    );
    let _ = stream.write_all(raw.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

// ── helpers ─────────────────────────────────────────────────────────────────

/// Poll `condition` until it holds, or panic after `deadline`.
pub async fn wait_until<F, Fut>(deadline: Duration, what: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    loop {
        if condition().await {
            return;
        }
        if start.elapsed() >= deadline {
            panic!("Timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// A queue token in the server's JSON shape.
pub fn token_json(id: i64, status: &str, position: i32) -> serde_json::Value {
    json!({
        "id": id,
        "tokenNumber": format!("A-{:03}", id),
        "userId": 100 + id,
        "departmentId": 3,
        "departmentName": "Cardiology",
        "status": status,
        "queuePosition": position,
    })
}
