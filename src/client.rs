//! Client entry point: queue pulls over HTTP plus the multiplexed event
//! channel.
//!
//! [`QueueLinkClient`] is cheap to clone (all clones share one connection and
//! one HTTP pool) and is handed to the components that need it rather than
//! reached for through a global.

use crate::{
    auth::AuthProvider,
    connection::{ConnectionState, ConnectionStatus, SharedConnection},
    error::{QueueLinkError, Result},
    event_handlers::EventHandlers,
    models::{
        ConnectionOptions, DashboardStats, Department, Token, TokenRequest, TokenStatus, Topic,
    },
    subscription::Subscription,
    timeouts::QueueLinkTimeouts,
};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Serialize)]
struct StatusUpdateBody {
    status: TokenStatus,
}

struct ClientInner {
    base_url: String,
    api_base: String,
    http: reqwest::Client,
    auth: AuthProvider,
    timeouts: QueueLinkTimeouts,
    options: ConnectionOptions,
    event_handlers: EventHandlers,
    /// The shared event channel, created on the first `connect()`.
    connection: Mutex<Option<Arc<SharedConnection>>>,
}

/// Client for a hospital queue backend: REST pulls plus real-time pushes.
///
/// Pulls fetch authoritative queue state over HTTP; [`subscribe`] attaches to
/// server pushes on the shared WebSocket channel. One client holds at most
/// one connection no matter how many topics are subscribed, and clones share
/// everything.
///
/// # Example
///
/// ```no_run
/// use queue_link::{QueueLinkClient, Topic};
///
/// # async fn run() -> queue_link::Result<()> {
/// let client = QueueLinkClient::builder()
///     .base_url("http://localhost:8080")
///     .build()?;
///
/// client.connect().await?;
///
/// let tokens = client.department_queue(3).await?;
/// println!("{} token(s) in the queue", tokens.len());
///
/// let mut queue = client.subscribe(Topic::department_queue(3)).await?;
/// while let Some(message) = queue.next().await {
///     println!("queue changed: {:?}", message.payload);
/// }
/// # Ok(())
/// # }
/// ```
///
/// [`subscribe`]: Self::subscribe
#[derive(Clone)]
pub struct QueueLinkClient {
    inner: Arc<ClientInner>,
}

impl QueueLinkClient {
    /// Start building a client.
    pub fn builder() -> QueueLinkClientBuilder {
        QueueLinkClientBuilder::new()
    }

    /// The configured base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// The configured timeouts.
    pub fn timeouts(&self) -> &QueueLinkTimeouts {
        &self.inner.timeouts
    }

    // ── Event channel ───────────────────────────────────────────────────────

    /// Open the shared event channel.
    ///
    /// Idempotent: repeated and concurrent calls share one connection and one
    /// handshake. Resolves once the channel reports `Connected`. If the
    /// attempt fails this returns a [`TransportError`], but the supervisor
    /// keeps retrying in the background at a fixed delay; a later
    /// [`subscribe`](Self::subscribe) can still succeed.
    ///
    /// [`TransportError`]: QueueLinkError::TransportError
    pub async fn connect(&self) -> Result<()> {
        let conn = {
            let mut guard = self.inner.connection.lock().await;
            guard
                .get_or_insert_with(|| {
                    Arc::new(SharedConnection::open(
                        self.inner.base_url.clone(),
                        self.inner.timeouts.clone(),
                        self.inner.options.clone(),
                        self.inner.event_handlers.clone(),
                    ))
                })
                .clone()
        };

        if conn.is_connected() {
            return Ok(());
        }

        // One full attempt: socket establishment plus handshake ack.
        let limit = self.inner.timeouts.connect_timeout + self.inner.timeouts.handshake_timeout;
        match conn.wait_settled(limit).await? {
            Some(status) if status.state == ConnectionState::Connected => Ok(()),
            Some(status) => Err(QueueLinkError::TransportError(
                status
                    .last_error
                    .unwrap_or_else(|| "connection failed".to_string()),
            )),
            None => Err(QueueLinkError::TransportError(format!(
                "Connection not established within {:?}",
                limit
            ))),
        }
    }

    /// Close the event channel and end every subscription.
    ///
    /// Idempotent. Active [`Subscription`]s see `next()` return `None`.
    /// Reconnection stops; a later [`connect`](Self::connect) starts fresh.
    pub async fn disconnect(&self) {
        let conn = self.inner.connection.lock().await.take();
        if let Some(conn) = conn {
            conn.disconnect().await;
        }
    }

    /// Whether the event channel is currently open and acknowledged.
    ///
    /// Answers from local state without touching the network.
    pub async fn is_connected(&self) -> bool {
        let guard = self.inner.connection.lock().await;
        guard.as_ref().map(|c| c.is_connected()).unwrap_or(false)
    }

    /// Snapshot of the channel state and the most recent transport error.
    pub async fn status(&self) -> ConnectionStatus {
        let guard = self.inner.connection.lock().await;
        guard.as_ref().map(|c| c.status()).unwrap_or_default()
    }

    /// Watch receiver for connection state transitions, or `None` before
    /// the first [`connect`](Self::connect).
    pub async fn watch_status(&self) -> Option<tokio::sync::watch::Receiver<ConnectionStatus>> {
        let guard = self.inner.connection.lock().await;
        guard.as_ref().map(|c| c.watch_status())
    }

    /// Subscribe to a topic on the shared event channel.
    ///
    /// Requires a prior [`connect`](Self::connect); otherwise fails with
    /// [`NotConnectedError`]. While the channel is between reconnect
    /// attempts this waits up to `subscribe_wait` for readiness instead of
    /// failing, and reports expiry as a [`TimeoutError`].
    ///
    /// Subscribing to the same topic twice yields two independent handles,
    /// each receiving every message, over a single wire subscription.
    ///
    /// [`NotConnectedError`]: QueueLinkError::NotConnectedError
    /// [`TimeoutError`]: QueueLinkError::TimeoutError
    pub async fn subscribe(&self, topic: Topic) -> Result<Subscription> {
        let conn = self
            .connection_handle()
            .await
            .ok_or(QueueLinkError::NotConnectedError)?;
        if !conn.is_connected() {
            let ready = conn
                .wait_connected(self.inner.timeouts.subscribe_wait)
                .await?;
            if !ready {
                return Err(QueueLinkError::TimeoutError(format!(
                    "Event channel not ready within {:?}",
                    self.inner.timeouts.subscribe_wait
                )));
            }
        }
        conn.subscribe(topic).await
    }

    /// Drop a topic subscription entirely, every handle included.
    ///
    /// Silent no-op for topics that were never subscribed.
    pub async fn unsubscribe(&self, topic: &Topic) -> Result<()> {
        match self.connection_handle().await {
            Some(conn) => conn.unsubscribe(topic).await,
            None => Ok(()),
        }
    }

    /// Drop every topic subscription.
    pub async fn unsubscribe_all(&self) -> Result<()> {
        match self.connection_handle().await {
            Some(conn) => conn.unsubscribe_all().await,
            None => Ok(()),
        }
    }

    /// Publish a payload to a topic over the event channel.
    ///
    /// Fails with [`NotConnectedError`] while the channel is down. The
    /// message is not queued for later delivery, and subscription state is
    /// untouched by the failure.
    ///
    /// [`NotConnectedError`]: QueueLinkError::NotConnectedError
    pub async fn publish<T: Serialize>(&self, topic: &Topic, payload: &T) -> Result<()> {
        let conn = self
            .connection_handle()
            .await
            .ok_or(QueueLinkError::NotConnectedError)?;
        let body = serde_json::to_string(payload).map_err(|e| {
            QueueLinkError::InternalError(format!("Failed to serialize payload: {}", e))
        })?;
        conn.publish(topic, body).await
    }

    async fn connection_handle(&self) -> Option<Arc<SharedConnection>> {
        self.inner.connection.lock().await.clone()
    }

    // ── Pulls ───────────────────────────────────────────────────────────────

    /// Fetch the authoritative token list for a department queue.
    pub async fn department_queue(&self, department_id: i64) -> Result<Vec<Token>> {
        self.get_json(
            &format!("/tokens/department/{}", department_id),
            "department queue pull",
        )
        .await
    }

    /// Fetch all tokens belonging to a user.
    pub async fn user_tokens(&self, user_id: i64) -> Result<Vec<Token>> {
        self.get_json(&format!("/tokens/user/{}", user_id), "user tokens pull")
            .await
    }

    /// Fetch one department.
    pub async fn department(&self, department_id: i64) -> Result<Department> {
        self.get_json(&format!("/departments/{}", department_id), "department pull")
            .await
    }

    /// Fetch every department.
    pub async fn departments(&self) -> Result<Vec<Department>> {
        self.get_json("/departments", "departments pull").await
    }

    /// Fetch aggregate statistics for a department's dashboard.
    pub async fn dashboard_stats(&self, department_id: i64) -> Result<DashboardStats> {
        self.get_json(
            &format!("/dashboard/stats/{}", department_id),
            "dashboard stats pull",
        )
        .await
    }

    /// Create a queue token.
    pub async fn create_token(&self, request: &TokenRequest) -> Result<Token> {
        self.send_json(reqwest::Method::POST, "/tokens", request, "token create")
            .await
    }

    /// Update a token's status, returning the updated token.
    ///
    /// The server owns the transition rules; use
    /// [`TokenStatus::can_transition_to`] to pre-validate locally.
    pub async fn update_token_status(&self, token_id: i64, status: TokenStatus) -> Result<Token> {
        self.send_json(
            reqwest::Method::PUT,
            &format!("/tokens/{}/status", token_id),
            &StatusUpdateBody { status },
            "token status update",
        )
        .await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, context: &str) -> Result<T> {
        let url = format!("{}{}", self.inner.api_base, path);
        log::debug!("[queue-link] GET {}", url);
        let response = self
            .authorize(self.inner.http.get(&url))
            .send()
            .await
            .map_err(|e| QueueLinkError::PullError(format!("{}: {}", context, e)))?;
        let response = check_status(response, context).await?;
        response.json::<T>().await.map_err(|e| {
            QueueLinkError::DecodeError(format!("{}: invalid response body: {}", context, e))
        })
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
        context: &str,
    ) -> Result<T> {
        let url = format!("{}{}", self.inner.api_base, path);
        log::debug!("[queue-link] {} {}", method, url);
        let response = self
            .authorize(self.inner.http.request(method, &url))
            .json(body)
            .send()
            .await
            .map_err(|e| QueueLinkError::PullError(format!("{}: {}", context, e)))?;
        let response = check_status(response, context).await?;
        response.json::<T>().await.map_err(|e| {
            QueueLinkError::DecodeError(format!("{}: invalid response body: {}", context, e))
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.inner.auth.header_value() {
            Some(value) => request.header(reqwest::header::AUTHORIZATION, value),
            None => request,
        }
    }
}

/// Map a non-success response to the error taxonomy: 401/403 to
/// `AuthenticationError`, anything else to `PullError`, body text included
/// when the server sent one.
async fn check_status(response: reqwest::Response, context: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = if body.is_empty() {
        format!("{} returned {}", context, status.as_u16())
    } else {
        format!("{} returned {}: {}", context, status.as_u16(), body)
    };
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        Err(QueueLinkError::AuthenticationError(detail))
    } else {
        Err(QueueLinkError::PullError(detail))
    }
}

// ── Builder ─────────────────────────────────────────────────────────────────

/// Builder for [`QueueLinkClient`].
#[derive(Debug, Default)]
pub struct QueueLinkClientBuilder {
    base_url: Option<String>,
    auth: AuthProvider,
    timeouts: QueueLinkTimeouts,
    options: ConnectionOptions,
    event_handlers: EventHandlers,
}

impl QueueLinkClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend base URL, e.g. `http://localhost:8080`. Required.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Credentials attached to pull requests.
    pub fn auth(mut self, auth: AuthProvider) -> Self {
        self.auth = auth;
        self
    }

    /// Timeout configuration. Defaults to [`QueueLinkTimeouts::default`].
    pub fn timeouts(mut self, timeouts: QueueLinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Event channel tuning (reconnect delay, endpoint path, buffering).
    pub fn connection_options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Callbacks for connection lifecycle events.
    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = handlers;
        self
    }

    /// Build the client. Validates the base URL and constructs the HTTP
    /// pool; the event channel is not opened until `connect()`.
    pub fn build(self) -> Result<QueueLinkClient> {
        let base_url = self.base_url.ok_or_else(|| {
            QueueLinkError::ConfigurationError("base_url is required".to_string())
        })?;
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(QueueLinkError::ConfigurationError(format!(
                "base_url must start with http:// or https:// (got {})",
                base_url
            )));
        }
        let base_url = base_url.trim_end_matches('/').to_string();

        let mut http_builder = reqwest::Client::builder();
        if !QueueLinkTimeouts::is_no_timeout(self.timeouts.pull_timeout) {
            http_builder = http_builder.timeout(self.timeouts.pull_timeout);
        }
        if !QueueLinkTimeouts::is_no_timeout(self.timeouts.connect_timeout) {
            http_builder = http_builder.connect_timeout(self.timeouts.connect_timeout);
        }
        let http = http_builder.build().map_err(|e| {
            QueueLinkError::ConfigurationError(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(QueueLinkClient {
            inner: Arc::new(ClientInner {
                api_base: format!("{}/api", base_url),
                base_url,
                http,
                auth: self.auth,
                timeouts: self.timeouts,
                options: self.options,
                event_handlers: self.event_handlers,
                connection: Mutex::new(None),
            }),
        })
    }
}
