//! Per-surface queue state reconciliation.
//!
//! A [`QueueReconciler`] keeps one surface's view of a queue fresh by
//! combining the two data paths:
//!
//! - **Pull** is authoritative: the REST endpoint for the scope is fetched on
//!   activation, on every push, and on a fixed interval.
//! - **Push is an invalidation hint, not a delta.** Message payloads are
//!   never patched into state; a push only means "your view is stale, pull
//!   again". This keeps a missed or reordered push from ever corrupting the
//!   view; the worst case is staleness for one interval.
//!
//! State is published on a watch channel; UIs hold the receiver and rerender
//! on change.

use crate::{
    client::QueueLinkClient,
    error::{QueueLinkError, Result},
    models::{QueueSnapshot, Token, TokenStatus, Topic, TopicMessage},
};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Default interval between background pulls.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Capacity of the merged invalidation hint channel.
const HINT_CHANNEL_CAPACITY: usize = 64;

// ── Scope and configuration ─────────────────────────────────────────────────

/// Which queue a reconciled view tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueScope {
    /// A department's queue: staff dashboards and waiting room displays.
    Department(i64),
    /// One user's tokens across departments: the patient's own view.
    User(i64),
}

impl QueueScope {
    /// Topics a surface with this scope listens on by default.
    pub fn default_topics(&self) -> Vec<Topic> {
        match self {
            QueueScope::Department(id) => vec![Topic::department_queue(*id)],
            QueueScope::User(id) => {
                vec![Topic::user_notifications(*id), Topic::user_calls(*id)]
            }
        }
    }

    async fn pull(&self, client: &QueueLinkClient) -> Result<Vec<Token>> {
        match self {
            QueueScope::Department(id) => client.department_queue(*id).await,
            QueueScope::User(id) => client.user_tokens(*id).await,
        }
    }
}

/// Configuration for one reconciled queue view.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// The queue this view tracks.
    pub scope: QueueScope,
    /// Topics whose pushes invalidate the view. Starts as the scope's
    /// defaults.
    pub topics: Vec<Topic>,
    /// Fixed interval between background pulls.
    pub refresh_interval: Duration,
}

impl ReconcilerConfig {
    pub fn new(scope: QueueScope) -> Self {
        Self {
            scope,
            topics: scope.default_topics(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }

    /// Listen on an additional topic, e.g. the status or cancellation feed.
    pub fn with_topic(mut self, topic: Topic) -> Self {
        self.topics.push(topic);
        self
    }

    /// Replace the topic set entirely.
    pub fn with_topics(mut self, topics: Vec<Topic>) -> Self {
        self.topics = topics;
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }
}

// ── Published state ─────────────────────────────────────────────────────────

/// Published view state for one surface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueViewState {
    /// Latest reconciled snapshot. A failed pull leaves it unchanged.
    pub snapshot: QueueSnapshot,
    /// Message of the most recent failed pull; cleared by the next success.
    /// Surfaces show this as their "retry" banner.
    pub last_error: Option<String>,
    /// Unix millis of the last successful pull. `None` until the first.
    pub last_sync_ms: Option<u64>,
}

fn now_epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// ── Reconciler handle ───────────────────────────────────────────────────────

enum ViewCmd {
    Refresh,
    Shutdown,
}

/// A live reconciled view of one queue.
///
/// Spawn with [`QueueReconciler::spawn`] after the client is connected; read
/// through [`state`](Self::state) or [`watch`](Self::watch). Dropping the
/// handle (or [`close`](Self::close)) stops the pulls and releases every
/// subscription it holds.
pub struct QueueReconciler {
    scope: QueueScope,
    state_rx: watch::Receiver<QueueViewState>,
    cmd_tx: mpsc::Sender<ViewCmd>,
    task: Option<JoinHandle<()>>,
    closed: bool,
}

impl QueueReconciler {
    /// Subscribe to the configured topics and start reconciling.
    ///
    /// Requires a prior [`connect`](QueueLinkClient::connect) on the client;
    /// subscription errors surface here. The first pull happens immediately
    /// after spawn and seeds the snapshot.
    pub async fn spawn(client: QueueLinkClient, config: ReconcilerConfig) -> Result<Self> {
        if config.topics.is_empty() {
            return Err(QueueLinkError::ConfigurationError(
                "Reconciler needs at least one topic".to_string(),
            ));
        }
        if config.refresh_interval.is_zero() {
            return Err(QueueLinkError::ConfigurationError(
                "refresh_interval must be positive".to_string(),
            ));
        }

        // Subscribe before the seed pull, so no invalidation can slip into
        // the gap between fetching initial state and listening for changes.
        let mut subscriptions = Vec::with_capacity(config.topics.len());
        for topic in &config.topics {
            subscriptions.push(client.subscribe(topic.clone()).await?);
        }

        // Merge every topic's messages into one hint channel. A forwarder
        // ends when its subscription does, or when the reconciler stops
        // listening; either way it releases its handle.
        let (hint_tx, hint_rx) = mpsc::channel::<TopicMessage>(HINT_CHANNEL_CAPACITY);
        let mut forwarders = Vec::with_capacity(subscriptions.len());
        for mut subscription in subscriptions {
            let hint_tx = hint_tx.clone();
            forwarders.push(tokio::spawn(async move {
                while let Some(message) = subscription.next().await {
                    if hint_tx.send(message).await.is_err() {
                        break;
                    }
                }
                subscription.close().await;
            }));
        }
        drop(hint_tx);

        let (cmd_tx, cmd_rx) = mpsc::channel::<ViewCmd>(8);
        let (state_tx, state_rx) = watch::channel(QueueViewState::default());
        let scope = config.scope;

        let task = tokio::spawn(reconcile_task(
            client, config, state_tx, cmd_rx, hint_rx, forwarders,
        ));

        Ok(Self {
            scope,
            state_rx,
            cmd_tx,
            task: Some(task),
            closed: false,
        })
    }

    /// The scope this view tracks.
    pub fn scope(&self) -> QueueScope {
        self.scope
    }

    /// Current view state.
    pub fn state(&self) -> QueueViewState {
        self.state_rx.borrow().clone()
    }

    /// Watch receiver for view updates: `changed().await`, then `borrow()`.
    pub fn watch(&self) -> watch::Receiver<QueueViewState> {
        self.state_rx.clone()
    }

    /// Request an immediate out-of-band pull (the retry affordance behind a
    /// failed-sync banner).
    pub async fn refresh(&self) -> Result<()> {
        self.cmd_tx.send(ViewCmd::Refresh).await.map_err(|_| {
            QueueLinkError::InternalError("Reconciler task is not running".to_string())
        })
    }

    /// Stop reconciling.
    ///
    /// Idempotent. The interval dies with the task and every subscription
    /// handle is released, which in turn drops the wire subscriptions no
    /// other surface is using.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.cmd_tx.send(ViewCmd::Shutdown).await;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for QueueReconciler {
    fn drop(&mut self) {
        if !self.closed {
            // Best-effort stop; close() is the reliable path.
            let _ = self.cmd_tx.try_send(ViewCmd::Shutdown);
        }
    }
}

impl std::fmt::Debug for QueueReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueReconciler")
            .field("scope", &self.scope)
            .field("closed", &self.closed)
            .finish()
    }
}

// ── Reconciliation task ─────────────────────────────────────────────────────

async fn reconcile_task(
    client: QueueLinkClient,
    config: ReconcilerConfig,
    state_tx: watch::Sender<QueueViewState>,
    mut cmd_rx: mpsc::Receiver<ViewCmd>,
    mut hint_rx: mpsc::Receiver<TopicMessage>,
    forwarders: Vec<JoinHandle<()>>,
) {
    let mut terminal_seen: HashMap<i64, TokenStatus> = HashMap::new();
    let mut hints_open = true;

    // The first tick fires immediately: that is the activation pull.
    let mut interval = tokio::time::interval(config.refresh_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ViewCmd::Refresh) => {
                        log::debug!(
                            "[queue-link] Out-of-band refresh for {:?}",
                            config.scope
                        );
                        reconcile_once(&client, &config, &state_tx, &mut terminal_seen).await;
                    }
                    Some(ViewCmd::Shutdown) | None => break,
                }
            }

            hint = hint_rx.recv(), if hints_open => {
                match hint {
                    Some(message) => {
                        log::debug!(
                            "[queue-link] Invalidation hint on {} for {:?}",
                            message.topic,
                            config.scope
                        );
                        // A burst of pushes coalesces into one pull; the
                        // pull is authoritative, so nothing is lost.
                        let mut coalesced = 0usize;
                        while hint_rx.try_recv().is_ok() {
                            coalesced += 1;
                        }
                        if coalesced > 0 {
                            log::debug!(
                                "[queue-link] Coalesced {} additional hint(s)",
                                coalesced
                            );
                        }
                        reconcile_once(&client, &config, &state_tx, &mut terminal_seen).await;
                    }
                    None => {
                        // Every forwarder ended: the event channel is gone
                        // for good. Interval pulls keep the view usable.
                        log::warn!(
                            "[queue-link] Push feed ended for {:?}; continuing pull-only",
                            config.scope
                        );
                        hints_open = false;
                    }
                }
            }

            _ = interval.tick() => {
                reconcile_once(&client, &config, &state_tx, &mut terminal_seen).await;
            }
        }
    }

    // Release push handles promptly rather than waiting for their next
    // message to notice the closed hint channel.
    for forwarder in &forwarders {
        forwarder.abort();
    }
    log::debug!("[queue-link] Reconciler for {:?} stopped", config.scope);
}

/// One pull-and-publish cycle. Failures update `last_error` and keep the
/// previous snapshot; they never terminate the task.
async fn reconcile_once(
    client: &QueueLinkClient,
    config: &ReconcilerConfig,
    state_tx: &watch::Sender<QueueViewState>,
    terminal_seen: &mut HashMap<i64, TokenStatus>,
) {
    match config.scope.pull(client).await {
        Ok(mut tokens) => {
            apply_terminal_overrides(&mut tokens, terminal_seen);
            let snapshot = QueueSnapshot::compute(&tokens);
            state_tx.send_modify(|state| {
                state.snapshot = snapshot;
                state.last_error = None;
                state.last_sync_ms = Some(now_epoch_ms());
            });
        }
        Err(e) => {
            log::warn!("[queue-link] Pull failed for {:?}: {}", config.scope, e);
            state_tx.send_modify(|state| {
                state.last_error = Some(e.to_string());
            });
        }
    }
}

/// Enforce terminal-state monotonicity on a freshly pulled token list.
///
/// Remembers the terminal status last seen per token id, scoped to ids the
/// server still reports. A token reported active again after a terminal
/// status was observed is stale data and gets overridden back.
fn apply_terminal_overrides(
    tokens: &mut [Token],
    terminal_seen: &mut HashMap<i64, TokenStatus>,
) {
    let current_ids: HashSet<i64> = tokens.iter().map(|t| t.id).collect();
    terminal_seen.retain(|id, _| current_ids.contains(id));

    for token in tokens.iter_mut() {
        if let Some(seen) = terminal_seen.get(&token.id).cloned() {
            if !token.status.is_terminal() {
                log::warn!(
                    "[queue-link] Stale pull: token {} reported {} after {}, keeping {}",
                    token.id,
                    token.status,
                    seen,
                    seen
                );
                token.status = seen;
            }
        }
        if token.status.is_terminal() {
            terminal_seen.insert(token.id, token.status.clone());
        }
    }
}
