//! Integration tests for queue view reconciliation: the pull/push loop that
//! keeps one surface's snapshot fresh. These tests verify that:
//!
//! - Spawning performs an immediate seed pull and publishes the snapshot.
//! - A push on a watched topic is treated as an invalidation hint: the
//!   payload is discarded and the authoritative endpoint is re-pulled.
//! - A failed pull sets `last_error` and keeps the previous snapshot; the
//!   next successful pull clears it.
//! - The fixed-interval pull picks up server-side changes with no pushes.
//! - A token observed in a terminal state is never resurrected by a stale
//!   pull, while ids the server stopped reporting are forgotten.
//! - `close()` releases the view's subscriptions without disturbing the
//!   shared connection.
//! - User-scoped views pull the user endpoint and listen on the personal
//!   topics.
//!
//! Everything runs against an in-process backend; no external server.

use queue_link::{
    ConnectionOptions, QueueLinkClient, QueueLinkError, QueueLinkTimeouts, QueueReconciler,
    QueueScope, ReconcilerConfig, Topic,
};
use serde_json::json;
use std::time::Duration;

mod common;

use common::{token_json, wait_until, MockBackend};

// ── shared helpers ──────────────────────────────────────────────────────────

const WAIT: Duration = Duration::from_secs(5);
const DEPARTMENT_ROUTE: &str = "GET /api/tokens/department/3";

/// An interval long enough that only hints or explicit refreshes pull.
const NO_INTERVAL: Duration = Duration::from_secs(600);

fn quick_client(base_url: &str) -> QueueLinkClient {
    QueueLinkClient::builder()
        .base_url(base_url)
        .timeouts(
            QueueLinkTimeouts::builder()
                .connect_timeout_secs(3)
                .handshake_timeout_secs(2)
                .subscribe_wait_secs(3)
                .send_timeout_secs(3)
                .pull_timeout_secs(5)
                .keepalive_interval_secs(30)
                .build(),
        )
        .connection_options(ConnectionOptions::new().with_reconnect_delay_ms(100))
        .build()
        .unwrap()
}

async fn connected_client(backend: &MockBackend) -> QueueLinkClient {
    let client = quick_client(&backend.base_url());
    client.connect().await.unwrap();
    client
}

fn department_config(interval: Duration) -> ReconcilerConfig {
    ReconcilerConfig::new(QueueScope::Department(3)).with_refresh_interval(interval)
}

// ── seed pull ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn activation_pull_seeds_the_snapshot() {
    let backend = MockBackend::start().await;
    backend
        .set_json(
            DEPARTMENT_ROUTE,
            json!([
                token_json(1, "WAITING", 1),
                token_json(2, "IN_PROGRESS", 0),
            ]),
        )
        .await;
    let client = connected_client(&backend).await;

    let reconciler = QueueReconciler::spawn(client, department_config(NO_INTERVAL))
        .await
        .unwrap();

    wait_until(WAIT, "the seed pull", || async {
        reconciler.state().last_sync_ms.is_some()
    })
    .await;

    let state = reconciler.state();
    assert_eq!(state.snapshot.waiting, 1);
    assert_eq!(state.snapshot.in_progress, 1);
    assert_eq!(state.snapshot.total, 2);
    assert!(state.last_error.is_none());
    assert_eq!(backend.request_count(DEPARTMENT_ROUTE).await, 1);

    // The view listens on the department queue topic.
    wait_until(WAIT, "the wire subscription", || async {
        backend.subscribed_topics().await == vec!["/topic/queue/3".to_string()]
    })
    .await;
}

// ── invalidation hints ──────────────────────────────────────────────────────

#[tokio::test]
async fn push_invalidates_and_repulls() {
    let backend = MockBackend::start().await;
    backend
        .set_json(
            DEPARTMENT_ROUTE,
            json!([
                token_json(1, "WAITING", 1),
                token_json(2, "IN_PROGRESS", 0),
            ]),
        )
        .await;
    let client = connected_client(&backend).await;

    let reconciler = QueueReconciler::spawn(client, department_config(NO_INTERVAL))
        .await
        .unwrap();
    wait_until(WAIT, "the seed pull", || async {
        reconciler.state().snapshot.total == 2
    })
    .await;
    wait_until(WAIT, "the wire subscription", || async {
        !backend.subscribed_topics().await.is_empty()
    })
    .await;

    // Token 2 completes server-side. The push body carries a delta the
    // reconciler must ignore in favour of the endpoint.
    backend
        .set_json(
            DEPARTMENT_ROUTE,
            json!([
                token_json(1, "WAITING", 1),
                token_json(2, "COMPLETED", 0),
            ]),
        )
        .await;
    backend
        .push_json(
            "/topic/queue/3",
            json!({"event": "STATUS_CHANGE", "tokenId": 2, "status": "bogus delta"}),
        )
        .await;

    wait_until(WAIT, "the invalidation re-pull", || async {
        reconciler.state().snapshot.total == 1
    })
    .await;
    let state = reconciler.state();
    assert_eq!(state.snapshot.waiting, 1);
    assert_eq!(state.snapshot.in_progress, 0);
    assert!(backend.request_count(DEPARTMENT_ROUTE).await >= 2);
}

#[tokio::test]
async fn additional_topics_also_invalidate() {
    let backend = MockBackend::start().await;
    backend
        .set_json(DEPARTMENT_ROUTE, json!([token_json(1, "WAITING", 1)]))
        .await;
    let client = connected_client(&backend).await;

    let config = department_config(NO_INTERVAL).with_topic(Topic::queue_status(3));
    let reconciler = QueueReconciler::spawn(client, config).await.unwrap();
    wait_until(WAIT, "the seed pull", || async {
        reconciler.state().snapshot.total == 1
    })
    .await;
    wait_until(WAIT, "both wire subscriptions", || async {
        backend.subscribed_topics().await.len() == 2
    })
    .await;

    backend
        .set_json(
            DEPARTMENT_ROUTE,
            json!([token_json(1, "WAITING", 1), token_json(2, "WAITING", 2)]),
        )
        .await;
    backend
        .push_json("/topic/queue/3/status", json!({"tokenId": 1}))
        .await;

    wait_until(WAIT, "the invalidation re-pull", || async {
        reconciler.state().snapshot.total == 2
    })
    .await;
}

// ── pull failures ───────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_pull_keeps_snapshot_and_sets_the_banner() {
    let backend = MockBackend::start().await;
    backend
        .set_json(
            DEPARTMENT_ROUTE,
            json!([
                token_json(1, "WAITING", 1),
                token_json(2, "IN_PROGRESS", 0),
            ]),
        )
        .await;
    let client = connected_client(&backend).await;

    let reconciler = QueueReconciler::spawn(client, department_config(NO_INTERVAL))
        .await
        .unwrap();
    wait_until(WAIT, "the seed pull", || async {
        reconciler.state().snapshot.total == 2
    })
    .await;
    wait_until(WAIT, "the wire subscription", || async {
        !backend.subscribed_topics().await.is_empty()
    })
    .await;

    backend.set_response(DEPARTMENT_ROUTE, 500, "boom").await;
    backend.push_json("/topic/queue/3", json!({"any": "hint"})).await;

    wait_until(WAIT, "the failure banner", || async {
        reconciler.state().last_error.is_some()
    })
    .await;
    // The stale-but-intact snapshot stays up behind the banner.
    assert_eq!(reconciler.state().snapshot.total, 2);

    // The retry affordance: restore the endpoint, refresh, banner clears.
    backend
        .set_json(DEPARTMENT_ROUTE, json!([token_json(1, "WAITING", 1)]))
        .await;
    reconciler.refresh().await.unwrap();

    wait_until(WAIT, "the banner to clear", || async {
        reconciler.state().last_error.is_none()
    })
    .await;
    assert_eq!(reconciler.state().snapshot.total, 1);
}

// ── interval pulls ──────────────────────────────────────────────────────────

#[tokio::test]
async fn interval_pull_catches_up_without_pushes() {
    let backend = MockBackend::start().await;
    backend
        .set_json(DEPARTMENT_ROUTE, json!([token_json(1, "WAITING", 1)]))
        .await;
    let client = connected_client(&backend).await;

    let reconciler =
        QueueReconciler::spawn(client, department_config(Duration::from_millis(200)))
            .await
            .unwrap();
    wait_until(WAIT, "the seed pull", || async {
        reconciler.state().snapshot.total == 1
    })
    .await;

    // The server state changes silently; no push is sent.
    backend
        .set_json(
            DEPARTMENT_ROUTE,
            json!([token_json(1, "WAITING", 1), token_json(2, "WAITING", 2)]),
        )
        .await;

    wait_until(WAIT, "the interval pull", || async {
        reconciler.state().snapshot.total == 2
    })
    .await;
}

// ── terminal-state monotonicity ─────────────────────────────────────────────

#[tokio::test]
async fn stale_pull_cannot_resurrect_a_completed_token() {
    let backend = MockBackend::start().await;
    backend
        .set_json(DEPARTMENT_ROUTE, json!([token_json(7, "IN_PROGRESS", 0)]))
        .await;
    let client = connected_client(&backend).await;

    let reconciler = QueueReconciler::spawn(client, department_config(NO_INTERVAL))
        .await
        .unwrap();
    wait_until(WAIT, "the seed pull", || async {
        reconciler.state().snapshot.total == 1
    })
    .await;

    // The token completes.
    backend
        .set_json(DEPARTMENT_ROUTE, json!([token_json(7, "COMPLETED", 0)]))
        .await;
    reconciler.refresh().await.unwrap();
    wait_until(WAIT, "the completion pull", || async {
        reconciler.state().snapshot.total == 0
    })
    .await;

    // A stale replica claims token 7 went back to waiting. Token 8 is new
    // and taken at face value; 7 stays completed.
    backend
        .set_json(
            DEPARTMENT_ROUTE,
            json!([token_json(7, "WAITING", 1), token_json(8, "WAITING", 2)]),
        )
        .await;
    reconciler.refresh().await.unwrap();

    wait_until(WAIT, "the stale pull", || async {
        reconciler.state().snapshot.total == 1
    })
    .await;
    let state = reconciler.state();
    assert_eq!(state.snapshot.tokens[0].id, 8);
}

// ── teardown ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn close_releases_subscriptions_but_keeps_the_connection() {
    let backend = MockBackend::start().await;
    backend
        .set_json(DEPARTMENT_ROUTE, json!([token_json(1, "WAITING", 1)]))
        .await;
    let client = connected_client(&backend).await;

    let mut reconciler = QueueReconciler::spawn(client.clone(), department_config(NO_INTERVAL))
        .await
        .unwrap();
    wait_until(WAIT, "the wire subscription", || async {
        !backend.subscribed_topics().await.is_empty()
    })
    .await;

    reconciler.close().await;
    assert!(reconciler.is_closed());

    wait_until(WAIT, "the subscription release", || async {
        backend.subscribed_topics().await.is_empty()
    })
    .await;
    // The shared connection is not the view's to tear down.
    assert!(client.is_connected().await);

    // Idempotent.
    reconciler.close().await;
}

// ── user scope ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn user_scope_pulls_user_tokens() {
    let backend = MockBackend::start().await;
    backend
        .set_json(
            "GET /api/tokens/user/42",
            json!([token_json(5, "WAITING", 1)]),
        )
        .await;
    let client = connected_client(&backend).await;

    let config =
        ReconcilerConfig::new(QueueScope::User(42)).with_refresh_interval(NO_INTERVAL);
    let reconciler = QueueReconciler::spawn(client, config).await.unwrap();

    wait_until(WAIT, "the seed pull", || async {
        reconciler.state().snapshot.total == 1
    })
    .await;
    wait_until(WAIT, "the personal topics", || async {
        backend.subscribed_topics().await
            == vec![
                "/queue/user/42/call".to_string(),
                "/queue/user/42/notifications".to_string(),
            ]
    })
    .await;
}

// ── spawn preconditions ─────────────────────────────────────────────────────

#[tokio::test]
async fn spawn_rejects_bad_configuration() {
    let backend = MockBackend::start().await;
    let client = connected_client(&backend).await;

    let empty = department_config(NO_INTERVAL).with_topics(Vec::new());
    match QueueReconciler::spawn(client.clone(), empty).await {
        Err(QueueLinkError::ConfigurationError(_)) => {}
        other => panic!("Expected ConfigurationError, got {:?}", other),
    }

    let zero = department_config(Duration::ZERO);
    match QueueReconciler::spawn(client, zero).await {
        Err(QueueLinkError::ConfigurationError(_)) => {}
        other => panic!("Expected ConfigurationError, got {:?}", other),
    }
}

#[tokio::test]
async fn spawn_requires_a_connection() {
    let backend = MockBackend::start().await;
    let client = quick_client(&backend.base_url());

    match QueueReconciler::spawn(client, department_config(NO_INTERVAL)).await {
        Err(QueueLinkError::NotConnectedError) => {}
        other => panic!("Expected NotConnectedError, got {:?}", other),
    }
}
