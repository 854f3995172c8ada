//! # queue-link
//!
//! Client library for hospital queue backends: authoritative REST pulls plus
//! real-time WebSocket pushes, reconciled into consistent queue views.
//!
//! ## Features
//!
//! - **Single shared connection**: any number of topic subscriptions
//!   multiplex over one WebSocket, with one logical handshake
//! - **Automatic reconnection**: fixed-delay retries without an attempt
//!   cap, every topic replayed before the channel reports ready
//! - **Pull/push reconciliation**: pushes are invalidation hints, never
//!   deltas; state always comes from a fresh pull, so a lost push costs at
//!   most one refresh interval of staleness
//! - **Typed topics and models**: topic constructors for the backend's
//!   layout, serde models for its payloads
//!
//! ## Quick start
//!
//! ```no_run
//! use queue_link::{QueueLinkClient, QueueReconciler, QueueScope, ReconcilerConfig};
//!
//! # async fn run() -> queue_link::Result<()> {
//! let client = QueueLinkClient::builder()
//!     .base_url("http://localhost:8080")
//!     .build()?;
//!
//! client.connect().await?;
//!
//! // A reconciled department view: seeded by a pull on activation,
//! // invalidated by pushes, refreshed every 5 seconds regardless.
//! let reconciler = QueueReconciler::spawn(
//!     client.clone(),
//!     ReconcilerConfig::new(QueueScope::Department(3)),
//! )
//! .await?;
//!
//! let mut view = reconciler.watch();
//! while view.changed().await.is_ok() {
//!     let state = view.borrow().clone();
//!     println!(
//!         "waiting={} in_progress={} total={}",
//!         state.snapshot.waiting, state.snapshot.in_progress, state.snapshot.total,
//!     );
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Direct topic subscriptions are available when a surface wants raw pushes
//! instead of a reconciled view; see [`QueueLinkClient::subscribe`].

pub mod auth;
pub mod client;
pub mod connection;
pub mod error;
pub mod event_handlers;
pub mod models;
pub mod reconciler;
pub mod subscription;
pub mod timeouts;

pub use auth::AuthProvider;
pub use client::{QueueLinkClient, QueueLinkClientBuilder};
pub use connection::{ConnectionState, ConnectionStatus};
pub use error::{QueueLinkError, Result};
pub use event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
pub use models::{
    ConnectionOptions, DashboardStats, Department, QueueSnapshot, Token, TokenRequest,
    TokenStatus, Topic, TopicMessage, TopicPayload,
};
pub use reconciler::{
    QueueReconciler, QueueScope, QueueViewState, ReconcilerConfig, DEFAULT_REFRESH_INTERVAL,
};
pub use subscription::Subscription;
pub use timeouts::{QueueLinkTimeouts, QueueLinkTimeoutsBuilder};
