//! Data models shared across the synchronization layer.
//!
//! One file per model, re-exported flat so callers write
//! `queue_link::Token` rather than reaching into submodules.

pub mod client_frame;
pub mod connection_options;
pub mod dashboard_stats;
pub mod department;
pub mod notification;
pub mod server_frame;
pub mod snapshot;
pub mod token;
pub mod token_request;
pub mod topic;
pub mod topic_message;

pub use client_frame::ClientFrame;
pub use connection_options::ConnectionOptions;
pub use dashboard_stats::DashboardStats;
pub use department::Department;
pub use notification::{
    AdminAlert, CallNotification, StatusChange, TokenCancellation, UserNotification,
    WaitTimeUpdate,
};
pub use server_frame::ServerFrame;
pub use snapshot::QueueSnapshot;
pub use token::{Token, TokenStatus};
pub use token_request::TokenRequest;
pub use topic::Topic;
pub use topic_message::{TopicMessage, TopicPayload};
