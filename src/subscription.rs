//! Receive handle for one topic subscription.

use crate::{
    connection::ConnCmd,
    models::{Topic, TopicMessage},
};
use std::fmt;
use tokio::sync::mpsc;

/// A live subscription to one topic on the shared connection.
///
/// Returned by [`QueueLinkClient::subscribe`](crate::QueueLinkClient::subscribe).
/// Call [`next`](Self::next) to receive messages. Each handle has its own
/// channel: two subscriptions to the same topic both receive every message,
/// and a slow or dropped handle never affects its siblings.
///
/// Dropping the handle (or calling [`close`](Self::close)) detaches it. The
/// wire subscription is released once the last handle on the topic is gone.
pub struct Subscription {
    topic: Topic,
    handler_id: u64,
    cmd_tx: mpsc::Sender<ConnCmd>,
    event_rx: mpsc::Receiver<TopicMessage>,
    closed: bool,
}

impl Subscription {
    pub(crate) fn new(
        topic: Topic,
        handler_id: u64,
        cmd_tx: mpsc::Sender<ConnCmd>,
        event_rx: mpsc::Receiver<TopicMessage>,
    ) -> Self {
        Self {
            topic,
            handler_id,
            cmd_tx,
            event_rx,
            closed: false,
        }
    }

    /// The topic this subscription receives from.
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Receive the next message, waiting if none is buffered.
    ///
    /// Returns `None` once the subscription is closed or the client is shut
    /// down. Never yields an error: reconnection happens behind the scenes
    /// and delivery resumes after the topic is replayed.
    pub async fn next(&mut self) -> Option<TopicMessage> {
        if self.closed {
            return None;
        }
        self.event_rx.recv().await
    }

    /// Receive a buffered message without waiting, if one is available.
    pub fn try_next(&mut self) -> Option<TopicMessage> {
        if self.closed {
            return None;
        }
        self.event_rx.try_recv().ok()
    }

    /// Detach this handle from its topic.
    ///
    /// Idempotent. Buffered but unread messages are discarded.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.event_rx.close();
        let _ = self
            .cmd_tx
            .send(ConnCmd::RemoveHandler {
                topic: self.topic.clone(),
                handler_id: self.handler_id,
            })
            .await;
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.closed {
            // Best-effort detach; the dispatcher also prunes handlers whose
            // receiver is gone.
            let _ = self.cmd_tx.try_send(ConnCmd::RemoveHandler {
                topic: self.topic.clone(),
                handler_id: self.handler_id,
            });
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("handler_id", &self.handler_id)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
impl Subscription {
    /// Build a subscription with no connection task behind it, returning the
    /// sending side of its event channel and the command receiver.
    pub(crate) fn test_pair(
        topic: Topic,
    ) -> (
        Self,
        mpsc::Sender<TopicMessage>,
        mpsc::Receiver<ConnCmd>,
    ) {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (event_tx, event_rx) = mpsc::channel(8);
        (Self::new(topic, 1, cmd_tx, event_rx), event_tx, cmd_rx)
    }
}
