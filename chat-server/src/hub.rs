//! Hub / shared state (C6): the process-wide rendezvous point.
//!
//! Owns the live-session index, the topic registry, and a handle to the
//! store. Sessions never hold references to each other (spec §9).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::db::Db;
use crate::protocol::encode;
use crate::topic::TopicRegistry;

/// Soft cap on a session's outbound queue (spec §5: unbounded in the
/// source, an implementation must define overflow policy).
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

pub struct Hub {
    sessions: Mutex<HashMap<i64, mpsc::Sender<String>>>,
    pub topics: TopicRegistry,
    pub db: Arc<Db>,
}

impl Hub {
    pub fn new(db: Arc<Db>) -> Self {
        Hub { sessions: Mutex::new(HashMap::new()), topics: TopicRegistry::new(), db }
    }

    /// Register `user_id`'s outbound sender. Replaces any prior session for
    /// the same user — invariant 1 guarantees at most one live session per
    /// user, so a fresh registration implicitly supersedes a stale one.
    pub fn join(&self, user_id: i64, tx: mpsc::Sender<String>) {
        self.sessions.lock().insert(user_id, tx);
    }

    /// Idempotent: removing a user id not present is a no-op.
    pub fn leave(&self, user_id: i64) {
        self.sessions.lock().remove(&user_id);
    }

    pub fn is_online(&self, user_id: i64) -> bool {
        self.sessions.lock().contains_key(&user_id)
    }

    /// No-op if the user is offline.
    pub fn send_to_user(&self, user_id: i64, frame: &Value) -> bool {
        let tx = { self.sessions.lock().get(&user_id).cloned() };
        match tx {
            Some(tx) => {
                if tx.try_send(encode(frame)).is_err() {
                    debug!(user_id, "outbound queue full or closed; dropping frame");
                    false
                } else {
                    true
                }
            }
            None => false,
        }
    }

    pub fn broadcast_to_all(&self, frame: &Value) {
        let targets: Vec<i64> = self.sessions.lock().keys().copied().collect();
        for user_id in targets {
            self.send_to_user(user_id, frame);
        }
    }

    /// Like `broadcast_to_all`, but skips `exclude` — for callers that send
    /// their own copy of the same frame separately (e.g. a `Terminate`
    /// reply), so the excluded user doesn't receive it twice.
    pub fn broadcast_to_all_except(&self, exclude: i64, frame: &Value) {
        let targets: Vec<i64> = self.sessions.lock().keys().copied().filter(|id| *id != exclude).collect();
        for user_id in targets {
            self.send_to_user(user_id, frame);
        }
    }

    /// Built on top of the topic registry's snapshot, so iteration never
    /// holds the topic lock across I/O (spec §9: "broadcast under lock").
    pub fn broadcast_to_chat(&self, chat_id: i64, frame: &Value) {
        for user_id in self.topics.snapshot(chat_id) {
            self.send_to_user(user_id, frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;

    fn hub() -> Hub {
        Hub::new(Arc::new(Db::open_memory().unwrap()))
    }

    #[tokio::test]
    async fn join_then_send_delivers_and_leave_stops_delivery() {
        let hub = hub();
        let (tx, mut rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        hub.join(1, tx);
        assert!(hub.is_online(1));
        assert!(hub.send_to_user(1, &serde_json::json!({"topic": 7, "user_id": 1})));
        let received = rx.recv().await.unwrap();
        assert!(received.contains("\"user_id\":1"));

        hub.leave(1);
        assert!(!hub.is_online(1));
        assert!(!hub.send_to_user(1, &serde_json::json!({"topic": 7})));
    }

    #[tokio::test]
    async fn broadcast_to_chat_uses_topic_snapshot() {
        let hub = hub();
        let (tx_a, mut rx_a) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let (tx_b, mut rx_b) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        hub.join(1, tx_a);
        hub.join(2, tx_b);
        hub.topics.join(10, 1);
        hub.topics.join(10, 2);

        hub.broadcast_to_chat(10, &serde_json::json!({"topic": 3, "msg_id": 1}));
        assert!(rx_a.recv().await.is_some());
        assert!(rx_b.recv().await.is_some());
    }
}
