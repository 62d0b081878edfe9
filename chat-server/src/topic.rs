//! Topic registry (C4): chat id → subscriber-session set.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

/// Guarded by a per-topic mutex; the registry itself is guarded by an
/// outer mutex protecting the chat-id index (spec §4.4).
#[derive(Default)]
pub struct TopicRegistry {
    topics: Mutex<HashMap<i64, Arc<Mutex<HashSet<i64>>>>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_or_create(&self, chat_id: i64) -> Arc<Mutex<HashSet<i64>>> {
        let mut topics = self.topics.lock();
        topics.entry(chat_id).or_insert_with(|| Arc::new(Mutex::new(HashSet::new()))).clone()
    }

    /// Insert `session` into the subscriber set of `chat_id`. O(1).
    pub fn join(&self, chat_id: i64, session: i64) {
        let set = self.get_or_create(chat_id);
        set.lock().insert(session);
    }

    /// Remove `session` from `chat_id`'s subscriber set if present.
    pub fn leave(&self, chat_id: i64, session: i64) {
        let existing = {
            let topics = self.topics.lock();
            topics.get(&chat_id).cloned()
        };
        if let Some(set) = existing {
            let mut set = set.lock();
            set.remove(&session);
            let empty = set.is_empty();
            drop(set);
            if empty {
                self.topics.lock().remove(&chat_id);
            }
        }
    }

    /// A stable copy of the subscriber set, for lock-free broadcast.
    pub fn snapshot(&self, chat_id: i64) -> Vec<i64> {
        let existing = {
            let topics = self.topics.lock();
            topics.get(&chat_id).cloned()
        };
        match existing {
            Some(set) => set.lock().iter().copied().collect(),
            None => Vec::new(),
        }
    }

    /// Whether the registry still has any entry for `chat_id`.
    pub fn has_topic(&self, chat_id: i64) -> bool {
        self.topics.lock().contains_key(&chat_id)
    }

    /// Drop a topic's entry entirely (used when its chat is deleted).
    pub fn remove_topic(&self, chat_id: i64) {
        self.topics.lock().remove(&chat_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_then_snapshot_contains_session() {
        let reg = TopicRegistry::new();
        reg.join(1, 100);
        reg.join(1, 101);
        let mut snap = reg.snapshot(1);
        snap.sort();
        assert_eq!(snap, vec![100, 101]);
    }

    #[test]
    fn leave_empties_and_drops_topic() {
        let reg = TopicRegistry::new();
        reg.join(1, 100);
        reg.leave(1, 100);
        assert!(reg.snapshot(1).is_empty());
        assert!(!reg.has_topic(1));
    }

    #[test]
    fn join_is_idempotent() {
        let reg = TopicRegistry::new();
        reg.join(1, 100);
        reg.join(1, 100);
        assert_eq!(reg.snapshot(1).len(), 1);
    }
}
