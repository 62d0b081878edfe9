//! Session (C5): per-connection state.

use parking_lot::Mutex;

/// State held by each connected chat client. The outbound queue itself
/// lives in the hub's session index (a session's `user_id` is its key);
/// this struct carries the rest: identity and the single current
/// subscription (spec §4.5, §9 single-subscription-per-session).
pub struct Session {
    pub user_id: i64,
    subscribed_chat: Mutex<Option<i64>>,
}

impl Session {
    pub fn new(user_id: i64) -> Self {
        Session { user_id, subscribed_chat: Mutex::new(None) }
    }

    pub fn current_subscription(&self) -> Option<i64> {
        *self.subscribed_chat.lock()
    }

    pub fn set_subscription(&self, chat_id: Option<i64>) {
        *self.subscribed_chat.lock() = chat_id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unsubscribed_and_holds_at_most_one_chat() {
        let session = Session::new(1);
        assert_eq!(session.current_subscription(), None);
        session.set_subscription(Some(10));
        assert_eq!(session.current_subscription(), Some(10));
        session.set_subscription(Some(20));
        assert_eq!(session.current_subscription(), Some(20));
    }
}
