//! Request router (C7): the opcode dispatch table (spec §4.7).

use serde_json::json;

use crate::db::{DeleteVoiceOutcome, FriendRequestOutcome, UpdateOutcome};
use crate::error::AppError;
use crate::hub::Hub;
use crate::protocol::ClientMessage;
use crate::session::Session;

/// What the session's write pipeline should do with a dispatch outcome.
pub enum DispatchOutcome {
    /// Send this frame back to the caller only.
    Reply(serde_json::Value),
    /// Every recipient-facing frame was already sent inside the handler
    /// (e.g. a chat broadcast that includes the sender).
    NoReply,
    /// Send this frame to the caller, then tear the session down.
    Terminate(serde_json::Value),
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn error_frame(topic: i64, err: &AppError) -> serde_json::Value {
    json!({ "topic": topic, "status": "error", "error": err.user_message() })
}

/// Route one decoded frame. Persists, updates the topic registry /
/// session subscription, and enqueues any cross-session notifications via
/// the hub; returns what to do with the direct reply.
pub fn dispatch(hub: &Hub, session: &Session, msg: ClientMessage) -> DispatchOutcome {
    match try_dispatch(hub, session, &msg) {
        Ok(outcome) => outcome,
        Err(err) => DispatchOutcome::Reply(error_frame(topic_for(&msg), &err)),
    }
}

fn topic_for(msg: &ClientMessage) -> i64 {
    match msg {
        ClientMessage::Subscribe { .. } => 1,
        ClientMessage::ListChats => 2,
        ClientMessage::PostMessage { .. } => 3,
        ClientMessage::CreateChat { .. } => 4,
        ClientMessage::GetMessageHistory { .. } => 6,
        ClientMessage::DeleteAccount => 8,
        ClientMessage::InviteToChat { .. } => 10,
        ClientMessage::ListChatMembers => 11,
        ClientMessage::SearchUsers { .. } => 12,
        ClientMessage::AddFriend { .. } => 13,
        ClientMessage::ListFriends => 14,
        ClientMessage::AcceptFriendRequest { .. } => 15,
        ClientMessage::RejectFriendRequest { .. } => 16,
        ClientMessage::DeleteFriend { .. } => 18,
        ClientMessage::UpdateAccount { .. } => 20,
        ClientMessage::DeleteVoiceChat { .. } => 21,
        ClientMessage::Logout => 22,
    }
}

fn try_dispatch(hub: &Hub, session: &Session, msg: &ClientMessage) -> Result<DispatchOutcome, AppError> {
    match msg {
        ClientMessage::Subscribe { to } => subscribe(hub, session, *to),
        ClientMessage::ListChats => list_chats(hub, session),
        ClientMessage::PostMessage { to, msg } => post_message(hub, session, *to, msg),
        ClientMessage::CreateChat { chat_name, invited, is_voice_chat } => {
            create_chat(hub, session, chat_name, invited, *is_voice_chat)
        }
        ClientMessage::GetMessageHistory { to } => get_message_history(hub, session, *to),
        ClientMessage::DeleteAccount => delete_account(hub, session),
        // `is_voice_chat` is client-supplied and not trusted; `invite_to_chat`
        // reads the authoritative value from `chat_info` instead.
        ClientMessage::InviteToChat { invited, chat_id, is_voice_chat: _ } => {
            invite_to_chat(hub, session, invited, *chat_id)
        }
        ClientMessage::ListChatMembers => list_chat_members(hub, session),
        ClientMessage::SearchUsers { search_term } => search_users(hub, search_term),
        ClientMessage::AddFriend { friend_id } => add_friend(hub, session, *friend_id),
        ClientMessage::ListFriends => list_friends(hub, session),
        ClientMessage::AcceptFriendRequest { friend_id } => accept_friend_request(hub, session, *friend_id),
        ClientMessage::RejectFriendRequest { friend_id } => reject_friend_request(hub, session, *friend_id),
        ClientMessage::DeleteFriend { friend_id } => delete_friend(hub, session, *friend_id),
        ClientMessage::UpdateAccount { name, password } => {
            update_account(hub, session, name.as_deref(), password.as_deref())
        }
        ClientMessage::DeleteVoiceChat { chat_id } => delete_voice_chat(hub, session, *chat_id),
        ClientMessage::Logout => Ok(DispatchOutcome::Terminate(json!({ "topic": 22, "status": "success" }))),
    }
}

fn subscribe(hub: &Hub, session: &Session, to: i64) -> Result<DispatchOutcome, AppError> {
    if !hub.db.is_member(to, session.user_id)? {
        return Err(AppError::Unauthorized);
    }
    if let Some(prev) = session.current_subscription() {
        hub.topics.leave(prev, session.user_id);
    }
    hub.topics.join(to, session.user_id);
    session.set_subscription(Some(to));
    Ok(DispatchOutcome::Reply(json!({ "topic": 1, "status": "subscribed", "chat_id": to })))
}

fn list_chats(hub: &Hub, session: &Session) -> Result<DispatchOutcome, AppError> {
    let chats = hub.db.list_chats_for(session.user_id)?;
    Ok(DispatchOutcome::Reply(json!({ "topic": 2, "chats": chats })))
}

fn post_message(hub: &Hub, session: &Session, to: i64, text: &str) -> Result<DispatchOutcome, AppError> {
    if text.is_empty() {
        return Err(AppError::InvalidArgument("empty message text".into()));
    }
    if session.current_subscription() != Some(to) {
        return Err(AppError::Unauthorized);
    }
    if !hub.db.is_member(to, session.user_id)? {
        return Err(AppError::Unauthorized);
    }
    let ts = now_ms();
    let msg_id = hub.db.append_message(to, session.user_id, text, ts)?;
    let user_name = hub.db.user_name(session.user_id)?.unwrap_or_default();
    let frame = json!({
        "topic": 3,
        "user_name": user_name,
        "text": text,
        "date": ts,
        "msg_id": msg_id,
    });
    hub.broadcast_to_chat(to, &frame);
    Ok(DispatchOutcome::NoReply)
}

fn create_chat(
    hub: &Hub,
    session: &Session,
    chat_name: &str,
    invited: &[i64],
    is_voice_chat: bool,
) -> Result<DispatchOutcome, AppError> {
    let chat_id = hub.db.create_chat(session.user_id, chat_name, is_voice_chat)?;
    if !invited.is_empty() {
        hub.db.add_members(chat_id, session.user_id, invited)?;
    }
    Ok(DispatchOutcome::Reply(json!({
        "topic": 4,
        "chat_id": chat_id,
        "chat_name": chat_name,
        "isVoiceChat": is_voice_chat,
    })))
}

fn get_message_history(hub: &Hub, session: &Session, to: i64) -> Result<DispatchOutcome, AppError> {
    if !hub.db.is_member(to, session.user_id)? {
        return Err(AppError::Unauthorized);
    }
    let messages = hub.db.list_messages(to)?;
    Ok(DispatchOutcome::Reply(json!({ "topic": 6, "messages": messages })))
}

fn delete_account(hub: &Hub, session: &Session) -> Result<DispatchOutcome, AppError> {
    hub.db.delete_account(session.user_id)?;
    // Topic/hub/subscription teardown happens in server.rs's post-loop
    // cleanup, same as every other `Terminate` path (see `Logout` above),
    // so the caller's own reply below is still delivered through the hub
    // before its sender is removed. Exclude the caller from the broadcast
    // since its own `Terminate` frame below carries the same payload.
    hub.broadcast_to_all_except(session.user_id, &json!({ "topic": 8, "status": "success" }));
    Ok(DispatchOutcome::Terminate(json!({ "topic": 8, "status": "success" })))
}

fn invite_to_chat(
    hub: &Hub,
    session: &Session,
    invited: &[i64],
    chat_id: i64,
) -> Result<DispatchOutcome, AppError> {
    if !hub.db.is_member(chat_id, session.user_id)? {
        return Err(AppError::Unauthorized);
    }
    let inserted = hub.db.add_members(chat_id, session.user_id, invited)?;
    let (chat_name, is_voice_chat) = hub
        .db
        .chat_info(chat_id)?
        .map(|(name, _, is_voice)| (name, is_voice))
        .unwrap_or_default();
    for &invitee in &inserted {
        hub.send_to_user(
            invitee,
            &json!({
                "topic": 10,
                "chat_id": chat_id,
                "chat_name": chat_name,
                "isVoiceChat": is_voice_chat,
            }),
        );
    }
    Ok(DispatchOutcome::Reply(json!({
        "topic": 10,
        "chat_id": chat_id,
        "chat_name": chat_name,
        "isVoiceChat": is_voice_chat,
        "invited": inserted,
    })))
}

fn list_chat_members(hub: &Hub, session: &Session) -> Result<DispatchOutcome, AppError> {
    let chat_id = session.current_subscription().ok_or(AppError::Unauthorized)?;
    let users = hub.db.list_members(chat_id)?;
    Ok(DispatchOutcome::Reply(json!({ "topic": 11, "users": users })))
}

fn search_users(hub: &Hub, search_term: &str) -> Result<DispatchOutcome, AppError> {
    let users = hub.db.search_users_by_name(search_term)?;
    Ok(DispatchOutcome::Reply(json!({ "topic": 12, "users": users })))
}

fn add_friend(hub: &Hub, session: &Session, friend_id: i64) -> Result<DispatchOutcome, AppError> {
    match hub.db.send_friend_request(session.user_id, friend_id)? {
        FriendRequestOutcome::RequestSent => {
            let requester_name = hub.db.user_name(session.user_id)?.unwrap_or_default();
            hub.send_to_user(
                friend_id,
                &json!({ "topic": 17, "friend_id": session.user_id, "friend_name": requester_name }),
            );
            Ok(DispatchOutcome::Reply(json!({
                "topic": 13,
                "status": "request_sent",
                "friend_id": friend_id,
            })))
        }
        FriendRequestOutcome::AlreadyPending => Ok(DispatchOutcome::Reply(json!({
            "topic": 13,
            "status": "request_sent",
            "friend_id": friend_id,
        }))),
        FriendRequestOutcome::AlreadyFriends => {
            Err(AppError::ConflictingState("already friends".into()))
        }
        FriendRequestOutcome::SelfReference => {
            Err(AppError::InvalidArgument("cannot friend yourself".into()))
        }
        FriendRequestOutcome::UnknownUser => Err(AppError::NotFound),
    }
}

fn list_friends(hub: &Hub, session: &Session) -> Result<DispatchOutcome, AppError> {
    let friends = hub.db.list_friends(session.user_id)?;
    let friend_requests = hub.db.list_pending_requests(session.user_id)?;
    Ok(DispatchOutcome::Reply(json!({
        "topic": 14,
        "friends": friends,
        "friend_requests": friend_requests,
    })))
}

fn accept_friend_request(hub: &Hub, session: &Session, friend_id: i64) -> Result<DispatchOutcome, AppError> {
    if !hub.db.accept_friend_request(session.user_id, friend_id)? {
        return Err(AppError::NotFound);
    }
    hub.send_to_user(friend_id, &json!({ "topic": 15, "status": "accepted", "friend_id": session.user_id }));
    Ok(DispatchOutcome::Reply(json!({ "topic": 15, "status": "accepted", "friend_id": friend_id })))
}

/// Per spec §9 Open Question 1: the handler deletes the pending row and
/// replies to no one.
fn reject_friend_request(hub: &Hub, session: &Session, friend_id: i64) -> Result<DispatchOutcome, AppError> {
    hub.db.reject_friend_request(session.user_id, friend_id)?;
    Ok(DispatchOutcome::NoReply)
}

fn delete_friend(hub: &Hub, session: &Session, friend_id: i64) -> Result<DispatchOutcome, AppError> {
    let changed = hub.db.delete_friend(session.user_id, friend_id)?;
    let status = if changed > 0 { "success" } else { "not_found" };
    Ok(DispatchOutcome::Reply(json!({ "topic": 18, "status": status })))
}

fn update_account(
    hub: &Hub,
    session: &Session,
    name: Option<&str>,
    password: Option<&str>,
) -> Result<DispatchOutcome, AppError> {
    if name.is_none() && password.is_none() {
        return Err(AppError::InvalidArgument("at least one of name or password required".into()));
    }
    match hub.db.update_account(session.user_id, name, password)? {
        UpdateOutcome::Ok => {
            let mut frame = serde_json::Map::new();
            frame.insert("topic".into(), json!(20));
            frame.insert("status".into(), json!("success"));
            if let Some(name) = name {
                frame.insert("name".into(), json!(name));
            }
            Ok(DispatchOutcome::Reply(serde_json::Value::Object(frame)))
        }
        UpdateOutcome::NothingToUpdate => {
            Err(AppError::InvalidArgument("nothing to update".into()))
        }
        UpdateOutcome::NotFound => Err(AppError::NotFound),
    }
}

fn delete_voice_chat(hub: &Hub, session: &Session, chat_id: i64) -> Result<DispatchOutcome, AppError> {
    match hub.db.delete_voice_chat(session.user_id, chat_id)? {
        DeleteVoiceOutcome::Ok => {
            hub.topics.remove_topic(chat_id);
            hub.broadcast_to_all(&json!({ "topic": 21, "status": "success", "chat_id": chat_id }));
            Ok(DispatchOutcome::NoReply)
        }
        DeleteVoiceOutcome::NotVoice => Err(AppError::InvalidArgument("not a voice chat".into())),
        DeleteVoiceOutcome::NotAdmin => Err(AppError::Unauthorized),
        DeleteVoiceOutcome::NotFound => Err(AppError::NotFound),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use super::*;
    use crate::db::{Db, RegisterOutcome};
    use crate::hub::OUTBOUND_QUEUE_CAPACITY;

    fn register(db: &Db, login: &str, name: &str) -> i64 {
        match db.register(login, "p", name).unwrap() {
            RegisterOutcome::Registered(id) => id,
            RegisterOutcome::AlreadyExists => panic!("unexpected duplicate"),
        }
    }

    struct Wired {
        hub: Hub,
    }

    impl Wired {
        fn new() -> Self {
            Wired { hub: Hub::new(Arc::new(Db::open_memory().unwrap())) }
        }

        fn wire(&self, user_id: i64) -> mpsc::Receiver<String> {
            let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
            self.hub.join(user_id, tx);
            rx
        }
    }

    #[test]
    fn subscribe_then_post_broadcasts_to_both_members() {
        let w = Wired::new();
        let alice = register(w.hub.db.as_ref(), "alice", "Alice");
        let bob = register(w.hub.db.as_ref(), "bob", "Bob");
        let chat_id = w.hub.db.create_chat(alice, "room", false).unwrap();
        w.hub.db.add_members(chat_id, alice, &[bob]).unwrap();

        let mut alice_rx = w.wire(alice);
        let mut bob_rx = w.wire(bob);
        let alice_session = Session::new(alice);
        let bob_session = Session::new(bob);

        match dispatch(&w.hub, &alice_session, ClientMessage::Subscribe { to: chat_id }) {
            DispatchOutcome::Reply(v) => assert_eq!(v["status"], "subscribed"),
            _ => panic!("expected reply"),
        }
        match dispatch(&w.hub, &bob_session, ClientMessage::Subscribe { to: chat_id }) {
            DispatchOutcome::Reply(v) => assert_eq!(v["status"], "subscribed"),
            _ => panic!("expected reply"),
        }
        alice_rx.try_recv().unwrap();
        bob_rx.try_recv().unwrap();

        let outcome = dispatch(
            &w.hub,
            &alice_session,
            ClientMessage::PostMessage { to: chat_id, msg: "hi".into() },
        );
        assert!(matches!(outcome, DispatchOutcome::NoReply));

        let a_frame: serde_json::Value = serde_json::from_str(&alice_rx.try_recv().unwrap()).unwrap();
        let b_frame: serde_json::Value = serde_json::from_str(&bob_rx.try_recv().unwrap()).unwrap();
        assert_eq!(a_frame["text"], "hi");
        assert_eq!(b_frame["text"], "hi");
    }

    #[test]
    fn post_without_subscription_is_unauthorized() {
        let w = Wired::new();
        let alice = register(w.hub.db.as_ref(), "alice", "Alice");
        let chat_id = w.hub.db.create_chat(alice, "room", false).unwrap();
        let session = Session::new(alice);
        let outcome = dispatch(
            &w.hub,
            &session,
            ClientMessage::PostMessage { to: chat_id, msg: "hi".into() },
        );
        match outcome {
            DispatchOutcome::Reply(v) => assert_eq!(v["status"], "error"),
            _ => panic!("expected error reply"),
        }
    }

    #[test]
    fn friend_request_then_accept_notifies_both_sides() {
        let w = Wired::new();
        let alice = register(w.hub.db.as_ref(), "alice", "Alice");
        let bob = register(w.hub.db.as_ref(), "bob", "Bob");
        let mut alice_rx = w.wire(alice);
        let mut bob_rx = w.wire(bob);
        let alice_session = Session::new(alice);
        let bob_session = Session::new(bob);

        match dispatch(&w.hub, &alice_session, ClientMessage::AddFriend { friend_id: bob }) {
            DispatchOutcome::Reply(v) => assert_eq!(v["status"], "request_sent"),
            _ => panic!("expected reply"),
        }
        let notify: serde_json::Value = serde_json::from_str(&bob_rx.try_recv().unwrap()).unwrap();
        assert_eq!(notify["topic"], 17);

        match dispatch(&w.hub, &bob_session, ClientMessage::AcceptFriendRequest { friend_id: alice }) {
            DispatchOutcome::Reply(v) => assert_eq!(v["status"], "accepted"),
            _ => panic!("expected reply"),
        }
        let notify: serde_json::Value = serde_json::from_str(&alice_rx.try_recv().unwrap()).unwrap();
        assert_eq!(notify["topic"], 15);
    }

    #[test]
    fn reject_friend_request_sends_no_reply() {
        let w = Wired::new();
        let alice = register(w.hub.db.as_ref(), "alice", "Alice");
        let bob = register(w.hub.db.as_ref(), "bob", "Bob");
        let bob_session = Session::new(bob);
        dispatch(&w.hub, &Session::new(alice), ClientMessage::AddFriend { friend_id: bob });
        let outcome = dispatch(&w.hub, &bob_session, ClientMessage::RejectFriendRequest { friend_id: alice });
        assert!(matches!(outcome, DispatchOutcome::NoReply));
    }

    #[test]
    fn delete_account_terminates_and_broadcasts() {
        let w = Wired::new();
        let alice = register(w.hub.db.as_ref(), "alice", "Alice");
        let bob = register(w.hub.db.as_ref(), "bob", "Bob");
        let mut bob_rx = w.wire(bob);
        let mut alice_rx = w.wire(alice);
        let alice_session = Session::new(alice);

        // `dispatch` itself must not remove the caller from the hub — that
        // happens afterward in server.rs's post-loop cleanup, once the
        // `Terminate` reply below has actually been delivered.
        let outcome = dispatch(&w.hub, &alice_session, ClientMessage::DeleteAccount);
        let reply = match outcome {
            DispatchOutcome::Terminate(v) => v,
            _ => panic!("expected terminate"),
        };
        assert_eq!(reply["status"], "success");
        assert!(w.hub.is_online(alice));

        let broadcast: serde_json::Value = serde_json::from_str(&bob_rx.try_recv().unwrap()).unwrap();
        assert_eq!(broadcast["topic"], 8);

        assert!(w.hub.send_to_user(alice, &reply));
        let delivered: serde_json::Value = serde_json::from_str(&alice_rx.try_recv().unwrap()).unwrap();
        assert_eq!(delivered["topic"], 8);
        assert_eq!(delivered["status"], "success");

        w.hub.leave(alice);
        assert!(!w.hub.is_online(alice));
    }

    #[test]
    fn add_friend_twice_is_idempotent_single_pending_row() {
        let w = Wired::new();
        let alice = register(w.hub.db.as_ref(), "alice", "Alice");
        let bob = register(w.hub.db.as_ref(), "bob", "Bob");
        let session = Session::new(alice);
        dispatch(&w.hub, &session, ClientMessage::AddFriend { friend_id: bob });
        let second = dispatch(&w.hub, &session, ClientMessage::AddFriend { friend_id: bob });
        match second {
            DispatchOutcome::Reply(v) => assert_eq!(v["status"], "request_sent"),
            _ => panic!("expected reply"),
        }
        assert_eq!(w.hub.db.list_pending_requests(bob).unwrap().len(), 1);
    }
}
