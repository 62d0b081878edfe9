//! Persistence gateway (C1).
//!
//! Exposes typed operations only; nothing upstream of this module ever
//! sees raw SQL text. Every operation that touches more than one table
//! runs inside a single transaction.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::auth::hash_password;
use crate::error::AppError;

pub struct Db {
    conn: Mutex<Connection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatSummary {
    pub chat_id: i64,
    pub chat_name: String,
    #[serde(rename = "isVoiceChat")]
    pub is_voice_chat: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSummary {
    pub user_id: i64,
    pub user_name: String,
}

/// Same shape as `UserSummary` but keyed `friend_id`/`friend_name`, matching
/// the wire convention friend-entity frames (topic 14, topic 17) use in
/// place of the plain-roster `user_id`/`user_name` keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FriendSummary {
    pub friend_id: i64,
    pub friend_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageRow {
    pub msg_id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub text: String,
    pub date: i64,
}

pub enum RegisterOutcome {
    Registered(i64),
    AlreadyExists,
}

pub enum UpdateOutcome {
    Ok,
    NothingToUpdate,
    NotFound,
}

pub enum FriendRequestOutcome {
    RequestSent,
    AlreadyPending,
    AlreadyFriends,
    SelfReference,
    UnknownUser,
}

pub enum DeleteVoiceOutcome {
    Ok,
    NotVoice,
    NotAdmin,
    NotFound,
}

impl Db {
    /// Open (creating if absent) a file-backed database and run migrations.
    pub fn open(path: &std::path::Path) -> Result<Self, AppError> {
        let conn = Connection::open(path)?;
        let db = Db { conn: Mutex::new(conn) };
        db.init()?;
        Ok(db)
    }

    /// An in-memory database, used by tests.
    pub fn open_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()?;
        let db = Db { conn: Mutex::new(conn) };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<(), AppError> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;

             CREATE TABLE IF NOT EXISTS Users (
                 id            INTEGER PRIMARY KEY AUTOINCREMENT,
                 login         TEXT NOT NULL UNIQUE,
                 password_hash TEXT NOT NULL,
                 name          TEXT NOT NULL
             );

             CREATE TABLE IF NOT EXISTS Chat (
                 id            INTEGER PRIMARY KEY AUTOINCREMENT,
                 name          TEXT NOT NULL,
                 admin_user_id INTEGER NOT NULL,
                 is_voice      INTEGER NOT NULL DEFAULT 0
             );

             CREATE TABLE IF NOT EXISTS UserInChat (
                 chat_id INTEGER NOT NULL,
                 user_id INTEGER NOT NULL,
                 PRIMARY KEY (chat_id, user_id)
             );

             CREATE TABLE IF NOT EXISTS Message (
                 id            INTEGER PRIMARY KEY AUTOINCREMENT,
                 chat_id       INTEGER NOT NULL,
                 user_id       INTEGER NOT NULL,
                 text          TEXT NOT NULL,
                 created_at_ms INTEGER NOT NULL
             );

             CREATE TABLE IF NOT EXISTS Friends (
                 user_id   INTEGER NOT NULL,
                 friend_id INTEGER NOT NULL,
                 PRIMARY KEY (user_id, friend_id)
             );

             CREATE TABLE IF NOT EXISTS FriendRequests (
                 requester_id INTEGER NOT NULL,
                 requested_id INTEGER NOT NULL,
                 status       TEXT NOT NULL,
                 PRIMARY KEY (requester_id, requested_id)
             );

             CREATE INDEX IF NOT EXISTS idx_message_chat ON Message(chat_id, created_at_ms, id);
             CREATE INDEX IF NOT EXISTS idx_userinchat_user ON UserInChat(user_id);
             ",
        )?;
        Ok(())
    }

    // ---- credentials -----------------------------------------------

    pub fn authenticate(&self, login: &str, password: &str) -> Result<Option<i64>, AppError> {
        let conn = self.conn.lock();
        let hash = hash_password(password);
        let id: Option<i64> = conn
            .query_row(
                "SELECT id FROM Users WHERE login = ?1 AND password_hash = ?2",
                params![login, hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn register(&self, login: &str, password: &str, name: &str) -> Result<RegisterOutcome, AppError> {
        let conn = self.conn.lock();
        let exists: Option<i64> = conn
            .query_row("SELECT id FROM Users WHERE login = ?1", params![login], |r| r.get(0))
            .optional()?;
        if exists.is_some() {
            return Ok(RegisterOutcome::AlreadyExists);
        }
        let hash = hash_password(password);
        conn.execute(
            "INSERT INTO Users (login, password_hash, name) VALUES (?1, ?2, ?3)",
            params![login, hash, name],
        )?;
        Ok(RegisterOutcome::Registered(conn.last_insert_rowid()))
    }

    pub fn user_name(&self, user_id: i64) -> Result<Option<String>, AppError> {
        let conn = self.conn.lock();
        let name = conn
            .query_row("SELECT name FROM Users WHERE id = ?1", params![user_id], |r| r.get(0))
            .optional()?;
        Ok(name)
    }

    pub fn update_account(
        &self,
        user_id: i64,
        new_name: Option<&str>,
        new_password: Option<&str>,
    ) -> Result<UpdateOutcome, AppError> {
        if new_name.is_none() && new_password.is_none() {
            return Ok(UpdateOutcome::NothingToUpdate);
        }
        let conn = self.conn.lock();
        if let Some(name) = new_name {
            conn.execute("UPDATE Users SET name = ?1 WHERE id = ?2", params![name, user_id])?;
        }
        if let Some(password) = new_password {
            let hash = hash_password(password);
            conn.execute(
                "UPDATE Users SET password_hash = ?1 WHERE id = ?2",
                params![hash, user_id],
            )?;
        }
        let changed = conn.changes();
        if changed == 0 {
            return Ok(UpdateOutcome::NotFound);
        }
        Ok(UpdateOutcome::Ok)
    }

    // ---- chats --------------------------------------------------------

    pub fn create_chat(&self, admin_id: i64, name: &str, is_voice: bool) -> Result<i64, AppError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO Chat (name, admin_user_id, is_voice) VALUES (?1, ?2, ?3)",
            params![name, admin_id, is_voice as i64],
        )?;
        let chat_id = tx.last_insert_rowid();
        tx.execute(
            "INSERT OR IGNORE INTO UserInChat (chat_id, user_id) VALUES (?1, ?2)",
            params![chat_id, admin_id],
        )?;
        tx.commit()?;
        Ok(chat_id)
    }

    pub fn is_member(&self, chat_id: i64, user_id: i64) -> Result<bool, AppError> {
        let conn = self.conn.lock();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM UserInChat WHERE chat_id = ?1 AND user_id = ?2",
                params![chat_id, user_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn chat_info(&self, chat_id: i64) -> Result<Option<(String, i64, bool)>, AppError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT name, admin_user_id, is_voice FROM Chat WHERE id = ?1",
                params![chat_id],
                |r| {
                    let is_voice: i64 = r.get(2)?;
                    Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?, is_voice != 0))
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Pre-filters invitees to (a) existing users, (b) not already members,
    /// (c) not the inviter, then inserts memberships for the rest.
    pub fn add_members(
        &self,
        chat_id: i64,
        inviter: i64,
        invitees: &[i64],
    ) -> Result<Vec<i64>, AppError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut inserted = Vec::new();
        for &candidate in invitees {
            if candidate == inviter {
                continue;
            }
            let exists: Option<i64> = tx
                .query_row("SELECT id FROM Users WHERE id = ?1", params![candidate], |r| r.get(0))
                .optional()?;
            if exists.is_none() {
                continue;
            }
            let already: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM UserInChat WHERE chat_id = ?1 AND user_id = ?2",
                    params![chat_id, candidate],
                    |r| r.get(0),
                )
                .optional()?;
            if already.is_some() {
                continue;
            }
            tx.execute(
                "INSERT OR IGNORE INTO UserInChat (chat_id, user_id) VALUES (?1, ?2)",
                params![chat_id, candidate],
            )?;
            inserted.push(candidate);
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn list_chats_for(&self, user_id: i64) -> Result<Vec<ChatSummary>, AppError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT c.id, c.name, c.is_voice FROM Chat c
             JOIN UserInChat m ON m.chat_id = c.id
             WHERE m.user_id = ?1
             ORDER BY c.id",
        )?;
        let rows = stmt
            .query_map(params![user_id], |r| {
                let is_voice: i64 = r.get(2)?;
                Ok(ChatSummary {
                    chat_id: r.get(0)?,
                    chat_name: r.get(1)?,
                    is_voice_chat: is_voice != 0,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn list_members(&self, chat_id: i64) -> Result<Vec<UserSummary>, AppError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT u.id, u.name FROM Users u
             JOIN UserInChat m ON m.user_id = u.id
             WHERE m.chat_id = ?1
             ORDER BY u.id",
        )?;
        let rows = stmt
            .query_map(params![chat_id], |r| {
                Ok(UserSummary { user_id: r.get(0)?, user_name: r.get(1)? })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn remove_membership(&self, chat_id: i64, user_id: i64) -> Result<(), AppError> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM UserInChat WHERE chat_id = ?1 AND user_id = ?2",
            params![chat_id, user_id],
        )?;
        Ok(())
    }

    // ---- messages -------------------------------------------------------

    pub fn list_messages(&self, chat_id: i64) -> Result<Vec<MessageRow>, AppError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT m.id, m.user_id, u.name, m.text, m.created_at_ms
             FROM Message m JOIN Users u ON u.id = m.user_id
             WHERE m.chat_id = ?1
             ORDER BY m.created_at_ms, m.id",
        )?;
        let rows = stmt
            .query_map(params![chat_id], |r| {
                Ok(MessageRow {
                    msg_id: r.get(0)?,
                    user_id: r.get(1)?,
                    user_name: r.get(2)?,
                    text: r.get(3)?,
                    date: r.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn append_message(&self, chat_id: i64, user_id: i64, text: &str, ts_ms: i64) -> Result<i64, AppError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO Message (chat_id, user_id, text, created_at_ms) VALUES (?1, ?2, ?3, ?4)",
            params![chat_id, user_id, text, ts_ms],
        )?;
        Ok(conn.last_insert_rowid())
    }

    // ---- search -----------------------------------------------------------

    pub fn search_users_by_name(&self, substring: &str) -> Result<Vec<UserSummary>, AppError> {
        let conn = self.conn.lock();
        let pattern = format!("%{substring}%");
        let mut stmt = conn.prepare("SELECT id, name FROM Users WHERE name LIKE ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![pattern], |r| {
                Ok(UserSummary { user_id: r.get(0)?, user_name: r.get(1)? })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ---- friendship state machine -----------------------------------------

    pub fn send_friend_request(&self, requester: i64, requested: i64) -> Result<FriendRequestOutcome, AppError> {
        if requester == requested {
            return Ok(FriendRequestOutcome::SelfReference);
        }
        let conn = self.conn.lock();
        let target_exists: Option<i64> = conn
            .query_row("SELECT id FROM Users WHERE id = ?1", params![requested], |r| r.get(0))
            .optional()?;
        if target_exists.is_none() {
            return Ok(FriendRequestOutcome::UnknownUser);
        }
        let already_friends: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM Friends WHERE user_id = ?1 AND friend_id = ?2",
                params![requester, requested],
                |r| r.get(0),
            )
            .optional()?;
        if already_friends.is_some() {
            return Ok(FriendRequestOutcome::AlreadyFriends);
        }
        let pending: Option<String> = conn
            .query_row(
                "SELECT status FROM FriendRequests WHERE requester_id = ?1 AND requested_id = ?2",
                params![requester, requested],
                |r| r.get(0),
            )
            .optional()?;
        if pending.as_deref() == Some("pending") {
            return Ok(FriendRequestOutcome::AlreadyPending);
        }
        conn.execute(
            "INSERT INTO FriendRequests (requester_id, requested_id, status) VALUES (?1, ?2, 'pending')
             ON CONFLICT(requester_id, requested_id) DO UPDATE SET status = 'pending'",
            params![requester, requested],
        )?;
        Ok(FriendRequestOutcome::RequestSent)
    }

    /// `acceptor` accepts a request previously sent by `requester`.
    pub fn accept_friend_request(&self, acceptor: i64, requester: i64) -> Result<bool, AppError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE FriendRequests SET status = 'accepted'
             WHERE requester_id = ?1 AND requested_id = ?2 AND status = 'pending'",
            params![requester, acceptor],
        )?;
        if changed == 0 {
            tx.rollback()?;
            return Ok(false);
        }
        tx.execute(
            "INSERT OR IGNORE INTO Friends (user_id, friend_id) VALUES (?1, ?2), (?3, ?4)",
            params![requester, acceptor, acceptor, requester],
        )?;
        tx.commit()?;
        Ok(true)
    }

    pub fn reject_friend_request(&self, requested: i64, requester: i64) -> Result<bool, AppError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "DELETE FROM FriendRequests WHERE requester_id = ?1 AND requested_id = ?2 AND status = 'pending'",
            params![requester, requested],
        )?;
        Ok(changed > 0)
    }

    pub fn list_friends(&self, user_id: i64) -> Result<Vec<FriendSummary>, AppError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT u.id, u.name FROM Users u
             WHERE u.id IN (
                 SELECT friend_id FROM Friends WHERE user_id = ?1
                 UNION
                 SELECT requested_id FROM FriendRequests WHERE requester_id = ?1 AND status = 'accepted'
                 UNION
                 SELECT requester_id FROM FriendRequests WHERE requested_id = ?1 AND status = 'accepted'
             )
             ORDER BY u.id",
        )?;
        let rows = stmt
            .query_map(params![user_id], |r| {
                Ok(FriendSummary { friend_id: r.get(0)?, friend_name: r.get(1)? })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn list_pending_requests(&self, user_id: i64) -> Result<Vec<FriendSummary>, AppError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT u.id, u.name FROM Users u
             JOIN FriendRequests fr ON fr.requester_id = u.id
             WHERE fr.requested_id = ?1 AND fr.status = 'pending'
             ORDER BY u.id",
        )?;
        let rows = stmt
            .query_map(params![user_id], |r| {
                Ok(FriendSummary { friend_id: r.get(0)?, friend_name: r.get(1)? })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn delete_friend(&self, a: i64, b: i64) -> Result<usize, AppError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut changed = 0;
        changed += tx.execute(
            "DELETE FROM Friends WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1)",
            params![a, b],
        )?;
        changed += tx.execute(
            "DELETE FROM FriendRequests WHERE (requester_id = ?1 AND requested_id = ?2) OR (requester_id = ?2 AND requested_id = ?1)",
            params![a, b],
        )?;
        tx.commit()?;
        Ok(changed)
    }

    // ---- account deletion -------------------------------------------------

    /// All-or-nothing cascade: every row referencing `user_id` across every
    /// table is removed, or none is (spec §3 invariant 7).
    pub fn delete_account(&self, user_id: i64) -> Result<(), AppError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM Message WHERE user_id = ?1", params![user_id])?;
        tx.execute("DELETE FROM UserInChat WHERE user_id = ?1", params![user_id])?;
        tx.execute(
            "DELETE FROM Friends WHERE user_id = ?1 OR friend_id = ?1",
            params![user_id],
        )?;
        tx.execute(
            "DELETE FROM FriendRequests WHERE requester_id = ?1 OR requested_id = ?1",
            params![user_id],
        )?;
        // Non-voice chats are only ever destroyed implicitly (no surviving
        // members); voice chats are destroyed only via delete_voice_chat.
        tx.execute(
            "DELETE FROM Chat WHERE is_voice = 0 AND id NOT IN (SELECT chat_id FROM UserInChat)",
            [],
        )?;
        tx.execute("DELETE FROM Users WHERE id = ?1", params![user_id])?;
        tx.commit()?;
        Ok(())
    }

    pub fn delete_voice_chat(&self, user_id: i64, chat_id: i64) -> Result<DeleteVoiceOutcome, AppError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let row: Option<(i64, i64)> = tx
            .query_row(
                "SELECT admin_user_id, is_voice FROM Chat WHERE id = ?1",
                params![chat_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        let Some((admin_id, is_voice)) = row else {
            return Ok(DeleteVoiceOutcome::NotFound);
        };
        if is_voice == 0 {
            return Ok(DeleteVoiceOutcome::NotVoice);
        }
        if admin_id != user_id {
            return Ok(DeleteVoiceOutcome::NotAdmin);
        }
        tx.execute("DELETE FROM UserInChat WHERE chat_id = ?1", params![chat_id])?;
        tx.execute("DELETE FROM Message WHERE chat_id = ?1", params![chat_id])?;
        tx.execute("DELETE FROM Chat WHERE id = ?1", params![chat_id])?;
        tx.commit()?;
        Ok(DeleteVoiceOutcome::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_authenticate_round_trips() {
        let db = Db::open_memory().unwrap();
        match db.register("alice", "p", "Alice").unwrap() {
            RegisterOutcome::Registered(id) => assert_eq!(id, 1),
            _ => panic!("expected registration"),
        }
        assert!(matches!(db.register("alice", "p", "Alice").unwrap(), RegisterOutcome::AlreadyExists));
        assert_eq!(db.authenticate("alice", "p").unwrap(), Some(1));
        assert_eq!(db.authenticate("alice", "wrong").unwrap(), None);
    }

    #[test]
    fn open_with_file_backed_path_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.sqlite3");

        let db = Db::open(&path).unwrap();
        db.register("alice", "p", "Alice").unwrap();
        drop(db);

        let db = Db::open(&path).unwrap();
        assert_eq!(db.authenticate("alice", "p").unwrap(), Some(1));
    }

    #[test]
    fn friendship_is_symmetric_after_accept() {
        let db = Db::open_memory().unwrap();
        db.register("alice", "p", "Alice").unwrap();
        db.register("bob", "p", "Bob").unwrap();
        assert!(matches!(
            db.send_friend_request(1, 2).unwrap(),
            FriendRequestOutcome::RequestSent
        ));
        assert!(matches!(
            db.send_friend_request(1, 2).unwrap(),
            FriendRequestOutcome::AlreadyPending
        ));
        assert!(db.accept_friend_request(2, 1).unwrap());
        let a_friends: Vec<i64> = db.list_friends(1).unwrap().into_iter().map(|u| u.friend_id).collect();
        let b_friends: Vec<i64> = db.list_friends(2).unwrap().into_iter().map(|u| u.friend_id).collect();
        assert_eq!(a_friends, vec![2]);
        assert_eq!(b_friends, vec![1]);
    }

    #[test]
    fn delete_friend_is_idempotent_both_directions() {
        let db = Db::open_memory().unwrap();
        db.register("alice", "p", "Alice").unwrap();
        db.register("bob", "p", "Bob").unwrap();
        db.send_friend_request(1, 2).unwrap();
        db.accept_friend_request(2, 1).unwrap();
        assert!(db.delete_friend(1, 2).unwrap() > 0);
        assert_eq!(db.delete_friend(1, 2).unwrap(), 0);
        assert!(db.list_friends(1).unwrap().is_empty());
    }

    #[test]
    fn delete_account_removes_every_referencing_row() {
        let db = Db::open_memory().unwrap();
        db.register("alice", "p", "Alice").unwrap();
        db.register("bob", "p", "Bob").unwrap();
        let chat_id = db.create_chat(1, "room", false).unwrap();
        db.add_members(chat_id, 1, &[2]).unwrap();
        db.append_message(chat_id, 1, "hi", 1).unwrap();
        db.send_friend_request(1, 2).unwrap();
        db.accept_friend_request(2, 1).unwrap();

        db.delete_account(1).unwrap();

        assert_eq!(db.user_name(1).unwrap(), None);
        assert!(db.list_friends(2).unwrap().is_empty());
        assert!(db.list_members(chat_id).unwrap().iter().all(|u| u.user_id != 1));
    }

    #[test]
    fn add_members_filters_self_and_duplicates() {
        let db = Db::open_memory().unwrap();
        db.register("alice", "p", "Alice").unwrap();
        db.register("bob", "p", "Bob").unwrap();
        let chat_id = db.create_chat(1, "room", false).unwrap();
        let inserted = db.add_members(chat_id, 1, &[1, 2, 999]).unwrap();
        assert_eq!(inserted, vec![2]);
        let inserted_again = db.add_members(chat_id, 1, &[2]).unwrap();
        assert!(inserted_again.is_empty());
    }

    #[test]
    fn delete_voice_chat_enforces_admin_and_voice_only() {
        let db = Db::open_memory().unwrap();
        db.register("alice", "p", "Alice").unwrap();
        db.register("bob", "p", "Bob").unwrap();
        let voice_chat = db.create_chat(1, "room", true).unwrap();
        let text_chat = db.create_chat(1, "text-room", false).unwrap();
        assert!(matches!(
            db.delete_voice_chat(2, voice_chat).unwrap(),
            DeleteVoiceOutcome::NotAdmin
        ));
        assert!(matches!(
            db.delete_voice_chat(1, text_chat).unwrap(),
            DeleteVoiceOutcome::NotVoice
        ));
        assert!(matches!(
            db.delete_voice_chat(1, voice_chat).unwrap(),
            DeleteVoiceOutcome::Ok
        ));
    }

    #[test]
    fn messages_are_ordered_by_timestamp_then_id() {
        let db = Db::open_memory().unwrap();
        db.register("alice", "p", "Alice").unwrap();
        let chat_id = db.create_chat(1, "room", false).unwrap();
        db.append_message(chat_id, 1, "first", 100).unwrap();
        db.append_message(chat_id, 1, "second", 100).unwrap();
        db.append_message(chat_id, 1, "third", 50).unwrap();
        let texts: Vec<String> = db.list_messages(chat_id).unwrap().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["third", "first", "second"]);
    }
}
