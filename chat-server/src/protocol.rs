//! Message codec (C3): the JSON wire envelope and opcode table (spec §6).

use serde_json::Value;

use crate::error::AppError;

/// Decoded client → server intents, one per opcode in §6's table.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    Subscribe { to: i64 },
    ListChats,
    PostMessage { to: i64, msg: String },
    CreateChat { chat_name: String, invited: Vec<i64>, is_voice_chat: bool },
    GetMessageHistory { to: i64 },
    DeleteAccount,
    InviteToChat { invited: Vec<i64>, chat_id: i64, is_voice_chat: bool },
    ListChatMembers,
    SearchUsers { search_term: String },
    AddFriend { friend_id: i64 },
    ListFriends,
    AcceptFriendRequest { friend_id: i64 },
    RejectFriendRequest { friend_id: i64 },
    DeleteFriend { friend_id: i64 },
    UpdateAccount { name: Option<String>, password: Option<String> },
    DeleteVoiceChat { chat_id: i64 },
    Logout,
}

fn req_i64(v: &Value, field: &str) -> Result<i64, AppError> {
    v.get(field)
        .and_then(Value::as_i64)
        .ok_or_else(|| AppError::Protocol(format!("missing or malformed field `{field}`")))
}

fn req_str<'a>(v: &'a Value, field: &str) -> Result<&'a str, AppError> {
    v.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Protocol(format!("missing or malformed field `{field}`")))
}

fn id_list(v: &Value, field: &str) -> Result<Vec<i64>, AppError> {
    match v.get(field) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_i64()
                    .ok_or_else(|| AppError::Protocol(format!("`{field}` must be a list of integers")))
            })
            .collect(),
        Some(_) => Err(AppError::Protocol(format!("`{field}` must be an array"))),
    }
}

/// Decode one client frame. `ty` selects the opcode; the rest of the
/// object carries opcode-specific fields.
pub fn decode(raw: &str) -> Result<ClientMessage, AppError> {
    let v: Value = serde_json::from_str(raw).map_err(|e| AppError::Protocol(e.to_string()))?;
    let ty = v
        .get("ty")
        .and_then(Value::as_i64)
        .ok_or_else(|| AppError::Protocol("missing integer `ty`".into()))?;

    Ok(match ty {
        1 => ClientMessage::Subscribe { to: req_i64(&v, "to")? },
        2 => ClientMessage::ListChats,
        3 => ClientMessage::PostMessage {
            to: req_i64(&v, "to")?,
            msg: req_str(&v, "msg")?.to_string(),
        },
        4 => ClientMessage::CreateChat {
            chat_name: req_str(&v, "chatName")?.to_string(),
            invited: id_list(&v, "Invited")?,
            is_voice_chat: v.get("isVoiceChat").and_then(Value::as_bool).unwrap_or(false),
        },
        6 => ClientMessage::GetMessageHistory { to: req_i64(&v, "to")? },
        8 => ClientMessage::DeleteAccount,
        10 => ClientMessage::InviteToChat {
            invited: id_list(&v, "Invited")?,
            chat_id: req_i64(&v, "chatId")?,
            is_voice_chat: v.get("isVoiceChat").and_then(Value::as_bool).unwrap_or(false),
        },
        11 => ClientMessage::ListChatMembers,
        12 => ClientMessage::SearchUsers {
            search_term: req_str(&v, "searchTerm")?.to_string(),
        },
        13 => ClientMessage::AddFriend { friend_id: req_i64(&v, "friend_id")? },
        14 => ClientMessage::ListFriends,
        15 => ClientMessage::AcceptFriendRequest { friend_id: req_i64(&v, "friend_id")? },
        16 => ClientMessage::RejectFriendRequest { friend_id: req_i64(&v, "friend_id")? },
        18 => ClientMessage::DeleteFriend { friend_id: req_i64(&v, "friend_id")? },
        20 => ClientMessage::UpdateAccount {
            name: v.get("name").and_then(Value::as_str).map(str::to_string),
            password: v.get("password").and_then(Value::as_str).map(str::to_string),
        },
        21 => ClientMessage::DeleteVoiceChat { chat_id: req_i64(&v, "chat_id")? },
        22 => ClientMessage::Logout,
        other => return Err(AppError::Protocol(format!("unknown opcode {other}"))),
    })
}

/// Serialize a frame (always a flat JSON object) to a wire-ready string.
pub fn encode(frame: &Value) -> String {
    frame.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_subscribe() {
        let msg = decode(r#"{"ty":1,"to":42}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Subscribe { to: 42 }));
    }

    #[test]
    fn decodes_post_message() {
        let msg = decode(r#"{"ty":3,"to":1,"msg":"hi"}"#).unwrap();
        match msg {
            ClientMessage::PostMessage { to, msg } => {
                assert_eq!(to, 1);
                assert_eq!(msg, "hi");
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn rejects_unknown_opcode() {
        assert!(decode(r#"{"ty":999}"#).is_err());
    }

    #[test]
    fn rejects_missing_required_field() {
        assert!(decode(r#"{"ty":1}"#).is_err());
    }

    #[test]
    fn create_chat_defaults_invited_to_empty() {
        let msg = decode(r#"{"ty":4,"chatName":"room","isVoiceChat":false}"#).unwrap();
        match msg {
            ClientMessage::CreateChat { invited, .. } => assert!(invited.is_empty()),
            _ => panic!("wrong variant"),
        }
    }
}
