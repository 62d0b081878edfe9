//! Chat server front door (C9): accepts transport connections, parses the
//! handshake, and hands off to a session (spec §4.5, §6).

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{RawQuery, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde_json::json;
use tokio::sync::mpsc;
use tower_http::services::ServeDir;
use tracing::{debug, info, warn};

use crate::auth::{self, HandshakeRequest};
use crate::config::Config;
use crate::db::{Db, RegisterOutcome};
use crate::error::AppError;
use crate::hub::{Hub, OUTBOUND_QUEUE_CAPACITY};
use crate::protocol::{self, ClientMessage};
use crate::router::{self, DispatchOutcome};
use crate::session::Session;

pub struct Server {
    config: Config,
    hub: Arc<Hub>,
}

impl Server {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let db = Db::open(&config.db_path)?;
        let hub = Arc::new(Hub::new(Arc::new(db)));
        Ok(Server { config, hub })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.config.listen_addr();
        let doc_root = self.config.doc_root.clone();
        let mut app = Router::new().route("/ws", get(ws_upgrade)).with_state(self.hub.clone());
        if doc_root.exists() {
            app = app.fallback_service(ServeDir::new(&doc_root));
        } else {
            debug!(path = %doc_root.display(), "doc_root not present, skipping static fallback");
        }

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(%addr, "chat-server listening");
        axum::serve(listener, app).await?;
        Ok(())
    }
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(hub): State<Arc<Hub>>,
    RawQuery(query): RawQuery,
) -> impl IntoResponse {
    let query = query.unwrap_or_default();
    let request = match auth::parse_handshake(&query) {
        Ok(req) => req,
        Err(err) => return (StatusCode::BAD_REQUEST, err.user_message()).into_response(),
    };

    let user_id = match authenticate_or_register(&hub, request) {
        Ok(id) => id,
        Err(err) => return (StatusCode::BAD_REQUEST, err.user_message()).into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, hub, user_id))
}

fn authenticate_or_register(hub: &Hub, request: HandshakeRequest) -> Result<i64, AppError> {
    match request {
        HandshakeRequest::Login { login, password } => {
            hub.db.authenticate(&login, &password)?.ok_or(AppError::InvalidCredentials)
        }
        HandshakeRequest::Register { login, password, name } => {
            match hub.db.register(&login, &password, &name)? {
                RegisterOutcome::Registered(id) => {
                    hub.broadcast_to_all(&json!({ "topic": 0, "user_id": id, "user_name": name }));
                    Ok(id)
                }
                RegisterOutcome::AlreadyExists => Err(AppError::AlreadyExists),
            }
        }
    }
}

/// Priming sequence on successful upgrade: user roster, chat list, then
/// the user-id echo (spec §4.5, supplemented ordering from original_source).
fn priming_frames(hub: &Hub, user_id: i64) -> Result<Vec<serde_json::Value>, AppError> {
    let users = hub.db.search_users_by_name("")?;
    let chats = hub.db.list_chats_for(user_id)?;
    Ok(vec![
        json!({ "topic": 0, "users": users }),
        json!({ "topic": 2, "chats": chats }),
        json!({ "topic": 7, "user_id": user_id }),
    ])
}

async fn handle_socket(socket: WebSocket, hub: Arc<Hub>, user_id: i64) {
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_CAPACITY);
    hub.join(user_id, tx);
    let session = Session::new(user_id);

    match priming_frames(&hub, user_id) {
        Ok(frames) => {
            for frame in frames {
                hub.send_to_user(user_id, &frame);
            }
        }
        Err(err) => warn!(user_id, %err, "failed to build priming frames"),
    }

    let mut socket = socket;
    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        if !handle_frame(&hub, &session, &text) {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!(user_id, %err, "websocket read error");
                        break;
                    }
                }
            }
            outgoing = rx.recv() => {
                match outgoing {
                    Some(line) => {
                        if socket.send(WsMessage::Text(line.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    if let Some(chat_id) = session.current_subscription() {
        hub.topics.leave(chat_id, user_id);
    }
    hub.leave(user_id);
    let _ = socket.send(WsMessage::Close(None)).await;
}

/// Decode and dispatch one inbound frame. Returns `false` when the session
/// should terminate.
///
/// Framing/decode errors are transport-level per spec §7 and terminate the
/// session outright, unlike handler errors which reply on the opcode's own
/// topic and let the session continue.
fn handle_frame(hub: &Hub, session: &Session, raw: &str) -> bool {
    let msg: ClientMessage = match protocol::decode(raw) {
        Ok(msg) => msg,
        Err(err) => {
            debug!(user_id = session.user_id, %err, "dropping session on decode error");
            return false;
        }
    };

    match router::dispatch(hub, session, msg) {
        DispatchOutcome::Reply(frame) => {
            hub.send_to_user(session.user_id, &frame);
            true
        }
        DispatchOutcome::NoReply => true,
        DispatchOutcome::Terminate(frame) => {
            hub.send_to_user(session.user_id, &frame);
            false
        }
    }
}
