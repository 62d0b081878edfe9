//! Error taxonomy for the chat core (spec §7).

use thiserror::Error;

/// The abstract error kinds the router translates into reply frames.
///
/// Every variant maps to a `status:"error"` frame on the originating
/// opcode's own topic; none of these are meant to panic the session.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("already exists")]
    AlreadyExists,

    #[error("not found")]
    NotFound,

    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("conflicting state: {0}")]
    ConflictingState(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl AppError {
    /// The string the client sees in the `error` field of a reply frame.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Store(_) => "internal store error".to_string(),
            other => other.to_string(),
        }
    }
}
