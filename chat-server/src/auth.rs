//! Credential handler (C2): handshake query parsing and password hashing.

use sha2::{Digest, Sha256};

use crate::error::AppError;

/// The two shapes a handshake query string can take (spec §6).
#[derive(Debug, Clone)]
pub enum HandshakeRequest {
    Login { login: String, password: String },
    Register { login: String, password: String, name: String },
}

/// Hash a cleartext password with a fixed one-way digest. Comparison
/// always happens on the digest, never on the cleartext (spec §4.2).
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn non_empty(s: &str) -> bool {
    !s.is_empty() && !s.chars().any(char::is_whitespace)
}

/// Parse the query string of a handshake upgrade request.
///
/// Missing required fields, empty fields, or fields containing whitespace
/// are rejected (spec §4.2).
pub fn parse_handshake(query: &str) -> Result<HandshakeRequest, AppError> {
    let params: std::collections::HashMap<String, String> =
        url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();

    let login_reg = params.get("login_reg").map(String::as_str);
    let password = params.get("password").map(String::as_str);
    let name = params.get("name").map(String::as_str);
    let login = params.get("login").map(String::as_str);

    if let Some(login_reg) = login_reg {
        let password = password.ok_or_else(|| {
            AppError::Protocol("missing password for registration".into())
        })?;
        let name = name.ok_or_else(|| AppError::Protocol("missing name for registration".into()))?;
        if !non_empty(login_reg) || !non_empty(password) || !non_empty(name) {
            return Err(AppError::Protocol("empty or malformed registration field".into()));
        }
        return Ok(HandshakeRequest::Register {
            login: login_reg.to_string(),
            password: password.to_string(),
            name: name.to_string(),
        });
    }

    let login = login.ok_or_else(|| AppError::Protocol("missing login".into()))?;
    let password = password.ok_or_else(|| AppError::Protocol("missing password".into()))?;
    if !non_empty(login) || !non_empty(password) {
        return Err(AppError::Protocol("empty or malformed login field".into()));
    }
    Ok(HandshakeRequest::Login {
        login: login.to_string(),
        password: password.to_string(),
    })
}
