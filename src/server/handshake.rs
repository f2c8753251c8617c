//! First-line identity resolution.
//!
//! The first line a client sends names it. Three forms are accepted, tried in
//! order:
//!
//! 1. A signed travel token minted by `/travel` on a server sharing the secret.
//! 2. A base64 session token wrapping `{"server_name": .., "username": ..}`.
//! 3. Anything else is taken verbatim as the username.
//!
//! A token that fails to decode or verify falls through to the next form, so
//! a handshake never fails outright here; username rules are enforced later
//! when the session is admitted.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::logutil::escape_log;
use crate::travel::TravelIssuer;

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("session token is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("session token is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("session token is missing a server name or username")]
    Incomplete,
}

/// Payload of a base64 session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    pub server_name: String,
    pub username: String,
}

impl SessionToken {
    /// Encode as the base64 line a client sends.
    pub fn encode(&self) -> String {
        // Serializing two strings cannot fail.
        STANDARD.encode(serde_json::to_vec(self).unwrap_or_default())
    }
}

/// Who a connection claims to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    /// Set when the client arrived from another server.
    pub origin_server: Option<String>,
}

pub fn decode_session_token(line: &str) -> Result<SessionToken, HandshakeError> {
    let bytes = STANDARD.decode(line.trim())?;
    let token: SessionToken = serde_json::from_slice(&bytes)?;
    if token.server_name.is_empty() || token.username.is_empty() {
        return Err(HandshakeError::Incomplete);
    }
    Ok(token)
}

/// Resolve the handshake line into an identity.
pub fn resolve_identity(line: &str, travel: &dyn TravelIssuer) -> Identity {
    let line = line.trim_end_matches(['\r', '\n']);

    // JWTs have exactly three dot-separated segments; skip the HMAC for plain names.
    if line.split('.').count() == 3 {
        match travel.verify(line) {
            Ok(claims) => {
                debug!("Handshake: travel token for {} from {}", claims.username, claims.server_name);
                return Identity {
                    username: claims.username,
                    origin_server: Some(claims.server_name),
                };
            }
            Err(e) => trace!("Handshake: not a travel token ({})", e),
        }
    }

    match decode_session_token(line) {
        Ok(token) => Identity {
            username: token.username,
            origin_server: Some(token.server_name),
        },
        Err(e) => {
            trace!("Handshake: raw username '{}' ({})", escape_log(line), e);
            Identity {
                username: line.to_string(),
                origin_server: None,
            }
        }
    }
}

/// Read the handshake line. `None` means the peer closed before sending one.
///
/// Invalid UTF-8 is replaced rather than rejected; validation decides what to do with it.
pub async fn read_handshake<R>(reader: &mut R) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    if reader.read_until(b'\n', &mut buf).await? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(&buf);
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}
