//! Travel credentials for moving a user between servers.
//!
//! `/travel` mints a short-lived signed token naming the current server and
//! the user. Another server that shares the secret accepts the token as a
//! handshake line and announces the user as transferred.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default token lifetime.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Error)]
pub enum TravelError {
    #[error("failed to sign travel token: {0}")]
    Sign(#[source] jsonwebtoken::errors::Error),

    #[error("travel token rejected: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),

    #[error("travel token is missing a server name or username")]
    Incomplete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TravelClaims {
    pub server_name: String,
    pub username: String,
    /// Expiry as seconds since the Unix epoch.
    pub exp: u64,
}

/// Issues and checks travel credentials.
pub trait TravelIssuer: Send + Sync {
    fn issue(&self, server_name: &str, username: &str) -> Result<String, TravelError>;
    fn verify(&self, token: &str) -> Result<TravelClaims, TravelError>;
}

/// HS256 JWT issuer keyed by a shared secret.
pub struct JwtTravelIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    validation: Validation,
}

impl JwtTravelIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
            validation,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl TravelIssuer for JwtTravelIssuer {
    fn issue(&self, server_name: &str, username: &str) -> Result<String, TravelError> {
        let now = u64::try_from(Utc::now().timestamp()).unwrap_or(0);
        let claims = TravelClaims {
            server_name: server_name.to_string(),
            username: username.to_string(),
            exp: now.saturating_add(self.ttl.as_secs()),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(TravelError::Sign)
    }

    fn verify(&self, token: &str) -> Result<TravelClaims, TravelError> {
        let claims = jsonwebtoken::decode::<TravelClaims>(token, &self.decoding, &self.validation)
            .map_err(TravelError::Invalid)?
            .claims;
        if claims.server_name.is_empty() || claims.username.is_empty() {
            return Err(TravelError::Incomplete);
        }
        Ok(claims)
    }
}
