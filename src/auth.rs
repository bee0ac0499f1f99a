//! Session authentication
//!
//! The acting user is stored in the `tower-sessions` session under
//! [`SESSION_ACTOR_KEY`]. Handlers that mutate the graph take an [`Actor`]
//! argument; the extractor rejects the request with the uniform
//! "Session required" failure before the handler body runs.

use anyhow::anyhow;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use crate::errors::{AppError, Result};
use crate::graph::EntityId;
use crate::handlers::AppState;

/// Session key holding the authenticated user id
pub const SESSION_ACTOR_KEY: &str = "graphjs.actor";

/// The authenticated user behind a request
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: EntityId,
    pub username: String,
}

impl FromRequestParts<AppState> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::SessionRequired)?;

        let Some(raw) = session
            .get::<String>(SESSION_ACTOR_KEY)
            .await
            .map_err(|e| AppError::Internal(anyhow!(e)))?
        else {
            return Err(AppError::SessionRequired);
        };

        let id = EntityId::parse(&raw).map_err(|_| AppError::SessionRequired)?;

        // The user may have been removed since the session began
        let Some(user) = state.graph.user(&id)? else {
            tracing::debug!(actor = %id, "Session refers to a missing user");
            return Err(AppError::SessionRequired);
        };

        Ok(Actor {
            username: crate::graph::entities::text(&user.attributes, "username"),
            id,
        })
    }
}

/// Bind `user` to the session, rotating the session id
pub async fn begin_session(session: &Session, user: &EntityId) -> Result<()> {
    session
        .cycle_id()
        .await
        .map_err(|e| AppError::Internal(anyhow!(e)))?;
    session
        .insert(SESSION_ACTOR_KEY, user.as_str())
        .await
        .map_err(|e| AppError::Internal(anyhow!(e)))?;
    Ok(())
}

/// Drop all session data and expire the cookie
pub async fn end_session(session: &Session) -> Result<()> {
    session
        .flush()
        .await
        .map_err(|e| AppError::Internal(anyhow!(e)))
}

/// Hash a password into an Argon2id PHC string
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("password hashing failed: {e}"))?;
    Ok(hash.to_string())
}

/// Check a password against a stored PHC string
///
/// A malformed stored hash never matches.
pub fn verify_password(password: &str, phc: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!("Stored password hash is unreadable: {e}");
            false
        }
    }
}
