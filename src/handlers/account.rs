//! Account Handlers
//!
//! Signup, login and logout manage the session that every mutating endpoint
//! depends on.

use axum::extract::{Query, State};
use tower_sessions::Session;
use tracing::{info, warn};

use super::router::AppState;
use super::types::{ack, succeed, Ack, ApiResult, IdResponse, WhoamiResponse};
use super::utils::{blocking, validate};
use crate::auth::{self, Actor};
use crate::errors::AppError;
use crate::graph::entities::text;
use crate::metrics;
use crate::validation::{self, Params, Rule, RuleSet};

/// GET|POST /signup?username&email&password
///
/// Creates the user and logs them in.
#[tracing::instrument(skip_all)]
pub async fn signup(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<Params>,
) -> ApiResult<IdResponse> {
    let rules = RuleSet::new()
        .field(
            "username",
            &[Rule::Required, Rule::Pattern(&validation::USERNAME_PATTERN)],
        )
        .field("email", &[Rule::Required, Rule::Email])
        .field(
            "password",
            &[Rule::Required, Rule::Pattern(&validation::PASSWORD_PATTERN)],
        );
    validate(
        &params,
        &rules,
        "Valid username, email and password required.",
    )?;

    let taken = || AppError::Conflict("Username already exists.".into());
    let username = params["username"].clone();
    if state.graph.find_user_by_username(&username)?.is_some() {
        return Err(taken());
    }

    // The lookup above only skips hashing; create_user decides the race
    let password = params["password"].clone();
    let hash = blocking(move || auth::hash_password(&password)).await?;
    let user = state
        .graph
        .create_user(&username, &params["email"], &hash)?
        .ok_or_else(taken)?;

    auth::begin_session(&session, &user.id).await?;
    info!(user = %user.id, %username, "Signed up");

    succeed(IdResponse {
        id: user.id.to_string(),
    })
}

/// GET|POST /login?username&password
#[tracing::instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<Params>,
) -> ApiResult<IdResponse> {
    let rules = RuleSet::new()
        .field("username", &[Rule::Required])
        .field("password", &[Rule::Required]);
    validate(
        &params,
        &rules,
        "Username and password fields are required.",
    )?;

    let mismatch = || {
        metrics::LOGIN_ATTEMPTS_TOTAL
            .with_label_values(&["rejected"])
            .inc();
        AppError::InvalidCredentials("Information don't match records".into())
    };

    let Some(user) = state.graph.find_user_by_username(&params["username"])? else {
        return Err(mismatch());
    };

    let password = params["password"].clone();
    let phc = text(&user.attributes, "password");
    let verified = blocking(move || Ok(auth::verify_password(&password, &phc))).await?;
    if !verified {
        warn!(user = %user.id, "Login rejected");
        return Err(mismatch());
    }

    auth::begin_session(&session, &user.id).await?;
    metrics::LOGIN_ATTEMPTS_TOTAL
        .with_label_values(&["accepted"])
        .inc();
    info!(user = %user.id, "Logged in");

    succeed(IdResponse {
        id: user.id.to_string(),
    })
}

/// GET|POST /logout
pub async fn logout(session: Session) -> ApiResult<Ack> {
    auth::end_session(&session).await?;
    ack()
}

/// GET|POST /whoami
pub async fn whoami(actor: Actor) -> ApiResult<WhoamiResponse> {
    succeed(WhoamiResponse {
        id: actor.id.to_string(),
        username: actor.username,
    })
}
