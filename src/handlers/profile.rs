//! Profile Handlers
//!
//! Public profile reads, profile edits by the session user, and the Follow
//! edges behind the follower/following counts.

use axum::extract::{Query, State};
use serde_json::Value;
use tracing::info;

use super::router::AppState;
use super::types::{ack, fields_set, succeed, Ack, ApiResult, MessageResponse, ProfileResponse};
use super::utils::{blocking, entity_id, validate};
use crate::auth::{self, Actor};
use crate::errors::AppError;
use crate::graph::entities::profile;
use crate::graph::{EntityId, GraphFlavor};
use crate::validation::{self, Params, Rule, RuleSet};

/// Extra free-form attributes accepted by Site installations
const CUSTOM_FIELDS: [&str; 3] = ["custom_field1", "custom_field2", "custom_field3"];

/// GET|POST /getProfile?id
pub async fn get_profile(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> ApiResult<ProfileResponse> {
    validate(
        &params,
        &RuleSet::new().field("id", &[Rule::Required]),
        "Valid user ID required.",
    )?;

    let raw = &params["id"];
    if !validation::ID_PATTERN.is_match(raw) {
        return Err(AppError::validation("Invalid user ID"));
    }
    let user = match EntityId::parse(raw) {
        Ok(id) => state.graph.user(&id)?,
        Err(_) => None,
    };
    let Some(user) = user else {
        return Err(AppError::not_found("Invalid user ID"));
    };

    let mut profile = profile(&user);
    profile.insert(
        "follower_count".into(),
        Value::from(state.graph.follower_count(&user.id)?),
    );
    profile.insert(
        "following_count".into(),
        Value::from(state.graph.following_count(&user.id)?),
    );
    profile.insert(
        "membership_count".into(),
        Value::from(state.graph.memberships(&user.id)?.len()),
    );

    succeed(ProfileResponse { profile })
}

/// GET|POST /setProfile?username?&password?&birthday?&avatar?&email?&about?&custom_field1..3?
///
/// Every supplied field is validated before anything is written, so a bad
/// field leaves the profile untouched.
#[tracing::instrument(skip_all, fields(actor = %actor.id))]
pub async fn set_profile(
    State(state): State<AppState>,
    actor: Actor,
    Query(params): Query<Params>,
) -> ApiResult<MessageResponse> {
    let username = params.get("username");
    if let Some(username) = username {
        if !validation::USERNAME_PATTERN.is_match(username) {
            return Err(AppError::validation("Invalid username"));
        }
    }

    let password = params.get("password").cloned();
    if let Some(password) = &password {
        if !validation::PASSWORD_PATTERN.is_match(password) {
            return Err(AppError::validation("Invalid password"));
        }
    }

    let mut changes: Vec<(&'static str, Value)> = Vec::new();

    if let Some(birthday) = params.get("birthday") {
        let ts = validation::parse_birthday(birthday)
            .map_err(|_| AppError::validation("Birthday invalid."))?;
        changes.push(("birthday", Value::from(ts)));
    }

    if let Some(avatar) = params.get("avatar") {
        if !validation::is_valid_url(avatar) {
            return Err(AppError::validation("Avatar URL invalid."));
        }
        changes.push(("avatar", Value::from(avatar.as_str())));
    }

    if let Some(email) = params.get("email") {
        if !validation::is_valid_email(email) {
            return Err(AppError::validation("Email is invalid."));
        }
        changes.push(("email", Value::from(email.as_str())));
    }

    if let Some(about) = params.get("about") {
        changes.push(("about", Value::from(about.as_str())));
    }

    if state.graph.flavor() == GraphFlavor::Site {
        for field in CUSTOM_FIELDS {
            if let Some(value) = params.get(field) {
                changes.push((field, Value::from(value.as_str())));
            }
        }
    }

    if username.is_none() && password.is_none() && changes.is_empty() {
        return Err(AppError::validation("No field to set"));
    }

    // Hash before the first write so a hashing failure changes nothing
    if let Some(password) = password {
        let hash = blocking(move || auth::hash_password(&password)).await?;
        changes.insert(0, ("password", Value::from(hash)));
    }

    // The uniqueness check and the rename are one store operation
    let mut sets = Vec::with_capacity(changes.len() + 1);
    if let Some(username) = username {
        if !state.graph.rename_user(&actor.id, username)? {
            return Err(AppError::Conflict("Username already exists.".into()));
        }
        sets.push("username");
    }
    for (field, value) in changes {
        state.graph.set_attribute(&actor.id, field, value)?;
        sets.push(field);
    }
    info!(fields = ?sets, "Profile updated");

    succeed(fields_set(&sets))
}

/// Resolve the `id` parameter to another user
fn follow_target(state: &AppState, actor: &Actor, params: &Params) -> crate::errors::Result<EntityId> {
    validate(
        params,
        &RuleSet::new().field("id", &[Rule::Required]),
        "Valid user ID required.",
    )?;

    let Some(target) = entity_id(params, "id") else {
        return Err(AppError::not_found("Invalid user ID"));
    };
    if state.graph.user(&target)?.is_none() {
        return Err(AppError::not_found("Invalid user ID"));
    }
    if target == actor.id {
        return Err(AppError::validation("Cannot follow yourself."));
    }
    Ok(target)
}

/// GET|POST /follow?id
#[tracing::instrument(skip_all, fields(actor = %actor.id))]
pub async fn follow(
    State(state): State<AppState>,
    actor: Actor,
    Query(params): Query<Params>,
) -> ApiResult<Ack> {
    let target = follow_target(&state, &actor, &params)?;
    if state.graph.follow(&actor.id, &target)? {
        info!(%target, "Now following");
    }
    ack()
}

/// GET|POST /unfollow?id
#[tracing::instrument(skip_all, fields(actor = %actor.id))]
pub async fn unfollow(
    State(state): State<AppState>,
    actor: Actor,
    Query(params): Query<Params>,
) -> ApiResult<Ack> {
    let target = follow_target(&state, &actor, &params)?;
    if !state.graph.unfollow(&actor.id, &target)? {
        return Err(AppError::validation("You are not following this user."));
    }
    info!(%target, "Unfollowed");
    ack()
}
