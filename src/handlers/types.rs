//! API Response Types
//!
//! Success envelope, pagination and the payload shapes shared by several
//! controllers.

use axum::Json;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::Result;
use crate::validation::Params;

// =============================================================================
// ENVELOPE
// =============================================================================

/// `{"success": true, ...payload}`
#[derive(Debug, Serialize)]
pub struct Success<T: Serialize> {
    pub success: bool,
    #[serde(flatten)]
    pub payload: T,
}

/// Handler return type: success envelope or an [`AppError`](crate::errors::AppError)
pub type ApiResult<T> = Result<Json<Success<T>>>;

pub fn succeed<T: Serialize>(payload: T) -> ApiResult<T> {
    Ok(Json(Success {
        success: true,
        payload,
    }))
}

/// Payload for endpoints that only report success
#[derive(Debug, Serialize)]
pub struct Ack {}

pub fn ack() -> ApiResult<Ack> {
    succeed(Ack {})
}

#[derive(Debug, Serialize)]
pub struct IdResponse {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// "Following fields set successfully: a, b"
pub fn fields_set(fields: &[&str]) -> MessageResponse {
    MessageResponse {
        message: format!("Following fields set successfully: {}", fields.join(", ")),
    }
}

// =============================================================================
// PAGINATION
// =============================================================================

/// Slice a listing by the `offset` and `count` query parameters
///
/// Missing or unparsable values fall back to offset 0 and `default_count`.
/// An offset past the end yields an empty page.
pub fn paginate<T>(items: Vec<T>, params: &Params, default_count: usize) -> Vec<T> {
    let offset = params
        .get("offset")
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    let count = params
        .get("count")
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(default_count);

    items.into_iter().skip(offset).take(count).collect()
}

// =============================================================================
// FORUM
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ThreadSummary {
    pub id: String,
    pub title: String,
    pub author: String,
    pub timestamp: String,
    /// user id -> public profile, author included
    pub contributors: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct ThreadListResponse {
    pub threads: Vec<ThreadSummary>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadMessage {
    pub id: String,
    pub author: String,
    pub content: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ThreadResponse {
    pub title: String,
    pub messages: Vec<ThreadMessage>,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: Vec<String>,
}

// =============================================================================
// GROUPS
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub id: String,
    pub title: String,
    pub description: String,
    pub creator: String,
    /// Member count, rendered as a string
    pub count: String,
}

#[derive(Debug, Serialize)]
pub struct GroupListResponse {
    pub groups: Vec<GroupSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct GroupDetail {
    #[serde(flatten)]
    pub summary: GroupSummary,
    pub members: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct GroupResponse {
    pub group: GroupDetail,
}

#[derive(Debug, Serialize)]
pub struct MembersResponse {
    pub members: Vec<String>,
}

// =============================================================================
// PROFILE & ACCOUNT
// =============================================================================

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub profile: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct WhoamiResponse {
    pub id: String,
    pub username: String,
}
