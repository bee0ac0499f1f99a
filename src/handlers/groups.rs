//! Group Handlers
//!
//! A group is owned by the user on the tail of its Create edge; membership is
//! a Join edge from the member to the group.

use axum::extract::{Query, State};
use serde_json::Value;
use tracing::info;

use super::router::AppState;
use super::types::{
    ack, fields_set, paginate, succeed, Ack, ApiResult, GroupDetail, GroupListResponse,
    GroupResponse, GroupSummary, IdResponse, MembersResponse, MessageResponse,
};
use super::utils::{entity_id, validate};
use crate::auth::Actor;
use crate::errors::{AppError, Result};
use crate::graph::entities::text;
use crate::graph::{Entity, Graph, NodeRecord};
use crate::validation::{self, Params, Rule, RuleSet, MAX_TITLE_LENGTH};

const GROUP_ID_REQUIRED: &str = "Group ID required.";
const NOT_A_GROUP: &str = "Given ID is not associated with a Group";

/// Resolve the `id` parameter to a Group node
fn lookup_group(graph: &Graph, params: &Params) -> Result<Option<NodeRecord>> {
    let Some(id) = entity_id(params, "id") else {
        return Ok(None);
    };
    Ok(match graph.node(&id)? {
        Some(Entity::Group(group)) => Some(group),
        _ => None,
    })
}

fn summarize(graph: &Graph, group: &NodeRecord) -> Result<GroupSummary> {
    let creator = graph
        .group_creator(&group.id)?
        .map(|id| id.to_string())
        .unwrap_or_default();
    let count = graph.group_members(&group.id)?.len();

    Ok(GroupSummary {
        id: group.id.to_string(),
        title: text(&group.attributes, "title"),
        description: text(&group.attributes, "description"),
        creator,
        count: count.to_string(),
    })
}

fn all_groups(graph: &Graph) -> Result<Vec<NodeRecord>> {
    Ok(graph
        .members()?
        .into_iter()
        .filter_map(|entity| match entity {
            Entity::Group(group) => Some(group),
            _ => None,
        })
        .collect())
}

/// GET|POST /createGroup?title&description
#[tracing::instrument(skip_all, fields(actor = %actor.id))]
pub async fn create_group(
    State(state): State<AppState>,
    actor: Actor,
    Query(params): Query<Params>,
) -> ApiResult<IdResponse> {
    let rules = RuleSet::new()
        .field("title", &[Rule::Required, Rule::MaxLength(MAX_TITLE_LENGTH)])
        .field("description", &[Rule::Required]);
    validate(
        &params,
        &rules,
        "Title (up to 80 chars) and Description are required.",
    )?;

    let group = state
        .graph
        .create_group(&actor.id, &params["title"], &params["description"])?;
    info!(group = %group.id, "Group created");

    succeed(IdResponse {
        id: group.id.to_string(),
    })
}

/// GET|POST /setGroup?id&title?&description?
///
/// Only the group's creator may edit it.
#[tracing::instrument(skip_all, fields(actor = %actor.id))]
pub async fn set_group(
    State(state): State<AppState>,
    actor: Actor,
    Query(params): Query<Params>,
) -> ApiResult<MessageResponse> {
    validate(
        &params,
        &RuleSet::new().field("id", &[Rule::Required]),
        "Group ID is required.",
    )?;

    let Some(group) = lookup_group(&state.graph, &params)? else {
        return Err(AppError::not_found("Valid Group ID is required."));
    };

    if state.graph.group_creator(&group.id)?.as_ref() != Some(&actor.id) {
        return Err(AppError::forbidden(
            "You do not have privileges to edit this group.",
        ));
    }

    if let Some(title) = params.get("title") {
        validation::check("title", title, &[Rule::MaxLength(MAX_TITLE_LENGTH)])
            .map_err(|_| AppError::validation("Title must be 80 chars or less."))?;
    }

    let mut sets = Vec::new();
    for field in ["title", "description"] {
        if let Some(value) = params.get(field) {
            state
                .graph
                .set_attribute(&group.id, field, Value::from(value.as_str()))?;
            sets.push(field);
        }
    }

    if sets.is_empty() {
        return Err(AppError::validation("No field to set"));
    }
    info!(group = %group.id, fields = ?sets, "Group updated");

    succeed(fields_set(&sets))
}

/// GET|POST /joinGroup?id
///
/// Joining a group twice is a no-op.
#[tracing::instrument(skip_all, fields(actor = %actor.id))]
pub async fn join_group(
    State(state): State<AppState>,
    actor: Actor,
    Query(params): Query<Params>,
) -> ApiResult<Ack> {
    validate(
        &params,
        &RuleSet::new().field("id", &[Rule::Required]),
        GROUP_ID_REQUIRED,
    )?;

    let Some(group) = lookup_group(&state.graph, &params)? else {
        return Err(AppError::not_found(NOT_A_GROUP));
    };

    if state.graph.join(&actor.id, &group.id)? {
        info!(group = %group.id, "Joined group");
    }
    ack()
}

/// GET|POST /leaveGroup?id
#[tracing::instrument(skip_all, fields(actor = %actor.id))]
pub async fn leave_group(
    State(state): State<AppState>,
    actor: Actor,
    Query(params): Query<Params>,
) -> ApiResult<Ack> {
    validate(
        &params,
        &RuleSet::new().field("id", &[Rule::Required]),
        GROUP_ID_REQUIRED,
    )?;

    let Some(group) = lookup_group(&state.graph, &params)? else {
        return Err(AppError::not_found(NOT_A_GROUP));
    };

    if !state.graph.group_contains(&group.id, &actor.id)? {
        return Err(AppError::validation("User is not a member of given Group"));
    }

    state.graph.leave(&actor.id, &group.id)?;
    info!(group = %group.id, "Left group");
    ack()
}

/// GET|POST /listMemberships?id
///
/// Groups the given user belongs to.
pub async fn list_memberships(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> ApiResult<GroupListResponse> {
    validate(
        &params,
        &RuleSet::new().field("id", &[Rule::Required]),
        "User ID required.",
    )?;

    let Some(user) = entity_id(&params, "id") else {
        return Err(AppError::not_found("Invalid user ID"));
    };
    if state.graph.user(&user)?.is_none() {
        return Err(AppError::not_found("Invalid user ID"));
    }

    let mut groups = Vec::new();
    for group_id in state.graph.memberships(&user)? {
        if let Some(Entity::Group(group)) = state.graph.node(&group_id)? {
            groups.push(summarize(&state.graph, &group)?);
        }
    }

    succeed(GroupListResponse {
        groups,
        total: None,
    })
}

/// GET|POST /listGroups?offset&count
pub async fn list_groups(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> ApiResult<GroupListResponse> {
    let groups = all_groups(&state.graph)?;
    let total = groups.len();

    let groups = paginate(groups, &params, state.config.page_size)
        .iter()
        .map(|group| summarize(&state.graph, group))
        .collect::<Result<Vec<_>>>()?;

    succeed(GroupListResponse {
        groups,
        total: Some(total),
    })
}

/// GET|POST /fetchGroup?id
pub async fn fetch_group(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> ApiResult<GroupResponse> {
    validate(
        &params,
        &RuleSet::new().field("id", &[Rule::Required]),
        GROUP_ID_REQUIRED,
    )?;

    let Some(group) = lookup_group(&state.graph, &params)? else {
        return Err(AppError::not_found(format!(
            "The object with ID {} is not a Group",
            params["id"]
        )));
    };

    let summary = summarize(&state.graph, &group)?;
    let members = member_ids(&state.graph, &group)?;

    succeed(GroupResponse {
        group: GroupDetail { summary, members },
    })
}

/// GET|POST /listMembers?id
pub async fn list_members(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> ApiResult<MembersResponse> {
    validate(
        &params,
        &RuleSet::new().field("id", &[Rule::Required]),
        GROUP_ID_REQUIRED,
    )?;

    let Some(group) = lookup_group(&state.graph, &params)? else {
        return Err(AppError::not_found(NOT_A_GROUP));
    };

    succeed(MembersResponse {
        members: member_ids(&state.graph, &group)?,
    })
}

/// Member ids that still resolve to users
fn member_ids(graph: &Graph, group: &NodeRecord) -> Result<Vec<String>> {
    let mut members = Vec::new();
    for id in graph.group_members(&group.id)? {
        if graph.user(&id)?.is_some() {
            members.push(id.to_string());
        }
    }
    Ok(members)
}
