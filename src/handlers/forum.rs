//! Forum Handlers
//!
//! Threads are nodes started by a user (Start edge); replies are Reply edges
//! from their author to the thread.

use axum::extract::{Query, State};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::info;

use super::router::AppState;
use super::types::{
    ack, paginate, succeed, Ack, ApiResult, DeletedResponse, IdResponse, ThreadListResponse,
    ThreadMessage, ThreadResponse, ThreadSummary,
};
use super::utils::{entity_id, validate};
use crate::auth::Actor;
use crate::errors::{AppError, Result};
use crate::graph::entities::{profile, text, timestamp};
use crate::graph::{Entity, EntityId, Graph, NodeRecord};
use crate::validation::{Params, Rule, RuleSet, MAX_TITLE_LENGTH};

const NOT_THREAD_OWNER: &str = "You are not the owner of this thread.";
const NOT_REPLY_OWNER: &str = "You are not the owner of this reply.";

/// GET|POST /startThread?title&message
#[tracing::instrument(skip_all, fields(actor = %actor.id))]
pub async fn start_thread(
    State(state): State<AppState>,
    actor: Actor,
    Query(params): Query<Params>,
) -> ApiResult<IdResponse> {
    let rules = RuleSet::new()
        .field("title", &[Rule::Required, Rule::MaxLength(MAX_TITLE_LENGTH)])
        .field("message", &[Rule::Required]);
    validate(
        &params,
        &rules,
        "Title (up to 80 chars) and Message are required.",
    )?;

    let thread = state
        .graph
        .start_thread(&actor.id, &params["title"], &params["message"])?;
    info!(thread = %thread.id, "Thread started");

    succeed(IdResponse {
        id: thread.id.to_string(),
    })
}

/// GET|POST /reply?id&message
#[tracing::instrument(skip_all, fields(actor = %actor.id))]
pub async fn reply(
    State(state): State<AppState>,
    actor: Actor,
    Query(params): Query<Params>,
) -> ApiResult<IdResponse> {
    let rules = RuleSet::new()
        .field("id", &[Rule::Required])
        .field("message", &[Rule::Required]);
    validate(&params, &rules, "Thread ID and Message are required.")?;

    let thread = match entity_id(&params, "id") {
        Some(id) => state.graph.node(&id)?,
        None => None,
    };
    let Some(Entity::Thread(thread)) = thread else {
        return Err(AppError::not_found(
            "Given ID is not associated with a forum thread.",
        ));
    };

    let reply = state
        .graph
        .reply(&actor.id, &thread.id, &params["message"])?;
    info!(thread = %thread.id, reply = %reply.id, "Reply posted");

    succeed(IdResponse {
        id: reply.id.to_string(),
    })
}

/// GET|POST /editForumPost?id&content
///
/// Only the author of a thread or reply may edit it.
#[tracing::instrument(skip_all, fields(actor = %actor.id))]
pub async fn edit_forum_post(
    State(state): State<AppState>,
    actor: Actor,
    Query(params): Query<Params>,
) -> ApiResult<Ack> {
    let rules = RuleSet::new()
        .field("id", &[Rule::Required])
        .field("content", &[Rule::Required]);
    validate(&params, &rules, "Message ID and Content are required.")?;

    let entity = match entity_id(&params, "id") {
        Some(id) => state.graph.entity(&id)?,
        None => None,
    };
    let target = match entity {
        Some(Entity::Thread(thread)) => {
            ensure_thread_owner(&state.graph, &thread.id, &actor.id)?;
            thread.id
        }
        Some(Entity::Reply(reply)) => {
            if reply.tail != actor.id {
                return Err(AppError::forbidden(NOT_REPLY_OWNER));
            }
            reply.id
        }
        _ => return Err(AppError::not_found("Incompatible entity type.")),
    };

    state
        .graph
        .set_attribute(&target, "content", params["content"].as_str())?;
    info!(post = %target, "Forum post edited");

    ack()
}

/// GET|POST /deleteForumPost?id
///
/// Deleting a thread removes its replies with it.
#[tracing::instrument(skip_all, fields(actor = %actor.id))]
pub async fn delete_forum_post(
    State(state): State<AppState>,
    actor: Actor,
    Query(params): Query<Params>,
) -> ApiResult<DeletedResponse> {
    let rules = RuleSet::new().field("id", &[Rule::Required]);
    validate(&params, &rules, "Entity ID unavailable.")?;

    let entity = match entity_id(&params, "id") {
        Some(id) => state.graph.entity(&id)?,
        None => None,
    };
    let target = match entity {
        Some(Entity::Thread(thread)) => {
            ensure_thread_owner(&state.graph, &thread.id, &actor.id)?;
            thread.id
        }
        Some(Entity::Reply(reply)) => {
            if reply.tail != actor.id {
                return Err(AppError::forbidden(NOT_REPLY_OWNER));
            }
            reply.id
        }
        _ => {
            return Err(AppError::not_found(
                "The ID does not belong to a thread or reply.",
            ))
        }
    };

    state.graph.destroy(&target)?;

    succeed(DeletedResponse {
        deleted: vec![target.to_string()],
    })
}

/// GET|POST /getThreads?offset&count
///
/// Threads whose Start edge is gone have no author and are left out.
/// Contributors are keyed by user id: the author first, then repliers in
/// the order they first replied.
pub async fn get_threads(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> ApiResult<ThreadListResponse> {
    let graph = &state.graph;
    let mut profiles = ProfileCache::default();
    let mut threads = Vec::new();

    for entity in graph.members()? {
        let Entity::Thread(thread) = entity else {
            continue;
        };
        let Some(author) = graph.thread_author(&thread.id)? else {
            tracing::debug!(thread = %thread.id, "Skipping thread without author");
            continue;
        };

        let mut contributors = Map::new();
        if let Some(p) = profiles.get(graph, &author)? {
            contributors.insert(author.to_string(), p);
        }
        for reply in graph.replies(&thread.id)? {
            if contributors.contains_key(reply.tail.as_str()) {
                continue;
            }
            if let Some(p) = profiles.get(graph, &reply.tail)? {
                contributors.insert(reply.tail.to_string(), p);
            }
        }

        threads.push(ThreadSummary {
            id: thread.id.to_string(),
            title: text(&thread.attributes, "title"),
            author: author.to_string(),
            timestamp: timestamp(&thread.attributes, "create_time"),
            contributors,
        });
    }

    let total = threads.len();
    let threads = paginate(threads, &params, state.config.page_size);

    succeed(ThreadListResponse { threads, total })
}

/// GET|POST /getThread?id
///
/// The thread body comes first, then replies in the order they were posted.
pub async fn get_thread(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> ApiResult<ThreadResponse> {
    let rules = RuleSet::new().field("id", &[Rule::Required]);
    validate(&params, &rules, "Thread ID required.")?;

    let node = match entity_id(&params, "id") {
        Some(id) => state.graph.node(&id)?,
        None => None,
    };
    let Some(Entity::Thread(thread)) = node else {
        return Err(AppError::not_found("Not a Thread"));
    };

    let messages = thread_messages(&state.graph, &thread)?;
    succeed(ThreadResponse {
        title: text(&thread.attributes, "title"),
        messages,
    })
}

fn thread_messages(graph: &Graph, thread: &NodeRecord) -> Result<Vec<ThreadMessage>> {
    let author = graph
        .thread_author(&thread.id)?
        .map(|id| id.to_string())
        .unwrap_or_default();

    let mut messages = vec![ThreadMessage {
        id: thread.id.to_string(),
        author,
        content: text(&thread.attributes, "content"),
        timestamp: timestamp(&thread.attributes, "create_time"),
    }];
    messages.extend(graph.replies(&thread.id)?.into_iter().map(|reply| ThreadMessage {
        id: reply.id.to_string(),
        author: reply.tail.to_string(),
        content: text(&reply.attributes, "content"),
        timestamp: timestamp(&reply.attributes, "reply_time"),
    }));
    Ok(messages)
}

fn ensure_thread_owner(graph: &Graph, thread: &EntityId, actor: &EntityId) -> Result<()> {
    match graph.thread_author(thread)? {
        Some(author) if &author == actor => Ok(()),
        _ => Err(AppError::forbidden(NOT_THREAD_OWNER)),
    }
}

/// Profiles looked up once per listing
#[derive(Default)]
struct ProfileCache {
    seen: HashMap<EntityId, Option<Value>>,
}

impl ProfileCache {
    fn get(&mut self, graph: &Graph, user: &EntityId) -> Result<Option<Value>> {
        if let Some(cached) = self.seen.get(user) {
            return Ok(cached.clone());
        }
        let found = graph.user(user)?.map(|u| Value::Object(profile(&u)));
        self.seen.insert(user.clone(), found.clone());
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::TestHarness;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_only_author_can_edit_or_delete_thread() {
        let h = TestHarness::new();
        let (alice, _) = h.signup("alice").await;
        let (bob, _) = h.signup("bob").await;

        let resp = h.get("/startThread?title=Hi&message=Body", Some(&alice)).await;
        let thread = resp.body["id"].as_str().unwrap().to_string();

        let resp = h
            .get(&format!("/editForumPost?id={thread}&content=hijack"), Some(&bob))
            .await;
        assert_eq!(resp.status, StatusCode::FORBIDDEN);
        assert_eq!(resp.message(), "You are not the owner of this thread.");

        let resp = h
            .get(&format!("/deleteForumPost?id={thread}"), Some(&bob))
            .await;
        assert_eq!(resp.status, StatusCode::FORBIDDEN);

        let resp = h.get(&format!("/getThread?id={thread}"), None).await;
        assert_eq!(resp.body["messages"][0]["content"], "Body");

        let resp = h
            .get(&format!("/editForumPost?id={thread}&content=Edited"), Some(&alice))
            .await;
        assert_eq!(resp.status, StatusCode::OK);
        let resp = h.get(&format!("/getThread?id={thread}"), None).await;
        assert_eq!(resp.body["messages"][0]["content"], "Edited");
    }

    #[tokio::test]
    async fn test_reply_ownership_and_thread_cascade() {
        let h = TestHarness::new();
        let (alice, _) = h.signup("alice").await;
        let (bob, bob_id) = h.signup("bob").await;

        let resp = h.get("/startThread?title=Hi&message=Body", Some(&alice)).await;
        let thread = resp.body["id"].as_str().unwrap().to_string();
        let resp = h
            .get(&format!("/reply?id={thread}&message=Bob+here"), Some(&bob))
            .await;
        let reply = resp.body["id"].as_str().unwrap().to_string();

        let resp = h
            .get(&format!("/deleteForumPost?id={reply}"), Some(&alice))
            .await;
        assert_eq!(resp.message(), "You are not the owner of this reply.");

        let resp = h
            .get(&format!("/editForumPost?id={reply}&content=fixed"), Some(&bob))
            .await;
        assert_eq!(resp.status, StatusCode::OK);

        let resp = h.get(&format!("/getThread?id={thread}"), None).await;
        let messages = resp.body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1]["author"], bob_id.as_str());
        assert_eq!(messages[1]["content"], "fixed");

        let resp = h
            .get(&format!("/deleteForumPost?id={thread}"), Some(&alice))
            .await;
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.body["deleted"], serde_json::json!([thread]));

        let resp = h
            .get(&format!("/deleteForumPost?id={reply}"), Some(&bob))
            .await;
        assert_eq!(resp.message(), "The ID does not belong to a thread or reply.");
    }

    #[tokio::test]
    async fn test_reply_requires_thread() {
        let h = TestHarness::new();
        let (alice, alice_id) = h.signup("alice").await;

        let resp = h
            .get(&format!("/reply?id={alice_id}&message=hello"), Some(&alice))
            .await;
        assert_eq!(resp.status, StatusCode::NOT_FOUND);
        assert_eq!(resp.message(), "Given ID is not associated with a forum thread.");

        let resp = h.get("/reply?id=&message=hello", Some(&alice)).await;
        assert_eq!(resp.message(), "Thread ID and Message are required.");
    }

    #[tokio::test]
    async fn test_edit_rejects_non_forum_entities() {
        let h = TestHarness::new();
        let (alice, _) = h.signup("alice").await;
        let resp = h.get("/createGroup?title=G&description=D", Some(&alice)).await;
        let group = resp.body["id"].as_str().unwrap().to_string();

        let resp = h
            .get(&format!("/editForumPost?id={group}&content=x"), Some(&alice))
            .await;
        assert_eq!(resp.message(), "Incompatible entity type.");
    }

    #[tokio::test]
    async fn test_contributors_include_author_and_repliers() {
        let h = TestHarness::new();
        let (alice, alice_id) = h.signup("alice").await;
        let (bob, bob_id) = h.signup("bob").await;

        let resp = h.get("/startThread?title=Hi&message=Body", Some(&alice)).await;
        let thread = resp.body["id"].as_str().unwrap().to_string();
        h.get(&format!("/reply?id={thread}&message=one"), Some(&bob)).await;
        h.get(&format!("/reply?id={thread}&message=two"), Some(&bob)).await;

        let resp = h.get("/getThreads", None).await;
        let listed = &resp.body["threads"][0];
        assert_eq!(listed["author"], alice_id.as_str());
        let contributors = listed["contributors"].as_object().unwrap();
        assert_eq!(contributors.len(), 2);
        assert_eq!(contributors[&bob_id]["username"], "bob");
        assert!(contributors[&alice_id].get("password").is_none());
    }
}
