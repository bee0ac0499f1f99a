//! Graph gateway
//!
//! Typed domain operations over a [`GraphStore`]. Controllers never touch
//! raw nodes and edges directly; they resolve identifiers to [`Entity`]
//! values and call the mutators here, which keep the social-graph
//! invariants:
//! - a Thread has exactly one Start edge (its author)
//! - a Group has exactly one Create edge (its creator), who is also a member
//! - a Reply is an edge from its author to exactly one Thread
//! - destroying a node removes every edge incident to it

pub mod entities;
pub mod store;
pub mod types;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

pub use entities::Entity;
pub use store::{open_store, GraphStore, MemoryGraphStore, SnapshotGraphStore};
pub use types::{Attributes, EdgeKind, EdgeRecord, EntityId, GraphStats, NodeKind, NodeRecord};

use crate::metrics;

/// Deployment flavor of the graph
///
/// `Site` installations accept the `custom_field1..3` profile attributes,
/// `Network` installations do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphFlavor {
    Site,
    Network,
}

impl GraphFlavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Site => "site",
            Self::Network => "network",
        }
    }
}

fn now() -> Value {
    Value::from(chrono::Utc::now().timestamp())
}

fn record_mutation(op: &'static str) {
    metrics::GRAPH_MUTATIONS_TOTAL.with_label_values(&[op]).inc();
}

/// Domain facade shared by every controller
#[derive(Clone)]
pub struct Graph {
    store: Arc<dyn GraphStore>,
    flavor: GraphFlavor,
}

impl Graph {
    pub fn new(store: Arc<dyn GraphStore>, flavor: GraphFlavor) -> Self {
        Self { store, flavor }
    }

    /// Volatile graph, used by tests and demos
    pub fn in_memory(flavor: GraphFlavor) -> Self {
        Self::new(Arc::new(MemoryGraphStore::new()), flavor)
    }

    pub fn flavor(&self) -> GraphFlavor {
        self.flavor
    }

    pub fn stats(&self) -> GraphStats {
        self.store.stats()
    }

    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve a node identifier. Edges are not considered.
    pub fn node(&self, id: &EntityId) -> Result<Option<Entity>> {
        Ok(self.store.node(id)?.map(Entity::from_node))
    }

    /// Resolve any identifier, node first, then edge
    pub fn entity(&self, id: &EntityId) -> Result<Option<Entity>> {
        if let Some(node) = self.store.node(id)? {
            return Ok(Some(Entity::from_node(node)));
        }
        Ok(self.store.edge(id)?.map(Entity::from_edge))
    }

    /// Resolve an identifier that must name a User
    pub fn user(&self, id: &EntityId) -> Result<Option<NodeRecord>> {
        Ok(match self.node(id)? {
            Some(Entity::User(user)) => Some(user),
            _ => None,
        })
    }

    /// Every node in the graph, oldest first
    pub fn members(&self) -> Result<Vec<Entity>> {
        Ok(self
            .store
            .nodes()?
            .into_iter()
            .map(Entity::from_node)
            .collect())
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Create a user. `password_hash` must already be a PHC string.
    ///
    /// Returns `None` when the username is taken (case-insensitive); the
    /// check and the insert are one store operation.
    pub fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<Option<NodeRecord>> {
        let mut attributes = Attributes::new();
        attributes.insert("username".into(), Value::from(username));
        attributes.insert("email".into(), Value::from(email));
        attributes.insert("password".into(), Value::from(password_hash));
        attributes.insert("join_time".into(), now());
        let Some(user) = self
            .store
            .insert_node_unique(NodeKind::User, "username", attributes)?
        else {
            return Ok(None);
        };
        record_mutation("create_user");
        info!(user = %user.id, username, "User created");
        Ok(Some(user))
    }

    /// Change a username; false when another user holds it
    pub fn rename_user(&self, user: &EntityId, username: &str) -> Result<bool> {
        if !self.store.set_attribute_unique(user, "username", username)? {
            return Ok(false);
        }
        record_mutation("set_attribute");
        Ok(true)
    }

    /// Case-insensitive username lookup
    pub fn find_user_by_username(&self, username: &str) -> Result<Option<NodeRecord>> {
        Ok(self.store.nodes()?.into_iter().find(|node| {
            node.kind == NodeKind::User
                && node
                    .attributes
                    .get("username")
                    .and_then(Value::as_str)
                    .is_some_and(|name| name.eq_ignore_ascii_case(username))
        }))
    }

    /// Returns false when `user` already follows `target`
    pub fn follow(&self, user: &EntityId, target: &EntityId) -> Result<bool> {
        let inserted = self
            .store
            .insert_edge_if_absent(EdgeKind::Follow, user, target, Attributes::new())?;
        if inserted.is_some() {
            record_mutation("follow");
        }
        Ok(inserted.is_some())
    }

    /// Returns false when `user` was not following `target`
    pub fn unfollow(&self, user: &EntityId, target: &EntityId) -> Result<bool> {
        match self.find_edge(EdgeKind::Follow, user, target)? {
            Some(edge) => {
                self.store.remove(&edge.id)?;
                record_mutation("unfollow");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn follower_count(&self, user: &EntityId) -> Result<usize> {
        Ok(self.store.incoming(user, Some(EdgeKind::Follow))?.len())
    }

    pub fn following_count(&self, user: &EntityId) -> Result<usize> {
        Ok(self.store.outgoing(user, Some(EdgeKind::Follow))?.len())
    }

    /// Groups `user` belongs to, oldest membership first
    pub fn memberships(&self, user: &EntityId) -> Result<Vec<EntityId>> {
        Ok(self
            .store
            .outgoing(user, Some(EdgeKind::Join))?
            .into_iter()
            .map(|edge| edge.head)
            .collect())
    }

    // =========================================================================
    // Forum
    // =========================================================================

    pub fn start_thread(&self, author: &EntityId, title: &str, content: &str) -> Result<NodeRecord> {
        let mut attributes = Attributes::new();
        attributes.insert("title".into(), Value::from(title));
        attributes.insert("content".into(), Value::from(content));
        attributes.insert("create_time".into(), now());

        let thread = self.store.insert_node(NodeKind::Thread, attributes)?;
        if let Err(e) = self
            .store
            .insert_edge(EdgeKind::Start, author, &thread.id, Attributes::new())
        {
            // Never leave an authorless thread behind
            self.store.remove(&thread.id)?;
            return Err(e);
        }
        record_mutation("start_thread");
        Ok(thread)
    }

    pub fn reply(&self, author: &EntityId, thread: &EntityId, content: &str) -> Result<EdgeRecord> {
        let mut attributes = Attributes::new();
        attributes.insert("content".into(), Value::from(content));
        attributes.insert("reply_time".into(), now());
        let reply = self
            .store
            .insert_edge(EdgeKind::Reply, author, thread, attributes)?;
        record_mutation("reply");
        Ok(reply)
    }

    /// Author of a thread, `None` if its Start edge is gone
    pub fn thread_author(&self, thread: &EntityId) -> Result<Option<EntityId>> {
        Ok(self
            .store
            .incoming(thread, Some(EdgeKind::Start))?
            .into_iter()
            .next()
            .map(|edge| edge.tail))
    }

    /// Replies to a thread in the order they were posted
    pub fn replies(&self, thread: &EntityId) -> Result<Vec<EdgeRecord>> {
        self.store.incoming(thread, Some(EdgeKind::Reply))
    }

    // =========================================================================
    // Groups
    // =========================================================================

    /// Create a group owned by `creator`, who joins it immediately
    pub fn create_group(&self, creator: &EntityId, title: &str, description: &str) -> Result<NodeRecord> {
        let mut attributes = Attributes::new();
        attributes.insert("title".into(), Value::from(title));
        attributes.insert("description".into(), Value::from(description));
        attributes.insert("create_time".into(), now());

        let group = self.store.insert_node(NodeKind::Group, attributes)?;
        let linked = self
            .store
            .insert_edge(EdgeKind::Create, creator, &group.id, Attributes::new())
            .and_then(|_| {
                self.store
                    .insert_edge(EdgeKind::Join, creator, &group.id, Attributes::new())
            });
        if let Err(e) = linked {
            self.store.remove(&group.id)?;
            return Err(e);
        }
        record_mutation("create_group");
        Ok(group)
    }

    pub fn group_creator(&self, group: &EntityId) -> Result<Option<EntityId>> {
        Ok(self
            .store
            .incoming(group, Some(EdgeKind::Create))?
            .into_iter()
            .next()
            .map(|edge| edge.tail))
    }

    /// Member user ids in join order
    pub fn group_members(&self, group: &EntityId) -> Result<Vec<EntityId>> {
        Ok(self
            .store
            .incoming(group, Some(EdgeKind::Join))?
            .into_iter()
            .map(|edge| edge.tail)
            .collect())
    }

    pub fn group_contains(&self, group: &EntityId, user: &EntityId) -> Result<bool> {
        Ok(self.find_edge(EdgeKind::Join, user, group)?.is_some())
    }

    /// Returns false when `user` was already a member
    pub fn join(&self, user: &EntityId, group: &EntityId) -> Result<bool> {
        let inserted = self
            .store
            .insert_edge_if_absent(EdgeKind::Join, user, group, Attributes::new())?;
        if inserted.is_some() {
            record_mutation("join");
        }
        Ok(inserted.is_some())
    }

    pub fn leave(&self, user: &EntityId, group: &EntityId) -> Result<()> {
        let edge = self
            .find_edge(EdgeKind::Join, user, group)?
            .ok_or_else(|| anyhow!("{user} is not a member of {group}"))?;
        self.store.remove(&edge.id)?;
        record_mutation("leave");
        Ok(())
    }

    // =========================================================================
    // Generic mutators
    // =========================================================================

    pub fn set_attribute(&self, id: &EntityId, key: &str, value: impl Into<Value>) -> Result<()> {
        self.store.set_attribute(id, key, value.into())?;
        record_mutation("set_attribute");
        Ok(())
    }

    /// Destroy a node or edge; returns every removed id, `id` first
    pub fn destroy(&self, id: &EntityId) -> Result<Vec<EntityId>> {
        let removed = self.store.remove(id)?;
        record_mutation("destroy");
        info!(%id, removed = removed.len(), "Entity destroyed");
        Ok(removed)
    }

    fn find_edge(&self, kind: EdgeKind, tail: &EntityId, head: &EntityId) -> Result<Option<EdgeRecord>> {
        Ok(self
            .store
            .outgoing(tail, Some(kind))?
            .into_iter()
            .find(|edge| &edge.head == head))
    }
}
