//! Primitive graph records shared by every store backend.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Length of a canonical entity identifier (hex characters)
pub const ENTITY_ID_LENGTH: usize = 32;

/// Attribute bag attached to nodes and edges
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Stable string identifier of a node or edge: 32 lowercase hex characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Allocate a fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Parse a client-supplied identifier, normalizing to lowercase
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.len() != ENTITY_ID_LENGTH || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(anyhow!(
                "entity id must be {ENTITY_ID_LENGTH} hexadecimal characters, got {:?}",
                raw
            ));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Node kinds known to the social graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    User,
    Group,
    Thread,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Group => "Group",
            Self::Thread => "Thread",
        }
    }
}

/// Directed, typed relationships between nodes
///
/// Every edge points from an acting tail (always a User) to its head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// User follows User
    Follow,
    /// User started Thread
    Start,
    /// User replied to Thread (carries the reply content)
    Reply,
    /// User created Group
    Create,
    /// User is a member of Group
    Join,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Follow => "Follow",
            Self::Start => "Start",
            Self::Reply => "Reply",
            Self::Create => "Create",
            Self::Join => "Join",
        }
    }
}

/// A stored node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: EntityId,
    pub kind: NodeKind,
    pub attributes: Attributes,
    /// Monotonic insertion sequence, used to keep listings stable
    pub seq: u64,
}

/// A stored edge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub id: EntityId,
    pub kind: EdgeKind,
    pub tail: EntityId,
    pub head: EntityId,
    pub attributes: Attributes,
    pub seq: u64,
}

/// Aggregate counts exposed through health and metrics
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
}
