//! Typed views over resolved graph records

use serde_json::{Map, Value};

use super::types::{Attributes, EdgeKind, EdgeRecord, NodeKind, NodeRecord};

/// Attribute keys never exposed through profile payloads
const HIDDEN_PROFILE_KEYS: &[&str] = &["password"];

/// An identifier resolved to whatever it names
///
/// Replies are edges (User -Reply-> Thread) but behave as first-class forum
/// posts, so they get their own variant.
#[derive(Debug, Clone)]
pub enum Entity {
    User(NodeRecord),
    Group(NodeRecord),
    Thread(NodeRecord),
    Reply(EdgeRecord),
    /// Any other relationship (Follow, Start, Create, Join)
    Edge(EdgeRecord),
}

impl Entity {
    pub fn from_node(node: NodeRecord) -> Self {
        match node.kind {
            NodeKind::User => Self::User(node),
            NodeKind::Group => Self::Group(node),
            NodeKind::Thread => Self::Thread(node),
        }
    }

    pub fn from_edge(edge: EdgeRecord) -> Self {
        match edge.kind {
            EdgeKind::Reply => Self::Reply(edge),
            _ => Self::Edge(edge),
        }
    }
}

/// Read a string attribute, empty when missing
pub fn text(attributes: &Attributes, key: &str) -> String {
    match attributes.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Render a stored unix timestamp the way clients receive it (decimal string)
pub fn timestamp(attributes: &Attributes, key: &str) -> String {
    match attributes.get(key) {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

/// Public profile of a user: every attribute except the password, keys
/// lowercased
pub fn profile(user: &NodeRecord) -> Map<String, Value> {
    user.attributes
        .iter()
        .filter(|(key, _)| {
            !HIDDEN_PROFILE_KEYS
                .iter()
                .any(|hidden| key.eq_ignore_ascii_case(hidden))
        })
        .map(|(key, value)| (key.to_lowercase(), value.clone()))
        .collect()
}
