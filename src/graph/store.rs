//! Graph store backends
//!
//! [`GraphStore`] is the seam between the controllers and whatever engine keeps
//! the graph. Two backends ship with the server:
//! - [`MemoryGraphStore`]: process-local, lost on restart (tests, demos)
//! - [`SnapshotGraphStore`]: the memory store plus a JSON snapshot that is
//!   loaded at startup and rewritten on flush / graceful shutdown
//!
//! The backend is picked once at startup from configuration, see
//! [`open_store`].

use anyhow::{anyhow, Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::types::{Attributes, EdgeKind, EdgeRecord, EntityId, GraphStats, NodeKind, NodeRecord};
use crate::config::{GraphBackend, ServerConfig};

/// Snapshot format version written to disk
const SNAPSHOT_VERSION: u32 = 1;

/// Primitive node/edge operations every backend provides
///
/// Listing methods return records in insertion order.
pub trait GraphStore: Send + Sync {
    fn insert_node(&self, kind: NodeKind, attributes: Attributes) -> Result<NodeRecord>;

    /// Insert an edge; both endpoints must exist
    fn insert_edge(
        &self,
        kind: EdgeKind,
        tail: &EntityId,
        head: &EntityId,
        attributes: Attributes,
    ) -> Result<EdgeRecord>;

    /// Insert a node unless another node of the same kind already holds an
    /// ASCII case-insensitively equal string under `key`. `None` on a clash.
    fn insert_node_unique(
        &self,
        kind: NodeKind,
        key: &str,
        attributes: Attributes,
    ) -> Result<Option<NodeRecord>>;

    /// Insert an edge unless one of the same kind already runs from `tail`
    /// to `head`. `None` when it exists.
    fn insert_edge_if_absent(
        &self,
        kind: EdgeKind,
        tail: &EntityId,
        head: &EntityId,
        attributes: Attributes,
    ) -> Result<Option<EdgeRecord>>;

    fn node(&self, id: &EntityId) -> Result<Option<NodeRecord>>;

    fn edge(&self, id: &EntityId) -> Result<Option<EdgeRecord>>;

    /// Every node in the graph
    fn nodes(&self) -> Result<Vec<NodeRecord>>;

    /// Edges whose head is `id`, optionally restricted to one kind
    fn incoming(&self, id: &EntityId, kind: Option<EdgeKind>) -> Result<Vec<EdgeRecord>>;

    /// Edges whose tail is `id`, optionally restricted to one kind
    fn outgoing(&self, id: &EntityId, kind: Option<EdgeKind>) -> Result<Vec<EdgeRecord>>;

    /// Set one attribute on a node or an edge
    fn set_attribute(&self, id: &EntityId, key: &str, value: serde_json::Value) -> Result<()>;

    /// Set a string attribute on node `id` unless another node of the same
    /// kind holds it (ASCII case-insensitive). Returns false on a clash.
    fn set_attribute_unique(&self, id: &EntityId, key: &str, value: &str) -> Result<bool>;

    /// Remove a node or edge. Removing a node removes every incident edge.
    /// Returns the ids of everything removed, the requested id first.
    fn remove(&self, id: &EntityId) -> Result<Vec<EntityId>>;

    fn stats(&self) -> GraphStats;

    /// Persist pending state. No-op for volatile backends.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Build the backend selected by configuration
pub fn open_store(config: &ServerConfig) -> Result<Arc<dyn GraphStore>> {
    match config.backend {
        GraphBackend::Memory => {
            info!("Graph backend: in-memory (state is lost on restart)");
            Ok(Arc::new(MemoryGraphStore::new()))
        }
        GraphBackend::Snapshot => {
            let store = SnapshotGraphStore::open(&config.snapshot_path)?;
            Ok(Arc::new(store))
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GraphSnapshot {
    version: u32,
    nodes: Vec<NodeRecord>,
    edges: Vec<EdgeRecord>,
}

#[derive(Debug, Default)]
struct GraphState {
    nodes: HashMap<EntityId, NodeRecord>,
    edges: HashMap<EntityId, EdgeRecord>,
    /// head id -> ids of edges pointing at it
    incoming: HashMap<EntityId, Vec<EntityId>>,
    /// tail id -> ids of edges leaving it
    outgoing: HashMap<EntityId, Vec<EntityId>>,
    next_seq: u64,
}

impl GraphState {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn index_edge(&mut self, edge: &EdgeRecord) {
        self.incoming
            .entry(edge.head.clone())
            .or_default()
            .push(edge.id.clone());
        self.outgoing
            .entry(edge.tail.clone())
            .or_default()
            .push(edge.id.clone());
    }

    fn unindex_edge(&mut self, edge: &EdgeRecord) {
        if let Some(ids) = self.incoming.get_mut(&edge.head) {
            ids.retain(|id| id != &edge.id);
        }
        if let Some(ids) = self.outgoing.get_mut(&edge.tail) {
            ids.retain(|id| id != &edge.id);
        }
    }

    fn insert_node(&mut self, kind: NodeKind, attributes: Attributes) -> NodeRecord {
        let node = NodeRecord {
            id: EntityId::generate(),
            kind,
            attributes,
            seq: self.next_seq(),
        };
        self.nodes.insert(node.id.clone(), node.clone());
        debug!(id = %node.id, kind = kind.as_str(), "Inserted node");
        node
    }

    fn insert_edge(
        &mut self,
        kind: EdgeKind,
        tail: &EntityId,
        head: &EntityId,
        attributes: Attributes,
    ) -> Result<EdgeRecord> {
        if !self.nodes.contains_key(tail) {
            return Err(anyhow!("edge tail {tail} does not exist"));
        }
        if !self.nodes.contains_key(head) {
            return Err(anyhow!("edge head {head} does not exist"));
        }

        let edge = EdgeRecord {
            id: EntityId::generate(),
            kind,
            tail: tail.clone(),
            head: head.clone(),
            attributes,
            seq: self.next_seq(),
        };
        self.index_edge(&edge);
        self.edges.insert(edge.id.clone(), edge.clone());
        debug!(id = %edge.id, kind = kind.as_str(), %tail, %head, "Inserted edge");
        Ok(edge)
    }

    /// A node of `kind` other than `except` whose `key` equals `value`
    fn holder_of(
        &self,
        kind: NodeKind,
        key: &str,
        value: &str,
        except: Option<&EntityId>,
    ) -> Option<&NodeRecord> {
        self.nodes.values().find(|node| {
            node.kind == kind
                && except != Some(&node.id)
                && node
                    .attributes
                    .get(key)
                    .and_then(serde_json::Value::as_str)
                    .is_some_and(|held| held.eq_ignore_ascii_case(value))
        })
    }

    fn has_edge(&self, kind: EdgeKind, tail: &EntityId, head: &EntityId) -> bool {
        self.outgoing.get(tail).is_some_and(|ids| {
            ids.iter()
                .filter_map(|id| self.edges.get(id))
                .any(|edge| edge.kind == kind && &edge.head == head)
        })
    }

    fn collect_edges(&self, ids: Option<&Vec<EntityId>>, kind: Option<EdgeKind>) -> Vec<EdgeRecord> {
        let mut edges: Vec<EdgeRecord> = ids
            .into_iter()
            .flatten()
            .filter_map(|id| self.edges.get(id))
            .filter(|edge| kind.is_none_or(|k| edge.kind == k))
            .cloned()
            .collect();
        edges.sort_by_key(|e| e.seq);
        edges
    }

    fn snapshot(&self) -> GraphSnapshot {
        let mut nodes: Vec<NodeRecord> = self.nodes.values().cloned().collect();
        nodes.sort_by_key(|n| n.seq);
        let mut edges: Vec<EdgeRecord> = self.edges.values().cloned().collect();
        edges.sort_by_key(|e| e.seq);
        GraphSnapshot {
            version: SNAPSHOT_VERSION,
            nodes,
            edges,
        }
    }

    fn restore(snapshot: GraphSnapshot) -> Result<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(anyhow!(
                "unsupported snapshot version {} (expected {})",
                snapshot.version,
                SNAPSHOT_VERSION
            ));
        }

        let mut state = Self::default();
        for node in snapshot.nodes {
            state.next_seq = state.next_seq.max(node.seq);
            state.nodes.insert(node.id.clone(), node);
        }
        for edge in snapshot.edges {
            if !state.nodes.contains_key(&edge.tail) || !state.nodes.contains_key(&edge.head) {
                tracing::warn!(edge = %edge.id, "Dropping dangling edge from snapshot");
                continue;
            }
            state.next_seq = state.next_seq.max(edge.seq);
            state.index_edge(&edge);
            state.edges.insert(edge.id.clone(), edge);
        }
        Ok(state)
    }
}

/// Process-local graph guarded by a single reader/writer lock
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    state: RwLock<GraphState>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_snapshot(snapshot: GraphSnapshot) -> Result<Self> {
        Ok(Self {
            state: RwLock::new(GraphState::restore(snapshot)?),
        })
    }

    fn snapshot(&self) -> GraphSnapshot {
        self.state.read().snapshot()
    }
}

impl GraphStore for MemoryGraphStore {
    fn insert_node(&self, kind: NodeKind, attributes: Attributes) -> Result<NodeRecord> {
        Ok(self.state.write().insert_node(kind, attributes))
    }

    fn insert_edge(
        &self,
        kind: EdgeKind,
        tail: &EntityId,
        head: &EntityId,
        attributes: Attributes,
    ) -> Result<EdgeRecord> {
        self.state.write().insert_edge(kind, tail, head, attributes)
    }

    fn insert_node_unique(
        &self,
        kind: NodeKind,
        key: &str,
        attributes: Attributes,
    ) -> Result<Option<NodeRecord>> {
        let value = attributes
            .get(key)
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| anyhow!("unique attribute {key} must be a string"))?
            .to_string();

        let mut state = self.state.write();
        if state.holder_of(kind, key, &value, None).is_some() {
            return Ok(None);
        }
        Ok(Some(state.insert_node(kind, attributes)))
    }

    fn insert_edge_if_absent(
        &self,
        kind: EdgeKind,
        tail: &EntityId,
        head: &EntityId,
        attributes: Attributes,
    ) -> Result<Option<EdgeRecord>> {
        let mut state = self.state.write();
        if state.has_edge(kind, tail, head) {
            return Ok(None);
        }
        state.insert_edge(kind, tail, head, attributes).map(Some)
    }

    fn node(&self, id: &EntityId) -> Result<Option<NodeRecord>> {
        Ok(self.state.read().nodes.get(id).cloned())
    }

    fn edge(&self, id: &EntityId) -> Result<Option<EdgeRecord>> {
        Ok(self.state.read().edges.get(id).cloned())
    }

    fn nodes(&self) -> Result<Vec<NodeRecord>> {
        let state = self.state.read();
        let mut nodes: Vec<NodeRecord> = state.nodes.values().cloned().collect();
        nodes.sort_by_key(|n| n.seq);
        Ok(nodes)
    }

    fn incoming(&self, id: &EntityId, kind: Option<EdgeKind>) -> Result<Vec<EdgeRecord>> {
        let state = self.state.read();
        Ok(state.collect_edges(state.incoming.get(id), kind))
    }

    fn outgoing(&self, id: &EntityId, kind: Option<EdgeKind>) -> Result<Vec<EdgeRecord>> {
        let state = self.state.read();
        Ok(state.collect_edges(state.outgoing.get(id), kind))
    }

    fn set_attribute(&self, id: &EntityId, key: &str, value: serde_json::Value) -> Result<()> {
        let mut state = self.state.write();
        if let Some(node) = state.nodes.get_mut(id) {
            node.attributes.insert(key.to_string(), value);
            return Ok(());
        }
        if let Some(edge) = state.edges.get_mut(id) {
            edge.attributes.insert(key.to_string(), value);
            return Ok(());
        }
        Err(anyhow!("entity {id} does not exist"))
    }

    fn set_attribute_unique(&self, id: &EntityId, key: &str, value: &str) -> Result<bool> {
        let mut state = self.state.write();
        let kind = state
            .nodes
            .get(id)
            .map(|node| node.kind)
            .ok_or_else(|| anyhow!("node {id} does not exist"))?;
        if state.holder_of(kind, key, value, Some(id)).is_some() {
            return Ok(false);
        }
        if let Some(node) = state.nodes.get_mut(id) {
            node.attributes
                .insert(key.to_string(), serde_json::Value::from(value));
        }
        Ok(true)
    }

    fn remove(&self, id: &EntityId) -> Result<Vec<EntityId>> {
        let mut state = self.state.write();

        if let Some(edge) = state.edges.remove(id) {
            state.unindex_edge(&edge);
            return Ok(vec![edge.id]);
        }

        if state.nodes.remove(id).is_none() {
            return Err(anyhow!("entity {id} does not exist"));
        }

        let mut removed = vec![id.clone()];
        let incident: Vec<EntityId> = state
            .incoming
            .remove(id)
            .into_iter()
            .chain(state.outgoing.remove(id))
            .flatten()
            .collect();
        for edge_id in incident {
            if let Some(edge) = state.edges.remove(&edge_id) {
                state.unindex_edge(&edge);
                removed.push(edge.id);
            }
        }
        debug!(%id, cascaded = removed.len() - 1, "Removed node");
        Ok(removed)
    }

    fn stats(&self) -> GraphStats {
        let state = self.state.read();
        GraphStats {
            node_count: state.nodes.len(),
            edge_count: state.edges.len(),
        }
    }
}

/// Memory store persisted as a JSON snapshot
pub struct SnapshotGraphStore {
    inner: MemoryGraphStore,
    path: PathBuf,
    /// Serializes concurrent flushes so the rename is never interleaved
    flush_lock: parking_lot::Mutex<()>,
}

impl SnapshotGraphStore {
    /// Open the snapshot at `path`, starting empty when the file is absent
    pub fn open(path: &Path) -> Result<Self> {
        let inner = if path.exists() {
            let bytes = std::fs::read(path)
                .with_context(|| format!("failed to read graph snapshot {}", path.display()))?;
            let snapshot: GraphSnapshot = serde_json::from_slice(&bytes)
                .with_context(|| format!("corrupt graph snapshot {}", path.display()))?;
            let store = MemoryGraphStore::from_snapshot(snapshot)?;
            let stats = store.stats();
            info!(
                "Loaded graph snapshot {:?}: {} nodes, {} edges",
                path, stats.node_count, stats.edge_count
            );
            store
        } else {
            info!("No graph snapshot at {:?}, starting empty", path);
            MemoryGraphStore::new()
        };

        Ok(Self {
            inner,
            path: path.to_path_buf(),
            flush_lock: parking_lot::Mutex::new(()),
        })
    }
}

impl GraphStore for SnapshotGraphStore {
    fn insert_node(&self, kind: NodeKind, attributes: Attributes) -> Result<NodeRecord> {
        self.inner.insert_node(kind, attributes)
    }

    fn insert_edge(
        &self,
        kind: EdgeKind,
        tail: &EntityId,
        head: &EntityId,
        attributes: Attributes,
    ) -> Result<EdgeRecord> {
        self.inner.insert_edge(kind, tail, head, attributes)
    }

    fn insert_node_unique(
        &self,
        kind: NodeKind,
        key: &str,
        attributes: Attributes,
    ) -> Result<Option<NodeRecord>> {
        self.inner.insert_node_unique(kind, key, attributes)
    }

    fn insert_edge_if_absent(
        &self,
        kind: EdgeKind,
        tail: &EntityId,
        head: &EntityId,
        attributes: Attributes,
    ) -> Result<Option<EdgeRecord>> {
        self.inner.insert_edge_if_absent(kind, tail, head, attributes)
    }

    fn node(&self, id: &EntityId) -> Result<Option<NodeRecord>> {
        self.inner.node(id)
    }

    fn edge(&self, id: &EntityId) -> Result<Option<EdgeRecord>> {
        self.inner.edge(id)
    }

    fn nodes(&self) -> Result<Vec<NodeRecord>> {
        self.inner.nodes()
    }

    fn incoming(&self, id: &EntityId, kind: Option<EdgeKind>) -> Result<Vec<EdgeRecord>> {
        self.inner.incoming(id, kind)
    }

    fn outgoing(&self, id: &EntityId, kind: Option<EdgeKind>) -> Result<Vec<EdgeRecord>> {
        self.inner.outgoing(id, kind)
    }

    fn set_attribute(&self, id: &EntityId, key: &str, value: serde_json::Value) -> Result<()> {
        self.inner.set_attribute(id, key, value)
    }

    fn set_attribute_unique(&self, id: &EntityId, key: &str, value: &str) -> Result<bool> {
        self.inner.set_attribute_unique(id, key, value)
    }

    fn remove(&self, id: &EntityId) -> Result<Vec<EntityId>> {
        self.inner.remove(id)
    }

    fn stats(&self) -> GraphStats {
        self.inner.stats()
    }

    fn flush(&self) -> Result<()> {
        let _guard = self.flush_lock.lock();
        let snapshot = self.inner.snapshot();
        let bytes = serde_json::to_vec(&snapshot)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Write to a sibling file, then rename over the snapshot
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, bytes)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;

        info!(
            "Graph snapshot written to {:?} ({} nodes, {} edges)",
            self.path,
            snapshot.nodes.len(),
            snapshot.edges.len()
        );
        Ok(())
    }
}
