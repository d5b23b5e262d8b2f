//! Upsert-only graph model of observed network relationships.
//!
//! Nodes are IPs or hostnames; edges are directed `TALKS_TO` relations
//! keyed by `(source, target, relation)`. Two store implementations share
//! one async contract: an in-memory multigraph and a SQLite-backed store.

pub mod analytics;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// The only relation used by the core pipeline.
pub const TALKS_TO: &str = "TALKS_TO";

/// Label attached to endpoints auto-created by an edge upsert.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Node classification, set by the analyzer from flow context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Internal,
    External,
    Shadow,
    Unknown,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Internal => "internal",
            NodeType::External => "external",
            NodeType::Shadow => "shadow",
            NodeType::Unknown => "unknown",
        }
    }
}

/// One stored node. Identity is the textual id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub labels: Vec<String>,
    pub properties: Map<String, Value>,
}

impl GraphNode {
    /// The `type` property, defaulting to unknown.
    pub fn node_type(&self) -> NodeType {
        match self.properties.get("type").and_then(Value::as_str) {
            Some("internal") => NodeType::Internal,
            Some("external") => NodeType::External,
            Some("shadow") => NodeType::Shadow,
            _ => NodeType::Unknown,
        }
    }
}

/// One stored edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub relation: String,
    pub properties: Map<String, Value>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("store worker is gone")]
    WorkerGone,
}

/// Async contract shared by all store implementations.
///
/// Upsert semantics: node labels merge by set union and node properties by
/// per-key overwrite; edge properties are replaced wholesale by the latest
/// write. Endpoints missing at edge-insert time are auto-created with the
/// `Unknown` label. Nodes are never deleted by the pipeline.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn add_node(
        &self,
        id: &str,
        labels: &[&str],
        properties: Map<String, Value>,
    ) -> Result<(), StoreError>;

    async fn add_edge(
        &self,
        source: &str,
        target: &str,
        relation: &str,
        properties: Map<String, Value>,
    ) -> Result<(), StoreError>;

    async fn get_all_nodes(&self) -> Result<Vec<GraphNode>, StoreError>;

    async fn get_all_edges(&self) -> Result<Vec<GraphEdge>, StoreError>;

    /// Flush and release backing resources. Called last during shutdown.
    async fn flush(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
pub mod contract_tests {
    //! Store-agnostic contract checks, run against every implementation.

    use serde_json::json;

    use super::*;

    fn props(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    pub async fn node_upsert_merges(store: &dyn GraphStore) {
        store
            .add_node("n1", &["Node"], props(&[("type", json!("internal")), ("a", json!(1))]))
            .await
            .unwrap();
        store
            .add_node("n1", &["Host"], props(&[("a", json!(2)), ("b", json!("x"))]))
            .await
            .unwrap();

        let nodes = store.get_all_nodes().await.unwrap();
        assert_eq!(nodes.len(), 1);
        let node = &nodes[0];
        let mut labels = node.labels.clone();
        labels.sort();
        assert_eq!(labels, vec!["Host", "Node"]);
        assert_eq!(node.properties.get("a"), Some(&json!(2)));
        assert_eq!(node.properties.get("b"), Some(&json!("x")));
        assert_eq!(node.properties.get("type"), Some(&json!("internal")));
    }

    pub async fn edge_upsert_is_idempotent(store: &dyn GraphStore) {
        store
            .add_edge("a", "b", TALKS_TO, props(&[("byte_count", json!(10))]))
            .await
            .unwrap();
        store
            .add_edge("a", "b", TALKS_TO, props(&[("byte_count", json!(42))]))
            .await
            .unwrap();

        let edges = store.get_all_edges().await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].properties.get("byte_count"), Some(&json!(42)));
    }

    pub async fn edge_auto_creates_endpoints(store: &dyn GraphStore) {
        store
            .add_edge("src", "dst", TALKS_TO, Map::new())
            .await
            .unwrap();
        let nodes = store.get_all_nodes().await.unwrap();
        let mut ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["dst", "src"]);
        for node in &nodes {
            assert!(node.labels.iter().any(|l| l == UNKNOWN_LABEL));
        }
    }

    pub async fn distinct_relations_are_distinct_edges(store: &dyn GraphStore) {
        store
            .add_edge("a", "b", TALKS_TO, Map::new())
            .await
            .unwrap();
        store
            .add_edge("a", "b", "RESOLVES", Map::new())
            .await
            .unwrap();
        assert_eq!(store.get_all_edges().await.unwrap().len(), 2);
    }
}
