//! In-memory graph store.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::{GraphEdge, GraphNode, GraphStore, StoreError, UNKNOWN_LABEL};

type EdgeKey = (String, String, String);

/// Concurrency-safe multigraph held entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    nodes: RwLock<HashMap<String, GraphNode>>,
    edges: RwLock<HashMap<EdgeKey, GraphEdge>>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn upsert_node(&self, id: &str, labels: &[&str], properties: Map<String, Value>) {
        let mut nodes = self.nodes.write().await;
        match nodes.get_mut(id) {
            Some(node) => {
                for label in labels {
                    if !node.labels.iter().any(|l| l == label) {
                        node.labels.push(label.to_string());
                    }
                }
                for (key, value) in properties {
                    node.properties.insert(key, value);
                }
            }
            None => {
                nodes.insert(
                    id.to_string(),
                    GraphNode {
                        id: id.to_string(),
                        labels: labels.iter().map(|l| l.to_string()).collect(),
                        properties,
                    },
                );
            }
        }
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn add_node(
        &self,
        id: &str,
        labels: &[&str],
        properties: Map<String, Value>,
    ) -> Result<(), StoreError> {
        self.upsert_node(id, labels, properties).await;
        Ok(())
    }

    async fn add_edge(
        &self,
        source: &str,
        target: &str,
        relation: &str,
        properties: Map<String, Value>,
    ) -> Result<(), StoreError> {
        {
            let nodes = self.nodes.read().await;
            let missing: Vec<&str> = [source, target]
                .into_iter()
                .filter(|id| !nodes.contains_key(*id))
                .collect();
            drop(nodes);
            for id in missing {
                self.upsert_node(id, &[UNKNOWN_LABEL], Map::new()).await;
            }
        }

        let key = (
            source.to_string(),
            target.to_string(),
            relation.to_string(),
        );
        self.edges.write().await.insert(
            key,
            GraphEdge {
                source: source.to_string(),
                target: target.to_string(),
                relation: relation.to_string(),
                properties,
            },
        );
        Ok(())
    }

    async fn get_all_nodes(&self) -> Result<Vec<GraphNode>, StoreError> {
        Ok(self.nodes.read().await.values().cloned().collect())
    }

    async fn get_all_edges(&self) -> Result<Vec<GraphEdge>, StoreError> {
        Ok(self.edges.read().await.values().cloned().collect())
    }

    async fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
