//! Lateral-movement detection via betweenness centrality.
//!
//! A node that sits on many shortest paths between otherwise separate parts
//! of the network is a bridge; an ordinary workstation acting as one is a
//! strong compromise indicator. Every analysis interval the stored graph is
//! rebuilt as a petgraph `DiGraph` and scored with Brandes' algorithm
//! (normalized betweenness).
//!
//! Flagging requires centrality and degree minimums and skips expected
//! infrastructure (public resolvers, gateways, `.1` addresses). Risk is
//! graded by what the node bridges: internal and external neighbors is HIGH,
//! an internal-only bridge is MEDIUM, an external hub is INFO.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::config::GraphConfig;
use crate::detect::is_internal_str;
use crate::graph::{GraphStore, NodeType, StoreError};

/// Nodes that are expected to be central and are never flagged.
const INFRASTRUCTURE_PATTERNS: [&str; 7] = [
    "8.8.8.8",
    "8.8.4.4",
    "1.1.1.1",
    "1.0.0.1",
    "192.168.1.1",
    "192.168.0.1",
    "10.0.0.1",
];

/// Default gateways typically end in .1.
const INFRASTRUCTURE_SUFFIXES: [&str; 1] = [".1"];

/// Escalation factor over the last observed score that is worth logging.
const ESCALATION_FACTOR: f64 = 1.2;

/// A node flagged as a suspicious bridge.
#[derive(Debug, Clone)]
pub struct BridgeFinding {
    pub node_id: String,
    pub centrality_score: f64,
    pub node_type: NodeType,
    pub connections: usize,
    pub connected_to: Vec<String>,
    pub risk_assessment: String,
}

pub struct GraphAnalyzer {
    centrality_threshold: f64,
    min_connections: usize,
    interval: Duration,
    last_run: Mutex<Option<Instant>>,
    known_bridges: Mutex<HashMap<String, f64>>,
}

impl GraphAnalyzer {
    pub fn new(config: &GraphConfig) -> Self {
        GraphAnalyzer {
            centrality_threshold: config.centrality_threshold,
            min_connections: config.min_connections,
            interval: Duration::from_secs_f64(config.centrality_interval_s),
            last_run: Mutex::new(None),
            known_bridges: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the analysis interval has elapsed since the last run.
    pub fn should_analyze(&self) -> bool {
        match *self.last_run.lock().unwrap_or_else(|e| e.into_inner()) {
            Some(last) => last.elapsed() >= self.interval,
            None => true,
        }
    }

    /// Score the stored graph and return the flagged bridges.
    pub async fn detect_lateral_movement(
        &self,
        store: &dyn GraphStore,
    ) -> Result<Vec<BridgeFinding>, StoreError> {
        *self.last_run.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());

        let nodes = store.get_all_nodes().await?;
        let edges = store.get_all_edges().await?;
        if nodes.len() < 3 || edges.len() < 2 {
            return Ok(Vec::new());
        }

        let mut graph: DiGraph<String, ()> = DiGraph::new();
        let mut index: HashMap<String, NodeIndex> = HashMap::new();
        let mut types: HashMap<String, NodeType> = HashMap::new();
        for node in &nodes {
            let idx = graph.add_node(node.id.clone());
            index.insert(node.id.clone(), idx);
            types.insert(node.id.clone(), node.node_type());
        }
        for edge in &edges {
            if let (Some(&src), Some(&tgt)) = (index.get(&edge.source), index.get(&edge.target)) {
                if !graph.contains_edge(src, tgt) {
                    graph.add_edge(src, tgt, ());
                }
            }
        }

        let centrality = betweenness_centrality(&graph);
        let mut findings = Vec::new();

        for idx in graph.node_indices() {
            let score = centrality[idx.index()];
            if score < self.centrality_threshold {
                continue;
            }
            let degree = graph.neighbors_directed(idx, Direction::Incoming).count()
                + graph.neighbors_directed(idx, Direction::Outgoing).count();
            if degree < self.min_connections {
                continue;
            }

            let node_id = graph[idx].clone();
            if is_infrastructure(&node_id) {
                debug!("skipping central infrastructure node {}", node_id);
                continue;
            }

            let mut neighbors: Vec<String> = graph
                .neighbors_directed(idx, Direction::Incoming)
                .chain(graph.neighbors_directed(idx, Direction::Outgoing))
                .map(|n| graph[n].clone())
                .collect();
            neighbors.sort();
            neighbors.dedup();
            neighbors.truncate(20);

            let has_internal = neighbors.iter().any(|n| is_internal_str(n));
            let has_external = neighbors.iter().any(|n| !is_internal_str(n));

            let risk_assessment = if has_internal && has_external {
                format!(
                    "HIGH RISK: Node {} (centrality={:.2}) bridges internal and external \
                     networks with {} connections — potential lateral movement pivot point",
                    node_id, score, degree
                )
            } else if is_internal_str(&node_id) {
                format!(
                    "MEDIUM RISK: Internal node {} (centrality={:.2}) has unusually high \
                     centrality with {} connections — monitor for compromise indicators",
                    node_id, score, degree
                )
            } else {
                format!(
                    "INFO: External node {} (centrality={:.2}) acts as a hub with {} connections",
                    node_id, score, degree
                )
            };

            {
                let mut known = self
                    .known_bridges
                    .lock()
                    .unwrap_or_else(|e| e.into_inner());
                match known.get(&node_id) {
                    None => warn!(
                        "new bridge node: {} (centrality={:.2}, connections={})",
                        node_id, score, degree
                    ),
                    Some(&prev) if score > prev * ESCALATION_FACTOR => warn!(
                        "bridge escalation: {} centrality increased {:.2} -> {:.2}",
                        node_id, prev, score
                    ),
                    Some(_) => {}
                }
                known.insert(node_id.clone(), score);
            }

            let mut connected_to = neighbors;
            connected_to.truncate(10);
            findings.push(BridgeFinding {
                node_id: node_id.clone(),
                centrality_score: score,
                node_type: types.get(&node_id).copied().unwrap_or(NodeType::Unknown),
                connections: degree,
                connected_to,
                risk_assessment,
            });
        }

        if !findings.is_empty() {
            info!(
                "graph analysis complete: {} suspicious bridge nodes (nodes: {}, edges: {})",
                findings.len(),
                nodes.len(),
                edges.len()
            );
        }
        Ok(findings)
    }
}

fn is_infrastructure(node_id: &str) -> bool {
    INFRASTRUCTURE_PATTERNS.contains(&node_id)
        || INFRASTRUCTURE_SUFFIXES
            .iter()
            .any(|suffix| node_id.ends_with(suffix))
}

/// Brandes' betweenness centrality for an unweighted directed graph,
/// normalized by `(n-1)(n-2)`.
fn betweenness_centrality(graph: &DiGraph<String, ()>) -> Vec<f64> {
    let n = graph.node_count();
    let mut centrality = vec![0.0f64; n];

    for s in graph.node_indices() {
        let mut stack: Vec<NodeIndex> = Vec::new();
        let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut sigma = vec![0.0f64; n];
        let mut dist = vec![-1i64; n];
        sigma[s.index()] = 1.0;
        dist[s.index()] = 0;

        let mut queue = VecDeque::new();
        queue.push_back(s);
        while let Some(v) = queue.pop_front() {
            stack.push(v);
            for w in graph.neighbors_directed(v, Direction::Outgoing) {
                if dist[w.index()] < 0 {
                    dist[w.index()] = dist[v.index()] + 1;
                    queue.push_back(w);
                }
                if dist[w.index()] == dist[v.index()] + 1 {
                    sigma[w.index()] += sigma[v.index()];
                    preds[w.index()].push(v.index());
                }
            }
        }

        let mut delta = vec![0.0f64; n];
        while let Some(w) = stack.pop() {
            for &v in &preds[w.index()] {
                delta[v] += sigma[v] / sigma[w.index()] * (1.0 + delta[w.index()]);
            }
            if w != s {
                centrality[w.index()] += delta[w.index()];
            }
        }
    }

    if n > 2 {
        let scale = 1.0 / ((n - 1) as f64 * (n - 2) as f64);
        for c in centrality.iter_mut() {
            *c *= scale;
        }
    }
    centrality
}
