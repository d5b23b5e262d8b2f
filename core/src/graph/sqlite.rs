//! SQLite-backed graph store.
//!
//! `rusqlite::Connection` is not `Sync`, so all SQL runs on one dedicated
//! blocking worker thread that owns the connection; async callers talk to
//! it over a command channel with oneshot replies. The database uses WAL
//! journaling with per-endpoint indexes on the edge table.

use std::path::PathBuf;

use async_trait::async_trait;
use log::{error, info};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};

use super::{GraphEdge, GraphNode, GraphStore, StoreError, UNKNOWN_LABEL};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS nodes (
    id TEXT PRIMARY KEY,
    labels TEXT NOT NULL DEFAULT '[]',
    properties TEXT NOT NULL DEFAULT '{}'
);
CREATE TABLE IF NOT EXISTS edges (
    source TEXT NOT NULL,
    target TEXT NOT NULL,
    relation TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}',
    PRIMARY KEY (source, target, relation)
);
CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target);
";

enum Command {
    AddNode {
        id: String,
        labels: Vec<String>,
        properties: Map<String, Value>,
        resp: oneshot::Sender<Result<(), StoreError>>,
    },
    AddEdge {
        source: String,
        target: String,
        relation: String,
        properties: Map<String, Value>,
        resp: oneshot::Sender<Result<(), StoreError>>,
    },
    AllNodes {
        resp: oneshot::Sender<Result<Vec<GraphNode>, StoreError>>,
    },
    AllEdges {
        resp: oneshot::Sender<Result<Vec<GraphEdge>, StoreError>>,
    },
    Close {
        resp: oneshot::Sender<()>,
    },
}

pub struct SqliteGraphStore {
    tx: mpsc::Sender<Command>,
}

impl SqliteGraphStore {
    /// Open (or create) the database and start the worker thread.
    pub async fn open(path: PathBuf) -> Result<Self, StoreError> {
        let (tx, mut rx) = mpsc::channel::<Command>(128);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), StoreError>>();

        tokio::task::spawn_blocking(move || {
            let conn = match open_connection(&path) {
                Ok(conn) => {
                    let _ = ready_tx.send(Ok(()));
                    conn
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };
            info!("sqlite graph store open at {}", path.display());

            while let Some(command) = rx.blocking_recv() {
                match command {
                    Command::AddNode {
                        id,
                        labels,
                        properties,
                        resp,
                    } => {
                        let _ = resp.send(add_node(&conn, &id, &labels, properties));
                    }
                    Command::AddEdge {
                        source,
                        target,
                        relation,
                        properties,
                        resp,
                    } => {
                        let _ = resp.send(add_edge(&conn, &source, &target, &relation, properties));
                    }
                    Command::AllNodes { resp } => {
                        let _ = resp.send(all_nodes(&conn));
                    }
                    Command::AllEdges { resp } => {
                        let _ = resp.send(all_edges(&conn));
                    }
                    Command::Close { resp } => {
                        if let Err((_, err)) = conn.close() {
                            error!("sqlite close failed: {}", err);
                        }
                        let _ = resp.send(());
                        return;
                    }
                }
            }
        });

        ready_rx.await.map_err(|_| StoreError::WorkerGone)??;
        Ok(SqliteGraphStore { tx })
    }

    async fn send<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<R, StoreError>>) -> Command,
    ) -> Result<R, StoreError> {
        let (resp, rx) = oneshot::channel();
        self.tx
            .send(make(resp))
            .await
            .map_err(|_| StoreError::WorkerGone)?;
        rx.await.map_err(|_| StoreError::WorkerGone)?
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn add_node(
        &self,
        id: &str,
        labels: &[&str],
        properties: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let id = id.to_string();
        let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        self.send(move |resp| Command::AddNode {
            id,
            labels,
            properties,
            resp,
        })
        .await
    }

    async fn add_edge(
        &self,
        source: &str,
        target: &str,
        relation: &str,
        properties: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let source = source.to_string();
        let target = target.to_string();
        let relation = relation.to_string();
        self.send(move |resp| Command::AddEdge {
            source,
            target,
            relation,
            properties,
            resp,
        })
        .await
    }

    async fn get_all_nodes(&self) -> Result<Vec<GraphNode>, StoreError> {
        self.send(|resp| Command::AllNodes { resp }).await
    }

    async fn get_all_edges(&self) -> Result<Vec<GraphEdge>, StoreError> {
        self.send(|resp| Command::AllEdges { resp }).await
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let (resp, rx) = oneshot::channel();
        if self.tx.send(Command::Close { resp }).await.is_ok() {
            let _ = rx.await;
        }
        Ok(())
    }
}

fn open_connection(path: &PathBuf) -> Result<rusqlite::Connection, StoreError> {
    let conn = rusqlite::Connection::open(path).map_err(to_store_err)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
        .map_err(to_store_err)?;
    conn.execute_batch(SCHEMA).map_err(to_store_err)?;
    Ok(conn)
}

fn to_store_err(err: rusqlite::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn add_node(
    conn: &rusqlite::Connection,
    id: &str,
    labels: &[String],
    properties: Map<String, Value>,
) -> Result<(), StoreError> {
    let existing: Option<(String, String)> = conn
        .query_row(
            "SELECT labels, properties FROM nodes WHERE id = ?1",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map(Some)
        .or_else(|err| match err {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(to_store_err(other)),
        })?;

    match existing {
        Some((raw_labels, raw_props)) => {
            let mut merged_labels: Vec<String> =
                serde_json::from_str(&raw_labels).unwrap_or_default();
            for label in labels {
                if !merged_labels.contains(label) {
                    merged_labels.push(label.clone());
                }
            }
            let mut merged_props: Map<String, Value> =
                serde_json::from_str(&raw_props).unwrap_or_default();
            for (key, value) in properties {
                merged_props.insert(key, value);
            }
            conn.execute(
                "UPDATE nodes SET labels = ?1, properties = ?2 WHERE id = ?3",
                rusqlite::params![
                    serde_json::to_string(&merged_labels).unwrap_or_default(),
                    serde_json::to_string(&merged_props).unwrap_or_default(),
                    id
                ],
            )
            .map_err(to_store_err)?;
        }
        None => {
            conn.execute(
                "INSERT INTO nodes (id, labels, properties) VALUES (?1, ?2, ?3)",
                rusqlite::params![
                    id,
                    serde_json::to_string(labels).unwrap_or_default(),
                    serde_json::to_string(&properties).unwrap_or_default()
                ],
            )
            .map_err(to_store_err)?;
        }
    }
    Ok(())
}

fn add_edge(
    conn: &rusqlite::Connection,
    source: &str,
    target: &str,
    relation: &str,
    properties: Map<String, Value>,
) -> Result<(), StoreError> {
    for id in [source, target] {
        let exists: bool = conn
            .query_row("SELECT 1 FROM nodes WHERE id = ?1", [id], |_| Ok(true))
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(false),
                other => Err(to_store_err(other)),
            })?;
        if !exists {
            add_node(conn, id, &[UNKNOWN_LABEL.to_string()], Map::new())?;
        }
    }

    conn.execute(
        "INSERT INTO edges (source, target, relation, properties)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(source, target, relation)
         DO UPDATE SET properties = excluded.properties",
        rusqlite::params![
            source,
            target,
            relation,
            serde_json::to_string(&properties).unwrap_or_default()
        ],
    )
    .map_err(to_store_err)?;
    Ok(())
}

fn all_nodes(conn: &rusqlite::Connection) -> Result<Vec<GraphNode>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT id, labels, properties FROM nodes")
        .map_err(to_store_err)?;
    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let labels: String = row.get(1)?;
            let properties: String = row.get(2)?;
            Ok((id, labels, properties))
        })
        .map_err(to_store_err)?;

    let mut nodes = Vec::new();
    for row in rows {
        let (id, labels, properties) = row.map_err(to_store_err)?;
        nodes.push(GraphNode {
            id,
            labels: serde_json::from_str(&labels).unwrap_or_default(),
            properties: serde_json::from_str(&properties).unwrap_or_default(),
        });
    }
    Ok(nodes)
}

fn all_edges(conn: &rusqlite::Connection) -> Result<Vec<GraphEdge>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT source, target, relation, properties FROM edges")
        .map_err(to_store_err)?;
    let rows = stmt
        .query_map([], |row| {
            let source: String = row.get(0)?;
            let target: String = row.get(1)?;
            let relation: String = row.get(2)?;
            let properties: String = row.get(3)?;
            Ok((source, target, relation, properties))
        })
        .map_err(to_store_err)?;

    let mut edges = Vec::new();
    for row in rows {
        let (source, target, relation, properties) = row.map_err(to_store_err)?;
        edges.push(GraphEdge {
            source,
            target,
            relation,
            properties: serde_json::from_str(&properties).unwrap_or_default(),
        });
    }
    Ok(edges)
}
