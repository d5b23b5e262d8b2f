//! Best-effort fan-out to streaming clients.
//!
//! The connection manager owns one unbounded sender per subscribed client;
//! the WS boundary drains the matching receiver into the socket. A frame is
//! serialized once per broadcast, and clients whose channel has gone away
//! are pruned silently. No durability, no replay.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use log::debug;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::events::Alert;

/// A streamed frame: `{"type": "alert"|"auto_response", "payload": ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Frame<'a> {
    Alert(&'a Alert),
    AutoResponse(AutoResponsePayload),
}

#[derive(Debug, Clone, Serialize)]
pub struct AutoResponsePayload {
    pub action: &'static str,
    pub ip: String,
    pub reason: String,
    pub alert_id: String,
}

struct Client {
    id: u64,
    tx: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
pub struct ConnectionManager {
    clients: Mutex<Vec<Client>>,
    next_id: AtomicU64,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client; the returned receiver yields serialized frames.
    pub fn register(&self) -> (u64, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        clients.push(Client { id, tx });
        debug!("ws client {} connected ({} total)", id, clients.len());
        (id, rx)
    }

    pub fn unregister(&self, id: u64) {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        clients.retain(|c| c.id != id);
        debug!("ws client {} disconnected ({} total)", id, clients.len());
    }

    pub fn client_count(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Serialize once, send to every client, prune the dead.
    pub fn broadcast(&self, frame: &Frame<'_>) {
        let payload = match serde_json::to_string(frame) {
            Ok(payload) => payload,
            Err(err) => {
                debug!("frame serialization failed: {}", err);
                return;
            }
        };
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        clients.retain(|client| client.tx.send(payload.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::events::Severity;

    fn alert() -> Alert {
        Alert::new(
            "alert-0".to_string(),
            Severity::High,
            "test",
            "192.168.1.10",
            "api.openai.com",
            Utc::now(),
            "test",
        )
    }

    #[test]
    fn frames_reach_every_client() {
        let manager = ConnectionManager::new();
        let (_, mut rx1) = manager.register();
        let (_, mut rx2) = manager.register();

        let alert = alert();
        manager.broadcast(&Frame::Alert(&alert));

        for rx in [&mut rx1, &mut rx2] {
            let payload = rx.try_recv().unwrap();
            let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
            assert_eq!(value["type"], "alert");
            assert_eq!(value["payload"]["severity"], "HIGH");
        }
    }

    #[test]
    fn dead_clients_are_pruned() {
        let manager = ConnectionManager::new();
        let (_, rx) = manager.register();
        drop(rx);
        assert_eq!(manager.client_count(), 1);

        let alert = alert();
        manager.broadcast(&Frame::Alert(&alert));
        assert_eq!(manager.client_count(), 0);
    }

    #[test]
    fn unregister_removes_only_that_client() {
        let manager = ConnectionManager::new();
        let (id1, _rx1) = manager.register();
        let (_id2, _rx2) = manager.register();
        manager.unregister(id1);
        assert_eq!(manager.client_count(), 1);
    }

    #[test]
    fn auto_response_frame_shape() {
        let frame = Frame::AutoResponse(AutoResponsePayload {
            action: "BLOCK",
            ip: "192.168.1.10".to_string(),
            reason: "attack tool".to_string(),
            alert_id: "alert-3".to_string(),
        });
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "auto_response");
        assert_eq!(value["payload"]["action"], "BLOCK");
    }
}
