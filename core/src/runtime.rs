//! Pipeline assembly and lifecycle.
//!
//! `Runtime::new` wires store, bus, analyzer, and control plane together;
//! `run` adds the capture thread and DPI worker and drives everything until
//! shutdown. Teardown follows the dataflow: capture source first, then the
//! DPI worker, then bus subscribers, then the control plane, and the store
//! is flushed last.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::{error, info};
use tokio::sync::{mpsc, watch};

use crate::alerts::AlertBuffer;
use crate::analyzer::AnalyzerEngine;
use crate::api::{self, ApiState};
use crate::broadcast::ConnectionManager;
use crate::bus::EventBus;
use crate::capture::{Capture, CaptureStats};
use crate::config::Config;
use crate::dpi;
use crate::events::FlowEvent;
use crate::graph::memory::MemoryGraphStore;
use crate::graph::sqlite::SqliteGraphStore;
use crate::graph::GraphStore;
use crate::response::ResponseManager;

pub struct Runtime {
    config: Config,
    store: Arc<dyn GraphStore>,
    bus: Arc<EventBus<FlowEvent>>,
    response: Arc<ResponseManager>,
    broadcast: Arc<ConnectionManager>,
    alerts: Arc<AlertBuffer>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Runtime {
    /// Build the pipeline and subscribe the analyzer to the traffic topic.
    /// Capture does not start until [`run`](Self::run).
    pub async fn new(config: Config) -> Result<Runtime> {
        let store: Arc<dyn GraphStore> = match &config.store.path {
            Some(path) => Arc::new(
                SqliteGraphStore::open(path.clone())
                    .await
                    .context("failed to open graph store")?,
            ),
            None => Arc::new(MemoryGraphStore::new()),
        };

        let bus = Arc::new(EventBus::new());
        let response = Arc::new(ResponseManager::new(&config.response));
        let broadcast = Arc::new(ConnectionManager::new());
        let alerts = Arc::new(AlertBuffer::default());

        let analyzer = Arc::new(AnalyzerEngine::new(
            &config,
            Arc::clone(&store),
            Arc::clone(&response),
            Arc::clone(&broadcast),
            Arc::clone(&alerts),
        ));
        let handler = Arc::clone(&analyzer);
        bus.subscribe(&config.bus.topic, "analyzer", move |event| {
            let analyzer = Arc::clone(&handler);
            async move { analyzer.handle_event(event).await }
        })
        .await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(Runtime {
            config,
            store,
            bus,
            response,
            broadcast,
            alerts,
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub fn alerts(&self) -> Arc<AlertBuffer> {
        Arc::clone(&self.alerts)
    }

    pub fn bus(&self) -> Arc<EventBus<FlowEvent>> {
        Arc::clone(&self.bus)
    }

    /// Request an orderly shutdown from another task.
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }

    /// Start capture and serve until a shutdown signal (or a fatal capture
    /// death). Returns the capture statistics.
    pub async fn run(self) -> Result<Arc<CaptureStats>> {
        let (queue_tx, queue_rx) = mpsc::channel(self.config.capture.buffer_size);
        let capture = Capture::start(
            self.config.capture.interface.as_deref(),
            queue_tx,
            self.shutdown_rx.clone(),
        )
        .context("failed to start capture")?;
        let stats = capture.stats();

        let mut dpi_worker = tokio::spawn(dpi::run_worker(
            queue_rx,
            Arc::clone(&self.bus),
            self.config.bus.topic.clone(),
            self.shutdown_rx.clone(),
        ));

        let api_state = Arc::new(ApiState {
            graph: Arc::clone(&self.store),
            alerts: Arc::clone(&self.alerts),
            response: Arc::clone(&self.response),
            broadcast: Arc::clone(&self.broadcast),
            api_key: self.config.api.key.clone(),
        });
        let listen = self.config.api.listen.clone();
        let api_shutdown = self.shutdown_rx.clone();
        let api_server = tokio::spawn(api::serve(listen, api_state, api_shutdown));

        let mut dpi_done = false;
        let fatal = tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for shutdown signal")?;
                info!("shutdown signal received");
                false
            }
            _ = &mut dpi_worker => {
                // The worker only exits on its own when the capture thread
                // died and closed the queue.
                error!("capture pipeline terminated unexpectedly");
                dpi_done = true;
                true
            }
        };

        // Teardown in dataflow order.
        let _ = self.shutdown_tx.send(true);
        tokio::task::spawn_blocking(move || capture.join())
            .await
            .ok();
        if !dpi_done {
            let _ = dpi_worker.await;
        }
        self.bus.close().await;
        let _ = api_server.await;
        self.store
            .flush()
            .await
            .context("failed to flush graph store")?;

        info!(
            "pipeline stopped ({} frames captured, {} dropped)",
            stats.captured(),
            stats.dropped()
        );
        if fatal {
            bail!("capture source died");
        }
        Ok(stats)
    }
}
