//! Topic-addressed in-process pub/sub.
//!
//! Delivery is at-most-once: each subscriber gets its own bounded queue, and
//! a slow subscriber drops events instead of blocking the publisher or its
//! peers. Handler failures are logged and leave the subscription intact.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

const DEFAULT_QUEUE_DEPTH: usize = 256;

struct Subscriber<T> {
    name: String,
    tx: mpsc::Sender<T>,
}

pub struct EventBus<T> {
    topics: RwLock<HashMap<String, Vec<Subscriber<T>>>>,
    queue_depth: usize,
    dropped: AtomicU64,
}

impl<T: Clone + Send + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> EventBus<T> {
    pub fn new() -> Self {
        Self::with_queue_depth(DEFAULT_QUEUE_DEPTH)
    }

    pub fn with_queue_depth(queue_depth: usize) -> Self {
        EventBus {
            topics: RwLock::new(HashMap::new()),
            queue_depth,
            dropped: AtomicU64::new(0),
        }
    }

    /// Register an async handler on a topic. The handler runs on its own
    /// task; a returned error is logged and the subscription survives.
    pub async fn subscribe<F, Fut>(
        &self,
        topic: &str,
        name: impl Into<String>,
        mut handler: F,
    ) -> JoinHandle<()>
    where
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send,
    {
        let name = name.into();
        let (tx, mut rx) = mpsc::channel(self.queue_depth);
        self.topics
            .write()
            .await
            .entry(topic.to_string())
            .or_default()
            .push(Subscriber {
                name: name.clone(),
                tx,
            });

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(err) = handler(event).await {
                    warn!("subscriber {} failed: {:#}", name, err);
                }
            }
        })
    }

    /// Deliver to all current subscribers of a topic, in registration order
    /// per event. Returns how many subscribers accepted the event.
    pub async fn publish(&self, topic: &str, event: T) -> usize {
        let mut delivered = 0;
        let mut topics = self.topics.write().await;
        if let Some(subs) = topics.get_mut(topic) {
            // A closed queue means the handler task is gone for good.
            subs.retain(|sub| !sub.tx.is_closed());
            for sub in subs.iter() {
                match sub.tx.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        debug!("slow subscriber {}: event dropped", sub.name);
                    }
                    Err(TrySendError::Closed(_)) => {}
                }
            }
        }
        delivered
    }

    /// Drop all subscriptions; handler tasks drain and exit.
    pub async fn close(&self) {
        self.topics.write().await.clear();
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
