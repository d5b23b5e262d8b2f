//! Packet acquisition.
//!
//! The capture source owns one OS thread reading frames from a datalink
//! channel. It must never block on the consumer side: frames go into the
//! bounded raw-packet queue with `try_send`, and when the queue is full the
//! frame is dropped and counted. The DPI worker on the other end of the
//! queue is the only consumer.
//!
//! The thread exits on shutdown or on a fatal channel error; dropping its
//! queue sender lets the DPI worker (and the runtime above it) observe the
//! death.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use pnet::datalink::{self, Channel, NetworkInterface};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

/// One captured frame, timestamped at acquisition.
#[derive(Debug, Clone)]
pub struct RawPacket {
    pub data: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture interface {0} not found")]
    InterfaceNotFound(String),
    #[error("no suitable capture interface")]
    NoSuitableInterface,
    #[error("unsupported datalink channel type")]
    UnsupportedChannel,
    #[error("failed to open datalink channel: {0}")]
    Io(#[from] std::io::Error),
}

/// Capture counters, shared with the owning runtime.
#[derive(Debug, Default)]
pub struct CaptureStats {
    pub captured: AtomicU64,
    pub dropped: AtomicU64,
}

impl CaptureStats {
    pub fn captured(&self) -> u64 {
        self.captured.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Non-blocking enqueue with overflow accounting. Returns `false` once the
/// consumer side is gone.
pub fn offer(queue: &mpsc::Sender<RawPacket>, stats: &CaptureStats, packet: RawPacket) -> bool {
    match queue.try_send(packet) {
        Ok(()) => {
            stats.captured.fetch_add(1, Ordering::Relaxed);
            true
        }
        Err(mpsc::error::TrySendError::Full(_)) => {
            stats.dropped.fetch_add(1, Ordering::Relaxed);
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// Live capture source.
pub struct Capture {
    stats: Arc<CaptureStats>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Capture {
    /// Spawn the capture thread on the named interface (or the first up,
    /// non-loopback interface with an address when unset).
    pub fn start(
        interface: Option<&str>,
        queue: mpsc::Sender<RawPacket>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Capture, CaptureError> {
        let iface = select_interface(interface)?;
        info!("capturing on interface {}", iface.name);

        let config = datalink::Config {
            read_timeout: Some(Duration::from_millis(100)),
            ..Default::default()
        };
        let mut rx = match datalink::channel(&iface, config)? {
            Channel::Ethernet(_, rx) => rx,
            _ => return Err(CaptureError::UnsupportedChannel),
        };

        let stats = Arc::new(CaptureStats::default());
        let thread_stats = Arc::clone(&stats);
        let handle = thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || {
                loop {
                    if *shutdown.borrow() {
                        break;
                    }
                    match rx.next() {
                        Ok(frame) => {
                            let packet = RawPacket {
                                data: frame.to_vec(),
                                timestamp: Utc::now(),
                            };
                            if !offer(&queue, &thread_stats, packet) {
                                warn!("raw packet queue closed; capture thread exiting");
                                break;
                            }
                        }
                        Err(err)
                            if matches!(
                                err.kind(),
                                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                            ) =>
                        {
                            continue
                        }
                        Err(err) => {
                            // Fatal: the queue sender is dropped on exit, which
                            // the DPI worker observes as end-of-stream.
                            error!("capture source died: {}", err);
                            break;
                        }
                    }
                }
                info!(
                    "capture stopped ({} frames, {} dropped)",
                    thread_stats.captured(),
                    thread_stats.dropped()
                );
            })
            .map_err(CaptureError::Io)?;

        Ok(Capture {
            stats,
            handle: Some(handle),
        })
    }

    pub fn stats(&self) -> Arc<CaptureStats> {
        Arc::clone(&self.stats)
    }

    /// Wait for the capture thread to finish.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn select_interface(name: Option<&str>) -> Result<NetworkInterface, CaptureError> {
    let interfaces = datalink::interfaces();
    match name {
        Some(name) => interfaces
            .into_iter()
            .find(|iface| iface.name == name)
            .ok_or_else(|| CaptureError::InterfaceNotFound(name.to_string())),
        None => interfaces
            .into_iter()
            .find(|iface| iface.is_up() && !iface.is_loopback() && !iface.ips.is_empty())
            .ok_or(CaptureError::NoSuitableInterface),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet() -> RawPacket {
        RawPacket {
            data: vec![0u8; 64],
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn overflow_drops_without_blocking() {
        let (tx, mut rx) = mpsc::channel(2);
        let stats = CaptureStats::default();

        assert!(offer(&tx, &stats, packet()));
        assert!(offer(&tx, &stats, packet()));
        // Queue is at capacity: one extra offer drops exactly one frame.
        assert!(offer(&tx, &stats, packet()));
        assert_eq!(stats.captured(), 2);
        assert_eq!(stats.dropped(), 1);

        // The queue never exceeded its capacity.
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_queue_is_reported() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let stats = CaptureStats::default();
        assert!(!offer(&tx, &stats, packet()));
        assert_eq!(stats.captured(), 0);
        assert_eq!(stats.dropped(), 0);
    }
}
