//! Bounded in-memory alert buffer shared by the analyzer and the control
//! plane. FIFO eviction at capacity.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::events::Alert;

pub const DEFAULT_ALERT_CAP: usize = 100;

pub struct AlertBuffer {
    inner: Mutex<VecDeque<Alert>>,
    cap: usize,
}

impl Default for AlertBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_CAP)
    }
}

impl AlertBuffer {
    pub fn new(cap: usize) -> Self {
        AlertBuffer {
            inner: Mutex::new(VecDeque::with_capacity(cap)),
            cap,
        }
    }

    pub fn push(&self, alert: Alert) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.len() == self.cap {
            inner.pop_front();
        }
        inner.push_back(alert);
    }

    pub fn snapshot(&self) -> Vec<Alert> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
