//! Auto-mitigation: TTL quarantine of source IPs behind CRITICAL alerts.
//!
//! The reference deployment only tracks blocks in memory; the contract is
//! shaped so a firewall integration can be slotted in behind `block_ip`.
//! Infrastructure (resolvers, gateways, loopback, multicast) is never
//! blocked, the blocklist has a hard capacity (new blocks are rejected when
//! full, nothing is evicted), and every action lands in a bounded audit log.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::ResponseConfig;
use crate::events::BlockOutcome;

/// Addresses that must never be blocked, regardless of severity.
const BLOCK_WHITELIST: [&str; 10] = [
    // DNS resolvers
    "8.8.8.8",
    "8.8.4.4",
    "1.1.1.1",
    "1.0.0.1",
    // Common gateways
    "192.168.1.1",
    "192.168.0.1",
    "10.0.0.1",
    // Broadcast / multicast
    "255.255.255.255",
    "224.0.0.1",
    "224.0.0.251",
];

const NEVER_BLOCK_PREFIXES: [&str; 3] = ["127.", "224.", "239."];

/// Bounded audit trail length.
const AUDIT_LOG_CAP: usize = 1000;

/// One quarantine record. An IP is blocked iff a non-expired entry exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockEntry {
    pub ip: String,
    pub reason: String,
    pub severity: String,
    pub blocked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_alert_id: Option<String>,
    pub auto_blocked: bool,
    /// `None` means permanent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Blocked,
    Unblocked,
    BlockRejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub ip: String,
    pub reason: String,
    pub auto: bool,
    pub timestamp: DateTime<Utc>,
}

/// Summary exposed on the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseStats {
    pub enabled: bool,
    pub currently_blocked: usize,
    pub max_capacity: usize,
    pub total_blocks: u64,
    pub total_unblocks: u64,
    pub audit_log_size: usize,
}

#[derive(Default)]
struct ResponseState {
    blocked: HashMap<String, BlockEntry>,
    audit: VecDeque<AuditEntry>,
    total_blocks: u64,
    total_unblocks: u64,
}

pub struct ResponseManager {
    enabled: bool,
    max_blocked: usize,
    ttl: Duration,
    state: Mutex<ResponseState>,
}

impl ResponseManager {
    pub fn new(config: &ResponseConfig) -> Self {
        if config.enabled {
            info!(
                "auto-response armed (max={}, ttl={}s)",
                config.max_blocked, config.ttl_s
            );
        }
        ResponseManager {
            enabled: config.enabled,
            max_blocked: config.max_blocked,
            ttl: Duration::milliseconds((config.ttl_s * 1000.0) as i64),
            state: Mutex::new(ResponseState::default()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Quarantine an IP. Auto blocks carry the configured TTL; manual
    /// blocks are permanent until unblocked.
    pub fn block_ip(
        &self,
        ip: &str,
        reason: &str,
        severity: &str,
        alert_id: Option<&str>,
        auto: bool,
    ) -> BlockOutcome {
        if !self.enabled {
            return rejected(ip, "Auto-Response is disabled", 0);
        }

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        sweep_expired(&mut state);

        if is_whitelisted(ip) {
            info!("block rejected: {} is whitelisted", ip);
            audit(
                &mut state,
                AuditAction::BlockRejected,
                ip,
                &format!("Whitelisted — {}", reason),
                auto,
            );
            return rejected(ip, &format!("{} is whitelisted", ip), state.blocked.len());
        }
        if state.blocked.contains_key(ip) {
            return rejected(ip, &format!("{} is already blocked", ip), state.blocked.len());
        }
        if state.blocked.len() >= self.max_blocked {
            warn!("block list full ({}) — cannot block {}", self.max_blocked, ip);
            audit(
                &mut state,
                AuditAction::BlockRejected,
                ip,
                &format!("Capacity reached — {}", reason),
                auto,
            );
            return rejected(ip, "Block list capacity reached", state.blocked.len());
        }

        let now = Utc::now();
        let expires_at = auto.then(|| now + self.ttl);
        state.blocked.insert(
            ip.to_string(),
            BlockEntry {
                ip: ip.to_string(),
                reason: reason.to_string(),
                severity: severity.to_string(),
                blocked_at: now,
                source_alert_id: alert_id.map(|id| id.to_string()),
                auto_blocked: auto,
                expires_at,
            },
        );
        state.total_blocks += 1;
        audit(&mut state, AuditAction::Blocked, ip, reason, auto);
        warn!(
            "ip blocked: {} — {} (severity={}, auto={})",
            ip, reason, severity, auto
        );

        BlockOutcome {
            blocked: true,
            ip: ip.to_string(),
            reason: reason.to_string(),
            expires_at,
            total_blocked: state.blocked.len(),
        }
    }

    /// Lift a quarantine.
    pub fn unblock_ip(&self, ip: &str, reason: &str) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        sweep_expired(&mut state);
        if state.blocked.remove(ip).is_none() {
            return false;
        }
        state.total_unblocks += 1;
        audit(&mut state, AuditAction::Unblocked, ip, reason, false);
        info!("ip unblocked: {} — {}", ip, reason);
        true
    }

    pub fn is_blocked(&self, ip: &str) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        sweep_expired(&mut state);
        state.blocked.contains_key(ip)
    }

    pub fn blocked_ips(&self) -> Vec<BlockEntry> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        sweep_expired(&mut state);
        state.blocked.values().cloned().collect()
    }

    pub fn stats(&self) -> ResponseStats {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        sweep_expired(&mut state);
        ResponseStats {
            enabled: self.enabled,
            currently_blocked: state.blocked.len(),
            max_capacity: self.max_blocked,
            total_blocks: state.total_blocks,
            total_unblocks: state.total_unblocks,
            audit_log_size: state.audit.len(),
        }
    }

    pub fn recent_audit_log(&self, limit: usize) -> Vec<AuditEntry> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .audit
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }
}

fn is_whitelisted(ip: &str) -> bool {
    BLOCK_WHITELIST.contains(&ip) || NEVER_BLOCK_PREFIXES.iter().any(|p| ip.starts_with(p))
}

fn sweep_expired(state: &mut ResponseState) {
    let now = Utc::now();
    let expired: Vec<String> = state
        .blocked
        .iter()
        .filter(|(_, entry)| matches!(entry.expires_at, Some(exp) if exp < now))
        .map(|(ip, _)| ip.clone())
        .collect();
    for ip in expired {
        state.blocked.remove(&ip);
        state.total_unblocks += 1;
        audit(
            state,
            AuditAction::Unblocked,
            &ip,
            "Auto-expired (TTL reached)",
            true,
        );
        info!("ip unblocked: {} — TTL reached", ip);
    }
}

fn audit(state: &mut ResponseState, action: AuditAction, ip: &str, reason: &str, auto: bool) {
    state.audit.push_back(AuditEntry {
        action,
        ip: ip.to_string(),
        reason: reason.to_string(),
        auto,
        timestamp: Utc::now(),
    });
    while state.audit.len() > AUDIT_LOG_CAP {
        state.audit.pop_front();
    }
}

fn rejected(ip: &str, reason: &str, total_blocked: usize) -> BlockOutcome {
    BlockOutcome {
        blocked: false,
        ip: ip.to_string(),
        reason: reason.to_string(),
        expires_at: None,
        total_blocked,
    }
}
