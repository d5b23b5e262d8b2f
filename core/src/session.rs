//! Per-source behavioral session tracking.
//!
//! Each source IP owns a sliding window of recent flows (default 30 min),
//! trimmed on every insert. Analysis looks for sustained Shadow AI abuse
//! patterns that single-flow detection cannot see: bursts, fan-out across
//! services, payload accumulation, velocity, and odd-hours activity.
//!
//! The map is sharded by source so concurrent flows from different sources
//! never contend on one lock.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Timelike, Utc};

use crate::events::SessionFlag;
use crate::graph::NodeType;

const SHARD_COUNT: usize = 16;

/// Cumulative shadow bytes beyond which a session is flagged.
const LARGE_PAYLOAD_BYTES: u64 = 100_000;

/// Mean shadow inter-arrival below this is a burst of requests.
const RAPID_INTERVAL_MS: f64 = 5000.0;

/// Shadow upload velocity beyond this is flagged, in KB/s.
const EXFIL_VELOCITY_LIMIT_KBPS: f64 = 50.0;

#[derive(Debug, Clone)]
struct SessionEntry {
    timestamp: DateTime<Utc>,
    destination: String,
    destination_type: NodeType,
    bytes: u64,
}

/// Result of a session analysis. `risk_score` is capped at 1.0.
#[derive(Debug, Clone, Default)]
pub struct SessionAnalysis {
    pub risk_score: f64,
    pub flags: Vec<SessionFlag>,
    pub ai_ratio: f64,
    pub unique_dsts: usize,
    pub total_flows: usize,
    pub ai_bytes: u64,
    pub inter_arrival_ms: Option<f64>,
    pub exfil_velocity_kbps: f64,
}

pub struct SessionTracker {
    window: Duration,
    shards: Vec<Mutex<HashMap<String, Vec<SessionEntry>>>>,
}

impl SessionTracker {
    pub fn new(window_minutes: i64) -> Self {
        SessionTracker {
            window: Duration::minutes(window_minutes),
            shards: (0..SHARD_COUNT)
                .map(|_| Mutex::new(HashMap::new()))
                .collect(),
        }
    }

    fn shard(&self, source: &str) -> &Mutex<HashMap<String, Vec<SessionEntry>>> {
        let mut hasher = DefaultHasher::new();
        source.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARD_COUNT]
    }

    /// Append one flow and trim entries that fell out of the window.
    pub fn record(
        &self,
        source: &str,
        destination: &str,
        destination_type: NodeType,
        bytes: u64,
        timestamp: DateTime<Utc>,
    ) {
        let mut shard = self.shard(source).lock().unwrap_or_else(|e| e.into_inner());
        let session = shard.entry(source.to_string()).or_default();
        session.push(SessionEntry {
            timestamp,
            destination: destination.to_string(),
            destination_type,
            bytes,
        });
        let cutoff = timestamp - self.window;
        session.retain(|entry| entry.timestamp > cutoff);
    }

    /// Analyze the current window of one source.
    pub fn analyze(&self, source: &str) -> SessionAnalysis {
        let shard = self.shard(source).lock().unwrap_or_else(|e| e.into_inner());
        let session = match shard.get(source) {
            Some(session) if !session.is_empty() => session,
            _ => return SessionAnalysis::default(),
        };

        let total = session.len();
        let shadow: Vec<&SessionEntry> = session
            .iter()
            .filter(|e| e.destination_type == NodeType::Shadow)
            .collect();
        let ai_ratio = shadow.len() as f64 / total as f64;

        let mut unique_dsts: Vec<&str> = session.iter().map(|e| e.destination.as_str()).collect();
        unique_dsts.sort_unstable();
        unique_dsts.dedup();
        let unique_dsts = unique_dsts.len();

        let mut unique_shadow: Vec<&str> = shadow.iter().map(|e| e.destination.as_str()).collect();
        unique_shadow.sort_unstable();
        unique_shadow.dedup();

        let ai_bytes: u64 = shadow.iter().map(|e| e.bytes).sum();

        // Mean gap between consecutive shadow flows, in ms.
        let inter_arrival_ms = if shadow.len() >= 2 {
            let total_ms: i64 = shadow
                .windows(2)
                .map(|pair| (pair[1].timestamp - pair[0].timestamp).num_milliseconds())
                .sum();
            Some(total_ms as f64 / (shadow.len() - 1) as f64)
        } else {
            None
        };

        let exfil_velocity_kbps = if shadow.is_empty() {
            0.0
        } else {
            let span_s = (shadow[shadow.len() - 1].timestamp - shadow[0].timestamp)
                .num_milliseconds() as f64
                / 1000.0;
            ai_bytes as f64 / span_s.max(1.0) / 1024.0
        };

        let after_hours = shadow.iter().any(|e| {
            let hour = e.timestamp.hour();
            hour < 8 || hour >= 19
        });

        let mut flags = Vec::new();
        let mut risk_score: f64 = 0.0;

        if ai_ratio > 0.30 {
            flags.push(SessionFlag::HighAiRatio);
            risk_score += 0.30;
        }
        if shadow.len() >= 3 {
            flags.push(SessionFlag::BurstAiUsage);
            risk_score += 0.25;
        }
        if unique_shadow.len() >= 2 {
            flags.push(SessionFlag::MultiAiServices);
            risk_score += 0.20;
        }
        if ai_bytes > LARGE_PAYLOAD_BYTES {
            flags.push(SessionFlag::LargeAiPayload);
            risk_score += 0.25;
        }
        if total > 50 {
            flags.push(SessionFlag::HighActivity);
            risk_score += 0.10;
        }
        if matches!(inter_arrival_ms, Some(mean) if mean < RAPID_INTERVAL_MS) {
            flags.push(SessionFlag::RapidAiRequests);
            risk_score += 0.15;
        }
        if exfil_velocity_kbps > EXFIL_VELOCITY_LIMIT_KBPS {
            flags.push(SessionFlag::HighExfilVelocity);
            risk_score += 0.20;
        }
        if after_hours {
            flags.push(SessionFlag::AfterHoursAi);
            risk_score += 0.15;
        }

        SessionAnalysis {
            risk_score: risk_score.min(1.0),
            flags,
            ai_ratio,
            unique_dsts,
            total_flows: total,
            ai_bytes,
            inter_arrival_ms,
            exfil_velocity_kbps,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 5, hour, min, sec).unwrap()
    }

    #[test]
    fn empty_session_is_quiet() {
        let tracker = SessionTracker::new(30);
        let analysis = tracker.analyze("192.168.1.13");
        assert_eq!(analysis.total_flows, 0);
        assert!(analysis.flags.is_empty());
        assert_eq!(analysis.risk_score, 0.0);
    }

    #[test]
    fn window_trims_on_insert() {
        let tracker = SessionTracker::new(30);
        tracker.record("src", "old.example", NodeType::External, 10, at(10, 0, 0));
        tracker.record("src", "new.example", NodeType::External, 10, at(10, 45, 0));
        let analysis = tracker.analyze("src");
        assert_eq!(analysis.total_flows, 1);
        assert_eq!(analysis.unique_dsts, 1);
    }

    #[test]
    fn burst_of_ai_flows_raises_expected_flags() {
        let tracker = SessionTracker::new(30);
        // Four shadow flows in 10 seconds, 120 KB total, two services.
        for (i, (dst, bytes)) in [
            ("api.openai.com", 40_000u64),
            ("api.openai.com", 30_000),
            ("claude.ai", 30_000),
            ("claude.ai", 20_000),
        ]
        .iter()
        .enumerate()
        {
            tracker.record("192.168.1.13", dst, NodeType::Shadow, *bytes, at(14, 0, 3 * i as u32));
        }

        let analysis = tracker.analyze("192.168.1.13");
        assert!(analysis.flags.contains(&SessionFlag::HighAiRatio));
        assert!(analysis.flags.contains(&SessionFlag::BurstAiUsage));
        assert!(analysis.flags.contains(&SessionFlag::MultiAiServices));
        assert!(analysis.flags.contains(&SessionFlag::LargeAiPayload));
        assert!(analysis.flags.contains(&SessionFlag::RapidAiRequests));
        // 120 KB over 9 s is ~13 KB/s, below the velocity limit.
        assert!(!analysis.flags.contains(&SessionFlag::HighExfilVelocity));
        assert!(analysis.exfil_velocity_kbps > 10.0);
        assert!(analysis.risk_score > 0.7);
        assert!(analysis.risk_score <= 1.0);
    }

    #[test]
    fn after_hours_flag() {
        let tracker = SessionTracker::new(30);
        tracker.record("src", "api.openai.com", NodeType::Shadow, 100, at(22, 0, 0));
        let analysis = tracker.analyze("src");
        assert!(analysis.flags.contains(&SessionFlag::AfterHoursAi));
    }

    #[test]
    fn business_hours_shadow_flow_is_not_after_hours() {
        let tracker = SessionTracker::new(30);
        tracker.record("src", "api.openai.com", NodeType::Shadow, 100, at(14, 0, 0));
        let analysis = tracker.analyze("src");
        assert!(!analysis.flags.contains(&SessionFlag::AfterHoursAi));
    }

    #[test]
    fn high_activity_flag() {
        let tracker = SessionTracker::new(30);
        for i in 0..51 {
            tracker.record(
                "src",
                "internal.example",
                NodeType::External,
                10,
                at(14, 0, i % 60),
            );
        }
        let analysis = tracker.analyze("src");
        assert!(analysis.flags.contains(&SessionFlag::HighActivity));
        assert_eq!(analysis.total_flows, 51);
    }

    #[test]
    fn non_shadow_flows_raise_no_ai_flags() {
        let tracker = SessionTracker::new(30);
        for i in 0..5 {
            tracker.record("src", "example.com", NodeType::External, 50_000, at(14, 0, i));
        }
        let analysis = tracker.analyze("src");
        assert!(analysis.flags.is_empty());
        assert_eq!(analysis.ai_bytes, 0);
        assert_eq!(analysis.exfil_velocity_kbps, 0.0);
    }

    #[test]
    fn risk_score_is_capped() {
        let tracker = SessionTracker::new(30);
        // Saturate every AI flag plus activity.
        for i in 0..60 {
            let dst = if i % 2 == 0 { "api.openai.com" } else { "claude.ai" };
            tracker.record("src", dst, NodeType::Shadow, 50_000, at(22, i / 60, i % 60));
        }
        let analysis = tracker.analyze("src");
        assert_eq!(analysis.risk_score, 1.0);
    }
}
