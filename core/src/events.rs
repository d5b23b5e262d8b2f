//! Telemetry and alert types shared across the pipeline.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata keys recognized by the detectors. Unknown keys are carried
/// through untouched.
pub mod meta {
    pub const HOST: &str = "host";
    pub const SNI: &str = "sni";
    pub const DNS_QUERY: &str = "dns_query";
    pub const JA3_HASH: &str = "ja3_hash";
    pub const USER_AGENT: &str = "user_agent";
}

/// Flow protocol. HTTP/HTTPS/DNS are DPI upgrades over the base TCP/UDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
    Http,
    Https,
    Dns,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Http => "HTTP",
            Protocol::Https => "HTTPS",
            Protocol::Dns => "DNS",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert severity, ordered LOW < MEDIUM < HIGH < CRITICAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }

    /// One step up the scale, saturating at CRITICAL.
    pub fn escalate(&self) -> Severity {
        match self {
            Severity::Low => Severity::Medium,
            Severity::Medium => Severity::High,
            Severity::High => Severity::Critical,
            Severity::Critical => Severity::Critical,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed flow sample, produced by the DPI worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowEvent {
    pub source_ip: IpAddr,
    pub destination_ip: IpAddr,
    pub source_port: u16,
    pub destination_port: u16,
    pub protocol: Protocol,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl FlowEvent {
    /// The DPI-derived identity of the destination, in preference order
    /// `host` > `sni` > `dns_query`.
    pub fn hostname(&self) -> Option<&str> {
        self.metadata
            .get(meta::HOST)
            .or_else(|| self.metadata.get(meta::SNI))
            .or_else(|| self.metadata.get(meta::DNS_QUERY))
            .map(String::as_str)
    }

    pub fn source(&self) -> String {
        self.source_ip.to_string()
    }

    pub fn destination(&self) -> String {
        self.destination_ip.to_string()
    }
}

/// Hands out process-unique, monotonic alert ids.
#[derive(Debug, Default)]
pub struct AlertIdGen {
    next: AtomicU64,
}

impl AlertIdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self, prefix: &str) -> String {
        let seq = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", prefix, seq)
    }
}

/// CIDR threat-intel enrichment attached to an alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CidrMatchInfo {
    pub provider: String,
    pub service: String,
    pub risk_level: String,
    pub category: String,
    pub data_risk: String,
    pub compliance_tags: Vec<String>,
    pub cidr: String,
}

/// Identity-spoofing sub-block of the JA3 enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpoofingInfo {
    pub spoofing_detected: bool,
    pub ja3_client: String,
    pub ja3_category: String,
    pub claimed_ua: String,
    pub risk_level: String,
    pub description: String,
}

/// JA3 fingerprint enrichment attached to an alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ja3Intel {
    pub ja3_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spoofing: Option<SpoofingInfo>,
}

/// Behavioral flags raised by the session tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionFlag {
    HighAiRatio,
    BurstAiUsage,
    MultiAiServices,
    LargeAiPayload,
    HighActivity,
    RapidAiRequests,
    HighExfilVelocity,
    AfterHoursAi,
}

/// Centrality enrichment for synthetic lateral-movement alerts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CentralityInfo {
    pub centrality_score: f64,
    pub connections: usize,
    pub node_type: String,
    pub connected_to: Vec<String>,
}

/// Outcome of an auto-response block, embedded in the alert and echoed
/// on the `auto_response` broadcast frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockOutcome {
    pub blocked: bool,
    pub ip: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub total_blocked: usize,
}

/// The enriched output artifact of the pipeline. Immutable once published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub severity: Severity,
    pub description: String,
    pub source: String,
    pub target: String,
    pub timestamp: DateTime<Utc>,
    pub matched_rule: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_sent: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_received: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cidr_match: Option<CidrMatchInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ja3_intel: Option<Ja3Intel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ml_classification: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ml_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ml_risk_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_flags: Option<Vec<SessionFlag>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_risk: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exfil_velocity_kbps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_probe: Option<crate::probe::ProbeReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_centrality: Option<CentralityInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_response: Option<BlockOutcome>,
}

impl Alert {
    /// A bare alert with only the required fields; enrichment blocks are
    /// filled in by the analyzer before publication.
    pub fn new(
        id: String,
        severity: Severity,
        description: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        timestamp: DateTime<Utc>,
        matched_rule: impl Into<String>,
    ) -> Self {
        Alert {
            id,
            severity,
            description: description.into(),
            source: source.into(),
            target: target.into(),
            timestamp,
            matched_rule: matched_rule.into(),
            protocol: None,
            source_port: None,
            destination_port: None,
            bytes_sent: None,
            bytes_received: None,
            destination_ip: None,
            cidr_match: None,
            ja3_intel: None,
            ml_classification: None,
            ml_confidence: None,
            ml_risk_score: None,
            session_flags: None,
            session_risk: None,
            exfil_velocity_kbps: None,
            active_probe: None,
            graph_centrality: None,
            auto_response: None,
        }
    }
}
