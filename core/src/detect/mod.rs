//! Rule-based detection pipeline.
//!
//! A plugin is a pure predicate over one flow event. The pipeline runs a
//! whitelist short-circuit first, then every enabled plugin, and aggregates
//! to the single highest-severity verdict (ties resolve to the earliest
//! registered plugin).

pub mod cidr_intel;
pub mod heuristics;
pub mod ja3_fingerprint;

use std::net::IpAddr;

use crate::config::DetectorConfig;
use crate::events::{FlowEvent, Severity};

/// A positive plugin verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub severity: Severity,
    pub reason: String,
}

/// A detection plugin. Implementations must be side-effect free.
pub trait DetectionPlugin: Send + Sync {
    fn name(&self) -> &'static str;
    fn detect(&self, event: &FlowEvent) -> Option<Detection>;
}

/// Address prefixes treated as the internal LAN.
pub const INTERNAL_PREFIXES: [&str; 4] = ["192.168.", "10.0.", "172.16.", "127.0."];

pub fn is_internal(ip: &IpAddr) -> bool {
    is_internal_str(&ip.to_string())
}

pub fn is_internal_str(ip: &str) -> bool {
    INTERNAL_PREFIXES.iter().any(|p| ip.starts_with(p))
}

/// Multicast and broadcast destinations that never warrant an alert.
const WHITELIST_IPS: [&str; 6] = [
    "224.0.0.251",     // mDNS
    "224.0.0.252",     // LLMNR
    "239.255.255.250", // UPnP/SSDP
    "255.255.255.255", // broadcast
    "224.0.0.1",       // all hosts multicast
    "224.0.0.2",       // all routers multicast
];

const WHITELIST_PREFIXES: [&str; 4] = ["224.", "239.", "fe80:", "ff02:"];

/// mDNS, SSDP, and Google Play services push.
const WHITELIST_PORTS: [u16; 5] = [5353, 1900, 5228, 5229, 5230];

/// Known-safe traffic suppressed before any plugin runs.
pub fn is_whitelisted(event: &FlowEvent) -> bool {
    let dst = event.destination();
    if WHITELIST_IPS.contains(&dst.as_str()) {
        return true;
    }
    if WHITELIST_PREFIXES.iter().any(|p| dst.starts_with(p)) {
        return true;
    }
    if WHITELIST_PORTS.contains(&event.destination_port) {
        return true;
    }
    // Internal-to-internal traffic is always safe.
    if is_internal(&event.source_ip) && is_internal(&event.destination_ip) {
        return true;
    }
    false
}

/// The plugin registry plus aggregation rule.
pub struct DetectorPipeline {
    plugins: Vec<Box<dyn DetectionPlugin>>,
}

impl DetectorPipeline {
    /// Build the registry in its fixed order, honoring per-plugin `enabled`
    /// flags from the configuration.
    pub fn new(config: &DetectorConfig) -> Self {
        let mut plugins: Vec<Box<dyn DetectionPlugin>> = Vec::new();
        if config.ai_domain {
            plugins.push(Box::new(heuristics::AiDomainDetector));
        }
        if config.unusual_port {
            plugins.push(Box::new(heuristics::UnusualPortDetector));
        }
        if config.dns_tunneling {
            plugins.push(Box::new(heuristics::DnsTunnelingDetector));
        }
        if config.data_exfiltration {
            plugins.push(Box::new(heuristics::DataExfiltrationDetector));
        }
        if config.cidr_intel {
            plugins.push(Box::new(cidr_intel::CidrIntelPlugin::new()));
        }
        if config.ja3_fingerprint {
            plugins.push(Box::new(ja3_fingerprint::Ja3FingerprintPlugin::new()));
        }
        DetectorPipeline { plugins }
    }

    pub fn plugin_names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Run every plugin and return the highest-severity hit, if any.
    pub fn detect(&self, event: &FlowEvent) -> Option<Detection> {
        if is_whitelisted(event) {
            return None;
        }
        let mut verdict: Option<Detection> = None;
        for plugin in &self.plugins {
            if let Some(hit) = plugin.detect(event) {
                let better = match &verdict {
                    Some(current) => hit.severity > current.severity,
                    None => true,
                };
                if better {
                    verdict = Some(hit);
                }
            }
        }
        verdict
    }
}

#[cfg(test)]
pub mod testutil {
    use std::collections::HashMap;
    use std::net::IpAddr;

    use chrono::Utc;

    use crate::events::{FlowEvent, Protocol};

    pub fn flow(src: &str, dst: &str, dport: u16, protocol: Protocol) -> FlowEvent {
        FlowEvent {
            source_ip: src.parse::<IpAddr>().unwrap(),
            destination_ip: dst.parse::<IpAddr>().unwrap(),
            source_port: 52000,
            destination_port: dport,
            protocol,
            bytes_sent: 100,
            bytes_received: 0,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_meta(mut event: FlowEvent, key: &str, value: &str) -> FlowEvent {
        event.metadata.insert(key.to_string(), value.to_string());
        event
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use crate::events::{meta, Protocol};

    fn pipeline() -> DetectorPipeline {
        DetectorPipeline::new(&DetectorConfig::default())
    }

    #[test]
    fn multicast_destinations_are_whitelisted() {
        assert!(is_whitelisted(&flow(
            "192.168.1.11",
            "239.255.255.250",
            1900,
            Protocol::Udp
        )));
        assert!(is_whitelisted(&flow(
            "192.168.1.11",
            "224.0.0.251",
            5353,
            Protocol::Udp
        )));
    }

    #[test]
    fn ipv6_link_local_is_whitelisted() {
        assert!(is_whitelisted(&flow(
            "192.168.1.11",
            "fe80::1",
            443,
            Protocol::Tcp
        )));
        assert!(is_whitelisted(&flow(
            "192.168.1.11",
            "ff02::fb",
            5353,
            Protocol::Udp
        )));
    }

    #[test]
    fn internal_to_internal_is_whitelisted() {
        assert!(is_whitelisted(&flow(
            "192.168.1.11",
            "192.168.1.40",
            1337,
            Protocol::Tcp
        )));
    }

    #[test]
    fn whitelisted_flows_produce_no_verdict() {
        let event = with_meta(
            flow("192.168.1.11", "224.0.0.251", 5353, Protocol::Dns),
            meta::DNS_QUERY,
            "api.openai.com",
        );
        assert!(pipeline().detect(&event).is_none());
    }

    #[test]
    fn highest_severity_wins() {
        // AI domain (HIGH) and attack-tool JA3 (CRITICAL) both fire; the
        // CRITICAL verdict must come out.
        let event = with_meta(
            with_meta(
                flow("192.168.1.10", "13.107.42.14", 443, Protocol::Https),
                meta::SNI,
                "api.openai.com",
            ),
            meta::JA3_HASH,
            "51c64c77e60f3980eea90869b68c58a8",
        );
        let verdict = pipeline().detect(&event).unwrap();
        assert_eq!(verdict.severity, Severity::Critical);
        assert!(verdict.reason.contains("ATTACK TOOL DETECTED"));
    }

    #[test]
    fn ties_resolve_to_registration_order() {
        // DNS tunneling (HIGH, registered after AI domain) ties with the AI
        // domain hit (HIGH); the AI domain reason must win.
        let mut event = with_meta(
            flow("192.168.1.14", "8.8.8.8", 53, Protocol::Dns),
            meta::DNS_QUERY,
            "chat.openai.com",
        );
        event.bytes_sent = 900;
        let verdict = pipeline().detect(&event).unwrap();
        assert_eq!(verdict.severity, Severity::High);
        assert!(verdict.reason.contains("Known AI Service"));
    }

    #[test]
    fn disabled_plugin_does_not_run() {
        let config = DetectorConfig {
            ai_domain: false,
            ..Default::default()
        };
        let pipeline = DetectorPipeline::new(&config);
        let event = with_meta(
            flow("192.168.1.10", "93.184.216.34", 443, Protocol::Https),
            meta::SNI,
            "chat.openai.com",
        );
        assert!(pipeline.detect(&event).is_none());
    }
}
