//! Feature extraction: one flow event to a fixed 16-dimension vector.
//!
//! The vector layout is a model contract. Scorers are trained against this
//! exact ordering, so dimensions are appended, never reordered:
//!
//! ```text
//! [0]  protocol_id          protocol enum as int (unknown = -1)
//! [1]  dst_port_norm        destination port / 65535
//! [2]  bytes_sent_log       ln(1 + bytes_sent)
//! [3]  bytes_received_log   ln(1 + bytes_received)
//! [4]  byte_ratio           sent / max(sent + received, 1)
//! [5]  is_internal_src      source is RFC1918/loopback
//! [6]  is_internal_dst      destination is RFC1918/loopback
//! [7]  is_well_known_port   dst port in a named category
//! [8]  port_category        bucketed category id in [0, 1]
//! [9]  has_hostname         DPI produced a hostname
//! [10] hostname_length      length / 100
//! [11] hostname_dot_count   subdomain depth (raw)
//! [12] hour_of_day          capture hour / 23
//! [13] is_ai_port           dst port common for AI APIs
//! [14] payload_size_bucket  five thresholds in {0, .25, .5, .75, 1}
//! [15] is_known_ai_cidr     destination inside a known AI provider block
//! ```

use std::net::IpAddr;

use chrono::Timelike;
use ndarray::Array1;

use crate::events::{meta, FlowEvent, Protocol};
use crate::intel::CidrMatcher;

pub const FEATURE_COUNT: usize = 16;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "protocol_id",
    "dst_port_norm",
    "bytes_sent_log",
    "bytes_received_log",
    "byte_ratio",
    "is_internal_src",
    "is_internal_dst",
    "is_well_known_port",
    "port_category",
    "has_hostname",
    "hostname_length",
    "hostname_dot_count",
    "hour_of_day",
    "is_ai_port",
    "payload_size_bucket",
    "is_known_ai_cidr",
];

/// Port categories, in fixed order; the category feature is `(i+1)/len`.
const PORT_CATEGORIES: [(&str, &[u16]); 6] = [
    ("web", &[80, 443, 8080, 8443]),
    ("mail", &[25, 465, 587, 993, 995]),
    ("dns", &[53]),
    ("ssh", &[22]),
    ("database", &[3306, 5432, 27017, 6379]),
    ("file_transfer", &[20, 21, 445]),
];

/// Ports commonly fronting AI APIs and dev-hosted model servers.
const AI_API_PORTS: [u16; 6] = [443, 8080, 8443, 3000, 5000, 8000];

pub struct FeatureExtractor {
    cidr: CidrMatcher,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureExtractor {
    pub fn new() -> Self {
        FeatureExtractor {
            cidr: CidrMatcher::new(),
        }
    }

    pub fn extract(&self, event: &FlowEvent) -> Array1<f32> {
        let host = event
            .metadata
            .get(meta::HOST)
            .or_else(|| event.metadata.get(meta::SNI))
            .map(String::as_str)
            .unwrap_or("");
        let total_bytes = event.bytes_sent + event.bytes_received;

        Array1::from(vec![
            protocol_id(event.protocol),
            event.destination_port as f32 / 65535.0,
            (event.bytes_sent as f32).ln_1p(),
            (event.bytes_received as f32).ln_1p(),
            event.bytes_sent as f32 / total_bytes.max(1) as f32,
            bool_feature(is_internal(&event.source_ip)),
            bool_feature(is_internal(&event.destination_ip)),
            bool_feature(is_well_known_port(event.destination_port)),
            port_category(event.destination_port),
            bool_feature(!host.is_empty()),
            host.len() as f32 / 100.0,
            host.matches('.').count() as f32,
            event.timestamp.hour() as f32 / 23.0,
            bool_feature(AI_API_PORTS.contains(&event.destination_port)),
            payload_bucket(total_bytes),
            bool_feature(self.cidr.lookup(event.destination_ip).is_some()),
        ])
    }
}

fn protocol_id(protocol: Protocol) -> f32 {
    match protocol {
        Protocol::Tcp => 0.0,
        Protocol::Udp => 1.0,
        Protocol::Http => 2.0,
        Protocol::Https => 3.0,
        Protocol::Dns => 4.0,
    }
}

fn bool_feature(v: bool) -> f32 {
    if v {
        1.0
    } else {
        0.0
    }
}

/// RFC1918 plus loopback, the broad notion used for modelling (unlike the
/// detector whitelist, which matches literal LAN prefixes).
fn is_internal(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback(),
        IpAddr::V6(v6) => v6.is_loopback(),
    }
}

fn is_well_known_port(port: u16) -> bool {
    PORT_CATEGORIES
        .iter()
        .any(|(_, ports)| ports.contains(&port))
}

fn port_category(port: u16) -> f32 {
    for (i, (_, ports)) in PORT_CATEGORIES.iter().enumerate() {
        if ports.contains(&port) {
            return (i + 1) as f32 / PORT_CATEGORIES.len() as f32;
        }
    }
    0.0
}

/// Tiny < 1K | small < 10K | medium < 100K | large < 1M | huge.
fn payload_bucket(total_bytes: u64) -> f32 {
    if total_bytes < 1_024 {
        0.0
    } else if total_bytes < 10_240 {
        0.25
    } else if total_bytes < 102_400 {
        0.5
    } else if total_bytes < 1_048_576 {
        0.75
    } else {
        1.0
    }
}
