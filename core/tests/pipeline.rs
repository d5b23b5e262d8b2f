//! End-to-end pipeline scenarios: flow events through the analyzer, checked
//! against the alert buffer, the broadcast stream, the response manager,
//! and the graph store.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use shadowhawk_core::alerts::AlertBuffer;
use shadowhawk_core::analyzer::AnalyzerEngine;
use shadowhawk_core::broadcast::ConnectionManager;
use shadowhawk_core::config::Config;
use shadowhawk_core::events::{meta, FlowEvent, Protocol, SessionFlag, Severity};
use shadowhawk_core::graph::memory::MemoryGraphStore;
use shadowhawk_core::graph::{GraphStore, NodeType, TALKS_TO};
use shadowhawk_core::response::ResponseManager;

struct Harness {
    engine: AnalyzerEngine,
    store: Arc<MemoryGraphStore>,
    alerts: Arc<AlertBuffer>,
    broadcast: Arc<ConnectionManager>,
    response: Arc<ResponseManager>,
}

fn harness() -> Harness {
    let mut config = Config::default();
    config.probe.enabled = false;
    // Rules-only reference behavior; the ML path has its own test.
    config.ml.enabled = false;
    let store = Arc::new(MemoryGraphStore::new());
    let response = Arc::new(ResponseManager::new(&config.response));
    let broadcast = Arc::new(ConnectionManager::new());
    let alerts = Arc::new(AlertBuffer::default());
    let engine = AnalyzerEngine::new(
        &config,
        Arc::clone(&store) as Arc<dyn GraphStore>,
        Arc::clone(&response),
        Arc::clone(&broadcast),
        Arc::clone(&alerts),
    );
    Harness {
        engine,
        store,
        alerts,
        broadcast,
        response,
    }
}

fn flow(
    src: &str,
    dst: &str,
    dport: u16,
    protocol: Protocol,
    bytes_sent: u64,
    timestamp: DateTime<Utc>,
    metadata: &[(&str, &str)],
) -> FlowEvent {
    FlowEvent {
        source_ip: src.parse().unwrap(),
        destination_ip: dst.parse().unwrap(),
        source_port: 52000,
        destination_port: dport,
        protocol,
        bytes_sent,
        bytes_received: 0,
        timestamp,
        metadata: metadata
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

fn afternoon(sec: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 5, 14, 0, sec).unwrap()
}

#[tokio::test]
async fn direct_openai_access_by_tls() {
    let h = harness();
    let event = flow(
        "192.168.1.10",
        "13.107.42.14",
        443,
        Protocol::Https,
        12_000,
        afternoon(0),
        &[
            (meta::SNI, "api.openai.com"),
            (meta::JA3_HASH, "e7d705a3286e19ea42f587b344ee6865"),
        ],
    );
    let event_ts = event.timestamp;
    h.engine.handle_event(event).await.unwrap();

    let alerts = h.alerts.snapshot();
    assert_eq!(alerts.len(), 1);
    let alert = &alerts[0];
    assert_eq!(alert.severity, Severity::High);
    assert!(alert.description.contains("Known AI Service"));
    assert!(alert.description.contains("api.openai.com"));

    // Required-field invariants.
    assert!(!alert.source.is_empty());
    assert!(!alert.target.is_empty());
    assert!(alert.timestamp >= event_ts);

    let cidr = alert.cidr_match.as_ref().unwrap();
    assert_eq!(cidr.provider, "OpenAI");
    let ja3 = alert.ja3_intel.as_ref().unwrap();
    assert_eq!(
        ja3.client_name.as_deref(),
        Some("Python requests 2.x (urllib3)")
    );
    assert!(ja3.tags.iter().any(|t| t == "spoofing_risk"));
}

#[tokio::test]
async fn attack_tool_ja3_blocks_and_broadcasts() {
    let h = harness();
    let (_, mut frames) = h.broadcast.register();

    let event = flow(
        "192.168.1.10",
        "13.107.42.14",
        443,
        Protocol::Https,
        12_000,
        afternoon(0),
        &[
            (meta::SNI, "api.openai.com"),
            (meta::JA3_HASH, "51c64c77e60f3980eea90869b68c58a8"),
        ],
    );
    h.engine.handle_event(event).await.unwrap();

    let alerts = h.alerts.snapshot();
    assert_eq!(alerts.len(), 1);
    let alert = &alerts[0];
    assert_eq!(alert.severity, Severity::Critical);
    assert!(alert
        .description
        .contains("ATTACK TOOL DETECTED: Cobalt Strike Beacon"));

    // The source is quarantined with a TTL.
    assert!(h.response.is_blocked("192.168.1.10"));
    let entry = h
        .response
        .blocked_ips()
        .into_iter()
        .find(|e| e.ip == "192.168.1.10")
        .unwrap();
    assert!(entry.expires_at.is_some());
    assert!(entry.auto_blocked);

    // Both frames arrive, alert first.
    let first: serde_json::Value = serde_json::from_str(&frames.try_recv().unwrap()).unwrap();
    assert_eq!(first["type"], "alert");
    assert_eq!(first["payload"]["severity"], "CRITICAL");
    let second: serde_json::Value = serde_json::from_str(&frames.try_recv().unwrap()).unwrap();
    assert_eq!(second["type"], "auto_response");
    assert_eq!(second["payload"]["action"], "BLOCK");
    assert_eq!(second["payload"]["ip"], "192.168.1.10");
}

#[tokio::test]
async fn dns_tunneling_payload() {
    let h = harness();
    let event = flow(
        "192.168.1.14",
        "8.8.8.8",
        53,
        Protocol::Dns,
        900,
        afternoon(0),
        &[(meta::DNS_QUERY, "aaaaaaaaaaaaaaaabbbb.evil.example")],
    );
    h.engine.handle_event(event).await.unwrap();

    let alerts = h.alerts.snapshot();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, Severity::High);
    assert_eq!(
        alerts[0].matched_rule,
        "Potential DNS Tunneling (Large DNS Payload)"
    );
}

#[tokio::test]
async fn dns_payload_at_threshold_is_quiet() {
    let h = harness();
    let event = flow(
        "192.168.1.14",
        "8.8.8.8",
        53,
        Protocol::Dns,
        500,
        afternoon(0),
        &[(meta::DNS_QUERY, "ordinary.example")],
    );
    h.engine.handle_event(event).await.unwrap();
    assert!(h.alerts.is_empty());
}

#[tokio::test]
async fn multicast_is_suppressed_but_graphed() {
    let h = harness();
    let event = flow(
        "192.168.1.11",
        "239.255.255.250",
        1900,
        Protocol::Udp,
        200,
        afternoon(0),
        &[],
    );
    h.engine.handle_event(event).await.unwrap();

    assert!(h.alerts.is_empty());
    let nodes = h.store.get_all_nodes().await.unwrap();
    let mut ids: Vec<String> = nodes.into_iter().map(|n| n.id).collect();
    ids.sort();
    assert_eq!(ids, vec!["192.168.1.11", "239.255.255.250"]);
    assert_eq!(h.store.get_all_edges().await.unwrap().len(), 1);
}

#[tokio::test]
async fn lateral_movement_bridge_alert() {
    let h = harness();

    // Inject a bridge: 192.168.1.50 talks both ways with five internal
    // hosts and two external IPs.
    let bridge = "192.168.1.50";
    let mut props = serde_json::Map::new();
    props.insert("type".to_string(), json!("internal"));
    h.store.add_node(bridge, &["Node"], props).await.unwrap();
    let peers = [
        "192.168.1.20",
        "192.168.1.21",
        "192.168.1.22",
        "192.168.1.23",
        "192.168.1.24",
        "34.160.10.5",
        "52.44.7.99",
    ];
    for peer in peers {
        h.store
            .add_edge(peer, bridge, TALKS_TO, serde_json::Map::new())
            .await
            .unwrap();
        h.store
            .add_edge(bridge, peer, TALKS_TO, serde_json::Map::new())
            .await
            .unwrap();
    }

    // Any flow ticks the analytics timer, which has never run.
    let event = flow(
        "192.168.1.11",
        "239.255.255.250",
        1900,
        Protocol::Udp,
        100,
        afternoon(0),
        &[],
    );
    h.engine.handle_event(event).await.unwrap();

    let alerts = h.alerts.snapshot();
    assert_eq!(alerts.len(), 1);
    let alert = &alerts[0];
    assert_eq!(alert.matched_rule, "Graph Centrality Analysis");
    assert_eq!(alert.source, bridge);
    assert!(alert.description.starts_with("HIGH RISK"));
    assert_eq!(alert.severity, Severity::High);
    let centrality = alert.graph_centrality.as_ref().unwrap();
    assert_eq!(centrality.node_type, "internal");
    assert!(centrality.centrality_score >= 0.3);
    assert!(centrality.connections >= 3);
}

#[tokio::test]
async fn session_burst_escalates_fourth_alert() {
    let h = harness();
    // Four AI flows within 10 s totaling 120 KB across two services.
    let hosts = ["api.openai.com", "api.openai.com", "claude.ai", "claude.ai"];
    for (i, host) in hosts.into_iter().enumerate() {
        let event = flow(
            "192.168.1.13",
            "13.107.42.14",
            443,
            Protocol::Https,
            30_000,
            afternoon(3 * i as u32),
            &[(meta::SNI, host)],
        );
        h.engine.handle_event(event).await.unwrap();
    }

    let alerts = h.alerts.snapshot();
    assert_eq!(alerts.len(), 4);
    let fourth = &alerts[3];
    let flags = fourth.session_flags.as_ref().unwrap();
    for expected in [
        SessionFlag::BurstAiUsage,
        SessionFlag::MultiAiServices,
        SessionFlag::LargeAiPayload,
        SessionFlag::RapidAiRequests,
    ] {
        assert!(flags.contains(&expected), "missing {:?}", expected);
    }
    assert!(fourth.session_risk.unwrap() > 0.7);
    // Session risk above 0.7 escalates the HIGH rule verdict one step.
    assert_eq!(fourth.severity, Severity::Critical);
    assert!(fourth.description.contains("Session risk"));

    // The shadow destination nodes were typed accordingly.
    let nodes = h.store.get_all_nodes().await.unwrap();
    let openai = nodes.iter().find(|n| n.id == "api.openai.com").unwrap();
    assert_eq!(openai.node_type(), NodeType::Shadow);
}

#[tokio::test]
async fn outbound_exfiltration_boundary() {
    let h = harness();
    let at_threshold = flow(
        "192.168.1.16",
        "93.184.216.34",
        443,
        Protocol::Https,
        500_000,
        afternoon(0),
        &[],
    );
    h.engine.handle_event(at_threshold).await.unwrap();
    assert!(h.alerts.is_empty());

    let over = flow(
        "192.168.1.16",
        "93.184.216.34",
        443,
        Protocol::Https,
        500_001,
        afternoon(5),
        &[],
    );
    h.engine.handle_event(over).await.unwrap();
    let alerts = h.alerts.snapshot();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, Severity::High);
    assert!(alerts[0].description.contains("Large upload"));
}

#[tokio::test]
async fn ml_escalation_catches_rule_missed_traffic() {
    let mut config = Config::default();
    config.probe.enabled = false;
    let store = Arc::new(MemoryGraphStore::new());
    let response = Arc::new(ResponseManager::new(&config.response));
    let broadcast = Arc::new(ConnectionManager::new());
    let alerts = Arc::new(AlertBuffer::default());
    let engine = AnalyzerEngine::new(
        &config,
        Arc::clone(&store) as Arc<dyn GraphStore>,
        response,
        broadcast,
        Arc::clone(&alerts),
    );

    // Large named upload to an unlisted external host: no rule matches,
    // but the classifier calls it shadow AI with enough confidence.
    let event = flow(
        "192.168.1.20",
        "93.184.216.34",
        443,
        Protocol::Https,
        20_000,
        afternoon(0),
        &[(meta::SNI, "bulk-upload.example.net")],
    );
    engine.handle_event(event).await.unwrap();

    let alerts = alerts.snapshot();
    assert_eq!(alerts.len(), 1);
    let alert = &alerts[0];
    assert_eq!(alert.severity, Severity::High);
    assert!(alert.description.contains("ML detected Shadow AI"));
    assert_eq!(alert.ml_classification.as_deref(), Some("shadow_ai"));
    assert!(alert.ml_confidence.unwrap() > 0.70);
}

#[tokio::test]
async fn graph_gains_a_node_for_every_endpoint() {
    let h = harness();
    let flows = [
        ("192.168.1.10", "93.184.216.34"),
        ("192.168.1.11", "93.184.216.34"),
        ("192.168.1.12", "1.2.3.4"),
    ];
    for (i, (src, dst)) in flows.iter().enumerate() {
        let event = flow(src, dst, 8443, Protocol::Tcp, 10, afternoon(i as u32), &[]);
        h.engine.handle_event(event).await.unwrap();
    }
    let nodes = h.store.get_all_nodes().await.unwrap();
    let ids: Vec<String> = nodes.into_iter().map(|n| n.id).collect();
    for endpoint in [
        "192.168.1.10",
        "192.168.1.11",
        "192.168.1.12",
        "93.184.216.34",
        "1.2.3.4",
    ] {
        assert!(ids.contains(&endpoint.to_string()), "missing {}", endpoint);
    }
}
