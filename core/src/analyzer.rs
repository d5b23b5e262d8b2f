//! The analyzer engine: consumes flow events off the bus, maintains the
//! graph and per-source sessions, runs the detector stack and ML scorers,
//! enriches and publishes alerts, and drives auto-response, broadcast, and
//! the periodic centrality job.
//!
//! Per-flow emission order: plugin verdict, ML escalation, session
//! escalation, active probe, response, broadcast.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use log::{debug, warn};
use serde_json::{json, Map};

use crate::alerts::AlertBuffer;
use crate::broadcast::{AutoResponsePayload, ConnectionManager, Frame};
use crate::config::Config;
use crate::detect::{self, DetectorPipeline};
use crate::events::{
    meta, Alert, AlertIdGen, CentralityInfo, CidrMatchInfo, FlowEvent, Ja3Intel, Severity,
};
use crate::graph::analytics::GraphAnalyzer;
use crate::graph::{GraphStore, NodeType, TALKS_TO};
use crate::intel::{ai_domains, CidrMatcher, Ja3Matcher};
use crate::ml::{self, IntelligenceEngine};
use crate::probe::ActiveProbe;
use crate::response::ResponseManager;
use crate::session::SessionTracker;

pub struct AnalyzerEngine {
    detector: DetectorPipeline,
    cidr: CidrMatcher,
    ja3: Ja3Matcher,
    ml: Option<IntelligenceEngine>,
    sessions: SessionTracker,
    store: Arc<dyn GraphStore>,
    analytics: GraphAnalyzer,
    probe: ActiveProbe,
    response: Arc<ResponseManager>,
    broadcast: Arc<ConnectionManager>,
    alerts: Arc<AlertBuffer>,
    ids: AlertIdGen,
    /// Running per-edge byte totals; the stored edge property carries the
    /// accumulated count while the store itself stays last-write-wins.
    edge_bytes: Mutex<HashMap<(String, String), u64>>,
    event_count: AtomicU64,
}

impl AnalyzerEngine {
    pub fn new(
        config: &Config,
        store: Arc<dyn GraphStore>,
        response: Arc<ResponseManager>,
        broadcast: Arc<ConnectionManager>,
        alerts: Arc<AlertBuffer>,
    ) -> Self {
        AnalyzerEngine {
            detector: DetectorPipeline::new(&config.detectors),
            cidr: CidrMatcher::new(),
            ja3: Ja3Matcher::new(),
            ml: config.ml.enabled.then(IntelligenceEngine::new),
            sessions: SessionTracker::new(config.session.window_minutes),
            store,
            analytics: GraphAnalyzer::new(&config.graph),
            probe: ActiveProbe::new(&config.probe),
            response,
            broadcast,
            alerts,
            ids: AlertIdGen::new(),
            edge_bytes: Mutex::new(HashMap::new()),
            event_count: AtomicU64::new(0),
        }
    }

    /// Handle one flow event end to end.
    pub async fn handle_event(&self, event: FlowEvent) -> Result<()> {
        let count = self.event_count.fetch_add(1, Ordering::Relaxed) + 1;
        if count % 10 == 0 {
            debug!("analyzer processed {} events", count);
        }

        let host = event.hostname().map(str::to_string);
        let src_id = event.source();
        let src_type = if detect::is_internal(&event.source_ip) {
            NodeType::Internal
        } else {
            NodeType::External
        };

        let mut dst_id = event.destination();
        let mut dst_type = if detect::is_internal(&event.destination_ip) {
            NodeType::Internal
        } else {
            NodeType::External
        };
        if let Some(host) = &host {
            dst_id = host.clone();
            if ai_domains::is_ai_domain(host) {
                dst_type = NodeType::Shadow;
            } else if !detect::is_internal_str(host) {
                dst_type = NodeType::External;
            }
        }

        self.upsert_graph(&event, &src_id, src_type, &dst_id, dst_type)
            .await?;

        let total_bytes = event.bytes_sent + event.bytes_received;
        self.sessions
            .record(&src_id, &dst_id, dst_type, total_bytes, event.timestamp);

        // Primary verdict: rules first, then the ML escalation path.
        let rule_verdict = self.detector.detect(&event);
        let ml_verdict = match &self.ml {
            Some(engine) if !detect::is_whitelisted(&event) => Some(engine.analyze(&event)),
            _ => None,
        };

        let decided = match rule_verdict {
            Some(detection) => Some((detection.severity, detection.reason)),
            None => ml_verdict.as_ref().and_then(ml::escalation),
        };

        if let Some((mut severity, reason)) = decided {
            let alert_id = self.ids.next("alert");
            let mut alert = Alert::new(
                alert_id,
                severity,
                reason.clone(),
                src_id.clone(),
                dst_id.clone(),
                event.timestamp,
                reason.clone(),
            );
            alert.protocol = Some(event.protocol);
            alert.source_port = Some(event.source_port);
            alert.destination_port = Some(event.destination_port);
            alert.bytes_sent = Some(event.bytes_sent);
            alert.bytes_received = Some(event.bytes_received);
            alert.destination_ip = Some(event.destination());

            // CIDR threat intelligence.
            if let Some(hit) = self.cidr.lookup(event.destination_ip) {
                alert.cidr_match = Some(CidrMatchInfo {
                    provider: hit.entry.provider.to_string(),
                    service: hit.entry.service.to_string(),
                    risk_level: hit.entry.risk_level.as_str().to_string(),
                    category: hit.entry.category.to_string(),
                    data_risk: hit.entry.data_risk.to_string(),
                    compliance_tags: hit
                        .entry
                        .compliance_tags
                        .iter()
                        .map(|t| t.to_string())
                        .collect(),
                    cidr: hit.entry.cidr.to_string(),
                });
            }

            // JA3 fingerprint intelligence, with spoofing escalation.
            if let Some(ja3_hash) = event.metadata.get(meta::JA3_HASH) {
                let mut intel = Ja3Intel {
                    ja3_hash: ja3_hash.clone(),
                    client_name: None,
                    category: None,
                    risk_level: None,
                    tags: Vec::new(),
                    spoofing: None,
                };
                if let Some(entry) = self.ja3.lookup(ja3_hash) {
                    intel.client_name = Some(entry.client_name.to_string());
                    intel.category = Some(entry.category.as_str().to_string());
                    intel.risk_level = Some(entry.risk_level.to_string());
                    intel.tags = entry.tags.iter().map(|t| t.to_string()).collect();
                }
                if let Some(user_agent) = event.metadata.get(meta::USER_AGENT) {
                    if let Some(spoof) = self.ja3.detect_spoofing(ja3_hash, user_agent) {
                        intel.spoofing = Some(spoof);
                        if severity != Severity::Critical {
                            severity = Severity::High;
                        }
                    }
                }
                alert.ja3_intel = Some(intel);
            }

            // ML confidence fields augment the alert but never downgrade it.
            if let Some(verdict) = &ml_verdict {
                alert.ml_classification = Some(verdict.classification.to_string());
                alert.ml_confidence = Some(verdict.confidence as f64);
                alert.ml_risk_score = Some(verdict.risk_score as f64);
            }

            // Session context and escalation.
            let session = self.sessions.analyze(&src_id);
            if !session.flags.is_empty() {
                alert.session_flags = Some(session.flags.clone());
                alert.session_risk = Some(session.risk_score);
                alert.exfil_velocity_kbps = Some(session.exfil_velocity_kbps);
                if session.risk_score > 0.7 {
                    severity = severity.escalate();
                    alert.description
                        .push_str(&format!(" [Session risk: {:.0}%]", session.risk_score * 100.0));
                }
            }

            alert.severity = severity;

            // Active interrogation of external CRITICAL/HIGH targets.
            if severity >= Severity::High
                && self.probe.enabled()
                && !detect::is_internal(&event.destination_ip)
            {
                let target = host.clone().unwrap_or_else(|| event.destination());
                let report = self.probe.interrogate(&target).await;
                if report.confirmed_ai {
                    alert
                        .description
                        .push_str(" [Active probe CONFIRMED AI service]");
                }
                alert.active_probe = Some(report);
            }

            // Auto-response, then broadcast.
            let mut blocked = None;
            if severity == Severity::Critical && self.response.enabled() {
                let outcome = self.response.block_ip(
                    &src_id,
                    &reason,
                    severity.as_str(),
                    Some(&alert.id),
                    true,
                );
                if outcome.blocked {
                    blocked = Some(outcome.clone());
                    alert.auto_response = Some(outcome);
                }
            }

            warn!(
                "ALERT [{}]: {} -> {} ({})",
                alert.severity, alert.source, alert.target, alert.description
            );
            self.alerts.push(alert.clone());
            self.broadcast.broadcast(&Frame::Alert(&alert));
            if let Some(outcome) = blocked {
                self.broadcast.broadcast(&Frame::AutoResponse(AutoResponsePayload {
                    action: "BLOCK",
                    ip: outcome.ip,
                    reason: reason.clone(),
                    alert_id: alert.id.clone(),
                }));
            }
        }

        // Periodic lateral-movement analytics, timer gated.
        if self.analytics.should_analyze() {
            self.run_centrality(event.timestamp).await;
        }

        Ok(())
    }

    async fn upsert_graph(
        &self,
        event: &FlowEvent,
        src_id: &str,
        src_type: NodeType,
        dst_id: &str,
        dst_type: NodeType,
    ) -> Result<()> {
        let last_seen = event.timestamp.to_rfc3339();

        let mut src_props = Map::new();
        src_props.insert("label".to_string(), json!(src_id));
        src_props.insert("type".to_string(), json!(src_type.as_str()));
        src_props.insert("last_seen".to_string(), json!(last_seen));
        self.store.add_node(src_id, &["Node"], src_props).await?;

        let mut dst_props = Map::new();
        dst_props.insert("label".to_string(), json!(dst_id));
        dst_props.insert("type".to_string(), json!(dst_type.as_str()));
        dst_props.insert("last_seen".to_string(), json!(last_seen));
        self.store.add_node(dst_id, &["Node"], dst_props).await?;

        let byte_count = {
            let mut totals = self.edge_bytes.lock().unwrap_or_else(|e| e.into_inner());
            let total = totals
                .entry((src_id.to_string(), dst_id.to_string()))
                .or_insert(0);
            *total += event.bytes_sent + event.bytes_received;
            *total
        };

        let mut edge_props = Map::new();
        edge_props.insert("protocol".to_string(), json!(event.protocol.as_str()));
        edge_props.insert("dst_port".to_string(), json!(event.destination_port));
        edge_props.insert("byte_count".to_string(), json!(byte_count));
        edge_props.insert("last_seen".to_string(), json!(last_seen));
        self.store
            .add_edge(src_id, dst_id, TALKS_TO, edge_props)
            .await?;
        Ok(())
    }

    async fn run_centrality(&self, timestamp: chrono::DateTime<chrono::Utc>) {
        let findings = match self.analytics.detect_lateral_movement(self.store.as_ref()).await {
            Ok(findings) => findings,
            Err(err) => {
                debug!("graph analytics error: {}", err);
                return;
            }
        };

        for finding in findings {
            // Alert severity has no INFO level; external-hub findings land
            // on the floor.
            let severity = if finding.risk_assessment.starts_with("HIGH RISK") {
                Severity::High
            } else if finding.risk_assessment.starts_with("MEDIUM RISK") {
                Severity::Medium
            } else {
                Severity::Low
            };
            let target: Vec<&str> = finding
                .connected_to
                .iter()
                .take(5)
                .map(String::as_str)
                .collect();
            let mut alert = Alert::new(
                self.ids.next(&format!("graph-{}", finding.node_id)),
                severity,
                finding.risk_assessment.clone(),
                finding.node_id.clone(),
                target.join(", "),
                timestamp,
                "Graph Centrality Analysis",
            );
            alert.graph_centrality = Some(CentralityInfo {
                centrality_score: finding.centrality_score,
                connections: finding.connections,
                node_type: finding.node_type.as_str().to_string(),
                connected_to: finding.connected_to.clone(),
            });

            warn!(
                "ALERT [{}]: {} ({})",
                alert.severity, alert.source, alert.description
            );
            self.alerts.push(alert.clone());
            self.broadcast.broadcast(&Frame::Alert(&alert));
        }
    }
}
