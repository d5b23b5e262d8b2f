//! Core heuristic plugins: AI domains, unusual ports, DNS tunneling, and
//! bulk exfiltration.

use super::{is_internal, Detection, DetectionPlugin};
use crate::events::{FlowEvent, Protocol, Severity};
use crate::intel::ai_domains;

/// Outbound ports expected from ordinary enterprise hosts.
const KNOWN_PORTS: [u16; 11] = [22, 53, 80, 443, 465, 587, 993, 995, 3389, 8080, 8443];

/// A single DNS query larger than this smells like tunneling.
const DNS_PAYLOAD_LIMIT: u64 = 500;

/// Single-flow upload volume beyond which we flag exfiltration.
const EXFIL_THRESHOLD: u64 = 500_000;

/// Flags traffic to known AI/ML service domains.
pub struct AiDomainDetector;

impl DetectionPlugin for AiDomainDetector {
    fn name(&self) -> &'static str {
        "AI Domain Detector"
    }

    fn detect(&self, event: &FlowEvent) -> Option<Detection> {
        let host = event.hostname()?;
        let category = ai_domains::ai_category(host)?;
        Some(Detection {
            severity: Severity::High,
            reason: format!("Known AI Service [{}] Accessed: {}", category, host),
        })
    }
}

/// Flags internal-to-external traffic on non-standard ports.
pub struct UnusualPortDetector;

impl DetectionPlugin for UnusualPortDetector {
    fn name(&self) -> &'static str {
        "Unusual Port Detector"
    }

    fn detect(&self, event: &FlowEvent) -> Option<Detection> {
        if is_internal(&event.source_ip)
            && !is_internal(&event.destination_ip)
            && !KNOWN_PORTS.contains(&event.destination_port)
        {
            return Some(Detection {
                severity: Severity::Medium,
                reason: format!(
                    "Outbound traffic to {} on unusual port {}",
                    event.destination(),
                    event.destination_port
                ),
            });
        }
        None
    }
}

/// Flags DNS queries with suspiciously large payloads.
pub struct DnsTunnelingDetector;

impl DetectionPlugin for DnsTunnelingDetector {
    fn name(&self) -> &'static str {
        "DNS Tunneling Detector"
    }

    fn detect(&self, event: &FlowEvent) -> Option<Detection> {
        if event.protocol == Protocol::Dns && event.bytes_sent > DNS_PAYLOAD_LIMIT {
            return Some(Detection {
                severity: Severity::High,
                reason: "Potential DNS Tunneling (Large DNS Payload)".to_string(),
            });
        }
        None
    }
}

/// Flags unusually large outbound transfers to external hosts.
pub struct DataExfiltrationDetector;

impl DetectionPlugin for DataExfiltrationDetector {
    fn name(&self) -> &'static str {
        "Data Exfiltration Detector"
    }

    fn detect(&self, event: &FlowEvent) -> Option<Detection> {
        if is_internal(&event.source_ip)
            && !is_internal(&event.destination_ip)
            && event.bytes_sent > EXFIL_THRESHOLD
        {
            let size_kb = event.bytes_sent as f64 / 1024.0;
            return Some(Detection {
                severity: Severity::High,
                reason: format!(
                    "Large upload ({:.0} KB) to external host {}",
                    size_kb,
                    event.destination()
                ),
            });
        }
        None
    }
}
