//! JA3 fingerprint plugin.
//!
//! Three tiers, checked in order: known attack tooling (CRITICAL), identity
//! spoofing where the User-Agent claims a browser the TLS fingerprint
//! contradicts (HIGH), and any known non-browser client (MEDIUM).

use super::{Detection, DetectionPlugin};
use crate::events::{meta, FlowEvent, Severity};
use crate::intel::ja3::Ja3Category;
use crate::intel::Ja3Matcher;

pub struct Ja3FingerprintPlugin {
    matcher: Ja3Matcher,
}

impl Ja3FingerprintPlugin {
    pub fn new() -> Self {
        Ja3FingerprintPlugin {
            matcher: Ja3Matcher::new(),
        }
    }
}

impl Default for Ja3FingerprintPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionPlugin for Ja3FingerprintPlugin {
    fn name(&self) -> &'static str {
        "JA3 Fingerprint Analyzer"
    }

    fn detect(&self, event: &FlowEvent) -> Option<Detection> {
        let ja3_hash = event.metadata.get(meta::JA3_HASH)?;
        let user_agent = event
            .metadata
            .get(meta::USER_AGENT)
            .map(String::as_str)
            .unwrap_or("");

        if self.matcher.is_known_bad(ja3_hash) {
            let entry = self.matcher.lookup(ja3_hash)?;
            return Some(Detection {
                severity: Severity::Critical,
                reason: format!(
                    "ATTACK TOOL DETECTED: {} (JA3: {}...) — {}",
                    entry.client_name,
                    &ja3_hash[..12],
                    entry.description
                ),
            });
        }

        if !user_agent.is_empty() {
            if let Some(spoof) = self.matcher.detect_spoofing(ja3_hash, user_agent) {
                return Some(Detection {
                    severity: Severity::High,
                    reason: format!(
                        "IDENTITY SPOOFING: UA claims browser but TLS fingerprint is {} ({})",
                        spoof.ja3_client, spoof.ja3_category
                    ),
                });
            }
        }

        if let Some(entry) = self.matcher.lookup(ja3_hash) {
            if matches!(
                entry.category,
                Ja3Category::Scripting | Ja3Category::Bot | Ja3Category::Proxy
            ) {
                return Some(Detection {
                    severity: Severity::Medium,
                    reason: format!(
                        "Non-browser client: {} [{}] (JA3: {}...)",
                        entry.client_name,
                        entry.category.as_str(),
                        &ja3_hash[..12]
                    ),
                });
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use crate::events::Protocol;

    fn https_flow() -> FlowEvent {
        flow("192.168.1.10", "93.184.216.34", 443, Protocol::Https)
    }

    #[test]
    fn attack_tool_is_critical() {
        let event = with_meta(
            https_flow(),
            meta::JA3_HASH,
            "51c64c77e60f3980eea90869b68c58a8",
        );
        let hit = Ja3FingerprintPlugin::new().detect(&event).unwrap();
        assert_eq!(hit.severity, Severity::Critical);
        assert!(hit.reason.contains("ATTACK TOOL DETECTED: Cobalt Strike Beacon"));
    }

    #[test]
    fn spoofed_browser_ua_is_high() {
        let event = with_meta(
            with_meta(
                https_flow(),
                meta::JA3_HASH,
                "e7d705a3286e19ea42f587b344ee6865",
            ),
            meta::USER_AGENT,
            "Mozilla/5.0 (Windows NT 10.0) Chrome/120.0",
        );
        let hit = Ja3FingerprintPlugin::new().detect(&event).unwrap();
        assert_eq!(hit.severity, Severity::High);
        assert!(hit.reason.contains("IDENTITY SPOOFING"));
    }

    #[test]
    fn known_scripting_client_is_medium() {
        let event = with_meta(
            https_flow(),
            meta::JA3_HASH,
            "456523fc94726331a4d5a2e1d40b2cd7",
        );
        let hit = Ja3FingerprintPlugin::new().detect(&event).unwrap();
        assert_eq!(hit.severity, Severity::Medium);
        assert!(hit.reason.contains("curl"));
    }

    #[test]
    fn browser_fingerprint_is_quiet() {
        let event = with_meta(
            https_flow(),
            meta::JA3_HASH,
            "773906b0efdefa24a7f2b8eb6985bf37",
        );
        assert!(Ja3FingerprintPlugin::new().detect(&event).is_none());
    }

    #[test]
    fn unknown_fingerprint_is_quiet() {
        let event = with_meta(
            https_flow(),
            meta::JA3_HASH,
            "ffffffffffffffffffffffffffffffff",
        );
        assert!(Ja3FingerprintPlugin::new().detect(&event).is_none());
    }
}
