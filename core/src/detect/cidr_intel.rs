//! CIDR threat-intelligence plugin: catches Shadow AI traffic that bypasses
//! DNS by matching destination IPs against known provider blocks.

use super::{Detection, DetectionPlugin};
use crate::events::FlowEvent;
use crate::intel::CidrMatcher;

pub struct CidrIntelPlugin {
    matcher: CidrMatcher,
}

impl CidrIntelPlugin {
    pub fn new() -> Self {
        CidrIntelPlugin {
            matcher: CidrMatcher::new(),
        }
    }
}

impl Default for CidrIntelPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionPlugin for CidrIntelPlugin {
    fn name(&self) -> &'static str {
        "CIDR Threat Intelligence"
    }

    fn detect(&self, event: &FlowEvent) -> Option<Detection> {
        let hit = self.matcher.lookup(event.destination_ip)?;
        Some(Detection {
            severity: hit.entry.risk_level,
            reason: format!(
                "CIDR Intel: IP {} belongs to {} ({}) [{}] — {}",
                hit.ip, hit.entry.provider, hit.entry.service, hit.entry.category, hit.entry.data_risk
            ),
        })
    }
}
