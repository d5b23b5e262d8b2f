//! CIDR-based threat intelligence: destination-IP matching against known AI
//! provider address blocks.
//!
//! Catches traffic that bypasses DNS entirely (direct IP access, SDK-pinned
//! endpoints, VPN tunnels).

use std::net::IpAddr;

use ipnet::IpNet;

use crate::events::Severity;

/// One catalog entry: a provider block with its risk annotations.
#[derive(Debug, Clone)]
pub struct CidrEntry {
    pub cidr: &'static str,
    pub provider: &'static str,
    pub service: &'static str,
    pub risk_level: Severity,
    pub category: &'static str,
    pub data_risk: &'static str,
    pub compliance_tags: &'static [&'static str],
}

/// Result of a successful CIDR lookup.
#[derive(Debug, Clone)]
pub struct CidrMatch {
    pub ip: String,
    pub entry: &'static CidrEntry,
}

static AI_CIDR_DATABASE: &[CidrEntry] = &[
    // OpenAI
    CidrEntry {
        cidr: "13.107.42.0/24",
        provider: "OpenAI",
        service: "ChatGPT / GPT-4 API",
        risk_level: Severity::High,
        category: "LLM",
        data_risk: "Prompts may contain PII, proprietary code, or trade secrets",
        compliance_tags: &["SOC2", "GDPR", "HIPAA"],
    },
    CidrEntry {
        cidr: "13.107.43.0/24",
        provider: "OpenAI",
        service: "GPT-4 Turbo API",
        risk_level: Severity::High,
        category: "LLM",
        data_risk: "High-throughput API access — bulk data exfiltration risk",
        compliance_tags: &["SOC2", "GDPR", "HIPAA"],
    },
    CidrEntry {
        cidr: "40.119.0.0/16",
        provider: "OpenAI (Azure)",
        service: "Azure OpenAI Service",
        risk_level: Severity::High,
        category: "LLM",
        data_risk: "Enterprise AI access via Azure — may bypass network controls",
        compliance_tags: &["SOC2", "GDPR"],
    },
    // Anthropic
    CidrEntry {
        cidr: "34.102.136.0/24",
        provider: "Anthropic",
        service: "Claude 3.5 Sonnet API",
        risk_level: Severity::Critical,
        category: "LLM",
        data_risk: "Large context window (200K tokens) enables massive data ingestion",
        compliance_tags: &["SOC2", "GDPR", "HIPAA"],
    },
    CidrEntry {
        cidr: "34.102.137.0/24",
        provider: "Anthropic",
        service: "Claude API",
        risk_level: Severity::Critical,
        category: "LLM",
        data_risk: "Multi-modal capabilities may process sensitive documents",
        compliance_tags: &["SOC2", "GDPR", "HIPAA"],
    },
    // Google AI
    CidrEntry {
        cidr: "142.250.0.0/16",
        provider: "Google",
        service: "Gemini / Vertex AI",
        risk_level: Severity::High,
        category: "LLM",
        data_risk: "Data may be used for model improvement without explicit consent",
        compliance_tags: &["SOC2", "GDPR"],
    },
    CidrEntry {
        cidr: "172.217.0.0/16",
        provider: "Google",
        service: "Google AI Studio / NotebookLM",
        risk_level: Severity::High,
        category: "LLM",
        data_risk: "Shared across Google services — broad data exposure",
        compliance_tags: &["SOC2", "GDPR"],
    },
    // Hugging Face
    CidrEntry {
        cidr: "54.164.0.0/16",
        provider: "Hugging Face",
        service: "Inference API / Model Hub",
        risk_level: Severity::High,
        category: "ML Infra",
        data_risk: "Open-source model hosting — variable data handling policies",
        compliance_tags: &["SOC2"],
    },
    // Stability AI
    CidrEntry {
        cidr: "104.18.0.0/16",
        provider: "Stability AI",
        service: "Stable Diffusion API",
        risk_level: Severity::Medium,
        category: "Image Gen",
        data_risk: "Image generation from text prompts — IP leakage via descriptions",
        compliance_tags: &["SOC2"],
    },
    // Cohere
    CidrEntry {
        cidr: "35.203.0.0/16",
        provider: "Cohere",
        service: "Embed / Generate API",
        risk_level: Severity::High,
        category: "LLM",
        data_risk: "Embedding API may expose document semantics to third party",
        compliance_tags: &["SOC2", "GDPR"],
    },
    // Replicate
    CidrEntry {
        cidr: "44.226.0.0/16",
        provider: "Replicate",
        service: "Model Hosting Platform",
        risk_level: Severity::Medium,
        category: "ML Infra",
        data_risk: "Third-party model hosting — data processed on shared infra",
        compliance_tags: &["SOC2"],
    },
    // Mistral AI
    CidrEntry {
        cidr: "51.159.0.0/16",
        provider: "Mistral AI",
        service: "Mistral Large / Le Chat",
        risk_level: Severity::High,
        category: "LLM",
        data_risk: "EU-based but data sovereignty varies by deployment",
        compliance_tags: &["SOC2", "GDPR"],
    },
    // Meta AI
    CidrEntry {
        cidr: "157.240.0.0/16",
        provider: "Meta",
        service: "Llama API / Meta AI",
        risk_level: Severity::High,
        category: "LLM",
        data_risk: "Open-weight models but API calls route through Meta infra",
        compliance_tags: &["SOC2", "GDPR"],
    },
    // Together AI
    CidrEntry {
        cidr: "34.149.0.0/16",
        provider: "Together AI",
        service: "Inference API (OSS models)",
        risk_level: Severity::Medium,
        category: "ML Infra",
        data_risk: "Shared GPU clusters processing multiple tenants",
        compliance_tags: &["SOC2"],
    },
    // Groq
    CidrEntry {
        cidr: "76.76.21.0/24",
        provider: "Groq",
        service: "LPU Inference API",
        risk_level: Severity::Medium,
        category: "ML Infra",
        data_risk: "Ultra-fast inference — high throughput data processing",
        compliance_tags: &["SOC2"],
    },
];

/// Matcher over the provider catalog. Networks are parsed once at
/// construction; malformed entries are skipped.
#[derive(Debug)]
pub struct CidrMatcher {
    entries: Vec<(IpNet, &'static CidrEntry)>,
}

impl Default for CidrMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl CidrMatcher {
    pub fn new() -> Self {
        let entries = AI_CIDR_DATABASE
            .iter()
            .filter_map(|entry| entry.cidr.parse::<IpNet>().ok().map(|net| (net, entry)))
            .collect();
        CidrMatcher { entries }
    }

    /// Check whether an address falls inside a known AI provider block.
    /// Private, loopback, and multicast addresses never match.
    pub fn lookup(&self, ip: IpAddr) -> Option<CidrMatch> {
        if ip.is_loopback() || ip.is_multicast() {
            return None;
        }
        if let IpAddr::V4(v4) = ip {
            if v4.is_private() {
                return None;
            }
        }
        self.entries
            .iter()
            .find(|(net, _)| net.contains(&ip))
            .map(|(_, entry)| CidrMatch {
                ip: ip.to_string(),
                entry,
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
