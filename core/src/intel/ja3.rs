//! JA3 fingerprint intelligence: client identity verification from the TLS
//! Client Hello.
//!
//! Different TLS clients (Chrome, Firefox, Python requests, curl, Tor)
//! produce distinct JA3 hashes even when they claim the same User-Agent
//! header. The catalog below maps known hashes to client identities; the
//! matcher layers spoofing detection on top: a flow whose User-Agent claims
//! a browser while the fingerprint identifies a scripting tool is a classic
//! evasion technique.

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::events::SpoofingInfo;

/// Client category associated with a fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ja3Category {
    Browser,
    Scripting,
    AttackTool,
    Bot,
    Proxy,
}

impl Ja3Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ja3Category::Browser => "browser",
            Ja3Category::Scripting => "scripting",
            Ja3Category::AttackTool => "attack_tool",
            Ja3Category::Bot => "bot",
            Ja3Category::Proxy => "proxy",
        }
    }
}

/// One catalog entry for a known TLS client.
#[derive(Debug, Clone)]
pub struct Ja3Entry {
    pub ja3_hash: &'static str,
    pub client_name: &'static str,
    pub category: Ja3Category,
    pub risk_level: &'static str,
    pub description: &'static str,
    pub expected_ua_patterns: &'static [&'static str],
    pub tags: &'static [&'static str],
}

/// Result of a successful fingerprint lookup.
pub type Ja3Match = &'static Ja3Entry;

/// Spoofing analysis result.
pub type SpoofVerdict = SpoofingInfo;

static JA3_DATABASE: &[Ja3Entry] = &[
    // Scripting languages (high spoofing risk)
    Ja3Entry {
        ja3_hash: "e7d705a3286e19ea42f587b344ee6865",
        client_name: "Python requests 2.x (urllib3)",
        category: Ja3Category::Scripting,
        risk_level: "HIGH",
        description: "Standard Python HTTP client — commonly used for API automation and data exfiltration scripts",
        expected_ua_patterns: &["python-requests", "python-urllib3"],
        tags: &["spoofing_risk", "automation"],
    },
    Ja3Entry {
        ja3_hash: "b32309a26951912be7dba376398abc3b",
        client_name: "Python aiohttp",
        category: Ja3Category::Scripting,
        risk_level: "HIGH",
        description: "Async Python HTTP client — used in high-throughput scraping and C2 frameworks",
        expected_ua_patterns: &["aiohttp", "python"],
        tags: &["spoofing_risk", "automation", "async"],
    },
    Ja3Entry {
        ja3_hash: "282149a96f83e5e4e0b2c26c3c4efc43",
        client_name: "Python httpx",
        category: Ja3Category::Scripting,
        risk_level: "HIGH",
        description: "Modern Python HTTP client — used as requests replacement in newer tooling",
        expected_ua_patterns: &["python-httpx", "python"],
        tags: &["spoofing_risk", "automation"],
    },
    Ja3Entry {
        ja3_hash: "3b5074b1b5d032e5620f69f9f700ff0e",
        client_name: "Node.js (https module)",
        category: Ja3Category::Scripting,
        risk_level: "MEDIUM",
        description: "Node.js native HTTPS — used in both legitimate services and attack tooling",
        expected_ua_patterns: &["node", "axios", "got"],
        tags: &["spoofing_risk"],
    },
    Ja3Entry {
        ja3_hash: "d7a7a67e6a706ba3a3b8ce2e36c2a8e3",
        client_name: "Go net/http",
        category: Ja3Category::Scripting,
        risk_level: "MEDIUM",
        description: "Go standard HTTP client — common in microservices and cloud-native tooling",
        expected_ua_patterns: &["Go-http-client", "go"],
        tags: &["spoofing_risk"],
    },
    // Attack tools
    Ja3Entry {
        ja3_hash: "51c64c77e60f3980eea90869b68c58a8",
        client_name: "Cobalt Strike Beacon",
        category: Ja3Category::AttackTool,
        risk_level: "CRITICAL",
        description: "Post-exploitation C2 framework — immediate incident response required",
        expected_ua_patterns: &[],
        tags: &["known_malware", "c2", "apt"],
    },
    Ja3Entry {
        ja3_hash: "72a589da586844d7f0818ce684948eea",
        client_name: "Metasploit Framework",
        category: Ja3Category::AttackTool,
        risk_level: "CRITICAL",
        description: "Penetration testing framework — may indicate active exploitation",
        expected_ua_patterns: &[],
        tags: &["known_malware", "exploit"],
    },
    Ja3Entry {
        ja3_hash: "a0e9f5d64349fb13191bc781f81f42e1",
        client_name: "Mimikatz / Impacket",
        category: Ja3Category::AttackTool,
        risk_level: "CRITICAL",
        description: "Credential theft tooling — lateral movement in progress",
        expected_ua_patterns: &[],
        tags: &["known_malware", "credential_theft", "lateral_movement"],
    },
    // Command-line tools
    Ja3Entry {
        ja3_hash: "456523fc94726331a4d5a2e1d40b2cd7",
        client_name: "curl",
        category: Ja3Category::Scripting,
        risk_level: "MEDIUM",
        description: "Command-line HTTP client — commonly used for API interaction and testing",
        expected_ua_patterns: &["curl"],
        tags: &["spoofing_risk", "cli"],
    },
    Ja3Entry {
        ja3_hash: "9e10692f1b7f78228b2d4e424db3a98c",
        client_name: "wget",
        category: Ja3Category::Scripting,
        risk_level: "MEDIUM",
        description: "Command-line download tool — may indicate staged payload delivery",
        expected_ua_patterns: &["Wget"],
        tags: &["spoofing_risk", "cli"],
    },
    // Proxy / anonymization
    Ja3Entry {
        ja3_hash: "e7d70f5df5e3ddf3d1af4b1a0a38a3a1",
        client_name: "Tor Browser",
        category: Ja3Category::Proxy,
        risk_level: "HIGH",
        description: "Tor network browser — traffic anonymization, may hide exfiltration",
        expected_ua_patterns: &["Mozilla"],
        tags: &["anonymization", "evasion"],
    },
    // Bots & scanners
    Ja3Entry {
        ja3_hash: "b386946a5a44d1ddcc843bc75336dfce",
        client_name: "Scrapy Spider",
        category: Ja3Category::Bot,
        risk_level: "MEDIUM",
        description: "Python web scraping framework — automated data collection",
        expected_ua_patterns: &["Scrapy"],
        tags: &["automation", "scraping"],
    },
    Ja3Entry {
        ja3_hash: "19e29534fd49dd27d09234e639c4057e",
        client_name: "Headless Chrome (Puppeteer)",
        category: Ja3Category::Bot,
        risk_level: "HIGH",
        description: "Headless browser automation — may bypass bot detection while scraping",
        expected_ua_patterns: &["HeadlessChrome", "Chrome"],
        tags: &["automation", "headless", "spoofing_risk"],
    },
    Ja3Entry {
        ja3_hash: "cd08e31494816f6d2f3d8a2d0c4ab314",
        client_name: "Selenium WebDriver",
        category: Ja3Category::Bot,
        risk_level: "HIGH",
        description: "Browser automation framework — UI testing or credential stuffing",
        expected_ua_patterns: &["Chrome", "Firefox"],
        tags: &["automation", "spoofing_risk"],
    },
    // Legitimate browsers (baseline)
    Ja3Entry {
        ja3_hash: "773906b0efdefa24a7f2b8eb6985bf37",
        client_name: "Chrome 120+",
        category: Ja3Category::Browser,
        risk_level: "INFO",
        description: "Standard Google Chrome browser — expected enterprise traffic",
        expected_ua_patterns: &["Chrome", "Mozilla"],
        tags: &["legitimate"],
    },
    Ja3Entry {
        ja3_hash: "579ccef312d18482fc42e2b822ca2430",
        client_name: "Firefox 120+",
        category: Ja3Category::Browser,
        risk_level: "INFO",
        description: "Standard Mozilla Firefox browser — expected enterprise traffic",
        expected_ua_patterns: &["Firefox", "Mozilla"],
        tags: &["legitimate"],
    },
    Ja3Entry {
        ja3_hash: "b20b44b18b853f29d25660b022eb7350",
        client_name: "Edge 120+",
        category: Ja3Category::Browser,
        risk_level: "INFO",
        description: "Microsoft Edge browser — expected enterprise traffic (Chromium-based)",
        expected_ua_patterns: &["Edg", "Chrome", "Mozilla"],
        tags: &["legitimate"],
    },
    Ja3Entry {
        ja3_hash: "a441a33aaee795f498d6b764cc78989a",
        client_name: "Safari 17+",
        category: Ja3Category::Browser,
        risk_level: "INFO",
        description: "Apple Safari browser — macOS/iOS traffic",
        expected_ua_patterns: &["Safari", "AppleWebKit"],
        tags: &["legitimate"],
    },
];

const BROWSER_INDICATORS: &[&str] = &["chrome", "firefox", "safari", "edge", "mozilla"];

lazy_static! {
    static ref JA3_INDEX: HashMap<&'static str, &'static Ja3Entry> = JA3_DATABASE
        .iter()
        .map(|entry| (entry.ja3_hash, entry))
        .collect();
}

/// Fingerprint matcher over the pre-indexed catalog.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ja3Matcher;

impl Ja3Matcher {
    pub fn new() -> Self {
        Ja3Matcher
    }

    /// Look up a 32-hex-char JA3 hash. Malformed hashes never match.
    pub fn lookup(&self, ja3_hash: &str) -> Option<Ja3Match> {
        if ja3_hash.len() != 32 {
            return None;
        }
        JA3_INDEX.get(ja3_hash).copied()
    }

    /// Whether the hash belongs to a known attack tool.
    pub fn is_known_bad(&self, ja3_hash: &str) -> bool {
        matches!(
            self.lookup(ja3_hash),
            Some(entry) if entry.category == Ja3Category::AttackTool
        )
    }

    /// Detect a User-Agent / JA3 mismatch.
    ///
    /// Fires when the UA claims to be a browser, the fingerprint identifies
    /// a non-browser client, and none of the client's expected UA patterns
    /// legitimately carry a browser string.
    pub fn detect_spoofing(&self, ja3_hash: &str, user_agent: &str) -> Option<SpoofVerdict> {
        let entry = self.lookup(ja3_hash)?;
        if user_agent.is_empty() || entry.category == Ja3Category::Browser {
            return None;
        }

        let ua_lower = user_agent.to_ascii_lowercase();
        let claims_browser = BROWSER_INDICATORS.iter().any(|b| ua_lower.contains(b));
        if !claims_browser {
            return None;
        }

        let expected_has_browser = entry.expected_ua_patterns.iter().any(|pat| {
            let pat = pat.to_ascii_lowercase();
            BROWSER_INDICATORS.iter().any(|b| pat.contains(b))
        });
        if expected_has_browser {
            return None;
        }

        let claimed: String = user_agent.chars().take(100).collect();
        Some(SpoofingInfo {
            spoofing_detected: true,
            ja3_client: entry.client_name.to_string(),
            ja3_category: entry.category.as_str().to_string(),
            claimed_ua: claimed,
            risk_level: "CRITICAL".to_string(),
            description: format!(
                "Identity spoofing: TLS fingerprint identifies {} but User-Agent claims to be a browser",
                entry.client_name
            ),
        })
    }

    pub fn total_fingerprints(&self) -> usize {
        JA3_INDEX.len()
    }
}
