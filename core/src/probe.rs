//! Active interrogation of suspicious destinations.
//!
//! A sequenced probe confirms whether a flagged destination is really an AI
//! API: first an HTTPS `OPTIONS /` looking for characteristic headers, then
//! (if inconclusive) GETs against common AI API paths. Two or more
//! independent indicators confirm the service.
//!
//! Safety guards: internal, loopback, and reserved addresses are never
//! probed; a sliding-window rate limit bounds probes per minute; each target
//! has a cooldown. Certificate verification is off so self-signed endpoints
//! still answer, and every probe failure is non-fatal, reported inside the
//! alert enrichment instead.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::ProbeConfig;

/// Paths that OpenAI-compatible, Ollama, and Anthropic-style APIs answer.
const AI_PROBE_PATHS: [&str; 5] = [
    "/v1/models",
    "/v1/chat/completions",
    "/api/generate",
    "/api/tags",
    "/v1/complete",
];

/// Header substrings that indicate an AI service front end.
const AI_RESPONSE_INDICATORS: [&str; 5] = [
    "openai",
    "anthropic",
    "x-request-id",
    "x-ratelimit-limit",
    "cf-ray",
];

/// Body keywords counted when a probe path returns JSON.
const AI_BODY_KEYWORDS: [&str; 7] = [
    "model",
    "gpt",
    "claude",
    "llama",
    "completion",
    "embedding",
    "token",
];

/// Headers copied into the report when present.
const HEADERS_OF_INTEREST: [&str; 5] = [
    "x-request-id",
    "x-ratelimit-limit",
    "x-ratelimit-remaining",
    "access-control-allow-methods",
    "access-control-allow-origin",
];

/// Indicators required to declare "confirmed AI".
const CONFIRMATION_QUORUM: usize = 2;

/// One probe stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeAttempt {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub headers_of_interest: HashMap<String, String>,
    pub is_ai_service: bool,
    pub ai_indicators: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Full interrogation outcome, embedded in `alert.active_probe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeReport {
    pub target: String,
    pub timestamp: DateTime<Utc>,
    pub confirmed_ai: bool,
    /// Set when the interrogation was denied before any request went out
    /// (disabled, unsafe target, rate limit, or cooldown).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options_probe: Option<ProbeAttempt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_probe: Option<ProbeAttempt>,
}

impl ProbeReport {
    fn denied(target: &str, reason: String) -> Self {
        ProbeReport {
            target: target.to_string(),
            timestamp: Utc::now(),
            confirmed_ai: false,
            skipped: Some(true),
            reason: Some(reason),
            options_probe: None,
            ai_probe: None,
        }
    }
}

#[derive(Default)]
struct ProbeState {
    /// Sliding one-minute window of probe admissions.
    window: Vec<Instant>,
    /// Last probe instant per target.
    cooldowns: HashMap<String, Instant>,
}

pub struct ActiveProbe {
    enabled: bool,
    max_per_minute: usize,
    cooldown: Duration,
    client: Option<reqwest::Client>,
    state: Mutex<ProbeState>,
}

impl ActiveProbe {
    pub fn new(config: &ProbeConfig) -> Self {
        let client = if config.enabled {
            reqwest::Client::builder()
                .timeout(Duration::from_secs_f64(config.timeout_s))
                .danger_accept_invalid_certs(true)
                .build()
                .ok()
        } else {
            None
        };
        if client.is_some() {
            info!(
                "active interrogation armed (rate: {}/min, cooldown: {}s)",
                config.max_per_minute, config.cooldown_s
            );
        }
        ActiveProbe {
            enabled: config.enabled && client.is_some(),
            max_per_minute: config.max_per_minute,
            cooldown: Duration::from_secs_f64(config.cooldown_s),
            client,
            state: Mutex::new(ProbeState::default()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Pre-flight admission: one check covers the whole interrogation
    /// sequence, recording both the rate-limit slot and the cooldown.
    fn admit(&self, target: &str) -> Result<(), String> {
        if !self.enabled {
            return Err("active interrogation is disabled".to_string());
        }
        if is_unsafe_target(target) {
            return Err(format!("safety guard: {} is an internal address", target));
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        state
            .window
            .retain(|t| now.duration_since(*t) < Duration::from_secs(60));
        if state.window.len() >= self.max_per_minute {
            return Err("probe rate limit exceeded".to_string());
        }
        if let Some(last) = state.cooldowns.get(target) {
            if now.duration_since(*last) < self.cooldown {
                return Err(format!("target {} is on cooldown", target));
            }
        }
        state.window.push(now);
        state.cooldowns.insert(target.to_string(), now);
        Ok(())
    }

    /// Run the full interrogation sequence against a host or IP.
    pub async fn interrogate(&self, target: &str) -> ProbeReport {
        if let Err(reason) = self.admit(target) {
            debug!("probe denied for {}: {}", target, reason);
            return ProbeReport::denied(target, reason);
        }
        // admit() only passes while the client exists.
        let client = match &self.client {
            Some(client) => client.clone(),
            None => return ProbeReport::denied(target, "probe client unavailable".to_string()),
        };

        let options_probe = self.probe_options(&client, target).await;
        let mut confirmed = options_probe.is_ai_service;

        let ai_probe = if confirmed {
            None
        } else {
            let attempt = self.probe_ai_endpoints(&client, target).await;
            confirmed = attempt.is_ai_service;
            Some(attempt)
        };

        info!(
            "probe [{}] {}",
            target,
            if confirmed { "CONFIRMED AI" } else { "inconclusive" }
        );

        ProbeReport {
            target: target.to_string(),
            timestamp: Utc::now(),
            confirmed_ai: confirmed,
            skipped: None,
            reason: None,
            options_probe: Some(options_probe),
            ai_probe,
        }
    }

    /// `OPTIONS /`: the lightest probe, header inspection only.
    async fn probe_options(&self, client: &reqwest::Client, target: &str) -> ProbeAttempt {
        let url = format!("https://{}", target);
        let response = match client.request(reqwest::Method::OPTIONS, &url).send().await {
            Ok(response) => response,
            Err(err) => {
                debug!("probe [{}] OPTIONS failed: {}", target, err);
                return failed_attempt(err);
            }
        };

        let status = response.status().as_u16();
        let mut headers_of_interest = HashMap::new();
        let mut header_blob = String::new();
        let server = response
            .headers()
            .get("server")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        for (name, value) in response.headers() {
            let name = name.as_str().to_ascii_lowercase();
            let value = value.to_str().unwrap_or("").to_string();
            if HEADERS_OF_INTEREST.contains(&name.as_str()) {
                headers_of_interest.insert(name.clone(), value.clone());
            }
            header_blob.push_str(&name);
            header_blob.push(':');
            header_blob.push_str(&value.to_ascii_lowercase());
            header_blob.push('\n');
        }

        let ai_indicators: Vec<String> = AI_RESPONSE_INDICATORS
            .iter()
            .filter(|ind| header_blob.contains(*ind))
            .map(|ind| ind.to_string())
            .collect();
        let is_ai = ai_indicators.len() >= CONFIRMATION_QUORUM;

        debug!(
            "probe [{}] OPTIONS -> {} ({} AI indicators)",
            target,
            status,
            ai_indicators.len()
        );
        ProbeAttempt {
            success: true,
            status_code: Some(status),
            server,
            headers_of_interest,
            is_ai_service: is_ai,
            ai_indicators,
            error: None,
        }
    }

    /// GET the well-known AI API paths and count indicators.
    async fn probe_ai_endpoints(&self, client: &reqwest::Client, target: &str) -> ProbeAttempt {
        let mut ai_indicators = Vec::new();
        let mut headers_of_interest = HashMap::new();
        let mut best_status = None;
        let mut any_response = false;

        for path in AI_PROBE_PATHS {
            let url = format!("https://{}{}", target, path);
            let response = match client.get(&url).send().await {
                Ok(response) => response,
                // Individual path failures are fine.
                Err(_) => continue,
            };
            any_response = true;
            let status = response.status().as_u16();
            best_status = Some(status);

            for key in ["x-request-id", "x-ratelimit-limit", "server"] {
                if let Some(value) = response.headers().get(key).and_then(|v| v.to_str().ok()) {
                    headers_of_interest
                        .entry(key.to_string())
                        .or_insert_with(|| value.to_string());
                }
            }

            // 401/403 on an AI path: the API exists but wants auth.
            if status == 401 || status == 403 {
                ai_indicators.push(format!("auth_required:{}", path));
                continue;
            }
            if status == 200 {
                let is_json = response
                    .headers()
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.contains("json"))
                    .unwrap_or(false);
                if is_json {
                    ai_indicators.push(format!("json_api:{}", path));
                    if let Ok(body) = response.text().await {
                        let body: String = body.chars().take(500).collect::<String>().to_lowercase();
                        for keyword in AI_BODY_KEYWORDS {
                            if body.contains(keyword) {
                                ai_indicators.push(format!("keyword:{}", keyword));
                            }
                        }
                    }
                }
            }
        }

        let is_ai = ai_indicators.len() >= CONFIRMATION_QUORUM;
        ProbeAttempt {
            success: any_response,
            status_code: best_status,
            server: None,
            headers_of_interest,
            is_ai_service: is_ai,
            ai_indicators,
            error: if any_response {
                None
            } else {
                Some("no probe path answered".to_string())
            },
        }
    }
}

fn failed_attempt(err: reqwest::Error) -> ProbeAttempt {
    let mut message = err.to_string();
    message.truncate(100);
    ProbeAttempt {
        success: false,
        status_code: None,
        server: None,
        headers_of_interest: HashMap::new(),
        is_ai_service: false,
        ai_indicators: Vec::new(),
        error: Some(message),
    }
}

/// Never probe internal, loopback, link-local, multicast, or broadcast
/// addresses. Hostnames are assumed external.
fn is_unsafe_target(target: &str) -> bool {
    match target.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_broadcast()
        }
        Ok(IpAddr::V6(v6)) => v6.is_loopback() || v6.is_multicast(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(enabled: bool, max_per_minute: usize) -> ActiveProbe {
        ActiveProbe::new(&ProbeConfig {
            enabled,
            max_per_minute,
            cooldown_s: 300.0,
            timeout_s: 1.0,
        })
    }

    #[test]
    fn unsafe_targets() {
        assert!(is_unsafe_target("192.168.1.10"));
        assert!(is_unsafe_target("10.0.0.5"));
        assert!(is_unsafe_target("127.0.0.1"));
        assert!(is_unsafe_target("169.254.1.1"));
        assert!(is_unsafe_target("224.0.0.251"));
        assert!(!is_unsafe_target("13.107.42.14"));
        assert!(!is_unsafe_target("api.openai.com"));
    }

    #[tokio::test]
    async fn disabled_probe_is_skipped() {
        let probe = probe(false, 10);
        let report = probe.interrogate("api.example.com").await;
        assert_eq!(report.skipped, Some(true));
        assert!(!report.confirmed_ai);
        assert!(report.options_probe.is_none());
    }

    #[tokio::test]
    async fn internal_target_is_never_probed() {
        let probe = probe(true, 10);
        let report = probe.interrogate("192.168.1.40").await;
        assert_eq!(report.skipped, Some(true));
        assert!(report.reason.unwrap().contains("safety guard"));
    }

    #[test]
    fn rate_limit_and_cooldown() {
        let probe = probe(true, 2);
        assert!(probe.admit("a.example").is_ok());
        assert!(probe.admit("b.example").is_ok());
        // Window is full.
        let err = probe.admit("c.example").unwrap_err();
        assert!(err.contains("rate limit"));
        // Re-probing an admitted target is denied by cooldown even after
        // the rate window drains.
        let err = probe.admit("a.example").unwrap_err();
        assert!(err.contains("rate limit") || err.contains("cooldown"));
    }

    #[test]
    fn cooldown_applies_per_target() {
        let probe = probe(true, 10);
        assert!(probe.admit("a.example").is_ok());
        let err = probe.admit("a.example").unwrap_err();
        assert!(err.contains("cooldown"));
        assert!(probe.admit("b.example").is_ok());
    }
}
