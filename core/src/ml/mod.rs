//! ML-powered flow analysis: feature extraction, anomaly scoring, and
//! classification, combined into one verdict per flow.

pub mod anomaly;
pub mod classifier;
pub mod features;

use crate::events::{FlowEvent, Severity};

pub use anomaly::{AnomalyModel, AnomalyScorer, ANOMALY_THRESHOLD};
pub use classifier::{Classification, ClassifierModel, TrafficScorer, LABELS};
pub use features::{FeatureExtractor, FEATURE_COUNT, FEATURE_NAMES};

/// Combined model output for one flow.
#[derive(Debug, Clone)]
pub struct MlVerdict {
    pub is_anomalous: bool,
    pub anomaly_score: f32,
    pub classification: &'static str,
    pub confidence: f32,
    pub risk_score: f32,
    pub reasons: Vec<String>,
}

/// Both scorers over the shared feature vector.
pub struct IntelligenceEngine {
    extractor: FeatureExtractor,
    anomaly: AnomalyModel,
    classifier: ClassifierModel,
}

impl Default for IntelligenceEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl IntelligenceEngine {
    /// Engine with the built-in heuristic scorers.
    pub fn new() -> Self {
        IntelligenceEngine {
            extractor: FeatureExtractor::new(),
            anomaly: AnomalyModel::heuristic(),
            classifier: ClassifierModel::rule_based(),
        }
    }

    pub fn with_models(anomaly: AnomalyModel, classifier: ClassifierModel) -> Self {
        IntelligenceEngine {
            extractor: FeatureExtractor::new(),
            anomaly,
            classifier,
        }
    }

    pub fn analyze(&self, event: &FlowEvent) -> MlVerdict {
        let features = self.extractor.extract(event);

        let anomaly_score = self.anomaly.score(features.view());
        let is_anomalous = anomaly_score < ANOMALY_THRESHOLD;
        let classification = self.classifier.predict(features.view());

        let mut risk_score: f32 = 0.0;
        let mut reasons = Vec::new();

        match classification.label {
            "shadow_ai" => {
                risk_score = if classification.confidence > 0.8 { 0.9 } else { 0.7 };
                reasons.push(format!(
                    "Classified as Shadow AI ({:.0}% confidence)",
                    classification.confidence * 100.0
                ));
            }
            "suspicious" => {
                risk_score = 0.6;
                reasons.push("Suspicious traffic pattern".to_string());
            }
            _ => {}
        }

        if is_anomalous {
            risk_score = risk_score.max(0.5);
            let grade = if anomaly_score < -0.4 { "High" } else { "Medium" };
            reasons.push(format!(
                "{} Anomaly detected (score: {:.2})",
                grade, anomaly_score
            ));
        }

        MlVerdict {
            is_anomalous,
            anomaly_score,
            classification: classification.label,
            confidence: classification.confidence,
            risk_score,
            reasons,
        }
    }
}

/// Escalation semantics applied when rule detection came back clean.
///
/// A verdict never downgrades an existing rule hit; the analyzer only calls
/// this when no plugin fired.
pub fn escalation(verdict: &MlVerdict) -> Option<(Severity, String)> {
    if verdict.classification == "shadow_ai" && verdict.confidence > 0.70 {
        return Some((
            Severity::High,
            format!(
                "ML detected Shadow AI ({:.0}% confidence)",
                verdict.confidence * 100.0
            ),
        ));
    }
    if verdict.classification == "suspicious" && verdict.confidence > 0.80 {
        return Some((
            Severity::Medium,
            format!(
                "ML flagged suspicious traffic ({:.0}% confidence)",
                verdict.confidence * 100.0
            ),
        ));
    }
    if verdict.is_anomalous {
        return Some((
            Severity::Low,
            format!("Anomaly detected (score: {:.2})", verdict.anomaly_score),
        ));
    }
    None
}
