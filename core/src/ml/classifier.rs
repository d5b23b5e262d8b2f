//! Supervised traffic classification.
//!
//! Classes: `normal`, `suspicious`, `shadow_ai`. The label list is carried
//! here as an explicit constant next to the scorers; probability vectors are
//! always index-aligned with [`LABELS`], never with an implicit
//! training-time ordering.

use log::warn;
use ndarray::ArrayView1;

use super::features::FEATURE_COUNT;

/// Class labels, in canonical order.
pub const LABELS: [&str; 3] = ["normal", "suspicious", "shadow_ai"];

/// One classification verdict. `probabilities[i]` belongs to `LABELS[i]`;
/// `confidence` is the probability of the predicted label.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: &'static str,
    pub confidence: f32,
    pub probabilities: [f32; 3],
}

impl Classification {
    fn from_probabilities(probabilities: [f32; 3]) -> Self {
        let (best, _) = probabilities
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap_or((0, &0.0));
        Classification {
            label: LABELS[best],
            confidence: probabilities[best],
            probabilities,
        }
    }
}

pub trait TrafficScorer: Send + Sync {
    fn predict(&self, features: ArrayView1<'_, f32>) -> Classification;
}

/// Rule-based fallback classifier over the shared feature vector.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleBasedClassifier;

impl TrafficScorer for RuleBasedClassifier {
    fn predict(&self, features: ArrayView1<'_, f32>) -> Classification {
        if features.len() < 10 {
            return Classification::from_probabilities([0.8, 0.1, 0.1]);
        }
        let is_external = features[6] < 0.5;
        let has_hostname = features[9] > 0.5;
        // ln(bytes) > 8 is roughly a 3 KB+ payload.
        let large_payload = features[2] > 8.0;
        let well_known_port = features[7] > 0.5;

        let probabilities = if is_external && has_hostname && large_payload {
            [0.05, 0.20, 0.75]
        } else if is_external && !well_known_port {
            [0.15, 0.75, 0.10]
        } else {
            [0.80, 0.15, 0.05]
        };
        Classification::from_probabilities(probabilities)
    }
}

/// Classifier holder with dimensional-mismatch degradation.
pub struct ClassifierModel {
    scorer: Option<Box<dyn TrafficScorer>>,
    expected: usize,
    fallback: RuleBasedClassifier,
}

impl ClassifierModel {
    pub fn rule_based() -> Self {
        ClassifierModel {
            scorer: None,
            expected: FEATURE_COUNT,
            fallback: RuleBasedClassifier,
        }
    }

    pub fn with_scorer(scorer: Box<dyn TrafficScorer>, expected: usize) -> Self {
        ClassifierModel {
            scorer: Some(scorer),
            expected,
            fallback: RuleBasedClassifier,
        }
    }

    pub fn predict(&self, features: ArrayView1<'_, f32>) -> Classification {
        match &self.scorer {
            Some(scorer) if features.len() == self.expected => scorer.predict(features),
            Some(_) => {
                warn!(
                    "classifier expects {} features, got {}; using rule-based fallback",
                    self.expected,
                    features.len()
                );
                self.fallback.predict(features)
            }
            None => self.fallback.predict(features),
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array1;

    use super::*;

    fn base() -> Array1<f32> {
        Array1::zeros(FEATURE_COUNT)
    }

    #[test]
    fn external_hostname_large_payload_is_shadow_ai() {
        let mut f = base();
        f[2] = 9.5; // ~13 KB sent
        f[6] = 0.0; // external dst
        f[9] = 1.0; // hostname present
        let verdict = ClassifierModel::rule_based().predict(f.view());
        assert_eq!(verdict.label, "shadow_ai");
        assert!(verdict.confidence > 0.7);
    }

    #[test]
    fn external_odd_port_is_suspicious() {
        let mut f = base();
        f[6] = 0.0;
        f[7] = 0.0;
        let verdict = ClassifierModel::rule_based().predict(f.view());
        assert_eq!(verdict.label, "suspicious");
    }

    #[test]
    fn internal_traffic_is_normal() {
        let mut f = base();
        f[6] = 1.0;
        f[7] = 1.0;
        let verdict = ClassifierModel::rule_based().predict(f.view());
        assert_eq!(verdict.label, "normal");
    }

    #[test]
    fn probabilities_align_with_labels() {
        let verdict = Classification::from_probabilities([0.1, 0.2, 0.7]);
        assert_eq!(verdict.label, "shadow_ai");
        assert!((verdict.confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn probabilities_sum_to_one() {
        for f in [base(), {
            let mut f = base();
            f[6] = 0.0;
            f[7] = 0.0;
            f
        }] {
            let verdict = ClassifierModel::rule_based().predict(f.view());
            let sum: f32 = verdict.probabilities.iter().sum();
            assert!((sum - 1.0).abs() < 1e-6);
        }
    }
}
