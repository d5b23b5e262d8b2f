//! Unsupervised anomaly scoring.
//!
//! The scorer contract: a scalar in `[-1, 0]` where lower is more anomalous,
//! with [`ANOMALY_THRESHOLD`] as the alerting cut-off. A trained forest can
//! be plugged in behind [`AnomalyModel`]; the built-in implementation is the
//! statistical-outlier heuristic, which is also the fallback whenever a
//! plugged-in scorer disagrees with the extractor about dimensionality.

use log::warn;
use ndarray::ArrayView1;

use super::features::FEATURE_COUNT;

/// Scores below this are anomalous.
pub const ANOMALY_THRESHOLD: f32 = -0.2;

pub trait AnomalyScorer: Send + Sync {
    /// Score in `[-1, 0]`; lower is more anomalous.
    fn score(&self, features: ArrayView1<'_, f32>) -> f32;
}

/// Statistical-outlier heuristic over byte volume, destination externality,
/// and port familiarity.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicAnomalyScorer;

impl AnomalyScorer for HeuristicAnomalyScorer {
    fn score(&self, features: ArrayView1<'_, f32>) -> f32 {
        if features.len() < 8 {
            return 0.0;
        }
        let byte_score = features[2] + features[3];
        let is_external = 1.0 - features[6];
        let unusual_port = 1.0 - features[7];
        let risk = byte_score * 0.3 + is_external * 0.4 + unusual_port * 0.3;
        (-risk / 10.0).clamp(-1.0, 0.0)
    }
}

/// Scorer holder with dimensional-mismatch degradation.
pub struct AnomalyModel {
    scorer: Option<Box<dyn AnomalyScorer>>,
    expected: usize,
    fallback: HeuristicAnomalyScorer,
}

impl AnomalyModel {
    /// The heuristic-only model.
    pub fn heuristic() -> Self {
        AnomalyModel {
            scorer: None,
            expected: FEATURE_COUNT,
            fallback: HeuristicAnomalyScorer,
        }
    }

    /// Wrap a trained scorer that expects `expected` input dimensions.
    pub fn with_scorer(scorer: Box<dyn AnomalyScorer>, expected: usize) -> Self {
        AnomalyModel {
            scorer: Some(scorer),
            expected,
            fallback: HeuristicAnomalyScorer,
        }
    }

    pub fn score(&self, features: ArrayView1<'_, f32>) -> f32 {
        match &self.scorer {
            Some(scorer) if features.len() == self.expected => scorer.score(features),
            Some(_) => {
                warn!(
                    "anomaly scorer expects {} features, got {}; using heuristic fallback",
                    self.expected,
                    features.len()
                );
                self.fallback.score(features)
            }
            None => self.fallback.score(features),
        }
    }

    pub fn is_anomalous(&self, features: ArrayView1<'_, f32>) -> bool {
        self.score(features) < ANOMALY_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array1;

    use super::*;

    fn quiet_flow() -> Array1<f32> {
        // Small internal flow on a well-known port.
        let mut f = Array1::zeros(FEATURE_COUNT);
        f[2] = 2.0;
        f[6] = 1.0;
        f[7] = 1.0;
        f
    }

    fn loud_flow() -> Array1<f32> {
        // Large upload to an external host on an odd port.
        let mut f = Array1::zeros(FEATURE_COUNT);
        f[2] = 13.0;
        f[3] = 8.0;
        f[6] = 0.0;
        f[7] = 0.0;
        f
    }

    #[test]
    fn scores_stay_in_range() {
        let model = AnomalyModel::heuristic();
        for flow in [quiet_flow(), loud_flow()] {
            let score = model.score(flow.view());
            assert!((-1.0..=0.0).contains(&score));
        }
    }

    #[test]
    fn loud_flows_score_lower() {
        let model = AnomalyModel::heuristic();
        assert!(model.score(loud_flow().view()) < model.score(quiet_flow().view()));
        assert!(model.is_anomalous(loud_flow().view()));
        assert!(!model.is_anomalous(quiet_flow().view()));
    }

    #[test]
    fn dimension_mismatch_degrades_to_heuristic() {
        struct Paranoid;
        impl AnomalyScorer for Paranoid {
            fn score(&self, _: ArrayView1<'_, f32>) -> f32 {
                -1.0
            }
        }

        // Scorer trained on a 20-dim vector must not see our 16-dim input.
        let model = AnomalyModel::with_scorer(Box::new(Paranoid), 20);
        let heuristic = AnomalyModel::heuristic();
        let flow = quiet_flow();
        assert_eq!(model.score(flow.view()), heuristic.score(flow.view()));
    }
}
