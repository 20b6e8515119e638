// Bayesian Fraud Estimator
// Damped sequential fusion of observed evidence into a fraud probability

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::evidence::EvidenceSignal;
use crate::services::stats::{safe_div, wilson_interval, Interval, Z_95};

pub const DEFAULT_PRIOR_FRAUD_RATE: f64 = 0.15;

/// Synthetic trials per observed signal for the Wilson interval.
/// A heuristic carried over for parity, not a derived sample size.
const SYNTHETIC_TRIALS_PER_SIGNAL: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BayesianResult {
    pub fraud_probability: f64,
    pub confidence: f64,
    pub confidence_interval: Interval,
    pub evidence_count: usize,
    pub prior_probability: f64,
}

/// Fuse `signals` in list order starting from `prior`.
///
/// Each observed signal applies Bayes' rule with P(E|not F) approximated as
/// `1 - likelihood`, then blends the posterior into the running estimate by
/// the signal's strength. Unobserved signals are skipped and never count as
/// evidence of innocence. A zero evidence denominator skips the update.
pub fn calculate_fraud_probability(signals: &[EvidenceSignal], prior: f64) -> BayesianResult {
    let mut current = prior;
    let mut evidence_count = 0usize;

    for signal in signals.iter().filter(|s| s.observed) {
        evidence_count += 1;

        let p_e_given_f = signal.likelihood;
        let p_e_given_not_f = 1.0 - p_e_given_f;
        let p_e = p_e_given_f * current + p_e_given_not_f * (1.0 - current);
        if p_e == 0.0 {
            continue;
        }

        let posterior = (p_e_given_f * current) / p_e;
        current = current * (1.0 - signal.strength) + posterior * signal.strength;
        current = current.clamp(0.0, 1.0);
    }

    let confidence = evidence_confidence(evidence_count, signals.len());
    let confidence_interval = wilson_interval(
        current,
        evidence_count as f64 * SYNTHETIC_TRIALS_PER_SIGNAL,
        Z_95,
    );

    debug!(
        "[BAYES] {} of {} signals observed, p={:.4} conf={:.3}",
        evidence_count,
        signals.len(),
        current,
        confidence
    );

    BayesianResult {
        fraud_probability: current,
        confidence,
        confidence_interval,
        evidence_count,
        prior_probability: prior,
    }
}

/// `0.5 + 0.5 * log10(1 + 9 * observed / total)`, 0.5 when nothing could be evaluated.
pub fn evidence_confidence(observed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.5;
    }
    let ratio = safe_div(observed as f64, total as f64, 0.0);
    (0.5 + 0.5 * (1.0 + 9.0 * ratio).log10()).clamp(0.0, 1.0)
}
