// Risk Classification
// Maps (probability, confidence) to a risk level and applies the tiered threshold policy

use super::{EngineError, EngineResult};
use crate::models::{Recommendation, RiskLevel, Thresholds};

/// Classify a fused fraud probability.
///
/// A high probability backed by little evidence is downgraded to medium
/// before the high band is considered, so thin evidence never reads as high risk.
pub fn determine_risk_level(probability: f64, confidence: f64) -> RiskLevel {
    if probability >= 0.85 && confidence >= 0.7 {
        RiskLevel::Critical
    } else if probability >= 0.6 && confidence < 0.7 {
        RiskLevel::Medium
    } else if probability >= 0.6 || (probability >= 0.5 && confidence >= 0.8) {
        RiskLevel::High
    } else if probability >= 0.4 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

pub fn is_likely_fraud(level: RiskLevel) -> bool {
    matches!(level, RiskLevel::High | RiskLevel::Critical)
}

/// Both bounds in [0, 1] with `fail <= review`.
pub fn validate_thresholds(thresholds: &Thresholds) -> EngineResult<()> {
    let in_range = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
    if !in_range(thresholds.fail) || !in_range(thresholds.review) {
        return Err(EngineError::Validation(format!(
            "Thresholds must lie in [0, 1], got fail={} review={}",
            thresholds.fail, thresholds.review
        )));
    }
    if thresholds.fail > thresholds.review {
        return Err(EngineError::Validation(format!(
            "Fail threshold {} exceeds review threshold {}",
            thresholds.fail, thresholds.review
        )));
    }
    Ok(())
}

/// Quality score against the caller's thresholds: `(passed, recommendation)`.
pub fn threshold_recommendation(score: f64, thresholds: &Thresholds) -> (bool, Recommendation) {
    let passed = score >= thresholds.fail;
    let recommendation = if score >= thresholds.review {
        Recommendation::Keep
    } else if score >= thresholds.fail {
        Recommendation::Review
    } else {
        Recommendation::Discard
    };
    (passed, recommendation)
}
