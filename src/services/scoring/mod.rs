// Scoring Module
// Fraud and trust scoring core organized into specialized submodules:
// - registry: Calibrated (likelihood, strength) table per evidence signal
// - evidence: Adapts detector outputs into evidence signals
// - bayesian: Damped sequential Bayesian fusion of observed signals
// - baseline: Per-survey behavioral baselines and deviation detection
// - risk: Risk classification and the tiered threshold policy
// - heuristics: Local quality, timezone and behavioral heuristics
// - checks: Per-tier local heuristic checks
// - tiers: Check catalog and tier bundles
// - reporter: Human-readable summaries, recommendations and evidence buckets
// - orchestrator: Tiered dispatch with per-collaborator failure isolation

pub mod registry;
pub mod evidence;
pub mod bayesian;
pub mod baseline;
pub mod risk;
pub mod heuristics;
pub mod checks;
pub mod tiers;
pub mod reporter;
pub mod orchestrator;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

// Re-export commonly used items
pub use registry::{Calibration, EvidenceRegistry};
pub use evidence::{build_evidence_signals, DetectionResults, EvidenceSignal};
pub use bayesian::{calculate_fraud_probability, BayesianResult};
pub use baseline::{
    build_baseline, compare_to_baseline, update_baseline_incremental, BaselineOptions,
    BaselineProfile, BaselineService, BaselineStore, DeviationAnalysis, FileBaselineStore,
    HistoricalResponse, MemoryBaselineStore,
};
pub use risk::{determine_risk_level, threshold_recommendation, validate_thresholds};
pub use tiers::{checks_for_tier, CheckCategory, CheckDefinition, CheckSource};
pub use reporter::CollectedEvidence;
pub use orchestrator::ScoringEngine;
