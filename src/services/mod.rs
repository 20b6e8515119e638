// Cipher Core Services
// Configuration, collaborator contracts, statistics helpers and the scoring engine

pub mod config_store;
pub mod providers;
pub mod stats;
pub mod scoring;

pub use config_store::*;
pub use providers::*;

// Re-export scoring engine entry points
pub use scoring::{
    calculate_fraud_probability,
    checks_for_tier,
    determine_risk_level,
    BaselineService,
    EngineError,
    EngineResult,
    EvidenceRegistry,
    FileBaselineStore,
    MemoryBaselineStore,
    ScoringEngine,
};
