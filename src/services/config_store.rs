// Configuration Storage Service
// Handles engine config file read/write and version backup

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::Thresholds;
use crate::services::scoring::baseline::BaselineOptions;
use crate::services::scoring::bayesian::DEFAULT_PRIOR_FRAUD_RATE;
use crate::services::scoring::registry::{Calibration, EvidenceRegistry};
use crate::services::scoring::risk::validate_thresholds;
use crate::services::scoring::tiers::validate_tier;
use crate::services::scoring::{EngineError, EngineResult};

const BACKUPS_KEPT: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_prior")]
    pub prior_fraud_rate: f64,
    #[serde(default = "default_tier")]
    pub default_tier: u8,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub baseline: BaselineOptions,
    #[serde(default = "default_timeout_ms")]
    pub collaborator_timeout_ms: u64,
    /// Merged over the built-in evidence calibration table.
    #[serde(default)]
    pub evidence_overrides: HashMap<String, Calibration>,
    #[serde(default)]
    pub ip_reputation: IpReputationConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            prior_fraud_rate: DEFAULT_PRIOR_FRAUD_RATE,
            default_tier: default_tier(),
            thresholds: Thresholds::default(),
            baseline: BaselineOptions::default(),
            collaborator_timeout_ms: default_timeout_ms(),
            evidence_overrides: HashMap::new(),
            ip_reputation: IpReputationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IpReputationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_version() -> String { env!("CARGO_PKG_VERSION").to_string() }
fn default_prior() -> f64 { DEFAULT_PRIOR_FRAUD_RATE }
fn default_tier() -> u8 { 3 }
fn default_timeout_ms() -> u64 { 10_000 }

impl EngineConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if !(self.prior_fraud_rate > 0.0 && self.prior_fraud_rate < 1.0) {
            return Err(EngineError::Config(format!(
                "priorFraudRate must lie in (0, 1), got {}",
                self.prior_fraud_rate
            )));
        }
        validate_tier(self.default_tier).map_err(|e| EngineError::Config(e.to_string()))?;
        validate_thresholds(&self.thresholds).map_err(|e| EngineError::Config(e.to_string()))?;
        if self.collaborator_timeout_ms == 0 {
            return Err(EngineError::Config(
                "collaboratorTimeoutMs must be positive".to_string(),
            ));
        }
        if self.baseline.min_sample_size == 0 {
            return Err(EngineError::Config(
                "baseline.minSampleSize must be positive".to_string(),
            ));
        }
        for (name, calibration) in &self.evidence_overrides {
            calibration.validate(name)?;
        }
        Ok(())
    }

    /// Built-in calibration with this config's overrides applied.
    pub fn registry(&self) -> EngineResult<EvidenceRegistry> {
        EvidenceRegistry::standard().with_overrides(&self.evidence_overrides)
    }
}

pub struct ConfigStore {
    config_dir: PathBuf,
    config_file: PathBuf,
}

impl ConfigStore {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_file = config_dir.join("config.json");
        Self { config_dir, config_file }
    }

    /// Get default config directory
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cipher-trust"))
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Ensure config directory exists
    pub fn ensure_dir(&self) -> EngineResult<()> {
        fs::create_dir_all(&self.config_dir)
            .map_err(|e| EngineError::Storage(format!("Failed to create config dir: {}", e)))
    }

    /// Load configuration from file, falling back to defaults when absent
    pub fn load(&self) -> EngineResult<EngineConfig> {
        if !self.config_file.exists() {
            return Ok(EngineConfig::default());
        }

        let content = fs::read_to_string(&self.config_file)
            .map_err(|e| EngineError::Storage(format!("Failed to read config: {}", e)))?;

        let config: EngineConfig = serde_json::from_str(&content)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate and save configuration to file
    pub fn save(&self, config: &EngineConfig) -> EngineResult<()> {
        config.validate()?;
        self.ensure_dir()?;

        // Create backup if file exists
        if self.config_file.exists() {
            self.create_backup()?;
        }

        let content = serde_json::to_string_pretty(config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&self.config_file, content)
            .map_err(|e| EngineError::Storage(format!("Failed to write config: {}", e)))
    }

    fn create_backup(&self) -> EngineResult<()> {
        let backup_dir = self.config_dir.join("backups");
        fs::create_dir_all(&backup_dir)
            .map_err(|e| EngineError::Storage(format!("Failed to create backup dir: {}", e)))?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S_%3f");
        let backup_file = backup_dir.join(format!("config_{}.json", timestamp));

        fs::copy(&self.config_file, &backup_file)
            .map_err(|e| EngineError::Storage(format!("Failed to create backup: {}", e)))?;

        self.cleanup_old_backups(&backup_dir, BACKUPS_KEPT)
    }

    /// Remove old backups, keeping only the most recent N
    fn cleanup_old_backups(&self, backup_dir: &Path, keep: usize) -> EngineResult<()> {
        let mut entries: Vec<_> = fs::read_dir(backup_dir)
            .map_err(|e| EngineError::Storage(format!("Failed to read backup dir: {}", e)))?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
            .collect();

        if entries.len() <= keep {
            return Ok(());
        }

        // Oldest first; names embed the timestamp so they break mtime ties
        entries.sort_by_key(|e| {
            let modified = e
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            (modified, e.file_name())
        });

        for entry in entries.iter().take(entries.len() - keep) {
            let _ = fs::remove_file(entry.path());
        }

        Ok(())
    }

    /// Store a calibration override for one evidence signal
    pub fn set_evidence_override(&self, name: &str, calibration: Calibration) -> EngineResult<()> {
        let mut config = self.load()?;
        config.evidence_overrides.insert(name.to_string(), calibration);
        self.save(&config)
    }

    /// Drop a calibration override, restoring the built-in value
    pub fn remove_evidence_override(&self, name: &str) -> EngineResult<()> {
        let mut config = self.load()?;
        config.evidence_overrides.remove(name);
        self.save(&config)
    }

    /// Enable the IP reputation adapter against `url`
    pub fn set_ip_reputation_url(&self, url: &str) -> EngineResult<()> {
        let mut config = self.load()?;
        config.ip_reputation.enabled = true;
        config.ip_reputation.base_url = Some(url.to_string());
        self.save(&config)
    }
}
