// Evidence Registry
// Immutable lookup of calibrated (likelihood, strength) pairs per evidence signal

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::{EngineError, EngineResult};

/// Calibration for one named signal.
/// `likelihood` is P(evidence | fraud), `strength` is the reliability weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub likelihood: f64,
    pub strength: f64,
}

impl Calibration {
    pub const fn new(likelihood: f64, strength: f64) -> Self {
        Self { likelihood, strength }
    }

    pub fn validate(&self, name: &str) -> EngineResult<()> {
        let in_range = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        if !in_range(self.likelihood) || !in_range(self.strength) {
            return Err(EngineError::Config(format!(
                "Calibration for '{}' must lie in [0, 1], got likelihood={} strength={}",
                name, self.likelihood, self.strength
            )));
        }
        Ok(())
    }
}

/// Offline calibration from historical fraud and legitimate populations.
const DEFAULT_CALIBRATION: &[(&str, f64, f64)] = &[
    // AI content
    ("ai_signature_detected", 0.95, 0.95),
    ("perfect_grammar_no_errors", 0.85, 0.70),
    ("overly_formal_tone", 0.70, 0.60),
    ("hedging_language", 0.65, 0.50),
    // Automation
    ("webdriver_detected", 0.98, 0.95),
    ("headless_browser", 0.95, 0.90),
    ("robotic_mouse_movements", 0.90, 0.85),
    ("mouse_teleporting", 0.95, 0.90),
    ("uniform_keystroke_timing", 0.88, 0.80),
    ("no_typing_corrections", 0.75, 0.70),
    ("impossible_typing_speed", 0.92, 0.85),
    ("instant_form_filling", 0.90, 0.85),
    ("no_hover_behavior", 0.70, 0.65),
    // Content
    ("plagiarism_detected", 0.90, 0.85),
    ("template_responses", 0.85, 0.80),
    ("duplicate_answers", 0.80, 0.75),
    // Contradictions
    ("logical_contradictions", 0.70, 0.65),
    ("temporal_contradictions", 0.75, 0.70),
    ("demographic_contradictions", 0.80, 0.75),
    // Network
    ("vpn_usage", 0.65, 0.60),
    ("datacenter_ip", 0.75, 0.70),
    ("tor_detected", 0.95, 0.90),
    ("timezone_mismatch", 0.70, 0.65),
    // Behavior and quality
    ("extremely_fast_completion", 0.80, 0.75),
    ("quality_time_mismatch", 0.85, 0.80),
    ("excessive_paste_events", 0.75, 0.70),
    ("excessive_tab_switches", 0.70, 0.65),
    // Fraud ring
    ("answer_sharing", 0.95, 0.90),
    ("coordinated_timing", 0.85, 0.80),
    ("device_sharing", 0.90, 0.85),
    ("ip_sharing", 0.75, 0.70),
    // Baseline deviation, base values before severity scaling
    ("baseline_deviation_response_time", 0.70, 0.65),
    ("baseline_deviation_mouse_activity", 0.65, 0.60),
    ("baseline_deviation_keystrokes", 0.65, 0.60),
    ("baseline_deviation_text_quality", 0.60, 0.50),
];

/// Read-only calibration table. Cloning shares the underlying map.
#[derive(Debug, Clone)]
pub struct EvidenceRegistry {
    table: Arc<HashMap<String, Calibration>>,
}

impl Default for EvidenceRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl EvidenceRegistry {
    /// The built-in calibration table.
    pub fn standard() -> Self {
        let table = DEFAULT_CALIBRATION
            .iter()
            .map(|(name, l, s)| (name.to_string(), Calibration::new(*l, *s)))
            .collect();
        Self { table: Arc::new(table) }
    }

    /// Build a new registry with `overrides` merged over this one.
    /// Unknown names are added, so operators can calibrate new signals too.
    pub fn with_overrides(&self, overrides: &HashMap<String, Calibration>) -> EngineResult<Self> {
        let mut table = (*self.table).clone();
        for (name, calibration) in overrides {
            calibration.validate(name)?;
            table.insert(name.clone(), *calibration);
        }
        Ok(Self { table: Arc::new(table) })
    }

    /// Parse a JSON object of `{ name: { likelihood, strength } }` overrides
    /// and merge it over the built-in table.
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let overrides: HashMap<String, Calibration> = serde_json::from_str(json)
            .map_err(|e| EngineError::Config(format!("Failed to parse evidence calibration: {}", e)))?;
        Self::standard().with_overrides(&overrides)
    }

    pub fn get(&self, name: &str) -> Option<Calibration> {
        self.table.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_values() {
        let registry = EvidenceRegistry::standard();
        assert_eq!(registry.get("webdriver_detected"), Some(Calibration::new(0.98, 0.95)));
        assert_eq!(registry.get("vpn_usage"), Some(Calibration::new(0.65, 0.60)));
        assert!(registry.get("unknown_signal").is_none());
        assert_eq!(registry.len(), DEFAULT_CALIBRATION.len());
    }

    #[test]
    fn test_all_defaults_are_in_range() {
        for (name, l, s) in DEFAULT_CALIBRATION {
            assert!(Calibration::new(*l, *s).validate(name).is_ok(), "{}", name);
        }
    }

    #[test]
    fn test_overrides_do_not_mutate_base() {
        let base = EvidenceRegistry::standard();
        let mut overrides = HashMap::new();
        overrides.insert("vpn_usage".to_string(), Calibration::new(0.5, 0.2));
        let tuned = base.with_overrides(&overrides).unwrap();
        assert_eq!(tuned.get("vpn_usage"), Some(Calibration::new(0.5, 0.2)));
        assert_eq!(base.get("vpn_usage"), Some(Calibration::new(0.65, 0.60)));
    }

    #[test]
    fn test_from_json_rejects_out_of_range() {
        let ok = EvidenceRegistry::from_json(r#"{"tor_detected": {"likelihood": 0.99, "strength": 0.9}}"#)
            .unwrap();
        assert_eq!(ok.get("tor_detected"), Some(Calibration::new(0.99, 0.9)));

        let err = EvidenceRegistry::from_json(r#"{"tor_detected": {"likelihood": 1.5, "strength": 0.9}}"#);
        assert!(matches!(err, Err(EngineError::Config(_))));
        assert!(EvidenceRegistry::from_json("not json").is_err());
    }
}
