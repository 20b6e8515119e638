// Evidence Signal Builder
// Adapts detector outputs into canonical evidence signals via the registry

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::baseline::{DeviationAnalysis, Severity};
use super::heuristics::{BehavioralFlags, ContentFlags, QualityFlags, TimezoneConsistency};
use super::registry::{Calibration, EvidenceRegistry};
use crate::services::providers::{
    AiTextReport, AutomationReport, ContradictionReport, FraudRingReport, IpReputationReport,
    PlagiarismReport,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSignal {
    pub name: String,
    /// P(evidence | fraud)
    pub likelihood: f64,
    /// Reliability weight used to damp the update.
    pub strength: f64,
    pub observed: bool,
}

impl EvidenceSignal {
    pub fn new(name: &str, calibration: Calibration, observed: bool) -> Self {
        Self {
            name: name.to_string(),
            likelihood: calibration.likelihood,
            strength: calibration.strength,
            observed,
        }
    }
}

/// Raw detector outputs for one response. A `None` slot means the detector
/// did not run or failed, and contributes no signals at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetectionResults<'a> {
    pub ai_text: Option<&'a AiTextReport>,
    pub automation: Option<&'a AutomationReport>,
    pub behavioral: Option<&'a BehavioralFlags>,
    pub plagiarism: Option<&'a PlagiarismReport>,
    pub content: Option<&'a ContentFlags>,
    pub contradictions: Option<&'a ContradictionReport>,
    pub ip_risk: Option<&'a IpReputationReport>,
    pub timezone: Option<&'a TimezoneConsistency>,
    pub quality: Option<&'a QualityFlags>,
    pub fraud_ring: Option<&'a FraudRingReport>,
    pub deviation: Option<&'a DeviationAnalysis>,
}

struct SignalList<'r> {
    registry: &'r EvidenceRegistry,
    signals: Vec<EvidenceSignal>,
}

impl<'r> SignalList<'r> {
    fn push(&mut self, name: &str, observed: bool) {
        match self.registry.get(name) {
            Some(calibration) => self.signals.push(EvidenceSignal::new(name, calibration, observed)),
            None => debug!("[EVIDENCE] no calibration for '{}', signal dropped", name),
        }
    }

    fn push_calibrated(&mut self, name: String, calibration: Calibration) {
        self.signals.push(EvidenceSignal {
            name,
            likelihood: calibration.likelihood,
            strength: calibration.strength,
            observed: true,
        });
    }
}

fn any_contains(items: &[String], needle: &str) -> bool {
    items.iter().any(|item| item.to_lowercase().contains(needle))
}

/// Scale a deviation's base calibration by severity: strength shrinks and the
/// likelihood is pulled toward 0.5 (no information) for milder deviations.
pub fn severity_calibration(base: Calibration, severity: Severity) -> Calibration {
    let (strength_factor, pull) = match severity {
        Severity::High => (1.0, 1.0),
        Severity::Medium => (0.7, 0.75),
        Severity::Low => (0.4, 0.5),
    };
    Calibration {
        likelihood: 0.5 + (base.likelihood - 0.5) * pull,
        strength: base.strength * strength_factor,
    }
}

/// Build the ordered signal list. Each present detector contributes its full
/// set of signals, with `observed` set only when the detector asserts the
/// condition, so unobserved entries still count toward confidence.
pub fn build_evidence_signals(
    registry: &EvidenceRegistry,
    results: &DetectionResults<'_>,
) -> Vec<EvidenceSignal> {
    let mut list = SignalList {
        registry,
        signals: Vec::new(),
    };

    if let Some(ai) = results.ai_text {
        list.push("ai_signature_detected", any_contains(&ai.ai_indicators, "as an ai"));
        list.push("perfect_grammar_no_errors", any_contains(&ai.ai_indicators, "perfect grammar"));
        list.push("overly_formal_tone", any_contains(&ai.ai_indicators, "formal tone"));
        list.push("hedging_language", any_contains(&ai.ai_indicators, "hedging"));
    }

    if let Some(automation) = results.automation {
        list.push("webdriver_detected", any_contains(&automation.reasons, "webdriver"));
        list.push("headless_browser", any_contains(&automation.reasons, "headless"));
    }

    if let Some(b) = results.behavioral {
        list.push("robotic_mouse_movements", b.robotic_mouse_movements);
        list.push("mouse_teleporting", b.mouse_teleporting);
        list.push("uniform_keystroke_timing", b.uniform_keystroke_timing);
        list.push("no_typing_corrections", b.no_typing_corrections);
        list.push("impossible_typing_speed", b.impossible_typing_speed);
        list.push("instant_form_filling", b.instant_form_filling);
        list.push("no_hover_behavior", b.no_hover_behavior);
    }

    if let Some(plagiarism) = results.plagiarism {
        list.push("plagiarism_detected", plagiarism.is_plagiarized);
    }

    if let Some(content) = results.content {
        list.push("template_responses", content.template_responses);
        list.push("duplicate_answers", content.duplicate_answers);
    }

    if let Some(contradictions) = results.contradictions {
        list.push("logical_contradictions", contradictions.has_contradictions);
    }

    if let Some(ip) = results.ip_risk {
        list.push("vpn_usage", ip.is_vpn);
        list.push("datacenter_ip", ip.is_data_center);
        if let Some(is_tor) = ip.is_tor {
            list.push("tor_detected", is_tor);
        }
    }

    if let Some(tz) = results.timezone {
        list.push("timezone_mismatch", tz.is_region_mismatch());
    }

    if let Some(q) = results.quality {
        list.push("extremely_fast_completion", q.extremely_fast_completion);
        list.push("quality_time_mismatch", q.time_mismatch);
        list.push("excessive_paste_events", q.excessive_paste);
        list.push("excessive_tab_switches", q.excessive_tab_switch);
    }

    if let Some(ring) = results.fraud_ring {
        list.push("answer_sharing", ring.answer_sharing);
        list.push("coordinated_timing", ring.coordinated_timing);
        list.push("device_sharing", ring.device_sharing);
        list.push("ip_sharing", ring.ip_sharing);
    }

    if let Some(analysis) = results.deviation {
        for deviation in &analysis.deviations {
            let name = format!("baseline_deviation_{}", deviation.metric.key());
            match registry.get(&name) {
                Some(base) => list.push_calibrated(name, severity_calibration(base, deviation.severity)),
                None => debug!("[EVIDENCE] no calibration for '{}', deviation dropped", name),
            }
        }
    }

    list.signals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::scoring::baseline::{ComparisonMetrics, Deviation, Metric};

    #[test]
    fn test_empty_results_yield_no_signals() {
        let registry = EvidenceRegistry::standard();
        let signals = build_evidence_signals(&registry, &DetectionResults::default());
        assert!(signals.is_empty());
    }

    #[test]
    fn test_absent_conditions_are_unobserved_not_missing() {
        let registry = EvidenceRegistry::standard();
        let ai = AiTextReport {
            ai_indicators: vec!["Uses PERFECT GRAMMAR throughout".to_string()],
            ..Default::default()
        };
        let results = DetectionResults {
            ai_text: Some(&ai),
            ..Default::default()
        };
        let signals = build_evidence_signals(&registry, &results);
        assert_eq!(signals.len(), 4);
        let observed: Vec<&str> = signals
            .iter()
            .filter(|s| s.observed)
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(observed, vec!["perfect_grammar_no_errors"]);
    }

    #[test]
    fn test_automation_reasons_map_to_signals() {
        let registry = EvidenceRegistry::standard();
        let automation = AutomationReport {
            is_automation: true,
            confidence: 0.9,
            reasons: vec!["WebDriver detected".to_string()],
        };
        let results = DetectionResults {
            automation: Some(&automation),
            ..Default::default()
        };
        let signals = build_evidence_signals(&registry, &results);
        assert_eq!(signals[0].name, "webdriver_detected");
        assert!(signals[0].observed);
        assert_eq!(signals[0].likelihood, 0.98);
        assert!(!signals[1].observed);
    }

    #[test]
    fn test_tor_signal_only_when_known() {
        let registry = EvidenceRegistry::standard();
        let mut ip = IpReputationReport {
            is_vpn: true,
            ..Default::default()
        };
        let results = DetectionResults {
            ip_risk: Some(&ip),
            ..Default::default()
        };
        assert_eq!(build_evidence_signals(&registry, &results).len(), 2);

        ip.is_tor = Some(true);
        let results = DetectionResults {
            ip_risk: Some(&ip),
            ..Default::default()
        };
        let signals = build_evidence_signals(&registry, &results);
        assert_eq!(signals.len(), 3);
        assert!(signals.iter().all(|s| s.name != "tor_detected" || s.observed));
    }

    #[test]
    fn test_deviation_signals_scale_with_severity() {
        let registry = EvidenceRegistry::standard();
        let analysis = DeviationAnalysis {
            is_anomalous: true,
            deviation_score: 0.65,
            confidence: 1.0,
            deviations: vec![
                Deviation {
                    metric: Metric::ResponseTime,
                    severity: Severity::High,
                    description: String::new(),
                    z_score: -3.5,
                    percentile: 0.02,
                },
                Deviation {
                    metric: Metric::Keystrokes,
                    severity: Severity::Medium,
                    description: String::new(),
                    z_score: -2.4,
                    percentile: 0.8,
                },
            ],
            comparison_metrics: ComparisonMetrics::default(),
        };
        let results = DetectionResults {
            deviation: Some(&analysis),
            ..Default::default()
        };
        let signals = build_evidence_signals(&registry, &results);
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].name, "baseline_deviation_response_time");
        assert!((signals[0].likelihood - 0.70).abs() < 1e-12);
        assert!((signals[0].strength - 0.65).abs() < 1e-12);
        assert!(signals.iter().all(|s| s.observed));

        let medium = &signals[1];
        assert!((medium.likelihood - (0.5 + 0.15 * 0.75)).abs() < 1e-12);
        assert!((medium.strength - 0.42).abs() < 1e-12);
    }

    #[test]
    fn test_low_severity_pulls_toward_uninformative() {
        let c = severity_calibration(Calibration::new(0.6, 0.5), Severity::Low);
        assert!((c.likelihood - 0.55).abs() < 1e-12);
        assert!((c.strength - 0.2).abs() < 1e-12);
    }
}
