// Cipher Data Models
// Wire types shared by the tiered check endpoint and the comprehensive assessment

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub use crate::services::stats::Interval;

// ============ Request Payload ============

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentRequest {
    /// Answers keyed by question id. Free text arrives as JSON strings.
    #[serde(default)]
    pub responses: BTreeMap<String, Value>,
    /// Question text keyed by question id.
    #[serde(default)]
    pub questions: BTreeMap<String, String>,
    #[serde(default)]
    pub question_types: BTreeMap<String, QuestionType>,
    #[serde(default)]
    pub behavioral_metrics: BehavioralMetrics,
    #[serde(default)]
    pub device_info: Option<DeviceInfo>,
    #[serde(default)]
    pub context: SurveyContext,
    /// Falls back to the engine's configured default tier when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<u8>,
    #[serde(default)]
    pub thresholds: Thresholds,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Text,
    MultipleChoice,
    Rating,
    Scale,
    Boolean,
}

impl QuestionType {
    pub fn is_choice(self) -> bool {
        matches!(self, Self::MultipleChoice | Self::Rating | Self::Scale)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Thresholds {
    /// Scores below this fail outright.
    pub fail: f64,
    /// Scores at or above this are kept without review.
    pub review: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            fail: 0.4,
            review: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SurveyContext {
    #[serde(default)]
    pub survey_id: Option<String>,
    #[serde(default)]
    pub respondent_id: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub expected_duration_seconds: Option<f64>,
    #[serde(default)]
    pub actual_duration_seconds: Option<f64>,
}

// ============ Behavioral Telemetry ============

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BehavioralMetrics {
    /// Per-question response times in milliseconds.
    #[serde(default)]
    pub response_time: Vec<f64>,
    #[serde(default)]
    pub mouse_movements: Vec<MouseMovement>,
    #[serde(default)]
    pub mouse_clicks: Vec<MouseClick>,
    #[serde(default)]
    pub keystroke_dynamics: Vec<KeystrokeEvent>,
    #[serde(default)]
    pub scroll_events: Vec<ScrollEvent>,
    #[serde(default)]
    pub keypress_count: u32,
    #[serde(default)]
    pub backspace_count: u32,
    #[serde(default)]
    pub paste_events: u32,
    #[serde(default)]
    pub tab_switch_count: u32,
    #[serde(default)]
    pub focus_events: Vec<FocusEvent>,
    /// Session duration in milliseconds.
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub total_blur_duration: f64,
    #[serde(default)]
    pub device_fingerprint: Option<DeviceFingerprint>,
}

impl BehavioralMetrics {
    pub fn average_response_time(&self) -> Option<f64> {
        if self.response_time.is_empty() {
            None
        } else {
            Some(crate::services::stats::mean(&self.response_time))
        }
    }

    /// Mouse, keyboard and scroll events combined.
    pub fn interaction_count(&self) -> usize {
        self.mouse_movements.len() + self.keypress_count as usize + self.scroll_events.len()
    }

    pub fn blur_count(&self) -> usize {
        self.focus_events
            .iter()
            .filter(|e| e.kind == FocusKind::Blur)
            .count()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct MouseMovement {
    pub x: f64,
    pub y: f64,
    pub t: f64,
    #[serde(default)]
    pub velocity: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MouseClick {
    pub x: f64,
    pub y: f64,
    pub t: f64,
    #[serde(default)]
    pub had_hover: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct KeystrokeEvent {
    #[serde(default)]
    pub dwell: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct ScrollEvent {
    pub y: f64,
    pub t: f64,
    #[serde(default)]
    pub velocity: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FocusKind {
    Focus,
    Blur,
    Hidden,
    Visible,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FocusEvent {
    #[serde(rename = "type")]
    pub kind: FocusKind,
    #[serde(default)]
    pub t: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeviceFingerprint {
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub web_driver: bool,
    #[serde(default)]
    pub automation: bool,
    #[serde(default)]
    pub plugin_count: Option<u32>,
    #[serde(default)]
    pub screen_width: Option<u32>,
    #[serde(default)]
    pub screen_height: Option<u32>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub canvas_fingerprint: Option<String>,
    #[serde(default)]
    pub webgl_fingerprint: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub touch_support: Option<bool>,
    #[serde(default)]
    pub max_touch_points: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub timezone: Option<String>,
    /// Minutes from UTC as reported by the browser.
    #[serde(default)]
    pub timezone_offset: i32,
    #[serde(default)]
    pub screen_width: i32,
    #[serde(default)]
    pub screen_height: i32,
    #[serde(default)]
    pub screen_avail_width: i32,
    #[serde(default)]
    pub screen_avail_height: i32,
    #[serde(default = "default_pixel_ratio")]
    pub pixel_ratio: f64,
    #[serde(default)]
    pub touch_support: bool,
    #[serde(default)]
    pub max_touch_points: u32,
    #[serde(default)]
    pub hardware_concurrency: u32,
    #[serde(default)]
    pub device_memory: f64,
    #[serde(default)]
    pub web_driver: bool,
    #[serde(default)]
    pub automation_detected: bool,
    #[serde(default)]
    pub plugin_count: u32,
}

// ============ Tiered Check Response ============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub check_id: String,
    pub passed: bool,
    /// Suspicion score, higher is more suspicious.
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Keep,
    Review,
    Discard,
}

impl Recommendation {
    pub fn as_str(self) -> &'static str {
        match self {
            Recommendation::Keep => "keep",
            Recommendation::Review => "review",
            Recommendation::Discard => "discard",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub verdict: String,
    pub issues: Vec<String>,
    pub positives: Vec<String>,
    pub suggestion: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationMeta {
    pub tier: u8,
    pub processing_time_ms: u64,
    pub checks_run: usize,
    pub checks_passed: usize,
    pub request_id: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// Quality score, higher is better.
    pub score: f64,
    pub passed: bool,
    pub recommendation: Recommendation,
    pub confidence: f64,
    pub flags: Vec<String>,
    pub summary: ValidationSummary,
    pub checks: Vec<CheckResult>,
    pub meta: ValidationMeta,
}

// ============ Comprehensive Assessment ============

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

/// Category scores. A category that did not run stays `None` and is left
/// out of the JSON, so callers can tell "clean" from "not evaluated".
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryScores {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub behavioral: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_content: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plagiarism: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contradictions: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_reputation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_fingerprint: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_deviation: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiGeneratedFinding {
    pub detected: bool,
    pub probability: f64,
    pub indicators: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlagiarismMatchSummary {
    pub url: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlagiarismFinding {
    pub detected: bool,
    pub sources: usize,
    pub top_matches: Vec<PlagiarismMatchSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContradictionFinding {
    pub found: bool,
    pub count: usize,
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationFinding {
    pub detected: bool,
    pub confidence: f64,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionFinding {
    pub mouse_events: usize,
    pub keystrokes: u32,
    pub tab_switches: usize,
    pub paste_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpRiskFinding {
    #[serde(rename = "isVPN")]
    pub is_vpn: bool,
    pub is_data_center: bool,
    pub is_tor: bool,
    pub location: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FraudRingFinding {
    pub answer_sharing: bool,
    pub coordinated_timing: bool,
    pub device_sharing: bool,
    pub ip_sharing: bool,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Findings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_generated: Option<AiGeneratedFinding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plagiarism: Option<PlagiarismFinding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contradictions: Option<ContradictionFinding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub automation: Option<AutomationFinding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interaction: Option<InteractionFinding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_risk: Option<IpRiskFinding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fraud_ring: Option<FraudRingFinding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline: Option<crate::services::scoring::baseline::DeviationAnalysis>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceBuckets {
    pub high_risk: Vec<String>,
    pub medium_risk: Vec<String>,
    pub low_risk: Vec<String>,
    pub human_indicators: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub overall_risk_score: f64,
    pub risk_level: RiskLevel,
    pub is_likely_fraud: bool,
    pub confidence: f64,
    pub confidence_interval: Interval,
    pub scores: CategoryScores,
    pub findings: Findings,
    pub recommendations: Vec<String>,
    pub evidence: EvidenceBuckets,
    pub reasoning: String,
    pub tier: u8,
    pub evidence_count: usize,
}

fn default_pixel_ratio() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let req: AssessmentRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.tier, None);
        assert_eq!(req.thresholds, Thresholds::default());
        assert!(req.device_info.is_none());
    }

    #[test]
    fn test_unrecognized_focus_events_are_tolerated() {
        let json = r#"{
            "behavioralMetrics": {
                "focusEvents": [{"type": "blur", "t": 1}, {"type": "pagehide", "t": 2}, {"type": "blur", "t": 3}]
            }
        }"#;
        let req: AssessmentRequest = serde_json::from_str(json).unwrap();
        let kinds: Vec<FocusKind> = req.behavioral_metrics.focus_events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![FocusKind::Blur, FocusKind::Unknown, FocusKind::Blur]);
        assert_eq!(req.behavioral_metrics.blur_count(), 2);
    }

    #[test]
    fn test_request_parses_camel_case_payload() {
        let json = r#"{
            "responses": {"q1": "I liked the onboarding flow", "q2": 4},
            "questions": {"q1": "What did you like?"},
            "behavioralMetrics": {
                "responseTime": [4000, 6000],
                "keypressCount": 42,
                "pasteEvents": 1,
                "focusEvents": [{"type": "blur", "t": 10}, {"type": "focus", "t": 20}],
                "deviceFingerprint": {"webDriver": true, "timezone": "Europe/Berlin"}
            },
            "context": {"surveyId": "s-1", "ipAddress": "203.0.113.9"},
            "tier": 5,
            "thresholds": {"fail": 0.3, "review": 0.8}
        }"#;
        let req: AssessmentRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.tier, Some(5));
        assert_eq!(req.behavioral_metrics.keypress_count, 42);
        assert_eq!(req.behavioral_metrics.blur_count(), 1);
        assert_eq!(req.behavioral_metrics.average_response_time(), Some(5000.0));
        assert!(req.behavioral_metrics.device_fingerprint.unwrap().web_driver);
        assert_eq!(req.context.survey_id.as_deref(), Some("s-1"));
    }

    #[test]
    fn test_unevaluated_categories_are_omitted() {
        let scores = CategoryScores {
            behavioral: Some(0.0),
            ..Default::default()
        };
        let json = serde_json::to_value(&scores).unwrap();
        assert_eq!(json["behavioral"], 0.0);
        assert!(json.get("aiContent").is_none());
        assert!(json.get("ipReputation").is_none());
    }
}
