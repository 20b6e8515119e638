// Local Heuristics
// Cheap detectors computed from the payload itself: behavioral automation
// flags, content templates and duplicates, quality/time consistency and
// IP versus browser timezone consistency

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::sync::OnceLock;

use crate::models::{BehavioralMetrics, MouseMovement, SurveyContext};
use crate::services::stats::{coefficient_of_variation, mean, safe_div};

/// Free-text answers in question order.
pub fn text_answers(responses: &BTreeMap<String, Value>) -> Vec<&str> {
    responses.values().filter_map(Value::as_str).collect()
}

// ============ Behavioral Flags ============

const STRAIGHT_LINE_RADIANS: f64 = 5.0 * PI / 180.0;
const TELEPORT_DISTANCE_PX: f64 = 500.0;
const TELEPORT_WINDOW_MS: f64 = 50.0;
const MAX_HUMAN_WPM: f64 = 150.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehavioralFlags {
    pub robotic_mouse_movements: bool,
    pub mouse_teleporting: bool,
    pub uniform_keystroke_timing: bool,
    pub no_typing_corrections: bool,
    pub impossible_typing_speed: bool,
    pub instant_form_filling: bool,
    pub no_hover_behavior: bool,
    /// Human-readable description of each raised flag.
    pub descriptions: Vec<String>,
}

impl BehavioralFlags {
    pub fn any(&self) -> bool {
        self.robotic_mouse_movements
            || self.mouse_teleporting
            || self.uniform_keystroke_timing
            || self.no_typing_corrections
            || self.impossible_typing_speed
            || self.instant_form_filling
            || self.no_hover_behavior
    }
}

/// Share of consecutive mouse segments that continue in the same direction.
fn straight_line_ratio(movements: &[MouseMovement]) -> f64 {
    if movements.len() < 3 {
        return 0.0;
    }
    let straight = movements
        .windows(3)
        .filter(|w| {
            let a1 = (w[1].y - w[0].y).atan2(w[1].x - w[0].x);
            let a2 = (w[2].y - w[1].y).atan2(w[2].x - w[1].x);
            (a1 - a2).abs() < STRAIGHT_LINE_RADIANS
        })
        .count();
    straight as f64 / (movements.len() - 2) as f64
}

fn teleport_count(movements: &[MouseMovement]) -> usize {
    movements
        .windows(2)
        .filter(|w| {
            let distance = ((w[1].x - w[0].x).powi(2) + (w[1].y - w[0].y).powi(2)).sqrt();
            distance > TELEPORT_DISTANCE_PX && (w[1].t - w[0].t) < TELEPORT_WINDOW_MS
        })
        .count()
}

fn words_per_minute(metrics: &BehavioralMetrics) -> f64 {
    let minutes = metrics.duration / 60_000.0;
    safe_div(metrics.keypress_count as f64 / 5.0, minutes, 0.0)
}

fn first_interaction_ms(metrics: &BehavioralMetrics) -> Option<f64> {
    metrics
        .mouse_movements
        .iter()
        .map(|m| m.t)
        .chain(metrics.mouse_clicks.iter().map(|c| c.t))
        .reduce(f64::min)
}

pub fn hover_ratio(metrics: &BehavioralMetrics) -> f64 {
    let hovered = metrics.mouse_clicks.iter().filter(|c| c.had_hover).count();
    safe_div(hovered as f64, metrics.mouse_clicks.len() as f64, 0.0)
}

pub fn analyze_behavior(metrics: &BehavioralMetrics) -> BehavioralFlags {
    let mut flags = BehavioralFlags::default();

    let straight = straight_line_ratio(&metrics.mouse_movements);
    if straight > 0.8 {
        flags.robotic_mouse_movements = true;
        flags.descriptions.push(format!(
            "Robotic mouse movements detected ({:.0}% straight segments)",
            straight * 100.0
        ));
    }

    let teleports = teleport_count(&metrics.mouse_movements);
    if teleports > 0 {
        flags.mouse_teleporting = true;
        flags.descriptions.push(format!(
            "Mouse teleporting detected ({} jumps >500px in <50ms)",
            teleports
        ));
    }

    if metrics.keystroke_dynamics.len() > 10 {
        let dwell: Vec<f64> = metrics.keystroke_dynamics.iter().map(|k| k.dwell).collect();
        let cv = coefficient_of_variation(&dwell);
        if cv < 0.08 {
            flags.uniform_keystroke_timing = true;
            flags
                .descriptions
                .push(format!("Uniform keystroke timing (CV {:.3})", cv));
        }
    }

    if metrics.backspace_count == 0 && metrics.keypress_count > 50 {
        flags.no_typing_corrections = true;
        flags
            .descriptions
            .push("No typing corrections detected on 50+ keystrokes".to_string());
    }

    let wpm = words_per_minute(metrics);
    if wpm > MAX_HUMAN_WPM {
        flags.impossible_typing_speed = true;
        flags
            .descriptions
            .push(format!("Impossible typing speed: {:.0} WPM", wpm));
    }

    if let Some(first) = first_interaction_ms(metrics) {
        if first > 0.0 && first < 100.0 {
            flags.instant_form_filling = true;
            flags
                .descriptions
                .push(format!("Instant form filling: {:.0}ms to first interaction", first));
        }
    }

    let ratio = hover_ratio(metrics);
    if metrics.mouse_clicks.len() > 5 && ratio < 0.3 {
        flags.no_hover_behavior = true;
        flags.descriptions.push(format!(
            "No hover before clicks ({:.0}% hover rate)",
            ratio * 100.0
        ));
    }

    flags
}

/// Coarse behavioral risk in [0, 1] reported as the `behavioral` category score.
pub fn behavioral_score(metrics: &BehavioralMetrics) -> f64 {
    let mut score: f64 = 0.0;
    if metrics.average_response_time().is_some_and(|avg| avg < 3000.0) {
        score += 0.3;
    }
    if metrics.mouse_movements.len() < 20 && metrics.keypress_count < 10 {
        score += 0.3;
    }
    if metrics.paste_events > 3 {
        score += 0.2;
    }
    if metrics.blur_count() > 5 {
        score += 0.2;
    }
    score.min(1.0)
}

// ============ Content Flags ============

const TEMPLATE_PHRASES: &[&str] = &[
    "[insert",
    "[your answer",
    "[write here",
    "lorem ipsum",
    "sample answer",
    "example response",
    "placeholder text",
    "todo:",
    "tbd",
    "n/a",
    "not applicable",
];

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[[A-Z]\w+\]").expect("valid regex"))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateAnalysis {
    pub is_template: bool,
    pub indicators: Vec<String>,
    pub confidence: f64,
}

pub fn detect_templates(responses: &BTreeMap<String, Value>) -> TemplateAnalysis {
    let texts = text_answers(responses);
    let mut indicators = Vec::new();

    for text in &texts {
        let lower = text.to_lowercase();
        for phrase in TEMPLATE_PHRASES {
            if lower.contains(phrase) {
                indicators.push(format!("Contains template phrase: \"{}\"", phrase));
            }
        }
        if placeholder_pattern().is_match(text) {
            indicators.push("Contains template placeholders".to_string());
        }
    }

    let confidence = (indicators.len() as f64 / texts.len().max(1) as f64).min(1.0);
    TemplateAnalysis {
        is_template: confidence > 0.3,
        indicators,
        confidence,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateAnalysis {
    pub suspicious: bool,
    pub duplicate_count: usize,
    /// Question id pairs with identical answers.
    pub identical_pairs: Vec<(String, String)>,
}

/// Identical free-text answers (longer than 20 characters) given to different questions.
pub fn find_duplicate_answers(responses: &BTreeMap<String, Value>) -> DuplicateAnalysis {
    let long: Vec<(&String, &str)> = responses
        .iter()
        .filter_map(|(id, v)| v.as_str().map(|s| (id, s)))
        .filter(|(_, s)| s.chars().count() > 20)
        .collect();

    let mut pairs = Vec::new();
    for (i, (id_a, text_a)) in long.iter().enumerate() {
        for (id_b, text_b) in &long[i + 1..] {
            if text_a == text_b {
                pairs.push(((*id_a).clone(), (*id_b).clone()));
            }
        }
    }

    DuplicateAnalysis {
        suspicious: !pairs.is_empty(),
        duplicate_count: pairs.len(),
        identical_pairs: pairs,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentFlags {
    pub template_responses: bool,
    pub duplicate_answers: bool,
}

impl ContentFlags {
    pub fn from_analyses(templates: &TemplateAnalysis, duplicates: &DuplicateAnalysis) -> Self {
        Self {
            template_responses: templates.is_template,
            duplicate_answers: duplicates.suspicious,
        }
    }
}

// ============ Quality Flags ============

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityFlags {
    pub extremely_fast_completion: bool,
    pub time_mismatch: bool,
    pub excessive_paste: bool,
    pub excessive_tab_switch: bool,
    /// Set when long answers were produced implausibly fast.
    pub explanation: Option<String>,
}

pub fn assess_quality(
    metrics: &BehavioralMetrics,
    responses: &BTreeMap<String, Value>,
    context: &SurveyContext,
) -> QualityFlags {
    let mut flags = QualityFlags::default();

    if let (Some(actual), Some(expected)) = (
        context.actual_duration_seconds,
        context.expected_duration_seconds,
    ) {
        if expected > 0.0 && actual / expected < 0.2 {
            flags.extremely_fast_completion = true;
        }
    }

    let lengths: Vec<f64> = text_answers(responses)
        .iter()
        .map(|s| s.chars().count() as f64)
        .collect();
    if let Some(avg_time) = metrics.average_response_time() {
        let avg_length = mean(&lengths);
        if avg_length >= 100.0 && avg_time < 3000.0 {
            flags.time_mismatch = true;
            flags.explanation = Some(format!(
                "Long answers ({:.0} chars on average) written in {:.1}s per question",
                avg_length,
                avg_time / 1000.0
            ));
        }
    }

    flags.excessive_paste = metrics.paste_events > 3;
    flags.excessive_tab_switch = metrics.blur_count() > 5;
    flags
}

// ============ Timezone Consistency ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimezoneConsistency {
    pub is_consistent: bool,
    pub suspicion_score: f64,
    pub reason: Option<String>,
}

impl TimezoneConsistency {
    /// IP and browser disagree on the continent-level region.
    pub fn is_region_mismatch(&self) -> bool {
        self.suspicion_score >= 0.6
    }
}

pub fn validate_timezone(ip_timezone: Option<&str>, browser_timezone: Option<&str>) -> TimezoneConsistency {
    let (ip, browser) = match (ip_timezone, browser_timezone) {
        (Some(ip), Some(browser)) if !ip.is_empty() && !browser.is_empty() => (ip, browser),
        _ => {
            return TimezoneConsistency {
                is_consistent: true,
                suspicion_score: 0.0,
                reason: Some("Insufficient timezone data".to_string()),
            }
        }
    };

    if ip == browser {
        return TimezoneConsistency {
            is_consistent: true,
            suspicion_score: 0.0,
            reason: None,
        };
    }

    let region = |tz: &str| tz.split('/').next().unwrap_or(tz).to_string();
    let (ip_region, browser_region) = (region(ip), region(browser));
    if ip_region != browser_region {
        TimezoneConsistency {
            is_consistent: false,
            suspicion_score: 0.6,
            reason: Some(format!(
                "Timezone mismatch: IP in {}, browser in {}",
                ip_region, browser_region
            )),
        }
    } else {
        TimezoneConsistency {
            is_consistent: false,
            suspicion_score: 0.2,
            reason: Some(format!("Timezone city mismatch within {}", ip_region)),
        }
    }
}
