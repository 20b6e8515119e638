// Local Checks
// Offline per-check heuristics for the tiered endpoint. Every check returns a
// CheckResult whose score is suspicion in [0, 1]; missing data passes with 0.

use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::OnceLock;

use super::heuristics::{
    assess_quality, detect_templates, find_duplicate_answers, hover_ratio, TimezoneConsistency,
};
use crate::models::{AssessmentRequest, CheckResult, DeviceInfo, QuestionType};
use crate::services::stats::{coefficient_of_variation, mean, safe_div};

const MIN_MS_PER_CHAR: f64 = 20.0;
const MIN_RESPONSE_TIME_MS: f64 = 1000.0;
const MIN_SENTENCES_FOR_BURSTINESS: usize = 5;

/// Inputs for a local check. `ip_timezone` carries the IP versus browser
/// comparison when an IP reputation lookup succeeded.
#[derive(Debug, Clone, Copy)]
pub struct CheckInput<'a> {
    pub request: &'a AssessmentRequest,
    pub ip_timezone: Option<&'a TimezoneConsistency>,
}

impl<'a> CheckInput<'a> {
    pub fn new(request: &'a AssessmentRequest) -> Self {
        Self {
            request,
            ip_timezone: None,
        }
    }
}

fn result(id: &str, passed: bool, score: f64, details: Option<String>) -> CheckResult {
    CheckResult {
        check_id: id.to_string(),
        passed,
        score,
        details,
    }
}

fn clean(id: &str) -> CheckResult {
    result(id, true, 0.0, None)
}

fn skipped(id: &str, reason: &str) -> CheckResult {
    result(id, true, 0.0, Some(reason.to_string()))
}

fn flagged(id: &str, score: f64, details: impl Into<String>) -> CheckResult {
    result(id, true, score, Some(details.into()))
}

fn failed(id: &str, score: f64, details: impl Into<String>) -> CheckResult {
    result(id, false, score, Some(details.into()))
}

/// Run the local check registered under `id`. Returns `None` for ids that
/// need a collaborator.
pub fn run_local_check(id: &str, input: &CheckInput<'_>) -> Option<CheckResult> {
    let req = input.request;
    let device = req.device_info.as_ref();
    let check = match id {
        "rapid_completion" => rapid_completion(req),
        "impossibly_fast" => impossibly_fast(req),
        "uniform_timing" => uniform_timing(req),
        "suspicious_pauses" => suspicious_pauses(req),
        "low_interaction" => low_interaction(req),
        "straight_line_answers" => straight_line_answers(req),
        "minimal_effort" => minimal_effort(req),
        "quality_assessment" => quality_assessment(req),
        "semantic_analysis" => semantic_analysis(req),
        "burstiness_analysis" => burstiness_analysis(req),
        "excessive_paste" => excessive_paste(req),
        "pointer_spikes" => pointer_spikes(req),
        "robotic_typing" => robotic_typing(req),
        "mouse_teleporting" => mouse_teleporting(req),
        "no_corrections" => no_corrections(req),
        "excessive_tab_switching" => excessive_tab_switching(req),
        "window_focus_loss" => window_focus_loss(req),
        "hover_behavior" => hover_behavior(req),
        "scroll_patterns" => scroll_patterns(req),
        "mouse_acceleration" => mouse_acceleration(req),
        "webdriver_detected" => webdriver_detected(device),
        "automation_detected" => automation_detected(device),
        "no_plugins" => no_plugins(device),
        "suspicious_user_agent" => suspicious_user_agent(device),
        "device_fingerprint_mismatch" => device_fingerprint_mismatch(device),
        "screen_anomaly" => screen_anomaly(device),
        "timezone_validation" => timezone_validation(device, input.ip_timezone),
        _ => return None,
    };
    Some(check)
}

// ============ Timing ============

fn durations(req: &AssessmentRequest) -> Option<(f64, f64)> {
    match (
        req.context.actual_duration_seconds,
        req.context.expected_duration_seconds,
    ) {
        (Some(actual), Some(expected)) if actual > 0.0 && expected > 0.0 => Some((actual, expected)),
        _ => None,
    }
}

pub fn rapid_completion(req: &AssessmentRequest) -> CheckResult {
    const ID: &str = "rapid_completion";
    let Some((actual, expected)) = durations(req) else {
        return skipped(ID, "No timing data available");
    };
    let ratio = actual / expected;
    if ratio < 0.2 {
        failed(ID, 1.0, format!("Completed in {:.0}% of expected time", ratio * 100.0))
    } else if ratio < 0.4 {
        flagged(ID, 0.5, "Faster than typical")
    } else {
        clean(ID)
    }
}

pub fn impossibly_fast(req: &AssessmentRequest) -> CheckResult {
    const ID: &str = "impossibly_fast";
    let Some((actual, expected)) = durations(req) else {
        return skipped(ID, "No timing data available");
    };
    let actual_ms = actual * 1000.0;
    let min_possible_ms: f64 = req
        .responses
        .keys()
        .map(|id| {
            let chars = req.questions.get(id).map_or(0, |q| q.chars().count());
            (chars as f64 * MIN_MS_PER_CHAR).max(MIN_RESPONSE_TIME_MS)
        })
        .sum();

    if actual_ms < min_possible_ms * 0.3 {
        return failed(
            ID,
            1.0,
            format!(
                "Completed in {}s, minimum expected {:.0}s",
                actual,
                min_possible_ms / 1000.0
            ),
        );
    }

    let speed_ratio = actual / expected;
    if speed_ratio < 1.0 {
        let score = (1.0 - speed_ratio).max(0.0) * 0.7;
        let details = (speed_ratio < 0.5).then(|| "Faster than average".to_string());
        result(ID, true, score, details)
    } else {
        clean(ID)
    }
}

pub fn uniform_timing(req: &AssessmentRequest) -> CheckResult {
    const ID: &str = "uniform_timing";
    let times = &req.behavioral_metrics.response_time;
    if times.len() < 3 {
        return skipped(ID, "Not enough timing data");
    }
    let cv = coefficient_of_variation(times);
    if cv < 0.1 {
        failed(ID, 1.0, "Response times are suspiciously uniform")
    } else if cv < 0.2 {
        flagged(ID, 0.5, "Lower than typical timing variation")
    } else {
        clean(ID)
    }
}

pub fn suspicious_pauses(req: &AssessmentRequest) -> CheckResult {
    const ID: &str = "suspicious_pauses";
    let metrics = &req.behavioral_metrics;
    if metrics.focus_events.len() < 2 {
        return skipped(ID, "No focus event data");
    }
    let duration = if metrics.duration > 0.0 { metrics.duration } else { 1.0 };
    let blur_ratio = metrics.total_blur_duration / duration;
    if blur_ratio > 0.5 {
        failed(
            ID,
            0.9,
            format!("{:.0}% of time spent away from survey", blur_ratio * 100.0),
        )
    } else if blur_ratio > 0.3 {
        flagged(ID, 0.5, "Significant time away from survey")
    } else {
        clean(ID)
    }
}

// ============ Content ============

const LOW_EFFORT_RESPONSES: &[&str] = &[
    "n/a", "na", "none", "nothing", "idk", "i dont know", "i don't know", "no comment", "no",
    "yes", "ok", "okay", "good", "fine", "whatever", "asdf", "test", ".", "-", "...",
];

fn gibberish_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"^[a-z]{1,3}$",
            r"^[^aeiou]{5,}$",
            r"^(asdf|qwerty|zxcv|wasd)",
            r"^[0-9]+$",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
    })
}

/// The same character `min_run` or more times in a row.
fn has_repeated_run(text: &str, min_run: usize) -> bool {
    let mut run = 0;
    let mut previous = None;
    for c in text.chars() {
        if Some(c) == previous {
            run += 1;
        } else {
            run = 1;
            previous = Some(c);
        }
        if run >= min_run {
            return true;
        }
    }
    false
}

/// The whole string is one unit repeated at least three times ("abcabcabc").
fn is_repeated_unit(text: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    (1..=n / 3).any(|unit| n % unit == 0 && chars.chunks(unit).all(|c| c == &chars[..unit]))
}

fn is_gibberish(answer: &str) -> bool {
    gibberish_patterns().iter().any(|p| p.is_match(answer))
        || has_repeated_run(answer, 5)
        || is_repeated_unit(answer)
}

fn is_low_effort(answer: &str) -> bool {
    LOW_EFFORT_RESPONSES.contains(&answer) || answer.chars().count() < 10 || is_gibberish(answer)
}

fn free_text_answers(req: &AssessmentRequest) -> Vec<String> {
    req.responses
        .iter()
        .filter_map(|(id, value)| {
            let text = value.as_str()?;
            match req.question_types.get(id) {
                Some(QuestionType::Text) => Some(text),
                None if !text.is_empty() => Some(text),
                _ => None,
            }
        })
        .map(|text| text.trim().to_lowercase())
        .collect()
}

pub fn minimal_effort(req: &AssessmentRequest) -> CheckResult {
    const ID: &str = "minimal_effort";
    let answers = free_text_answers(req);
    if answers.is_empty() {
        return skipped(ID, "No text responses to analyze");
    }

    let low_effort = answers.iter().filter(|a| is_low_effort(a)).count();
    let ratio = low_effort as f64 / answers.len() as f64;
    let lengths: Vec<f64> = answers.iter().map(|a| a.chars().count() as f64).collect();

    if ratio > 0.7 {
        failed(ID, 1.0, "Most responses are low effort or gibberish")
    } else if ratio > 0.4 {
        flagged(ID, 0.6, "Many responses appear low effort")
    } else if mean(&lengths) < 20.0 {
        flagged(ID, 0.4, "Responses are quite short on average")
    } else {
        clean(ID)
    }
}

/// Completion time, paste and focus signals judged together.
pub fn quality_assessment(req: &AssessmentRequest) -> CheckResult {
    const ID: &str = "quality_assessment";
    let flags = assess_quality(&req.behavioral_metrics, &req.responses, &req.context);
    let mut issues: Vec<String> = Vec::new();
    if flags.extremely_fast_completion {
        issues.push("Completed in under 20% of expected time".to_string());
    }
    if flags.time_mismatch {
        issues.push(
            flags
                .explanation
                .clone()
                .unwrap_or_else(|| "Answer length does not match time spent".to_string()),
        );
    }
    if flags.excessive_paste {
        issues.push("Heavy pasting".to_string());
    }
    if flags.excessive_tab_switch {
        issues.push("Frequent tab switching".to_string());
    }

    match issues.len() {
        0 => clean(ID),
        1 => flagged(ID, 0.4, issues.remove(0)),
        n => failed(ID, (0.35 * n as f64).min(1.0), issues.join("; ")),
    }
}

/// Answers that carry no meaning of their own: template text, or the same
/// long answer given to different questions.
pub fn semantic_analysis(req: &AssessmentRequest) -> CheckResult {
    const ID: &str = "semantic_analysis";
    if free_text_answers(req).is_empty() {
        return skipped(ID, "No text responses to analyze");
    }

    let templates = detect_templates(&req.responses);
    let duplicates = find_duplicate_answers(&req.responses);
    let mut reasons = Vec::new();
    let mut score: f64 = 0.0;
    if templates.is_template {
        reasons.push(format!("Template text ({})", templates.indicators.join(", ")));
        score = score.max(templates.confidence);
    }
    if duplicates.suspicious {
        reasons.push(format!(
            "{} identical answer(s) across different questions",
            duplicates.duplicate_count
        ));
        score = score.max(0.6);
    }

    if reasons.is_empty() {
        clean(ID)
    } else {
        failed(ID, score, reasons.join("; "))
    }
}

fn sentence_word_counts(answers: &[String]) -> Vec<f64> {
    answers
        .iter()
        .flat_map(|a| a.split(['.', '!', '?']))
        .map(|sentence| sentence.split_whitespace().count())
        .filter(|words| *words > 0)
        .map(|words| words as f64)
        .collect()
}

/// Human writing mixes short and long sentences; generated text tends to
/// keep them uniform.
pub fn burstiness_analysis(req: &AssessmentRequest) -> CheckResult {
    const ID: &str = "burstiness_analysis";
    let lengths = sentence_word_counts(&free_text_answers(req));
    if lengths.len() < MIN_SENTENCES_FOR_BURSTINESS {
        return skipped(ID, "Not enough sentences to measure variation");
    }

    let cv = coefficient_of_variation(&lengths);
    if cv < 0.2 {
        failed(ID, 0.7, format!("Sentence lengths are unusually uniform (CV {:.2})", cv))
    } else if cv < 0.35 {
        flagged(ID, 0.4, format!("Low sentence length variation (CV {:.2})", cv))
    } else {
        clean(ID)
    }
}

pub fn straight_line_answers(req: &AssessmentRequest) -> CheckResult {
    const ID: &str = "straight_line_answers";
    let answers: Vec<&Value> = req
        .responses
        .iter()
        .filter(|(id, _)| req.question_types.get(*id).is_some_and(|t| t.is_choice()))
        .map(|(_, v)| v)
        .collect();
    if answers.len() < 4 {
        return skipped(ID, "Not enough scale/choice questions");
    }

    let unique: HashSet<String> = answers.iter().map(|v| v.to_string()).collect();
    let unique_ratio = unique.len() as f64 / answers.len() as f64;

    let mut max_run = 1;
    let mut run = 1;
    for pair in answers.windows(2) {
        if pair[0] == pair[1] {
            run += 1;
            max_run = max_run.max(run);
        } else {
            run = 1;
        }
    }

    if unique_ratio < 0.15 {
        failed(ID, 1.0, "Nearly all answers are identical")
    } else if max_run >= 5 || unique_ratio < 0.25 {
        failed(ID, 0.8, "Strong straight-lining pattern detected")
    } else if max_run >= 4 {
        flagged(ID, 0.4, "Some consecutive identical answers")
    } else {
        clean(ID)
    }
}

pub fn excessive_tab_switching(req: &AssessmentRequest) -> CheckResult {
    const ID: &str = "excessive_tab_switching";
    let metrics = &req.behavioral_metrics;
    if metrics.duration <= 0.0 {
        return skipped(ID, "No behavioral data");
    }
    let per_minute = metrics.tab_switch_count as f64 / (metrics.duration / 60_000.0);
    if per_minute > 5.0 {
        failed(ID, 0.8, "Excessive tab switching detected")
    } else if per_minute > 2.0 {
        flagged(ID, 0.4, "Above average tab switching")
    } else {
        clean(ID)
    }
}

pub fn window_focus_loss(req: &AssessmentRequest) -> CheckResult {
    const ID: &str = "window_focus_loss";
    let metrics = &req.behavioral_metrics;
    if metrics.duration <= 0.0 {
        return skipped(ID, "No behavioral data");
    }
    let blur_ratio = metrics.total_blur_duration / metrics.duration;
    if blur_ratio > 0.6 {
        failed(ID, 0.8, "Majority of time spent away from survey")
    } else if blur_ratio > 0.3 {
        flagged(ID, 0.4, "Significant time away from survey")
    } else {
        clean(ID)
    }
}

// ============ Behavioral ============

pub fn low_interaction(req: &AssessmentRequest) -> CheckResult {
    const ID: &str = "low_interaction";
    let metrics = &req.behavioral_metrics;
    if metrics.duration <= 0.0 {
        return skipped(ID, "No behavioral data available");
    }
    let rate = metrics.interaction_count() as f64 / (metrics.duration / 1000.0);
    if rate < 0.1 {
        failed(ID, 1.0, "Almost no user interaction detected")
    } else if rate < 0.5 {
        flagged(ID, 0.6, "Below average interaction rate")
    } else {
        clean(ID)
    }
}

pub fn excessive_paste(req: &AssessmentRequest) -> CheckResult {
    const ID: &str = "excessive_paste";
    let metrics = &req.behavioral_metrics;
    let pastes = metrics.paste_events as f64;
    let keys = metrics.keypress_count as f64;
    if pastes > 0.0 && keys == 0.0 {
        return failed(ID, 1.0, "All content was pasted, no typing detected");
    }
    let ratio = safe_div(pastes, keys, 0.0);
    if ratio > 0.5 {
        failed(ID, 0.8, "High paste-to-typing ratio")
    } else if ratio > 0.2 {
        flagged(ID, 0.4, "Some paste events detected")
    } else {
        clean(ID)
    }
}

pub fn pointer_spikes(req: &AssessmentRequest) -> CheckResult {
    const ID: &str = "pointer_spikes";
    let movements = &req.behavioral_metrics.mouse_movements;
    if movements.len() < 10 {
        return skipped(ID, "Insufficient mouse data");
    }
    let velocities: Vec<f64> = movements
        .iter()
        .map(|m| m.velocity)
        .filter(|v| *v > 0.0)
        .collect();
    if velocities.is_empty() {
        return skipped(ID, "No velocity data");
    }
    let spikes = velocities.iter().filter(|v| **v > 50.0).count();
    let ratio = spikes as f64 / velocities.len() as f64;
    if ratio > 0.3 {
        failed(ID, 0.9, "Many unnatural mouse speed spikes detected")
    } else if ratio > 0.1 {
        flagged(ID, 0.4, "Some unusual mouse movements")
    } else {
        clean(ID)
    }
}

pub fn robotic_typing(req: &AssessmentRequest) -> CheckResult {
    const ID: &str = "robotic_typing";
    let keystrokes = &req.behavioral_metrics.keystroke_dynamics;
    if keystrokes.len() < 10 {
        return skipped(ID, "Insufficient keystroke data");
    }
    let dwell: Vec<f64> = keystrokes
        .iter()
        .map(|k| k.dwell)
        .filter(|d| *d > 0.0 && *d < 1000.0)
        .collect();
    if dwell.len() < 5 {
        return skipped(ID, "Not enough valid keystroke data");
    }
    let cv = coefficient_of_variation(&dwell);
    if cv < 0.08 {
        failed(ID, 1.0, "Keystroke timing is machine-like uniform")
    } else if cv < 0.15 {
        flagged(ID, 0.5, "Lower than typical keystroke variation")
    } else {
        clean(ID)
    }
}

pub fn mouse_teleporting(req: &AssessmentRequest) -> CheckResult {
    const ID: &str = "mouse_teleporting";
    let movements = &req.behavioral_metrics.mouse_movements;
    if movements.len() < 5 {
        return skipped(ID, "Insufficient mouse data");
    }
    let jumps = movements
        .windows(2)
        .filter(|w| {
            let distance = ((w[1].x - w[0].x).powi(2) + (w[1].y - w[0].y).powi(2)).sqrt();
            distance > 500.0 && (w[1].t - w[0].t) < 10.0
        })
        .count();
    let ratio = jumps as f64 / movements.len() as f64;
    if ratio > 0.2 {
        failed(ID, 0.9, "Frequent mouse teleportation detected")
    } else if ratio > 0.05 {
        flagged(ID, 0.4, "Some mouse teleportation detected")
    } else {
        clean(ID)
    }
}

pub fn no_corrections(req: &AssessmentRequest) -> CheckResult {
    const ID: &str = "no_corrections";
    let metrics = &req.behavioral_metrics;
    let keys = metrics.keypress_count;
    if keys < 20 {
        return skipped(ID, "Insufficient typing data");
    }
    let ratio = metrics.backspace_count as f64 / keys as f64;
    if metrics.backspace_count == 0 && keys > 50 {
        failed(ID, 0.8, "No typing corrections despite significant text entry")
    } else if ratio < 0.01 && keys > 30 {
        flagged(ID, 0.5, "Very few typing corrections")
    } else {
        clean(ID)
    }
}

pub fn hover_behavior(req: &AssessmentRequest) -> CheckResult {
    const ID: &str = "hover_behavior";
    let metrics = &req.behavioral_metrics;
    if metrics.mouse_clicks.len() < 3 {
        return skipped(ID, "Insufficient click data");
    }
    let ratio = hover_ratio(metrics);
    if ratio < 0.2 {
        failed(ID, 0.8, "Clicks without natural hover behavior")
    } else if ratio < 0.4 {
        flagged(ID, 0.4, "Lower than typical hover-before-click rate")
    } else {
        clean(ID)
    }
}

pub fn scroll_patterns(req: &AssessmentRequest) -> CheckResult {
    const ID: &str = "scroll_patterns";
    let events = &req.behavioral_metrics.scroll_events;
    if events.len() < 5 {
        return skipped(ID, "Insufficient scroll data");
    }
    let speeds: Vec<f64> = events
        .iter()
        .map(|e| e.velocity.abs())
        .filter(|v| *v > 0.0)
        .collect();
    if speeds.len() < 3 {
        return skipped(ID, "Insufficient scroll data");
    }
    if coefficient_of_variation(&speeds) < 0.1 {
        failed(ID, 0.7, "Unnaturally uniform scroll pattern")
    } else {
        clean(ID)
    }
}

pub fn mouse_acceleration(req: &AssessmentRequest) -> CheckResult {
    const ID: &str = "mouse_acceleration";
    let movements = &req.behavioral_metrics.mouse_movements;
    if movements.len() < 20 {
        return skipped(ID, "Insufficient mouse data");
    }
    let velocities: Vec<f64> = movements
        .iter()
        .map(|m| m.velocity)
        .filter(|v| *v > 0.0)
        .collect();
    if velocities.len() < 10 {
        return skipped(ID, "Insufficient mouse data");
    }
    let changes: Vec<f64> = velocities.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
    if coefficient_of_variation(&changes) < 0.2 {
        flagged(ID, 0.5, "Lower than typical acceleration variation")
    } else {
        clean(ID)
    }
}

// ============ Device ============

const NO_DEVICE: &str = "No device info available";

fn bot_user_agent_patterns() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)headless|phantom|selenium|webdriver|puppeteer|playwright|crawl|spider|bot|scrape|curl|wget|python-requests|axios|node-fetch|go-http-client",
        )
        .expect("valid regex")
    })
}

pub fn webdriver_detected(device: Option<&DeviceInfo>) -> CheckResult {
    const ID: &str = "webdriver_detected";
    match device {
        None => skipped(ID, NO_DEVICE),
        Some(d) if d.web_driver => failed(ID, 1.0, "WebDriver automation detected"),
        Some(_) => clean(ID),
    }
}

pub fn automation_detected(device: Option<&DeviceInfo>) -> CheckResult {
    const ID: &str = "automation_detected";
    match device {
        None => skipped(ID, NO_DEVICE),
        Some(d) if d.automation_detected => failed(ID, 1.0, "Browser automation framework detected"),
        Some(_) => clean(ID),
    }
}

pub fn no_plugins(device: Option<&DeviceInfo>) -> CheckResult {
    const ID: &str = "no_plugins";
    let Some(d) = device else {
        return skipped(ID, NO_DEVICE);
    };
    let touch = d.touch_support || d.max_touch_points > 0;
    if d.plugin_count == 0 && !touch {
        flagged(ID, 0.5, "No browser plugins (common in automation)")
    } else {
        clean(ID)
    }
}

pub fn suspicious_user_agent(device: Option<&DeviceInfo>) -> CheckResult {
    const ID: &str = "suspicious_user_agent";
    let Some(d) = device else {
        return skipped(ID, NO_DEVICE);
    };
    if d.user_agent.is_empty() {
        return skipped(ID, "No user agent available");
    }
    if bot_user_agent_patterns().is_match(&d.user_agent) {
        failed(ID, 1.0, "Bot-like user agent detected")
    } else if d.user_agent.chars().count() < 20 {
        flagged(ID, 0.5, "Unusually short user agent")
    } else {
        clean(ID)
    }
}

pub fn device_fingerprint_mismatch(device: Option<&DeviceInfo>) -> CheckResult {
    const ID: &str = "device_fingerprint_mismatch";
    let Some(d) = device else {
        return skipped(ID, NO_DEVICE);
    };

    let mut issues = Vec::new();
    if d.touch_support && d.max_touch_points == 0 {
        issues.push("Touch support claimed but no touch points");
    }
    if d.screen_width < d.screen_avail_width || d.screen_height < d.screen_avail_height {
        issues.push("Available screen larger than total screen");
    }
    if d.hardware_concurrency > 128 {
        issues.push("Impossible CPU core count");
    }
    if d.device_memory > 256.0 {
        issues.push("Impossible memory amount");
    }
    if d.pixel_ratio <= 0.0 || d.pixel_ratio > 10.0 {
        issues.push("Invalid pixel ratio");
    }

    match issues.as_slice() {
        [] => clean(ID),
        [only] => flagged(ID, 0.4, *only),
        _ => failed(ID, 0.8, "Multiple device characteristic mismatches"),
    }
}

pub fn screen_anomaly(device: Option<&DeviceInfo>) -> CheckResult {
    const ID: &str = "screen_anomaly";
    let Some(d) = device else {
        return skipped(ID, NO_DEVICE);
    };
    let (w, h) = (d.screen_width, d.screen_height);
    if w <= 0 || h <= 0 {
        return failed(ID, 1.0, "Invalid screen dimensions");
    }
    if matches!((w, h), (800, 600) | (1024, 768) | (1, 1)) {
        return flagged(ID, 0.4, "Common automation screen size");
    }
    let aspect = w as f64 / h as f64;
    if !(0.3..=5.0).contains(&aspect) {
        flagged(ID, 0.5, "Unusual screen aspect ratio")
    } else {
        clean(ID)
    }
}

/// Browser offset sanity, extended with the IP versus browser timezone
/// comparison when one is available.
pub fn timezone_validation(
    device: Option<&DeviceInfo>,
    ip_timezone: Option<&TimezoneConsistency>,
) -> CheckResult {
    const ID: &str = "timezone_validation";
    let Some(d) = device else {
        return skipped(ID, NO_DEVICE);
    };
    if d.timezone.as_deref().map_or(true, str::is_empty) {
        return flagged(ID, 0.3, "No timezone information");
    }
    if d.timezone_offset < -840 || d.timezone_offset > 720 {
        return failed(ID, 0.7, "Invalid timezone offset");
    }
    match ip_timezone {
        Some(tz) if tz.is_region_mismatch() => failed(
            ID,
            tz.suspicion_score,
            tz.reason.clone().unwrap_or_default(),
        ),
        Some(tz) if !tz.is_consistent => {
            result(ID, true, tz.suspicion_score, tz.reason.clone())
        }
        _ => clean(ID),
    }
}
