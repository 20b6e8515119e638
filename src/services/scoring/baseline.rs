// Baseline Profiler & Deviation Detector
// Per-survey profiles of normal behavior, built from accepted responses,
// and z-scored comparison of new responses against them

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tracing::{debug, info};

use super::{EngineError, EngineResult};
use crate::models::BehavioralMetrics;
use crate::services::stats::{mean, median, normal_cdf, percentile, safe_div, std_dev};

/// Samples at which a profile reaches full confidence.
const FULL_CONFIDENCE_SAMPLES: f64 = 100.0;
/// Per-question times at or above this are treated as abandoned sessions.
const MAX_RESPONSE_TIME_MS: f64 = 600_000.0;
const TOP_USER_AGENTS: usize = 5;

// ============ Options ============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BaselineOptions {
    #[serde(default = "default_min_sample_size")]
    pub min_sample_size: usize,
    #[serde(default = "default_true")]
    pub exclude_flagged: bool,
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
    #[serde(default = "default_max_fraud_score")]
    pub max_fraud_score: f64,
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: i64,
}

impl Default for BaselineOptions {
    fn default() -> Self {
        Self {
            min_sample_size: default_min_sample_size(),
            exclude_flagged: true,
            max_samples: default_max_samples(),
            max_fraud_score: default_max_fraud_score(),
            max_age_hours: default_max_age_hours(),
        }
    }
}

fn default_min_sample_size() -> usize { 30 }
fn default_true() -> bool { true }
fn default_max_samples() -> usize { 1000 }
fn default_max_fraud_score() -> f64 { 0.5 }
fn default_max_age_hours() -> i64 { 24 }

// ============ Profile ============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimingStats {
    pub mean_response_time: f64,
    pub std_response_time: f64,
    pub median_response_time: f64,
    pub p95_response_time: f64,
    pub p5_response_time: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InteractionStats {
    pub mean_mouse_events: f64,
    pub std_mouse_events: f64,
    pub mean_keystrokes: f64,
    pub std_keystrokes: f64,
    pub mean_paste_events: f64,
    pub mean_tab_switches: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QualityStats {
    pub mean_text_length: f64,
    pub std_text_length: f64,
    pub typical_completion_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDistribution {
    pub mobile_percent: f64,
    pub desktop_percent: f64,
    pub tablet_percent: f64,
    pub common_user_agents: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BaselineProfile {
    pub survey_id: String,
    pub total_responses: usize,
    pub legitimate_responses: usize,
    pub timing: TimingStats,
    pub interaction: InteractionStats,
    pub quality: QualityStats,
    pub devices: DeviceDistribution,
    pub last_updated: DateTime<Utc>,
    /// `min(samples / 100, 1)`, and exactly 0 for the fallback profile.
    pub confidence: f64,
}

impl BaselineProfile {
    /// Conservative fallback used until a survey has enough accepted responses.
    pub fn fallback(survey_id: &str) -> Self {
        Self {
            survey_id: survey_id.to_string(),
            total_responses: 0,
            legitimate_responses: 0,
            timing: TimingStats {
                mean_response_time: 15000.0,
                std_response_time: 10000.0,
                median_response_time: 12000.0,
                p95_response_time: 35000.0,
                p5_response_time: 5000.0,
            },
            interaction: InteractionStats {
                mean_mouse_events: 50.0,
                std_mouse_events: 30.0,
                mean_keystrokes: 100.0,
                std_keystrokes: 50.0,
                mean_paste_events: 0.5,
                mean_tab_switches: 1.2,
            },
            quality: QualityStats {
                mean_text_length: 50.0,
                std_text_length: 30.0,
                typical_completion_rate: 0.85,
            },
            devices: DeviceDistribution {
                mobile_percent: 30.0,
                desktop_percent: 65.0,
                tablet_percent: 5.0,
                common_user_agents: Vec::new(),
            },
            last_updated: Utc::now(),
            confidence: 0.0,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.confidence > 0.0
    }

    pub fn is_stale(&self, max_age_hours: i64, now: DateTime<Utc>) -> bool {
        now - self.last_updated > Duration::hours(max_age_hours)
    }
}

// ============ Historical Responses ============

/// One stored survey submission, as read back for baseline building.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalResponse {
    #[serde(default)]
    pub responses: BTreeMap<String, Value>,
    #[serde(default)]
    pub response_times: Vec<f64>,
    #[serde(default)]
    pub mouse_event_count: usize,
    #[serde(default)]
    pub keystroke_count: usize,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub fraud_score: Option<f64>,
    #[serde(default)]
    pub is_flagged: Option<bool>,
    #[serde(default)]
    pub completed: bool,
}

impl HistoricalResponse {
    pub fn from_metrics(metrics: &BehavioralMetrics, responses: &BTreeMap<String, Value>) -> Self {
        Self {
            responses: responses.clone(),
            response_times: metrics.response_time.clone(),
            mouse_event_count: metrics.mouse_movements.len(),
            keystroke_count: metrics.keypress_count as usize,
            user_agent: metrics
                .device_fingerprint
                .as_ref()
                .and_then(|fp| fp.user_agent.clone()),
            fraud_score: None,
            is_flagged: Some(false),
            completed: true,
        }
    }
}

fn mobile_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)mobile|android|iphone").expect("valid regex"))
}

fn tablet_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)tablet|ipad").expect("valid regex"))
}

fn text_lengths(responses: &BTreeMap<String, Value>) -> impl Iterator<Item = usize> + '_ {
    responses
        .values()
        .filter_map(Value::as_str)
        .map(|s| s.chars().count())
}

fn top_user_agents(user_agents: &[&str], n: usize) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for ua in user_agents {
        *counts.entry(*ua).or_insert(0) += 1;
    }
    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    // Ties broken alphabetically so the list is stable
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.into_iter().take(n).map(|(ua, _)| ua.to_string()).collect()
}

/// Build a survey's baseline from its stored history.
///
/// Only completed responses count. With `exclude_flagged`, flagged responses
/// and those scored at or above `max_fraud_score` are dropped. Only the
/// newest `max_samples` usable responses are used, history being in append
/// order. Fewer than `min_sample_size` usable responses yields the fallback
/// profile with confidence 0.
pub fn build_baseline(
    survey_id: &str,
    history: &[HistoricalResponse],
    options: &BaselineOptions,
) -> BaselineProfile {
    let usable: Vec<&HistoricalResponse> = history
        .iter()
        .filter(|r| r.completed)
        .filter(|r| {
            !options.exclude_flagged
                || (!r.is_flagged.unwrap_or(false)
                    && r.fraud_score.map_or(true, |s| s < options.max_fraud_score))
        })
        .collect();
    let samples = &usable[usable.len().saturating_sub(options.max_samples)..];

    if samples.is_empty() || samples.len() < options.min_sample_size {
        debug!(
            "[BASELINE] survey {} has {} usable responses, using fallback",
            survey_id,
            samples.len()
        );
        return BaselineProfile::fallback(survey_id);
    }

    let response_times: Vec<f64> = samples
        .iter()
        .flat_map(|r| r.response_times.iter().copied())
        .filter(|t| *t > 0.0 && *t < MAX_RESPONSE_TIME_MS)
        .collect();

    let mouse_counts: Vec<f64> = samples
        .iter()
        .map(|r| r.mouse_event_count as f64)
        .filter(|c| *c > 0.0)
        .collect();

    let keystroke_counts: Vec<f64> = samples
        .iter()
        .map(|r| r.keystroke_count as f64)
        .filter(|c| *c > 0.0)
        .collect();

    let lengths: Vec<f64> = samples
        .iter()
        .flat_map(|r| text_lengths(&r.responses))
        .filter(|l| *l > 0)
        .map(|l| l as f64)
        .collect();

    let user_agents: Vec<&str> = samples
        .iter()
        .filter_map(|r| r.user_agent.as_deref())
        .filter(|ua| !ua.is_empty())
        .collect();
    let mobile = user_agents.iter().filter(|ua| mobile_pattern().is_match(ua)).count() as f64;
    let tablet = user_agents.iter().filter(|ua| tablet_pattern().is_match(ua)).count() as f64;
    let n = samples.len() as f64;

    info!(
        "[BASELINE] built survey {} from {} responses ({} timings)",
        survey_id,
        samples.len(),
        response_times.len()
    );

    BaselineProfile {
        survey_id: survey_id.to_string(),
        total_responses: samples.len(),
        legitimate_responses: samples.len(),
        timing: TimingStats {
            mean_response_time: mean(&response_times),
            std_response_time: std_dev(&response_times),
            median_response_time: median(&response_times),
            p95_response_time: percentile(&response_times, 0.95),
            p5_response_time: percentile(&response_times, 0.05),
        },
        interaction: InteractionStats {
            mean_mouse_events: mean(&mouse_counts),
            std_mouse_events: std_dev(&mouse_counts),
            mean_keystrokes: mean(&keystroke_counts),
            std_keystrokes: std_dev(&keystroke_counts),
            mean_paste_events: 0.5,
            mean_tab_switches: 1.2,
        },
        quality: QualityStats {
            mean_text_length: mean(&lengths),
            std_text_length: std_dev(&lengths),
            typical_completion_rate: 0.85,
        },
        devices: DeviceDistribution {
            mobile_percent: safe_div(mobile, n, 0.0) * 100.0,
            desktop_percent: safe_div(n - mobile - tablet, n, 0.0) * 100.0,
            tablet_percent: safe_div(tablet, n, 0.0) * 100.0,
            common_user_agents: top_user_agents(&user_agents, TOP_USER_AGENTS),
        },
        last_updated: Utc::now(),
        confidence: (n / FULL_CONFIDENCE_SAMPLES).min(1.0),
    }
}

// ============ Deviation Detection ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    ResponseTime,
    MouseActivity,
    Keystrokes,
    TextQuality,
}

impl Metric {
    pub fn key(self) -> &'static str {
        match self {
            Metric::ResponseTime => "response_time",
            Metric::MouseActivity => "mouse_activity",
            Metric::Keystrokes => "keystrokes",
            Metric::TextQuality => "text_quality",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn weight(self) -> f64 {
        match self {
            Severity::High => 0.4,
            Severity::Medium => 0.25,
            Severity::Low => 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Deviation {
    pub metric: Metric,
    pub severity: Severity,
    pub description: String,
    pub z_score: f64,
    pub percentile: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MetricComparison {
    pub value: f64,
    pub baseline: f64,
    pub z_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonMetrics {
    pub response_time: MetricComparison,
    pub mouse_activity: MetricComparison,
    pub keystrokes: MetricComparison,
    pub quality: MetricComparison,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviationAnalysis {
    pub is_anomalous: bool,
    pub deviation_score: f64,
    pub confidence: f64,
    pub deviations: Vec<Deviation>,
    pub comparison_metrics: ComparisonMetrics,
}

fn z_score(value: f64, mean: f64, std: f64) -> f64 {
    (value - mean) / std.max(1.0)
}

fn deviation(metric: Metric, severity: Severity, description: String, z: f64) -> Deviation {
    Deviation {
        metric,
        severity,
        description,
        z_score: z,
        percentile: normal_cdf(z),
    }
}

/// Compare one response against `baseline`.
///
/// Response time flags in both directions (|z| > 3 high, |z| > 2 medium).
/// Mouse and keystroke counts flag only unusually low activity. Text length
/// flags in both directions at |z| > 2 but only ever as low severity, and is
/// skipped when the response has no free-text answers.
pub fn compare_to_baseline(
    metrics: &BehavioralMetrics,
    responses: &BTreeMap<String, Value>,
    baseline: &BaselineProfile,
) -> DeviationAnalysis {
    let mut deviations = Vec::new();
    let mut comparison = ComparisonMetrics::default();

    if let Some(avg_time) = metrics.average_response_time() {
        let base = baseline.timing.mean_response_time;
        let z = z_score(avg_time, base, baseline.timing.std_response_time);
        comparison.response_time = MetricComparison {
            value: avg_time,
            baseline: base,
            z_score: z,
        };
        if z.abs() > 3.0 {
            let direction = if avg_time < base { "much faster" } else { "much slower" };
            deviations.push(deviation(
                Metric::ResponseTime,
                Severity::High,
                format!("Response time {} than typical ({:.1} std devs)", direction, z.abs()),
                z,
            ));
        } else if z.abs() > 2.0 {
            let direction = if avg_time < base { "faster" } else { "slower" };
            deviations.push(deviation(
                Metric::ResponseTime,
                Severity::Medium,
                format!("Response time {} than typical", direction),
                z,
            ));
        }
    }

    let mouse_count = metrics.mouse_movements.len() as f64;
    let mouse_z = z_score(
        mouse_count,
        baseline.interaction.mean_mouse_events,
        baseline.interaction.std_mouse_events,
    );
    comparison.mouse_activity = MetricComparison {
        value: mouse_count,
        baseline: baseline.interaction.mean_mouse_events,
        z_score: mouse_z,
    };
    if mouse_z < -2.0 {
        let severity = if mouse_z < -3.0 { Severity::High } else { Severity::Medium };
        deviations.push(deviation(
            Metric::MouseActivity,
            severity,
            format!(
                "Unusually low mouse activity ({:.1} std devs below average)",
                mouse_z.abs()
            ),
            mouse_z,
        ));
    }

    let keystrokes = metrics.keypress_count as f64;
    let key_z = z_score(
        keystrokes,
        baseline.interaction.mean_keystrokes,
        baseline.interaction.std_keystrokes,
    );
    comparison.keystrokes = MetricComparison {
        value: keystrokes,
        baseline: baseline.interaction.mean_keystrokes,
        z_score: key_z,
    };
    if key_z < -2.0 {
        let severity = if key_z < -3.0 { Severity::High } else { Severity::Medium };
        deviations.push(deviation(
            Metric::Keystrokes,
            severity,
            "Unusually low typing activity".to_string(),
            key_z,
        ));
    }

    let lengths: Vec<f64> = text_lengths(responses).map(|l| l as f64).collect();
    if !lengths.is_empty() {
        let avg_length = mean(&lengths);
        let z = z_score(
            avg_length,
            baseline.quality.mean_text_length,
            baseline.quality.std_text_length,
        );
        comparison.quality = MetricComparison {
            value: avg_length,
            baseline: baseline.quality.mean_text_length,
            z_score: z,
        };
        if z.abs() > 2.0 {
            let direction = if z > 0.0 { "longer" } else { "shorter" };
            deviations.push(deviation(
                Metric::TextQuality,
                Severity::Low,
                format!("Text length {} than typical", direction),
                z,
            ));
        }
    }

    let deviation_score = deviations
        .iter()
        .map(|d| d.severity.weight())
        .sum::<f64>()
        .min(1.0);
    let any_high = deviations.iter().any(|d| d.severity == Severity::High);

    DeviationAnalysis {
        is_anomalous: deviation_score > 0.5 || any_high,
        deviation_score,
        confidence: baseline.confidence,
        deviations,
        comparison_metrics: comparison,
    }
}

/// Fold one accepted response into the running means with weight
/// `1 / (n + 1)`. Standard deviations and percentiles are left untouched
/// until the next full rebuild.
pub fn update_baseline_incremental(
    baseline: &mut BaselineProfile,
    metrics: &BehavioralMetrics,
    now: DateTime<Utc>,
) {
    let n = baseline.legitimate_responses as f64;
    let alpha = 1.0 / (n + 1.0);
    let blend = |old: f64, new: f64| old * (1.0 - alpha) + new * alpha;

    if let Some(avg_time) = metrics.average_response_time() {
        baseline.timing.mean_response_time = blend(baseline.timing.mean_response_time, avg_time);
    }
    baseline.interaction.mean_mouse_events = blend(
        baseline.interaction.mean_mouse_events,
        metrics.mouse_movements.len() as f64,
    );
    baseline.interaction.mean_keystrokes = blend(
        baseline.interaction.mean_keystrokes,
        metrics.keypress_count as f64,
    );

    baseline.legitimate_responses += 1;
    baseline.last_updated = now;
    baseline.confidence = (baseline.legitimate_responses as f64 / FULL_CONFIDENCE_SAMPLES).min(1.0);
}

// ============ Storage ============

#[async_trait]
pub trait BaselineStore: Send + Sync {
    async fn load_profile(&self, survey_id: &str) -> EngineResult<Option<BaselineProfile>>;
    async fn save_profile(&self, profile: &BaselineProfile) -> EngineResult<()>;
    /// Stored history, oldest first.
    async fn history(&self, survey_id: &str) -> EngineResult<Vec<HistoricalResponse>>;
    /// Append a response, then drop the oldest entries beyond `keep`.
    async fn append_history(
        &self,
        survey_id: &str,
        response: HistoricalResponse,
        keep: usize,
    ) -> EngineResult<()>;
}

fn truncate_oldest(history: &mut Vec<HistoricalResponse>, keep: usize) {
    let excess = history.len().saturating_sub(keep);
    history.drain(..excess);
}

#[derive(Default)]
pub struct MemoryBaselineStore {
    profiles: RwLock<HashMap<String, BaselineProfile>>,
    history: RwLock<HashMap<String, Vec<HistoricalResponse>>>,
}

impl MemoryBaselineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_history(&self, survey_id: &str, responses: Vec<HistoricalResponse>) {
        self.history
            .write()
            .await
            .entry(survey_id.to_string())
            .or_default()
            .extend(responses);
    }
}

#[async_trait]
impl BaselineStore for MemoryBaselineStore {
    async fn load_profile(&self, survey_id: &str) -> EngineResult<Option<BaselineProfile>> {
        Ok(self.profiles.read().await.get(survey_id).cloned())
    }

    async fn save_profile(&self, profile: &BaselineProfile) -> EngineResult<()> {
        self.profiles
            .write()
            .await
            .insert(profile.survey_id.clone(), profile.clone());
        Ok(())
    }

    async fn history(&self, survey_id: &str) -> EngineResult<Vec<HistoricalResponse>> {
        Ok(self
            .history
            .read()
            .await
            .get(survey_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_history(
        &self,
        survey_id: &str,
        response: HistoricalResponse,
        keep: usize,
    ) -> EngineResult<()> {
        let mut history = self.history.write().await;
        let entries = history.entry(survey_id.to_string()).or_default();
        entries.push(response);
        truncate_oldest(entries, keep);
        Ok(())
    }
}

/// JSON files under a root directory: `profiles/<survey>.json` and
/// `history/<survey>.json`.
pub struct FileBaselineStore {
    root: PathBuf,
}

impl FileBaselineStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn file_name(survey_id: &str) -> String {
        let safe: String = survey_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("{}.json", safe)
    }

    fn profile_path(&self, survey_id: &str) -> PathBuf {
        self.root.join("profiles").join(Self::file_name(survey_id))
    }

    fn history_path(&self, survey_id: &str) -> PathBuf {
        self.root.join("history").join(Self::file_name(survey_id))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> EngineResult<Option<T>> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|e| EngineError::Storage(format!("Failed to parse {}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::Storage(format!("Failed to read {}: {}", path.display(), e))),
        }
    }

    async fn write_json<T: Serialize>(path: &PathBuf, value: &T) -> EngineResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| EngineError::Storage(format!("Failed to create dir: {}", e)))?;
        }
        let content = serde_json::to_string_pretty(value)
            .map_err(|e| EngineError::Storage(format!("Failed to serialize: {}", e)))?;
        // Write then rename so readers never see a partial file
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| EngineError::Storage(format!("Failed to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| EngineError::Storage(format!("Failed to replace {}: {}", path.display(), e)))
    }
}

#[async_trait]
impl BaselineStore for FileBaselineStore {
    async fn load_profile(&self, survey_id: &str) -> EngineResult<Option<BaselineProfile>> {
        Self::read_json(&self.profile_path(survey_id)).await
    }

    async fn save_profile(&self, profile: &BaselineProfile) -> EngineResult<()> {
        Self::write_json(&self.profile_path(&profile.survey_id), profile).await
    }

    async fn history(&self, survey_id: &str) -> EngineResult<Vec<HistoricalResponse>> {
        Ok(Self::read_json(&self.history_path(survey_id))
            .await?
            .unwrap_or_default())
    }

    async fn append_history(
        &self,
        survey_id: &str,
        response: HistoricalResponse,
        keep: usize,
    ) -> EngineResult<()> {
        let path = self.history_path(survey_id);
        let mut all: Vec<HistoricalResponse> = Self::read_json(&path).await?.unwrap_or_default();
        all.push(response);
        truncate_oldest(&mut all, keep);
        Self::write_json(&path, &all).await
    }
}

// ============ Service ============

/// Profile lifecycle on top of a store: lazy creation, rebuild when stale,
/// and incremental updates serialized per survey so concurrent accepts never
/// lose an update.
pub struct BaselineService {
    store: Arc<dyn BaselineStore>,
    options: BaselineOptions,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl BaselineService {
    pub fn new(store: Arc<dyn BaselineStore>, options: BaselineOptions) -> Self {
        Self {
            store,
            options,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> &BaselineOptions {
        &self.options
    }

    /// Drop the survey's lock entry once no task holds or awaits it.
    fn release_lock(&self, survey_id: &str, lock: Arc<AsyncMutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        drop(lock);
        if locks.get(survey_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(survey_id);
        }
    }

    fn survey_lock(&self, survey_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(survey_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Rebuild from stored history and persist.
    pub async fn rebuild(&self, survey_id: &str) -> EngineResult<BaselineProfile> {
        let lock = self.survey_lock(survey_id);
        let result = {
            let _guard = lock.lock().await;
            self.rebuild_locked(survey_id).await
        };
        self.release_lock(survey_id, lock);
        result
    }

    async fn rebuild_locked(&self, survey_id: &str) -> EngineResult<BaselineProfile> {
        let history = self.store.history(survey_id).await?;
        let profile = build_baseline(survey_id, &history, &self.options);
        self.store.save_profile(&profile).await?;
        Ok(profile)
    }

    async fn fresh_profile(&self, survey_id: &str) -> EngineResult<Option<BaselineProfile>> {
        Ok(self
            .store
            .load_profile(survey_id)
            .await?
            .filter(|p| !p.is_stale(self.options.max_age_hours, Utc::now())))
    }

    /// Current profile, building it when missing or older than `max_age_hours`.
    pub async fn get_or_build(&self, survey_id: &str) -> EngineResult<BaselineProfile> {
        if let Some(profile) = self.fresh_profile(survey_id).await? {
            return Ok(profile);
        }

        let lock = self.survey_lock(survey_id);
        let result = {
            let _guard = lock.lock().await;
            // Another task may have rebuilt while we waited
            match self.fresh_profile(survey_id).await {
                Ok(Some(profile)) => Ok(profile),
                Ok(None) => {
                    info!("[BASELINE] building profile for survey {}", survey_id);
                    self.rebuild_locked(survey_id).await
                }
                Err(e) => Err(e),
            }
        };
        self.release_lock(survey_id, lock);
        result
    }

    /// Record a response accepted as legitimate.
    ///
    /// The response is appended to history, which keeps at most
    /// `max_samples` entries. A trained profile is updated incrementally; an
    /// untrained one is rebuilt from history instead, so the fallback
    /// constants are never blended with real data.
    pub async fn record_legitimate(
        &self,
        survey_id: &str,
        metrics: &BehavioralMetrics,
        responses: &BTreeMap<String, Value>,
    ) -> EngineResult<BaselineProfile> {
        let lock = self.survey_lock(survey_id);
        let result = {
            let _guard = lock.lock().await;
            self.record_locked(survey_id, metrics, responses).await
        };
        self.release_lock(survey_id, lock);
        result
    }

    async fn record_locked(
        &self,
        survey_id: &str,
        metrics: &BehavioralMetrics,
        responses: &BTreeMap<String, Value>,
    ) -> EngineResult<BaselineProfile> {
        self.store
            .append_history(
                survey_id,
                HistoricalResponse::from_metrics(metrics, responses),
                self.options.max_samples,
            )
            .await?;

        let profile = match self.store.load_profile(survey_id).await? {
            Some(mut profile) if profile.is_trained() => {
                update_baseline_incremental(&mut profile, metrics, Utc::now());
                self.store.save_profile(&profile).await?;
                profile
            }
            _ => self.rebuild_locked(survey_id).await?,
        };

        debug!(
            "[BASELINE] survey {} now at {} legitimate responses (confidence {:.2})",
            survey_id, profile.legitimate_responses, profile.confidence
        );
        Ok(profile)
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceFingerprint, MouseMovement};
    use proptest::prelude::*;
    use serde_json::json;

    fn sample(i: usize) -> HistoricalResponse {
        let mut responses = BTreeMap::new();
        responses.insert("q1".to_string(), json!("x".repeat(40 + i % 20)));
        responses.insert("q2".to_string(), json!(3));
        HistoricalResponse {
            responses,
            response_times: vec![10000.0 + (i % 10) as f64 * 1000.0, 700_000.0],
            mouse_event_count: 40 + i % 20,
            keystroke_count: 80 + i % 40,
            user_agent: Some(if i % 3 == 0 {
                "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0) Mobile".to_string()
            } else {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120".to_string()
            }),
            fraud_score: Some(0.1),
            is_flagged: Some(false),
            completed: true,
        }
    }

    fn metrics_with(times: Vec<f64>, mouse: usize, keys: u32) -> BehavioralMetrics {
        BehavioralMetrics {
            response_time: times,
            mouse_movements: vec![MouseMovement::default(); mouse],
            keypress_count: keys,
            ..Default::default()
        }
    }

    #[test]
    fn test_insufficient_samples_use_fallback() {
        let history: Vec<_> = (0..10).map(sample).collect();
        let profile = build_baseline("s1", &history, &BaselineOptions::default());
        assert_eq!(profile.confidence, 0.0);
        assert_eq!(profile.timing.mean_response_time, 15000.0);
        assert_eq!(profile.timing.std_response_time, 10000.0);
        assert_eq!(profile.interaction.mean_mouse_events, 50.0);
        assert_eq!(profile.quality.mean_text_length, 50.0);
        assert_eq!(profile.devices.desktop_percent, 65.0);
        assert!(!profile.is_trained());
    }

    #[test]
    fn test_filters_exclude_flagged_and_risky() {
        let mut history: Vec<_> = (0..30).map(sample).collect();
        history[0].is_flagged = Some(true);
        history[1].fraud_score = Some(0.5);
        history[2].completed = false;
        let profile = build_baseline("s1", &history, &BaselineOptions::default());
        // 27 usable responses is below the minimum
        assert_eq!(profile.confidence, 0.0);

        let lenient = BaselineOptions {
            exclude_flagged: false,
            ..Default::default()
        };
        let profile = build_baseline("s1", &history, &lenient);
        assert_eq!(profile.total_responses, 29);
    }

    #[test]
    fn test_build_computes_statistics() {
        let history: Vec<_> = (0..50).map(sample).collect();
        let profile = build_baseline("s1", &history, &BaselineOptions::default());
        assert_eq!(profile.total_responses, 50);
        assert_eq!(profile.confidence, 0.5);
        // 700000ms outliers are dropped
        assert!(profile.timing.mean_response_time < 20000.0);
        assert_eq!(profile.timing.p5_response_time, 10000.0);
        assert_eq!(profile.timing.p95_response_time, 19000.0);
        assert!(profile.interaction.std_mouse_events > 0.0);
        // Only string answers count toward text length
        assert!(profile.quality.mean_text_length >= 40.0);
        assert!((profile.devices.mobile_percent - 34.0).abs() < 1e-9);
        assert!((profile.devices.mobile_percent + profile.devices.desktop_percent - 100.0).abs() < 1e-9);
        assert_eq!(profile.devices.common_user_agents.len(), 2);
    }

    fn timed(ms: f64) -> HistoricalResponse {
        HistoricalResponse {
            response_times: vec![ms],
            mouse_event_count: 50,
            keystroke_count: 100,
            fraud_score: Some(0.1),
            is_flagged: Some(false),
            completed: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_newest_samples_win_after_overflow() {
        let history: Vec<_> = std::iter::repeat_with(|| timed(10000.0))
            .take(1000)
            .chain(std::iter::repeat_with(|| timed(30000.0)).take(500))
            .collect();
        let profile = build_baseline("s1", &history, &BaselineOptions::default());
        assert_eq!(profile.total_responses, 1000);
        assert_eq!(profile.timing.mean_response_time, 20000.0);
        assert_eq!(profile.timing.p95_response_time, 30000.0);
    }

    #[test]
    fn test_max_samples_caps_history() {
        let history: Vec<_> = (0..300).map(sample).collect();
        let options = BaselineOptions {
            max_samples: 120,
            ..Default::default()
        };
        let profile = build_baseline("s1", &history, &options);
        assert_eq!(profile.total_responses, 120);
        assert_eq!(profile.confidence, 1.0);
    }

    #[test]
    fn test_matching_baseline_is_not_anomalous() {
        let baseline = BaselineProfile::fallback("s1");
        let metrics = metrics_with(vec![15000.0, 15000.0], 50, 100);
        let mut responses = BTreeMap::new();
        responses.insert("q1".to_string(), json!("y".repeat(50)));
        let analysis = compare_to_baseline(&metrics, &responses, &baseline);
        assert!(!analysis.is_anomalous);
        assert!(analysis.deviations.is_empty());
        assert_eq!(analysis.deviation_score, 0.0);
        let c = &analysis.comparison_metrics;
        assert!(c.response_time.z_score.abs() < 1e-12);
        assert!(c.mouse_activity.z_score.abs() < 1e-12);
        assert!(c.keystrokes.z_score.abs() < 1e-12);
        assert!(c.quality.z_score.abs() < 1e-12);
    }

    #[test]
    fn test_bot_like_response_is_anomalous() {
        let baseline = BaselineProfile::fallback("s1");
        // z(time) = (500 - 15000) / 10000 = -1.45, not flagged
        // z(mouse) = -50/30 = -1.67, not flagged
        // z(keys) = (0 - 100) / 50 = -2.0, not flagged (strict)
        let metrics = metrics_with(vec![500.0], 0, 0);
        let analysis = compare_to_baseline(&metrics, &BTreeMap::new(), &baseline);
        assert!(analysis.deviations.is_empty());

        let mut trained = baseline.clone();
        trained.timing.std_response_time = 2000.0;
        trained.interaction.std_mouse_events = 10.0;
        trained.interaction.std_keystrokes = 20.0;
        let analysis = compare_to_baseline(&metrics, &BTreeMap::new(), &trained);
        assert!(analysis.is_anomalous);
        assert_eq!(analysis.deviations.len(), 3);
        assert!(analysis.deviations.iter().all(|d| d.severity == Severity::High));
        assert_eq!(analysis.deviation_score, 1.0);
        assert_eq!(analysis.deviations[0].metric, Metric::ResponseTime);
        assert!(analysis.deviations[0].description.contains("much faster"));
        assert!(analysis.deviations[0].percentile < 0.001);
    }

    #[test]
    fn test_high_activity_is_not_flagged() {
        let baseline = BaselineProfile::fallback("s1");
        let metrics = metrics_with(vec![15000.0], 500, 1000);
        let analysis = compare_to_baseline(&metrics, &BTreeMap::new(), &baseline);
        assert!(analysis.deviations.is_empty());
    }

    #[test]
    fn test_text_length_is_low_severity_both_ways() {
        let baseline = BaselineProfile::fallback("s1");
        let metrics = metrics_with(vec![15000.0], 50, 100);
        let mut responses = BTreeMap::new();
        responses.insert("q1".to_string(), json!("z".repeat(200)));
        let analysis = compare_to_baseline(&metrics, &responses, &baseline);
        assert_eq!(analysis.deviations.len(), 1);
        assert_eq!(analysis.deviations[0].severity, Severity::Low);
        assert_eq!(analysis.deviations[0].metric, Metric::TextQuality);
        assert!((analysis.deviation_score - 0.1).abs() < 1e-12);
        assert!(!analysis.is_anomalous);
    }

    #[test]
    fn test_incremental_update() {
        let history: Vec<_> = (0..50).map(sample).collect();
        let mut profile = build_baseline("s1", &history, &BaselineOptions::default());
        let before = profile.clone();
        let metrics = metrics_with(vec![30000.0], 100, 200);
        let now = Utc::now();
        update_baseline_incremental(&mut profile, &metrics, now);

        let alpha = 1.0 / 51.0;
        let expected = before.timing.mean_response_time * (1.0 - alpha) + 30000.0 * alpha;
        assert!((profile.timing.mean_response_time - expected).abs() < 1e-9);
        assert_eq!(profile.legitimate_responses, 51);
        assert_eq!(profile.confidence, 0.51);
        assert_eq!(profile.last_updated, now);
        assert_eq!(profile.timing.std_response_time, before.timing.std_response_time);
        assert_eq!(profile.timing.p95_response_time, before.timing.p95_response_time);
    }

    #[test]
    fn test_incremental_update_without_timings_keeps_mean() {
        let mut profile = BaselineProfile::fallback("s1");
        profile.legitimate_responses = 40;
        profile.confidence = 0.4;
        update_baseline_incremental(&mut profile, &metrics_with(vec![], 10, 10), Utc::now());
        assert_eq!(profile.timing.mean_response_time, 15000.0);
        assert_eq!(profile.legitimate_responses, 41);
    }

    #[test]
    fn test_staleness() {
        let mut profile = BaselineProfile::fallback("s1");
        let now = Utc::now();
        profile.last_updated = now - Duration::hours(25);
        assert!(profile.is_stale(24, now));
        profile.last_updated = now - Duration::hours(1);
        assert!(!profile.is_stale(24, now));
    }

    proptest! {
        #[test]
        fn prop_profile_json_roundtrip_is_exact(
            mean_t in 0.0f64..1e6, std_t in 0.0f64..1e5, mouse in 0.0f64..1e4,
            keys in 0.0f64..1e4, text in 0.0f64..1e4, conf in 0.0f64..=1.0,
            mobile in 0.0f64..100.0
        ) {
            let mut profile = BaselineProfile::fallback("roundtrip");
            profile.timing.mean_response_time = mean_t;
            profile.timing.std_response_time = std_t;
            profile.interaction.mean_mouse_events = mouse;
            profile.interaction.mean_keystrokes = keys;
            profile.quality.mean_text_length = text;
            profile.devices.mobile_percent = mobile;
            profile.devices.desktop_percent = 100.0 - mobile;
            profile.confidence = conf;
            let json = serde_json::to_string(&profile).unwrap();
            let back: BaselineProfile = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(back, profile);
        }
    }

    #[tokio::test]
    async fn test_service_lazily_builds_and_caches() {
        let store = Arc::new(MemoryBaselineStore::new());
        store.seed_history("s1", (0..40).map(sample).collect()).await;
        let service = BaselineService::new(store.clone(), BaselineOptions::default());

        assert!(store.load_profile("s1").await.unwrap().is_none());
        let profile = service.get_or_build("s1").await.unwrap();
        assert_eq!(profile.total_responses, 40);
        assert!(store.load_profile("s1").await.unwrap().is_some());

        let unknown = service.get_or_build("other").await.unwrap();
        assert_eq!(unknown.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_service_rebuilds_stale_profile() {
        let store = Arc::new(MemoryBaselineStore::new());
        let mut stale = BaselineProfile::fallback("s1");
        stale.last_updated = Utc::now() - Duration::hours(48);
        store.save_profile(&stale).await.unwrap();
        store.seed_history("s1", (0..35).map(sample).collect()).await;

        let service = BaselineService::new(store, BaselineOptions::default());
        let profile = service.get_or_build("s1").await.unwrap();
        assert_eq!(profile.total_responses, 35);
        assert!(profile.is_trained());
    }

    #[tokio::test]
    async fn test_concurrent_accepts_are_serialized() {
        let store = Arc::new(MemoryBaselineStore::new());
        store.seed_history("s1", (0..50).map(sample).collect()).await;
        let service = Arc::new(BaselineService::new(store.clone(), BaselineOptions::default()));
        service.get_or_build("s1").await.unwrap();

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..20 {
            let service = service.clone();
            tasks.spawn(async move {
                let metrics = metrics_with(vec![12000.0], 30, 60);
                service.record_legitimate("s1", &metrics, &BTreeMap::new()).await
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }

        let profile = store.load_profile("s1").await.unwrap().unwrap();
        assert_eq!(profile.legitimate_responses, 70);
        assert_eq!(store.history("s1").await.unwrap().len(), 70);
    }

    #[tokio::test]
    async fn test_untrained_profile_is_rebuilt_not_blended() {
        let store = Arc::new(MemoryBaselineStore::new());
        store.seed_history("s1", (0..29).map(sample).collect()).await;
        let service = BaselineService::new(store, BaselineOptions::default());
        assert!(!service.get_or_build("s1").await.unwrap().is_trained());

        let metrics = BehavioralMetrics {
            response_time: vec![11000.0],
            mouse_movements: vec![MouseMovement::default(); 45],
            keypress_count: 90,
            device_fingerprint: Some(DeviceFingerprint::default()),
            ..Default::default()
        };
        let profile = service
            .record_legitimate("s1", &metrics, &BTreeMap::new())
            .await
            .unwrap();
        assert!(profile.is_trained());
        assert_eq!(profile.total_responses, 30);
        assert_eq!(profile.confidence, 0.3);
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBaselineStore::new(dir.path().to_path_buf());
        assert!(store.load_profile("survey/1").await.unwrap().is_none());

        let profile = BaselineProfile::fallback("survey/1");
        store.save_profile(&profile).await.unwrap();
        let loaded = store.load_profile("survey/1").await.unwrap().unwrap();
        assert_eq!(loaded, profile);
        assert!(dir.path().join("profiles").join("survey_1.json").exists());

        store.append_history("survey/1", sample(1), 10).await.unwrap();
        store.append_history("survey/1", sample(2), 10).await.unwrap();
        assert_eq!(store.history("survey/1").await.unwrap().len(), 2);

        for i in 0..5 {
            store.append_history("survey/1", timed(20000.0 + i as f64), 3).await.unwrap();
        }
        let kept = store.history("survey/1").await.unwrap();
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].response_times, vec![20002.0]);
        assert_eq!(kept[2].response_times, vec![20004.0]);
    }

    #[tokio::test]
    async fn test_accepted_history_is_capped() {
        let store = Arc::new(MemoryBaselineStore::new());
        store.seed_history("s1", (0..40).map(sample).collect()).await;
        let options = BaselineOptions {
            max_samples: 40,
            ..Default::default()
        };
        let service = BaselineService::new(store.clone(), options);

        let metrics = metrics_with(vec![25000.0], 30, 60);
        for _ in 0..5 {
            service.record_legitimate("s1", &metrics, &BTreeMap::new()).await.unwrap();
        }
        let history = store.history("s1").await.unwrap();
        assert_eq!(history.len(), 40);
        assert_eq!(history.last().unwrap().response_times, vec![25000.0]);
    }

    #[tokio::test]
    async fn test_survey_locks_are_released() {
        let store = Arc::new(MemoryBaselineStore::new());
        store.seed_history("s1", (0..40).map(sample).collect()).await;
        let service = Arc::new(BaselineService::new(store, BaselineOptions::default()));

        service.get_or_build("s1").await.unwrap();
        service.rebuild("s2").await.unwrap();
        let metrics = metrics_with(vec![12000.0], 30, 60);
        service.record_legitimate("s3", &metrics, &BTreeMap::new()).await.unwrap();
        assert_eq!(service.tracked_locks(), 0);

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..10 {
            let service = service.clone();
            tasks.spawn(async move {
                let metrics = metrics_with(vec![12000.0], 30, 60);
                let survey = format!("s{}", i % 3);
                service.record_legitimate(&survey, &metrics, &BTreeMap::new()).await
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }
        assert_eq!(service.tracked_locks(), 0);
    }
}
