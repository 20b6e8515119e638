// Tier Orchestrator
// Runs a tier's detector bundle with collaborators dispatched concurrently,
// maps every collaborator failure to "not observed", then assembles either
// the tiered check response or the full assessment

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::baseline::{compare_to_baseline, BaselineProfile, BaselineService, DeviationAnalysis};
use super::bayesian::calculate_fraud_probability;
use super::checks::{run_local_check, CheckInput};
use super::evidence::build_evidence_signals;
use super::heuristics::{
    analyze_behavior, assess_quality, behavioral_score, detect_templates,
    find_duplicate_answers, text_answers, validate_timezone, ContentFlags,
};
use super::registry::EvidenceRegistry;
use super::reporter::{
    build_evidence, build_findings, build_reasoning, build_recommendations, build_summary,
    category_scores, CollectedEvidence,
};
use super::risk::{determine_risk_level, is_likely_fraud, threshold_recommendation, validate_thresholds};
use super::tiers::{
    category_unlocked, check_unlocked, checks_for_tier, display_name, source_unlocked,
    validate_tier, CheckCategory, CheckSource,
};
use super::{EngineError, EngineResult};
use crate::models::{
    Assessment, AssessmentRequest, CheckResult, ValidationMeta, ValidationResult,
};
use crate::services::config_store::EngineConfig;
use crate::services::providers::{Collaborators, FingerprintHeuristics, IpApiReputation, ProviderError};
use crate::services::stats::mean;

/// AI probability at which `ai_content_basic` fails even without a verdict.
const AI_FAIL_PROBABILITY: f64 = 0.7;
const AI_FULL_FAIL_PROBABILITY: f64 = 0.5;
const FULL_MIN_CONSISTENCY: f64 = 0.8;
const PLAGIARISM_FULL_FAIL_SCORE: f64 = 0.3;
const VPN_SCORE: f64 = 0.65;
const DATACENTER_SCORE: f64 = 0.55;
const TOR_SCORE: f64 = 0.9;
const PROXY_SCORE: f64 = 0.6;

pub struct ScoringEngine {
    config: EngineConfig,
    registry: EvidenceRegistry,
    collaborators: Collaborators,
    baseline: Option<Arc<BaselineService>>,
}

impl ScoringEngine {
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> EngineResult<Self> {
        config.validate()?;
        let registry = config.registry()?;
        Ok(Self {
            config,
            registry,
            collaborators,
            baseline: None,
        })
    }

    /// Engine wired only from configuration. The ip-api adapter is attached
    /// when enabled; every other collaborator slot stays empty.
    pub fn from_config(config: EngineConfig) -> EngineResult<Self> {
        let mut collaborators = Collaborators::new();
        if config.ip_reputation.enabled {
            let adapter = IpApiReputation::new(
                config.ip_reputation.base_url.as_deref(),
                config.collaborator_timeout_ms,
            )
            .map_err(|e| EngineError::Config(format!("Failed to build IP reputation client: {}", e)))?;
            info!("[ORCHESTRATOR] IP reputation lookups via {}", adapter.base_url());
            collaborators = collaborators.with_ip_reputation(Arc::new(adapter));
        }
        Self::new(config, collaborators)
    }

    pub fn with_baseline(mut self, service: Arc<BaselineService>) -> Self {
        self.baseline = Some(service);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &EvidenceRegistry {
        &self.registry
    }

    /// The request's tier, or the configured default when it names none.
    fn resolve_tier(&self, req: &AssessmentRequest) -> EngineResult<u8> {
        validate_tier(req.tier.unwrap_or(self.config.default_tier))
    }

    /// Quick per-check validation scored against the request's thresholds.
    pub async fn run_tiered_check(&self, req: &AssessmentRequest) -> EngineResult<ValidationResult> {
        let start = Instant::now();
        let tier = self.resolve_tier(req)?;
        validate_thresholds(&req.thresholds)?;

        let collected = self.gather(req, tier).await;
        let input = CheckInput {
            request: req,
            ip_timezone: collected.timezone.as_ref(),
        };

        let checks: Vec<CheckResult> = checks_for_tier(tier)
            .into_iter()
            .filter_map(|def| match def.source {
                CheckSource::Local => run_local_check(def.id, &input),
                _ => collaborator_check(def.id, &collected),
            })
            .collect();

        let suspicion: Vec<f64> = checks.iter().map(|c| c.score).collect();
        let score = (1.0 - mean(&suspicion)).clamp(0.0, 1.0);
        let (passed, recommendation) = threshold_recommendation(score, &req.thresholds);
        let confidence = (0.5 + 0.02 * checks.len() as f64).min(1.0);
        let flags = checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| display_name(&c.check_id).to_string())
            .collect();
        let summary = build_summary(score, recommendation, &checks);
        let checks_passed = checks.iter().filter(|c| c.passed).count();
        let processing_time_ms = start.elapsed().as_millis() as u64;

        info!(
            "[ORCHESTRATOR] Tier {} check: {} run, {} passed, score {:.3} -> {} ({}ms)",
            tier,
            checks.len(),
            checks_passed,
            score,
            recommendation.as_str(),
            processing_time_ms
        );

        Ok(ValidationResult {
            score,
            passed,
            recommendation,
            confidence,
            flags,
            summary,
            meta: ValidationMeta {
                tier,
                processing_time_ms,
                checks_run: checks.len(),
                checks_passed,
                request_id: format!("req_{}", Uuid::new_v4()),
                timestamp: Utc::now().timestamp_millis(),
            },
            checks,
        })
    }

    /// Full assessment: evidence fusion, risk classification and report.
    pub async fn assess(&self, req: &AssessmentRequest) -> EngineResult<Assessment> {
        let start = Instant::now();
        let tier = self.resolve_tier(req)?;
        validate_thresholds(&req.thresholds)?;

        let collected = self.gather(req, tier).await;
        let signals = build_evidence_signals(&self.registry, &collected.detection_results());
        let bayes = calculate_fraud_probability(&signals, self.config.prior_fraud_rate);
        let risk_level = determine_risk_level(bayes.fraud_probability, bayes.confidence);
        let scores = category_scores(&collected);

        info!(
            "[ORCHESTRATOR] Tier {} assessment: p={:.4} conf={:.3} risk={} ({} of {} signals, {}ms)",
            tier,
            bayes.fraud_probability,
            bayes.confidence,
            risk_level.as_str(),
            bayes.evidence_count,
            signals.len(),
            start.elapsed().as_millis()
        );

        Ok(Assessment {
            overall_risk_score: bayes.fraud_probability,
            risk_level,
            is_likely_fraud: is_likely_fraud(risk_level),
            confidence: bayes.confidence,
            confidence_interval: bayes.confidence_interval,
            findings: build_findings(&collected, &req.behavioral_metrics),
            recommendations: build_recommendations(risk_level, &scores, &collected),
            evidence: build_evidence(&collected, &req.behavioral_metrics),
            reasoning: build_reasoning(&collected),
            scores,
            tier,
            evidence_count: bayes.evidence_count,
        })
    }

    /// Feed a response the caller accepted as legitimate into its survey
    /// baseline. `None` when no baseline service or survey id is present.
    pub async fn record_accepted(
        &self,
        req: &AssessmentRequest,
    ) -> EngineResult<Option<BaselineProfile>> {
        let (Some(service), Some(survey_id)) = (&self.baseline, req.context.survey_id.as_deref())
        else {
            return Ok(None);
        };
        service
            .record_legitimate(survey_id, &req.behavioral_metrics, &req.responses)
            .await
            .map(Some)
    }

    async fn gather(&self, req: &AssessmentRequest, tier: u8) -> CollectedEvidence {
        let timeout_ms = self.config.collaborator_timeout_ms;
        let texts: Vec<String> = text_answers(&req.responses)
            .into_iter()
            .map(str::to_string)
            .collect();
        let questions: Vec<String> = req.questions.values().cloned().collect();
        // Only a client-collected fingerprint feeds the automation heuristics
        let fingerprint = req.behavioral_metrics.device_fingerprint.as_ref();
        let survey_id = req.context.survey_id.as_deref().filter(|s| !s.is_empty());
        let ip_address = req.context.ip_address.as_deref().filter(|s| !s.is_empty());
        let c = &self.collaborators;

        let ai_text = async {
            let detector = c.ai_detector.as_ref()?;
            if !source_unlocked(CheckSource::AiText, tier) || texts.is_empty() {
                return None;
            }
            isolate("ai_text", timeout_ms, detector.analyze(&texts, &questions, &req.context)).await
        };
        let plagiarism = async {
            let checker = c.plagiarism.as_ref()?;
            if !source_unlocked(CheckSource::Plagiarism, tier) || texts.is_empty() {
                return None;
            }
            isolate("plagiarism", timeout_ms, checker.check(&texts)).await
        };
        let contradictions = async {
            let detector = c.contradictions.as_ref()?;
            if !source_unlocked(CheckSource::Contradictions, tier) || req.responses.is_empty() {
                return None;
            }
            isolate(
                "contradictions",
                timeout_ms,
                detector.detect(&req.responses, &req.questions),
            )
            .await
        };
        let ip_risk = async {
            let lookup = c.ip_reputation.as_ref()?;
            let ip = ip_address.filter(|_| source_unlocked(CheckSource::IpReputation, tier))?;
            isolate("ip_reputation", timeout_ms, lookup.lookup(ip)).await
        };
        let automation = async {
            let fp = fingerprint.filter(|_| category_unlocked(CheckCategory::Device, tier))?;
            match &c.fingerprint {
                Some(analyzer) => isolate("fingerprint", timeout_ms, analyzer.detect_automation(fp)).await,
                None => Some(FingerprintHeuristics::evaluate(fp)),
            }
        };
        let fraud_ring = async {
            let detector = c.fraud_ring.as_ref()?;
            let id = survey_id.filter(|_| source_unlocked(CheckSource::FraudRing, tier))?;
            isolate(
                "fraud_ring",
                timeout_ms,
                detector.correlate(id, &req.responses, &req.context),
            )
            .await
        };
        let deviation = async {
            let service = self.baseline.as_ref()?;
            let id = survey_id.filter(|_| source_unlocked(CheckSource::Baseline, tier))?;
            deviation_for(service, id, req).await
        };

        debug!("[ORCHESTRATOR] Dispatching tier {} collaborators", tier);
        let (ai_text, plagiarism, contradictions, ip_risk, automation, fraud_ring, deviation) = tokio::join!(
            ai_text,
            plagiarism,
            contradictions,
            ip_risk,
            automation,
            fraud_ring,
            deviation
        );

        let metrics = &req.behavioral_metrics;
        let templates = detect_templates(&req.responses);
        let duplicates = find_duplicate_answers(&req.responses);
        let content = ContentFlags::from_analyses(&templates, &duplicates);

        let browser_timezone = fingerprint
            .and_then(|f| f.timezone.as_deref())
            .or_else(|| req.device_info.as_ref().and_then(|d| d.timezone.as_deref()));
        let timezone = match (&ip_risk, browser_timezone) {
            (Some(report), Some(browser)) if check_unlocked("timezone_validation", tier) => {
                Some(validate_timezone(report.timezone.as_deref(), Some(browser)))
            }
            _ => None,
        };

        CollectedEvidence {
            ai_text,
            plagiarism,
            contradictions,
            ip_risk,
            automation,
            fraud_ring,
            behavioral: Some(analyze_behavior(metrics)),
            behavioral_score: Some(behavioral_score(metrics)),
            templates: Some(templates),
            duplicates: Some(duplicates),
            content: Some(content),
            quality: Some(assess_quality(metrics, &req.responses, &req.context)),
            timezone,
            deviation,
        }
    }
}

/// Await one collaborator call under the per-call timeout. Errors and
/// timeouts are logged and become `None`.
async fn isolate<T, F>(name: &str, timeout_ms: u64, call: F) -> Option<T>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    let outcome = match tokio::time::timeout(Duration::from_millis(timeout_ms), call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout {
            name: name.to_string(),
            ms: timeout_ms,
        }),
    };
    match outcome {
        Ok(report) => Some(report),
        Err(e) => {
            warn!(check = name, error = %e, "[ORCHESTRATOR] Collaborator failed, treated as not observed");
            None
        }
    }
}

/// Deviation against the survey baseline. An untrained profile is never
/// compared, so fallback constants cannot raise deviations.
async fn deviation_for(
    service: &BaselineService,
    survey_id: &str,
    req: &AssessmentRequest,
) -> Option<DeviationAnalysis> {
    match service.get_or_build(survey_id).await {
        Ok(profile) if profile.is_trained() => Some(compare_to_baseline(
            &req.behavioral_metrics,
            &req.responses,
            &profile,
        )),
        Ok(_) => {
            debug!("[ORCHESTRATOR] Baseline for survey {} not trained yet", survey_id);
            None
        }
        Err(e) => {
            warn!(check = "baseline", error = %e, "[ORCHESTRATOR] Baseline unavailable, treated as not observed");
            None
        }
    }
}

fn outcome(id: &str, passed: bool, score: f64, details: String) -> CheckResult {
    CheckResult {
        check_id: id.to_string(),
        passed,
        score: score.clamp(0.0, 1.0),
        details: (!passed).then_some(details),
    }
}

/// Checks backed by a collaborator or the baseline. `None` when the source
/// did not report, so the check is left out of the response.
fn collaborator_check(id: &str, collected: &CollectedEvidence) -> Option<CheckResult> {
    let check = match id {
        "ai_content_basic" => {
            let ai = collected.ai_text.as_ref()?;
            let passed = !ai.is_ai_generated && ai.ai_probability < AI_FAIL_PROBABILITY;
            outcome(
                id,
                passed,
                ai.ai_probability,
                format!("AI-generated content probability {:.0}%", ai.ai_probability * 100.0),
            )
        }
        "contradiction_basic" => {
            let report = collected.contradictions.as_ref()?;
            let details = match report.contradictions.first() {
                Some(first) => format!("{} contradiction(s): {}", report.contradictions.len(), first),
                None => "Inconsistent answers detected".to_string(),
            };
            outcome(
                id,
                !report.has_contradictions,
                1.0 - report.consistency_score,
                details,
            )
        }
        "ai_content_full" => {
            let ai = collected.ai_text.as_ref()?;
            let passed = !ai.is_ai_generated && ai.ai_probability < AI_FULL_FAIL_PROBABILITY;
            let details = if ai.ai_indicators.is_empty() {
                format!("AI-generated content probability {:.0}%", ai.ai_probability * 100.0)
            } else {
                format!(
                    "AI-generated content probability {:.0}%: {}",
                    ai.ai_probability * 100.0,
                    ai.ai_indicators.join(", ")
                )
            };
            outcome(id, passed, ai.ai_probability, details)
        }
        "perplexity_analysis" => {
            let ai = collected.ai_text.as_ref()?;
            let cited = ai.ai_indicators.iter().find(|i| {
                let lower = i.to_lowercase();
                lower.contains("perplexity") || lower.contains("predictab")
            });
            match cited {
                Some(indicator) => outcome(id, false, ai.ai_probability, indicator.clone()),
                None => outcome(id, true, 0.0, String::new()),
            }
        }
        "contradiction_full" => {
            let report = collected.contradictions.as_ref()?;
            let passed = !report.has_contradictions && report.consistency_score >= FULL_MIN_CONSISTENCY;
            let details = if report.contradictions.is_empty() {
                format!("Consistency score {:.2}", report.consistency_score)
            } else {
                report.contradictions.join("; ")
            };
            outcome(id, passed, 1.0 - report.consistency_score, details)
        }
        "plagiarism_full" => {
            let report = collected.plagiarism.as_ref()?;
            let passed = !report.is_plagiarized && report.plagiarism_score < PLAGIARISM_FULL_FAIL_SCORE;
            let mut details = format!("Plagiarism score {:.2}", report.plagiarism_score);
            if !report.matches.is_empty() {
                let sources: Vec<&str> = report.matches.iter().map(|m| m.source_url.as_str()).collect();
                details.push_str(&format!(", matched: {}", sources.join(", ")));
            }
            outcome(id, passed, report.plagiarism_score, details)
        }
        "fraud_ring_detection" => {
            let ring = collected.fraud_ring.as_ref()?;
            let links: Vec<&str> = [
                (ring.answer_sharing, "shared answers"),
                (ring.coordinated_timing, "coordinated timing"),
                (ring.device_sharing, "shared device"),
                (ring.ip_sharing, "shared IP"),
            ]
            .into_iter()
            .filter_map(|(hit, label)| hit.then_some(label))
            .collect();
            outcome(
                id,
                links.is_empty(),
                if links.is_empty() { 0.0 } else { ring.confidence },
                format!("Linked to other respondents by {}", links.join(", ")),
            )
        }
        "plagiarism_basic" => {
            let report = collected.plagiarism.as_ref()?;
            outcome(
                id,
                !report.is_plagiarized,
                report.plagiarism_score,
                format!("Found {} matching source(s)", report.matches.len()),
            )
        }
        "vpn_detection" => {
            let ip = collected.ip_risk.as_ref()?;
            outcome(id, !ip.is_vpn, if ip.is_vpn { VPN_SCORE } else { 0.0 }, "VPN detected".to_string())
        }
        "datacenter_ip" => {
            let ip = collected.ip_risk.as_ref()?;
            outcome(
                id,
                !ip.is_data_center,
                if ip.is_data_center { DATACENTER_SCORE } else { 0.0 },
                "Data center IP".to_string(),
            )
        }
        "tor_detection" => {
            let is_tor = collected.ip_risk.as_ref()?.is_tor?;
            outcome(id, !is_tor, if is_tor { TOR_SCORE } else { 0.0 }, "Tor exit node detected".to_string())
        }
        "proxy_detection" => {
            let ip = collected.ip_risk.as_ref()?;
            outcome(
                id,
                !ip.is_proxy,
                if ip.is_proxy { PROXY_SCORE } else { 0.0 },
                "Proxy server detected".to_string(),
            )
        }
        "answer_sharing" | "coordinated_timing" | "device_sharing" => {
            let ring = collected.fraud_ring.as_ref()?;
            let (hit, details) = match id {
                "answer_sharing" => (ring.answer_sharing, "Answers shared with other respondents"),
                "coordinated_timing" => (ring.coordinated_timing, "Submission timing coordinated with other respondents"),
                _ => (ring.device_sharing, "Device shared with other respondents"),
            };
            outcome(id, !hit, if hit { ring.confidence } else { 0.0 }, details.to_string())
        }
        "baseline_deviation" => {
            let analysis = collected.deviation.as_ref()?;
            let details = analysis
                .deviations
                .iter()
                .map(|d| d.description.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            outcome(id, !analysis.is_anomalous, analysis.deviation_score, details)
        }
        _ => return None,
    };
    Some(check)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceFingerprint, DeviceInfo, MouseMovement, SurveyContext};
    use crate::services::providers::{
        AiTextDetector, AiTextReport, FraudRingDetector, FraudRingReport, IpReputationLookup,
        IpReputationReport, PlagiarismChecker, PlagiarismReport,
    };
    use crate::services::scoring::baseline::{HistoricalResponse, MemoryBaselineStore};
    use crate::models::RiskLevel;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeAi {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AiTextDetector for FakeAi {
        async fn analyze(
            &self,
            _texts: &[String],
            _questions: &[String],
            _context: &SurveyContext,
        ) -> Result<AiTextReport, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AiTextReport {
                ai_probability: 0.92,
                is_ai_generated: true,
                confidence: 0.8,
                ai_indicators: vec!["Overly formal tone".into(), "Hedging language".into()],
                human_indicators: vec![],
                explanation: Some("Uniform register across answers".into()),
            })
        }
    }

    struct BrokenPlagiarism;

    #[async_trait]
    impl PlagiarismChecker for BrokenPlagiarism {
        async fn check(&self, _texts: &[String]) -> Result<PlagiarismReport, ProviderError> {
            Err(ProviderError::Unavailable("search index offline".into()))
        }
    }

    struct SlowIp;

    #[async_trait]
    impl IpReputationLookup for SlowIp {
        async fn lookup(&self, _ip: &str) -> Result<IpReputationReport, ProviderError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(IpReputationReport::default())
        }
    }

    struct TorIp;

    #[async_trait]
    impl IpReputationLookup for TorIp {
        async fn lookup(&self, _ip: &str) -> Result<IpReputationReport, ProviderError> {
            Ok(IpReputationReport {
                risk_score: 0.8,
                is_tor: Some(true),
                is_proxy: true,
                timezone: Some("Asia/Tokyo".into()),
                ..Default::default()
            })
        }
    }

    struct SharedDeviceRing;

    #[async_trait]
    impl FraudRingDetector for SharedDeviceRing {
        async fn correlate(
            &self,
            _survey_id: &str,
            _responses: &BTreeMap<String, Value>,
            _context: &SurveyContext,
        ) -> Result<FraudRingReport, ProviderError> {
            Ok(FraudRingReport {
                answer_sharing: false,
                coordinated_timing: false,
                device_sharing: true,
                ip_sharing: true,
                confidence: 0.75,
                explanation: None,
            })
        }
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
            collaborator_timeout_ms: 50,
            ..Default::default()
        }
    }

    fn request(tier: u8) -> AssessmentRequest {
        let mut responses = BTreeMap::new();
        responses.insert(
            "q1".to_string(),
            json!("I mostly use the mobile app on my commute and the sync has been reliable"),
        );
        responses.insert("q2".to_string(), json!(4));
        let mut questions = BTreeMap::new();
        questions.insert("q1".to_string(), "How do you use the product?".to_string());
        questions.insert("q2".to_string(), "Rate your experience".to_string());

        AssessmentRequest {
            responses,
            questions,
            behavioral_metrics: crate::models::BehavioralMetrics {
                response_time: vec![12000.0, 9000.0, 15000.0],
                mouse_movements: (0..40)
                    .map(|i| MouseMovement {
                        x: (i * 7 % 50) as f64 * 3.0,
                        y: (i * 13 % 40) as f64 * 2.0,
                        t: 200.0 + i as f64 * 120.0,
                        velocity: 0.4 + (i % 5) as f64 * 0.1,
                    })
                    .collect(),
                keypress_count: 80,
                backspace_count: 6,
                duration: 36000.0,
                ..Default::default()
            },
            context: SurveyContext {
                survey_id: Some("survey-1".into()),
                ip_address: Some("203.0.113.7".into()),
                ..Default::default()
            },
            tier: Some(tier),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_tier_one_runs_local_checks_only() {
        let engine = ScoringEngine::new(fast_config(), Collaborators::new()).unwrap();
        let result = engine.run_tiered_check(&request(1)).await.unwrap();

        assert_eq!(result.checks.len(), 6);
        assert_eq!(result.meta.tier, 1);
        assert_eq!(result.meta.checks_run, 6);
        assert!(result.meta.request_id.starts_with("req_"));
        assert!((result.confidence - 0.62).abs() < 1e-12);
        assert!((0.0..=1.0).contains(&result.score));
        assert_eq!(result.flags.len(), result.checks.iter().filter(|c| !c.passed).count());
    }

    #[tokio::test]
    async fn test_invalid_requests_are_rejected() {
        let engine = ScoringEngine::new(fast_config(), Collaborators::new()).unwrap();
        let err = engine.run_tiered_check(&request(0)).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let mut req = request(3);
        req.thresholds.fail = 0.9;
        assert!(matches!(engine.assess(&req).await, Err(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn test_collaborator_failures_are_not_observed() {
        let ai = Arc::new(FakeAi { calls: AtomicUsize::new(0) });
        let collaborators = Collaborators::new()
            .with_ai_detector(ai.clone())
            .with_plagiarism(Arc::new(BrokenPlagiarism))
            .with_ip_reputation(Arc::new(SlowIp));
        let engine = ScoringEngine::new(fast_config(), collaborators).unwrap();

        let assessment = engine.assess(&request(5)).await.unwrap();
        assert_eq!(ai.calls.load(Ordering::SeqCst), 1);
        assert_eq!(assessment.scores.ai_content, Some(0.92));
        assert_eq!(assessment.scores.plagiarism, None);
        assert_eq!(assessment.scores.ip_reputation, None);
        assert!(assessment.findings.ip_risk.is_none());
        assert!(assessment.findings.ai_generated.is_some());
        assert!(assessment
            .recommendations
            .contains(&"FLAG: AI-generated content detected - consider manual review".to_string()));
        assert_eq!(assessment.reasoning, "Uniform register across answers");

        let json = serde_json::to_value(&assessment).unwrap();
        assert!(json["scores"].get("plagiarism").is_none());

        let result = engine.run_tiered_check(&request(5)).await.unwrap();
        let ids: Vec<&str> = result.checks.iter().map(|c| c.check_id.as_str()).collect();
        assert!(ids.contains(&"ai_content_basic"));
        assert!(!ids.contains(&"plagiarism_basic"));
        assert!(!ids.contains(&"vpn_detection"));
        assert!(result.flags.contains(&"AI Content (Basic)".to_string()));
        assert!(!result.summary.positives.contains(&"Content appears human-written".to_string()));
    }

    #[tokio::test]
    async fn test_collaborators_respect_tier() {
        let ai = Arc::new(FakeAi { calls: AtomicUsize::new(0) });
        let engine =
            ScoringEngine::new(fast_config(), Collaborators::new().with_ai_detector(ai.clone())).unwrap();

        let assessment = engine.assess(&request(2)).await.unwrap();
        assert_eq!(ai.calls.load(Ordering::SeqCst), 0);
        assert_eq!(assessment.scores.ai_content, None);
        assert_eq!(assessment.tier, 2);
    }

    #[tokio::test]
    async fn test_full_checks_unlock_at_tier_five() {
        let collaborators = Collaborators::new()
            .with_ai_detector(Arc::new(FakeAi { calls: AtomicUsize::new(0) }))
            .with_fraud_ring(Arc::new(SharedDeviceRing));
        let engine = ScoringEngine::new(fast_config(), collaborators).unwrap();

        let advanced = engine.run_tiered_check(&request(4)).await.unwrap();
        let ids: Vec<&str> = advanced.checks.iter().map(|c| c.check_id.as_str()).collect();
        assert!(ids.contains(&"quality_assessment"));
        assert!(ids.contains(&"semantic_analysis"));
        assert!(!ids.contains(&"ai_content_full"));
        assert!(!ids.contains(&"burstiness_analysis"));

        let maximum = engine.run_tiered_check(&request(5)).await.unwrap();
        let find = |id: &str| maximum.checks.iter().find(|c| c.check_id == id).cloned();
        let ai_full = find("ai_content_full").unwrap();
        assert!(!ai_full.passed);
        assert!(ai_full.details.unwrap().contains("Hedging language"));
        assert!(find("perplexity_analysis").unwrap().passed);
        let ring = find("fraud_ring_detection").unwrap();
        assert!(!ring.passed);
        assert_eq!(ring.score, 0.75);
        assert_eq!(
            ring.details.as_deref(),
            Some("Linked to other respondents by shared device, shared IP")
        );
        assert!(find("burstiness_analysis").is_some());
        // No contradiction or plagiarism collaborator is wired
        assert!(find("contradiction_full").is_none());
        assert!(find("plagiarism_full").is_none());
    }

    #[tokio::test]
    async fn test_webdriver_drives_probability_up() {
        let engine = ScoringEngine::new(fast_config(), Collaborators::new()).unwrap();
        let mut req = request(2);
        req.behavioral_metrics.device_fingerprint = Some(DeviceFingerprint {
            web_driver: true,
            automation: true,
            ..Default::default()
        });

        let assessment = engine.assess(&req).await.unwrap();
        assert!(assessment.overall_risk_score >= 0.85, "{}", assessment.overall_risk_score);
        assert!(assessment.evidence.high_risk.contains(&"WebDriver detected".to_string()));
        assert!(assessment
            .recommendations
            .contains(&"REJECT: Automation tools detected (Selenium, Puppeteer, etc.)".to_string()));
        assert!(assessment.scores.device_fingerprint.is_some());
    }

    #[tokio::test]
    async fn test_clean_offline_response_stays_at_prior() {
        let engine = ScoringEngine::new(fast_config(), Collaborators::new()).unwrap();
        let assessment = engine.assess(&request(1)).await.unwrap();
        assert_eq!(assessment.evidence_count, 0);
        assert_eq!(assessment.overall_risk_score, 0.15);
        assert_eq!(assessment.risk_level, RiskLevel::Low);
        assert!(!assessment.is_likely_fraud);
        assert!(assessment.scores.device_fingerprint.is_none());
    }

    #[tokio::test]
    async fn test_device_info_alone_is_not_automation_evidence() {
        let engine = ScoringEngine::new(fast_config(), Collaborators::new()).unwrap();
        let mut req = request(2);
        req.device_info = Some(DeviceInfo {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0 Safari/537.36".into(),
            platform: "Win32".into(),
            timezone: Some("Europe/Berlin".into()),
            screen_width: 1920,
            screen_height: 1080,
            ..Default::default()
        });

        let assessment = engine.assess(&req).await.unwrap();
        assert!(assessment.scores.device_fingerprint.is_none());
        assert!(assessment.findings.automation.is_none());
        assert_eq!(assessment.evidence_count, 0);
        assert_eq!(assessment.overall_risk_score, 0.15);
    }

    #[tokio::test]
    async fn test_missing_tier_uses_configured_default() {
        let config = EngineConfig {
            default_tier: 5,
            ..fast_config()
        };
        let engine = ScoringEngine::new(config, Collaborators::new()).unwrap();
        let mut req = request(1);
        req.tier = None;

        let result = engine.run_tiered_check(&req).await.unwrap();
        assert_eq!(result.meta.tier, 5);
        let assessment = engine.assess(&req).await.unwrap();
        assert_eq!(assessment.tier, 5);

        // An explicit tier still wins over the default
        req.tier = Some(2);
        assert_eq!(engine.assess(&req).await.unwrap().tier, 2);
    }

    #[tokio::test]
    async fn test_network_checks_and_timezone() {
        let engine =
            ScoringEngine::new(fast_config(), Collaborators::new().with_ip_reputation(Arc::new(TorIp)))
                .unwrap();
        let mut req = request(5);
        req.device_info = Some(DeviceInfo {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120".into(),
            timezone: Some("Europe/Berlin".into()),
            timezone_offset: -60,
            screen_width: 1920,
            screen_height: 1080,
            plugin_count: 5,
            ..Default::default()
        });

        let result = engine.run_tiered_check(&req).await.unwrap();
        let find = |id: &str| result.checks.iter().find(|c| c.check_id == id).cloned();
        assert!(!find("tor_detection").unwrap().passed);
        assert!(!find("proxy_detection").unwrap().passed);
        assert!(find("vpn_detection").unwrap().passed);
        assert!(!find("timezone_validation").unwrap().passed);

        let assessment = engine.assess(&req).await.unwrap();
        assert!(assessment.findings.ip_risk.as_ref().unwrap().is_tor);
        assert!(assessment.evidence.high_risk.contains(&"Tor exit node detected".to_string()));
    }

    fn history(i: usize) -> HistoricalResponse {
        let mut responses: BTreeMap<String, Value> = BTreeMap::new();
        responses.insert("q1".into(), json!("a".repeat(60 + i % 10)));
        HistoricalResponse {
            responses,
            response_times: vec![10000.0 + (i % 10) as f64 * 1000.0],
            mouse_event_count: 45 + i % 10,
            keystroke_count: 90 + i % 20,
            user_agent: Some("Mozilla/5.0 (Windows NT 10.0) Chrome/120".into()),
            fraud_score: Some(0.1),
            is_flagged: Some(false),
            completed: true,
        }
    }

    #[tokio::test]
    async fn test_baseline_deviation_at_tier_five() {
        let store = Arc::new(MemoryBaselineStore::new());
        store
            .seed_history("survey-1", (0..40).map(history).collect())
            .await;
        let service = Arc::new(BaselineService::new(store, Default::default()));
        let engine = ScoringEngine::new(fast_config(), Collaborators::new())
            .unwrap()
            .with_baseline(service);

        let mut req = request(5);
        req.behavioral_metrics.response_time = vec![400.0, 500.0, 600.0];
        req.behavioral_metrics.mouse_movements.clear();
        req.behavioral_metrics.keypress_count = 0;

        let assessment = engine.assess(&req).await.unwrap();
        let baseline = assessment.findings.baseline.as_ref().unwrap();
        assert!(baseline.is_anomalous);
        assert!(assessment.scores.baseline_deviation.is_some());

        let result = engine.run_tiered_check(&req).await.unwrap();
        let check = result
            .checks
            .iter()
            .find(|c| c.check_id == "baseline_deviation")
            .unwrap();
        assert!(!check.passed);

        // Tier 4 never consults the baseline
        req.tier = Some(4);
        let assessment = engine.assess(&req).await.unwrap();
        assert!(assessment.findings.baseline.is_none());
    }

    #[tokio::test]
    async fn test_untrained_baseline_is_not_compared() {
        let store = Arc::new(MemoryBaselineStore::new());
        let service = Arc::new(BaselineService::new(store, Default::default()));
        let engine = ScoringEngine::new(fast_config(), Collaborators::new())
            .unwrap()
            .with_baseline(service);

        let assessment = engine.assess(&request(5)).await.unwrap();
        assert!(assessment.findings.baseline.is_none());
        assert!(assessment.scores.baseline_deviation.is_none());
    }

    #[tokio::test]
    async fn test_record_accepted() {
        let store = Arc::new(MemoryBaselineStore::new());
        let service = Arc::new(BaselineService::new(store, Default::default()));
        let engine = ScoringEngine::new(fast_config(), Collaborators::new())
            .unwrap()
            .with_baseline(service);

        let profile = engine.record_accepted(&request(3)).await.unwrap().unwrap();
        assert_eq!(profile.survey_id, "survey-1");

        let mut anonymous = request(3);
        anonymous.context.survey_id = None;
        assert!(engine.record_accepted(&anonymous).await.unwrap().is_none());

        let bare = ScoringEngine::new(fast_config(), Collaborators::new()).unwrap();
        assert!(bare.record_accepted(&request(3)).await.unwrap().is_none());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = EngineConfig {
            prior_fraud_rate: 0.0,
            ..Default::default()
        };
        assert!(ScoringEngine::new(config, Collaborators::new()).is_err());
    }
}
