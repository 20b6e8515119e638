// Evidence Reporter
// Presentation only: verdicts, recommendations, evidence buckets, findings
// and reasoning text built from what the detectors reported

use super::baseline::{DeviationAnalysis, Severity};
use super::evidence::DetectionResults;
use super::heuristics::{
    BehavioralFlags, ContentFlags, DuplicateAnalysis, QualityFlags, TemplateAnalysis,
    TimezoneConsistency,
};
use super::tiers::find_check;
use crate::models::{
    AiGeneratedFinding, AutomationFinding, BehavioralMetrics, CategoryScores, CheckResult,
    ContradictionFinding, EvidenceBuckets, Findings, FraudRingFinding, InteractionFinding,
    IpRiskFinding, PlagiarismFinding, PlagiarismMatchSummary, Recommendation, RiskLevel,
    ValidationSummary,
};
use crate::services::providers::{
    AiTextReport, AutomationReport, ContradictionReport, FraudRingReport, IpReputationReport,
    PlagiarismReport,
};

const TOP_EXAMPLES: usize = 3;

/// Everything gathered for one comprehensive assessment. A `None` slot means
/// the detector was not unlocked by the tier, not configured, or failed.
#[derive(Debug, Clone, Default)]
pub struct CollectedEvidence {
    pub ai_text: Option<AiTextReport>,
    pub plagiarism: Option<PlagiarismReport>,
    pub contradictions: Option<ContradictionReport>,
    pub ip_risk: Option<IpReputationReport>,
    pub automation: Option<AutomationReport>,
    pub fraud_ring: Option<FraudRingReport>,
    pub behavioral: Option<BehavioralFlags>,
    pub behavioral_score: Option<f64>,
    pub templates: Option<TemplateAnalysis>,
    pub duplicates: Option<DuplicateAnalysis>,
    pub content: Option<ContentFlags>,
    pub quality: Option<QualityFlags>,
    pub timezone: Option<TimezoneConsistency>,
    pub deviation: Option<DeviationAnalysis>,
}

impl CollectedEvidence {
    pub fn detection_results(&self) -> DetectionResults<'_> {
        DetectionResults {
            ai_text: self.ai_text.as_ref(),
            automation: self.automation.as_ref(),
            behavioral: self.behavioral.as_ref(),
            plagiarism: self.plagiarism.as_ref(),
            content: self.content.as_ref(),
            contradictions: self.contradictions.as_ref(),
            ip_risk: self.ip_risk.as_ref(),
            timezone: self.timezone.as_ref(),
            quality: self.quality.as_ref(),
            fraud_ring: self.fraud_ring.as_ref(),
            deviation: self.deviation.as_ref(),
        }
    }
}

// ============ Tiered Check Summary ============

pub fn verdict(score: f64) -> &'static str {
    if score >= 0.85 {
        "High-quality legitimate response"
    } else if score >= 0.7 {
        "Likely legitimate with minor concerns"
    } else if score >= 0.5 {
        "Borderline quality - manual review recommended"
    } else if score >= 0.3 {
        "Multiple issues detected - likely low quality"
    } else {
        "Suspected fraudulent or bot response"
    }
}

pub fn suggestion(recommendation: Recommendation) -> &'static str {
    match recommendation {
        Recommendation::Keep => "Response can be accepted as-is",
        Recommendation::Review => "Consider manual review before accepting",
        Recommendation::Discard => "Response should be rejected or flagged for investigation",
    }
}

fn issue_text(check: &CheckResult) -> String {
    check
        .details
        .clone()
        .or_else(|| find_check(&check.check_id).map(|c| c.description.to_string()))
        .unwrap_or_else(|| format!("Issue with {}", check.check_id))
}

pub fn build_summary(
    score: f64,
    recommendation: Recommendation,
    checks: &[CheckResult],
) -> ValidationSummary {
    let failed: Vec<&CheckResult> = checks.iter().filter(|c| !c.passed).collect();
    let any_failed = |pred: fn(&str) -> bool| failed.iter().any(|c| pred(&c.check_id));

    let mut positives = Vec::new();
    if !any_failed(|id| id.contains("timing")) {
        positives.push("Response timing appears natural".to_string());
    }
    if !any_failed(|id| id.contains("automation") || id.contains("webdriver")) {
        positives.push("No automation tools detected".to_string());
    }
    if !any_failed(|id| id.contains("ai_content")) {
        positives.push("Content appears human-written".to_string());
    }
    if !any_failed(|id| id == "minimal_effort") {
        positives.push("Response shows reasonable effort".to_string());
    }

    ValidationSummary {
        verdict: verdict(score).to_string(),
        issues: failed.iter().map(|c| issue_text(c)).collect(),
        positives,
        suggestion: suggestion(recommendation).to_string(),
    }
}

// ============ Comprehensive Assessment ============

/// Category scores. Categories whose detector did not run stay `None`.
pub fn category_scores(collected: &CollectedEvidence) -> CategoryScores {
    let duplicates = collected.duplicates.as_ref().is_some_and(|d| d.suspicious);
    let plagiarism = match &collected.plagiarism {
        Some(report) if report.plagiarism_score > 0.0 => Some(report.plagiarism_score),
        _ if duplicates => Some(0.5),
        Some(_) => Some(0.0),
        None => None,
    };

    CategoryScores {
        behavioral: collected.behavioral_score,
        ai_content: collected.ai_text.as_ref().map(|a| a.ai_probability),
        plagiarism,
        contradictions: collected
            .contradictions
            .as_ref()
            .map(|c| (1.0 - c.consistency_score).clamp(0.0, 1.0)),
        ip_reputation: collected.ip_risk.as_ref().map(|ip| ip.risk_score),
        device_fingerprint: collected.automation.as_ref().map(|a| a.confidence),
        baseline_deviation: collected.deviation.as_ref().map(|d| d.deviation_score),
    }
}

pub fn build_findings(collected: &CollectedEvidence, metrics: &BehavioralMetrics) -> Findings {
    Findings {
        ai_generated: collected.ai_text.as_ref().map(|ai| AiGeneratedFinding {
            detected: ai.is_ai_generated,
            probability: ai.ai_probability,
            indicators: ai.ai_indicators.clone(),
        }),
        plagiarism: collected.plagiarism.as_ref().map(|p| PlagiarismFinding {
            detected: p.is_plagiarized,
            sources: p.matches.len(),
            top_matches: p
                .matches
                .iter()
                .take(TOP_EXAMPLES)
                .map(|m| PlagiarismMatchSummary {
                    url: m.source_url.clone(),
                    similarity: m.similarity,
                })
                .collect(),
        }),
        contradictions: collected.contradictions.as_ref().map(|c| ContradictionFinding {
            found: c.has_contradictions,
            count: c.contradictions.len(),
            examples: c.contradictions.iter().take(TOP_EXAMPLES).cloned().collect(),
        }),
        automation: collected.automation.as_ref().map(|a| AutomationFinding {
            detected: a.is_automation,
            confidence: a.confidence,
            reasons: a.reasons.clone(),
        }),
        interaction: Some(InteractionFinding {
            mouse_events: metrics.mouse_movements.len(),
            keystrokes: metrics.keypress_count,
            tab_switches: metrics.blur_count(),
            paste_count: metrics.paste_events,
        }),
        ip_risk: collected.ip_risk.as_ref().map(|ip| IpRiskFinding {
            is_vpn: ip.is_vpn,
            is_data_center: ip.is_data_center,
            is_tor: ip.is_tor.unwrap_or(false),
            location: ip.location(),
        }),
        fraud_ring: collected.fraud_ring.as_ref().map(|r| FraudRingFinding {
            answer_sharing: r.answer_sharing,
            coordinated_timing: r.coordinated_timing,
            device_sharing: r.device_sharing,
            ip_sharing: r.ip_sharing,
            confidence: r.confidence,
        }),
        baseline: collected.deviation.clone(),
    }
}

pub fn build_evidence(collected: &CollectedEvidence, metrics: &BehavioralMetrics) -> EvidenceBuckets {
    let mut buckets = EvidenceBuckets::default();

    if let Some(ai) = &collected.ai_text {
        buckets.high_risk.extend(ai.ai_indicators.iter().cloned());
        buckets.human_indicators.extend(ai.human_indicators.iter().cloned());
    }

    if let Some(p) = &collected.plagiarism {
        if !p.matches.is_empty() {
            buckets
                .high_risk
                .push(format!("Found {} plagiarism matches", p.matches.len()));
        }
    }
    if let Some(d) = collected.duplicates.as_ref().filter(|d| d.suspicious) {
        buckets.medium_risk.push(format!(
            "Identical answers given to {} question pair(s)",
            d.duplicate_count
        ));
    }

    if let Some(c) = &collected.contradictions {
        buckets.medium_risk.extend(c.contradictions.iter().cloned());
    }

    if let Some(ip) = &collected.ip_risk {
        if ip.is_vpn {
            buckets.medium_risk.push("VPN detected".to_string());
        }
        if ip.is_data_center {
            buckets.medium_risk.push("Data center IP".to_string());
        }
        if ip.is_tor == Some(true) {
            buckets.high_risk.push("Tor exit node detected".to_string());
        }
    }

    if let Some(a) = collected.automation.as_ref().filter(|a| a.is_automation) {
        buckets.high_risk.extend(a.reasons.iter().cloned());
    }

    if let Some(tz) = collected.timezone.as_ref().filter(|tz| !tz.is_consistent) {
        if let Some(reason) = &tz.reason {
            buckets.medium_risk.push(reason.clone());
        }
    }

    if let Some(t) = collected.templates.as_ref().filter(|t| t.is_template) {
        buckets.medium_risk.extend(t.indicators.iter().cloned());
    }

    if let Some(q) = &collected.quality {
        if let Some(explanation) = q.explanation.as_ref().filter(|_| q.time_mismatch) {
            buckets.medium_risk.push(explanation.clone());
        }
        if q.extremely_fast_completion {
            buckets
                .medium_risk
                .push("Completed in under 20% of the expected time".to_string());
        }
        if q.excessive_paste {
            buckets
                .low_risk
                .push(format!("Frequent paste events ({})", metrics.paste_events));
        }
        if q.excessive_tab_switch {
            buckets
                .low_risk
                .push(format!("Frequent tab switching ({} blur events)", metrics.blur_count()));
        }
    }

    if let Some(b) = &collected.behavioral {
        buckets.high_risk.extend(b.descriptions.iter().cloned());
    }

    if let Some(ring) = &collected.fraud_ring {
        let markers = [
            (ring.answer_sharing, "Answers shared with other respondents"),
            (ring.coordinated_timing, "Submission timing coordinated with other respondents"),
            (ring.device_sharing, "Device shared with other respondents"),
            (ring.ip_sharing, "IP address shared with other respondents"),
        ];
        buckets.high_risk.extend(
            markers
                .iter()
                .filter(|(hit, _)| *hit)
                .map(|(_, text)| text.to_string()),
        );
    }

    if let Some(analysis) = &collected.deviation {
        for d in &analysis.deviations {
            let bucket = match d.severity {
                Severity::High => &mut buckets.high_risk,
                Severity::Medium => &mut buckets.medium_risk,
                Severity::Low => &mut buckets.low_risk,
            };
            bucket.push(d.description.clone());
        }
    }

    buckets
}

pub fn build_recommendations(
    level: RiskLevel,
    scores: &CategoryScores,
    collected: &CollectedEvidence,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    if matches!(level, RiskLevel::High | RiskLevel::Critical) {
        recommendations.push("REJECT: This response shows multiple strong fraud indicators".to_string());
    }
    if scores.ai_content.is_some_and(|s| s > 0.7) {
        recommendations.push("FLAG: AI-generated content detected - consider manual review".to_string());
    }
    if let Some(p) = collected.plagiarism.as_ref().filter(|p| !p.matches.is_empty()) {
        recommendations.push(format!(
            "FLAG: Found {} potential plagiarism sources",
            p.matches.len()
        ));
    }
    if collected
        .contradictions
        .as_ref()
        .is_some_and(|c| c.contradictions.len() > 2)
    {
        recommendations.push(
            "FLAG: Multiple contradictions found - respondent may be inconsistent or inattentive"
                .to_string(),
        );
    }
    if collected.automation.as_ref().is_some_and(|a| a.is_automation) {
        recommendations.push("REJECT: Automation tools detected (Selenium, Puppeteer, etc.)".to_string());
    }
    if collected.ip_risk.as_ref().is_some_and(|ip| ip.is_tor == Some(true)) {
        recommendations.push("FLAG: Tor network detected - high anonymization risk".to_string());
    }
    match level {
        RiskLevel::Low => recommendations
            .push("ACCEPT: Response appears legitimate with minimal fraud indicators".to_string()),
        RiskLevel::Medium => recommendations
            .push("REVIEW: Moderate risk - recommend manual review before decision".to_string()),
        _ => {}
    }

    recommendations
}

/// Each collaborator's own explanation, separated by blank lines.
pub fn build_reasoning(collected: &CollectedEvidence) -> String {
    [
        collected.ai_text.as_ref().and_then(|a| a.explanation.as_deref()),
        collected.contradictions.as_ref().and_then(|c| c.explanation.as_deref()),
        collected.quality.as_ref().and_then(|q| q.explanation.as_deref()),
        collected.plagiarism.as_ref().and_then(|p| p.explanation.as_deref()),
        collected.fraud_ring.as_ref().and_then(|r| r.explanation.as_deref()),
    ]
    .into_iter()
    .flatten()
    .filter(|s| !s.is_empty())
    .collect::<Vec<_>>()
    .join("\n\n")
}
