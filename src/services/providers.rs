// Collaborator Providers
// Contracts for the external detectors the engine consumes, plus the
// ip-api reputation adapter and a local fingerprint heuristic

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

use crate::models::{DeviceFingerprint, SurveyContext};

const IP_API_DEFAULT_URL: &str = "http://ip-api.com/json";
const IP_API_FIELDS: &str =
    "status,message,country,countryCode,regionName,city,timezone,isp,org,as,asname,proxy,hosting";

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("{name} timed out after {ms}ms")]
    Timeout { name: String, ms: u64 },
    #[error("Missing content in response")]
    MissingContent,
    #[error("JSON parse error: {0}")]
    JsonError(String),
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),
}

// ============ Collaborator Reports ============

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AiTextReport {
    pub ai_probability: f64,
    #[serde(rename = "isAIGenerated")]
    pub is_ai_generated: bool,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub ai_indicators: Vec<String>,
    #[serde(default)]
    pub human_indicators: Vec<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlagiarismMatch {
    pub source_url: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlagiarismReport {
    pub plagiarism_score: f64,
    pub is_plagiarized: bool,
    #[serde(default)]
    pub matches: Vec<PlagiarismMatch>,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContradictionReport {
    pub has_contradictions: bool,
    /// 1.0 means fully consistent answers.
    pub consistency_score: f64,
    #[serde(default)]
    pub contradictions: Vec<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct IpReputationReport {
    pub risk_score: f64,
    #[serde(rename = "isVPN")]
    pub is_vpn: bool,
    pub is_data_center: bool,
    /// `None` when the source cannot tell Tor exits apart.
    #[serde(default)]
    pub is_tor: Option<bool>,
    #[serde(default)]
    pub is_proxy: bool,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

impl IpReputationReport {
    pub fn location(&self) -> String {
        match (&self.city, &self.country) {
            (Some(city), Some(country)) => format!("{}, {}", city, country),
            (None, Some(country)) => country.clone(),
            (Some(city), None) => city.clone(),
            (None, None) => "Unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AutomationReport {
    pub is_automation: bool,
    pub confidence: f64,
    #[serde(default)]
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FraudRingReport {
    pub answer_sharing: bool,
    pub coordinated_timing: bool,
    pub device_sharing: bool,
    pub ip_sharing: bool,
    pub confidence: f64,
    #[serde(default)]
    pub explanation: Option<String>,
}

// ============ Collaborator Traits ============

#[async_trait]
pub trait AiTextDetector: Send + Sync {
    async fn analyze(
        &self,
        texts: &[String],
        questions: &[String],
        context: &SurveyContext,
    ) -> Result<AiTextReport, ProviderError>;
}

#[async_trait]
pub trait PlagiarismChecker: Send + Sync {
    async fn check(&self, texts: &[String]) -> Result<PlagiarismReport, ProviderError>;
}

#[async_trait]
pub trait ContradictionDetector: Send + Sync {
    async fn detect(
        &self,
        responses: &BTreeMap<String, serde_json::Value>,
        questions: &BTreeMap<String, String>,
    ) -> Result<ContradictionReport, ProviderError>;
}

#[async_trait]
pub trait IpReputationLookup: Send + Sync {
    async fn lookup(&self, ip: &str) -> Result<IpReputationReport, ProviderError>;
}

#[async_trait]
pub trait DeviceFingerprintAnalyzer: Send + Sync {
    async fn detect_automation(
        &self,
        fingerprint: &DeviceFingerprint,
    ) -> Result<AutomationReport, ProviderError>;
}

/// Cross-response correlation for one respondent against the rest of the survey.
#[async_trait]
pub trait FraudRingDetector: Send + Sync {
    async fn correlate(
        &self,
        survey_id: &str,
        responses: &BTreeMap<String, serde_json::Value>,
        context: &SurveyContext,
    ) -> Result<FraudRingReport, ProviderError>;
}

/// The set of collaborators wired into an engine. Any slot may be empty,
/// in which case its category is reported as not evaluated.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub ai_detector: Option<Arc<dyn AiTextDetector>>,
    pub plagiarism: Option<Arc<dyn PlagiarismChecker>>,
    pub contradictions: Option<Arc<dyn ContradictionDetector>>,
    pub ip_reputation: Option<Arc<dyn IpReputationLookup>>,
    pub fingerprint: Option<Arc<dyn DeviceFingerprintAnalyzer>>,
    pub fraud_ring: Option<Arc<dyn FraudRingDetector>>,
}

impl Collaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ai_detector(mut self, detector: Arc<dyn AiTextDetector>) -> Self {
        self.ai_detector = Some(detector);
        self
    }

    pub fn with_plagiarism(mut self, checker: Arc<dyn PlagiarismChecker>) -> Self {
        self.plagiarism = Some(checker);
        self
    }

    pub fn with_contradictions(mut self, detector: Arc<dyn ContradictionDetector>) -> Self {
        self.contradictions = Some(detector);
        self
    }

    pub fn with_ip_reputation(mut self, lookup: Arc<dyn IpReputationLookup>) -> Self {
        self.ip_reputation = Some(lookup);
        self
    }

    pub fn with_fingerprint(mut self, analyzer: Arc<dyn DeviceFingerprintAnalyzer>) -> Self {
        self.fingerprint = Some(analyzer);
        self
    }

    pub fn with_fraud_ring(mut self, detector: Arc<dyn FraudRingDetector>) -> Self {
        self.fraud_ring = Some(detector);
        self
    }
}

// ============ ip-api Reputation Adapter ============

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct IpApiDocument {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    timezone: Option<String>,
    #[serde(default)]
    isp: Option<String>,
    #[serde(default)]
    org: Option<String>,
    #[serde(default)]
    asname: Option<String>,
    #[serde(default)]
    proxy: bool,
    #[serde(default)]
    hosting: bool,
}

const DATACENTER_MARKERS: &[&str] = &[
    "amazon", "aws", "google cloud", "gcp", "microsoft azure", "azure", "digitalocean",
    "linode", "vultr", "ovh", "hetzner", "oracle cloud", "alibaba cloud", "rackspace",
    "ibm cloud", "cloudflare", "akamai", "fastly", "cloudfront", "cdn", "data center",
    "datacenter", "hosting", "server", "cloud", "vps", "dedicated",
];

const VPN_MARKERS: &[&str] = &[
    "nordvpn", "expressvpn", "surfshark", "cyberghost", "private internet access",
    "protonvpn", "mullvad", "windscribe", "tunnelbear", "hotspot shield", "hidemyass",
    "ipvanish", "vyprvpn", "purevpn", "torguard", "astrill", "perfect privacy", "vpn",
    "proxy", "anonymous",
];

const TOR_MARKERS: &[&str] = &["tor", "onion", "privacy"];

/// Reputation lookup against an ip-api compatible JSON endpoint.
/// One attempt per call; the caller owns any retry policy.
pub struct IpApiReputation {
    client: Client,
    base_url: String,
}

impl IpApiReputation {
    pub fn new(base_url: Option<&str>, timeout_ms: u64) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()?;
        let base_url = base_url
            .map(str::to_string)
            .or_else(|| env::var("CIPHER_IP_API_URL").ok())
            .unwrap_or_else(|| IP_API_DEFAULT_URL.to_string());
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl IpReputationLookup for IpApiReputation {
    async fn lookup(&self, ip: &str) -> Result<IpReputationReport, ProviderError> {
        let url = format!("{}/{}?fields={}", self.base_url, ip, IP_API_FIELDS);
        let start = Instant::now();

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let doc: IpApiDocument = response
            .json()
            .await
            .map_err(|e| ProviderError::JsonError(e.to_string()))?;

        debug!(
            "[IP_REPUTATION] lookup finished in {}ms",
            start.elapsed().as_millis()
        );
        report_from_document(doc)
    }
}

fn contains_any(haystack: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| haystack.contains(m))
}

fn contains_word(haystack: &str, markers: &[&str]) -> bool {
    haystack
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| markers.contains(&word))
}

fn report_from_document(doc: IpApiDocument) -> Result<IpReputationReport, ProviderError> {
    if doc.status.as_deref() == Some("fail") {
        return Err(ProviderError::ApiError {
            status: 200,
            message: doc.message.unwrap_or_else(|| "IP lookup failed".to_string()),
        });
    }

    let field = |v: &Option<String>| v.as_deref().unwrap_or_default().to_lowercase();
    let network = format!("{} {} {}", field(&doc.isp), field(&doc.org), field(&doc.asname));
    let owner = format!("{} {}", field(&doc.org), field(&doc.asname));

    let is_data_center = contains_any(&network, DATACENTER_MARKERS);
    let is_vpn = contains_any(&network, VPN_MARKERS);
    let is_tor = contains_word(&owner, TOR_MARKERS);

    let mut risk_score: f64 = 0.0;
    if doc.proxy {
        risk_score += 0.3;
    }
    if is_vpn {
        risk_score += 0.25;
    }
    if is_tor {
        risk_score += 0.4;
    }
    if is_data_center {
        risk_score += 0.2;
    }
    if doc.hosting {
        risk_score += 0.15;
    }

    Ok(IpReputationReport {
        risk_score: risk_score.min(1.0),
        is_vpn,
        is_data_center,
        is_tor: Some(is_tor),
        is_proxy: doc.proxy,
        timezone: doc.timezone,
        country: doc.country,
        city: doc.city,
    })
}

// ============ Local Fingerprint Heuristic ============

const SUSPICIOUS_UA_MARKERS: &[&str] = &[
    "headless", "phantom", "selenium", "webdriver", "bot", "crawler", "spider",
];

/// Automation detection from the browser fingerprint alone. Usable when no
/// remote fingerprinting service is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct FingerprintHeuristics;

impl FingerprintHeuristics {
    pub fn evaluate(fingerprint: &DeviceFingerprint) -> AutomationReport {
        let mut reasons = Vec::new();
        let mut suspicion: f64 = 0.0;

        if fingerprint.web_driver {
            reasons.push("WebDriver detected".to_string());
            suspicion += 0.4;
        }
        if fingerprint.automation {
            reasons.push("Automation detected".to_string());
            suspicion += 0.4;
        }

        let ua = fingerprint
            .user_agent
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();
        if let Some(marker) = SUSPICIOUS_UA_MARKERS.iter().find(|m| ua.contains(*m)) {
            reasons.push(format!("Suspicious user agent: contains \"{}\"", marker));
            suspicion += 0.3;
        }

        if fingerprint.plugin_count == Some(0) {
            reasons.push("No browser plugins detected".to_string());
            suspicion += 0.2;
        }

        if let (Some(w), Some(h)) = (fingerprint.screen_width, fingerprint.screen_height) {
            if w > 0 && h > 0 && (w < 100 || h < 100 || w > 10000 || h > 10000) {
                reasons.push(format!("Impossible screen dimensions: {}x{}", w, h));
                suspicion += 0.3;
            }
        }

        if fingerprint.canvas_fingerprint.is_none() && fingerprint.webgl_fingerprint.is_none() {
            reasons.push("Missing canvas and WebGL fingerprints".to_string());
            suspicion += 0.2;
        }

        let mobile = fingerprint
            .platform
            .as_deref()
            .is_some_and(|p| p.to_lowercase().contains("mobile"));
        if mobile && (fingerprint.touch_support == Some(false) || fingerprint.max_touch_points == Some(0)) {
            reasons.push("Mobile platform but no touch support".to_string());
            suspicion += 0.15;
        }

        let confidence = suspicion.min(1.0);
        AutomationReport {
            is_automation: confidence >= 0.5,
            confidence,
            reasons,
        }
    }
}

#[async_trait]
impl DeviceFingerprintAnalyzer for FingerprintHeuristics {
    async fn detect_automation(
        &self,
        fingerprint: &DeviceFingerprint,
    ) -> Result<AutomationReport, ProviderError> {
        Ok(Self::evaluate(fingerprint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(json: &str) -> IpApiDocument {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_residential_ip_is_clean() {
        let report = report_from_document(doc(
            r#"{"status":"success","country":"Canada","city":"Toronto","timezone":"America/Toronto",
                "isp":"Rogers Communications","org":"Rogers","asname":"ROGERS-COMMUNICATIONS"}"#,
        ))
        .unwrap();
        assert_eq!(report.risk_score, 0.0);
        assert!(!report.is_vpn && !report.is_data_center);
        assert_eq!(report.is_tor, Some(false));
        assert_eq!(report.location(), "Toronto, Canada");
        assert_eq!(report.timezone.as_deref(), Some("America/Toronto"));
    }

    #[test]
    fn test_hosting_vpn_scoring() {
        let report = report_from_document(doc(
            r#"{"status":"success","isp":"DigitalOcean LLC","org":"NordVPN","asname":"DIGITALOCEAN",
                "proxy":true,"hosting":true}"#,
        ))
        .unwrap();
        assert!(report.is_vpn);
        assert!(report.is_data_center);
        assert!(report.is_proxy);
        // proxy 0.3 + vpn 0.25 + datacenter 0.2 + hosting 0.15
        assert!((report.risk_score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_failed_lookup_is_an_error() {
        let result = report_from_document(doc(r#"{"status":"fail","message":"private range"}"#));
        assert!(matches!(result, Err(ProviderError::ApiError { .. })));
    }

    #[test]
    fn test_fingerprint_heuristics() {
        let clean = DeviceFingerprint {
            user_agent: Some("Mozilla/5.0 (Macintosh) Safari/605.1.15".to_string()),
            plugin_count: Some(3),
            canvas_fingerprint: Some("c1".to_string()),
            ..Default::default()
        };
        let report = FingerprintHeuristics::evaluate(&clean);
        assert!(!report.is_automation);
        assert!(report.reasons.is_empty());

        let bot = DeviceFingerprint {
            user_agent: Some("Mozilla/5.0 HeadlessChrome/120.0".to_string()),
            web_driver: true,
            ..Default::default()
        };
        let report = FingerprintHeuristics::evaluate(&bot);
        assert!(report.is_automation);
        assert!(report.reasons.iter().any(|r| r.to_lowercase().contains("webdriver")));
        assert!(report.reasons.iter().any(|r| r.contains("headless")));
    }

    #[test]
    fn test_mobile_platform_without_touch() {
        let phone = DeviceFingerprint {
            user_agent: Some("Mozilla/5.0 (Linux; Android 14) Mobile Safari/537.36".to_string()),
            plugin_count: Some(2),
            canvas_fingerprint: Some("c1".to_string()),
            platform: Some("Linux armv8l Mobile".to_string()),
            touch_support: Some(false),
            max_touch_points: Some(0),
            ..Default::default()
        };
        let report = FingerprintHeuristics::evaluate(&phone);
        assert_eq!(report.reasons, vec!["Mobile platform but no touch support".to_string()]);
        assert!((report.confidence - 0.15).abs() < 1e-12);
        assert!(!report.is_automation);

        let touch_phone = DeviceFingerprint {
            touch_support: Some(true),
            max_touch_points: Some(5),
            ..phone.clone()
        };
        assert!(FingerprintHeuristics::evaluate(&touch_phone).reasons.is_empty());

        // Touch fields the client never reported are not held against it
        let unreported = DeviceFingerprint {
            touch_support: None,
            max_touch_points: None,
            ..phone
        };
        assert!(FingerprintHeuristics::evaluate(&unreported).reasons.is_empty());
    }

    #[test]
    fn test_ip_api_client_creation() {
        let client = IpApiReputation::new(Some("http://localhost:9000/json/"), 500).unwrap();
        assert_eq!(client.base_url(), "http://localhost:9000/json");
    }
}
