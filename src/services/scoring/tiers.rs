// Check Catalog
// Every check the engine knows, its display name, category, the tier that
// unlocks it and where its data comes from

use serde::Serialize;

use super::{EngineError, EngineResult};

pub const MIN_TIER: u8 = 1;
pub const MAX_TIER: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckCategory {
    Behavioral,
    Timing,
    Content,
    Device,
    Network,
    Ai,
    CrossResponse,
}

/// What a check needs in order to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckSource {
    /// Computed from the payload alone.
    Local,
    AiText,
    Contradictions,
    Plagiarism,
    IpReputation,
    FraudRing,
    Baseline,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: CheckCategory,
    pub tier: u8,
    pub source: CheckSource,
}

const fn check(
    id: &'static str,
    name: &'static str,
    description: &'static str,
    category: CheckCategory,
    tier: u8,
    source: CheckSource,
) -> CheckDefinition {
    CheckDefinition {
        id,
        name,
        description,
        category,
        tier,
        source,
    }
}

use self::CheckCategory as Cat;
use self::CheckSource as Src;

pub const CATALOG: &[CheckDefinition] = &[
    // Tier 1: Basic
    check("rapid_completion", "Rapid Completion", "Detects impossibly fast survey completion", Cat::Behavioral, 1, Src::Local),
    check("uniform_timing", "Uniform Timing", "Detects robotic consistent response times", Cat::Behavioral, 1, Src::Local),
    check("low_interaction", "Low Interaction", "Detects minimal mouse/keyboard activity", Cat::Behavioral, 1, Src::Local),
    check("straight_line_answers", "Straight-Lining", "Detects selecting same option repeatedly", Cat::Content, 1, Src::Local),
    check("impossibly_fast", "Speed Reading", "Detects reading faster than humanly possible", Cat::Timing, 1, Src::Local),
    check("minimal_effort", "Minimal Effort", "Detects very short or low-quality text responses", Cat::Content, 1, Src::Local),
    // Tier 2: Standard
    check("excessive_paste", "Excessive Paste", "Detects heavy copy-paste behavior", Cat::Behavioral, 2, Src::Local),
    check("pointer_spikes", "Pointer Velocity Spikes", "Detects unnatural mouse movement patterns", Cat::Behavioral, 2, Src::Local),
    check("webdriver_detected", "WebDriver Detection", "Detects Selenium/automation tools", Cat::Device, 2, Src::Local),
    check("automation_detected", "Automation Detection", "Detects headless browsers and bots", Cat::Device, 2, Src::Local),
    check("no_plugins", "Missing Plugins", "Detects suspicious browser configurations", Cat::Device, 2, Src::Local),
    check("suspicious_user_agent", "Suspicious User Agent", "Detects bot-like user agent strings", Cat::Device, 2, Src::Local),
    check("device_fingerprint_mismatch", "Device Mismatch", "Detects inconsistent device characteristics", Cat::Device, 2, Src::Local),
    check("screen_anomaly", "Screen Anomaly", "Detects impossible screen dimensions", Cat::Device, 2, Src::Local),
    check("suspicious_pauses", "Suspicious Pauses", "Detects unusual gaps in activity", Cat::Timing, 2, Src::Local),
    // Tier 3: Enhanced
    check("robotic_typing", "Robotic Typing", "Detects uniform keystroke timing", Cat::Behavioral, 3, Src::Local),
    check("mouse_teleporting", "Mouse Teleporting", "Detects large instant mouse jumps", Cat::Behavioral, 3, Src::Local),
    check("no_corrections", "No Corrections", "Detects perfect typing with no backspaces", Cat::Behavioral, 3, Src::Local),
    check("excessive_tab_switching", "Tab Switching", "Detects frequent tab/window changes", Cat::Content, 3, Src::Local),
    check("window_focus_loss", "Focus Loss", "Detects extended periods away from survey", Cat::Content, 3, Src::Local),
    check("ai_content_basic", "AI Content (Basic)", "Light AI-generated text detection", Cat::Ai, 3, Src::AiText),
    check("contradiction_basic", "Contradiction (Basic)", "Basic response consistency check", Cat::Ai, 3, Src::Contradictions),
    // Tier 4: Advanced
    check("hover_behavior", "Hover Patterns", "Analyzes mouse hover behavior before clicks", Cat::Behavioral, 4, Src::Local),
    check("scroll_patterns", "Scroll Patterns", "Analyzes reading/scrolling behavior", Cat::Behavioral, 4, Src::Local),
    check("mouse_acceleration", "Mouse Acceleration", "Analyzes natural mouse acceleration", Cat::Behavioral, 4, Src::Local),
    check("vpn_detection", "VPN Detection", "Detects VPN/proxy usage", Cat::Network, 4, Src::IpReputation),
    check("datacenter_ip", "Datacenter IP", "Detects cloud/datacenter IPs", Cat::Network, 4, Src::IpReputation),
    check("plagiarism_basic", "Plagiarism (Basic)", "Quick check for copied content", Cat::Ai, 4, Src::Plagiarism),
    check("quality_assessment", "Quality Assessment", "Assesses overall response quality", Cat::Ai, 4, Src::Local),
    check("semantic_analysis", "Semantic Analysis", "Detects template and repeated answers", Cat::Ai, 4, Src::Local),
    // Tier 5: Maximum
    check("ai_content_full", "AI Content (Full)", "Comprehensive AI-generated text detection", Cat::Ai, 5, Src::AiText),
    check("contradiction_full", "Contradiction (Full)", "Deep semantic contradiction analysis", Cat::Ai, 5, Src::Contradictions),
    check("plagiarism_full", "Plagiarism (Full)", "Comprehensive plagiarism detection", Cat::Ai, 5, Src::Plagiarism),
    check("fraud_ring_detection", "Fraud Ring", "Detects coordinated fraud attempts", Cat::CrossResponse, 5, Src::FraudRing),
    check("answer_sharing", "Answer Sharing", "Detects identical answers across respondents", Cat::CrossResponse, 5, Src::FraudRing),
    check("coordinated_timing", "Coordinated Timing", "Detects synchronized submissions", Cat::CrossResponse, 5, Src::FraudRing),
    check("device_sharing", "Device Sharing", "Detects same device across respondents", Cat::CrossResponse, 5, Src::FraudRing),
    check("tor_detection", "Tor Detection", "Detects Tor exit node IPs", Cat::Network, 5, Src::IpReputation),
    check("proxy_detection", "Proxy Detection", "Detects proxy server usage", Cat::Network, 5, Src::IpReputation),
    check("timezone_validation", "Timezone Validation", "Validates timezone consistency", Cat::Network, 5, Src::Local),
    check("baseline_deviation", "Baseline Deviation", "Compares against established behavioral baseline", Cat::Ai, 5, Src::Baseline),
    check("perplexity_analysis", "Perplexity Analysis", "Statistical text predictability analysis", Cat::Ai, 5, Src::AiText),
    check("burstiness_analysis", "Burstiness Analysis", "Sentence length variation analysis", Cat::Ai, 5, Src::Local),
];

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TierInfo {
    pub level: u8,
    pub name: &'static str,
    pub description: &'static str,
    /// No collaborator is ever consulted.
    pub offline: bool,
}

static TIERS: [TierInfo; 5] = [
    TierInfo { level: 1, name: "Basic", description: "Essential fraud detection with behavioral heuristics, fully offline", offline: true },
    TierInfo { level: 2, name: "Standard", description: "Adds device fingerprinting and automation detection, fully offline", offline: true },
    TierInfo { level: 3, name: "Enhanced", description: "Adds AI content and consistency analysis", offline: false },
    TierInfo { level: 4, name: "Advanced", description: "Full behavioral analysis, network identity and plagiarism", offline: false },
    TierInfo { level: 5, name: "Maximum", description: "Cross-response correlation, timezone and baseline deviation", offline: false },
];

pub fn validate_tier(tier: u8) -> EngineResult<u8> {
    if (MIN_TIER..=MAX_TIER).contains(&tier) {
        Ok(tier)
    } else {
        Err(EngineError::Validation(format!(
            "Tier must be between {} and {}, got {}",
            MIN_TIER, MAX_TIER, tier
        )))
    }
}

pub fn tier_info(tier: u8) -> Option<&'static TierInfo> {
    TIERS.iter().find(|t| t.level == tier)
}

/// All checks unlocked at `tier`, in catalog order. Tiers are additive.
pub fn checks_for_tier(tier: u8) -> Vec<&'static CheckDefinition> {
    CATALOG.iter().filter(|c| c.tier <= tier).collect()
}

/// Whether any check fed by `source` is unlocked at `tier`.
pub fn source_unlocked(source: CheckSource, tier: u8) -> bool {
    CATALOG.iter().any(|c| c.source == source && c.tier <= tier)
}

pub fn category_unlocked(category: CheckCategory, tier: u8) -> bool {
    CATALOG.iter().any(|c| c.category == category && c.tier <= tier)
}

pub fn check_unlocked(id: &str, tier: u8) -> bool {
    find_check(id).is_some_and(|c| c.tier <= tier)
}

pub fn find_check(id: &str) -> Option<&'static CheckDefinition> {
    CATALOG.iter().find(|c| c.id == id)
}

/// Display name for a check id, falling back to the id itself.
pub fn display_name(id: &str) -> &str {
    find_check(id).map_or(id, |c| c.name)
}
