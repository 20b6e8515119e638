use anyhow::{bail, Context, Result};
use cipher_trust_lib::init_logging;
use cipher_trust_lib::models::AssessmentRequest;
use cipher_trust_lib::services::{
    BaselineService, ConfigStore, EngineConfig, FileBaselineStore, ScoringEngine,
};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

fn parse_arg_value(args: &[String], key: &str) -> Option<String> {
    args.iter()
        .position(|a| a == key)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn has_flag(args: &[String], key: &str) -> bool {
    args.iter().any(|a| a == key)
}

fn load_config(path: Option<String>) -> Result<EngineConfig> {
    let store = match path {
        Some(p) => ConfigStore::new(PathBuf::from(p)),
        None => match ConfigStore::default_config_dir() {
            Some(dir) => ConfigStore::new(dir),
            None => return Ok(EngineConfig::default()),
        },
    };
    store
        .load()
        .with_context(|| format!("loading {}", store.config_file().display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!(
            "Usage:\n  assess <payload.json> [--tier <1-5>] [--mode check|assess|both] [--config <dir>] [--baseline-dir <dir>] [--accept] [--out <json_path>]\n\nNotes:\n  - Without --config the engine reads config.json from the user config directory, or uses defaults.\n  - --accept records the response into its survey baseline (needs --baseline-dir and context.surveyId).\n  - Set CIPHER_DISABLE_FILE_LOG=1 to log to stderr only."
        );
        return Ok(());
    }

    init_logging();

    let path = &args[1];
    let mode = parse_arg_value(&args, "--mode").unwrap_or_else(|| "both".to_string());
    if !matches!(mode.as_str(), "check" | "assess" | "both") {
        bail!("unknown --mode '{}', expected check, assess or both", mode);
    }

    let config = load_config(parse_arg_value(&args, "--config"))?;
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
    let mut request: AssessmentRequest =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path))?;
    if let Some(tier) = parse_arg_value(&args, "--tier") {
        request.tier = Some(tier.parse().with_context(|| format!("invalid --tier '{}'", tier))?);
    }

    let baseline_options = config.baseline.clone();
    let mut engine = ScoringEngine::from_config(config)?;
    if let Some(dir) = parse_arg_value(&args, "--baseline-dir") {
        let store = Arc::new(FileBaselineStore::new(PathBuf::from(dir)));
        engine = engine.with_baseline(Arc::new(BaselineService::new(store, baseline_options)));
    }

    let mut output = Map::new();
    if mode != "assess" {
        let check = engine.run_tiered_check(&request).await?;
        output.insert("check".to_string(), serde_json::to_value(&check)?);
    }
    if mode != "check" {
        let assessment = engine.assess(&request).await?;
        output.insert("assessment".to_string(), serde_json::to_value(&assessment)?);
    }
    if has_flag(&args, "--accept") {
        let recorded = engine.record_accepted(&request).await?;
        output.insert(
            "baseline".to_string(),
            match recorded {
                Some(profile) => json!({
                    "surveyId": profile.survey_id,
                    "legitimateResponses": profile.legitimate_responses,
                    "confidence": profile.confidence,
                }),
                None => Value::Null,
            },
        );
    }

    let rendered = serde_json::to_string_pretty(&Value::Object(output))?;
    match parse_arg_value(&args, "--out") {
        Some(out) => {
            std::fs::write(&out, rendered).with_context(|| format!("writing {}", out))?;
            eprintln!("Wrote {}", out);
        }
        None => println!("{}", rendered),
    }
    Ok(())
}
