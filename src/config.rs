//! Engine configuration
//!
//! Everything the engine needs is carried in an explicit [`EngineConfig`]
//! value handed to constructors. The environment is read once, in
//! [`EngineConfig::from_env`].

use crate::error::FraudEngineError;
use crate::Result;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::time::Duration;

pub const USER_BEHAVIOR: &str = "user_behavior";
pub const MERCHANT_INTELLIGENCE: &str = "merchant_intelligence";
pub const GEOLOCATION_RISK: &str = "geolocation_risk";
pub const FRAUD_PATTERNS: &str = "fraud_patterns";

pub const AMOUNT_TOOL: &str = "transaction_amount_analysis";
pub const TEMPORAL_TOOL: &str = "temporal_pattern_analysis";
pub const GEOSPATIAL_TOOL: &str = "geospatial_risk_assessment";
pub const BEHAVIORAL_TOOL: &str = "behavioral_deviation_analysis";
pub const VELOCITY_TOOL: &str = "velocity_fraud_detection";
pub const MERCHANT_TOOL: &str = "merchant_risk_analysis";

const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisStrategy {
    Heuristic,
    AiAssisted,
}

impl std::str::FromStr for SynthesisStrategy {
    type Err = FraudEngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "heuristic" => Ok(SynthesisStrategy::Heuristic),
            "ai" | "ai_assisted" | "ai-assisted" => Ok(SynthesisStrategy::AiAssisted),
            other => Err(FraudEngineError::Config(format!(
                "Unknown synthesis strategy '{}'",
                other
            ))),
        }
    }
}

/// Per-tool weights used by heuristic synthesis. Weights need not sum to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolWeights(BTreeMap<String, f64>);

impl ToolWeights {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with(mut self, tool: &str, weight: f64) -> Self {
        self.0.insert(tool.to_string(), weight);
        self
    }

    pub fn set(&mut self, tool: &str, weight: f64) {
        self.0.insert(tool.to_string(), weight);
    }

    pub fn get(&self, tool: &str) -> Option<f64> {
        self.0.get(tool).copied()
    }

    /// Parse `name=weight,name=weight` overrides on top of `self`.
    pub fn apply_overrides(&mut self, raw: &str) -> Result<()> {
        for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, weight) = pair.split_once('=').ok_or_else(|| {
                FraudEngineError::Config(format!("Expected name=weight, got '{}'", pair))
            })?;
            let weight: f64 = weight.trim().parse().map_err(|_| {
                FraudEngineError::Config(format!("Invalid weight for '{}': '{}'", name, weight))
            })?;
            if !weight.is_finite() || weight < 0.0 {
                return Err(FraudEngineError::Config(format!(
                    "Weight for '{}' must be a non-negative number",
                    name
                )));
            }
            self.set(name.trim(), weight);
        }
        Ok(())
    }
}

impl Default for ToolWeights {
    fn default() -> Self {
        Self::new()
            .with(AMOUNT_TOOL, 0.30)
            .with(TEMPORAL_TOOL, 0.20)
            .with(GEOSPATIAL_TOOL, 0.25)
            .with(BEHAVIORAL_TOOL, 0.15)
            // Only participates when recent activity exists
            .with(VELOCITY_TOOL, 0.80)
            .with(MERCHANT_TOOL, 0.10)
    }
}

#[derive(Debug, Clone)]
pub struct ReasoningConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    pub temperature: f32,
    pub max_output_tokens: i32,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            timeout: Duration::from_secs(10),
            temperature: 0.2,
            max_output_tokens: 1024,
        }
    }
}

/// Static risk profile for a destination account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MerchantProfile {
    pub merchant_risk_score: f64,
    pub fraud_reports_count: u64,
    pub merchant_category: String,
}

impl Default for MerchantProfile {
    fn default() -> Self {
        Self {
            merchant_risk_score: 0.1,
            fraud_reports_count: 0,
            merchant_category: "unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Remote context service; local derived sources are used when unset
    pub api_base_url: Option<String>,
    pub request_timeout: Duration,
    pub ttls: HashMap<String, Duration>,
    pub default_ttl: Duration,
    /// Average used by the behavior source for accounts without history
    pub baseline_average_cents: u64,
    /// Keyed by `<routing>_<account>` of the destination
    pub merchant_profiles: HashMap<String, MerchantProfile>,
    pub default_merchant: MerchantProfile,
}

impl ContextConfig {
    pub fn ttl_for(&self, source: &str) -> Duration {
        self.ttls.get(source).copied().unwrap_or(self.default_ttl)
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        let ttls = HashMap::from([
            (USER_BEHAVIOR.to_string(), Duration::from_secs(300)),
            (MERCHANT_INTELLIGENCE.to_string(), Duration::from_secs(600)),
            (GEOLOCATION_RISK.to_string(), Duration::from_secs(180)),
            (FRAUD_PATTERNS.to_string(), Duration::from_secs(900)),
        ]);

        Self {
            api_base_url: None,
            request_timeout: Duration::from_secs(5),
            ttls,
            default_ttl: Duration::from_secs(300),
            baseline_average_cents: 8_550,
            merchant_profiles: HashMap::new(),
            default_merchant: MerchantProfile::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub synthesis: SynthesisStrategy,
    pub reasoning: ReasoningConfig,
    pub context: ContextConfig,
    pub tool_weights: ToolWeights,
    /// Tools requested for every analysis, in order
    pub pipeline_tools: Vec<String>,
    pub history_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            synthesis: SynthesisStrategy::Heuristic,
            reasoning: ReasoningConfig::default(),
            context: ContextConfig::default(),
            tool_weights: ToolWeights::default(),
            pipeline_tools: default_pipeline_tools(),
            history_capacity: 1000,
        }
    }
}

pub fn default_pipeline_tools() -> Vec<String> {
    [
        AMOUNT_TOOL,
        TEMPORAL_TOOL,
        GEOSPATIAL_TOOL,
        BEHAVIORAL_TOOL,
        VELOCITY_TOOL,
        MERCHANT_TOOL,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl EngineConfig {
    /// Build configuration from environment variables on top of defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        config.reasoning.api_key = non_empty("GEMINI_API_KEY");
        if let Some(model) = non_empty("GEMINI_MODEL") {
            config.reasoning.model = model;
        }
        if let Some(base_url) = non_empty("GEMINI_BASE_URL") {
            config.reasoning.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = non_empty("REASONING_TIMEOUT_SECS") {
            config.reasoning.timeout = Duration::from_secs(parse_number(
                "REASONING_TIMEOUT_SECS",
                &secs,
            )?);
        }

        config.synthesis = match non_empty("FRAUD_SYNTHESIS") {
            Some(raw) => raw.parse()?,
            None if config.reasoning.api_key.is_some() => SynthesisStrategy::AiAssisted,
            None => SynthesisStrategy::Heuristic,
        };

        config.context.api_base_url = non_empty("CONTEXT_API_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string());

        for source in [USER_BEHAVIOR, MERCHANT_INTELLIGENCE, GEOLOCATION_RISK, FRAUD_PATTERNS] {
            let key = format!("CONTEXT_TTL_{}", source.to_uppercase());
            if let Some(secs) = non_empty(&key) {
                let ttl = Duration::from_secs(parse_number(&key, &secs)?);
                config.context.ttls.insert(source.to_string(), ttl);
            }
        }

        if let Some(cents) = non_empty("BASELINE_AVERAGE_CENTS") {
            config.context.baseline_average_cents = parse_number("BASELINE_AVERAGE_CENTS", &cents)?;
        }

        if let Some(raw) = non_empty("TOOL_WEIGHTS") {
            config.tool_weights.apply_overrides(&raw)?;
        }

        if let Some(raw) = non_empty("PIPELINE_TOOLS") {
            config.pipeline_tools = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(raw) = non_empty("HISTORY_CAPACITY") {
            config.history_capacity = parse_number::<usize>("HISTORY_CAPACITY", &raw)?.max(1);
        }

        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| FraudEngineError::Config(format!("{} must be a number, got '{}'", key, raw)))
}
