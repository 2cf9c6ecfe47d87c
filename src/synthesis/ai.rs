//! AI-assisted synthesis with deterministic fallback

use super::heuristic::HeuristicSynthesizer;
use super::{RiskAssessment, Synthesizer};
use crate::context::AnalysisContext;
use crate::error::FraudEngineError;
use crate::gemini::ReasoningClient;
use crate::models::{clamp_unit, dedup_tags, RiskLevel, SynthesisOutcome};
use crate::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Confidence reported when the reasoning response cannot be decoded
pub const UNPARSEABLE_CONFIDENCE: f64 = 0.3;

/// Structured verdict requested from the reasoning service
#[derive(Debug, Clone, Deserialize)]
pub struct AiVerdict {
    pub fraud_score: f64,
    #[serde(default)]
    pub risk_level: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub primary_risk_factors: Vec<String>,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub recommendation: Option<String>,
    #[serde(default)]
    pub tool_contributions: Option<Value>,
}

fn default_confidence() -> f64 {
    0.5
}

/// Decode the JSON object spanning the first `{` to the last `}`.
pub fn parse_verdict(text: &str) -> Result<AiVerdict> {
    let (start, end) = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => (start, end),
        _ => {
            return Err(FraudEngineError::ResponseParseFailure(
                "no JSON object in response".to_string(),
            ))
        }
    };

    serde_json::from_str(&text[start..=end])
        .map_err(|e| FraudEngineError::ResponseParseFailure(e.to_string()))
}

pub struct AiSynthesizer {
    client: Arc<dyn ReasoningClient>,
    fallback: HeuristicSynthesizer,
    timeout: Duration,
}

impl AiSynthesizer {
    pub fn new(
        client: Arc<dyn ReasoningClient>,
        fallback: HeuristicSynthesizer,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            fallback,
            timeout,
        }
    }

    fn build_prompt(ctx: &AnalysisContext) -> Result<String> {
        let payload = json!({
            "transaction": ctx.transaction.as_ref(),
            "history_size": ctx.history.len(),
            "tool_results": &ctx.tool_results,
            "context": &ctx.external_context,
        });

        Ok(format!(
            "Assess the following transaction for fraud.\n\n{}\n\n\
             Respond with a JSON object containing: fraud_score (0-1), \
             risk_level (LOW|MEDIUM|HIGH|CRITICAL), confidence (0-1), \
             primary_risk_factors (array of strings), explanation (string), \
             recommendation (APPROVE|REVIEW|BLOCK), tool_contributions (object of tool name to weight).",
            serde_json::to_string_pretty(&payload)?
        ))
    }

    async fn call(&self, ctx: &AnalysisContext) -> Result<String> {
        let prompt = Self::build_prompt(ctx)?;
        match tokio::time::timeout(self.timeout, self.client.generate(&prompt)).await {
            Ok(result) => result,
            Err(_) => Err(FraudEngineError::ReasoningServiceFailure(format!(
                "no response within {:?}",
                self.timeout
            ))),
        }
    }

    fn from_verdict(baseline: RiskAssessment, verdict: AiVerdict) -> RiskAssessment {
        let score = clamp_unit(verdict.fraud_score);
        let level = RiskLevel::from_score(score);

        if let Some(reported) = verdict.risk_level.as_deref() {
            if !reported.eq_ignore_ascii_case(&format!("{:?}", level)) {
                debug!(reported, derived = ?level, "Reasoning service level differs from its score");
            }
        }

        let explanation = if verdict.explanation.trim().is_empty() {
            baseline.explanation
        } else {
            verdict.explanation
        };

        RiskAssessment {
            score,
            level,
            recommendation: level.recommendation(),
            confidence: clamp_unit(verdict.confidence),
            explanation,
            risk_factors: dedup_tags(
                baseline
                    .risk_factors
                    .into_iter()
                    .chain(verdict.primary_risk_factors),
            ),
            tool_scores: baseline.tool_scores,
            tool_contributions: verdict.tool_contributions.filter(|v| !v.is_null()),
            outcome: SynthesisOutcome::AiAssisted,
        }
    }
}

#[async_trait::async_trait]
impl Synthesizer for AiSynthesizer {
    fn name(&self) -> &'static str {
        "ai_assisted"
    }

    async fn synthesize(&self, ctx: &AnalysisContext) -> RiskAssessment {
        let baseline = self.fallback.assess(ctx);

        let response = match self.call(ctx).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Reasoning service failed, using heuristic assessment");
                return RiskAssessment {
                    explanation: format!(
                        "{} [heuristic fallback: reasoning service unavailable]",
                        baseline.explanation
                    ),
                    outcome: SynthesisOutcome::FallbackServiceUnavailable,
                    ..baseline
                };
            }
        };

        match parse_verdict(&response) {
            Ok(verdict) => {
                info!(fraud_score = verdict.fraud_score, "Reasoning verdict received");
                Self::from_verdict(baseline, verdict)
            }
            Err(e) => {
                warn!(error = %e, "Reasoning response could not be decoded");
                RiskAssessment {
                    confidence: UNPARSEABLE_CONFIDENCE,
                    explanation: format!(
                        "{} [heuristic fallback: reasoning response unparseable]",
                        baseline.explanation
                    ),
                    outcome: SynthesisOutcome::FallbackUnparseableResponse,
                    ..baseline
                }
            }
        }
    }
}
