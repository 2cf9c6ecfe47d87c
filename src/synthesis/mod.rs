//! Risk synthesis
//!
//! Turns the completed tool results of one analysis into a single
//! assessment. [`HeuristicSynthesizer`] is deterministic and always
//! available; [`AiSynthesizer`] asks a reasoning service and falls back to
//! the heuristic result whenever that fails.

pub mod ai;
pub mod heuristic;

pub use ai::AiSynthesizer;
pub use heuristic::HeuristicSynthesizer;

use crate::context::AnalysisContext;
use crate::models::{Recommendation, RiskLevel, SynthesisOutcome};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RiskAssessment {
    pub score: f64,
    pub level: RiskLevel,
    pub recommendation: Recommendation,
    pub confidence: f64,
    pub explanation: String,
    pub risk_factors: Vec<String>,
    pub tool_scores: BTreeMap<String, f64>,
    pub tool_contributions: Option<Value>,
    pub outcome: SynthesisOutcome,
}

#[async_trait::async_trait]
pub trait Synthesizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Never fails: every strategy ends in a complete assessment.
    async fn synthesize(&self, ctx: &AnalysisContext) -> RiskAssessment;
}
