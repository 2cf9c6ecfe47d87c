//! Weighted-mean synthesis

use super::{RiskAssessment, Synthesizer};
use crate::config::ToolWeights;
use crate::context::AnalysisContext;
use crate::models::{clamp_unit, dedup_tags, RiskLevel, SynthesisOutcome};
use std::collections::BTreeMap;

pub struct HeuristicSynthesizer {
    weights: ToolWeights,
}

impl HeuristicSynthesizer {
    pub fn new(weights: ToolWeights) -> Self {
        Self { weights }
    }

    /// Σ(score·weight) / Σweight over weighted tools, 0.0 when none are weighted.
    pub fn weighted_score(&self, ctx: &AnalysisContext) -> f64 {
        let (weighted, total) = ctx
            .tool_results
            .iter()
            .filter_map(|(name, result)| self.weights.get(name).map(|w| (result.score(), w)))
            .fold((0.0, 0.0), |(sum, total), (score, weight)| {
                (sum + score * weight, total + weight)
            });

        if total > 0.0 {
            clamp_unit(weighted / total)
        } else {
            0.0
        }
    }

    pub fn assess(&self, ctx: &AnalysisContext) -> RiskAssessment {
        let score = self.weighted_score(ctx);
        let level = RiskLevel::from_score(score);

        let tool_scores: BTreeMap<String, f64> = ctx
            .tool_results
            .iter()
            .map(|(name, result)| (name.clone(), result.score()))
            .collect();

        let risk_factors = dedup_tags(
            ctx.tool_results
                .values()
                .flat_map(|result| result.result.tags.iter().cloned()),
        );

        RiskAssessment {
            score,
            level,
            recommendation: level.recommendation(),
            confidence: confidence(score, tool_scores.values().copied()),
            explanation: explain(score, level, &tool_scores, &risk_factors),
            risk_factors,
            tool_scores,
            tool_contributions: None,
            outcome: SynthesisOutcome::Heuristic,
        }
    }
}

#[async_trait::async_trait]
impl Synthesizer for HeuristicSynthesizer {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn synthesize(&self, ctx: &AnalysisContext) -> RiskAssessment {
        self.assess(ctx)
    }
}

/// max(0.5, 1 − variance of tool scores around `score`)
fn confidence<I>(score: f64, scores: I) -> f64
where
    I: Iterator<Item = f64>,
{
    let (count, squared) = scores.fold((0usize, 0.0), |(n, sq), s| (n + 1, sq + (s - score).powi(2)));
    if count == 0 {
        return 0.5;
    }
    clamp_unit((1.0 - squared / count as f64).max(0.5))
}

fn explain(
    score: f64,
    level: RiskLevel,
    tool_scores: &BTreeMap<String, f64>,
    risk_factors: &[String],
) -> String {
    let mut top: Vec<(&String, &f64)> = tool_scores.iter().filter(|(_, s)| **s > 0.0).collect();
    top.sort_by(|a, b| b.1.total_cmp(a.1));

    let signals = if top.is_empty() {
        "no tool reported risk".to_string()
    } else {
        top.iter()
            .take(3)
            .map(|(name, s)| format!("{} {:.2}", name, s))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let factors = if risk_factors.is_empty() {
        "none".to_string()
    } else {
        risk_factors.join(", ")
    };

    format!(
        "Weighted risk score {:.2} ({:?}) from {} tools. Strongest signals: {}. Risk factors: {}.",
        score,
        level,
        tool_scores.len(),
        signals,
        factors
    )
}
