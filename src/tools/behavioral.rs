//! Deviation from the account's own history

use super::{score_rules, RiskTool};
use crate::config::{BEHAVIORAL_TOOL, USER_BEHAVIOR};
use crate::context::{count_prior_within, AnalysisContext};
use crate::models::PartialRiskResult;
use crate::Result;
use chrono::Duration;

pub struct BehavioralDeviationTool;

#[async_trait::async_trait]
impl RiskTool for BehavioralDeviationTool {
    fn name(&self) -> &'static str {
        BEHAVIORAL_TOOL
    }

    fn description(&self) -> &'static str {
        "Compares the amount and 24h frequency with the account history"
    }

    async fn analyze(&self, ctx: &AnalysisContext) -> Result<PartialRiskResult> {
        let history = ctx.history.as_slice();
        if history.is_empty() {
            return Ok(PartialRiskResult::new(
                0.2,
                vec!["no_transaction_history".to_string()],
            ));
        }

        let average = history.iter().map(|t| t.amount as f64).sum::<f64>() / history.len() as f64;
        let ratio = if average > 0.0 {
            ctx.transaction.amount as f64 / average
        } else {
            0.0
        };
        let frequency_24h = ctx
            .source_u64(USER_BEHAVIOR, "recent_transaction_count_24h")
            .map(|count| count as usize)
            .unwrap_or_else(|| count_prior_within(&ctx.transaction, history, Duration::hours(24)));

        let result = score_rules(&[
            (ratio > 10.0, 0.6, "extreme_amount_deviation"),
            (ratio > 5.0 && ratio <= 10.0, 0.4, "high_amount_deviation"),
            (ratio > 3.0 && ratio <= 5.0, 0.2, "moderate_amount_deviation"),
            (frequency_24h > 20, 0.5, "extreme_frequency_24h"),
            (
                frequency_24h > 10 && frequency_24h <= 20,
                0.3,
                "high_frequency_24h",
            ),
        ]);

        Ok(result
            .with_detail("average_amount_cents", average)
            .with_detail("amount_ratio", ratio)
            .with_detail("frequency_24h", frequency_24h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::transaction;
    use crate::context::ContextEntry;
    use crate::models::Transaction;
    use serde_json::json;

    async fn analyze(amount: u64, history: Vec<Transaction>) -> PartialRiskResult {
        let ctx = AnalysisContext::new(transaction(100, amount, "2024-03-13T12:00:00Z"), history);
        BehavioralDeviationTool.analyze(&ctx).await.unwrap()
    }

    #[tokio::test]
    async fn test_empty_history_is_a_mild_signal() {
        let result = analyze(450, vec![]).await;
        assert_eq!(result.tags, vec!["no_transaction_history"]);
        assert!((result.score - 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_amount_ratio_bands() {
        let history = vec![transaction(1, 1_000, "2024-03-10T12:00:00Z")];

        let extreme = analyze(11_000, history.clone()).await;
        assert_eq!(extreme.tags, vec!["extreme_amount_deviation"]);

        let high = analyze(6_000, history.clone()).await;
        assert_eq!(high.tags, vec!["high_amount_deviation"]);

        let moderate = analyze(4_000, history.clone()).await;
        assert_eq!(moderate.tags, vec!["moderate_amount_deviation"]);

        let normal = analyze(1_500, history).await;
        assert!(normal.tags.is_empty());
    }

    #[tokio::test]
    async fn test_frequency_in_last_day() {
        let busy: Vec<Transaction> = (0..12)
            .map(|i| transaction(i, 1_000, &format!("2024-03-13T{:02}:00:00Z", i % 12)))
            .collect();
        let result = analyze(1_000, busy).await;
        assert_eq!(result.tags, vec!["high_frequency_24h"]);

        let frantic: Vec<Transaction> = (0..22)
            .map(|i| transaction(i, 1_000, &format!("2024-03-13T{:02}:{:02}:00Z", i / 2, i % 60)))
            .collect();
        let result = analyze(1_000, frantic).await;
        assert_eq!(result.tags, vec!["extreme_frequency_24h"]);
    }

    #[tokio::test]
    async fn test_frequency_from_behavior_context() {
        let history = vec![transaction(1, 1_000, "2024-03-13T11:00:00Z")];
        let ctx = AnalysisContext::new(transaction(100, 1_000, "2024-03-13T12:00:00Z"), history)
            .with_context(
                USER_BEHAVIOR,
                ContextEntry::Available(json!({ "recent_transaction_count_24h": 15 })),
            );

        let result = BehavioralDeviationTool.analyze(&ctx).await.unwrap();
        assert_eq!(result.tags, vec!["high_frequency_24h"]);
        assert_eq!(result.details["frequency_24h"], 15);
    }
}
