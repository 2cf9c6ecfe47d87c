//! Rapid repeat activity on the same account

use super::{score_rules, RiskTool};
use crate::config::VELOCITY_TOOL;
use crate::context::{count_prior_within, AnalysisContext};
use crate::models::PartialRiskResult;
use crate::Result;
use chrono::Duration;

const HIGH_VALUE_CENTS: u64 = 50_000;

pub struct VelocityFraudTool;

#[async_trait::async_trait]
impl RiskTool for VelocityFraudTool {
    fn name(&self) -> &'static str {
        VELOCITY_TOOL
    }

    fn description(&self) -> &'static str {
        "Detects bursts of transactions within ten minutes and one hour"
    }

    /// Only relevant when the account was active in the last hour
    fn applies(&self, ctx: &AnalysisContext) -> bool {
        count_prior_within(&ctx.transaction, &ctx.history, Duration::hours(1)) > 0
    }

    async fn analyze(&self, ctx: &AnalysisContext) -> Result<PartialRiskResult> {
        let last_10m = count_prior_within(&ctx.transaction, &ctx.history, Duration::minutes(10));
        let last_hour = count_prior_within(&ctx.transaction, &ctx.history, Duration::hours(1));
        let amount = ctx.transaction.amount;

        let result = score_rules(&[
            (last_10m >= 1, 0.5, "rapid_repeat_transaction"),
            (last_10m >= 2, 0.5, "burst_velocity"),
            (last_hour > 5, 0.3, "high_velocity_1h"),
            (
                amount > HIGH_VALUE_CENTS && last_hour > 3,
                0.3,
                "high_value_velocity_pattern",
            ),
        ]);

        Ok(result
            .with_detail("transactions_10m", last_10m)
            .with_detail("transactions_1h", last_hour))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::transaction;

    #[tokio::test]
    async fn test_burst_of_three_transfers() {
        let history = vec![
            transaction(1, 10_000, "2024-03-13T10:30:00Z"),
            transaction(2, 20_000, "2024-03-13T10:33:00Z"),
        ];
        let ctx = AnalysisContext::new(transaction(3, 30_000, "2024-03-13T10:36:00Z"), history);

        assert!(VelocityFraudTool.applies(&ctx));
        let result = VelocityFraudTool.analyze(&ctx).await.unwrap();
        assert_eq!(result.tags, vec!["rapid_repeat_transaction", "burst_velocity"]);
        assert!((result.score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_high_value_hourly_pattern() {
        let history = (1..=4)
            .map(|i| transaction(i, 60_000, &format!("2024-03-13T10:{:02}:00Z", i * 10)))
            .collect();
        let ctx = AnalysisContext::new(transaction(9, 60_000, "2024-03-13T10:45:00Z"), history);

        let result = VelocityFraudTool.analyze(&ctx).await.unwrap();
        assert_eq!(
            result.tags,
            vec!["rapid_repeat_transaction", "high_value_velocity_pattern"]
        );
    }

    #[test]
    fn test_quiet_account_does_not_apply() {
        let history = vec![transaction(1, 10_000, "2024-03-13T07:00:00Z")];
        let ctx = AnalysisContext::new(transaction(2, 10_000, "2024-03-13T10:36:00Z"), history);
        assert!(!VelocityFraudTool.applies(&ctx));
    }
}
