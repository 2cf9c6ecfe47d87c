//! Amount-based risk signals

use super::{score_rules, RiskTool};
use crate::config::{AMOUNT_TOOL, USER_BEHAVIOR};
use crate::context::AnalysisContext;
use crate::models::PartialRiskResult;
use crate::Result;

const HIGH_AMOUNT_CENTS: u64 = 100_000;
const VERY_HIGH_AMOUNT_CENTS: u64 = 500_000;
const ROUND_UNIT_CENTS: u64 = 10_000;
const MICRO_AMOUNT_CENTS: u64 = 100;

pub struct AmountAnalysisTool;

#[async_trait::async_trait]
impl RiskTool for AmountAnalysisTool {
    fn name(&self) -> &'static str {
        AMOUNT_TOOL
    }

    fn description(&self) -> &'static str {
        "Flags large, round and micro amounts and deviation from the account average"
    }

    async fn analyze(&self, ctx: &AnalysisContext) -> Result<PartialRiskResult> {
        let amount = ctx.transaction.amount;

        let deviation_ratio = ctx
            .source_f64(USER_BEHAVIOR, "average_amount_cents")
            .filter(|average| *average > 0.0)
            .map(|average| amount as f64 / average);
        let ratio = deviation_ratio.unwrap_or(0.0);

        let result = score_rules(&[
            (amount > HIGH_AMOUNT_CENTS, 0.3, "high_amount"),
            (amount > VERY_HIGH_AMOUNT_CENTS, 0.4, "very_high_amount"),
            (
                amount >= HIGH_AMOUNT_CENTS && amount % ROUND_UNIT_CENTS == 0,
                0.2,
                "round_amount_suspicious",
            ),
            (amount < MICRO_AMOUNT_CENTS, 0.1, "micro_transaction"),
            (ratio > 10.0, 0.5, "extreme_deviation_from_normal"),
            (ratio > 5.0 && ratio <= 10.0, 0.3, "high_deviation_from_normal"),
        ]);

        Ok(result
            .with_detail("amount_cents", amount)
            .with_detail("amount_dollars", ctx.transaction.amount_dollars())
            .with_detail("deviation_ratio", deviation_ratio))
    }
}
