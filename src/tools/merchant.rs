//! Destination account risk from merchant intelligence

use super::RiskTool;
use crate::config::{MERCHANT_INTELLIGENCE, MERCHANT_TOOL};
use crate::context::AnalysisContext;
use crate::models::PartialRiskResult;
use crate::Result;

pub struct MerchantRiskTool;

#[async_trait::async_trait]
impl RiskTool for MerchantRiskTool {
    fn name(&self) -> &'static str {
        MERCHANT_TOOL
    }

    fn description(&self) -> &'static str {
        "Scores the destination's merchant risk and fraud report history"
    }

    async fn analyze(&self, ctx: &AnalysisContext) -> Result<PartialRiskResult> {
        let risk = ctx
            .source_f64(MERCHANT_INTELLIGENCE, "merchant_risk_score")
            .unwrap_or(0.0);
        let reports = ctx
            .source_u64(MERCHANT_INTELLIGENCE, "fraud_reports_count")
            .unwrap_or(0);

        let mut result = PartialRiskResult::new(risk * 0.6, Vec::new());
        if risk > 0.7 {
            result.tags.push("high_risk_merchant".to_string());
        } else if risk > 0.4 {
            result.tags.push("medium_risk_merchant".to_string());
        }
        if reports > 5 {
            result.score += 0.3;
            result.tags.push("merchant_fraud_history".to_string());
        }

        Ok(result
            .with_detail("merchant_risk_score", risk)
            .with_detail("fraud_reports_count", reports)
            .with_detail("context_available", ctx.source_available(MERCHANT_INTELLIGENCE)))
    }
}
