//! Time-of-day and weekday signals

use super::{score_rules, RiskTool};
use crate::config::{TEMPORAL_TOOL, USER_BEHAVIOR};
use crate::context::AnalysisContext;
use crate::models::PartialRiskResult;
use crate::Result;
use chrono::{Datelike, Timelike, Weekday};
use serde_json::Value;
use tracing::debug;

pub struct TemporalPatternTool;

impl TemporalPatternTool {
    fn typical_hours(ctx: &AnalysisContext) -> Vec<u32> {
        ctx.source(USER_BEHAVIOR)
            .and_then(|v| v.get("typical_transaction_hours"))
            .and_then(Value::as_array)
            .map(|hours| {
                hours
                    .iter()
                    .filter_map(Value::as_u64)
                    .map(|h| h as u32)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl RiskTool for TemporalPatternTool {
    fn name(&self) -> &'static str {
        TEMPORAL_TOOL
    }

    fn description(&self) -> &'static str {
        "Scores the UTC hour and weekday against risky windows and the account's usual hours"
    }

    async fn analyze(&self, ctx: &AnalysisContext) -> Result<PartialRiskResult> {
        let timestamp = match ctx.transaction.parsed_timestamp() {
            Ok(ts) => ts,
            Err(e) => {
                debug!(error = %e, "Unreadable timestamp, using fixed temporal score");
                return Ok(PartialRiskResult::new(
                    0.1,
                    vec!["temporal_analysis_error".to_string()],
                ));
            }
        };

        let hour = timestamp.hour();
        let weekend = matches!(timestamp.weekday(), Weekday::Sat | Weekday::Sun);
        let typical = Self::typical_hours(ctx);

        let result = score_rules(&[
            ((2..=4).contains(&hour), 0.5, "suspicious_late_night_hour"),
            (hour == 23 || hour <= 1, 0.3, "late_night_transaction"),
            ((5..=6).contains(&hour), 0.2, "early_morning_unusual"),
            (weekend && (2..=6).contains(&hour), 0.2, "weekend_suspicious_hour"),
            (
                !typical.is_empty() && !typical.contains(&hour),
                0.3,
                "unusual_hour_for_user",
            ),
        ]);

        Ok(result
            .with_detail("hour_utc", hour)
            .with_detail("weekend", weekend))
    }
}
