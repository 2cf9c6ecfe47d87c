//! Location signals from the geolocation context

use super::{score_rules, RiskTool};
use crate::config::{GEOLOCATION_RISK, GEOSPATIAL_TOOL};
use crate::context::AnalysisContext;
use crate::models::PartialRiskResult;
use crate::Result;

pub struct GeospatialRiskTool;

#[async_trait::async_trait]
impl RiskTool for GeospatialRiskTool {
    fn name(&self) -> &'static str {
        GEOSPATIAL_TOOL
    }

    fn description(&self) -> &'static str {
        "Scores location flags, travel distance and the location risk score"
    }

    async fn analyze(&self, ctx: &AnalysisContext) -> Result<PartialRiskResult> {
        let distance_km = ctx
            .source_f64(GEOLOCATION_RISK, "distance_from_home_km")
            .unwrap_or(0.0);
        let location_risk = ctx
            .source_f64(GEOLOCATION_RISK, "location_risk_score")
            .unwrap_or(0.0);

        let mut result = score_rules(&[
            (
                ctx.source_bool(GEOLOCATION_RISK, "unusual_location"),
                0.5,
                "unusual_location",
            ),
            (
                ctx.source_bool(GEOLOCATION_RISK, "high_risk_country"),
                0.6,
                "high_risk_country",
            ),
            (
                ctx.source_bool(GEOLOCATION_RISK, "impossible_travel"),
                0.8,
                "impossible_travel",
            ),
            (distance_km > 5000.0, 0.3, "international_transaction"),
            (
                distance_km > 1000.0 && distance_km <= 5000.0,
                0.2,
                "long_distance_transaction",
            ),
        ]);
        result.score += location_risk * 0.4;

        Ok(result
            .with_detail("distance_from_home_km", distance_km)
            .with_detail("location_risk_score", location_risk)
            .with_detail("context_available", ctx.source_available(GEOLOCATION_RISK)))
    }
}
