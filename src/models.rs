//! Core data models for the fraud decision engine

use crate::error::FraudEngineError;
use crate::Result;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Scores strictly above this mark a decision as fraud.
pub const FRAUD_THRESHOLD: f64 = 0.7;

/// Scores strictly above this should raise an alert downstream.
pub const ALERT_THRESHOLD: f64 = 0.5;

/// Score carried by a tool slot whose tool failed.
pub const TOOL_ERROR_SCORE: f64 = 0.1;

pub const TOOL_ERROR_TAG: &str = "tool_error";

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Map an overall score onto a level. Boundary scores take the higher level.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            RiskLevel::Critical
        } else if score >= 0.6 {
            RiskLevel::High
        } else if score >= 0.3 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn recommendation(&self) -> Recommendation {
        match self {
            RiskLevel::Critical => Recommendation::Block,
            RiskLevel::High | RiskLevel::Medium => Recommendation::Review,
            RiskLevel::Low => Recommendation::Approve,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            RiskLevel::Low => 0,
            RiskLevel::Medium => 1,
            RiskLevel::High => 2,
            RiskLevel::Critical => 3,
        }
    }
}

impl PartialOrd for RiskLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RiskLevel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Approve,
    Review,
    Block,
}

/// How the final assessment was produced
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisOutcome {
    Heuristic,
    AiAssisted,
    FallbackServiceUnavailable,
    FallbackUnparseableResponse,
}

impl SynthesisOutcome {
    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            SynthesisOutcome::FallbackServiceUnavailable
                | SynthesisOutcome::FallbackUnparseableResponse
        )
    }
}

//
// ================= Transaction =================
//

/// Ledger identifiers arrive either as integers or strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum TransactionId {
    Number(i64),
    Text(String),
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionId::Number(n) => write!(f, "{}", n),
            TransactionId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for TransactionId {
    fn from(value: i64) -> Self {
        TransactionId::Number(value)
    }
}

impl From<&str> for TransactionId {
    fn from(value: &str) -> Self {
        TransactionId::Text(value.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub transaction_id: TransactionId,
    pub from_account_num: String,
    pub from_routing_num: String,
    pub to_account_num: String,
    pub to_routing_num: String,
    /// Minor currency units (cents)
    pub amount: u64,
    /// ISO-8601, UTC
    pub timestamp: String,
}

impl Transaction {
    pub fn parsed_timestamp(&self) -> Result<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }

    pub fn amount_dollars(&self) -> f64 {
        self.amount as f64 / 100.0
    }
}

/// Parse an ISO-8601 timestamp, normalizing a literal `Z` suffix first.
/// Offset-less timestamps are read as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let trimmed = raw.trim();
    let normalized = match trimmed
        .strip_suffix('Z')
        .or_else(|| trimmed.strip_suffix('z'))
    {
        Some(head) => format!("{}+00:00", head),
        None => trimmed.to_string(),
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(&normalized) {
        return Ok(parsed.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|e| FraudEngineError::InvalidTimestamp(format!("{:?}: {}", raw, e)))
}

//
// ================= Tool I/O =================
//

/// Partial assessment produced by a single tool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartialRiskResult {
    pub score: f64,
    pub tags: Vec<String>,
    #[serde(default)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl PartialRiskResult {
    pub fn new(score: f64, tags: Vec<String>) -> Self {
        Self {
            score,
            tags,
            details: serde_json::Map::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// Placeholder carried by a failed tool's slot
    pub fn tool_error() -> Self {
        Self::new(TOOL_ERROR_SCORE, vec![TOOL_ERROR_TAG.to_string()])
    }

    pub fn clamped(mut self) -> Self {
        self.score = clamp_unit(self.score);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub tool_name: String,
    pub success: bool,
    pub result: PartialRiskResult,
    pub error: Option<String>,
    pub latency_ms: f64,
}

impl ToolResult {
    pub fn succeeded(tool_name: &str, result: PartialRiskResult, latency_ms: f64) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            success: true,
            result: result.clamped(),
            error: None,
            latency_ms,
        }
    }

    pub fn failed(tool_name: &str, error: impl Into<String>, latency_ms: f64) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            success: false,
            result: PartialRiskResult::tool_error(),
            error: Some(error.into()),
            latency_ms,
        }
    }

    pub fn score(&self) -> f64 {
        self.result.score
    }
}

//
// ================= Decision =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionDiagnostics {
    pub tools_executed: Vec<String>,
    pub tool_scores: BTreeMap<String, f64>,
    pub context_sources: Vec<String>,
    pub failed_context_sources: Vec<String>,
    pub synthesis: SynthesisOutcome,
    /// Per-tool notes from the reasoning service, AI-assisted outcomes only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_contributions: Option<serde_json::Value>,
    pub correlation_id: Uuid,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub transaction_id: String,
    pub fraud_score: f64,
    pub is_fraud: bool,
    pub risk_level: RiskLevel,
    pub confidence: f64,
    pub explanation: String,
    pub risk_factors: Vec<String>,
    pub recommendation: Recommendation,
    pub diagnostics: DecisionDiagnostics,
}

impl Decision {
    pub fn requires_alert(&self) -> bool {
        self.fraud_score > ALERT_THRESHOLD
    }
}

//
// ================= Execution Record =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub recorded_at: DateTime<Utc>,
    pub transaction_id: String,
    pub tools_executed: Vec<String>,
    pub decision: Arc<Decision>,
    pub elapsed_ms: u64,
    pub decision_digest: String,
}

pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Keep the first occurrence of each tag, preserving order.
pub fn dedup_tags<I>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = std::collections::HashSet::new();
    tags.into_iter()
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike, Weekday};

    #[test]
    fn test_timestamp_normalizes_z_suffix() {
        let ts = parse_timestamp("2024-03-15T03:45:00Z").unwrap();
        assert_eq!(ts.hour(), 3);
        assert_eq!(ts.minute(), 45);
        assert_eq!(ts.weekday(), Weekday::Fri);
    }

    #[test]
    fn test_timestamp_without_offset_is_utc() {
        let ts = parse_timestamp("2024-03-15T08:30:00.123456").unwrap();
        assert_eq!(ts.hour(), 8);

        let offset = parse_timestamp("2024-03-15T08:30:00+02:00").unwrap();
        assert_eq!(offset.hour(), 6);
    }

    #[test]
    fn test_timestamp_rejects_garbage() {
        assert!(matches!(
            parse_timestamp("yesterday at noon"),
            Err(FraudEngineError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_risk_level_boundaries() {
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.3), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.6), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.8), RiskLevel::Critical);
        assert_eq!(RiskLevel::Critical.recommendation(), Recommendation::Block);
        assert_eq!(RiskLevel::Medium.recommendation(), Recommendation::Review);
        assert!(RiskLevel::High > RiskLevel::Medium);
    }

    #[test]
    fn test_transaction_wire_format() {
        let raw = serde_json::json!({
            "transactionId": 12345,
            "fromAccountNum": "1011226360",
            "fromRoutingNum": "883745000",
            "toAccountNum": "9999999999",
            "toRoutingNum": "123456789",
            "amount": 450,
            "timestamp": "2024-03-15T08:30:00Z"
        });

        let tx: Transaction = serde_json::from_value(raw).unwrap();
        assert_eq!(tx.transaction_id, TransactionId::Number(12345));
        assert_eq!(tx.transaction_id.to_string(), "12345");
        assert!((tx.amount_dollars() - 4.5).abs() < f64::EPSILON);

        let text_id: TransactionId = serde_json::from_str("\"tx-9\"").unwrap();
        assert_eq!(text_id, TransactionId::Text("tx-9".to_string()));
    }

    #[test]
    fn test_negative_amount_is_rejected() {
        let raw = serde_json::json!({
            "transactionId": 1,
            "fromAccountNum": "a",
            "fromRoutingNum": "b",
            "toAccountNum": "c",
            "toRoutingNum": "d",
            "amount": -5,
            "timestamp": "2024-03-15T08:30:00Z"
        });
        assert!(serde_json::from_value::<Transaction>(raw).is_err());
    }

    #[test]
    fn test_failed_tool_result_carries_error_tag() {
        let result = ToolResult::failed("broken", "boom", 0.2);
        assert!(!result.success);
        assert_eq!(result.score(), TOOL_ERROR_SCORE);
        assert_eq!(result.result.tags, vec![TOOL_ERROR_TAG.to_string()]);

        let clamped = ToolResult::succeeded("hot", PartialRiskResult::new(1.7, vec![]), 0.1);
        assert_eq!(clamped.score(), 1.0);
    }

    #[test]
    fn test_dedup_tags_keeps_first_occurrence() {
        let tags = dedup_tags(
            ["a", "b", "a", "c", "b"].iter().map(|s| s.to_string()),
        );
        assert_eq!(tags, vec!["a", "b", "c"]);
    }
}
