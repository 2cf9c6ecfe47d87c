//! Context sources
//!
//! A context source looks up auxiliary data for one transaction. Built-in
//! sources derive their values from the transaction and the account history;
//! when a context service is configured, every source is fetched over HTTP
//! instead.

use crate::config::{
    ContextConfig, EngineConfig, MerchantProfile, FRAUD_PATTERNS, GEOLOCATION_RISK,
    MERCHANT_INTELLIGENCE, USER_BEHAVIOR,
};
use crate::error::FraudEngineError;
use crate::models::Transaction;
use crate::Result;
use chrono::{Duration as ChronoDuration, Timelike};
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Input handed to every source
#[derive(Debug, Clone)]
pub struct SourceRequest {
    pub transaction: Arc<Transaction>,
    pub history: Arc<Vec<Transaction>>,
}

#[async_trait::async_trait]
pub trait ContextSource: Send + Sync {
    fn name(&self) -> &str;

    /// Higher priorities are launched first
    fn priority(&self) -> i32;

    fn cache_key(&self, request: &SourceRequest) -> String {
        format!("transaction_{}", request.transaction.transaction_id)
    }

    async fn fetch(&self, request: &SourceRequest) -> Result<Value>;
}

/// Number of history entries strictly before `transaction` and no older than
/// `window`. Entries sharing its id or with unreadable timestamps are skipped.
pub fn count_prior_within(
    transaction: &Transaction,
    history: &[Transaction],
    window: ChronoDuration,
) -> usize {
    let Ok(current) = transaction.parsed_timestamp() else {
        return 0;
    };
    let earliest = current - window;

    history
        .iter()
        .filter(|prior| prior.transaction_id != transaction.transaction_id)
        .filter_map(|prior| prior.parsed_timestamp().ok())
        .filter(|ts| *ts >= earliest && *ts <= current)
        .count()
}

fn merchant_cache_key(transaction: &Transaction) -> String {
    format!(
        "merchant_{}_{}",
        transaction.to_routing_num, transaction.to_account_num
    )
}

fn transaction_hour(transaction: &Transaction) -> u32 {
    transaction
        .parsed_timestamp()
        .map(|ts| ts.hour())
        .unwrap_or(12)
}

// ===== Built-in sources =====

pub struct UserBehaviorSource {
    baseline_average_cents: u64,
}

impl UserBehaviorSource {
    pub fn new(baseline_average_cents: u64) -> Self {
        Self {
            baseline_average_cents,
        }
    }
}

#[async_trait::async_trait]
impl ContextSource for UserBehaviorSource {
    fn name(&self) -> &str {
        USER_BEHAVIOR
    }

    fn priority(&self) -> i32 {
        3
    }

    async fn fetch(&self, request: &SourceRequest) -> Result<Value> {
        let history = request.history.as_slice();

        let (average_amount_cents, baseline) = if history.is_empty() {
            (self.baseline_average_cents, true)
        } else {
            let total = history
                .iter()
                .fold(0u64, |sum, t| sum.saturating_add(t.amount));
            (total / history.len() as u64, false)
        };

        let typical_hours: BTreeSet<u32> = history
            .iter()
            .filter_map(|t| t.parsed_timestamp().ok())
            .map(|ts| ts.hour())
            .collect();

        Ok(json!({
            "average_amount_cents": average_amount_cents,
            "baseline": baseline,
            "recent_transaction_count_24h": count_prior_within(
                &request.transaction,
                history,
                ChronoDuration::hours(24),
            ),
            "typical_transaction_hours": typical_hours,
            "history_size": history.len(),
        }))
    }
}

pub struct MerchantIntelligenceSource {
    profiles: HashMap<String, MerchantProfile>,
    default_profile: MerchantProfile,
}

impl MerchantIntelligenceSource {
    pub fn new(profiles: HashMap<String, MerchantProfile>, default_profile: MerchantProfile) -> Self {
        Self {
            profiles,
            default_profile,
        }
    }
}

#[async_trait::async_trait]
impl ContextSource for MerchantIntelligenceSource {
    fn name(&self) -> &str {
        MERCHANT_INTELLIGENCE
    }

    fn priority(&self) -> i32 {
        2
    }

    fn cache_key(&self, request: &SourceRequest) -> String {
        merchant_cache_key(&request.transaction)
    }

    async fn fetch(&self, request: &SourceRequest) -> Result<Value> {
        let tx = &request.transaction;
        let key = format!("{}_{}", tx.to_routing_num, tx.to_account_num);
        let profile = self.profiles.get(&key).unwrap_or(&self.default_profile);

        Ok(serde_json::to_value(profile)?)
    }
}

pub struct GeolocationRiskSource;

#[async_trait::async_trait]
impl ContextSource for GeolocationRiskSource {
    fn name(&self) -> &str {
        GEOLOCATION_RISK
    }

    fn priority(&self) -> i32 {
        4
    }

    async fn fetch(&self, request: &SourceRequest) -> Result<Value> {
        let hour = transaction_hour(&request.transaction);
        let unusual_location = request.transaction.amount > 200_000 && (hour < 6 || hour > 22);

        Ok(json!({
            "unusual_location": unusual_location,
            "high_risk_country": false,
            "impossible_travel": false,
            "distance_from_home_km": 0,
            "location_risk_score": if unusual_location { 0.8 } else { 0.1 },
        }))
    }
}

pub struct FraudPatternSource;

#[async_trait::async_trait]
impl ContextSource for FraudPatternSource {
    fn name(&self) -> &str {
        FRAUD_PATTERNS
    }

    fn priority(&self) -> i32 {
        1
    }

    async fn fetch(&self, request: &SourceRequest) -> Result<Value> {
        let tx = &request.transaction;
        let hour = transaction_hour(tx);
        let mut matches = Vec::new();

        if tx.amount >= 100_000 && tx.amount % 10_000 == 0 {
            matches.push("round_amount");
        }
        if tx.amount < 100 {
            matches.push("micro_amount");
        }
        if count_prior_within(tx, &request.history, ChronoDuration::minutes(10)) >= 2 {
            matches.push("rapid_succession");
        }
        if tx.amount > 100_000 && (hour < 6 || hour >= 23) {
            matches.push("off_hours_high_value");
        }

        Ok(json!({
            "similar_fraud_cases": matches.len(),
            "pattern_confidence": if matches.is_empty() { 0.0 } else { 0.8 },
            "matches_known_patterns": matches,
        }))
    }
}

// ===== Remote sources =====

/// Fetches one source from `<base>/context/<name>`
pub struct HttpContextSource {
    name: String,
    priority: i32,
    client: Client,
    base_url: String,
}

impl HttpContextSource {
    pub fn new(name: &str, priority: i32, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            name: name.to_string(),
            priority,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl ContextSource for HttpContextSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn cache_key(&self, request: &SourceRequest) -> String {
        if self.name == MERCHANT_INTELLIGENCE {
            merchant_cache_key(&request.transaction)
        } else {
            format!("transaction_{}", request.transaction.transaction_id)
        }
    }

    async fn fetch(&self, request: &SourceRequest) -> Result<Value> {
        let url = format!("{}/context/{}", self.base_url, self.name);
        debug!(source = %self.name, %url, "Fetching remote context");

        let body = json!({
            "transaction": request.transaction.as_ref(),
            "history": request.history.as_ref(),
        });

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                FraudEngineError::ContextSourceFailure(format!(
                    "Request to {} failed: {}",
                    url, e
                ))
            })?;

        let status = response.status();
        let payload = response.json::<Value>().await.map_err(|e| {
            FraudEngineError::ContextSourceFailure(format!("Invalid JSON from {}: {}", url, e))
        })?;

        if !status.is_success() {
            return Err(FraudEngineError::ContextSourceFailure(format!(
                "{} returned {}: {}",
                url, status, payload
            )));
        }

        Ok(payload)
    }
}

fn default_priority(name: &str) -> i32 {
    match name {
        GEOLOCATION_RISK => 4,
        USER_BEHAVIOR => 3,
        MERCHANT_INTELLIGENCE => 2,
        _ => 1,
    }
}

/// Build the four standard sources, remote when a context service is set.
pub fn create_default_sources(config: &EngineConfig) -> Result<Vec<Arc<dyn ContextSource>>> {
    let context: &ContextConfig = &config.context;

    if let Some(base_url) = &context.api_base_url {
        return [USER_BEHAVIOR, MERCHANT_INTELLIGENCE, GEOLOCATION_RISK, FRAUD_PATTERNS]
            .iter()
            .map(|name| {
                let source = HttpContextSource::new(
                    name,
                    default_priority(name),
                    base_url,
                    context.request_timeout,
                )?;
                Ok(Arc::new(source) as Arc<dyn ContextSource>)
            })
            .collect();
    }

    let sources: Vec<Arc<dyn ContextSource>> = vec![
        Arc::new(UserBehaviorSource::new(context.baseline_average_cents)),
        Arc::new(MerchantIntelligenceSource::new(
            context.merchant_profiles.clone(),
            context.default_merchant.clone(),
        )),
        Arc::new(GeolocationRiskSource),
        Arc::new(FraudPatternSource),
    ];
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::transaction;
    use axum::{routing::post, Json, Router};

    fn request(tx: Transaction, history: Vec<Transaction>) -> SourceRequest {
        SourceRequest {
            transaction: Arc::new(tx),
            history: Arc::new(history),
        }
    }

    #[tokio::test]
    async fn test_user_behavior_uses_baseline_without_history() {
        let source = UserBehaviorSource::new(8_550);
        let value = source
            .fetch(&request(transaction(1, 450, "2024-03-15T08:30:00Z"), vec![]))
            .await
            .unwrap();

        assert_eq!(value["average_amount_cents"], 8_550);
        assert_eq!(value["baseline"], true);
        assert_eq!(value["history_size"], 0);
        assert_eq!(value["typical_transaction_hours"], json!([]));
    }

    #[tokio::test]
    async fn test_user_behavior_summarizes_history() {
        let history = vec![
            transaction(1, 10_000, "2024-03-13T10:30:00Z"),
            transaction(2, 20_000, "2024-03-13T18:33:00Z"),
            transaction(3, 30_000, "2024-03-10T10:00:00Z"),
        ];
        let value = UserBehaviorSource::new(8_550)
            .fetch(&request(transaction(4, 5_000, "2024-03-13T20:00:00Z"), history))
            .await
            .unwrap();

        assert_eq!(value["average_amount_cents"], 20_000);
        assert_eq!(value["baseline"], false);
        assert_eq!(value["recent_transaction_count_24h"], 2);
        assert_eq!(value["typical_transaction_hours"], json!([10, 18]));
    }

    #[test]
    fn test_prior_window_excludes_self_and_future() {
        let current = transaction(3, 100, "2024-03-13T10:36:00Z");
        let history = vec![
            transaction(1, 100, "2024-03-13T10:30:00Z"),
            transaction(2, 100, "2024-03-13T10:20:00Z"),
            transaction(3, 100, "2024-03-13T10:36:00Z"),
            transaction(4, 100, "2024-03-13T10:40:00Z"),
            transaction(5, 100, "not a time"),
        ];

        assert_eq!(count_prior_within(&current, &history, ChronoDuration::minutes(10)), 1);
        assert_eq!(count_prior_within(&current, &history, ChronoDuration::hours(1)), 2);
    }

    #[tokio::test]
    async fn test_merchant_profile_lookup_and_key() {
        let mut profiles = HashMap::new();
        profiles.insert(
            "123456789_9999999999".to_string(),
            MerchantProfile {
                merchant_risk_score: 0.9,
                fraud_reports_count: 7,
                merchant_category: "crypto_exchange".to_string(),
            },
        );
        let source = MerchantIntelligenceSource::new(profiles, MerchantProfile::default());
        let req = request(transaction(1, 450, "2024-03-15T08:30:00Z"), vec![]);

        assert_eq!(source.cache_key(&req), "merchant_123456789_9999999999");
        let value = source.fetch(&req).await.unwrap();
        assert_eq!(value["merchant_risk_score"], 0.9);
        assert_eq!(value["fraud_reports_count"], 7);

        let mut other = transaction(2, 450, "2024-03-15T08:30:00Z");
        other.to_account_num = "1111".to_string();
        let fallback = source.fetch(&request(other, vec![])).await.unwrap();
        assert_eq!(fallback["merchant_category"], "unknown");
    }

    #[tokio::test]
    async fn test_geolocation_flags_large_off_hours_transfers() {
        let night = GeolocationRiskSource
            .fetch(&request(transaction(1, 250_000, "2024-03-15T03:45:00Z"), vec![]))
            .await
            .unwrap();
        assert_eq!(night["unusual_location"], true);
        assert_eq!(night["location_risk_score"], 0.8);

        let day = GeolocationRiskSource
            .fetch(&request(transaction(2, 250_000, "2024-03-15T15:00:00Z"), vec![]))
            .await
            .unwrap();
        assert_eq!(day["unusual_location"], false);
        assert_eq!(day["location_risk_score"], 0.1);
    }

    #[tokio::test]
    async fn test_fraud_patterns_match() {
        let history = vec![
            transaction(1, 10_000, "2024-03-13T10:30:00Z"),
            transaction(2, 20_000, "2024-03-13T10:33:00Z"),
        ];
        let value = FraudPatternSource
            .fetch(&request(transaction(3, 30_000, "2024-03-13T10:36:00Z"), history))
            .await
            .unwrap();
        assert_eq!(value["matches_known_patterns"], json!(["rapid_succession"]));
        assert_eq!(value["pattern_confidence"], 0.8);

        let quiet = FraudPatternSource
            .fetch(&request(transaction(4, 4_250, "2024-03-13T12:00:00Z"), vec![]))
            .await
            .unwrap();
        assert_eq!(quiet["similar_fraud_cases"], 0);
        assert_eq!(quiet["pattern_confidence"], 0.0);
    }

    #[tokio::test]
    async fn test_user_behavior_survives_huge_amounts() {
        let history = vec![
            transaction(1, u64::MAX - 1, "2024-03-15T07:00:00Z"),
            transaction(2, u64::MAX - 1, "2024-03-15T07:30:00Z"),
        ];
        let value = UserBehaviorSource::new(8_550)
            .fetch(&request(transaction(3, 450, "2024-03-15T08:30:00Z"), history))
            .await
            .unwrap();

        assert_eq!(value["average_amount_cents"], u64::MAX / 2);
        assert_eq!(value["baseline"], false);
    }

    #[tokio::test]
    async fn test_http_source_posts_transaction() {
        let app = Router::new().route(
            "/context/user_behavior",
            post(|Json(body): Json<Value>| async move {
                Json(json!({ "echo_amount": body["transaction"]["amount"] }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let source = HttpContextSource::new(
            USER_BEHAVIOR,
            3,
            &format!("http://{}/", addr),
            Duration::from_secs(5),
        )
        .unwrap();
        let value = source
            .fetch(&request(transaction(1, 450, "2024-03-15T08:30:00Z"), vec![]))
            .await
            .unwrap();
        assert_eq!(value["echo_amount"], 450);

        let missing = HttpContextSource::new(
            GEOLOCATION_RISK,
            4,
            &format!("http://{}", addr),
            Duration::from_secs(5),
        )
        .unwrap()
        .fetch(&request(transaction(1, 450, "2024-03-15T08:30:00Z"), vec![]))
        .await;
        assert!(matches!(missing, Err(FraudEngineError::ContextSourceFailure(_))));
    }

    #[test]
    fn test_default_sources_switch_to_http() {
        let local = create_default_sources(&EngineConfig::default()).unwrap();
        assert_eq!(local.len(), 4);

        let mut config = EngineConfig::default();
        config.context.api_base_url = Some("http://context.internal".to_string());
        let remote = create_default_sources(&config).unwrap();
        let names: Vec<&str> = remote.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec![USER_BEHAVIOR, MERCHANT_INTELLIGENCE, GEOLOCATION_RISK, FRAUD_PATTERNS]
        );
    }
}
