//! Fraud detection agent - implements the analysis loop
//!
//! GATHER CONTEXT → SELECT TOOLS → EXECUTE → SYNTHESIZE → RECORD

use crate::config::{EngineConfig, SynthesisStrategy};
use crate::context::{
    create_default_sources, AnalysisContext, CacheStats, ContextAggregator, ContextCache,
    SourceRequest,
};
use crate::error::FraudEngineError;
use crate::execution::ToolPipeline;
use crate::gemini::{GeminiClient, ReasoningClient};
use crate::history::ExecutionHistory;
use crate::models::{dedup_tags, Decision, DecisionDiagnostics, Transaction, FRAUD_THRESHOLD};
use crate::synthesis::{AiSynthesizer, HeuristicSynthesizer, Synthesizer};
use crate::tools::{create_default_registry, ToolRegistry, ToolStatsSnapshot};
use crate::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct FraudDetectionAgent {
    aggregator: ContextAggregator,
    pipeline: ToolPipeline,
    synthesizer: Box<dyn Synthesizer>,
    history: ExecutionHistory,
    pipeline_tools: Vec<String>,
}

impl FraudDetectionAgent {
    pub fn new(
        aggregator: ContextAggregator,
        pipeline: ToolPipeline,
        synthesizer: Box<dyn Synthesizer>,
        history: ExecutionHistory,
        pipeline_tools: Vec<String>,
    ) -> Self {
        Self {
            aggregator,
            pipeline,
            synthesizer,
            history,
            pipeline_tools,
        }
    }

    /// Wire the built-in sources, tools and the configured synthesis strategy.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let registry = create_default_registry(config);

        let reasoning: Option<Arc<dyn ReasoningClient>> = match config.synthesis {
            SynthesisStrategy::Heuristic => None,
            SynthesisStrategy::AiAssisted => Some(Arc::new(GeminiClient::new(&config.reasoning)?)),
        };

        Self::with_components(config, registry, reasoning)
    }

    /// Same wiring as [`from_config`](Self::from_config) with a caller-supplied
    /// registry and reasoning client.
    pub fn with_components(
        config: &EngineConfig,
        registry: ToolRegistry,
        reasoning: Option<Arc<dyn ReasoningClient>>,
    ) -> Result<Self> {
        let cache = Arc::new(ContextCache::new(
            config.context.ttls.clone(),
            config.context.default_ttl,
        ));
        let aggregator = ContextAggregator::new(create_default_sources(config)?, cache);

        let heuristic = HeuristicSynthesizer::new(registry.weights());
        let synthesizer: Box<dyn Synthesizer> = match reasoning {
            Some(client) => Box::new(AiSynthesizer::new(client, heuristic, config.reasoning.timeout)),
            None => Box::new(heuristic),
        };

        info!(
            synthesis = synthesizer.name(),
            tools = ?registry.list(),
            sources = ?aggregator.source_names(),
            "Fraud detection agent configured"
        );

        Ok(Self::new(
            aggregator,
            ToolPipeline::new(Arc::new(registry)),
            synthesizer,
            ExecutionHistory::new(config.history_capacity),
            config.pipeline_tools.clone(),
        ))
    }

    /// Analyze one transaction against its account history.
    pub async fn analyze(&self, transaction: Transaction, history: Vec<Transaction>) -> Decision {
        let start = Instant::now();
        let transaction_id = transaction.transaction_id.to_string();

        info!(
            transaction_id = %transaction_id,
            amount_cents = transaction.amount,
            history_len = history.len(),
            "Analyzing transaction"
        );

        let mut ctx = AnalysisContext::new(transaction, history);

        // === CONTEXT ===
        let request = SourceRequest {
            transaction: Arc::clone(&ctx.transaction),
            history: Arc::clone(&ctx.history),
        };
        ctx.external_context = self.aggregator.gather(&request).await;

        // === TOOLS ===
        let tools = dedup_tags(
            self.pipeline
                .registry()
                .applicable(&self.pipeline_tools, &ctx),
        );
        debug!(transaction_id = %transaction_id, ?tools, "Selected tools");
        self.pipeline.execute_pipeline(&tools, &mut ctx).await;

        // === SYNTHESIS ===
        let assessment = self.synthesizer.synthesize(&ctx).await;
        if assessment.outcome.is_fallback() {
            warn!(
                transaction_id = %transaction_id,
                outcome = ?assessment.outcome,
                "Decision produced by heuristic fallback"
            );
        }

        let (context_sources, failed_context_sources) = ctx.source_summary();
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let decision = Decision {
            transaction_id: transaction_id.clone(),
            fraud_score: assessment.score,
            is_fraud: assessment.score > FRAUD_THRESHOLD,
            risk_level: assessment.level,
            confidence: assessment.confidence,
            explanation: assessment.explanation,
            risk_factors: assessment.risk_factors,
            recommendation: assessment.recommendation,
            diagnostics: DecisionDiagnostics {
                tools_executed: tools.clone(),
                tool_scores: assessment.tool_scores,
                context_sources,
                failed_context_sources,
                synthesis: assessment.outcome,
                tool_contributions: assessment.tool_contributions,
                correlation_id: ctx.metadata.correlation_id,
                processing_time_ms: elapsed_ms,
            },
        };

        // === RECORD ===
        self.history
            .record(Arc::new(decision.clone()), tools, elapsed_ms)
            .await;

        info!(
            transaction_id = %transaction_id,
            fraud_score = decision.fraud_score,
            risk_level = ?decision.risk_level,
            recommendation = ?decision.recommendation,
            latency_ms = elapsed_ms,
            "Analysis complete"
        );

        decision
    }

    /// [`analyze`](Self::analyze) bounded by `limit`; partial work is discarded.
    pub async fn analyze_with_timeout(
        &self,
        transaction: Transaction,
        history: Vec<Transaction>,
        limit: Duration,
    ) -> Result<Decision> {
        let transaction_id = transaction.transaction_id.to_string();
        tokio::time::timeout(limit, self.analyze(transaction, history))
            .await
            .map_err(|_| {
                warn!(transaction_id = %transaction_id, ?limit, "Analysis timed out");
                FraudEngineError::Timeout(format!(
                    "analysis of transaction {} exceeded {:?}",
                    transaction_id, limit
                ))
            })
    }

    pub fn history(&self) -> &ExecutionHistory {
        &self.history
    }

    pub fn tool_stats(&self) -> Vec<ToolStatsSnapshot> {
        self.pipeline.registry().stats()
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.aggregator.cache().stats().await
    }

    pub fn synthesis_strategy(&self) -> &'static str {
        self.synthesizer.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContextConfig;
    use crate::context::test_support::transaction;
    use crate::models::{
        PartialRiskResult, Recommendation, RiskLevel, SynthesisOutcome, TOOL_ERROR_TAG,
    };
    use crate::tools::RiskTool;
    use tokio_test::assert_ok;

    fn agent() -> FraudDetectionAgent {
        FraudDetectionAgent::from_config(&EngineConfig::default()).unwrap()
    }

    struct UnreachableReasoning;

    #[async_trait::async_trait]
    impl ReasoningClient for UnreachableReasoning {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Err(FraudEngineError::ReasoningServiceFailure(
                "connection refused".to_string(),
            ))
        }
    }

    struct RamblingReasoning;

    #[async_trait::async_trait]
    impl ReasoningClient for RamblingReasoning {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok("Looks risky to me, maybe.".to_string())
        }
    }

    struct VerdictReasoning;

    #[async_trait::async_trait]
    impl ReasoningClient for VerdictReasoning {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(r#"Verdict: {"fraud_score": 0.65, "confidence": 0.8,
                "explanation": "Large transfer at night",
                "tool_contributions": {"temporal_pattern_analysis": "hour 03 is the main driver"}}"#
                .to_string())
        }
    }

    struct BrokenTool;

    #[async_trait::async_trait]
    impl RiskTool for BrokenTool {
        fn name(&self) -> &'static str {
            "broken_tool"
        }

        fn description(&self) -> &'static str {
            "Always fails"
        }

        async fn analyze(&self, _ctx: &AnalysisContext) -> Result<PartialRiskResult> {
            Err(FraudEngineError::ToolFailure("broken".to_string()))
        }
    }

    struct SlowTool;

    #[async_trait::async_trait]
    impl RiskTool for SlowTool {
        fn name(&self) -> &'static str {
            "slow_tool"
        }

        fn description(&self) -> &'static str {
            "Never finishes in time"
        }

        async fn analyze(&self, _ctx: &AnalysisContext) -> Result<PartialRiskResult> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(PartialRiskResult::new(0.0, vec![]))
        }
    }

    #[tokio::test]
    async fn test_small_daytime_transfer_is_approved() {
        let decision = agent()
            .analyze(transaction(1001, 450, "2024-03-15T08:30:00Z"), vec![])
            .await;

        assert!(decision.fraud_score < 0.3, "score {}", decision.fraud_score);
        assert_eq!(decision.risk_level, RiskLevel::Low);
        assert_eq!(decision.recommendation, Recommendation::Approve);
        assert!(!decision.is_fraud);
        assert!(decision.risk_factors.contains(&"no_transaction_history".to_string()));
        assert_eq!(decision.diagnostics.synthesis, SynthesisOutcome::Heuristic);
    }

    #[tokio::test]
    async fn test_large_late_night_transfer_needs_review() {
        let decision = agent()
            .analyze(transaction(1002, 250_000, "2024-03-15T03:45:00Z"), vec![])
            .await;

        assert!(decision.fraud_score > 0.6, "score {}", decision.fraud_score);
        assert!(decision.risk_level >= RiskLevel::High);
        assert!(matches!(
            decision.recommendation,
            Recommendation::Review | Recommendation::Block
        ));
        assert!(decision.requires_alert());
        assert!(decision
            .risk_factors
            .contains(&"suspicious_late_night_hour".to_string()));
    }

    #[tokio::test]
    async fn test_round_amount_is_flagged() {
        let decision = agent()
            .analyze(transaction(1003, 500_000, "2024-03-15T15:00:00Z"), vec![])
            .await;

        assert!(decision.fraud_score > 0.3, "score {}", decision.fraud_score);
        assert!(decision
            .risk_factors
            .contains(&"round_amount_suspicious".to_string()));
    }

    #[tokio::test]
    async fn test_rapid_burst_on_one_account() {
        let agent = agent();
        let burst = vec![
            transaction(2001, 10_000, "2024-03-13T10:30:00Z"),
            transaction(2002, 20_000, "2024-03-13T10:33:00Z"),
            transaction(2003, 30_000, "2024-03-13T10:36:00Z"),
        ];

        let mut scores = Vec::new();
        for (i, tx) in burst.iter().enumerate() {
            let decision = agent.analyze(tx.clone(), burst[..i].to_vec()).await;
            scores.push(decision.fraud_score);
        }

        assert!(scores.iter().any(|s| *s > 0.4), "scores {:?}", scores);
        let last = assert_ok!(
            agent
                .history()
                .find("2003")
                .await
                .ok_or("missing record")
        );
        assert!(last
            .decision
            .risk_factors
            .contains(&"burst_velocity".to_string()));
        assert!(agent.history().verify_integrity("2003").await);
        assert_eq!(agent.history().len().await, 3);
    }

    #[tokio::test]
    async fn test_scores_stay_in_bounds() {
        let agent = agent();
        let cases = [
            (0, "2024-03-16T02:00:00Z"),
            (1, "2024-03-16T23:59:59Z"),
            (99, "garbage"),
            (u64::MAX / 2, "2024-03-17T04:00:00"),
            (1_000_000, "2024-03-17T12:00:00+05:00"),
        ];

        for (i, (amount, ts)) in cases.iter().enumerate() {
            let decision = agent.analyze(transaction(i as i64, *amount, ts), vec![]).await;
            assert!((0.0..=1.0).contains(&decision.fraud_score));
            assert!((0.0..=1.0).contains(&decision.confidence));
            assert_eq!(decision.is_fraud, decision.fraud_score > FRAUD_THRESHOLD);
        }
    }

    #[tokio::test]
    async fn test_failing_tool_is_isolated() {
        let config = EngineConfig {
            pipeline_tools: vec![
                "transaction_amount_analysis".to_string(),
                "broken_tool".to_string(),
            ],
            ..EngineConfig::default()
        };
        let mut registry = create_default_registry(&config);
        registry.register(Arc::new(BrokenTool), Some(0.5));
        let agent = FraudDetectionAgent::with_components(&config, registry, None).unwrap();

        let decision = agent
            .analyze(transaction(3001, 500_000, "2024-03-15T15:00:00Z"), vec![])
            .await;

        assert!((decision.diagnostics.tool_scores["transaction_amount_analysis"] - 1.0).abs() < 1e-9);
        assert_eq!(decision.diagnostics.tool_scores["broken_tool"], 0.1);
        assert!(decision.risk_factors.contains(&TOOL_ERROR_TAG.to_string()));
        // (1.0 * 0.3 + 0.1 * 0.5) / 0.8
        assert!((decision.fraud_score - 0.4375).abs() < 1e-9);

        let stats = agent.tool_stats();
        let broken = stats.iter().find(|s| s.tool_name == "broken_tool").unwrap();
        assert_eq!(broken.failures, 1);
    }

    #[tokio::test]
    async fn test_reasoning_outage_matches_heuristic_decision() {
        let config = EngineConfig::default();
        let heuristic = agent();
        let ai = FraudDetectionAgent::with_components(
            &config,
            create_default_registry(&config),
            Some(Arc::new(UnreachableReasoning)),
        )
        .unwrap();

        let tx = transaction(4001, 250_000, "2024-03-15T03:45:00Z");
        let expected = heuristic.analyze(tx.clone(), vec![]).await;
        let fallback = ai.analyze(tx, vec![]).await;

        assert_eq!(fallback.fraud_score, expected.fraud_score);
        assert_eq!(fallback.risk_level, expected.risk_level);
        assert_eq!(fallback.recommendation, expected.recommendation);
        assert_eq!(fallback.confidence, expected.confidence);
        assert_eq!(fallback.risk_factors, expected.risk_factors);
        assert_eq!(fallback.is_fraud, expected.is_fraud);
        assert_ne!(fallback.explanation, expected.explanation);
        assert_eq!(
            fallback.diagnostics.synthesis,
            SynthesisOutcome::FallbackServiceUnavailable
        );
    }

    #[tokio::test]
    async fn test_ai_tool_contributions_reach_diagnostics() {
        let config = EngineConfig::default();
        let ai = FraudDetectionAgent::with_components(
            &config,
            create_default_registry(&config),
            Some(Arc::new(VerdictReasoning)),
        )
        .unwrap();

        let decision = ai
            .analyze(transaction(4501, 250_000, "2024-03-15T03:45:00Z"), vec![])
            .await;
        assert_eq!(decision.diagnostics.synthesis, SynthesisOutcome::AiAssisted);
        assert_eq!(decision.risk_level, RiskLevel::High);

        let contributions = decision.diagnostics.tool_contributions.as_ref().unwrap();
        assert_eq!(
            contributions["temporal_pattern_analysis"],
            "hour 03 is the main driver"
        );

        let heuristic = agent()
            .analyze(transaction(4502, 250_000, "2024-03-15T03:45:00Z"), vec![])
            .await;
        let json = serde_json::to_value(&heuristic).unwrap();
        assert!(json["diagnostics"].get("tool_contributions").is_none());
    }

    #[tokio::test]
    async fn test_unparseable_reasoning_uses_low_confidence() {
        let config = EngineConfig::default();
        let ai = FraudDetectionAgent::with_components(
            &config,
            create_default_registry(&config),
            Some(Arc::new(RamblingReasoning)),
        )
        .unwrap();

        let decision = ai
            .analyze(transaction(5001, 450, "2024-03-15T08:30:00Z"), vec![])
            .await;
        assert_eq!(decision.confidence, 0.3);
        assert_eq!(
            decision.diagnostics.synthesis,
            SynthesisOutcome::FallbackUnparseableResponse
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_analysis_timeout() {
        let config = EngineConfig {
            pipeline_tools: vec!["slow_tool".to_string()],
            ..EngineConfig::default()
        };
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SlowTool), Some(1.0));
        let agent = FraudDetectionAgent::with_components(&config, registry, None).unwrap();

        let result = agent
            .analyze_with_timeout(
                transaction(6001, 450, "2024-03-15T08:30:00Z"),
                vec![],
                Duration::from_secs(5),
            )
            .await;
        assert!(matches!(result, Err(FraudEngineError::Timeout(_))));
        assert!(agent.history().is_empty().await);
    }

    #[tokio::test]
    async fn test_analysis_within_limit() {
        let decision = assert_ok!(
            agent()
                .analyze_with_timeout(
                    transaction(6002, 450, "2024-03-15T08:30:00Z"),
                    vec![],
                    Duration::from_secs(30),
                )
                .await
        );
        assert_eq!(decision.transaction_id, "6002");
    }

    #[tokio::test]
    async fn test_context_outage_still_runs_every_tool() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, axum::Router::new()).await.unwrap();
        });

        let config = EngineConfig {
            context: ContextConfig {
                api_base_url: Some(format!("http://{}", addr)),
                ..ContextConfig::default()
            },
            ..EngineConfig::default()
        };
        let agent = FraudDetectionAgent::from_config(&config).unwrap();

        let decision = agent
            .analyze(transaction(7001, 250_000, "2024-03-15T03:45:00Z"), vec![])
            .await;

        assert_eq!(decision.diagnostics.failed_context_sources.len(), 4);
        assert_eq!(
            decision.diagnostics.tools_executed,
            vec![
                "transaction_amount_analysis",
                "temporal_pattern_analysis",
                "geospatial_risk_assessment",
                "behavioral_deviation_analysis",
                "merchant_risk_analysis",
            ]
        );
        assert_eq!(decision.diagnostics.tool_scores["geospatial_risk_assessment"], 0.0);
        assert_eq!(decision.diagnostics.tool_scores["merchant_risk_analysis"], 0.0);
        // (0.5 * 0.3 + 0.5 * 0.2 + 0.2 * 0.15) / (0.3 + 0.2 + 0.25 + 0.15 + 0.1)
        assert!((decision.fraud_score - 0.28).abs() < 1e-9, "score {}", decision.fraud_score);
        assert_eq!(decision.recommendation, Recommendation::Approve);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_analyses_share_one_agent() {
        let agent = Arc::new(agent());

        let handles: Vec<_> = (0..50)
            .map(|i| {
                let agent = Arc::clone(&agent);
                tokio::spawn(async move {
                    agent
                        .analyze(transaction(8000 + i, 1_000 + i as u64, "2024-03-15T12:00:00Z"), vec![])
                        .await
                })
            })
            .collect();
        for handle in handles {
            assert_ok!(handle.await);
        }

        assert_eq!(agent.history().len().await, 50);
        for record in agent.history().snapshot().await {
            assert!(agent.history().verify_integrity(&record.transaction_id).await);
        }

        // Three per-transaction sources plus one merchant key shared by all 50.
        let stats = agent.cache_stats().await;
        assert_eq!(stats.hits + stats.misses, 200);
        assert_eq!(stats.entries, 151);
        assert!(stats.misses >= 151 && stats.misses <= 200, "misses {}", stats.misses);
    }

    #[test]
    fn test_ai_strategy_requires_api_key() {
        let config = EngineConfig {
            synthesis: SynthesisStrategy::AiAssisted,
            ..EngineConfig::default()
        };
        assert!(matches!(
            FraudDetectionAgent::from_config(&config),
            Err(FraudEngineError::Config(_))
        ));
    }
}
