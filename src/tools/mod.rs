//! Risk tool trait and registry
//!
//! Tools are pure functions of the analysis context. They read the shared
//! context and report a partial score with tags; they never mutate anything.

pub mod amount;
pub mod behavioral;
pub mod geospatial;
pub mod merchant;
pub mod temporal;
pub mod velocity;

pub use amount::AmountAnalysisTool;
pub use behavioral::BehavioralDeviationTool;
pub use geospatial::GeospatialRiskTool;
pub use merchant::MerchantRiskTool;
pub use temporal::TemporalPatternTool;
pub use velocity::VelocityFraudTool;

use crate::config::{EngineConfig, ToolWeights};
use crate::context::AnalysisContext;
use crate::error::FraudEngineError;
use crate::models::{PartialRiskResult, ToolResult};
use crate::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// A single risk analysis over the shared context
#[async_trait::async_trait]
pub trait RiskTool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;

    /// Whether the tool has anything to say about this context
    fn applies(&self, _ctx: &AnalysisContext) -> bool {
        true
    }

    async fn analyze(&self, ctx: &AnalysisContext) -> Result<PartialRiskResult>;
}

#[derive(Default)]
struct ToolStats {
    invocations: AtomicU64,
    failures: AtomicU64,
    total_micros: AtomicU64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolStatsSnapshot {
    pub tool_name: String,
    pub description: String,
    pub invocations: u64,
    pub failures: u64,
    pub total_latency_ms: f64,
    pub average_latency_ms: f64,
}

struct ToolDescriptor {
    tool: Arc<dyn RiskTool>,
    weight: Option<f64>,
    stats: ToolStats,
}

/// Ordered tool registry with per-tool weights and counters
pub struct ToolRegistry {
    descriptors: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            descriptors: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a tool. Re-registering a name replaces the earlier tool.
    pub fn register(&mut self, tool: Arc<dyn RiskTool>, weight: Option<f64>) {
        let descriptor = ToolDescriptor {
            tool,
            weight,
            stats: ToolStats::default(),
        };
        let name = descriptor.tool.name().to_string();

        match self.index.get(&name) {
            Some(&slot) => self.descriptors[slot] = descriptor,
            None => {
                self.index.insert(name, self.descriptors.len());
                self.descriptors.push(descriptor);
            }
        }
    }

    pub fn list(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.tool.name()).collect()
    }

    pub fn weights(&self) -> ToolWeights {
        let mut weights = ToolWeights::new();
        for descriptor in &self.descriptors {
            if let Some(weight) = descriptor.weight {
                weights.set(descriptor.tool.name(), weight);
            }
        }
        weights
    }

    /// Keep requested tools that apply to `ctx`. Unknown names are kept so
    /// they surface as failed results.
    pub fn applicable(&self, names: &[String], ctx: &AnalysisContext) -> Vec<String> {
        names
            .iter()
            .filter(|name| {
                self.descriptor(name)
                    .map(|d| d.tool.applies(ctx))
                    .unwrap_or(true)
            })
            .cloned()
            .collect()
    }

    /// Run one tool with failure isolation. Never returns an error.
    pub async fn execute_tool(&self, name: &str, ctx: &AnalysisContext) -> ToolResult {
        let Some(descriptor) = self.descriptor(name) else {
            warn!(tool_name = %name, "Tool not registered");
            let error = FraudEngineError::ToolNotFound(name.to_string());
            return ToolResult::failed(name, error.to_string(), 0.0);
        };

        let start = Instant::now();
        let outcome = descriptor.tool.analyze(ctx).await;
        let elapsed = start.elapsed();
        let latency_ms = elapsed.as_secs_f64() * 1000.0;

        descriptor.stats.invocations.fetch_add(1, Ordering::Relaxed);
        descriptor
            .stats
            .total_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);

        match outcome {
            Ok(partial) => {
                debug!(tool_name = %name, latency_ms, score = partial.score, "Tool completed");
                ToolResult::succeeded(name, partial, latency_ms)
            }
            Err(e) => {
                descriptor.stats.failures.fetch_add(1, Ordering::Relaxed);
                warn!(tool_name = %name, error = %e, "Tool execution failed");
                ToolResult::failed(name, e.to_string(), latency_ms)
            }
        }
    }

    /// Count a failure that happened outside `execute_tool`, e.g. a panic.
    pub fn record_failure(&self, name: &str) {
        if let Some(descriptor) = self.descriptor(name) {
            descriptor.stats.invocations.fetch_add(1, Ordering::Relaxed);
            descriptor.stats.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> Vec<ToolStatsSnapshot> {
        self.descriptors
            .iter()
            .map(|d| {
                let invocations = d.stats.invocations.load(Ordering::Relaxed);
                let total_latency_ms = d.stats.total_micros.load(Ordering::Relaxed) as f64 / 1000.0;
                ToolStatsSnapshot {
                    tool_name: d.tool.name().to_string(),
                    description: d.tool.description().to_string(),
                    invocations,
                    failures: d.stats.failures.load(Ordering::Relaxed),
                    total_latency_ms,
                    average_latency_ms: if invocations == 0 {
                        0.0
                    } else {
                        total_latency_ms / invocations as f64
                    },
                }
            })
            .collect()
    }

    fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&slot| &self.descriptors[slot])
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Register the six built-in tools with their configured weights.
pub fn create_default_registry(config: &EngineConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    let tools: Vec<Arc<dyn RiskTool>> = vec![
        Arc::new(AmountAnalysisTool),
        Arc::new(TemporalPatternTool),
        Arc::new(GeospatialRiskTool),
        Arc::new(BehavioralDeviationTool),
        Arc::new(VelocityFraudTool),
        Arc::new(MerchantRiskTool),
    ];

    for tool in tools {
        let weight = config.tool_weights.get(tool.name());
        registry.register(tool, weight);
    }

    registry
}

/// Sum of fired `(condition, increment, tag)` rules
pub(crate) fn score_rules(rules: &[(bool, f64, &str)]) -> PartialRiskResult {
    let mut score = 0.0;
    let mut tags = Vec::new();
    for (fired, increment, tag) in rules {
        if *fired {
            score += increment;
            tags.push(tag.to_string());
        }
    }
    PartialRiskResult::new(score, tags)
}
