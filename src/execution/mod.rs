//! Tool execution pipeline
//!
//! Fans requested tools out as independent tasks over a read-only snapshot
//! of the context, then writes every result back under its own name.
//! Reasoning services are NOT allowed here.

use crate::context::AnalysisContext;
use crate::models::ToolResult;
use crate::tools::ToolRegistry;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Maximum tools allowed per analysis
const MAX_TOOLS_PER_PIPELINE: usize = 32;

pub struct ToolPipeline {
    registry: Arc<ToolRegistry>,
}

impl ToolPipeline {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Run each distinct tool once and store the results in `ctx`.
    pub async fn execute_pipeline(
        &self,
        names: &[String],
        ctx: &mut AnalysisContext,
    ) -> BTreeMap<String, ToolResult> {
        let mut seen = HashSet::new();
        let mut requested: Vec<&String> = names.iter().filter(|n| seen.insert(*n)).collect();

        let overflow = if requested.len() > MAX_TOOLS_PER_PIPELINE {
            warn!(
                requested = requested.len(),
                limit = MAX_TOOLS_PER_PIPELINE,
                "Too many tools requested, skipping the excess"
            );
            requested.split_off(MAX_TOOLS_PER_PIPELINE)
        } else {
            Vec::new()
        };

        let start = Instant::now();
        let snapshot = Arc::new(ctx.clone());

        debug!(
            correlation_id = %ctx.metadata.correlation_id,
            tool_count = requested.len(),
            "Starting tool pipeline"
        );

        let handles: Vec<_> = requested
            .into_iter()
            .map(|name| {
                let name = name.clone();
                let registry = Arc::clone(&self.registry);
                let snapshot = Arc::clone(&snapshot);
                let task_name = name.clone();
                let handle =
                    tokio::spawn(async move { registry.execute_tool(&task_name, &snapshot).await });
                (name, handle)
            })
            .collect();

        let mut results = BTreeMap::new();
        for (name, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_error) => {
                    warn!(tool_name = %name, error = %join_error, "Tool task panicked");
                    self.registry.record_failure(&name);
                    ToolResult::failed(&name, format!("tool task aborted: {}", join_error), 0.0)
                }
            };
            results.insert(name, result);
        }

        for name in overflow {
            let error = format!(
                "skipped: more than {} tools requested",
                MAX_TOOLS_PER_PIPELINE
            );
            results.insert(name.clone(), ToolResult::failed(name, error, 0.0));
        }

        for (name, result) in &results {
            ctx.tool_results.insert(name.clone(), result.clone());
        }

        debug!(
            correlation_id = %ctx.metadata.correlation_id,
            tool_count = results.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Tool pipeline completed"
        );

        results
    }
}
