//! Per-analysis context
//!
//! An [`AnalysisContext`] is created for every analysis and carries the
//! transaction, the caller-supplied history, the external context gathered
//! from context sources and, once the pipeline has run, every tool result.

pub mod aggregator;
pub mod cache;
pub mod sources;

pub use aggregator::ContextAggregator;
pub use cache::{CacheStats, ContextCache};
pub use sources::{count_prior_within, create_default_sources, ContextSource, SourceRequest};

use crate::models::{ToolResult, Transaction};
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

/// Outcome of a single context source fetch
#[derive(Debug, Clone, PartialEq)]
pub enum ContextEntry {
    Available(Value),
    Failed { error: String },
}

impl ContextEntry {
    pub fn is_available(&self) -> bool {
        matches!(self, ContextEntry::Available(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            ContextEntry::Available(value) => Some(value),
            ContextEntry::Failed { .. } => None,
        }
    }
}

impl Serialize for ContextEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ContextEntry::Available(value) => value.serialize(serializer),
            ContextEntry::Failed { error } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", error)?;
                map.end()
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextMetadata {
    pub created_at: DateTime<Utc>,
    pub correlation_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisContext {
    pub transaction: Arc<Transaction>,
    pub history: Arc<Vec<Transaction>>,
    pub external_context: HashMap<String, ContextEntry>,
    pub tool_results: BTreeMap<String, ToolResult>,
    pub metadata: ContextMetadata,
}

impl AnalysisContext {
    pub fn new(transaction: Transaction, history: Vec<Transaction>) -> Self {
        Self {
            transaction: Arc::new(transaction),
            history: Arc::new(history),
            external_context: HashMap::new(),
            tool_results: BTreeMap::new(),
            metadata: ContextMetadata {
                created_at: Utc::now(),
                correlation_id: Uuid::new_v4(),
            },
        }
    }

    pub fn with_context(mut self, source: &str, entry: ContextEntry) -> Self {
        self.external_context.insert(source.to_string(), entry);
        self
    }

    pub fn source(&self, name: &str) -> Option<&Value> {
        self.external_context.get(name).and_then(ContextEntry::value)
    }

    pub fn source_available(&self, name: &str) -> bool {
        self.external_context
            .get(name)
            .map(ContextEntry::is_available)
            .unwrap_or(false)
    }

    pub fn source_f64(&self, name: &str, field: &str) -> Option<f64> {
        self.source(name)?.get(field)?.as_f64()
    }

    pub fn source_u64(&self, name: &str, field: &str) -> Option<u64> {
        self.source(name)?.get(field)?.as_u64()
    }

    pub fn source_bool(&self, name: &str, field: &str) -> bool {
        self.source(name)
            .and_then(|v| v.get(field))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Source names split into (available, failed), both sorted
    pub fn source_summary(&self) -> (Vec<String>, Vec<String>) {
        let mut available = Vec::new();
        let mut failed = Vec::new();
        for (name, entry) in &self.external_context {
            if entry.is_available() {
                available.push(name.clone());
            } else {
                failed.push(name.clone());
            }
        }
        available.sort();
        failed.sort();
        (available, failed)
    }
}
