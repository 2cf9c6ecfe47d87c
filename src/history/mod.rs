//! Execution history
//!
//! Bounded in-memory record of recent decisions. Each record carries a
//! SHA-256 digest of its decision so it can be checked later.

use crate::models::{Decision, ExecutionRecord};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;

pub const DEFAULT_CAPACITY: usize = 1000;

/// Ring buffer of execution records, oldest evicted first
pub struct ExecutionHistory {
    records: RwLock<VecDeque<Arc<ExecutionRecord>>>,
    capacity: usize,
}

impl ExecutionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: RwLock::new(VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a record for `decision`, evicting the oldest past capacity
    pub async fn record(
        &self,
        decision: Arc<Decision>,
        tools_executed: Vec<String>,
        elapsed_ms: u64,
    ) -> Arc<ExecutionRecord> {
        let record = Arc::new(ExecutionRecord {
            recorded_at: Utc::now(),
            transaction_id: decision.transaction_id.clone(),
            tools_executed,
            decision_digest: compute_decision_digest(&decision),
            decision,
            elapsed_ms,
        });

        let mut records = self.records.write().await;
        while records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(Arc::clone(&record));

        record
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Up to `n` records, newest first
    pub async fn recent(&self, n: usize) -> Vec<Arc<ExecutionRecord>> {
        let records = self.records.read().await;
        records.iter().rev().take(n).cloned().collect()
    }

    /// All records, oldest first
    pub async fn snapshot(&self) -> Vec<Arc<ExecutionRecord>> {
        let records = self.records.read().await;
        records.iter().cloned().collect()
    }

    /// Most recent record for a transaction
    pub async fn find(&self, transaction_id: &str) -> Option<Arc<ExecutionRecord>> {
        let records = self.records.read().await;
        records
            .iter()
            .rev()
            .find(|record| record.transaction_id == transaction_id)
            .cloned()
    }

    /// Recompute the digest of the most recent record for a transaction.
    /// Unknown transactions verify as false.
    pub async fn verify_integrity(&self, transaction_id: &str) -> bool {
        match self.find(transaction_id).await {
            Some(record) => compute_decision_digest(&record.decision) == record.decision_digest,
            None => false,
        }
    }
}

impl Default for ExecutionHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// SHA-256 over the decision's JSON form, hex encoded
pub fn compute_decision_digest(decision: &Decision) -> String {
    let mut hasher = Sha256::new();

    // Stream JSON directly into hasher (no intermediate String)
    if serde_json::to_writer(&mut HashWriter(&mut hasher), decision).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
