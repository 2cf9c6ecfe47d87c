//! Fraud Decision Engine
//!
//! Scores a bank transfer for fraud risk:
//! - Gathers auxiliary context from cached, concurrently fetched sources
//! - Runs independent risk tools over a shared, read-only context
//! - Synthesizes one decision, deterministically or with a reasoning
//!   service and deterministic fallback
//! - Keeps a bounded, digest-checked history of recent decisions
//!
//! ANALYSIS LOOP:
//! CONTEXT → TOOLS → SYNTHESIS → DECISION → RECORD

pub mod agent;
pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod execution;
pub mod gemini;
pub mod history;
pub mod models;
pub mod synthesis;
pub mod tools;

pub use error::Result;

// Re-export common types
pub use agent::FraudDetectionAgent;
pub use config::EngineConfig;
pub use models::*;
