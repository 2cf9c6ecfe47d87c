//! REST API server for the fraud detection agent
//!
//! Thin HTTP adapter: no persistence, no alert storage. Callers decide what
//! to do with a decision (`Decision::requires_alert`).

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::FraudDetectionAgent;
use crate::models::Transaction;

const DEFAULT_HISTORY_LIMIT: usize = 50;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(flatten)]
    pub transaction: Transaction,
    #[serde(default)]
    pub history: Vec<Transaction>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub agent: Arc<FraudDetectionAgent>,
    pub analysis_timeout: Duration,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "synthesis": state.agent.synthesis_strategy(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Analysis Endpoint
/// =============================

async fn analyze(
    State(state): State<ApiState>,
    Json(req): Json<AnalyzeRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    info!(
        transaction_id = %req.transaction.transaction_id,
        history_len = req.history.len(),
        "Received analysis request"
    );

    match state
        .agent
        .analyze_with_timeout(req.transaction, req.history, state.analysis_timeout)
        .await
    {
        Ok(decision) => {
            if decision.requires_alert() {
                warn!(
                    transaction_id = %decision.transaction_id,
                    fraud_score = decision.fraud_score,
                    "Decision requires alert"
                );
            }
            (StatusCode::OK, Json(ApiResponse::success(decision)))
        }
        Err(e) => (
            StatusCode::GATEWAY_TIMEOUT,
            Json(ApiResponse::error(format!("Analysis failed: {}", e))),
        ),
    }
}

/// =============================
/// Introspection Endpoints
/// =============================

async fn recent_history(
    State(state): State<ApiState>,
    Query(query): Query<HistoryQuery>,
) -> Json<ApiResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let records = state.agent.history().recent(limit).await;
    Json(ApiResponse::success(records))
}

async fn tool_stats(State(state): State<ApiState>) -> Json<ApiResponse> {
    Json(ApiResponse::success(serde_json::json!({
        "tools": state.agent.tool_stats(),
        "context_cache": state.agent.cache_stats().await,
        "history_len": state.agent.history().len().await,
        "history_capacity": state.agent.history().capacity(),
    })))
}

/// =============================
/// Router
/// =============================

pub fn create_router(agent: Arc<FraudDetectionAgent>, analysis_timeout: Duration) -> Router {
    let state = ApiState {
        agent,
        analysis_timeout,
    };

    Router::new()
        .route("/health", get(health))
        .route("/analyze", post(analyze))
        .route("/history", get(recent_history))
        .route("/tools/stats", get(tool_stats))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    agent: Arc<FraudDetectionAgent>,
    analysis_timeout: Duration,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(agent, analysis_timeout);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
