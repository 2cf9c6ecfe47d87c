use fraud_decision_engine::{agent::FraudDetectionAgent, api::start_server, config::EngineConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let api_port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    let config = EngineConfig::from_env()?;
    // Leave room for the reasoning call on top of context and tools
    let analysis_timeout = config.reasoning.timeout + Duration::from_secs(10);

    info!("Fraud Decision Engine - API Server");
    info!(port = api_port, synthesis = ?config.synthesis, "Configuration loaded");

    let agent = Arc::new(FraudDetectionAgent::from_config(&config)?);

    info!("Agent initialized, starting API server");

    start_server(agent, analysis_timeout, api_port).await?;

    Ok(())
}
