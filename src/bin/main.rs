use fraud_decision_engine::{
    agent::FraudDetectionAgent,
    config::EngineConfig,
    models::{Decision, Transaction, TransactionId},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn transfer(id: i64, amount: u64, timestamp: &str) -> Transaction {
    Transaction {
        transaction_id: TransactionId::Number(id),
        from_account_num: "1011226360".to_string(),
        from_routing_num: "883745000".to_string(),
        to_account_num: "9999999999".to_string(),
        to_routing_num: "123456789".to_string(),
        amount,
        timestamp: timestamp.to_string(),
    }
}

fn print_decision(label: &str, decision: &Decision) {
    println!("\n=== {} ===", label);
    println!("Transaction:    {}", decision.transaction_id);
    println!(
        "Fraud score:    {:.3} ({:?}, {:?})",
        decision.fraud_score, decision.risk_level, decision.recommendation
    );
    println!("Confidence:     {:.2}", decision.confidence);
    println!("Is fraud:       {}", decision.is_fraud);
    println!("Alert:          {}", decision.requires_alert());
    println!("Risk factors:   {}", decision.risk_factors.join(", "));
    println!("Explanation:    {}", decision.explanation);
    println!("Tool scores:");
    for (tool, score) in &decision.diagnostics.tool_scores {
        println!("  {:<32} {:.3}", tool, score);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = EngineConfig::from_env()?;
    let agent = FraudDetectionAgent::from_config(&config)?;

    info!(synthesis = agent.synthesis_strategy(), "Fraud detection agent starting");

    let coffee = agent
        .analyze(transfer(1001, 450, "2024-03-15T08:30:00Z"), vec![])
        .await;
    print_decision("Small daytime transfer", &coffee);

    let night = agent
        .analyze(transfer(1002, 250_000, "2024-03-15T03:45:00Z"), vec![])
        .await;
    print_decision("Large late-night transfer", &night);

    let round = agent
        .analyze(transfer(1003, 500_000, "2024-03-15T15:00:00Z"), vec![])
        .await;
    print_decision("Round-amount transfer", &round);

    let burst = vec![
        transfer(2001, 10_000, "2024-03-13T10:30:00Z"),
        transfer(2002, 20_000, "2024-03-13T10:33:00Z"),
        transfer(2003, 30_000, "2024-03-13T10:36:00Z"),
    ];
    for (i, tx) in burst.iter().enumerate() {
        let decision = agent.analyze(tx.clone(), burst[..i].to_vec()).await;
        print_decision(&format!("Rapid burst #{}", i + 1), &decision);
    }

    println!("\n=== TOOL STATS ===");
    for stats in agent.tool_stats() {
        println!(
            "  {:<32} runs={} failures={} avg={:.3}ms",
            stats.tool_name, stats.invocations, stats.failures, stats.average_latency_ms
        );
    }
    println!("History entries: {}", agent.history().len().await);

    Ok(())
}
