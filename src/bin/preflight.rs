// Preflight
// Checks that the log source, LLM API and SMTP server are reachable.
// Run with: cargo run --bin preflight

use std::process::ExitCode;

use dotenv::dotenv;
use tracing::{error, info};

use log_digest::{config::Config, health::HealthChecker};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let checker = match HealthChecker::new(&cfg) {
        Ok(checker) => checker,
        Err(err) => {
            error!(error = %err, "Failed to build HTTP client");
            return ExitCode::FAILURE;
        }
    };

    info!("Running preflight checks...");
    let health = checker.get_overall_health(&cfg).await;

    let json_response = serde_json::to_string_pretty(&health)
        .unwrap_or_else(|_| "{\"error\": \"Failed to serialize health status\"}".to_string());
    println!("{json_response}");

    if health.is_healthy() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
