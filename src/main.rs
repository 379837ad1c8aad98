// Daily log digest
// Fetches the last day of conversation logs, analyzes them and emails a PDF report.
// Run with: cargo run --bin log-digest -- [--date YYYY-MM-DD] [--dry-run]

use std::process::ExitCode;

use chrono::{NaiveDate, Utc};
use clap::Parser;
use dotenv::dotenv;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use log_digest::{
    config::Config,
    error::PipelineError,
    mailer::SmtpMailer,
    metrics::{MetricsRegistry, LAST_RUN_SUCCESS},
    pipeline::Pipeline,
    schema::ReportWindow,
};

#[derive(Debug, Parser)]
#[command(name = "log-digest", about = "Daily conversation log analysis report")]
struct Args {
    /// Report on this UTC day instead of the trailing lookback window
    #[arg(long, value_name = "YYYY-MM-DD")]
    date: Option<NaiveDate>,

    /// Render the report but do not email it
    #[arg(long)]
    dry_run: bool,
}

async fn run(args: &Args, cfg: &Config) -> Result<(), PipelineError> {
    let window = match args.date {
        Some(date) => ReportWindow::for_day(date),
        None => ReportWindow::trailing(Utc::now(), cfg.lookback()),
    };

    let mailer = SmtpMailer::new(cfg)?;
    let pipeline = Pipeline::new(cfg, mailer)?;
    let outcome = pipeline.run(&window, args.dry_run).await?;

    info!(
        sent = outcome.sent,
        conversations = outcome.summary.total_conversations,
        "Log digest finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let result = run(&args, &cfg).await;
    LAST_RUN_SUCCESS.set(if result.is_ok() { 1.0 } else { 0.0 });

    if let Some(path) = &cfg.metrics_textfile {
        match MetricsRegistry::new() {
            Ok(registry) => {
                if let Err(err) = registry.write_textfile(path) {
                    warn!(error = %err, "Failed to write metrics textfile");
                }
            }
            Err(err) => warn!(error = %err, "Failed to register metrics"),
        }
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "Log digest run failed");
            ExitCode::FAILURE
        }
    }
}
