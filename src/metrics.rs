use std::path::Path;

use prometheus::{Counter, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use tracing::{error, info};

lazy_static::lazy_static! {
    // Fetch and grouping
    pub static ref LOGS_FETCHED: Counter = Counter::with_opts(
        Opts::new("log_digest_logs_fetched_total", "Raw log records returned by the log source")
    ).expect("valid metric options");

    pub static ref ENTRIES_SKIPPED: Counter = Counter::with_opts(
        Opts::new("log_digest_entries_skipped_total", "Log records skipped as malformed")
    ).expect("valid metric options");

    pub static ref CONVERSATIONS_GROUPED: Gauge = Gauge::with_opts(
        Opts::new("log_digest_conversations", "Conversations grouped in the last run")
    ).expect("valid metric options");

    // Analysis
    pub static ref ANALYSES_SUCCEEDED: Counter = Counter::with_opts(
        Opts::new("log_digest_analyses_succeeded_total", "Conversations analyzed successfully")
    ).expect("valid metric options");

    pub static ref ANALYSES_FAILED: Counter = Counter::with_opts(
        Opts::new("log_digest_analyses_failed_total", "Conversations skipped after analysis failure")
    ).expect("valid metric options");

    pub static ref ANALYSIS_RETRIES: Counter = Counter::with_opts(
        Opts::new("log_digest_analysis_retries_total", "LLM requests retried after a transient failure")
    ).expect("valid metric options");

    pub static ref ANALYSIS_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new("log_digest_analysis_duration_seconds", "Time spent analyzing one conversation")
    ).expect("valid metric options");

    // Delivery
    pub static ref REPORTS_SENT: Counter = Counter::with_opts(
        Opts::new("log_digest_reports_sent_total", "Reports delivered by email")
    ).expect("valid metric options");

    pub static ref LAST_RUN_SUCCESS: Gauge = Gauge::with_opts(
        Opts::new("log_digest_last_run_success", "1 if the last run completed, 0 if it failed")
    ).expect("valid metric options");
}

pub struct MetricsRegistry {
    registry: Registry,
}

impl MetricsRegistry {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        registry.register(Box::new(LOGS_FETCHED.clone()))?;
        registry.register(Box::new(ENTRIES_SKIPPED.clone()))?;
        registry.register(Box::new(CONVERSATIONS_GROUPED.clone()))?;
        registry.register(Box::new(ANALYSES_SUCCEEDED.clone()))?;
        registry.register(Box::new(ANALYSES_FAILED.clone()))?;
        registry.register(Box::new(ANALYSIS_RETRIES.clone()))?;
        registry.register(Box::new(ANALYSIS_DURATION.clone()))?;
        registry.register(Box::new(REPORTS_SENT.clone()))?;
        registry.register(Box::new(LAST_RUN_SUCCESS.clone()))?;

        Ok(Self { registry })
    }

    pub fn gather_metrics(&self) -> String {
        let metric_families = self.registry.gather();
        let encoder = TextEncoder::new();
        encoder.encode_to_string(&metric_families).unwrap_or_else(|e| {
            error!("Failed to encode metrics: {}", e);
            String::new()
        })
    }

    /// Writes the exposition text for a node-exporter textfile collector.
    /// Goes through a temp file so the collector never reads a partial file.
    pub fn write_textfile(&self, path: &Path) -> std::io::Result<()> {
        let tmp = path.with_extension("prom.tmp");
        std::fs::write(&tmp, self.gather_metrics())?;
        std::fs::rename(&tmp, path)?;
        info!(path = %path.display(), "Wrote metrics textfile");
        Ok(())
    }
}
