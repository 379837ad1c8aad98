use std::path::{Path, PathBuf};

use chrono::Duration;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    analyzer::Analyzer,
    config::Config,
    error::{AnalysisError, PipelineError, ValidationError},
    grouping::group_conversations,
    humanloop::HumanloopClient,
    mailer::Mailer,
    metrics::CONVERSATIONS_GROUPED,
    render::{write_artifact, write_text_report, ReportRenderer},
    schema::{DailySummary, ReportWindow},
    summary::{build_summary, SummaryLimits},
};

#[derive(Debug)]
pub struct RunOutcome {
    pub summary: DailySummary,
    pub text_path: PathBuf,
    pub pdf_path: PathBuf,
    pub sent: bool,
}

pub struct Pipeline<M> {
    fetcher: HumanloopClient,
    analyzer: Analyzer,
    renderer: ReportRenderer,
    mailer: M,
    gap: Duration,
    limits: SummaryLimits,
    output_dir: PathBuf,
    keep_artifacts: bool,
}

impl<M: Mailer> Pipeline<M> {
    pub fn new(cfg: &Config, mailer: M) -> Result<Self, PipelineError> {
        Ok(Self {
            fetcher: HumanloopClient::new(cfg)?,
            analyzer: Analyzer::new(cfg)?,
            renderer: ReportRenderer::new(cfg.report_link_base.clone()),
            mailer,
            gap: cfg.gap_threshold(),
            limits: SummaryLimits {
                max_highlights: cfg.max_highlights,
                max_pain_points: cfg.max_pain_points,
            },
            output_dir: cfg.output_dir.clone(),
            keep_artifacts: cfg.keep_artifacts,
        })
    }

    pub fn mailer(&self) -> &M {
        &self.mailer
    }

    /// One full fetch, group, analyze, summarize, render, send pass.
    /// With `dry_run` the report is rendered and kept but not sent.
    pub async fn run(&self, window: &ReportWindow, dry_run: bool) -> Result<RunOutcome, PipelineError> {
        let span = info_span!("run", run_id = %Uuid::new_v4(), date = %window.date);
        self.run_inner(window, dry_run).instrument(span).await
    }

    async fn run_inner(&self, window: &ReportWindow, dry_run: bool) -> Result<RunOutcome, PipelineError> {
        info!(start = %window.start, end = %window.end, "Starting log digest run");

        let fetched = self.fetcher.fetch_logs(window).await?;
        if fetched.records > 0 && fetched.entries.is_empty() {
            return Err(ValidationError::NothingValid(fetched.records).into());
        }

        let conversations = group_conversations(fetched.entries, self.gap);
        CONVERSATIONS_GROUPED.set(conversations.len() as f64);

        let batch = self.analyzer.analyze_all(&conversations).await;
        if !conversations.is_empty() && batch.results.is_empty() {
            return Err(AnalysisError::AllFailed(conversations.len()).into());
        }
        let skipped: Vec<String> = batch.failures.iter().map(|f| f.conversation_id.clone()).collect();

        let summary = build_summary(window.date, conversations.len(), &batch.results, &skipped, self.limits);
        if summary.is_empty_day() {
            info!("No conversations in window, sending empty day report");
        }

        let text = summary.to_text();
        let text_path = write_text_report(&self.output_dir, window.date, &text)?;
        let artifact = self.renderer.render(&summary)?;
        let pdf_path = write_artifact(&self.output_dir, &artifact)?;

        if dry_run {
            info!(pdf = %pdf_path.display(), "Dry run, report not sent");
            return Ok(RunOutcome {
                summary,
                text_path,
                pdf_path,
                sent: false,
            });
        }

        self.mailer.send_report(window.date, &artifact).await?;

        if !self.keep_artifacts {
            remove_quietly(&text_path);
            remove_quietly(&pdf_path);
        }

        info!(
            conversations = summary.total_conversations,
            analyzed = summary.analyzed_conversations,
            skipped = summary.skipped.len(),
            "Run complete"
        );
        Ok(RunOutcome {
            summary,
            text_path,
            pdf_path,
            sent: true,
        })
    }
}

fn remove_quietly(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        warn!(path = %path.display(), error = %err, "Failed to remove report artifact");
    }
}
