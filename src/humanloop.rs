use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    error::{FetchError, ValidationError},
    metrics::{ENTRIES_SKIPPED, LOGS_FETCHED},
    schema::{Direction, LogEntry, ReportWindow},
};

const PAGE_SIZE: usize = 100;
const USER_MESSAGE_INPUT: &str = "user_message";

#[derive(Debug, Deserialize)]
struct LogPage {
    #[serde(default)]
    records: Vec<RawLog>,
    #[serde(default)]
    total: Option<usize>,
}

/// One record as the log service returns it. Every field may be null.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLog {
    #[serde(default, alias = "log_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub inputs: Option<HashMap<String, Value>>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl RawLog {
    fn log_id(&self) -> String {
        self.id.clone().unwrap_or_else(|| "<unknown>".into())
    }

    /// A user turn, followed by the bot reply when there is one.
    pub fn into_entries(self) -> Result<Vec<LogEntry>, ValidationError> {
        let log_id = self.log_id();

        let user_id = match self.user.as_deref().map(str::trim) {
            Some(user) if !user.is_empty() => user.to_string(),
            _ => return Err(ValidationError::MissingUser { log_id }),
        };

        let raw_ts = match self.created_at.as_deref().map(str::trim) {
            Some(ts) if !ts.is_empty() => ts.to_string(),
            _ => return Err(ValidationError::MissingTimestamp { log_id }),
        };
        let timestamp = parse_timestamp(&raw_ts).ok_or_else(|| ValidationError::BadTimestamp {
            log_id: log_id.clone(),
            value: raw_ts.clone(),
        })?;

        let input = self
            .inputs
            .as_ref()
            .and_then(|inputs| inputs.get(USER_MESSAGE_INPUT))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut entries = vec![LogEntry {
            user_id: user_id.clone(),
            timestamp,
            direction: Direction::User,
            text: input,
            log_id: self.id.clone(),
            source: self.source.clone(),
        }];

        if let Some(output) = self.output.filter(|o| !o.trim().is_empty()) {
            entries.push(LogEntry {
                user_id,
                timestamp,
                direction: Direction::Bot,
                text: output,
                log_id: self.id,
                source: self.source,
            });
        }

        Ok(entries)
    }
}

/// RFC 3339, or a naive ISO timestamp taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Default)]
pub struct FetchedLogs {
    pub entries: Vec<LogEntry>,
    /// Records that matched the source filter and window, valid or not.
    pub records: usize,
    pub invalid: Vec<ValidationError>,
}

pub struct HumanloopClient {
    client: Client,
    base_url: String,
    api_key: String,
    file_id: String,
    source_filter: String,
    page_size: usize,
}

impl HumanloopClient {
    pub fn new(cfg: &Config) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(cfg.http_timeout()).build()?;

        Ok(Self {
            client,
            base_url: cfg.humanloop_url.trim_end_matches('/').to_string(),
            api_key: cfg.humanloop_key.clone(),
            file_id: cfg.file_id.clone(),
            source_filter: cfg.source_filter.clone(),
            page_size: PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn fetch_logs(&self, window: &ReportWindow) -> Result<FetchedLogs, FetchError> {
        let mut raw = Vec::new();
        let mut page = 1usize;

        loop {
            let batch = self.fetch_page(window, page).await?;
            let received = batch.records.len();
            debug!(page, received, "Fetched log page");
            raw.extend(batch.records);

            let exhausted = received == 0
                || received < self.page_size
                || batch.total.is_some_and(|total| page * self.page_size >= total);
            if exhausted {
                break;
            }
            page += 1;
        }

        let fetched = raw.len();
        LOGS_FETCHED.inc_by(fetched as f64);

        let mut out = FetchedLogs::default();
        for log in raw {
            if log.source.as_deref() != Some(self.source_filter.as_str()) {
                continue;
            }
            let in_window = log
                .created_at
                .as_deref()
                .and_then(parse_timestamp)
                .map_or(true, |ts| window.contains(ts));
            if !in_window {
                continue;
            }

            out.records += 1;
            match log.into_entries() {
                Ok(entries) => out.entries.extend(entries),
                Err(err) => {
                    warn!(error = %err, "Skipping invalid log record");
                    ENTRIES_SKIPPED.inc();
                    out.invalid.push(err);
                }
            }
        }

        info!(
            fetched,
            kept = out.records,
            invalid = out.invalid.len(),
            entries = out.entries.len(),
            "Fetched {} {} logs",
            out.records,
            self.source_filter
        );
        Ok(out)
    }

    async fn fetch_page(&self, window: &ReportWindow, page: usize) -> Result<LogPage, FetchError> {
        let url = format!("{}/v5/logs", self.base_url);

        let res = self
            .client
            .get(&url)
            .header("X-API-KEY", &self.api_key)
            .query(&[
                ("file_id", self.file_id.clone()),
                ("page", page.to_string()),
                ("size", self.page_size.to_string()),
                ("start_date", window.start.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("end_date", window.end.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ])
            .send()
            .await?;

        let status = res.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::Unauthorized(status.as_u16()));
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(res.json::<LogPage>().await?)
    }
}
