use std::time::Duration;

use futures::{stream, StreamExt};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    error::AnalysisError,
    metrics::{ANALYSES_FAILED, ANALYSES_SUCCEEDED, ANALYSIS_DURATION, ANALYSIS_RETRIES},
    schema::{AnalysisResult, Conversation, Finding, Sentiment},
    summary::collapse_whitespace,
};

const SYSTEM_PROMPT: &str = "You analyze customer service conversations between a user and an automated assistant. \
Reply with a single JSON object and nothing else, using exactly these keys:\n\
- \"sentiment\": one of \"positive\", \"neutral\", \"negative\" (the user's overall sentiment)\n\
- \"pain_points\": array of {\"text\": string, \"log_id\": string or null} describing user frustrations\n\
- \"highlights\": array of {\"text\": string, \"log_id\": string or null} quoting notably successful exchanges\n\
- \"themes\": array of short lowercase theme labels (2-4 words each)\n\
Use empty arrays when nothing applies. Reference the exact log ids shown in the transcript (format log_XYZ), \
never conversation numbers.";

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// The object the model is instructed to return. No field has a default,
/// so a missing key fails deserialization.
#[derive(Debug, Deserialize)]
struct AnalysisPayload {
    sentiment: String,
    pain_points: Vec<FindingPayload>,
    highlights: Vec<FindingPayload>,
    themes: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FindingPayload {
    Text(String),
    Detailed {
        text: String,
        #[serde(default)]
        log_id: Option<String>,
    },
}

impl From<FindingPayload> for Finding {
    fn from(payload: FindingPayload) -> Self {
        match payload {
            FindingPayload::Text(text) => Finding { text, log_id: None },
            FindingPayload::Detailed { text, log_id } => Finding {
                text,
                log_id: log_id.filter(|id| !id.trim().is_empty()),
            },
        }
    }
}

fn parse_sentiment(raw: &str) -> Result<Sentiment, AnalysisError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "positive" => Ok(Sentiment::Positive),
        "neutral" | "mixed" => Ok(Sentiment::Neutral),
        "negative" => Ok(Sentiment::Negative),
        other => Err(AnalysisError::Malformed(format!("unknown sentiment {other:?}"))),
    }
}

/// Strips a Markdown code fence some models wrap JSON in.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Decodes a chat completion body into an `AnalysisResult`.
pub fn parse_analysis(conversation_id: &str, body: &str) -> Result<AnalysisResult, AnalysisError> {
    let completion: ChatCompletion = serde_json::from_str(body)
        .map_err(|e| AnalysisError::Malformed(format!("completion envelope: {e}")))?;

    let content = completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| AnalysisError::Malformed("completion has no message content".into()))?;

    let payload: AnalysisPayload = serde_json::from_str(strip_code_fence(&content))
        .map_err(|e| AnalysisError::Malformed(e.to_string()))?;

    Ok(AnalysisResult {
        conversation_id: conversation_id.to_string(),
        sentiment: parse_sentiment(&payload.sentiment)?,
        pain_points: payload.pain_points.into_iter().map(Finding::from).collect(),
        highlights: payload.highlights.into_iter().map(Finding::from).collect(),
        themes: payload
            .themes
            .into_iter()
            .map(|t| collapse_whitespace(&t))
            .filter(|t| !t.is_empty())
            .collect(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisFailure {
    pub conversation_id: String,
    pub reason: String,
}

/// Outcomes in conversation order, regardless of completion order.
#[derive(Debug, Default)]
pub struct AnalysisBatch {
    pub results: Vec<AnalysisResult>,
    pub failures: Vec<AnalysisFailure>,
}

pub struct Analyzer {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    concurrency: usize,
    max_retries: u32,
    base_backoff: Duration,
}

impl Analyzer {
    pub fn new(cfg: &Config) -> Result<Self, AnalysisError> {
        let client = Client::builder().timeout(cfg.http_timeout()).build()?;

        Ok(Self {
            client,
            base_url: cfg.openai_base_url.trim_end_matches('/').to_string(),
            api_key: cfg.openai_key.clone(),
            model: cfg.openai_model.clone(),
            concurrency: cfg.analysis_concurrency.max(1),
            max_retries: cfg.analysis_max_retries,
            base_backoff: cfg.retry_base(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn analyze(&self, conversation: &Conversation) -> Result<AnalysisResult, AnalysisError> {
        let _timer = ANALYSIS_DURATION.start_timer();

        let body = json!({
            "model": self.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": format!(
                        "Conversation {} with user {}:\n{}",
                        conversation.id,
                        conversation.user_id,
                        conversation.transcript()
                    )
                }
            ]
        });

        let raw = self.send_with_retry(&conversation.id, &body).await?;
        let result = parse_analysis(&conversation.id, &raw)?;
        debug!(
            conversation_id = %conversation.id,
            sentiment = ?result.sentiment,
            themes = result.themes.len(),
            "Analyzed conversation"
        );
        Ok(result)
    }

    /// Retries rate limits, server errors, connect failures and timeouts with
    /// doubling backoff. Anything else is returned immediately.
    async fn send_with_retry(&self, conversation_id: &str, body: &Value) -> Result<String, AnalysisError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut attempts = 0;
        let mut backoff = self.base_backoff;

        loop {
            let sent = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .await;

            let retry_reason = match sent {
                Ok(res) => {
                    let status = res.status();
                    if status.is_success() {
                        return Ok(res.text().await?);
                    }
                    let error_body = res.text().await.unwrap_or_default();
                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        if attempts >= self.max_retries {
                            return Err(AnalysisError::Status {
                                status: status.as_u16(),
                                body: error_body,
                            });
                        }
                        format!("status {status}")
                    } else {
                        return Err(AnalysisError::Status {
                            status: status.as_u16(),
                            body: error_body,
                        });
                    }
                }
                Err(e) if (e.is_connect() || e.is_timeout()) && attempts < self.max_retries => e.to_string(),
                Err(e) => return Err(AnalysisError::Http(e)),
            };

            warn!(
                conversation_id = %conversation_id,
                reason = %retry_reason,
                attempt = attempts + 1,
                "Transient LLM failure, retrying in {:?}",
                backoff
            );
            ANALYSIS_RETRIES.inc();
            tokio::time::sleep(backoff).await;
            attempts += 1;
            backoff *= 2;
        }
    }

    /// Analyzes every conversation with at most `concurrency` requests in
    /// flight. Failures are collected, not propagated.
    pub async fn analyze_all(&self, conversations: &[Conversation]) -> AnalysisBatch {
        let mut outcomes: Vec<(usize, Result<AnalysisResult, AnalysisError>)> =
            stream::iter(conversations.iter().enumerate())
                .map(|(idx, conversation)| async move { (idx, self.analyze(conversation).await) })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;
        outcomes.sort_by_key(|(idx, _)| *idx);

        let mut batch = AnalysisBatch::default();
        for (idx, outcome) in outcomes {
            let conversation_id = &conversations[idx].id;
            match outcome {
                Ok(result) => {
                    ANALYSES_SUCCEEDED.inc();
                    batch.results.push(result);
                }
                Err(err) => {
                    ANALYSES_FAILED.inc();
                    warn!(conversation_id = %conversation_id, error = %err, "Skipping conversation after analysis failure");
                    batch.failures.push(AnalysisFailure {
                        conversation_id: conversation_id.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            analyzed = batch.results.len(),
            failed = batch.failures.len(),
            "Analysis complete"
        );
        batch
    }
}
