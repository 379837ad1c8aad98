use std::collections::BTreeMap;
use std::time::Instant;

use reqwest::Client;

use crate::{config::Config, mailer::SmtpMailer};

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: String,
    pub services: BTreeMap<String, ServiceHealth>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ServiceHealth {
    pub status: String,
    pub message: Option<String>,
    pub response_time_ms: Option<u64>,
}

impl ServiceHealth {
    fn healthy(message: impl Into<String>, started: Instant) -> Self {
        Self {
            status: "healthy".to_string(),
            message: Some(message.into()),
            response_time_ms: Some(started.elapsed().as_millis() as u64),
        }
    }

    fn unhealthy(message: impl Into<String>, started: Instant) -> Self {
        Self {
            status: "unhealthy".to_string(),
            message: Some(message.into()),
            response_time_ms: Some(started.elapsed().as_millis() as u64),
        }
    }
}

/// Connectivity checks against the three services a run depends on.
pub struct HealthChecker {
    client: Client,
}

impl HealthChecker {
    pub fn new(cfg: &Config) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(cfg.http_timeout()).build()?,
        })
    }

    async fn check_http(&self, label: &str, request: reqwest::RequestBuilder) -> ServiceHealth {
        let start = Instant::now();
        match request.send().await {
            Ok(response) if response.status().is_success() => {
                ServiceHealth::healthy(format!("{label} accessible"), start)
            }
            Ok(response) => ServiceHealth::unhealthy(format!("{label} returned status: {}", response.status()), start),
            Err(e) => ServiceHealth::unhealthy(format!("{label} connection error: {e}"), start),
        }
    }

    pub async fn check_log_source(&self, cfg: &Config) -> ServiceHealth {
        let url = format!("{}/v5/logs", cfg.humanloop_url.trim_end_matches('/'));
        let request = self
            .client
            .get(url)
            .header("X-API-KEY", &cfg.humanloop_key)
            .query(&[("file_id", cfg.file_id.as_str()), ("page", "1"), ("size", "1")]);
        self.check_http("Log source API", request).await
    }

    pub async fn check_llm(&self, cfg: &Config) -> ServiceHealth {
        let url = format!("{}/models", cfg.openai_base_url.trim_end_matches('/'));
        let request = self.client.get(url).bearer_auth(&cfg.openai_key);
        self.check_http("LLM API", request).await
    }

    pub async fn check_smtp(&self, cfg: &Config) -> ServiceHealth {
        let start = Instant::now();
        let mailer = match SmtpMailer::new(cfg) {
            Ok(mailer) => mailer,
            Err(e) => return ServiceHealth::unhealthy(format!("SMTP configuration error: {e}"), start),
        };
        match mailer.test_connection().await {
            Ok(true) => ServiceHealth::healthy(format!("SMTP server {} reachable", cfg.smtp_host), start),
            Ok(false) => ServiceHealth::unhealthy(format!("SMTP server {} did not respond", cfg.smtp_host), start),
            Err(e) => ServiceHealth::unhealthy(format!("SMTP connection error: {e}"), start),
        }
    }

    pub async fn get_overall_health(&self, cfg: &Config) -> HealthStatus {
        let mut services = BTreeMap::new();

        services.insert("log_source".to_string(), self.check_log_source(cfg).await);
        services.insert("llm".to_string(), self.check_llm(cfg).await);
        services.insert("smtp".to_string(), self.check_smtp(cfg).await);

        let all_healthy = services.values().all(|service| service.status == "healthy");
        let overall_status = if all_healthy { "healthy" } else { "degraded" };

        HealthStatus {
            status: overall_status.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            services,
        }
    }
}
