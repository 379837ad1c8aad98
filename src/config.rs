use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct Config {
    pub humanloop_key: String,
    pub humanloop_url: String,
    pub file_id: String,
    pub source_filter: String,

    pub openai_key: String,
    pub openai_base_url: String,
    pub openai_model: String,

    pub sender_email: String,
    pub recipient_email: String,
    pub smtp_password: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub subject_prefix: String,

    pub gap_threshold_minutes: i64,
    pub lookback_hours: i64,
    pub analysis_concurrency: usize,
    pub analysis_max_retries: u32,
    pub analysis_retry_base_ms: u64,
    pub max_highlights: usize,
    pub max_pain_points: usize,
    pub http_timeout_secs: u64,

    pub output_dir: PathBuf,
    pub report_link_base: Option<String>,
    pub keep_artifacts: bool,
    pub metrics_textfile: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes `std::env`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| -> Result<String, ConfigError> {
            match lookup(name) {
                Some(value) if !value.trim().is_empty() => Ok(value),
                _ => Err(ConfigError::Missing(name)),
            }
        };
        let or_default = |name: &str, default: &str| -> String {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.into())
        };
        let optional = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let defaults = Self::default();

        let cfg = Self {
            humanloop_key: required("HUMANLOOP_API_KEY")?,
            humanloop_url: or_default("HUMANLOOP_URL", &defaults.humanloop_url),
            file_id: required("FILE_ID")?,
            source_filter: or_default("LOG_SOURCE_FILTER", &defaults.source_filter),

            openai_key: required("OPENAI_API_KEY")?,
            openai_base_url: or_default("OPENAI_BASE_URL", &defaults.openai_base_url),
            openai_model: or_default("OPENAI_MODEL", &defaults.openai_model),

            sender_email: required("SENDER_EMAIL_ADDRESS")?,
            recipient_email: required("RECIPIENT_EMAIL_ADDRESS")?,
            smtp_password: required("GMAIL_APP_PASSWORD")?,
            smtp_host: or_default("SMTP_HOST", &defaults.smtp_host),
            smtp_port: parse_or("SMTP_PORT", optional("SMTP_PORT"), defaults.smtp_port)?,
            subject_prefix: or_default("SUBJECT_PREFIX", &defaults.subject_prefix),

            gap_threshold_minutes: parse_or(
                "GAP_THRESHOLD_MINUTES",
                optional("GAP_THRESHOLD_MINUTES"),
                defaults.gap_threshold_minutes,
            )?,
            lookback_hours: parse_or("LOOKBACK_HOURS", optional("LOOKBACK_HOURS"), defaults.lookback_hours)?,
            analysis_concurrency: parse_or(
                "ANALYSIS_CONCURRENCY",
                optional("ANALYSIS_CONCURRENCY"),
                defaults.analysis_concurrency,
            )?,
            analysis_max_retries: parse_or(
                "ANALYSIS_MAX_RETRIES",
                optional("ANALYSIS_MAX_RETRIES"),
                defaults.analysis_max_retries,
            )?,
            analysis_retry_base_ms: parse_or(
                "ANALYSIS_RETRY_BASE_MS",
                optional("ANALYSIS_RETRY_BASE_MS"),
                defaults.analysis_retry_base_ms,
            )?,
            max_highlights: parse_or("MAX_HIGHLIGHTS", optional("MAX_HIGHLIGHTS"), defaults.max_highlights)?,
            max_pain_points: parse_or("MAX_PAIN_POINTS", optional("MAX_PAIN_POINTS"), defaults.max_pain_points)?,
            http_timeout_secs: parse_or(
                "HTTP_TIMEOUT_SECS",
                optional("HTTP_TIMEOUT_SECS"),
                defaults.http_timeout_secs,
            )?,

            output_dir: optional("OUTPUT_DIR").map(PathBuf::from).unwrap_or(defaults.output_dir),
            report_link_base: optional("REPORT_LINK_BASE"),
            keep_artifacts: parse_or("KEEP_ARTIFACTS", optional("KEEP_ARTIFACTS"), defaults.keep_artifacts)?,
            metrics_textfile: optional("METRICS_TEXTFILE").map(PathBuf::from),
        };

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.gap_threshold_minutes <= 0 {
            return Err(ConfigError::Invalid {
                name: "GAP_THRESHOLD_MINUTES",
                reason: "must be greater than 0".into(),
            });
        }
        if self.lookback_hours <= 0 {
            return Err(ConfigError::Invalid {
                name: "LOOKBACK_HOURS",
                reason: "must be greater than 0".into(),
            });
        }
        if self.analysis_concurrency == 0 {
            return Err(ConfigError::Invalid {
                name: "ANALYSIS_CONCURRENCY",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn gap_threshold(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.gap_threshold_minutes)
    }

    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::hours(self.lookback_hours)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.analysis_retry_base_ms)
    }
}

fn parse_or<T>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            humanloop_key: String::new(),
            humanloop_url: "https://api.humanloop.com".into(),
            file_id: String::new(),
            source_filter: "production".into(),
            openai_key: String::new(),
            openai_base_url: "https://api.openai.com/v1".into(),
            openai_model: "gpt-4o-mini".into(),
            sender_email: String::new(),
            recipient_email: String::new(),
            smtp_password: String::new(),
            smtp_host: "smtp.gmail.com".into(),
            smtp_port: 587,
            subject_prefix: "Daily Log Report".into(),
            gap_threshold_minutes: 60,
            lookback_hours: 24,
            analysis_concurrency: 4,
            analysis_max_retries: 3,
            analysis_retry_base_ms: 1000,
            max_highlights: 5,
            max_pain_points: 5,
            http_timeout_secs: 30,
            output_dir: PathBuf::from("."),
            report_link_base: None,
            keep_artifacts: false,
            metrics_textfile: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn required_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("HUMANLOOP_API_KEY", "hl-key"),
            ("FILE_ID", "pr_123"),
            ("OPENAI_API_KEY", "sk-test"),
            ("SENDER_EMAIL_ADDRESS", "bot@example.com"),
            ("RECIPIENT_EMAIL_ADDRESS", "team@example.com"),
            ("GMAIL_APP_PASSWORD", "app-pass"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<Config, ConfigError> {
        Config::from_lookup(|k| vars.get(k).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults_applied() {
        let cfg = load(&required_vars()).unwrap();
        assert_eq!(cfg.source_filter, "production");
        assert_eq!(cfg.smtp_port, 587);
        assert_eq!(cfg.gap_threshold(), chrono::Duration::minutes(60));
        assert_eq!(cfg.http_timeout(), Duration::from_secs(30));
        assert!(cfg.report_link_base.is_none());
        assert!(!cfg.keep_artifacts);
    }

    #[test]
    fn test_missing_required_var() {
        let mut vars = required_vars();
        vars.remove("OPENAI_API_KEY");
        match load(&vars) {
            Err(ConfigError::Missing(name)) => assert_eq!(name, "OPENAI_API_KEY"),
            other => panic!("expected missing var, got {other:?}"),
        }
    }

    #[test]
    fn test_blank_required_var_is_missing() {
        let mut vars = required_vars();
        vars.insert("FILE_ID", "   ");
        assert!(matches!(load(&vars), Err(ConfigError::Missing("FILE_ID"))));
    }

    #[test]
    fn test_invalid_number() {
        let mut vars = required_vars();
        vars.insert("SMTP_PORT", "not-a-port");
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid { name: "SMTP_PORT", .. })
        ));
    }

    #[test]
    fn test_zero_gap_rejected() {
        let mut vars = required_vars();
        vars.insert("GAP_THRESHOLD_MINUTES", "0");
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid { name: "GAP_THRESHOLD_MINUTES", .. })
        ));
    }

    #[test]
    fn test_overrides() {
        let mut vars = required_vars();
        vars.insert("GAP_THRESHOLD_MINUTES", "10");
        vars.insert("KEEP_ARTIFACTS", "true");
        vars.insert("REPORT_LINK_BASE", "https://logs.example.com/logs?id=");
        let cfg = load(&vars).unwrap();
        assert_eq!(cfg.gap_threshold_minutes, 10);
        assert!(cfg.keep_artifacts);
        assert_eq!(cfg.report_link_base.as_deref(), Some("https://logs.example.com/logs?id="));
    }
}
