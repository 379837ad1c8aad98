use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Log retrieval failed. Always fatal to the run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("log source request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("log source rejected credentials (status {0})")]
    Unauthorized(u16),

    #[error("log source returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// A raw log record that cannot become a `LogEntry`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("log {log_id} has no user id")]
    MissingUser { log_id: String },

    #[error("log {log_id} has no timestamp")]
    MissingTimestamp { log_id: String },

    #[error("log {log_id} has unparseable timestamp {value:?}")]
    BadTimestamp { log_id: String, value: String },

    #[error("all {0} fetched log records were invalid")]
    NothingValid(usize),
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("LLM response was not the expected structure: {0}")]
    Malformed(String),

    #[error("all {0} conversations failed analysis")]
    AllFailed(usize),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("report text is empty")]
    EmptyInput,

    #[error("PDF generation failed: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("writing report artifact failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid email address {address:?}: {reason}")]
    Address { address: String, reason: String },

    #[error("building email failed: {0}")]
    Message(String),

    #[error("SMTP transport failed: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

/// Any failure that aborts a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}
