use thiserror::Error;

/// Failures a pipeline run can surface. None of these are recovered locally;
/// they bubble up to the orchestrator and mark the run as failed.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid inventory url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GET {url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("inventory payload is not a JSON object: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("inventory count {key:?} is not an integer: {value}")]
    NonIntegerCount {
        key: String,
        value: serde_json::Value,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
