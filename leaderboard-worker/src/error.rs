use std::fmt;

use leaderboard_common::retry::RetryError;
use reqwest::StatusCode;
use thiserror::Error;

/// Errors talking to the messaging provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("rate limited by provider")]
    RateLimited,
    #[error("provider responded with status {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },
    #[error("request to provider failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("access token is not a valid header value")]
    InvalidToken,
    #[error("message {id} has an invalid created_at timestamp: {created_at}")]
    InvalidTimestamp { id: String, created_at: i64 },
}

impl ProviderError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited)
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ProviderError::RateLimited => Some(StatusCode::TOO_MANY_REQUESTS),
            ProviderError::UnexpectedStatus { status, .. } => Some(*status),
            ProviderError::RequestError(error) => error.status(),
            ProviderError::InvalidToken | ProviderError::InvalidTimestamp { .. } => None,
        }
    }
}

/// Errors writing the message log or the spreadsheet.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to write message log: {0}")]
    CsvError(#[from] csv::Error),
    #[error("failed to flush message log: {0}")]
    IoError(#[from] std::io::Error),
    #[error("invalid spreadsheet url: {0}")]
    UrlError(#[from] url::ParseError),
    #[error("request to spreadsheet failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("access token is not a valid header value")]
    InvalidToken,
    #[error("spreadsheet {operation} responded with status {status}: {body}")]
    UnexpectedStatus {
        operation: &'static str,
        status: StatusCode,
        body: String,
    },
}

/// Where in a run an error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Roster,
    Messages { page: u32 },
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Phase::Roster => write!(f, "roster"),
            Phase::Messages { page } => write!(f, "messages page {}", page),
        }
    }
}

/// Enumeration of errors that abort a pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    ConfigError(#[from] envconfig::Error),
    #[error("{phase}: still rate limited after {attempts} attempts")]
    RetryExhausted { phase: Phase, attempts: u32 },
    #[error("{phase}: fetch failed after {attempts} attempts: {source}")]
    FetchFailed {
        phase: Phase,
        attempts: u32,
        #[source]
        source: ProviderError,
    },
    #[error("failed to publish output: {0}")]
    SinkWriteError(#[from] SinkError),
}

impl PipelineError {
    pub fn from_retry(phase: Phase, error: RetryError<ProviderError>) -> Self {
        match error {
            RetryError::Exhausted { attempts, .. } => PipelineError::RetryExhausted { phase, attempts },
            RetryError::Fatal { attempts, error } => PipelineError::FetchFailed {
                phase,
                attempts,
                source: error,
            },
        }
    }

    /// Short label used for the run outcome metric.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::ConfigError(_) => "config_error",
            PipelineError::RetryExhausted { .. } => "retry_exhausted",
            PipelineError::FetchFailed { .. } => "fetch_failed",
            PipelineError::SinkWriteError(_) => "sink_write_error",
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        match self {
            PipelineError::RetryExhausted { phase, .. } | PipelineError::FetchFailed { phase, .. } => {
                Some(*phase)
            }
            _ => None,
        }
    }

    /// Requests made for the failing phase, rate limited ones included.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            PipelineError::RetryExhausted { attempts, .. }
            | PipelineError::FetchFailed { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            PipelineError::RetryExhausted { .. } => Some(StatusCode::TOO_MANY_REQUESTS),
            PipelineError::FetchFailed { source, .. } => source.status(),
            PipelineError::SinkWriteError(SinkError::UnexpectedStatus { status, .. }) => {
                Some(*status)
            }
            PipelineError::SinkWriteError(SinkError::RequestError(error)) => error.status(),
            _ => None,
        }
    }
}
