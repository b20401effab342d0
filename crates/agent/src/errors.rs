use leavedesk_core::errors::ApplicationError;
use leavedesk_db::repositories::RepositoryError;
use thiserror::Error;

/// Failure talking to the NLU or calendar collaborator.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("gateway is not configured: {0}")]
    NotConfigured(String),
    #[error("gateway transport failed: {0}")]
    Transport(String),
    #[error("gateway returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("gateway response could not be decoded: {0}")]
    Decode(String),
    #[error("gateway returned an empty completion")]
    EmptyCompletion,
}

impl GatewayError {
    /// Transport failures and server-side statuses are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::EmptyCompletion => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::NotConfigured(_) | Self::Decode(_) => false,
        }
    }
}

/// A structured NLU answer that does not have the requested shape.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("no JSON object found in NLU response")]
    NoJsonObject,
    #[error("NLU response is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("NLU response is missing required key `{0}`")]
    MissingKey(&'static str),
    #[error("NLU response key `{key}` has the wrong type, expected {expected}")]
    WrongType { key: &'static str, expected: &'static str },
}

/// Failure reading or writing the employee directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("employee directory is not configured")]
    NotConfigured,
    #[error("employee directory io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("employee directory csv is malformed: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Error)]
pub enum LeaveEngineError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("leave invariant violated: {0}")]
    Invariant(String),
}

impl From<LeaveEngineError> for ApplicationError {
    fn from(value: LeaveEngineError) -> Self {
        match value {
            LeaveEngineError::Repository(error) => Self::Persistence(error.to_string()),
            LeaveEngineError::Invariant(message) => Self::Integration(message),
        }
    }
}
