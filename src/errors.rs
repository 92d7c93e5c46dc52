use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphBenchError>;

/// Error type shared by every adapter, the sampler and the runner.
#[derive(Debug, Error)]
pub enum GraphBenchError {
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("query failed: {0}")]
    QueryFailed(String),
    #[error("sampling exhausted: {0}")]
    SamplingExhausted(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("config error: {0}")]
    ConfigError(String),
    #[error("stats store error: {0}")]
    StoreError(String),
}

impl GraphBenchError {
    pub fn unavailable<T: Into<String>>(msg: T) -> Self {
        GraphBenchError::BackendUnavailable(msg.into())
    }

    pub fn query<T: Into<String>>(msg: T) -> Self {
        GraphBenchError::QueryFailed(msg.into())
    }

    pub fn exhausted<T: Into<String>>(msg: T) -> Self {
        GraphBenchError::SamplingExhausted(msg.into())
    }

    pub fn invalid_input<T: Into<String>>(msg: T) -> Self {
        GraphBenchError::InvalidInput(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        GraphBenchError::ConfigError(msg.into())
    }

    pub fn store<T: Into<String>>(msg: T) -> Self {
        GraphBenchError::StoreError(msg.into())
    }

    /// A backend that cannot be reached is not worth further operations.
    pub fn is_fatal_for_backend(&self) -> bool {
        matches!(self, GraphBenchError::BackendUnavailable(_))
    }
}

impl From<rusqlite::Error> for GraphBenchError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(
                    failure.code,
                    ErrorCode::CannotOpen
                        | ErrorCode::NotADatabase
                        | ErrorCode::SystemIoFailure
                        | ErrorCode::PermissionDenied
                ) =>
            {
                GraphBenchError::unavailable(err.to_string())
            }
            _ => GraphBenchError::query(err.to_string()),
        }
    }
}
