use lifeflow_core::row::RowError;
use lifeflow_filter::ParseError;

/// Client error taxonomy. Nothing here is fatal to the process; every
/// failure is scoped to the view that triggered it.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Network or transport failure — fetch rejected, socket dropped.
    #[error("transport error: {0}")]
    Transport(String),

    /// The current identity may not perform the operation.
    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Malformed row or filter. Blocks the triggering action only.
    #[error("validation error: {0}")]
    Validation(String),

    /// Referenced row absent. List reads map this to an empty result
    /// before it reaches a consumer.
    #[error("not found: {0}")]
    NotFound(String),

    /// The change feed ended; the live engine decides whether to retry.
    #[error("change feed closed")]
    FeedClosed,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Whether the bounded-backoff retry policy applies. Authorization and
    /// validation failures will not get better by retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Transport(_) | ClientError::FeedClosed | ClientError::Internal(_)
        )
    }
}

impl From<RowError> for ClientError {
    fn from(err: RowError) -> Self {
        ClientError::Validation(err.to_string())
    }
}

impl From<ParseError> for ClientError {
    fn from(err: ParseError) -> Self {
        ClientError::Validation(err.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

/// Convenience alias used throughout the client.
pub type ClientResult<T> = Result<T, ClientError>;
