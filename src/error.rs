// src/error.rs
//! Error kinds the scheduler has to tell apart. Bootstrap code uses `anyhow`.

use thiserror::Error;

/// Failure of a single feed fetch.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The endpoint answered, but not with an `Items` array.
    #[error("feed returned a malformed body: {sample}")]
    Shape { sample: String },

    #[error("feed request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("feed answered with HTTP {status}")]
    Status { status: u16 },
}

impl FeedError {
    /// Short label used for log fields and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            FeedError::Shape { .. } => "shape",
            FeedError::Transport(_) | FeedError::Status { .. } => "transport",
        }
    }
}

/// Reading or writing one of the JSON state files failed.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("state file io: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from the chat platform boundary.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The token was rejected. Retrying cannot fix this.
    #[error("chat token rejected")]
    Unauthorized,

    #[error("missing permission for {0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("rate limited, retry after {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("chat API answered HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

impl ChatError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChatError::Unauthorized)
    }

    /// Worth another attempt inside the same call.
    pub fn is_retryable(&self) -> bool {
        match self {
            ChatError::Http(_) | ChatError::RateLimited { .. } => true,
            ChatError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unauthorized_is_fatal() {
        assert!(ChatError::Unauthorized.is_fatal());
        assert!(!ChatError::NotFound("channel 1".into()).is_fatal());
        assert!(!ChatError::Forbidden("nick".into()).is_fatal());
    }

    #[test]
    fn server_errors_retry_client_errors_do_not() {
        let five = ChatError::Status {
            status: 502,
            body: String::new(),
        };
        let four = ChatError::Status {
            status: 400,
            body: String::new(),
        };
        assert!(five.is_retryable());
        assert!(!four.is_retryable());
        assert!(ChatError::RateLimited { retry_after_ms: 10 }.is_retryable());
    }

    #[test]
    fn shape_error_kind_label() {
        let e = FeedError::Shape {
            sample: "oops".into(),
        };
        assert_eq!(e.kind(), "shape");
        assert_eq!(FeedError::Status { status: 503 }.kind(), "transport");
    }
}
