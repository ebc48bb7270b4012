use thiserror::Error;

/// Every failure an LMS endpoint can produce, normalized at the client
/// boundary so callers never look at raw response shapes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// No response at all: connect failure, timeout, broken stream.
    #[error("network error: {0}")]
    Transport(String),

    /// The server answered with a 5xx.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// The server understood the request and refused it.
    #[error("request rejected{}: {message}", status_suffix(.status))]
    Rejected {
        status: Option<u16>,
        message: String,
    },

    /// The response body could not be read as the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// A request could not be built from local state.
    #[error("invalid request: {0}")]
    Invalid(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

impl ApiError {
    /// Transport failures, 5xx and unreadable bodies may succeed on a second
    /// attempt. A rejection needs a different decision from the user first.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Transport(_) | ApiError::Server { .. } | ApiError::Malformed(_)
        )
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        ApiError::Rejected {
            status: None,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Malformed(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Malformed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_split() {
        assert!(ApiError::Transport("timed out".into()).is_retryable());
        assert!(ApiError::Malformed("eof".into()).is_retryable());
        assert!(ApiError::Server {
            status: 503,
            message: "busy".into()
        }
        .is_retryable());
        assert!(!ApiError::rejected("lecture is locked").is_retryable());
        assert!(!ApiError::Invalid("missing restriction_id".into()).is_retryable());
    }

    #[test]
    fn test_rejected_display_includes_status() {
        let err = ApiError::Rejected {
            status: Some(409),
            message: "already marked".into(),
        };
        assert_eq!(err.to_string(), "request rejected (409): already marked");
        assert_eq!(
            ApiError::rejected("nope").to_string(),
            "request rejected: nope"
        );
    }
}
