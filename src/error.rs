use crate::i18n::{Key, Lang, tr};
use crate::protocol::StreamFailure;

/// Failures talking to the backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The request never produced a response, or the body could not be read.
    #[error("transport error: {0}")]
    Transport(String),
    /// A response or stream frame had an unexpected shape.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The backend reported a failure inside the stream.
    #[error("server error: {0}")]
    ServerSignaled(String),
    #[error("rate limited by the server")]
    RateLimited,
    #[error("authentication required")]
    Unauthenticated,
    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },
}

impl ClientError {
    /// Maps an unsuccessful HTTP status to its error class.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => Self::RateLimited,
            401 => Self::Unauthenticated,
            _ => Self::Status { status, body },
        }
    }

    /// Short localized message suitable for a warning banner.
    pub fn notice(&self, lang: Lang) -> &'static str {
        match self {
            Self::RateLimited => tr(Key::ErrorTooManyRequests, lang),
            Self::Unauthenticated => tr(Key::ErrorSignIn, lang),
            _ => tr(Key::ErrorFetchFailed, lang),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Protocol(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<StreamFailure> for ClientError {
    fn from(failure: StreamFailure) -> Self {
        match failure {
            StreamFailure::Server(message) => Self::ServerSignaled(message),
            StreamFailure::Protocol(message) => Self::Protocol(message),
            StreamFailure::Transport(message) => Self::Transport(message),
        }
    }
}

/// Reasons a chat submission is refused before any request is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("a generation is already in progress")]
    Busy,
    #[error("topic is empty")]
    EmptyTopic,
}

impl SessionError {
    pub fn notice(&self, lang: Lang) -> &'static str {
        match self {
            Self::Busy => tr(Key::Busy, lang),
            Self::EmptyTopic => tr(Key::ChatPlaceholder, lang),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_http_statuses() {
        assert_eq!(ClientError::from_status(429, String::new()), ClientError::RateLimited);
        assert_eq!(ClientError::from_status(401, String::new()), ClientError::Unauthenticated);
        assert!(matches!(
            ClientError::from_status(502, "bad gateway".to_string()),
            ClientError::Status { status: 502, .. }
        ));
    }

    #[test]
    fn notices_fall_back_to_service_unavailable() {
        assert_eq!(
            ClientError::RateLimited.notice(Lang::En),
            "Too many requests today. Please try again tomorrow."
        );
        assert_eq!(
            ClientError::Protocol("x".to_string()).notice(Lang::En),
            "LLM service is unavailable. Please try again later."
        );
        assert_eq!(
            ClientError::from(StreamFailure::Server("boom".to_string())),
            ClientError::ServerSignaled("boom".to_string())
        );
    }
}
