//! Error types for the stream client.

use std::io;

use crate::context::ContextError;

/// Boxed error returned by transports and collaborators
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Handshake failure, with whatever the server told us
#[derive(Debug, thiserror::Error)]
#[error("{message}{}{}", fmt_status(.status), fmt_body(.body))]
pub struct DialError {
    /// What went wrong
    pub message: String,
    /// HTTP status of the rejected upgrade, if we got that far
    pub status: Option<u16>,
    /// Decoded error detail from the response body
    pub body: Option<String>,
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

fn fmt_body(body: &Option<String>) -> String {
    body.as_ref().map(|b| format!(": {b}")).unwrap_or_default()
}

impl DialError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            body: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// 401 and 403 mean the bearer token was refused
    pub fn is_auth_rejected(&self) -> bool {
        matches!(self.status, Some(401 | 403))
    }
}

/// Everything `LogStreamer::run` can fail with
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Could not establish the connection
    #[error("failed to connect: {0}")]
    Dial(#[source] DialError),

    /// Token refused at the handshake or via close code 4401/4403
    #[error("authentication rejected: {reason}")]
    AuthRejected { reason: String },

    /// Server closed with an unexpected code, or the socket dropped
    #[error("connection closed abnormally (code {code}){}", fmt_reason(.reason))]
    AbnormalClose { code: u16, reason: String },

    /// Read or send failure on an open connection
    #[error("connection error: {0}")]
    Transport(#[source] BoxError),

    /// Output sink failed; never retried
    #[error("failed to write output: {0}")]
    Write(#[source] io::Error),

    #[error("failed to refresh token: {0}")]
    TokenRefresh(#[source] BoxError),

    /// Liveness check failed after a disconnect
    #[error("app no longer available: {0}")]
    AppUnavailable(#[source] BoxError),

    #[error("stream cancelled")]
    Cancelled,

    #[error("stream deadline exceeded")]
    DeadlineExceeded,
}

fn fmt_reason(reason: &str) -> String {
    if reason.is_empty() {
        String::new()
    } else {
        format!(": {reason}")
    }
}

impl StreamError {
    /// Failures worth reconnecting for while following
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Dial(_) | Self::AbnormalClose { .. } | Self::Transport(_)
        )
    }

    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, Self::AuthRejected { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

impl From<ContextError> for StreamError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Cancelled => Self::Cancelled,
            ContextError::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dial_error_display() {
        let err = DialError::new("handshake failed")
            .with_status(503)
            .with_body("app is restarting");
        assert_eq!(
            err.to_string(),
            "handshake failed (HTTP 503): app is restarting"
        );
        assert!(!err.is_auth_rejected());
        assert!(DialError::new("x").with_status(401).is_auth_rejected());
        assert!(DialError::new("x").with_status(403).is_auth_rejected());
    }

    #[test]
    fn test_abnormal_close_display() {
        let err = StreamError::AbnormalClose {
            code: 1011,
            reason: "internal error".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "connection closed abnormally (code 1011): internal error"
        );

        let err = StreamError::AbnormalClose {
            code: 1006,
            reason: String::new(),
        };
        assert_eq!(err.to_string(), "connection closed abnormally (code 1006)");
    }

    #[test]
    fn test_classes() {
        assert!(StreamError::Dial(DialError::new("refused")).is_retryable());
        assert!(!StreamError::Write(io::Error::other("x")).is_retryable());
        assert!(!StreamError::Cancelled.is_retryable());
        assert!(StreamError::from(ContextError::DeadlineExceeded).is_cancelled());
    }
}
