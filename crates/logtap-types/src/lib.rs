//! Shared types for logtap
//!
//! This crate contains data structures used across multiple logtap crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Defaults
// ============================================================================

/// Default number of historical lines shown before following
pub const DEFAULT_TAIL: usize = 100;

/// Default grace period for the server to deliver the tail
pub const DEFAULT_PREFETCH: Duration = Duration::from_millis(500);

/// Default first reconnect delay
pub const DEFAULT_BACKOFF_INITIAL: Duration = Duration::from_secs(1);

/// Default reconnect delay cap
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Default user agent sent with the handshake
pub const DEFAULT_USER_AGENT: &str = concat!("logtap/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Wire Types
// ============================================================================

/// WebSocket close codes the stream client cares about
pub mod close_code {
    /// Normal closure
    pub const NORMAL: u16 = 1000;
    /// Endpoint going away (server restart, app shutdown)
    pub const GOING_AWAY: u16 = 1001;
    /// Connection dropped without a close frame
    pub const ABNORMAL: u16 = 1006;
    /// Bearer token missing or expired
    pub const UNAUTHORIZED: u16 = 4401;
    /// Bearer token lacks access to the stream
    pub const FORBIDDEN: u16 = 4403;

    /// Whether the code ends a stream cleanly
    pub fn is_clean(code: u16) -> bool {
        code == NORMAL || code == GOING_AWAY
    }

    /// Whether the server rejected our credentials
    pub fn is_auth_rejected(code: u16) -> bool {
        code == UNAUTHORIZED || code == FORBIDDEN
    }
}

/// A structured log entry pushed by the server
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Source tag (e.g. "app", "build", "router")
    pub source: String,

    /// Seconds since the epoch; absent or zero when the server has none
    #[serde(default)]
    pub timestamp: Option<f64>,

    /// Raw message text, may still carry a trailing line break
    pub message: String,
}

impl LogEntry {
    /// Create a new log entry
    pub fn new(source: impl Into<String>, timestamp: Option<f64>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            timestamp,
            message: message.into(),
        }
    }

    /// Timestamp as a positive value, or None when it should render as a placeholder
    pub fn effective_timestamp(&self) -> Option<f64> {
        self.timestamp.filter(|ts| *ts > 0.0)
    }
}

// ============================================================================
// Output Types
// ============================================================================

/// How formatted lines are written out
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// `<timestamp> [<SOURCE>] <message>`
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl FromStr for OutputMode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(ParseEnumError::new("output mode", s)),
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// When to emit ANSI colors
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// Colorize only when writing to a terminal
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorMode {
    /// Resolve against whether the output is a terminal
    pub fn enabled(self, is_terminal: bool) -> bool {
        match self {
            Self::Auto => is_terminal,
            Self::Always => true,
            Self::Never => false,
        }
    }
}

impl FromStr for ColorMode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "always" | "on" => Ok(Self::Always),
            "never" | "off" => Ok(Self::Never),
            _ => Err(ParseEnumError::new("color mode", s)),
        }
    }
}

/// Error for an unrecognized enum value
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
