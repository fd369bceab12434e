//! Reconnecting log stream client for logtap
//!
//! This crate dials a WebSocket log feed, shows the requested tail, and keeps
//! following across disconnects: refreshing the bearer token when it is
//! refused and checking the app is still alive before backing off.

mod auth;
mod backoff;
mod config;
mod context;
mod error;
mod streamer;
mod transport;
mod ws;

#[cfg(test)]
mod testing;

pub use auth::{
    AppStatusChecker, CommandError, CommandStatusChecker, CommandTokenProvider, TokenProvider,
    extract_token,
};
pub use backoff::Backoff;
pub use config::StreamConfig;
pub use context::{ContextError, StreamContext};
pub use error::{BoxError, DialError, StreamError};
pub use streamer::{LogStreamer, RetryDecision, classify};
pub use transport::{CloseFrame, Connection, Dialer, Frame};
pub use ws::{WsConnection, WsDialer, decode_error_body};

// Re-export types used in our public API
pub use logtap_logs::SourceFilter;
pub use logtap_types::{ColorMode, OutputMode};
