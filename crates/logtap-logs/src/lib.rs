//! Log processing for logtap
//!
//! This crate provides frame parsing, line formatting, source filtering and
//! the tail buffering that decides when historical lines are shown.

mod buffer;
mod consume;
mod filter;
mod format;
mod parser;

pub use buffer::TailBuffer;
pub use consume::ConsumeState;
pub use filter::SourceFilter;
pub use format::{LogFormatter, TIMESTAMP_PLACEHOLDER};
pub use parser::{is_keepalive, parse_log_entry};

// Re-export types used in our public API
pub use logtap_types::{LogEntry, OutputMode};
