use chrono::{DateTime, Local, Utc};
use crossterm::style::Stylize;
use serde::Serialize;

use logtap_types::{LogEntry, OutputMode};

/// Rendered in place of a missing timestamp; same width as a UTC timestamp
pub const TIMESTAMP_PLACEHOLDER: &str = "------------------------";

const UTC_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";
const LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";

/// Turns frames into output lines
#[derive(Clone, Copy, Debug, Default)]
pub struct LogFormatter {
    mode: OutputMode,
    colorize: bool,
    local_time: bool,
}

/// One line of JSON output
#[derive(Serialize)]
struct JsonLine<'a> {
    /// None for plain frames
    source: Option<&'a str>,
    timestamp: Option<String>,
    message: &'a str,
}

impl LogFormatter {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            colorize: false,
            local_time: false,
        }
    }

    /// Emit ANSI colors for timestamp and source (text mode only)
    pub fn with_color(mut self, colorize: bool) -> Self {
        self.colorize = colorize;
        self
    }

    /// Render timestamps in the local time zone instead of UTC
    pub fn with_local_time(mut self, local_time: bool) -> Self {
        self.local_time = local_time;
        self
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Format a structured entry as one output line (without newline)
    pub fn format_entry(&self, entry: &LogEntry) -> String {
        let message = trim_line_break(&entry.message);
        let timestamp = entry
            .effective_timestamp()
            .and_then(|ts| self.render_timestamp(ts));

        match self.mode {
            OutputMode::Json => {
                let line = JsonLine {
                    source: Some(&entry.source),
                    timestamp,
                    message,
                };
                serde_json::to_string(&line).unwrap_or_default()
            }
            OutputMode::Text => {
                let timestamp = timestamp.unwrap_or_else(|| TIMESTAMP_PLACEHOLDER.to_string());
                let source = format!("[{}]", entry.source.to_uppercase());
                if self.colorize {
                    format!("{} {} {}", timestamp.dark_grey(), source.cyan(), message)
                } else {
                    format!("{} {} {}", timestamp, source, message)
                }
            }
        }
    }

    /// Format an unstructured frame: verbatim minus the trailing line break.
    ///
    /// In JSON mode the text becomes the message of an object with no
    /// source or timestamp, so every output line stays valid JSON.
    pub fn format_plain(&self, raw: &str) -> String {
        let message = trim_line_break(raw);
        match self.mode {
            OutputMode::Json => {
                let line = JsonLine {
                    source: None,
                    timestamp: None,
                    message,
                };
                serde_json::to_string(&line).unwrap_or_default()
            }
            OutputMode::Text => message.to_string(),
        }
    }

    fn render_timestamp(&self, ts: f64) -> Option<String> {
        let utc = timestamp_to_utc(ts)?;
        if self.local_time {
            Some(utc.with_timezone(&Local).format(LOCAL_FORMAT).to_string())
        } else {
            Some(utc.format(UTC_FORMAT).to_string())
        }
    }
}

/// Convert fractional epoch seconds to a UTC datetime
fn timestamp_to_utc(ts: f64) -> Option<DateTime<Utc>> {
    if !ts.is_finite() {
        return None;
    }
    let mut secs = ts.floor();
    let mut nanos = ((ts - secs) * 1e9).round();
    if nanos >= 1e9 {
        secs += 1.0;
        nanos = 0.0;
    }
    DateTime::from_timestamp(secs as i64, nanos as u32)
}

fn trim_line_break(s: &str) -> &str {
    s.trim_end_matches(['\r', '\n'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_text_entry() {
        let formatter = LogFormatter::new(OutputMode::Text);
        let entry = LogEntry::new("app", Some(1_700_000_000.25), "started\r\n");
        assert_eq!(
            formatter.format_entry(&entry),
            "2023-11-14T22:13:20.250Z [APP] started"
        );
    }

    #[test]
    fn test_missing_timestamp_uses_placeholder() {
        let formatter = LogFormatter::new(OutputMode::Text);
        let line = formatter.format_entry(&LogEntry::new("build", None, "step 1"));
        assert_eq!(line, format!("{} [BUILD] step 1", TIMESTAMP_PLACEHOLDER));

        let line = formatter.format_entry(&LogEntry::new("build", Some(-3.0), "step 2"));
        assert!(line.starts_with(TIMESTAMP_PLACEHOLDER));
    }

    #[test]
    fn test_colorized_keeps_text() {
        let formatter = LogFormatter::new(OutputMode::Text).with_color(true);
        let line = formatter.format_entry(&LogEntry::new("app", Some(1.0), "hello"));
        assert!(line.contains("\x1b["));
        assert!(line.contains("[APP]"));
        assert!(line.ends_with("hello"));
    }

    #[test]
    fn test_format_json_entry() {
        let formatter = LogFormatter::new(OutputMode::Json).with_color(true);
        let line = formatter.format_entry(&LogEntry::new("app", Some(1_700_000_000.0), "done\n"));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["source"], "app");
        assert_eq!(value["timestamp"], "2023-11-14T22:13:20.000Z");
        assert_eq!(value["message"], "done");
        assert!(!line.contains('\n'));
        assert!(!line.contains("\x1b["));
    }

    #[test]
    fn test_json_without_timestamp_is_null() {
        let formatter = LogFormatter::new(OutputMode::Json);
        let line = formatter.format_entry(&LogEntry::new("app", Some(0.0), "x"));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert!(value["timestamp"].is_null());
    }

    #[test]
    fn test_format_plain() {
        let formatter = LogFormatter::new(OutputMode::Text);
        assert_eq!(formatter.format_plain("GET / 200\r\n"), "GET / 200");
        assert_eq!(formatter.format_plain("  padded  "), "  padded  ");
        assert_eq!(formatter.format_plain("\n"), "");
    }

    #[test]
    fn test_json_wraps_plain_frames() {
        let formatter = LogFormatter::new(OutputMode::Json);
        let line = formatter.format_plain("GET / 200\r\n");
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert!(value["source"].is_null());
        assert!(value["timestamp"].is_null());
        assert_eq!(value["message"], "GET / 200");
    }

    #[test]
    fn test_fraction_rounding_carries() {
        let utc = timestamp_to_utc(9.9999999999).unwrap();
        assert_eq!(utc.format(UTC_FORMAT).to_string(), "1970-01-01T00:00:10.000Z");
        assert!(timestamp_to_utc(f64::NAN).is_none());
    }
}
