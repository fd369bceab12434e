use logtap_types::LogEntry;

/// Keepalive frames are a single NUL byte
const KEEPALIVE: &[u8] = &[0];

/// Check whether a frame payload is a server keepalive
pub fn is_keepalive(payload: &[u8]) -> bool {
    payload == KEEPALIVE
}

/// Try to decode a frame as a structured `{source, timestamp, message}` entry.
///
/// Returns None for anything that is not such an object; the caller then
/// treats the frame as a pre-formatted plain line.
pub fn parse_log_entry(raw: &str) -> Option<LogEntry> {
    let trimmed = raw.trim_start();
    if !trimmed.starts_with('{') {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}
