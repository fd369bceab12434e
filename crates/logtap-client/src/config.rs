use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use logtap_logs::SourceFilter;
use logtap_types::{
    DEFAULT_BACKOFF_INITIAL, DEFAULT_BACKOFF_MAX, DEFAULT_PREFETCH, DEFAULT_TAIL,
    DEFAULT_USER_AGENT, OutputMode,
};

use crate::auth::{AppStatusChecker, TokenProvider};

/// Everything a [`LogStreamer`](crate::LogStreamer) needs to run
pub struct StreamConfig {
    /// WebSocket endpoint of the log feed
    pub url: String,

    /// Value of the Origin header, if the server wants one
    pub origin: Option<String>,

    /// Initial bearer token; fetched from `token_provider` when absent
    pub token: Option<String>,

    pub token_provider: Option<Arc<dyn TokenProvider>>,

    /// Consulted after disconnects while following
    pub status_checker: Option<Arc<dyn AppStatusChecker>>,

    /// Search filter sent as the first frame
    pub filter: String,

    /// Source tags to keep (empty = all)
    pub sources: SourceFilter,

    /// Historical lines to show before following
    pub tail: usize,

    /// Keep reconnecting until cancelled
    pub follow: bool,

    /// How long to wait for the tail before showing what arrived
    pub prefetch: Duration,

    /// Where formatted lines go; required
    pub writer: Option<Box<dyn Write + Send>>,

    pub user_agent: String,

    /// ANSI colors in text mode
    pub colorize: bool,

    pub output: OutputMode,

    /// Render timestamps in local time instead of UTC
    pub local_time: bool,

    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl StreamConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            origin: None,
            token: None,
            token_provider: None,
            status_checker: None,
            filter: String::new(),
            sources: SourceFilter::default(),
            tail: DEFAULT_TAIL,
            follow: false,
            prefetch: DEFAULT_PREFETCH,
            writer: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            colorize: false,
            output: OutputMode::Text,
            local_time: false,
            backoff_initial: DEFAULT_BACKOFF_INITIAL,
            backoff_max: DEFAULT_BACKOFF_MAX,
        }
    }

    pub fn with_writer(mut self, writer: impl Write + Send + 'static) -> Self {
        self.writer = Some(Box::new(writer));
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    pub fn with_status_checker(mut self, checker: Arc<dyn AppStatusChecker>) -> Self {
        self.status_checker = Some(checker);
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_sources(mut self, sources: SourceFilter) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_tail(mut self, tail: usize) -> Self {
        self.tail = tail;
        self
    }

    pub fn with_follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }

    pub fn with_prefetch(mut self, prefetch: Duration) -> Self {
        self.prefetch = prefetch;
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.backoff_initial = initial;
        self.backoff_max = max;
        self
    }
}

impl std::fmt::Debug for StreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConfig")
            .field("url", &self.url)
            .field("origin", &self.origin)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("token_provider", &self.token_provider.is_some())
            .field("status_checker", &self.status_checker.is_some())
            .field("filter", &self.filter)
            .field("sources", &self.sources)
            .field("tail", &self.tail)
            .field("follow", &self.follow)
            .field("prefetch", &self.prefetch)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StreamConfig::new("wss://logs.example.com/stream");
        assert_eq!(config.tail, DEFAULT_TAIL);
        assert!(!config.follow);
        assert!(config.writer.is_none());
        assert!(config.sources.is_empty());
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = StreamConfig::new("wss://x").with_token("super-secret");
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
