//! Connection-cycle orchestration for the log stream.
//!
//! A run is a loop of connection cycles: make sure we hold a token, dial,
//! send the search filter, then read frames until the server closes, the
//! connection fails, or the context ends. Between cycles the outcome is
//! classified into a [`RetryDecision`].

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use logtap_logs::{ConsumeState, LogFormatter, SourceFilter, is_keepalive, parse_log_entry};
use logtap_types::{OutputMode, close_code};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{AppStatusChecker, TokenProvider};
use crate::backoff::Backoff;
use crate::config::StreamConfig;
use crate::context::{ContextError, StreamContext};
use crate::error::{BoxError, StreamError};
use crate::transport::{CloseFrame, Connection, ConnectionHandle, Dialer, Frame};
use crate::ws::WsDialer;

/// What to do once a connection cycle has ended
#[derive(Debug)]
pub enum RetryDecision {
    /// Hand this result back to the caller
    Stop(Result<(), StreamError>),
    /// The token was refused: refresh it and reconnect without waiting
    RefreshToken(StreamError),
    /// Confirm the app is still there, back off, then reconnect.
    /// Carries the failure, or None after a clean close.
    Reconnect(Option<StreamError>),
}

/// Decide how a run continues after a cycle.
///
/// Cancellation wins over everything; without `follow` the outcome is final.
pub fn classify(
    cancelled: Option<ContextError>,
    follow: bool,
    outcome: Result<(), StreamError>,
) -> RetryDecision {
    if let Some(reason) = cancelled {
        return RetryDecision::Stop(Err(reason.into()));
    }
    if !follow {
        return RetryDecision::Stop(outcome);
    }
    match outcome {
        Ok(()) => RetryDecision::Reconnect(None),
        Err(err) if err.is_auth_rejected() => RetryDecision::RefreshToken(err),
        Err(err) if err.is_retryable() => RetryDecision::Reconnect(Some(err)),
        Err(err) => RetryDecision::Stop(Err(err)),
    }
}

/// Streams a remote log feed to a writer, reconnecting while following
pub struct LogStreamer {
    url: String,
    origin: Option<String>,
    user_agent: String,
    filter: String,
    sources: SourceFilter,
    tail: usize,
    follow: bool,
    prefetch: Duration,
    backoff_initial: Duration,
    backoff_max: Duration,

    writer: Box<dyn Write + Send>,
    formatter: LogFormatter,

    dialer: Arc<dyn Dialer>,
    token_provider: Option<Arc<dyn TokenProvider>>,
    status_checker: Option<Arc<dyn AppStatusChecker>>,

    /// Current bearer token, replaced on refresh
    token: Option<String>,

    /// An earlier cycle of this run already showed the tail
    tail_already_flushed: bool,

    /// The current cycle produced at least one output line
    streamed: bool,
}

impl LogStreamer {
    /// Validate the configuration and build a streamer using the WebSocket dialer
    pub fn new(config: StreamConfig) -> Result<Self, StreamError> {
        let Some(writer) = config.writer else {
            return Err(StreamError::Config("no output writer configured".to_string()));
        };
        if config.url.trim().is_empty() {
            return Err(StreamError::Config("no stream URL configured".to_string()));
        }

        let formatter = LogFormatter::new(config.output)
            .with_color(config.colorize && config.output == OutputMode::Text)
            .with_local_time(config.local_time);

        Ok(Self {
            url: config.url,
            origin: config.origin,
            user_agent: config.user_agent,
            filter: config.filter,
            sources: config.sources,
            tail: config.tail,
            follow: config.follow,
            prefetch: config.prefetch,
            backoff_initial: config.backoff_initial,
            backoff_max: config.backoff_max,
            writer,
            formatter,
            dialer: Arc::new(WsDialer),
            token_provider: config.token_provider,
            status_checker: config.status_checker,
            token: config.token.filter(|t| !t.is_empty()),
            tail_already_flushed: false,
            streamed: false,
        })
    }

    /// Replace the transport
    pub fn with_dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = dialer;
        self
    }

    /// Stream until the feed ends (without follow), a fatal error, or the
    /// context is done.
    pub async fn run(&mut self, ctx: &StreamContext) -> Result<(), StreamError> {
        let mut backoff = Backoff::new(self.backoff_initial, self.backoff_max);
        self.tail_already_flushed = false;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let outcome = self.connect_and_consume(ctx).await;

            match classify(ctx.err(), self.follow, outcome) {
                RetryDecision::Stop(result) => return result,
                RetryDecision::RefreshToken(reason) => {
                    info!(attempt, reason = %reason, "Token rejected, refreshing");
                    self.refresh_token(ctx, reason).await?;
                    backoff.reset();
                }
                RetryDecision::Reconnect(reason) => {
                    match &reason {
                        Some(err) => warn!(attempt, error = %err, "Log stream interrupted"),
                        None => info!(attempt, "Log stream closed by server"),
                    }
                    self.check_app(ctx).await?;
                    if self.streamed {
                        backoff.reset();
                    }
                    debug!(delay = ?backoff.current(), "Reconnecting");
                    backoff.wait(ctx).await?;
                    backoff.next();
                }
            }
        }
    }

    async fn connect_and_consume(&mut self, ctx: &StreamContext) -> Result<(), StreamError> {
        self.streamed = false;

        let token = self.ensure_token(ctx).await?;
        let headers = self.headers(token.as_deref());

        debug!(url = %self.url, "Connecting to log stream");
        let conn = self
            .dialer
            .dial(ctx, &self.url, &headers)
            .await
            .map_err(|e| {
                if e.is_auth_rejected() {
                    StreamError::AuthRejected {
                        reason: e.to_string(),
                    }
                } else {
                    StreamError::Dial(e)
                }
            })?;
        info!(url = %self.url, "Connected to log stream");

        let handle = Arc::new(ConnectionHandle::new(conn));
        let stop = CancellationToken::new();
        let watcher = spawn_close_watcher(ctx.clone(), Arc::clone(&handle), stop.clone());

        let result = self.consume(ctx, &handle).await;

        stop.cancel();
        if let Err(e) = watcher.await {
            debug!(error = %e, "Close watcher failed");
        }
        handle.close_once(close_code::NORMAL, "").await;

        result
    }

    async fn consume(
        &mut self,
        ctx: &StreamContext,
        handle: &ConnectionHandle,
    ) -> Result<(), StreamError> {
        handle
            .connection()
            .send_text(self.filter.clone())
            .await
            .map_err(StreamError::Transport)?;

        let mut state = ConsumeState::new(
            self.tail,
            self.follow,
            self.prefetch,
            &mut *self.writer,
            self.tail_already_flushed,
        );

        let result = read_frames(
            ctx,
            handle,
            &mut state,
            &self.formatter,
            &self.sources,
            &mut self.streamed,
        )
        .await;

        // A failed write leaves the tail buffered; writing it again could duplicate lines
        let flushed = match &result {
            Err(StreamError::Write(_)) => Ok(()),
            _ => state.flush_remaining().map_err(StreamError::Write),
        };
        self.tail_already_flushed = state.is_flushed();

        flushed?;
        result
    }

    async fn ensure_token(&mut self, ctx: &StreamContext) -> Result<Option<String>, StreamError> {
        if self.token.is_none() {
            if let Some(provider) = &self.token_provider {
                debug!("Fetching initial token");
                let token = provider
                    .refresh(ctx)
                    .await
                    .map_err(StreamError::TokenRefresh)?;
                self.token = Some(token);
            }
        }
        Ok(self.token.clone())
    }

    async fn refresh_token(
        &mut self,
        ctx: &StreamContext,
        reason: StreamError,
    ) -> Result<(), StreamError> {
        let Some(provider) = &self.token_provider else {
            return Err(reason);
        };
        match provider.refresh(ctx).await {
            Ok(token) => {
                self.token = Some(token);
                Ok(())
            }
            Err(e) => Err(match ctx.err() {
                Some(reason) => reason.into(),
                None => StreamError::TokenRefresh(e),
            }),
        }
    }

    async fn check_app(&mut self, ctx: &StreamContext) -> Result<(), StreamError> {
        let Some(checker) = &self.status_checker else {
            return Ok(());
        };
        match checker.check(ctx).await {
            Ok(()) => Ok(()),
            // Cancellation takes precedence over a check cut short by it
            Err(e) => Err(match ctx.err() {
                Some(reason) => reason.into(),
                None => StreamError::AppUnavailable(e),
            }),
        }
    }

    fn headers(&self, token: Option<&str>) -> Vec<(String, String)> {
        let mut headers = vec![("User-Agent".to_string(), self.user_agent.clone())];
        if let Some(token) = token {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }
        if let Some(origin) = &self.origin {
            headers.push(("Origin".to_string(), origin.clone()));
        }
        headers
    }
}

/// Close the connection as soon as the context ends, unblocking the reader.
/// Exits quietly when `stop` fires first.
fn spawn_close_watcher(
    ctx: StreamContext,
    handle: Arc<ConnectionHandle>,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = stop.cancelled() => {}
            reason = ctx.done() => {
                debug!(reason = %reason, "Closing log stream");
                handle.close_once(close_code::NORMAL, "client closed").await;
            }
        }
    })
}

/// Read and route frames until the connection ends
async fn read_frames<W: Write + ?Sized>(
    ctx: &StreamContext,
    handle: &ConnectionHandle,
    state: &mut ConsumeState<'_, W>,
    formatter: &LogFormatter,
    sources: &SourceFilter,
    streamed: &mut bool,
) -> Result<(), StreamError> {
    let conn = handle.connection();

    loop {
        if let Some(reason) = ctx.err() {
            return Err(reason.into());
        }
        let deadline = state.read_deadline(ctx.deadline());

        let read = tokio::select! {
            reason = ctx.done() => return Err(reason.into()),
            read = recv_before(conn, deadline) => read,
        };

        let frame = match read {
            None => {
                if let Some(reason) = ctx.err() {
                    return Err(reason.into());
                }
                if state.flush_deadline().is_some()
                    && !state.handle_flush_timeout().map_err(StreamError::Write)?
                {
                    return Ok(());
                }
                continue;
            }
            Some(Err(e)) => return Err(StreamError::Transport(e)),
            Some(Ok(None)) => {
                return Err(StreamError::AbnormalClose {
                    code: close_code::ABNORMAL,
                    reason: "connection closed without a close frame".to_string(),
                });
            }
            Some(Ok(Some(frame))) => frame,
        };

        if let Frame::Close(close) = frame {
            handle.mark_closed();
            return close_outcome(close);
        }

        let payload = frame.payload();
        if is_keepalive(payload) {
            continue;
        }

        let text = String::from_utf8_lossy(payload);
        if let Some(line) = render_frame(formatter, sources, &text) {
            *streamed = true;
            state.process_line(line).map_err(StreamError::Write)?;
        }
    }
}

/// Receive one frame; None if the deadline passed first
async fn recv_before(
    conn: &dyn Connection,
    deadline: Option<Instant>,
) -> Option<Result<Option<Frame>, BoxError>> {
    match deadline {
        Some(deadline) => timeout_at(deadline, conn.recv()).await.ok(),
        None => Some(conn.recv().await),
    }
}

/// Structured entries are filtered by source; anything else is a plain line
fn render_frame(formatter: &LogFormatter, sources: &SourceFilter, text: &str) -> Option<String> {
    match parse_log_entry(text) {
        Some(entry) if !sources.matches(&entry) => None,
        Some(entry) => Some(formatter.format_entry(&entry)),
        None => Some(formatter.format_plain(text)),
    }
}

fn close_outcome(close: Option<CloseFrame>) -> Result<(), StreamError> {
    let Some(close) = close else {
        return Ok(());
    };
    if close_code::is_clean(close.code) {
        Ok(())
    } else if close_code::is_auth_rejected(close.code) {
        Err(StreamError::AuthRejected {
            reason: format!("server closed with code {}", close.code),
        })
    } else {
        Err(StreamError::AbnormalClose {
            code: close.code,
            reason: close.reason,
        })
    }
}
