//! Scripted transport and recording collaborators for streamer tests.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::auth::{AppStatusChecker, TokenProvider};
use crate::context::StreamContext;
use crate::error::{BoxError, DialError};
use crate::transport::{CloseFrame, Connection, Dialer, Frame};

/// Structured log frame
pub(crate) fn entry(source: &str, message: &str) -> Frame {
    let payload = serde_json::json!({
        "source": source,
        "timestamp": 1_700_000_000.25,
        "message": message,
    });
    Frame::Text(payload.to_string())
}

pub(crate) fn text(line: &str) -> Frame {
    Frame::Text(line.to_string())
}

pub(crate) fn close(code: u16) -> Frame {
    Frame::Close(Some(CloseFrame::new(code, "")))
}

/// Plays back a fixed list of frames, then blocks until closed
pub(crate) struct ScriptedConnection {
    frames: Mutex<VecDeque<Frame>>,
    sent: Mutex<Vec<String>>,
    closes: Mutex<Vec<u16>>,
    closed: CancellationToken,
}

impl ScriptedConnection {
    pub(crate) fn new(frames: impl IntoIterator<Item = Frame>) -> Arc<Self> {
        Arc::new(Self {
            frames: Mutex::new(frames.into_iter().collect()),
            sent: Mutex::new(Vec::new()),
            closes: Mutex::new(Vec::new()),
            closed: CancellationToken::new(),
        })
    }

    /// Text frames sent by the client
    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Close codes sent by the client
    pub(crate) fn closes(&self) -> Vec<u16> {
        self.closes.lock().clone()
    }

    /// Frames never read
    pub(crate) fn remaining(&self) -> usize {
        self.frames.lock().len()
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn send_text(&self, text: String) -> Result<(), BoxError> {
        self.sent.lock().push(text);
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Frame>, BoxError> {
        let next = self.frames.lock().pop_front();
        match next {
            Some(frame) => Ok(Some(frame)),
            None => {
                self.closed.cancelled().await;
                Ok(None)
            }
        }
    }

    async fn close(&self, code: u16, _reason: &str) -> Result<(), BoxError> {
        self.closes.lock().push(code);
        self.closed.cancel();
        Ok(())
    }
}

/// Hands out scripted dial results in order.
///
/// Once the script runs out the context is cancelled, which ends a
/// following run.
pub(crate) struct ScriptedDialer {
    attempts: Mutex<VecDeque<Result<Arc<ScriptedConnection>, DialError>>>,
    headers: Mutex<Vec<Vec<(String, String)>>>,
    exhausted: CancellationToken,
}

impl ScriptedDialer {
    pub(crate) fn new(ctx: &StreamContext) -> Self {
        Self {
            attempts: Mutex::new(VecDeque::new()),
            headers: Mutex::new(Vec::new()),
            exhausted: ctx.token().clone(),
        }
    }

    pub(crate) fn connect(mut self, conn: Arc<ScriptedConnection>) -> Self {
        self.attempts.get_mut().push_back(Ok(conn));
        self
    }

    pub(crate) fn fail(mut self, err: DialError) -> Self {
        self.attempts.get_mut().push_back(Err(err));
        self
    }

    pub(crate) fn dial_count(&self) -> usize {
        self.headers.lock().len()
    }

    /// Authorization header of the nth dial
    pub(crate) fn bearer(&self, attempt: usize) -> Option<String> {
        self.headers.lock().get(attempt).and_then(|headers| {
            headers
                .iter()
                .find(|(name, _)| name == "Authorization")
                .map(|(_, value)| value.clone())
        })
    }
}

#[async_trait]
impl Dialer for ScriptedDialer {
    async fn dial(
        &self,
        _ctx: &StreamContext,
        _url: &str,
        headers: &[(String, String)],
    ) -> Result<Arc<dyn Connection>, DialError> {
        self.headers.lock().push(headers.to_vec());
        let next = self.attempts.lock().pop_front();
        match next {
            Some(Ok(conn)) => Ok(conn),
            Some(Err(err)) => Err(err),
            None => {
                self.exhausted.cancel();
                Err(DialError::new("connection refused"))
            }
        }
    }
}

/// Always returns the same token, counting calls
pub(crate) struct RecordingTokenProvider {
    token: String,
    calls: AtomicUsize,
}

impl RecordingTokenProvider {
    pub(crate) fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for RecordingTokenProvider {
    async fn refresh(&self, _ctx: &StreamContext) -> Result<String, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.token.clone())
    }
}

pub(crate) struct RecordingStatusChecker {
    failure: Option<String>,
    calls: AtomicUsize,
}

impl RecordingStatusChecker {
    pub(crate) fn healthy() -> Self {
        Self {
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AppStatusChecker for RecordingStatusChecker {
    async fn check(&self, _ctx: &StreamContext) -> Result<(), BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(reason) => Err(reason.clone().into()),
            None => Ok(()),
        }
    }
}

/// Writer whose contents stay readable after it is handed to the streamer
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub(crate) fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Output sink that is always gone
pub(crate) struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::from(io::ErrorKind::BrokenPipe))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
