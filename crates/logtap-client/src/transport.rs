//! Seams between the stream client and the network.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::context::StreamContext;
use crate::error::{BoxError, DialError};

/// Close frame sent by either side
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl CloseFrame {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// A frame received from the server
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// Close without a status code is treated as a normal close
    Close(Option<CloseFrame>),
}

impl Frame {
    /// Raw payload bytes of a data frame
    pub fn payload(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(data) => data,
            Self::Close(_) => &[],
        }
    }
}

/// An open duplex connection
#[async_trait]
pub trait Connection: Send + Sync {
    async fn send_text(&self, text: String) -> Result<(), BoxError>;

    /// Next frame; `Ok(None)` when the stream ended without a close frame
    async fn recv(&self) -> Result<Option<Frame>, BoxError>;

    /// Send a close frame and shut the connection down
    async fn close(&self, code: u16, reason: &str) -> Result<(), BoxError>;
}

/// Opens connections to the log endpoint
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(
        &self,
        ctx: &StreamContext,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<Arc<dyn Connection>, DialError>;
}

/// Connection shared between the read loop and the cancellation watcher.
///
/// The close sequence runs at most once, whoever gets there first.
pub(crate) struct ConnectionHandle {
    conn: Arc<dyn Connection>,
    closed: AtomicBool,
}

impl ConnectionHandle {
    pub(crate) fn new(conn: Arc<dyn Connection>) -> Self {
        Self {
            conn,
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn connection(&self) -> &dyn Connection {
        self.conn.as_ref()
    }

    /// The peer already closed; nothing left for us to send
    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub(crate) async fn close_once(&self, code: u16, reason: &str) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.conn.close(code, reason).await {
            tracing::debug!(error = %e, "failed to close connection");
        }
    }
}
