use std::io::{self, Write};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::TailBuffer;

/// Per-connection routing of lines between the tail buffer and the writer.
///
/// While the tail is being collected, lines go into a [`TailBuffer`] so only
/// the last `tail` of them are shown. The buffer is flushed when the prefetch
/// window elapses, when it fills up while following, or at the end of the
/// connection. After that every line is written straight through.
pub struct ConsumeState<'a, W: Write + ?Sized> {
    buffer: TailBuffer,
    writer: &'a mut W,
    tail: usize,
    follow: bool,

    /// Set once the tail has been written; never reset within a connection
    flushed: bool,

    /// When the prefetch window closes, if still pending
    flush_deadline: Option<Instant>,
}

impl<'a, W: Write + ?Sized> ConsumeState<'a, W> {
    /// `already_flushed` is true when an earlier connection of the same run
    /// already showed the tail; it must not be collected or shown again.
    pub fn new(
        tail: usize,
        follow: bool,
        prefetch: Duration,
        writer: &'a mut W,
        already_flushed: bool,
    ) -> Self {
        let flush_deadline = if tail > 0 && !prefetch.is_zero() && !already_flushed {
            Some(Instant::now() + prefetch)
        } else {
            None
        };

        Self {
            buffer: TailBuffer::new(tail),
            writer,
            tail,
            follow,
            flushed: tail == 0 || already_flushed,
            flush_deadline,
        }
    }

    /// Deadline for the next read: the sooner of the pending flush deadline
    /// and the caller's own deadline.
    pub fn read_deadline(&self, ctx_deadline: Option<Instant>) -> Option<Instant> {
        match (self.flush_deadline, ctx_deadline) {
            (Some(flush), Some(ctx)) => Some(flush.min(ctx)),
            (flush, ctx) => flush.or(ctx),
        }
    }

    /// Pending flush deadline, if the prefetch window is still open
    pub fn flush_deadline(&self) -> Option<Instant> {
        self.flush_deadline
    }

    /// The prefetch window elapsed: show whatever tail arrived.
    ///
    /// Returns whether reading should continue.
    pub fn handle_flush_timeout(&mut self) -> io::Result<bool> {
        self.flush_deadline = None;
        if !self.flushed {
            debug!(lines = self.buffer.len(), "Prefetch window elapsed, showing tail");
            self.buffer.flush(&mut *self.writer)?;
            self.flushed = true;
        }
        Ok(self.follow)
    }

    /// Route one formatted line
    pub fn process_line(&mut self, line: String) -> io::Result<()> {
        if self.tail > 0 && !self.flushed {
            self.buffer.add(line);
            // Enough lines arrived; no point waiting out the window
            if self.flush_deadline.is_none() && self.buffer.len() >= self.tail && self.follow {
                self.buffer.flush(&mut *self.writer)?;
                self.flushed = true;
            }
            return Ok(());
        }

        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")
    }

    /// Flush anything still buffered; called when the connection ends.
    pub fn flush_remaining(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.buffer.flush(&mut *self.writer)?;
        self.flushed = true;
        Ok(())
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Lines currently held back
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
