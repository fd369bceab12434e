//! Exponential backoff between reconnect attempts.

use std::time::Duration;

use tokio::time::sleep;

use crate::context::{ContextError, StreamContext};

/// Reconnect delay that doubles up to a cap and resets after success.
///
/// Invariant: `initial <= current <= max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// `initial` is clamped to `max`
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay the next `wait` will sleep for
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Sleep for the current delay, or until the context is done
    pub async fn wait(&self, ctx: &StreamContext) -> Result<(), ContextError> {
        if self.current.is_zero() {
            return match ctx.err() {
                Some(err) => Err(err),
                None => Ok(()),
            };
        }

        tokio::select! {
            reason = ctx.done() => Err(reason),
            _ = sleep(self.current) => Ok(()),
        }
    }

    /// Double the delay, capped at max
    pub fn next(&mut self) {
        self.current = self.current.saturating_mul(2).min(self.max);
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(
            logtap_types::DEFAULT_BACKOFF_INITIAL,
            logtap_types::DEFAULT_BACKOFF_MAX,
        )
    }
}
