//! Quiet-interval debouncing for live field edits
//!
//! [`Debouncer`] holds the pending value and its deadline so an event loop
//! can `select!` on it alongside other sources.

use std::time::Duration;

use tokio::time::Instant;

pub struct Debouncer {
    quiet: Duration,
    pending: Option<String>,
    deadline: Option<Instant>,
    last_emitted: Option<String>,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: None,
            deadline: None,
            last_emitted: None,
        }
    }

    /// Replace any pending value and restart the quiet interval
    pub fn push(&mut self, value: String) {
        self.pending = Some(value);
        self.deadline = Some(Instant::now() + self.quiet);
    }

    /// Drop the pending value without emitting it
    pub fn cancel(&mut self) {
        self.pending = None;
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Take the settled value once the deadline has passed.
    ///
    /// Returns `None` before the deadline, and also when the settled value
    /// equals the last one emitted.
    pub fn take_ready(&mut self) -> Option<String> {
        let deadline = self.deadline?;
        if Instant::now() < deadline {
            return None;
        }
        self.deadline = None;
        let value = self.pending.take()?;
        if self.last_emitted.as_deref() == Some(value.as_str()) {
            return None;
        }
        self.last_emitted = Some(value.clone());
        Some(value)
    }

    /// Resolves when the pending deadline passes; never resolves when idle
    pub async fn settled(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    }
}
