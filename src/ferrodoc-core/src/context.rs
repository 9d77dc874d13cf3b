use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Caller-side deadline and cancellation carried alongside a request.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: Option<CancellationToken>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a deadline `timeout` from now
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }

    /// Time left until the deadline, zero once it has passed
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// True once the token fired or the deadline passed
    pub fn is_canceled(&self) -> bool {
        if let Some(token) = &self.cancel {
            if token.is_cancelled() {
                return true;
            }
        }
        matches!(self.deadline, Some(deadline) if Instant::now() >= deadline)
    }

    /// Resolves when the caller cancels or the deadline is reached.
    /// Never resolves for a context with neither.
    pub async fn canceled(&self) {
        match (&self.cancel, self.deadline) {
            (Some(token), Some(deadline)) => {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            (Some(token), None) => token.cancelled().await,
            (None, Some(deadline)) => tokio::time::sleep_until(deadline).await,
            (None, None) => std::future::pending::<()>().await,
        }
    }

    /// Derive a context for a single attempt. Keeps the cancellation token and
    /// the earlier of the two deadlines.
    pub fn child(&self, timeout: Duration) -> Context {
        let attempt_deadline = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < attempt_deadline => parent,
            _ => attempt_deadline,
        };
        Context {
            deadline: Some(deadline),
            cancel: self.cancel.clone(),
        }
    }
}
