//! Per-request context.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::Error;
use crate::error::Result;

/// Carries the request's cancellation flag. Every suspension point of the core is raced against it.
///
/// Clones share the flag: cancelling any of them cancels the request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    cancel_tx: Arc<watch::Sender<bool>>,
}

/// Outcome of an operation bounded by a soft deadline.
#[derive(Debug)]
pub enum Deadline<T> {
    Done(T),
    Expired,
}

impl Default for RequestContext {
    fn default() -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            cancel_tx: Arc::new(cancel_tx),
        }
    }
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        }
        else {
            Ok(())
        }
    }

    /// Resolves once the request is cancelled.
    pub async fn cancelled(&self) {
        let mut cancel_rx = self.cancel_tx.subscribe();
        // The sender lives as long as `self`, so the wait only ends on cancellation.
        let _ = cancel_rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Run `fut` unless the request is cancelled first.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Error::Cancelled),
            out = fut => Ok(out),
        }
    }

    /// Like [`run`](Self::run), but gives up quietly once `deadline` passes. Expiry is not an error.
    pub async fn run_within<F>(&self, deadline: Duration, fut: F) -> Result<Deadline<F::Output>>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Error::Cancelled),
            out = tokio::time::timeout(deadline, fut) => Ok(match out {
                Ok(v) => Deadline::Done(v),
                Err(_) => Deadline::Expired,
            }),
        }
    }
}
