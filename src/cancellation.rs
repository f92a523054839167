//! Request-scoped cancellation
//!
//! Every public service and repository method takes a cancellation token.
//! The token is created per request by the caller and passed down explicitly;
//! nothing here is process-global.

use std::future::Future;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::errors::{WalletError, WalletResult};

/// Generic cancellation token trait
pub trait CancellationToken: Send + Sync + std::fmt::Debug {
    /// Check if cancellation has been requested
    fn is_cancelled(&self) -> bool;

    /// Request cancellation of the operation
    fn cancel(&self);
}

/// Simple atomic boolean-based cancellation token for synchronous code
#[derive(Debug, Clone, Default)]
pub struct AtomicCancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl AtomicCancellationToken {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CancellationToken for AtomicCancellationToken {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

/// Tokio watch-channel backed cancellation token
///
/// Clones share state: cancelling one clone cancels all of them. Awaiting
/// [`TokioCancellationToken::cancelled`] resolves once cancellation is requested.
#[derive(Debug, Clone)]
pub struct TokioCancellationToken {
    receiver: tokio::sync::watch::Receiver<bool>,
    sender: Arc<tokio::sync::watch::Sender<bool>>,
}

impl TokioCancellationToken {
    /// Create a new, not yet cancelled token
    pub fn new() -> Self {
        let (sender, receiver) = tokio::sync::watch::channel(false);
        Self {
            receiver,
            sender: Arc::new(sender),
        }
    }

    /// Create a token that is already cancelled
    pub fn cancelled_token() -> Self {
        let token = Self::new();
        token.cancel();
        token
    }

    /// Resolve once cancellation has been requested
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Fail fast with [`WalletError::Cancelled`] when cancellation was requested
    pub fn check(&self) -> WalletResult<()> {
        if self.is_cancelled() {
            Err(WalletError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Drive `future` to completion unless the token fires first
    pub async fn run<F, T>(&self, future: F) -> WalletResult<T>
    where
        F: Future<Output = WalletResult<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(WalletError::Cancelled),
            result = future => result,
        }
    }
}

impl Default for TokioCancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken for TokioCancellationToken {
    fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    fn cancel(&self) {
        self.sender.send_replace(true);
    }
}
