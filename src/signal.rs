//! One-shot fatal error signal.
//!
//! A [`FatalErrorCell`] is the write side: it accepts at most one
//! [`FatalError`]. Every [`FatalErrorSignal`] cloned from it resolves to that
//! same error. The signal never resolves successfully; if the cell is dropped
//! without a fault, awaiters stay pending.

use crate::error::FatalError;
use futures::future::{BoxFuture, FutureExt};
use std::future::IntoFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// Set-once write side of a [`FatalErrorSignal`].
#[derive(Debug)]
pub struct FatalErrorCell {
    claimed: AtomicBool,
    tx: watch::Sender<Option<FatalError>>,
}

impl FatalErrorCell {
    /// Create a cell together with its first signal handle.
    pub fn new() -> (Self, FatalErrorSignal) {
        let (tx, rx) = watch::channel(None);
        let cell = FatalErrorCell {
            claimed: AtomicBool::new(false),
            tx,
        };
        (cell, FatalErrorSignal { rx })
    }

    /// Claim the right to reject. Returns `true` for the first caller only.
    pub fn claim(&self) -> bool {
        !self.claimed.swap(true, Ordering::SeqCst)
    }

    /// Store `err` unless a value is already stored.
    ///
    /// Returns `true` if this call set the value.
    pub fn reject(&self, err: FatalError) -> bool {
        self.claimed.store(true, Ordering::SeqCst);
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(err);
            true
        })
    }
}

/// Future-like handle that resolves once the transport fails fatally.
///
/// Awaiting a clone is equivalent to calling [`wait`](Self::wait).
#[derive(Debug, Clone)]
pub struct FatalErrorSignal {
    rx: watch::Receiver<Option<FatalError>>,
}

impl FatalErrorSignal {
    /// Wait for the fatal error.
    ///
    /// Pends forever if the connection is released without ever faulting.
    pub async fn wait(&self) -> FatalError {
        let mut rx = self.rx.clone();
        let outcome = rx
            .wait_for(|slot| slot.is_some())
            .await
            .ok()
            .and_then(|slot| (*slot).clone());

        match outcome {
            Some(err) => err,
            None => std::future::pending().await,
        }
    }

    /// The fatal error, if one has been reported already.
    pub fn peek(&self) -> Option<FatalError> {
        self.rx.borrow().clone()
    }

    pub fn is_faulted(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

impl IntoFuture for FatalErrorSignal {
    type Output = FatalError;
    type IntoFuture = BoxFuture<'static, FatalError>;

    fn into_future(self) -> Self::IntoFuture {
        async move { self.wait().await }.boxed()
    }
}
