//! One-Shot Operation Completions
//!
//! Every asynchronous submission to the backend returns a [`Completion`]: a
//! future that resolves exactly once with the operation outcome. The backend
//! side holds the matching [`Completer`] and consumes it when the operation
//! finishes. Because both halves are consumed by value, a completion can
//! neither fire twice nor be observed twice.
//!
//! If the backend drops the completer without completing, the future resolves
//! to [`BackendError::Aborted`], so the waiting caller still gets exactly one
//! outcome.

use crate::client::BackendError;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Creates a linked completer/completion pair.
pub fn completion<T>() -> (Completer<T>, Completion<T>) {
    let (tx, rx) = oneshot::channel();
    (Completer { tx }, Completion { rx })
}

/// The backend half: resolves the paired [`Completion`].
#[derive(Debug)]
pub struct Completer<T> {
    tx: oneshot::Sender<Result<T, BackendError>>,
}

impl<T> Completer<T> {
    /// Resolves the completion. A no-op when nobody is waiting anymore.
    pub fn complete(self, result: Result<T, BackendError>) {
        let _ = self.tx.send(result);
    }
}

/// The caller half: a future yielding the operation outcome.
#[derive(Debug)]
pub struct Completion<T> {
    rx: oneshot::Receiver<Result<T, BackendError>>,
}

impl<T> Completion<T> {
    /// A completion that is already resolved, for submissions rejected up front.
    pub fn ready(result: Result<T, BackendError>) -> Self {
        let (completer, completion) = completion();
        completer.complete(result);
        completion
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T, BackendError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(BackendError::Aborted(
                    "operation dropped before completion".to_string(),
                ))
            })
        })
    }
}
