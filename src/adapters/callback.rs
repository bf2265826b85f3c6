//! Adapts a Node-style `(args, callback)` operation into the
//! future-returning shape [`crate::circuit::Operation`] expects.
//!
//! Explicitly a thin, explicit-signature wrapper: the caller states the
//! argument and result types up front rather than this module trying to
//! detect a callback's arity or argument shape through reflection.

use std::sync::{Arc, Mutex};

use crate::circuit::BoxFuture;

/// A callback-style operation: takes its arguments plus a completion
/// callback, and returns immediately having scheduled the callback to run
/// later (on any thread).
pub type CallbackOperation<A, T, E> =
    Arc<dyn Fn(A, Box<dyn FnOnce(Result<T, E>) + Send>) + Send + Sync>;

/// Wrap a callback-style operation as a boxed future, so it can be used
/// wherever [`crate::circuit::Operation`] is expected.
pub fn adapt<A, T, E>(
    operation: CallbackOperation<A, T, E>,
) -> Arc<dyn Fn(A) -> BoxFuture<'static, Result<T, E>> + Send + Sync>
where
    A: Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    Arc::new(move |args: A| {
        let operation = Arc::clone(&operation);
        Box::pin(CallbackFuture::new(move |complete| {
            operation(args, complete);
        }))
    })
}

/// A future that resolves once the wrapped callback has been invoked
/// exactly once, backed by a parked waker rather than polling.
struct CallbackFuture<T, E> {
    state: Arc<Mutex<CallbackState<T, E>>>,
}

struct CallbackState<T, E> {
    result: Option<Result<T, E>>,
    waker: Option<std::task::Waker>,
}

impl<T, E> CallbackFuture<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn new<F>(start: F) -> Self
    where
        F: FnOnce(Box<dyn FnOnce(Result<T, E>) + Send>),
    {
        let state = Arc::new(Mutex::new(CallbackState {
            result: None,
            waker: None,
        }));
        let complete_state = Arc::clone(&state);
        start(Box::new(move |result| {
            let mut guard = complete_state.lock().unwrap();
            guard.result = Some(result);
            if let Some(waker) = guard.waker.take() {
                waker.wake();
            }
        }));
        Self { state }
    }
}

impl<T, E> std::future::Future for CallbackFuture<T, E> {
    type Output = Result<T, E>;

    fn poll(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        let mut guard = self.state.lock().unwrap();
        if let Some(result) = guard.result.take() {
            return std::task::Poll::Ready(result);
        }
        guard.waker = Some(cx.waker().clone());
        std::task::Poll::Pending
    }
}
