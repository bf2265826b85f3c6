//! The invocation pipeline: timeout enforcement, outcome classification,
//! and fallback dispatch (spec §4.3).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use asupersync::time::{timeout, wall_now};

use crate::error::{CircuitOpenError, ExecError, TimeoutError};
use crate::events::BreakerEvent;

/// A boxed, `'static`, `Send` future — the shape every operation and
/// fallback closure must return. Kept explicit rather than hidden behind
/// `async fn` in a trait so `Circuit` stays object-safe and never needs to
/// infer argument shape through reflection.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An operation invoked through a `Circuit`: takes owned arguments, returns
/// a boxed future resolving to the caller's own `Result<T, E>`.
pub type Operation<A, T, E> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

/// Classifies an operation error as a breaker-tripping failure or not.
/// Rejections classified `false` still propagate to the caller as `Err` —
/// this only affects whether the outcome counts toward the open-circuit
/// threshold (spec §9: "the default predicate treats every rejection as a
/// failure; callers may override it for expected, non-systemic errors").
pub type IsFailure<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Decides, at short-circuit time, whether the breaker wrapping this
/// circuit is currently open. Injected by `Breaker` rather than owned here
/// so `Circuit` has no knowledge of state-machine internals.
pub type IsOpen = Arc<dyn Fn() -> bool + Send + Sync>;

fn default_is_failure<E>() -> IsFailure<E> {
    Arc::new(|_err| true)
}

/// The classified result of one `Circuit::exec` call, before it is turned
/// into the caller-facing `Result<T, ExecError<E>>`.
pub enum ExecOutcome<T, E> {
    Success(T),
    /// An operation error that counts toward the open-circuit threshold.
    Failure(E),
    /// An operation error that does not count toward the threshold
    /// (`is_failure` returned `false`).
    NonCountingFailure(E),
    TimedOut,
    ShortCircuited,
}

/// Wraps a fallible, latency-bounded operation with a deadline, an
/// optional fallback, and breaker short-circuiting.
///
/// `Circuit` itself holds no mutable state: the open/closed decision and
/// all outcome bookkeeping live in `Breaker`, which supplies `is_open` and
/// an event sink at construction time. This keeps the hot `exec` path free
/// of anything beyond a handful of `Arc` clones and one channel send.
pub struct Circuit<A, T, E> {
    operation: Operation<A, T, E>,
    fallback: Option<Operation<A, T, E>>,
    is_failure: IsFailure<E>,
    is_open: IsOpen,
    timeout: Duration,
    events: Arc<dyn Fn(BreakerEvent) + Send + Sync>,
}

impl<A, T, E> Circuit<A, T, E>
where
    A: Clone + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    #[must_use]
    pub fn new(
        operation: Operation<A, T, E>,
        is_open: IsOpen,
        timeout: Duration,
        events: Arc<dyn Fn(BreakerEvent) + Send + Sync>,
    ) -> Self {
        Self {
            operation,
            fallback: None,
            is_failure: default_is_failure(),
            is_open,
            timeout,
            events,
        }
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: Operation<A, T, E>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    #[must_use]
    pub fn with_is_failure(mut self, is_failure: IsFailure<E>) -> Self {
        self.is_failure = is_failure;
        self
    }

    /// Run the wrapped operation once, subject to the configured deadline
    /// and breaker state.
    ///
    /// Returns `(outcome, run_time_ms)` so the caller (`Breaker::exec`) can
    /// record the outcome against the rolling window and the generation it
    /// was observed under, without `Circuit` needing to know about either.
    pub async fn exec(&self, args: A) -> (ExecOutcome<T, E>, u32) {
        (self.events)(BreakerEvent::Exec);

        if (self.is_open)() {
            return (ExecOutcome::ShortCircuited, 0);
        }

        let start = Instant::now();
        let outcome = match timeout(wall_now(), self.timeout, (self.operation)(args)).await {
            Ok(Ok(value)) => ExecOutcome::Success(value),
            Ok(Err(err)) => {
                if (self.is_failure)(&err) {
                    ExecOutcome::Failure(err)
                } else {
                    ExecOutcome::NonCountingFailure(err)
                }
            }
            Err(_elapsed) => ExecOutcome::TimedOut,
        };
        (outcome, elapsed_ms(start))
    }

    /// Dispatch the fallback for a failed/timed-out/short-circuited
    /// outcome. Run independently of `exec` so `Breaker` can decide, after
    /// recording the primary outcome against the window, whether a
    /// fallback result or the original error reaches the caller.
    pub async fn run_fallback(&self, args: A) -> Option<Result<T, E>> {
        match &self.fallback {
            Some(fallback) => Some(fallback(args).await),
            None => None,
        }
    }

    #[must_use]
    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

fn elapsed_ms(start: Instant) -> u32 {
    let millis = start.elapsed().as_millis();
    u32::try_from(millis).unwrap_or(u32::MAX)
}

impl<T, E> ExecOutcome<T, E> {
    /// Convert a primary outcome plus an optional fallback result into the
    /// value/error the caller of `Breaker::exec` ultimately receives.
    pub fn into_exec_result(
        self,
        fallback_result: Option<Result<T, E>>,
        name: Option<&str>,
        fail_percentage: f64,
        threshold: f64,
    ) -> Result<T, ExecError<E>> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(err) | Self::NonCountingFailure(err) => match fallback_result {
                Some(Ok(value)) => Ok(value),
                // A fallback that itself errors surfaces its own error, not
                // the primary outcome's — the fallback ran and resolved,
                // its result (success or failure) is what the caller sees
                // (spec §7: "Fallback errors are surfaced").
                Some(Err(fallback_err)) => Err(ExecError::Operation(fallback_err)),
                None => Err(ExecError::Operation(err)),
            },
            Self::TimedOut => match fallback_result {
                Some(Ok(value)) => Ok(value),
                Some(Err(fallback_err)) => Err(ExecError::Operation(fallback_err)),
                None => Err(ExecError::Timeout(TimeoutError)),
            },
            Self::ShortCircuited => match fallback_result {
                Some(Ok(value)) => Ok(value),
                Some(Err(fallback_err)) => Err(ExecError::Operation(fallback_err)),
                None => Err(ExecError::CircuitOpen(CircuitOpenError {
                    name: name.map(str::to_string),
                    fail_percentage,
                    threshold: threshold * 100.0,
                })),
            },
        }
    }
}
