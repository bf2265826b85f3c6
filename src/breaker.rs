//! The breaker state machine: closed / open / healing, with generation
//! tags to discard stale in-flight outcomes after a reopen (spec §4.4).

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use asupersync::runtime::RuntimeBuilder;
use tracing::{debug, info, warn};

use crate::circuit::{BoxFuture, Circuit, ExecOutcome, IsFailure, Operation};
use crate::config::BreakerConfig;
use crate::error::ExecError;
use crate::events::{BreakerEvent, Listeners};
use crate::registry::GlobalRegistry;
use crate::stats::Stats;
use crate::timer::TimerHandle;

/// An async health probe used to decide when a healing breaker may close
/// again. Returning `Ok(())` closes the circuit; `Err` keeps it open and
/// schedules another probe after `health_check_interval`.
pub type HealthCheck = Arc<dyn Fn() -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// Mutable state protected by a single mutex, covering the
/// record-then-threshold-check critical section (spec §4.4: "the
/// transition to open must be observed atomically with the triggering
/// outcome, never interleaved with a concurrent exec").
///
/// `open` is duplicated into `BreakerInner::is_open_flag` as a plain
/// `AtomicBool` so `Circuit::exec`'s short-circuit check never has to take
/// this mutex; every writer updates both under the same critical section.
struct BreakerCore {
    open: bool,
    generation: u64,
    healing_timer: Option<Arc<TimerHandle>>,
}

/// A circuit breaker wrapping a single fallible, latency-bounded
/// operation.
///
/// Cheap to clone: internally `Arc`-wrapped, safe to share across threads
/// and tasks. Construction goes through [`Breaker::builder`].
pub struct Breaker<A, T, E> {
    inner: Arc<BreakerInner<A, T, E>>,
}

impl<A, T, E> Clone for Breaker<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct BreakerInner<A, T, E> {
    name: String,
    config: BreakerConfig,
    circuit: Circuit<A, T, E>,
    stats: Arc<Stats>,
    events: Listeners<BreakerEvent>,
    health_check: Option<HealthCheck>,
    core: Mutex<BreakerCore>,
    is_open_flag: Arc<std::sync::atomic::AtomicBool>,
    destroyed: std::sync::atomic::AtomicBool,
}

/// Builds a [`Breaker`], exposing every [`BreakerConfig`] field plus the
/// closures (`health_check`, `fallback`, `is_failure`) that cannot live in
/// a plain-data config struct.
pub struct BreakerBuilder<A, T, E> {
    config: BreakerConfig,
    operation: Operation<A, T, E>,
    fallback: Option<Operation<A, T, E>>,
    is_failure: Option<IsFailure<E>>,
    health_check: Option<HealthCheck>,
}

impl<A, T, E> BreakerBuilder<A, T, E>
where
    A: Clone + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    #[must_use]
    pub fn new(operation: Operation<A, T, E>) -> Self {
        Self {
            config: BreakerConfig::default(),
            operation,
            fallback: None,
            is_failure: None,
            health_check: None,
        }
    }

    #[must_use]
    pub fn config(mut self, config: BreakerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    #[must_use]
    pub fn fallback(mut self, fallback: Operation<A, T, E>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    #[must_use]
    pub fn is_failure(mut self, is_failure: IsFailure<E>) -> Self {
        self.is_failure = Some(is_failure);
        self
    }

    #[must_use]
    pub fn health_check(mut self, health_check: HealthCheck) -> Self {
        self.health_check = Some(health_check);
        self
    }

    pub fn build(self) -> crate::error::Result<Breaker<A, T, E>> {
        self.config.validate()?;

        let stats = Stats::new(&self.config);
        let events: Listeners<BreakerEvent> = Listeners::new();

        let core = Mutex::new(BreakerCore {
            open: false,
            generation: 0,
            healing_timer: None,
        });

        let is_open_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let is_open = {
            let flag = Arc::clone(&is_open_flag);
            Arc::new(move || flag.load(Ordering::Acquire)) as crate::circuit::IsOpen
        };

        // `Circuit` takes an event sink for the `Exec` event it emits
        // internally; `Breaker::exec` also emits its own `Exec` event for
        // subscribers, so the sink handed to `Circuit` is a no-op to avoid
        // double delivery.
        let events_sink: Arc<dyn Fn(BreakerEvent) + Send + Sync> = Arc::new(|_event| {});

        let mut circuit = Circuit::new(self.operation, is_open, self.config.timeout, events_sink);
        if let Some(fallback) = self.fallback {
            circuit = circuit.with_fallback(fallback);
        }
        if let Some(is_failure) = self.is_failure {
            circuit = circuit.with_is_failure(is_failure);
        }

        let inner = Arc::new(BreakerInner {
            name: self.config.name.clone(),
            config: self.config.clone(),
            circuit,
            stats,
            events,
            health_check: self.health_check,
            core,
            is_open_flag,
            destroyed: std::sync::atomic::AtomicBool::new(false),
        });

        let breaker = Breaker { inner };

        if breaker.inner.config.register_global {
            GlobalRegistry::global().register(breaker.clone().into_dyn_handle());

            // Forward this breaker's own snapshot events onto the
            // registry's raw feed, so a dashboard adapter subscribed
            // globally sees every registered breaker's snapshots without
            // holding a handle to each one individually (spec §4.5).
            let name = breaker.inner.name.clone();
            breaker.inner.stats.listeners.subscribe(move |event| {
                if let crate::events::StatsEvent::Snapshot(stats) = event {
                    GlobalRegistry::global().publish_snapshot(&name, stats.clone());
                }
            });
        }

        Ok(breaker)
    }
}

impl<A, T, E> Breaker<A, T, E>
where
    A: Clone + Send + 'static,
    T: Send + 'static,
    E: std::fmt::Debug + Send + 'static,
{
    #[must_use]
    pub fn builder(operation: Operation<A, T, E>) -> BreakerBuilder<A, T, E> {
        BreakerBuilder::new(operation)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.core.lock().unwrap().open
    }

    #[must_use]
    pub fn stats(&self) -> &Arc<Stats> {
        &self.inner.stats
    }

    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&BreakerEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(listener);
    }

    fn emit(&self, event: BreakerEvent) {
        self.inner.events.notify(&event);
    }

    /// Invoke the wrapped operation once.
    pub async fn exec(&self, args: A) -> Result<T, ExecError<E>> {
        let generation_at_start = self.inner.core.lock().unwrap().generation;

        self.emit(BreakerEvent::Exec);
        let (outcome, run_time_ms) = self.inner.circuit.exec(args.clone()).await;

        let stale = self.inner.core.lock().unwrap().generation != generation_at_start;

        let fallback_result = match &outcome {
            ExecOutcome::Failure(_) | ExecOutcome::NonCountingFailure(_) | ExecOutcome::TimedOut
                if self.inner.circuit.has_fallback() =>
            {
                self.inner.circuit.run_fallback(args).await
            }
            ExecOutcome::ShortCircuited if self.inner.circuit.has_fallback() => {
                self.inner.circuit.run_fallback(args).await
            }
            _ => None,
        };

        if !stale {
            self.record_outcome(&outcome, run_time_ms);
        } else {
            debug!(
                breaker = %self.inner.name,
                "discarding outcome from a stale generation after reopen"
            );
        }

        let (fail_percentage, threshold) = self.current_fail_percentage_and_threshold();
        outcome.into_exec_result(
            fallback_result,
            Some(&self.inner.name),
            fail_percentage,
            threshold,
        )
    }

    fn current_fail_percentage_and_threshold(&self) -> (f64, f64) {
        let ratio = self.inner.stats.success_ratio();
        ((1.0 - ratio) * 100.0, self.inner.config.threshold)
    }

    /// Record the outcome against the rolling window, emit its event, then
    /// run the threshold check. The check runs after *every* recorded
    /// outcome, not just failing ones (spec §4.4: "on every update") — a
    /// string of failures can cross the threshold and have it discovered
    /// only once a later success (or short circuit) re-evaluates the
    /// ratio, so skipping the check on non-failing outcomes would leave
    /// the breaker closed past the point the literal rule requires it to
    /// open.
    fn record_outcome(&self, outcome: &ExecOutcome<T, E>, run_time_ms: u32) {
        match outcome {
            ExecOutcome::Success(_) | ExecOutcome::NonCountingFailure(_) => {
                self.inner.stats.record_success(run_time_ms);
                self.emit(BreakerEvent::Success { run_time_ms });
            }
            ExecOutcome::Failure(err) => {
                self.inner.stats.record_failure(run_time_ms);
                let generation = self.inner.core.lock().unwrap().generation;
                self.emit(BreakerEvent::Failure {
                    run_time_ms,
                    message: format!("{err:?}"),
                    generation,
                });
            }
            ExecOutcome::TimedOut => {
                self.inner.stats.record_timeout(run_time_ms);
                let generation = self.inner.core.lock().unwrap().generation;
                self.emit(BreakerEvent::Timeout {
                    run_time_ms,
                    generation,
                });
            }
            ExecOutcome::ShortCircuited => {
                self.inner.stats.record_short_circuit();
            }
        }
        self.maybe_trip();
    }

    /// Open the circuit if the rolling window has enough volume and its
    /// success ratio has fallen below the configured threshold (spec
    /// §4.4): `total > wait_threshold && !open && successful/total <
    /// threshold`.
    fn maybe_trip(&self) {
        let total = self.inner.stats.total_requests();
        if total <= self.inner.config.wait_threshold {
            return;
        }
        let ratio = self.inner.stats.success_ratio();
        if ratio >= self.inner.config.threshold {
            return;
        }

        let mut core = self.inner.core.lock().unwrap();
        if core.open {
            return;
        }
        core.open = true;
        core.generation += 1;
        self.inner.is_open_flag.store(true, Ordering::Release);
        drop(core);

        warn!(breaker = %self.inner.name, ratio, "opening circuit");
        self.emit(BreakerEvent::CircuitOpen);
        self.start_healing();
    }

    /// Close the circuit and reset the rolling window so the newly closed
    /// breaker starts from a clean slate (spec §4.4: "Stats reset on every
    /// OPEN→CLOSED transition"). The generation counter is left untouched
    /// here: it increments only on the CLOSED→OPEN transition (spec §3.5/
    /// §4.4: "`circuitGeneration++` on every CLOSED→OPEN transition"), so
    /// stale in-flight calls are discarded by the *next* `open`/`maybe_trip`,
    /// not by `close` itself.
    pub fn close(&self) {
        let mut core = self.inner.core.lock().unwrap();
        if !core.open {
            return;
        }
        core.open = false;
        self.inner.is_open_flag.store(false, Ordering::Release);
        if let Some(timer) = core.healing_timer.take() {
            timer.stop();
        }
        drop(core);

        self.inner.stats.reset();
        info!(breaker = %self.inner.name, "closing circuit");
        self.emit(BreakerEvent::CircuitClosed);
    }

    /// Force the circuit open without waiting for the threshold to trip
    /// naturally. Exposed for callers that want to fail fast on an
    /// external signal (spec §9).
    pub fn open(&self) {
        let mut core = self.inner.core.lock().unwrap();
        if core.open {
            return;
        }
        core.open = true;
        core.generation += 1;
        self.inner.is_open_flag.store(true, Ordering::Release);
        drop(core);

        self.emit(BreakerEvent::CircuitOpen);
        self.start_healing();
    }

    fn start_healing(&self) {
        let health_check = self.inner.health_check.clone();
        let breaker = self.clone();
        let period = match &health_check {
            Some(_) => self.inner.config.health_check_interval,
            None => self.inner.config.circuit_duration,
        };

        let timer = TimerHandle::spawn(
            format!("circuit-runtime-heal-{}", self.inner.name),
            period,
            move || breaker.heal_tick(health_check.clone()),
        );
        self.inner.core.lock().unwrap().healing_timer = Some(timer);
    }

    fn heal_tick(&self, health_check: Option<HealthCheck>) {
        match health_check {
            None => self.close(),
            Some(probe) => {
                let runtime = match RuntimeBuilder::new().build() {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        warn!(breaker = %self.inner.name, ?err, "failed to build health-check runtime");
                        return;
                    }
                };
                match runtime.block_on(probe()) {
                    Ok(()) => self.close(),
                    Err(message) => {
                        self.emit(BreakerEvent::HealthCheckFailed {
                            message: message.clone(),
                        });
                        debug!(breaker = %self.inner.name, message, "health check still failing");
                    }
                }
            }
        }
    }

    /// Tear down this breaker: stop its statistics timers, stop any active
    /// healing timer, deregister it from the global registry, and drop
    /// every event subscriber (spec §9, Open Question: `destroy()` must
    /// stop every timer it owns so a destroyed breaker cannot keep the
    /// process alive or keep publishing snapshots; spec §8: "destroy() is
    /// idempotent; subsequent exec still resolves but no events reach
    /// deregistered listeners").
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.stats.stop_rotation();
        self.inner.stats.stop_snapshot();
        if let Some(timer) = self.inner.core.lock().unwrap().healing_timer.take() {
            timer.stop();
        }
        if self.inner.config.register_global {
            GlobalRegistry::global().deregister(&self.inner.name);
        }
        self.inner.events.clear();
        self.inner.stats.listeners.clear();
    }

    fn into_dyn_handle(self) -> crate::registry::BreakerHandle {
        crate::registry::BreakerHandle {
            name: self.inner.name.clone(),
            stats: Arc::clone(&self.inner.stats),
        }
    }
}

impl<A, T, E> Drop for BreakerInner<A, T, E> {
    fn drop(&mut self) {
        self.stats.stop_rotation();
        self.stats.stop_snapshot();
        if let Some(timer) = self.core.lock().unwrap().healing_timer.take() {
            timer.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn op_always_ok() -> Operation<(), u32, String> {
        Arc::new(|_args: ()| Box::pin(async { Ok(7) }) as BoxFuture<'static, Result<u32, String>>)
    }

    fn op_always_err() -> Operation<(), u32, String> {
        Arc::new(|_args: ()| {
            Box::pin(async { Err("boom".to_string()) }) as BoxFuture<'static, Result<u32, String>>
        })
    }

    #[test]
    fn builder_rejects_invalid_config() {
        let mut config = BreakerConfig::default();
        config.threshold = 2.0;
        config.register_global = false;
        let result = Breaker::builder(op_always_ok()).config(config).build();
        assert!(result.is_err());
    }

    #[test]
    fn closed_breaker_runs_operation_and_returns_value() {
        let mut config = BreakerConfig::default();
        config.register_global = false;
        let breaker = Breaker::builder(op_always_ok()).config(config).build().unwrap();

        let runtime = RuntimeBuilder::new().build().unwrap();
        let result = runtime.block_on(breaker.exec(()));
        assert_eq!(result.unwrap(), 7);
        assert!(!breaker.is_open());
        breaker.destroy();
    }

    #[test]
    fn trips_open_after_enough_failures_past_wait_threshold() {
        let mut config = BreakerConfig::default();
        config.register_global = false;
        config.wait_threshold = 2;
        config.threshold = 0.5;
        let breaker = Breaker::builder(op_always_err()).config(config).build().unwrap();
        breaker.inner.stats.stop_rotation();
        breaker.inner.stats.stop_snapshot();

        let runtime = RuntimeBuilder::new().build().unwrap();
        for _ in 0..5 {
            let _ = runtime.block_on(breaker.exec(()));
        }

        assert!(breaker.is_open());
        breaker.destroy();
    }

    #[test]
    fn open_breaker_short_circuits_without_calling_operation() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_for_op = Arc::clone(&calls);
        let op: Operation<(), u32, String> = Arc::new(move |_args: ()| {
            calls_for_op.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(1) }) as BoxFuture<'static, Result<u32, String>>
        });

        let mut config = BreakerConfig::default();
        config.register_global = false;
        let breaker = Breaker::builder(op).config(config).build().unwrap();
        breaker.open();

        let runtime = RuntimeBuilder::new().build().unwrap();
        let result = runtime.block_on(breaker.exec(()));
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        breaker.destroy();
    }

    #[test]
    fn threshold_check_runs_on_a_trailing_success_not_only_on_failures() {
        // wait_threshold=4, threshold=0.5, sequence F,F,F,F,S: at the 5th
        // event total=5 > 4 and ratio=1/5=0.2 < 0.5, so the breaker must
        // open on that trailing success, not stay closed until the next
        // failure.
        let calls = Arc::new(AtomicU32::new(0));
        let calls_for_op = Arc::clone(&calls);
        let op: Operation<(), u32, String> = Arc::new(move |_args: ()| {
            let n = calls_for_op.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if n < 4 {
                    Err("boom".to_string())
                } else {
                    Ok(1)
                }
            }) as BoxFuture<'static, Result<u32, String>>
        });

        let mut config = BreakerConfig::default();
        config.register_global = false;
        config.wait_threshold = 4;
        config.threshold = 0.5;
        let breaker = Breaker::builder(op).config(config).build().unwrap();
        breaker.inner.stats.stop_rotation();
        breaker.inner.stats.stop_snapshot();

        let runtime = RuntimeBuilder::new().build().unwrap();
        for _ in 0..5 {
            let _ = runtime.block_on(breaker.exec(()));
        }

        assert!(breaker.is_open(), "the 5th event (a success) must trip the breaker");
        breaker.destroy();
    }

    #[test]
    fn generation_bumps_only_on_the_closed_to_open_transition() {
        let mut config = BreakerConfig::default();
        config.register_global = false;
        let breaker = Breaker::builder(op_always_ok()).config(config).build().unwrap();

        let initial = breaker.inner.core.lock().unwrap().generation;
        breaker.open();
        let after_open = breaker.inner.core.lock().unwrap().generation;
        assert_eq!(after_open, initial + 1, "open() must bump the generation exactly once");

        breaker.close();
        let after_close = breaker.inner.core.lock().unwrap().generation;
        assert_eq!(after_close, after_open, "close() must not bump the generation");

        breaker.open();
        let after_second_open = breaker.inner.core.lock().unwrap().generation;
        assert_eq!(after_second_open, after_open + 1, "a later open() bumps it again");
        breaker.destroy();
    }
}
