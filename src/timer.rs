//! Background periodic workers.
//!
//! Every recurring timer in this crate (bucket rotation, snapshot
//! publication, health-check probing, cooldown) follows the same shape as
//! the teacher's `disk_monitor`/`cleanup` background workers: a dedicated,
//! named OS thread sleeping in short increments so it notices shutdown
//! promptly, guarded by an `AtomicBool`. None of these threads are ever
//! joined by the owner at drop time, so a process can exit with timers
//! still "running" — matching the "must not keep the runtime alive"
//! requirement.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{JoinHandle, ThreadId};
use std::time::Duration;

/// The largest single sleep chunk a timer loop will block on before
/// re-checking its shutdown flag.
const SHUTDOWN_POLL_GRANULARITY: Duration = Duration::from_millis(250);

/// Handle to a recurring background timer.
///
/// `stop` is idempotent: the first call cancels the thread and returns
/// `true`; every subsequent call observes the timer already stopped and
/// returns `false` (spec §8: "two stops of the same timer return
/// truthy-then-falsy").
pub struct TimerHandle {
    shutdown: Arc<AtomicBool>,
    stopped: AtomicBool,
    join: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl TimerHandle {
    /// Spawn a named background thread that invokes `tick` every `period`
    /// until stopped.
    pub fn spawn<F>(name: impl Into<String>, period: Duration, mut tick: F) -> Arc<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let loop_shutdown = Arc::clone(&shutdown);
        let join = std::thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                Self::run_loop(&loop_shutdown, period, &mut tick);
            })
            .expect("failed to spawn circuit-runtime timer thread");
        let thread_id = join.thread().id();

        Arc::new(Self {
            shutdown,
            stopped: AtomicBool::new(false),
            join: Mutex::new(Some(join)),
            thread_id,
        })
    }

    fn run_loop<F>(shutdown: &AtomicBool, period: Duration, tick: &mut F)
    where
        F: FnMut(),
    {
        let mut remaining = period;
        loop {
            if shutdown.load(Ordering::Acquire) {
                return;
            }
            if remaining.is_zero() {
                tick();
                remaining = period;
                continue;
            }
            let chunk = remaining.min(SHUTDOWN_POLL_GRANULARITY);
            std::thread::sleep(chunk);
            remaining = remaining.saturating_sub(chunk);
        }
    }

    /// Cancel the timer. Returns whether this call actually stopped it.
    ///
    /// Safe to call from within the timer's own tick callback: joining a
    /// thread's own handle from inside itself deadlocks, so in that case
    /// this only signals shutdown and skips the join — the thread exits
    /// on its own once the callback returns and `run_loop` re-checks the
    /// flag.
    pub fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.shutdown.store(true, Ordering::Release);
        if std::thread::current().id() != self.thread_id {
            if let Some(handle) = self.join.lock().unwrap().take() {
                let _ = handle.join();
            }
        }
        true
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        // Best-effort: signal shutdown so the thread exits promptly even if
        // nobody called `stop()` explicitly. We deliberately do not join
        // here — joining in `Drop` on a thread that may itself be tearing
        // down would risk deadlock, and the spec requires these timers to
        // be process-exit-transparent regardless.
        self.shutdown.store(true, Ordering::Release);
    }
}
