//! Primitives that collapse bursts of requests into a single downstream effect.
//!
//! [`SingleFlight`] serializes persistence writes: one write runs at a time and any number of
//! requests arriving meanwhile fold into exactly one trailing write. [`Debouncer`] delays a
//! per-key callback until a quiet period elapses, always running the most recently supplied one.

use std::{
    future::Future,
    hash::Hash,
    pin::pin,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use futures::{FutureExt, future::BoxFuture};
use tokio::{sync::Notify, task::AbortHandle, time::sleep};
use tracing::debug;

/// Outcome of a [`SingleFlight::run`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flight {
    /// This caller executed the job `runs` times (the initial run plus at most one trailing run
    /// per burst observed while running).
    Led { runs: usize },
    /// Another caller was already running; it will perform one more run on our behalf.
    Coalesced,
}

#[derive(Debug, Default)]
struct FlightState {
    in_flight: bool,
    pending: bool,
}

/// Single-flight executor with trailing coalesce.
#[derive(Debug, Default)]
pub struct SingleFlight {
    state: Mutex<FlightState>,
    idle: Notify,
}

/// Wakes waiters when the leader finishes, and resets the flags if it is dropped mid-run.
struct LeaderGuard<'a> {
    flight: &'a SingleFlight,
    completed: bool,
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            let mut state = self.flight.lock();
            state.in_flight = false;
            state.pending = false;
        }
        self.flight.idle.notify_waiters();
    }
}

impl SingleFlight {
    /// Create an idle executor.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FlightState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a run is currently executing.
    pub fn is_in_flight(&self) -> bool {
        self.lock().in_flight
    }

    /// Run `job`, or mark a trailing run if another caller is already running it.
    ///
    /// The job is expected to read the latest state each time it is invoked, so the trailing run
    /// observes every change made by the coalesced callers.
    pub async fn run<F, Fut>(&self, mut job: F) -> Flight
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        {
            let mut state = self.lock();
            if state.in_flight {
                state.pending = true;
                return Flight::Coalesced;
            }
            state.in_flight = true;
        }

        let mut guard = LeaderGuard {
            flight: self,
            completed: false,
        };
        let mut runs = 0;
        loop {
            job().await;
            runs += 1;

            // Leaving the flight must happen under the same lock that observed no pending run.
            let again = {
                let mut state = self.lock();
                if state.pending {
                    state.pending = false;
                    true
                } else {
                    state.in_flight = false;
                    false
                }
            };
            if !again {
                break;
            }
            debug!(runs, "running trailing coalesced job");
        }
        guard.completed = true;
        drop(guard);

        Flight::Led { runs }
    }

    /// Like [`SingleFlight::run`], but a coalesced caller also waits until the leader, including
    /// the trailing run it owes us, has finished.
    pub async fn run_settled<F, Fut>(&self, job: F) -> Flight
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let flight = self.run(job).await;
        if flight == Flight::Coalesced {
            self.wait_idle().await;
        }
        flight
    }

    /// Wait until no run is executing.
    pub async fn wait_idle(&self) {
        loop {
            let mut notified = pin!(self.idle.notified());
            notified.as_mut().enable();
            if !self.is_in_flight() {
                return;
            }
            notified.await;
        }
    }
}

type Callback = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send + Sync>;

struct PendingCall {
    generation: u64,
    callback: Callback,
    timer: Option<AbortHandle>,
}

/// Keyed trailing debounce with an explicit flush.
pub struct Debouncer<K> {
    quiet: Duration,
    pending: Arc<DashMap<K, PendingCall>>,
    generation: AtomicU64,
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
{
    /// Create a debouncer firing after `quiet` without new requests for a key.
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Quiet period applied to every key.
    pub fn quiet_period(&self) -> Duration {
        self.quiet
    }

    /// Schedule `callback` for `key`, replacing and cancelling any pending one.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule<F, Fut>(&self, key: K, callback: F)
    where
        F: FnOnce() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let entry = PendingCall {
            generation,
            callback: Box::new(move || callback().boxed()),
            timer: None,
        };

        if let Some(previous) = self.pending.insert(key.clone(), entry) {
            if let Some(timer) = previous.timer {
                timer.abort();
            }
            debug!(?key, "debounced call superseded");
        }

        let pending = self.pending.clone();
        let quiet = self.quiet;
        let timer_key = key.clone();
        let task = tokio::spawn(async move {
            sleep(quiet).await;
            let due = pending.remove_if(&timer_key, |_, call| call.generation == generation);
            if let Some((_, call)) = due {
                (call.callback)().await;
            }
        });

        // The timer may already have fired, or a newer call may have replaced ours.
        if let Some(mut call) = self.pending.get_mut(&key) {
            if call.generation == generation {
                call.timer = Some(task.abort_handle());
            }
        }
    }

    /// Cancel the timer for `key` and run its latest callback now.
    ///
    /// Returns `false` when nothing was pending.
    pub async fn flush(&self, key: &K) -> bool {
        let Some((_, call)) = self.pending.remove(key) else {
            return false;
        };
        if let Some(timer) = call.timer {
            timer.abort();
        }
        (call.callback)().await;
        true
    }

    /// Drop the pending callback for `key` without running it.
    pub fn cancel(&self, key: &K) -> bool {
        match self.pending.remove(key) {
            Some((_, call)) => {
                if let Some(timer) = call.timer {
                    timer.abort();
                }
                true
            }
            None => false,
        }
    }

    /// Whether a callback is waiting for `key`.
    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }
}
