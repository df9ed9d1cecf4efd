//! Cancellable per-room timers for Beatroom.
//!
//! A room has at most one outstanding timer at a time: either the
//! countdown before a round, or the maximum-duration timeout of a round in
//! progress. [`TimerRegistry`] stores them keyed by room, so scheduling a
//! new timer for a room aborts whatever was pending for it, and leaving or
//! aborting can cancel the pending one explicitly.
//!
//! # Firing is just another operation
//!
//! A timer that fires runs its future as an ordinary task. It does not get
//! any special access to room state: whatever it does must re-validate the
//! room the same way a player command would. That makes a stale timer
//! harmless even if it slipped past cancellation.
//!
//! # Testing
//!
//! Everything here runs on tokio's clock. Under
//! `#[tokio::test(start_paused = true)]` time only advances when the
//! runtime is idle, which turns countdowns and round timeouts into
//! deterministic steps.
//!
//! ```ignore
//! timers.schedule(room_id.clone(), TimerKind::Countdown, generation, countdown, async move {
//!     lobby.countdown_elapsed(room_id, generation).await;
//! });
//! ```
//!
//! # Generations
//!
//! Every timer carries the generation of the room state that asked for it.
//! Callers apply timer changes after their write lands, and two writers
//! can get there out of order. The registry never lets an older generation
//! replace or cancel a timer scheduled for a newer one.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, trace};

// ---------------------------------------------------------------------------
// Timer kinds
// ---------------------------------------------------------------------------

/// What a pending timer is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// The short countdown between "start" and the round beginning.
    Countdown,
    /// The maximum duration of a round before scoring is forced.
    RoundTimeout,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Countdown => write!(f, "countdown"),
            Self::RoundTimeout => write!(f, "round-timeout"),
        }
    }
}

/// Identifies one scheduled timer. Ids are never reused within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// A snapshot of a pending timer, returned by [`TimerRegistry::pending`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTimer {
    pub id: TimerId,
    pub kind: TimerKind,
    pub generation: u64,
    /// Time left until it fires. Zero if it's due but hasn't run yet.
    pub remaining: Duration,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct Entry {
    id: TimerId,
    kind: TimerKind,
    generation: u64,
    deadline: Instant,
    handle: JoinHandle<()>,
}

/// Owns every outstanding timer, at most one per key.
///
/// The lock is only held for map bookkeeping, never across an `.await`.
pub struct TimerRegistry<K> {
    timers: Arc<Mutex<HashMap<K, Entry>>>,
    next_id: AtomicU64,
}

impl<K> TimerRegistry<K>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Schedules `task` to run after `delay`, replacing any timer pending
    /// for `key` with the same or an older generation.
    ///
    /// Returns `None` without scheduling anything if the pending timer
    /// belongs to a newer generation. The replaced timer is aborted. When
    /// the new timer fires it removes itself from the registry *before*
    /// running `task`, so `task` may schedule the key's next timer without
    /// aborting itself.
    pub fn schedule<F>(
        &self,
        key: K,
        kind: TimerKind,
        generation: u64,
        delay: Duration,
        task: F,
    ) -> Option<TimerId>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // Registering under the lock means the task can't fire and miss
        // its own entry, even on a multi-threaded runtime.
        let mut timers = lock(&self.timers);
        let newer = timers
            .get(&key)
            .map(|pending| pending.generation)
            .filter(|pending| *pending > generation);
        if let Some(pending) = newer {
            debug!(%key, %kind, generation, pending, "newer timer already pending, not scheduling");
            return None;
        }

        let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let deadline = Instant::now() + delay;

        let registry = Arc::clone(&self.timers);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            time::sleep_until(deadline).await;

            let current = {
                let mut timers = lock(&registry);
                match timers.get(&task_key) {
                    Some(entry) if entry.id == id => {
                        timers.remove(&task_key);
                        true
                    }
                    _ => false,
                }
            };
            if !current {
                trace!(key = %task_key, %kind, "superseded timer woke up, ignoring");
                return;
            }

            debug!(key = %task_key, %kind, "timer fired");
            task.await;
        });

        if let Some(previous) = timers.insert(
            key.clone(),
            Entry {
                id,
                kind,
                generation,
                deadline,
                handle,
            },
        ) {
            previous.handle.abort();
            debug!(%key, replaced = %previous.kind, with = %kind, "pending timer replaced");
        } else {
            debug!(%key, %kind, generation, delay_ms = delay.as_millis() as u64, "timer scheduled");
        }

        Some(id)
    }

    /// Cancels the timer pending for `key`. Returns `true` if there was one.
    ///
    /// A timer whose task is already running has left the registry and is
    /// not interrupted.
    pub fn cancel(&self, key: &K) -> bool {
        let removed = lock(&self.timers).remove(key);
        match removed {
            Some(entry) => {
                entry.handle.abort();
                debug!(%key, kind = %entry.kind, "timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancels the timer pending for `key` unless it was scheduled for a
    /// generation newer than `generation`.
    pub fn cancel_through(&self, key: &K, generation: u64) -> bool {
        let removed = {
            let mut timers = lock(&self.timers);
            match timers.get(key) {
                Some(entry) if entry.generation <= generation => timers.remove(key),
                _ => None,
            }
        };
        match removed {
            Some(entry) => {
                entry.handle.abort();
                debug!(%key, kind = %entry.kind, generation, "timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Returns the timer pending for `key`, if any.
    pub fn pending(&self, key: &K) -> Option<PendingTimer> {
        let timers = lock(&self.timers);
        timers.get(key).map(|entry| PendingTimer {
            id: entry.id,
            kind: entry.kind,
            generation: entry.generation,
            remaining: entry.deadline.saturating_duration_since(Instant::now()),
        })
    }

    /// Number of pending timers.
    pub fn len(&self) -> usize {
        lock(&self.timers).len()
    }

    /// Returns `true` if no timers are pending.
    pub fn is_empty(&self) -> bool {
        lock(&self.timers).is_empty()
    }
}

impl<K> Default for TimerRegistry<K>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Drop for TimerRegistry<K> {
    fn drop(&mut self) {
        for (_, entry) in lock(&self.timers).drain() {
            entry.handle.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Milliseconds since the clock was created, on tokio's clock.
///
/// Used for round start times, countdown deadlines, and result submission times.
/// Because it reads `tokio::time::Instant`, a paused test runtime freezes
/// it too.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Starts a clock at zero.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Milliseconds elapsed since the clock started.
    pub fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    /// The timestamp `delay` from now.
    pub fn after_ms(&self, delay: Duration) -> u64 {
        self.now_ms() + delay.as_millis() as u64
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
