/*! Cancellable deferred callbacks.

`TimerHost` is the only way the scheduler touches time: it reads the local
wall clock and arms callbacks after a delay. Two hosts are provided:

- `TokioTimers`: each timer is a spawned task sleeping on the runtime's
  monotonic clock; cancelling aborts the task.
- `ManualClock`: a simulated clock. Nothing fires until `advance` is called,
  which runs due callbacks in deadline order on the calling thread.
*/

use chrono::{DateTime, Local};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Opaque identity of an armed timer. Never reused within one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

pub trait TimerHost: Send + Sync {
    /// Current local wall-clock time.
    fn now(&self) -> DateTime<Local>;

    /// Runs `callback` once after `delay`, unless cancelled first.
    fn arm(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;

    /// Cancels a timer. Unknown or already-fired handles are ignored.
    fn cancel(&self, handle: TimerHandle);
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// Saturates at a century out instead of panicking on overflow.
fn offset(t: DateTime<Local>, by: Duration) -> DateTime<Local> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|d| t.checked_add_signed(d))
        .unwrap_or_else(|| t + chrono::Duration::days(36_500))
}

// --- Production Implementation ---

#[derive(Debug)]
pub struct TokioTimers {
    runtime: Handle,
    next_id: AtomicU64,
    tasks: Arc<Mutex<HashMap<u64, JoinHandle<()>>>>,
}

impl TokioTimers {
    /// Binds to the runtime of the calling context.
    ///
    /// Panics outside a tokio runtime, like `tokio::spawn` does.
    pub fn new() -> Self {
        Self::with_handle(Handle::current())
    }

    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            runtime,
            next_id: AtomicU64::new(1),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn armed_count(&self) -> usize {
        lock(&self.tasks).len()
    }
}

impl Default for TokioTimers {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerHost for TokioTimers {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn arm(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::clone(&self.tasks);

        // Hold the registry while spawning so a zero-delay task cannot try to
        // deregister itself before it was registered.
        let mut tasks = lock(&self.tasks);
        let join = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            lock(&registry).remove(&id);
            callback();
        });
        tasks.insert(id, join);

        TimerHandle(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        if let Some(join) = lock(&self.tasks).remove(&handle.0) {
            join.abort();
        }
    }
}

impl Drop for TokioTimers {
    fn drop(&mut self) {
        for (_, join) in lock(&self.tasks).drain() {
            join.abort();
        }
    }
}

// --- Test Implementation ---

struct ManualState {
    now: DateTime<Local>,
    next_id: u64,
    // (deadline, id) keeps insertion order among equal deadlines.
    queue: BTreeMap<(DateTime<Local>, u64), TimerCallback>,
}

/// Simulated clock for deterministic tests.
pub struct ManualClock {
    state: Mutex<ManualState>,
}

impl std::fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("ManualClock")
            .field("now", &state.now)
            .field("armed", &state.queue.len())
            .finish()
    }
}

impl ManualClock {
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            state: Mutex::new(ManualState {
                now,
                next_id: 1,
                queue: BTreeMap::new(),
            }),
        }
    }

    /// Moves the clock forward, firing every timer whose deadline is reached.
    /// Timers armed by a firing callback fire too if they fall in the window.
    pub fn advance(&self, by: Duration) {
        let target = {
            let state = lock(&self.state);
            offset(state.now, by)
        };
        self.advance_to(target);
    }

    pub fn advance_to(&self, target: DateTime<Local>) {
        loop {
            let due = {
                let mut state = lock(&self.state);
                match state.queue.first_key_value() {
                    Some((&(deadline, id), _)) if deadline <= target => {
                        let callback = state.queue.remove(&(deadline, id));
                        if deadline > state.now {
                            state.now = deadline;
                        }
                        callback
                    }
                    _ => {
                        if target > state.now {
                            state.now = target;
                        }
                        None
                    }
                }
            };
            // The lock is released here: callbacks may arm or cancel timers.
            match due {
                Some(callback) => callback(),
                None => break,
            }
        }
    }

    pub fn armed_count(&self) -> usize {
        lock(&self.state).queue.len()
    }
}

impl TimerHost for ManualClock {
    fn now(&self) -> DateTime<Local> {
        lock(&self.state).now
    }

    fn arm(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let mut state = lock(&self.state);
        let id = state.next_id;
        state.next_id += 1;
        let deadline = offset(state.now, delay);
        state.queue.insert((deadline, id), callback);
        TimerHandle(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        let mut state = lock(&self.state);
        let key = state.queue.keys().find(|(_, id)| *id == handle.0).copied();
        if let Some(key) = key {
            state.queue.remove(&key);
        }
    }
}
