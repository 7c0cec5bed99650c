//! Coalesces bursts of change notifications into single triggers

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Debounced trigger shared by every watch strategy.
///
/// The very first call of a session runs the callback right away. Every
/// later call replaces the pending timer, so a burst ends in exactly one
/// deferred run once the quiet period has elapsed after its last call.
///
/// Must be called from within a tokio runtime.
#[derive(Clone)]
pub struct Debouncer {
    inner: Arc<Inner>,
}

struct Inner {
    callback: Callback,
    quiet: Duration,
    state: Mutex<DebounceState>,
}

#[derive(Default)]
struct DebounceState {
    pending: Option<JoinHandle<()>>,
    // Bumped on every reschedule so a timer that lost the race to `abort` never fires
    generation: u64,
    fired_once: bool,
}

impl Debouncer {
    pub fn new(callback: Callback, quiet: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                callback,
                quiet,
                state: Mutex::new(DebounceState::default()),
            }),
        }
    }

    /// Signal that an event occurred
    pub fn call(&self) {
        let mut state = self.inner.lock();

        if !state.fired_once {
            state.fired_once = true;
            drop(state);
            (self.inner.callback)();
            return;
        }

        if let Some(timer) = state.pending.take() {
            timer.abort();
        }
        state.generation += 1;
        let generation = state.generation;

        let inner = Arc::clone(&self.inner);
        state.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.quiet).await;
            {
                let mut state = inner.lock();
                if state.generation != generation {
                    return;
                }
                state.pending = None;
            }
            (inner.callback)();
        }));
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, DebounceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
