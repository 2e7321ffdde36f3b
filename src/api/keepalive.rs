//! Purpose: Idle timer that fires a session keep-alive when no request was made.
//! Exports: `KeepAlive`.
//! Role: Owned by the multiplexer; cancelled by every request, re-armed after every flush.
//! Invariants: At most one timer is armed; arming replaces the previous timer.
//! Invariants: Cancelling is local and free; a fired timer disarms itself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

#[derive(Clone)]
pub struct KeepAlive {
    runtime: Handle,
    generations: Arc<AtomicU64>,
    armed: Arc<Mutex<Option<Armed>>>,
}

struct Armed {
    generation: u64,
    abort: AbortHandle,
}

impl KeepAlive {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            generations: Arc::new(AtomicU64::new(0)),
            armed: Arc::new(Mutex::new(None)),
        }
    }

    /// Arms the timer; `action` runs once after `delay` unless cancelled first.
    pub fn delay<F>(&self, delay: Duration, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut armed = self.armed.lock().unwrap_or_else(|poison| poison.into_inner());
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        if let Some(previous) = armed.take() {
            previous.abort.abort();
        }
        let slot = Arc::clone(&self.armed);
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut armed = slot.lock().unwrap_or_else(|poison| poison.into_inner());
                match armed.as_ref() {
                    Some(current) if current.generation == generation => *armed = None,
                    _ => return,
                }
            }
            tracing::debug!(?delay, "keep-alive timer fired");
            action();
        });
        *armed = Some(Armed {
            generation,
            abort: task.abort_handle(),
        });
    }

    pub fn cancel(&self) {
        let mut armed = self.armed.lock().unwrap_or_else(|poison| poison.into_inner());
        if let Some(previous) = armed.take() {
            previous.abort.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .is_some()
    }
}

impl std::fmt::Debug for KeepAlive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeepAlive")
            .field("armed", &self.is_armed())
            .finish()
    }
}
