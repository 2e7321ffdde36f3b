//! Purpose: Single-assignment completion handle resolved with one request's result.
//! Exports: `Completion`, `CompletionState`.
//! Role: Bridges the callback-driven multiplexer and `async` callers.
//! Invariants: A handle resolves at most once; a second resolve is rejected.
//! Invariants: Continuations run once each, in attachment order, outside the lock.
//! Invariants: A handle with outstanding dependencies stages its value until they settle.

use crate::core::error::{Error, ErrorKind};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

type Continuation<T> = Box<dyn FnOnce(&T) + Send + 'static>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompletionState {
    Pending,
    Resolved,
}

pub struct Completion<T> {
    shared: Arc<Mutex<Slot<T>>>,
}

struct Slot<T> {
    value: Option<T>,
    fired: bool,
    pending_deps: usize,
    continuations: Vec<Continuation<T>>,
    wakers: Vec<Waker>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = lock(&self.shared);
        f.debug_struct("Completion")
            .field("fired", &slot.fired)
            .field("staged", &slot.value.is_some())
            .field("pending_deps", &slot.pending_deps)
            .field("continuations", &slot.continuations.len())
            .finish()
    }
}

impl<T> Default for Completion<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Completion<T>
where
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Slot {
                value: None,
                fired: false,
                pending_deps: 0,
                continuations: Vec::new(),
                wakers: Vec::new(),
            })),
        }
    }

    pub fn resolved(value: T) -> Self {
        let completion = Self::new();
        {
            let mut slot = lock(&completion.shared);
            slot.value = Some(value);
            slot.fired = true;
        }
        completion
    }

    pub fn state(&self) -> CompletionState {
        if lock(&self.shared).fired {
            CompletionState::Resolved
        } else {
            CompletionState::Pending
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.state() == CompletionState::Resolved
    }

    /// Snapshot of the resolved value; `None` while pending or staged.
    pub fn value(&self) -> Option<T> {
        let slot = lock(&self.shared);
        if slot.fired { slot.value.clone() } else { None }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub fn resolve(&self, value: T) -> Result<(), Error> {
        {
            let mut slot = lock(&self.shared);
            if slot.value.is_some() {
                tracing::error!("completion resolved twice; keeping the first value");
                return Err(Error::new(ErrorKind::AlreadyResolved)
                    .with_message("completion handle already resolved"));
            }
            slot.value = Some(value);
            if slot.pending_deps > 0 {
                return Ok(());
            }
        }
        self.fire();
        Ok(())
    }

    /// Runs `continuation` with the resolved value, now if already resolved.
    pub fn on_resolve<F>(&self, continuation: F)
    where
        F: FnOnce(&T) + Send + 'static,
    {
        let value = {
            let mut slot = lock(&self.shared);
            if !slot.fired {
                slot.continuations.push(Box::new(continuation));
                return;
            }
            slot.value.clone()
        };
        if let Some(value) = value {
            continuation(&value);
        }
    }

    pub fn then<U, F>(&self, transform: F) -> Completion<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(&T) -> U + Send + 'static,
    {
        let derived = Completion::new();
        let target = derived.clone();
        self.on_resolve(move |value| {
            let _ = target.resolve(transform(value));
        });
        derived
    }

    /// Like `then`, but the continuation yields another handle; the derived
    /// handle resolves once that inner handle does.
    pub fn then_chain<U, F>(&self, transform: F) -> Completion<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(&T) -> Completion<U> + Send + 'static,
    {
        let derived = Completion::new();
        let target = derived.clone();
        self.on_resolve(move |value| {
            let inner = transform(value);
            inner.on_resolve(move |inner_value| {
                let _ = target.resolve(inner_value.clone());
            });
        });
        derived
    }

    /// Holds this handle's resolution until `other` resolves as well.
    pub fn depends_on<U>(&self, other: &Completion<U>) -> Result<(), Error>
    where
        U: Clone + Send + 'static,
    {
        {
            let mut slot = lock(&self.shared);
            if slot.fired {
                return Err(Error::new(ErrorKind::AlreadyResolved)
                    .with_message("cannot add a dependency to a resolved completion"));
            }
            slot.pending_deps += 1;
        }
        let this = self.clone();
        other.on_resolve(move |_| this.dependency_settled());
        Ok(())
    }

    pub async fn wait_timeout(&self, timeout: Duration) -> Result<T, Error> {
        tokio::time::timeout(timeout, self.clone())
            .await
            .map_err(|_| {
                Error::new(ErrorKind::TimedOut)
                    .with_message(format!("completion still pending after {timeout:?}"))
            })
    }

    fn dependency_settled(&self) {
        let ready = {
            let mut slot = lock(&self.shared);
            slot.pending_deps = slot.pending_deps.saturating_sub(1);
            slot.pending_deps == 0 && slot.value.is_some() && !slot.fired
        };
        if ready {
            self.fire();
        }
    }

    fn fire(&self) {
        let (value, continuations, wakers) = {
            let mut slot = lock(&self.shared);
            slot.fired = true;
            (
                slot.value.clone(),
                std::mem::take(&mut slot.continuations),
                std::mem::take(&mut slot.wakers),
            )
        };
        for waker in wakers {
            waker.wake();
        }
        if let Some(value) = value {
            for continuation in continuations {
                continuation(&value);
            }
        }
    }
}

impl<T> Future for Completion<T>
where
    T: Clone + Send + 'static,
{
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let mut slot = lock(&self.shared);
        if slot.fired {
            if let Some(value) = slot.value.clone() {
                return Poll::Ready(value);
            }
        }
        if !slot.wakers.iter().any(|waker| waker.will_wake(cx.waker())) {
            slot.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

fn lock<T>(shared: &Mutex<Slot<T>>) -> MutexGuard<'_, Slot<T>> {
    shared.lock().unwrap_or_else(|poison| poison.into_inner())
}
