//! Cancellable aggregates of in-flight work.
//!
//! A [`TaskContainer`] owns a set of [`TaskHandle`]s and cancels all of them
//! when it is cancelled or dropped. Handles added after cancellation are
//! cancelled before `add` returns. The flag and the handle set live under
//! one lock; handles and callbacks are always invoked after it is released,
//! so a cancellation callback may add to the same container.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::task::AbortHandle;

use crate::promise::Promise;

/// An opaque reference to one in-flight operation.
pub trait TaskHandle: Send + Sync {
    fn cancel(&self);

    /// False once the operation settled or was cancelled.
    fn is_active(&self) -> bool;
}

impl<T: Clone + Send + 'static> TaskHandle for Promise<T> {
    fn cancel(&self) {
        Promise::cancel(self);
    }

    fn is_active(&self) -> bool {
        !self.is_settled()
    }
}

impl TaskHandle for AbortHandle {
    fn cancel(&self) {
        self.abort();
    }

    fn is_active(&self) -> bool {
        !self.is_finished()
    }
}

type CancellationCallback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct ContainerState {
    cancelled: bool,
    handles: Vec<Box<dyn TaskHandle>>,
    callbacks: Vec<CancellationCallback>,
}

#[derive(Default)]
struct ContainerInner {
    state: Mutex<ContainerState>,
}

impl ContainerInner {
    fn add(&self, handle: Box<dyn TaskHandle>) {
        let rejected = {
            let mut state = self.state.lock();
            if state.cancelled {
                Some(handle)
            } else {
                state.handles.retain(|h| h.is_active());
                state.handles.push(handle);
                None
            }
        };
        if let Some(handle) = rejected {
            tracing::trace!("Task added after cancellation, cancelling immediately");
            handle.cancel();
        }
    }

    fn on_cancellation(&self, callback: CancellationCallback) {
        let run_now = {
            let mut state = self.state.lock();
            if state.cancelled {
                Some(callback)
            } else {
                state.callbacks.push(callback);
                None
            }
        };
        if let Some(callback) = run_now {
            callback();
        }
    }

    fn cancel(&self) -> bool {
        let (handles, callbacks) = {
            let mut state = self.state.lock();
            if state.cancelled {
                return false;
            }
            state.cancelled = true;
            (
                std::mem::take(&mut state.handles),
                std::mem::take(&mut state.callbacks),
            )
        };
        tracing::debug!(tasks = handles.len(), "Cancelling task container");
        for handle in handles {
            handle.cancel();
        }
        for callback in callbacks {
            callback();
        }
        true
    }

    fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    fn active_count(&self) -> usize {
        self.state
            .lock()
            .handles
            .iter()
            .filter(|h| h.is_active())
            .count()
    }
}

/// Owner of a group of in-flight operations. Dropping it cancels them.
#[derive(Default)]
pub struct TaskContainer {
    inner: Arc<ContainerInner>,
}

impl std::fmt::Debug for TaskContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContainer")
            .field("cancelled", &self.is_cancelled())
            .field("active", &self.active_count())
            .finish()
    }
}

impl TaskContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `handle`. Cancels it right away if the container already was.
    pub fn add(&self, handle: impl TaskHandle + 'static) {
        self.inner.add(Box::new(handle));
    }

    /// Register a callback run once when the container is cancelled.
    pub fn on_cancellation<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.on_cancellation(Box::new(callback));
    }

    /// Cancel every held handle. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Number of held handles that have not settled yet.
    pub fn active_count(&self) -> usize {
        self.inner.active_count()
    }

    /// A non-owning reference for use inside promise chains.
    pub fn downgrade(&self) -> WeakTaskContainer {
        WeakTaskContainer {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl Drop for TaskContainer {
    fn drop(&mut self) {
        self.inner.cancel();
    }
}

/// Weak back-reference to a [`TaskContainer`].
///
/// Once the owner is gone the container counts as cancelled: anything added
/// through a dead reference is cancelled immediately.
#[derive(Clone, Default)]
pub struct WeakTaskContainer {
    inner: Weak<ContainerInner>,
}

impl WeakTaskContainer {
    pub fn add(&self, handle: impl TaskHandle + 'static) {
        match self.inner.upgrade() {
            Some(inner) => inner.add(Box::new(handle)),
            None => handle.cancel(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner
            .upgrade()
            .map_or(true, |inner| inner.is_cancelled())
    }
}

/// Aggregate outcome of the promises a [`StatefulTaskContainer`] supervises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateState {
    Unknown,
    Succeeded,
    Failed,
}

type CompletionCallback = Box<dyn FnOnce(AggregateState) + Send>;

struct Aggregate {
    state: AggregateState,
    pending: usize,
    sealed: bool,
    completion: Vec<CompletionCallback>,
}

/// A [`TaskContainer`] that also tracks whether its supervised promises
/// succeeded. Failures dominate: one failure makes the aggregate `Failed`
/// no matter how many others succeed.
pub struct StatefulTaskContainer {
    tasks: TaskContainer,
    aggregate: Arc<Mutex<Aggregate>>,
}

impl Default for StatefulTaskContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl StatefulTaskContainer {
    pub fn new() -> Self {
        Self {
            tasks: TaskContainer::new(),
            aggregate: Arc::new(Mutex::new(Aggregate {
                state: AggregateState::Unknown,
                pending: 0,
                sealed: false,
                completion: Vec::new(),
            })),
        }
    }

    /// Track `promise` and fold its outcome into the aggregate state.
    pub fn supervise<T: Clone + Send + 'static>(&self, promise: &Promise<T>) {
        self.aggregate.lock().pending += 1;
        self.tasks.add(promise.clone());

        let aggregate = Arc::clone(&self.aggregate);
        let container = self.tasks.downgrade();
        promise.on_cancel({
            let aggregate = Arc::clone(&aggregate);
            let container = container.clone();
            move || {
                let fire = {
                    let mut agg = aggregate.lock();
                    agg.pending = agg.pending.saturating_sub(1);
                    take_completion(&mut agg)
                };
                if !container.is_cancelled() {
                    fire_completion(fire);
                }
            }
        });
        promise.finally(move |result| {
            if container.is_cancelled() {
                return;
            }
            let fire = {
                let mut agg = aggregate.lock();
                agg.pending = agg.pending.saturating_sub(1);
                agg.state = match (agg.state, result.is_ok()) {
                    (AggregateState::Failed, _) | (_, false) => AggregateState::Failed,
                    (_, true) => AggregateState::Succeeded,
                };
                take_completion(&mut agg)
            };
            fire_completion(fire);
        });
    }

    /// No more promises will be supervised. Completion callbacks fire once
    /// everything supervised has settled.
    pub fn seal(&self) {
        let fire = {
            let mut agg = self.aggregate.lock();
            agg.sealed = true;
            take_completion(&mut agg)
        };
        if !self.tasks.is_cancelled() {
            fire_completion(fire);
        }
    }

    /// Register a callback fired once with the final aggregate state. Fires
    /// immediately when the container is already sealed and settled. Never
    /// fires if the container is cancelled first.
    pub fn on_completion<F>(&self, callback: F)
    where
        F: FnOnce(AggregateState) + Send + 'static,
    {
        let fire = {
            let mut agg = self.aggregate.lock();
            agg.completion.push(Box::new(callback));
            take_completion(&mut agg)
        };
        if !self.tasks.is_cancelled() {
            fire_completion(fire);
        }
    }

    pub fn state(&self) -> AggregateState {
        self.aggregate.lock().state
    }

    pub fn on_cancellation<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let aggregate = Arc::clone(&self.aggregate);
        self.tasks.on_cancellation(move || {
            callback();
            aggregate.lock().completion.clear();
        });
    }

    pub fn add(&self, handle: impl TaskHandle + 'static) {
        self.tasks.add(handle);
    }

    pub fn cancel(&self) {
        self.tasks.cancel();
        self.aggregate.lock().completion.clear();
    }

    pub fn is_cancelled(&self) -> bool {
        self.tasks.is_cancelled()
    }

    pub fn downgrade(&self) -> WeakTaskContainer {
        self.tasks.downgrade()
    }
}

fn fire_completion(fire: Option<(AggregateState, Vec<CompletionCallback>)>) {
    if let Some((state, callbacks)) = fire {
        for callback in callbacks {
            callback(state);
        }
    }
}

fn take_completion(agg: &mut Aggregate) -> Option<(AggregateState, Vec<CompletionCallback>)> {
    if agg.sealed && agg.pending == 0 && !agg.completion.is_empty() {
        Some((agg.state, std::mem::take(&mut agg.completion)))
    } else {
        None
    }
}
