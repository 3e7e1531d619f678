//! Single-settlement, chainable deferred values.
//!
//! A [`Promise`] starts pending and settles exactly once: resolved with a
//! value, failed with an [`Error`], or cancelled. Continuations registered
//! before settlement are queued; continuations registered afterwards are
//! invoked immediately with the stored settlement, so registration order
//! never matters for correctness.
//!
//! Continuations run on whichever thread settles the promise. No lock is
//! held while a continuation or cancel hook runs, so callbacks are free to
//! touch the same promise (or a task container) again.
//!
//! Cancellation is not a failure: `then`, `error`, `finally` and `done`
//! observers downstream of a cancelled promise never fire. Cancelling a
//! derived promise also cancels the stage it was derived from once no other
//! derived promise still depends on that stage.

use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{Error, Result};

/// Terminal state of a promise.
#[derive(Debug, Clone)]
pub enum Settlement<T> {
    Resolved(T),
    Failed(Error),
    Cancelled,
}

impl<T> Settlement<T> {
    fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Resolved(value),
            Err(Error::Cancelled) => Self::Cancelled,
            Err(e) => Self::Failed(e),
        }
    }
}

type Continuation<T> = Box<dyn FnOnce(Settlement<T>) + Send>;
type CancelHook = Box<dyn FnOnce() + Send>;

enum State<T> {
    Pending {
        continuations: Vec<Continuation<T>>,
        cancel_hooks: Vec<CancelHook>,
    },
    Settled(Settlement<T>),
}

struct Core<T> {
    state: Mutex<State<T>>,
    /// Derived promises that have not been cancelled.
    dependents: AtomicUsize,
}

impl<T: Clone + Send + 'static> Core<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(State::Pending {
                continuations: Vec::new(),
                cancel_hooks: Vec::new(),
            }),
            dependents: AtomicUsize::new(0),
        }
    }

    /// Write the result slot. Returns `false` if it was already written.
    fn settle(&self, settlement: Settlement<T>) -> bool {
        let previous = {
            let mut state = self.state.lock();
            if matches!(&*state, State::Settled(_)) {
                return false;
            }
            std::mem::replace(&mut *state, State::Settled(settlement.clone()))
        };

        let State::Pending {
            continuations,
            cancel_hooks,
        } = previous
        else {
            return false;
        };

        if matches!(settlement, Settlement::Cancelled) {
            for hook in cancel_hooks {
                hook();
            }
        }
        for continuation in continuations {
            continuation(settlement.clone());
        }
        true
    }

    fn subscribe(&self, continuation: Continuation<T>) {
        let settled = {
            let mut state = self.state.lock();
            match &mut *state {
                State::Pending { continuations, .. } => {
                    continuations.push(continuation);
                    return;
                }
                State::Settled(settlement) => settlement.clone(),
            }
        };
        continuation(settled);
    }

    fn on_cancel(&self, hook: CancelHook) {
        let run_now = {
            let mut state = self.state.lock();
            match &mut *state {
                State::Pending { cancel_hooks, .. } => {
                    cancel_hooks.push(hook);
                    return;
                }
                State::Settled(Settlement::Cancelled) => true,
                State::Settled(_) => false,
            }
        };
        if run_now {
            hook();
        }
    }

    fn is_pending(&self) -> bool {
        matches!(&*self.state.lock(), State::Pending { .. })
    }

    fn is_cancelled(&self) -> bool {
        matches!(&*self.state.lock(), State::Settled(Settlement::Cancelled))
    }

    fn settlement(&self) -> Option<Settlement<T>> {
        match &*self.state.lock() {
            State::Pending { .. } => None,
            State::Settled(settlement) => Some(settlement.clone()),
        }
    }
}

/// A value of type `T` that becomes available later, or fails.
pub struct Promise<T: Clone + Send + 'static> {
    core: Arc<Core<T>>,
}

impl<T: Clone + Send + 'static> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: Clone + Send + 'static> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.core.settlement() {
            None => "pending",
            Some(Settlement::Resolved(_)) => "resolved",
            Some(Settlement::Failed(_)) => "failed",
            Some(Settlement::Cancelled) => "cancelled",
        };
        f.debug_struct("Promise").field("state", &state).finish()
    }
}

/// Write side of a pending promise.
///
/// Consumed by settling. Dropping it unsettled fails the promise with a
/// provider error rather than leaving observers waiting forever.
pub struct Resolver<T: Clone + Send + 'static> {
    core: Arc<Core<T>>,
}

impl<T: Clone + Send + 'static> Resolver<T> {
    pub fn fulfill(self, value: T) {
        self.core.settle(Settlement::Resolved(value));
    }

    pub fn reject(self, error: Error) {
        self.core.settle(Settlement::from_result(Err(error)));
    }

    /// Settle from a `Result`. `Err(Error::Cancelled)` cancels.
    pub fn settle(self, result: Result<T>) {
        self.core.settle(Settlement::from_result(result));
    }

    pub fn cancel(self) {
        self.core.settle(Settlement::Cancelled);
    }

    /// True once the promise was cancelled; producers may stop early.
    pub fn is_cancelled(&self) -> bool {
        self.core.is_cancelled()
    }

    fn forward(self, settlement: Settlement<T>) {
        self.core.settle(settlement);
    }
}

impl<T: Clone + Send + 'static> Drop for Resolver<T> {
    fn drop(&mut self) {
        if self.core.is_pending() {
            self.core.settle(Settlement::Failed(Error::provider(
                "promise abandoned before settlement",
            )));
        }
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// A pending promise plus the resolver that settles it.
    pub fn pending() -> (Self, Resolver<T>) {
        let core = Arc::new(Core::new());
        (
            Self {
                core: Arc::clone(&core),
            },
            Resolver { core },
        )
    }

    /// Run `body` now with a resolver it may settle at any later point.
    pub fn new<F>(body: F) -> Self
    where
        F: FnOnce(Resolver<T>),
    {
        let (promise, resolver) = Self::pending();
        body(resolver);
        promise
    }

    pub fn resolved(value: T) -> Self {
        let (promise, resolver) = Self::pending();
        resolver.fulfill(value);
        promise
    }

    pub fn fail(error: Error) -> Self {
        let (promise, resolver) = Self::pending();
        resolver.reject(error);
        promise
    }

    /// Wrap a synchronous, fallible computation.
    pub fn firstly<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<T>,
    {
        let (promise, resolver) = Self::pending();
        resolver.settle(f());
        promise
    }

    /// Drive `future` on the current tokio runtime. Cancelling the promise
    /// aborts the task.
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let (promise, resolver) = Self::pending();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let task = handle.spawn(async move {
                    let result = future.await;
                    resolver.settle(result);
                });
                let abort = task.abort_handle();
                promise.on_cancel(move || abort.abort());
            }
            Err(e) => resolver.reject(Error::provider(format!("no async runtime: {e}"))),
        }
        promise
    }

    /// Transform the resolved value. Failures pass through untouched and
    /// `f` is never invoked for them.
    pub fn then<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        let (derived, resolver) = Promise::<U>::pending();
        derived.link_upstream(self);
        self.core.subscribe(Box::new(move |settlement| match settlement {
            Settlement::Resolved(value) => {
                if !resolver.is_cancelled() {
                    resolver.settle(f(value));
                }
            }
            Settlement::Failed(e) => resolver.reject(e),
            Settlement::Cancelled => resolver.cancel(),
        }));
        derived
    }

    /// Chain an asynchronous step, flattening the nested promise.
    pub fn then_promise<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        let (derived, resolver) = Promise::<U>::pending();
        derived.link_upstream(self);
        let downstream = derived.clone();
        self.core.subscribe(Box::new(move |settlement| match settlement {
            Settlement::Resolved(value) => {
                if resolver.is_cancelled() {
                    return;
                }
                let inner = f(value);
                downstream.link_upstream(&inner);
                inner
                    .core
                    .subscribe(Box::new(move |settlement| resolver.forward(settlement)));
            }
            Settlement::Failed(e) => resolver.reject(e),
            Settlement::Cancelled => resolver.cancel(),
        }));
        derived
    }

    /// Observe a failure without altering propagation.
    pub fn error<F>(&self, f: F) -> Self
    where
        F: FnOnce(Error) + Send + 'static,
    {
        self.core.subscribe(Box::new(move |settlement| {
            if let Settlement::Failed(e) = settlement {
                f(e);
            }
        }));
        self.clone()
    }

    /// Observe the resolved value.
    pub fn done<F>(&self, f: F) -> Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.core.subscribe(Box::new(move |settlement| {
            if let Settlement::Resolved(value) = settlement {
                f(value);
            }
        }));
        self.clone()
    }

    /// Terminal observer fired once on success or failure. Skipped when the
    /// promise is cancelled.
    pub fn finally<F>(&self, f: F) -> Self
    where
        F: FnOnce(Result<T>) + Send + 'static,
    {
        self.core.subscribe(Box::new(move |settlement| match settlement {
            Settlement::Resolved(value) => f(Ok(value)),
            Settlement::Failed(e) => f(Err(e)),
            Settlement::Cancelled => {}
        }));
        self.clone()
    }

    /// Run `hook` when this promise is cancelled. Runs immediately if it
    /// already was.
    pub fn on_cancel<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.core.on_cancel(Box::new(hook));
    }

    /// Cancel if still pending. A no-op after settlement.
    pub fn cancel(&self) {
        self.core.settle(Settlement::Cancelled);
    }

    pub fn is_settled(&self) -> bool {
        !self.core.is_pending()
    }

    pub fn is_cancelled(&self) -> bool {
        self.core.is_cancelled()
    }

    pub fn settlement(&self) -> Option<Settlement<T>> {
        self.core.settlement()
    }

    /// Cancelling `self` cancels `upstream` when `self` was the last
    /// dependent left on it. Only a weak reference is kept so a chain never
    /// extends the life of the stage it came from.
    fn link_upstream<V: Clone + Send + 'static>(&self, upstream: &Promise<V>) {
        upstream.core.dependents.fetch_add(1, Ordering::SeqCst);
        let upstream: Weak<Core<V>> = Arc::downgrade(&upstream.core);
        self.core.on_cancel(Box::new(move || {
            if let Some(core) = upstream.upgrade() {
                if core.dependents.fetch_sub(1, Ordering::SeqCst) == 1 {
                    core.settle(Settlement::Cancelled);
                }
            }
        }));
    }
}

impl<T: Clone + Send + 'static> IntoFuture for Promise<T> {
    type Output = Result<T>;
    type IntoFuture = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        let (tx, rx) = oneshot::channel();
        self.core.subscribe(Box::new(move |settlement| {
            let _ = tx.send(settlement);
        }));
        Box::pin(async move {
            match rx.await {
                Ok(Settlement::Resolved(value)) => Ok(value),
                Ok(Settlement::Failed(e)) => Err(e),
                Ok(Settlement::Cancelled) | Err(_) => Err(Error::Cancelled),
            }
        })
    }
}
