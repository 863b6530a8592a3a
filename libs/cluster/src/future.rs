//! Single-Shot Futures
//!
//! [`GridFuture`] is the async result carrier used for topology awaits
//! and job dispatch: it completes exactly once with a value or an error,
//! supports blocking gets with an optional timeout, and notifies
//! listeners.
//!
//! Listener contract: a listener added before completion runs in the
//! completing thread; a listener added after completion runs
//! synchronously in the registering thread. A timed-out `get` leaves the
//! future pending and may be retried.

use crate::error::{ClusterError, Result};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

type Listener<T> = Box<dyn Fn(&Result<T>) + Send>;

enum State<T> {
    Pending {
        listeners: Vec<(u64, Listener<T>)>,
        next_listener_id: u64,
    },
    Done(Result<T>),
}

struct Inner<T> {
    state: Mutex<State<T>>,
    completed: Condvar,
}

/// Single-consumer result carrier; clones share the same completion.
pub struct GridFuture<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for GridFuture<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> Default for GridFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> GridFuture<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Pending {
                    listeners: Vec::new(),
                    next_listener_id: 0,
                }),
                completed: Condvar::new(),
            }),
        }
    }

    /// An already completed future.
    pub fn finished(result: Result<T>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Done(result)),
                completed: Condvar::new(),
            }),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(*self.inner.state.lock(), State::Done(_))
    }

    /// Complete the future. The first completion wins; later calls are
    /// ignored and return `false`. Listeners registered so far are
    /// invoked in this thread, outside the state lock.
    pub fn on_done(&self, result: Result<T>) -> bool {
        let listeners = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                State::Done(_) => return false,
                State::Pending { listeners, .. } => {
                    let taken = std::mem::take(listeners);
                    *state = State::Done(result.clone());
                    taken
                }
            }
        };

        self.inner.completed.notify_all();

        for (_, listener) in &listeners {
            listener(&result);
        }

        true
    }

    /// Block until completion.
    pub fn get(&self) -> Result<T> {
        let mut state = self.inner.state.lock();
        loop {
            if let State::Done(result) = &*state {
                return result.clone();
            }
            self.inner.completed.wait(&mut state);
        }
    }

    /// Block up to `timeout`; a timeout fails with
    /// [`ClusterError::FutureTimeout`] and leaves the future pending.
    pub fn get_timeout(&self, timeout: Duration) -> Result<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        loop {
            if let State::Done(result) = &*state {
                return result.clone();
            }
            if self
                .inner
                .completed
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                if let State::Done(result) = &*state {
                    return result.clone();
                }
                return Err(ClusterError::FutureTimeout {
                    after_ms: timeout.as_millis() as u64,
                });
            }
        }
    }

    /// Register a completion listener; returns an id usable with
    /// [`GridFuture::unlisten`]. If the future is already done the
    /// listener runs before this call returns.
    pub fn listen(&self, listener: impl Fn(&Result<T>) + Send + 'static) -> u64 {
        let immediate = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                State::Pending {
                    listeners,
                    next_listener_id,
                } => {
                    let id = *next_listener_id;
                    *next_listener_id += 1;
                    listeners.push((id, Box::new(listener)));
                    return id;
                }
                State::Done(result) => result.clone(),
            }
        };

        listener(&immediate);
        u64::MAX
    }

    /// Remove a pending listener; `false` when it already ran or never
    /// existed.
    pub fn unlisten(&self, id: u64) -> bool {
        let mut state = self.inner.state.lock();
        match &mut *state {
            State::Pending { listeners, .. } => {
                let before = listeners.len();
                listeners.retain(|(lid, _)| *lid != id);
                listeners.len() != before
            }
            State::Done(_) => false,
        }
    }
}
