//! Counting semaphores and one-shot rendezvous points.
//!
//! A waiter registers its `Parker` in the semaphore's queue, drops the
//! queue lock and sleeps. `up` wakes the oldest registered waiter. The
//! waiter re-checks the count when it wakes, so a wake-up that loses the
//! race for the count simply re-registers. A waiter that takes a permit
//! removes its own registration, so a spurious return from `park` never
//! leaves a stale entry for `up` to wake.

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;

use super::Parker;

struct SemaState {
    value: usize,
    waiters: VecDeque<Arc<dyn Parker>>,
}

/// A counting semaphore that sleeps instead of spinning.
pub struct Semaphore {
    state: Mutex<SemaState>,
}

impl Semaphore {
    /// Create a semaphore with `value` initial permits.
    pub const fn new(value: usize) -> Self {
        Self {
            state: Mutex::new(SemaState {
                value,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Take a permit, sleeping on `parker` until one is available.
    pub fn down(&self, parker: &Arc<dyn Parker>) {
        loop {
            {
                let mut state = self.state.lock();
                if state.value > 0 {
                    state.value -= 1;
                    // A spurious return can leave our registration queued;
                    // `up` must never wake a thread that is no longer waiting.
                    state.waiters.retain(|w| !Arc::ptr_eq(w, parker));
                    return;
                }
                if !state.waiters.iter().any(|w| Arc::ptr_eq(w, parker)) {
                    state.waiters.push_back(Arc::clone(parker));
                }
            }
            parker.park();
        }
    }

    /// Take a permit if one is available right now.
    pub fn try_down(&self) -> bool {
        let mut state = self.state.lock();
        if state.value > 0 {
            state.value -= 1;
            true
        } else {
            false
        }
    }

    /// Release a permit and wake the oldest waiter, if any.
    pub fn up(&self) {
        let waiter = {
            let mut state = self.state.lock();
            state.value += 1;
            state.waiters.pop_front()
        };
        if let Some(waiter) = waiter {
            waiter.unpark();
        }
    }

    /// Permits currently available.
    pub fn value(&self) -> usize {
        self.state.lock().value
    }
}

/// A binary rendezvous fired by one actor and consumed by one waiter.
pub struct Rendezvous {
    sema: Semaphore,
    fired: AtomicBool,
}

impl Rendezvous {
    /// Create an unfired rendezvous.
    pub const fn new() -> Self {
        Self {
            sema: Semaphore::new(0),
            fired: AtomicBool::new(false),
        }
    }

    /// Fire the rendezvous. Only the first call has any effect.
    pub fn signal(&self) {
        if self.fired.swap(true, Ordering::AcqRel) {
            log::warn!("rendezvous signalled twice; ignoring");
            return;
        }
        self.sema.up();
    }

    /// Sleep until the rendezvous fires, consuming the signal.
    pub fn wait(&self, parker: &Arc<dyn Parker>) {
        self.sema.down(parker);
    }

    /// Check if the rendezvous has fired (whether or not it was consumed).
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

impl Default for Rendezvous {
    fn default() -> Self {
        Self::new()
    }
}
