//! # Per-Word Wait Lists
//!
//! Futex emulation for segment words. Each word owns one [`WaitList`];
//! blocking threads and suspended tasks register on the same list, so a
//! notify from either discipline wakes a waiter of either kind.
//!
//! ## Lost Wake-ups
//!
//! ```text
//!   waiter                          notifier
//!   ──────                          ────────
//!   lock(list)                      store(word, new)
//!   word == expected ? enqueue      lock(list)
//!   unlock(list)                    dequeue + signal
//!   park                            unlock(list)
//! ```
//!
//! The comparison and the enqueue happen under the list mutex. A notifier
//! changes the word before taking that mutex, so either the waiter sees the
//! new value and never parks, or it is already queued when the notifier
//! dequeues.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::{Condvar, Mutex};

/// How a wait on a segment word ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The word did not hold the expected value; nothing was registered.
    NotEqual,
    /// A notify selected this waiter.
    Woken,
}

/// Wake-up signal owned by one registered waiter.
struct WakeSignal {
    woken: AtomicBool,
    mutex: Mutex<()>,
    condvar: Condvar,
    waker: Mutex<Option<Waker>>,
}

impl WakeSignal {
    fn new(waker: Option<Waker>) -> Self {
        Self {
            woken: AtomicBool::new(false),
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
            waker: Mutex::new(waker),
        }
    }

    fn signal(&self) {
        self.woken.store(true, Ordering::Release);
        {
            let _guard = self.mutex.lock();
            self.condvar.notify_one();
        }
        // Taken after `woken` is set: a poll that installs a newer waker
        // either gets woken here or sees `woken` on its own re-check.
        let waker = self.waker.lock().take();
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    fn is_woken(&self) -> bool {
        self.woken.load(Ordering::Acquire)
    }

    fn block(&self) {
        let mut guard = self.mutex.lock();
        while !self.woken.load(Ordering::Acquire) {
            self.condvar.wait(&mut guard);
        }
    }

    fn set_waker(&self, waker: &Waker) {
        let mut slot = self.waker.lock();
        if !slot.as_ref().is_some_and(|current| current.will_wake(waker)) {
            *slot = Some(waker.clone());
        }
    }
}

struct Entry {
    id: u64,
    signal: Arc<WakeSignal>,
}

#[derive(Default)]
struct WaitListState {
    waiters: VecDeque<Entry>,
    next_id: u64,
}

/// Registered waiters of one segment word.
#[derive(Default)]
pub(crate) struct WaitList {
    state: Mutex<WaitListState>,
}

impl WaitList {
    /// Enqueues a waiter if `word` still holds `expected`.
    fn register(
        &self,
        word: &AtomicI32,
        expected: i32,
        waker: Option<Waker>,
    ) -> Option<(u64, Arc<WakeSignal>)> {
        let mut state = self.state.lock();
        if word.load(Ordering::SeqCst) != expected {
            return None;
        }
        let id = state.next_id;
        state.next_id = state.next_id.wrapping_add(1);
        let signal = Arc::new(WakeSignal::new(waker));
        state.waiters.push_back(Entry {
            id,
            signal: Arc::clone(&signal),
        });
        Some((id, signal))
    }

    /// Removes a waiter. Returns `false` if a notify already dequeued it.
    fn deregister(&self, id: u64) -> bool {
        let mut state = self.state.lock();
        match state.waiters.iter().position(|entry| entry.id == id) {
            Some(pos) => {
                state.waiters.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Parks the calling thread until notified.
    pub(crate) fn wait(&self, word: &AtomicI32, expected: i32) -> WaitOutcome {
        let Some((id, signal)) = self.register(word, expected, None) else {
            return WaitOutcome::NotEqual;
        };
        tracing::trace!(waiter = id, expected, "thread parked on segment word");
        signal.block();
        tracing::trace!(waiter = id, "thread woken");
        WaitOutcome::Woken
    }

    /// Wakes up to `count` waiters, returning how many were selected.
    pub(crate) fn notify(&self, count: usize) -> usize {
        let selected: Vec<Entry> = {
            let mut state = self.state.lock();
            let n = count.min(state.waiters.len());
            state.waiters.drain(..n).collect()
        };
        for entry in &selected {
            entry.signal.signal();
        }
        selected.len()
    }

    /// Number of currently registered waiters.
    pub(crate) fn len(&self) -> usize {
        self.state.lock().waiters.len()
    }
}

enum FutureState {
    Unregistered,
    Registered { id: u64, signal: Arc<WakeSignal> },
    Done(WaitOutcome),
}

/// Future returned by [`SharedSegment::wait_async`](super::SharedSegment::wait_async).
///
/// Dropping it while registered removes the waiter. If a notify had already
/// selected it, that wake-up is passed on to the next waiter.
#[must_use = "futures do nothing unless polled"]
pub struct WaitFuture<'a> {
    list: &'a WaitList,
    word: &'a AtomicI32,
    expected: i32,
    spin_limit: u32,
    state: FutureState,
}

impl<'a> WaitFuture<'a> {
    pub(crate) fn new(list: &'a WaitList, word: &'a AtomicI32, expected: i32, spin_limit: u32) -> Self {
        Self {
            list,
            word,
            expected,
            spin_limit,
            state: FutureState::Unregistered,
        }
    }
}

impl Future for WaitFuture<'_> {
    type Output = WaitOutcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &this.state {
            FutureState::Done(outcome) => Poll::Ready(*outcome),
            FutureState::Unregistered => {
                if spin_until_changed(this.word, this.expected, this.spin_limit) {
                    this.state = FutureState::Done(WaitOutcome::NotEqual);
                    return Poll::Ready(WaitOutcome::NotEqual);
                }
                match this
                    .list
                    .register(this.word, this.expected, Some(cx.waker().clone()))
                {
                    Some((id, signal)) => {
                        tracing::trace!(waiter = id, expected = this.expected, "task suspended on segment word");
                        this.state = FutureState::Registered { id, signal };
                        Poll::Pending
                    }
                    None => {
                        this.state = FutureState::Done(WaitOutcome::NotEqual);
                        Poll::Ready(WaitOutcome::NotEqual)
                    }
                }
            }
            FutureState::Registered { id, signal } => {
                signal.set_waker(cx.waker());
                if signal.is_woken() {
                    tracing::trace!(waiter = *id, "task woken");
                    this.state = FutureState::Done(WaitOutcome::Woken);
                    Poll::Ready(WaitOutcome::Woken)
                } else {
                    Poll::Pending
                }
            }
        }
    }
}

impl Drop for WaitFuture<'_> {
    fn drop(&mut self) {
        if let FutureState::Registered { id, .. } = self.state {
            if !self.list.deregister(id) {
                tracing::trace!(waiter = id, "cancelled waiter forwards its wake-up");
                self.list.notify(1);
            }
        }
    }
}

/// Re-checks `word` up to `limit` times. Returns `true` once it differs from
/// `expected`.
pub(crate) fn spin_until_changed(word: &AtomicI32, expected: i32, limit: u32) -> bool {
    for _ in 0..limit {
        if word.load(Ordering::SeqCst) != expected {
            return true;
        }
        std::hint::spin_loop();
    }
    false
}
