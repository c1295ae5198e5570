use std::{
    cell::UnsafeCell,
    sync::{
        Condvar, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use crate::select::Selection;

/// Where a waiter is in its lifecycle.
///
/// Every move between states is a compare-and-swap on [`Waiter::word`]; a
/// successful swap grants the caller the exclusive right to write the
/// selection slot and to signal. The tag is the single source of truth for
/// ownership — membership in a channel's pending queue is advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub(crate) enum State {
    /// Parked for exactly one wakeup inside a single channel.
    Ready = 0,
    /// Parked on behalf of a select; any selectable may claim it.
    WaitSelect = 1,
    /// Claimed by a selectable that deposited a selection.
    Select = 2,
    /// Reserved by a peer select pending the two-phase rendezvous.
    DoubleSelect = 3,
    /// Consumed by a non-producing path (close, retraction).
    Invalidated = 4,
    /// Terminal; the owner has observed the outcome.
    Done = 5,
}

const TAG_BITS: usize = 3;
const TAG_MASK: usize = (1 << TAG_BITS) - 1;

#[inline]
fn pack(generation: usize, tag: State) -> usize {
    (generation << TAG_BITS) | tag as usize
}

#[inline]
fn tag_of(word: usize) -> State {
    match word & TAG_MASK {
        0 => State::Ready,
        1 => State::WaitSelect,
        2 => State::Select,
        3 => State::DoubleSelect,
        4 => State::Invalidated,
        _ => State::Done,
    }
}

/// A reusable one-shot wait/notify with an observable state tag and a
/// single-slot [`Selection`] payload.
///
/// The state tag and a generation counter share one atomic word. Claims from
/// channel queues carry the generation they were enqueued with; after the
/// waiter is recycled through the pool the generation has moved on and every
/// stale claim fails its CAS. That is what makes the lazy queue cleanup safe:
/// a dead entry can linger, it just can never win.
///
/// Signalling is a remembered token over a mutex/condvar pair, so `signal`
/// before `wait` is fine and `wait` is immune to spurious wakeups.
pub(crate) struct Waiter {
    word: AtomicUsize,
    token: Mutex<bool>,
    cond: Condvar,
    /// Written only under a successful claim, read only by the parked thread
    /// after `wait` returns. The claim CAS plus the signal/wait pair order the
    /// two accesses.
    selection: UnsafeCell<Option<Selection>>,
}

unsafe impl Send for Waiter {}
unsafe impl Sync for Waiter {}

impl Waiter {
    pub(crate) fn new() -> Self {
        Self {
            word: AtomicUsize::new(pack(1, State::Ready)),
            token: Mutex::new(false),
            cond: Condvar::new(),
            selection: UnsafeCell::new(None),
        }
    }

    #[inline]
    pub(crate) fn state(&self) -> State {
        tag_of(self.word.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn generation(&self) -> usize {
        self.word.load(Ordering::Acquire) >> TAG_BITS
    }

    /// Attempts `from -> to` at the waiter's current generation.
    ///
    /// Used by the thread that owns the waiter (the parked operation or the
    /// select engine); a failure means some selectable got there first.
    pub(crate) fn transition(&self, from: State, to: State) -> bool {
        let cur = self.word.load(Ordering::Acquire);
        if tag_of(cur) != from {
            return false;
        }
        let next = (cur & !TAG_MASK) | to as usize;
        self.word
            .compare_exchange(cur, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Attempts `from -> to` at a captured generation.
    ///
    /// Used by channel-side claims going through a queue entry. Fails if the
    /// waiter moved on or was recycled since the entry was enqueued.
    pub(crate) fn claim(&self, generation: usize, from: State, to: State) -> bool {
        self.word
            .compare_exchange(
                pack(generation, from),
                pack(generation, to),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Blocks until [`signal`](Self::signal) delivers a token, then consumes it.
    pub(crate) fn wait(&self) {
        let mut token = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        while !*token {
            token = self
                .cond
                .wait(token)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *token = false;
    }

    /// Wakes the parked thread. Remembered if it has not parked yet.
    pub(crate) fn signal(&self) {
        let mut token = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        *token = true;
        drop(token);
        self.cond.notify_one();
    }

    /// Deposits the selection payload.
    ///
    /// Caller must hold a successful claim on this waiter; the subsequent
    /// `signal` publishes the write to the parked thread.
    pub(crate) fn set_selection(&self, sel: Selection) {
        unsafe { *self.selection.get() = Some(sel) };
    }

    /// Takes the deposited selection. Only the parked thread calls this, after
    /// `wait` has returned.
    pub(crate) fn take_selection(&self) -> Option<Selection> {
        unsafe { (*self.selection.get()).take() }
    }

    /// Rearms the waiter for reuse: fresh generation, `Ready` tag, no pending
    /// token, empty payload. Caller must be the sole owner (terminal state
    /// observed, no live queue entries can claim past the generation bump).
    pub(crate) fn reset(&self) {
        let generation = self.generation().wrapping_add(1).max(1);
        self.word.store(pack(generation, State::Ready), Ordering::Release);
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = false;
        unsafe { *self.selection.get() = None };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    /// A claim can only succeed once; the loser sees the winner's tag.
    #[test]
    fn test_single_claim() {
        let w = Waiter::new();
        assert!(w.transition(State::Ready, State::WaitSelect));
        let generation = w.generation();
        assert!(w.claim(generation, State::WaitSelect, State::Select));
        assert!(!w.claim(generation, State::WaitSelect, State::Select));
        assert_eq!(w.state(), State::Select);
    }

    /// A recycled waiter cannot be claimed through a stale generation.
    #[test]
    fn test_stale_generation_claim_fails() {
        let w = Waiter::new();
        assert!(w.transition(State::Ready, State::WaitSelect));
        let stale = w.generation();
        assert!(w.claim(stale, State::WaitSelect, State::Select));
        assert!(w.transition(State::Select, State::Done));
        w.reset();

        assert!(w.transition(State::Ready, State::WaitSelect));
        assert!(!w.claim(stale, State::WaitSelect, State::Select));
        assert_eq!(w.state(), State::WaitSelect);
    }

    /// Signal delivered before the wait is remembered.
    #[test]
    fn test_signal_before_wait() {
        let w = Waiter::new();
        w.signal();
        w.wait();
    }

    /// Cross-thread wake.
    #[test]
    fn test_wakeup() {
        let w = Arc::new(Waiter::new());
        let peer = w.clone();
        let handle = thread::spawn(move || {
            peer.signal();
        });
        w.wait();
        handle.join().unwrap();
    }

    /// Exactly one of many racing claimers wins.
    #[test]
    fn test_racing_claims() {
        let w = Arc::new(Waiter::new());
        assert!(w.transition(State::Ready, State::WaitSelect));
        let generation = w.generation();

        let wins: Vec<bool> = (0..8)
            .map(|_| {
                let w = w.clone();
                thread::spawn(move || w.claim(generation, State::WaitSelect, State::Select))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect();

        assert_eq!(wins.iter().filter(|&&won| won).count(), 1);
    }
}
