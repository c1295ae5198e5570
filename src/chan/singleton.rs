use std::{
    cell::UnsafeCell,
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use crossbeam_utils::CachePadded;

use super::hook::{self, Carry, Hook, Packet, hold};
use super::{Core, SendError, TryRecvError, TrySendError};
use crate::pool;
use crate::select::{Selection, Ticket};
use crate::waiter::State;

/// Single-shot channel: at most one value ever crosses, and a successful put
/// resolves (and thereby closes) the channel.
///
/// Writership and readership are races on two atomic counters — only the
/// caller that moves a counter 0 -> 1 touches the slot. Receivers that arrive
/// before resolution park on the barrier queue; resolution (a winning put, or
/// `close`) drains it and every woken receiver re-runs the readership race.
pub(crate) struct Singleton<T> {
    slot: UnsafeCell<Option<T>>,
    writers: CachePadded<AtomicUsize>,
    readers: CachePadded<AtomicUsize>,
    /// True once the slot holds a value; set before `resolved`, checked after.
    filled: AtomicBool,
    resolved: CachePadded<AtomicBool>,
    barrier: Mutex<VecDeque<Hook<T>>>,
}

unsafe impl<T: Send> Send for Singleton<T> {}
unsafe impl<T: Send> Sync for Singleton<T> {}

impl<T: Send + 'static> Singleton<T> {
    pub(crate) fn new() -> Self {
        Self {
            slot: UnsafeCell::new(None),
            writers: CachePadded::new(AtomicUsize::new(0)),
            readers: CachePadded::new(AtomicUsize::new(0)),
            filled: AtomicBool::new(false),
            resolved: CachePadded::new(AtomicBool::new(false)),
            barrier: Mutex::new(VecDeque::new()),
        }
    }

    #[inline]
    fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }

    /// The readership race: the first reader after resolution moves the value
    /// out, everyone else gets `None`.
    fn take(&self) -> Option<T> {
        if self.filled.load(Ordering::Acquire)
            && self.readers.fetch_add(1, Ordering::AcqRel) == 0
        {
            unsafe { (*self.slot.get()).take() }
        } else {
            None
        }
    }

    /// Deposits `value` (if any) and opens the barrier, waking every parked
    /// receiver. Must run under the barrier mutex; false if resolution
    /// already happened, with the value handed back.
    fn resolve(
        &self,
        value: Option<T>,
        barrier: &mut VecDeque<Hook<T>>,
        signals: &mut Vec<Arc<crate::waiter::Waiter>>,
    ) -> Result<(), Option<T>> {
        if self.is_resolved() {
            return Err(value);
        }
        if let Some(value) = value {
            unsafe { *self.slot.get() = Some(value) };
            self.filled.store(true, Ordering::Release);
        }
        self.resolved.store(true, Ordering::Release);

        while let Some(hook) = barrier.pop_front() {
            let claimed = match hook.sel {
                Some(mut sel) => {
                    if hook.ticket.claim_pending(State::Select) {
                        // every select wakes committed; extract re-runs the
                        // readership race like any other receiver
                        sel.set_payload(Box::new(Carry::<T>::Shot));
                        hook.ticket.waiter().set_selection(sel);
                        true
                    } else {
                        false
                    }
                }
                None => hook.ticket.claim(State::Ready, State::Done),
            };
            if claimed {
                signals.push(hook.ticket.into_waiter());
            }
        }
        Ok(())
    }
}

impl<T: Send + 'static> Core<T> for Singleton<T> {
    fn put(&self, value: T) -> Result<(), SendError<T>> {
        // The writership race: only the 0 -> 1 caller may touch the slot.
        if self.writers.fetch_add(1, Ordering::AcqRel) != 0 {
            return Err(SendError(value));
        }

        let mut signals = Vec::new();
        let outcome;
        {
            let mut barrier = hold(&self.barrier);
            outcome = match self.resolve(Some(value), &mut barrier, &mut signals) {
                Ok(()) => Ok(()),
                // close got there first
                Err(Some(value)) => Err(SendError(value)),
                Err(None) => Ok(()),
            };
        }
        hook::fire(&signals);
        outcome
    }

    fn try_put(&self, value: T) -> Result<(), TrySendError<T>> {
        // a singleton put never blocks, so "try" only renames the error
        self.put(value).map_err(|SendError(value)| TrySendError::Closed(value))
    }

    fn get(&self) -> Option<T> {
        if self.is_resolved() {
            return self.take();
        }

        let parked;
        {
            let mut barrier = hold(&self.barrier);
            if self.is_resolved() {
                return self.take();
            }
            let waiter = pool::obtain();
            barrier.push_back(Hook::parked(waiter.clone(), Packet::empty()));
            parked = waiter;
        }

        parked.wait();
        let out = self.take();
        hook::retire(parked);
        out
    }

    fn try_get(&self) -> Result<T, TryRecvError> {
        if !self.is_resolved() {
            return Err(TryRecvError::Empty);
        }
        self.take().ok_or(TryRecvError::Closed)
    }

    fn close(&self) {
        let mut signals = Vec::new();
        {
            let mut barrier = hold(&self.barrier);
            // a no-op when a put already resolved; the value stays deliverable
            let _ = self.resolve(None, &mut barrier, &mut signals);
        }
        hook::fire(&signals);
    }

    #[inline]
    fn is_closed(&self) -> bool {
        self.is_resolved()
    }

    fn is_empty(&self) -> bool {
        !self.filled.load(Ordering::Acquire) || self.readers.load(Ordering::Acquire) > 0
    }

    fn is_full(&self) -> bool {
        self.writers.load(Ordering::Acquire) > 0
    }

    fn can_put(&self) -> bool {
        self.writers.load(Ordering::Acquire) == 0 && !self.is_resolved()
    }

    fn can_get(&self) -> bool {
        !self.is_resolved() || !self.is_empty()
    }

    fn put_now(&self, id: usize) -> Option<Selection> {
        if self.is_resolved() {
            return None;
        }
        // reserve writership; insert deposits and resolves
        if self
            .writers
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        let mut sel = Selection::of(id);
        sel.set_payload(Box::new(Carry::<T>::Shot));
        Some(sel)
    }

    fn get_now(&self, id: usize) -> Option<Selection> {
        if !self.is_resolved() {
            return None;
        }
        // commit with the value in hand so the selection is satisfiable
        let value = self.take()?;
        let mut sel = Selection::of(id);
        sel.set_payload(Box::new(Carry::Value(value)));
        Some(sel)
    }

    fn select_put(&self, ticket: Ticket, sel: Selection) {
        let mut signals = Vec::new();

        if self.is_resolved()
            || self
                .writers
                .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
        {
            // too late to ever send here
            if ticket.claim_pending(State::Invalidated) {
                signals.push(ticket.into_waiter());
            }
            hook::fire(&signals);
            return;
        }
        if ticket.claim_pending(State::Select) {
            let mut sel = sel;
            sel.set_payload(Box::new(Carry::<T>::Shot));
            ticket.waiter().set_selection(sel);
            signals.push(ticket.into_waiter());
        } else {
            // claimed by another channel: hand the writership back
            self.writers.store(0, Ordering::Release);
        }
        hook::fire(&signals);
    }

    fn select_get(&self, ticket: Ticket, sel: Selection) {
        let mut signals = Vec::new();
        {
            let mut barrier = hold(&self.barrier);
            if self.is_resolved() {
                if ticket.claim_pending(State::Select) {
                    let mut sel = sel;
                    sel.set_payload(Box::new(Carry::<T>::Shot));
                    ticket.waiter().set_selection(sel);
                    signals.push(ticket.into_waiter());
                }
            } else {
                barrier.push_back(Hook::selecting(ticket, sel, Packet::empty()));
            }
        }
        hook::fire(&signals);
    }

    fn insert(&self, sel: Selection, value: T) -> bool {
        match hook::open::<T>(sel) {
            Some(Carry::Shot) => {
                let mut signals = Vec::new();
                let delivered;
                {
                    let mut barrier = hold(&self.barrier);
                    delivered = self
                        .resolve(Some(value), &mut barrier, &mut signals)
                        .is_ok();
                }
                hook::fire(&signals);
                delivered
            }
            _ => false,
        }
    }

    fn extract(&self, sel: Selection) -> Option<T> {
        match hook::open::<T>(sel)? {
            Carry::Value(value) => Some(value),
            Carry::Shot => self.take(),
            _ => {
                debug_assert!(false, "selection does not carry a receive commitment");
                None
            }
        }
    }
}

impl<T> Drop for Singleton<T> {
    fn drop(&mut self) {
        // an undelivered value is released with the channel
        self.slot.get_mut().take();
    }
}

#[cfg(test)]
mod tests {
    use super::super::oneshot;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    /// The first put wins and closes the channel; the rest are too late.
    #[test]
    fn test_first_put_wins() {
        let (tx, rx) = oneshot::<u8>();
        tx.send(1).unwrap();
        assert!(tx.is_closed());
        assert!(tx.send(2).is_err());
        assert_eq!(rx.recv(), Some(1));
        assert_eq!(rx.recv(), None);
    }

    /// A receiver parked before the put is woken with the value reachable.
    #[test]
    fn test_parked_receiver_wakes() {
        let (tx, rx) = oneshot::<u8>();
        let receiver = thread::spawn(move || rx.recv());
        thread::sleep(Duration::from_millis(20));
        tx.send(7).unwrap();
        assert_eq!(receiver.join().unwrap(), Some(7));
    }

    /// Close without a value: every receiver sees None, every put fails.
    #[test]
    fn test_close_without_value() {
        let (tx, rx) = oneshot::<u8>();
        let receiver = thread::spawn(move || rx.recv());
        thread::sleep(Duration::from_millis(20));

        tx.close();
        assert_eq!(receiver.join().unwrap(), None);
        assert!(tx.send(3).is_err());
    }

    /// 16 senders race 16 receivers: exactly one send lands, exactly one
    /// receive observes it, and they agree on the value.
    #[test]
    fn test_exclusivity() {
        let (tx, rx) = oneshot::<usize>();
        let sent = Arc::new(AtomicUsize::new(0));
        let got = Arc::new(AtomicUsize::new(0));
        let sent_id = Arc::new(AtomicUsize::new(usize::MAX));
        let got_id = Arc::new(AtomicUsize::new(usize::MAX));

        let senders: Vec<_> = (0..16)
            .map(|id| {
                let tx = tx.clone();
                let sent = sent.clone();
                let sent_id = sent_id.clone();
                thread::spawn(move || {
                    if tx.send(id).is_ok() {
                        sent.fetch_add(1, Ordering::SeqCst);
                        sent_id.store(id, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        let receivers: Vec<_> = (0..16)
            .map(|_| {
                let rx = rx.clone();
                let got = got.clone();
                let got_id = got_id.clone();
                thread::spawn(move || {
                    if let Some(id) = rx.recv() {
                        got.fetch_add(1, Ordering::SeqCst);
                        got_id.store(id, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in senders.into_iter().chain(receivers) {
            handle.join().unwrap();
        }

        assert_eq!(sent.load(Ordering::SeqCst), 1);
        assert_eq!(got.load(Ordering::SeqCst), 1);
        assert_eq!(sent_id.load(Ordering::SeqCst), got_id.load(Ordering::SeqCst));
    }

    /// Puts on a singleton never block, with or without receivers around.
    #[test]
    fn test_put_never_blocks() {
        let (tx, _rx) = oneshot::<u8>();
        tx.send(1).unwrap();

        let (tx, rx) = oneshot::<u8>();
        drop(rx);
        tx.send(2).unwrap();
    }
}
