use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use crossbeam_utils::CachePadded;

use super::hook::{self, Collected, Hook, Packet, Pairing, hold};
use super::{Core, SendError, TryRecvError, TrySendError};
use crate::pool;
use crate::select::{Selection, Ticket};
use crate::waiter::{State, Waiter};

/// Unbuffered channel: no element storage at all. The only way an operation
/// completes synchronously is a direct handoff with a peer already parked on
/// the other side; otherwise it parks and waits its turn, FIFO.
pub(crate) struct Rendezvous<T> {
    inner: Mutex<Inner<T>>,
    closed: CachePadded<AtomicBool>,
}

struct Inner<T> {
    senders: VecDeque<Hook<T>>,
    receivers: VecDeque<Hook<T>>,
}

impl<T: Send + 'static> Rendezvous<T> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                senders: VecDeque::new(),
                receivers: VecDeque::new(),
            }),
            closed: CachePadded::new(AtomicBool::new(false)),
        }
    }
}

impl<T: Send + 'static> Core<T> for Rendezvous<T> {
    fn put(&self, value: T) -> Result<(), SendError<T>> {
        let mut signals = Vec::new();
        let parked;
        {
            let mut inner = hold(&self.inner);
            if self.is_closed() {
                return Err(SendError(value));
            }
            let value = match hook::deliver(&mut inner.receivers, value, &mut signals) {
                Ok(()) => {
                    drop(inner);
                    hook::fire(&signals);
                    return Ok(());
                }
                Err(value) => value,
            };
            let waiter = pool::obtain();
            let packet = Packet::loaded(value);
            inner
                .senders
                .push_back(Hook::parked(waiter.clone(), packet.clone()));
            parked = (waiter, packet);
        }

        let (waiter, packet) = parked;
        waiter.wait();
        let outcome = match packet.try_take() {
            Some(value) => Err(SendError(value)),
            None => Ok(()),
        };
        hook::retire(waiter);
        outcome
    }

    fn try_put(&self, value: T) -> Result<(), TrySendError<T>> {
        let mut signals = Vec::new();
        {
            let mut inner = hold(&self.inner);
            if self.is_closed() {
                return Err(TrySendError::Closed(value));
            }
            if let Err(value) = hook::deliver(&mut inner.receivers, value, &mut signals) {
                return Err(TrySendError::Full(value));
            }
        }
        hook::fire(&signals);
        Ok(())
    }

    fn get(&self) -> Option<T> {
        enum Outcome<T> {
            Value(T),
            Await(Arc<Packet<T>>),
            Closed,
            Parked(Arc<Waiter>, Arc<Packet<T>>),
        }

        let mut signals = Vec::new();
        let outcome;
        {
            let mut inner = hold(&self.inner);
            outcome = if let Some(found) = hook::collect(&mut inner.senders, &mut signals) {
                match found {
                    Collected::Now(value) => Outcome::Value(value),
                    Collected::Later(packet) => Outcome::Await(packet),
                }
            } else if self.is_closed() {
                Outcome::Closed
            } else {
                let waiter = pool::obtain();
                let packet = Packet::empty();
                inner
                    .receivers
                    .push_back(Hook::parked(waiter.clone(), packet.clone()));
                Outcome::Parked(waiter, packet)
            };
        }
        hook::fire(&signals);

        match outcome {
            Outcome::Value(value) => Some(value),
            Outcome::Await(packet) => packet.take(),
            Outcome::Closed => None,
            Outcome::Parked(waiter, packet) => {
                waiter.wait();
                let out = packet.try_take();
                hook::retire(waiter);
                out
            }
        }
    }

    fn try_get(&self) -> Result<T, TryRecvError> {
        enum Outcome<T> {
            Value(T),
            Await(Arc<Packet<T>>),
            Err(TryRecvError),
        }

        let mut signals = Vec::new();
        let outcome;
        {
            let mut inner = hold(&self.inner);
            outcome = if let Some(found) = hook::collect(&mut inner.senders, &mut signals) {
                match found {
                    Collected::Now(value) => Outcome::Value(value),
                    Collected::Later(packet) => Outcome::Await(packet),
                }
            } else if self.is_closed() {
                Outcome::Err(TryRecvError::Closed)
            } else {
                Outcome::Err(TryRecvError::Empty)
            };
        }
        hook::fire(&signals);

        match outcome {
            Outcome::Value(value) => Ok(value),
            Outcome::Await(packet) => packet.take().ok_or(TryRecvError::Closed),
            Outcome::Err(e) => Err(e),
        }
    }

    fn close(&self) {
        let mut signals = Vec::new();
        {
            let mut inner = hold(&self.inner);
            if self.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            hook::drain_on_close(&mut inner.senders, &mut signals);
            hook::drain_on_close(&mut inner.receivers, &mut signals);
        }
        hook::fire(&signals);
    }

    #[inline]
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// A rendezvous never stores elements: it is empty and full at once.
    fn is_empty(&self) -> bool {
        true
    }

    fn is_full(&self) -> bool {
        true
    }

    fn can_put(&self) -> bool {
        !self.is_closed()
    }

    fn can_get(&self) -> bool {
        !self.is_closed() || !hold(&self.inner).senders.is_empty()
    }

    fn put_now(&self, id: usize) -> Option<Selection> {
        let mut signals = Vec::new();
        let carry;
        {
            let mut inner = hold(&self.inner);
            if self.is_closed() {
                return None;
            }
            carry = hook::reserve_receiver(&mut inner.receivers, &mut signals)?;
        }
        hook::fire(&signals);

        let mut sel = Selection::of(id);
        sel.set_payload(Box::new(carry));
        Some(sel)
    }

    fn get_now(&self, id: usize) -> Option<Selection> {
        let mut signals = Vec::new();
        let carry;
        {
            let mut inner = hold(&self.inner);
            carry = match hook::collect(&mut inner.senders, &mut signals)? {
                Collected::Now(value) => hook::Carry::Value(value),
                Collected::Later(packet) => hook::Carry::Handoff(packet, None),
            };
        }
        hook::fire(&signals);

        let mut sel = Selection::of(id);
        sel.set_payload(Box::new(carry));
        Some(sel)
    }

    fn select_put(&self, ticket: Ticket, sel: Selection) {
        let mut signals = Vec::new();
        {
            let mut inner = hold(&self.inner);
            if self.is_closed() {
                if ticket.claim_pending(State::Invalidated) {
                    signals.push(ticket.into_waiter());
                }
            } else {
                match hook::pair_sender(&mut inner.receivers, ticket, sel, &mut signals) {
                    Pairing::Committed | Pairing::Stopped => {}
                    Pairing::Unpaired(ticket, sel) => {
                        inner
                            .senders
                            .push_back(Hook::selecting(ticket, sel, Packet::empty()));
                    }
                }
            }
        }
        hook::fire(&signals);
    }

    fn select_get(&self, ticket: Ticket, sel: Selection) {
        let mut signals = Vec::new();
        {
            let mut inner = hold(&self.inner);
            match hook::pair_receiver(&mut inner.senders, ticket, sel, &mut signals) {
                Pairing::Committed | Pairing::Stopped => {}
                Pairing::Unpaired(ticket, sel) => {
                    if self.is_closed() {
                        if ticket.claim_pending(State::Invalidated) {
                            signals.push(ticket.into_waiter());
                        }
                    } else {
                        inner
                            .receivers
                            .push_back(Hook::selecting(ticket, sel, Packet::empty()));
                    }
                }
            }
        }
        hook::fire(&signals);
    }

    fn insert(&self, sel: Selection, value: T) -> bool {
        match hook::open::<T>(sel) {
            Some(hook::Carry::Handoff(packet, waiter)) => {
                packet.put(value);
                if let Some(waiter) = waiter {
                    waiter.signal();
                }
                true
            }
            _ => false,
        }
    }

    fn extract(&self, sel: Selection) -> Option<T> {
        match hook::open::<T>(sel)? {
            hook::Carry::Value(value) => Some(value),
            hook::Carry::Handoff(packet, _) => packet.take(),
            _ => {
                debug_assert!(false, "selection does not carry a receive commitment");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::channel;
    use std::thread;
    use std::time::Duration;

    /// One rendezvous: send(x) then receive() yields x.
    #[test]
    fn test_round_trip() {
        let (tx, rx) = channel::<&'static str>(0);
        let sender = thread::spawn(move || tx.send("ping"));
        assert_eq!(rx.recv(), Some("ping"));
        sender.join().unwrap().unwrap();
    }

    /// A sender parks until a receiver shows up.
    #[test]
    fn test_send_blocks_for_receiver() {
        let (tx, rx) = channel::<u8>(0);
        let sender = thread::spawn(move || tx.send(1));
        thread::sleep(Duration::from_millis(20));
        assert!(!sender.is_finished());

        assert_eq!(rx.recv(), Some(1));
        sender.join().unwrap().unwrap();
    }

    /// 0..100 cross the channel in order; close terminates the receiver.
    #[test]
    fn test_sequence_in_order() {
        let (tx, rx) = channel::<u32>(0);
        let sender = thread::spawn(move || {
            for i in 0..100 {
                tx.send(i).unwrap();
            }
            tx.close();
        });

        let mut expected = 0;
        while let Some(v) = rx.recv() {
            assert_eq!(v, expected);
            expected += 1;
        }
        assert_eq!(expected, 100);
        sender.join().unwrap();
    }

    /// Close hands a parked sender its value back.
    #[test]
    fn test_close_rejects_parked_sender() {
        let (tx, rx) = channel::<u8>(0);
        let sender = thread::spawn(move || tx.send(9));
        thread::sleep(Duration::from_millis(20));

        rx.close();
        let err = sender.join().unwrap().expect_err("channel closed");
        assert_eq!(err.0, 9);
    }

    /// try_send finds no pending receiver: Full; a parked receiver: delivery.
    #[test]
    fn test_try_send_needs_pending_receiver() {
        let (tx, rx) = channel::<u8>(0);
        assert!(tx.try_send(1).is_err());

        let receiver = thread::spawn(move || rx.recv());
        thread::sleep(Duration::from_millis(20));
        tx.try_send(2).unwrap();
        assert_eq!(receiver.join().unwrap(), Some(2));
    }

    /// Pending senders are served in park order.
    #[test]
    fn test_parked_senders_fifo() {
        let (tx, rx) = channel::<u8>(0);

        let first = {
            let tx = tx.clone();
            thread::spawn(move || tx.send(1))
        };
        thread::sleep(Duration::from_millis(20));
        let second = thread::spawn(move || tx.send(2));
        thread::sleep(Duration::from_millis(20));

        assert_eq!(rx.recv(), Some(1));
        assert_eq!(rx.recv(), Some(2));
        first.join().unwrap().unwrap();
        second.join().unwrap().unwrap();
    }
}
