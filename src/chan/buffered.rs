use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use crossbeam_utils::CachePadded;

use super::hook::{self, Carry, Collected, Hook, Packet, Pairing, hold};
use super::{Core, SendError, TryRecvError, TrySendError};
use crate::fifo::Fifo;
use crate::pool;
use crate::select::{Selection, Ticket};
use crate::waiter::{State, Waiter};

/// Bounded channel: a FIFO buffer of `capacity` elements plus the two pending
/// queues. A put prefers handing its value straight to a pending receiver
/// over buffering; a get prefers the buffer (oldest first) and backfills
/// freed space from pending senders to keep delivery order intact.
pub(crate) struct Buffered<T> {
    inner: Mutex<Inner<T>>,
    closed: CachePadded<AtomicBool>,
}

struct Inner<T> {
    fifo: Fifo<T>,
    senders: VecDeque<Hook<T>>,
    receivers: VecDeque<Hook<T>>,
    /// Capacity claimed by send-side select commitments awaiting `insert`.
    reserved: usize,
}

impl<T: Send + 'static> Buffered<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                fifo: Fifo::new(capacity),
                senders: VecDeque::new(),
                receivers: VecDeque::new(),
                reserved: 0,
            }),
            closed: CachePadded::new(AtomicBool::new(false)),
        }
    }

    fn room(inner: &Inner<T>) -> bool {
        inner.fifo.len() + inner.reserved < inner.fifo.cap()
    }

    /// Pulls pending senders forward into space that just opened up: plain
    /// parked values move into the buffer, selecting senders are granted a
    /// slot reservation their `insert` will consume.
    fn refill(inner: &mut Inner<T>, signals: &mut Vec<Arc<Waiter>>) {
        while Self::room(inner) {
            let Some(hook) = inner.senders.pop_front() else {
                break;
            };
            match hook.sel {
                Some(mut sel) => {
                    if hook.ticket.claim_pending(State::Select) {
                        inner.reserved += 1;
                        sel.set_payload(Box::new(Carry::<T>::Slot));
                        hook.ticket.waiter().set_selection(sel);
                        signals.push(hook.ticket.into_waiter());
                    }
                }
                None => {
                    if hook.ticket.claim(State::Ready, State::Done) {
                        if let Some(value) = hook.packet.try_take() {
                            inner.fifo.push(value);
                        }
                        signals.push(hook.ticket.into_waiter());
                    }
                }
            }
        }
    }
}

impl<T: Send + 'static> Core<T> for Buffered<T> {
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
            if Self::room(&inner) {
                inner.fifo.push(value);
                return Ok(());
            }
            let waiter = pool::obtain();
            let packet = Packet::loaded(value);
            inner
                .senders
                .push_back(Hook::parked(waiter.clone(), packet.clone()));
            parked = (waiter, packet);
        }

        let (waiter, packet) = parked;
        waiter.wait();
        // Done means a receiver took the packet; anything else is the close
        // path, and the value is still ours to hand back.
        let outcome = match packet.try_take() {
            Some(value) => Err(SendError(value)),
            None => Ok(()),
        };
        hook::retire(waiter);
        outcome
    }

    fn try_put(&self, value: T) -> Result<(), TrySendError<T>> {
        let mut signals = Vec::new();
        let result;
        {
            let mut inner = hold(&self.inner);
            if self.is_closed() {
                return Err(TrySendError::Closed(value));
            }
            result = match hook::deliver(&mut inner.receivers, value, &mut signals) {
                Ok(()) => Ok(()),
                Err(value) => {
                    if Self::room(&inner) {
                        inner.fifo.push(value);
                        Ok(())
                    } else {
                        return Err(TrySendError::Full(value));
                    }
                }
            };
        }
        hook::fire(&signals);
        result
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
            outcome = if !inner.fifo.is_empty() {
                let value = inner.fifo.pop();
                Self::refill(&mut inner, &mut signals);
                Outcome::Value(value)
            } else if let Some(found) = hook::collect(&mut inner.senders, &mut signals) {
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
            outcome = if !inner.fifo.is_empty() {
                let value = inner.fifo.pop();
                Self::refill(&mut inner, &mut signals);
                Outcome::Value(value)
            } else if let Some(found) = hook::collect(&mut inner.senders, &mut signals) {
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
            // the peer's insert is already committed; this resolves promptly
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

    fn is_empty(&self) -> bool {
        hold(&self.inner).fifo.is_empty()
    }

    fn is_full(&self) -> bool {
        let inner = hold(&self.inner);
        !Self::room(&inner)
    }

    fn can_put(&self) -> bool {
        !self.is_closed()
    }

    fn can_get(&self) -> bool {
        let inner = hold(&self.inner);
        !inner.fifo.is_empty() || !inner.senders.is_empty() || !self.is_closed()
    }

    fn put_now(&self, id: usize) -> Option<Selection> {
        let mut signals = Vec::new();
        let carry;
        {
            let mut inner = hold(&self.inner);
            if self.is_closed() {
                return None;
            }
            carry = if let Some(found) = hook::reserve_receiver(&mut inner.receivers, &mut signals)
            {
                found
            } else if Self::room(&inner) {
                inner.reserved += 1;
                Carry::Slot
            } else {
                return None;
            };
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
            carry = if !inner.fifo.is_empty() {
                let value = inner.fifo.pop();
                Self::refill(&mut inner, &mut signals);
                Carry::Value(value)
            } else if let Some(found) = hook::collect(&mut inner.senders, &mut signals) {
                match found {
                    Collected::Now(value) => Carry::Value(value),
                    Collected::Later(packet) => Carry::Handoff(packet, None),
                }
            } else {
                return None;
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
                    Pairing::Unpaired(ticket, mut sel) => {
                        if Self::room(&inner) {
                            if ticket.claim_pending(State::Select) {
                                inner.reserved += 1;
                                sel.set_payload(Box::new(Carry::<T>::Slot));
                                ticket.waiter().set_selection(sel);
                                signals.push(ticket.into_waiter());
                            }
                        } else {
                            inner
                                .senders
                                .push_back(Hook::selecting(ticket, sel, Packet::empty()));
                        }
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
            if !inner.fifo.is_empty() {
                if ticket.claim_pending(State::Select) {
                    let value = inner.fifo.pop();
                    Self::refill(&mut inner, &mut signals);
                    let mut sel = sel;
                    sel.set_payload(Box::new(Carry::Value(value)));
                    ticket.waiter().set_selection(sel);
                    signals.push(ticket.into_waiter());
                }
            } else {
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
        }
        hook::fire(&signals);
    }

    fn insert(&self, sel: Selection, value: T) -> bool {
        match hook::open::<T>(sel) {
            Some(Carry::Handoff(packet, waiter)) => {
                packet.put(value);
                if let Some(waiter) = waiter {
                    waiter.signal();
                }
                true
            }
            Some(Carry::Slot) => {
                let mut signals = Vec::new();
                let delivered;
                {
                    let mut inner = hold(&self.inner);
                    inner.reserved -= 1;
                    if self.is_closed() {
                        delivered = false;
                    } else {
                        delivered = match hook::deliver(&mut inner.receivers, value, &mut signals)
                        {
                            Ok(()) => true,
                            Err(value) => {
                                // the reservation kept this slot free
                                inner.fifo.push(value);
                                true
                            }
                        };
                    }
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
            Carry::Handoff(packet, _) => packet.take(),
            _ => {
                debug_assert!(false, "selection does not carry a receive commitment");
                None
            }
        }
    }
}
