use std::{
    cell::UnsafeCell,
    collections::VecDeque,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use crossbeam_utils::Backoff;

use crate::select::{Selection, Ticket};
use crate::waiter::{State, Waiter};

/// Poison-tolerant lock. A panic inside a critical section here can only come
/// from a user type's `Drop` running while a stale queue entry is discarded;
/// the protected state is still consistent at every await point, so the
/// channel keeps working instead of propagating the poison.
#[inline]
pub(crate) fn hold<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A one-value handoff cell shared between the two sides of a rendezvous.
///
/// The writer stores the value and releases the `ready` flag; the reader
/// acquires the flag before touching the cell. For a parked sender the packet
/// is born loaded, so a claimer can take the value without any spin.
pub(crate) struct Packet<T> {
    ready: AtomicBool,
    value: UnsafeCell<Option<T>>,
}

unsafe impl<T: Send> Send for Packet<T> {}
unsafe impl<T: Send> Sync for Packet<T> {}

impl<T> Packet<T> {
    pub(crate) fn empty() -> Arc<Self> {
        Arc::new(Self {
            ready: AtomicBool::new(false),
            value: UnsafeCell::new(None),
        })
    }

    pub(crate) fn loaded(value: T) -> Arc<Self> {
        Arc::new(Self {
            ready: AtomicBool::new(true),
            value: UnsafeCell::new(Some(value)),
        })
    }

    /// Deposits the value and publishes it. Caller must hold the claim on the
    /// packet's waiter; at most one writer ever reaches this.
    pub(crate) fn put(&self, value: T) {
        unsafe { *self.value.get() = Some(value) };
        self.ready.store(true, Ordering::Release);
    }

    /// Takes the value if it has been published.
    pub(crate) fn try_take(&self) -> Option<T> {
        if self.ready.load(Ordering::Acquire) {
            unsafe { (*self.value.get()).take() }
        } else {
            None
        }
    }

    /// Spins until the peer publishes, then takes the value. The wait is
    /// bounded by the peer's second-phase commit, which is already underway
    /// when anyone gets here.
    pub(crate) fn take(&self) -> Option<T> {
        let backoff = Backoff::new();
        while !self.ready.load(Ordering::Acquire) {
            backoff.snooze();
        }
        unsafe { (*self.value.get()).take() }
    }
}

/// What a committed [`Selection`] carries into the second phase.
pub(crate) enum Carry<T> {
    /// A receive committed with the value already moved out of the channel.
    Value(T),
    /// A direct handoff through a shared packet. The send side `insert`s into
    /// the packet and signals the optional parked waiter; the receive side
    /// takes from it.
    Handoff(Arc<Packet<T>>, Option<Arc<Waiter>>),
    /// A buffered-channel capacity reservation held until `insert`.
    Slot,
    /// A singleton commitment; the second phase goes back through the channel.
    Shot,
}

/// Downcasts a selection payload to this channel's carry type.
///
/// A `None` means the selection was handed to an endpoint it does not belong
/// to — a contract violation, trapped in debug builds.
pub(crate) fn open<T: Send + 'static>(sel: Selection) -> Option<Carry<T>> {
    let payload = sel.take_payload()?;
    match payload.downcast::<Carry<T>>() {
        Ok(carry) => Some(*carry),
        Err(_) => {
            debug_assert!(false, "selection presented to a foreign endpoint");
            None
        }
    }
}

/// One entry in a channel's pending queue: a claimable ticket, the packet the
/// transfer goes through, and — for select registrations — the selection
/// template to deposit on claim. `sel.is_none()` marks a plain parked
/// operation (waiter in `Ready`); `Some` marks a selecting one (`WaitSelect`).
pub(crate) struct Hook<T> {
    pub(crate) ticket: Ticket,
    pub(crate) packet: Arc<Packet<T>>,
    pub(crate) sel: Option<Selection>,
}

impl<T> Hook<T> {
    pub(crate) fn parked(waiter: Arc<Waiter>, packet: Arc<Packet<T>>) -> Self {
        let generation = waiter.generation();
        Self {
            ticket: Ticket::new(waiter, generation),
            packet,
            sel: None,
        }
    }

    pub(crate) fn selecting(ticket: Ticket, sel: Selection, packet: Arc<Packet<T>>) -> Self {
        Self {
            ticket,
            packet,
            sel: Some(sel),
        }
    }
}

/// Outcome of claiming a pending sender for a value needed right now.
pub(crate) enum Collected<T> {
    /// A plain parked sender: the value is in hand, signal it after unlock.
    Now(T),
    /// A selecting sender committed to us; its `insert` will fill the packet.
    Later(Arc<Packet<T>>),
}

/// Hands `value` to the first claimable pending receiver, FIFO order. Claimed
/// waiters are appended to `signals` for the caller to fire after it releases
/// the channel mutex. Entries whose claim fails are dead and dropped.
pub(crate) fn deliver<T: Send + 'static>(
    receivers: &mut VecDeque<Hook<T>>,
    mut value: T,
    signals: &mut Vec<Arc<Waiter>>,
) -> Result<(), T> {
    while let Some(hook) = receivers.pop_front() {
        match hook.sel {
            Some(mut sel) => {
                if hook.ticket.claim_pending(State::Select) {
                    hook.packet.put(value);
                    sel.set_payload(Box::new(Carry::Handoff(hook.packet, None)));
                    hook.ticket.waiter().set_selection(sel);
                    signals.push(hook.ticket.into_waiter());
                    return Ok(());
                }
            }
            None => {
                if hook.ticket.claim(State::Ready, State::Done) {
                    hook.packet.put(value);
                    signals.push(hook.ticket.into_waiter());
                    return Ok(());
                }
            }
        }
        // claim failed: the entry is dead, try the next one
    }
    Err(value)
}

/// Claims the first pending sender for immediate consumption, FIFO order.
pub(crate) fn collect<T: Send + 'static>(
    senders: &mut VecDeque<Hook<T>>,
    signals: &mut Vec<Arc<Waiter>>,
) -> Option<Collected<T>> {
    while let Some(hook) = senders.pop_front() {
        match hook.sel {
            Some(mut sel) => {
                if hook.ticket.claim_pending(State::Select) {
                    sel.set_payload(Box::new(Carry::Handoff(hook.packet.clone(), None)));
                    hook.ticket.waiter().set_selection(sel);
                    signals.push(hook.ticket.into_waiter());
                    return Some(Collected::Later(hook.packet));
                }
            }
            None => {
                if hook.ticket.claim(State::Ready, State::Done) {
                    let value = hook.packet.try_take();
                    signals.push(hook.ticket.into_waiter());
                    // a plain parked sender's packet is born loaded
                    if let Some(value) = value {
                        return Some(Collected::Now(value));
                    }
                }
            }
        }
    }
    None
}

/// A claim on a pending receiver made *before* the value exists (send-side
/// select commit). The value arrives at `insert`.
pub(crate) fn reserve_receiver<T: Send + 'static>(
    receivers: &mut VecDeque<Hook<T>>,
    signals: &mut Vec<Arc<Waiter>>,
) -> Option<Carry<T>> {
    while let Some(hook) = receivers.pop_front() {
        match hook.sel {
            Some(mut sel) => {
                if hook.ticket.claim_pending(State::Select) {
                    // The peer select commits now and its extract spins on the
                    // packet until our insert fills it.
                    sel.set_payload(Box::new(Carry::Handoff(hook.packet.clone(), None)));
                    hook.ticket.waiter().set_selection(sel);
                    signals.push(hook.ticket.waiter().clone());
                    return Some(Carry::Handoff(hook.packet, None));
                }
            }
            None => {
                if hook.ticket.claim(State::Ready, State::Done) {
                    // Keep the plain receiver parked until insert delivers.
                    let waiter = hook.ticket.into_waiter();
                    return Some(Carry::Handoff(hook.packet, Some(waiter)));
                }
            }
        }
    }
    None
}

/// Fires a batch of wakeups. Callers collect claimed waiters while holding
/// the channel mutex and signal here after releasing it.
pub(crate) fn fire(signals: &[Arc<Waiter>]) {
    for waiter in signals {
        waiter.signal();
    }
}

/// Retires a plain parked waiter after its owner observed the outcome, and
/// returns it to the pool.
pub(crate) fn retire(waiter: Arc<Waiter>) {
    if waiter.state() != State::Done {
        let invalidated = waiter.transition(State::Invalidated, State::Done);
        debug_assert!(invalidated);
    }
    crate::pool::release(waiter);
}

/// How a select registration resolved against the opposite pending queue.
pub(crate) enum Pairing {
    /// The registration committed (selection deposited, signals queued).
    Committed,
    /// The registering waiter was claimed mid-pairing, by another channel or
    /// by the peer that had it reserved; the registration is over and the
    /// peer reservation here was retracted.
    Stopped,
    /// No live peer was waiting; the caller decides what happens next.
    Unpaired(Ticket, Selection),
}

/// Pairs a registering *sender* select with a pending receiver.
///
/// A plain peer is reserved `Ready -> Done` under the channel mutex (nothing
/// else can touch it there); a selecting peer lives on other channels' queues
/// too, so it is reserved through the retractable `DoubleSelect` state before
/// this side commits itself. Either way the commitment is a shared packet the
/// caller's `insert` later fills.
pub(crate) fn pair_sender<T: Send + 'static>(
    receivers: &mut VecDeque<Hook<T>>,
    ticket: Ticket,
    mut sel: Selection,
    signals: &mut Vec<Arc<Waiter>>,
) -> Pairing {
    while let Some(hook) = receivers.pop_front() {
        match hook.sel {
            Some(mut peer_sel) => {
                if !hook.ticket.claim_pending(State::DoubleSelect) {
                    continue;
                }
                if !ticket.claim(State::WaitSelect, State::Select) {
                    // Undo the reservation first, then find out whether our
                    // own waiter was merely reserved (retry) or truly claimed.
                    let retracted = hook.ticket.claim(State::DoubleSelect, State::WaitSelect);
                    debug_assert!(retracted);
                    receivers.push_front(Hook::selecting(hook.ticket, peer_sel, hook.packet));
                    if ticket.await_reservation() {
                        continue;
                    }
                    return Pairing::Stopped;
                }
                // Both sides are past the point of no return; they meet on the
                // peer's packet (its extract waits there for our insert). The
                // peer is normalized out of DoubleSelect *here*, before the
                // signal: the reserved tag must never outlive the commit, or a
                // peer spinning in its own registration could not tell a
                // finished rendezvous from a reservation still in flight.
                peer_sel.set_payload(Box::new(Carry::Handoff(hook.packet.clone(), None)));
                hook.ticket.waiter().set_selection(peer_sel);
                let normalized = hook.ticket.claim(State::DoubleSelect, State::Select);
                debug_assert!(normalized);
                signals.push(hook.ticket.into_waiter());

                sel.set_payload(Box::new(Carry::Handoff(hook.packet, None)));
                ticket.waiter().set_selection(sel);
                signals.push(ticket.into_waiter());
                return Pairing::Committed;
            }
            None => {
                if !hook.ticket.claim(State::Ready, State::Done) {
                    continue;
                }
                if !ticket.claim(State::WaitSelect, State::Select) {
                    let retracted = hook.ticket.claim(State::Done, State::Ready);
                    debug_assert!(retracted);
                    receivers.push_front(hook);
                    if ticket.await_reservation() {
                        continue;
                    }
                    return Pairing::Stopped;
                }
                // The plain receiver stays parked until insert loads the
                // packet and fires the carried waiter.
                sel.set_payload(Box::new(Carry::Handoff(
                    hook.packet,
                    Some(hook.ticket.into_waiter()),
                )));
                ticket.waiter().set_selection(sel);
                signals.push(ticket.into_waiter());
                return Pairing::Committed;
            }
        }
    }
    Pairing::Unpaired(ticket, sel)
}

/// Pairs a registering *receiver* select with a pending sender. Mirror image
/// of [`pair_sender`]; a plain peer's packet is born loaded so the extract is
/// immediate, a selecting peer's packet fills at its insert.
pub(crate) fn pair_receiver<T: Send + 'static>(
    senders: &mut VecDeque<Hook<T>>,
    ticket: Ticket,
    mut sel: Selection,
    signals: &mut Vec<Arc<Waiter>>,
) -> Pairing {
    while let Some(hook) = senders.pop_front() {
        match hook.sel {
            Some(mut peer_sel) => {
                if !hook.ticket.claim_pending(State::DoubleSelect) {
                    continue;
                }
                if !ticket.claim(State::WaitSelect, State::Select) {
                    let retracted = hook.ticket.claim(State::DoubleSelect, State::WaitSelect);
                    debug_assert!(retracted);
                    senders.push_front(Hook::selecting(hook.ticket, peer_sel, hook.packet));
                    if ticket.await_reservation() {
                        continue;
                    }
                    return Pairing::Stopped;
                }
                // Commit the reserved peer fully (deposit, normalize out of
                // DoubleSelect) before the signal; see pair_sender.
                peer_sel.set_payload(Box::new(Carry::Handoff(hook.packet.clone(), None)));
                hook.ticket.waiter().set_selection(peer_sel);
                let normalized = hook.ticket.claim(State::DoubleSelect, State::Select);
                debug_assert!(normalized);
                signals.push(hook.ticket.into_waiter());

                sel.set_payload(Box::new(Carry::Handoff(hook.packet, None)));
                ticket.waiter().set_selection(sel);
                signals.push(ticket.into_waiter());
                return Pairing::Committed;
            }
            None => {
                if !hook.ticket.claim(State::Ready, State::Done) {
                    continue;
                }
                // Move the value out before the sender can wake: a parked
                // sender whose packet is empty knows it was delivered.
                let Some(value) = hook.packet.try_take() else {
                    // a plain parked sender is always loaded; wake it anyway
                    signals.push(hook.ticket.into_waiter());
                    continue;
                };
                if !ticket.claim(State::WaitSelect, State::Select) {
                    hook.packet.put(value);
                    let retracted = hook.ticket.claim(State::Done, State::Ready);
                    debug_assert!(retracted);
                    senders.push_front(hook);
                    if ticket.await_reservation() {
                        continue;
                    }
                    return Pairing::Stopped;
                }
                sel.set_payload(Box::new(Carry::Value(value)));
                ticket.waiter().set_selection(sel);
                signals.push(hook.ticket.into_waiter());
                signals.push(ticket.into_waiter());
                return Pairing::Committed;
            }
        }
    }
    Pairing::Unpaired(ticket, sel)
}

/// Invalidates every claimable entry on a queue. Plain waiters wake to observe
/// the closed channel; selecting waiters surface the null sentinel.
pub(crate) fn drain_on_close<T>(queue: &mut VecDeque<Hook<T>>, signals: &mut Vec<Arc<Waiter>>) {
    while let Some(hook) = queue.pop_front() {
        let claimed = match hook.sel {
            Some(_) => hook.ticket.claim_pending(State::Invalidated),
            None => hook.ticket.claim(State::Ready, State::Invalidated),
        };
        if claimed {
            signals.push(hook.ticket.into_waiter());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool;

    /// A loaded packet gives its value up exactly once.
    #[test]
    fn test_packet_single_take() {
        let packet = Packet::loaded(7);
        assert_eq!(packet.try_take(), Some(7));
        assert_eq!(packet.try_take(), None);
    }

    /// An empty packet publishes only after put.
    #[test]
    fn test_packet_publish() {
        let packet = Packet::empty();
        assert_eq!(packet.try_take(), None);
        packet.put(3);
        assert_eq!(packet.take(), Some(3));
    }

    /// Delivery claims parked receivers in FIFO order.
    #[test]
    fn test_deliver_fifo() {
        let mut receivers = VecDeque::new();
        let mut signals = Vec::new();

        let first = pool::obtain();
        let first_packet = Packet::empty();
        receivers.push_back(Hook::parked(first.clone(), first_packet.clone()));

        let second = pool::obtain();
        let second_packet = Packet::empty();
        receivers.push_back(Hook::parked(second.clone(), second_packet.clone()));

        assert!(deliver(&mut receivers, 1, &mut signals).is_ok());
        assert_eq!(first_packet.try_take(), Some(1));
        assert_eq!(second_packet.try_take(), None);
        assert_eq!(signals.len(), 1);
        assert_eq!(receivers.len(), 1);
    }

    /// A queue of dead entries delivers to nobody and hands the value back.
    #[test]
    fn test_deliver_skips_dead_entries() {
        let mut receivers = VecDeque::new();
        let mut signals = Vec::new();

        let stale = pool::obtain();
        let packet = Packet::empty();
        receivers.push_back(Hook::parked(stale.clone(), packet));
        pool::release(stale); // generation moves on; the entry can never claim

        assert_eq!(deliver(&mut receivers, 9, &mut signals), Err(9));
        assert!(signals.is_empty());
        assert!(receivers.is_empty());
    }
}
