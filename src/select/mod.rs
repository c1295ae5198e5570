//! Multiplexing over heterogeneous pending operations.
//!
//! [`select`] commits to exactly one ready operation among a set of
//! [`Selectable`] options — send endpoints, receive endpoints, [`Timer`]s,
//! [`Sink`]s — or blocks until one becomes ready. [`try_select`] is the
//! non-blocking variant: `None` plays the role of Go's `default` case.
//!
//! ## Commit protocol
//!
//! A select call owns one pooled waiter. Options are first polled in a freshly
//! shuffled order (the fairness mechanism — nothing stronger is promised); if
//! none completes synchronously, the waiter is armed (`WaitSelect`) and
//! registered with every still-live option, again in shuffled order. The first
//! selectable to win the compare-and-swap on the waiter's state owns the
//! commit: it deposits a [`Selection`] and signals. Everyone else's claim
//! fails and their queue entries die in place, to be skipped lazily.
//!
//! The returned [`Selection`] is a commit token. For a receive option the
//! caller finishes with [`Receiver::extract`](crate::chan::Receiver::extract);
//! for a send option the caller **must** finish with
//! [`Sender::insert`](crate::chan::Sender::insert) — a peer may already be
//! committed to the rendezvous and is waiting on that second phase.
//!
//! ## Example
//!
//! ```
//! use staffetta::{channel, select};
//!
//! let (tx, rx) = channel::<u32>(1);
//! tx.send(7).unwrap();
//!
//! let sel = select(&[&rx]).unwrap();
//! assert!(sel.is(&rx));
//! assert_eq!(rx.extract(sel), Some(7));
//! ```

use std::{any::Any, sync::Arc};

use crossbeam_utils::Backoff;

use crate::pool;
use crate::waiter::{State, Waiter};

mod sink;
mod timer;

pub use sink::Sink;
pub use timer::Timer;

/// A commit token identifying the one operation a select committed to.
///
/// Compare against the participating options with [`Selection::is`], then hand
/// the token to the matching endpoint's second-phase method (`extract` for a
/// receive, `insert` for a send). A token whose [`is_null`](Selection::is_null)
/// is true reports that the registration was consumed by a non-producing path
/// (a channel closed mid-wait); it matches no option and a caller typically
/// just selects again.
pub struct Selection {
    id: usize,
    payload: Option<Box<dyn Any + Send>>,
}

impl Selection {
    pub(crate) fn of(id: usize) -> Self {
        Self { id, payload: None }
    }

    pub(crate) fn null() -> Self {
        Self {
            id: 0,
            payload: None,
        }
    }

    pub(crate) fn set_payload(&mut self, payload: Box<dyn Any + Send>) {
        self.payload = Some(payload);
    }

    pub(crate) fn take_payload(self) -> Option<Box<dyn Any + Send>> {
        self.payload
    }

    /// Does this token identify `option`?
    pub fn is<S: Selectable + ?Sized>(&self, option: &S) -> bool {
        self.id == option.id()
    }

    /// True for the sentinel produced when a registration was invalidated.
    pub fn is_null(&self) -> bool {
        self.id == 0
    }
}

impl std::fmt::Debug for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selection")
            .field("id", &self.id)
            .field("committed", &self.payload.is_some())
            .finish()
    }
}

/// A claimable handle to a pending select, handed to each option during
/// registration. The generation pins the claim to this select call: once the
/// waiter is recycled, every ticket left behind in some queue goes dead.
pub struct Ticket {
    waiter: Arc<Waiter>,
    generation: usize,
}

impl Ticket {
    pub(crate) fn new(waiter: Arc<Waiter>, generation: usize) -> Self {
        Self { waiter, generation }
    }

    pub(crate) fn claim(&self, from: State, to: State) -> bool {
        self.waiter.claim(self.generation, from, to)
    }

    /// Claims a pending select (`WaitSelect -> to`), spinning through a
    /// transient `DoubleSelect` reservation instead of declaring the entry
    /// dead. Reservations are never held across a wait, so the spin is
    /// bounded by the reserver's critical section.
    pub(crate) fn claim_pending(&self, to: State) -> bool {
        let backoff = Backoff::new();
        loop {
            if self.waiter.claim(self.generation, State::WaitSelect, to) {
                return true;
            }
            if self.waiter.generation() != self.generation {
                return false;
            }
            match self.waiter.state() {
                State::DoubleSelect => backoff.snooze(),
                // lost a momentary race; the CAS decides
                State::WaitSelect => {}
                _ => return false,
            }
        }
    }

    /// Waits out a reservation of this select's own waiter after a failed
    /// self-commit. True if the waiter returned to `WaitSelect` (retry the
    /// pairing); false if it was committed or invalidated meanwhile — a
    /// commit always lands the tag on `Select` before the signal, so a
    /// `DoubleSelect` seen here is a reservation still in flight, never a
    /// finished rendezvous. Must not be called while holding a reservation
    /// on a peer.
    pub(crate) fn await_reservation(&self) -> bool {
        let backoff = Backoff::new();
        loop {
            if self.waiter.generation() != self.generation {
                return false;
            }
            match self.waiter.state() {
                State::WaitSelect => return true,
                State::DoubleSelect => backoff.snooze(),
                _ => return false,
            }
        }
    }

    pub(crate) fn waiter(&self) -> &Arc<Waiter> {
        &self.waiter
    }

    pub(crate) fn into_waiter(self) -> Arc<Waiter> {
        self.waiter
    }
}

pub(crate) mod sealed {
    /// Seals [`Selectable`](super::Selectable): committing an arm requires
    /// the crate-internal claim handshake on the waiter, so the set of
    /// selectable types is fixed here.
    pub trait Sealed {}
}

/// Anything that can be one arm of a [`select`].
///
/// Implemented by [`Sender`](crate::chan::Sender),
/// [`Receiver`](crate::chan::Receiver), [`Timer`] and [`Sink`]; `select`
/// composes over `&dyn Selectable` without caring which. The second phase of
/// a commitment (`extract`/`insert`) lives on the concrete types; the
/// [`Selection`]'s identity says which one applies.
///
/// This trait is sealed. Committing an arm means winning a compare-and-swap
/// on the select's pooled waiter and depositing a payload the matching
/// endpoint knows how to open — a handshake that is not part of the public
/// API, so outside implementations are not possible.
pub trait Selectable: sealed::Sealed {
    /// Stable identity compared against [`Selection::is`]. Never zero (zero is
    /// the null sentinel).
    fn id(&self) -> usize;

    /// Can this option still conceivably complete? A receive endpoint over a
    /// closed, drained channel is not selectable; dead options are skipped and
    /// a set with no live option makes `select` return `None`.
    fn is_selectable(&self) -> bool;

    /// Attempts to commit right now, without parking. `Some` is a full
    /// commitment.
    fn select_now(&self) -> Option<Selection>;

    /// Registers a pending select with this option: either complete
    /// immediately by claiming the ticket, or park it for a later claim.
    fn select_notify(&self, ticket: Ticket, sel: Selection);
}

fn shuffled(len: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    fastrand::shuffle(&mut order);
    order
}

/// Non-blocking select: polls the options in freshly shuffled order and
/// returns the first synchronous commitment, or `None` when nothing is ready
/// right now. `None` is the "default case" of a classic select.
pub fn try_select(options: &[&dyn Selectable]) -> Option<Selection> {
    for i in shuffled(options.len()) {
        let option = options[i];
        if option.is_selectable() {
            if let Some(sel) = option.select_now() {
                return Some(sel);
            }
        }
    }
    None
}

/// Blocking select: commits to exactly one ready operation among `options`,
/// parking the calling thread until one becomes ready.
///
/// Returns `None` when the set is effectively empty — zero options, or none of
/// them selectable any more. Returns a [null](Selection::is_null) token when
/// the pending registration was invalidated (a channel closed mid-wait)
/// without producing an operation.
pub fn select(options: &[&dyn Selectable]) -> Option<Selection> {
    // Phase A: synchronous poll, randomized so simultaneously-ready options
    // share the commits uniformly.
    let mut live = false;
    for i in shuffled(options.len()) {
        let option = options[i];
        if option.is_selectable() {
            live = true;
            if let Some(sel) = option.select_now() {
                return Some(sel);
            }
        }
    }
    if !live {
        return None;
    }

    // Phase B: park one shared waiter with every live option.
    let waiter = pool::obtain();
    let armed = waiter.transition(State::Ready, State::WaitSelect);
    debug_assert!(armed);
    let generation = waiter.generation();

    let mut registered = 0usize;
    for i in shuffled(options.len()) {
        let option = options[i];
        if !option.is_selectable() {
            continue;
        }
        option.select_notify(
            Ticket::new(waiter.clone(), generation),
            Selection::of(option.id()),
        );
        registered += 1;
        // A transient DoubleSelect is someone mid-reservation; it either
        // commits (signal coming) or retracts (entries stay live), so only a
        // settled claim justifies skipping the rest.
        if matches!(waiter.state(), State::Select | State::Invalidated) {
            break;
        }
    }

    if registered == 0 {
        // Every option died between the poll and the registration pass; the
        // waiter was never exposed, so it can be retired directly.
        let retired = waiter.transition(State::WaitSelect, State::Done);
        debug_assert!(retired);
        pool::release(waiter);
        return None;
    }

    // Every claim signals exactly once; the token is remembered, so this
    // returns immediately when a registration completed synchronously.
    waiter.wait();

    // Only two states survive the signal: a commit parks the tag on Select
    // before waking us (DoubleSelect reservations are resolved by their
    // holder, never left behind), and a close parks it on Invalidated.
    let sel = match waiter.state() {
        State::Select => {
            let done = waiter.transition(State::Select, State::Done);
            debug_assert!(done);
            waiter.take_selection()
        }
        _ => {
            // Invalidated: consumed by a close without producing an operation.
            let done = waiter.transition(State::Invalidated, State::Done);
            debug_assert!(done);
            None
        }
    };

    pool::release(waiter);
    Some(sel.unwrap_or_else(Selection::null))
}
