//! Typed synchronous channels in three capacity regimes.
//!
//! A channel is a shared rendezvous point between [`Sender`] and [`Receiver`]
//! handles. The capacity chosen at construction picks the state machine:
//!
//! | Factory | Regime | Synchronous completion |
//! |---|---|---|
//! | [`channel(0)`](channel) | unbuffered rendezvous | direct handoff with a parked peer |
//! | [`channel(n)`](channel) | bounded buffer of `n` | buffer slot, or handoff past the buffer |
//! | [`oneshot()`](oneshot) | single-shot | first send resolves and closes |
//!
//! Every operation that cannot complete synchronously parks the calling
//! thread on a pooled waiter semaphore; the matching operation on the other
//! side (or [`close`](Sender::close)) claims the waiter, transfers the value
//! and wakes it. Waiters on opposite sides of one channel never coexist.

use std::sync::Arc;

pub(crate) mod hook;

mod buffered;
mod error;
mod receiver;
mod rendezvous;
mod sender;
mod singleton;

pub use error::{SendError, TryRecvError, TrySendError};
pub use receiver::{IntoIter, Iter, Receiver};
pub use sender::Sender;

use crate::select::{Selection, Ticket};
use buffered::Buffered;
use rendezvous::Rendezvous;
use singleton::Singleton;

/// The contract every channel variant implements; endpoints forward to it.
///
/// The sync half blocks; the select half never does — it either commits
/// against the caller's waiter or parks a registration. `insert` and
/// `extract` are the second phase of a select commitment.
pub(crate) trait Core<T: Send>: Send + Sync {
    fn put(&self, value: T) -> Result<(), SendError<T>>;
    fn try_put(&self, value: T) -> Result<(), TrySendError<T>>;
    fn get(&self) -> Option<T>;
    fn try_get(&self) -> Result<T, TryRecvError>;
    fn close(&self);
    fn is_closed(&self) -> bool;
    fn is_empty(&self) -> bool;
    fn is_full(&self) -> bool;

    /// Is the send side still conceivably able to complete?
    fn can_put(&self) -> bool;
    /// Is the receive side still conceivably able to produce?
    fn can_get(&self) -> bool;
    /// Non-blocking send-side commit for select phase A.
    fn put_now(&self, id: usize) -> Option<Selection>;
    /// Non-blocking receive-side commit for select phase A.
    fn get_now(&self, id: usize) -> Option<Selection>;
    /// Send-side select registration: complete against the ticket or park it.
    fn select_put(&self, ticket: Ticket, sel: Selection);
    /// Receive-side select registration.
    fn select_get(&self, ticket: Ticket, sel: Selection);
    /// Second-phase send commit. False when the commitment lapsed (closed).
    fn insert(&self, sel: Selection, value: T) -> bool;
    /// Second-phase receive commit.
    fn extract(&self, sel: Selection) -> Option<T>;
}

/// Select identity of an endpoint: the channel's address tagged with the
/// direction in the low bit (channel structs are comfortably over-aligned for
/// that). Clones of an endpoint share one identity; the two directions over
/// one channel get two.
pub(crate) fn endpoint_id<T: Send>(chan: &Arc<dyn Core<T>>, direction: usize) -> usize {
    let addr = Arc::as_ptr(chan) as *const () as usize;
    debug_assert!(addr & 1 == 0);
    addr | direction
}

/// Creates a channel and returns its two endpoints.
///
/// Capacity `0` builds the unbuffered rendezvous variant; `n >= 1` builds the
/// bounded buffer. Endpoints are cheap handles and clone freely; the channel
/// lives as long as any endpoint does.
pub fn channel<T: Send + 'static>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let chan: Arc<dyn Core<T>> = if capacity == 0 {
        Arc::new(Rendezvous::new())
    } else {
        Arc::new(Buffered::new(capacity))
    };
    (Sender::new(chan.clone()), Receiver::new(chan))
}

/// Creates a single-shot channel: at most one value crosses it, ever, and a
/// successful send closes it atomically.
pub fn oneshot<T: Send + 'static>() -> (Sender<T>, Receiver<T>) {
    let chan: Arc<dyn Core<T>> = Arc::new(Singleton::new());
    (Sender::new(chan.clone()), Receiver::new(chan))
}
