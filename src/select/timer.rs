use std::{
    sync::{Arc, Mutex, PoisonError},
    thread,
    time::{Duration, Instant},
};

use super::{Selectable, Selection, Ticket, sealed};
use crate::waiter::State;

/// A selectable that becomes ready at a deadline and stays ready.
///
/// Composing a timer into a [`select`](super::select) alongside an
/// operation's endpoint gives cooperative timeout semantics: whichever fires
/// first wins the commit. There is no second phase — a winning selection just
/// identifies the timer.
///
/// ```no_run
/// use std::time::Duration;
/// use staffetta::{Timer, channel, select};
///
/// let (_tx, rx) = channel::<u8>(0);
/// let timeout = Timer::after(Duration::from_millis(50));
/// let sel = select(&[&rx, &timeout]).unwrap();
/// if sel.is(&timeout) {
///     // nothing arrived in time
/// }
/// ```
pub struct Timer {
    inner: Arc<Inner>,
}

struct Inner {
    deadline: Instant,
    pending: Mutex<Pending>,
}

struct Pending {
    registrations: Vec<(Ticket, Selection)>,
    armed: bool,
}

impl Timer {
    /// A timer firing `delay` from now.
    pub fn after(delay: Duration) -> Self {
        Self::at(Instant::now() + delay)
    }

    /// A timer firing at `deadline`.
    pub fn at(deadline: Instant) -> Self {
        Self {
            inner: Arc::new(Inner {
                deadline,
                pending: Mutex::new(Pending {
                    registrations: Vec::new(),
                    armed: false,
                }),
            }),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.inner.deadline
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.inner.deadline
    }
}

impl Inner {
    /// Claims every parked registration. Runs under the pending mutex, at or
    /// after the deadline.
    fn fire(pending: &mut Pending) {
        for (ticket, sel) in pending.registrations.drain(..) {
            if ticket.claim_pending(State::Select) {
                ticket.waiter().set_selection(sel);
                ticket.into_waiter().signal();
            }
        }
    }
}

impl sealed::Sealed for Timer {}

impl Selectable for Timer {
    fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    fn is_selectable(&self) -> bool {
        true
    }

    fn select_now(&self) -> Option<Selection> {
        self.expired().then(|| Selection::of(self.id()))
    }

    fn select_notify(&self, ticket: Ticket, sel: Selection) {
        let mut pending = self
            .inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // The expiry check shares the mutex with the sleeper's drain, so a
        // registration can never slip in after the drain and park forever.
        if self.expired() {
            if ticket.claim_pending(State::Select) {
                ticket.waiter().set_selection(sel);
                drop(pending);
                ticket.into_waiter().signal();
            }
            return;
        }

        pending.registrations.push((ticket, sel));
        if !pending.armed {
            pending.armed = true;
            let inner = self.inner.clone();
            thread::spawn(move || {
                loop {
                    let now = Instant::now();
                    if now >= inner.deadline {
                        break;
                    }
                    thread::sleep(inner.deadline - now);
                }
                let mut pending = inner.pending.lock().unwrap_or_else(PoisonError::into_inner);
                Inner::fire(&mut pending);
            });
        }
    }
}
