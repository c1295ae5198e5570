use std::sync::Arc;

use super::{Selectable, Selection, Ticket, sealed};
use crate::waiter::State;

/// A send target that is always ready and discards whatever it is given.
///
/// Useful as the "drop it" arm of a select when a value must go somewhere
/// but nobody wants it.
pub struct Sink {
    identity: Arc<()>,
}

impl Sink {
    pub fn new() -> Self {
        Self {
            identity: Arc::new(()),
        }
    }

    /// Completes a send commitment by dropping the value. Always succeeds.
    pub fn insert<T>(&self, sel: Selection, value: T) -> bool {
        if !sel.is(self) {
            debug_assert!(false, "selection belongs to a different endpoint");
            return false;
        }
        drop(value);
        true
    }
}

impl Default for Sink {
    fn default() -> Self {
        Self::new()
    }
}

impl sealed::Sealed for Sink {}

impl Selectable for Sink {
    fn id(&self) -> usize {
        Arc::as_ptr(&self.identity) as usize
    }

    fn is_selectable(&self) -> bool {
        true
    }

    fn select_now(&self) -> Option<Selection> {
        Some(Selection::of(self.id()))
    }

    fn select_notify(&self, ticket: Ticket, sel: Selection) {
        if ticket.claim_pending(State::Select) {
            ticket.waiter().set_selection(sel);
            ticket.into_waiter().signal();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chan::channel;

    /// A sink always wins an otherwise-idle select.
    #[test]
    fn test_sink_always_ready() {
        let (_tx, rx) = channel::<u8>(0);
        let sink = Sink::new();
        let sel = super::super::select(&[&rx, &sink]).expect("sink is ready");
        assert!(sel.is(&sink));
        assert!(sink.insert(sel, 1));
    }
}
