use std::sync::Arc;

use super::{Core, SendError, TrySendError, endpoint_id};
use crate::select::{Selectable, Selection, Ticket, sealed};

/// The write half of a channel.
///
/// Clones freely; any number of threads may send through their own handles.
/// Dropping senders does not close the channel — closing is an explicit,
/// cooperative act and either side may do it.
pub struct Sender<T: Send + 'static> {
    chan: Arc<dyn Core<T>>,
}

impl<T: Send + 'static> Sender<T> {
    pub(crate) fn new(chan: Arc<dyn Core<T>>) -> Self {
        Self { chan }
    }

    /// Delivers `value`, blocking while the channel is full and open.
    ///
    /// `Err` hands the value back: the channel was closed either before the
    /// call or while this sender was parked.
    pub fn send(&self, value: T) -> Result<(), SendError<T>> {
        self.chan.put(value)
    }

    /// Delivers `value` only if that needs no blocking.
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        self.chan.try_put(value)
    }

    /// Closes the channel, waking every parked operation on it. Idempotent.
    pub fn close(&self) {
        self.chan.close();
    }

    pub fn is_closed(&self) -> bool {
        self.chan.is_closed()
    }

    /// Possibly-stale hint; an unbuffered channel is always "full".
    pub fn is_full(&self) -> bool {
        self.chan.is_full()
    }

    /// Completes a send commitment obtained from a select.
    ///
    /// Must be called on every selection this endpoint won — a peer may
    /// already be committed to the rendezvous and is waiting for the value.
    /// False means the commitment lapsed (the channel closed first); the
    /// value is dropped.
    pub fn insert(&self, sel: Selection, value: T) -> bool {
        if !sel.is(self) {
            debug_assert!(false, "selection belongs to a different endpoint");
            return false;
        }
        self.chan.insert(sel, value)
    }
}

impl<T: Send + 'static> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            chan: self.chan.clone(),
        }
    }
}

impl<T: Send + 'static> sealed::Sealed for Sender<T> {}

impl<T: Send + 'static> Selectable for Sender<T> {
    fn id(&self) -> usize {
        endpoint_id(&self.chan, 0)
    }

    fn is_selectable(&self) -> bool {
        self.chan.can_put()
    }

    fn select_now(&self) -> Option<Selection> {
        self.chan.put_now(self.id())
    }

    fn select_notify(&self, ticket: Ticket, sel: Selection) {
        self.chan.select_put(ticket, sel);
    }
}

#[cfg(test)]
mod tests {
    use super::super::channel;
    use std::thread;

    /// Clones feed one channel.
    #[test]
    fn test_cloned_senders_share_channel() {
        let (tx, rx) = channel::<u8>(4);
        let other = tx.clone();
        tx.send(1).unwrap();
        other.send(2).unwrap();
        assert_eq!(rx.recv(), Some(1));
        assert_eq!(rx.recv(), Some(2));
    }

    /// Closing through any clone closes for all.
    #[test]
    fn test_close_through_clone() {
        let (tx, rx) = channel::<u8>(1);
        let other = tx.clone();
        other.close();
        assert!(tx.send(1).is_err());
        assert_eq!(rx.recv(), None);
    }

    /// A send endpoint moves across threads.
    #[test]
    fn test_send_across_threads() {
        let (tx, rx) = channel::<String>(0);
        let handle = thread::spawn(move || tx.send(String::from("over")));
        assert_eq!(rx.recv().as_deref(), Some("over"));
        handle.join().unwrap().unwrap();
    }
}
