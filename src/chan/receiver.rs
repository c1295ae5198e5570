use std::sync::Arc;

use super::{Core, TryRecvError, endpoint_id};
use crate::select::{Selectable, Selection, Ticket, sealed};

/// The read half of a channel.
///
/// Clones freely; values are delivered to exactly one receiver each. A
/// receiver is also a lazy, finite sequence: iteration yields values until
/// the channel is closed and drained.
pub struct Receiver<T: Send + 'static> {
    chan: Arc<dyn Core<T>>,
}

impl<T: Send + 'static> Receiver<T> {
    pub(crate) fn new(chan: Arc<dyn Core<T>>) -> Self {
        Self { chan }
    }

    /// Takes the oldest value, blocking while the channel is empty and open.
    /// `None` iff the channel is closed and drained.
    pub fn recv(&self) -> Option<T> {
        self.chan.get()
    }

    /// Takes a value only if that needs no blocking.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        self.chan.try_get()
    }

    /// Closes the channel from the consuming side, waking every parked
    /// operation on it. Idempotent.
    pub fn close(&self) {
        self.chan.close();
    }

    pub fn is_closed(&self) -> bool {
        self.chan.is_closed()
    }

    /// Possibly-stale hint; an unbuffered channel is always "empty".
    pub fn is_empty(&self) -> bool {
        self.chan.is_empty()
    }

    /// Completes a receive commitment obtained from a select.
    ///
    /// `None` only if the channel closed between the commit and this call.
    pub fn extract(&self, sel: Selection) -> Option<T> {
        if !sel.is(self) {
            debug_assert!(false, "selection belongs to a different endpoint");
            return None;
        }
        self.chan.extract(sel)
    }

    /// Borrowing iterator over incoming values; ends at closed-and-drained.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter { rx: self }
    }
}

impl<T: Send + 'static> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Self {
            chan: self.chan.clone(),
        }
    }
}

impl<T: Send + 'static> sealed::Sealed for Receiver<T> {}

impl<T: Send + 'static> Selectable for Receiver<T> {
    fn id(&self) -> usize {
        endpoint_id(&self.chan, 1)
    }

    fn is_selectable(&self) -> bool {
        self.chan.can_get()
    }

    fn select_now(&self) -> Option<Selection> {
        self.chan.get_now(self.id())
    }

    fn select_notify(&self, ticket: Ticket, sel: Selection) {
        self.chan.select_get(ticket, sel);
    }
}

pub struct Iter<'a, T: Send + 'static> {
    rx: &'a Receiver<T>,
}

impl<T: Send + 'static> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.rx.recv()
    }
}

pub struct IntoIter<T: Send + 'static> {
    rx: Receiver<T>,
}

impl<T: Send + 'static> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.rx.recv()
    }
}

impl<T: Send + 'static> IntoIterator for Receiver<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> IntoIter<T> {
        IntoIter { rx: self }
    }
}

impl<'a, T: Send + 'static> IntoIterator for &'a Receiver<T> {
    type Item = T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::super::channel;
    use std::thread;

    /// Iteration yields everything sent, then ends at the close.
    #[test]
    fn test_iteration_until_close() {
        let (tx, rx) = channel::<u32>(2);
        let producer = thread::spawn(move || {
            for i in 0..10 {
                tx.send(i).unwrap();
            }
            tx.close();
        });

        let got: Vec<u32> = rx.iter().collect();
        assert_eq!(got, (0..10).collect::<Vec<u32>>());
        producer.join().unwrap();
    }

    /// for-loop sugar over the owning iterator.
    #[test]
    fn test_into_iter() {
        let (tx, rx) = channel::<u8>(4);
        tx.send(1).unwrap();
        tx.send(2).unwrap();
        tx.close();

        let mut sum = 0;
        for v in rx {
            sum += v;
        }
        assert_eq!(sum, 3);
    }

    /// Competing cloned receivers split the stream without duplicates.
    #[test]
    fn test_cloned_receivers_split_stream() {
        let (tx, rx) = channel::<usize>(0);
        let other = rx.clone();

        let first = thread::spawn(move || rx.iter().count());
        let second = thread::spawn(move || other.iter().count());

        for i in 0..100 {
            tx.send(i).unwrap();
        }
        tx.close();

        let total = first.join().unwrap() + second.join().unwrap();
        assert_eq!(total, 100);
    }
}
