use std::sync::{Arc, Mutex, PoisonError};

use crate::waiter::Waiter;

/// Upper bound on parked waiters kept for reuse. Excess releases just drop.
const POOL_CAP: usize = 32;

static FREE: Mutex<Vec<Arc<Waiter>>> = Mutex::new(Vec::new());

/// Hands out a waiter in `Ready` state with an empty payload, recycling a
/// parked one when available. Amortises the condvar allocation across the
/// blocking hot paths.
pub(crate) fn obtain() -> Arc<Waiter> {
    let recycled = FREE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .pop();
    recycled.unwrap_or_else(|| Arc::new(Waiter::new()))
}

/// Returns a waiter whose terminal state has been observed. The reset bumps
/// the generation, so queue entries left behind by this use can never claim it
/// again.
pub(crate) fn release(waiter: Arc<Waiter>) {
    waiter.reset();
    let mut free = FREE.lock().unwrap_or_else(PoisonError::into_inner);
    if free.len() < POOL_CAP {
        free.push(waiter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waiter::State;

    /// Obtained waiters always start out Ready and unclaimed.
    #[test]
    fn test_obtain_is_ready() {
        let w = obtain();
        assert_eq!(w.state(), State::Ready);
        assert!(w.take_selection().is_none());
        release(w);
    }

    /// A released waiter comes back rearmed with a newer generation.
    #[test]
    fn test_release_rearms() {
        let w = obtain();
        let generation = w.generation();
        assert!(w.transition(State::Ready, State::WaitSelect));
        assert!(w.transition(State::WaitSelect, State::Invalidated));
        assert!(w.transition(State::Invalidated, State::Done));
        w.signal();
        release(w.clone());

        assert_eq!(w.state(), State::Ready);
        assert!(w.generation() > generation);
    }
}
