//! Go-style synchronous channels for Rust threads
//!
//! Typed channels over which concurrent threads rendezvous to coordinate work
//! and transfer ownership, plus a [`select()`] multiplexer that commits to
//! exactly one ready operation among a heterogeneous set of pending sends and
//! receives.
//!
//! ## Channel regimes
//!
//! | Factory | Capacity | Behavior |
//! |---------|----------|----------|
//! | [`channel(0)`](channel) | none | pure rendezvous: a send completes only by meeting a receive |
//! | [`channel(n)`](channel) | `n` | bounded FIFO buffer; senders block when it is full |
//! | [`oneshot()`](oneshot) | one, ever | the first send resolves and closes the channel |
//!
//! ## How a blocked operation works
//!
//!```text
//!  sender thread                 channel                 receiver thread
//!       │      put(x): no peer ──►│
//!       │      park on waiter ────┤ senders: [waiter(x)]
//!       ║ blocked                 │
//!       ║                         │◄── get(): claim waiter,   │
//!       ║                         │    take x, signal ────────┤
//!       │◄── wake: delivered      │                    x ────►│
//!```
//!
//! A thread that cannot complete synchronously parks on a pooled waiter
//! semaphore with an observable state tag; the matching operation on the
//! other side claims the waiter by compare-and-swap, transfers the value and
//! wakes it. `select` layers a cross-channel atomic commit on the same tags.
//!
//! ## Example
//!
//! ```
//! use std::thread;
//! use staffetta::channel;
//!
//! let (tx, rx) = channel::<u32>(0);
//! thread::spawn(move || {
//!     for i in 0..3 {
//!         tx.send(i).unwrap();
//!     }
//!     tx.close();
//! });
//!
//! let got: Vec<u32> = rx.iter().collect();
//! assert_eq!(got, vec![0, 1, 2]);
//! ```
//!
//! Closing is explicit and cooperative: either endpoint may
//! [`close`](Sender::close), which wakes everything parked on the channel.
//! There is no implicit close on drop, no cross-process transport, and no
//! delivery priority; fairness across a [`select()`] set is exactly "freshly
//! randomized polling order".

pub mod chan;
pub mod select;

mod fifo;
mod merge;
mod pool;
mod waiter;

pub use chan::{
    Receiver, SendError, Sender, TryRecvError, TrySendError, channel, oneshot,
};
pub use merge::merge;
pub use select::{Selectable, Selection, Sink, Ticket, Timer, select, try_select};
