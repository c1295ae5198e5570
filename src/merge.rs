use std::thread;

use crate::chan::{Receiver, channel};
use crate::select::{Selectable, select};

/// Funnels every value from `receivers` into a single receive endpoint.
///
/// A forwarder thread selects over the inputs and relays whatever arrives
/// onto an unbuffered output, so the fan-in inherits select's randomized
/// fairness and the caller's pace backpressures the inputs. The output closes
/// once every input is closed and drained; closing the output early stops the
/// forwarder.
pub fn merge<T: Send + 'static>(receivers: Vec<Receiver<T>>) -> Receiver<T> {
    let (tx, out) = channel(0);
    thread::spawn(move || {
        loop {
            let options: Vec<&dyn Selectable> =
                receivers.iter().map(|rx| rx as &dyn Selectable).collect();
            let Some(sel) = select(&options) else {
                // every input is closed and drained
                break;
            };
            if sel.is_null() {
                // an input closed mid-wait; the next round drops it
                continue;
            }
            let Some(winner) = receivers.iter().find(|rx| sel.is(*rx)) else {
                break;
            };
            if let Some(value) = winner.extract(sel) {
                if tx.send(value).is_err() {
                    break;
                }
            }
        }
        tx.close();
    });
    out
}
