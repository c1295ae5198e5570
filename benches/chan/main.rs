//! Channel benchmarks: staffetta vs crossbeam vs flume vs kanal vs std
//!
//! Run with: cargo bench --bench chan
//!
//! Each scenario compares this crate's mutex-and-waiter channels against the
//! established ecosystem implementations at equivalent bounded capacity. The
//! goal is honest placement, not victory: the select commit protocol buys
//! cross-channel atomicity that the raw hot paths pay for.

use criterion::{Criterion, criterion_group, criterion_main};

mod oneshot;
mod rendezvous;
mod select;
mod throughput;

pub const BUFFER_SIZE: usize = 1024;
pub const TOTAL_MESSAGES: usize = 100_000;

criterion_group!(
    benches,
    oneshot::bench,
    rendezvous::bench,
    select::bench,
    throughput::bench
);
criterion_main!(benches);
