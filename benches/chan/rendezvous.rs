//! # Rendezvous — zero-capacity ping across two threads
//!
//! Every transfer is a park/claim/wake cycle; this measures the waiter
//! protocol against the ecosystem's zero-capacity flavors.

use std::thread;

use criterion::Criterion;

const PINGS: usize = 1_000;

pub fn bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("rendezvous");
    group.sample_size(20);

    group.bench_function("staffetta", |b| {
        b.iter(|| {
            let (tx, rx) = staffetta::channel::<usize>(0);
            thread::scope(|s| {
                s.spawn(move || {
                    for i in 0..PINGS {
                        tx.send(i).unwrap();
                    }
                });
                for i in 0..PINGS {
                    assert_eq!(rx.recv(), Some(i));
                }
            });
        })
    });

    group.bench_function("crossbeam", |b| {
        b.iter(|| {
            let (tx, rx) = crossbeam_channel::bounded::<usize>(0);
            thread::scope(|s| {
                s.spawn(move || {
                    for i in 0..PINGS {
                        tx.send(i).unwrap();
                    }
                });
                for i in 0..PINGS {
                    assert_eq!(rx.recv().unwrap(), i);
                }
            });
        })
    });

    group.bench_function("kanal", |b| {
        b.iter(|| {
            let (tx, rx) = kanal::bounded::<usize>(0);
            thread::scope(|s| {
                s.spawn(move || {
                    for i in 0..PINGS {
                        tx.send(i).unwrap();
                    }
                });
                for i in 0..PINGS {
                    assert_eq!(rx.recv().unwrap(), i);
                }
            });
        })
    });

    group.bench_function("std_sync", |b| {
        b.iter(|| {
            let (tx, rx) = std::sync::mpsc::sync_channel::<usize>(0);
            thread::scope(|s| {
                s.spawn(move || {
                    for i in 0..PINGS {
                        tx.send(i).unwrap();
                    }
                });
                for i in 0..PINGS {
                    assert_eq!(rx.recv().unwrap(), i);
                }
            });
        })
    });

    group.finish();
}
