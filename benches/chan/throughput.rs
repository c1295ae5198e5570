//! # Throughput — one producer streaming through a bounded buffer
//!
//! The buffered fast path: how quickly values move when the buffer mostly
//! absorbs the traffic and parking is the exception.

use std::thread;

use criterion::Criterion;

use crate::{BUFFER_SIZE, TOTAL_MESSAGES};

pub fn bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("throughput");
    group.sample_size(10);

    group.bench_function("staffetta", |b| {
        b.iter(|| {
            let (tx, rx) = staffetta::channel::<usize>(BUFFER_SIZE);
            thread::scope(|s| {
                s.spawn(move || {
                    for i in 0..TOTAL_MESSAGES {
                        tx.send(i).unwrap();
                    }
                    tx.close();
                });
                let mut count = 0;
                while rx.recv().is_some() {
                    count += 1;
                }
                assert_eq!(count, TOTAL_MESSAGES);
            });
        })
    });

    group.bench_function("crossbeam", |b| {
        b.iter(|| {
            let (tx, rx) = crossbeam_channel::bounded::<usize>(BUFFER_SIZE);
            thread::scope(|s| {
                s.spawn(move || {
                    for i in 0..TOTAL_MESSAGES {
                        tx.send(i).unwrap();
                    }
                    drop(tx);
                });
                assert_eq!(rx.iter().count(), TOTAL_MESSAGES);
            });
        })
    });

    group.bench_function("flume", |b| {
        b.iter(|| {
            let (tx, rx) = flume::bounded::<usize>(BUFFER_SIZE);
            thread::scope(|s| {
                s.spawn(move || {
                    for i in 0..TOTAL_MESSAGES {
                        tx.send(i).unwrap();
                    }
                    drop(tx);
                });
                assert_eq!(rx.iter().count(), TOTAL_MESSAGES);
            });
        })
    });

    group.bench_function("kanal", |b| {
        b.iter(|| {
            let (tx, rx) = kanal::bounded::<usize>(BUFFER_SIZE);
            thread::scope(|s| {
                s.spawn(move || {
                    for i in 0..TOTAL_MESSAGES {
                        tx.send(i).unwrap();
                    }
                    drop(tx);
                });
                let mut count = 0;
                while rx.recv().is_ok() {
                    count += 1;
                }
                assert_eq!(count, TOTAL_MESSAGES);
            });
        })
    });

    group.finish();
}
