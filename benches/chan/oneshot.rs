//! # Oneshot — create, send once, receive once, discard
//!
//! The cost that matters when channels are created per-request: allocation of
//! the channel plus one uncontended transfer.

use std::hint::black_box;

use criterion::Criterion;

use crate::BUFFER_SIZE;

pub fn bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("oneshot");

    group.bench_function("staffetta", |b| {
        b.iter(|| {
            let (tx, rx) = staffetta::channel::<i32>(BUFFER_SIZE);
            tx.send(black_box(42)).unwrap();
            rx.recv().unwrap()
        })
    });

    group.bench_function("staffetta_singleton", |b| {
        b.iter(|| {
            let (tx, rx) = staffetta::oneshot::<i32>();
            tx.send(black_box(42)).unwrap();
            rx.recv().unwrap()
        })
    });

    group.bench_function("crossbeam", |b| {
        b.iter(|| {
            let (tx, rx) = crossbeam_channel::bounded::<i32>(BUFFER_SIZE);
            tx.send(black_box(42)).unwrap();
            rx.recv().unwrap()
        })
    });

    group.bench_function("flume", |b| {
        b.iter(|| {
            let (tx, rx) = flume::bounded::<i32>(BUFFER_SIZE);
            tx.send(black_box(42)).unwrap();
            rx.recv().unwrap()
        })
    });

    group.bench_function("kanal", |b| {
        b.iter(|| {
            let (tx, rx) = kanal::bounded::<i32>(BUFFER_SIZE);
            tx.send(black_box(42)).unwrap();
            rx.recv().unwrap()
        })
    });

    group.bench_function("std_sync", |b| {
        b.iter(|| {
            let (tx, rx) = std::sync::mpsc::sync_channel::<i32>(BUFFER_SIZE);
            tx.send(black_box(42)).unwrap();
            rx.recv().unwrap()
        })
    });

    group.finish();
}
