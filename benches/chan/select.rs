//! # Select — committing over four always-ready channels
//!
//! Measures the shuffle-poll-commit cycle against crossbeam's select when
//! every option is ready and nothing needs to park.

use criterion::Criterion;

use staffetta::Selectable;

pub fn bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_ready");

    group.bench_function("staffetta", |b| {
        let pairs: Vec<_> = (0..4).map(|i| (i, staffetta::channel::<usize>(1))).collect();
        for (i, (tx, _)) in &pairs {
            tx.send(*i).unwrap();
        }
        b.iter(|| {
            let options: Vec<&dyn Selectable> =
                pairs.iter().map(|(_, (_, rx))| rx as &dyn Selectable).collect();
            let sel = staffetta::select(&options).unwrap();
            let (i, (tx, rx)) = pairs.iter().find(|(_, (_, rx))| sel.is(rx)).unwrap();
            let got = rx.extract(sel).unwrap();
            assert_eq!(got, *i);
            tx.send(*i).unwrap();
        })
    });

    group.bench_function("crossbeam", |b| {
        let pairs: Vec<_> = (0..4)
            .map(|i| (i, crossbeam_channel::bounded::<usize>(1)))
            .collect();
        for (i, (tx, _)) in &pairs {
            tx.send(*i).unwrap();
        }
        b.iter(|| {
            let mut select = crossbeam_channel::Select::new();
            for (_, (_, rx)) in &pairs {
                select.recv(rx);
            }
            let op = select.select();
            let index = op.index();
            let (i, (tx, rx)) = &pairs[index];
            let got = op.recv(rx).unwrap();
            assert_eq!(got, *i);
            tx.send(*i).unwrap();
        })
    });

    group.finish();
}
