use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use graphite::time::TimeManager;
use graphite::{Game, NullSink, Search, SearchMode, SearchOptions};

fn fresh_search() -> Search {
    let stop = Arc::new(AtomicBool::new(false));
    let time = Arc::new(TimeManager::new(stop.clone()));
    let mut options = SearchOptions::default();
    options.hash_size_mb = 16;
    Search::new(options, stop, time).unwrap()
}

fn bench_search(c: &mut Criterion) {
    let startpos = Game::new();

    c.bench_function("search_depth_3_startpos", |b| {
        b.iter(|| {
            let mut search = fresh_search();
            search.run(startpos.position(), startpos.keys(), &SearchMode::depth(3), &NullSink)
        })
    });

    let kiwipete =
        Game::from_fen("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1")
            .unwrap();

    c.bench_function("search_depth_3_kiwipete", |b| {
        b.iter(|| {
            let mut search = fresh_search();
            search.run(kiwipete.position(), kiwipete.keys(), &SearchMode::depth(3), &NullSink)
        })
    });

    c.bench_function("search_depth_5_startpos", |b| {
        b.iter(|| {
            let mut search = fresh_search();
            search.run(startpos.position(), startpos.keys(), &SearchMode::depth(5), &NullSink)
        })
    });
}

criterion_group!(benches, bench_search);
criterion_main!(benches);
