//! Partition benchmarks — predicate registration and refinement.

use pathq::{HeaderPredicate, Partitioner};
use pathq_test::HeaderSpace;

fn main() {
    divan::main();
}

#[divan::bench(args = [8, 32, 128])]
fn register_disjoint(bencher: divan::Bencher, n: u64) {
    bencher.bench_local(|| {
        let mut partitioner = Partitioner::new();
        for i in 0..n {
            partitioner.token(&HeaderSpace::field("switch", i)).unwrap();
        }
        partitioner
    });
}

/// Every port predicate straddles every switch leaf registered before it.
#[divan::bench(args = [2, 4, 8])]
fn register_crossing(bencher: divan::Bencher, n: u64) {
    bencher.bench_local(|| {
        let mut partitioner = Partitioner::new();
        for i in 0..n {
            partitioner.token(&HeaderSpace::field("switch", i)).unwrap();
        }
        for p in 0..n {
            partitioner.token(&HeaderSpace::field("port", p)).unwrap();
        }
        partitioner
    });
}

#[divan::bench(args = [8, 32])]
fn lookup_registered(bencher: divan::Bencher, n: u64) {
    let mut partitioner = Partitioner::new();
    let preds: Vec<_> = (0..n).map(|i| HeaderSpace::field("switch", i)).collect();
    for p in &preds {
        partitioner.token(p).unwrap();
    }
    bencher.bench_local(|| preds.iter().filter_map(|p| partitioner.lookup(p)).count());
}

#[divan::bench(args = [8, 32])]
fn reconstruct_predicates(bencher: divan::Bencher, n: u64) {
    let mut partitioner = Partitioner::new();
    let wide = HeaderSpace::any_value("switch", &(0..n).collect::<Vec<_>>());
    let token = partitioner.token(&wide).unwrap();
    for i in 0..n {
        partitioner.token(&HeaderSpace::field("switch", i)).unwrap();
    }
    bencher.bench_local(|| partitioner.predicate(token).unwrap().is_empty());
}
