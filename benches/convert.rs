//! Benchmarks for format conversion.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use atomspace_bridge::adapter::{convert_new_to_old, convert_old_to_new, normalize_to_old_format};
use atomspace_bridge::atom::Atom;

/// A chain of `n` concepts joined pairwise by inheritance links.
fn chain(n: usize) -> Vec<Atom> {
    let nodes: Vec<Atom> = (0..n)
        .map(|i| Atom::node("ConceptNode", format!("c{i}")))
        .collect();
    let links = nodes
        .windows(2)
        .map(|pair| Atom::link("InheritanceLink", pair.to_vec()));
    nodes.iter().cloned().chain(links).collect()
}

fn bench_new_to_old(c: &mut Criterion) {
    let atoms = chain(1_000);
    c.bench_function("new_to_old_2k", |bench| {
        bench.iter(|| black_box(convert_new_to_old(&atoms)))
    });
}

fn bench_old_to_new(c: &mut Criterion) {
    let flat = convert_new_to_old(&chain(1_000));
    c.bench_function("old_to_new_2k", |bench| {
        bench.iter(|| black_box(convert_old_to_new(&flat)))
    });
}

fn bench_normalize(c: &mut Criterion) {
    let payload = serde_json::to_value(chain(1_000)).unwrap();
    c.bench_function("normalize_nested_2k", |bench| {
        bench.iter(|| black_box(normalize_to_old_format(&payload)))
    });
}

criterion_group!(benches, bench_new_to_old, bench_old_to_new, bench_normalize);
criterion_main!(benches);
