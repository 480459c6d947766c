//! Round-trip benchmarks over representative graph shapes.

use std::collections::HashMap;

use coal::{deserialize, serialize, CoalObject, Ref};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

#[derive(Debug, Default, CoalObject)]
#[coal(name = "BenchNode")]
struct BenchNode {
    label: String,
    weight: u64,
    next: Ref<BenchNode>,
}

fn linked_list(length: usize) -> Ref<BenchNode> {
    let mut head = Ref::null();
    for index in 0..length {
        head = Ref::new(BenchNode {
            label: format!("node-{index}"),
            weight: index as u64,
            next: head,
        });
    }
    head
}

fn bench_primitive_vectors(c: &mut Criterion) {
    let values: Vec<u64> = (0..10_000).collect();
    c.bench_function("serialize_vec_u64_10k", |b| {
        b.iter(|| serialize(black_box(&values)).expect("serialize"))
    });

    let bytes = serialize(&values).expect("serialize");
    c.bench_function("deserialize_vec_u64_10k", |b| {
        b.iter(|| deserialize::<Vec<u64>>(black_box(&bytes)).expect("deserialize"))
    });
}

fn bench_string_maps(c: &mut Criterion) {
    let map: HashMap<String, u32> = (0..1_000)
        .map(|index| (format!("key-{index}"), index))
        .collect();
    c.bench_function("serialize_string_map_1k", |b| {
        b.iter(|| serialize(black_box(&map)).expect("serialize"))
    });

    let bytes = serialize(&map).expect("serialize");
    c.bench_function("deserialize_string_map_1k", |b| {
        b.iter(|| deserialize::<HashMap<String, u32>>(black_box(&bytes)).expect("deserialize"))
    });
}

fn bench_object_graphs(c: &mut Criterion) {
    let head = linked_list(1_000);
    c.bench_function("serialize_linked_list_1k", |b| {
        b.iter(|| serialize(black_box(&head)).expect("serialize"))
    });

    let bytes = serialize(&head).expect("serialize");
    c.bench_function("deserialize_linked_list_1k", |b| {
        b.iter(|| deserialize::<Ref<BenchNode>>(black_box(&bytes)).expect("deserialize"))
    });
}

criterion_group!(
    benches,
    bench_primitive_vectors,
    bench_string_maps,
    bench_object_graphs
);
criterion_main!(benches);
