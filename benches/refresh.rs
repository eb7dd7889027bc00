use std::collections::BTreeMap;
use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use doc_refresh::{refresh, Field, Id, MemoryStore, RefreshPlan, Schema, Value};
use rand::Rng;

fn nested_schema(depth: usize) -> Schema {
    let mut builder = Schema::builder()
        .field("name", Field::new())
        .field("person", Field::reference("Person").refresh());
    if depth > 0 {
        builder = builder.field("child", Field::embedded(nested_schema(depth - 1)).array());
    }
    builder.build()
}

fn analyze(c: &mut Criterion) {
    let schema = nested_schema(32);
    c.bench_function("analyze_nested_32", |b| {
        b.iter(|| RefreshPlan::analyze(black_box(&schema)))
    });
}

fn refresh_batch(c: &mut Criterion) {
    let mut rng = rand::thread_rng();
    let mut store = MemoryStore::new();
    for n in 0..256u32 {
        let mut doc = BTreeMap::new();
        doc.insert("name".to_string(), Value::Str(format!("person {}", n)));
        doc.insert("age".to_string(), Value::Int((rng.gen::<u8>()).into()));
        store.insert("Person", format!("p{}", n), Value::Map(doc));
    }

    let schema = Schema::builder()
        .field("relatives", Field::reference("Person").array().refresh())
        .build();
    let relatives: Vec<Value> = (0..128)
        .map(|_| Value::Id(Id::new(format!("p{}", rng.gen_range(0..256)))))
        .collect();
    let doc = Value::Map(
        [("relatives".to_string(), Value::Array(relatives))]
            .into_iter()
            .collect(),
    );

    c.bench_function("refresh_128_refs", |b| {
        b.iter_batched(
            || doc.clone(),
            |mut doc| refresh(&mut doc, schema.plan(), &store).unwrap(),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, analyze, refresh_batch);
criterion_main!(benches);
