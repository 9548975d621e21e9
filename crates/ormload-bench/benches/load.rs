//! Load benchmarks against SQLite.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ormload_bench::fixtures::Scale;
use ormload_bench::harness::TestContext;
use ormload_core::{CollectionLoader, EntityLoader, PersistenceContext, Value};

fn bench_load_by_id(c: &mut Criterion) {
    let mut group = c.benchmark_group("load/by_id");
    let mut ctx = TestContext::with_scale(Scale::Small);

    let plain = EntityLoader::builder(&ctx.registry, "User").build().unwrap();
    let fetching = EntityLoader::builder(&ctx.registry, "User")
        .with_fetch("posts")
        .build()
        .unwrap();

    for (name, loader) in [("plain", &plain), ("fetch_posts", &fetching)] {
        group.bench_function(name, |b| {
            let mut id = 0i64;
            b.iter(|| {
                let mut context = PersistenceContext::new();
                id = (id + 1) % 100;
                black_box(loader.load(&mut ctx.coordinator, &mut context, Value::Int(id)).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_batch_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("load/batch");
    let mut ctx = TestContext::with_scale(Scale::Small);
    let ids: Vec<Value> = (0..64).map(Value::Int).collect();

    for batch_size in [1, 8, 32] {
        let loader = EntityLoader::builder(&ctx.registry, "Post")
            .with_batch_size(batch_size)
            .build()
            .unwrap();
        group.bench_with_input(BenchmarkId::new("posts", batch_size), &ids, |b, ids| {
            b.iter(|| {
                let mut context = PersistenceContext::new();
                black_box(loader.load_batch(&mut ctx.coordinator, &mut context, ids).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_collection_initialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("load/collection");
    let mut ctx = TestContext::with_scale(Scale::Small);
    let owners: Vec<Value> = (0..10).map(Value::Int).collect();

    for role in ["User.posts", "User.tags", "Post.comments"] {
        let loader = CollectionLoader::builder(&ctx.registry, role)
            .with_batch_size(10)
            .build()
            .unwrap();
        group.bench_function(role, |b| {
            b.iter(|| {
                let mut context = PersistenceContext::new();
                loader.initialize_batch(&mut ctx.coordinator, &mut context, &owners).unwrap();
                black_box(context);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_load_by_id, bench_batch_load, bench_collection_initialize);
criterion_main!(benches);
