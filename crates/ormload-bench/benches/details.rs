//! Load plan and SQL generation benchmarks.
//!
//! No database is touched; these measure plan walking, alias resolution
//! and rendering per dialect.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ormload_bench::blog_registry;
use ormload_core::dialect::Dialect;
use ormload_core::{LoadPlanBuilder, LoadQueryDetails, LoaderSettings, QueryBuildingParameters};

fn bench_entity_details(c: &mut Criterion) {
    let mut group = c.benchmark_group("details/entity");
    let registry = blog_registry(Dialect::postgres(), LoaderSettings::new());
    let params = QueryBuildingParameters::new();

    let cases: [(&str, &[&str]); 3] = [
        ("root_only", &[]),
        ("one_fetch", &["posts"]),
        ("nested_fetch", &["posts", "posts.comments", "tags"]),
    ];
    for (name, fetches) in cases {
        group.bench_with_input(BenchmarkId::from_parameter(name), &fetches, |b, fetches| {
            b.iter(|| {
                let plan = fetches
                    .iter()
                    .fold(LoadPlanBuilder::new(&registry), |builder, path| builder.with_fetch(*path))
                    .entity_load_plan("User")
                    .unwrap();
                black_box(LoadQueryDetails::for_entity(&plan, &params, &registry).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_batch_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("details/batch_size");
    let registry = blog_registry(Dialect::postgres(), LoaderSettings::new());
    let plan = LoadPlanBuilder::new(&registry).entity_load_plan("Post").unwrap();

    for batch_size in [1, 16, 256] {
        let params = QueryBuildingParameters::new().with_batch_size(batch_size);
        group.bench_with_input(BenchmarkId::from_parameter(batch_size), &params, |b, params| {
            b.iter(|| black_box(LoadQueryDetails::for_entity(&plan, params, &registry).unwrap()));
        });
    }

    group.finish();
}

fn bench_dialects(c: &mut Criterion) {
    let mut group = c.benchmark_group("details/dialect");

    for dialect in [Dialect::ansi(), Dialect::oracle(), Dialect::sql_server()] {
        let name = dialect.name();
        let registry = blog_registry(dialect, LoaderSettings::new());
        let plan = LoadPlanBuilder::new(&registry)
            .with_fetch("author")
            .entity_load_plan("Post")
            .unwrap();
        let params = QueryBuildingParameters::new();
        group.bench_function(name, |b| {
            b.iter(|| black_box(LoadQueryDetails::for_entity(&plan, &params, &registry).unwrap()));
        });
    }

    group.finish();
}

fn bench_collection_details(c: &mut Criterion) {
    let mut group = c.benchmark_group("details/collection");
    let registry = blog_registry(Dialect::postgres(), LoaderSettings::new());
    let params = QueryBuildingParameters::new();

    for role in ["User.posts", "User.tags"] {
        group.bench_function(role, |b| {
            b.iter(|| {
                let plan = LoadPlanBuilder::new(&registry).collection_load_plan(role).unwrap();
                black_box(LoadQueryDetails::for_collection(&plan, &params, &registry).unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_entity_details,
    bench_batch_size,
    bench_dialects,
    bench_collection_details,
);
criterion_main!(benches);
