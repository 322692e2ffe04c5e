// Tree decoding, path walking and pack lookup benchmarks

use bytes::Bytes;
use criterion::async_executor::AsyncExecutor;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use gitview::model::{Object, ObjectKind};
use gitview::repository::TreeEntries;
use gitview::store::{Cursor, GitDecoder, MemoryStore};
use gitview::Repository;
use gix_hash::ObjectId;
use std::hint::black_box;
use tokio::runtime::Runtime;

mod common;

struct TokioExecutor(Runtime);

impl AsyncExecutor for TokioExecutor {
    fn block_on<T>(&self, future: impl std::future::Future<Output = T>) -> T {
        self.0.block_on(future)
    }
}

fn bench_tree_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_decode");
    for size in [100, 1_000, 10_000] {
        let data = Bytes::from(common::generate_tree(size));

        group.bench_with_input(BenchmarkId::new("entries", size), &data, |b, data| {
            b.to_async(TokioExecutor(Runtime::new().unwrap())).iter(|| async {
                let object = Object::from_bytes(ObjectKind::Tree, data.clone());
                let mut entries = TreeEntries::new(object, ObjectId::null(gix_hash::Kind::Sha1));
                black_box(entries.collect().await.unwrap())
            });
        });
    }
    group.finish();
}

fn bench_path_walk(c: &mut Criterion) {
    let mut group = c.benchmark_group("path_walk");
    for depth in [1, 8, 32] {
        let store = MemoryStore::new();
        let (root, path) = common::generate_deep_store(&store, depth, 50);
        let repo = Repository::new(store, GitDecoder);
        let rev = root.to_string();

        group.bench_with_input(BenchmarkId::new("depth", depth), &path, |b, path| {
            b.to_async(TokioExecutor(Runtime::new().unwrap())).iter(|| async {
                black_box(repo.entry_at(&rev, path).await.unwrap())
            });
        });
    }
    group.finish();
}

fn bench_pack_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("pack_lookup");
    for size in [100, 1_000, 10_000] {
        let store = MemoryStore::new();
        let ids = common::generate_pack(&store, size);
        let repo = Repository::new(store, GitDecoder);
        let id = ids[size / 2];

        // Warm the index, packfile and object caches
        Runtime::new()
            .unwrap()
            .block_on(repo.get_object_from_pack(&id))
            .unwrap();

        group.bench_with_input(BenchmarkId::new("cached", size), &id, |b, id| {
            b.to_async(TokioExecutor(Runtime::new().unwrap())).iter(|| async {
                black_box(repo.get_object_from_pack(id).await.unwrap())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_tree_decode, bench_path_walk, bench_pack_lookup);
criterion_main!(benches);
