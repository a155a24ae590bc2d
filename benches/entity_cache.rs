use std::hint::black_box;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use entitycache::cache::{EntityCache, SliceCache};
use entitycache::error::LoadError;
use entitycache::index::{Fields, KeyPart};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Clone)]
struct Status {
    id: u64,
    uri: String,
    account_id: u64,
}

impl Fields for Status {
    fn field(&self, name: &str) -> Option<KeyPart> {
        match name {
            "ID" => Some(self.id.into()),
            "URI" => Some(self.uri.as_str().into()),
            "AccountID" => Some(self.account_id.into()),
            _ => None,
        }
    }
}

fn status(id: u64) -> Status {
    Status {
        id,
        uri: format!("https://example.org/s/{id}"),
        account_id: id % 64 + 1,
    }
}

fn filled(capacity: usize) -> EntityCache<Status> {
    let cache = EntityCache::builder(capacity)
        .index("ID")
        .index("URI")
        .index(entitycache::index::IndexConfig::new("AccountID").multiple())
        .build();
    cache.put((1..=capacity as u64).map(status));
    cache
}

fn bench_get_one(c: &mut Criterion) {
    let cache = filled(4096);
    let mut rng = StdRng::seed_from_u64(42);
    c.bench_function("entity_cache_get_one_hit", |b| {
        b.iter(|| {
            let id = rng.gen_range(1..=4096u64);
            black_box(cache.get_one("ID", id))
        })
    });
}

fn bench_load_one_mixed(c: &mut Criterion) {
    let cache = filled(1024);
    let mut rng = StdRng::seed_from_u64(7);
    c.bench_function("entity_cache_load_one_mixed", |b| {
        b.iter(|| {
            let id = rng.gen_range(1..=2048u64);
            black_box(cache.load_one("ID", id, || Ok::<_, LoadError>(status(id))))
        })
    });
}

fn bench_put_churn(c: &mut Criterion) {
    c.bench_function("entity_cache_put_churn", |b| {
        b.iter_batched(
            || filled(1024),
            |cache| {
                for id in 10_000..14_096u64 {
                    cache.put([status(black_box(id))]);
                }
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_slice_load(c: &mut Criterion) {
    let ids: Vec<String> = (1..=256u64).map(|id| id.to_string()).collect();
    c.bench_function("slice_cache_load_hit", |b| {
        let cache: SliceCache<String> = SliceCache::new(128);
        cache.load("timeline", || Ok(ids.clone())).ok();
        b.iter(|| black_box(cache.load("timeline", || Ok(ids.clone()))))
    });
}

criterion_group!(
    benches,
    bench_get_one,
    bench_load_one_mixed,
    bench_put_churn,
    bench_slice_load
);
criterion_main!(benches);
