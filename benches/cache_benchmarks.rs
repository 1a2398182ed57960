use criterion::{black_box, criterion_group, criterion_main, Criterion};
use teamforge_core::cache::{CacheKey, CacheScope, ResultCache};
use teamforge_core::TeamforgeConfig;

fn populated_cache(users: usize) -> ResultCache {
    let cache = ResultCache::from_config(&TeamforgeConfig::default().cache);
    for i in 0..users {
        let upn = format!("student{i}@school.edu");
        cache.store(&CacheKey::user(&upn), &serde_json::json!({ "userPrincipalName": upn }));
        cache.store(&CacheKey::user_teams(&upn), &serde_json::json!({ "value": [] }));
        cache.store(&CacheKey::user_licenses(&upn), &serde_json::json!({ "value": [] }));
    }
    cache
}

fn benchmark_cache_lookup(c: &mut Criterion) {
    let cache = populated_cache(1_000);
    let key = CacheKey::user("student500@school.edu");
    c.bench_function("cache_lookup_hit", |b| {
        b.iter(|| cache.lookup::<serde_json::Value>(black_box(&key)))
    });
}

fn benchmark_scope_invalidation(c: &mut Criterion) {
    c.bench_function("cache_invalidate_user_scope", |b| {
        b.iter_batched(
            || populated_cache(1_000),
            |cache| cache.invalidate_scope(black_box(&CacheScope::user("student500@school.edu"))),
            criterion::BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, benchmark_cache_lookup, benchmark_scope_invalidation);
criterion_main!(benches);
