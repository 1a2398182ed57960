//! In-process TTL cache of directory lookups.

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::keys::{CacheKey, CacheKind, CacheScope};
use crate::clock::{system_clock, SharedClock};
use crate::config::CacheConfig;

const GENERATION_STRIPES: usize = 64;

/// A cached lookup outcome
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Found(serde_json::Value),
    /// Negative result: the entity did not exist when last looked up
    NotFound,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CacheValue,
    expires_at: Instant,
}

/// Default TTL per entity family
#[derive(Debug, Clone)]
pub struct CacheTtls {
    pub user: Duration,
    pub user_teams: Duration,
    pub user_licenses: Duration,
    pub team: Duration,
    pub team_members: Duration,
    pub license_catalog: Duration,
    pub negative: Duration,
}

impl CacheTtls {
    pub fn for_kind(&self, kind: CacheKind) -> Duration {
        match kind {
            CacheKind::User => self.user,
            CacheKind::UserTeams => self.user_teams,
            CacheKind::UserLicenses => self.user_licenses,
            CacheKind::Team => self.team,
            CacheKind::TeamMembers => self.team_members,
            CacheKind::LicenseCatalog => self.license_catalog,
        }
    }
}

impl From<&CacheConfig> for CacheTtls {
    fn from(config: &CacheConfig) -> Self {
        Self {
            user: Duration::from_secs(config.user_ttl_seconds),
            user_teams: Duration::from_secs(config.user_teams_ttl_seconds),
            user_licenses: Duration::from_secs(config.user_licenses_ttl_seconds),
            team: Duration::from_secs(config.team_ttl_seconds),
            team_members: Duration::from_secs(config.member_list_ttl_seconds),
            license_catalog: Duration::from_secs(config.license_catalog_ttl_seconds),
            negative: Duration::from_secs(config.negative_ttl_seconds),
        }
    }
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self::from(&crate::config::TeamforgeConfig::default().cache)
    }
}

/// Invalidation epoch observed before a directory read
///
/// A read that started before an overlapping invalidation must not write its
/// result back; see [`ResultCache::store_if_current`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheGeneration {
    global: u64,
    scoped: u64,
}

/// `entity:id` part of a key; derived keys share their base key's root
fn scope_root(key: &str) -> &str {
    match key.match_indices(':').nth(1) {
        Some((index, _)) => &key[..index],
        None => key,
    }
}

/// Point-in-time cache counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
    pub invalidations: u64,
    #[serde(serialize_with = "serialize_rate")]
    pub hit_rate: f64,
}

fn serialize_rate<S: Serializer>(rate: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64((rate * 1000.0).round() / 1000.0)
}

/// Keyed TTL cache shared by every entity command service
#[derive(Debug)]
pub struct ResultCache {
    entries: DashMap<String, CacheEntry>,
    ttls: CacheTtls,
    max_entries: usize,
    clock: SharedClock,
    hits: AtomicU64,
    misses: AtomicU64,
    insertions: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
    /// Bumped by prefix invalidation and `clear`
    global_generation: AtomicU64,
    /// Bumped per scope root by key and scope invalidation
    generations: [AtomicU64; GENERATION_STRIPES],
}

impl ResultCache {
    pub fn new(ttls: CacheTtls, max_entries: usize, clock: SharedClock) -> Self {
        Self {
            entries: DashMap::new(),
            ttls,
            max_entries,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            insertions: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            global_generation: AtomicU64::new(0),
            generations: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(CacheTtls::from(config), config.max_entries, system_clock())
    }

    pub fn ttls(&self) -> &CacheTtls {
        &self.ttls
    }

    /// Live value for `key`; expired entries are dropped and count as a miss
    pub fn get(&self, key: &str) -> Option<CacheValue> {
        let now = self.clock.now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = key, "Cache HIT");
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = key, expired = expired, "Cache MISS");
        None
    }

    pub fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        self.insert(key, CacheValue::Found(value), ttl);
    }

    /// Record a negative lookup with the negative-result TTL
    pub fn set_not_found(&self, key: &str) {
        self.insert(key, CacheValue::NotFound, self.ttls.negative);
    }

    /// Typed read: `Some(Some(v))` hit, `Some(None)` cached not-found, `None` miss
    pub fn lookup<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<Option<T>> {
        match self.get(key.as_str())? {
            CacheValue::NotFound => Some(None),
            CacheValue::Found(value) => match serde_json::from_value(value) {
                Ok(decoded) => Some(Some(decoded)),
                Err(error) => {
                    warn!(key = %key, error = %error, "Dropping undecodable cache entry");
                    self.invalidate(key.as_str());
                    None
                }
            },
        }
    }

    /// Typed write using the key's default TTL
    pub fn store<T: Serialize>(&self, key: &CacheKey, value: &T) {
        match serde_json::to_value(value) {
            Ok(json) => self.set(key.as_str(), json, self.ttls.for_kind(key.kind())),
            Err(error) => warn!(key = %key, error = %error, "Skipping unserializable cache value"),
        }
    }

    pub fn store_not_found(&self, key: &CacheKey) {
        self.set_not_found(key.as_str());
    }

    /// Generation to capture before fetching the value for `key`
    pub fn generation(&self, key: &CacheKey) -> CacheGeneration {
        self.generation_of(key.as_str())
    }

    /// Typed write that is dropped when `key` was invalidated after `observed`
    ///
    /// Returns whether the value was cached.
    pub fn store_if_current<T: Serialize>(
        &self,
        key: &CacheKey,
        value: &T,
        observed: CacheGeneration,
    ) -> bool {
        match serde_json::to_value(value) {
            Ok(json) => self.insert_if_current(
                key.as_str(),
                CacheValue::Found(json),
                self.ttls.for_kind(key.kind()),
                observed,
            ),
            Err(error) => {
                warn!(key = %key, error = %error, "Skipping unserializable cache value");
                false
            }
        }
    }

    pub fn store_not_found_if_current(&self, key: &CacheKey, observed: CacheGeneration) -> bool {
        self.insert_if_current(key.as_str(), CacheValue::NotFound, self.ttls.negative, observed)
    }

    /// Remove one key; returns whether it was present
    pub fn invalidate(&self, key: &str) -> bool {
        self.stripe(key).fetch_add(1, Ordering::SeqCst);
        self.remove_key(key)
    }

    /// Remove every key starting with `prefix`; returns the number removed
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        self.global_generation.fetch_add(1, Ordering::SeqCst);
        self.remove_prefix(prefix)
    }

    /// Remove the scope's base key and all of its derived keys
    pub fn invalidate_scope(&self, scope: &CacheScope) -> usize {
        let base_key = scope.base_key();
        self.stripe(&base_key).fetch_add(1, Ordering::SeqCst);
        let base = usize::from(self.remove_key(&base_key));
        let derived = self.remove_prefix(&scope.derived_prefix());
        debug!(scope = ?scope, removed = base + derived, "Cache scope invalidated");
        base + derived
    }

    /// Drop all expired entries; returns the number removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let purged = before.saturating_sub(self.entries.len());
        self.evictions.fetch_add(purged as u64, Ordering::Relaxed);
        purged
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.global_generation.fetch_add(1, Ordering::SeqCst);
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            entries: self.entries.len(),
            hits,
            misses,
            insertions: self.insertions.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }

    fn insert(&self, key: &str, value: CacheValue, ttl: Duration) {
        self.reserve_slot(key);
        let expires_at = self.clock.now() + ttl;
        self.entries
            .insert(key.to_string(), CacheEntry { value, expires_at });
        self.insertions.fetch_add(1, Ordering::Relaxed);
    }

    /// Insert only if no invalidation touched `key` since `observed`
    ///
    /// The generation is re-read while the entry's shard lock is held.
    /// Invalidation bumps the generation before removing, so a write that
    /// passes the check is either removed afterwards or was never stale.
    fn insert_if_current(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Duration,
        observed: CacheGeneration,
    ) -> bool {
        self.reserve_slot(key);
        let entry = self.entries.entry(key.to_string());
        if self.generation_of(key) != observed {
            debug!(key = key, "Discarding cache write that raced an invalidation");
            return false;
        }
        let expires_at = self.clock.now() + ttl;
        entry.insert(CacheEntry { value, expires_at });
        self.insertions.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn reserve_slot(&self, key: &str) {
        if self.max_entries > 0
            && self.entries.len() >= self.max_entries
            && !self.entries.contains_key(key)
        {
            self.make_room();
        }
    }

    fn generation_of(&self, key: &str) -> CacheGeneration {
        CacheGeneration {
            global: self.global_generation.load(Ordering::SeqCst),
            scoped: self.stripe(key).load(Ordering::SeqCst),
        }
    }

    fn stripe(&self, key: &str) -> &AtomicU64 {
        let mut hasher = DefaultHasher::new();
        scope_root(key).hash(&mut hasher);
        &self.generations[(hasher.finish() as usize) % GENERATION_STRIPES]
    }

    fn remove_key(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    fn remove_prefix(&self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before.saturating_sub(self.entries.len());
        self.invalidations
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Purge expired entries, then evict the soonest-expiring ones
    fn make_room(&self) {
        if self.purge_expired() > 0 && self.entries.len() < self.max_entries {
            return;
        }

        // Evict in small batches so a full cache does not rescan on every insert
        let batch = (self.max_entries / 100).max(1);
        let overflow = (self.entries.len() + 1).saturating_sub(self.max_entries);
        let to_evict = overflow.max(batch);

        let mut candidates: Vec<(String, Instant)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().expires_at))
            .collect();
        candidates.sort_by_key(|(_, expires_at)| *expires_at);

        let mut evicted = 0u64;
        for (key, _) in candidates.into_iter().take(to_evict) {
            if self.entries.remove(&key).is_some() {
                evicted += 1;
            }
        }
        self.evictions.fetch_add(evicted, Ordering::Relaxed);
        debug!(evicted = evicted, "Cache capacity eviction");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;
    use std::sync::Arc;

    fn cache_with_clock(max_entries: usize) -> (ResultCache, ManualClock) {
        let clock = ManualClock::new();
        let cache = ResultCache::new(CacheTtls::default(), max_entries, Arc::new(clock.clone()));
        (cache, clock)
    }

    #[test]
    fn test_round_trip_before_and_after_ttl() {
        let (cache, clock) = cache_with_clock(0);
        cache.set("user:ada@school.edu", json!({"id": "1"}), Duration::from_secs(60));

        assert_eq!(
            cache.get("user:ada@school.edu"),
            Some(CacheValue::Found(json!({"id": "1"})))
        );

        clock.advance(Duration::from_secs(60));
        assert_eq!(cache.get("user:ada@school.edu"), None);
        assert!(cache.is_empty());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_negative_results_use_negative_ttl() {
        let (cache, clock) = cache_with_clock(0);
        let key = CacheKey::user("ghost@school.edu");
        cache.store_not_found(&key);

        assert_eq!(cache.lookup::<serde_json::Value>(&key), Some(None));
        clock.advance(Duration::from_secs(59));
        assert_eq!(cache.get(key.as_str()), Some(CacheValue::NotFound));
        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get(key.as_str()), None);
    }

    #[test]
    fn test_store_uses_kind_ttl() {
        let (cache, clock) = cache_with_clock(0);
        let members = CacheKey::team_members("t-1");
        let team = CacheKey::team("t-1");
        cache.store(&members, &json!([]));
        cache.store(&team, &json!({"id": "t-1"}));

        clock.advance(Duration::from_secs(5 * 60));
        assert!(cache.lookup::<serde_json::Value>(&members).is_none());
        assert!(cache.lookup::<serde_json::Value>(&team).is_some());
    }

    #[test]
    fn test_scope_invalidation() {
        let (cache, _clock) = cache_with_clock(0);
        cache.store(&CacheKey::user("ada@school.edu"), &json!({}));
        cache.store(&CacheKey::user_teams("ada@school.edu"), &json!([]));
        cache.store(&CacheKey::user_licenses("ada@school.edu"), &json!([]));
        cache.store(&CacheKey::user("ada@school.edu.au"), &json!({}));

        let removed = cache.invalidate_scope(&CacheScope::user("ADA@school.edu"));

        assert_eq!(removed, 3);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("user:ada@school.edu.au").is_some());
        assert_eq!(cache.stats().invalidations, 3);
    }

    #[test]
    fn test_capacity_prefers_expired_then_soonest_expiring() {
        let (cache, clock) = cache_with_clock(3);
        cache.set("a", json!(1), Duration::from_secs(10));
        cache.set("b", json!(2), Duration::from_secs(100));
        cache.set("c", json!(3), Duration::from_secs(50));

        cache.set("d", json!(4), Duration::from_secs(100));
        assert_eq!(cache.len(), 3);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());

        clock.advance(Duration::from_secs(60));
        // "c" is now expired and is purged instead of evicting a live entry
        cache.set("e", json!(5), Duration::from_secs(100));
        assert!(cache.get("b").is_some());
        assert!(cache.get("d").is_some());
        assert!(cache.get("e").is_some());
    }

    #[test]
    fn test_undecodable_entry_is_dropped() {
        let (cache, _clock) = cache_with_clock(0);
        let key = CacheKey::team("t-1");
        cache.set(key.as_str(), json!("not a team"), Duration::from_secs(60));

        assert!(cache.lookup::<crate::types::Team>(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_write_after_overlapping_invalidation_is_discarded() {
        let (cache, _clock) = cache_with_clock(0);
        let key = CacheKey::user("ada@school.edu");

        let observed = cache.generation(&key);
        cache.invalidate_scope(&CacheScope::user("ada@school.edu"));
        assert!(!cache.store_if_current(&key, &json!({"accountEnabled": true}), observed));
        assert!(cache.lookup::<serde_json::Value>(&key).is_none());

        let observed = cache.generation(&key);
        assert!(cache.store_if_current(&key, &json!({"accountEnabled": false}), observed));
        assert_eq!(
            cache.lookup::<serde_json::Value>(&key),
            Some(Some(json!({"accountEnabled": false})))
        );
    }

    #[test]
    fn test_derived_key_invalidation_reaches_base_generation() {
        let (cache, _clock) = cache_with_clock(0);
        let teams = CacheKey::user_teams("ada@school.edu");
        let observed = cache.generation(&teams);

        cache.invalidate(CacheKey::user("ada@school.edu").as_str());
        assert!(!cache.store_not_found_if_current(&teams, observed));

        let other = CacheKey::user("grace@school.edu");
        let observed = cache.generation(&other);
        cache.invalidate_prefix("team:");
        assert!(!cache.store_if_current(&other, &json!({}), observed));
    }

    #[test]
    fn test_purge_expired() {
        let (cache, clock) = cache_with_clock(0);
        cache.set("short", json!(1), Duration::from_secs(1));
        cache.set("long", json!(2), Duration::from_secs(100));
        clock.advance(Duration::from_secs(2));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }
}
