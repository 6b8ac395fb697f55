//! Query result cache.
//!
//! Keys are structural fingerprints rather than raw plans: near-identical
//! requests (a nudged viewport, a reordered category list) collapse onto the
//! same entry. Spatial position is bucketed to a coarse hex cell and the
//! radius to 500 m steps, so drag jitter on a map does not defeat the cache.

use poirag_core::hex::{self, FINGERPRINT_RESOLUTION};
use poirag_core::models::{QueryPlan, QueryType, SpatialContext};
use poirag_core::models::result::ExecutionResult;
use poirag_core::config::CacheConfig;
use poirag_core::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

const RADIUS_BUCKET_M: f64 = 500.0;
const EVICTION_FRACTION: usize = 10;

/// Structural identity of a query, insensitive to small spatial jitter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryFingerprint {
    kind: QueryType,
    /// Coarse hex cells of the context centroids, sorted.
    cells: Vec<String>,
    radius_bucket: i64,
    categories: Vec<String>,
    semantic: Option<String>,
    aggregation: (bool, Option<u8>),
    sampling: bool,
    regions: Vec<String>,
}

impl QueryFingerprint {
    /// Compute the fingerprint of a plan against its spatial contexts.
    pub fn of(plan: &QueryPlan, contexts: &[SpatialContext]) -> Result<Self> {
        let mut cells = Vec::with_capacity(contexts.len());
        for context in contexts {
            let center = context.centroid();
            let cell = hex::cell_for(center.lon, center.lat, FINGERPRINT_RESOLUTION)?;
            cells.push(cell.to_string());
        }
        cells.sort_unstable();

        let mut categories = plan.categories.clone();
        categories.sort_unstable();

        let mut regions = plan.target_regions.clone();
        regions.sort_unstable();

        Ok(Self {
            kind: plan.query_type,
            cells,
            radius_bucket: (plan.radius_m / RADIUS_BUCKET_M).round() as i64,
            categories,
            semantic: plan
                .semantic_query
                .as_ref()
                .map(|q| q.trim().to_lowercase()),
            aggregation: (plan.aggregation.enabled, plan.aggregation.resolution),
            sampling: plan.sampling.enabled,
            regions,
        })
    }
}

struct CacheEntry {
    result: ExecutionResult,
    inserted: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted) >= self.ttl
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Hits over lookups, 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// Bounded TTL cache over execution results.
///
/// Lock poisoning only occurs when another thread panicked while holding the
/// lock; at that point the process state is already compromised and
/// propagating the panic is the correct response.
pub struct QueryCache {
    entries: RwLock<HashMap<QueryFingerprint, CacheEntry>>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            inserts: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn ttl_for(&self, kind: QueryType) -> Duration {
        let seconds = match kind {
            QueryType::PoiSearch => self.config.ttl_poi_search_s,
            QueryType::AreaAnalysis => self.config.ttl_area_s,
            QueryType::RegionComparison => self.config.ttl_default_s,
        };
        Duration::from_secs(seconds)
    }

    /// Look up a non-expired entry. Expired entries are dropped on contact.
    pub fn get(&self, key: &QueryFingerprint) -> Option<ExecutionResult> {
        let now = Instant::now();
        {
            let entries = self.entries.read().unwrap();
            if let Some(entry) = entries.get(key) {
                if !entry.expired(now) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    let mut result = entry.result.clone();
                    result.stats.cache_hit = true;
                    return Some(result);
                }
            } else {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }
        // Found but stale
        self.entries.write().unwrap().remove(key);
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a result under its fingerprint, evicting the oldest tenth of
    /// entries when the cache is at capacity.
    pub fn insert(&self, key: QueryFingerprint, kind: QueryType, result: ExecutionResult) {
        let mut entries = self.entries.write().unwrap();
        if entries.len() >= self.config.max_entries && !entries.contains_key(&key) {
            let evict = (self.config.max_entries / EVICTION_FRACTION).max(1);
            let mut by_age: Vec<(QueryFingerprint, Instant)> = entries
                .iter()
                .map(|(k, v)| (k.clone(), v.inserted))
                .collect();
            by_age.sort_by_key(|(_, inserted)| *inserted);
            for (stale, _) in by_age.into_iter().take(evict) {
                entries.remove(&stale);
            }
            self.evictions.fetch_add(evict as u64, Ordering::Relaxed);
            tracing::debug!(evicted = evict, "cache at capacity, evicted oldest entries");
        }
        self.inserts.fetch_add(1, Ordering::Relaxed);
        entries.insert(
            key,
            CacheEntry {
                result,
                inserted: Instant::now(),
                ttl: self.ttl_for(kind),
            },
        );
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| !entry.expired(now));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poirag_core::models::result::ExecutionMode;
    use poirag_core::models::BoundingBox;

    fn viewport(min_lon: f64, min_lat: f64) -> SpatialContext {
        SpatialContext::Viewport {
            bbox: BoundingBox::new(min_lon, min_lat, min_lon + 0.02, min_lat + 0.02),
        }
    }

    #[test]
    fn test_jittered_viewport_shares_fingerprint() {
        let plan = QueryPlan::poi_search().question("附近的咖啡");
        // Center the view on a fingerprint-resolution cell center so a small
        // drag stays within the cell
        let cell = hex::cell_for(113.31, 23.10, FINGERPRINT_RESOLUTION).unwrap();
        let c = hex::cell_center(cell);
        // ~30 m drag on the map
        let a = QueryFingerprint::of(&plan, &[viewport(c.lon - 0.01, c.lat - 0.01)]).unwrap();
        let b =
            QueryFingerprint::of(&plan, &[viewport(c.lon - 0.0097, c.lat - 0.0098)]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_category_order_is_irrelevant() {
        let contexts = [viewport(113.31, 23.10)];
        let a = QueryFingerprint::of(
            &QueryPlan::poi_search().categories(vec!["餐饮".into(), "购物".into()]),
            &contexts,
        )
        .unwrap();
        let b = QueryFingerprint::of(
            &QueryPlan::poi_search().categories(vec!["购物".into(), "餐饮".into()]),
            &contexts,
        )
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_distant_centers_differ() {
        let plan = QueryPlan::poi_search();
        let a = QueryFingerprint::of(&plan, &[viewport(113.31, 23.10)]).unwrap();
        let b = QueryFingerprint::of(&plan, &[viewport(113.50, 23.30)]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_hit_and_miss_accounting() {
        let cache = QueryCache::default();
        let plan = QueryPlan::poi_search();
        let key = QueryFingerprint::of(&plan, &[viewport(113.31, 23.10)]).unwrap();

        assert!(cache.get(&key).is_none());
        cache.insert(
            key.clone(),
            QueryType::PoiSearch,
            ExecutionResult::empty(ExecutionMode::Basic),
        );
        let hit = cache.get(&key).unwrap();
        assert!(hit.stats.cache_hit);

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.inserts, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn test_expired_entry_is_dropped() {
        let cache = QueryCache::new(CacheConfig {
            ttl_poi_search_s: 0,
            ..Default::default()
        });
        let key = QueryFingerprint::of(&QueryPlan::poi_search(), &[viewport(113.31, 23.10)])
            .unwrap();
        cache.insert(
            key.clone(),
            QueryType::PoiSearch,
            ExecutionResult::empty(ExecutionMode::Basic),
        );
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_evicts_oldest_tenth() {
        let cache = QueryCache::new(CacheConfig {
            max_entries: 20,
            ..Default::default()
        });
        for i in 0..20 {
            let plan = QueryPlan::poi_search().radius(1000.0 + i as f64 * 600.0);
            let key = QueryFingerprint::of(&plan, &[viewport(113.31, 23.10)]).unwrap();
            cache.insert(
                key,
                QueryType::PoiSearch,
                ExecutionResult::empty(ExecutionMode::Basic),
            );
        }
        assert_eq!(cache.len(), 20);

        let plan = QueryPlan::poi_search().radius(50.0);
        let key = QueryFingerprint::of(&plan, &[viewport(113.50, 23.30)]).unwrap();
        cache.insert(
            key,
            QueryType::PoiSearch,
            ExecutionResult::empty(ExecutionMode::Basic),
        );
        // 2 evicted, 1 inserted
        assert_eq!(cache.len(), 19);
        assert_eq!(cache.stats().evictions, 2);
        assert_eq!(cache.stats().inserts, 21);
    }

    #[test]
    fn test_cleanup_expired() {
        let cache = QueryCache::new(CacheConfig {
            ttl_poi_search_s: 0,
            ttl_area_s: 600,
            ..Default::default()
        });
        let stale = QueryFingerprint::of(&QueryPlan::poi_search(), &[viewport(113.31, 23.10)])
            .unwrap();
        let fresh = QueryFingerprint::of(&QueryPlan::area_analysis(), &[viewport(113.31, 23.10)])
            .unwrap();
        cache.insert(
            stale,
            QueryType::PoiSearch,
            ExecutionResult::empty(ExecutionMode::Basic),
        );
        cache.insert(
            fresh.clone(),
            QueryType::AreaAnalysis,
            ExecutionResult::empty(ExecutionMode::Aggregated),
        );

        assert_eq!(cache.cleanup_expired(), 1);
        assert!(cache.get(&fresh).is_some());
    }
}
