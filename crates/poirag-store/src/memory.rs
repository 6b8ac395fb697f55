//! In-memory store implementations for development and testing.
//!
//! These implementations use `RwLock::unwrap()` intentionally. Lock poisoning
//! only occurs when another thread panicked while holding the lock, which is
//! an unrecoverable state. Production deployments back these ports with a
//! spatial database.

use async_trait::async_trait;
use poirag_core::geo::kernel;
use poirag_core::models::Poi;
use poirag_core::Result;
use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};
use std::sync::{Arc, RwLock};

use crate::ports::{AreaConstraint, PoiQuery, PoiStore, ScoredPoi, VectorIndex};

/// Meters per degree of latitude, used to inflate bounding boxes.
const M_PER_DEG: f64 = 111_320.0;

type TreeEntry = GeomWithData<[f64; 2], usize>;

/// R-tree backed in-memory POI store.
#[derive(Debug, Clone, Default)]
pub struct MemoryPoiStore {
    pois: Arc<RwLock<Vec<Poi>>>,
    tree: Arc<RwLock<RTree<TreeEntry>>>,
}

impl MemoryPoiStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, poi: Poi) {
        let mut pois = self.pois.write().unwrap();
        let mut tree = self.tree.write().unwrap();
        tree.insert(GeomWithData::new([poi.lon, poi.lat], pois.len()));
        pois.push(poi);
    }

    pub fn insert_all(&self, batch: impl IntoIterator<Item = Poi>) {
        for poi in batch {
            self.insert(poi);
        }
    }

    pub fn len(&self) -> usize {
        self.pois.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Candidate indices from the R-tree for an area constraint, before the
    /// exact geometric check.
    fn envelope_candidates(&self, area: &AreaConstraint) -> Vec<usize> {
        let envelope = match area {
            AreaConstraint::Ring(ring) => {
                let (mut min_lon, mut min_lat) = (f64::MAX, f64::MAX);
                let (mut max_lon, mut max_lat) = (f64::MIN, f64::MIN);
                for p in ring {
                    min_lon = min_lon.min(p.lon);
                    min_lat = min_lat.min(p.lat);
                    max_lon = max_lon.max(p.lon);
                    max_lat = max_lat.max(p.lat);
                }
                AABB::from_corners([min_lon, min_lat], [max_lon, max_lat])
            }
            AreaConstraint::Circle { center, radius_m } => {
                let dlat = radius_m / M_PER_DEG;
                let dlon = radius_m / (M_PER_DEG * center.lat.to_radians().cos().max(1e-6));
                AABB::from_corners(
                    [center.lon - dlon, center.lat - dlat],
                    [center.lon + dlon, center.lat + dlat],
                )
            }
        };

        let tree = self.tree.read().unwrap();
        let mut indices: Vec<usize> = tree
            .locate_in_envelope(&envelope)
            .map(|entry| entry.data)
            .collect();
        indices.sort_unstable();
        indices
    }
}

fn matches(poi: &Poi, query: &PoiQuery) -> bool {
    if let Some(area) = &query.area {
        let inside = match area {
            AreaConstraint::Ring(ring) => kernel::ring_contains(ring, poi.lon, poi.lat),
            AreaConstraint::Circle { center, radius_m } => {
                kernel::haversine_m(center.point(), poi.point()) <= *radius_m
            }
        };
        if !inside {
            return false;
        }
    }

    if !query.categories.is_empty()
        && !query.categories.iter().any(|c| poi.matches_category(c))
    {
        return false;
    }

    if let Some(keyword) = &query.keyword {
        if !poi.name.contains(keyword.as_str()) && !poi.matches_category(keyword) {
            return false;
        }
    }

    if let Some(min) = query.rating_range[0] {
        if poi.rating.map_or(true, |r| r < min) {
            return false;
        }
    }
    if let Some(max) = query.rating_range[1] {
        if poi.rating.map_or(false, |r| r > max) {
            return false;
        }
    }

    true
}

#[async_trait]
impl PoiStore for MemoryPoiStore {
    async fn search(&self, query: &PoiQuery) -> Result<Vec<Poi>> {
        let pois = self.pois.read().unwrap();

        let candidates: Vec<usize> = match &query.area {
            Some(area) => self.envelope_candidates(area),
            None => (0..pois.len()).collect(),
        };

        let mut hits: Vec<Poi> = candidates
            .into_iter()
            .map(|i| &pois[i])
            .filter(|poi| matches(poi, query))
            .cloned()
            .collect();

        if let Some(limit) = query.limit {
            hits.truncate(limit);
        }
        Ok(hits)
    }

    async fn find_exact(&self, name: &str) -> Result<Option<Poi>> {
        let pois = self.pois.read().unwrap();
        Ok(pois.iter().find(|p| p.name == name.trim()).cloned())
    }

    async fn find_fuzzy(&self, name: &str) -> Result<Option<Poi>> {
        let needle = name.trim();
        if needle.is_empty() {
            return Ok(None);
        }
        let pois = self.pois.read().unwrap();
        // Prefer names containing the query; among those, the shortest (most
        // specific) match wins. Falls back to the query containing the name.
        let mut containing: Vec<&Poi> =
            pois.iter().filter(|p| p.name.contains(needle)).collect();
        containing.sort_by_key(|p| (p.name.chars().count(), p.name.clone()));
        if let Some(best) = containing.first() {
            return Ok(Some((*best).clone()));
        }
        Ok(pois
            .iter()
            .find(|p| !p.name.is_empty() && needle.contains(p.name.as_str()))
            .cloned())
    }
}

/// Deterministic character-bigram embedding used by the in-memory vector
/// index. A stand-in for a real embedder with the same cosine geometry.
pub fn text_embedding(text: &str) -> Vec<f32> {
    const DIM: usize = 64;
    let mut v = vec![0.0f32; DIM];
    let chars: Vec<char> = text.chars().collect();
    for pair in chars.windows(2) {
        let mut hash: u64 = 0xcbf29ce484222325;
        for &c in pair {
            hash ^= c as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        v[(hash % DIM as u64) as usize] += 1.0;
    }
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    (dot / (na * nb)) as f64
}

/// In-memory vector index over precomputed embeddings.
#[derive(Debug, Clone, Default)]
pub struct MemoryVectorIndex {
    entries: Arc<RwLock<Vec<(Poi, Vec<f32>)>>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, poi: Poi, embedding: Vec<f32>) {
        self.entries.write().unwrap().push((poi, embedding));
    }

    /// Index a POI under the embedding of its name and categories.
    pub fn insert_text(&self, poi: Poi) {
        let text = format!(
            "{} {} {} {}",
            poi.name, poi.category_big, poi.category_mid, poi.category_small
        );
        self.insert(poi, text_embedding(&text));
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    fn is_available(&self) -> bool {
        !self.entries.read().unwrap().is_empty()
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ScoredPoi>> {
        let needle = text_embedding(query);
        let entries = self.entries.read().unwrap();
        let mut scored: Vec<ScoredPoi> = entries
            .iter()
            .map(|(poi, embedding)| ScoredPoi {
                poi: poi.clone(),
                similarity: cosine(&needle, embedding),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.poi.id.cmp(&b.poi.id))
        });
        scored.truncate(limit);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poirag_core::models::LonLat;

    fn poi(id: &str, name: &str, lon: f64, lat: f64, category: &str, rating: Option<f32>) -> Poi {
        Poi {
            id: id.to_string(),
            name: name.to_string(),
            category_big: category.to_string(),
            category_mid: String::new(),
            category_small: String::new(),
            lon,
            lat,
            address: String::new(),
            rating,
        }
    }

    fn seeded() -> MemoryPoiStore {
        let store = MemoryPoiStore::new();
        store.insert_all([
            poi("1", "鹭江地铁站", 113.32, 23.10, "交通设施", None),
            poi("2", "老王咖啡", 113.321, 23.101, "餐饮服务", Some(4.5)),
            poi("3", "季风咖啡馆", 113.322, 23.102, "餐饮服务", Some(4.0)),
            poi("4", "中山大学", 113.30, 23.09, "科教文化", None),
            poi("5", "远方面馆", 113.50, 23.30, "餐饮服务", Some(3.2)),
        ]);
        store
    }

    #[tokio::test]
    async fn test_circle_search_with_category() {
        let store = seeded();
        let query = PoiQuery::within(AreaConstraint::Circle {
            center: LonLat::new(113.32, 23.10),
            radius_m: 500.0,
        })
        .categories(vec!["餐饮".to_string()]);

        let hits = store.search(&query).await.unwrap();
        let names: Vec<&str> = hits.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["老王咖啡", "季风咖啡馆"]);
    }

    #[tokio::test]
    async fn test_ring_search() {
        let store = seeded();
        let ring = vec![
            LonLat::new(113.31, 23.09),
            LonLat::new(113.33, 23.09),
            LonLat::new(113.33, 23.11),
            LonLat::new(113.31, 23.11),
            LonLat::new(113.31, 23.09),
        ];
        let hits = store
            .search(&PoiQuery::within(AreaConstraint::Ring(ring)))
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|p| p.name != "远方面馆"));
    }

    #[tokio::test]
    async fn test_rating_filter() {
        let store = seeded();
        let mut query = PoiQuery::default();
        query.rating_range = [Some(4.2), None];
        let hits = store.search(&query).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "老王咖啡");
    }

    #[tokio::test]
    async fn test_exact_and_fuzzy_lookup() {
        let store = seeded();
        assert_eq!(
            store.find_exact("中山大学").await.unwrap().unwrap().id,
            "4"
        );
        assert!(store.find_exact("中山").await.unwrap().is_none());
        // Substring match resolves to the containing name
        assert_eq!(store.find_fuzzy("咖啡").await.unwrap().unwrap().id, "2");
        // Query containing a stored name also resolves
        assert_eq!(
            store.find_fuzzy("中山大学东门").await.unwrap().unwrap().id,
            "4"
        );
        assert!(store.find_fuzzy("不存在的地方").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_limit() {
        let store = seeded();
        let hits = store.search(&PoiQuery::default().limit(2)).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_vector_index_ranks_similar_text_first() {
        let index = MemoryVectorIndex::new();
        index.insert_text(poi("2", "老王咖啡", 113.321, 23.101, "餐饮服务", None));
        index.insert_text(poi("4", "中山大学", 113.30, 23.09, "科教文化", None));
        assert!(index.is_available());

        let hits = index.search("老王咖啡", 2).await.unwrap();
        assert_eq!(hits[0].poi.id, "2");
        assert!(hits[0].similarity > hits[1].similarity);
        assert!(hits[0].similarity > 0.9);
    }

    #[test]
    fn test_embedding_is_normalized_and_stable() {
        let a = text_embedding("人民广场");
        let b = text_embedding("人民广场");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
