//! Port traits decoupling the engine from concrete storage and external
//! services. The engine only ever issues read queries through these.

use async_trait::async_trait;
use poirag_core::models::{LonLat, Poi, SpatialContext};
use poirag_core::Result;

/// Geometric constraint of a store query.
#[derive(Debug, Clone, PartialEq)]
pub enum AreaConstraint {
    /// Containment in a closed polygon ring.
    Ring(Vec<LonLat>),
    /// Within a radius of a center.
    Circle { center: LonLat, radius_m: f64 },
}

impl From<&SpatialContext> for AreaConstraint {
    fn from(context: &SpatialContext) -> Self {
        match context {
            SpatialContext::Circle { center, radius_m } => AreaConstraint::Circle {
                center: *center,
                radius_m: *radius_m,
            },
            other => AreaConstraint::Ring(other.to_ring()),
        }
    }
}

/// Filtered POI search request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoiQuery {
    pub area: Option<AreaConstraint>,
    /// Any-of category keyword match against the three category levels.
    pub categories: Vec<String>,
    /// Free-text match against name and categories.
    pub keyword: Option<String>,
    pub rating_range: [Option<f32>; 2],
    pub limit: Option<usize>,
}

impl PoiQuery {
    pub fn within(area: AreaConstraint) -> Self {
        Self {
            area: Some(area),
            ..Default::default()
        }
    }

    pub fn categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Read-only access to the point-feature store.
#[async_trait]
pub trait PoiStore: Send + Sync {
    async fn search(&self, query: &PoiQuery) -> Result<Vec<Poi>>;

    /// Exact name match.
    async fn find_exact(&self, name: &str) -> Result<Option<Poi>>;

    /// Best substring/similarity match.
    async fn find_fuzzy(&self, name: &str) -> Result<Option<Poi>>;
}

/// A vector search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoi {
    pub poi: Poi,
    /// Cosine similarity in [-1, 1].
    pub similarity: f64,
}

/// Nearest-neighbor search over POI text embeddings. Optional: the engine
/// degrades to keyword ranking when unavailable.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn is_available(&self) -> bool;

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ScoredPoi>>;
}

/// External geocoding result, already corrected to WGS84.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodedPlace {
    pub name: String,
    pub lon: f64,
    pub lat: f64,
}

/// Best-effort external place-name resolution.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, query: &str) -> Result<Option<GeocodedPlace>>;
}

/// Vector index stand-in for deployments without embeddings.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopVector;

#[async_trait]
impl VectorIndex for NoopVector {
    fn is_available(&self) -> bool {
        false
    }

    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<ScoredPoi>> {
        Ok(Vec::new())
    }
}

/// Geocoder stand-in for deployments without an external service.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopGeocoder;

#[async_trait]
impl Geocoder for NoopGeocoder {
    async fn geocode(&self, _query: &str) -> Result<Option<GeocodedPlace>> {
        Ok(None)
    }
}
