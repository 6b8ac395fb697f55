//! Execution result: the one JSON shape the answer-generation stage consumes.
//!
//! Field names here are the interchange contract. The executor always returns
//! a well-formed result, degrading to `mode: "error"` rather than surfacing
//! raw failures.

use crate::models::analysis::{FuzzyRegion, GraphAnalysis, Hotspot, SpatialAnalysis};
use crate::models::poi::CompressedPoi;
use crate::models::LonLat;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Basic,
    Aggregated,
    Graph,
    Comparison,
    Error,
}

/// Which rung of the resolution ladder produced the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorSource {
    Exact,
    Fuzzy,
    LandmarkTable,
    Vector,
    Geocoder,
    ViewportCentroid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAnchor {
    pub name: String,
    pub lon: f64,
    pub lat: f64,
    pub source: AnchorSource,
}

impl ResolvedAnchor {
    pub fn location(&self) -> LonLat {
        LonLat::new(self.lon, self.lat)
    }
}

/// Per-category slice of an area profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryShare {
    pub name: String,
    pub count: usize,
    /// Percentage of the candidate set, one decimal.
    pub percentage: f64,
    /// Up to two example POI names.
    pub examples: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_rating: Option<f32>,
}

/// Category histogram of the candidate set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaProfile {
    pub total: usize,
    /// Top categories by count, at most five.
    pub categories: Vec<CategoryShare>,
    /// Categories with fewer than 3 occurrences, at most three.
    pub rare_categories: Vec<String>,
}

/// A representative landmark chosen by typed relevance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub name: String,
    pub category: String,
    pub relevance: u8,
    pub lon: f64,
    pub lat: f64,
}

/// Structured retry advice emitted when expansion found nothing. The caller
/// renders this; the engine never produces prose here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionSuggestion {
    pub attempted_strategies: Vec<String>,
    pub final_radius_m: f64,
    pub generalized_categories: Vec<String>,
}

/// One side of a region comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionComparison {
    pub label: String,
    pub poi_count: usize,
    pub top_categories: Vec<CategoryShare>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_rating: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TwoStageStats {
    pub enabled: bool,
    /// True when the anchor fell outside the selection and the viewport
    /// constraint was dropped.
    pub viewport_dropped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub execution_time_ms: u64,
    pub candidate_count: usize,
    pub returned_count: usize,
    pub cache_hit: bool,
    /// POIs removed by the conditional blocklist.
    pub filtered_noise_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expansion_applied: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub two_stage_filter: Option<TwoStageStats>,
    pub downsampled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub generated_at: DateTime<Utc>,
}

impl Default for ExecutionStats {
    fn default() -> Self {
        Self {
            execution_time_ms: 0,
            candidate_count: 0,
            returned_count: 0,
            cache_hit: false,
            filtered_noise_count: 0,
            expansion_applied: None,
            two_stage_filter: None,
            downsampled: false,
            error: None,
            generated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub mode: ExecutionMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<ResolvedAnchor>,
    pub pois: Vec<CompressedPoi>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_profile: Option<AreaProfile>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub landmarks: Vec<Landmark>,
    /// Convex hull of the returned POIs as a GeoJSON Polygon.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boundary: Option<geojson::Geometry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spatial_analysis: Option<SpatialAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spatial_clusters: Option<Vec<Hotspot>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuzzy_regions: Option<Vec<FuzzyRegion>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_analysis: Option<GraphAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<Vec<RegionComparison>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expansion_suggestion: Option<ExpansionSuggestion>,
    pub stats: ExecutionStats,
}

impl ExecutionResult {
    /// Empty result skeleton for the given mode.
    pub fn empty(mode: ExecutionMode) -> Self {
        Self {
            mode,
            anchor: None,
            pois: Vec::new(),
            area_profile: None,
            landmarks: Vec::new(),
            boundary: None,
            spatial_analysis: None,
            spatial_clusters: None,
            fuzzy_regions: None,
            graph_analysis: None,
            comparison: None,
            expansion_suggestion: None,
            stats: ExecutionStats::default(),
        }
    }

    /// Degraded-but-valid result carrying the failure description.
    pub fn degraded(error: impl Into<String>) -> Self {
        let mut result = Self::empty(ExecutionMode::Error);
        result.stats.error = Some(error.into());
        result
    }
}
