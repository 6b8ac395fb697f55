//! Output shapes of the aggregation, clustering, fuzzy-region and graph
//! analysis stages. All of these are derived per request from the candidate
//! set and serialized into the execution result.

use crate::models::LonLat;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// KDE kernel selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelKind {
    #[default]
    Gaussian,
    Epanechnikov,
    Quartic,
}

/// One hexagonal aggregation bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    /// Hex cell id in its canonical string form.
    pub id: String,
    pub count: usize,
    pub centroid: LonLat,
    pub category_histogram: HashMap<String, usize>,
    pub dominant_category: String,
    /// Share of the dominant category within the cell, in [0, 1].
    pub dominant_share: f64,
    /// First-seen POI name, used as the cell's human-readable handle.
    pub representative: String,
}

/// H3 aggregation summary: bins sorted by descending count, capped by the
/// resolution-dependent bin budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialAnalysis {
    pub resolution: u8,
    /// Occupied cells before the bin cap was applied.
    pub total_cells: usize,
    pub grids: Vec<GridCell>,
}

/// One occupied cell of a kernel density surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityCell {
    pub cell: String,
    pub centroid: LonLat,
    /// Min-max normalized density in [0, 1].
    pub density: f64,
    /// Raw kernel-weighted count before normalization.
    pub raw: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KdeResult {
    pub cells: Vec<DensityCell>,
    pub max_raw: f64,
    pub min_raw: f64,
    pub bandwidth_m: f64,
    pub kernel: KernelKind,
}

/// A DBSCAN cluster summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialCluster {
    pub id: usize,
    pub point_count: usize,
    pub centroid: LonLat,
    /// Closed convex-hull ring of member coordinates; absent for clusters
    /// too small to bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boundary: Option<Vec<[f64; 2]>>,
    /// Points per square kilometer.
    pub density: f64,
    pub dominant_categories: Vec<String>,
}

/// A density hotspot: a cluster grown from the top Jenks density bands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hotspot {
    #[serde(flatten)]
    pub cluster: SpatialCluster,
    /// min(point_count / 10, 1): larger clusters are more trustworthy.
    pub confidence: f64,
}

/// Weight-ranked naming material for an external naming step. The engine
/// never invents a final region name itself.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NameCandidates {
    /// Most landmark-like POI names, deduplicated, at most 6.
    pub top_landmarks: Vec<String>,
    /// 2-3 character name prefixes occurring at least 3 times, at most 5.
    pub common_patterns: Vec<String>,
    /// Fallback label assembled from the best landmark and the theme.
    pub best_guess: String,
}

/// The three boundary layers of a fuzzy region, innermost first. A layer is
/// absent when too few points qualified to bound it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FuzzyRegionLayers {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core: Option<Vec<[f64; 2]>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<Vec<[f64; 2]>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outer: Option<Vec<[f64; 2]>>,
}

/// A vernacular region approximation derived from one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuzzyRegion {
    pub id: usize,
    pub theme: String,
    pub center: LonLat,
    pub layers: FuzzyRegionLayers,
    pub point_count: usize,
    pub dominant_categories: Vec<String>,
    pub name_candidates: NameCandidates,
}

/// A top-ranked hub cell (by PageRank).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubCell {
    pub cell: String,
    pub centroid: LonLat,
    pub poi_count: usize,
    pub dominant_category: String,
    pub page_rank: f64,
}

/// A top-ranked bridge cell (by sampled betweenness).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeCell {
    pub cell: String,
    pub centroid: LonLat,
    pub poi_count: usize,
    pub betweenness: f64,
}

/// A detected community of adjacent cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunitySummary {
    pub id: usize,
    pub cell_count: usize,
    pub poi_count: usize,
    pub centroid: LonLat,
    pub dominant_category: String,
}

/// Bounded structural summary of the spatial graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphAnalysis {
    pub node_count: usize,
    pub edge_count: usize,
    pub hubs: Vec<HubCell>,
    pub bridges: Vec<BridgeCell>,
    pub communities: Vec<CommunitySummary>,
    /// Templated natural-language observations for the answer stage.
    pub insights: Vec<String>,
}
