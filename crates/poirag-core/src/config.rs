//! Engine configuration.
//!
//! Every threshold the engine treats as tunable lives here: cache TTLs and
//! capacity, expansion caps, clustering parameters, graph limits, and the
//! two-stage filter behavior. Values layer as defaults -> TOML file ->
//! environment, later layers winning.

use crate::error::{PoiragError, Result};
use crate::models::analysis::KernelKind;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub expansion: ExpansionConfig,
    pub clustering: ClusteringConfig,
    pub fuzzy: FuzzyConfig,
    pub graph: GraphConfig,
    pub two_stage: TwoStageConfig,
    pub resolver: ResolverConfig,
    pub geocoder: GeocoderConfig,
    pub executor: ExecutorConfig,
}

impl EngineConfig {
    /// Load configuration: defaults, then an optional TOML file, then
    /// environment overrides for the geocoder endpoint and key.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML file. Missing sections and keys fall
    /// back to their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        toml::from_str(&content).map_err(|e| PoiragError::ConfigInvalid {
            key: "file".to_string(),
            reason: format!("Failed to parse TOML: {}", e),
        })
    }

    /// Apply environment overrides. Only the geocoder connection is
    /// environment-sensitive; everything else is file-or-default.
    pub fn apply_env(&mut self) {
        if let Ok(endpoint) = env::var("POIRAG_GEOCODER_ENDPOINT") {
            if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                self.geocoder.endpoint = Some(endpoint);
            } else {
                tracing::warn!(
                    "Invalid POIRAG_GEOCODER_ENDPOINT '{}': expected http(s) URL",
                    endpoint
                );
            }
        }

        if let Ok(key) = env::var("POIRAG_GEOCODER_KEY") {
            self.geocoder.api_key = Some(key);
        }
    }

    /// Reject configurations that would make the engine misbehave silently.
    pub fn validate(&self) -> Result<()> {
        if self.cache.max_entries == 0 {
            return Err(PoiragError::ConfigInvalid {
                key: "cache.max_entries".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if !(0.0..1.0).contains(&self.graph.damping) {
            return Err(PoiragError::ConfigInvalid {
                key: "graph.damping".to_string(),
                reason: format!("must be in [0, 1), got {}", self.graph.damping),
            });
        }
        if self.clustering.dbscan_eps_m <= 0.0 {
            return Err(PoiragError::ConfigInvalid {
                key: "clustering.dbscan_eps_m".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.resolver.vector_similarity_floor < 0.0 || self.resolver.vector_similarity_floor > 1.0
        {
            return Err(PoiragError::ConfigInvalid {
                key: "resolver.vector_similarity_floor".to_string(),
                reason: "must be in [0, 1]".to_string(),
            });
        }
        Ok(())
    }
}

/// Query cache sizing and time-to-live per query kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    /// TTL for point searches; shortest because nearby results go stale fastest.
    pub ttl_poi_search_s: u64,
    /// TTL for area/region analysis; these aggregate slowly-changing structure.
    pub ttl_area_s: u64,
    pub ttl_default_s: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 500,
            ttl_poi_search_s: 180,
            ttl_area_s: 600,
            ttl_default_s: 300,
        }
    }
}

/// Expansion search bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    /// Hard cap on escalation attempts per request.
    pub max_attempts: usize,
    /// Radius doubling never exceeds this.
    pub max_radius_m: f64,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            max_radius_m: 10_000.0,
        }
    }
}

/// Density clustering parameters (KDE + DBSCAN + Jenks).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    pub kde_bandwidth_m: f64,
    pub kde_kernel: KernelKind,
    /// Hex resolution used to bin points for density estimation.
    pub kde_resolution: u8,
    pub dbscan_eps_m: f64,
    pub dbscan_min_points: usize,
    /// Looser DBSCAN parameters used when growing hotspot cells into clusters.
    pub hotspot_eps_m: f64,
    pub hotspot_min_points: usize,
    pub jenks_classes: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            kde_bandwidth_m: 200.0,
            kde_kernel: KernelKind::Gaussian,
            kde_resolution: 9,
            dbscan_eps_m: 150.0,
            dbscan_min_points: 3,
            hotspot_eps_m: 300.0,
            hotspot_min_points: 2,
            jenks_classes: 5,
        }
    }
}

/// Fuzzy region membership and boundary layering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzyConfig {
    /// Exponential decay constant for the spatial membership term.
    pub decay_m: f64,
    /// Membership floor for a point to count toward the core layer.
    pub core_threshold: f64,
    pub transition_buffer_m: f64,
    pub outer_buffer_m: f64,
    /// DBSCAN parameters used when regions are grown directly from points.
    pub eps_m: f64,
    pub min_points: usize,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            decay_m: 300.0,
            core_threshold: 0.7,
            transition_buffer_m: 200.0,
            outer_buffer_m: 500.0,
            eps_m: 300.0,
            min_points: 5,
        }
    }
}

/// Spatial graph algorithm limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub damping: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
    /// Betweenness is approximated from at most this many BFS sources.
    pub betweenness_sample: usize,
    pub label_iterations: usize,
    /// Communities smaller than this are dropped from the summary.
    pub min_community_size: usize,
    /// Top-K hubs/bridges/communities reported.
    pub top_k: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            damping: 0.85,
            max_iterations: 20,
            tolerance: 1e-6,
            betweenness_sample: 30,
            label_iterations: 10,
            min_community_size: 3,
            top_k: 5,
        }
    }
}

/// Two-stage filter behavior when both a selection and a named anchor exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwoStageConfig {
    pub enabled: bool,
    /// When the anchor resolves outside the active selection, drop the
    /// viewport constraint and keep only the anchor buffer.
    pub drop_viewport_when_anchor_outside: bool,
}

impl Default for TwoStageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            drop_viewport_when_anchor_outside: true,
        }
    }
}

/// Anchor resolution ladder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Minimum cosine similarity for a vector match to count as an anchor.
    pub vector_similarity_floor: f64,
    pub timeout_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            vector_similarity_floor: 0.65,
            timeout_ms: 2_000,
        }
    }
}

/// External geocoder connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

/// Executor-level budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Compressed POI payload cap.
    pub compressed_limit: usize,
    /// Hotspot analysis only runs at or above this candidate volume.
    pub analysis_min_candidates: usize,
    /// Candidate sets larger than this are stride-downsampled before clustering.
    pub downsample_above: usize,
    pub store_timeout_ms: u64,
    pub vector_timeout_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            compressed_limit: 50,
            analysis_min_candidates: 10,
            downsample_above: 500,
            store_timeout_ms: 5_000,
            vector_timeout_ms: 2_000,
        }
    }
}
