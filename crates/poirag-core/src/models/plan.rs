//! Query plan: the structured request produced by the external planner.
//!
//! Plans are untrusted input. `validate` clamps every numeric range before
//! any computation runs.

use crate::error::{PoiragError, Result};
use serde::{Deserialize, Serialize};

pub const MAX_RADIUS_M: f64 = 10_000.0;
pub const MIN_RADIUS_M: f64 = 50.0;
pub const DEFAULT_RADIUS_M: f64 = 1_000.0;
pub const MAX_CATEGORIES: usize = 10;
pub const MAX_SEMANTIC_CHARS: usize = 200;
pub const MAX_RESULTS: usize = 50;
pub const DEFAULT_RESULTS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    PoiSearch,
    AreaAnalysis,
    RegionComparison,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    Relevance,
    Distance,
    Rating,
}

/// A named place the search should originate from. The optional gate suffix
/// ("east gate") is tried concatenated first and retried without on miss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub gate: Option<String>,
}

impl Anchor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            gate: None,
        }
    }

    /// "name + gate" when a gate is present, otherwise just the name.
    pub fn full_name(&self) -> String {
        match &self.gate {
            Some(gate) => format!("{}{}", self.name, gate),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMethod {
    #[default]
    H3,
}

/// Macro-analysis aggregation settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationStrategy {
    pub enabled: bool,
    pub method: AggregationMethod,
    /// Pins the hex resolution; when absent it is derived from the radius.
    pub resolution: Option<u8>,
    pub max_bins: Option<usize>,
}

/// Representative sampling applied before expensive analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingStrategy {
    pub enabled: bool,
    pub max_samples: usize,
}

impl Default for SamplingStrategy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_samples: 500,
        }
    }
}

/// Request-scoped query plan, read-only within the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryPlan {
    pub query_type: QueryType,
    pub anchor: Option<Anchor>,
    pub radius_m: f64,
    pub categories: Vec<String>,
    pub semantic_query: Option<String>,
    /// Inclusive [min, max] rating filter; either bound may be open.
    pub rating_range: [Option<f32>; 2],
    pub max_results: usize,
    pub sort_by: SortBy,
    /// Verbatim user question; consulted by the conditional blocklist and the
    /// graph-reasoning trigger, never parsed structurally.
    pub raw_question: String,
    /// Labels for region comparison mode, parallel to the supplied contexts.
    pub target_regions: Vec<String>,
    pub aggregation: AggregationStrategy,
    pub sampling: SamplingStrategy,
    pub need_landmarks: bool,
    pub need_graph_reasoning: bool,
}

impl Default for QueryPlan {
    fn default() -> Self {
        Self {
            query_type: QueryType::PoiSearch,
            anchor: None,
            radius_m: DEFAULT_RADIUS_M,
            categories: Vec::new(),
            semantic_query: None,
            rating_range: [None, None],
            max_results: DEFAULT_RESULTS,
            sort_by: SortBy::default(),
            raw_question: String::new(),
            target_regions: Vec::new(),
            aggregation: AggregationStrategy::default(),
            sampling: SamplingStrategy::default(),
            need_landmarks: false,
            need_graph_reasoning: false,
        }
    }
}

impl QueryPlan {
    pub fn poi_search() -> Self {
        Self::default()
    }

    pub fn area_analysis() -> Self {
        Self {
            query_type: QueryType::AreaAnalysis,
            aggregation: AggregationStrategy {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn anchor(mut self, name: impl Into<String>) -> Self {
        self.anchor = Some(Anchor::new(name));
        self
    }

    pub fn radius(mut self, radius_m: f64) -> Self {
        self.radius_m = radius_m;
        self
    }

    pub fn categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    pub fn semantic(mut self, query: impl Into<String>) -> Self {
        self.semantic_query = Some(query.into());
        self
    }

    pub fn question(mut self, question: impl Into<String>) -> Self {
        self.raw_question = question.into();
        self
    }

    /// Clamp every numeric field into its allowed range and reject values
    /// that cannot be repaired. Runs before any computation.
    pub fn validate(&mut self) -> Result<()> {
        if !self.radius_m.is_finite() || self.radius_m <= 0.0 {
            return Err(PoiragError::InvalidPlan {
                field: "radius_m".to_string(),
                reason: format!("expected positive finite radius, got {}", self.radius_m),
            });
        }
        self.radius_m = self.radius_m.clamp(MIN_RADIUS_M, MAX_RADIUS_M);

        if self.categories.len() > MAX_CATEGORIES {
            self.categories.truncate(MAX_CATEGORIES);
        }
        self.categories.retain(|c| !c.trim().is_empty());

        if let Some(q) = &mut self.semantic_query {
            let trimmed: String = q.trim().chars().take(MAX_SEMANTIC_CHARS).collect();
            if trimmed.is_empty() {
                self.semantic_query = None;
            } else {
                *q = trimmed;
            }
        }

        if self.max_results == 0 {
            self.max_results = DEFAULT_RESULTS;
        }
        self.max_results = self.max_results.min(MAX_RESULTS);

        if let [Some(min), Some(max)] = self.rating_range {
            if min > max {
                return Err(PoiragError::InvalidPlan {
                    field: "rating_range".to_string(),
                    reason: format!("min {} exceeds max {}", min, max),
                });
            }
        }

        if let Some(res) = self.aggregation.resolution {
            if !(0..=15).contains(&res) {
                return Err(PoiragError::InvalidPlan {
                    field: "aggregation.resolution".to_string(),
                    reason: format!("hex resolution {} out of range 0-15", res),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_clamps_radius() {
        let mut plan = QueryPlan::poi_search().radius(50_000.0);
        plan.validate().unwrap();
        assert_eq!(plan.radius_m, MAX_RADIUS_M);

        let mut plan = QueryPlan::poi_search().radius(1.0);
        plan.validate().unwrap();
        assert_eq!(plan.radius_m, MIN_RADIUS_M);
    }

    #[test]
    fn test_validate_rejects_bad_radius() {
        let mut plan = QueryPlan::poi_search().radius(f64::NAN);
        assert!(plan.validate().is_err());

        let mut plan = QueryPlan::poi_search().radius(-10.0);
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_validate_truncates_categories_and_semantic() {
        let cats: Vec<String> = (0..15).map(|i| format!("c{}", i)).collect();
        let mut plan = QueryPlan::poi_search()
            .categories(cats)
            .semantic("长".repeat(500));
        plan.validate().unwrap();
        assert_eq!(plan.categories.len(), MAX_CATEGORIES);
        assert_eq!(
            plan.semantic_query.as_ref().unwrap().chars().count(),
            MAX_SEMANTIC_CHARS
        );
    }

    #[test]
    fn test_validate_rejects_inverted_rating_range() {
        let mut plan = QueryPlan::poi_search();
        plan.rating_range = [Some(4.5), Some(3.0)];
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_anchor_full_name_with_gate() {
        let mut anchor = Anchor::new("中山大学");
        anchor.gate = Some("东门".to_string());
        assert_eq!(anchor.full_name(), "中山大学东门");
    }

    #[test]
    fn test_plan_json_field_names() {
        let plan = QueryPlan::area_analysis();
        let value = serde_json::to_value(&plan).unwrap();
        assert_eq!(value["query_type"], "area_analysis");
        assert_eq!(value["aggregation"]["method"], "h3");
        assert_eq!(value["sampling"]["max_samples"], 500);
    }
}
