//! Canonical data model: POIs, query plans, spatial contexts, and the
//! execution result shapes consumed by the answer-generation stage.

pub mod analysis;
pub mod context;
pub mod plan;
pub mod poi;
pub mod result;

pub use analysis::{
    DensityCell, FuzzyRegion, FuzzyRegionLayers, GraphAnalysis, GridCell, Hotspot, KdeResult,
    KernelKind, NameCandidates, SpatialAnalysis, SpatialCluster,
};
pub use context::{BoundingBox, SpatialContext};
pub use plan::{
    AggregationMethod, AggregationStrategy, Anchor, QueryPlan, QueryType, SamplingStrategy, SortBy,
};
pub use poi::{CompressedPoi, Poi};
pub use result::{
    AnchorSource, AreaProfile, CategoryShare, ExecutionMode, ExecutionResult, ExecutionStats,
    ExpansionSuggestion, Landmark, RegionComparison, ResolvedAnchor, TwoStageStats,
};

use crate::error::{PoiragError, Result};
use serde::{Deserialize, Serialize};

/// A WGS84 coordinate pair. Longitude first, matching GeoJSON ordering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

impl LonLat {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    pub fn point(&self) -> geo::Point<f64> {
        geo::Point::new(self.lon, self.lat)
    }

    /// Reject coordinates outside the WGS84 range or non-finite values.
    pub fn validate(&self) -> Result<()> {
        if !self.lon.is_finite()
            || !self.lat.is_finite()
            || !(-180.0..=180.0).contains(&self.lon)
            || !(-90.0..=90.0).contains(&self.lat)
        {
            return Err(PoiragError::InvalidCoordinate {
                lon: self.lon,
                lat: self.lat,
            });
        }
        Ok(())
    }
}

impl From<geo::Point<f64>> for LonLat {
    fn from(p: geo::Point<f64>) -> Self {
        Self::new(p.x(), p.y())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lonlat_validation() {
        assert!(LonLat::new(116.4, 39.9).validate().is_ok());
        assert!(LonLat::new(-180.0, 90.0).validate().is_ok());
        assert!(LonLat::new(181.0, 0.0).validate().is_err());
        assert!(LonLat::new(0.0, -90.5).validate().is_err());
        assert!(LonLat::new(f64::NAN, 0.0).validate().is_err());
    }
}
