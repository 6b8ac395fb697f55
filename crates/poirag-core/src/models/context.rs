//! The user's on-screen selection: polygon, circle, or viewport.

use crate::error::{PoiragError, Result};
use crate::geo::kernel;
use crate::models::LonLat;
use serde::{Deserialize, Serialize};

/// Axis-aligned viewport bounds in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    pub fn center(&self) -> LonLat {
        LonLat::new(
            (self.min_lon + self.max_lon) / 2.0,
            (self.min_lat + self.max_lat) / 2.0,
        )
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    pub fn validate(&self) -> Result<()> {
        LonLat::new(self.min_lon, self.min_lat).validate()?;
        LonLat::new(self.max_lon, self.max_lat).validate()?;
        if self.min_lon > self.max_lon || self.min_lat > self.max_lat {
            return Err(PoiragError::InvalidContext {
                reason: format!(
                    "inverted viewport bounds: [{}, {}] x [{}, {}]",
                    self.min_lon, self.max_lon, self.min_lat, self.max_lat
                ),
            });
        }
        Ok(())
    }
}

/// One spatial selection. Read-only input from the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SpatialContext {
    /// A drawn polygon, as an unclosed ring of vertices.
    Polygon { ring: Vec<LonLat> },
    /// A circle around a picked center.
    Circle { center: LonLat, radius_m: f64 },
    /// The visible map extent.
    Viewport { bbox: BoundingBox },
}

impl SpatialContext {
    pub fn validate(&self) -> Result<()> {
        match self {
            SpatialContext::Polygon { ring } => {
                if ring.len() < 3 {
                    return Err(PoiragError::InvalidContext {
                        reason: format!("polygon ring needs at least 3 vertices, got {}", ring.len()),
                    });
                }
                for vertex in ring {
                    vertex.validate()?;
                }
                Ok(())
            }
            SpatialContext::Circle { center, radius_m } => {
                center.validate()?;
                if !radius_m.is_finite() || *radius_m <= 0.0 {
                    return Err(PoiragError::InvalidContext {
                        reason: format!("circle radius must be positive, got {}", radius_m),
                    });
                }
                Ok(())
            }
            SpatialContext::Viewport { bbox } => bbox.validate(),
        }
    }

    /// Geometric center of the selection, used as the fallback anchor.
    pub fn centroid(&self) -> LonLat {
        match self {
            SpatialContext::Polygon { ring } => {
                let points: Vec<geo::Point<f64>> = ring.iter().map(LonLat::point).collect();
                kernel::centroid(&points)
                    .map(LonLat::from)
                    .unwrap_or_else(|| ring[0])
            }
            SpatialContext::Circle { center, .. } => *center,
            SpatialContext::Viewport { bbox } => bbox.center(),
        }
    }

    /// The selection as a closed polygon ring. Circles are approximated with
    /// a 32-segment ring.
    pub fn to_ring(&self) -> Vec<LonLat> {
        match self {
            SpatialContext::Polygon { ring } => {
                let mut closed = ring.clone();
                if closed.first() != closed.last() {
                    if let Some(first) = closed.first().copied() {
                        closed.push(first);
                    }
                }
                closed
            }
            SpatialContext::Circle { center, radius_m } => {
                kernel::circle_ring(*center, *radius_m, 32)
            }
            SpatialContext::Viewport { bbox } => vec![
                LonLat::new(bbox.min_lon, bbox.min_lat),
                LonLat::new(bbox.max_lon, bbox.min_lat),
                LonLat::new(bbox.max_lon, bbox.max_lat),
                LonLat::new(bbox.min_lon, bbox.max_lat),
                LonLat::new(bbox.min_lon, bbox.min_lat),
            ],
        }
    }

    /// Exact containment check against the selection geometry.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        match self {
            SpatialContext::Polygon { .. } => kernel::ring_contains(&self.to_ring(), lon, lat),
            SpatialContext::Circle { center, radius_m } => {
                kernel::haversine_m(center.point(), geo::Point::new(lon, lat)) <= *radius_m
            }
            SpatialContext::Viewport { bbox } => bbox.contains(lon, lat),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> SpatialContext {
        SpatialContext::Polygon {
            ring: vec![
                LonLat::new(116.0, 39.0),
                LonLat::new(116.1, 39.0),
                LonLat::new(116.1, 39.1),
                LonLat::new(116.0, 39.1),
            ],
        }
    }

    #[test]
    fn test_polygon_contains_and_centroid() {
        let ctx = square();
        assert!(ctx.contains(116.05, 39.05));
        assert!(!ctx.contains(116.2, 39.05));

        let c = ctx.centroid();
        assert!((c.lon - 116.05).abs() < 1e-6);
        assert!((c.lat - 39.05).abs() < 1e-6);
    }

    #[test]
    fn test_circle_contains_by_distance() {
        let ctx = SpatialContext::Circle {
            center: LonLat::new(116.0, 39.0),
            radius_m: 1_000.0,
        };
        // ~0.005 degrees lon at lat 39 is roughly 430m
        assert!(ctx.contains(116.005, 39.0));
        // ~0.05 degrees is roughly 4.3km
        assert!(!ctx.contains(116.05, 39.0));
    }

    #[test]
    fn test_viewport_ring_is_closed() {
        let ctx = SpatialContext::Viewport {
            bbox: BoundingBox::new(116.0, 39.0, 116.1, 39.1),
        };
        let ring = ctx.to_ring();
        assert_eq!(ring.first(), ring.last());
        assert_eq!(ring.len(), 5);
    }

    #[test]
    fn test_validation() {
        assert!(square().validate().is_ok());

        let degenerate = SpatialContext::Polygon {
            ring: vec![LonLat::new(0.0, 0.0), LonLat::new(1.0, 1.0)],
        };
        assert!(degenerate.validate().is_err());

        let bad_circle = SpatialContext::Circle {
            center: LonLat::new(116.0, 39.0),
            radius_m: -5.0,
        };
        assert!(bad_circle.validate().is_err());

        let inverted = SpatialContext::Viewport {
            bbox: BoundingBox::new(116.1, 39.0, 116.0, 39.1),
        };
        assert!(inverted.validate().is_err());
    }
}
