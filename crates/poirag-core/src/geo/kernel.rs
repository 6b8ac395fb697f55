//! Geometry kernel: haversine distance, centroids, convex hulls, ring
//! buffering, and GeoJSON polygon synthesis.
//!
//! All coordinates are WGS84 degrees; all distances are meters. Outward
//! buffering uses the local meters-per-degree approximation, which is
//! accurate to well under a percent at city scale.

use crate::models::LonLat;
use geo::algorithm::centroid::Centroid;
use geo::algorithm::contains::Contains;
use geo::algorithm::convex_hull::ConvexHull;
use geo::{Coord, Distance, Haversine, LineString, MultiPoint, Point, Polygon};

/// Meters per degree of latitude (and of longitude at the equator).
const M_PER_DEG: f64 = 111_320.0;

/// Great-circle distance between two points, in meters.
pub fn haversine_m(a: Point<f64>, b: Point<f64>) -> f64 {
    Haversine.distance(a, b)
}

/// Mean center of a point set. `None` for an empty input.
pub fn centroid(points: &[Point<f64>]) -> Option<Point<f64>> {
    if points.is_empty() {
        return None;
    }
    MultiPoint::from(points.to_vec()).centroid()
}

/// Closed convex-hull ring of a point set, `[lon, lat]` pairs.
///
/// Returns `None` when fewer than 3 distinct points are supplied or the hull
/// degenerates (collinear input).
pub fn convex_hull_ring(points: &[LonLat]) -> Option<Vec<[f64; 2]>> {
    if points.len() < 3 {
        return None;
    }
    let multi: MultiPoint<f64> = points.iter().map(LonLat::point).collect::<Vec<_>>().into();
    let hull = multi.convex_hull();
    let ring: Vec<[f64; 2]> = hull.exterior().coords().map(|c| [c.x, c.y]).collect();
    // A proper closed ring has at least a triangle plus the closing vertex.
    if ring.len() < 4 {
        return None;
    }
    Some(ring)
}

/// Point-in-polygon test against a closed ring.
pub fn ring_contains(ring: &[LonLat], lon: f64, lat: f64) -> bool {
    if ring.len() < 4 {
        return false;
    }
    let coords: Vec<Coord<f64>> = ring.iter().map(|p| Coord { x: p.lon, y: p.lat }).collect();
    let polygon = Polygon::new(LineString::from(coords), vec![]);
    polygon.contains(&Point::new(lon, lat))
}

/// Shift a point by metric offsets (east, north).
pub fn offset_point(origin: LonLat, east_m: f64, north_m: f64) -> LonLat {
    let lat_scale = M_PER_DEG;
    let lon_scale = M_PER_DEG * origin.lat.to_radians().cos().max(1e-6);
    LonLat::new(origin.lon + east_m / lon_scale, origin.lat + north_m / lat_scale)
}

/// Closed ring approximating a circle, counter-clockwise.
pub fn circle_ring(center: LonLat, radius_m: f64, segments: usize) -> Vec<LonLat> {
    let segments = segments.max(3);
    let mut ring = Vec::with_capacity(segments + 1);
    for i in 0..=segments {
        let angle = 2.0 * std::f64::consts::PI * (i as f64) / (segments as f64);
        ring.push(offset_point(
            center,
            radius_m * angle.cos(),
            radius_m * angle.sin(),
        ));
    }
    ring
}

/// Push every ring vertex outward from the given center by `extra_m` meters.
///
/// Used to derive the transition and outer layers of a fuzzy region from its
/// core shape.
pub fn buffer_ring(ring: &[[f64; 2]], center: LonLat, extra_m: f64) -> Vec<[f64; 2]> {
    ring.iter()
        .map(|&[lon, lat]| {
            let east_m = (lon - center.lon) * M_PER_DEG * center.lat.to_radians().cos();
            let north_m = (lat - center.lat) * M_PER_DEG;
            let len = (east_m * east_m + north_m * north_m).sqrt();
            if len < 1e-9 {
                // Vertex sits on the center; nudge straight north.
                let p = offset_point(center, 0.0, extra_m);
                return [p.lon, p.lat];
            }
            let scale = (len + extra_m) / len;
            let p = offset_point(center, east_m * scale, north_m * scale);
            [p.lon, p.lat]
        })
        .collect()
}

/// A closed ring as a GeoJSON Polygon geometry.
pub fn polygon_geometry(ring: &[[f64; 2]]) -> geojson::Geometry {
    let positions: Vec<Vec<f64>> = ring.iter().map(|&[lon, lat]| vec![lon, lat]).collect();
    geojson::Geometry::new(geojson::Value::Polygon(vec![positions]))
}
