//! Hexagonal spatial-index adapter.
//!
//! Thin wrapper over `h3o` owning resolution selection, ring-radius math and
//! the bin budgets. The engine works at resolutions 7 (city scale) through
//! 10 (block scale).

use crate::error::{PoiragError, Result};
use crate::models::LonLat;
use h3o::{CellIndex, LatLng, Resolution};

/// Average hexagon edge lengths in meters for the working resolutions.
const EDGE_LENGTHS_M: [(Resolution, f64); 4] = [
    (Resolution::Seven, 1_220.63),
    (Resolution::Eight, 461.35),
    (Resolution::Nine, 174.38),
    (Resolution::Ten, 65.91),
];

/// Resolution used when reducing a spatial context for cache fingerprints.
pub const FINGERPRINT_RESOLUTION: Resolution = Resolution::Seven;

/// Cell containing the given WGS84 coordinate.
pub fn cell_for(lon: f64, lat: f64, resolution: Resolution) -> Result<CellIndex> {
    let ll = LatLng::new(lat, lon).map_err(|_| PoiragError::InvalidCoordinate { lon, lat })?;
    Ok(ll.to_cell(resolution))
}

/// Center coordinate of a cell.
pub fn cell_center(cell: CellIndex) -> LonLat {
    let ll = LatLng::from(cell);
    LonLat::new(ll.lng(), ll.lat())
}

/// All cells within `k` rings of the given cell, including itself.
pub fn neighbors(cell: CellIndex, k: u32) -> Vec<CellIndex> {
    cell.grid_disk::<Vec<_>>(k)
}

/// Parse a resolution from its numeric form.
pub fn resolution(value: u8) -> Result<Resolution> {
    Resolution::try_from(value).map_err(|_| PoiragError::InvalidResolution { resolution: value })
}

/// Pick an aggregation resolution from the query radius: coarse cells for
/// city-scale queries down to block-level cells under 500m.
pub fn resolution_for_radius(radius_m: f64) -> Resolution {
    if radius_m >= 5_000.0 {
        Resolution::Seven
    } else if radius_m >= 2_000.0 {
        Resolution::Eight
    } else if radius_m >= 500.0 {
        Resolution::Nine
    } else {
        Resolution::Ten
    }
}

/// Average edge length in meters at the given resolution.
pub fn edge_length_m(resolution: Resolution) -> f64 {
    EDGE_LENGTHS_M
        .iter()
        .find(|(res, _)| *res == resolution)
        .map(|(_, len)| *len)
        // Outside the working range, fall back to the finest known edge.
        .unwrap_or(65.91)
}

/// Ring radius needed to cover the given bandwidth, capped at 3 rings to
/// bound the KDE neighbor scan.
pub fn ring_size_for_bandwidth(bandwidth_m: f64, resolution: Resolution) -> u32 {
    let rings = (bandwidth_m / edge_length_m(resolution)).ceil() as u32;
    rings.clamp(1, 3)
}

/// Maximum aggregation bins reported at the given resolution; keeps the
/// downstream token budget bounded.
pub fn max_bins(resolution: Resolution) -> usize {
    match resolution {
        Resolution::Seven => 30,
        Resolution::Eight => 50,
        Resolution::Nine => 64,
        _ => 80,
    }
}
