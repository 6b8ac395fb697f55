//! Kernel density estimation over the hexagonal grid.
//!
//! Points are binned into cells, then each occupied cell sums a
//! kernel-weighted contribution from every occupied cell within a
//! bandwidth-derived ring radius. Densities are min-max normalized to [0, 1];
//! raw weighted counts are kept alongside for diagnostics.

use h3o::{CellIndex, Resolution};
use poirag_core::hex;
use poirag_core::models::analysis::{DensityCell, KdeResult, KernelKind};
use poirag_core::models::Poi;
use poirag_core::Result;
use std::collections::HashMap;

fn kernel_weight(kind: KernelKind, u: f64) -> f64 {
    match kind {
        KernelKind::Gaussian => (-0.5 * u * u).exp() / (2.0 * std::f64::consts::PI).sqrt(),
        KernelKind::Epanechnikov => {
            if u.abs() <= 1.0 {
                0.75 * (1.0 - u * u)
            } else {
                0.0
            }
        }
        KernelKind::Quartic => {
            if u.abs() <= 1.0 {
                let t = 1.0 - u * u;
                (15.0 / 16.0) * t * t
            } else {
                0.0
            }
        }
    }
}

/// Estimate a density surface for the given points.
pub fn kernel_density(
    pois: &[Poi],
    bandwidth_m: f64,
    kernel: KernelKind,
    resolution: Resolution,
) -> Result<KdeResult> {
    let mut bins: HashMap<CellIndex, usize> = HashMap::new();
    for poi in pois {
        let cell = hex::cell_for(poi.lon, poi.lat, resolution)?;
        *bins.entry(cell).or_insert(0) += 1;
    }

    if bins.is_empty() {
        return Ok(KdeResult {
            cells: Vec::new(),
            max_raw: 0.0,
            min_raw: 0.0,
            bandwidth_m,
            kernel,
        });
    }

    let rings = hex::ring_size_for_bandwidth(bandwidth_m, resolution);

    let mut raw: Vec<(CellIndex, f64)> = bins
        .keys()
        .map(|&cell| {
            let center = hex::cell_center(cell).point();
            let mut weight = 0.0;
            for neighbor in hex::neighbors(cell, rings) {
                if let Some(&count) = bins.get(&neighbor) {
                    let d = poirag_core::geo::kernel::haversine_m(
                        center,
                        hex::cell_center(neighbor).point(),
                    );
                    weight += kernel_weight(kernel, d / bandwidth_m) * count as f64;
                }
            }
            (cell, weight)
        })
        .collect();

    let max_raw = raw.iter().map(|(_, w)| *w).fold(f64::MIN, f64::max);
    let min_raw = raw.iter().map(|(_, w)| *w).fold(f64::MAX, f64::min);
    let range = max_raw - min_raw;

    // Deterministic output order: densest first, cell id breaking ties.
    raw.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    let cells = raw
        .into_iter()
        .map(|(cell, weight)| DensityCell {
            cell: cell.to_string(),
            centroid: hex::cell_center(cell),
            density: if range > 0.0 {
                (weight - min_raw) / range
            } else {
                1.0
            },
            raw: weight,
        })
        .collect();

    Ok(KdeResult {
        cells,
        max_raw,
        min_raw,
        bandwidth_m,
        kernel,
    })
}
