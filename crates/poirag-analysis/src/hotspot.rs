//! Hotspot identification: KDE -> Jenks banding -> DBSCAN over the top
//! density bands.

use crate::dbscan::{dbscan, Cluster};
use crate::jenks::jenks_breaks;
use crate::kde::kernel_density;
use poirag_core::config::ClusteringConfig;
use poirag_core::hex;
use poirag_core::models::analysis::{Hotspot, KdeResult};
use poirag_core::models::Poi;
use poirag_core::Result;
use std::collections::HashSet;

/// Hotspots plus the intermediate structures they were derived from. The
/// clusters (with member indices into the input slice) feed the fuzzy region
/// generator.
#[derive(Debug, Clone, PartialEq)]
pub struct HotspotReport {
    pub kde: KdeResult,
    pub hotspots: Vec<Hotspot>,
    pub clusters: Vec<Cluster>,
}

/// Identify density hotspots in a point set.
///
/// Classifies the KDE surface into `jenks_classes` bands, keeps the points
/// falling in the top two bands, and grows clusters from them with the looser
/// hotspot DBSCAN parameters. Confidence grows with cluster size, saturating
/// at 10 points.
pub fn identify_hotspots(pois: &[Poi], config: &ClusteringConfig) -> Result<HotspotReport> {
    let resolution = hex::resolution(config.kde_resolution)?;
    let kde = kernel_density(pois, config.kde_bandwidth_m, config.kde_kernel, resolution)?;

    if kde.cells.is_empty() {
        return Ok(HotspotReport {
            kde,
            hotspots: Vec::new(),
            clusters: Vec::new(),
        });
    }

    let densities: Vec<f64> = kde.cells.iter().map(|c| c.density).collect();
    let breaks = jenks_breaks(&densities, config.jenks_classes);

    // Threshold at the lower edge of the top two bands; with too few bands
    // everything qualifies.
    let threshold = if breaks.len() >= 3 {
        breaks[breaks.len() - 3]
    } else {
        0.0
    };

    let hot_cells: HashSet<&str> = kde
        .cells
        .iter()
        .filter(|c| c.density >= threshold)
        .map(|c| c.cell.as_str())
        .collect();

    let mut hot_indices = Vec::new();
    let mut hot_pois = Vec::new();
    for (i, poi) in pois.iter().enumerate() {
        let cell = hex::cell_for(poi.lon, poi.lat, resolution)?;
        if hot_cells.contains(cell.to_string().as_str()) {
            hot_indices.push(i);
            hot_pois.push(poi.clone());
        }
    }

    let outcome = dbscan(&hot_pois, config.hotspot_eps_m, config.hotspot_min_points)?;

    tracing::debug!(
        total = pois.len(),
        hot_points = hot_pois.len(),
        clusters = outcome.clusters.len(),
        "hotspot identification complete"
    );

    // Remap member indices back onto the original slice.
    let clusters: Vec<Cluster> = outcome
        .clusters
        .into_iter()
        .map(|mut cluster| {
            cluster.members = cluster.members.iter().map(|&i| hot_indices[i]).collect();
            cluster
        })
        .collect();

    let hotspots = clusters
        .iter()
        .map(|cluster| Hotspot {
            cluster: cluster.to_summary(),
            confidence: (cluster.members.len() as f64 / 10.0).min(1.0),
        })
        .collect();

    Ok(HotspotReport {
        kde,
        hotspots,
        clusters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poi(id: usize, lon: f64, lat: f64) -> Poi {
        Poi {
            id: format!("p{}", id),
            name: format!("店铺{}", id),
            category_big: "餐饮服务".to_string(),
            category_mid: String::new(),
            category_small: String::new(),
            lon,
            lat,
            address: String::new(),
            rating: None,
        }
    }

    /// A dense 4x4 block plus a sparse scatter far away.
    fn sample() -> Vec<Poi> {
        let mut pois = Vec::new();
        let mut id = 0;
        for i in 0..4 {
            for j in 0..4 {
                pois.push(poi(id, 116.404 + (i as f64) * 0.0005, 39.915 + (j as f64) * 0.0004));
                id += 1;
            }
        }
        for i in 0..4 {
            pois.push(poi(id + i, 116.46 + (i as f64) * 0.01, 39.96));
        }
        pois
    }

    #[test]
    fn test_dense_block_becomes_hotspot() {
        let report = identify_hotspots(&sample(), &ClusteringConfig::default()).unwrap();
        assert!(!report.hotspots.is_empty());

        let top = &report.hotspots[0];
        assert!(top.cluster.point_count >= 4);
        assert!((0.0..=1.0).contains(&top.confidence));
        // The hotspot centroid sits inside the dense block
        assert!(top.cluster.centroid.lon > 116.40 && top.cluster.centroid.lon < 116.41);
    }

    #[test]
    fn test_confidence_saturates() {
        let report = identify_hotspots(&sample(), &ClusteringConfig::default()).unwrap();
        let big = report
            .hotspots
            .iter()
            .find(|h| h.cluster.point_count >= 10);
        if let Some(h) = big {
            assert_eq!(h.confidence, 1.0);
        }
    }

    #[test]
    fn test_empty_input() {
        let report = identify_hotspots(&[], &ClusteringConfig::default()).unwrap();
        assert!(report.hotspots.is_empty());
        assert!(report.kde.cells.is_empty());
    }

    #[test]
    fn test_members_index_original_slice() {
        let pois = sample();
        let report = identify_hotspots(&pois, &ClusteringConfig::default()).unwrap();
        for cluster in &report.clusters {
            for &i in &cluster.members {
                assert!(i < pois.len());
            }
        }
    }
}
