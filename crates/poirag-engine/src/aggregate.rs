//! H3 aggregation: collapse a large candidate set into hex bins so the
//! answer stage reasons over dozens of cells instead of thousands of points.
//!
//! Bin traversal is in cell-id order and ties break lexicographically, so
//! the same input always produces the same output.

use poirag_core::hex;
use poirag_core::models::analysis::{GridCell, SpatialAnalysis};
use poirag_core::models::{LonLat, Poi, QueryPlan};
use poirag_core::Result;
use h3o::{CellIndex, Resolution};
use std::collections::{BTreeMap, HashMap};

struct Bin {
    count: usize,
    sum_lon: f64,
    sum_lat: f64,
    histogram: HashMap<String, usize>,
    representative: String,
}

fn category_of(poi: &Poi) -> &str {
    if !poi.category_mid.is_empty() {
        &poi.category_mid
    } else if !poi.category_big.is_empty() {
        &poi.category_big
    } else {
        "未分类"
    }
}

/// Aggregate POIs into hex bins at the given resolution. Bins come back
/// sorted by descending count and capped by the resolution's bin budget
/// (or `max_bins_override` when given); `total_cells` counts occupied cells
/// before the cap.
pub fn aggregate(
    pois: &[Poi],
    resolution: Resolution,
    max_bins_override: Option<usize>,
) -> Result<SpatialAnalysis> {
    let mut bins: BTreeMap<CellIndex, Bin> = BTreeMap::new();
    for poi in pois {
        let cell = hex::cell_for(poi.lon, poi.lat, resolution)?;
        let bin = bins.entry(cell).or_insert_with(|| Bin {
            count: 0,
            sum_lon: 0.0,
            sum_lat: 0.0,
            histogram: HashMap::new(),
            representative: poi.name.clone(),
        });
        bin.count += 1;
        bin.sum_lon += poi.lon;
        bin.sum_lat += poi.lat;
        *bin.histogram.entry(category_of(poi).to_string()).or_insert(0) += 1;
    }

    let total_cells = bins.len();
    let mut grids: Vec<GridCell> = bins
        .into_iter()
        .map(|(cell, bin)| {
            let (dominant_category, dominant_count) = bin
                .histogram
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                .map(|(name, count)| (name.clone(), *count))
                .unwrap_or_else(|| ("未分类".to_string(), 0));
            GridCell {
                id: cell.to_string(),
                count: bin.count,
                centroid: LonLat::new(
                    bin.sum_lon / bin.count as f64,
                    bin.sum_lat / bin.count as f64,
                ),
                dominant_share: dominant_count as f64 / bin.count as f64,
                dominant_category,
                category_histogram: bin.histogram,
                representative: bin.representative,
            }
        })
        .collect();

    grids.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.id.cmp(&b.id)));
    let cap = max_bins_override.unwrap_or_else(|| hex::max_bins(resolution));
    grids.truncate(cap);

    tracing::debug!(
        resolution = u8::from(resolution),
        total_cells,
        kept = grids.len(),
        "aggregated candidates into hex bins"
    );

    Ok(SpatialAnalysis {
        resolution: resolution.into(),
        total_cells,
        grids,
    })
}

/// Aggregate with the resolution the plan pins, or one derived from the
/// search radius when it does not.
pub fn aggregate_auto(pois: &[Poi], plan: &QueryPlan) -> Result<SpatialAnalysis> {
    let resolution = match plan.aggregation.resolution {
        Some(pinned) => hex::resolution(pinned)?,
        None => hex::resolution_for_radius(plan.radius_m),
    };
    aggregate(pois, resolution, plan.aggregation.max_bins)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poi(name: &str, mid: &str, lon: f64, lat: f64) -> Poi {
        Poi {
            id: name.to_string(),
            name: name.to_string(),
            category_big: "餐饮服务".to_string(),
            category_mid: mid.to_string(),
            category_small: String::new(),
            lon,
            lat,
            address: String::new(),
            rating: None,
        }
    }

    fn sample() -> Vec<Poi> {
        vec![
            // One tight cluster of three
            poi("a", "咖啡厅", 113.3100, 23.1000),
            poi("b", "咖啡厅", 113.3101, 23.1001),
            poi("c", "中餐厅", 113.3102, 23.1000),
            // A lone point far away
            poi("d", "中餐厅", 113.4000, 23.2000),
        ]
    }

    #[test]
    fn test_counts_are_conserved() {
        let analysis = aggregate(&sample(), Resolution::Nine, None).unwrap();
        let total: usize = analysis.grids.iter().map(|g| g.count).sum();
        assert_eq!(total, 4);
        assert_eq!(analysis.resolution, 9);
    }

    #[test]
    fn test_bins_sorted_by_count() {
        let analysis = aggregate(&sample(), Resolution::Nine, None).unwrap();
        assert_eq!(analysis.grids[0].count, 3);
        assert!(analysis
            .grids
            .windows(2)
            .all(|w| w[0].count >= w[1].count));
    }

    #[test]
    fn test_dominant_category_and_share() {
        let analysis = aggregate(&sample(), Resolution::Nine, None).unwrap();
        let top = &analysis.grids[0];
        assert_eq!(top.dominant_category, "咖啡厅");
        assert!((top.dominant_share - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(top.representative, "a");
    }

    #[test]
    fn test_centroid_inside_cluster() {
        let analysis = aggregate(&sample(), Resolution::Nine, None).unwrap();
        let c = analysis.grids[0].centroid;
        assert!((c.lon - 113.3101).abs() < 0.001);
        assert!((c.lat - 23.1000).abs() < 0.001);
    }

    #[test]
    fn test_bin_cap_keeps_total_cells() {
        let pois: Vec<Poi> = (0..40)
            .map(|i| {
                poi(
                    &format!("p{}", i),
                    "咖啡厅",
                    113.30 + (i as f64) * 0.01,
                    23.10,
                )
            })
            .collect();
        let analysis = aggregate(&pois, Resolution::Nine, Some(10)).unwrap();
        assert_eq!(analysis.grids.len(), 10);
        assert_eq!(analysis.total_cells, 40);
    }

    #[test]
    fn test_auto_resolution_follows_radius() {
        let coarse = aggregate_auto(&sample(), &QueryPlan::poi_search().radius(6_000.0)).unwrap();
        assert_eq!(coarse.resolution, 7);
        let fine = aggregate_auto(&sample(), &QueryPlan::poi_search().radius(300.0)).unwrap();
        assert_eq!(fine.resolution, 10);
    }

    #[test]
    fn test_pinned_resolution_wins() {
        let mut plan = QueryPlan::poi_search().radius(6_000.0);
        plan.aggregation.resolution = Some(9);
        let analysis = aggregate_auto(&sample(), &plan).unwrap();
        assert_eq!(analysis.resolution, 9);
    }
}
