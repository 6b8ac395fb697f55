//! DBSCAN over the hexagonal cell index.
//!
//! Neighbor queries go through a cell bucket map instead of all-pairs
//! distance computation: candidates are gathered from the rings covering
//! `eps` and then confirmed with an exact haversine check. Given a fixed
//! input order the partition is deterministic.

use h3o::CellIndex;
use poirag_core::geo::kernel;
use poirag_core::hex;
use poirag_core::models::analysis::SpatialCluster;
use poirag_core::models::{LonLat, Poi};
use poirag_core::Result;
use std::collections::{HashMap, VecDeque};

/// A cluster with its member indices into the input slice.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub id: usize,
    pub members: Vec<usize>,
    pub centroid: LonLat,
    pub boundary: Option<Vec<[f64; 2]>>,
    /// Points per square kilometer within the cluster's reach.
    pub density: f64,
    pub dominant_categories: Vec<String>,
}

impl Cluster {
    pub fn to_summary(&self) -> SpatialCluster {
        SpatialCluster {
            id: self.id,
            point_count: self.members.len(),
            centroid: self.centroid,
            boundary: self.boundary.clone(),
            density: self.density,
            dominant_categories: self.dominant_categories.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DbscanOutcome {
    pub clusters: Vec<Cluster>,
    /// Indices of points that never joined a cluster.
    pub noise: Vec<usize>,
}

#[derive(Clone, Copy, PartialEq)]
enum Label {
    Unvisited,
    Noise,
    Cluster(usize),
}

/// Partition points into density-connected clusters.
pub fn dbscan(pois: &[Poi], eps_m: f64, min_points: usize) -> Result<DbscanOutcome> {
    if pois.is_empty() {
        return Ok(DbscanOutcome {
            clusters: Vec::new(),
            noise: Vec::new(),
        });
    }

    let resolution = hex::resolution_for_radius(eps_m);
    // Enough rings to cover eps between cell centers; never clamped here,
    // correctness of the neighbor query depends on full coverage.
    let rings = (eps_m / hex::edge_length_m(resolution)).ceil().max(1.0) as u32;

    let mut buckets: HashMap<CellIndex, Vec<usize>> = HashMap::new();
    let mut cells = Vec::with_capacity(pois.len());
    for (i, poi) in pois.iter().enumerate() {
        let cell = hex::cell_for(poi.lon, poi.lat, resolution)?;
        buckets.entry(cell).or_default().push(i);
        cells.push(cell);
    }

    let neighbors_of = |i: usize| -> Vec<usize> {
        let origin = pois[i].point();
        let mut found: Vec<usize> = hex::neighbors(cells[i], rings)
            .into_iter()
            .filter_map(|cell| buckets.get(&cell))
            .flatten()
            .copied()
            .filter(|&j| kernel::haversine_m(origin, pois[j].point()) <= eps_m)
            .collect();
        found.sort_unstable();
        found
    };

    let mut labels = vec![Label::Unvisited; pois.len()];
    let mut clusters: Vec<Vec<usize>> = Vec::new();

    for i in 0..pois.len() {
        if labels[i] != Label::Unvisited {
            continue;
        }
        let seeds = neighbors_of(i);
        if seeds.len() < min_points {
            labels[i] = Label::Noise;
            continue;
        }

        let cluster_id = clusters.len();
        labels[i] = Label::Cluster(cluster_id);
        let mut members = vec![i];
        let mut queue: VecDeque<usize> = seeds.into_iter().collect();

        while let Some(j) = queue.pop_front() {
            match labels[j] {
                Label::Cluster(_) => continue,
                // A former noise point reached by a core point joins the
                // cluster and leaves the noise set, but never seeds growth.
                Label::Noise => {
                    labels[j] = Label::Cluster(cluster_id);
                    members.push(j);
                }
                Label::Unvisited => {
                    labels[j] = Label::Cluster(cluster_id);
                    members.push(j);
                    let expansion = neighbors_of(j);
                    if expansion.len() >= min_points {
                        queue.extend(expansion);
                    }
                }
            }
        }

        members.sort_unstable();
        clusters.push(members);
    }

    let noise: Vec<usize> = labels
        .iter()
        .enumerate()
        .filter_map(|(i, l)| (*l == Label::Noise).then_some(i))
        .collect();

    let clusters = clusters
        .into_iter()
        .enumerate()
        .map(|(id, members)| describe_cluster(pois, id, members))
        .collect();

    Ok(DbscanOutcome { clusters, noise })
}

fn describe_cluster(pois: &[Poi], id: usize, members: Vec<usize>) -> Cluster {
    let points: Vec<geo::Point<f64>> = members.iter().map(|&i| pois[i].point()).collect();
    let centroid = kernel::centroid(&points)
        .map(LonLat::from)
        .unwrap_or_else(|| pois[members[0]].location());

    let coords: Vec<LonLat> = members.iter().map(|&i| pois[i].location()).collect();
    let boundary = kernel::convex_hull_ring(&coords);

    // Reach = farthest member from the centroid; density is points per km²
    // of that disk, with a tight-cluster floor when everything coincides.
    let reach_m = points
        .iter()
        .map(|p| kernel::haversine_m(centroid.point(), *p))
        .fold(0.0_f64, f64::max);
    let area_km2 = std::f64::consts::PI * (reach_m / 1_000.0).powi(2);
    let density = if area_km2 > 1e-9 {
        members.len() as f64 / area_km2
    } else {
        members.len() as f64
    };

    let mut histogram: HashMap<&str, usize> = HashMap::new();
    for &i in &members {
        if !pois[i].category_big.is_empty() {
            *histogram.entry(pois[i].category_big.as_str()).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<(&str, usize)> = histogram.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    let dominant_categories = ranked.into_iter().take(3).map(|(c, _)| c.to_string()).collect();

    Cluster {
        id,
        members,
        centroid,
        boundary,
        density,
        dominant_categories,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poi(id: usize, lon: f64, lat: f64, category: &str) -> Poi {
        Poi {
            id: format!("p{}", id),
            name: format!("p{}", id),
            category_big: category.to_string(),
            category_mid: String::new(),
            category_small: String::new(),
            lon,
            lat,
            address: String::new(),
            rating: None,
        }
    }

    /// Two tight groups ~1.5km apart plus one isolated point.
    fn sample() -> Vec<Poi> {
        let mut pois = Vec::new();
        for i in 0..5 {
            let jitter = (i % 2) as f64 * 0.0002;
            pois.push(poi(i, 116.404 + (i as f64) * 0.0003, 39.915 + jitter, "餐饮服务"));
        }
        for i in 5..10 {
            let jitter = (i % 2) as f64 * 0.0002;
            pois.push(poi(i, 116.420 + ((i - 5) as f64) * 0.0003, 39.915 + jitter, "购物服务"));
        }
        pois.push(poi(10, 116.45, 39.95, "生活服务"));
        pois
    }

    #[test]
    fn test_two_clusters_one_noise() {
        let outcome = dbscan(&sample(), 150.0, 3).unwrap();
        assert_eq!(outcome.clusters.len(), 2);
        assert_eq!(outcome.noise, vec![10]);
        assert_eq!(outcome.clusters[0].members, vec![0, 1, 2, 3, 4]);
        assert_eq!(outcome.clusters[1].members, vec![5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_partition_properties() {
        let pois = sample();
        let outcome = dbscan(&pois, 150.0, 3).unwrap();

        let mut seen = vec![0usize; pois.len()];
        for cluster in &outcome.clusters {
            for &i in &cluster.members {
                seen[i] += 1;
            }
        }
        for &i in &outcome.noise {
            seen[i] += 1;
        }
        // Every point is in exactly one cluster or the noise set
        assert!(seen.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_determinism() {
        let pois = sample();
        let a = dbscan(&pois, 150.0, 3).unwrap();
        let b = dbscan(&pois, 150.0, 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_min_points_too_high_yields_all_noise() {
        let outcome = dbscan(&sample(), 150.0, 20).unwrap();
        assert!(outcome.clusters.is_empty());
        assert_eq!(outcome.noise.len(), 11);
    }

    #[test]
    fn test_cluster_description() {
        let outcome = dbscan(&sample(), 150.0, 3).unwrap();
        let cluster = &outcome.clusters[0];
        assert_eq!(cluster.dominant_categories, vec!["餐饮服务".to_string()]);
        assert!(cluster.density > 0.0);
        assert!(cluster.boundary.is_some());
        // Centroid sits between the first and last member
        assert!(cluster.centroid.lon > 116.404 && cluster.centroid.lon < 116.406);
    }

    #[test]
    fn test_empty_input() {
        let outcome = dbscan(&[], 150.0, 3).unwrap();
        assert!(outcome.clusters.is_empty());
        assert!(outcome.noise.is_empty());
    }
}
