//! Fuzzy region synthesis.
//!
//! Each cluster becomes a vernacular region approximation: a per-point
//! membership score selects a core point set, the core is bounded by an
//! alpha-shape approximation over the point-to-cell footprint, and the
//! transition and outer layers buffer that shape outward. The engine only
//! surfaces naming material; the final region name is an external step.

use crate::dbscan::Cluster;
use h3o::Resolution;
use poirag_core::config::FuzzyConfig;
use poirag_core::geo::kernel;
use poirag_core::hex;
use poirag_core::models::analysis::{FuzzyRegion, FuzzyRegionLayers, NameCandidates};
use poirag_core::models::{LonLat, Poi};
use std::collections::{HashMap, HashSet};

/// Category keyword -> landmark weight, for ranking region name candidates.
const NAME_WEIGHTS: [(&str, u8); 10] = [
    ("地铁站", 10),
    ("大学", 9),
    ("中学", 8),
    ("学校", 8),
    ("医院", 7),
    ("商场", 6),
    ("购物中心", 6),
    ("广场", 5),
    ("公园", 4),
    ("银行", 3),
];

/// Name substrings that make a POI sound like a place label.
const NAME_BONUS: [&str; 5] = ["广场", "中心", "大厦", "城", "公园"];

/// Dominant-category keyword -> region theme label.
const THEMES: [(&str, &str); 7] = [
    ("餐饮", "美食聚集区"),
    ("购物", "商业购物区"),
    ("科教", "科教文化区"),
    ("教育", "科教文化区"),
    ("医疗", "医疗服务区"),
    ("商务", "商务办公区"),
    ("生活", "生活服务区"),
];

/// Theme label -> keywords used by the semantic membership term.
fn theme_vocabulary(theme: &str) -> &'static [&'static str] {
    match theme {
        "美食聚集区" => &["餐饮", "美食", "餐厅", "小吃", "咖啡"],
        "商业购物区" => &["购物", "商场", "超市", "专卖", "百货"],
        "科教文化区" => &["学校", "大学", "教育", "培训", "图书"],
        "医疗服务区" => &["医院", "诊所", "药店", "医疗"],
        "商务办公区" => &["公司", "写字楼", "商务", "企业"],
        "生活服务区" => &["生活", "便民", "家政", "维修"],
        _ => &[],
    }
}

fn infer_theme(dominant: &[String]) -> String {
    for category in dominant {
        for (keyword, theme) in THEMES {
            if category.contains(keyword) {
                return theme.to_string();
            }
        }
    }
    "综合功能区".to_string()
}

/// membership = 0.6 * spatial decay + 0.4 * semantic affinity.
fn membership(poi: &Poi, center: LonLat, theme: &str, decay_m: f64) -> f64 {
    let d = kernel::haversine_m(center.point(), poi.point());
    let spatial = (-d / decay_m).exp();

    let vocab = theme_vocabulary(theme);
    let hits = vocab
        .iter()
        .filter(|k| poi.name.contains(*k) || poi.matches_category(k))
        .count();
    let semantic = match hits {
        0 => 0.5,
        1 => 0.8,
        _ => 1.0,
    };

    0.6 * spatial + 0.4 * semantic
}

/// Alpha-shape approximation: boundary cells of the point footprint, ordered
/// angularly around the centroid. Falls back to the convex hull when the
/// footprint is too small to have a boundary ring.
fn alpha_shape(points: &[LonLat], center: LonLat) -> Option<Vec<[f64; 2]>> {
    if points.len() < 3 {
        return None;
    }

    let mut footprint: HashSet<h3o::CellIndex> = HashSet::new();
    for p in points {
        if let Ok(cell) = hex::cell_for(p.lon, p.lat, Resolution::Ten) {
            footprint.insert(cell);
        }
    }

    let mut boundary: Vec<LonLat> = footprint
        .iter()
        .filter(|cell| {
            hex::neighbors(**cell, 1)
                .into_iter()
                .filter(|n| n != *cell)
                .any(|n| !footprint.contains(&n))
        })
        .map(|cell| hex::cell_center(*cell))
        .collect();

    if boundary.len() < 3 {
        return kernel::convex_hull_ring(points);
    }

    boundary.sort_by(|a, b| {
        let angle_a = (a.lat - center.lat).atan2(a.lon - center.lon);
        let angle_b = (b.lat - center.lat).atan2(b.lon - center.lon);
        angle_a
            .partial_cmp(&angle_b)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ring: Vec<[f64; 2]> = boundary.iter().map(|p| [p.lon, p.lat]).collect();
    ring.push(ring[0]);
    Some(ring)
}

fn name_candidates(members: &[&Poi], theme: &str) -> NameCandidates {
    let mut scored: Vec<(u8, &str)> = members
        .iter()
        .map(|poi| {
            let mut score = NAME_WEIGHTS
                .iter()
                .find(|(keyword, _)| poi.matches_category(keyword) || poi.name.contains(keyword))
                .map(|(_, w)| *w)
                .unwrap_or(1);
            if NAME_BONUS.iter().any(|b| poi.name.contains(b)) {
                score = score.saturating_add(2);
            }
            (score, poi.name.as_str())
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));

    let mut top_landmarks: Vec<String> = Vec::new();
    for (_, name) in &scored {
        if !top_landmarks.iter().any(|n| n == name) {
            top_landmarks.push((*name).to_string());
            if top_landmarks.len() == 6 {
                break;
            }
        }
    }

    // Recurring 2-3 character name prefixes hint at an established local name.
    let mut prefix_counts: HashMap<String, usize> = HashMap::new();
    for poi in members {
        let chars: Vec<char> = poi.name.chars().collect();
        for len in [2usize, 3] {
            if chars.len() >= len {
                let prefix: String = chars[..len].iter().collect();
                *prefix_counts.entry(prefix).or_insert(0) += 1;
            }
        }
    }
    let mut patterns: Vec<(String, usize)> = prefix_counts
        .into_iter()
        .filter(|(_, count)| *count >= 3)
        .collect();
    patterns.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let common_patterns: Vec<String> = patterns.into_iter().take(5).map(|(p, _)| p).collect();

    let best_guess = top_landmarks
        .first()
        .map(|name| format!("{}一带", name))
        .unwrap_or_else(|| theme.to_string());

    NameCandidates {
        top_landmarks,
        common_patterns,
        best_guess,
    }
}

/// Derive one fuzzy region per cluster.
pub fn generate_fuzzy_regions(
    pois: &[Poi],
    clusters: &[Cluster],
    config: &FuzzyConfig,
) -> Vec<FuzzyRegion> {
    clusters
        .iter()
        .map(|cluster| {
            let members: Vec<&Poi> = cluster.members.iter().map(|&i| &pois[i]).collect();
            let theme = infer_theme(&cluster.dominant_categories);

            let core_points: Vec<LonLat> = members
                .iter()
                .filter(|poi| {
                    membership(poi, cluster.centroid, &theme, config.decay_m)
                        >= config.core_threshold
                })
                .map(|poi| poi.location())
                .collect();

            // With too few high-membership points the whole cluster shapes
            // the core.
            let shape_points: Vec<LonLat> = if core_points.len() >= 3 {
                core_points
            } else {
                members.iter().map(|poi| poi.location()).collect()
            };

            let core = alpha_shape(&shape_points, cluster.centroid);
            let layers = match &core {
                Some(ring) => FuzzyRegionLayers {
                    transition: Some(kernel::buffer_ring(
                        ring,
                        cluster.centroid,
                        config.transition_buffer_m,
                    )),
                    outer: Some(kernel::buffer_ring(
                        ring,
                        cluster.centroid,
                        config.outer_buffer_m,
                    )),
                    core: core.clone(),
                },
                None => FuzzyRegionLayers::default(),
            };

            FuzzyRegion {
                id: cluster.id,
                theme: theme.clone(),
                center: cluster.centroid,
                layers,
                point_count: cluster.members.len(),
                dominant_categories: cluster.dominant_categories.clone(),
                name_candidates: name_candidates(&members, &theme),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbscan::dbscan;

    fn poi(id: usize, name: &str, lon: f64, lat: f64, category: &str) -> Poi {
        Poi {
            id: format!("p{}", id),
            name: name.to_string(),
            category_big: category.to_string(),
            category_mid: String::new(),
            category_small: String::new(),
            lon,
            lat,
            address: String::new(),
            rating: None,
        }
    }

    fn food_cluster() -> Vec<Poi> {
        let names = [
            "翠苑小吃", "翠苑面馆", "翠苑烧烤", "人民广场", "老王咖啡",
            "翠苑火锅", "街角餐厅", "翠苑茶馆",
        ];
        names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let jitter = (i % 3) as f64 * 0.0003;
                poi(
                    i,
                    name,
                    116.404 + (i as f64) * 0.0004,
                    39.915 + jitter,
                    "餐饮服务",
                )
            })
            .collect()
    }

    #[test]
    fn test_region_theme_and_layers() {
        let pois = food_cluster();
        let outcome = dbscan(&pois, 300.0, 3).unwrap();
        assert_eq!(outcome.clusters.len(), 1);

        let regions = generate_fuzzy_regions(&pois, &outcome.clusters, &FuzzyConfig::default());
        assert_eq!(regions.len(), 1);

        let region = &regions[0];
        assert_eq!(region.theme, "美食聚集区");
        assert_eq!(region.point_count, pois.len());
        assert!(region.layers.core.is_some());
        assert!(region.layers.transition.is_some());
        assert!(region.layers.outer.is_some());
    }

    #[test]
    fn test_layers_nest_outward() {
        let pois = food_cluster();
        let outcome = dbscan(&pois, 300.0, 3).unwrap();
        let regions = generate_fuzzy_regions(&pois, &outcome.clusters, &FuzzyConfig::default());
        let region = &regions[0];

        let center = region.center.point();
        let max_dist = |ring: &Vec<[f64; 2]>| {
            ring.iter()
                .map(|&[lon, lat]| kernel::haversine_m(center, geo::Point::new(lon, lat)))
                .fold(0.0f64, f64::max)
        };
        let core = max_dist(region.layers.core.as_ref().unwrap());
        let transition = max_dist(region.layers.transition.as_ref().unwrap());
        let outer = max_dist(region.layers.outer.as_ref().unwrap());
        assert!(core < transition && transition < outer);
    }

    #[test]
    fn test_name_candidates() {
        let pois = food_cluster();
        let outcome = dbscan(&pois, 300.0, 3).unwrap();
        let regions = generate_fuzzy_regions(&pois, &outcome.clusters, &FuzzyConfig::default());
        let candidates = &regions[0].name_candidates;

        // The plaza carries the highest landmark weight
        assert_eq!(candidates.top_landmarks.first().unwrap(), "人民广场");
        assert!(candidates.top_landmarks.len() <= 6);
        // "翠苑" appears 5 times as a prefix
        assert!(candidates.common_patterns.iter().any(|p| p == "翠苑"));
        assert!(candidates.best_guess.contains("人民广场"));
    }

    #[test]
    fn test_theme_fallback() {
        assert_eq!(infer_theme(&["未知类别".to_string()]), "综合功能区");
        assert_eq!(infer_theme(&[]), "综合功能区");
        assert_eq!(infer_theme(&["购物服务".to_string()]), "商业购物区");
    }

    #[test]
    fn test_membership_decays_with_distance() {
        let center = LonLat::new(116.404, 39.915);
        let near = poi(0, "小吃店", 116.4045, 39.915, "餐饮服务");
        let far = poi(1, "小吃店", 116.42, 39.915, "餐饮服务");
        let config = FuzzyConfig::default();
        let m_near = membership(&near, center, "美食聚集区", config.decay_m);
        let m_far = membership(&far, center, "美食聚集区", config.decay_m);
        assert!(m_near > m_far);
        assert!((0.0..=1.0).contains(&m_near));
    }
}
