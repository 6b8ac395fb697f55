//! Canonical POI record and its ingestion normalization.
//!
//! Upstream sources deliver POIs either as GeoJSON Features or as flat
//! records, with Chinese or English property keys. `Poi::from_feature`
//! flattens all of these into one shape at the boundary so that no internal
//! component ever probes alternative field spellings.

use crate::models::LonLat;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Immutable POI record, the only POI shape internal code touches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    pub id: String,
    pub name: String,
    pub category_big: String,
    pub category_mid: String,
    pub category_small: String,
    pub lon: f64,
    pub lat: f64,
    pub address: String,
    pub rating: Option<f32>,
}

impl Poi {
    pub fn location(&self) -> LonLat {
        LonLat::new(self.lon, self.lat)
    }

    pub fn point(&self) -> geo::Point<f64> {
        geo::Point::new(self.lon, self.lat)
    }

    /// Whether any of the three category levels matches the given keyword.
    pub fn matches_category(&self, keyword: &str) -> bool {
        self.category_big.contains(keyword)
            || self.category_mid.contains(keyword)
            || self.category_small.contains(keyword)
    }

    /// Up to three descriptive tags drawn from the mid/small category labels.
    pub fn tags(&self) -> Vec<String> {
        let mut tags = Vec::new();
        for level in [&self.category_mid, &self.category_small] {
            for part in level.split(';') {
                let part = part.trim();
                if !part.is_empty() && !tags.contains(&part.to_string()) {
                    tags.push(part.to_string());
                    if tags.len() == 3 {
                        return tags;
                    }
                }
            }
        }
        tags
    }

    /// Normalize a raw source record into a canonical POI.
    ///
    /// Accepts a GeoJSON Feature (coordinates in `geometry`, attributes in
    /// `properties`) or a flat object, with Chinese or English keys. Returns
    /// `None` when no usable coordinate pair can be extracted.
    pub fn from_feature(raw: &Value) -> Option<Poi> {
        let props = raw.get("properties").filter(|p| p.is_object()).unwrap_or(raw);

        let (lon, lat) = coordinates(raw, props)?;
        if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
            return None;
        }

        let name = str_field(props, &["名称", "name", "NAME"])?;

        Some(Poi {
            id: str_field(props, &["id", "ID", "poi_id"]).unwrap_or_else(|| {
                // Sources without an id still need a stable one for dedup.
                format!("{}@{:.6},{:.6}", name, lon, lat)
            }),
            name,
            category_big: str_field(props, &["大类", "category_big", "type"]).unwrap_or_default(),
            category_mid: str_field(props, &["中类", "category_mid"]).unwrap_or_default(),
            category_small: str_field(props, &["小类", "category_small"]).unwrap_or_default(),
            lon,
            lat,
            address: str_field(props, &["地址", "address"]).unwrap_or_default(),
            rating: num_field(props, &["评分", "rating"]).map(|r| r as f32),
        })
    }
}

fn coordinates(raw: &Value, props: &Value) -> Option<(f64, f64)> {
    // GeoJSON Feature geometry takes precedence
    if let Some(coords) = raw.pointer("/geometry/coordinates") {
        let lon = coords.get(0)?.as_f64()?;
        let lat = coords.get(1)?.as_f64()?;
        return Some((lon, lat));
    }
    let lon = num_field(props, &["经度", "lon", "lng", "longitude"])?;
    let lat = num_field(props, &["纬度", "lat", "latitude"])?;
    Some((lon, lat))
}

fn str_field(obj: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| {
        obj.get(*k)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn num_field(obj: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| {
        let v = obj.get(*k)?;
        v.as_f64().or_else(|| v.as_str()?.trim().parse().ok())
    })
}

/// Minimal POI representation handed to the answer-generation stage.
///
/// Strips the record down to what prose generation needs; never the full
/// source fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedPoi {
    pub name: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<String>,
}

impl CompressedPoi {
    pub fn from_poi(poi: &Poi, distance_m: Option<f64>) -> Self {
        Self {
            name: poi.name.clone(),
            category: poi.category_big.clone(),
            distance_m: distance_m.map(|d| d.round()),
            rating: poi.rating,
            tags: poi.tags(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_geojson_feature() {
        let raw = json!({
            "type": "Feature",
            "geometry": { "type": "Point", "coordinates": [116.404, 39.915] },
            "properties": {
                "名称": "老张咖啡",
                "大类": "餐饮服务",
                "中类": "咖啡厅",
                "小类": "咖啡厅",
                "地址": "中关村大街1号",
                "评分": 4.6
            }
        });

        let poi = Poi::from_feature(&raw).unwrap();
        assert_eq!(poi.name, "老张咖啡");
        assert_eq!(poi.category_big, "餐饮服务");
        assert_eq!(poi.lon, 116.404);
        assert_eq!(poi.lat, 39.915);
        assert_eq!(poi.rating, Some(4.6));
    }

    #[test]
    fn test_from_flat_english_record() {
        let raw = json!({
            "id": "poi-1",
            "name": "Blue Bottle",
            "category_big": "Food",
            "lng": "121.47",
            "lat": 31.23,
            "rating": "4.2"
        });

        let poi = Poi::from_feature(&raw).unwrap();
        assert_eq!(poi.id, "poi-1");
        assert_eq!(poi.lon, 121.47);
        assert_eq!(poi.lat, 31.23);
        assert_eq!(poi.rating, Some(4.2));
    }

    #[test]
    fn test_missing_coordinates_rejected() {
        let raw = json!({ "名称": "无坐标点" });
        assert!(Poi::from_feature(&raw).is_none());

        let raw = json!({ "name": "bad", "lon": 200.0, "lat": 10.0 });
        assert!(Poi::from_feature(&raw).is_none());
    }

    #[test]
    fn test_synthesized_id_is_stable() {
        let raw = json!({ "name": "无编号", "lon": 116.4, "lat": 39.9 });
        let a = Poi::from_feature(&raw).unwrap();
        let b = Poi::from_feature(&raw).unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_tags_capped_at_three() {
        let poi = Poi {
            id: "t".into(),
            name: "t".into(),
            category_big: "餐饮服务".into(),
            category_mid: "中餐厅;火锅店".into(),
            category_small: "川菜馆;烧烤店;面馆".into(),
            lon: 0.0,
            lat: 0.0,
            address: String::new(),
            rating: None,
        };
        let tags = poi.tags();
        assert_eq!(tags.len(), 3);
        assert_eq!(tags[0], "中餐厅");
    }
}
