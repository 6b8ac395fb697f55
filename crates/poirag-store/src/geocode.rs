//! HTTP geocoder adapter.
//!
//! Queries an Amap-style geocoding endpoint and corrects the returned
//! GCJ-02 coordinates to WGS84 before handing them to the engine. Every
//! request carries an explicit timeout; a slow or failing service degrades
//! the caller, never blocks it.

use async_trait::async_trait;
use poirag_core::config::GeocoderConfig;
use poirag_core::{PoiragError, Result};
use serde_json::Value;
use std::time::Duration;

use crate::ports::{GeocodedPlace, Geocoder};

const DEFAULT_TIMEOUT_MS: u64 = 3_000;

pub struct HttpGeocoder {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpGeocoder {
    /// Build a geocoder from configuration; `None` when no endpoint is set.
    pub fn from_config(config: &GeocoderConfig) -> Option<Self> {
        let endpoint = config.endpoint.clone()?;
        let timeout_ms = if config.timeout_ms > 0 {
            config.timeout_ms
        } else {
            DEFAULT_TIMEOUT_MS
        };
        Some(Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key: config.api_key.clone(),
            timeout: Duration::from_millis(timeout_ms),
        })
    }

    async fn fetch(&self, query: &str) -> Result<Value> {
        let mut params = vec![("address", query.to_string())];
        if let Some(key) = &self.api_key {
            params.push(("key", key.clone()));
        }

        let request = self.client.get(&self.endpoint).query(&params).send();
        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| PoiragError::Timeout {
                operation: "geocode".to_string(),
                budget_ms: self.timeout.as_millis() as u64,
            })?
            .map_err(|e| PoiragError::GeocodeFailed {
                query: query.to_string(),
                reason: e.to_string(),
            })?;

        response.json().await.map_err(|e| PoiragError::GeocodeFailed {
            query: query.to_string(),
            reason: format!("malformed response: {}", e),
        })
    }
}

#[async_trait]
impl Geocoder for HttpGeocoder {
    async fn geocode(&self, query: &str) -> Result<Option<GeocodedPlace>> {
        let body = self.fetch(query).await?;

        // Amap shape: { geocodes: [ { location: "lon,lat", formatted_address } ] }
        let Some(first) = body.pointer("/geocodes/0") else {
            return Ok(None);
        };
        let Some(location) = first.get("location").and_then(Value::as_str) else {
            return Ok(None);
        };
        let mut parts = location.split(',');
        let (Some(lon), Some(lat)) = (
            parts.next().and_then(|s| s.trim().parse::<f64>().ok()),
            parts.next().and_then(|s| s.trim().parse::<f64>().ok()),
        ) else {
            tracing::warn!(query, location, "unparseable geocoder location");
            return Ok(None);
        };

        let (lon, lat) = gcj02_to_wgs84(lon, lat);
        let name = first
            .get("formatted_address")
            .and_then(Value::as_str)
            .unwrap_or(query)
            .to_string();

        tracing::debug!(query, lon, lat, "external geocode hit");
        Ok(Some(GeocodedPlace { name, lon, lat }))
    }
}

/// Convert GCJ-02 (the obfuscated datum used by Chinese map services) to
/// WGS84. Coordinates outside mainland China pass through unchanged.
pub fn gcj02_to_wgs84(lon: f64, lat: f64) -> (f64, f64) {
    const A: f64 = 6_378_245.0;
    const EE: f64 = 0.006_693_421_622_965_943;

    if out_of_china(lon, lat) {
        return (lon, lat);
    }

    let dlat = transform_lat(lon - 105.0, lat - 35.0);
    let dlon = transform_lon(lon - 105.0, lat - 35.0);
    let rad_lat = lat / 180.0 * std::f64::consts::PI;
    let mut magic = (rad_lat).sin();
    magic = 1.0 - EE * magic * magic;
    let sqrt_magic = magic.sqrt();
    let dlat = (dlat * 180.0) / ((A * (1.0 - EE)) / (magic * sqrt_magic) * std::f64::consts::PI);
    let dlon = (dlon * 180.0) / (A / sqrt_magic * rad_lat.cos() * std::f64::consts::PI);
    (lon - dlon, lat - dlat)
}

fn out_of_china(lon: f64, lat: f64) -> bool {
    !(72.004..=137.8347).contains(&lon) || !(0.8293..=55.8271).contains(&lat)
}

fn transform_lat(x: f64, y: f64) -> f64 {
    use std::f64::consts::PI;
    let mut ret = -100.0 + 2.0 * x + 3.0 * y + 0.2 * y * y + 0.1 * x * y + 0.2 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * PI).sin() + 20.0 * (2.0 * x * PI).sin()) * 2.0 / 3.0;
    ret += (20.0 * (y * PI).sin() + 40.0 * (y / 3.0 * PI).sin()) * 2.0 / 3.0;
    ret += (160.0 * (y / 12.0 * PI).sin() + 320.0 * (y * PI / 30.0).sin()) * 2.0 / 3.0;
    ret
}

fn transform_lon(x: f64, y: f64) -> f64 {
    use std::f64::consts::PI;
    let mut ret = 300.0 + x + 2.0 * y + 0.1 * x * x + 0.1 * x * y + 0.1 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * PI).sin() + 20.0 * (2.0 * x * PI).sin()) * 2.0 / 3.0;
    ret += (20.0 * (x * PI).sin() + 40.0 * (x / 3.0 * PI).sin()) * 2.0 / 3.0;
    ret += (150.0 * (x / 12.0 * PI).sin() + 300.0 * (x / 30.0 * PI).sin()) * 2.0 / 3.0;
    ret
}
