//! Error types for poirag

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoiragError {
    // Input validation errors
    #[error("Coordinate out of range: lon={lon}, lat={lat}")]
    InvalidCoordinate { lon: f64, lat: f64 },

    #[error("Invalid query plan field '{field}': {reason}")]
    InvalidPlan { field: String, reason: String },

    #[error("Invalid spatial context: {reason}")]
    InvalidContext { reason: String },

    #[error("Unsupported hex resolution: {resolution}")]
    InvalidResolution { resolution: u8 },

    // External service errors
    #[error("POI store failure during {operation}: {reason}")]
    StoreFailure { operation: String, reason: String },

    #[error("Vector index unavailable: {reason}")]
    VectorUnavailable { reason: String },

    #[error("Geocoding failed for '{query}': {reason}")]
    GeocodeFailed { query: String, reason: String },

    #[error("Operation '{operation}' exceeded its {budget_ms}ms budget")]
    Timeout { operation: String, budget_ms: u64 },

    // Analysis errors (folded into a degraded result at the executor boundary)
    #[error("Analysis stage '{stage}' failed: {reason}")]
    AnalysisFailed { stage: String, reason: String },

    // Configuration errors
    #[error("Invalid configuration value for {key}: {reason}")]
    ConfigInvalid { key: String, reason: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, PoiragError>;
