//! poirag Store - Port traits for the POI store, vector index and geocoder,
//! plus the in-memory implementations used for development and tests and the
//! HTTP geocoder adapter.

pub mod geocode;
pub mod memory;
pub mod ports;

pub use geocode::{gcj02_to_wgs84, HttpGeocoder};
pub use memory::{text_embedding, MemoryPoiStore, MemoryVectorIndex};
pub use ports::{
    AreaConstraint, GeocodedPlace, Geocoder, NoopGeocoder, NoopVector, PoiQuery, PoiStore,
    ScoredPoi, VectorIndex,
};
