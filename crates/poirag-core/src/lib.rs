//! poirag Core - Error type, configuration, canonical data model, and
//! geometry/hex-index primitives.
//!
//! This crate contains the shared domain types every other crate in the
//! workspace builds on. POIs are normalized into the canonical [`models::Poi`]
//! struct at the ingestion boundary; everything downstream operates only on
//! that shape.

pub mod config;
pub mod error;
pub mod geo;
pub mod hex;
pub mod models;

pub use error::{PoiragError, Result};
