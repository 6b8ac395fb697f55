//! Query execution engine.
//!
//! Wires the analysis stages to the store ports: a plan comes in, the anchor
//! is resolved, candidates are fetched and filtered, and the mode-appropriate
//! analyses run. The executor is the only entry point; everything else in
//! this crate serves it.

pub mod aggregate;
pub mod cache;
pub mod executor;
pub mod expansion;
pub mod filter;
pub mod ontology;
pub mod resolver;

pub use cache::{CacheStats, QueryCache, QueryFingerprint};
pub use executor::QueryExecutor;
pub use expansion::ExpansionStrategy;
pub use resolver::AnchorResolver;
