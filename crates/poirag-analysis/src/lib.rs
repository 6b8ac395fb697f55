//! poirag Analysis - Density clustering, fuzzy region synthesis, and spatial
//! graph analysis.
//!
//! Every structure built here (density surfaces, clusters, regions, graphs)
//! is reconstructed per call from the candidate set it is given; nothing in
//! this crate holds state across requests.

pub mod dbscan;
pub mod fuzzy;
pub mod graph;
pub mod hotspot;
pub mod jenks;
pub mod kde;

pub use dbscan::{dbscan, Cluster, DbscanOutcome};
pub use fuzzy::generate_fuzzy_regions;
pub use graph::{needs_graph_reasoning, weighted_score, SpatialGraph};
pub use hotspot::{identify_hotspots, HotspotReport};
pub use jenks::jenks_breaks;
pub use kde::kernel_density;
