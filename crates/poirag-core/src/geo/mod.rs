//! Geometry primitives shared by aggregation, clustering, and region
//! synthesis.

pub mod kernel;
