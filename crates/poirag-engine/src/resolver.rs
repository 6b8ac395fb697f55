//! Anchor resolution ladder.
//!
//! "老王咖啡附近" is only answerable once 老王咖啡 has coordinates. The
//! ladder tries sources from cheapest to most expensive: exact name, fuzzy
//! name, the learned alias table, the vector index, and finally the external
//! geocoder. Gate suffixes ("东门") are tried concatenated first and retried
//! bare on a miss. External hits are written back to the alias table so the
//! next request stays local.

use poirag_core::config::ResolverConfig;
use poirag_core::models::result::{AnchorSource, ResolvedAnchor};
use poirag_core::models::Anchor;
use poirag_core::Result;
use poirag_store::{Geocoder, PoiStore, VectorIndex};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

/// Lock poisoning only occurs when another thread panicked while holding the
/// lock; at that point the process state is already compromised and
/// propagating the panic is the correct response.
pub struct AnchorResolver {
    aliases: RwLock<HashMap<String, ResolvedAnchor>>,
    config: ResolverConfig,
}

impl AnchorResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            aliases: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Pre-seed a known place name, e.g. from a curated landmark list.
    pub fn learn_alias(&self, name: impl Into<String>, anchor: ResolvedAnchor) {
        self.aliases.write().unwrap().insert(name.into(), anchor);
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.read().unwrap().len()
    }

    /// Walk the ladder. `Ok(None)` means every rung missed; the caller picks
    /// its own fallback (typically the viewport centroid).
    pub async fn resolve<P, V, G>(
        &self,
        anchor: &Anchor,
        store: &P,
        vector: Option<&V>,
        geocoder: Option<&G>,
    ) -> Result<Option<ResolvedAnchor>>
    where
        P: PoiStore,
        V: VectorIndex,
        G: Geocoder,
    {
        // Gate form first, bare name second
        let mut names = vec![anchor.full_name()];
        if anchor.gate.is_some() {
            names.push(anchor.name.clone());
        }

        for name in &names {
            if let Some(poi) = store.find_exact(name).await? {
                tracing::debug!(name, "anchor resolved by exact match");
                return Ok(Some(ResolvedAnchor {
                    name: poi.name,
                    lon: poi.lon,
                    lat: poi.lat,
                    source: AnchorSource::Exact,
                }));
            }
        }

        for name in &names {
            if let Some(poi) = store.find_fuzzy(name).await? {
                tracing::debug!(name, matched = %poi.name, "anchor resolved by fuzzy match");
                return Ok(Some(ResolvedAnchor {
                    name: poi.name,
                    lon: poi.lon,
                    lat: poi.lat,
                    source: AnchorSource::Fuzzy,
                }));
            }
        }

        for name in &names {
            let known = self.aliases.read().unwrap().get(name).cloned();
            if let Some(mut hit) = known {
                hit.source = AnchorSource::LandmarkTable;
                tracing::debug!(name, "anchor resolved from alias table");
                return Ok(Some(hit));
            }
        }

        if let Some(vector) = vector.filter(|v| v.is_available()) {
            if let Some(hit) = self.resolve_vector(&names, vector).await {
                return Ok(Some(hit));
            }
        }

        if let Some(geocoder) = geocoder {
            if let Some(hit) = self.resolve_external(&names, geocoder).await {
                return Ok(Some(hit));
            }
        }

        tracing::debug!(anchor = %anchor.full_name(), "anchor unresolvable");
        Ok(None)
    }

    async fn resolve_vector<V: VectorIndex>(
        &self,
        names: &[String],
        vector: &V,
    ) -> Option<ResolvedAnchor> {
        let budget = Duration::from_millis(self.config.timeout_ms);
        for name in names {
            let outcome = tokio::time::timeout(budget, vector.search(name, 1)).await;
            let hits = match outcome {
                Ok(Ok(hits)) => hits,
                Ok(Err(e)) => {
                    tracing::warn!(name, error = %e, "vector anchor lookup failed");
                    continue;
                }
                Err(_) => {
                    tracing::warn!(name, "vector anchor lookup timed out");
                    continue;
                }
            };
            if let Some(best) = hits.into_iter().next() {
                if best.similarity >= self.config.vector_similarity_floor {
                    tracing::debug!(
                        name,
                        matched = %best.poi.name,
                        similarity = best.similarity,
                        "anchor resolved by vector similarity"
                    );
                    let resolved = ResolvedAnchor {
                        name: best.poi.name,
                        lon: best.poi.lon,
                        lat: best.poi.lat,
                        source: AnchorSource::Vector,
                    };
                    self.aliases
                        .write()
                        .unwrap()
                        .insert(name.clone(), resolved.clone());
                    return Some(resolved);
                }
            }
        }
        None
    }

    async fn resolve_external<G: Geocoder>(
        &self,
        names: &[String],
        geocoder: &G,
    ) -> Option<ResolvedAnchor> {
        let budget = Duration::from_millis(self.config.timeout_ms);
        for name in names {
            let outcome = tokio::time::timeout(budget, geocoder.geocode(name)).await;
            let place = match outcome {
                Ok(Ok(Some(place))) => place,
                Ok(Ok(None)) => continue,
                Ok(Err(e)) => {
                    tracing::warn!(name, error = %e, "external geocode failed");
                    continue;
                }
                Err(_) => {
                    tracing::warn!(name, "external geocode timed out");
                    continue;
                }
            };
            tracing::debug!(name, place = %place.name, "anchor resolved by geocoder");
            let resolved = ResolvedAnchor {
                name: place.name,
                lon: place.lon,
                lat: place.lat,
                source: AnchorSource::Geocoder,
            };
            self.aliases
                .write()
                .unwrap()
                .insert(name.clone(), resolved.clone());
            return Some(resolved);
        }
        None
    }
}

impl Default for AnchorResolver {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}
