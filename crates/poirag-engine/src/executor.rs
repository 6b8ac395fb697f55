//! Query executor: the single entry point of the engine.
//!
//! A validated plan plus one or more spatial contexts go in; a well-formed
//! execution result comes out. Failures degrade to `mode: "error"` with the
//! reason in the stats block, never a raw error to the caller.
//!
//! Mode selection is a closed ladder: multiple contexts (or an explicit
//! comparison plan) run region comparison; a graph-reasoning trigger runs
//! graph analysis; an aggregation request or area-analysis plan runs the
//! aggregated pipeline; everything else is a basic search.

use crate::aggregate;
use crate::cache::{QueryCache, QueryFingerprint};
use crate::expansion::{self, ExpansionStrategy};
use crate::filter;
use crate::ontology;
use crate::resolver::AnchorResolver;
use poirag_analysis::{
    dbscan, generate_fuzzy_regions, identify_hotspots, needs_graph_reasoning, SpatialGraph,
};
use poirag_core::config::EngineConfig;
use poirag_core::geo::kernel;
use poirag_core::hex;
use poirag_core::models::poi::CompressedPoi;
use poirag_core::models::result::{
    AnchorSource, AreaProfile, CategoryShare, ExecutionMode, ExecutionResult, Landmark,
    RegionComparison, ResolvedAnchor, TwoStageStats,
};
use poirag_core::models::{Poi, QueryPlan, QueryType, SortBy, SpatialContext};
use poirag_core::{PoiragError, Result};
use poirag_store::{
    AreaConstraint, Geocoder, NoopGeocoder, NoopVector, PoiQuery, PoiStore, VectorIndex,
};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Generic over the store ports so tests and deployments choose their own
/// backends. The vector index and geocoder default to no-ops.
pub struct QueryExecutor<P, V = NoopVector, G = NoopGeocoder> {
    store: P,
    vector: Option<V>,
    geocoder: Option<G>,
    resolver: AnchorResolver,
    cache: QueryCache,
    config: EngineConfig,
}

impl<P: PoiStore> QueryExecutor<P> {
    pub fn new(store: P, config: EngineConfig) -> Self {
        Self {
            store,
            vector: None,
            geocoder: None,
            resolver: AnchorResolver::new(config.resolver.clone()),
            cache: QueryCache::new(config.cache.clone()),
            config,
        }
    }
}

impl<P, V, G> QueryExecutor<P, V, G>
where
    P: PoiStore,
    V: VectorIndex,
    G: Geocoder,
{
    pub fn with_vector<V2: VectorIndex>(self, vector: V2) -> QueryExecutor<P, V2, G> {
        QueryExecutor {
            store: self.store,
            vector: Some(vector),
            geocoder: self.geocoder,
            resolver: self.resolver,
            cache: self.cache,
            config: self.config,
        }
    }

    pub fn with_geocoder<G2: Geocoder>(self, geocoder: G2) -> QueryExecutor<P, V, G2> {
        QueryExecutor {
            store: self.store,
            vector: self.vector,
            geocoder: Some(geocoder),
            resolver: self.resolver,
            cache: self.cache,
            config: self.config,
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn resolver(&self) -> &AnchorResolver {
        &self.resolver
    }

    /// Run a plan against its spatial contexts.
    pub async fn execute(&self, mut plan: QueryPlan, contexts: &[SpatialContext]) -> ExecutionResult {
        let started = Instant::now();

        if contexts.is_empty() {
            return ExecutionResult::degraded("at least one spatial context is required");
        }
        if let Err(e) = plan.validate() {
            return ExecutionResult::degraded(e.to_string());
        }
        for context in contexts {
            if let Err(e) = context.validate() {
                return ExecutionResult::degraded(e.to_string());
            }
        }

        let fingerprint = QueryFingerprint::of(&plan, contexts).ok();
        if let Some(key) = &fingerprint {
            if let Some(hit) = self.cache.get(key) {
                tracing::debug!("served from cache");
                return hit;
            }
        }

        let mode = self.select_mode(&plan, contexts);
        let outcome = match mode {
            ExecutionMode::Comparison => self.run_comparison(&plan, contexts).await,
            ExecutionMode::Graph => self.run_graph(&plan, &contexts[0]).await,
            ExecutionMode::Aggregated => self.run_aggregated(&plan, &contexts[0]).await,
            _ => self.run_basic(&plan, &contexts[0]).await,
        };

        let mut result = match outcome {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "execution degraded");
                ExecutionResult::degraded(e.to_string())
            }
        };
        result.stats.execution_time_ms = started.elapsed().as_millis() as u64;

        if result.mode != ExecutionMode::Error {
            if let Some(key) = fingerprint {
                self.cache.insert(key, plan.query_type, result.clone());
            }
        }
        result
    }

    fn select_mode(&self, plan: &QueryPlan, contexts: &[SpatialContext]) -> ExecutionMode {
        if contexts.len() > 1 || plan.query_type == QueryType::RegionComparison {
            ExecutionMode::Comparison
        } else if plan.need_graph_reasoning || needs_graph_reasoning(&plan.raw_question) {
            ExecutionMode::Graph
        } else if plan.aggregation.enabled || plan.query_type == QueryType::AreaAnalysis {
            ExecutionMode::Aggregated
        } else {
            ExecutionMode::Basic
        }
    }

    // Anchor resolution with viewport-centroid fallback.
    async fn anchor_for(
        &self,
        plan: &QueryPlan,
        context: &SpatialContext,
    ) -> Result<Option<ResolvedAnchor>> {
        let Some(anchor) = &plan.anchor else {
            return Ok(None);
        };
        let resolved = self
            .resolver
            .resolve(
                anchor,
                &self.store,
                self.vector.as_ref(),
                self.geocoder.as_ref(),
            )
            .await?;
        Ok(Some(resolved.unwrap_or_else(|| {
            let center = context.centroid();
            tracing::debug!(anchor = %anchor.full_name(), "falling back to viewport centroid");
            ResolvedAnchor {
                name: anchor.full_name(),
                lon: center.lon,
                lat: center.lat,
                source: AnchorSource::ViewportCentroid,
            }
        })))
    }

    /// One candidate fetch: constraint selection, store query, two-stage
    /// distance filter, and blocklist.
    async fn fetch(
        &self,
        plan: &QueryPlan,
        context: &SpatialContext,
        anchor: Option<&ResolvedAnchor>,
    ) -> Result<(Vec<Poi>, usize, Option<TwoStageStats>)> {
        let mut categories = plan.categories.clone();
        if categories.is_empty() {
            categories = ontology::detect_categories(&plan.raw_question);
        }

        let mut two_stage = None;
        let mut distance_cap: Option<(ResolvedAnchor, f64)> = None;
        let area = match (anchor, context) {
            (
                Some(anchor),
                SpatialContext::Viewport { .. } | SpatialContext::Polygon { .. },
            ) if self.config.two_stage.enabled => {
                let inside = context.contains(anchor.lon, anchor.lat);
                if !inside && self.config.two_stage.drop_viewport_when_anchor_outside {
                    two_stage = Some(TwoStageStats {
                        enabled: true,
                        viewport_dropped: true,
                    });
                    AreaConstraint::Circle {
                        center: anchor.location(),
                        radius_m: plan.radius_m,
                    }
                } else {
                    two_stage = Some(TwoStageStats {
                        enabled: true,
                        viewport_dropped: false,
                    });
                    distance_cap = Some((anchor.clone(), plan.radius_m));
                    AreaConstraint::from(context)
                }
            }
            // The plan radius is authoritative for circle contexts when it is
            // wider, so radius expansion actually widens the search.
            (_, SpatialContext::Circle { center, radius_m }) => AreaConstraint::Circle {
                center: *center,
                radius_m: radius_m.max(plan.radius_m),
            },
            _ => AreaConstraint::from(context),
        };

        let mut query = PoiQuery::within(area).categories(categories);
        query.rating_range = plan.rating_range;

        let budget = Duration::from_millis(self.config.executor.store_timeout_ms);
        let mut candidates = tokio::time::timeout(budget, self.store.search(&query))
            .await
            .map_err(|_| PoiragError::Timeout {
                operation: "poi_search".to_string(),
                budget_ms: budget.as_millis() as u64,
            })??;

        if let Some((anchor, radius_m)) = distance_cap {
            let origin = anchor.location().point();
            candidates.retain(|poi| kernel::haversine_m(origin, poi.point()) <= radius_m);
        }

        let (kept, removed) = filter::apply_blocklist(candidates, plan);
        Ok((kept, removed, two_stage))
    }

    /// Fetch, trying expansion rewrites when the result set is empty.
    async fn fetch_with_expansion(
        &self,
        plan: &QueryPlan,
        context: &SpatialContext,
        anchor: Option<&ResolvedAnchor>,
    ) -> Result<FetchOutcome> {
        let (pois, removed, two_stage) = self.fetch(plan, context, anchor).await?;
        if !pois.is_empty() {
            return Ok(FetchOutcome {
                pois,
                filtered_noise: removed,
                two_stage,
                expansion_applied: None,
                suggestion: None,
            });
        }

        let strategies = expansion::strategies_for(plan, &self.config.expansion);
        let mut attempted: Vec<ExpansionStrategy> = Vec::new();
        for strategy in strategies
            .into_iter()
            .take(self.config.expansion.max_attempts)
        {
            attempted.push(strategy);
            let adjusted = expansion::apply(strategy, plan, &self.config.expansion);
            tracing::debug!(strategy = strategy.label(), "expansion attempt");
            let (pois, removed, two_stage) = self.fetch(&adjusted, context, anchor).await?;
            if !pois.is_empty() {
                return Ok(FetchOutcome {
                    pois,
                    filtered_noise: removed,
                    two_stage,
                    expansion_applied: Some(strategy.label().to_string()),
                    suggestion: None,
                });
            }
        }

        Ok(FetchOutcome {
            pois: Vec::new(),
            filtered_noise: removed,
            two_stage,
            suggestion: Some(expansion::suggestion(&attempted, plan)),
            expansion_applied: None,
        })
    }

    /// Semantic similarity per POI id, when the plan asks and the index is up.
    async fn semantic_scores(&self, plan: &QueryPlan) -> HashMap<String, f64> {
        let (Some(query), Some(vector)) = (&plan.semantic_query, self.vector.as_ref()) else {
            return HashMap::new();
        };
        if !vector.is_available() {
            return HashMap::new();
        }
        let budget = Duration::from_millis(self.config.executor.vector_timeout_ms);
        match tokio::time::timeout(budget, vector.search(query, 50)).await {
            Ok(Ok(hits)) => hits
                .into_iter()
                .map(|hit| (hit.poi.id, hit.similarity))
                .collect(),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "semantic scoring failed, falling back to spatial rank");
                HashMap::new()
            }
            Err(_) => {
                tracing::warn!("semantic scoring timed out, falling back to spatial rank");
                HashMap::new()
            }
        }
    }

    fn sort_candidates(
        &self,
        candidates: &mut [Poi],
        plan: &QueryPlan,
        origin: geo::Point<f64>,
        scores: &HashMap<String, f64>,
    ) {
        match plan.sort_by {
            SortBy::Distance => {
                candidates.sort_by(|a, b| {
                    let da = kernel::haversine_m(origin, a.point());
                    let db = kernel::haversine_m(origin, b.point());
                    da.total_cmp(&db)
                });
            }
            SortBy::Rating => {
                candidates.sort_by(|a, b| {
                    let ra = a.rating.unwrap_or(f32::NEG_INFINITY);
                    let rb = b.rating.unwrap_or(f32::NEG_INFINITY);
                    rb.total_cmp(&ra).then_with(|| {
                        kernel::haversine_m(origin, a.point())
                            .total_cmp(&kernel::haversine_m(origin, b.point()))
                    })
                });
            }
            SortBy::Relevance => {
                candidates.sort_by(|a, b| {
                    let sa = scores.get(&a.id).copied().unwrap_or(0.0);
                    let sb = scores.get(&b.id).copied().unwrap_or(0.0);
                    sb.total_cmp(&sa).then_with(|| {
                        kernel::haversine_m(origin, a.point())
                            .total_cmp(&kernel::haversine_m(origin, b.point()))
                    })
                });
            }
        }
    }

    fn compress(
        &self,
        candidates: &[Poi],
        plan: &QueryPlan,
        origin: geo::Point<f64>,
    ) -> Vec<CompressedPoi> {
        let limit = plan.max_results.min(self.config.executor.compressed_limit);
        candidates
            .iter()
            .take(limit)
            .map(|poi| {
                CompressedPoi::from_poi(poi, Some(kernel::haversine_m(origin, poi.point())))
            })
            .collect()
    }

    /// Stride-sample for analysis when the candidate volume is excessive.
    fn analysis_set<'a>(&self, candidates: &'a [Poi], plan: &QueryPlan) -> (Vec<&'a Poi>, bool) {
        let cap = plan.sampling.max_samples;
        if plan.sampling.enabled
            && candidates.len() > self.config.executor.downsample_above
            && candidates.len() > cap
        {
            let step = candidates.len().div_ceil(cap);
            (candidates.iter().step_by(step).collect(), true)
        } else {
            (candidates.iter().collect(), false)
        }
    }

    async fn run_basic(&self, plan: &QueryPlan, context: &SpatialContext) -> Result<ExecutionResult> {
        let anchor = self.anchor_for(plan, context).await?;
        let (fetched, scores) = futures::join!(
            self.fetch_with_expansion(plan, context, anchor.as_ref()),
            self.semantic_scores(plan)
        );
        let outcome = fetched?;

        let origin = anchor
            .as_ref()
            .map(|a| a.location().point())
            .unwrap_or_else(|| context.centroid().point());

        let mut candidates = outcome.pois;
        self.sort_candidates(&mut candidates, plan, origin, &scores);

        let mut result = ExecutionResult::empty(ExecutionMode::Basic);
        result.anchor = anchor;
        result.pois = self.compress(&candidates, plan, origin);
        result.boundary = boundary_of(&candidates);
        if plan.need_landmarks {
            result.landmarks = pick_landmarks(&candidates);
        }
        result.expansion_suggestion = outcome.suggestion;
        result.stats.candidate_count = candidates.len();
        result.stats.returned_count = result.pois.len();
        result.stats.filtered_noise_count = outcome.filtered_noise;
        result.stats.expansion_applied = outcome.expansion_applied;
        result.stats.two_stage_filter = outcome.two_stage;
        Ok(result)
    }

    async fn run_aggregated(
        &self,
        plan: &QueryPlan,
        context: &SpatialContext,
    ) -> Result<ExecutionResult> {
        let anchor = self.anchor_for(plan, context).await?;
        let outcome = self
            .fetch_with_expansion(plan, context, anchor.as_ref())
            .await?;

        let origin = anchor
            .as_ref()
            .map(|a| a.location().point())
            .unwrap_or_else(|| context.centroid().point());

        let mut candidates = outcome.pois;
        self.sort_candidates(&mut candidates, plan, origin, &HashMap::new());

        let (analysis_refs, downsampled) = self.analysis_set(&candidates, plan);
        let analysis_pois: Vec<Poi> = analysis_refs.into_iter().cloned().collect();

        let mut result = ExecutionResult::empty(ExecutionMode::Aggregated);
        if !analysis_pois.is_empty() {
            result.spatial_analysis = Some(aggregate::aggregate_auto(&analysis_pois, plan)?);
            result.area_profile = Some(area_profile(&candidates));
        }
        if analysis_pois.len() >= self.config.executor.analysis_min_candidates {
            let report = identify_hotspots(&analysis_pois, &self.config.clustering)?;
            let regions = {
                let partition = dbscan(
                    &analysis_pois,
                    self.config.fuzzy.eps_m,
                    self.config.fuzzy.min_points,
                )?;
                generate_fuzzy_regions(&analysis_pois, &partition.clusters, &self.config.fuzzy)
            };
            if !report.hotspots.is_empty() {
                result.spatial_clusters = Some(report.hotspots);
            }
            if !regions.is_empty() {
                result.fuzzy_regions = Some(regions);
            }
        }

        result.anchor = anchor;
        result.pois = self.compress(&candidates, plan, origin);
        result.boundary = boundary_of(&candidates);
        if plan.need_landmarks {
            result.landmarks = pick_landmarks(&candidates);
        }
        result.expansion_suggestion = outcome.suggestion;
        result.stats.candidate_count = candidates.len();
        result.stats.returned_count = result.pois.len();
        result.stats.filtered_noise_count = outcome.filtered_noise;
        result.stats.expansion_applied = outcome.expansion_applied;
        result.stats.two_stage_filter = outcome.two_stage;
        result.stats.downsampled = downsampled;
        Ok(result)
    }

    async fn run_graph(&self, plan: &QueryPlan, context: &SpatialContext) -> Result<ExecutionResult> {
        let anchor = self.anchor_for(plan, context).await?;
        let outcome = self
            .fetch_with_expansion(plan, context, anchor.as_ref())
            .await?;

        let origin = anchor
            .as_ref()
            .map(|a| a.location().point())
            .unwrap_or_else(|| context.centroid().point());

        let mut candidates = outcome.pois;
        self.sort_candidates(&mut candidates, plan, origin, &HashMap::new());
        let (analysis_refs, downsampled) = self.analysis_set(&candidates, plan);
        let analysis_pois: Vec<Poi> = analysis_refs.into_iter().cloned().collect();

        let mut result = ExecutionResult::empty(ExecutionMode::Graph);
        if !analysis_pois.is_empty() {
            let resolution = hex::resolution_for_radius(plan.radius_m);
            let mut graph = SpatialGraph::build(&analysis_pois, resolution)?;
            result.graph_analysis = Some(graph.analyze(&self.config.graph));
            result.spatial_analysis = Some(aggregate::aggregate_auto(&analysis_pois, plan)?);
        }

        result.anchor = anchor;
        result.pois = self.compress(&candidates, plan, origin);
        result.expansion_suggestion = outcome.suggestion;
        result.stats.candidate_count = candidates.len();
        result.stats.returned_count = result.pois.len();
        result.stats.filtered_noise_count = outcome.filtered_noise;
        result.stats.expansion_applied = outcome.expansion_applied;
        result.stats.two_stage_filter = outcome.two_stage;
        result.stats.downsampled = downsampled;
        Ok(result)
    }

    async fn run_comparison(
        &self,
        plan: &QueryPlan,
        contexts: &[SpatialContext],
    ) -> Result<ExecutionResult> {
        let mut comparisons = Vec::with_capacity(contexts.len());
        let mut total = 0usize;
        let mut noise = 0usize;

        for (i, context) in contexts.iter().enumerate() {
            let label = plan
                .target_regions
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("区域{}", i + 1));
            let (pois, removed, _) = self.fetch(plan, context, None).await?;
            total += pois.len();
            noise += removed;

            let profile = area_profile(&pois);
            let rated: Vec<f32> = pois.iter().filter_map(|p| p.rating).collect();
            comparisons.push(RegionComparison {
                label,
                poi_count: pois.len(),
                top_categories: profile.categories.into_iter().take(3).collect(),
                avg_rating: if rated.is_empty() {
                    None
                } else {
                    Some(rated.iter().sum::<f32>() / rated.len() as f32)
                },
            });
        }

        let mut result = ExecutionResult::empty(ExecutionMode::Comparison);
        result.comparison = Some(comparisons);
        result.stats.candidate_count = total;
        result.stats.filtered_noise_count = noise;
        Ok(result)
    }
}

struct FetchOutcome {
    pois: Vec<Poi>,
    filtered_noise: usize,
    two_stage: Option<TwoStageStats>,
    expansion_applied: Option<String>,
    suggestion: Option<poirag_core::models::result::ExpansionSuggestion>,
}

fn boundary_of(candidates: &[Poi]) -> Option<geojson::Geometry> {
    let locations: Vec<_> = candidates.iter().map(Poi::location).collect();
    kernel::convex_hull_ring(&locations).map(|ring| kernel::polygon_geometry(&ring))
}

fn category_of(poi: &Poi) -> &str {
    if !poi.category_mid.is_empty() {
        &poi.category_mid
    } else if !poi.category_big.is_empty() {
        &poi.category_big
    } else {
        "未分类"
    }
}

/// Category histogram of the candidate set: top five shares with examples,
/// plus up to three rare categories (fewer than 3 occurrences).
fn area_profile(candidates: &[Poi]) -> AreaProfile {
    let total = candidates.len();
    let mut by_category: HashMap<&str, Vec<&Poi>> = HashMap::new();
    for poi in candidates {
        by_category.entry(category_of(poi)).or_default().push(poi);
    }

    let mut entries: Vec<(&str, Vec<&Poi>)> = by_category.into_iter().collect();
    entries.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(b.0)));

    let categories = entries
        .iter()
        .take(5)
        .map(|(name, members)| {
            let rated: Vec<f32> = members.iter().filter_map(|p| p.rating).collect();
            CategoryShare {
                name: name.to_string(),
                count: members.len(),
                percentage: if total == 0 {
                    0.0
                } else {
                    (members.len() as f64 * 1000.0 / total as f64).round() / 10.0
                },
                examples: members.iter().take(2).map(|p| p.name.clone()).collect(),
                avg_rating: if rated.is_empty() {
                    None
                } else {
                    Some(rated.iter().sum::<f32>() / rated.len() as f32)
                },
            }
        })
        .collect();

    let mut rare: Vec<&(&str, Vec<&Poi>)> =
        entries.iter().filter(|(_, m)| m.len() < 3).collect();
    rare.sort_by(|a, b| a.1.len().cmp(&b.1.len()).then_with(|| a.0.cmp(b.0)));

    AreaProfile {
        total,
        categories,
        rare_categories: rare.iter().take(3).map(|(n, _)| n.to_string()).collect(),
    }
}

/// Up to five landmarks by typed relevance.
fn pick_landmarks(candidates: &[Poi]) -> Vec<Landmark> {
    let mut scored: Vec<(u8, &Poi)> = candidates
        .iter()
        .filter_map(|poi| {
            let relevance = ontology::landmark_relevance(poi);
            (relevance > 0).then_some((relevance, poi))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.name.cmp(&b.1.name)));
    scored
        .into_iter()
        .take(5)
        .map(|(relevance, poi)| Landmark {
            name: poi.name.clone(),
            category: category_of(poi).to_string(),
            relevance,
            lon: poi.lon,
            lat: poi.lat,
        })
        .collect()
}
