//! Spatial graph analysis over occupied hex cells.
//!
//! Nodes are occupied cells (with POI counts and category histograms), edges
//! are ring-1 adjacency between occupied cells. The graph is rebuilt from
//! scratch for every analysis call; there is no incremental maintenance, and
//! that is intentional: a request's candidate set is small and the rebuild
//! keeps the structure trivially consistent with it.
//!
//! Traversal order is fixed (cells sorted by id) and betweenness sources are
//! stride-sampled, so repeated analyses of the same candidate set agree.

use h3o::{CellIndex, Resolution};
use petgraph::graph::{NodeIndex, UnGraph};
use poirag_core::config::GraphConfig;
use poirag_core::hex;
use poirag_core::models::analysis::{BridgeCell, CommunitySummary, GraphAnalysis, HubCell};
use poirag_core::models::{LonLat, Poi};
use poirag_core::Result;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// One occupied cell with its accumulated attributes.
#[derive(Debug, Clone)]
pub struct CellNode {
    pub cell: CellIndex,
    pub count: usize,
    pub histogram: HashMap<String, usize>,
    pub centroid: LonLat,
    /// Share of all POIs sitting in this cell.
    pub density: f64,
    pub page_rank: f64,
    pub betweenness: f64,
    pub community: Option<usize>,
}

impl CellNode {
    fn dominant_category(&self) -> String {
        self.histogram
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(c, _)| c.clone())
            .unwrap_or_default()
    }
}

pub struct SpatialGraph {
    graph: UnGraph<CellNode, ()>,
    /// Node indices in ascending cell-id order; the deterministic traversal
    /// order for every algorithm below.
    order: Vec<NodeIndex>,
}

impl SpatialGraph {
    /// Bin POIs into cells at the given resolution and connect adjacent
    /// occupied cells.
    pub fn build(pois: &[Poi], resolution: Resolution) -> Result<Self> {
        let mut bins: BTreeMap<CellIndex, (usize, HashMap<String, usize>)> = BTreeMap::new();
        for poi in pois {
            let cell = hex::cell_for(poi.lon, poi.lat, resolution)?;
            let entry = bins.entry(cell).or_default();
            entry.0 += 1;
            if !poi.category_big.is_empty() {
                *entry.1.entry(poi.category_big.clone()).or_insert(0) += 1;
            }
        }

        let total = pois.len().max(1) as f64;
        let mut graph = UnGraph::<CellNode, ()>::new_undirected();
        let mut index: HashMap<CellIndex, NodeIndex> = HashMap::new();
        let mut order = Vec::with_capacity(bins.len());

        for (cell, (count, histogram)) in &bins {
            let idx = graph.add_node(CellNode {
                cell: *cell,
                count: *count,
                histogram: histogram.clone(),
                centroid: hex::cell_center(*cell),
                density: *count as f64 / total,
                page_rank: 0.0,
                betweenness: 0.0,
                community: None,
            });
            index.insert(*cell, idx);
            order.push(idx);
        }

        for (cell, _) in &bins {
            let a = index[cell];
            for neighbor in hex::neighbors(*cell, 1) {
                if neighbor == *cell || neighbor < *cell {
                    continue;
                }
                if let Some(&b) = index.get(&neighbor) {
                    graph.add_edge(a, b, ());
                }
            }
        }

        Ok(Self { graph, order })
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Run the full analysis pass and produce the bounded summary.
    pub fn analyze(&mut self, config: &GraphConfig) -> GraphAnalysis {
        self.page_rank(config);
        self.betweenness_sampled(config);
        let communities = self.label_propagation(config);
        self.summarize(config, communities)
    }

    /// PageRank with density-weighted initialization and a density bonus
    /// term. Converges by aggregate delta; ranks are max-normalized so the
    /// strongest hub always scores exactly 1.
    fn page_rank(&mut self, config: &GraphConfig) {
        let n = self.order.len();
        if n == 0 {
            return;
        }

        let density: Vec<f64> = self.order.iter().map(|&i| self.graph[i].density).collect();
        let degree: Vec<usize> = self
            .order
            .iter()
            .map(|&i| self.graph.neighbors(i).count())
            .collect();
        let position: HashMap<NodeIndex, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(pos, &i)| (i, pos))
            .collect();

        let mut ranks = density.clone();
        let d = config.damping;

        for iteration in 0..config.max_iterations {
            let mut next = vec![0.0; n];
            for (pos, &idx) in self.order.iter().enumerate() {
                let mut incoming = 0.0;
                for neighbor in self.graph.neighbors(idx) {
                    let npos = position[&neighbor];
                    if degree[npos] > 0 {
                        incoming += ranks[npos] / degree[npos] as f64;
                    }
                }
                next[pos] = (1.0 - d) / n as f64 + d * incoming + 0.2 * density[pos];
            }

            let delta: f64 = next
                .iter()
                .zip(ranks.iter())
                .map(|(a, b)| (a - b).abs())
                .sum();
            ranks = next;
            if delta < config.tolerance {
                tracing::debug!(iteration, delta, "pagerank converged");
                break;
            }
        }

        let max = ranks.iter().copied().fold(0.0_f64, f64::max);
        for (pos, &idx) in self.order.iter().enumerate() {
            self.graph[idx].page_rank = if max > 0.0 { ranks[pos] / max } else { 0.0 };
        }
    }

    /// Brandes betweenness accumulation from a deterministic stride sample of
    /// at most `betweenness_sample` sources. An approximation; values are
    /// only used for ranking.
    fn betweenness_sampled(&mut self, config: &GraphConfig) {
        let n = self.order.len();
        if n < 3 {
            return;
        }

        let sample = config.betweenness_sample.max(1).min(n);
        let stride = n.div_ceil(sample);
        let sources: Vec<NodeIndex> = self.order.iter().copied().step_by(stride).collect();

        let position: HashMap<NodeIndex, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(pos, &i)| (i, pos))
            .collect();
        let mut centrality = vec![0.0_f64; n];

        for &source in &sources {
            let mut stack: Vec<usize> = Vec::new();
            let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
            let mut sigma = vec![0.0_f64; n];
            let mut dist = vec![i64::MAX; n];

            let s = position[&source];
            sigma[s] = 1.0;
            dist[s] = 0;

            let mut queue = VecDeque::new();
            queue.push_back(s);
            while let Some(v) = queue.pop_front() {
                stack.push(v);
                for neighbor in self.graph.neighbors(self.order[v]) {
                    let w = position[&neighbor];
                    if dist[w] == i64::MAX {
                        dist[w] = dist[v] + 1;
                        queue.push_back(w);
                    }
                    if dist[w] == dist[v] + 1 {
                        sigma[w] += sigma[v];
                        preds[w].push(v);
                    }
                }
            }

            let mut delta = vec![0.0_f64; n];
            while let Some(w) = stack.pop() {
                for &v in &preds[w] {
                    delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
                }
                if w != s {
                    centrality[w] += delta[w];
                }
            }
        }

        for (pos, &idx) in self.order.iter().enumerate() {
            // Undirected paths are counted twice across sources.
            self.graph[idx].betweenness = centrality[pos] / 2.0;
        }
    }

    /// Weighted label propagation: each cell adopts the label carrying the
    /// most POIs among itself and its neighbors. Fixed traversal order, at
    /// most `label_iterations` sweeps. Returns label -> member nodes.
    fn label_propagation(&mut self, config: &GraphConfig) -> Vec<Vec<NodeIndex>> {
        let position: HashMap<NodeIndex, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(pos, &i)| (i, pos))
            .collect();
        let mut labels: Vec<usize> = (0..self.order.len()).collect();

        for _ in 0..config.label_iterations {
            let mut changed = false;
            for (pos, &idx) in self.order.iter().enumerate() {
                let mut votes: BTreeMap<usize, f64> = BTreeMap::new();
                *votes.entry(labels[pos]).or_insert(0.0) += self.graph[idx].count as f64;
                for neighbor in self.graph.neighbors(idx) {
                    let npos = position[&neighbor];
                    *votes.entry(labels[npos]).or_insert(0.0) +=
                        self.graph[neighbor].count as f64;
                }
                // Highest weight wins; BTreeMap order makes ties fall to the
                // smallest label.
                let winner = votes
                    .iter()
                    .max_by(|a, b| {
                        a.1.partial_cmp(b.1)
                            .unwrap_or(std::cmp::Ordering::Equal)
                            .then_with(|| b.0.cmp(a.0))
                    })
                    .map(|(label, _)| *label)
                    .unwrap_or(labels[pos]);
                if winner != labels[pos] {
                    labels[pos] = winner;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        let mut groups: BTreeMap<usize, Vec<NodeIndex>> = BTreeMap::new();
        for (pos, &idx) in self.order.iter().enumerate() {
            groups.entry(labels[pos]).or_default().push(idx);
        }

        let mut communities: Vec<Vec<NodeIndex>> = groups
            .into_values()
            .filter(|members| members.len() >= config.min_community_size)
            .collect();
        // Largest by total POI count first
        communities.sort_by_key(|members| {
            std::cmp::Reverse(members.iter().map(|&i| self.graph[i].count).sum::<usize>())
        });

        for (community_id, members) in communities.iter().enumerate() {
            for &idx in members {
                self.graph[idx].community = Some(community_id);
            }
        }
        communities
    }

    fn summarize(&self, config: &GraphConfig, communities: Vec<Vec<NodeIndex>>) -> GraphAnalysis {
        let mut by_rank: Vec<&CellNode> = self.order.iter().map(|&i| &self.graph[i]).collect();
        by_rank.sort_by(|a, b| {
            b.page_rank
                .partial_cmp(&a.page_rank)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.cell.cmp(&b.cell))
        });
        let hubs: Vec<HubCell> = by_rank
            .iter()
            .take(config.top_k)
            .map(|node| HubCell {
                cell: node.cell.to_string(),
                centroid: node.centroid,
                poi_count: node.count,
                dominant_category: node.dominant_category(),
                page_rank: node.page_rank,
            })
            .collect();

        let mut by_betweenness: Vec<&CellNode> =
            self.order.iter().map(|&i| &self.graph[i]).collect();
        by_betweenness.sort_by(|a, b| {
            b.betweenness
                .partial_cmp(&a.betweenness)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.cell.cmp(&b.cell))
        });
        let bridges: Vec<BridgeCell> = by_betweenness
            .iter()
            .filter(|node| node.betweenness > 0.0)
            .take(config.top_k)
            .map(|node| BridgeCell {
                cell: node.cell.to_string(),
                centroid: node.centroid,
                poi_count: node.count,
                betweenness: node.betweenness,
            })
            .collect();

        let community_summaries: Vec<CommunitySummary> = communities
            .iter()
            .take(config.top_k)
            .enumerate()
            .map(|(id, members)| {
                let poi_count: usize = members.iter().map(|&i| self.graph[i].count).sum();
                let lon: f64 =
                    members.iter().map(|&i| self.graph[i].centroid.lon).sum::<f64>()
                        / members.len() as f64;
                let lat: f64 =
                    members.iter().map(|&i| self.graph[i].centroid.lat).sum::<f64>()
                        / members.len() as f64;

                let mut merged: HashMap<&str, usize> = HashMap::new();
                for &idx in members {
                    for (category, count) in &self.graph[idx].histogram {
                        *merged.entry(category.as_str()).or_insert(0) += count;
                    }
                }
                let dominant = merged
                    .into_iter()
                    .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
                    .map(|(c, _)| c.to_string())
                    .unwrap_or_default();

                CommunitySummary {
                    id,
                    cell_count: members.len(),
                    poi_count,
                    centroid: LonLat::new(lon, lat),
                    dominant_category: dominant,
                }
            })
            .collect();

        let insights = build_insights(&hubs, &bridges, &community_summaries);

        GraphAnalysis {
            node_count: self.node_count(),
            edge_count: self.edge_count(),
            hubs,
            bridges,
            communities: community_summaries,
            insights,
        }
    }
}

fn build_insights(
    hubs: &[HubCell],
    bridges: &[BridgeCell],
    communities: &[CommunitySummary],
) -> Vec<String> {
    let mut insights = Vec::new();
    if let Some(hub) = hubs.first() {
        insights.push(format!(
            "结构枢纽区域聚集了{}个兴趣点，以{}为主",
            hub.poi_count, hub.dominant_category
        ));
    }
    if !bridges.is_empty() {
        insights.push(format!("存在{}个连接不同片区的桥梁区域", bridges.len()));
    }
    if let Some(largest) = communities.first() {
        insights.push(format!(
            "识别出{}个功能社区，最大社区覆盖{}个单元、{}个兴趣点",
            communities.len(),
            largest.cell_count,
            largest.poi_count
        ));
    }
    insights
}

/// Composite relevance score mixing spatial, functional, semantic, and
/// graph-centrality components.
pub fn weighted_score(spatial: f64, functional: f64, semantic: f64, centrality: f64) -> f64 {
    0.3 * spatial + 0.3 * functional + 0.25 * semantic + 0.15 * centrality
}

/// Keywords in the raw question that indicate structural reasoning is wanted.
const GRAPH_KEYWORDS: [&str; 12] = [
    "枢纽", "中心区", "连接", "桥梁", "社区", "结构", "网络", "关联", "格局", "hub", "network",
    "connect",
];

/// Whether a raw question calls for graph-mode execution.
pub fn needs_graph_reasoning(question: &str) -> bool {
    let lowered = question.to_lowercase();
    GRAPH_KEYWORDS.iter().any(|k| lowered.contains(k))
}
