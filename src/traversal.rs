//! Path-Weighted Traversal Engine
//!
//! Turns a set of seed entity names into ranked, natural-language
//! relation-path descriptions in four passes:
//!
//! 1. [`find_seed_paths`] — for every ordered pair of distinct seeds,
//!    enumerate all simple paths up to 3 hops in the undirected adjacency
//!    view, recording direction-normalized edge sets and raw per-depth
//!    path counts.
//! 2. [`score_paths`] — weighted propagation per seed pair: a unit of flow
//!    splits evenly across the source's neighbors, and an edge whose
//!    accumulated weight clears the threshold propagates `weight * decay /
//!    next_neighbor_count` onward, up to 3 hops. A path's score is its
//!    mean accumulated edge weight. The threshold is a pruning gate, not a
//!    cutoff: paths that never clear it keep the weight they did
//!    accumulate.
//! 3. [`select_paths`] — sort by score, collapse reverse traversals via an
//!    order-independent node signature, and cap the output at
//!    `min(max_paths, half of each raw hop-count bucket summed)`.
//! 4. [`describe_paths`] — render each surviving path as a deterministic
//!    sentence chaining entity and edge clauses; truncate the list to a
//!    token budget and reverse it so the highest-confidence path lands
//!    closest to the question in the final prompt.
//!
//! The enumeration and scoring passes are pure and CPU-bound; they run in
//! parallel across seed pairs over a shared immutable adjacency snapshot.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use ordered_float::OrderedFloat;
use rayon::prelude::*;

use crate::cancel::CancelToken;
use crate::context::truncate_by_token_size;
use crate::error::Result;
use crate::graph::GraphStore;
use crate::model::{undirected_key, Entity, Relationship};

/// Undirected adjacency snapshot: entity name to sorted neighbor set.
pub type Adjacency = BTreeMap<String, BTreeSet<String>>;

/// Traversal tuning. The 3-hop ceiling is fixed: the selection quota is
/// built from exactly the 1/2/3-hop count buckets.
#[derive(Debug, Clone)]
pub struct TraversalConfig {
    /// Accumulated edge weight above which flow propagates another hop.
    pub threshold: f64,
    /// Multiplicative decay applied to propagated flow per hop.
    pub decay: f64,
    /// Hard cap on selected paths.
    pub max_paths: usize,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self { threshold: 0.3, decay: 0.8, max_paths: 15 }
    }
}

/// Simple paths and touched edges discovered between one seed pair.
#[derive(Debug, Clone, Default)]
pub struct PairPaths {
    /// Node sequences, seed to seed inclusive.
    pub paths: Vec<Vec<String>>,
    /// Direction-normalized edges touched by any of the paths.
    pub edges: BTreeSet<(String, String)>,
}

/// Output of the enumeration pass across all seed pairs.
#[derive(Debug, Clone, Default)]
pub struct PathSearchResult {
    /// Discovered paths grouped by ordered `(start, end)` seed pair.
    pub by_pair: BTreeMap<(String, String), PairPaths>,
    /// Raw count of paths found at depth exactly 1.
    pub one_hop: usize,
    /// Raw count of paths found at depth exactly 2.
    pub two_hop: usize,
    /// Raw count of paths found at depth exactly 3.
    pub three_hop: usize,
}

/// A path with its propagation score.
#[derive(Debug, Clone)]
pub struct ScoredPath {
    /// Node sequence, seed to seed inclusive.
    pub nodes: Vec<String>,
    /// Mean accumulated edge weight along the path.
    pub score: f64,
}

/// Build the undirected adjacency snapshot from bulk graph scans.
pub fn build_adjacency(entities: &[Entity], relationships: &[Relationship]) -> Adjacency {
    let mut adjacency = Adjacency::new();
    for entity in entities {
        adjacency.entry(entity.name.clone()).or_default();
    }
    for relationship in relationships {
        adjacency
            .entry(relationship.source_name.clone())
            .or_default()
            .insert(relationship.target_name.clone());
        adjacency
            .entry(relationship.target_name.clone())
            .or_default()
            .insert(relationship.source_name.clone());
    }
    adjacency
}

/// Enumerate all simple paths up to 3 hops between every ordered pair of
/// distinct seeds. Parallel across pairs; each pair reads the shared
/// snapshot and writes only pair-local accumulators.
pub fn find_seed_paths(
    adjacency: &Adjacency,
    seeds: &[String],
    cancel: &CancelToken,
) -> Result<PathSearchResult> {
    let mut pairs = Vec::new();
    for start in seeds {
        for end in seeds {
            if start != end {
                pairs.push((start.clone(), end.clone()));
            }
        }
    }

    let per_pair: Vec<((String, String), PairEnumeration)> = pairs
        .into_par_iter()
        .map(|(start, end)| {
            cancel.check()?;
            let enumeration = enumerate_pair(adjacency, &start, &end);
            Ok(((start, end), enumeration))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut result = PathSearchResult::default();
    for (key, enumeration) in per_pair {
        result.one_hop += enumeration.depth_counts[0];
        result.two_hop += enumeration.depth_counts[1];
        result.three_hop += enumeration.depth_counts[2];
        if !enumeration.pair.paths.is_empty() {
            result.by_pair.insert(key, enumeration.pair);
        }
    }
    Ok(result)
}

#[derive(Default)]
struct PairEnumeration {
    pair: PairPaths,
    // Paths found at depth exactly 1, 2, 3.
    depth_counts: [usize; 3],
}

fn enumerate_pair(adjacency: &Adjacency, start: &str, end: &str) -> PairEnumeration {
    let mut out = PairEnumeration::default();
    let mut path = vec![start.to_string()];
    dfs(adjacency, start, end, &mut path, 0, &mut out);
    out
}

fn dfs(
    adjacency: &Adjacency,
    current: &str,
    target: &str,
    path: &mut Vec<String>,
    depth: usize,
    out: &mut PairEnumeration,
) {
    if depth > 3 {
        return;
    }
    if current == target {
        out.pair.paths.push(path.clone());
        for window in path.windows(2) {
            out.pair.edges.insert(undirected_key(&window[0], &window[1]));
        }
        out.depth_counts[depth - 1] += 1;
        return;
    }
    let Some(neighbors) = adjacency.get(current) else { return };
    for neighbor in neighbors {
        if path.iter().any(|n| n == neighbor) {
            continue;
        }
        path.push(neighbor.clone());
        dfs(adjacency, neighbor, target, path, depth + 1, out);
        path.pop();
    }
}

/// Score every discovered path by weighted, decayed flow propagation,
/// independently per seed pair. Parallel across pairs.
pub fn score_paths(
    search: &PathSearchResult,
    config: &TraversalConfig,
    cancel: &CancelToken,
) -> Result<Vec<ScoredPath>> {
    let mut scored: Vec<ScoredPath> = search
        .by_pair
        .par_iter()
        .map(|((start, end), pair)| {
            cancel.check()?;
            Ok(weighted_paths_for_pair(&pair.paths, start, end, config))
        })
        .collect::<Result<Vec<Vec<ScoredPath>>>>()?
        .into_iter()
        .flatten()
        .collect();

    // Deterministic order: score descending, node sequence as tiebreak.
    scored.sort_by(|a, b| {
        OrderedFloat(b.score)
            .cmp(&OrderedFloat(a.score))
            .then_with(|| a.nodes.cmp(&b.nodes))
    });
    Ok(scored)
}

/// One pair's propagation pass. Fixed three-level unrolling: the quota
/// logic downstream partitions the budget by exactly three depth buckets.
fn weighted_paths_for_pair(
    paths: &[Vec<String>],
    source: &str,
    target: &str,
    config: &TraversalConfig,
) -> Vec<ScoredPath> {
    // Successor sets observed across this pair's discovered paths.
    let mut follow: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    for path in paths {
        for window in path.windows(2) {
            follow.entry(&window[0]).or_default().insert(&window[1]);
        }
    }

    let mut edge_weights: HashMap<(&str, &str), f64> = HashMap::new();

    if let Some(first_neighbors) = follow.get(source) {
        let first_share = 1.0 / first_neighbors.len() as f64;
        for &first in first_neighbors {
            let w1 = {
                let w = edge_weights.entry((source, first)).or_default();
                *w += first_share;
                *w
            };
            if first == target {
                continue;
            }
            if w1 > config.threshold {
                if let Some(second_neighbors) = follow.get(first) {
                    let second_share = w1 * config.decay / second_neighbors.len() as f64;
                    for &second in second_neighbors {
                        let w2 = {
                            let w = edge_weights.entry((first, second)).or_default();
                            *w += second_share;
                            *w
                        };
                        if second == target {
                            continue;
                        }
                        if w2 > config.threshold {
                            if let Some(third_neighbors) = follow.get(second) {
                                let third_share = w2 * config.decay / third_neighbors.len() as f64;
                                for &third in third_neighbors {
                                    *edge_weights.entry((second, third)).or_default() +=
                                        third_share;
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    paths
        .iter()
        .map(|path| {
            let edge_count = path.len().saturating_sub(1).max(1);
            let total: f64 = path
                .windows(2)
                .map(|w| {
                    edge_weights
                        .get(&(w[0].as_str(), w[1].as_str()))
                        .copied()
                        .unwrap_or(0.0)
                })
                .sum();
            ScoredPath { nodes: path.clone(), score: total / edge_count as f64 }
        })
        .collect()
}

/// Select the output paths: collapse reverse traversals (first seen, i.e.
/// highest scored, wins), then take `min(max_paths, quota)` entries where
/// the quota is half of each raw hop-count bucket summed.
pub fn select_paths(
    scored: Vec<ScoredPath>,
    search: &PathSearchResult,
    max_paths: usize,
) -> Vec<ScoredPath> {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut deduped: Vec<ScoredPath> = Vec::new();
    for path in scored {
        let mut names = path.nodes.clone();
        names.sort();
        let signature = names.join("-");
        if seen.insert(signature) {
            deduped.push(path);
        }
    }

    let quota = search.one_hop / 2 + search.two_hop / 2 + search.three_hop / 2;
    deduped.truncate(max_paths.min(quota));
    deduped
}

/// Render surviving paths as natural-language sentences, truncate to the
/// token budget, and reverse so the best-scoring kept path comes last.
///
/// A path whose edge or entity data has gone missing between enumeration
/// and rendering is dropped silently.
pub fn describe_paths(
    store: &dyn GraphStore,
    selected: &[ScoredPath],
    max_tokens: usize,
    cancel: &CancelToken,
) -> Result<Vec<String>> {
    let mut descriptions = Vec::new();
    for path in selected {
        cancel.check()?;
        if let Some(description) = describe_path(store, &path.nodes)? {
            descriptions.push(description);
        }
    }
    let mut kept = truncate_by_token_size(descriptions, |d| d.as_str(), max_tokens);
    kept.reverse();
    Ok(kept)
}

/// Render one path, chaining per-edge segments with `"and"`. Returns
/// `Ok(None)` when any referenced entity or edge no longer exists.
fn describe_path(store: &dyn GraphStore, nodes: &[String]) -> Result<Option<String>> {
    if nodes.len() < 2 {
        return Ok(None);
    }

    let mut entities = Vec::with_capacity(nodes.len());
    for name in nodes {
        match store.get_entity(name, None)? {
            Some(entity) => entities.push(entity),
            None => return Ok(None),
        }
    }

    let mut segments = Vec::with_capacity(nodes.len() - 1);
    for (i, window) in nodes.windows(2).enumerate() {
        let Some(edge) = lookup_edge(store, &window[0], &window[1])? else {
            return Ok(None);
        };
        let a = &entities[i];
        let b = &entities[i + 1];
        segments.push(format!(
            "The entity {} is a {} with the description ({}) through edge ({}) to \
             connect to {} and {}. The entity {} is a {} with the description ({})",
            a.name,
            a.entity_type,
            a.description,
            edge.keywords,
            a.name,
            b.name,
            b.name,
            b.entity_type,
            b.description,
        ));
    }
    Ok(Some(segments.join(" and ")))
}

/// Edge lookup trying both directions; relationships are logically
/// undirected at the presentation layer.
fn lookup_edge(store: &dyn GraphStore, a: &str, b: &str) -> Result<Option<Relationship>> {
    if let Some(edge) = store.get_relationship(a, b, None)? {
        return Ok(Some(edge));
    }
    store.get_relationship(b, a, None)
}

/// Full traversal pipeline: enumerate, score, select, describe.
pub fn find_related_path_descriptions(
    store: &dyn GraphStore,
    adjacency: &Adjacency,
    seeds: &[String],
    config: &TraversalConfig,
    max_tokens: usize,
    cancel: &CancelToken,
) -> Result<Vec<String>> {
    if seeds.len() < 2 {
        return Ok(Vec::new());
    }
    let search = find_seed_paths(adjacency, seeds, cancel)?;
    let scored = score_paths(&search, config, cancel)?;
    let selected = select_paths(scored, &search, config.max_paths);
    describe_paths(store, &selected, max_tokens, cancel)
}
