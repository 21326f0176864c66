//! HNSW index (C5): a multi-layer proximity graph for approximate
//! nearest-neighbor search over unit vectors, ranked by cosine similarity
//! (dot product, since every stored vector is L2-normalized).
//!
//! Nodes reference store entries by the `u32` arena slot from `tpde-store`
//! (§9 "arena + integer indices" redesign) rather than holding a copy of the
//! vector's owning pointer, so eviction only has to tombstone neighbor lists.

use parking_lot::RwLock;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tpde_store::Slot;

#[derive(Debug, Error, PartialEq)]
pub enum IndexError {
    #[error("vector has dimension {actual}, index is fixed at {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// HNSW construction/search parameters (§4.5). `dim` is fixed on first
/// insert if not given here.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct HnswConfig {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub dim: usize,
    pub seed: Option<u64>,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
            dim: 256,
            seed: None,
        }
    }
}

type NodeId = u32;

struct Node {
    slot: Slot,
    vector: Vec<f32>,
    /// `layers[l]` holds this node's neighbor `NodeId`s at layer `l`.
    layers: Vec<Vec<NodeId>>,
}

struct Graph {
    nodes: Vec<Option<Node>>,
    slot_to_node: HashMap<Slot, NodeId>,
    entry_point: Option<NodeId>,
    max_layer: usize,
    rng: SmallRng,
}

/// HNSW index (C5). `insert`/`search`/`delete` take an exclusive or shared
/// lock on the whole graph (§5's coarse-grained locking discipline — fine at
/// the ≤10^6-entry scales this engine targets).
pub struct HnswIndex {
    config: HnswConfig,
    graph: RwLock<Graph>,
}

impl HnswIndex {
    pub fn new(config: HnswConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self {
            config,
            graph: RwLock::new(Graph {
                nodes: Vec::new(),
                slot_to_node: HashMap::new(),
                entry_point: None,
                max_layer: 0,
                rng,
            }),
        }
    }

    pub fn config(&self) -> HnswConfig {
        self.config
    }

    pub fn len(&self) -> usize {
        self.graph.read().slot_to_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total directed neighbor links across every layer, for the stats
    /// snapshot's "index edges" figure (§6 egress).
    pub fn edge_count(&self) -> usize {
        self.graph
            .read()
            .nodes
            .iter()
            .filter_map(|n| n.as_ref())
            .map(|n| n.layers.iter().map(Vec::len).sum::<usize>())
            .sum()
    }

    /// `m_L = 1/ln(M)` per §4.5, used to sample each node's top layer.
    fn level_scale(&self) -> f32 {
        1.0 / (self.config.m as f32).ln()
    }

    fn sample_level(&self, rng: &mut SmallRng) -> usize {
        let u: f32 = rng.gen_range(f32::EPSILON..1.0);
        (-u.ln() * self.level_scale()).floor() as usize
    }

    fn m_at(&self, layer: usize) -> usize {
        if layer == 0 {
            self.config.m * 2
        } else {
            self.config.m
        }
    }

    /// Insert `vector` (owned by the store at `slot`) into the graph.
    pub fn insert(&self, slot: Slot, vector: Vec<f32>) -> Result<(), IndexError> {
        if vector.len() != self.config.dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.config.dim,
                actual: vector.len(),
            });
        }

        let mut graph = self.graph.write();
        let level = self.sample_level(&mut graph.rng);
        let node_id = graph.nodes.len() as NodeId;
        graph.nodes.push(Some(Node {
            slot,
            vector: vector.clone(),
            layers: vec![Vec::new(); level + 1],
        }));
        graph.slot_to_node.insert(slot, node_id);

        let Some(entry_point) = graph.entry_point else {
            graph.entry_point = Some(node_id);
            graph.max_layer = level;
            return Ok(());
        };

        let max_layer = graph.max_layer;
        let mut cur = entry_point;
        for layer in (level + 1..=max_layer).rev() {
            cur = Self::greedy_descend(&graph, cur, &vector, layer);
        }

        for layer in (0..=level.min(max_layer)).rev() {
            let candidates = Self::search_layer(&graph, cur, &vector, layer, self.config.ef_construction);
            let neighbors = select_closest(&graph, &vector, &candidates, self.m_at(layer));
            for &neighbor in &neighbors {
                connect(&mut graph, node_id, neighbor, layer);
                connect(&mut graph, neighbor, node_id, layer);
                trim_neighbors(&mut graph, neighbor, layer, self.m_at(layer));
            }
            if let Some(&(best, _)) = candidates.first() {
                cur = best;
            }
        }

        if level > max_layer {
            graph.entry_point = Some(node_id);
            graph.max_layer = level;
        }

        Ok(())
    }

    /// Approximate k-NN search. Returns `(slot, similarity)` pairs sorted by
    /// descending similarity, ties broken by lower node id for determinism.
    /// An empty index yields an empty result, not an error (§4.5).
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(Slot, f32)>, IndexError> {
        if query.len() != self.config.dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.config.dim,
                actual: query.len(),
            });
        }

        let graph = self.graph.read();
        let Some(entry_point) = graph.entry_point else {
            return Ok(Vec::new());
        };

        let mut cur = entry_point;
        for layer in (1..=graph.max_layer).rev() {
            cur = Self::greedy_descend(&graph, cur, query, layer);
        }

        let mut candidates = Self::search_layer(&graph, cur, query, 0, self.config.ef_search);
        candidates.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        candidates.truncate(k);

        Ok(candidates
            .into_iter()
            .filter_map(|(node_id, sim)| {
                graph.nodes[node_id as usize]
                    .as_ref()
                    .map(|n| (n.slot, sim))
            })
            .collect())
    }

    /// Remove the node holding `slot`, unlinking it from every neighbor list
    /// it appears in (§4.5 "Delete").
    pub fn delete(&self, slot: Slot) {
        let mut graph = self.graph.write();
        let Some(node_id) = graph.slot_to_node.remove(&slot) else {
            return;
        };
        let layers = graph.nodes[node_id as usize]
            .as_ref()
            .map(|n| n.layers.clone())
            .unwrap_or_default();
        for (layer, neighbors) in layers.iter().enumerate() {
            for &neighbor in neighbors {
                if let Some(Some(n)) = graph.nodes.get_mut(neighbor as usize) {
                    if let Some(list) = n.layers.get_mut(layer) {
                        list.retain(|&id| id != node_id);
                    }
                }
            }
        }
        graph.nodes[node_id as usize] = None;

        if graph.entry_point == Some(node_id) {
            let replacement = graph
                .nodes
                .iter()
                .enumerate()
                .filter_map(|(id, n)| n.as_ref().map(|n| (id as NodeId, n.layers.len() - 1)))
                .max_by_key(|&(_, layer)| layer);
            match replacement {
                Some((id, layer)) => {
                    graph.entry_point = Some(id);
                    graph.max_layer = layer;
                }
                None => {
                    graph.entry_point = None;
                    graph.max_layer = 0;
                }
            }
        }
    }

    /// Greedy beam-width-1 descent: repeatedly move to the closest unvisited
    /// neighbor of `cur` at `layer` until no closer neighbor exists.
    fn greedy_descend(graph: &Graph, mut cur: NodeId, query: &[f32], layer: usize) -> NodeId {
        loop {
            let cur_sim = similarity(&graph.nodes[cur as usize].as_ref().unwrap().vector, query);
            let mut improved = None;
            if let Some(node) = graph.nodes[cur as usize].as_ref() {
                if let Some(neighbors) = node.layers.get(layer) {
                    for &n in neighbors {
                        if let Some(neighbor_node) = graph.nodes[n as usize].as_ref() {
                            let sim = similarity(&neighbor_node.vector, query);
                            if sim > cur_sim {
                                improved = Some(n);
                            }
                        }
                    }
                }
            }
            match improved {
                Some(next) => cur = next,
                None => return cur,
            }
        }
    }

    /// Beam search at `layer` starting from `entry`, keeping up to `ef`
    /// candidates. Returns `(node_id, similarity)` pairs, unsorted.
    fn search_layer(
        graph: &Graph,
        entry: NodeId,
        query: &[f32],
        layer: usize,
        ef: usize,
    ) -> Vec<(NodeId, f32)> {
        let mut visited = HashSet::new();
        visited.insert(entry);
        let entry_sim = similarity(&graph.nodes[entry as usize].as_ref().unwrap().vector, query);
        let mut candidates = vec![(entry, entry_sim)];
        let mut found = vec![(entry, entry_sim)];

        while let Some(&(c, c_sim)) = candidates
            .iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        {
            candidates.retain(|&(id, _)| id != c);
            let worst_found = found
                .iter()
                .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|&(_, s)| s)
                .unwrap_or(f32::NEG_INFINITY);
            if c_sim < worst_found && found.len() >= ef {
                break;
            }

            let neighbors = graph.nodes[c as usize]
                .as_ref()
                .and_then(|n| n.layers.get(layer).cloned())
                .unwrap_or_default();
            for neighbor in neighbors {
                if !visited.insert(neighbor) {
                    continue;
                }
                let Some(neighbor_node) = graph.nodes[neighbor as usize].as_ref() else {
                    continue;
                };
                let sim = similarity(&neighbor_node.vector, query);
                let worst_found = found
                    .iter()
                    .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                    .map(|&(_, s)| s)
                    .unwrap_or(f32::NEG_INFINITY);
                if sim > worst_found || found.len() < ef {
                    candidates.push((neighbor, sim));
                    found.push((neighbor, sim));
                    if found.len() > ef {
                        if let Some((idx, _)) = found
                            .iter()
                            .enumerate()
                            .min_by(|a, b| a.1 .1.partial_cmp(&b.1 .1).unwrap_or(std::cmp::Ordering::Equal))
                        {
                            found.remove(idx);
                        }
                    }
                }
            }
        }

        found
    }
}

/// Cosine similarity; equals the dot product since every embedding is
/// L2-normalized at insert time.
fn similarity(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Neighbor-selection heuristic: the `m` closest candidates by similarity
/// (the "simple" variant named in §4.5; extend-candidates/keep-pruned is not
/// implemented — see DESIGN.md).
fn select_closest(_graph: &Graph, _query: &[f32], candidates: &[(NodeId, f32)], m: usize) -> Vec<NodeId> {
    let mut sorted = candidates.to_vec();
    sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    sorted.truncate(m);
    sorted.into_iter().map(|(id, _)| id).collect()
}

fn connect(graph: &mut Graph, from: NodeId, to: NodeId, layer: usize) {
    if let Some(Some(node)) = graph.nodes.get_mut(from as usize) {
        if let Some(list) = node.layers.get_mut(layer) {
            if !list.contains(&to) {
                list.push(to);
            }
        }
    }
}

fn trim_neighbors(graph: &mut Graph, node_id: NodeId, layer: usize, m: usize) {
    let vector = graph.nodes[node_id as usize].as_ref().unwrap().vector.clone();
    let Some(Some(node)) = graph.nodes.get(node_id as usize).map(|n| n.as_ref()) else {
        return;
    };
    if node.layers[layer].len() <= m {
        return;
    }
    let candidates: Vec<(NodeId, f32)> = node.layers[layer]
        .iter()
        .filter_map(|&id| {
            graph.nodes[id as usize]
                .as_ref()
                .map(|n| (id, similarity(&n.vector, &vector)))
        })
        .collect();
    let keep = select_closest(graph, &vector, &candidates, m);
    if let Some(Some(node)) = graph.nodes.get_mut(node_id as usize) {
        node.layers[layer] = keep;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(v: Vec<f32>) -> Vec<f32> {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.iter().map(|x| x / norm).collect()
    }

    fn config(dim: usize) -> HnswConfig {
        HnswConfig {
            dim,
            seed: Some(42),
            ..HnswConfig::default()
        }
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let index = HnswIndex::new(config(4));
        assert_eq!(
            index.insert(0, vec![1.0, 0.0]),
            Err(IndexError::DimensionMismatch { expected: 4, actual: 2 })
        );
    }

    #[test]
    fn search_on_empty_index_returns_empty_not_error() {
        let index = HnswIndex::new(config(4));
        let result = index.search(&[1.0, 0.0, 0.0, 0.0], 5).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn exact_match_is_found_with_k1() {
        let index = HnswIndex::new(config(4));
        let target = unit(vec![1.0, 2.0, 3.0, 4.0]);
        index.insert(7, target.clone()).unwrap();
        for i in 0..20u32 {
            let v = unit(vec![i as f32, 1.0, 0.0, 2.0]);
            index.insert(i + 100, v).unwrap();
        }
        let results = index.search(&target, 1).unwrap();
        assert_eq!(results[0].0, 7);
    }

    #[test]
    fn deleted_node_is_not_returned() {
        let index = HnswIndex::new(config(3));
        let target = unit(vec![1.0, 0.0, 0.0]);
        index.insert(1, target.clone()).unwrap();
        index.insert(2, unit(vec![0.0, 1.0, 0.0])).unwrap();
        index.delete(1);
        let results = index.search(&target, 5).unwrap();
        assert!(results.iter().all(|&(slot, _)| slot != 1));
    }

    #[test]
    fn recall_at_10_is_reasonable_on_small_random_set() {
        let index = HnswIndex::new(config(16));
        let mut rng = SmallRng::seed_from_u64(7);
        let mut vectors = Vec::new();
        for i in 0..300u32 {
            let raw: Vec<f32> = (0..16).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let v = unit(raw);
            index.insert(i, v.clone()).unwrap();
            vectors.push(v);
        }
        let query = vectors[0].clone();
        let approx = index.search(&query, 10).unwrap();
        assert!(approx.iter().any(|&(slot, _)| slot == 0));
    }
}
