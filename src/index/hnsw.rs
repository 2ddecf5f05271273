//! HNSW approximate nearest-neighbor index (C6).
//!
//! Multi-layer navigable small-world graph over neuron embeddings, built the
//! standard way: each inserted node draws a random top layer from
//! `floor(-ln(U) * mL)`, is greedily connected to its `M` (or `2M` at layer
//! 0) nearest neighbors found via a bounded candidate search, and neighbor
//! lists are pruned back down to that bound by keeping the closest. Deletes
//! are soft: a tombstoned node stays linked so the graph's connectivity
//! survives until [`HnswIndex::compact`] physically removes it. Readers
//! (`search`) share a `tokio::sync::RwLock` read guard; writers
//! (`insert`/`delete`/`compact`) take it exclusively, matching the random
//! seeding convention used for index construction elsewhere in the
//! retrieval stack this crate draws from.

use crate::config::HnswConfig;
use crate::vector::cosine_distance;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Node {
    embedding: Vec<f32>,
    level: usize,
    neighbors: Vec<Vec<Uuid>>,
    tombstoned: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    id: Uuid,
    distance: f32,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Inner {
    nodes: HashMap<Uuid, Node>,
    entry_point: Option<Uuid>,
    max_level: usize,
    tombstone_count: usize,
    rng: StdRng,
}

impl Inner {
    fn random_level(&mut self, m_l: f64) -> usize {
        let u: f64 = self.rng.gen::<f64>().max(1e-12);
        (-u.ln() * m_l).floor() as usize
    }
}

/// In-memory approximate nearest-neighbor index over cosine similarity.
pub struct HnswIndex {
    inner: RwLock<Inner>,
    m: usize,
    ef_construction: usize,
    ef_search: usize,
    m_l: f64,
}

fn search_layer(
    nodes: &HashMap<Uuid, Node>,
    query: &[f32],
    entry_points: &[Uuid],
    ef: usize,
    layer: usize,
) -> Vec<Candidate> {
    let mut visited: HashSet<Uuid> = entry_points.iter().copied().collect();
    let mut candidates: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
    let mut result: BinaryHeap<Candidate> = BinaryHeap::new();

    for &ep in entry_points {
        if let Some(node) = nodes.get(&ep) {
            let d = cosine_distance(query, &node.embedding).unwrap_or(1.0);
            candidates.push(Reverse(Candidate { id: ep, distance: d }));
            result.push(Candidate { id: ep, distance: d });
        }
    }

    while let Some(Reverse(current)) = candidates.pop() {
        let worst = result.peek().map(|c| c.distance).unwrap_or(f32::INFINITY);
        if current.distance > worst && result.len() >= ef {
            break;
        }

        let Some(node) = nodes.get(&current.id) else {
            continue;
        };
        let Some(layer_neighbors) = node.neighbors.get(layer) else {
            continue;
        };

        for &neighbor_id in layer_neighbors {
            if !visited.insert(neighbor_id) {
                continue;
            }
            let Some(neighbor) = nodes.get(&neighbor_id) else {
                continue;
            };
            let d = cosine_distance(query, &neighbor.embedding).unwrap_or(1.0);
            let worst = result.peek().map(|c| c.distance).unwrap_or(f32::INFINITY);
            if result.len() < ef || d < worst {
                candidates.push(Reverse(Candidate {
                    id: neighbor_id,
                    distance: d,
                }));
                result.push(Candidate {
                    id: neighbor_id,
                    distance: d,
                });
                if result.len() > ef {
                    result.pop();
                }
            }
        }
    }

    let mut out: Vec<Candidate> = result.into_vec();
    out.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));
    out
}

fn prune_neighbors(nodes: &mut HashMap<Uuid, Node>, id: Uuid, layer: usize, m_max: usize) {
    let Some(embedding) = nodes.get(&id).map(|n| n.embedding.clone()) else {
        return;
    };
    let Some(node) = nodes.get_mut(&id) else {
        return;
    };
    if node.neighbors.len() <= layer {
        node.neighbors.resize(layer + 1, Vec::new());
    }
    let mut list = std::mem::take(&mut node.neighbors[layer]);
    if list.len() > m_max {
        let mut scored: Vec<(Uuid, f32)> = list
            .iter()
            .filter_map(|nb| {
                nodes
                    .get(nb)
                    .map(|n| (*nb, cosine_distance(&embedding, &n.embedding).unwrap_or(1.0)))
            })
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        scored.truncate(m_max);
        list = scored.into_iter().map(|(id, _)| id).collect();
    }
    nodes.get_mut(&id).unwrap().neighbors[layer] = list;
}

impl HnswIndex {
    pub fn new(config: &HnswConfig) -> Self {
        Self {
            inner: RwLock::new(Inner {
                nodes: HashMap::new(),
                entry_point: None,
                max_level: 0,
                tombstone_count: 0,
                rng: StdRng::seed_from_u64(config.seed),
            }),
            m: config.m,
            ef_construction: config.ef_construction,
            ef_search: config.ef_search,
            m_l: config.m_l,
        }
    }

    /// Insert `embedding` under `id`. If `id` is already present its record
    /// is replaced and reconnected from scratch.
    pub async fn insert(&self, id: Uuid, embedding: Vec<f32>) {
        let mut inner = self.inner.write().await;
        let level = inner.random_level(self.m_l);

        let Some(entry_point) = inner.entry_point else {
            inner.nodes.insert(
                id,
                Node {
                    embedding,
                    level,
                    neighbors: vec![Vec::new(); level + 1],
                    tombstoned: false,
                },
            );
            inner.entry_point = Some(id);
            inner.max_level = level;
            return;
        };

        let mut ep = entry_point;
        let mut ep_distance = {
            let ep_node = inner.nodes.get(&ep).expect("entry point must exist");
            cosine_distance(&embedding, &ep_node.embedding).unwrap_or(1.0)
        };

        for layer in (level + 1..=inner.max_level).rev() {
            loop {
                let neighbors = inner
                    .nodes
                    .get(&ep)
                    .and_then(|n| n.neighbors.get(layer))
                    .cloned()
                    .unwrap_or_default();
                let mut changed = false;
                for n in neighbors {
                    if let Some(node) = inner.nodes.get(&n) {
                        let d = cosine_distance(&embedding, &node.embedding).unwrap_or(1.0);
                        if d < ep_distance {
                            ep = n;
                            ep_distance = d;
                            changed = true;
                        }
                    }
                }
                if !changed {
                    break;
                }
            }
        }

        inner.nodes.insert(
            id,
            Node {
                embedding: embedding.clone(),
                level,
                neighbors: vec![Vec::new(); level + 1],
                tombstoned: false,
            },
        );

        let mut entry_points = vec![ep];
        let top_insert_layer = level.min(inner.max_level);

        for layer in (0..=top_insert_layer).rev() {
            let candidates = search_layer(&inner.nodes, &embedding, &entry_points, self.ef_construction, layer);
            let m_max = if layer == 0 { self.m * 2 } else { self.m };
            let selected: Vec<Uuid> = candidates.iter().take(m_max).map(|c| c.id).collect();

            if let Some(node) = inner.nodes.get_mut(&id) {
                node.neighbors[layer] = selected.clone();
            }
            for &nid in &selected {
                if let Some(n) = inner.nodes.get_mut(&nid) {
                    if n.neighbors.len() <= layer {
                        n.neighbors.resize(layer + 1, Vec::new());
                    }
                    n.neighbors[layer].push(id);
                }
                prune_neighbors(&mut inner.nodes, nid, layer, m_max);
            }

            entry_points = candidates.into_iter().map(|c| c.id).collect();
            if entry_points.is_empty() {
                entry_points = vec![ep];
            }
        }

        if level > inner.max_level {
            inner.max_level = level;
            inner.entry_point = Some(id);
        }
    }

    /// Return at most `k` live nodes ordered by decreasing cosine
    /// similarity. `ef` defaults to `max(k, efSearch)`.
    pub async fn search(&self, query: &[f32], k: usize, ef: Option<usize>) -> Vec<(Uuid, f32)> {
        let inner = self.inner.read().await;
        let Some(entry_point) = inner.entry_point else {
            return Vec::new();
        };
        let ef = ef.unwrap_or_else(|| k.max(self.ef_search)).max(k);

        let mut ep = entry_point;
        let mut ep_distance = {
            let ep_node = inner.nodes.get(&ep).expect("entry point must exist");
            cosine_distance(query, &ep_node.embedding).unwrap_or(1.0)
        };
        for layer in (1..=inner.max_level).rev() {
            loop {
                let neighbors = inner
                    .nodes
                    .get(&ep)
                    .and_then(|n| n.neighbors.get(layer))
                    .cloned()
                    .unwrap_or_default();
                let mut changed = false;
                for n in neighbors {
                    if let Some(node) = inner.nodes.get(&n) {
                        let d = cosine_distance(query, &node.embedding).unwrap_or(1.0);
                        if d < ep_distance {
                            ep = n;
                            ep_distance = d;
                            changed = true;
                        }
                    }
                }
                if !changed {
                    break;
                }
            }
        }

        let candidates = search_layer(&inner.nodes, query, &[ep], ef, 0);
        candidates
            .into_iter()
            .filter(|c| !inner.nodes.get(&c.id).map(|n| n.tombstoned).unwrap_or(true))
            .take(k)
            .map(|c| (c.id, 1.0 - c.distance))
            .collect()
    }

    /// Soft-delete a node. Returns whether a live node was tombstoned.
    pub async fn delete(&self, id: &Uuid) -> bool {
        let mut inner = self.inner.write().await;
        if let Some(node) = inner.nodes.get_mut(id) {
            if !node.tombstoned {
                node.tombstoned = true;
                inner.tombstone_count += 1;
                return true;
            }
        }
        false
    }

    pub async fn tombstone_count(&self) -> usize {
        self.inner.read().await.tombstone_count
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.nodes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, id: &Uuid) -> bool {
        self.inner.read().await.nodes.contains_key(id)
    }

    /// Physically remove every tombstoned node, repairing neighbor lists of
    /// survivors and reassigning the entry point if it was removed.
    pub async fn compact(&self) -> usize {
        let mut inner = self.inner.write().await;
        let tombstoned: Vec<Uuid> = inner
            .nodes
            .iter()
            .filter(|(_, n)| n.tombstoned)
            .map(|(id, _)| *id)
            .collect();
        let removed = tombstoned.len();
        if removed == 0 {
            return 0;
        }

        let removed_set: HashSet<Uuid> = tombstoned.iter().copied().collect();
        for id in &tombstoned {
            inner.nodes.remove(id);
        }
        for node in inner.nodes.values_mut() {
            for layer in node.neighbors.iter_mut() {
                layer.retain(|n| !removed_set.contains(n));
            }
        }

        if inner.entry_point.map(|ep| removed_set.contains(&ep)).unwrap_or(false) {
            let replacement = inner.nodes.iter().max_by_key(|(_, n)| n.level).map(|(id, n)| (*id, n.level));
            match replacement {
                Some((id, level)) => {
                    inner.entry_point = Some(id);
                    inner.max_level = level;
                }
                None => {
                    inner.entry_point = None;
                    inner.max_level = 0;
                }
            }
        }

        inner.tombstone_count = 0;
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HnswConfig;

    fn index() -> HnswIndex {
        HnswIndex::new(&HnswConfig {
            m: 8,
            ef_construction: 64,
            ef_search: 32,
            m_l: 1.0 / (8f64).ln(),
            seed: 42,
        })
    }

    fn basis(dim: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[axis] = 1.0;
        v
    }

    #[tokio::test]
    async fn s2_three_neuron_similarity_scenario() {
        let idx = index();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        idx.insert(a, basis(4, 0)).await;
        idx.insert(b, basis(4, 0)).await;
        idx.insert(c, basis(4, 1)).await;

        let results = idx.search(&basis(4, 0), 2, None).await;
        assert_eq!(results.len(), 2);
        let ids: HashSet<Uuid> = results.iter().map(|(id, _)| *id).collect();
        assert!(ids.contains(&b) || ids.contains(&a));
        // best match has similarity ~1.0
        assert!((results[0].1 - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn tombstoned_node_never_returned_by_search() {
        let idx = index();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        idx.insert(a, basis(4, 0)).await;
        idx.insert(b, basis(4, 0)).await;

        idx.delete(&a).await;
        let results = idx.search(&basis(4, 0), 5, None).await;
        assert!(results.iter().all(|(id, _)| *id != a));
        assert!(results.iter().any(|(id, _)| *id == b));
    }

    #[tokio::test]
    async fn search_with_k_greater_than_live_count_returns_all_live() {
        let idx = index();
        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        for (i, id) in ids.iter().enumerate() {
            idx.insert(*id, basis(4, i % 4)).await;
        }
        let results = idx.search(&basis(4, 0), 50, None).await;
        assert_eq!(results.len(), 5);
    }

    #[tokio::test]
    async fn s6_compaction_removes_tombstones_and_preserves_live_results() {
        let idx = index();
        let mut ids = Vec::new();
        for i in 0..100 {
            let id = Uuid::new_v4();
            idx.insert(id, basis(4, i % 4)).await;
            ids.push(id);
        }

        for id in ids.iter().take(60) {
            idx.delete(id).await;
        }
        assert_eq!(idx.tombstone_count().await, 60);

        let before = idx.search(&basis(4, 0), 10, None).await;
        assert_eq!(before.len(), 10);
        assert!(before.iter().all(|(id, _)| !ids[..60].contains(id)));

        let removed = idx.compact().await;
        assert_eq!(removed, 60);
        assert_eq!(idx.tombstone_count().await, 0);
        assert_eq!(idx.len().await, 40);

        let after = idx.search(&basis(4, 0), 10, None).await;
        assert_eq!(after.len(), 10);
        assert_eq!(
            before.iter().map(|(id, _)| *id).collect::<HashSet<_>>(),
            after.iter().map(|(id, _)| *id).collect::<HashSet<_>>()
        );
    }

    #[tokio::test]
    async fn compact_on_tombstone_free_index_is_a_no_op() {
        let idx = index();
        idx.insert(Uuid::new_v4(), basis(4, 0)).await;
        let removed = idx.compact().await;
        assert_eq!(removed, 0);
        assert_eq!(idx.len().await, 1);
    }
}
