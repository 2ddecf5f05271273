//! Bidirectional inference engine (C9): forward deduction, backward
//! abduction, causal-chain search and the combined `infer` entry point,
//! layered over the graph manager (C8) and neuron/synapse store (C5).
//!
//! BFS over typed, weighted synapses with multiplicative path confidence
//! follows `spec.md` §4.9: cycles are pruned with a visited set keyed on
//! neuron id, zero-weight edges are skipped, and when several paths reach
//! the same target the maximum confidence wins.

use crate::config::InferenceConfig;
use crate::error::Result;
use crate::graph::types::SynapseType;
use crate::manager::GraphManager;
use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

/// Which direction(s) `infer` should traverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
    Both,
}

/// Caller-tunable knobs for a single `infer` call, layered on top of the
/// crate-wide [`InferenceConfig`] defaults.
#[derive(Debug, Clone, Copy)]
pub struct InferOptions {
    pub direction: Direction,
    pub max_depth: usize,
    pub similarity_k: usize,
}

impl Default for InferOptions {
    fn default() -> Self {
        Self {
            direction: Direction::Both,
            max_depth: 3,
            similarity_k: 5,
        }
    }
}

/// One inferred conclusion: a neuron reached by some combination of
/// synapse traversal and/or embedding similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct Inference {
    pub neuron_id: Uuid,
    pub confidence: f32,
    pub path: Vec<Uuid>,
    pub explanation: String,
}

/// A bidirectional best-first chain linking two named neurons over causal
/// (and optionally temporal) edges.
#[derive(Debug, Clone, PartialEq)]
pub struct CausalChain {
    pub path: Vec<Uuid>,
    pub links: Vec<CausalLink>,
    pub strength: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CausalLink {
    pub from: Uuid,
    pub to: Uuid,
    pub strength: f32,
}

/// Bidirectional inference engine: stateless beyond its configuration,
/// reads through a [`GraphManager`] on every call.
pub struct InferenceEngine<'a> {
    manager: &'a GraphManager,
    config: InferenceConfig,
}

impl<'a> InferenceEngine<'a> {
    pub fn new(manager: &'a GraphManager, config: InferenceConfig) -> Self {
        Self { manager, config }
    }

    /// Forward (deductive) traversal over outgoing synapses from `source`,
    /// augmented with k-NN similar neurons of `source`'s own embedding.
    /// Sorted by descending confidence.
    pub async fn forward_infer(&self, source: Uuid, max_depth: usize) -> Result<Vec<Inference>> {
        self.forward_infer_with_k(source, max_depth, InferOptions::default().similarity_k).await
    }

    /// As [`InferenceEngine::forward_infer`], but with the similarity
    /// augmentation's k-NN breadth set explicitly (used by [`Self::infer`]
    /// to honor `InferOptions::similarity_k`).
    async fn forward_infer_with_k(&self, source: Uuid, max_depth: usize, similarity_k: usize) -> Result<Vec<Inference>> {
        let mut out = self.traverse(source, max_depth, TraversalDirection::Outgoing).await?;
        self.augment_with_similarity(source, similarity_k, &mut out).await?;
        out.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
        Ok(out)
    }

    /// Backward (abductive) traversal over incoming synapses from `target`,
    /// toward candidate causes. Every edge contribution is scaled by the
    /// configured abduction penalty (spec default 0.8) to reflect that
    /// abductive inference is weaker than deductive.
    pub async fn backward_infer(&self, target: Uuid, max_depth: usize) -> Result<Vec<Inference>> {
        let mut out = self.traverse(target, max_depth, TraversalDirection::Incoming).await?;
        let penalty = self.config.abduction_penalty as f32;
        for inf in &mut out {
            inf.confidence *= penalty;
            inf.explanation = format!("{} (abduction penalty {penalty})", inf.explanation);
        }
        out.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
        Ok(out)
    }

    /// Run forward and/or backward per `options.direction` and concatenate
    /// the results, each still sorted by descending confidence within its
    /// own direction.
    pub async fn infer(&self, source: Uuid, options: InferOptions) -> Result<Vec<Inference>> {
        let mut out = Vec::new();
        if matches!(options.direction, Direction::Forward | Direction::Both) {
            out.extend(self.forward_infer_with_k(source, options.max_depth, options.similarity_k).await?);
        }
        if matches!(options.direction, Direction::Backward | Direction::Both) {
            out.extend(self.backward_infer(source, options.max_depth).await?);
        }
        Ok(out)
    }

    /// Bidirectional best-first search for a causal (optionally +temporal)
    /// chain between `from` and `to`, bounded by `max_depth` hops from each
    /// side. `None` if no chain exists within budget.
    pub async fn causal_chain(
        &self,
        from: Uuid,
        to: Uuid,
        max_depth: usize,
        allow_temporal: bool,
    ) -> Result<Option<CausalChain>> {
        if from == to {
            return Ok(Some(CausalChain {
                path: vec![from],
                links: vec![],
                strength: 1.0,
            }));
        }

        // Forward frontier from `from`, backward frontier from `to`; meet
        // in the middle. Each frontier tracks the best path found to each
        // visited neuron so far (by hop count, ties broken by strength).
        let mut forward: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        forward.insert(from, vec![from]);
        let mut backward: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        backward.insert(to, vec![to]);

        let mut frontier_f = VecDeque::from([from]);
        let mut frontier_b = VecDeque::from([to]);

        for _ in 0..max_depth {
            if let Some(meet) = self
                .expand_causal_frontier(&mut frontier_f, &mut forward, TraversalDirection::Outgoing, allow_temporal, &backward)
                .await?
            {
                return self.stitch_causal_chain(&forward, &backward, meet).await;
            }
            if let Some(meet) = self
                .expand_causal_frontier(&mut frontier_b, &mut backward, TraversalDirection::Incoming, allow_temporal, &forward)
                .await?
            {
                return self.stitch_causal_chain(&forward, &backward, meet).await;
            }
            if frontier_f.is_empty() && frontier_b.is_empty() {
                break;
            }
        }

        Ok(None)
    }

    async fn expand_causal_frontier(
        &self,
        frontier: &mut VecDeque<Uuid>,
        visited: &mut HashMap<Uuid, Vec<Uuid>>,
        direction: TraversalDirection,
        allow_temporal: bool,
        other_side: &HashMap<Uuid, Vec<Uuid>>,
    ) -> Result<Option<Uuid>> {
        let level_size = frontier.len();
        for _ in 0..level_size {
            let Some(current) = frontier.pop_front() else { break };
            let path = visited.get(&current).cloned().unwrap_or_default();
            for (next, synapse_type, weight) in self.causal_neighbors(current, direction, allow_temporal).await? {
                if weight <= 0.0 || visited.contains_key(&next) {
                    continue;
                }
                let _ = synapse_type;
                let mut new_path = path.clone();
                new_path.push(next);
                visited.insert(next, new_path);
                if other_side.contains_key(&next) {
                    return Ok(Some(next));
                }
                frontier.push_back(next);
            }
        }
        Ok(None)
    }

    async fn causal_neighbors(
        &self,
        id: Uuid,
        direction: TraversalDirection,
        allow_temporal: bool,
    ) -> Result<Vec<(Uuid, SynapseType, f32)>> {
        let synapses = match direction {
            TraversalDirection::Outgoing => self.manager.neuron_store().get_outgoing_synapses(&id)?,
            TraversalDirection::Incoming => self.manager.neuron_store().get_incoming_synapses(&id)?,
        };
        Ok(synapses
            .into_iter()
            .filter(|s| matches!(s.synapse_type, SynapseType::Causal) || (allow_temporal && matches!(s.synapse_type, SynapseType::Temporal)))
            .map(|s| {
                let other = match direction {
                    TraversalDirection::Outgoing => s.target_id,
                    TraversalDirection::Incoming => s.source_id,
                };
                (other, s.synapse_type, s.weight)
            })
            .collect())
    }

    async fn stitch_causal_chain(
        &self,
        forward: &HashMap<Uuid, Vec<Uuid>>,
        backward: &HashMap<Uuid, Vec<Uuid>>,
        meet: Uuid,
    ) -> Result<Option<CausalChain>> {
        let Some(fwd_path) = forward.get(&meet) else { return Ok(None) };
        let Some(bwd_path) = backward.get(&meet) else { return Ok(None) };

        let mut path = fwd_path.clone();
        let mut rest: Vec<Uuid> = bwd_path.iter().rev().skip(1).copied().collect();
        path.append(&mut rest);

        let mut links = Vec::with_capacity(path.len().saturating_sub(1));
        let mut strength = 1.0f32;
        for window in path.windows(2) {
            let (a, b) = (window[0], window[1]);
            let weight = self
                .manager
                .neuron_store()
                .get_outgoing_synapses(&a)?
                .into_iter()
                .filter(|s| s.target_id == b && matches!(s.synapse_type, SynapseType::Causal | SynapseType::Temporal))
                .map(|s| s.weight)
                .fold(0.0f32, f32::max);
            strength *= weight;
            links.push(CausalLink { from: a, to: b, strength: weight });
        }

        Ok(Some(CausalChain { path, links, strength }))
    }

    /// Shared BFS body for `forward_infer`/`backward_infer`: breadth-first
    /// from `source`, multiplicative path confidence, max-kept on ties,
    /// cycles pruned by a visited set.
    async fn traverse(&self, source: Uuid, max_depth: usize, direction: TraversalDirection) -> Result<Vec<Inference>> {
        let mut best: HashMap<Uuid, (f32, Vec<Uuid>)> = HashMap::new();
        let mut visited: HashSet<Uuid> = HashSet::new();
        visited.insert(source);

        let mut frontier: VecDeque<(Uuid, f32, Vec<Uuid>)> = VecDeque::new();
        frontier.push_back((source, 1.0, vec![source]));

        for _ in 0..max_depth {
            let level_size = frontier.len();
            if level_size == 0 {
                break;
            }
            for _ in 0..level_size {
                let Some((current, confidence, path)) = frontier.pop_front() else { break };
                let synapses = match direction {
                    TraversalDirection::Outgoing => self.manager.neuron_store().get_outgoing_synapses(&current)?,
                    TraversalDirection::Incoming => self.manager.neuron_store().get_incoming_synapses(&current)?,
                };
                for synapse in synapses {
                    if synapse.weight <= 0.0 {
                        continue;
                    }
                    let next = match direction {
                        TraversalDirection::Outgoing => synapse.target_id,
                        TraversalDirection::Incoming => synapse.source_id,
                    };
                    if next == source {
                        continue;
                    }
                    let edge_weight = self.config.synapse_type_weights.weight_for(&synapse.synapse_type) as f32;
                    let next_confidence = confidence * synapse.weight * edge_weight;
                    let mut next_path = path.clone();
                    next_path.push(next);

                    // Multiple paths to the same target keep the max
                    // confidence; the node is only ever expanded once
                    // (first discovery), which is what prunes cycles.
                    let is_better = best.get(&next).map(|(c, _)| next_confidence > *c).unwrap_or(true);
                    if is_better {
                        best.insert(next, (next_confidence, next_path.clone()));
                    }
                    if visited.insert(next) {
                        frontier.push_back((next, next_confidence, next_path));
                    }
                }
            }
        }

        Ok(best
            .into_iter()
            .map(|(neuron_id, (confidence, path))| {
                let explanation = format!("reached via {} hop(s) with path confidence {confidence:.4}", path.len().saturating_sub(1));
                Inference { neuron_id, confidence, path, explanation }
            })
            .collect())
    }

    /// Augments `out` with k-NN similar neurons of `source`'s own
    /// embedding, each scored `similarity * similarity_mode_weight`. A
    /// no-op if `source` has no embedding to search with (an empty vector
    /// placeholder never occurs for a valid neuron, but the lookup itself
    /// may legitimately miss).
    async fn augment_with_similarity(&self, source: Uuid, similarity_k: usize, out: &mut Vec<Inference>) -> Result<()> {
        let Some(neuron) = self.manager.get_neuron(&source)? else {
            return Ok(());
        };
        let similar = self.manager.find_similar(&neuron.embedding, similarity_k, None).await?;
        let weight = self.config.similarity_mode_weight as f32;
        for (candidate, similarity) in similar {
            if candidate.id == source {
                continue;
            }
            out.push(Inference {
                neuron_id: candidate.id,
                confidence: similarity * weight,
                path: vec![source, candidate.id],
                explanation: format!("similarity {similarity:.4} (similarity-mode weight {weight})"),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TraversalDirection {
    Outgoing,
    Incoming,
}
