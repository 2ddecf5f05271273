//! Attractor model (C10): declared goal states, influence fields over
//! neuron embeddings, time-decay, and greedy best-first path search toward
//! a chosen attractor (`spec.md` §4.10).
//!
//! State lives in-process behind a `Mutex`, matching the "process-wide
//! instance with host-managed lifecycle, handle passed to the constructor"
//! restatement in `spec.md` §9 — there is no persistence contract for
//! attractors in §6, only for neurons/synapses/chunks.

use crate::config::AttractorConfig;
use crate::error::{EngramError, Result};
use crate::events::{Event, EventBus};
use crate::graph::types::SynapseType;
use crate::manager::GraphManager;
use crate::vector::cosine;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Attractor {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub embedding: Vec<f32>,
    pub strength: f32,
    pub priority: u8,
    pub probability: f32,
    pub deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Caller-supplied fields for creating or updating an attractor.
#[derive(Debug, Clone)]
pub struct AttractorParams {
    pub strength: f32,
    pub priority: u8,
    pub probability: f32,
    pub deadline: Option<DateTime<Utc>>,
}

impl Default for AttractorParams {
    fn default() -> Self {
        Self {
            strength: 1.0,
            priority: 5,
            probability: 1.0,
            deadline: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AttractorStats {
    pub total_attractors: usize,
    pub active_attractors: usize,
    pub transitions: u64,
}

/// A goal-directed path found by [`AttractorModel::find_path_to_attractor`].
#[derive(Debug, Clone, PartialEq)]
pub struct AttractorPath {
    pub path: Vec<Uuid>,
    pub estimated_steps: usize,
    pub probability: f32,
    pub bottlenecks: Vec<Uuid>,
}

struct State {
    attractors: HashMap<Uuid, Attractor>,
    transitions: u64,
}

/// Declared-goal-state registry plus influence-field and path-search logic
/// over a [`GraphManager`]'s neuron graph.
pub struct AttractorModel<'a> {
    manager: &'a GraphManager,
    config: AttractorConfig,
    events: EventBus,
    state: Mutex<State>,
}

impl<'a> AttractorModel<'a> {
    pub fn new(manager: &'a GraphManager, config: AttractorConfig, events: EventBus) -> Self {
        Self {
            manager,
            config,
            events,
            state: Mutex::new(State {
                attractors: HashMap::new(),
                transitions: 0,
            }),
        }
    }

    pub fn create_attractor(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        embedding: Vec<f32>,
        params: AttractorParams,
    ) -> Result<Uuid> {
        if embedding.len() != self.manager.config().embedding_dim {
            return Err(EngramError::DimensionMismatch {
                expected: self.manager.config().embedding_dim,
                actual: embedding.len(),
            });
        }
        if !(0.0..=1.0).contains(&params.strength) {
            return Err(EngramError::validation("attractor strength must be in [0, 1]"));
        }
        if !(1..=10).contains(&params.priority) {
            return Err(EngramError::validation("attractor priority must be in [1, 10]"));
        }

        let attractor = Attractor {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            embedding,
            strength: params.strength,
            priority: params.priority,
            probability: params.probability,
            deadline: params.deadline,
            created_at: Utc::now(),
        };
        let id = attractor.id;

        let mut state = self.state.lock().expect("attractor state mutex poisoned");
        state.attractors.insert(id, attractor);
        drop(state);

        self.events.publish(Event::AttractorCreated(id));
        Ok(id)
    }

    pub fn update_attractor(&self, id: Uuid, params: AttractorParams) -> Result<()> {
        let mut state = self.state.lock().expect("attractor state mutex poisoned");
        let attractor = state
            .attractors
            .get_mut(&id)
            .ok_or_else(|| EngramError::validation(format!("unknown attractor {id}")))?;
        attractor.strength = params.strength;
        attractor.priority = params.priority;
        attractor.probability = params.probability;
        attractor.deadline = params.deadline;
        Ok(())
    }

    pub fn get_attractor(&self, id: &Uuid) -> Option<Attractor> {
        self.state.lock().expect("attractor state mutex poisoned").attractors.get(id).cloned()
    }

    pub fn remove_attractor(&self, id: &Uuid) -> bool {
        self.state.lock().expect("attractor state mutex poisoned").attractors.remove(id).is_some()
    }

    /// Every attractor with `strength ≥ floor`.
    pub fn get_active_attractors(&self) -> Vec<Attractor> {
        let state = self.state.lock().expect("attractor state mutex poisoned");
        let floor = self.config.floor as f32;
        state.attractors.values().filter(|a| a.strength >= floor).cloned().collect()
    }

    /// Multiply every attractor's strength by the configured per-tick decay
    /// factor, removing any that fall below the floor afterward.
    pub fn decay_attractors(&self) -> Vec<Uuid> {
        let factor = self.config.decay_factor as f32;
        let floor = self.config.floor as f32;
        let mut removed = Vec::new();

        let mut state = self.state.lock().expect("attractor state mutex poisoned");
        state.attractors.retain(|id, a| {
            a.strength *= factor;
            let keep = a.strength >= floor;
            if !keep {
                removed.push(*id);
            }
            keep
        });
        let surviving: Vec<Uuid> = state.attractors.keys().copied().collect();
        drop(state);

        for id in &surviving {
            self.events.publish(Event::AttractorDecayed(*id));
        }
        removed
    }

    /// `influence = cosine(embedding, attractor.embedding) * strength *
    /// (priority / 10)` for every active attractor; non-positive influence
    /// is omitted.
    pub fn calculate_influence(&self, embedding: &[f32]) -> Result<HashMap<Uuid, f32>> {
        let mut out = HashMap::new();
        for attractor in self.get_active_attractors() {
            let sim = cosine(embedding, &attractor.embedding).map_err(|_| EngramError::DimensionMismatch {
                expected: attractor.embedding.len(),
                actual: embedding.len(),
            })?;
            let influence = sim * attractor.strength * (attractor.priority as f32 / 10.0);
            if influence > 0.0 {
                out.insert(attractor.id, influence);
            }
        }
        Ok(out)
    }

    /// Greedy best-first search from `neuron_id` toward `attractor_id`
    /// using heuristic `h(n) = cosine(n.embedding, attractor.embedding)`.
    /// Step probability is `max(chosen outgoing synapse weight, h(next))`;
    /// path probability is the product of step probabilities. Bottlenecks
    /// are nodes whose best outgoing step probability fell below the
    /// configured threshold. `None` if no path is found within `max_depth`.
    pub async fn find_path_to_attractor(
        &self,
        neuron_id: Uuid,
        attractor_id: Uuid,
        max_depth: usize,
    ) -> Result<Option<AttractorPath>> {
        let Some(attractor) = self.get_attractor(&attractor_id) else {
            return Err(EngramError::validation(format!("unknown attractor {attractor_id}")));
        };
        let Some(start) = self.manager.get_neuron(&neuron_id)? else {
            return Ok(None);
        };

        let goal_embedding = &attractor.embedding;
        let mut current = start;
        let mut path = vec![current.id];
        let mut probability = 1.0f32;
        let mut bottlenecks = Vec::new();
        let mut visited: HashSet<Uuid> = HashSet::new();
        visited.insert(current.id);

        for _ in 0..max_depth {
            if cosine(&current.embedding, goal_embedding).unwrap_or(0.0) >= 1.0 - f32::EPSILON {
                break;
            }

            let outgoing = self.manager.neuron_store().get_outgoing_synapses(&current.id)?;
            let mut best: Option<(crate::graph::types::Neuron, f32)> = None;

            for synapse in &outgoing {
                if visited.contains(&synapse.target_id) {
                    continue;
                }
                let Some(next) = self.manager.get_neuron(&synapse.target_id)? else {
                    continue;
                };
                let h = cosine(&next.embedding, goal_embedding).unwrap_or(0.0);
                let step_probability = synapse.weight.max(h);
                if best.as_ref().map(|(_, p)| step_probability > *p).unwrap_or(true) {
                    best = Some((next, step_probability));
                }
            }

            let Some((next, step_probability)) = best else {
                return Ok(None);
            };

            if step_probability < self.config.bottleneck_threshold as f32 {
                bottlenecks.push(current.id);
            }

            probability *= step_probability;
            path.push(next.id);
            visited.insert(next.id);
            current = next;
        }

        if path.len() < 2 {
            return Ok(None);
        }

        self.state.lock().expect("attractor state mutex poisoned").transitions += 1;
        self.events.publish(Event::AttractorActivated(attractor_id));

        Ok(Some(AttractorPath {
            estimated_steps: path.len() - 1,
            path,
            probability,
            bottlenecks,
        }))
    }

    pub fn get_stats(&self) -> AttractorStats {
        let state = self.state.lock().expect("attractor state mutex poisoned");
        let floor = self.config.floor as f32;
        AttractorStats {
            total_attractors: state.attractors.len(),
            active_attractors: state.attractors.values().filter(|a| a.strength >= floor).count(),
            transitions: state.transitions,
        }
    }
}
