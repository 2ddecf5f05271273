//! Core graph data types (`spec.md` §3).

use crate::hash::Hash;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

/// Typed weighted edge between two neurons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SynapseType {
    Causal,
    Temporal,
    Similar,
    Associative,
    Other(SynapseTypeTag),
}

/// Placeholder discriminant for `SynapseType::Other`, kept as a small
/// interned-style marker rather than a free-form string so the type stays
/// `Copy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SynapseTypeTag(pub u8);

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NeuronMetadata {
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
    pub source_type: String,
    pub tags: HashSet<String>,
}

impl NeuronMetadata {
    pub fn new(source_type: impl Into<String>, tags: HashSet<String>) -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            last_accessed: now,
            access_count: 0,
            source_type: source_type.into(),
            tags,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Neuron {
    pub id: Uuid,
    pub embedding: Vec<f32>,
    pub chunk_hashes: Vec<Hash>,
    pub merkle_root: Hash,
    pub metadata: NeuronMetadata,
    pub outgoing_synapses: HashSet<Uuid>,
    pub incoming_synapses: HashSet<Uuid>,
}

impl Neuron {
    pub fn new(
        embedding: Vec<f32>,
        chunk_hashes: Vec<Hash>,
        merkle_root: Hash,
        metadata: NeuronMetadata,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            embedding,
            chunk_hashes,
            merkle_root,
            metadata,
            outgoing_synapses: HashSet::new(),
            incoming_synapses: HashSet::new(),
        }
    }

    /// Record an access, bumping `accessCount` and `lastAccessed`
    /// monotonically (`spec.md` I5).
    pub fn touch(&mut self) {
        self.metadata.access_count += 1;
        self.metadata.last_accessed = Utc::now();
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Synapse {
    pub id: Uuid,
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub synapse_type: SynapseType,
    pub weight: f32,
    pub bidirectional: bool,
    pub created_at: DateTime<Utc>,
}

impl Synapse {
    pub fn new(source_id: Uuid, target_id: Uuid, synapse_type: SynapseType, weight: f32) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id,
            target_id,
            synapse_type,
            weight,
            bidirectional: false,
            created_at: Utc::now(),
        }
    }
}
