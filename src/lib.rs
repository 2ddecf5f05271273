//! Engram: a persistent, content-addressed knowledge graph for semantic
//! retrieval and probabilistic reasoning.
//!
//! Text is split into deduplicated, hash-identified chunks (C3), sealed
//! under a Merkle root (C4), indexed as "neurons" in a vector space (C6)
//! and linked by typed "synapses" (C5). The [`manager::GraphManager`]
//! façade (C8) binds storage and indexing together; the
//! [`inference::InferenceEngine`] (C9) and [`attractor::AttractorModel`]
//! (C10) read through it to perform bidirectional inference and
//! goal-directed path search.
//!
//! Command-line surfaces, formatters, metrics export, and external
//! database connectors are explicitly out of scope (`spec.md` §1); this
//! crate exposes only the storage-and-indexing engine plus the inference
//! subsystem built on top of it.

pub mod attractor;
pub mod chunk;
pub mod chunker;
pub mod compaction;
pub mod config;
pub mod connector;
pub mod embedding;
pub mod error;
pub mod events;
pub mod graph;
pub mod hash;
pub mod index;
pub mod inference;
pub mod manager;
pub mod merkle;
pub mod queue;
pub mod vector;

pub use attractor::{Attractor, AttractorModel, AttractorParams, AttractorPath, AttractorStats};
pub use config::EngramConfig;
pub use error::{EngramError, Result};
pub use graph::types::{Neuron, NeuronMetadata, Synapse, SynapseType};
pub use inference::{CausalChain, Direction, InferOptions, Inference, InferenceEngine};
pub use manager::GraphManager;
