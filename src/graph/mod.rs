//! Neuron/synapse graph store (C5).

pub mod store;
pub mod types;

pub use store::NeuronStore;
pub use types::{Neuron, NeuronMetadata, Synapse, SynapseType};
