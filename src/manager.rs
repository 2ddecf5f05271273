//! Graph manager (C8): façade binding the chunk store, neuron/synapse
//! store, HNSW index and compaction scheduler, enforcing the invariants
//! that span all four on every mutation.

use crate::chunk::{Chunk, ChunkStore};
use crate::chunker;
use crate::compaction::{Compactable, CompactionScheduler};
use crate::config::EngramConfig;
use crate::embedding::{embed_with_timeout, EmbeddingProvider};
use crate::error::{EngramError, Result};
use crate::events::{Event, EventBus};
use crate::graph::{Neuron, NeuronMetadata, NeuronStore, Synapse, SynapseType};
use crate::index::HnswIndex;
use crate::merkle;
use crate::queue::SerialQueue;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

const EMBEDDING_TIMEOUT: Duration = Duration::from_secs(10);
/// Default upper bound on a single chunk's byte length.
pub const DEFAULT_MAX_CHUNK_LEN: usize = 2048;

pub struct GraphManager {
    config: EngramConfig,
    chunks: ChunkStore,
    neurons: NeuronStore,
    index: Arc<HnswIndex>,
    compaction: Arc<CompactionScheduler>,
    embedder: Arc<dyn EmbeddingProvider>,
    events: EventBus,
}

impl GraphManager {
    pub fn new(config: EngramConfig, embedder: Arc<dyn EmbeddingProvider>, events: EventBus) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let queue = Arc::new(SerialQueue::new(config.serial_queue_max_pending));
        let chunks = ChunkStore::open(&config.data_dir)?;
        let neurons = NeuronStore::open(&config.data_dir, queue)?;
        let index = Arc::new(HnswIndex::new(&config.hnsw));
        let stores: Vec<Arc<dyn Compactable>> = vec![Arc::new(chunks.clone())];
        let compaction = CompactionScheduler::new(index.clone(), stores, config.compaction.clone());

        Ok(Self {
            config,
            chunks,
            neurons,
            index,
            compaction,
            embedder,
            events,
        })
    }

    /// Rebuild the HNSW index from the live neuron set. Called on startup:
    /// the index is a cache whose authority is the neuron store
    /// (`spec.md` §9).
    pub async fn rebuild_index(&self) -> Result<usize> {
        let mut count = 0;
        for id in self.neurons.get_all_neuron_ids()? {
            if let Some(neuron) = self.neurons.get_neuron(&id)? {
                self.index.insert(neuron.id, neuron.embedding).await;
                count += 1;
            }
        }
        info!(count, "graph manager: rebuilt HNSW index from neuron store");
        Ok(count)
    }

    /// Embed, chunk, seal with a Merkle root, and insert `text` as a new
    /// neuron. Returns the new neuron's id.
    pub async fn insert_text(
        &self,
        text: &str,
        source_type: impl Into<String>,
        tags: HashSet<String>,
    ) -> Result<Uuid> {
        let embedding = embed_with_timeout(self.embedder.as_ref(), text, EMBEDDING_TIMEOUT).await?;
        if embedding.len() != self.config.embedding_dim {
            return Err(EngramError::DimensionMismatch {
                expected: self.config.embedding_dim,
                actual: embedding.len(),
            });
        }

        let chunks = chunker::split(text, DEFAULT_MAX_CHUNK_LEN);
        let mut hashes = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            hashes.push(self.chunks.put(chunk).await?);
        }

        let root = merkle::build_tree(&hashes).root();
        let neuron = Neuron::new(embedding, hashes, root, NeuronMetadata::new(source_type, tags));

        self.neurons.put_neuron(&neuron)?;
        self.index.insert(neuron.id, neuron.embedding.clone()).await;
        self.events.publish(Event::NeuronCreated(neuron.id));

        Ok(neuron.id)
    }

    /// Insert an already-chunked neuron (bypassing the chunker, e.g. for
    /// content that arrived pre-split).
    pub async fn insert_chunks(
        &self,
        chunks: &[Chunk],
        embedding: Vec<f32>,
        source_type: impl Into<String>,
        tags: HashSet<String>,
    ) -> Result<Uuid> {
        if embedding.len() != self.config.embedding_dim {
            return Err(EngramError::DimensionMismatch {
                expected: self.config.embedding_dim,
                actual: embedding.len(),
            });
        }

        let mut hashes = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            hashes.push(self.chunks.put(chunk).await?);
        }

        let root = merkle::build_tree(&hashes).root();
        let neuron = Neuron::new(embedding, hashes, root, NeuronMetadata::new(source_type, tags));

        self.neurons.put_neuron(&neuron)?;
        self.index.insert(neuron.id, neuron.embedding.clone()).await;
        self.events.publish(Event::NeuronCreated(neuron.id));

        Ok(neuron.id)
    }

    pub fn get_neuron(&self, id: &Uuid) -> Result<Option<Neuron>> {
        self.neurons.get_neuron(id)
    }

    /// Tombstone in the index, remove from the neuron store, decrement
    /// chunk refcounts, and nudge the compaction scheduler.
    pub async fn delete_neuron(&self, id: Uuid) -> Result<bool> {
        self.index.delete(&id).await;
        let removed = self.neurons.remove_neuron(id).await?;

        let Some(neuron) = removed else {
            return Ok(false);
        };

        for hash in &neuron.chunk_hashes {
            if let Err(e) = self.chunks.delete(hash).await {
                warn!(error = %e, hash = %hash, "graph manager: failed to decrement chunk refcount on neuron delete");
            }
        }

        self.compaction.maybe_compact().await;
        self.events.publish(Event::NeuronDeleted(id));
        Ok(true)
    }

    /// k-NN search, resolved through the neuron store. Ids the index
    /// returns but the store no longer has (stale cache) are dropped
    /// rather than surfaced as an error.
    pub async fn find_similar(&self, query: &[f32], k: usize, ef: Option<usize>) -> Result<Vec<(Neuron, f32)>> {
        let hits = self.index.search(query, k, ef).await;
        let mut out = Vec::with_capacity(hits.len());
        for (id, similarity) in hits {
            if let Some(neuron) = self.neurons.get_neuron(&id)? {
                out.push((neuron, similarity));
            }
        }
        Ok(out)
    }

    pub async fn add_synapse(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        synapse_type: SynapseType,
        weight: f32,
    ) -> Result<Uuid> {
        let synapse = Synapse::new(source_id, target_id, synapse_type, weight);
        let id = synapse.id;
        self.neurons.add_synapse(synapse).await?;
        self.events.publish(Event::SynapseFormed(id));
        Ok(id)
    }

    pub async fn remove_synapse(&self, source_id: Uuid, synapse_id: Uuid) -> Result<()> {
        self.neurons.remove_synapse(source_id, synapse_id).await?;
        self.events.publish(Event::SynapseRemoved(synapse_id));
        Ok(())
    }

    pub fn neuron_store(&self) -> &NeuronStore {
        &self.neurons
    }

    pub fn chunk_store(&self) -> &ChunkStore {
        &self.chunks
    }

    pub fn index(&self) -> &Arc<HnswIndex> {
        &self.index
    }

    pub fn compaction(&self) -> &Arc<CompactionScheduler> {
        &self.compaction
    }

    pub fn config(&self) -> &EngramConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::StubEmbedder;

    fn manager(dim: usize) -> (tempfile::TempDir, GraphManager) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngramConfig::default();
        config.data_dir = dir.path().to_path_buf();
        config.embedding_dim = dim;
        let mgr = GraphManager::new(config, Arc::new(StubEmbedder::new(dim)), EventBus::new(16)).unwrap();
        (dir, mgr)
    }

    #[tokio::test]
    async fn insert_text_then_find_similar() {
        let (_dir, mgr) = manager(16);
        let id = mgr.insert_text("the quick brown fox", "doc", HashSet::new()).await.unwrap();

        let neuron = mgr.get_neuron(&id).unwrap().unwrap();
        let results = mgr.find_similar(&neuron.embedding, 1, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.id, id);
        assert!((results[0].1 - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn insert_with_wrong_dimension_embedding_is_rejected() {
        let (_dir, mgr) = manager(16);
        let err = mgr
            .insert_chunks(&[], vec![0.0; 4], "doc", HashSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngramError::DimensionMismatch { expected: 16, actual: 4 }));
    }

    #[tokio::test]
    async fn delete_neuron_removes_it_and_decrements_chunk_refcounts() {
        let (_dir, mgr) = manager(16);
        let id = mgr.insert_text("shared content here", "doc", HashSet::new()).await.unwrap();
        let neuron = mgr.get_neuron(&id).unwrap().unwrap();
        let hash = neuron.chunk_hashes[0];

        assert!(mgr.delete_neuron(id).await.unwrap());
        assert!(mgr.get_neuron(&id).unwrap().is_none());
        assert!(!mgr.chunk_store().has(&hash).unwrap());
    }

    #[tokio::test]
    async fn find_similar_drops_stale_index_entries() {
        let (_dir, mgr) = manager(16);
        let id = mgr.insert_text("stale entry test", "doc", HashSet::new()).await.unwrap();
        let neuron = mgr.get_neuron(&id).unwrap().unwrap();

        // Remove from the neuron store only, simulating a crash between
        // tombstone and physical removal (spec.md §9).
        mgr.neuron_store().remove_neuron(id).await.unwrap();

        let results = mgr.find_similar(&neuron.embedding, 5, None).await.unwrap();
        assert!(results.iter().all(|(n, _)| n.id != id));
    }

    #[tokio::test]
    async fn add_and_remove_synapse_round_trip() {
        let (_dir, mgr) = manager(16);
        let a = mgr.insert_text("alpha", "doc", HashSet::new()).await.unwrap();
        let b = mgr.insert_text("beta", "doc", HashSet::new()).await.unwrap();

        let synapse_id = mgr.add_synapse(a, b, SynapseType::Causal, 0.8).await.unwrap();
        let outgoing = mgr.neuron_store().get_outgoing_synapses(&a).unwrap();
        assert_eq!(outgoing.len(), 1);

        mgr.remove_synapse(a, synapse_id).await.unwrap();
        assert!(mgr.neuron_store().get_outgoing_synapses(&a).unwrap().is_empty());
    }
}
