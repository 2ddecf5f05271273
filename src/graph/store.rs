//! Persistent neuron/synapse store (C5), key schema per `spec.md` §4.5.
//!
//! Shape follows the teacher's `db::chunks`/`db::queue` CRUD-over-store
//! pattern, re-targeted at `sled` trees instead of `sqlx` tables.
//! Adjacency-mutating operations (`add_synapse`, `remove_synapse`,
//! `remove_neuron`) are linearized through the crate's [`crate::queue::SerialQueue`]
//! and made awaitable via a oneshot reply channel, so integrity errors
//! (`DanglingReference`) still surface to the caller synchronously while
//! concurrent adjacency writers cannot interleave.

use super::types::{Neuron, Synapse, SynapseType};
use crate::error::{EngramError, Result};
use crate::hash::Hash;
use crate::queue::SerialQueue;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

fn neuron_key(id: &Uuid) -> Vec<u8> {
    format!("neuron:{id}").into_bytes()
}

fn merkle_key(root: &Hash) -> Vec<u8> {
    format!("merkle:{}", root.to_hex()).into_bytes()
}

fn tag_key(tag: &str, id: &Uuid) -> Vec<u8> {
    format!("tag:{tag}:{id}").into_bytes()
}

fn tag_prefix(tag: &str) -> Vec<u8> {
    format!("tag:{tag}:").into_bytes()
}

fn src_key(source_type: &str, id: &Uuid) -> Vec<u8> {
    format!("src:{source_type}:{id}").into_bytes()
}

fn src_prefix(source_type: &str) -> Vec<u8> {
    format!("src:{source_type}:").into_bytes()
}

fn out_key(id: &Uuid, synapse_id: &Uuid) -> Vec<u8> {
    format!("out:{id}:{synapse_id}").into_bytes()
}

fn out_prefix(id: &Uuid) -> Vec<u8> {
    format!("out:{id}:").into_bytes()
}

fn in_key(id: &Uuid, synapse_id: &Uuid) -> Vec<u8> {
    format!("in:{id}:{synapse_id}").into_bytes()
}

fn in_prefix(id: &Uuid) -> Vec<u8> {
    format!("in:{id}:").into_bytes()
}

fn synapse_key(id: &Uuid) -> Vec<u8> {
    format!("synapse:{id}").into_bytes()
}

pub struct NeuronStore {
    tree: sled::Tree,
    queue: Arc<SerialQueue>,
}

impl NeuronStore {
    pub fn open(data_dir: impl AsRef<Path>, queue: Arc<SerialQueue>) -> Result<Self> {
        let db = sled::open(data_dir.as_ref().join("neurons"))?;
        let tree = db.open_tree("graph")?;
        Ok(Self { tree, queue })
    }

    fn read_neuron(&self, id: &Uuid) -> Result<Option<Neuron>> {
        match self.tree.get(neuron_key(id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write_neuron(&self, n: &Neuron) -> Result<()> {
        self.tree.insert(neuron_key(&n.id), serde_json::to_vec(n)?)?;
        Ok(())
    }

    /// Insert or replace a neuron record, updating its secondary indices.
    /// Integrity-critical, so this bypasses the serial queue and surfaces
    /// errors directly (`spec.md` §9 "Fire-and-forget write path").
    pub fn put_neuron(&self, neuron: &Neuron) -> Result<()> {
        self.write_neuron(neuron)?;
        self.tree.insert(merkle_key(&neuron.merkle_root), neuron.id.as_bytes())?;
        for tag in &neuron.metadata.tags {
            self.tree.insert(tag_key(tag, &neuron.id), &[])?;
        }
        self.tree
            .insert(src_key(&neuron.metadata.source_type, &neuron.id), &[])?;
        debug!(id = %neuron.id, "graph store: put neuron");
        Ok(())
    }

    pub fn get_neuron(&self, id: &Uuid) -> Result<Option<Neuron>> {
        self.read_neuron(id)
    }

    pub fn get_neuron_by_merkle_root(&self, root: &Hash) -> Result<Option<Neuron>> {
        let Some(bytes) = self.tree.get(merkle_key(root))? else {
            return Ok(None);
        };
        let id = Uuid::from_slice(&bytes).map_err(|e| EngramError::storage(e.to_string()))?;
        self.read_neuron(&id)
    }

    pub fn get_all_neuron_ids(&self) -> Result<Vec<Uuid>> {
        let mut out = Vec::new();
        for entry in self.tree.scan_prefix(b"neuron:") {
            let (k, _) = entry?;
            let key = String::from_utf8_lossy(&k);
            if let Some(id_str) = key.strip_prefix("neuron:") {
                if let Ok(id) = Uuid::parse_str(id_str) {
                    out.push(id);
                }
            }
        }
        Ok(out)
    }

    pub fn get_neurons_by_tag(&self, tag: &str) -> Result<Vec<Uuid>> {
        self.scan_ids(&tag_prefix(tag), tag.len() + 5)
    }

    pub fn get_neurons_by_source_type(&self, source_type: &str) -> Result<Vec<Uuid>> {
        self.scan_ids(&src_prefix(source_type), source_type.len() + 5)
    }

    fn scan_ids(&self, prefix: &[u8], _hint: usize) -> Result<Vec<Uuid>> {
        let mut out = Vec::new();
        for entry in self.tree.scan_prefix(prefix) {
            let (k, _) = entry?;
            let key = String::from_utf8_lossy(&k);
            if let Some(id_str) = key.rsplit(':').next() {
                if let Ok(id) = Uuid::parse_str(id_str) {
                    out.push(id);
                }
            }
        }
        Ok(out)
    }

    pub fn get_outgoing_synapses(&self, id: &Uuid) -> Result<Vec<Synapse>> {
        let mut out = Vec::new();
        for entry in self.tree.scan_prefix(out_prefix(id)) {
            let (_, v) = entry?;
            out.push(serde_json::from_slice(&v)?);
        }
        Ok(out)
    }

    pub fn get_incoming_synapse_ids(&self, id: &Uuid) -> Result<Vec<Uuid>> {
        let mut out = Vec::new();
        for entry in self.tree.scan_prefix(in_prefix(id)) {
            let (k, _) = entry?;
            let key = String::from_utf8_lossy(&k);
            if let Some(sid_str) = key.rsplit(':').next() {
                if let Ok(sid) = Uuid::parse_str(sid_str) {
                    out.push(sid);
                }
            }
        }
        Ok(out)
    }

    pub fn get_synapse(&self, id: &Uuid) -> Result<Option<Synapse>> {
        match self.tree.get(synapse_key(id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Incoming synapses resolved to full records via the `synapse:<id>`
    /// secondary index (the `in:` prefix only marks membership).
    pub fn get_incoming_synapses(&self, id: &Uuid) -> Result<Vec<Synapse>> {
        let mut out = Vec::new();
        for sid in self.get_incoming_synapse_ids(id)? {
            if let Some(s) = self.get_synapse(&sid)? {
                out.push(s);
            }
        }
        Ok(out)
    }

    /// Add a synapse between two existing neurons, linearized through the
    /// serial queue. Fails with `DanglingReference` (and makes no change)
    /// if either endpoint is missing.
    pub async fn add_synapse(&self, synapse: Synapse) -> Result<()> {
        self.run_linearized("add_synapse", {
            let tree = self.tree.clone();
            let synapse = synapse.clone();
            move || add_synapse_sync(&tree, &synapse)
        })
        .await
    }

    /// Remove a synapse from both endpoints' adjacency sets.
    pub async fn remove_synapse(&self, source_id: Uuid, synapse_id: Uuid) -> Result<()> {
        self.run_linearized("remove_synapse", {
            let tree = self.tree.clone();
            move || remove_synapse_sync(&tree, source_id, synapse_id)
        })
        .await
    }

    /// Remove a neuron and every synapse touching it, plus its secondary
    /// indices. Chunk refcounts are decremented by the caller (the graph
    /// manager, which owns the chunk store).
    pub async fn remove_neuron(&self, id: Uuid) -> Result<Option<Neuron>> {
        self.run_linearized("remove_neuron", {
            let tree = self.tree.clone();
            move || remove_neuron_sync(&tree, id)
        })
        .await
    }

    async fn run_linearized<F>(&self, label: &str, f: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.queue.enqueue(label.to_string(), async move {
            let _ = tx.send(f());
        });
        rx.await
            .map_err(|_| EngramError::QueueDropped(label.to_string()))?
    }
}

// Free functions below run inside the serial queue's single worker task, so
// each sees a consistent view without further locking.

fn add_synapse_sync(tree: &sled::Tree, synapse: &Synapse) -> Result<()> {
    let source_bytes = tree
        .get(neuron_key(&synapse.source_id))?
        .ok_or_else(|| EngramError::dangling(format!("source neuron {} missing", synapse.source_id)))?;
    let target_bytes = tree
        .get(neuron_key(&synapse.target_id))?
        .ok_or_else(|| EngramError::dangling(format!("target neuron {} missing", synapse.target_id)))?;

    let mut source: Neuron = serde_json::from_slice(&source_bytes)?;
    let mut target: Neuron = serde_json::from_slice(&target_bytes)?;

    source.outgoing_synapses.insert(synapse.id);
    target.incoming_synapses.insert(synapse.id);

    tree.insert(neuron_key(&source.id), serde_json::to_vec(&source)?)?;
    tree.insert(neuron_key(&target.id), serde_json::to_vec(&target)?)?;
    tree.insert(out_key(&synapse.source_id, &synapse.id), serde_json::to_vec(synapse)?)?;
    tree.insert(in_key(&synapse.target_id, &synapse.id), &[])?;
    tree.insert(synapse_key(&synapse.id), serde_json::to_vec(synapse)?)?;
    Ok(())
}

fn remove_synapse_sync(tree: &sled::Tree, source_id: Uuid, synapse_id: Uuid) -> Result<()> {
    let Some(bytes) = tree.get(out_key(&source_id, &synapse_id))? else {
        return Ok(());
    };
    let synapse: Synapse = serde_json::from_slice(&bytes)?;

    if let Some(sb) = tree.get(neuron_key(&source_id))? {
        let mut source: Neuron = serde_json::from_slice(&sb)?;
        source.outgoing_synapses.remove(&synapse_id);
        tree.insert(neuron_key(&source_id), serde_json::to_vec(&source)?)?;
    }
    if let Some(tb) = tree.get(neuron_key(&synapse.target_id))? {
        let mut target: Neuron = serde_json::from_slice(&tb)?;
        target.incoming_synapses.remove(&synapse_id);
        tree.insert(neuron_key(&synapse.target_id), serde_json::to_vec(&target)?)?;
    }

    tree.remove(out_key(&source_id, &synapse_id))?;
    tree.remove(in_key(&synapse.target_id, &synapse_id))?;
    tree.remove(synapse_key(&synapse_id))?;
    Ok(())
}

fn remove_neuron_sync(tree: &sled::Tree, id: Uuid) -> Result<Option<Neuron>> {
    let Some(bytes) = tree.get(neuron_key(&id))? else {
        return Ok(None);
    };
    let neuron: Neuron = serde_json::from_slice(&bytes)?;

    for synapse_id in &neuron.outgoing_synapses {
        remove_synapse_sync(tree, id, *synapse_id)?;
    }
    for entry in tree.scan_prefix(in_prefix(&id)) {
        let (k, _) = entry?;
        tree.remove(k)?;
    }
    // Any synapse whose source points at this neuron but was not reachable
    // from `neuron.outgoing_synapses` (e.g. stale record) is orphaned;
    // sweep the out: prefix too so adjacency never dangles.
    for entry in tree.scan_prefix(out_prefix(&id)) {
        let (k, _) = entry?;
        tree.remove(k)?;
    }

    tree.remove(neuron_key(&id))?;
    tree.remove(merkle_key(&neuron.merkle_root))?;
    for tag in &neuron.metadata.tags {
        tree.remove(tag_key(tag, &id))?;
    }
    tree.remove(src_key(&neuron.metadata.source_type, &id))?;

    Ok(Some(neuron))
}

impl SynapseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SynapseType::Causal => "causal",
            SynapseType::Temporal => "temporal",
            SynapseType::Similar => "similar",
            SynapseType::Associative => "associative",
            SynapseType::Other(_) => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::{NeuronMetadata, SynapseType};
    use std::collections::HashSet;

    fn temp_store() -> (tempfile::TempDir, NeuronStore) {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(SerialQueue::new(100));
        let store = NeuronStore::open(dir.path(), queue).unwrap();
        (dir, store)
    }

    fn neuron(tag: &str) -> Neuron {
        let mut tags = HashSet::new();
        tags.insert(tag.to_string());
        Neuron::new(
            vec![1.0, 0.0, 0.0],
            vec![],
            Hash::ZERO,
            NeuronMetadata::new("test", tags),
        )
    }

    #[tokio::test]
    async fn put_get_neuron_round_trip() {
        let (_dir, store) = temp_store();
        let n = neuron("alpha");
        store.put_neuron(&n).unwrap();
        let back = store.get_neuron(&n.id).unwrap().unwrap();
        assert_eq!(back.id, n.id);
        assert_eq!(store.get_neurons_by_tag("alpha").unwrap(), vec![n.id]);
    }

    #[tokio::test]
    async fn get_by_merkle_root_resolves() {
        let (_dir, store) = temp_store();
        let mut n = neuron("x");
        n.merkle_root = crate::hash::hash(b"root");
        store.put_neuron(&n).unwrap();
        let back = store.get_neuron_by_merkle_root(&n.merkle_root).unwrap().unwrap();
        assert_eq!(back.id, n.id);
    }

    #[tokio::test]
    async fn add_synapse_updates_both_endpoints() {
        let (_dir, store) = temp_store();
        let a = neuron("a");
        let b = neuron("b");
        store.put_neuron(&a).unwrap();
        store.put_neuron(&b).unwrap();

        let synapse = Synapse::new(a.id, b.id, SynapseType::Causal, 0.8);
        store.add_synapse(synapse.clone()).await.unwrap();

        let out = store.get_outgoing_synapses(&a.id).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, synapse.id);

        let a_after = store.get_neuron(&a.id).unwrap().unwrap();
        assert!(a_after.outgoing_synapses.contains(&synapse.id));
        let b_after = store.get_neuron(&b.id).unwrap().unwrap();
        assert!(b_after.incoming_synapses.contains(&synapse.id));
    }

    #[tokio::test]
    async fn add_synapse_with_missing_target_is_dangling_reference() {
        let (_dir, store) = temp_store();
        let a = neuron("a");
        store.put_neuron(&a).unwrap();

        let missing = Uuid::new_v4();
        let synapse = Synapse::new(a.id, missing, SynapseType::Causal, 0.5);
        let err = store.add_synapse(synapse).await.unwrap_err();
        assert!(matches!(err, EngramError::DanglingReference(_)));

        // No partial write: source's outgoing set is untouched.
        let a_after = store.get_neuron(&a.id).unwrap().unwrap();
        assert!(a_after.outgoing_synapses.is_empty());
    }

    #[tokio::test]
    async fn remove_neuron_clears_adjacency_and_indices() {
        let (_dir, store) = temp_store();
        let a = neuron("a");
        let b = neuron("b");
        store.put_neuron(&a).unwrap();
        store.put_neuron(&b).unwrap();
        let synapse = Synapse::new(a.id, b.id, SynapseType::Causal, 0.8);
        store.add_synapse(synapse.clone()).await.unwrap();

        let removed = store.remove_neuron(a.id).await.unwrap();
        assert!(removed.is_some());
        assert!(store.get_neuron(&a.id).unwrap().is_none());

        let b_after = store.get_neuron(&b.id).unwrap().unwrap();
        assert!(!b_after.incoming_synapses.contains(&synapse.id));
        assert!(store.get_neurons_by_tag("a").unwrap().is_empty());
    }
}
