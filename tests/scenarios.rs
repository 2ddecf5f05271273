//! End-to-end scenarios against the public crate surface, one per literal
//! example in the specification's testable-properties section: chunk
//! refcounting, similarity ties, Merkle proof tamper-detection, forward/
//! backward inference confidence, attractor influence/decay, and HNSW
//! soft-delete + compaction over a larger population.

use engram::chunk::Chunk;
use engram::config::EngramConfig;
use engram::embedding::StubEmbedder;
use engram::events::EventBus;
use engram::{AttractorModel, AttractorParams, Direction, EngramError, GraphManager, InferOptions, InferenceEngine, SynapseType};
use std::collections::HashSet;
use std::sync::Arc;

fn dim16_manager() -> (tempfile::TempDir, GraphManager) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngramConfig::default();
    config.data_dir = dir.path().to_path_buf();
    config.embedding_dim = 16;
    let mgr = GraphManager::new(config, Arc::new(StubEmbedder::new(16)), EventBus::new(64)).unwrap();
    (dir, mgr)
}

fn one_hot(dim: usize, axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    v[axis] = 1.0;
    v
}

/// S1: storing, re-storing, and deleting a chunk walks its refcount and
/// backing file through 1 -> 2 -> 1 -> 0 (removed).
#[tokio::test]
async fn s1_chunk_refcount_lifecycle() {
    let (_dir, mgr) = dim16_manager();
    let chunk = Chunk::new(0, 0, b"abc".to_vec(), None);
    assert!(chunk.hash.to_hex().starts_with("3a985da7"));

    let store = mgr.chunk_store();
    let h1 = store.put(&chunk).await.unwrap();
    assert!(store.has(&h1).unwrap());

    let h2 = store.put(&chunk).await.unwrap();
    assert_eq!(h1, h2);

    assert!(store.delete(&h1).await.unwrap());
    assert!(store.has(&h1).unwrap(), "refcount should still be 1 after one delete");

    assert!(store.delete(&h1).await.unwrap());
    assert!(!store.has(&h1).unwrap(), "bytes and metadata removed once refcount hits 0");
}

/// S2: a query identical to neuron A's embedding ranks B (identical
/// embedding) above C (orthogonal embedding).
#[tokio::test]
async fn s2_find_similar_ranks_by_cosine() {
    let (_dir, mgr) = dim16_manager();
    let tags = HashSet::new();
    let a = mgr.insert_chunks(&[], one_hot(16, 0), "doc", tags.clone()).await.unwrap();
    let b = mgr.insert_chunks(&[], one_hot(16, 0), "doc", tags.clone()).await.unwrap();
    let c = mgr.insert_chunks(&[], one_hot(16, 1), "doc", tags).await.unwrap();

    let neuron_a = mgr.get_neuron(&a).unwrap().unwrap();
    let results = mgr.find_similar(&neuron_a.embedding, 3, None).await.unwrap();

    let b_rank = results.iter().position(|(n, _)| n.id == b).unwrap();
    let c_rank = results.iter().position(|(n, _)| n.id == c).unwrap();
    assert!(b_rank < c_rank, "identical embedding must outrank orthogonal one");
    assert!((results[b_rank].1 - 1.0).abs() < 1e-4);
    assert!(results[c_rank].1.abs() < 1e-4);
}

/// S3: a 3-leaf Merkle tree's proof for the duplicated-padding leaf
/// verifies, and flipping a sibling byte breaks verification.
#[tokio::test]
async fn s3_merkle_proof_and_tamper_detection() {
    use engram::hash::hash;
    use engram::merkle::{build_tree, verify_proof};

    let h1 = hash(b"chunk-1");
    let h2 = hash(b"chunk-2");
    let h3 = hash(b"chunk-3");
    let tree = build_tree(&[h1, h2, h3]);

    let proof = tree.generate_proof(2).unwrap();
    assert_eq!(proof.leaf, h3);
    assert!(verify_proof(&proof, &tree.root()));

    let mut tampered_h2 = h2;
    tampered_h2.0[0] ^= 0xFF;
    let tampered_tree = build_tree(&[h1, tampered_h2, h3]);
    let tampered_proof = tampered_tree.generate_proof(2).unwrap();
    assert!(!verify_proof(&proof, &tampered_tree.root()));
    assert_ne!(tree.root(), tampered_tree.root());
    let _ = tampered_proof;
}

/// S4: A--CAUSAL(0.8)-->B--CAUSAL(0.9)-->C. Forward confidence for C is
/// 0.72; backward confidence for A from C is 0.72 * abduction penalty 0.8.
#[tokio::test]
async fn s4_bidirectional_inference_confidence() {
    let (_dir, mgr) = dim16_manager();
    let a = mgr.insert_text("alpha", "doc", HashSet::new()).await.unwrap();
    let b = mgr.insert_text("beta", "doc", HashSet::new()).await.unwrap();
    let c = mgr.insert_text("gamma", "doc", HashSet::new()).await.unwrap();
    mgr.add_synapse(a, b, SynapseType::Causal, 0.8).await.unwrap();
    mgr.add_synapse(b, c, SynapseType::Causal, 0.9).await.unwrap();

    let engine = InferenceEngine::new(&mgr, mgr.config().inference.clone());

    let forward = engine.forward_infer(a, 2).await.unwrap();
    let c_conf = forward.iter().find(|r| r.neuron_id == c).unwrap().confidence;
    assert!((c_conf - 0.72).abs() < 1e-4);

    let backward = engine.backward_infer(c, 2).await.unwrap();
    let a_conf = backward.iter().find(|r| r.neuron_id == a).unwrap().confidence;
    assert!((a_conf - 0.72 * 0.8).abs() < 1e-4);

    let combined = engine.infer(a, InferOptions { direction: Direction::Forward, max_depth: 2, similarity_k: 5 }).await.unwrap();
    assert!(combined.iter().any(|r| r.neuron_id == c));
}

/// S5: attractor G (embedding == N's embedding, strength 0.5, priority 8)
/// yields influence 1.0 * 0.5 * 0.8 = 0.4 over N; after 10 decay ticks at
/// 0.99, strength is ~0.4524.
#[tokio::test]
async fn s5_attractor_influence_and_decay() {
    let (_dir, mgr) = dim16_manager();
    let model = AttractorModel::new(&mgr, mgr.config().attractor.clone(), EventBus::new(16));

    let goal_embedding = one_hot(16, 0);
    let attractor_id = model
        .create_attractor(
            "goal",
            "desc",
            goal_embedding.clone(),
            AttractorParams { strength: 0.5, priority: 8, probability: 1.0, deadline: None },
        )
        .unwrap();

    let influence = model.calculate_influence(&goal_embedding).unwrap();
    let value = influence.get(&attractor_id).copied().unwrap();
    assert!((value - 0.4).abs() < 1e-4, "got {value}");

    for _ in 0..10 {
        model.decay_attractors();
    }
    let attractor = model.get_attractor(&attractor_id).unwrap();
    assert!((attractor.strength - 0.4524).abs() < 1e-3, "got {}", attractor.strength);
}

/// S6: insert 100 neurons, delete 60. Before compaction the index reports
/// 60 tombstones and never returns a deleted id; `forceCompact` clears the
/// tombstones entirely while leaving the surviving ranking intact.
#[tokio::test]
async fn s6_hnsw_soft_delete_then_compaction() {
    let (_dir, mgr) = dim16_manager();
    let mut ids = Vec::with_capacity(100);
    for i in 0..100 {
        let mut v = vec![0.0f32; 16];
        v[i % 16] = 1.0;
        v[(i + 1) % 16] = 0.1;
        let id = mgr.insert_chunks(&[], v, "doc", HashSet::new()).await.unwrap();
        ids.push(id);
    }

    let mut deleted = HashSet::new();
    for id in ids.iter().take(60) {
        assert!(mgr.delete_neuron(*id).await.unwrap());
        deleted.insert(*id);
    }

    assert_eq!(mgr.index().tombstone_count().await, 60);

    let query = vec![1.0f32; 16];
    let before = mgr.index().search(&query, 10, None).await;
    assert_eq!(before.len(), 10);
    assert!(before.iter().all(|(id, _)| !deleted.contains(id)));

    let removed = mgr.index().compact().await;
    assert_eq!(removed, 60);
    assert_eq!(mgr.index().tombstone_count().await, 0);

    let after = mgr.index().search(&query, 10, None).await;
    assert_eq!(before.len(), after.len());
    let before_ids: HashSet<_> = before.iter().map(|(id, _)| *id).collect();
    let after_ids: HashSet<_> = after.iter().map(|(id, _)| *id).collect();
    let overlap = before_ids.intersection(&after_ids).count();
    assert!(overlap >= 9, "compaction should preserve the live ranking up to ties, overlap was {overlap}/10");
}

/// Dimension mismatches on insert are rejected rather than silently
/// truncated or padded.
#[tokio::test]
async fn insert_with_wrong_embedding_dimension_is_rejected() {
    let (_dir, mgr) = dim16_manager();
    let err = mgr.insert_chunks(&[], vec![0.0; 4], "doc", HashSet::new()).await.unwrap_err();
    assert!(matches!(err, EngramError::DimensionMismatch { expected: 16, actual: 4 }));
}
