//! Crate configuration.
//!
//! Mirrors the layering the teacher codebase uses for its database config
//! (`DatabaseConfig::from_env`): defaults first, then environment variables,
//! with a data-directory fallback that follows the XDG base-directory
//! convention.

use std::path::PathBuf;

/// Top-level configuration for an [`crate::manager::GraphManager`] instance.
#[derive(Debug, Clone)]
pub struct EngramConfig {
    /// Root of on-disk persistence (`chunks/`, `chunk-meta/`, `neurons/`,
    /// `index/`, `probabilistic/`).
    pub data_dir: PathBuf,
    /// Fixed embedding vector length. All vectors are validated against this.
    pub embedding_dim: usize,
    pub hnsw: HnswConfig,
    pub compaction: CompactionConfig,
    pub serial_queue_max_pending: usize,
    pub attractor: AttractorConfig,
    pub inference: InferenceConfig,
}

impl Default for EngramConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            embedding_dim: 384,
            hnsw: HnswConfig::default(),
            compaction: CompactionConfig::default(),
            serial_queue_max_pending: 100,
            attractor: AttractorConfig::default(),
            inference: InferenceConfig::default(),
        }
    }
}

impl EngramConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset. Recognized variables are prefixed
    /// `ENGRAM_`.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(dir) = std::env::var("ENGRAM_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Some(dim) = env_parse::<usize>("ENGRAM_EMBEDDING_DIM") {
            cfg.embedding_dim = dim;
        }
        if let Some(m) = env_parse::<usize>("ENGRAM_HNSW_M") {
            cfg.hnsw.m = m;
        }
        if let Some(ef) = env_parse::<usize>("ENGRAM_HNSW_EF_CONSTRUCTION") {
            cfg.hnsw.ef_construction = ef;
        }
        if let Some(ef) = env_parse::<usize>("ENGRAM_HNSW_EF_SEARCH") {
            cfg.hnsw.ef_search = ef;
        }
        if let Some(seed) = env_parse::<u64>("ENGRAM_HNSW_SEED") {
            cfg.hnsw.seed = seed;
        }
        if let Some(t) = env_parse::<usize>("ENGRAM_COMPACTION_TOMBSTONE_THRESHOLD") {
            cfg.compaction.tombstone_threshold = t;
        }
        if let Some(ms) = env_parse::<u64>("ENGRAM_COMPACTION_INTERVAL_MS") {
            cfg.compaction.interval_ms = ms;
        }
        if let Some(p) = env_parse::<usize>("ENGRAM_SERIAL_QUEUE_MAX_PENDING") {
            cfg.serial_queue_max_pending = p;
        }
        if let Some(d) = env_parse::<f64>("ENGRAM_ATTRACTOR_DECAY_FACTOR") {
            cfg.attractor.decay_factor = d;
        }
        if let Some(f) = env_parse::<f64>("ENGRAM_ATTRACTOR_FLOOR") {
            cfg.attractor.floor = f;
        }
        if let Some(b) = env_parse::<f64>("ENGRAM_ATTRACTOR_BOTTLENECK_THRESHOLD") {
            cfg.attractor.bottleneck_threshold = b;
        }
        if let Some(p) = env_parse::<f64>("ENGRAM_INFERENCE_ABDUCTION_PENALTY") {
            cfg.inference.abduction_penalty = p;
        }

        cfg
    }

    /// Paths of the three on-disk artifact roots (`spec.md` §6).
    pub fn chunks_dir(&self) -> PathBuf {
        self.data_dir.join("chunks")
    }

    pub fn chunk_meta_dir(&self) -> PathBuf {
        self.data_dir.join("chunk-meta")
    }

    pub fn neurons_dir(&self) -> PathBuf {
        self.data_dir.join("neurons")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("index")
    }

    pub fn probabilistic_dir(&self) -> PathBuf {
        self.data_dir.join("probabilistic")
    }
}

/// HNSW construction/search parameters (`spec.md` §4.6, §6).
#[derive(Debug, Clone)]
pub struct HnswConfig {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub m_l: f64,
    pub seed: u64,
}

impl Default for HnswConfig {
    fn default() -> Self {
        let m = 16;
        Self {
            m,
            ef_construction: 200,
            ef_search: 50,
            m_l: 1.0 / (m as f64).ln(),
            seed: 0,
        }
    }
}

/// Compaction scheduler triggers (`spec.md` §4.7, §6).
#[derive(Debug, Clone)]
pub struct CompactionConfig {
    pub tombstone_threshold: usize,
    pub interval_ms: u64,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            tombstone_threshold: 50,
            interval_ms: 300_000,
        }
    }
}

/// Attractor model parameters (`spec.md` §4.10, §6).
#[derive(Debug, Clone)]
pub struct AttractorConfig {
    pub decay_factor: f64,
    pub floor: f64,
    pub bottleneck_threshold: f64,
}

impl Default for AttractorConfig {
    fn default() -> Self {
        Self {
            decay_factor: 0.99,
            floor: 0.01,
            bottleneck_threshold: 0.3,
        }
    }
}

/// Inference engine parameters (`spec.md` §4.9, §6).
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub abduction_penalty: f64,
    pub similarity_mode_weight: f64,
    pub synapse_type_weights: SynapseTypeWeights,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            abduction_penalty: 0.8,
            similarity_mode_weight: 1.0,
            synapse_type_weights: SynapseTypeWeights::default(),
        }
    }
}

/// Per-synapse-type edge weights used by the inference engine.
#[derive(Debug, Clone)]
pub struct SynapseTypeWeights {
    pub causal: f64,
    pub temporal: f64,
    pub similar: f64,
    pub associative: f64,
}

impl Default for SynapseTypeWeights {
    fn default() -> Self {
        Self {
            causal: 1.0,
            temporal: 0.9,
            similar: 0.7,
            associative: 0.5,
        }
    }
}

impl SynapseTypeWeights {
    pub fn weight_for(&self, ty: &crate::graph::types::SynapseType) -> f64 {
        use crate::graph::types::SynapseType;
        match ty {
            SynapseType::Causal => self.causal,
            SynapseType::Temporal => self.temporal,
            SynapseType::Similar => self.similar,
            SynapseType::Associative => self.associative,
            SynapseType::Other(_) => self.associative,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Development fallback consistent with the XDG base directory spec.
fn default_data_dir() -> PathBuf {
    if let Some(data_home) = std::env::var_os("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join("engram");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".local").join("share").join("engram");
    }
    PathBuf::from("./data/engram")
}
