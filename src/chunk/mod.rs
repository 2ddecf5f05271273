//! Content-addressed chunk store (C3).
//!
//! Chunk bytes live on a filesystem directory sharded by the first two hex
//! characters of the hash; chunk metadata (including the reference count)
//! lives in a `sled::Tree`, JSON-encoded per `spec.md` §6. The shape follows
//! the teacher's `db::chunks::ChunkStore` (upsert-by-hash, dedup stats,
//! batch helpers) re-targeted at a sharded-filesystem + ordered-KV backend.

pub mod meta;

use crate::error::{EngramError, Result};
use crate::hash::{hash, verify, Hash};
use meta::ChunkMeta;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A chunk of source text, identified by the SHA3-256 hash of its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: u32,
    pub offset: u64,
    pub data: Vec<u8>,
    pub hash: Hash,
    pub fingerprint: Option<u64>,
}

impl Chunk {
    /// Build a chunk from raw bytes, computing its content hash.
    pub fn new(index: u32, offset: u64, data: Vec<u8>, fingerprint: Option<u64>) -> Self {
        let h = hash(&data);
        Self {
            index,
            offset,
            data,
            hash: h,
            fingerprint,
        }
    }
}

/// Aggregate statistics over the chunk store.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChunkStats {
    pub total_chunks: u64,
    pub total_size: u64,
    pub avg_chunk_size: f64,
}

/// Result of a full integrity scan (`verifyIntegrity`).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct IntegrityReport {
    pub valid: bool,
    pub corrupted: Vec<Hash>,
    pub missing: Vec<Hash>,
}

/// Content-addressed, reference-counted chunk store.
///
/// Cheaply cloneable: `meta` is a `sled::Tree` handle (Arc-backed
/// internally) and `bytes_root` is a path, so a clone is a handle to the
/// same underlying store, not a copy of it.
#[derive(Clone)]
pub struct ChunkStore {
    bytes_root: PathBuf,
    meta: sled::Tree,
}

impl ChunkStore {
    /// Open (creating if absent) a chunk store rooted at `data_dir`, with
    /// chunk bytes under `data_dir/chunks` and metadata in
    /// `data_dir/chunk-meta`.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let bytes_root = data_dir.join("chunks");
        std::fs::create_dir_all(&bytes_root)?;

        let meta_path = data_dir.join("chunk-meta");
        let db = sled::open(&meta_path)?;
        let meta = db.open_tree("meta")?;

        Ok(Self { bytes_root, meta })
    }

    fn shard_path(&self, h: &Hash) -> PathBuf {
        let hex = h.to_hex();
        self.bytes_root.join(&hex[0..2]).join(hex)
    }

    fn meta_key(h: &Hash) -> Vec<u8> {
        let mut k = b"meta:".to_vec();
        k.extend_from_slice(h.to_hex().as_bytes());
        k
    }

    fn read_meta(&self, h: &Hash) -> Result<Option<ChunkMeta>> {
        match self.meta.get(Self::meta_key(h))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write_meta(&self, m: &ChunkMeta) -> Result<()> {
        let bytes = serde_json::to_vec(m)?;
        self.meta.insert(Self::meta_key(&m.hash), bytes)?;
        Ok(())
    }

    /// Store a chunk. If a record for `chunk.hash` already exists, its
    /// `refCount` is incremented and the existing bytes are left untouched
    /// (identity is the hash, so content is necessarily identical).
    /// Otherwise bytes are written to the sharded path and a fresh metadata
    /// record is created with `refCount = 1`.
    pub async fn put(&self, chunk: &Chunk) -> Result<Hash> {
        if let Some(mut m) = self.read_meta(&chunk.hash)? {
            m.ref_count += 1;
            self.write_meta(&m)?;
            debug!(hash = %chunk.hash, ref_count = m.ref_count, "chunk: incremented refcount");
            return Ok(chunk.hash);
        }

        let path = self.shard_path(&chunk.hash);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &chunk.data).await?;

        let m = ChunkMeta {
            hash: chunk.hash,
            size: chunk.data.len() as u64,
            index: chunk.index,
            offset: chunk.offset,
            fingerprint: chunk.fingerprint,
            created_at: chrono::Utc::now(),
            ref_count: 1,
        };
        self.write_meta(&m)?;
        debug!(hash = %chunk.hash, "chunk: stored new chunk");
        Ok(chunk.hash)
    }

    /// Read a chunk back by hash, verifying its integrity. Returns `None`
    /// on a metadata or bytes miss; fails with `IntegrityError` if the bytes
    /// no longer hash to the key.
    pub async fn get(&self, h: &Hash) -> Result<Option<Chunk>> {
        let Some(m) = self.read_meta(h)? else {
            return Ok(None);
        };

        let path = self.shard_path(h);
        let data = match tokio::fs::read(&path).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if !verify(&data, h) {
            return Err(EngramError::integrity(format!(
                "chunk {h} bytes do not hash to their key"
            )));
        }

        Ok(Some(Chunk {
            index: m.index,
            offset: m.offset,
            data,
            hash: *h,
            fingerprint: m.fingerprint,
        }))
    }

    pub fn has(&self, h: &Hash) -> Result<bool> {
        Ok(self.meta.contains_key(Self::meta_key(h))?)
    }

    /// Fetch many chunks, preserving order; absent entries are `None`.
    pub async fn get_many(&self, hashes: &[Hash]) -> Result<Vec<Option<Chunk>>> {
        let mut out = Vec::with_capacity(hashes.len());
        for h in hashes {
            out.push(self.get(h).await?);
        }
        Ok(out)
    }

    /// Decrement a chunk's refcount; remove bytes and metadata once it
    /// reaches zero. Returns whether a record existed.
    pub async fn delete(&self, h: &Hash) -> Result<bool> {
        let Some(mut m) = self.read_meta(h)? else {
            return Ok(false);
        };

        m.ref_count -= 1;
        if m.ref_count <= 0 {
            let path = self.shard_path(h);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            self.meta.remove(Self::meta_key(h))?;
            debug!(hash = %h, "chunk: refcount reached zero, removed");
        } else {
            self.write_meta(&m)?;
            debug!(hash = %h, ref_count = m.ref_count, "chunk: decremented refcount");
        }
        Ok(true)
    }

    /// Lazily iterate every stored hash.
    pub fn get_all_hashes(&self) -> impl Iterator<Item = Result<Hash>> + '_ {
        self.meta.iter().filter_map(|entry| match entry {
            Ok((_, v)) => match serde_json::from_slice::<ChunkMeta>(&v) {
                Ok(m) => Some(Ok(m.hash)),
                Err(e) => Some(Err(e.into())),
            },
            Err(e) => Some(Err(e.into())),
        })
    }

    pub fn get_stats(&self) -> Result<ChunkStats> {
        let mut total_chunks = 0u64;
        let mut total_size = 0u64;
        for entry in self.meta.iter() {
            let (_, v) = entry?;
            let m: ChunkMeta = serde_json::from_slice(&v)?;
            total_chunks += 1;
            total_size += m.size;
        }
        let avg_chunk_size = if total_chunks > 0 {
            total_size as f64 / total_chunks as f64
        } else {
            0.0
        };
        Ok(ChunkStats {
            total_chunks,
            total_size,
            avg_chunk_size,
        })
    }

    /// Re-hash every stored chunk and report corruption/missing bytes.
    pub async fn verify_integrity(&self) -> Result<IntegrityReport> {
        let mut report = IntegrityReport {
            valid: true,
            ..Default::default()
        };

        for entry in self.meta.iter() {
            let (_, v) = entry?;
            let m: ChunkMeta = serde_json::from_slice(&v)?;
            let path = self.shard_path(&m.hash);
            match tokio::fs::read(&path).await {
                Ok(data) => {
                    if !verify(&data, &m.hash) {
                        report.valid = false;
                        report.corrupted.push(m.hash);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    report.valid = false;
                    report.missing.push(m.hash);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(report)
    }

    /// Delete every record whose refcount has fallen to zero or below.
    /// Returns the number removed.
    pub async fn gc(&self) -> Result<u64> {
        let mut to_delete = Vec::new();
        for entry in self.meta.iter() {
            let (_, v) = entry?;
            let m: ChunkMeta = serde_json::from_slice(&v)?;
            if m.ref_count <= 0 {
                to_delete.push(m.hash);
            }
        }
        let mut count = 0u64;
        for h in to_delete {
            if self.delete(&h).await? {
                count += 1;
            }
        }
        if count > 0 {
            info!(count, "chunk store: gc removed orphaned records");
        }
        Ok(count)
    }

    /// Request compaction of the underlying metadata store over the whole
    /// key space.
    pub fn compact(&self) -> Result<()> {
        self.meta.flush()?;
        warn!("chunk store: sled does not expose manual range compaction; flushed instead");
        Ok(())
    }
}

impl crate::compaction::Compactable for ChunkStore {
    fn compact(&self) -> Result<()> {
        ChunkStore::compact(self)
    }
}
