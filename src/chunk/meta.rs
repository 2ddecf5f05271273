//! On-disk metadata record for a stored chunk (`spec.md` §6 JSON schema).

use crate::hash::Hash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub hash: Hash,
    pub size: u64,
    pub index: u32,
    pub offset: u64,
    pub fingerprint: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub ref_count: i64,
}
