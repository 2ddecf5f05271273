//! External database connector capability (`spec.md` §9).
//!
//! Specified only at the contract boundary: import/export connectors are
//! out of scope for the core, but the graph manager accepts one as an
//! injected collaborator. `read_rows` is a lazy, finite, non-restartable
//! batch sequence; raw `where`-style filters are dropped entirely per the
//! pinned Open Question decision (see `DESIGN.md`).

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct ColumnSchema {
    pub name: String,
    pub ty: String,
    pub nullable: bool,
}

#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

pub type RowBatch = Vec<Value>;

#[async_trait]
pub trait DbConnector: Send + Sync {
    async fn connect(&mut self) -> Result<()>;
    async fn disconnect(&mut self) -> Result<()>;
    async fn get_schema(&self) -> Result<Vec<TableSchema>>;
    async fn get_table_schema(&self, table: &str) -> Result<TableSchema>;
    async fn table_exists(&self, table: &str) -> Result<bool>;
    async fn create_table(&self, schema: &TableSchema) -> Result<()>;
    async fn write_rows(&self, table: &str, rows: RowBatch) -> Result<()>;

    /// Lazily read `table` in batches of at most `batch_size` rows. Callers
    /// must iterate the returned stream once; it is not restartable and not
    /// thread-safe across concurrent iterators.
    async fn read_rows(&self, table: &str, batch_size: usize) -> Result<RowBatchStream>;
}

/// A finite, non-restartable sequence of row batches.
pub struct RowBatchStream {
    inner: std::collections::VecDeque<RowBatch>,
}

impl RowBatchStream {
    pub fn new(batches: Vec<RowBatch>) -> Self {
        Self {
            inner: batches.into(),
        }
    }

    pub fn next_batch(&mut self) -> Option<RowBatch> {
        self.inner.pop_front()
    }
}

impl Iterator for RowBatchStream {
    type Item = RowBatch;
    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch()
    }
}
