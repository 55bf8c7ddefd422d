#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use types::Value;

/// Logical identifier for a page on the simulated disk.
/// Examples:
/// - `let freelist_page = PageId(0);`
/// - `let user_data_page = PageId(42);`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId(pub u64);

/// Logical identifier for a row, always the first positional value of its `Row`.
/// Examples:
/// - `let id = RowId(1);`
/// - `let id = RowId(24);`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowId(pub i64);

/// A transaction identifier, assigned monotonically by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxId(pub u64);

/// A redo log sequence number, assigned monotonically by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Lsn(pub u64);

/// Positional row representation backed by `types::Value`.
///
/// By convention the first element is always the row's own [`RowId`] as a
/// `Value::Int`; `row_id()` extracts it.
///
/// Examples:
/// - `let row = Row::new(vec![Value::Int(1), Value::Text("Alice".into())]);`
/// - `let row = Row::new(vec![Value::Int(2), Value::Text("Bob".into()), Value::Int(25)]);`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Extracts the row-id from the first positional value.
    ///
    /// Fails<Constraint> if the row is empty or its first value is not an integer.
    pub fn row_id(&self) -> DbResult<RowId> {
        match self.values.first() {
            Some(Value::Int(id)) => Ok(RowId(*id)),
            _ => Err(DbError::Constraint(
                "row is missing an integer row-id in its first position".into(),
            )),
        }
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row::new(values)
    }
}

/// Canonical error type shared across the engine's subsystems.
#[derive(Error, Debug)]
pub enum DbError {
    /// A row lookup found no entry for the given row-id.
    #[error("row {0} not found")]
    RowMissing(i64),
    /// A page lookup found no entry for the given page-id.
    #[error("page {0} not found")]
    PageMissing(u64),
    /// The non-blocking lock table could not grant a lock to the caller.
    #[error("row {0} is locked by another transaction")]
    LockConflict(i64),
    /// `release_page` was called more times than the page was pinned.
    #[error("unbalanced pin/unpin on page {0}")]
    UnbalancedPin(u64),
    /// A buffer pool operation referenced a page absent from the pool.
    #[error("page {0} not resident in buffer pool")]
    NotInPool(u64),
    /// Eviction was attempted but every resident page is pinned.
    #[error("buffer pool is full and every page is pinned")]
    AllPinned,
    /// A transaction method was called while the transaction was in the wrong state.
    #[error("invalid transaction state: {0}")]
    InvalidState(String),
    /// A transactional insert targeted a row-id that already exists.
    #[error("row {0} already exists")]
    AlreadyExists(i64),
    /// A constraint on the data model itself was violated.
    #[error("constraint violation: {0}")]
    Constraint(String),
    /// A lower-level storage failure not covered by the taxonomy above.
    #[error("storage: {0}")]
    Storage(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("snapshot codec: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Runtime configuration for opening an [`Engine`](../engine/struct.Engine.html).
///
/// # Example
/// ```
/// use common::EngineConfig;
/// use std::path::PathBuf;
///
/// let config = EngineConfig::builder()
///     .buffer_pool_capacity(64)
///     .rows_per_page(20)
///     .tree_min_degree(3)
///     .dwb_path(PathBuf::from("./data/doublewrite_buffer.json"))
///     .disk_snapshot_path(PathBuf::from("./data/disk.json"))
///     .index_snapshot_path(PathBuf::from("./data/index.json"))
///     .build();
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct EngineConfig {
    /// Maximum number of pages the buffer pool keeps resident.
    #[builder(default = 16)]
    pub buffer_pool_capacity: usize,
    /// Maximum rows a page accepts before allocation moves to a fresh page.
    #[builder(default = 10)]
    pub rows_per_page: usize,
    /// Minimum degree `t` of the B+ tree index (max keys per node = 2t-1).
    #[builder(default = 2)]
    pub tree_min_degree: usize,
    /// Path the doublewrite buffer's sequential area is persisted to.
    #[builder(default = PathBuf::from("doublewrite_buffer.json"))]
    pub dwb_path: PathBuf,
    /// Path the disk snapshot is written to on shutdown.
    #[builder(default = PathBuf::from("disk.json"))]
    pub disk_snapshot_path: PathBuf,
    /// Path the index snapshot is written to on shutdown.
    #[builder(default = PathBuf::from("index.json"))]
    pub index_snapshot_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer_pool_capacity: 16,
            rows_per_page: 10,
            tree_min_degree: 2,
            dwb_path: PathBuf::from("doublewrite_buffer.json"),
            disk_snapshot_path: PathBuf::from("disk.json"),
            index_snapshot_path: PathBuf::from("index.json"),
        }
    }
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{DbError, DbResult, EngineConfig, Lsn, PageId, Row, RowId, TxId};
    pub use types::Value;
}
