//! Top-level open/shutdown surface wiring storage, buffer pool, index, and
//! transaction manager together.
//!
//! `Engine` owns the process-wide monotonic txid and lsn allocators; every
//! other piece of state lives behind its own guard one level down, per the
//! acquisition order LockTable -> Operation -> BufferPool -> DoublewriteBuffer -> Disk.

mod operation;


pub use operation::Operation;

use btree::BPlusTree;
use buffer::BufferPool;
use common::{DbResult, EngineConfig, Lsn, Row, RowId, TxId};
use dwb::DoublewriteBuffer;
use parking_lot::Mutex;
use std::sync::Arc;
use storage::Disk;
use txn::{LockTable, RedoLog, Transaction, TransactionTable};

pub struct Engine {
    config: EngineConfig,
    buffer: Arc<BufferPool>,
    operation: Arc<Operation>,
    locks: Arc<LockTable>,
    redo: Arc<RedoLog>,
    table: Arc<TransactionTable>,
    next_txid: Mutex<u64>,
    next_lsn: Mutex<u64>,
}

impl Engine {
    /// Opens an engine, reloading the disk and index snapshots named by
    /// `config` if they already exist on disk, or starting empty otherwise.
    pub fn open(config: EngineConfig) -> DbResult<Self> {
        let disk = if config.disk_snapshot_path.exists() {
            Disk::load_from_json(&config.disk_snapshot_path)?
        } else {
            Disk::new()
        };
        let index = if config.index_snapshot_path.exists() {
            BPlusTree::load_from_json(&config.index_snapshot_path, config.tree_min_degree)?
        } else {
            BPlusTree::new(config.tree_min_degree)
        };
        let dwb = DoublewriteBuffer::new(config.dwb_path.clone());
        let buffer = Arc::new(BufferPool::new(config.buffer_pool_capacity, disk, dwb));
        let operation = Arc::new(Operation::new(buffer.clone(), index, config.rows_per_page));

        Ok(Self {
            config,
            buffer,
            operation,
            locks: Arc::new(LockTable::new()),
            redo: Arc::new(RedoLog::new()),
            table: Arc::new(TransactionTable::new()),
            next_txid: Mutex::new(1),
            next_lsn: Mutex::new(1),
        })
    }

    fn mint_lsn(&self) -> Lsn {
        let mut next = self.next_lsn.lock();
        let lsn = Lsn(*next);
        *next += 1;
        lsn
    }

    fn mint_txid(&self) -> TxId {
        let mut next = self.next_txid.lock();
        let txid = TxId(*next);
        *next += 1;
        txid
    }

    pub fn get_row(&self, row_id: RowId) -> DbResult<Row> {
        self.operation.get_row(row_id)
    }

    /// Non-transactional upsert: mints its own lsn and goes straight through
    /// `Operation`, with no locking or undo/redo involved.
    pub fn insert_row(&self, row: Row) -> DbResult<()> {
        let lsn = self.mint_lsn();
        self.operation.insert_row(row, lsn)
    }

    /// Flushes dirty pages and snapshots disk and index to the paths named
    /// by the engine's config.
    pub fn shutdown(&self) -> DbResult<()> {
        self.operation.checkpoint()?;
        self.buffer.dump_disk_to_json(&self.config.disk_snapshot_path)?;
        self.operation.dump_index_to_json(&self.config.index_snapshot_path)?;
        Ok(())
    }

    /// Begins a transaction bound to this engine's lock table, redo log, and
    /// transaction table, driving row mutations through this engine's `Operation`.
    pub fn begin(&self) -> Transaction<Operation> {
        let txid = self.mint_txid();
        Transaction::begin(
            txid,
            self.operation.clone(),
            self.locks.clone(),
            self.redo.clone(),
            self.table.clone(),
        )
    }

    pub fn tx_insert_row(&self, tx: &mut Transaction<Operation>, row: Row) -> DbResult<()> {
        let lsn = self.mint_lsn();
        tx.tx_insert_row(row, lsn)
    }

    pub fn tx_update_row(&self, tx: &mut Transaction<Operation>, row_id: RowId, row: Row) -> DbResult<()> {
        let lsn = self.mint_lsn();
        tx.tx_update_row(row_id, row, lsn)
    }

    pub fn tx_delete_row(&self, tx: &mut Transaction<Operation>, row_id: RowId) -> DbResult<()> {
        let lsn = self.mint_lsn();
        tx.tx_delete_row(row_id, lsn)
    }

    /// Rolls `tx` back, minting the lsn its undo replay tags its page
    /// mutations with. `tx.commit()` needs no such plumbing and can be
    /// called directly.
    pub fn tx_rollback(&self, tx: &mut Transaction<Operation>) -> DbResult<()> {
        let lsn = self.mint_lsn();
        tx.rollback(lsn)
    }
}
