//! ACID transaction state machine.
//!
//! A `Transaction` is a capability handle: it holds only the interfaces it
//! needs (the lock table, the redo/undo sinks, and a row executor) rather
//! than a reference to the whole engine. This breaks the
//! transaction-calls-back-into-the-engine cycle the original design had.

use crate::lock::LockTable;
use crate::log::{LogAction, RedoLog, RedoRecord, UndoLog, UndoRecord};
use crate::table::{TransactionTable, TxStatus};
use common::{DbError, DbResult, Lsn, PageId, Row, RowId, TxId};
use std::sync::Arc;

/// The row-level mutation surface a `Transaction` drives.
///
/// Implemented by the engine's `Operation` type; kept as a trait here so
/// this crate has no dependency on the engine crate.
pub trait RowExecutor {
    fn get_row(&self, row_id: RowId) -> DbResult<Row>;
    fn get_page_id(&self, row_id: RowId) -> Option<PageId>;
    /// Decides (without writing) the page a fresh insert would land on.
    fn allocate_target_page(&self) -> DbResult<PageId>;
    fn insert_row(&self, row: Row, page_id: PageId, lsn: Lsn) -> DbResult<()>;
    fn update_row(&self, row_id: RowId, new_row: Row, page_id: PageId, lsn: Lsn) -> DbResult<()>;
    fn delete_row(&self, row_id: RowId, page_id: PageId, lsn: Lsn) -> DbResult<()>;
}

pub struct Transaction<E: RowExecutor> {
    pub txid: TxId,
    state: TxStatus,
    executor: Arc<E>,
    locks: Arc<LockTable>,
    redo: Arc<RedoLog>,
    table: Arc<TransactionTable>,
    undo: UndoLog,
    appended_redo: bool,
}

impl<E: RowExecutor> Transaction<E> {
    pub fn begin(
        txid: TxId,
        executor: Arc<E>,
        locks: Arc<LockTable>,
        redo: Arc<RedoLog>,
        table: Arc<TransactionTable>,
    ) -> Self {
        table.register(txid, TxStatus::Active);
        Self {
            txid,
            state: TxStatus::Active,
            executor,
            locks,
            redo,
            table,
            undo: UndoLog::new(),
            appended_redo: false,
        }
    }

    pub fn state(&self) -> TxStatus {
        self.state
    }

    fn ensure_active(&self) -> DbResult<()> {
        if self.state != TxStatus::Active {
            return Err(DbError::InvalidState(format!(
                "transaction {} is not active",
                self.txid.0
            )));
        }
        Ok(())
    }

    /// Inserts `row`. Fails<AlreadyExists> if its row-id is already indexed;
    /// fails<LockConflict> if another transaction holds the row.
    pub fn tx_insert_row(&mut self, row: Row, next_lsn: Lsn) -> DbResult<()> {
        self.ensure_active()?;
        let row_id = row.row_id()?;
        if self.executor.get_page_id(row_id).is_some() {
            return Err(DbError::AlreadyExists(row_id.0));
        }
        if !self.locks.try_acquire(self.txid, row_id) {
            return Err(DbError::LockConflict(row_id.0));
        }

        let page_id = self.executor.allocate_target_page()?;
        self.undo.push(UndoRecord {
            row_id,
            page_id,
            old_value: None,
            action: LogAction::Insert,
        });
        self.redo.append(RedoRecord {
            lsn: next_lsn,
            txid: self.txid,
            action: LogAction::Insert,
            payload: Some(row.clone()),
            page_id,
        });
        self.appended_redo = true;

        self.executor.insert_row(row, page_id, next_lsn)
    }

    /// Updates `row_id` to `new_row`. Fails<RowMissing> if unindexed,
    /// fails<LockConflict> if held by another transaction.
    pub fn tx_update_row(&mut self, row_id: RowId, new_row: Row, next_lsn: Lsn) -> DbResult<()> {
        self.ensure_active()?;
        let page_id = self
            .executor
            .get_page_id(row_id)
            .ok_or(DbError::RowMissing(row_id.0))?;
        if !self.locks.try_acquire(self.txid, row_id) {
            return Err(DbError::LockConflict(row_id.0));
        }
        let old = self.executor.get_row(row_id)?;

        self.undo.push(UndoRecord {
            row_id,
            page_id,
            old_value: Some(old),
            action: LogAction::Update,
        });
        self.redo.append(RedoRecord {
            lsn: next_lsn,
            txid: self.txid,
            action: LogAction::Update,
            payload: Some(new_row.clone()),
            page_id,
        });
        self.appended_redo = true;

        self.executor.update_row(row_id, new_row, page_id, next_lsn)
    }

    /// Deletes `row_id`. Fails<RowMissing> if unindexed,
    /// fails<LockConflict> if held by another transaction.
    pub fn tx_delete_row(&mut self, row_id: RowId, next_lsn: Lsn) -> DbResult<()> {
        self.ensure_active()?;
        let page_id = self
            .executor
            .get_page_id(row_id)
            .ok_or(DbError::RowMissing(row_id.0))?;
        if !self.locks.try_acquire(self.txid, row_id) {
            return Err(DbError::LockConflict(row_id.0));
        }
        let old = self.executor.get_row(row_id)?;

        self.undo.push(UndoRecord {
            row_id,
            page_id,
            old_value: Some(old),
            action: LogAction::Delete,
        });
        self.redo.append(RedoRecord {
            lsn: next_lsn,
            txid: self.txid,
            action: LogAction::Delete,
            payload: None,
            page_id,
        });
        self.appended_redo = true;

        self.executor.delete_row(row_id, page_id, next_lsn)
    }

    /// Commit sequence: ACTIVE -> PREPARING, flush redo if any was appended,
    /// PREPARING -> COMMITTED, release locks, clear undo.
    ///
    /// Fails<InvalidState> unless currently ACTIVE.
    pub fn commit(&mut self) -> DbResult<()> {
        self.ensure_active()?;
        self.state = TxStatus::Preparing;
        self.table.set_status(self.txid, TxStatus::Preparing);

        if self.appended_redo {
            self.redo.flush();
        }

        self.state = TxStatus::Committed;
        self.table.set_status(self.txid, TxStatus::Committed);
        self.locks.release_all(self.txid);
        self.undo.clear();
        Ok(())
    }

    /// Rollback sequence: reverse-replay undo, transition to ABORTED, release locks.
    ///
    /// `next_lsn` tags the page mutations the replay performs.
    /// Fails<InvalidState> if already COMMITTED or ABORTED.
    pub fn rollback(&mut self, next_lsn: Lsn) -> DbResult<()> {
        if matches!(self.state, TxStatus::Committed | TxStatus::Aborted) {
            return Err(DbError::InvalidState(format!(
                "transaction {} cannot be rolled back from {:?}",
                self.txid.0, self.state
            )));
        }

        let records: Vec<UndoRecord> = self.undo.iter_rev().cloned().collect();
        for record in records {
            match record.action {
                LogAction::Insert => {
                    self.executor.delete_row(record.row_id, record.page_id, next_lsn)?;
                }
                LogAction::Update => {
                    let old = record.old_value.expect("update undo record always carries an old value");
                    self.executor.update_row(record.row_id, old, record.page_id, next_lsn)?;
                }
                LogAction::Delete => {
                    let old = record.old_value.expect("delete undo record always carries an old value");
                    let page_id = self.executor.allocate_target_page()?;
                    self.executor.insert_row(old, page_id, next_lsn)?;
                }
            }
        }

        self.state = TxStatus::Aborted;
        self.table.set_status(self.txid, TxStatus::Aborted);
        self.locks.release_all(self.txid);
        self.undo.clear();
        Ok(())
    }
}
