//! Write-ahead redo logging (process-wide) and per-transaction undo logging.

use common::{Lsn, PageId, Row, RowId, TxId};
use parking_lot::Mutex;

/// The kind of row mutation a log record describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogAction {
    Insert,
    Update,
    Delete,
}

#[derive(Clone, Debug)]
pub struct RedoRecord {
    pub lsn: Lsn,
    pub txid: TxId,
    pub action: LogAction,
    pub payload: Option<Row>,
    pub page_id: PageId,
}

struct RedoInner {
    records: Vec<RedoRecord>,
    flushed_lsn: Lsn,
}

/// Ordered, append-only, process-wide redo log.
///
/// `flush()` sets `flushed_lsn` to the last appended record's lsn; it never
/// inspects an unpopulated watermark field the way the source's buggy
/// `redo_lsns` did.
pub struct RedoLog {
    inner: Mutex<RedoInner>,
}

impl RedoLog {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RedoInner {
                records: Vec::new(),
                flushed_lsn: Lsn(0),
            }),
        }
    }

    pub fn append(&self, record: RedoRecord) {
        self.inner.lock().records.push(record);
    }

    /// Sets `flushed_lsn` to the last record's lsn. No-op if empty.
    pub fn flush(&self) {
        let mut inner = self.inner.lock();
        if let Some(last) = inner.records.last() {
            inner.flushed_lsn = last.lsn;
        }
    }

    pub fn clear(&self) {
        self.inner.lock().records.clear();
    }

    pub fn flushed_lsn(&self) -> Lsn {
        self.inner.lock().flushed_lsn
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RedoLog {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct UndoRecord {
    pub row_id: RowId,
    pub page_id: PageId,
    pub old_value: Option<Row>,
    pub action: LogAction,
}

/// Ordered, per-transaction undo log. Rollback replays it in reverse.
#[derive(Default)]
pub struct UndoLog {
    records: Vec<UndoRecord>,
}

impl UndoLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: UndoRecord) {
        self.records.push(record);
    }

    pub fn iter_rev(&self) -> impl Iterator<Item = &UndoRecord> {
        self.records.iter().rev()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
