//! Row-level CRUD, page allocation, and index/buffer coordination.
//!
//! `Operation` is the thing a [`txn::Transaction`] drives through the
//! [`RowExecutor`] trait; it is also a standalone non-transactional surface
//! in its own right (`Engine::get_row`/`Engine::insert_row` go straight
//! through it with no lock/undo/redo involved).

use btree::BPlusTree;
use buffer::BufferPool;
use common::{DbError, DbResult, Lsn, PageId, Row, RowId};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use storage::Page;
use txn::RowExecutor;

pub struct Operation {
    buffer: Arc<BufferPool>,
    index: Mutex<BPlusTree>,
    rows_per_page: usize,
}

impl Operation {
    pub fn new(buffer: Arc<BufferPool>, index: BPlusTree, rows_per_page: usize) -> Self {
        Self {
            buffer,
            index: Mutex::new(index),
            rows_per_page,
        }
    }

    pub fn get_page_id(&self, row_id: RowId) -> Option<PageId> {
        self.index.lock().get(row_id)
    }

    /// Fails<RowMissing> if unindexed; propagates Fails<PageMissing> from a
    /// stale index entry, which would mean index and disk have diverged.
    pub fn get_row(&self, row_id: RowId) -> DbResult<Row> {
        let page_id = self.get_page_id(row_id).ok_or(DbError::RowMissing(row_id.0))?;
        let page = self.buffer.load_page(page_id)?;
        let row = page.get_row(row_id).cloned();
        self.buffer.release_page(page_id)?;
        row.ok_or(DbError::RowMissing(row_id.0))
    }

    /// Decides which page a fresh insert lands on and pins it so it cannot
    /// be evicted before the row is actually written; the caller releases
    /// that pin exactly once when the write completes.
    ///
    /// `current_page_id` is the largest page-id known either to the buffer
    /// pool or to disk. If it exists and holds fewer than `rows_per_page`
    /// rows it is the target; otherwise a fresh page is minted, pinned, and
    /// admitted.
    pub fn allocate_target_page(&self) -> DbResult<PageId> {
        match self.buffer.max_known_page_id() {
            None => {
                let page_id = PageId(1);
                let mut page = Page::new(page_id);
                page.pin();
                self.buffer.add_page_to_memory(page)?;
                Ok(page_id)
            }
            Some(max) => {
                let page_id = PageId(max);
                if self.buffer.row_count_hint(page_id)? < self.rows_per_page {
                    self.buffer.load_page(page_id)?;
                    Ok(page_id)
                } else {
                    let fresh = PageId(max + 1);
                    let mut page = Page::new(fresh);
                    page.pin();
                    self.buffer.add_page_to_memory(page)?;
                    Ok(fresh)
                }
            }
        }
    }

    /// Writes `row` into the page `allocate_target_page` already pinned for
    /// it, then releases that pin. Reads through `peek` rather than
    /// `load_page` since the page is guaranteed resident already and a
    /// second pin here would leave the protective one stranded.
    fn insert_at(&self, row: Row, page_id: PageId, lsn: Lsn) -> DbResult<()> {
        let row_id = row.row_id()?;
        let mut page = self.buffer.peek(page_id)?;
        page.put_row(row)?;
        page.page_lsn = lsn.0;
        self.buffer.write_resident(page)?;
        self.buffer.release_page(page_id)?;
        self.index.lock().put(row_id, page_id);
        Ok(())
    }

    pub fn update_row(&self, _row_id: RowId, new_row: Row, page_id: PageId, lsn: Lsn) -> DbResult<()> {
        let mut page = self.buffer.load_page(page_id)?;
        page.put_row(new_row)?;
        page.page_lsn = lsn.0;
        self.buffer.write_resident(page)?;
        self.buffer.release_page(page_id)
    }

    pub fn delete_row(&self, row_id: RowId, page_id: PageId, lsn: Lsn) -> DbResult<()> {
        let mut page = self.buffer.load_page(page_id)?;
        page.remove_row(row_id);
        page.page_lsn = lsn.0;
        self.buffer.write_resident(page)?;
        self.buffer.release_page(page_id)?;
        self.index.lock().remove(row_id);
        Ok(())
    }

    /// Non-transactional convenience: upserts `row`, delegating to
    /// `update_row` when its row-id is already indexed.
    pub fn insert_row(&self, row: Row, next_lsn: Lsn) -> DbResult<()> {
        let row_id = row.row_id()?;
        if let Some(page_id) = self.get_page_id(row_id) {
            return self.update_row(row_id, row, page_id, next_lsn);
        }
        let page_id = self.allocate_target_page()?;
        self.insert_at(row, page_id, next_lsn)
    }

    pub fn checkpoint(&self) -> DbResult<()> {
        self.buffer.flush_dirty()
    }

    pub fn dump_index_to_json(&self, path: impl AsRef<Path>) -> DbResult<()> {
        self.index.lock().dump_to_json(path)
    }
}

impl RowExecutor for Operation {
    fn get_row(&self, row_id: RowId) -> DbResult<Row> {
        Operation::get_row(self, row_id)
    }

    fn get_page_id(&self, row_id: RowId) -> Option<PageId> {
        Operation::get_page_id(self, row_id)
    }

    fn allocate_target_page(&self) -> DbResult<PageId> {
        Operation::allocate_target_page(self)
    }

    fn insert_row(&self, row: Row, page_id: PageId, lsn: Lsn) -> DbResult<()> {
        self.insert_at(row, page_id, lsn)
    }

    fn update_row(&self, row_id: RowId, new_row: Row, page_id: PageId, lsn: Lsn) -> DbResult<()> {
        Operation::update_row(self, row_id, new_row, page_id, lsn)
    }

    fn delete_row(&self, row_id: RowId, page_id: PageId, lsn: Lsn) -> DbResult<()> {
        Operation::delete_row(self, row_id, page_id, lsn)
    }
}
