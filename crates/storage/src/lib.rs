//! Fixed-capacity page storage and the simulated durable medium beneath it.
//!
//! A [`Page`] is the unit of storage: an ordered-by-id mapping from row-id to
//! row tuple plus the bookkeeping (`page_lsn`, `dirty`, `pin_count`) the
//! buffer pool needs. [`Disk`] is the durable map from page-id to `Page`;
//! every read and write copies the page by value so no caller ever holds an
//! alias into disk-resident state.

#[cfg(test)]
mod tests;

use common::{DbError, DbResult, PageId, Row, RowId};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// A fixed unit of storage: a row-id keyed map of tuples plus bookkeeping.
///
/// Mutation always goes through a pinning holder (the buffer pool); `Page`
/// itself only enforces that `rows` stays keyed by each row's own row-id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Page {
    pub page_id: PageId,
    pub rows: HashMap<i64, Row>,
    pub page_lsn: u64,
    pub dirty: bool,
    pub pinned: bool,
    pub pin_count: u32,
}

impl Page {
    /// Creates an empty page with the given id and no mutations recorded yet.
    pub fn new(page_id: PageId) -> Self {
        Self {
            page_id,
            rows: HashMap::new(),
            page_lsn: 0,
            dirty: false,
            pinned: false,
            pin_count: 0,
        }
    }

    /// Inserts or overwrites `row` under its own row-id.
    pub fn put_row(&mut self, row: Row) -> DbResult<()> {
        let row_id = row.row_id()?;
        self.rows.insert(row_id.0, row);
        Ok(())
    }

    pub fn get_row(&self, row_id: RowId) -> Option<&Row> {
        self.rows.get(&row_id.0)
    }

    pub fn remove_row(&mut self, row_id: RowId) -> Option<Row> {
        self.rows.remove(&row_id.0)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Adds one reservation against eviction.
    pub fn pin(&mut self) {
        self.pin_count += 1;
        self.pinned = true;
    }

    /// Releases one reservation against eviction.
    ///
    /// Fails<UnbalancedPin> if the page was not pinned.
    pub fn unpin(&mut self) -> DbResult<()> {
        if self.pin_count == 0 {
            return Err(DbError::UnbalancedPin(self.page_id.0));
        }
        self.pin_count -= 1;
        self.pinned = self.pin_count > 0;
        Ok(())
    }
}

/// The durable map from page-id to [`Page`].
///
/// `get_page`/`write_page` copy by value: no reference into `Disk`'s internal
/// map ever escapes to a caller.
#[derive(Debug, Default)]
pub struct Disk {
    pages: HashMap<u64, Page>,
}

impl Disk {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
        }
    }

    /// Returns a freshly cloned copy of the stored page.
    ///
    /// Fails<PageMissing> if no page with this id has ever been written.
    pub fn get_page(&self, page_id: PageId) -> DbResult<Page> {
        self.pages
            .get(&page_id.0)
            .cloned()
            .ok_or(DbError::PageMissing(page_id.0))
    }

    /// Stores an independent copy of `page`, replacing any prior value.
    pub fn write_page(&mut self, page: Page) {
        self.pages.insert(page.page_id.0, page);
    }

    /// Removes a page permanently.
    ///
    /// Fails<PageMissing> if no page with this id is stored.
    pub fn delete_page(&mut self, page_id: PageId) -> DbResult<()> {
        self.pages
            .remove(&page_id.0)
            .map(|_| ())
            .ok_or(DbError::PageMissing(page_id.0))
    }

    /// Returns the largest stored page-id, if any page has ever been written.
    pub fn max_page_id(&self) -> Option<u64> {
        self.pages.keys().copied().max()
    }

    /// Returns the largest stored page-id, or 1 when the disk is empty.
    pub fn current_page_id(&self) -> u64 {
        self.max_page_id().unwrap_or(1)
    }

    pub fn contains(&self, page_id: PageId) -> bool {
        self.pages.contains_key(&page_id.0)
    }

    /// Writes every stored page to `path` as the `disk.json` snapshot schema.
    pub fn dump_to_json(&self, path: impl AsRef<Path>) -> DbResult<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.pages)?;
        Ok(())
    }

    /// Reloads a `Disk` from a previously-dumped `disk.json` snapshot.
    pub fn load_from_json(path: impl AsRef<Path>) -> DbResult<Self> {
        let file = File::open(path)?;
        let pages: HashMap<u64, Page> = serde_json::from_reader(file)?;
        Ok(Self { pages })
    }
}
