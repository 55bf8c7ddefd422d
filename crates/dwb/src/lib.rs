//! Doublewrite staging area guarding pages against torn writes.
//!
//! Mirrors InnoDB's doublewrite buffer:
//! - Pages are first staged in memory, then copied into a simulated
//!   sequential area and persisted as one unit (`flush`).
//! - Only after that sequential write succeeds are pages written to their
//!   scattered final locations by the caller.
//! - If a crash happened mid-final-write, `recover` reconstructs a page from
//!   the sequential area, which is retained until the caller explicitly
//!   clears it.


use common::{DbResult, PageId, Row};
use hashbrown::HashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use storage::Page;

struct Inner {
    staging: HashMap<u64, Page>,
    sequential_area: HashMap<u64, Page>,
    path: PathBuf,
}

/// Staged-page count and sequential-area page count, for post-mortem inspection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DwbStats {
    pub staged_pages: usize,
    pub area_pages: usize,
}

/// Process-wide doublewrite staging area. One guard covers both layers.
pub struct DoublewriteBuffer {
    inner: Mutex<Inner>,
}

impl DoublewriteBuffer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                staging: HashMap::new(),
                sequential_area: HashMap::new(),
                path: path.into(),
            }),
        }
    }

    /// Stages an independent copy of `page`. Never fails.
    pub fn add_page(&self, page: Page) {
        let mut inner = self.inner.lock();
        inner.staging.insert(page.page_id.0, page);
    }

    /// Copies every staged page into the sequential area and persists it.
    ///
    /// No-op if staging is empty.
    pub fn flush(&self) -> DbResult<()> {
        let mut inner = self.inner.lock();
        if inner.staging.is_empty() {
            return Ok(());
        }
        for (page_id, page) in inner.staging.clone() {
            inner.sequential_area.insert(page_id, page);
        }
        persist_area(&inner.path, &inner.sequential_area)?;
        Ok(())
    }

    /// Looks up a page in the sequential area, returning an independent copy.
    pub fn recover(&self, page_id: PageId) -> Option<Page> {
        self.inner.lock().sequential_area.get(&page_id.0).cloned()
    }

    /// Empties the staging area only. The sequential area is untouched.
    pub fn clear(&self) {
        self.inner.lock().staging.clear();
    }

    /// Empties the sequential area too, persisting the now-empty area.
    pub fn clear_area(&self) -> DbResult<()> {
        let mut inner = self.inner.lock();
        inner.sequential_area.clear();
        persist_area(&inner.path, &inner.sequential_area)
    }

    pub fn stats(&self) -> DwbStats {
        let inner = self.inner.lock();
        DwbStats {
            staged_pages: inner.staging.len(),
            area_pages: inner.sequential_area.len(),
        }
    }
}

/// On-disk shape of a doublewrite area entry: deliberately narrower than
/// `storage::Page` — pin state is buffer-pool bookkeeping, not durable.
#[derive(Serialize)]
struct DwbPageRecord<'a> {
    page_id: u64,
    rows: &'a HashMap<i64, Row>,
    page_lsn: u64,
    dirty: bool,
}

fn persist_area(path: &std::path::Path, area: &HashMap<u64, Page>) -> DbResult<()> {
    let records: HashMap<u64, DwbPageRecord<'_>> = area
        .iter()
        .map(|(id, page)| {
            (
                *id,
                DwbPageRecord {
                    page_id: page.page_id.0,
                    rows: &page.rows,
                    page_lsn: page.page_lsn,
                    dirty: page.dirty,
                },
            )
        })
        .collect();
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), &records)?;
    Ok(())
}
