//! Capacity-bounded, pin-aware LRU buffer pool sitting in front of [`Disk`].
//!
//! The LRU order is an intrusive doubly linked list threaded through an arena
//! of slots (`slots: Vec<Option<Slot>>`), keyed by page-id rather than by
//! heap-allocated node pointers — the same trick a GC'd language needs
//! `Rc`/`RefCell` cycles for falls out of plain index arithmetic here.
//! Eviction always walks from the tail and skips pinned entries; if a dirty
//! page is evicted it is written back through the doublewrite buffer first.

#[cfg(test)]
mod tests;

use common::{DbError, DbResult, PageId};
use dwb::DoublewriteBuffer;
use hashbrown::HashMap;
use parking_lot::Mutex;
use storage::{Disk, Page};

struct Slot {
    page: Page,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Inner {
    capacity: usize,
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    index: HashMap<u64, usize>,
    head: Option<usize>,
    tail: Option<usize>,
    disk: Disk,
    dwb: DoublewriteBuffer,
}

impl Inner {
    fn slot(&self, idx: usize) -> &Slot {
        self.slots[idx].as_ref().expect("slot index always refers to a live entry")
    }

    fn slot_mut(&mut self, idx: usize) -> &mut Slot {
        self.slots[idx].as_mut().expect("slot index always refers to a live entry")
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let slot = self.slot(idx);
            (slot.prev, slot.next)
        };
        match prev {
            Some(p) => self.slot_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slot_mut(n).prev = prev,
            None => self.tail = prev,
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let slot = self.slot_mut(idx);
            slot.prev = None;
            slot.next = old_head;
        }
        match old_head {
            Some(h) => self.slot_mut(h).prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    fn touch(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }

    fn insert_new(&mut self, page: Page) -> usize {
        let slot = Slot { page, prev: None, next: None };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(slot);
                idx
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        };
        self.index.insert(self.slot(idx).page.page_id.0, idx);
        self.push_front(idx);
        idx
    }

    fn remove_slot(&mut self, idx: usize) -> Page {
        self.unlink(idx);
        let slot = self.slots[idx].take().expect("removing a live slot");
        self.index.remove(&slot.page.page_id.0);
        self.free.push(idx);
        slot.page
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    /// Writes a single page back to disk through the doublewrite protocol.
    fn write_back(&mut self, page: &Page) -> DbResult<()> {
        self.dwb.add_page(page.clone());
        self.dwb.flush()?;
        self.disk.write_page(page.clone());
        self.dwb.clear();
        Ok(())
    }

    fn evict_one(&mut self) -> DbResult<()> {
        if self.len() < self.capacity {
            return Ok(());
        }
        let mut cursor = self.tail;
        while let Some(idx) = cursor {
            if self.slot(idx).page.pin_count == 0 {
                let dirty = self.slot(idx).page.dirty;
                if dirty {
                    let page = self.slot(idx).page.clone();
                    self.write_back(&page)?;
                }
                self.remove_slot(idx);
                return Ok(());
            }
            cursor = self.slot(idx).prev;
        }
        Err(DbError::AllPinned)
    }
}

/// Capacity-bounded buffer pool covering `Disk` and a `DoublewriteBuffer`.
///
/// A single guard covers the LRU list, the underlying `Disk`, and the
/// doublewrite staging area reached through it, matching the acquisition
/// order that places `Disk` behind the pool with no guard of its own.
pub struct BufferPool {
    inner: Mutex<Inner>,
}

impl BufferPool {
    pub fn new(capacity: usize, disk: Disk, dwb: DoublewriteBuffer) -> Self {
        assert!(capacity > 0, "buffer pool capacity must be > 0");
        Self {
            inner: Mutex::new(Inner {
                capacity,
                slots: Vec::new(),
                free: Vec::new(),
                index: HashMap::new(),
                head: None,
                tail: None,
                disk,
                dwb,
            }),
        }
    }

    /// Fetches a page, pinning it, loading from `Disk` on a miss.
    pub fn load_page(&self, page_id: PageId) -> DbResult<Page> {
        let mut inner = self.inner.lock();
        if let Some(&idx) = inner.index.get(&page_id.0) {
            inner.touch(idx);
            inner.slot_mut(idx).page.pin();
            return Ok(inner.slot(idx).page.clone());
        }

        let mut page = inner.disk.get_page(page_id)?;
        inner.evict_one()?;
        page.pin_count = 1;
        page.pinned = true;
        inner.insert_new(page.clone());
        Ok(page)
    }

    /// Admits an already-constructed page. No-op if the page is already resident.
    pub fn add_page_to_memory(&self, page: Page) -> DbResult<()> {
        let mut inner = self.inner.lock();
        if inner.index.contains_key(&page.page_id.0) {
            return Ok(());
        }
        inner.evict_one()?;
        inner.insert_new(page);
        Ok(())
    }

    /// Releases one pin. Fails<NotInPool> if absent, fails<UnbalancedPin> if over-released.
    pub fn release_page(&self, page_id: PageId) -> DbResult<()> {
        let mut inner = self.inner.lock();
        let idx = *inner
            .index
            .get(&page_id.0)
            .ok_or(DbError::NotInPool(page_id.0))?;
        inner.slot_mut(idx).page.unpin()
    }

    /// Marks a resident page dirty. Fails<NotInPool> if absent.
    pub fn mark_dirty(&self, page_id: PageId) -> DbResult<()> {
        let mut inner = self.inner.lock();
        let idx = *inner
            .index
            .get(&page_id.0)
            .ok_or(DbError::NotInPool(page_id.0))?;
        inner.slot_mut(idx).page.dirty = true;
        Ok(())
    }

    /// Overwrites a resident page's contents in place, preserving its pin
    /// state and LRU position, and marks it dirty. Fails<NotInPool> if the
    /// page is not resident.
    ///
    /// Callers mutate a clone returned by [`Self::load_page`] or
    /// [`Self::peek`] and write it back through here, since every read out
    /// of the pool hands back an independent copy.
    pub fn write_resident(&self, page: Page) -> DbResult<()> {
        let mut inner = self.inner.lock();
        let idx = *inner
            .index
            .get(&page.page_id.0)
            .ok_or(DbError::NotInPool(page.page_id.0))?;
        let slot = inner.slot_mut(idx);
        let pin_count = slot.page.pin_count;
        let pinned = slot.page.pinned;
        slot.page = page;
        slot.page.pin_count = pin_count;
        slot.page.pinned = pinned;
        slot.page.dirty = true;
        Ok(())
    }

    /// Returns a cloned snapshot of a resident page without affecting pin state or LRU order.
    pub fn peek(&self, page_id: PageId) -> DbResult<Page> {
        let inner = self.inner.lock();
        let idx = *inner
            .index
            .get(&page_id.0)
            .ok_or(DbError::NotInPool(page_id.0))?;
        Ok(inner.slot(idx).page.clone())
    }

    /// Checkpoint: stage every dirty page, flush the doublewrite buffer, write
    /// each to its final location, clear dirty flags, then clear staging.
    ///
    /// Ordering is mandatory: staging -> sequential flush -> final writes -> staging clear.
    pub fn flush_dirty(&self) -> DbResult<()> {
        let mut inner = self.inner.lock();
        let dirty_idxs: Vec<usize> = inner
            .index
            .values()
            .copied()
            .filter(|&idx| inner.slot(idx).page.dirty)
            .collect();
        if dirty_idxs.is_empty() {
            return Ok(());
        }

        let pages: Vec<Page> = dirty_idxs.iter().map(|&idx| inner.slot(idx).page.clone()).collect();
        for page in &pages {
            inner.dwb.add_page(page.clone());
        }
        inner.dwb.flush()?;
        for page in &pages {
            inner.disk.write_page(page.clone());
        }
        for &idx in &dirty_idxs {
            inner.slot_mut(idx).page.dirty = false;
        }
        inner.dwb.clear();
        Ok(())
    }

    /// Current number of resident pages.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshots every resident page's disk-backing image to `disk_snapshot_path`.
    ///
    /// Flushes dirty pages first so the snapshot reflects the latest state.
    pub fn dump_disk_to_json(&self, path: impl AsRef<std::path::Path>) -> DbResult<()> {
        self.flush_dirty()?;
        self.inner.lock().disk.dump_to_json(path)
    }

    /// The largest page-id known either to the pool or to `Disk`, or `None`
    /// if no page has ever been admitted or written anywhere.
    pub fn max_known_page_id(&self) -> Option<u64> {
        let inner = self.inner.lock();
        let bp_max = inner.index.keys().copied().max();
        let disk_max = inner.disk.max_page_id();
        bp_max.max(disk_max)
    }

    /// Row count of `page_id`, checked without pinning: resident pages are
    /// read in place, others are peeked from `Disk`. Fails<PageMissing> if
    /// the page is not resident and not on `Disk`.
    pub fn row_count_hint(&self, page_id: PageId) -> DbResult<usize> {
        let inner = self.inner.lock();
        if let Some(&idx) = inner.index.get(&page_id.0) {
            return Ok(inner.slot(idx).page.len());
        }
        Ok(inner.disk.get_page(page_id)?.len())
    }
}
