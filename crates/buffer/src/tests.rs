use super::*;
use common::{Row, RowId};
use pretty_assertions::assert_eq;
use tempfile::tempdir;
use types::Value;

fn row(id: i64) -> Row {
    Row::new(vec![Value::Int(id), Value::Text("x".into())])
}

fn pool(capacity: usize, path: &std::path::Path) -> BufferPool {
    BufferPool::new(capacity, Disk::new(), DoublewriteBuffer::new(path))
}

fn seed(disk: &mut Disk, page_id: u64) {
    let mut page = Page::new(PageId(page_id));
    page.put_row(row(page_id as i64)).unwrap();
    disk.write_page(page);
}

#[test]
fn load_page_miss_pins_and_loads_from_disk() {
    let dir = tempdir().unwrap();
    let mut disk = Disk::new();
    seed(&mut disk, 1);
    let bp = BufferPool::new(4, disk, DoublewriteBuffer::new(dir.path().join("dwb.json")));

    let page = bp.load_page(PageId(1)).unwrap();
    assert_eq!(page.pin_count, 1);
    assert_eq!(bp.len(), 1);
}

#[test]
fn load_page_hit_increments_pin_without_reloading() {
    let dir = tempdir().unwrap();
    let mut disk = Disk::new();
    seed(&mut disk, 1);
    let bp = BufferPool::new(4, disk, DoublewriteBuffer::new(dir.path().join("dwb.json")));

    bp.load_page(PageId(1)).unwrap();
    let second = bp.load_page(PageId(1)).unwrap();
    assert_eq!(second.pin_count, 2);
    assert_eq!(bp.len(), 1);
}

#[test]
fn release_unknown_page_fails_not_in_pool() {
    let dir = tempdir().unwrap();
    let bp = pool(2, &dir.path().join("dwb.json"));
    let err = bp.release_page(PageId(9)).unwrap_err();
    assert!(matches!(err, DbError::NotInPool(9)));
}

#[test]
fn release_past_zero_fails_unbalanced_pin() {
    let dir = tempdir().unwrap();
    let mut disk = Disk::new();
    seed(&mut disk, 1);
    let bp = BufferPool::new(4, disk, DoublewriteBuffer::new(dir.path().join("dwb.json")));

    bp.load_page(PageId(1)).unwrap();
    bp.release_page(PageId(1)).unwrap();
    let err = bp.release_page(PageId(1)).unwrap_err();
    assert!(matches!(err, DbError::UnbalancedPin(1)));
}

#[test]
fn mark_dirty_unknown_page_fails_not_in_pool() {
    let dir = tempdir().unwrap();
    let bp = pool(2, &dir.path().join("dwb.json"));
    let err = bp.mark_dirty(PageId(9)).unwrap_err();
    assert!(matches!(err, DbError::NotInPool(9)));
}

#[test]
fn pool_never_exceeds_capacity() {
    let dir = tempdir().unwrap();
    let mut disk = Disk::new();
    for id in 1..=5 {
        seed(&mut disk, id);
    }
    let bp = BufferPool::new(2, disk, DoublewriteBuffer::new(dir.path().join("dwb.json")));

    for id in 1..=5 {
        bp.load_page(PageId(id)).unwrap();
        bp.release_page(PageId(id)).unwrap();
        assert!(bp.len() <= 2);
    }
}

#[test]
fn eviction_skips_pinned_entries() {
    let dir = tempdir().unwrap();
    let mut disk = Disk::new();
    seed(&mut disk, 1);
    seed(&mut disk, 2);
    seed(&mut disk, 3);
    let bp = BufferPool::new(2, disk, DoublewriteBuffer::new(dir.path().join("dwb.json")));

    bp.load_page(PageId(1)).unwrap(); // stays pinned
    bp.load_page(PageId(2)).unwrap();
    bp.release_page(PageId(2)).unwrap();

    // Loading page 3 must evict page 2 (unpinned), not page 1 (pinned).
    bp.load_page(PageId(3)).unwrap();
    assert_eq!(bp.len(), 2);
    assert!(bp.peek(PageId(1)).is_ok());
    assert!(bp.peek(PageId(2)).is_err());
}

#[test]
fn eviction_fails_when_every_page_is_pinned() {
    let dir = tempdir().unwrap();
    let mut disk = Disk::new();
    seed(&mut disk, 1);
    seed(&mut disk, 2);
    seed(&mut disk, 3);
    let bp = BufferPool::new(2, disk, DoublewriteBuffer::new(dir.path().join("dwb.json")));

    bp.load_page(PageId(1)).unwrap();
    bp.load_page(PageId(2)).unwrap();

    let err = bp.load_page(PageId(3)).unwrap_err();
    assert!(matches!(err, DbError::AllPinned));
    assert_eq!(bp.len(), 2);
}

#[test]
fn eviction_writes_back_a_dirty_victim_through_the_doublewrite_buffer() {
    let dir = tempdir().unwrap();
    let mut disk = Disk::new();
    seed(&mut disk, 1);
    seed(&mut disk, 2);
    let bp = BufferPool::new(1, disk, DoublewriteBuffer::new(dir.path().join("dwb.json")));

    bp.load_page(PageId(1)).unwrap();
    bp.mark_dirty(PageId(1)).unwrap();
    bp.release_page(PageId(1)).unwrap();

    // Forces eviction of page 1, which is dirty.
    bp.load_page(PageId(2)).unwrap();
    assert_eq!(bp.len(), 1);
}

#[test]
fn flush_dirty_is_a_noop_with_nothing_dirty() {
    let dir = tempdir().unwrap();
    let bp = pool(2, &dir.path().join("dwb.json"));
    bp.flush_dirty().unwrap();
}

#[test]
fn flush_dirty_persists_all_dirty_pages_and_clears_flags() {
    let dir = tempdir().unwrap();
    let mut disk = Disk::new();
    seed(&mut disk, 1);
    seed(&mut disk, 2);
    let bp = BufferPool::new(4, disk, DoublewriteBuffer::new(dir.path().join("dwb.json")));

    bp.load_page(PageId(1)).unwrap();
    bp.mark_dirty(PageId(1)).unwrap();
    bp.release_page(PageId(1)).unwrap();
    bp.load_page(PageId(2)).unwrap();
    bp.mark_dirty(PageId(2)).unwrap();
    bp.release_page(PageId(2)).unwrap();

    bp.flush_dirty().unwrap();

    assert!(!bp.peek(PageId(1)).unwrap().dirty);
    assert!(!bp.peek(PageId(2)).unwrap().dirty);
}

#[test]
fn add_page_to_memory_is_a_noop_if_already_resident() {
    let dir = tempdir().unwrap();
    let mut disk = Disk::new();
    seed(&mut disk, 1);
    let bp = BufferPool::new(4, disk, DoublewriteBuffer::new(dir.path().join("dwb.json")));

    bp.load_page(PageId(1)).unwrap();
    bp.add_page_to_memory(Page::new(PageId(1))).unwrap();
    assert_eq!(bp.len(), 1);
}

#[test]
fn write_resident_overwrites_contents_and_preserves_pin_state() {
    let dir = tempdir().unwrap();
    let mut disk = Disk::new();
    seed(&mut disk, 1);
    let bp = BufferPool::new(4, disk, DoublewriteBuffer::new(dir.path().join("dwb.json")));

    let mut page = bp.load_page(PageId(1)).unwrap();
    page.put_row(row(99)).unwrap();
    bp.write_resident(page).unwrap();

    let reloaded = bp.peek(PageId(1)).unwrap();
    assert!(reloaded.dirty);
    assert_eq!(reloaded.pin_count, 1);
    assert!(reloaded.get_row(RowId(99)).is_some());
}

#[test]
fn write_resident_of_a_non_resident_page_fails_not_in_pool() {
    let dir = tempdir().unwrap();
    let bp = pool(2, &dir.path().join("dwb.json"));
    let err = bp.write_resident(Page::new(PageId(9))).unwrap_err();
    assert!(matches!(err, DbError::NotInPool(9)));
}

#[test]
fn load_page_propagates_page_missing_from_disk() {
    let dir = tempdir().unwrap();
    let bp = pool(2, &dir.path().join("dwb.json"));
    let err = bp.load_page(PageId(42)).unwrap_err();
    assert!(matches!(err, DbError::PageMissing(42)));
}
