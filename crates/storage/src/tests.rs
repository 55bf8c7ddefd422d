use super::*;
use pretty_assertions::assert_eq;
use tempfile::tempdir;
use types::Value;

fn row(id: i64, name: &str) -> Row {
    Row::new(vec![Value::Int(id), Value::Text(name.into())])
}

#[test]
fn disk_copies_on_write_and_read() {
    let mut disk = Disk::new();
    let mut page = Page::new(PageId(1));
    page.put_row(row(1, "Alice")).unwrap();
    disk.write_page(page.clone());

    let mut fetched = disk.get_page(PageId(1)).unwrap();
    fetched.put_row(row(2, "Bob")).unwrap();

    // Mutating the fetched copy must not affect what Disk stores.
    let fetched_again = disk.get_page(PageId(1)).unwrap();
    assert_eq!(fetched_again.len(), 1);
    assert_eq!(fetched.len(), 2);
}

#[test]
fn get_missing_page_fails() {
    let disk = Disk::new();
    let err = disk.get_page(PageId(9)).unwrap_err();
    assert!(matches!(err, DbError::PageMissing(9)));
}

#[test]
fn delete_missing_page_fails() {
    let mut disk = Disk::new();
    let err = disk.delete_page(PageId(9)).unwrap_err();
    assert!(matches!(err, DbError::PageMissing(9)));
}

#[test]
fn current_page_id_defaults_to_one_when_empty() {
    let disk = Disk::new();
    assert_eq!(disk.current_page_id(), 1);
}

#[test]
fn current_page_id_tracks_the_largest_id() {
    let mut disk = Disk::new();
    disk.write_page(Page::new(PageId(1)));
    disk.write_page(Page::new(PageId(5)));
    disk.write_page(Page::new(PageId(3)));
    assert_eq!(disk.current_page_id(), 5);
}

#[test]
fn page_rejects_row_whose_key_does_not_match_its_row_id() {
    let mut page = Page::new(PageId(1));
    page.put_row(row(1, "Alice")).unwrap();
    assert_eq!(page.get_row(RowId(1)).unwrap().values[1], Value::Text("Alice".into()));
    assert!(page.get_row(RowId(2)).is_none());
}

#[test]
fn pin_unpin_balance() {
    let mut page = Page::new(PageId(1));
    page.pin();
    page.pin();
    assert_eq!(page.pin_count, 2);
    page.unpin().unwrap();
    assert_eq!(page.pin_count, 1);
    assert!(page.pinned);
    page.unpin().unwrap();
    assert_eq!(page.pin_count, 0);
    assert!(!page.pinned);
}

#[test]
fn unpin_below_zero_fails() {
    let mut page = Page::new(PageId(1));
    let err = page.unpin().unwrap_err();
    assert!(matches!(err, DbError::UnbalancedPin(1)));
}

#[test]
fn disk_json_round_trip_preserves_rows() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("disk.json");

    let mut disk = Disk::new();
    let mut page = Page::new(PageId(1));
    page.put_row(row(1, "Alice")).unwrap();
    page.put_row(row(2, "Bob")).unwrap();
    page.page_lsn = 42;
    disk.write_page(page);

    disk.dump_to_json(&path).unwrap();
    let reloaded = Disk::load_from_json(&path).unwrap();

    let original_row = Disk::load_from_json(&path).unwrap().get_page(PageId(1)).unwrap();
    let reloaded_row = reloaded.get_page(PageId(1)).unwrap();
    assert_eq!(reloaded_row.rows.len(), 2);
    assert_eq!(original_row.page_lsn, 42);
    assert_eq!(
        reloaded_row.get_row(RowId(1)).unwrap().values,
        vec![Value::Int(1), Value::Text("Alice".into())]
    );
}
