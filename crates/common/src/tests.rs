use super::*;
use std::io;

#[test]
fn config_defaults_are_sane() {
    let cfg = EngineConfig::default();
    assert_eq!(cfg.buffer_pool_capacity, 16);
    assert_eq!(cfg.rows_per_page, 10);
    assert_eq!(cfg.tree_min_degree, 2);
}

#[test]
fn builder_overrides_defaults() {
    let cfg = EngineConfig::builder()
        .buffer_pool_capacity(4)
        .rows_per_page(6)
        .build();
    assert_eq!(cfg.buffer_pool_capacity, 4);
    assert_eq!(cfg.rows_per_page, 6);
    assert_eq!(cfg.tree_min_degree, 2);
}

#[test]
fn db_error_formats_cleanly() {
    let err = DbError::Storage("corruption".into());
    assert!(format!("{err}").contains("storage"));

    let err = DbError::RowMissing(7);
    assert!(format!("{err}").contains('7'));
}

#[test]
fn row_id_extracts_leading_integer() {
    let row = Row::new(vec![Value::Int(4), Value::Text("Dave".into())]);
    assert_eq!(row.row_id().unwrap(), RowId(4));
}

#[test]
fn row_id_rejects_missing_or_non_integer_leader() {
    let empty = Row::new(vec![]);
    assert!(empty.row_id().is_err());

    let bad = Row::new(vec![Value::Text("nope".into())]);
    assert!(bad.row_id().is_err());
}

#[test]
fn io_error_converts() {
    let e = io::Error::other("oops");
    let db_err: DbError = e.into();
    assert!(matches!(db_err, DbError::Io(_)));
}
