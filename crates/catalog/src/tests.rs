use super::*;
use std::path::PathBuf;
use tempfile::tempdir;

fn sample_columns() -> Vec<Column> {
    vec![
        Column::new("id", SqlType::Int),
        Column::new("name", SqlType::Text),
        Column::new("age", SqlType::Int),
    ]
}

#[test]
fn create_and_lookup_table() {
    let mut catalog = Catalog::new();
    let table_id = catalog
        .create_table("users", sample_columns(), PathBuf::from("users.tbl"))
        .unwrap();

    assert_eq!(table_id, TableId(1));

    let table = catalog.table("users").unwrap();
    assert_eq!(table.schema.column_index("name"), Some(1));
    assert_eq!(table.schema.column_type(1), Some(&SqlType::Text));
}

#[test]
fn create_table_rejects_duplicate_names() {
    let mut catalog = Catalog::new();
    catalog
        .create_table("users", sample_columns(), PathBuf::from("users.tbl"))
        .unwrap();

    let err = catalog
        .create_table("users", sample_columns(), PathBuf::from("users2.tbl"))
        .unwrap_err();
    assert!(matches!(err, DbError::Catalog(_)));
}

#[test]
fn schema_rejects_duplicate_columns() {
    let columns = vec![Column::new("id", SqlType::Int), Column::new("id", SqlType::Bool)];
    let err = TableSchema::try_new(columns).unwrap_err();
    assert!(matches!(err, DbError::Catalog(_)));
}

#[test]
fn schema_rejects_empty_column_list() {
    let err = TableSchema::try_new(vec![]).unwrap_err();
    assert!(matches!(err, DbError::Catalog(_)));
}

#[test]
fn table_by_id_matches_table_by_name() {
    let mut catalog = Catalog::new();
    let table_id = catalog
        .create_table("orders", sample_columns(), PathBuf::from("orders.tbl"))
        .unwrap();

    let by_name = catalog.table("orders").unwrap();
    let by_id = catalog.table_by_id(table_id).unwrap();
    assert_eq!(by_name.id, by_id.id);
}

#[test]
fn drop_table_removes_it_and_renumbers_lookups() {
    let mut catalog = Catalog::new();
    catalog
        .create_table("a", sample_columns(), PathBuf::from("a.tbl"))
        .unwrap();
    catalog
        .create_table("b", sample_columns(), PathBuf::from("b.tbl"))
        .unwrap();

    catalog.drop_table("a").unwrap();

    assert!(catalog.table("a").is_err());
    assert!(catalog.table("b").is_ok());
}

#[test]
fn save_and_load_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("catalog.json");

    let mut catalog = Catalog::new();
    catalog
        .create_table("users", sample_columns(), PathBuf::from("users.tbl"))
        .unwrap();
    catalog.save(&path).unwrap();

    let loaded = Catalog::load(&path).unwrap();
    let table = loaded.table("users").unwrap();
    assert_eq!(table.schema.column_index("age"), Some(2));
}

#[test]
fn load_missing_file_returns_empty_catalog() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("does-not-exist.json");

    let catalog = Catalog::load(&path).unwrap();
    assert_eq!(catalog.tables().count(), 0);
}
