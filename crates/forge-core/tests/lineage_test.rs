//! Lineage resolution against a database file, including corrupted parent links.

mod common;

use forge_core::{Database, NewDataset};

#[tokio::test]
async fn test_lineage_walks_to_root() {
    let platform = common::platform();
    let ids = common::seed_datasets(&platform);

    let lineage = platform.get_lineage(&ids[2]).unwrap();
    let names: Vec<&str> = lineage.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, ["alpaca-filtered", "instruct-alpaca-cleaned"]);
}

#[tokio::test]
async fn test_cyclic_parent_links_terminate() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("forge.db");
    let platform = common::platform_at(&db_path);

    let c = platform.register_dataset(NewDataset::new("c", "1.0.0", "s3://c")).unwrap();
    let b = platform
        .register_dataset(NewDataset::new("b", "1.0.0", "s3://b").with_parent(&c.id))
        .unwrap();
    let a = platform
        .register_dataset(NewDataset::new("a", "1.0.0", "s3://a").with_parent(&b.id))
        .unwrap();

    // Corrupt the chain behind the platform's back: C -> A
    let raw = Database::open(&db_path.display().to_string()).unwrap();
    raw.conn()
        .execute("UPDATE datasets SET parent_dataset_id = ?1 WHERE id = ?2", [&a.id, &c.id])
        .unwrap();

    let lineage = platform.get_lineage(&a.id).unwrap();
    let ids: Vec<&str> = lineage.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, [a.id.as_str(), b.id.as_str(), c.id.as_str()]);
}

#[tokio::test]
async fn test_pii_scan_flags_normalised_names() {
    let platform = common::platform();
    let flagged =
        platform.scan_pii_fields(&["user_id", "Email-Address", "home phone_number", "prompt"]);
    assert_eq!(flagged, ["Email-Address", "home phone_number"]);
}
