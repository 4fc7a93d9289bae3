use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_rocksdb_fallback_warning() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("some_db");

    let mut cmd = Command::new(cargo_bin!("wallet-reconciler"));
    cmd.arg("--offline").arg("--db-path").arg(&db_path).arg("balance");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("balance: 0 (sequence 1)"))
        .stderr(predicate::str::contains(
            "built without RocksDB support, falling back to a JSON state file",
        ));
    assert!(db_path.with_extension("json").exists());
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_rocksdb_no_fallback_warning() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    let mut cmd = Command::new(cargo_bin!("wallet-reconciler"));
    cmd.arg("--offline").arg("--db-path").arg(&db_path).arg("balance");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("WARN").not());
}
