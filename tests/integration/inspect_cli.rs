#![allow(missing_docs)]

use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use penumbra::{Any, Config, GraphDb, LabelId};
use tempfile::TempDir;

const SCHEMA: &str = r#"
[[vertex]]
label = "person"
properties = [{ name = "name", type = "string_map" }]

[[edge]]
src = "person"
dst = "person"
label = "knows"
properties = [{ name = "since", type = "int32" }]
"#;

fn setup(name: &str) -> (TempDir, PathBuf, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let schema_path = dir.path().join("schema.toml");
    let wal_path = dir.path().join(format!("{name}.wal"));
    fs::write(&schema_path, SCHEMA).expect("write schema");

    let config = Config::relaxed()
        .with_wal_path(&wal_path)
        .with_schema_path(&schema_path);
    let db = GraphDb::open(config).expect("open db");
    let person = LabelId(0);
    let knows = LabelId(0);
    for (id, name, friend) in [(7i64, "Bob", None), (42, "Alice", Some(7i64))] {
        let mut txn = db.begin_single_vertex_insert().expect("begin");
        txn.add_vertex(person, &Any::Int64(id), &[Any::from(name)])
            .expect("vertex");
        if let Some(friend) = friend {
            txn.add_edge(person, &Any::Int64(id), person, &Any::Int64(friend), knows, &Any::Int32(1))
                .expect("edge");
        }
        txn.commit().expect("commit");
    }
    drop(db);
    (dir, wal_path, schema_path)
}

#[test]
fn records_lists_every_operation() {
    let (_dir, wal, schema) = setup("records");
    let output = cargo_bin_cmd!("penumbra-inspect")
        .arg(&wal)
        .arg("--schema")
        .arg(&schema)
        .arg("records")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.contains("#0 ts=1"), "{text}");
    assert!(text.contains("#1 ts=2"), "{text}");
    assert!(text.contains("vertex person[42] {name=Alice}"), "{text}");
    assert!(text.contains("edge person[42] -[knows]-> person[7] 1"), "{text}");
}

#[test]
fn hex_dump_starts_with_record_header() {
    let (_dir, wal, schema) = setup("hex");
    let output = cargo_bin_cmd!("penumbra-inspect")
        .arg(&wal)
        .args(["--schema"])
        .arg(&schema)
        .args(["records", "--hex"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    // record type 0 followed by timestamp 1, little endian
    assert!(text.contains("000100000000000000"), "{text}");
}

#[test]
fn stats_summarizes_log() {
    let (_dir, wal, schema) = setup("stats");
    let output = cargo_bin_cmd!("penumbra-inspect")
        .arg(&wal)
        .arg("--schema")
        .arg(&schema)
        .arg("stats")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.contains("records: 2"), "{text}");
    assert!(text.contains("vertices: 2"), "{text}");
    assert!(text.contains("edges: 1"), "{text}");
    assert!(text.contains("timestamps: 1..=2"), "{text}");
}

#[test]
fn missing_schema_fails() {
    let (dir, wal, _schema) = setup("missing");
    cargo_bin_cmd!("penumbra-inspect")
        .arg(&wal)
        .arg("--schema")
        .arg(dir.path().join("absent.toml"))
        .assert()
        .failure();
}
