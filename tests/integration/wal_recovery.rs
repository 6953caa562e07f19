#![allow(missing_docs)]

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use penumbra::{Any, Config, FileWal, GraphDb, GraphStore, LabelId, Result, Schema};
use tempfile::tempdir;

const SCHEMA: &str = r#"
[[vertex]]
label = "account"
properties = [{ name = "owner", type = "string_view" }]

[[edge]]
src = "account"
dst = "account"
label = "transfer"
properties = [{ name = "amount", type = "uint64" }, { name = "memo", type = "string_view" }]
"#;

const ACCOUNT: LabelId = LabelId(0);
const TRANSFER: LabelId = LabelId(0);

fn open(path: &Path) -> Result<GraphDb> {
    let config = Config::fully_durable().with_wal_path(path);
    GraphDb::open_with_schema(config, Schema::from_toml_str(SCHEMA)?)
}

fn open_account(db: &GraphDb, id: u64, owner: &str, pay_to: Option<u64>) -> Result<()> {
    let mut txn = db.begin_single_vertex_insert()?;
    txn.add_vertex(ACCOUNT, &Any::UInt64(id), &[Any::from(owner)])?;
    if let Some(dst) = pay_to {
        txn.add_edge(
            ACCOUNT,
            &Any::UInt64(id),
            ACCOUNT,
            &Any::UInt64(dst),
            TRANSFER,
            &Any::Record(vec![Any::UInt64(100), Any::from("opening deposit")]),
        )?;
    }
    txn.commit()
}

#[test]
fn reopen_replays_committed_records() -> Result<()> {
    let dir = tempdir().expect("tmpdir");
    let path = dir.path().join("accounts.wal");
    {
        let db = open(&path)?;
        open_account(&db, 10, "treasury", None)?;
        open_account(&db, 11, "ada", Some(10))?;
        open_account(&db, 12, "grace", Some(11))?;

        let mut aborted = db.begin_single_vertex_insert()?;
        aborted.add_vertex(ACCOUNT, &Any::UInt64(99), &[Any::from("ghost")])?;
        aborted.abort();
    }

    let db = open(&path)?;
    let stats = db.recovery_stats();
    assert_eq!(stats.records, 3);
    assert_eq!(stats.vertices, 3);
    assert_eq!(stats.edges, 2);
    assert_eq!(stats.last_timestamp, 3);

    let graph = db.graph();
    assert_eq!(graph.vertex_count(ACCOUNT), 3);
    assert!(graph.lookup(ACCOUNT, &Any::UInt64(99)).is_none());
    let grace = graph.lookup(ACCOUNT, &Any::UInt64(12)).expect("grace");
    let ada = graph.lookup(ACCOUNT, &Any::UInt64(11)).expect("ada");
    let out = graph.out_edges(ACCOUNT, ACCOUNT, TRANSFER, grace);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].dst, ada);
    assert_eq!(out[0].timestamp, 3);
    assert_eq!(
        out[0].property,
        Any::Record(vec![Any::UInt64(100), Any::from("opening deposit")])
    );

    // numbering resumes after the highest replayed timestamp
    let txn = db.begin_single_vertex_insert()?;
    assert_eq!(txn.timestamp(), 4);
    Ok(())
}

#[test]
fn self_referencing_edge_survives_restart() -> Result<()> {
    let dir = tempdir().expect("tmpdir");
    let path = dir.path().join("loop.wal");
    {
        let db = open(&path)?;
        open_account(&db, 5, "self", Some(5))?;
    }
    let db = open(&path)?;
    let graph = db.graph();
    let me = graph.lookup(ACCOUNT, &Any::UInt64(5)).expect("vertex");
    let out = graph.out_edges(ACCOUNT, ACCOUNT, TRANSFER, me);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].dst, me);
    Ok(())
}

#[test]
fn torn_tail_is_dropped_on_reopen() -> Result<()> {
    let dir = tempdir().expect("tmpdir");
    let path = dir.path().join("torn.wal");
    {
        let db = open(&path)?;
        open_account(&db, 1, "first", None)?;
        open_account(&db, 2, "second", Some(1))?;
    }
    let intact_len = std::fs::metadata(&path)?.len();
    {
        let mut file = OpenOptions::new().append(true).open(&path)?;
        file.write_all(&[0x40, 0, 0, 0, 0xde, 0xad, 0xbe, 0xef, 1, 2, 3])?;
    }

    let db = open(&path)?;
    assert_eq!(db.recovery_stats().records, 2);
    assert_eq!(std::fs::metadata(&path)?.len(), intact_len);
    open_account(&db, 3, "third", Some(2))?;
    drop(db);

    let records = FileWal::read_path(&path)?.collect::<Result<Vec<_>>>()?;
    assert_eq!(records.len(), 3);
    Ok(())
}

#[test]
fn empty_commit_leaves_log_empty() -> Result<()> {
    let dir = tempdir().expect("tmpdir");
    let path = dir.path().join("empty.wal");
    {
        let db = open(&path)?;
        let mut txn = db.begin_single_vertex_insert()?;
        txn.commit()?;
    }
    assert_eq!(FileWal::read_path(&path)?.count(), 0);
    let db = open(&path)?;
    assert_eq!(db.recovery_stats().records, 0);
    Ok(())
}
