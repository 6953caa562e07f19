#![allow(missing_docs)]

use penumbra::db::record::decode_record;
use penumbra::db::WalOp;
use penumbra::{
    Any, Config, DurableLog, GraphDb, GraphStore, LabelId, MemoryWal, PenumbraError, Result, Schema,
    SchemaRegistry, VertexId,
};
use std::sync::Arc;

const SCHEMA: &str = r#"
[[vertex]]
label = "person"
properties = [{ name = "name", type = "string_map" }, { name = "age", type = "int32" }]

[[vertex]]
label = "city"
properties = [{ name = "name", type = "string_view" }]

[[edge]]
src = "person"
dst = "person"
label = "knows"
properties = [{ name = "since", type = "int64" }]

[[edge]]
src = "person"
dst = "city"
label = "lives_in"
properties = [{ name = "from", type = "date" }, { name = "rent", type = "double" }]
"#;

fn schema() -> Schema {
    Schema::from_toml_str(SCHEMA).expect("schema")
}

fn ids(schema: &Schema) -> (LabelId, LabelId, LabelId, LabelId) {
    (
        schema.vertex_label_id("person").expect("person"),
        schema.vertex_label_id("city").expect("city"),
        schema.edge_label_id("knows").expect("knows"),
        schema.edge_label_id("lives_in").expect("lives_in"),
    )
}

struct SharedWal(Arc<MemoryWal>);

impl DurableLog for SharedWal {
    fn append(&self, record: &[u8]) -> Result<()> {
        self.0.append(record)
    }
}

fn person(db: &GraphDb, id: i64, name: &str) -> Result<()> {
    let (person, ..) = ids(db.schema());
    let mut txn = db.begin_single_vertex_insert()?;
    txn.add_vertex(person, &Any::Int64(id), &[Any::from(name), Any::Int32(30)])?;
    txn.commit()
}

#[test]
fn vertex_with_edges_to_and_from_existing_vertices() -> Result<()> {
    let db = GraphDb::open_with_schema(Config::relaxed(), schema())?;
    let (person, city, knows, lives_in) = ids(db.schema());
    person_seed(&db)?;
    {
        let mut txn = db.begin_single_vertex_insert()?;
        txn.add_vertex(city, &Any::from("Lisbon"), &[Any::from("Lisbon")])?;
        txn.commit()?;
    }

    let mut txn = db.begin_single_vertex_insert()?;
    let ts = txn.timestamp();
    txn.add_vertex(person, &Any::Int64(42), &[Any::from("Alice"), Any::Int32(31)])?;
    txn.add_edge(person, &Any::Int64(42), person, &Any::Int64(7), knows, &Any::Int64(2015))?;
    txn.add_edge(person, &Any::Int64(1), person, &Any::Int64(42), knows, &Any::Int64(2019))?;
    txn.add_edge(
        person,
        &Any::Int64(42),
        city,
        &Any::from("Lisbon"),
        lives_in,
        &Any::Record(vec![Any::Date(1_600_000_000_000), Any::Double(950.0)]),
    )?;
    txn.commit()?;

    let graph = db.graph();
    let alice = graph.lookup(person, &Any::Int64(42)).expect("alice");
    let bob = graph.lookup(person, &Any::Int64(7)).expect("bob");
    let carol = graph.lookup(person, &Any::Int64(1)).expect("carol");
    assert_eq!(
        graph.vertex_properties(person, alice),
        Some(vec![Any::from("Alice"), Any::Int32(31)])
    );

    let out = graph.out_edges(person, person, knows, alice);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].dst, bob);
    assert_eq!(out[0].timestamp, ts);
    let into = graph.out_edges(person, person, knows, carol);
    assert_eq!(into.len(), 1);
    assert_eq!(into[0].dst, alice);
    let home = graph.out_edges(person, city, lives_in, alice);
    assert_eq!(home[0].dst, VertexId(0));
    assert_eq!(graph.edge_count(), 3);
    assert_eq!(db.versions().outstanding(), 0);
    Ok(())
}

fn person_seed(db: &GraphDb) -> Result<()> {
    person(db, 1, "Carol")?;
    person(db, 7, "Bob")
}

#[test]
fn rejected_operations_do_not_leak_into_the_record() -> Result<()> {
    let wal = Arc::new(MemoryWal::new());
    let db = GraphDb::with_log(Config::default(), schema(), Box::new(SharedWal(wal.clone())));
    let (person, city, knows, _) = ids(db.schema());
    person_seed(&db)?;
    assert_eq!(wal.len(), 2);

    let mut txn = db.begin_single_vertex_insert()?;
    assert!(matches!(
        txn.add_vertex(person, &Any::Int64(42), &[Any::from("Alice")]),
        Err(PenumbraError::PropertyCountMismatch { expected: 2, actual: 1, .. })
    ));
    txn.add_vertex(person, &Any::Int64(42), &[Any::from("Alice"), Any::Int32(31)])?;
    assert!(txn
        .add_edge(person, &Any::Int64(42), city, &Any::from("Nowhere"), knows, &Any::Int64(1))
        .is_err());
    assert!(txn
        .add_edge(person, &Any::Int64(42), person, &Any::Int64(7), knows, &Any::from("2015"))
        .is_err());
    txn.add_edge(person, &Any::Int64(42), person, &Any::Int64(7), knows, &Any::Int64(2015))?;
    txn.commit()?;

    let records = wal.records();
    assert_eq!(records.len(), 3);
    let decoded = decode_record(&records[2], db.schema())?;
    assert_eq!(decoded.ops.len(), 2);
    assert!(matches!(
        &decoded.ops[0],
        WalOp::InsertVertex { id: Any::Int64(42), properties, .. } if properties.len() == 2
    ));
    assert!(matches!(
        &decoded.ops[1],
        WalOp::InsertEdge { dst: Any::Int64(7), property: Any::Int64(2015), .. }
    ));
    Ok(())
}

#[test]
fn concurrent_transactions_commit_independently() -> Result<()> {
    let db = GraphDb::open_with_schema(Config::relaxed(), schema())?;
    let (person, ..) = ids(db.schema());
    std::thread::scope(|scope| {
        for worker in 0..4i64 {
            let db = &db;
            scope.spawn(move || {
                for n in 0..25i64 {
                    let id = worker * 1000 + n;
                    let mut txn = db.begin_single_vertex_insert().expect("begin");
                    txn.add_vertex(person, &Any::Int64(id), &[Any::from("w"), Any::Int32(n as i32)])
                        .expect("stage");
                    txn.commit().expect("commit");
                }
            });
        }
    });
    assert_eq!(db.graph().vertex_count(person), 100);
    assert_eq!(db.versions().outstanding(), 0);
    assert_eq!(db.versions().next_timestamp(), 101);
    assert_eq!(db.schema().vertex_label_count(), 2);
    Ok(())
}
