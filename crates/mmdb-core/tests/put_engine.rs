//! End-to-end behavior of the put engine: conflict detection, winner
//! election, leaf bookkeeping, atomicity, and writer serialization.

use std::sync::{Arc, Barrier};
use std::thread;

use mmdb_core::{ConflictPolicy, Document, Fields, Revision, Store, StoreError};
use rusqlite::Connection;
use serde_json::json;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn doc(id: &str, base: Revision, fields: serde_json::Value) -> Document {
    Document::new(id)
        .expect("valid id")
        .with_revision(base)
        .with_fields(Fields::try_from(fields).expect("object"))
}

fn temp_store() -> (TempDir, std::path::PathBuf, Store) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("mmdb.sqlite3");
    let store = Store::open(&path).expect("open store");
    (dir, path, store)
}

fn leaf_flag(path: &std::path::Path, id: &str, rev: &Revision) -> bool {
    let conn = Connection::open(path).expect("raw connection");
    conn.query_row(
        "SELECT leaf FROM revs WHERE id = ?1 AND rev = ?2",
        [id, rev.to_string().as_str()],
        |row| row.get(0),
    )
    .expect("revision row")
}

fn row_counts(path: &std::path::Path) -> (i64, i64) {
    let conn = Connection::open(path).expect("raw connection");
    let docs = conn
        .query_row("SELECT COUNT(*) FROM docs", [], |row| row.get(0))
        .expect("count docs");
    let revs = conn
        .query_row("SELECT COUNT(*) FROM revs", [], |row| row.get(0))
        .expect("count revs");
    (docs, revs)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn scenario_a_create() {
    let mut store = Store::open_in_memory().expect("open");
    let rev = store
        .put(&doc("Doc1", Revision::NONE, json!({})), ConflictPolicy::Reject)
        .expect("put");

    let text = rev.to_string();
    assert!(text.starts_with("1-"));
    assert_eq!(text.len(), 34);
    assert!(text[2..].bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));

    let got = store.get("Doc1").expect("get").expect("present");
    assert_eq!(got.id.as_str(), "Doc1");
    assert_eq!(got.revision, rev);
    assert!(got.fields.is_empty());
}

#[test]
fn scenario_b_sequential_update() {
    let (_dir, path, mut store) = temp_store();
    let r1 = store
        .put(&doc("Doc1", Revision::NONE, json!({})), ConflictPolicy::Reject)
        .expect("create");
    let r2 = store
        .put(&doc("Doc1", r1, json!({})), ConflictPolicy::Reject)
        .expect("update");

    assert_eq!(r2.generation(), 2);
    assert_eq!(store.get("Doc1").expect("get").expect("present").revision, r2);
    assert_eq!(store.list_conflicts("Doc1").expect("leaves"), vec![r2]);
    assert!(!leaf_flag(&path, "Doc1", &r1), "prior winner must be demoted");
    assert!(leaf_flag(&path, "Doc1", &r2), "new winner must stay a leaf");
}

#[test]
fn scenario_c_conflicting_branches() {
    let mut store = Store::open_in_memory().expect("open");
    let r1 = store
        .put(&doc("Doc1", Revision::NONE, json!({})), ConflictPolicy::Reject)
        .expect("create");

    let with_a = doc("Doc1", r1, json!({"a": "a"}));
    let with_b = doc("Doc1", r1, json!({"b": "b"}));

    let r2a = store.put(&with_a, ConflictPolicy::Reject).expect("first edit");
    let err = store
        .put(&with_b, ConflictPolicy::Reject)
        .expect_err("second edit conflicts");
    assert!(matches!(err, StoreError::Conflict { .. }));

    let r2b = store.put(&with_b, ConflictPolicy::AllowFork).expect("fork");
    assert_ne!(r2a, r2b);

    let leaves = store.list_conflicts("Doc1").expect("leaves");
    assert_eq!(leaves.len(), 2);
    assert!(leaves.contains(&r2a) && leaves.contains(&r2b));

    // The winner is the comparator-maximal leaf.
    let winner = store.get("Doc1").expect("get").expect("present").revision;
    assert_eq!(winner, r2a.max(r2b));
    assert_eq!(leaves[0], winner, "conflicts are listed newest first");
}

// ---------------------------------------------------------------------------
// Conflict rejection & fork acceptance
// ---------------------------------------------------------------------------

#[test]
fn rejected_put_leaves_state_unchanged() {
    let (_dir, path, mut store) = temp_store();
    let r1 = store
        .put(&doc("Doc1", Revision::NONE, json!({"v": 1})), ConflictPolicy::Reject)
        .expect("create");
    let r2 = store
        .put(&doc("Doc1", r1, json!({"v": 2})), ConflictPolicy::Reject)
        .expect("update");
    let before = row_counts(&path);

    let err = store
        .put(&doc("Doc1", r1, json!({"v": 3})), ConflictPolicy::Reject)
        .expect_err("stale base");
    match err {
        StoreError::Conflict { base, current, .. } => {
            assert_eq!(base, r1);
            assert_eq!(current, r2);
        }
        other => panic!("expected conflict, got {other:?}"),
    }

    assert_eq!(row_counts(&path), before);
    let got = store.get("Doc1").expect("get").expect("present");
    assert_eq!(got.revision, r2);
    assert_eq!(got.fields.get("v"), Some(&json!(2)));
}

#[test]
fn sentinel_base_on_existing_document_conflicts() {
    let mut store = Store::open_in_memory().expect("open");
    store
        .put(&doc("Doc1", Revision::NONE, json!({})), ConflictPolicy::Reject)
        .expect("create");
    let err = store
        .put(&doc("Doc1", Revision::NONE, json!({"x": 1})), ConflictPolicy::Reject)
        .expect_err("recreate");
    assert!(matches!(err, StoreError::Conflict { .. }));
}

#[test]
fn fork_off_winner_sibling_grows_leaf_set_by_one() {
    let mut store = Store::open_in_memory().expect("open");
    let r1 = store
        .put(&doc("Doc1", Revision::NONE, json!({})), ConflictPolicy::Reject)
        .expect("create");
    let r2 = store
        .put(&doc("Doc1", r1, json!({"n": 1})), ConflictPolicy::Reject)
        .expect("update");
    let r3 = store
        .put(&doc("Doc1", r2, json!({"n": 2})), ConflictPolicy::Reject)
        .expect("update");
    let before = store.list_conflicts("Doc1").expect("leaves").len();

    // Fork from generation 1: the branch is generation 2, older than r3.
    let fork = store
        .put(&doc("Doc1", r1, json!({"side": true})), ConflictPolicy::AllowFork)
        .expect("fork");
    assert_eq!(fork.generation(), 2);

    let leaves = store.list_conflicts("Doc1").expect("leaves");
    assert_eq!(leaves.len(), before + 1);
    assert!(leaves.contains(&r3), "older fork must not displace the winner");
    assert_eq!(store.get("Doc1").expect("get").expect("present").revision, r3);
}

#[test]
fn newer_fork_takes_over_without_demoting_old_winner() {
    let mut store = Store::open_in_memory().expect("open");
    let r1 = store
        .put(&doc("Doc1", Revision::NONE, json!({})), ConflictPolicy::Reject)
        .expect("create");
    let r2 = store
        .put(&doc("Doc1", r1, json!({"n": 1})), ConflictPolicy::Reject)
        .expect("update");

    // Two generations deep on a side branch: generation 3 beats r2.
    let side2 = store
        .put(&doc("Doc1", r1, json!({"side": 1})), ConflictPolicy::AllowFork)
        .expect("fork");
    let side3 = store
        .put(&doc("Doc1", side2, json!({"side": 2})), ConflictPolicy::AllowFork)
        .expect("extend fork");

    assert_eq!(side3.generation(), 3);
    assert_eq!(store.get("Doc1").expect("get").expect("present").revision, side3);

    let leaves = store.list_conflicts("Doc1").expect("leaves");
    assert!(leaves.contains(&r2), "previous winner stays a leaf");
    assert!(leaves.contains(&side3));
}

#[test]
fn get_at_reads_non_winning_revisions() {
    let mut store = Store::open_in_memory().expect("open");
    let r1 = store
        .put(&doc("Doc1", Revision::NONE, json!({"v": "old"})), ConflictPolicy::Reject)
        .expect("create");
    store
        .put(&doc("Doc1", r1, json!({"v": "new"})), ConflictPolicy::Reject)
        .expect("update");

    let old = store
        .get_at("Doc1", &r1.to_string())
        .expect("get_at")
        .expect("present");
    assert_eq!(old.fields.get("v"), Some(&json!("old")));
    assert!(
        store
            .get_at("Doc1", "9-00000000000000000000000000000000")
            .expect("get_at")
            .is_none()
    );
}

// ---------------------------------------------------------------------------
// Determinism & monotonicity
// ---------------------------------------------------------------------------

#[test]
fn identical_puts_in_separate_stores_agree() {
    let mut a = Store::open_in_memory().expect("open");
    let mut b = Store::open_in_memory().expect("open");
    let d = doc("Doc1", Revision::NONE, json!({"z": 1, "a": [1, 2]}));
    let reordered = doc("Doc1", Revision::NONE, json!({"a": [1, 2], "z": 1}));
    assert_eq!(
        a.put(&d, ConflictPolicy::Reject).expect("put"),
        b.put(&reordered, ConflictPolicy::Reject).expect("put")
    );
}

#[test]
fn generation_increments_by_one() {
    let mut store = Store::open_in_memory().expect("open");
    let mut base = Revision::NONE;
    for n in 0..10 {
        let next = store
            .put(&doc("Doc1", base, json!({ "n": n })), ConflictPolicy::Reject)
            .expect("put");
        assert_eq!(next.generation(), base.generation() + 1);
        base = next;
    }
    assert_eq!(store.history("Doc1").expect("history").len(), 10);
    assert_eq!(store.list_conflicts("Doc1").expect("leaves"), vec![base]);
}

#[test]
fn repeating_an_accepted_fork_is_a_duplicate() {
    let mut store = Store::open_in_memory().expect("open");
    let r1 = store
        .put(&doc("Doc1", Revision::NONE, json!({})), ConflictPolicy::Reject)
        .expect("create");
    store
        .put(&doc("Doc1", r1, json!({"a": 1})), ConflictPolicy::Reject)
        .expect("update");
    let stale = doc("Doc1", r1, json!({"b": 1}));
    store.put(&stale, ConflictPolicy::AllowFork).expect("fork");
    let err = store
        .put(&stale, ConflictPolicy::AllowFork)
        .expect_err("same content, same parent");
    assert!(matches!(err, StoreError::DuplicateRevision { .. }));
}

// ---------------------------------------------------------------------------
// Failure handling
// ---------------------------------------------------------------------------

#[test]
fn oversized_fields_are_rejected_without_writes() {
    let (_dir, path, mut store) = temp_store();
    let big = "x".repeat(1024 * 1024);
    let err = store
        .put(&doc("Doc1", Revision::NONE, json!({ "blob": big })), ConflictPolicy::Reject)
        .expect_err("too large");
    assert!(matches!(err, StoreError::PayloadTooLarge { .. }));
    assert_eq!(row_counts(&path), (0, 0));
}

#[test]
fn fork_from_highest_generation_is_rejected_without_writes() {
    let (_dir, path, mut store) = temp_store();
    let r1 = store
        .put(&doc("Doc1", Revision::NONE, json!({})), ConflictPolicy::Reject)
        .expect("create");

    let top: Revision = format!("{}-{}", u32::MAX, "f".repeat(32))
        .parse()
        .expect("highest generation parses");
    let err = store
        .put(&doc("Doc1", top, json!({"a": 1})), ConflictPolicy::AllowFork)
        .expect_err("generation cannot grow");
    assert!(matches!(err, StoreError::GenerationExhausted { .. }));
    assert_eq!(err.code().code(), "E1005");

    assert_eq!(row_counts(&path), (1, 1));
    assert_eq!(store.list_conflicts("Doc1").expect("leaves"), vec![r1]);
}

#[test]
fn failure_after_insert_rolls_back_the_whole_put() {
    let (_dir, path, mut store) = temp_store();
    let r1 = store
        .put(&doc("Doc1", Revision::NONE, json!({})), ConflictPolicy::Reject)
        .expect("create");

    {
        let conn = Connection::open(&path).expect("raw connection");
        conn.execute_batch(
            "CREATE TRIGGER fail_index_update BEFORE UPDATE ON docs
             BEGIN SELECT RAISE(ABORT, 'injected failure'); END;",
        )
        .expect("install trigger");
    }

    let err = store
        .put(&doc("Doc1", r1, json!({"v": 2})), ConflictPolicy::Reject)
        .expect_err("index update fails");
    assert!(matches!(err, StoreError::Storage(_)));

    assert_eq!(row_counts(&path), (1, 1), "inserted revision was rolled back");
    assert!(leaf_flag(&path, "Doc1", &r1), "demotion was rolled back");
    assert_eq!(store.get("Doc1").expect("get").expect("present").revision, r1);
}

#[test]
fn dangling_index_is_a_consistency_error() {
    let (_dir, path, mut store) = temp_store();
    {
        let conn = Connection::open(&path).expect("raw connection");
        conn.execute(
            "INSERT INTO docs (id, rev) VALUES ('Doc1', '1-00000000000000000000000000000000')",
            [],
        )
        .expect("corrupt index");
    }

    let err = store.get("Doc1").expect_err("dangling");
    assert!(matches!(err, StoreError::Consistency { .. }));
    assert!(!err.is_retryable());

    let err = store
        .put(&doc("Doc1", Revision::NONE, json!({})), ConflictPolicy::AllowFork)
        .expect_err("dangling");
    assert!(matches!(err, StoreError::Consistency { .. }));
}

#[test]
fn state_survives_reopen() {
    let (_dir, path, mut store) = temp_store();
    let r1 = store
        .put(&doc("Doc1", Revision::NONE, json!({"k": "v"})), ConflictPolicy::Reject)
        .expect("create");
    store.close().expect("close");

    let store = Store::open(&path).expect("reopen");
    let got = store.get("Doc1").expect("get").expect("present");
    assert_eq!(got.revision, r1);
    assert_eq!(got.fields.get("k"), Some(&json!("v")));
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn racing_writers_on_one_document_serialize() {
    let (_dir, path, mut store) = temp_store();
    let r1 = store
        .put(&doc("Doc1", Revision::NONE, json!({})), ConflictPolicy::Reject)
        .expect("create");
    store.close().expect("close");

    let writers = 4;
    let barrier = Arc::new(Barrier::new(writers));
    let handles: Vec<_> = (0..writers)
        .map(|n| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut store = Store::open(&path).expect("open");
                barrier.wait();
                store.put(&doc("Doc1", r1, json!({ "writer": n })), ConflictPolicy::Reject)
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("writer thread"))
        .collect();
    let accepted = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(StoreError::Conflict { .. })))
        .count();

    assert_eq!(accepted, 1, "exactly one writer wins: {results:?}");
    assert_eq!(conflicts, writers - 1);

    let store = Store::open(&path).expect("open");
    assert_eq!(store.list_conflicts("Doc1").expect("leaves").len(), 1);
}

#[test]
fn writers_on_different_documents_all_succeed() {
    let (_dir, path, store) = temp_store();
    store.close().expect("close");

    let handles: Vec<_> = (0..4)
        .map(|n| {
            let path = path.clone();
            thread::spawn(move || {
                let mut store = Store::open(&path).expect("open");
                let id = format!("Doc{n}");
                let mut base = Revision::NONE;
                for i in 0..5 {
                    base = store
                        .put(&doc(&id, base, json!({ "i": i })), ConflictPolicy::Reject)
                        .expect("put");
                }
                base
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().expect("writer thread").generation(), 5);
    }
    assert_eq!(row_counts(&path), (4, 20));
}
