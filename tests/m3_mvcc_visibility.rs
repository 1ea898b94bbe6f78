//! Tests for M3: MVCC Visibility
//! Covers TC-3.1, TC-3.2, TC-3.3
//!
//! Run individual tests with:
//! cargo test tc_3_1 -- --nocapture
//! cargo test m3_mvcc_visibility -- --nocapture

use propgraph::{Any, EdgeStrategy, GraphConfig, GraphDb, PropertyType, Schema, VisibilityMode};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn setup_db(mode: VisibilityMode) -> GraphDb {
    let mut schema = Schema::new();
    schema.add_vertex_label("account", &[("owner", PropertyType::String)], &[], 256).unwrap();
    schema
        .add_edge_label(
            "account",
            "account",
            "transfer",
            &[("amount", PropertyType::Int64)],
            EdgeStrategy::Multiple,
            EdgeStrategy::Multiple,
        )
        .unwrap();
    let config = GraphConfig::new(mode).advance_interval(Duration::from_micros(50));
    let mut db = GraphDb::new(schema, config).unwrap();
    for oid in 0..16 {
        db.graph_mut().add_vertex(0, oid, &[Any::from(format!("owner-{}", oid))]).unwrap();
    }
    db
}

fn visible_transfers(db: &GraphDb, from: u32) -> Vec<i64> {
    let txn = db.read_transaction();
    let edges = txn.get_outgoing_edges(0, from, 0, 0).unwrap().collect_edges();
    edges.iter().map(|e| e.data.as_i64().unwrap()).collect()
}

fn wait_for_read_ts(db: &GraphDb, ts: u32) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while db.version_manager().read_timestamp() < ts {
        assert!(Instant::now() < deadline, "read timestamp stuck below {}", ts);
        thread::sleep(Duration::from_millis(1));
    }
}

mod tc_3_1_contiguous_advance {
    use super::*;

    #[test]
    fn test_later_commit_waits_for_earlier() {
        let db = setup_db(VisibilityMode::Background);
        let mut early = db.insert_transaction();
        let mut late = db.insert_transaction();
        assert!(early.timestamp() < late.timestamp());

        early.add_edge(0, 1, 0, 2, 0, Any::Int64(10)).unwrap();
        late.add_edge(0, 1, 0, 3, 0, Any::Int64(20)).unwrap();
        let late_ts = late.timestamp();
        late.commit().unwrap();

        thread::sleep(Duration::from_millis(20));
        assert!(db.version_manager().read_timestamp() < late_ts);
        assert!(visible_transfers(&db, 1).is_empty());

        early.commit().unwrap();
        wait_for_read_ts(&db, late_ts);
        let mut seen = visible_transfers(&db, 1);
        seen.sort_unstable();
        assert_eq!(seen, vec![10, 20]);
    }

    #[test]
    fn test_aborted_insert_does_not_block() {
        let db = setup_db(VisibilityMode::WaitVisible);
        let mut aborted = db.insert_transaction();
        aborted.add_edge(0, 4, 0, 5, 0, Any::Int64(1)).unwrap();
        let kept_ts = {
            let mut kept = db.insert_transaction();
            kept.add_edge(0, 4, 0, 6, 0, Any::Int64(2)).unwrap();
            let ts = kept.timestamp();
            let (tx, rx) = mpsc::channel();
            let waiter = thread::scope(|s| {
                let h = s.spawn(move || {
                    kept.commit().unwrap();
                    tx.send(()).unwrap();
                });
                assert!(rx.recv_timeout(Duration::from_millis(30)).is_err(), "commit must wait for the earlier timestamp");
                aborted.abort();
                rx.recv_timeout(Duration::from_secs(5)).unwrap();
                h.join()
            });
            waiter.unwrap();
            ts
        };
        assert_eq!(db.version_manager().read_timestamp(), kept_ts);
        assert_eq!(visible_transfers(&db, 4), vec![2]);
    }
}

mod tc_3_2_snapshot_isolation {
    use super::*;

    #[test]
    fn test_reader_bound_to_its_timestamp() {
        let db = setup_db(VisibilityMode::WaitVisible);
        let reader = db.read_transaction();
        let ts0 = reader.timestamp();

        let writer = thread::scope(|s| {
            s.spawn(|| {
                for amount in 1..=5 {
                    let mut ins = db.insert_transaction();
                    ins.add_edge(0, 7, 0, 8, 0, Any::Int64(amount)).unwrap();
                    ins.commit().unwrap();
                }
            })
            .join()
        });
        writer.unwrap();

        let mut cursor = reader.get_outgoing_edges(0, 7, 0, 0).unwrap();
        assert_eq!(cursor.size(), 5);
        assert!(!cursor.is_valid());
        cursor.next();
        assert!(!cursor.is_valid());
        assert_eq!(reader.timestamp(), ts0);
        reader.commit();

        assert_eq!(visible_transfers(&db, 7), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_concurrent_readers_see_prefixes() {
        let db = Arc::new(setup_db(VisibilityMode::Background));
        let writer = {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for amount in 0..300 {
                    let mut ins = db.insert_transaction();
                    ins.add_edge(0, 9, 0, 10, 0, Any::Int64(amount)).unwrap();
                    ins.commit().unwrap();
                }
            })
        };
        let readers: Vec<_> = (0..3)
            .map(|_| {
                let db = Arc::clone(&db);
                thread::spawn(move || {
                    for _ in 0..200 {
                        let seen = visible_transfers(&db, 9);
                        let expected: Vec<i64> = (0..seen.len() as i64).collect();
                        assert_eq!(seen, expected, "a snapshot is always a prefix of the commit order");
                    }
                })
            })
            .collect();
        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
    }
}

mod tc_3_3_update_exclusion {
    use super::*;

    #[test]
    fn test_checkpoint_waits_for_readers() {
        let db = Arc::new(setup_db(VisibilityMode::Background));
        let dir = tempfile::TempDir::new().unwrap();
        let reader = db.read_transaction();

        let (tx, rx) = mpsc::channel();
        let checkpoint = {
            let db = Arc::clone(&db);
            let path = dir.path().to_path_buf();
            thread::spawn(move || {
                let manifest = db.checkpoint(&path).unwrap();
                tx.send(manifest.timestamp).unwrap();
            })
        };
        assert!(rx.recv_timeout(Duration::from_millis(30)).is_err());
        reader.commit();
        let ts = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        checkpoint.join().unwrap();
        assert_eq!(db.version_manager().read_timestamp(), ts);
        assert_eq!(db.version_manager().pending_requests(), 0);
    }
}
