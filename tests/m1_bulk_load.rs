//! Tests for M1: Bulk Load
//! Covers TC-1.1, TC-1.2, TC-1.3
//!
//! Run individual tests with:
//! cargo test tc_1_1 -- --nocapture
//! cargo test m1_bulk_load -- --nocapture

use propgraph::{
    Any, EdgeStrategy, FragmentBuilder, GraphConfig, GraphDb, LabelId, PropertyFragment, PropertyType, Schema,
    VisibilityMode,
};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn person_schema() -> Schema {
    let mut schema = Schema::new();
    schema
        .add_vertex_label("person", &[("id", PropertyType::Int64), ("name", PropertyType::String)], &[], 1000)
        .unwrap();
    schema
        .add_edge_label("person", "person", "knows", &[], EdgeStrategy::Multiple, EdgeStrategy::Multiple)
        .unwrap();
    schema
}

fn person(oid: i64, name: &str) -> Vec<Any<'static>> {
    vec![Any::Int64(oid), Any::from(name.to_string())]
}

mod tc_1_1_insertion_order_ids {
    use super::*;

    #[test]
    fn test_person_knows_scenario() {
        let schema = person_schema();
        let person_l = schema.get_vertex_label_id("person").unwrap();
        let knows = schema.get_edge_label_id("knows").unwrap();

        let mut builder = FragmentBuilder::new(schema);
        for (oid, name) in [(1, "ada"), (2, "bob"), (3, "cy")] {
            builder.add_vertex(person_l, oid, person(oid, name)).unwrap();
        }
        builder.add_edge((person_l, person_l, knows), 1, 2, Any::Empty, 10).unwrap();
        builder.add_edge((person_l, person_l, knows), 1, 3, Any::Empty, 11).unwrap();
        let graph = builder.build(2).unwrap();

        let vids: Vec<_> = [1, 2, 3].iter().map(|&o| graph.get_lid(person_l, o).unwrap()).collect();
        assert_eq!(vids, vec![0, 1, 2]);

        let out = graph.get_outgoing_edges(person_l, vids[0], person_l, knows).unwrap();
        let mut got: Vec<_> = out.iter().map(|e| (e.neighbor, e.timestamp)).collect();
        got.sort();
        assert_eq!(got, vec![(vids[1], 10), (vids[2], 11)]);

        let inc = graph.get_incoming_edges(person_l, vids[1], person_l, knows).unwrap();
        let got: Vec<_> = inc.iter().map(|e| (e.neighbor, e.timestamp)).collect();
        assert_eq!(got, vec![(vids[0], 10)]);

        assert_eq!(graph.get_incoming_edges(person_l, vids[0], person_l, knows).unwrap().len(), 0);
        assert_eq!(graph.max_timestamp(), 11);
    }

    #[test]
    fn test_id_indexer_bijection() {
        let schema = person_schema();
        let mut builder = FragmentBuilder::new(schema);
        let oids: Vec<i64> = (0..500).map(|i| i * 7919 - 100_000).collect();
        for &oid in &oids {
            builder.add_vertex(0, oid, person(oid, "x")).unwrap();
        }
        let graph = builder.build(4).unwrap();
        assert_eq!(graph.vertex_num(0), oids.len());
        for (i, &oid) in oids.iter().enumerate() {
            let vid = graph.get_lid(0, oid).unwrap();
            assert_eq!(vid as usize, i);
            assert_eq!(graph.get_oid(0, vid), Some(oid));
        }
        assert_eq!(graph.get_lid(0, 1), None);
        assert_eq!(graph.get_oid(0, 500), None);
    }
}

mod tc_1_2_record_files {
    use super::*;

    fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_init_from_files() {
        let dir = TempDir::new().unwrap();
        let mut schema = Schema::new();
        schema
            .add_vertex_label(
                "person",
                &[
                    ("firstName", PropertyType::String),
                    ("birthday", PropertyType::Date),
                    ("locationIP", PropertyType::IpAddr),
                    ("browserUsed", PropertyType::Browser),
                    ("gender", PropertyType::Gender),
                ],
                &[],
                100,
            )
            .unwrap();
        schema
            .add_edge_label(
                "person",
                "person",
                "knows",
                &[("creationDate", PropertyType::Date)],
                EdgeStrategy::Multiple,
                EdgeStrategy::Multiple,
            )
            .unwrap();

        let persons = write(
            &dir,
            "person_0_0.csv",
            "id|firstName|gender|birthday|locationIP|browserUsed\n\
             933|Mahinda|male|1989-12-03|119.235.7.103|Firefox\n\
             1129|Carmen|female|1984-02-18|196.1.0.1|Chrome\n\
             4194|Hồ Chí|male|1988-10-14|103.2.223.188|Internet Explorer\n",
        );
        let knows = write(
            &dir,
            "person_knows_person_0_0.csv",
            "Person.id|Person.id|creationDate\n\
             933|1129|2010-03-13T07:37:21.718+0000\n\
             933|4194|2010-02-14T15:32:10.447+0000\n\
             1129|4194|2010-03-26T22:29:12.104+0000\n\
             4194|42|2010-04-01T00:00:00.000+0000\n",
        );

        let vertex_files: Vec<(LabelId, PathBuf)> = vec![(0, persons)];
        let edge_files = vec![((0, 0, 0), knows)];
        let graph = PropertyFragment::init(schema, &vertex_files, &edge_files, 2).unwrap();

        assert_eq!(graph.vertex_num(0), 3);
        let carmen = graph.get_lid(0, 1129).unwrap();
        let row = graph.vertex_row(0, carmen).unwrap();
        assert_eq!(row[0], Any::from("Carmen"));
        assert_eq!(row[2], Any::IpAddr("196.1.0.1".parse().unwrap()));
        assert_eq!(row[4].property_type(), PropertyType::Gender);

        let ho = graph.get_lid(0, 4194).unwrap();
        assert_eq!(
            graph.get_vertex_property(0, ho, "firstName", PropertyType::String).unwrap(),
            Some(Any::from("Hồ Chí"))
        );
        assert_eq!(graph.get_incoming_edges(0, ho, 0, 0).unwrap().len(), 2);
        assert_eq!(graph.edge_num(0, 0, 0).unwrap(), 3);
    }

    #[test]
    fn test_malformed_file_fails_load() {
        let dir = TempDir::new().unwrap();
        let persons = write(&dir, "p.csv", "id|id2|name\n1|1|a\nnot-a-number|2|b\n");
        let vertex_files = vec![(0, persons)];
        let err = match PropertyFragment::init(person_schema(), &vertex_files, &[], 1) {
            Ok(_) => panic!("load should fail"),
            Err(e) => e,
        };
        println!("load error: {}", err);
        assert!(err.to_string().contains(":3:"));
    }
}

mod tc_1_3_db_entry_point {
    use super::*;

    #[test]
    fn test_bulk_loaded_edges_are_visible() {
        let mut builder = FragmentBuilder::new(person_schema());
        for oid in 1..=3 {
            builder.add_vertex(0, oid, person(oid, "p")).unwrap();
        }
        builder.add_edge((0, 0, 0), 2, 3, Any::Empty, 7).unwrap();
        let db = GraphDb::from_builder(builder, GraphConfig::new(VisibilityMode::WaitVisible).thread_num(3)).unwrap();

        let txn = db.read_transaction();
        assert_eq!(txn.timestamp(), 7);
        let cursor = txn.get_outgoing_edges(0, 1, 0, 0).unwrap();
        assert!(cursor.is_valid());
        assert_eq!(cursor.get_neighbor(), 2);
        txn.commit();

        let ins = db.insert_transaction();
        assert_eq!(ins.timestamp(), 8);
    }
}
