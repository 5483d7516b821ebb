//! Public API: batches, transactions, the catalog, statistics and the
//! parse cache.

use std::sync::Arc;
use std::thread;

use nexus_memdb::{
    ColumnDefault, DataType, Database, DatabaseConfig, ErrorKind, IndexOptions, NexusError,
    SchemaField, TableSchema, Value,
};
use nexus_test::{ints, init_tracing, query_column, simple_db, texts};

#[test]
fn test_execute_many_returns_last_statement_rows() {
    let db = simple_db("");
    let rows = db
        .execute_many(
            "CREATE TABLE t (a int);
             INSERT INTO t VALUES (1), (2);
             SELECT a FROM t WHERE a = 1;
             SELECT a FROM t ORDER BY a DESC;",
        )
        .unwrap();
    assert_eq!(nexus_test::values_of(&rows, "a"), ints(&[2, 1]));

    let rows = db.execute_many("SELECT a FROM t; INSERT INTO t VALUES (3)").unwrap();
    assert!(rows.is_empty());
}

#[test]
fn test_failing_statement_stops_batch() {
    let db = simple_db("CREATE TABLE t (a int)");
    let err = db
        .execute_none("INSERT INTO t VALUES (1); SELECT nope FROM t; INSERT INTO t VALUES (2)")
        .unwrap_err();
    assert!(matches!(err, NexusError::ColumnNotFound { .. }), "{}", err);
    // the statement before the failure stays applied
    assert_eq!(query_column(&db, "SELECT a FROM t", "a"), ints(&[1]));
}

#[test]
fn test_syntax_errors() {
    let db = simple_db("");
    let err = db.execute_none("SELEC 1").unwrap_err();
    assert!(matches!(err, NexusError::Syntax { .. }), "{}", err);
    assert_eq!(err.kind(), ErrorKind::Query);
}

#[test]
fn test_transactions_are_no_ops_and_rollback_fails() {
    let db = simple_db("CREATE TABLE t (a int)");
    db.execute_none("BEGIN; INSERT INTO t VALUES (1); COMMIT;").unwrap();
    assert_eq!(db.row_count_estimate("t").unwrap(), 1);

    let err = db.execute_none("ROLLBACK").unwrap_err();
    assert_eq!(err.to_string(), "Transaction rollback not supported");
    assert_eq!(db.row_count_estimate("t").unwrap(), 1);
}

#[test]
fn test_unsupported_statements() {
    let db = simple_db("CREATE TABLE t (a int)");
    for sql in [
        "UPDATE t SET a = 1",
        "DELETE FROM t",
        "SELECT DISTINCT a FROM t",
        "WITH x AS (SELECT 1) SELECT * FROM x",
        "SELECT a FROM t UNION SELECT a FROM t",
        "INSERT INTO t SELECT a FROM t",
    ] {
        let err = db.execute_none(sql).unwrap_err();
        assert!(matches!(err, NexusError::NotSupported { .. }), "{}: {}", sql, err);
    }
}

#[test]
fn test_returned_rows_are_copies() {
    let db = simple_db(
        "CREATE TABLE t (a int, tags text[]);
         INSERT INTO t VALUES (1, '{x}');",
    );
    let mut rows = db.execute_many("SELECT * FROM t").unwrap();
    rows[0].insert("a".to_string(), Value::Int(99));
    if let Some(Value::Array(tags)) = rows[0].get_mut("tags") {
        tags.push(Value::Text("y".into()));
    }

    let fresh = db.execute_many("SELECT * FROM t").unwrap();
    assert_eq!(fresh[0]["a"], Value::Int(1));
    assert_eq!(fresh[0]["tags"], Value::Array(texts(&["x"])));
}

#[test]
fn test_parse_cache_hit_skips_parsing() {
    let db = simple_db("CREATE TABLE t (a int)");
    let sql = "SELECT a FROM t WHERE a > 1";
    db.execute_many(sql).unwrap();
    let before = db.stats();
    db.execute_many(sql).unwrap();
    let after = db.stats();
    assert_eq!(after.parse_count, before.parse_count);
    assert_eq!(after.parse_cache.hits, before.parse_cache.hits + 1);

    db.execute_many("SELECT a FROM t WHERE a > 2").unwrap();
    assert_eq!(db.stats().parse_count, before.parse_count + 1);
}

#[test]
fn test_disabled_parse_cache_parses_every_time() {
    init_tracing();
    let db = Database::with_config(DatabaseConfig {
        parse_cache_capacity: 0,
        ..DatabaseConfig::default()
    })
    .unwrap();
    db.execute_many("SELECT 1").unwrap();
    db.execute_many("SELECT 1").unwrap();
    assert_eq!(db.stats().parse_count, 2);
}

#[test]
fn test_invalid_config() {
    let err = Database::with_config(DatabaseConfig {
        default_schema: "no spaces".into(),
        ..DatabaseConfig::default()
    })
    .unwrap_err();
    assert!(matches!(err, NexusError::InvalidArgument { .. }), "{}", err);
}

#[test]
fn test_custom_default_schema() {
    init_tracing();
    let db = Database::with_config(DatabaseConfig {
        default_schema: "app".into(),
        ..DatabaseConfig::default()
    })
    .unwrap();
    db.execute_none("CREATE TABLE app.t (a int); INSERT INTO app.t VALUES (1)").unwrap();
    assert_eq!(query_column(&db, "SELECT a FROM app.t", "a"), ints(&[1]));
    assert!(db.execute_many("SELECT a FROM public.t").is_err());
}

#[test]
fn test_declared_tables_are_queryable() {
    let db = simple_db("");
    let info = db
        .declare_table(
            TableSchema::new("people")
                .field(SchemaField::serial("id").primary_key())
                .field(SchemaField::new("name", DataType::text()).not_null())
                .field(SchemaField::new("age", DataType::Int).default_value(18)),
        )
        .unwrap();
    assert_eq!(info.columns.len(), 3);
    assert!(info.columns[0].serial);
    assert!(info.columns[1].not_null);

    db.execute_none("INSERT INTO people (name) VALUES ('ann')").unwrap();
    let rows = db.execute_many("SELECT id, age FROM people").unwrap();
    assert_eq!(rows[0]["id"], Value::Int(1));
    assert_eq!(rows[0]["age"], Value::Int(18));

    assert!(matches!(
        db.declare_table(TableSchema::new("people")),
        Err(NexusError::TableExists { .. })
    ));
}

#[test]
fn test_declared_default_expression() {
    let db = simple_db("");
    let field = SchemaField::new("label", DataType::text())
        .default_sql("'n/a'")
        .unwrap();
    assert!(matches!(field.default, Some(ColumnDefault::Expr(_))));
    db.declare_table(TableSchema::new("t").field(SchemaField::new("a", DataType::Int)).field(field))
        .unwrap();
    db.execute_none("INSERT INTO t (a) VALUES (1)").unwrap();
    assert_eq!(query_column(&db, "SELECT label FROM t", "label"), texts(&["n/a"]));
}

#[test]
fn test_catalog_queries() {
    let db = simple_db(
        "CREATE TABLE b (x int);
         CREATE TABLE a (y int);
         INSERT INTO a VALUES (1), (2), (3);",
    );
    assert_eq!(db.list_tables(), vec!["b".to_string(), "a".to_string()]);
    assert_eq!(db.row_count_estimate("a").unwrap(), 3);
    assert!(matches!(
        db.row_count_estimate("zz"),
        Err(NexusError::TableNotFound { .. })
    ));

    let info = db.table_info("A").unwrap();
    assert_eq!(info.name, "a");
    assert_eq!(db.table_by_id(info.id).unwrap().name, "a");

    db.rename_table("a", "c").unwrap();
    assert!(db.table_info("a").is_err());
    assert_eq!(db.table_by_id(info.id).unwrap().name, "c");
    assert!(matches!(
        db.rename_table("c", "b"),
        Err(NexusError::TableExists { .. })
    ));
}

#[test]
fn test_programmatic_indexes() {
    let db = simple_db(
        "CREATE TABLE t (a int, b text);
         INSERT INTO t VALUES (1, 'x'), (2, 'x');",
    );
    let index = db
        .create_index("t", &["a", "b"], IndexOptions::default())
        .unwrap();
    assert_eq!(index.name, "t_a_b_idx");
    assert_eq!(index.expressions.len(), 2);

    let err = db
        .create_index(
            "t",
            &["b"],
            IndexOptions {
                unique: true,
                ..IndexOptions::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, NexusError::ConstraintViolation { .. }), "{}", err);

    let pk = db
        .create_index(
            "t",
            &["a"],
            IndexOptions {
                name: Some("t_primary".into()),
                primary: true,
                ..IndexOptions::default()
            },
        )
        .unwrap();
    assert!(pk.unique && pk.primary);
    assert!(db.execute_none("INSERT INTO t VALUES (NULL, 'z')").is_err());
    assert!(db.create_index("t", &["zz"], IndexOptions::default()).is_err());
}

#[test]
fn test_read_only_tables() {
    let db = simple_db("CREATE TABLE t (a int); INSERT INTO t VALUES (1)");
    db.set_read_only("t", true).unwrap();
    assert!(db.table_info("t").unwrap().read_only);
    let err = db.execute_none("INSERT INTO t VALUES (2)").unwrap_err();
    assert!(matches!(err, NexusError::ReadOnly { .. }));
    // reads still work
    assert_eq!(query_column(&db, "SELECT a FROM t", "a"), ints(&[1]));
}

#[test]
fn test_scan_statistics() {
    let db = simple_db(
        "CREATE TABLE t (id int PRIMARY KEY, v int);
         INSERT INTO t VALUES (1, 1), (2, 2);",
    );
    db.execute_many("SELECT v FROM t WHERE id = 2").unwrap();
    db.execute_many("SELECT v FROM t WHERE v = 2").unwrap();
    let stats = db.table_info("t").unwrap().stats;
    assert_eq!(stats.index_lookups, 1);
    assert_eq!(stats.seq_scans, 1);
    assert_eq!(db.stats().seq_scans, 1);
}

#[test]
fn test_concurrent_batches() {
    let db = Arc::new(simple_db("CREATE TABLE t (id serial PRIMARY KEY, worker int)"));
    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for _ in 0..25 {
                    db.execute_none(&format!("INSERT INTO t (worker) VALUES ({})", worker))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(db.row_count_estimate("t").unwrap(), 100);
    let ids = query_column(&db, "SELECT id FROM t ORDER BY id DESC LIMIT 1", "id");
    assert_eq!(ids, ints(&[100]));
}
