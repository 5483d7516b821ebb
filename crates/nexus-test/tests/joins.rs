//! Two-way and chained joins.

use nexus_memdb::{NexusError, Value};
use nexus_test::{ints, query_column, simple_db, sorted, strict_db, texts};

const SCHEMA: &str = "
    CREATE TABLE users (id int PRIMARY KEY, name text);
    CREATE TABLE orders (id int PRIMARY KEY, user_id int, total int);
    CREATE INDEX orders_user ON orders (user_id);
    INSERT INTO users VALUES (1, 'ada'), (2, 'bob'), (3, 'cyd');
    INSERT INTO orders VALUES (10, 1, 5), (11, 1, 7), (12, 2, 9), (13, 9, 1);
";

#[test]
fn test_inner_join() {
    let db = simple_db(SCHEMA);
    let rows = db
        .execute_many(
            "SELECT u.name, o.total FROM users u
             JOIN orders o ON o.user_id = u.id
             ORDER BY o.total",
        )
        .unwrap();
    assert_eq!(nexus_test::values_of(&rows, "name"), texts(&["ada", "ada", "bob"]));
    assert_eq!(nexus_test::values_of(&rows, "total"), ints(&[5, 7, 9]));
}

#[test]
fn test_left_join_pads_unmatched_rows() {
    let db = simple_db(SCHEMA);
    let rows = db
        .execute_many(
            "SELECT u.name, o.id AS order_id FROM users u
             LEFT JOIN orders o ON o.user_id = u.id
             WHERE u.id = 3",
        )
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], Value::Text("cyd".into()));
    assert_eq!(rows[0]["order_id"], Value::Null);
}

#[test]
fn test_right_join_keeps_right_rows() {
    let db = simple_db(SCHEMA);
    let rows = db
        .execute_many(
            "SELECT u.name, o.id FROM users u
             RIGHT JOIN orders o ON o.user_id = u.id
             ORDER BY o.id",
        )
        .unwrap();
    assert_eq!(nexus_test::values_of(&rows, "id"), ints(&[10, 11, 12, 13]));
    assert_eq!(rows[3]["name"], Value::Null);
}

#[test]
fn test_join_probes_index_of_inner_table() {
    let db = simple_db(SCHEMA);
    let before = db.stats();
    let ids = query_column(
        &db,
        "SELECT o.id FROM users u JOIN orders o ON o.user_id = u.id",
        "id",
    );
    assert_eq!(sorted(ids), ints(&[10, 11, 12]));
    let after = db.stats();
    // users is scanned once and orders is probed once per user
    assert_eq!(after.seq_scans - before.seq_scans, 1);
    assert_eq!(after.index_lookups - before.index_lookups, 3);

    // the smaller side drives, so only users is ever scanned
    let db = strict_db(SCHEMA);
    let err = db
        .execute_many("SELECT o.id FROM users u JOIN orders o ON o.user_id = u.id")
        .unwrap_err();
    assert!(err.to_string().contains("\"users\""), "{}", err);
}

#[test]
fn test_join_with_extra_condition() {
    let db = simple_db(SCHEMA);
    let ids = query_column(
        &db,
        "SELECT o.id FROM users u JOIN orders o ON o.user_id = u.id AND o.total > 6",
        "id",
    );
    assert_eq!(sorted(ids), ints(&[11, 12]));
}

#[test]
fn test_non_equi_join() {
    let db = simple_db(SCHEMA);
    let rows = db
        .execute_many("SELECT u.id AS uid, o.id AS oid FROM users u JOIN orders o ON o.total < u.id")
        .unwrap();
    // only order 13 (total 1) is below some user id: users 2 and 3
    assert_eq!(sorted(nexus_test::values_of(&rows, "uid")), ints(&[2, 3]));
    assert_eq!(nexus_test::values_of(&rows, "oid"), ints(&[13, 13]));
}

#[test]
fn test_three_way_join_and_aggregate() {
    let db = simple_db(&format!(
        "{}
         CREATE TABLE items (order_id int, sku text);
         INSERT INTO items VALUES (10, 'a'), (10, 'b'), (12, 'c');",
        SCHEMA
    ));
    let rows = db
        .execute_many(
            "SELECT u.name, count(*) AS n FROM users u
             JOIN orders o ON o.user_id = u.id
             JOIN items i ON i.order_id = o.id
             GROUP BY u.name ORDER BY u.name",
        )
        .unwrap();
    assert_eq!(nexus_test::values_of(&rows, "name"), texts(&["ada", "bob"]));
    assert_eq!(nexus_test::values_of(&rows, "n"), ints(&[2, 1]));
}

#[test]
fn test_ambiguous_and_repeated_names() {
    let db = simple_db(SCHEMA);
    let err = db
        .execute_many("SELECT id FROM users u JOIN orders o ON o.user_id = u.id")
        .unwrap_err();
    assert!(err.to_string().contains("ambiguous"), "{}", err);

    let err = db
        .execute_many("SELECT 1 FROM users JOIN users ON users.id = users.id")
        .unwrap_err();
    assert_eq!(err.to_string(), "Table name \"users\" specified more than once");

    // aliasing makes a self join legal
    let ids = query_column(
        &db,
        "SELECT b.id FROM users a JOIN users b ON b.id = a.id + 1 WHERE a.id = 1",
        "id",
    );
    assert_eq!(ids, ints(&[2]));
}

#[test]
fn test_unsupported_join_kinds() {
    let db = simple_db(SCHEMA);
    for sql in [
        "SELECT 1 FROM users u FULL OUTER JOIN orders o ON o.user_id = u.id",
        "SELECT 1 FROM users CROSS JOIN orders",
    ] {
        let err = db.execute_many(sql).unwrap_err();
        assert!(matches!(err, NexusError::NotSupported { .. }), "{}: {}", sql, err);
    }
}
