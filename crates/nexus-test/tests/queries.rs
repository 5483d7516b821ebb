//! SELECT pipelines: projection naming, subqueries, grouping, ordering
//! and limits.

use nexus_memdb::{NexusError, Value};
use nexus_test::{ints, query_column, simple_db, sorted, texts};

const SALES: &str = "
    CREATE TABLE sales (id serial PRIMARY KEY, region text, amount int);
    INSERT INTO sales (region, amount) VALUES
        ('east', 10), ('west', 5), ('east', 20), ('north', NULL);
";

#[test]
fn test_select_without_from() {
    let db = simple_db("");
    let rows = db.execute_many("SELECT 1 AS one, 'x' AS two").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["one"], Value::Int(1));
    assert_eq!(rows[0]["two"], Value::Text("x".into()));
}

#[test]
fn test_star_and_qualified_star() {
    let db = simple_db(SALES);
    let rows = db.execute_many("SELECT * FROM sales WHERE id = 1").unwrap();
    let names: Vec<&str> = rows[0].keys().map(String::as_str).collect();
    assert_eq!(names, vec!["id", "region", "amount"]);

    let rows = db.execute_many("SELECT s.* FROM sales s WHERE s.id = 2").unwrap();
    assert_eq!(rows[0]["region"], Value::Text("west".into()));

    assert!(db.execute_many("SELECT x.* FROM sales").is_err());
}

#[test]
fn test_unnamed_columns_are_numbered_by_position() {
    let db = simple_db(SALES);
    let rows = db
        .execute_many("SELECT id, amount * 2, region FROM sales WHERE id = 1")
        .unwrap();
    let names: Vec<&str> = rows[0].keys().map(String::as_str).collect();
    assert_eq!(names, vec!["id", "column1", "region"]);
    assert_eq!(rows[0]["column1"], Value::Int(20));
}

#[test]
fn test_duplicate_output_names_keep_last() {
    let db = simple_db(SALES);
    let rows = db
        .execute_many("SELECT region AS v, amount AS v FROM sales WHERE id = 1")
        .unwrap();
    assert_eq!(rows[0].len(), 1);
    assert_eq!(rows[0]["v"], Value::Int(10));
}

#[test]
fn test_table_alias_and_schema() {
    let db = simple_db(SALES);
    let ids = query_column(&db, "SELECT s.id FROM public.sales AS s WHERE s.region = 'west'", "id");
    assert_eq!(ids, ints(&[2]));

    let err = db.execute_many("SELECT id FROM other.sales").unwrap_err();
    assert!(matches!(err, NexusError::TableNotFound { .. }));
}

#[test]
fn test_subquery_in_from() {
    let db = simple_db(SALES);
    let rows = db
        .execute_many(
            "SELECT big.r AS region FROM
                (SELECT region AS r, amount FROM sales WHERE amount >= 10) AS big
             WHERE big.amount < 20",
        )
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["region"], Value::Text("east".into()));
}

#[test]
fn test_group_by_with_aggregates() {
    let db = simple_db(SALES);
    let rows = db
        .execute_many(
            "SELECT region, sum(amount) AS total, count(*) AS n, count(amount) AS c
             FROM sales GROUP BY region ORDER BY region",
        )
        .unwrap();
    assert_eq!(values(&rows, "region"), texts(&["east", "north", "west"]));
    assert_eq!(values(&rows, "total"), vec![Value::Int(30), Value::Null, Value::Int(5)]);
    assert_eq!(values(&rows, "n"), ints(&[2, 1, 1]));
    assert_eq!(values(&rows, "c"), ints(&[2, 0, 1]));
}

#[test]
fn test_aggregate_names_and_avg() {
    let db = simple_db(SALES);
    let rows = db
        .execute_many("SELECT count(*), min(amount), max(amount), avg(amount) FROM sales")
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["count"], Value::Int(4));
    assert_eq!(rows[0]["min"], Value::Int(5));
    assert_eq!(rows[0]["max"], Value::Int(20));
    assert_eq!(rows[0]["avg"], Value::Float(35.0 / 3.0));
}

#[test]
fn test_aggregate_over_empty_table_yields_one_row() {
    let db = simple_db("CREATE TABLE empty (a int)");
    let rows = db
        .execute_many("SELECT count(*) AS n, sum(a) AS s FROM empty")
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["n"], Value::Int(0));
    assert_eq!(rows[0]["s"], Value::Null);

    let rows = db.execute_many("SELECT a FROM empty GROUP BY a").unwrap();
    assert!(rows.is_empty());
}

#[test]
fn test_having() {
    let db = simple_db(SALES);
    let regions = query_column(
        &db,
        "SELECT region FROM sales GROUP BY region HAVING sum(amount) > 9",
        "region",
    );
    assert_eq!(regions, texts(&["east"]));
}

#[test]
fn test_group_by_expression() {
    let db = simple_db(SALES);
    let rows = db
        .execute_many(
            "SELECT amount > 7 AS big, count(*) AS n FROM sales
             WHERE amount IS NOT NULL GROUP BY amount > 7 ORDER BY big",
        )
        .unwrap();
    assert_eq!(values(&rows, "big"), vec![Value::Bool(false), Value::Bool(true)]);
    assert_eq!(values(&rows, "n"), ints(&[1, 2]));
}

#[test]
fn test_ungrouped_column_is_rejected() {
    let db = simple_db(SALES);
    let err = db
        .execute_many("SELECT amount FROM sales GROUP BY region")
        .unwrap_err();
    assert!(err.to_string().contains("must appear in the GROUP BY clause"));
    assert!(db.execute_many("SELECT sum(count(*)) FROM sales").is_err());
}

#[test]
fn test_order_by_places_nulls_first() {
    let db = simple_db(SALES);
    assert_eq!(
        query_column(&db, "SELECT amount FROM sales ORDER BY amount", "amount"),
        vec![Value::Null, Value::Int(5), Value::Int(10), Value::Int(20)]
    );
    assert_eq!(
        query_column(&db, "SELECT amount FROM sales ORDER BY amount DESC", "amount"),
        vec![Value::Null, Value::Int(20), Value::Int(10), Value::Int(5)]
    );
    assert_eq!(
        query_column(&db, "SELECT amount FROM sales ORDER BY amount NULLS LAST", "amount"),
        vec![Value::Int(5), Value::Int(10), Value::Int(20), Value::Null]
    );
}

#[test]
fn test_order_by_inputs_outputs_and_positions() {
    let db = simple_db(SALES);
    // sort key not in the select list
    assert_eq!(
        query_column(&db, "SELECT id FROM sales ORDER BY region, amount DESC", "id"),
        ints(&[3, 1, 4, 2])
    );
    // sort key is an output alias
    assert_eq!(
        query_column(&db, "SELECT id * 10 AS x FROM sales ORDER BY x DESC", "x"),
        ints(&[40, 30, 20, 10])
    );
    // alias mixed with an input column
    assert_eq!(
        query_column(&db, "SELECT id AS k FROM sales ORDER BY region, k DESC", "k"),
        ints(&[3, 1, 4, 2])
    );
    // positional
    assert_eq!(
        query_column(&db, "SELECT region, id FROM sales ORDER BY 2 DESC", "id"),
        ints(&[4, 3, 2, 1])
    );
    assert!(db.execute_many("SELECT id FROM sales ORDER BY 3").is_err());
}

#[test]
fn test_limit_and_offset() {
    let db = simple_db(SALES);
    assert_eq!(
        query_column(&db, "SELECT id FROM sales ORDER BY id LIMIT 2", "id"),
        ints(&[1, 2])
    );
    assert_eq!(
        query_column(&db, "SELECT id FROM sales ORDER BY id LIMIT 2 OFFSET 1", "id"),
        ints(&[2, 3])
    );
    assert_eq!(
        query_column(&db, "SELECT id FROM sales ORDER BY id OFFSET 3", "id"),
        ints(&[4])
    );
    assert!(query_column(&db, "SELECT id FROM sales LIMIT 0", "id").is_empty());
}

#[test]
fn test_where_on_computed_values() {
    let db = simple_db(SALES);
    let ids = query_column(
        &db,
        "SELECT id FROM sales WHERE amount * 2 > 15 AND region <> 'west'",
        "id",
    );
    assert_eq!(sorted(ids), ints(&[1, 3]));
}

fn values(rows: &[nexus_memdb::ResultRow], column: &str) -> Vec<Value> {
    nexus_test::values_of(rows, column)
}
