//! SQL surface tests, run through the blocking engine API

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, RecordBatch, StringArray,
    TimestampSecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use emberdb::{Engine, EngineError};
use std::sync::Arc;

fn test_engine() -> Engine {
    let mut engine = Engine::open().unwrap();

    // Table: users (id, name, age, salary, active)
    let users_schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, true),
        Field::new("age", DataType::Int64, true),
        Field::new("salary", DataType::Float64, true),
        Field::new("active", DataType::Boolean, true),
    ]));

    let users_batch = RecordBatch::try_new(
        users_schema.clone(),
        vec![
            Arc::new(Int64Array::from(vec![1, 2, 3, 4, 5])) as ArrayRef,
            Arc::new(StringArray::from(vec![
                Some("Alice"),
                Some("Bob"),
                Some("Charlie"),
                Some("Diana"),
                None,
            ])) as ArrayRef,
            Arc::new(Int64Array::from(vec![
                Some(30),
                Some(25),
                Some(35),
                Some(28),
                Some(40),
            ])) as ArrayRef,
            Arc::new(Float64Array::from(vec![
                Some(50000.0),
                Some(60000.0),
                Some(75000.0),
                Some(55000.0),
                Some(80000.0),
            ])) as ArrayRef,
            Arc::new(BooleanArray::from(vec![
                Some(true),
                Some(true),
                Some(false),
                Some(true),
                Some(false),
            ])) as ArrayRef,
        ],
    )
    .unwrap();

    engine
        .import_arrow_table("users", users_schema, vec![users_batch])
        .unwrap();

    // Table: orders (order_id, user_id, amount, status)
    let orders_schema = Arc::new(Schema::new(vec![
        Field::new("order_id", DataType::Int64, false),
        Field::new("user_id", DataType::Int64, false),
        Field::new("amount", DataType::Float64, false),
        Field::new("status", DataType::Utf8, true),
    ]));

    let orders_batch = RecordBatch::try_new(
        orders_schema.clone(),
        vec![
            Arc::new(Int64Array::from(vec![101, 102, 103, 104, 105, 106])) as ArrayRef,
            Arc::new(Int64Array::from(vec![1, 1, 2, 3, 4, 1])) as ArrayRef,
            Arc::new(Float64Array::from(vec![
                100.0, 200.0, 150.0, 300.0, 250.0, 175.0,
            ])) as ArrayRef,
            Arc::new(StringArray::from(vec![
                Some("completed"),
                Some("pending"),
                Some("completed"),
                Some("cancelled"),
                Some("completed"),
                Some("completed"),
            ])) as ArrayRef,
        ],
    )
    .unwrap();

    engine
        .import_arrow_table("orders", orders_schema, vec![orders_batch])
        .unwrap();

    // Table: events (name, at)
    let events_schema = Arc::new(Schema::new(vec![
        Field::new("name", DataType::Utf8, false),
        Field::new("at", DataType::Timestamp(TimeUnit::Second, None), false),
    ]));

    let events_batch = RecordBatch::try_new(
        events_schema.clone(),
        vec![
            Arc::new(StringArray::from(vec!["boot", "load", "ready", "stop"])) as ArrayRef,
            Arc::new(TimestampSecondArray::from(vec![400i64, 100, 200, 300])) as ArrayRef,
        ],
    )
    .unwrap();

    engine
        .import_arrow_table("events", events_schema, vec![events_batch])
        .unwrap();

    engine
}

fn query(engine: &Engine, sql: &str) -> RecordBatch {
    engine
        .execute_dml(sql)
        .unwrap()
        .arrow_record_batch()
        .unwrap()
}

fn int_column(batch: &RecordBatch, i: usize) -> &Int64Array {
    batch.column(i).as_any().downcast_ref::<Int64Array>().unwrap()
}

fn str_column(batch: &RecordBatch, i: usize) -> &StringArray {
    batch.column(i).as_any().downcast_ref::<StringArray>().unwrap()
}

fn float_column(batch: &RecordBatch, i: usize) -> &Float64Array {
    batch
        .column(i)
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap()
}

// ----------------------------------------------------------------------------
// Projection and filtering
// ----------------------------------------------------------------------------

#[test]
fn test_select_columns() {
    let engine = test_engine();
    let batch = query(&engine, "SELECT id, name FROM users");

    assert_eq!(batch.num_columns(), 2);
    assert_eq!(batch.num_rows(), 5);
}

#[test]
fn test_select_arithmetic_alias() {
    let engine = test_engine();
    let batch = query(&engine, "SELECT id, salary * 2 AS doubled FROM users");

    assert_eq!(batch.schema().field(1).name(), "doubled");
    let doubled = float_column(&batch, 1);
    assert_eq!(doubled.value(0), 100000.0);
}

#[test]
fn test_where_and_or() {
    let engine = test_engine();
    let batch = query(
        &engine,
        "SELECT id FROM users WHERE age > 26 AND (active OR salary > 76000)",
    );

    let ids = int_column(&batch, 0);
    let values: Vec<i64> = (0..ids.len()).map(|i| ids.value(i)).collect();
    assert_eq!(values, vec![1, 4, 5]);
}

#[test]
fn test_where_like() {
    let engine = test_engine();
    let batch = query(&engine, "SELECT name FROM users WHERE name LIKE '%li%'");

    let names = str_column(&batch, 0);
    assert_eq!(names.len(), 2);
    assert_eq!(names.value(0), "Alice");
    assert_eq!(names.value(1), "Charlie");
}

#[test]
fn test_where_between() {
    let engine = test_engine();
    let batch = query(&engine, "SELECT id FROM users WHERE age BETWEEN 26 AND 32");

    let ids = int_column(&batch, 0);
    let values: Vec<i64> = (0..ids.len()).map(|i| ids.value(i)).collect();
    assert_eq!(values, vec![1, 4]);
}

#[test]
fn test_where_in_list() {
    let engine = test_engine();
    let batch = query(
        &engine,
        "SELECT order_id FROM orders WHERE status IN ('pending', 'cancelled')",
    );

    let ids = int_column(&batch, 0);
    let values: Vec<i64> = (0..ids.len()).map(|i| ids.value(i)).collect();
    assert_eq!(values, vec![102, 104]);
}

#[test]
fn test_where_is_null() {
    let engine = test_engine();

    let batch = query(&engine, "SELECT id FROM users WHERE name IS NULL");
    assert_eq!(int_column(&batch, 0).value(0), 5);
    assert_eq!(batch.num_rows(), 1);

    let batch = query(&engine, "SELECT id FROM users WHERE name IS NOT NULL");
    assert_eq!(batch.num_rows(), 4);
}

#[test]
fn test_where_not() {
    let engine = test_engine();
    let batch = query(&engine, "SELECT id FROM users WHERE NOT active");

    let ids = int_column(&batch, 0);
    let values: Vec<i64> = (0..ids.len()).map(|i| ids.value(i)).collect();
    assert_eq!(values, vec![3, 5]);
}

#[test]
fn test_cast() {
    let engine = test_engine();
    let batch = query(&engine, "SELECT CAST(salary AS BIGINT) AS s FROM users");

    assert_eq!(batch.schema().field(0).data_type(), &DataType::Int64);
    assert_eq!(int_column(&batch, 0).value(0), 50000);
}

#[test]
fn test_case_expression() {
    let engine = test_engine();
    let batch = query(
        &engine,
        "SELECT CASE WHEN age >= 35 THEN 'senior' ELSE 'junior' END AS band FROM users",
    );

    let bands = str_column(&batch, 0);
    assert_eq!(bands.value(0), "junior");
    assert_eq!(bands.value(2), "senior");
    assert_eq!(bands.value(4), "senior");
}

// ----------------------------------------------------------------------------
// Aggregation
// ----------------------------------------------------------------------------

#[test]
fn test_scalar_aggregates() {
    let engine = test_engine();
    let batch = query(
        &engine,
        "SELECT COUNT(*), SUM(amount), MIN(amount), MAX(amount), AVG(amount) FROM orders",
    );

    assert_eq!(batch.num_rows(), 1);
    assert_eq!(int_column(&batch, 0).value(0), 6);
    assert_eq!(float_column(&batch, 1).value(0), 1175.0);
    assert_eq!(float_column(&batch, 2).value(0), 100.0);
    assert_eq!(float_column(&batch, 3).value(0), 300.0);
    assert!((float_column(&batch, 4).value(0) - 1175.0 / 6.0).abs() < 1e-9);
}

#[test]
fn test_count_nulls_skipped() {
    let engine = test_engine();
    let batch = query(&engine, "SELECT COUNT(name) FROM users");
    assert_eq!(int_column(&batch, 0).value(0), 4);
}

#[test]
fn test_count_distinct() {
    let engine = test_engine();
    let batch = query(&engine, "SELECT COUNT(DISTINCT status) FROM orders");
    assert_eq!(int_column(&batch, 0).value(0), 3);
}

#[test]
fn test_group_by() {
    let engine = test_engine();
    let batch = query(
        &engine,
        "SELECT status, COUNT(*), SUM(amount) FROM orders GROUP BY status ORDER BY status",
    );

    assert_eq!(batch.num_rows(), 3);
    let statuses = str_column(&batch, 0);
    let counts = int_column(&batch, 1);
    let sums = float_column(&batch, 2);

    assert_eq!(statuses.value(0), "cancelled");
    assert_eq!(counts.value(0), 1);
    assert_eq!(sums.value(0), 300.0);

    assert_eq!(statuses.value(1), "completed");
    assert_eq!(counts.value(1), 4);
    assert_eq!(sums.value(1), 625.0);

    assert_eq!(statuses.value(2), "pending");
    assert_eq!(counts.value(2), 1);
}

#[test]
fn test_group_by_having() {
    let engine = test_engine();
    let batch = query(
        &engine,
        "SELECT user_id, SUM(amount) AS total FROM orders GROUP BY user_id HAVING SUM(amount) > 250 ORDER BY user_id",
    );

    assert_eq!(batch.num_rows(), 2);
    let users = int_column(&batch, 0);
    let totals = float_column(&batch, 1);
    assert_eq!(users.value(0), 1);
    assert_eq!(totals.value(0), 475.0);
    assert_eq!(users.value(1), 3);
    assert_eq!(totals.value(1), 300.0);
}

#[test]
fn test_aggregate_expression_in_select() {
    let engine = test_engine();
    let batch = query(&engine, "SELECT SUM(amount) / COUNT(*) AS mean FROM orders");

    assert!((float_column(&batch, 0).value(0) - 1175.0 / 6.0).abs() < 1e-9);
}

// ----------------------------------------------------------------------------
// Ordering, limits, distinct
// ----------------------------------------------------------------------------

#[test]
fn test_order_by_desc() {
    let engine = test_engine();
    let batch = query(&engine, "SELECT id, salary FROM users ORDER BY salary DESC");

    let ids = int_column(&batch, 0);
    let values: Vec<i64> = (0..ids.len()).map(|i| ids.value(i)).collect();
    assert_eq!(values, vec![5, 3, 2, 4, 1]);
}

#[test]
fn test_order_by_multi_key() {
    let engine = test_engine();
    let batch = query(
        &engine,
        "SELECT user_id, amount FROM orders ORDER BY user_id ASC, amount DESC",
    );

    let users = int_column(&batch, 0);
    let amounts = float_column(&batch, 1);
    assert_eq!(users.value(0), 1);
    assert_eq!(amounts.value(0), 200.0);
    assert_eq!(amounts.value(1), 175.0);
    assert_eq!(amounts.value(2), 100.0);
}

#[test]
fn test_order_by_nulls_last() {
    let engine = test_engine();
    let batch = query(
        &engine,
        "SELECT name FROM users ORDER BY name ASC NULLS LAST",
    );

    let names = str_column(&batch, 0);
    assert_eq!(names.value(0), "Alice");
    assert!(names.is_null(4));
}

#[test]
fn test_limit_offset() {
    let engine = test_engine();
    let batch = query(
        &engine,
        "SELECT id FROM users ORDER BY id LIMIT 2 OFFSET 1",
    );

    let ids = int_column(&batch, 0);
    let values: Vec<i64> = (0..ids.len()).map(|i| ids.value(i)).collect();
    assert_eq!(values, vec![2, 3]);
}

#[test]
fn test_select_distinct() {
    let engine = test_engine();
    let batch = query(&engine, "SELECT DISTINCT status FROM orders");
    assert_eq!(batch.num_rows(), 3);
}

// ----------------------------------------------------------------------------
// Timestamps
// ----------------------------------------------------------------------------

#[test]
fn test_timestamp_order_and_filter() {
    let engine = test_engine();

    let batch = query(&engine, "SELECT name FROM events ORDER BY at");
    let names = str_column(&batch, 0);
    assert_eq!(names.value(0), "load");
    assert_eq!(names.value(3), "boot");

    let batch = query(
        &engine,
        "SELECT name FROM events WHERE at > CAST(150 AS TIMESTAMP(0)) ORDER BY at",
    );
    assert_eq!(batch.num_rows(), 3);
}

#[test]
fn test_timestamp_min_max() {
    let engine = test_engine();
    let batch = query(&engine, "SELECT MIN(at), MAX(at) FROM events");

    let min = batch
        .column(0)
        .as_any()
        .downcast_ref::<TimestampSecondArray>()
        .unwrap();
    let max = batch
        .column(1)
        .as_any()
        .downcast_ref::<TimestampSecondArray>()
        .unwrap();
    assert_eq!(min.value(0), 100);
    assert_eq!(max.value(0), 400);
}

// ----------------------------------------------------------------------------
// Errors and rejected constructs
// ----------------------------------------------------------------------------

#[test]
fn test_unknown_column_is_bind_error() {
    let engine = test_engine();
    assert!(matches!(
        engine.execute_dml("SELECT missing FROM users"),
        Err(EngineError::ColumnNotFound(_))
    ));
}

#[test]
fn test_syntax_error_is_parse_error() {
    let engine = test_engine();
    assert!(matches!(
        engine.execute_dml("SELEC id FROM users"),
        Err(EngineError::Parse(_))
    ));
}

#[test]
fn test_join_not_supported() {
    let engine = test_engine();
    assert!(matches!(
        engine.execute_dml("SELECT * FROM users u JOIN orders o ON u.id = o.user_id"),
        Err(EngineError::NotImplemented(_))
    ));
}

#[test]
fn test_empty_filter_result_is_empty_batch() {
    let engine = test_engine();
    let batch = query(&engine, "SELECT id, name FROM users WHERE age > 100");

    assert_eq!(batch.num_rows(), 0);
    assert_eq!(batch.num_columns(), 2);
}
