//! Filter operator and vectorized expression evaluation

use crate::error::{EngineError, Result};
use crate::physical::{PhysicalOperator, RecordBatchStream};
use crate::planner::{BinaryOp, Expr, ScalarValue, UnaryOp};
use arrow::array::{Array, ArrayRef, BooleanArray, Int64Array, StringArray};
use arrow::compute;
use arrow::compute::kernels::boolean;
use arrow::compute::kernels::cmp;
use arrow::compute::kernels::numeric;
use arrow::compute::kernels::zip::zip;
use arrow::datatypes::{DataType, SchemaRef};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::stream::TryStreamExt;
use std::fmt;
use std::sync::Arc;

/// Filter execution operator
pub struct FilterExec {
    input: Arc<dyn PhysicalOperator>,
    predicate: Expr,
    schema: SchemaRef,
}

impl fmt::Debug for FilterExec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterExec")
            .field("predicate", &self.predicate)
            .finish()
    }
}

impl FilterExec {
    pub fn new(input: Arc<dyn PhysicalOperator>, predicate: Expr) -> Self {
        let schema = input.schema();
        Self {
            input,
            predicate,
            schema,
        }
    }
}

#[async_trait]
impl PhysicalOperator for FilterExec {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn children(&self) -> Vec<Arc<dyn PhysicalOperator>> {
        vec![self.input.clone()]
    }

    async fn execute(&self, partition: usize) -> Result<RecordBatchStream> {
        let input_stream = self.input.execute(partition).await?;
        let predicate = self.predicate.clone();

        let filtered_stream = input_stream.and_then(move |batch| {
            let pred = predicate.clone();
            async move { evaluate_filter(&batch, &pred) }
        });

        Ok(Box::pin(filtered_stream))
    }

    fn name(&self) -> &str {
        "Filter"
    }

    fn output_partitions(&self) -> usize {
        self.input.output_partitions()
    }
}

impl fmt::Display for FilterExec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Filter: {}", self.predicate)
    }
}

/// Evaluate a filter predicate on a batch
fn evaluate_filter(batch: &RecordBatch, predicate: &Expr) -> Result<RecordBatch> {
    let mask = evaluate_expr(batch, predicate)?;

    let boolean_array = mask.as_any().downcast_ref::<BooleanArray>().ok_or_else(|| {
        EngineError::Execution("Filter predicate must evaluate to boolean".into())
    })?;

    let filtered_columns: Result<Vec<ArrayRef>> = batch
        .columns()
        .iter()
        .map(|col| compute::filter(col.as_ref(), boolean_array).map_err(Into::into))
        .collect();

    RecordBatch::try_new(batch.schema(), filtered_columns?).map_err(Into::into)
}

/// Evaluate an expression against a batch, producing one array
pub fn evaluate_expr(batch: &RecordBatch, expr: &Expr) -> Result<ArrayRef> {
    match expr {
        Expr::Column(name) => {
            let idx = batch
                .schema()
                .index_of(name)
                .map_err(|_| EngineError::ColumnNotFound(name.clone()))?;
            Ok(batch.column(idx).clone())
        }

        Expr::Literal(value) => Ok(scalar_to_array(value, batch.num_rows())),

        Expr::BinaryExpr { left, op, right } => {
            let left_arr = evaluate_expr(batch, left)?;
            let right_arr = evaluate_expr(batch, right)?;
            evaluate_binary_op(&left_arr, *op, &right_arr)
        }

        Expr::UnaryExpr { op, expr } => {
            let arr = evaluate_expr(batch, expr)?;
            evaluate_unary_op(*op, &arr)
        }

        Expr::Cast { expr, data_type } => {
            let arr = evaluate_expr(batch, expr)?;
            compute::cast(&arr, data_type).map_err(Into::into)
        }

        Expr::Alias { expr, .. } => evaluate_expr(batch, expr),

        Expr::Case {
            when_then,
            else_expr,
        } => evaluate_case(batch, when_then, else_expr.as_deref()),

        Expr::InList {
            expr,
            list,
            negated,
        } => {
            let value = evaluate_expr(batch, expr)?;
            let list_values: Result<Vec<ArrayRef>> =
                list.iter().map(|e| evaluate_expr(batch, e)).collect();
            evaluate_in_list(&value, &list_values?, *negated)
        }

        Expr::Between {
            expr,
            low,
            high,
            negated,
        } => {
            let value = evaluate_expr(batch, expr)?;
            let low_val = evaluate_expr(batch, low)?;
            let high_val = evaluate_expr(batch, high)?;

            let ge_low = evaluate_binary_op(&value, BinaryOp::GtEq, &low_val)?;
            let le_high = evaluate_binary_op(&value, BinaryOp::LtEq, &high_val)?;

            let ge_low_bool = downcast_bool(&ge_low)?;
            let le_high_bool = downcast_bool(&le_high)?;
            let result = boolean::and(ge_low_bool, le_high_bool)?;

            if *negated {
                Ok(Arc::new(boolean::not(&result)?))
            } else {
                Ok(Arc::new(result))
            }
        }

        Expr::Wildcard => {
            // For COUNT(*), every row counts as one
            let arr = Int64Array::from(vec![1i64; batch.num_rows()]);
            Ok(Arc::new(arr))
        }

        Expr::Aggregate { .. } => Err(EngineError::Execution(
            "Aggregate expression outside of aggregation".into(),
        )),
    }
}

fn downcast_bool(arr: &ArrayRef) -> Result<&BooleanArray> {
    arr.as_any()
        .downcast_ref::<BooleanArray>()
        .ok_or_else(|| EngineError::Type("Expected boolean array".into()))
}

fn scalar_to_array(value: &ScalarValue, num_rows: usize) -> ArrayRef {
    use arrow::array::*;

    match value {
        ScalarValue::Null => Arc::new(NullArray::new(num_rows)),
        ScalarValue::Boolean(v) => Arc::new(BooleanArray::from(vec![*v; num_rows])),
        ScalarValue::Int8(v) => Arc::new(Int8Array::from(vec![*v; num_rows])),
        ScalarValue::Int16(v) => Arc::new(Int16Array::from(vec![*v; num_rows])),
        ScalarValue::Int32(v) => Arc::new(Int32Array::from(vec![*v; num_rows])),
        ScalarValue::Int64(v) => Arc::new(Int64Array::from(vec![*v; num_rows])),
        ScalarValue::Float32(v) => Arc::new(Float32Array::from(vec![v.0; num_rows])),
        ScalarValue::Float64(v) => Arc::new(Float64Array::from(vec![v.0; num_rows])),
        ScalarValue::Utf8(v) => Arc::new(StringArray::from(vec![v.as_str(); num_rows])),
        ScalarValue::TimestampSecond(v) => {
            Arc::new(TimestampSecondArray::from(vec![*v; num_rows]))
        }
        ScalarValue::TimestampNanosecond(v) => {
            Arc::new(TimestampNanosecondArray::from(vec![*v; num_rows]))
        }
    }
}

fn evaluate_binary_op(left: &ArrayRef, op: BinaryOp, right: &ArrayRef) -> Result<ArrayRef> {
    let (left, right) = coerce_arrays(left, right)?;

    match op {
        BinaryOp::Eq => compare_arrays(&left, &right, |l, r| cmp::eq(l, r)),
        BinaryOp::NotEq => compare_arrays(&left, &right, |l, r| cmp::neq(l, r)),
        BinaryOp::Lt => compare_arrays(&left, &right, |l, r| cmp::lt(l, r)),
        BinaryOp::LtEq => compare_arrays(&left, &right, |l, r| cmp::lt_eq(l, r)),
        BinaryOp::Gt => compare_arrays(&left, &right, |l, r| cmp::gt(l, r)),
        BinaryOp::GtEq => compare_arrays(&left, &right, |l, r| cmp::gt_eq(l, r)),
        BinaryOp::And => {
            let l = downcast_bool(&left)
                .map_err(|_| EngineError::Type("AND requires boolean operands".into()))?;
            let r = downcast_bool(&right)
                .map_err(|_| EngineError::Type("AND requires boolean operands".into()))?;
            Ok(Arc::new(boolean::and(l, r)?))
        }
        BinaryOp::Or => {
            let l = downcast_bool(&left)
                .map_err(|_| EngineError::Type("OR requires boolean operands".into()))?;
            let r = downcast_bool(&right)
                .map_err(|_| EngineError::Type("OR requires boolean operands".into()))?;
            Ok(Arc::new(boolean::or(l, r)?))
        }
        BinaryOp::Add => arithmetic_op(&left, &right, |a, b| numeric::add(a, b)),
        BinaryOp::Subtract => arithmetic_op(&left, &right, |a, b| numeric::sub(a, b)),
        BinaryOp::Multiply => arithmetic_op(&left, &right, |a, b| numeric::mul(a, b)),
        BinaryOp::Divide => arithmetic_op(&left, &right, |a, b| numeric::div(a, b)),
        BinaryOp::Modulo => arithmetic_op(&left, &right, |a, b| numeric::rem(a, b)),
        BinaryOp::Like => like_arrays(&left, &right, false),
        BinaryOp::NotLike => like_arrays(&left, &right, true),
        BinaryOp::StringConcat => {
            let l = downcast_string(&left)?;
            let r = downcast_string(&right)?;
            let result: StringArray = (0..l.len())
                .map(|i| {
                    if l.is_null(i) || r.is_null(i) {
                        None
                    } else {
                        Some(format!("{}{}", l.value(i), r.value(i)))
                    }
                })
                .collect();
            Ok(Arc::new(result))
        }
    }
}

fn downcast_string(arr: &ArrayRef) -> Result<&StringArray> {
    arr.as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| EngineError::Type("Expected string array".into()))
}

fn like_arrays(left: &ArrayRef, right: &ArrayRef, negated: bool) -> Result<ArrayRef> {
    let l = downcast_string(left)
        .map_err(|_| EngineError::Type("LIKE requires string operands".into()))?;
    let r = downcast_string(right)
        .map_err(|_| EngineError::Type("LIKE requires string operands".into()))?;

    let result: BooleanArray = (0..l.len())
        .map(|i| {
            if l.is_null(i) || r.is_null(i) {
                None
            } else {
                let matched = like_match(l.value(i), r.value(i));
                Some(if negated { !matched } else { matched })
            }
        })
        .collect();
    Ok(Arc::new(result))
}

/// SQL LIKE matching with % (any run) and _ (single char)
fn like_match(text: &str, pattern: &str) -> bool {
    fn match_chars(t: &[char], p: &[char]) -> bool {
        match p.split_first() {
            None => t.is_empty(),
            Some((&'%', rest)) => (0..=t.len()).any(|i| match_chars(&t[i..], rest)),
            Some((&'_', rest)) => !t.is_empty() && match_chars(&t[1..], rest),
            Some((c, rest)) => t.first() == Some(c) && match_chars(&t[1..], rest),
        }
    }

    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    match_chars(&t, &p)
}

fn coerce_arrays(left: &ArrayRef, right: &ArrayRef) -> Result<(ArrayRef, ArrayRef)> {
    let left_type = left.data_type();
    let right_type = right.data_type();

    if left_type == right_type {
        return Ok((left.clone(), right.clone()));
    }

    let common_type = coerce_types(left_type, right_type)?;

    let left = if left_type != &common_type {
        compute::cast(left, &common_type)?
    } else {
        left.clone()
    };

    let right = if right_type != &common_type {
        compute::cast(right, &common_type)?
    } else {
        right.clone()
    };

    Ok((left, right))
}

fn coerce_types(left: &DataType, right: &DataType) -> Result<DataType> {
    use DataType::*;

    match (left, right) {
        (a, b) if a == b => Ok(a.clone()),

        // Null literals adopt the other side's type
        (Null, other) | (other, Null) => Ok(other.clone()),

        (Float64, _) | (_, Float64) => Ok(Float64),
        (Float32, _) | (_, Float32) => Ok(Float64),

        (Int64, _) | (_, Int64) => Ok(Int64),
        (Int32, _) | (_, Int32) => Ok(Int64),
        (Int16, _) | (_, Int16) => Ok(Int32),
        (Int8, _) | (_, Int8) => Ok(Int16),

        // Timestamp comparisons across units go through nanoseconds
        (Timestamp(_, _), Timestamp(_, _)) => {
            Ok(Timestamp(arrow::datatypes::TimeUnit::Nanosecond, None))
        }

        (Utf8, _) | (_, Utf8) => Ok(Utf8),

        _ => Err(EngineError::Type(format!(
            "Cannot coerce {} and {}",
            left, right
        ))),
    }
}

fn compare_arrays<F>(left: &ArrayRef, right: &ArrayRef, f: F) -> Result<ArrayRef>
where
    F: Fn(
        &dyn arrow::array::Datum,
        &dyn arrow::array::Datum,
    ) -> std::result::Result<BooleanArray, arrow::error::ArrowError>,
{
    let result = f(left, right)?;
    Ok(Arc::new(result))
}

fn arithmetic_op<F>(left: &ArrayRef, right: &ArrayRef, f: F) -> Result<ArrayRef>
where
    F: Fn(
        &dyn arrow::array::Datum,
        &dyn arrow::array::Datum,
    ) -> std::result::Result<ArrayRef, arrow::error::ArrowError>,
{
    f(left, right).map_err(Into::into)
}

fn evaluate_unary_op(op: UnaryOp, arr: &ArrayRef) -> Result<ArrayRef> {
    match op {
        UnaryOp::Not => {
            let bool_arr = downcast_bool(arr)
                .map_err(|_| EngineError::Type("NOT requires boolean operand".into()))?;
            Ok(Arc::new(boolean::not(bool_arr)?))
        }
        UnaryOp::Negate => Ok(Arc::new(numeric::neg(arr.as_ref())?)),
        UnaryOp::IsNull => Ok(Arc::new(compute::is_null(arr.as_ref())?)),
        UnaryOp::IsNotNull => Ok(Arc::new(compute::is_not_null(arr.as_ref())?)),
    }
}

fn evaluate_case(
    batch: &RecordBatch,
    when_then: &[(Expr, Expr)],
    else_expr: Option<&Expr>,
) -> Result<ArrayRef> {
    let num_rows = batch.num_rows();

    // Start with the else value, then layer WHEN branches in reverse order
    let mut result: Option<ArrayRef> = else_expr.map(|e| evaluate_expr(batch, e)).transpose()?;

    for (when, then) in when_then.iter().rev() {
        let condition = evaluate_expr(batch, when)?;
        let condition = downcast_bool(&condition)
            .map_err(|_| EngineError::Type("CASE WHEN requires boolean condition".into()))?;

        let then_value = evaluate_expr(batch, then)?;

        result = Some(match result {
            Some(else_val) => zip(condition, &then_value, &else_val)?,
            None => {
                let null_arr = arrow::array::new_null_array(then_value.data_type(), num_rows);
                zip(condition, &then_value, &null_arr)?
            }
        });
    }

    result.ok_or_else(|| EngineError::Execution("CASE must have at least one WHEN clause".into()))
}

fn evaluate_in_list(value: &ArrayRef, list: &[ArrayRef], negated: bool) -> Result<ArrayRef> {
    if list.is_empty() {
        let result = BooleanArray::from(vec![negated; value.len()]);
        return Ok(Arc::new(result));
    }

    // OR together equality with each list element
    let mut result: Option<BooleanArray> = None;

    for list_val in list {
        let eq_result = evaluate_binary_op(value, BinaryOp::Eq, list_val)?;
        let eq_bool = downcast_bool(&eq_result)?;

        result = Some(match result {
            Some(prev) => boolean::or(&prev, eq_bool)?,
            None => eq_bool.clone(),
        });
    }

    let result = result.unwrap();

    if negated {
        Ok(Arc::new(boolean::not(&result)?))
    } else {
        Ok(Arc::new(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physical::operators::MemoryTableExec;
    use arrow::array::{Float64Array, Int64Array};
    use arrow::datatypes::{Field, Schema};
    use futures::TryStreamExt;

    fn create_test_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("value", DataType::Float64, false),
        ]));

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3, 4, 5])),
                Arc::new(StringArray::from(vec![
                    Some("alpha"),
                    Some("beta"),
                    None,
                    Some("gamma"),
                    Some("delta"),
                ])),
                Arc::new(Float64Array::from(vec![1.5, 2.5, 3.5, 4.5, 5.5])),
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_filter_comparison() {
        let batch = create_test_batch();
        let schema = batch.schema();

        let scan = Arc::new(MemoryTableExec::new("test", schema, vec![batch], 1));
        let filter = FilterExec::new(
            scan,
            Expr::column("id").gt(Expr::literal(ScalarValue::Int64(3))),
        );

        let stream = filter.execute(0).await.unwrap();
        let results: Vec<RecordBatch> = stream.try_collect().await.unwrap();

        let total_rows: usize = results.iter().map(|b| b.num_rows()).sum();
        assert_eq!(total_rows, 2);
    }

    #[test]
    fn test_evaluate_arithmetic() {
        let batch = create_test_batch();

        let expr = Expr::column("id").multiply(Expr::literal(ScalarValue::Int64(2)));
        let result = evaluate_expr(&batch, &expr).unwrap();

        let values = result.as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(values.value(0), 2);
        assert_eq!(values.value(4), 10);
    }

    #[test]
    fn test_evaluate_coercion() {
        let batch = create_test_batch();

        // Int64 column compared against a Float64 literal
        let expr = Expr::column("id").gt(Expr::literal(ScalarValue::Float64(2.5.into())));
        let result = evaluate_expr(&batch, &expr).unwrap();

        let mask = result.as_any().downcast_ref::<BooleanArray>().unwrap();
        assert!(!mask.value(1));
        assert!(mask.value(2));
    }

    #[test]
    fn test_evaluate_is_null() {
        let batch = create_test_batch();

        let expr = Expr::UnaryExpr {
            op: UnaryOp::IsNull,
            expr: Box::new(Expr::column("name")),
        };
        let result = evaluate_expr(&batch, &expr).unwrap();
        let mask = result.as_any().downcast_ref::<BooleanArray>().unwrap();
        assert!(!mask.value(0));
        assert!(mask.value(2));
    }

    #[test]
    fn test_evaluate_in_list() {
        let batch = create_test_batch();

        let expr = Expr::InList {
            expr: Box::new(Expr::column("id")),
            list: vec![
                Expr::literal(ScalarValue::Int64(1)),
                Expr::literal(ScalarValue::Int64(4)),
            ],
            negated: false,
        };
        let result = evaluate_expr(&batch, &expr).unwrap();
        let mask = result.as_any().downcast_ref::<BooleanArray>().unwrap();
        assert!(mask.value(0));
        assert!(!mask.value(1));
        assert!(mask.value(3));
    }

    #[test]
    fn test_evaluate_between() {
        let batch = create_test_batch();

        let expr = Expr::Between {
            expr: Box::new(Expr::column("id")),
            low: Box::new(Expr::literal(ScalarValue::Int64(2))),
            high: Box::new(Expr::literal(ScalarValue::Int64(4))),
            negated: false,
        };
        let result = evaluate_expr(&batch, &expr).unwrap();
        let mask = result.as_any().downcast_ref::<BooleanArray>().unwrap();
        assert!(!mask.value(0));
        assert!(mask.value(1));
        assert!(mask.value(3));
        assert!(!mask.value(4));
    }

    #[test]
    fn test_evaluate_case() {
        let batch = create_test_batch();

        let expr = Expr::Case {
            when_then: vec![(
                Expr::column("id").gt(Expr::literal(ScalarValue::Int64(3))),
                Expr::literal(ScalarValue::Utf8("big".to_string())),
            )],
            else_expr: Some(Box::new(Expr::literal(ScalarValue::Utf8(
                "small".to_string(),
            )))),
        };
        let result = evaluate_expr(&batch, &expr).unwrap();
        let values = result.as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(values.value(0), "small");
        assert_eq!(values.value(4), "big");
    }

    #[test]
    fn test_like_match() {
        assert!(like_match("hello", "hello"));
        assert!(like_match("hello", "h%"));
        assert!(like_match("hello", "%llo"));
        assert!(like_match("hello", "h_llo"));
        assert!(like_match("hello", "%"));
        assert!(!like_match("hello", "h_"));
        assert!(!like_match("hello", "world%"));
    }
}
