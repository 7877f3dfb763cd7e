//! Hash aggregate operator

use crate::error::{EngineError, Result};
use crate::physical::operators::filter::evaluate_expr;
use crate::physical::{PhysicalOperator, RecordBatchStream};
use crate::planner::{AggregateFunction, Expr};
use arrow::array::{
    Array, ArrayRef, BooleanArray, Float32Array, Float64Array, Int16Array, Int32Array, Int64Array,
    Int8Array, RecordBatch, StringArray, TimestampNanosecondArray, TimestampSecondArray,
    UInt32Array,
};
use arrow::compute;
use arrow::datatypes::{DataType, SchemaRef};
use async_trait::async_trait;
use futures::stream::{self, TryStreamExt};
use hashbrown::HashMap;
use ordered_float::OrderedFloat;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Aggregate expression with function and input
#[derive(Debug, Clone)]
pub struct AggregateExpr {
    pub func: AggregateFunction,
    pub input: Expr,
    pub distinct: bool,
}

/// Hash aggregate execution operator
#[derive(Debug)]
pub struct HashAggregateExec {
    input: Arc<dyn PhysicalOperator>,
    group_by: Vec<Expr>,
    aggregates: Vec<AggregateExpr>,
    schema: SchemaRef,
}

impl HashAggregateExec {
    pub fn new(
        input: Arc<dyn PhysicalOperator>,
        group_by: Vec<Expr>,
        aggregates: Vec<AggregateExpr>,
        schema: SchemaRef,
    ) -> Self {
        Self {
            input,
            group_by,
            aggregates,
            schema,
        }
    }
}

#[async_trait]
impl PhysicalOperator for HashAggregateExec {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn children(&self) -> Vec<Arc<dyn PhysicalOperator>> {
        vec![self.input.clone()]
    }

    async fn execute(&self, partition: usize) -> Result<RecordBatchStream> {
        // Aggregation drains every input partition into a single output partition
        if partition != 0 {
            return Ok(Box::pin(stream::empty()));
        }

        let input_partitions = self.input.output_partitions().max(1);
        let mut batches = Vec::new();
        for p in 0..input_partitions {
            let input_stream = self.input.execute(p).await?;
            let partition_batches: Vec<RecordBatch> = input_stream.try_collect().await?;
            batches.extend(partition_batches);
        }

        // Work over a single concatenated batch so row indices are global
        let input_schema = self.input.schema();
        let batch = match batches.len() {
            0 => RecordBatch::new_empty(input_schema),
            1 => batches.remove(0),
            _ => compute::concat_batches(&input_schema, &batches)?,
        };

        let result = aggregate_batch(&batch, &self.group_by, &self.aggregates, &self.schema)?;

        Ok(Box::pin(stream::once(async { Ok(result) })))
    }

    fn name(&self) -> &str {
        "HashAggregate"
    }
}

impl fmt::Display for HashAggregateExec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let groups: Vec<String> = self.group_by.iter().map(|e| e.to_string()).collect();
        let aggs: Vec<String> = self
            .aggregates
            .iter()
            .map(|a| format!("{}({})", a.func, a.input))
            .collect();
        write!(
            f,
            "HashAggregate: group_by=[{}], aggs=[{}]",
            groups.join(", "),
            aggs.join(", ")
        )
    }
}

/// Group key value, widened to a canonical representation
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum GroupValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    Str(String),
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct GroupKey {
    values: Vec<GroupValue>,
}

/// Accumulator state for one aggregate within one group
#[derive(Default)]
struct Accumulator {
    count: i64,
    sum_i64: i64,
    sum_f64: f64,
    /// Row index (into the concatenated input) of the current extreme
    min_row: Option<usize>,
    max_row: Option<usize>,
    distinct: Option<HashSet<GroupValue>>,
}

struct GroupState {
    /// Row index of the first row seen for this group
    first_row: usize,
    accumulators: Vec<Accumulator>,
}

fn aggregate_batch(
    batch: &RecordBatch,
    group_by: &[Expr],
    aggregates: &[AggregateExpr],
    schema: &SchemaRef,
) -> Result<RecordBatch> {
    let group_arrays: Vec<ArrayRef> = group_by
        .iter()
        .map(|e| evaluate_expr(batch, e))
        .collect::<Result<_>>()?;
    let agg_inputs: Vec<ArrayRef> = aggregates
        .iter()
        .map(|a| evaluate_expr(batch, &a.input))
        .collect::<Result<_>>()?;
    let num_rows = batch.num_rows();

    let mut groups: HashMap<GroupKey, GroupState> = HashMap::new();
    let mut group_order: Vec<GroupKey> = Vec::new();

    for row in 0..num_rows {
        let key = GroupKey {
            values: group_arrays
                .iter()
                .map(|arr| extract_value(arr, row))
                .collect(),
        };

        let state = groups.entry(key.clone()).or_insert_with(|| {
            group_order.push(key);
            GroupState {
                first_row: row,
                accumulators: (0..aggregates.len()).map(|_| Accumulator::default()).collect(),
            }
        });

        for (i, agg) in aggregates.iter().enumerate() {
            update_accumulator(&mut state.accumulators[i], agg.func, &agg_inputs[i], row)?;
        }
    }

    // Scalar aggregation over empty input still yields one row
    if groups.is_empty() && group_by.is_empty() {
        let key = GroupKey { values: vec![] };
        group_order.push(key.clone());
        groups.insert(
            key,
            GroupState {
                first_row: 0,
                accumulators: (0..aggregates.len()).map(|_| Accumulator::default()).collect(),
            },
        );
    }

    let mut output_arrays: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());

    // Group columns: take the first-seen row of each group
    let first_rows: Vec<u32> = group_order
        .iter()
        .map(|key| groups[key].first_row as u32)
        .collect();
    let first_rows = UInt32Array::from(first_rows);
    for arr in &group_arrays {
        output_arrays.push(compute::take(arr.as_ref(), &first_rows, None)?);
    }

    // Aggregate columns
    for (i, agg) in aggregates.iter().enumerate() {
        let field = schema.field(group_by.len() + i);
        let input = agg_inputs.get(i);
        let arr = build_agg_array(&groups, &group_order, i, agg.func, input, field.data_type())?;
        output_arrays.push(arr);
    }

    RecordBatch::try_new(schema.clone(), output_arrays).map_err(Into::into)
}

fn extract_value(arr: &ArrayRef, row: usize) -> GroupValue {
    if arr.is_null(row) {
        return GroupValue::Null;
    }

    if let Some(a) = arr.as_any().downcast_ref::<Int8Array>() {
        return GroupValue::Int(a.value(row) as i64);
    }
    if let Some(a) = arr.as_any().downcast_ref::<Int16Array>() {
        return GroupValue::Int(a.value(row) as i64);
    }
    if let Some(a) = arr.as_any().downcast_ref::<Int32Array>() {
        return GroupValue::Int(a.value(row) as i64);
    }
    if let Some(a) = arr.as_any().downcast_ref::<Int64Array>() {
        return GroupValue::Int(a.value(row));
    }
    if let Some(a) = arr.as_any().downcast_ref::<Float32Array>() {
        return GroupValue::Float(OrderedFloat(a.value(row) as f64));
    }
    if let Some(a) = arr.as_any().downcast_ref::<Float64Array>() {
        return GroupValue::Float(OrderedFloat(a.value(row)));
    }
    if let Some(a) = arr.as_any().downcast_ref::<StringArray>() {
        return GroupValue::Str(a.value(row).to_string());
    }
    if let Some(a) = arr.as_any().downcast_ref::<BooleanArray>() {
        return GroupValue::Bool(a.value(row));
    }
    if let Some(a) = arr.as_any().downcast_ref::<TimestampSecondArray>() {
        return GroupValue::Int(a.value(row));
    }
    if let Some(a) = arr.as_any().downcast_ref::<TimestampNanosecondArray>() {
        return GroupValue::Int(a.value(row));
    }

    GroupValue::Null
}

fn numeric_value(arr: &ArrayRef, row: usize) -> Result<(i64, f64)> {
    if let Some(a) = arr.as_any().downcast_ref::<Int8Array>() {
        let v = a.value(row) as i64;
        return Ok((v, v as f64));
    }
    if let Some(a) = arr.as_any().downcast_ref::<Int16Array>() {
        let v = a.value(row) as i64;
        return Ok((v, v as f64));
    }
    if let Some(a) = arr.as_any().downcast_ref::<Int32Array>() {
        let v = a.value(row) as i64;
        return Ok((v, v as f64));
    }
    if let Some(a) = arr.as_any().downcast_ref::<Int64Array>() {
        let v = a.value(row);
        return Ok((v, v as f64));
    }
    if let Some(a) = arr.as_any().downcast_ref::<Float32Array>() {
        let v = a.value(row) as f64;
        return Ok((0, v));
    }
    if let Some(a) = arr.as_any().downcast_ref::<Float64Array>() {
        let v = a.value(row);
        return Ok((0, v));
    }

    Err(EngineError::Type(format!(
        "Aggregate input must be numeric, got {}",
        arr.data_type()
    )))
}

fn update_accumulator(
    state: &mut Accumulator,
    func: AggregateFunction,
    input: &ArrayRef,
    row: usize,
) -> Result<()> {
    if input.is_null(row) {
        return Ok(());
    }

    match func {
        AggregateFunction::Count => {
            state.count += 1;
        }
        AggregateFunction::CountDistinct => {
            let value = extract_value(input, row);
            state.distinct.get_or_insert_with(HashSet::new).insert(value);
        }
        AggregateFunction::Sum | AggregateFunction::Avg => {
            let (i, f) = numeric_value(input, row)?;
            state.count += 1;
            state.sum_i64 = state.sum_i64.wrapping_add(i);
            state.sum_f64 += f;
        }
        AggregateFunction::Min => {
            let better = match state.min_row {
                Some(current) => extract_value(input, row) < extract_value(input, current),
                None => true,
            };
            if better {
                state.min_row = Some(row);
            }
        }
        AggregateFunction::Max => {
            let better = match state.max_row {
                Some(current) => extract_value(input, row) > extract_value(input, current),
                None => true,
            };
            if better {
                state.max_row = Some(row);
            }
        }
    }

    Ok(())
}

fn build_agg_array(
    groups: &HashMap<GroupKey, GroupState>,
    group_order: &[GroupKey],
    agg_index: usize,
    func: AggregateFunction,
    input: Option<&ArrayRef>,
    output_type: &DataType,
) -> Result<ArrayRef> {
    let states: Vec<&Accumulator> = group_order
        .iter()
        .map(|key| &groups[key].accumulators[agg_index])
        .collect();

    match func {
        AggregateFunction::Count => {
            let arr: Int64Array = states.iter().map(|s| Some(s.count)).collect();
            Ok(Arc::new(arr))
        }
        AggregateFunction::CountDistinct => {
            let arr: Int64Array = states
                .iter()
                .map(|s| Some(s.distinct.as_ref().map_or(0, |set| set.len() as i64)))
                .collect();
            Ok(Arc::new(arr))
        }
        AggregateFunction::Sum => match output_type {
            DataType::Int64 => {
                let arr: Int64Array = states
                    .iter()
                    .map(|s| (s.count > 0).then_some(s.sum_i64))
                    .collect();
                Ok(Arc::new(arr))
            }
            DataType::Float64 => {
                let arr: Float64Array = states
                    .iter()
                    .map(|s| (s.count > 0).then_some(s.sum_f64))
                    .collect();
                Ok(Arc::new(arr))
            }
            other => Err(EngineError::Internal(format!(
                "Unexpected SUM output type: {}",
                other
            ))),
        },
        AggregateFunction::Avg => {
            let arr: Float64Array = states
                .iter()
                .map(|s| (s.count > 0).then(|| s.sum_f64 / s.count as f64))
                .collect();
            Ok(Arc::new(arr))
        }
        AggregateFunction::Min | AggregateFunction::Max => {
            let input = input.ok_or_else(|| {
                EngineError::Internal("MIN/MAX without input array".to_string())
            })?;
            if input.is_empty() {
                return Ok(arrow::array::new_null_array(output_type, states.len()));
            }
            let indices: UInt32Array = states
                .iter()
                .map(|s| {
                    let row = match func {
                        AggregateFunction::Min => s.min_row,
                        _ => s.max_row,
                    };
                    row.map(|r| r as u32)
                })
                .collect();
            compute::take(input.as_ref(), &indices, None).map_err(Into::into)
        }
    }
}
