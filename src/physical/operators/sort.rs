//! Sort operator

use crate::error::Result;
use crate::physical::operators::filter::evaluate_expr;
use crate::physical::{PhysicalOperator, RecordBatchStream};
use crate::planner::{NullOrdering, SortDirection, SortExpr};
use arrow::array::ArrayRef;
use arrow::compute::{self, SortColumn, SortOptions};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::stream::{self, TryStreamExt};
use std::fmt;
use std::sync::Arc;

/// Sort execution operator
#[derive(Debug)]
pub struct SortExec {
    input: Arc<dyn PhysicalOperator>,
    order_by: Vec<SortExpr>,
    schema: SchemaRef,
}

impl SortExec {
    pub fn new(input: Arc<dyn PhysicalOperator>, order_by: Vec<SortExpr>) -> Self {
        let schema = input.schema();
        Self {
            input,
            order_by,
            schema,
        }
    }
}

#[async_trait]
impl PhysicalOperator for SortExec {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn children(&self) -> Vec<Arc<dyn PhysicalOperator>> {
        vec![self.input.clone()]
    }

    async fn execute(&self, partition: usize) -> Result<RecordBatchStream> {
        // Sort produces a single partition, collected from all input partitions
        if partition != 0 {
            return Ok(Box::pin(stream::empty()));
        }

        let input_partitions = self.input.output_partitions().max(1);
        let mut all_batches = Vec::new();
        for p in 0..input_partitions {
            let input_stream = self.input.execute(p).await?;
            let batches: Vec<RecordBatch> = input_stream.try_collect().await?;
            all_batches.extend(batches);
        }

        if all_batches.is_empty() {
            return Ok(Box::pin(stream::empty()));
        }

        let batch = compute::concat_batches(&self.schema, &all_batches)?;
        let sorted = sort_batch(&batch, &self.order_by)?;

        Ok(Box::pin(stream::once(async { Ok(sorted) })))
    }

    fn name(&self) -> &str {
        "Sort"
    }
}

impl fmt::Display for SortExec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let order: Vec<String> = self
            .order_by
            .iter()
            .map(|s| {
                let dir = match s.direction {
                    SortDirection::Asc => "ASC",
                    SortDirection::Desc => "DESC",
                };
                format!("{} {}", s.expr, dir)
            })
            .collect();
        write!(f, "Sort: [{}]", order.join(", "))
    }
}

fn sort_batch(batch: &RecordBatch, order_by: &[SortExpr]) -> Result<RecordBatch> {
    if batch.num_rows() == 0 {
        return Ok(batch.clone());
    }

    let sort_columns: Result<Vec<SortColumn>> = order_by
        .iter()
        .map(|s| {
            let values = evaluate_expr(batch, &s.expr)?;
            Ok(SortColumn {
                values,
                options: Some(SortOptions {
                    descending: s.direction == SortDirection::Desc,
                    nulls_first: s.nulls == NullOrdering::NullsFirst,
                }),
            })
        })
        .collect();
    let sort_columns = sort_columns?;

    let indices = compute::lexsort_to_indices(&sort_columns, None)?;

    let sorted_columns: Result<Vec<ArrayRef>> = batch
        .columns()
        .iter()
        .map(|col| compute::take(col.as_ref(), &indices, None).map_err(Into::into))
        .collect();

    RecordBatch::try_new(batch.schema(), sorted_columns?).map_err(Into::into)
}
