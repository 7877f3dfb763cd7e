//! Limit operator

use crate::error::Result;
use crate::physical::{PhysicalOperator, RecordBatchStream};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::stream;
use futures::TryStreamExt;
use std::fmt;
use std::sync::Arc;

/// Limit execution operator
///
/// Collapses its input to a single partition: the skip/fetch row budget is
/// global, so partitions are drained in order until it is spent.
#[derive(Debug)]
pub struct LimitExec {
    input: Arc<dyn PhysicalOperator>,
    skip: usize,
    fetch: Option<usize>,
    schema: SchemaRef,
}

impl LimitExec {
    pub fn new(input: Arc<dyn PhysicalOperator>, skip: usize, fetch: Option<usize>) -> Self {
        let schema = input.schema();
        Self {
            input,
            skip,
            fetch,
            schema,
        }
    }
}

#[async_trait]
impl PhysicalOperator for LimitExec {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn children(&self) -> Vec<Arc<dyn PhysicalOperator>> {
        vec![self.input.clone()]
    }

    async fn execute(&self, partition: usize) -> Result<RecordBatchStream> {
        if partition != 0 {
            return Ok(Box::pin(stream::empty()));
        }

        let mut skip_remaining = self.skip;
        let mut fetch_remaining = self.fetch;
        let mut out: Vec<RecordBatch> = Vec::new();

        let input_partitions = self.input.output_partitions().max(1);
        'partitions: for p in 0..input_partitions {
            let mut input_stream = self.input.execute(p).await?;

            while let Some(batch) = input_stream.try_next().await? {
                if fetch_remaining == Some(0) {
                    break 'partitions;
                }

                let num_rows = batch.num_rows();
                let to_skip = skip_remaining.min(num_rows);
                skip_remaining -= to_skip;
                let mut sliced = batch.slice(to_skip, num_rows - to_skip);

                if let Some(limit) = fetch_remaining {
                    let to_fetch = limit.min(sliced.num_rows());
                    fetch_remaining = Some(limit - to_fetch);
                    if to_fetch < sliced.num_rows() {
                        sliced = sliced.slice(0, to_fetch);
                    }
                }

                if sliced.num_rows() > 0 {
                    out.push(sliced);
                }
            }
        }

        Ok(Box::pin(stream::iter(out.into_iter().map(Ok))))
    }

    fn name(&self) -> &str {
        "Limit"
    }
}

impl fmt::Display for LimitExec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Limit: skip={}, fetch={:?}", self.skip, self.fetch)
    }
}
