//! Projection operator

use crate::error::Result;
use crate::physical::operators::filter::evaluate_expr;
use crate::physical::{PhysicalOperator, RecordBatchStream};
use crate::planner::Expr;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::stream::TryStreamExt;
use std::fmt;
use std::sync::Arc;

/// Projection execution operator
pub struct ProjectExec {
    input: Arc<dyn PhysicalOperator>,
    exprs: Vec<Expr>,
    schema: SchemaRef,
}

impl fmt::Debug for ProjectExec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectExec")
            .field("exprs", &self.exprs)
            .finish()
    }
}

impl ProjectExec {
    pub fn new(input: Arc<dyn PhysicalOperator>, exprs: Vec<Expr>, schema: SchemaRef) -> Self {
        Self {
            input,
            exprs,
            schema,
        }
    }
}

#[async_trait]
impl PhysicalOperator for ProjectExec {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn children(&self) -> Vec<Arc<dyn PhysicalOperator>> {
        vec![self.input.clone()]
    }

    async fn execute(&self, partition: usize) -> Result<RecordBatchStream> {
        let input_stream = self.input.execute(partition).await?;
        let exprs = self.exprs.clone();
        let schema = self.schema.clone();

        let projected = input_stream.and_then(move |batch| {
            let exprs = exprs.clone();
            let schema = schema.clone();
            async move { project_batch(&batch, &exprs, &schema) }
        });

        Ok(Box::pin(projected))
    }

    fn name(&self) -> &str {
        "Project"
    }

    fn output_partitions(&self) -> usize {
        self.input.output_partitions()
    }
}

impl fmt::Display for ProjectExec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exprs: Vec<String> = self.exprs.iter().map(|e| e.to_string()).collect();
        write!(f, "Project: [{}]", exprs.join(", "))
    }
}

fn project_batch(batch: &RecordBatch, exprs: &[Expr], schema: &SchemaRef) -> Result<RecordBatch> {
    let columns: Result<Vec<_>> = exprs.iter().map(|expr| evaluate_expr(batch, expr)).collect();
    RecordBatch::try_new(schema.clone(), columns?).map_err(Into::into)
}
