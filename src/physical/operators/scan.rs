//! Table scan operator

use crate::error::Result;
use crate::physical::{PhysicalOperator, RecordBatchStream};
use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use async_trait::async_trait;
use futures::stream;
use std::fmt;
use std::sync::Arc;

/// Table provider trait for accessing table data
pub trait TableProvider: Send + Sync + fmt::Debug {
    /// Get the schema of the table
    fn schema(&self) -> SchemaRef;

    /// Get all batches from the table
    fn scan(&self, projection: Option<&[usize]>) -> Result<Vec<RecordBatch>>;
}

/// In-memory table provider
#[derive(Debug, Clone)]
pub struct MemoryTable {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl MemoryTable {
    pub fn new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self { schema, batches }
    }

    pub fn row_count(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }
}

impl TableProvider for MemoryTable {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn scan(&self, projection: Option<&[usize]>) -> Result<Vec<RecordBatch>> {
        match projection {
            Some(indices) => self
                .batches
                .iter()
                .map(|batch| {
                    let columns: Vec<_> =
                        indices.iter().map(|&i| batch.column(i).clone()).collect();
                    let fields: Vec<_> = indices
                        .iter()
                        .map(|&i| self.schema.field(i).clone())
                        .collect();
                    let schema = Arc::new(arrow::datatypes::Schema::new(fields));
                    RecordBatch::try_new(schema, columns).map_err(Into::into)
                })
                .collect(),
            None => Ok(self.batches.clone()),
        }
    }
}

/// Memory table scan operator
#[derive(Debug)]
pub struct MemoryTableExec {
    table_name: String,
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
    /// Number of partitions the batches are spread over
    partitions: usize,
}

impl MemoryTableExec {
    pub fn new(
        table_name: impl Into<String>,
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
        partitions: usize,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            schema,
            batches,
            partitions: partitions.max(1),
        }
    }

    /// Create a scan from a provider, applying the projection up front
    pub fn from_provider(
        table_name: impl Into<String>,
        provider: &dyn TableProvider,
        projection: Option<&[usize]>,
        partitions: usize,
    ) -> Result<Self> {
        let batches = provider.scan(projection)?;
        let schema = match projection {
            Some(indices) => {
                let base_schema = provider.schema();
                let fields: Vec<_> = indices
                    .iter()
                    .map(|&i| base_schema.field(i).clone())
                    .collect();
                Arc::new(arrow::datatypes::Schema::new(fields))
            }
            None => provider.schema(),
        };

        Ok(Self::new(table_name, schema, batches, partitions))
    }
}

#[async_trait]
impl PhysicalOperator for MemoryTableExec {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn children(&self) -> Vec<Arc<dyn PhysicalOperator>> {
        vec![]
    }

    async fn execute(&self, partition: usize) -> Result<RecordBatchStream> {
        let num_partitions = self.output_partitions();

        // Round-robin batches across partitions
        let batches: Vec<RecordBatch> = self
            .batches
            .iter()
            .enumerate()
            .filter(|(i, _)| i % num_partitions == partition)
            .map(|(_, batch)| batch.clone())
            .collect();

        let stream = stream::iter(batches.into_iter().map(Ok));
        Ok(Box::pin(stream))
    }

    fn output_partitions(&self) -> usize {
        // Never more partitions than batches
        self.partitions.min(self.batches.len()).max(1)
    }

    fn name(&self) -> &str {
        "MemoryTableScan"
    }
}

impl fmt::Display for MemoryTableExec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryTableScan: {}", self.table_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use futures::TryStreamExt;

    fn create_test_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]));

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])),
                Arc::new(StringArray::from(vec!["a", "b", "c"])),
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_memory_scan() {
        let batch = create_test_batch();
        let schema = batch.schema();

        let exec = MemoryTableExec::new("test", schema, vec![batch.clone()], 1);

        let stream = exec.execute(0).await.unwrap();
        let results: Vec<RecordBatch> = stream.try_collect().await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].num_rows(), 3);
        assert_eq!(results[0].num_columns(), 2);
    }

    #[tokio::test]
    async fn test_provider_projection() {
        let batch = create_test_batch();
        let schema = batch.schema();
        let table = MemoryTable::new(schema, vec![batch]);

        let exec = MemoryTableExec::from_provider("test", &table, Some(&[0]), 1).unwrap();

        let stream = exec.execute(0).await.unwrap();
        let results: Vec<RecordBatch> = stream.try_collect().await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].num_columns(), 1);
        assert_eq!(results[0].schema().field(0).name(), "id");
    }

    #[tokio::test]
    async fn test_partitioned_scan() {
        let batch = create_test_batch();
        let schema = batch.schema();

        let exec = MemoryTableExec::new(
            "test",
            schema,
            vec![batch.clone(), batch.clone(), batch],
            2,
        );

        assert_eq!(exec.output_partitions(), 2);

        let mut total_rows = 0;
        for p in 0..exec.output_partitions() {
            let stream = exec.execute(p).await.unwrap();
            let results: Vec<RecordBatch> = stream.try_collect().await.unwrap();
            total_rows += results.iter().map(|b| b.num_rows()).sum::<usize>();
        }
        assert_eq!(total_rows, 9);
    }
}
