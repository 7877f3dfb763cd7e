//! Query result cursor

use crate::error::{EngineError, Result};
use arrow::compute;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;

/// Handle to the results of one query, created per execution.
///
/// The cursor is consumed once: the first call to
/// [`arrow_record_batch`](Cursor::arrow_record_batch) materializes the full
/// result; later calls fail with [`EngineError::CursorConsumed`].
pub struct Cursor {
    schema: SchemaRef,
    batches: Option<Vec<RecordBatch>>,
    row_count: usize,
}

impl Cursor {
    pub(crate) fn new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        let row_count = batches.iter().map(|b| b.num_rows()).sum();
        Self {
            schema,
            batches: Some(batches),
            row_count,
        }
    }

    /// Result schema
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Total number of result rows
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Whether the result has been read already
    pub fn consumed(&self) -> bool {
        self.batches.is_none()
    }

    /// Render the pending result as a text table, for debugging
    pub fn pretty(&self) -> Result<String> {
        let batches = self
            .batches
            .as_deref()
            .ok_or(EngineError::CursorConsumed)?;
        let table = arrow::util::pretty::pretty_format_batches(batches)?;
        Ok(table.to_string())
    }

    /// Materialize the full result as a single Arrow record batch.
    ///
    /// An empty result yields an empty batch with the result schema.
    pub fn arrow_record_batch(&mut self) -> Result<RecordBatch> {
        let batches = self.batches.take().ok_or(EngineError::CursorConsumed)?;

        if batches.is_empty() {
            return Ok(RecordBatch::new_empty(self.schema.clone()));
        }
        if batches.len() == 1 {
            return Ok(batches.into_iter().next().unwrap());
        }

        compute::concat_batches(&self.schema, &batches).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn test_batch(values: Vec<i64>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, true)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values))]).unwrap()
    }

    #[test]
    fn test_cursor_concatenates_batches() {
        let b1 = test_batch(vec![1, 2]);
        let b2 = test_batch(vec![3]);
        let schema = b1.schema();

        let mut cursor = Cursor::new(schema, vec![b1, b2]);
        assert_eq!(cursor.row_count(), 3);
        assert!(!cursor.consumed());

        let batch = cursor.arrow_record_batch().unwrap();
        assert_eq!(batch.num_rows(), 3);
        assert!(cursor.consumed());
    }

    #[test]
    fn test_cursor_pretty() {
        let b = test_batch(vec![7]);
        let schema = b.schema();

        let mut cursor = Cursor::new(schema, vec![b]);
        let rendered = cursor.pretty().unwrap();
        assert!(rendered.contains('7'));

        cursor.arrow_record_batch().unwrap();
        assert!(matches!(cursor.pretty(), Err(EngineError::CursorConsumed)));
    }

    #[test]
    fn test_cursor_consumed_once() {
        let b = test_batch(vec![1]);
        let schema = b.schema();

        let mut cursor = Cursor::new(schema, vec![b]);
        cursor.arrow_record_batch().unwrap();

        let err = cursor.arrow_record_batch().unwrap_err();
        assert!(matches!(err, EngineError::CursorConsumed));
    }

    #[test]
    fn test_cursor_empty_result() {
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, true)]));

        let mut cursor = Cursor::new(schema.clone(), vec![]);
        assert_eq!(cursor.row_count(), 0);

        let batch = cursor.arrow_record_batch().unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.schema(), schema);
    }
}
