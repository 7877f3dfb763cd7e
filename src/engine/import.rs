//! Import validation for Arrow tables

use crate::error::{EngineError, Result};
use arrow::datatypes::{DataType, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;

/// Check whether a column type is in the engine's supported set
pub fn is_supported_type(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Utf8
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::Float32
            | DataType::Float64
            | DataType::Boolean
            | DataType::Timestamp(TimeUnit::Second, None)
            | DataType::Timestamp(TimeUnit::Nanosecond, None)
    )
}

/// Reject schemas containing unsupported column types
pub fn validate_schema(schema: &Schema) -> Result<()> {
    for field in schema.fields() {
        if !is_supported_type(field.data_type()) {
            return Err(EngineError::UnsupportedType {
                column: field.name().clone(),
                data_type: field.data_type().clone(),
            });
        }
    }
    Ok(())
}

/// Check every batch against the declared schema: column count and types
/// must match exactly
pub fn validate_batches(schema: &SchemaRef, batches: &[RecordBatch]) -> Result<()> {
    for (i, batch) in batches.iter().enumerate() {
        let batch_schema = batch.schema();

        if batch_schema.fields().len() != schema.fields().len() {
            return Err(EngineError::SchemaMismatch(format!(
                "batch {} has {} columns, schema declares {}",
                i,
                batch_schema.fields().len(),
                schema.fields().len()
            )));
        }

        for (declared, actual) in schema.fields().iter().zip(batch_schema.fields().iter()) {
            if declared.name() != actual.name() {
                return Err(EngineError::SchemaMismatch(format!(
                    "batch {} column '{}' does not match declared column '{}'",
                    i,
                    actual.name(),
                    declared.name()
                )));
            }
            if declared.data_type() != actual.data_type() {
                return Err(EngineError::SchemaMismatch(format!(
                    "column '{}' in batch {} has type {}, schema declares {}",
                    actual.name(),
                    i,
                    actual.data_type(),
                    declared.data_type()
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int32Array, Int64Array};
    use arrow::datatypes::Field;
    use std::sync::Arc;

    #[test]
    fn test_supported_types() {
        assert!(is_supported_type(&DataType::Utf8));
        assert!(is_supported_type(&DataType::Int8));
        assert!(is_supported_type(&DataType::Timestamp(
            TimeUnit::Second,
            None
        )));
        assert!(is_supported_type(&DataType::Timestamp(
            TimeUnit::Nanosecond,
            None
        )));

        assert!(!is_supported_type(&DataType::Timestamp(
            TimeUnit::Millisecond,
            None
        )));
        assert!(!is_supported_type(&DataType::Date32));
        assert!(!is_supported_type(&DataType::UInt64));
        assert!(!is_supported_type(&DataType::Decimal128(38, 10)));
    }

    #[test]
    fn test_validate_schema_rejects_unsupported() {
        let schema = Schema::new(vec![
            Field::new("a", DataType::Int64, false),
            Field::new("b", DataType::Date32, true),
        ]);

        let err = validate_schema(&schema).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedType { .. }));
    }

    #[test]
    fn test_validate_batches_type_mismatch() {
        let declared = Arc::new(Schema::new(vec![Field::new("a", DataType::Int64, false)]));

        let actual_schema = Arc::new(Schema::new(vec![Field::new("a", DataType::Int32, false)]));
        let batch = RecordBatch::try_new(
            actual_schema,
            vec![Arc::new(Int32Array::from(vec![1, 2, 3]))],
        )
        .unwrap();

        let err = validate_batches(&declared, &[batch]).unwrap_err();
        assert!(matches!(err, EngineError::SchemaMismatch(_)));
    }

    #[test]
    fn test_validate_batches_ok() {
        let schema = Arc::new(Schema::new(vec![Field::new("a", DataType::Int64, false)]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(Int64Array::from(vec![1, 2, 3]))],
        )
        .unwrap();

        assert!(validate_batches(&schema, &[batch]).is_ok());
    }
}
