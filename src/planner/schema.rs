//! Schema types for planning

use arrow::datatypes::{DataType as ArrowDataType, Field, Schema as ArrowSchema};
use std::collections::HashMap;
use std::sync::Arc;

/// Schema field with nullability
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    pub name: String,
    pub data_type: ArrowDataType,
    pub nullable: bool,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, data_type: ArrowDataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn to_arrow_field(&self) -> Field {
        Field::new(&self.name, self.data_type.clone(), self.nullable)
    }
}

/// Schema representing the output of a plan node
#[derive(Debug, Clone)]
pub struct PlanSchema {
    fields: Vec<SchemaField>,
    /// Map from column name to field index
    name_index: HashMap<String, usize>,
}

impl PartialEq for PlanSchema {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl PlanSchema {
    pub fn new(fields: Vec<SchemaField>) -> Self {
        let mut name_index = HashMap::new();
        for (i, field) in fields.iter().enumerate() {
            // First occurrence wins for duplicate output names
            name_index.entry(field.name.clone()).or_insert(i);
        }
        Self { fields, name_index }
    }

    pub fn empty() -> Self {
        Self::new(vec![])
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&SchemaField> {
        self.fields.get(index)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Find a column by name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_index.get(name).copied()
    }

    pub fn field_by_name(&self, name: &str) -> Option<&SchemaField> {
        self.index_of(name).map(|i| &self.fields[i])
    }

    /// Convert to Arrow schema
    pub fn to_arrow_schema(&self) -> ArrowSchema {
        let fields: Vec<Field> = self.fields.iter().map(|f| f.to_arrow_field()).collect();
        ArrowSchema::new(fields)
    }

    pub fn to_arrow_schema_ref(&self) -> Arc<ArrowSchema> {
        Arc::new(self.to_arrow_schema())
    }

    /// Project specific columns
    pub fn project(&self, indices: &[usize]) -> Self {
        let fields: Vec<SchemaField> = indices
            .iter()
            .filter_map(|&i| self.fields.get(i).cloned())
            .collect();
        Self::new(fields)
    }
}

impl From<&ArrowSchema> for PlanSchema {
    fn from(schema: &ArrowSchema) -> Self {
        let fields: Vec<SchemaField> = schema
            .fields()
            .iter()
            .map(|f| {
                SchemaField::new(f.name().clone(), f.data_type().clone())
                    .with_nullable(f.is_nullable())
            })
            .collect();
        Self::new(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_index_of() {
        let schema = PlanSchema::new(vec![
            SchemaField::new("id", ArrowDataType::Int64),
            SchemaField::new("name", ArrowDataType::Utf8),
        ]);

        assert_eq!(schema.index_of("id"), Some(0));
        assert_eq!(schema.index_of("name"), Some(1));
        assert_eq!(schema.index_of("missing"), None);
    }

    #[test]
    fn test_schema_roundtrip() {
        let schema = PlanSchema::new(vec![
            SchemaField::new("id", ArrowDataType::Int64).with_nullable(false),
            SchemaField::new("name", ArrowDataType::Utf8),
        ]);

        let arrow = schema.to_arrow_schema();
        assert_eq!(arrow.fields().len(), 2);
        assert!(!arrow.field(0).is_nullable());

        let back = PlanSchema::from(&arrow);
        assert_eq!(back, schema);
    }

    #[test]
    fn test_schema_project() {
        let schema = PlanSchema::new(vec![
            SchemaField::new("a", ArrowDataType::Int64),
            SchemaField::new("b", ArrowDataType::Utf8),
            SchemaField::new("c", ArrowDataType::Boolean),
        ]);

        let projected = schema.project(&[2, 0]);
        assert_eq!(projected.len(), 2);
        assert_eq!(projected.field(0).unwrap().name, "c");
        assert_eq!(projected.field(1).unwrap().name, "a");
    }
}
