//! Engine handle - the embedded entry point
//!
//! An [`Engine`] owns the table catalog and the table data, and executes SQL
//! against them. The surface is blocking; internally queries run on the
//! engine's private tokio runtime through the streaming operator pipeline.

mod config;
mod cursor;
mod import;

pub use config::EngineConfig;
pub use cursor::Cursor;

use crate::error::{EngineError, Result};
use crate::optimizer::Optimizer;
use crate::parser;
use crate::physical::operators::{MemoryTable, TableProvider};
use crate::physical::{PhysicalOperator, PhysicalPlanner};
use crate::planner::{bind_ddl, Binder, Catalog, DdlStatement, MemoryCatalog, PlanSchema};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Embedded database engine handle.
///
/// Lifecycle: open at construction, closed after [`close`](Engine::close);
/// a closed handle rejects imports and queries.
pub struct Engine {
    config: EngineConfig,
    catalog: MemoryCatalog,
    tables: HashMap<String, Arc<dyn TableProvider>>,
    optimizer: Optimizer,
    /// Drives the async operator pipeline from the blocking surface.
    /// Calling into the engine from inside another tokio runtime panics,
    /// as blocking a runtime thread always does.
    runtime: tokio::runtime::Runtime,
    closed: bool,
}

impl Engine {
    /// Open an engine with default configuration
    pub fn open() -> Result<Self> {
        Self::with_config(EngineConfig::default())
    }

    /// Open an engine with the given configuration
    pub fn with_config(config: EngineConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.partitions)
            .enable_all()
            .build()?;

        debug!(partitions = config.partitions, "engine opened");

        Ok(Self {
            config,
            catalog: MemoryCatalog::new(),
            tables: HashMap::new(),
            optimizer: Optimizer::new(),
            runtime,
            closed: false,
        })
    }

    /// Whether this handle has been closed
    pub fn closed(&self) -> bool {
        self.closed
    }

    /// Close the handle. Idempotent; the table data is dropped with the engine.
    pub fn close(&mut self) {
        if !self.closed {
            debug!("engine closed");
            self.closed = true;
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(EngineError::EngineClosed);
        }
        Ok(())
    }

    /// Import a named table from Arrow record batches.
    ///
    /// Every batch must match the declared schema exactly (column count,
    /// names, and types), and all column types must be in the supported set.
    pub fn import_arrow_table(
        &mut self,
        name: impl Into<String>,
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
    ) -> Result<()> {
        self.ensure_open()?;

        let name = name.into();
        if self.catalog.table_exists(&name) {
            return Err(EngineError::TableExists(name));
        }

        import::validate_schema(&schema)?;
        import::validate_batches(&schema, &batches)?;

        let row_count: usize = batches.iter().map(|b| b.num_rows()).sum();
        debug!(table = %name, rows = row_count, "imported arrow table");

        self.catalog
            .register_table(name.clone(), PlanSchema::from(schema.as_ref()));
        self.tables
            .insert(name, Arc::new(MemoryTable::new(schema, batches)));

        Ok(())
    }

    /// Import a named table from a single record batch
    pub fn import_record_batch(
        &mut self,
        name: impl Into<String>,
        batch: RecordBatch,
    ) -> Result<()> {
        let schema = batch.schema();
        self.import_arrow_table(name, schema, vec![batch])
    }

    /// Execute a SQL query and return a cursor over its results
    pub fn execute_dml(&self, sql: &str) -> Result<Cursor> {
        self.ensure_open()?;
        debug!(sql, "executing dml");

        // Parse and plan
        let stmt = parser::parse_statement(sql)?;
        let mut binder = Binder::new(&self.catalog);
        let logical = binder.bind(&stmt)?;
        let optimized = self.optimizer.optimize(logical)?;

        // Physical planning
        let mut planner = PhysicalPlanner::new(self.config.partitions);
        for (name, provider) in &self.tables {
            planner.register_table(name.clone(), provider.clone());
        }
        let physical = planner.create_physical_plan(&optimized)?;

        // Execute all partitions on the engine runtime
        let batches = self.collect_partitions(&physical)?;
        let schema = physical.schema();

        Ok(Cursor::new(schema, batches))
    }

    /// Execute a DDL statement (`CREATE TABLE`, `DROP TABLE`)
    pub fn execute_ddl(&mut self, sql: &str) -> Result<()> {
        self.ensure_open()?;
        debug!(sql, "executing ddl");

        let stmt = parser::parse_statement(sql)?;
        match bind_ddl(&stmt)? {
            DdlStatement::CreateTable {
                name,
                schema,
                if_not_exists,
            } => {
                if self.catalog.table_exists(&name) {
                    if if_not_exists {
                        return Ok(());
                    }
                    return Err(EngineError::TableExists(name));
                }

                let arrow_schema = schema.to_arrow_schema_ref();
                import::validate_schema(&arrow_schema)?;

                self.catalog.register_table(name.clone(), schema);
                self.tables
                    .insert(name, Arc::new(MemoryTable::new(arrow_schema, vec![])));
                Ok(())
            }
            DdlStatement::DropTable { names, if_exists } => {
                for name in names {
                    let existed = self.catalog.deregister_table(&name);
                    self.tables.remove(&name);
                    if !existed && !if_exists {
                        return Err(EngineError::TableNotFound(name));
                    }
                }
                Ok(())
            }
        }
    }

    /// Names of all registered tables
    pub fn table_names(&self) -> Vec<String> {
        self.catalog.table_names()
    }

    /// Schema of a registered table
    pub fn table_schema(&self, name: &str) -> Option<SchemaRef> {
        self.tables.get(name).map(|t| t.schema())
    }

    fn collect_partitions(
        &self,
        physical: &Arc<dyn PhysicalOperator>,
    ) -> Result<Vec<RecordBatch>> {
        let num_partitions = physical.output_partitions().max(1);

        self.runtime.block_on(async {
            let partition_futures: Vec<_> = (0..num_partitions)
                .map(|partition_id| {
                    let physical = physical.clone();
                    async move {
                        let stream = physical.execute(partition_id).await?;
                        stream.try_collect::<Vec<RecordBatch>>().await
                    }
                })
                .collect();

            let partition_results = futures::future::join_all(partition_futures).await;

            let mut all_batches = Vec::new();
            for result in partition_results {
                all_batches.extend(result?);
            }
            Ok(all_batches)
        })
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("closed", &self.closed)
            .field("tables", &self.table_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};

    fn test_engine() -> Engine {
        let mut engine = Engine::with_config(EngineConfig::new().with_partitions(2)).unwrap();

        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])),
                Arc::new(StringArray::from(vec!["a", "b", "c"])),
            ],
        )
        .unwrap();

        engine.import_arrow_table("items", schema, vec![batch]).unwrap();
        engine
    }

    #[test]
    fn test_open_and_close() {
        let mut engine = Engine::open().unwrap();
        assert!(!engine.closed());

        engine.close();
        assert!(engine.closed());
        engine.close();
        assert!(engine.closed());
    }

    #[test]
    fn test_closed_engine_rejects_operations() {
        let mut engine = test_engine();
        engine.close();

        assert!(matches!(
            engine.execute_dml("SELECT * FROM items"),
            Err(EngineError::EngineClosed)
        ));
        assert!(matches!(
            engine.execute_ddl("CREATE TABLE t (a BIGINT)"),
            Err(EngineError::EngineClosed)
        ));
    }

    #[test]
    fn test_import_then_query() {
        let engine = test_engine();

        let mut cursor = engine.execute_dml("SELECT * FROM items").unwrap();
        assert_eq!(cursor.row_count(), 3);

        let batch = cursor.arrow_record_batch().unwrap();
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.num_columns(), 2);
        assert!(!engine.closed());
    }

    #[test]
    fn test_duplicate_import_rejected() {
        let mut engine = test_engine();

        let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Int64, false)]));
        let err = engine
            .import_arrow_table("items", schema, vec![])
            .unwrap_err();
        assert!(matches!(err, EngineError::TableExists(_)));
    }

    #[test]
    fn test_ddl_create_and_drop() {
        let mut engine = test_engine();

        engine
            .execute_ddl("CREATE TABLE stats (day TIMESTAMP(0), total BIGINT)")
            .unwrap();
        assert!(engine.table_schema("stats").is_some());

        let mut cursor = engine.execute_dml("SELECT * FROM stats").unwrap();
        assert_eq!(cursor.row_count(), 0);
        let batch = cursor.arrow_record_batch().unwrap();
        assert_eq!(batch.num_columns(), 2);

        engine.execute_ddl("DROP TABLE stats").unwrap();
        assert!(engine.table_schema("stats").is_none());

        assert!(matches!(
            engine.execute_ddl("DROP TABLE stats"),
            Err(EngineError::TableNotFound(_))
        ));
        engine.execute_ddl("DROP TABLE IF EXISTS stats").unwrap();
    }
}
