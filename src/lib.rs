//! emberdb - embeddable analytical SQL engine over Apache Arrow
//!
//! An in-process engine: open a handle, import named tables as Arrow record
//! batches, execute SQL, and read results back as record batches.
//!
//! ```no_run
//! use arrow::array::{Int64Array, RecordBatch};
//! use arrow::datatypes::{DataType, Field, Schema};
//! use emberdb::{Engine, Result};
//! use std::sync::Arc;
//!
//! fn main() -> Result<()> {
//!     let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
//!     let batch = RecordBatch::try_new(
//!         schema.clone(),
//!         vec![Arc::new(Int64Array::from(vec![1, 2, 3]))],
//!     )?;
//!
//!     let mut engine = Engine::open()?;
//!     engine.import_arrow_table("items", schema, vec![batch])?;
//!
//!     let mut cursor = engine.execute_dml("SELECT * FROM items WHERE id > 1")?;
//!     let result = cursor.arrow_record_batch()?;
//!     assert_eq!(result.num_rows(), 2);
//!     Ok(())
//! }
//! ```

pub mod capi;
pub mod engine;
pub mod error;
pub mod optimizer;
pub mod parser;
pub mod physical;
pub mod planner;

// Re-export main types
pub use engine::{Cursor, Engine, EngineConfig};
pub use error::{EngineError, Result};
pub use planner::{Binder, LogicalPlan, MemoryCatalog};
