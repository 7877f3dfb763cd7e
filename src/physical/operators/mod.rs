//! Physical operators

mod aggregate;
mod filter;
mod limit;
mod project;
mod scan;
mod sort;

pub use aggregate::{AggregateExpr, HashAggregateExec};
pub use filter::{evaluate_expr, FilterExec};
pub use limit::LimitExec;
pub use project::ProjectExec;
pub use scan::{MemoryTable, MemoryTableExec, TableProvider};
pub use sort::SortExec;
