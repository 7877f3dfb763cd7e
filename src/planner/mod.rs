//! Query planner module
//!
//! Converts SQL AST to LogicalPlan

mod binder;
mod expr;
mod plan;
mod schema;

pub use binder::*;
pub use expr::*;
pub use plan::*;
pub use schema::*;
