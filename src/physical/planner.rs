//! Physical planner - converts logical plans to physical plans

use crate::error::{EngineError, Result};
use crate::physical::operators::{
    AggregateExpr, FilterExec, HashAggregateExec, LimitExec, MemoryTableExec, ProjectExec,
    SortExec, TableProvider,
};
use crate::physical::PhysicalOperator;
use crate::planner::{Expr, LogicalPlan, PlanSchema};
use arrow::datatypes::{Field, Schema, SchemaRef};
use std::collections::HashMap;
use std::sync::Arc;

/// Physical planner that converts logical plans to physical execution plans
pub struct PhysicalPlanner {
    /// Table providers for accessing table data
    tables: HashMap<String, Arc<dyn TableProvider>>,
    /// Number of partitions scans spread their batches over
    partitions: usize,
}

impl PhysicalPlanner {
    pub fn new(partitions: usize) -> Self {
        Self {
            tables: HashMap::new(),
            partitions: partitions.max(1),
        }
    }

    /// Register a table provider
    pub fn register_table(&mut self, name: impl Into<String>, provider: Arc<dyn TableProvider>) {
        self.tables.insert(name.into(), provider);
    }

    /// Convert a logical plan to a physical plan
    pub fn create_physical_plan(&self, logical: &LogicalPlan) -> Result<Arc<dyn PhysicalOperator>> {
        match logical {
            LogicalPlan::Scan(node) => {
                let provider = self
                    .tables
                    .get(&node.table_name)
                    .ok_or_else(|| EngineError::TableNotFound(node.table_name.clone()))?;

                let exec = MemoryTableExec::from_provider(
                    &node.table_name,
                    provider.as_ref(),
                    node.projection.as_deref(),
                    self.partitions,
                )?;

                match &node.filter {
                    Some(predicate) => Ok(Arc::new(FilterExec::new(
                        Arc::new(exec),
                        predicate.clone(),
                    ))),
                    None => Ok(Arc::new(exec)),
                }
            }

            LogicalPlan::Filter(node) => {
                let input = self.create_physical_plan(&node.input)?;
                Ok(Arc::new(FilterExec::new(input, node.predicate.clone())))
            }

            LogicalPlan::Project(node) => {
                let input = self.create_physical_plan(&node.input)?;
                let schema = plan_schema_to_arrow(&node.schema);
                Ok(Arc::new(ProjectExec::new(
                    input,
                    node.exprs.clone(),
                    schema,
                )))
            }

            LogicalPlan::Aggregate(node) => {
                let input = self.create_physical_plan(&node.input)?;
                let aggregates = extract_aggregates(&node.aggregates);
                let schema = plan_schema_to_arrow(&node.schema);
                Ok(Arc::new(HashAggregateExec::new(
                    input,
                    node.group_by.clone(),
                    aggregates,
                    schema,
                )))
            }

            LogicalPlan::Sort(node) => {
                let input = self.create_physical_plan(&node.input)?;
                Ok(Arc::new(SortExec::new(input, node.order_by.clone())))
            }

            LogicalPlan::Limit(node) => {
                let input = self.create_physical_plan(&node.input)?;
                Ok(Arc::new(LimitExec::new(input, node.skip, node.fetch)))
            }

            LogicalPlan::Distinct(node) => {
                // Distinct is a group-by over all columns with no aggregates
                let input = self.create_physical_plan(&node.input)?;
                let input_schema = input.schema();

                let group_by: Vec<Expr> = input_schema
                    .fields()
                    .iter()
                    .map(|f| Expr::column(f.name().clone()))
                    .collect();

                Ok(Arc::new(HashAggregateExec::new(
                    input,
                    group_by,
                    vec![],
                    input_schema,
                )))
            }
        }
    }
}

/// Convert PlanSchema to Arrow Schema
fn plan_schema_to_arrow(plan_schema: &PlanSchema) -> SchemaRef {
    let fields: Vec<Field> = plan_schema
        .fields()
        .iter()
        .map(|f| f.to_arrow_field())
        .collect();
    Arc::new(Schema::new(fields))
}

/// Extract aggregate expressions from logical expressions
fn extract_aggregates(exprs: &[Expr]) -> Vec<AggregateExpr> {
    let mut aggregates = Vec::new();
    for expr in exprs {
        collect_aggregates(expr, &mut aggregates);
    }
    aggregates
}

fn collect_aggregates(expr: &Expr, aggregates: &mut Vec<AggregateExpr>) {
    match expr {
        Expr::Aggregate {
            func,
            args,
            distinct,
        } => {
            let input = args.first().cloned().unwrap_or(Expr::Wildcard);
            aggregates.push(AggregateExpr {
                func: *func,
                input,
                distinct: *distinct,
            });
        }
        Expr::BinaryExpr { left, right, .. } => {
            collect_aggregates(left, aggregates);
            collect_aggregates(right, aggregates);
        }
        Expr::UnaryExpr { expr, .. } => collect_aggregates(expr, aggregates),
        Expr::Cast { expr, .. } => collect_aggregates(expr, aggregates),
        Expr::Alias { expr, .. } => collect_aggregates(expr, aggregates),
        Expr::Case {
            when_then,
            else_expr,
        } => {
            for (w, t) in when_then {
                collect_aggregates(w, aggregates);
                collect_aggregates(t, aggregates);
            }
            if let Some(e) = else_expr {
                collect_aggregates(e, aggregates);
            }
        }
        _ => {}
    }
}
