//! Logical plan types

use crate::planner::expr::{Expr, SortExpr};
use crate::planner::schema::PlanSchema;
use std::fmt;
use std::sync::Arc;

/// Logical plan node
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalPlan {
    /// Table scan
    Scan(ScanNode),
    /// Filter (WHERE / HAVING clause)
    Filter(FilterNode),
    /// Projection (SELECT columns)
    Project(ProjectNode),
    /// Aggregation (GROUP BY)
    Aggregate(AggregateNode),
    /// Sort (ORDER BY)
    Sort(SortNode),
    /// Limit
    Limit(LimitNode),
    /// Distinct
    Distinct(DistinctNode),
}

impl LogicalPlan {
    /// Get the output schema of this plan node
    pub fn schema(&self) -> PlanSchema {
        match self {
            LogicalPlan::Scan(node) => node.output_schema(),
            LogicalPlan::Filter(node) => node.input.schema(),
            LogicalPlan::Project(node) => node.schema.clone(),
            LogicalPlan::Aggregate(node) => node.schema.clone(),
            LogicalPlan::Sort(node) => node.input.schema(),
            LogicalPlan::Limit(node) => node.input.schema(),
            LogicalPlan::Distinct(node) => node.input.schema(),
        }
    }

    /// Get child plans
    pub fn children(&self) -> Vec<&LogicalPlan> {
        match self {
            LogicalPlan::Scan(_) => vec![],
            LogicalPlan::Filter(node) => vec![&node.input],
            LogicalPlan::Project(node) => vec![&node.input],
            LogicalPlan::Aggregate(node) => vec![&node.input],
            LogicalPlan::Sort(node) => vec![&node.input],
            LogicalPlan::Limit(node) => vec![&node.input],
            LogicalPlan::Distinct(node) => vec![&node.input],
        }
    }

    /// Builder: add a filter
    pub fn filter(self, predicate: Expr) -> Self {
        LogicalPlan::Filter(FilterNode {
            input: Arc::new(self),
            predicate,
        })
    }

    /// Builder: add a projection
    pub fn project(self, exprs: Vec<Expr>) -> crate::error::Result<Self> {
        let input = Arc::new(self);
        let input_schema = input.schema();

        let fields: crate::error::Result<Vec<_>> =
            exprs.iter().map(|e| e.to_field(&input_schema)).collect();

        Ok(LogicalPlan::Project(ProjectNode {
            input,
            exprs,
            schema: PlanSchema::new(fields?),
        }))
    }

    /// Builder: add a sort
    pub fn sort(self, order_by: Vec<SortExpr>) -> Self {
        LogicalPlan::Sort(SortNode {
            input: Arc::new(self),
            order_by,
        })
    }

    /// Builder: add a limit
    pub fn limit(self, skip: usize, fetch: Option<usize>) -> Self {
        LogicalPlan::Limit(LimitNode {
            input: Arc::new(self),
            skip,
            fetch,
        })
    }
}

impl fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indent(f, 0)
    }
}

impl LogicalPlan {
    fn fmt_indent(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let prefix = "  ".repeat(indent);

        match self {
            LogicalPlan::Scan(node) => {
                let schema = node.output_schema();
                let cols: Vec<&str> = schema.fields().iter().map(|f| f.name.as_str()).collect();
                writeln!(f, "{}Scan: {} [{}]", prefix, node.table_name, cols.join(", "))?;
                if let Some(filter) = &node.filter {
                    writeln!(f, "{}  filter: {}", prefix, filter)?;
                }
            }
            LogicalPlan::Filter(node) => {
                writeln!(f, "{}Filter: {}", prefix, node.predicate)?;
                node.input.fmt_indent(f, indent + 1)?;
            }
            LogicalPlan::Project(node) => {
                let exprs: Vec<String> = node.exprs.iter().map(|e| e.to_string()).collect();
                writeln!(f, "{}Project: [{}]", prefix, exprs.join(", "))?;
                node.input.fmt_indent(f, indent + 1)?;
            }
            LogicalPlan::Aggregate(node) => {
                let group_by: Vec<String> = node.group_by.iter().map(|e| e.to_string()).collect();
                let aggs: Vec<String> = node.aggregates.iter().map(|e| e.to_string()).collect();
                writeln!(
                    f,
                    "{}Aggregate: group_by=[{}], aggs=[{}]",
                    prefix,
                    group_by.join(", "),
                    aggs.join(", ")
                )?;
                node.input.fmt_indent(f, indent + 1)?;
            }
            LogicalPlan::Sort(node) => {
                let order: Vec<String> = node
                    .order_by
                    .iter()
                    .map(|s| format!("{} {:?}", s.expr, s.direction))
                    .collect();
                writeln!(f, "{}Sort: [{}]", prefix, order.join(", "))?;
                node.input.fmt_indent(f, indent + 1)?;
            }
            LogicalPlan::Limit(node) => {
                writeln!(f, "{}Limit: skip={}, fetch={:?}", prefix, node.skip, node.fetch)?;
                node.input.fmt_indent(f, indent + 1)?;
            }
            LogicalPlan::Distinct(node) => {
                writeln!(f, "{}Distinct", prefix)?;
                node.input.fmt_indent(f, indent + 1)?;
            }
        }
        Ok(())
    }
}

/// Table scan node
#[derive(Debug, Clone, PartialEq)]
pub struct ScanNode {
    pub table_name: String,
    /// Full table schema
    pub schema: PlanSchema,
    /// Optional projection (column indices into the full schema)
    pub projection: Option<Vec<usize>>,
    /// Optional filter pushed down into the scan
    pub filter: Option<Expr>,
}

impl ScanNode {
    /// Schema after applying the projection, if any
    pub fn output_schema(&self) -> PlanSchema {
        match &self.projection {
            Some(indices) => self.schema.project(indices),
            None => self.schema.clone(),
        }
    }
}

/// Filter node
#[derive(Debug, Clone, PartialEq)]
pub struct FilterNode {
    pub input: Arc<LogicalPlan>,
    pub predicate: Expr,
}

/// Projection node
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectNode {
    pub input: Arc<LogicalPlan>,
    pub exprs: Vec<Expr>,
    pub schema: PlanSchema,
}

/// Aggregate node
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateNode {
    pub input: Arc<LogicalPlan>,
    pub group_by: Vec<Expr>,
    pub aggregates: Vec<Expr>,
    pub schema: PlanSchema,
}

/// Sort node
#[derive(Debug, Clone, PartialEq)]
pub struct SortNode {
    pub input: Arc<LogicalPlan>,
    pub order_by: Vec<SortExpr>,
}

/// Limit node
#[derive(Debug, Clone, PartialEq)]
pub struct LimitNode {
    pub input: Arc<LogicalPlan>,
    pub skip: usize,
    pub fetch: Option<usize>,
}

/// Distinct node
#[derive(Debug, Clone, PartialEq)]
pub struct DistinctNode {
    pub input: Arc<LogicalPlan>,
}

/// Builder for creating logical plans by hand (used by tests and the binder)
pub struct LogicalPlanBuilder {
    plan: LogicalPlan,
}

impl LogicalPlanBuilder {
    pub fn scan(table_name: impl Into<String>, schema: PlanSchema) -> Self {
        Self {
            plan: LogicalPlan::Scan(ScanNode {
                table_name: table_name.into(),
                schema,
                projection: None,
                filter: None,
            }),
        }
    }

    pub fn filter(mut self, predicate: Expr) -> Self {
        self.plan = self.plan.filter(predicate);
        self
    }

    pub fn project(mut self, exprs: Vec<Expr>) -> crate::error::Result<Self> {
        self.plan = self.plan.project(exprs)?;
        Ok(self)
    }

    pub fn aggregate(
        mut self,
        group_by: Vec<Expr>,
        aggregates: Vec<Expr>,
    ) -> crate::error::Result<Self> {
        let input = Arc::new(self.plan);
        let input_schema = input.schema();

        let mut fields = Vec::new();
        for expr in group_by.iter().chain(aggregates.iter()) {
            fields.push(expr.to_field(&input_schema)?);
        }

        self.plan = LogicalPlan::Aggregate(AggregateNode {
            input,
            group_by,
            aggregates,
            schema: PlanSchema::new(fields),
        });
        Ok(self)
    }

    pub fn sort(mut self, order_by: Vec<SortExpr>) -> Self {
        self.plan = self.plan.sort(order_by);
        self
    }

    pub fn limit(mut self, skip: usize, fetch: Option<usize>) -> Self {
        self.plan = self.plan.limit(skip, fetch);
        self
    }

    pub fn build(self) -> LogicalPlan {
        self.plan
    }
}
