//! Predicate pushdown optimization rule

use crate::error::Result;
use crate::optimizer::OptimizerRule;
use crate::planner::{
    AggregateNode, DistinctNode, Expr, LimitNode, LogicalPlan, ProjectNode, SortNode,
};
use std::sync::Arc;

/// Predicate pushdown rule
///
/// Moves filters as close to the scan as possible:
/// - adjacent filters are merged with AND,
/// - a filter over a projection is pushed below it when every referenced
///   column is a plain pass-through of the projection,
/// - a filter directly over a scan is folded into the scan's filter.
pub struct PredicatePushdown;

impl OptimizerRule for PredicatePushdown {
    fn name(&self) -> &str {
        "PredicatePushdown"
    }

    fn optimize(&self, plan: &LogicalPlan) -> Result<LogicalPlan> {
        self.optimize_plan(plan)
    }
}

impl PredicatePushdown {
    fn optimize_plan(&self, plan: &LogicalPlan) -> Result<LogicalPlan> {
        match plan {
            LogicalPlan::Filter(node) => {
                let input = self.optimize_plan(&node.input)?;
                self.push_filter(node.predicate.clone(), input)
            }
            LogicalPlan::Scan(_) => Ok(plan.clone()),
            LogicalPlan::Project(node) => Ok(LogicalPlan::Project(ProjectNode {
                input: Arc::new(self.optimize_plan(&node.input)?),
                exprs: node.exprs.clone(),
                schema: node.schema.clone(),
            })),
            LogicalPlan::Aggregate(node) => Ok(LogicalPlan::Aggregate(AggregateNode {
                input: Arc::new(self.optimize_plan(&node.input)?),
                group_by: node.group_by.clone(),
                aggregates: node.aggregates.clone(),
                schema: node.schema.clone(),
            })),
            LogicalPlan::Sort(node) => Ok(LogicalPlan::Sort(SortNode {
                input: Arc::new(self.optimize_plan(&node.input)?),
                order_by: node.order_by.clone(),
            })),
            LogicalPlan::Limit(node) => Ok(LogicalPlan::Limit(LimitNode {
                input: Arc::new(self.optimize_plan(&node.input)?),
                skip: node.skip,
                fetch: node.fetch,
            })),
            LogicalPlan::Distinct(node) => Ok(LogicalPlan::Distinct(DistinctNode {
                input: Arc::new(self.optimize_plan(&node.input)?),
            })),
        }
    }

    /// Push a predicate into the (already optimized) input plan
    fn push_filter(&self, predicate: Expr, input: LogicalPlan) -> Result<LogicalPlan> {
        match input {
            // Merge adjacent filters
            LogicalPlan::Filter(inner) => {
                let combined = inner.predicate.clone().and(predicate);
                self.push_filter(combined, inner.input.as_ref().clone())
            }

            // Fold into the scan
            LogicalPlan::Scan(mut scan) => {
                scan.filter = Some(match scan.filter.take() {
                    Some(existing) => existing.and(predicate),
                    None => predicate,
                });
                Ok(LogicalPlan::Scan(scan))
            }

            // Push below a pass-through projection
            LogicalPlan::Project(project) => {
                match rewrite_through_projection(&predicate, &project.exprs) {
                    Some(rewritten) => {
                        let pushed =
                            self.push_filter(rewritten, project.input.as_ref().clone())?;
                        Ok(LogicalPlan::Project(ProjectNode {
                            input: Arc::new(pushed),
                            exprs: project.exprs.clone(),
                            schema: project.schema.clone(),
                        }))
                    }
                    None => Ok(LogicalPlan::Project(project).filter(predicate)),
                }
            }

            // Anything else: leave the filter where it is
            other => Ok(other.filter(predicate)),
        }
    }
}

/// Rewrite a predicate so it can run below a projection.
///
/// Succeeds only when every column the predicate references maps to a plain
/// column (possibly aliased) in the projection; the rewrite substitutes the
/// underlying column names.
fn rewrite_through_projection(predicate: &Expr, project_exprs: &[Expr]) -> Option<Expr> {
    let mut referenced = Vec::new();
    predicate.referenced_columns(&mut referenced);

    let mut mapping: Vec<(String, String)> = Vec::new();
    for name in &referenced {
        let source = project_exprs.iter().find_map(|e| {
            if &e.output_name() != name {
                return None;
            }
            match e {
                Expr::Column(c) => Some(c.clone()),
                Expr::Alias { expr, .. } => match expr.as_ref() {
                    Expr::Column(c) => Some(c.clone()),
                    _ => None,
                },
                _ => None,
            }
        })?;
        mapping.push((name.clone(), source));
    }

    Some(substitute_columns(predicate, &mapping))
}

fn substitute_columns(expr: &Expr, mapping: &[(String, String)]) -> Expr {
    match expr {
        Expr::Column(name) => {
            let new_name = mapping
                .iter()
                .find(|(from, _)| from == name)
                .map(|(_, to)| to.clone())
                .unwrap_or_else(|| name.clone());
            Expr::Column(new_name)
        }
        Expr::Literal(_) | Expr::Wildcard => expr.clone(),
        Expr::BinaryExpr { left, op, right } => Expr::BinaryExpr {
            left: Box::new(substitute_columns(left, mapping)),
            op: *op,
            right: Box::new(substitute_columns(right, mapping)),
        },
        Expr::UnaryExpr { op, expr } => Expr::UnaryExpr {
            op: *op,
            expr: Box::new(substitute_columns(expr, mapping)),
        },
        Expr::Aggregate {
            func,
            args,
            distinct,
        } => Expr::Aggregate {
            func: *func,
            args: args.iter().map(|a| substitute_columns(a, mapping)).collect(),
            distinct: *distinct,
        },
        Expr::Cast { expr, data_type } => Expr::Cast {
            expr: Box::new(substitute_columns(expr, mapping)),
            data_type: data_type.clone(),
        },
        Expr::Case {
            when_then,
            else_expr,
        } => Expr::Case {
            when_then: when_then
                .iter()
                .map(|(w, t)| {
                    (
                        substitute_columns(w, mapping),
                        substitute_columns(t, mapping),
                    )
                })
                .collect(),
            else_expr: else_expr
                .as_ref()
                .map(|e| Box::new(substitute_columns(e, mapping))),
        },
        Expr::InList {
            expr,
            list,
            negated,
        } => Expr::InList {
            expr: Box::new(substitute_columns(expr, mapping)),
            list: list.iter().map(|e| substitute_columns(e, mapping)).collect(),
            negated: *negated,
        },
        Expr::Between {
            expr,
            low,
            high,
            negated,
        } => Expr::Between {
            expr: Box::new(substitute_columns(expr, mapping)),
            low: Box::new(substitute_columns(low, mapping)),
            high: Box::new(substitute_columns(high, mapping)),
            negated: *negated,
        },
        Expr::Alias { expr, name } => Expr::Alias {
            expr: Box::new(substitute_columns(expr, mapping)),
            name: name.clone(),
        },
    }
}
