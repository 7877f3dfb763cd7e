//! Projection pushdown optimization rule

use crate::error::Result;
use crate::optimizer::OptimizerRule;
use crate::planner::{
    AggregateNode, DistinctNode, Expr, FilterNode, LimitNode, LogicalPlan, ProjectNode, ScanNode,
    SortNode,
};
use std::sync::Arc;

/// Projection pushdown rule
///
/// Prunes unused columns at the scan: when a projection or aggregation sits
/// over a scan (possibly through a filter), the scan only materializes the
/// columns the upper nodes reference. Column references survive the pruning
/// unchanged because scan output keeps the original field names.
pub struct ProjectionPushdown;

impl OptimizerRule for ProjectionPushdown {
    fn name(&self) -> &str {
        "ProjectionPushdown"
    }

    fn optimize(&self, plan: &LogicalPlan) -> Result<LogicalPlan> {
        self.optimize_plan(plan)
    }
}

impl ProjectionPushdown {
    fn optimize_plan(&self, plan: &LogicalPlan) -> Result<LogicalPlan> {
        match plan {
            LogicalPlan::Project(node) => {
                let mut needed = Vec::new();
                for expr in &node.exprs {
                    expr.referenced_columns(&mut needed);
                }

                let input = match prune_input(&node.input, &needed) {
                    Some(pruned) => pruned,
                    None => self.optimize_plan(&node.input)?,
                };

                Ok(LogicalPlan::Project(ProjectNode {
                    input: Arc::new(input),
                    exprs: node.exprs.clone(),
                    schema: node.schema.clone(),
                }))
            }
            LogicalPlan::Aggregate(node) => {
                let mut needed = Vec::new();
                for expr in node.group_by.iter().chain(node.aggregates.iter()) {
                    expr.referenced_columns(&mut needed);
                }

                let input = match prune_input(&node.input, &needed) {
                    Some(pruned) => pruned,
                    None => self.optimize_plan(&node.input)?,
                };

                Ok(LogicalPlan::Aggregate(AggregateNode {
                    input: Arc::new(input),
                    group_by: node.group_by.clone(),
                    aggregates: node.aggregates.clone(),
                    schema: node.schema.clone(),
                }))
            }
            LogicalPlan::Scan(_) => Ok(plan.clone()),
            LogicalPlan::Filter(node) => Ok(LogicalPlan::Filter(FilterNode {
                input: Arc::new(self.optimize_plan(&node.input)?),
                predicate: node.predicate.clone(),
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
}

/// Prune the scan below a projection or aggregation.
///
/// Handles `Scan` and `Filter(Scan)` inputs; returns None for other shapes.
fn prune_input(input: &LogicalPlan, needed: &[String]) -> Option<LogicalPlan> {
    match input {
        LogicalPlan::Scan(scan) => {
            let mut all_needed = needed.to_vec();
            if let Some(filter) = &scan.filter {
                filter.referenced_columns(&mut all_needed);
            }
            prune_scan(scan, &all_needed).map(LogicalPlan::Scan)
        }
        LogicalPlan::Filter(filter) => {
            if let LogicalPlan::Scan(scan) = filter.input.as_ref() {
                let mut all_needed = needed.to_vec();
                filter.predicate.referenced_columns(&mut all_needed);
                if let Some(scan_filter) = &scan.filter {
                    scan_filter.referenced_columns(&mut all_needed);
                }
                prune_scan(scan, &all_needed).map(|pruned| {
                    LogicalPlan::Filter(FilterNode {
                        input: Arc::new(LogicalPlan::Scan(pruned)),
                        predicate: filter.predicate.clone(),
                    })
                })
            } else {
                None
            }
        }
        _ => None,
    }
}

fn prune_scan(scan: &ScanNode, needed: &[String]) -> Option<ScanNode> {
    // Keep schema order, drop unreferenced columns
    let indices: Vec<usize> = scan
        .schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| needed.contains(&f.name))
        .map(|(i, _)| i)
        .collect();

    // A zero-column scan would lose the row count; leave those alone
    if indices.is_empty() || indices.len() == scan.schema.len() {
        return None;
    }

    if scan.projection.as_deref() == Some(indices.as_slice()) {
        return None;
    }

    Some(ScanNode {
        table_name: scan.table_name.clone(),
        schema: scan.schema.clone(),
        projection: Some(indices),
        filter: scan.filter.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{LogicalPlanBuilder, PlanSchema, ScalarValue, SchemaField};
    use arrow::datatypes::DataType;

    fn sample_schema() -> PlanSchema {
        PlanSchema::new(vec![
            SchemaField::new("a", DataType::Int64),
            SchemaField::new("b", DataType::Utf8),
            SchemaField::new("c", DataType::Float64),
        ])
    }

    #[test]
    fn test_prune_unused_columns() {
        let plan = LogicalPlanBuilder::scan("t", sample_schema())
            .project(vec![Expr::column("a")])
            .unwrap()
            .build();

        let optimized = ProjectionPushdown.optimize(&plan).unwrap();

        match optimized {
            LogicalPlan::Project(project) => match project.input.as_ref() {
                LogicalPlan::Scan(scan) => assert_eq!(scan.projection, Some(vec![0])),
                other => panic!("expected Scan, got {}", other),
            },
            other => panic!("expected Project, got {}", other),
        }
    }

    #[test]
    fn test_filter_columns_kept() {
        let plan = LogicalPlanBuilder::scan("t", sample_schema())
            .filter(Expr::column("c").gt(Expr::literal(ScalarValue::Float64(0.0.into()))))
            .project(vec![Expr::column("a")])
            .unwrap()
            .build();

        let optimized = ProjectionPushdown.optimize(&plan).unwrap();

        match optimized {
            LogicalPlan::Project(project) => match project.input.as_ref() {
                LogicalPlan::Filter(filter) => match filter.input.as_ref() {
                    // Both the projected column and the filter column survive
                    LogicalPlan::Scan(scan) => assert_eq!(scan.projection, Some(vec![0, 2])),
                    other => panic!("expected Scan, got {}", other),
                },
                other => panic!("expected Filter, got {}", other),
            },
            other => panic!("expected Project, got {}", other),
        }
    }

    #[test]
    fn test_full_width_projection_unchanged() {
        let plan = LogicalPlanBuilder::scan("t", sample_schema())
            .project(vec![Expr::column("a"), Expr::column("b"), Expr::column("c")])
            .unwrap()
            .build();

        let optimized = ProjectionPushdown.optimize(&plan).unwrap();
        assert_eq!(optimized, plan);
    }
}
