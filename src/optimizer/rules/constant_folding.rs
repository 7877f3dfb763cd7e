//! Constant folding optimization rule

use crate::error::Result;
use crate::optimizer::OptimizerRule;
use crate::planner::{
    AggregateNode, BinaryOp, DistinctNode, Expr, FilterNode, LimitNode, LogicalPlan, ProjectNode,
    ScalarValue, SortExpr, SortNode, UnaryOp,
};
use ordered_float::OrderedFloat;
use std::sync::Arc;

/// Constant folding rule - evaluates constant expressions at plan time
pub struct ConstantFolding;

impl OptimizerRule for ConstantFolding {
    fn name(&self) -> &str {
        "ConstantFolding"
    }

    fn optimize(&self, plan: &LogicalPlan) -> Result<LogicalPlan> {
        self.optimize_plan(plan)
    }
}

impl ConstantFolding {
    fn optimize_plan(&self, plan: &LogicalPlan) -> Result<LogicalPlan> {
        match plan {
            LogicalPlan::Scan(node) => {
                let mut node = node.clone();
                if let Some(filter) = &node.filter {
                    node.filter = Some(self.fold_expr(filter));
                }
                Ok(LogicalPlan::Scan(node))
            }
            LogicalPlan::Filter(node) => Ok(LogicalPlan::Filter(FilterNode {
                input: Arc::new(self.optimize_plan(&node.input)?),
                predicate: self.fold_expr(&node.predicate),
            })),
            LogicalPlan::Project(node) => Ok(LogicalPlan::Project(ProjectNode {
                input: Arc::new(self.optimize_plan(&node.input)?),
                exprs: node.exprs.iter().map(|e| self.fold_expr(e)).collect(),
                schema: node.schema.clone(),
            })),
            LogicalPlan::Aggregate(node) => Ok(LogicalPlan::Aggregate(AggregateNode {
                input: Arc::new(self.optimize_plan(&node.input)?),
                group_by: node.group_by.iter().map(|e| self.fold_expr(e)).collect(),
                aggregates: node.aggregates.iter().map(|e| self.fold_expr(e)).collect(),
                schema: node.schema.clone(),
            })),
            LogicalPlan::Sort(node) => Ok(LogicalPlan::Sort(SortNode {
                input: Arc::new(self.optimize_plan(&node.input)?),
                order_by: node
                    .order_by
                    .iter()
                    .map(|s| SortExpr {
                        expr: self.fold_expr(&s.expr),
                        direction: s.direction,
                        nulls: s.nulls,
                    })
                    .collect(),
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

    fn fold_expr(&self, expr: &Expr) -> Expr {
        match expr {
            Expr::BinaryExpr { left, op, right } => {
                let left = self.fold_expr(left);
                let right = self.fold_expr(right);

                if let (Expr::Literal(l), Expr::Literal(r)) = (&left, &right) {
                    if let Some(result) = eval_binary(l, *op, r) {
                        return Expr::Literal(result);
                    }
                }

                // Boolean simplifications
                match op {
                    BinaryOp::And => {
                        if matches!(&right, Expr::Literal(ScalarValue::Boolean(true))) {
                            return left;
                        }
                        if matches!(&left, Expr::Literal(ScalarValue::Boolean(true))) {
                            return right;
                        }
                        if matches!(&left, Expr::Literal(ScalarValue::Boolean(false)))
                            || matches!(&right, Expr::Literal(ScalarValue::Boolean(false)))
                        {
                            return Expr::Literal(ScalarValue::Boolean(false));
                        }
                    }
                    BinaryOp::Or => {
                        if matches!(&right, Expr::Literal(ScalarValue::Boolean(false))) {
                            return left;
                        }
                        if matches!(&left, Expr::Literal(ScalarValue::Boolean(false))) {
                            return right;
                        }
                        if matches!(&left, Expr::Literal(ScalarValue::Boolean(true)))
                            || matches!(&right, Expr::Literal(ScalarValue::Boolean(true)))
                        {
                            return Expr::Literal(ScalarValue::Boolean(true));
                        }
                    }
                    _ => {}
                }

                Expr::BinaryExpr {
                    left: Box::new(left),
                    op: *op,
                    right: Box::new(right),
                }
            }
            Expr::UnaryExpr { op, expr } => {
                let folded = self.fold_expr(expr);
                if let Expr::Literal(v) = &folded {
                    if let Some(result) = eval_unary(*op, v) {
                        return Expr::Literal(result);
                    }
                }
                Expr::UnaryExpr {
                    op: *op,
                    expr: Box::new(folded),
                }
            }
            Expr::Cast { expr, data_type } => Expr::Cast {
                expr: Box::new(self.fold_expr(expr)),
                data_type: data_type.clone(),
            },
            Expr::Alias { expr, name } => Expr::Alias {
                expr: Box::new(self.fold_expr(expr)),
                name: name.clone(),
            },
            Expr::Aggregate {
                func,
                args,
                distinct,
            } => Expr::Aggregate {
                func: *func,
                args: args.iter().map(|a| self.fold_expr(a)).collect(),
                distinct: *distinct,
            },
            Expr::Case {
                when_then,
                else_expr,
            } => Expr::Case {
                when_then: when_then
                    .iter()
                    .map(|(w, t)| (self.fold_expr(w), self.fold_expr(t)))
                    .collect(),
                else_expr: else_expr.as_ref().map(|e| Box::new(self.fold_expr(e))),
            },
            Expr::InList {
                expr,
                list,
                negated,
            } => Expr::InList {
                expr: Box::new(self.fold_expr(expr)),
                list: list.iter().map(|e| self.fold_expr(e)).collect(),
                negated: *negated,
            },
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => Expr::Between {
                expr: Box::new(self.fold_expr(expr)),
                low: Box::new(self.fold_expr(low)),
                high: Box::new(self.fold_expr(high)),
                negated: *negated,
            },
            _ => expr.clone(),
        }
    }
}

fn eval_unary(op: UnaryOp, value: &ScalarValue) -> Option<ScalarValue> {
    match (op, value) {
        (UnaryOp::Not, ScalarValue::Boolean(b)) => Some(ScalarValue::Boolean(!b)),
        (UnaryOp::Negate, ScalarValue::Int8(v)) => Some(ScalarValue::Int8(v.checked_neg()?)),
        (UnaryOp::Negate, ScalarValue::Int16(v)) => Some(ScalarValue::Int16(v.checked_neg()?)),
        (UnaryOp::Negate, ScalarValue::Int32(v)) => Some(ScalarValue::Int32(v.checked_neg()?)),
        (UnaryOp::Negate, ScalarValue::Int64(v)) => Some(ScalarValue::Int64(v.checked_neg()?)),
        (UnaryOp::Negate, ScalarValue::Float32(v)) => {
            Some(ScalarValue::Float32(OrderedFloat(-v.0)))
        }
        (UnaryOp::Negate, ScalarValue::Float64(v)) => {
            Some(ScalarValue::Float64(OrderedFloat(-v.0)))
        }
        _ => None,
    }
}

fn eval_binary(left: &ScalarValue, op: BinaryOp, right: &ScalarValue) -> Option<ScalarValue> {
    match (left, right) {
        (ScalarValue::Int64(l), ScalarValue::Int64(r)) => eval_int64(*l, op, *r),
        (ScalarValue::Float64(l), ScalarValue::Float64(r)) => eval_float64(l.0, op, r.0),
        (ScalarValue::Boolean(l), ScalarValue::Boolean(r)) => eval_bool(*l, op, *r),
        (ScalarValue::Utf8(l), ScalarValue::Utf8(r)) => eval_string(l, op, r),
        _ => None,
    }
}

fn eval_int64(left: i64, op: BinaryOp, right: i64) -> Option<ScalarValue> {
    match op {
        BinaryOp::Add => Some(ScalarValue::Int64(left.checked_add(right)?)),
        BinaryOp::Subtract => Some(ScalarValue::Int64(left.checked_sub(right)?)),
        BinaryOp::Multiply => Some(ScalarValue::Int64(left.checked_mul(right)?)),
        BinaryOp::Divide => {
            if right == 0 {
                None
            } else {
                Some(ScalarValue::Int64(left / right))
            }
        }
        BinaryOp::Modulo => {
            if right == 0 {
                None
            } else {
                Some(ScalarValue::Int64(left % right))
            }
        }
        BinaryOp::Eq => Some(ScalarValue::Boolean(left == right)),
        BinaryOp::NotEq => Some(ScalarValue::Boolean(left != right)),
        BinaryOp::Lt => Some(ScalarValue::Boolean(left < right)),
        BinaryOp::LtEq => Some(ScalarValue::Boolean(left <= right)),
        BinaryOp::Gt => Some(ScalarValue::Boolean(left > right)),
        BinaryOp::GtEq => Some(ScalarValue::Boolean(left >= right)),
        _ => None,
    }
}

fn eval_float64(left: f64, op: BinaryOp, right: f64) -> Option<ScalarValue> {
    match op {
        BinaryOp::Add => Some(ScalarValue::Float64(OrderedFloat(left + right))),
        BinaryOp::Subtract => Some(ScalarValue::Float64(OrderedFloat(left - right))),
        BinaryOp::Multiply => Some(ScalarValue::Float64(OrderedFloat(left * right))),
        BinaryOp::Divide => {
            if right == 0.0 {
                None
            } else {
                Some(ScalarValue::Float64(OrderedFloat(left / right)))
            }
        }
        BinaryOp::Eq => Some(ScalarValue::Boolean(left == right)),
        BinaryOp::NotEq => Some(ScalarValue::Boolean(left != right)),
        BinaryOp::Lt => Some(ScalarValue::Boolean(left < right)),
        BinaryOp::LtEq => Some(ScalarValue::Boolean(left <= right)),
        BinaryOp::Gt => Some(ScalarValue::Boolean(left > right)),
        BinaryOp::GtEq => Some(ScalarValue::Boolean(left >= right)),
        _ => None,
    }
}

fn eval_bool(left: bool, op: BinaryOp, right: bool) -> Option<ScalarValue> {
    match op {
        BinaryOp::And => Some(ScalarValue::Boolean(left && right)),
        BinaryOp::Or => Some(ScalarValue::Boolean(left || right)),
        BinaryOp::Eq => Some(ScalarValue::Boolean(left == right)),
        BinaryOp::NotEq => Some(ScalarValue::Boolean(left != right)),
        _ => None,
    }
}

fn eval_string(left: &str, op: BinaryOp, right: &str) -> Option<ScalarValue> {
    match op {
        BinaryOp::Eq => Some(ScalarValue::Boolean(left == right)),
        BinaryOp::NotEq => Some(ScalarValue::Boolean(left != right)),
        BinaryOp::Lt => Some(ScalarValue::Boolean(left < right)),
        BinaryOp::LtEq => Some(ScalarValue::Boolean(left <= right)),
        BinaryOp::Gt => Some(ScalarValue::Boolean(left > right)),
        BinaryOp::GtEq => Some(ScalarValue::Boolean(left >= right)),
        BinaryOp::StringConcat => Some(ScalarValue::Utf8(format!("{}{}", left, right))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_arithmetic() {
        let rule = ConstantFolding;

        let expr = Expr::Literal(ScalarValue::Int64(2)).add(Expr::Literal(ScalarValue::Int64(3)));
        let folded = rule.fold_expr(&expr);
        assert_eq!(folded, Expr::Literal(ScalarValue::Int64(5)));
    }

    #[test]
    fn test_fold_comparison() {
        let rule = ConstantFolding;

        let expr = Expr::Literal(ScalarValue::Int64(5)).gt(Expr::Literal(ScalarValue::Int64(3)));
        let folded = rule.fold_expr(&expr);
        assert_eq!(folded, Expr::Literal(ScalarValue::Boolean(true)));
    }

    #[test]
    fn test_fold_and_true() {
        let rule = ConstantFolding;

        let expr = Expr::column("a").and(Expr::Literal(ScalarValue::Boolean(true)));
        let folded = rule.fold_expr(&expr);
        assert!(matches!(folded, Expr::Column(_)));
    }

    #[test]
    fn test_fold_negate() {
        let rule = ConstantFolding;

        let expr = Expr::UnaryExpr {
            op: UnaryOp::Negate,
            expr: Box::new(Expr::Literal(ScalarValue::Int64(7))),
        };
        let folded = rule.fold_expr(&expr);
        assert_eq!(folded, Expr::Literal(ScalarValue::Int64(-7)));
    }

    #[test]
    fn test_fold_division_by_zero_left_alone() {
        let rule = ConstantFolding;

        let expr =
            Expr::Literal(ScalarValue::Int64(1)).binary_div(Expr::Literal(ScalarValue::Int64(0)));
        let folded = rule.fold_expr(&expr);
        assert!(matches!(folded, Expr::BinaryExpr { .. }));
    }
}

#[cfg(test)]
impl Expr {
    fn binary_div(self, other: Expr) -> Expr {
        Expr::BinaryExpr {
            left: Box::new(self),
            op: BinaryOp::Divide,
            right: Box::new(other),
        }
    }
}
