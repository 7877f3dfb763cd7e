//! Logical expression types

use crate::planner::schema::{PlanSchema, SchemaField};
use arrow::datatypes::{DataType as ArrowDataType, TimeUnit};
use ordered_float::OrderedFloat;
use std::fmt;

/// Scalar value for literals
///
/// Restricted to the column types the engine supports.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(OrderedFloat<f32>),
    Float64(OrderedFloat<f64>),
    Utf8(String),
    /// Seconds since the epoch
    TimestampSecond(i64),
    /// Nanoseconds since the epoch
    TimestampNanosecond(i64),
}

impl ScalarValue {
    pub fn data_type(&self) -> ArrowDataType {
        match self {
            ScalarValue::Null => ArrowDataType::Null,
            ScalarValue::Boolean(_) => ArrowDataType::Boolean,
            ScalarValue::Int8(_) => ArrowDataType::Int8,
            ScalarValue::Int16(_) => ArrowDataType::Int16,
            ScalarValue::Int32(_) => ArrowDataType::Int32,
            ScalarValue::Int64(_) => ArrowDataType::Int64,
            ScalarValue::Float32(_) => ArrowDataType::Float32,
            ScalarValue::Float64(_) => ArrowDataType::Float64,
            ScalarValue::Utf8(_) => ArrowDataType::Utf8,
            ScalarValue::TimestampSecond(_) => {
                ArrowDataType::Timestamp(TimeUnit::Second, None)
            }
            ScalarValue::TimestampNanosecond(_) => {
                ArrowDataType::Timestamp(TimeUnit::Nanosecond, None)
            }
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "NULL"),
            ScalarValue::Boolean(v) => write!(f, "{}", v),
            ScalarValue::Int8(v) => write!(f, "{}", v),
            ScalarValue::Int16(v) => write!(f, "{}", v),
            ScalarValue::Int32(v) => write!(f, "{}", v),
            ScalarValue::Int64(v) => write!(f, "{}", v),
            ScalarValue::Float32(v) => write!(f, "{}", v),
            ScalarValue::Float64(v) => write!(f, "{}", v),
            ScalarValue::Utf8(v) => write!(f, "'{}'", v),
            ScalarValue::TimestampSecond(v) => write!(f, "TIMESTAMP_S({})", v),
            ScalarValue::TimestampNanosecond(v) => write!(f, "TIMESTAMP_NS({})", v),
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    // Comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    // Logical
    And,
    Or,
    // String
    Like,
    NotLike,
    StringConcat,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Add => write!(f, "+"),
            BinaryOp::Subtract => write!(f, "-"),
            BinaryOp::Multiply => write!(f, "*"),
            BinaryOp::Divide => write!(f, "/"),
            BinaryOp::Modulo => write!(f, "%"),
            BinaryOp::Eq => write!(f, "="),
            BinaryOp::NotEq => write!(f, "!="),
            BinaryOp::Lt => write!(f, "<"),
            BinaryOp::LtEq => write!(f, "<="),
            BinaryOp::Gt => write!(f, ">"),
            BinaryOp::GtEq => write!(f, ">="),
            BinaryOp::And => write!(f, "AND"),
            BinaryOp::Or => write!(f, "OR"),
            BinaryOp::Like => write!(f, "LIKE"),
            BinaryOp::NotLike => write!(f, "NOT LIKE"),
            BinaryOp::StringConcat => write!(f, "||"),
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Negate,
    IsNull,
    IsNotNull,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Not => write!(f, "NOT"),
            UnaryOp::Negate => write!(f, "-"),
            UnaryOp::IsNull => write!(f, "IS NULL"),
            UnaryOp::IsNotNull => write!(f, "IS NOT NULL"),
        }
    }
}

/// Aggregate function types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    Count,
    CountDistinct,
    Sum,
    Avg,
    Min,
    Max,
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateFunction::Count => write!(f, "COUNT"),
            AggregateFunction::CountDistinct => write!(f, "COUNT DISTINCT"),
            AggregateFunction::Sum => write!(f, "SUM"),
            AggregateFunction::Avg => write!(f, "AVG"),
            AggregateFunction::Min => write!(f, "MIN"),
            AggregateFunction::Max => write!(f, "MAX"),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Null ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NullOrdering {
    #[default]
    NullsFirst,
    NullsLast,
}

/// Sort expression
#[derive(Debug, Clone, PartialEq)]
pub struct SortExpr {
    pub expr: Expr,
    pub direction: SortDirection,
    pub nulls: NullOrdering,
}

impl SortExpr {
    pub fn new(expr: Expr) -> Self {
        Self {
            expr,
            direction: SortDirection::Asc,
            nulls: NullOrdering::NullsFirst,
        }
    }

    pub fn asc(mut self) -> Self {
        self.direction = SortDirection::Asc;
        self
    }

    pub fn desc(mut self) -> Self {
        self.direction = SortDirection::Desc;
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls = NullOrdering::NullsLast;
        self
    }
}

/// Logical expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference
    Column(String),

    /// Literal value
    Literal(ScalarValue),

    /// Binary operation
    BinaryExpr {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// Unary operation
    UnaryExpr { op: UnaryOp, expr: Box<Expr> },

    /// Aggregate function call
    Aggregate {
        func: AggregateFunction,
        args: Vec<Expr>,
        distinct: bool,
    },

    /// CAST expression
    Cast {
        expr: Box<Expr>,
        data_type: ArrowDataType,
    },

    /// CASE expression
    Case {
        when_then: Vec<(Expr, Expr)>,
        else_expr: Option<Box<Expr>>,
    },

    /// IN list
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },

    /// BETWEEN
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },

    /// Alias
    Alias { expr: Box<Expr>, name: String },

    /// Wildcard (*)
    Wildcard,
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    pub fn literal(value: ScalarValue) -> Self {
        Expr::Literal(value)
    }

    pub fn alias(self, name: impl Into<String>) -> Self {
        Expr::Alias {
            expr: Box::new(self),
            name: name.into(),
        }
    }

    fn binary(self, op: BinaryOp, other: Expr) -> Self {
        Expr::BinaryExpr {
            left: Box::new(self),
            op,
            right: Box::new(other),
        }
    }

    pub fn eq(self, other: Expr) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    pub fn gt(self, other: Expr) -> Self {
        self.binary(BinaryOp::Gt, other)
    }

    pub fn lt(self, other: Expr) -> Self {
        self.binary(BinaryOp::Lt, other)
    }

    pub fn and(self, other: Expr) -> Self {
        self.binary(BinaryOp::And, other)
    }

    pub fn or(self, other: Expr) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    pub fn add(self, other: Expr) -> Self {
        self.binary(BinaryOp::Add, other)
    }

    pub fn multiply(self, other: Expr) -> Self {
        self.binary(BinaryOp::Multiply, other)
    }

    /// Output column name for this expression
    pub fn output_name(&self) -> String {
        match self {
            Expr::Column(name) => name.clone(),
            Expr::Alias { name, .. } => name.clone(),
            Expr::Literal(v) => v.to_string(),
            Expr::BinaryExpr { left, op, right } => {
                format!("{} {} {}", left.output_name(), op, right.output_name())
            }
            Expr::UnaryExpr { op, expr } => format!("{} {}", op, expr.output_name()),
            Expr::Aggregate { func, args, .. } => {
                let arg_names: Vec<_> = args.iter().map(|a| a.output_name()).collect();
                format!("{}({})", func, arg_names.join(", "))
            }
            Expr::Cast { expr, data_type } => {
                format!("CAST({} AS {})", expr.output_name(), data_type)
            }
            Expr::Case { .. } => "CASE".to_string(),
            Expr::InList { expr, .. } => format!("{} IN (...)", expr.output_name()),
            Expr::Between { expr, .. } => format!("{} BETWEEN ...", expr.output_name()),
            Expr::Wildcard => "*".to_string(),
        }
    }

    /// Infer the data type of this expression given an input schema
    pub fn data_type(&self, schema: &PlanSchema) -> crate::error::Result<ArrowDataType> {
        use crate::error::EngineError;

        match self {
            Expr::Column(name) => schema
                .field_by_name(name)
                .map(|field| field.data_type.clone())
                .ok_or_else(|| EngineError::ColumnNotFound(name.clone())),
            Expr::Literal(v) => Ok(v.data_type()),
            Expr::BinaryExpr { left, op, right } => match op {
                BinaryOp::And
                | BinaryOp::Or
                | BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
                | BinaryOp::Like
                | BinaryOp::NotLike => Ok(ArrowDataType::Boolean),
                BinaryOp::Add
                | BinaryOp::Subtract
                | BinaryOp::Multiply
                | BinaryOp::Divide
                | BinaryOp::Modulo => {
                    let left_type = left.data_type(schema)?;
                    let right_type = right.data_type(schema)?;
                    Ok(coerce_numeric_types(&left_type, &right_type))
                }
                BinaryOp::StringConcat => Ok(ArrowDataType::Utf8),
            },
            Expr::UnaryExpr { op, expr } => match op {
                UnaryOp::Not | UnaryOp::IsNull | UnaryOp::IsNotNull => Ok(ArrowDataType::Boolean),
                UnaryOp::Negate => expr.data_type(schema),
            },
            Expr::Aggregate { func, args, .. } => match func {
                AggregateFunction::Count | AggregateFunction::CountDistinct => {
                    Ok(ArrowDataType::Int64)
                }
                AggregateFunction::Sum => {
                    if let Some(arg) = args.first() {
                        let arg_type = arg.data_type(schema)?;
                        Ok(promote_sum_type(&arg_type))
                    } else {
                        Ok(ArrowDataType::Int64)
                    }
                }
                AggregateFunction::Avg => Ok(ArrowDataType::Float64),
                AggregateFunction::Min | AggregateFunction::Max => args
                    .first()
                    .map(|a| a.data_type(schema))
                    .unwrap_or(Ok(ArrowDataType::Null)),
            },
            Expr::Cast { data_type, .. } => Ok(data_type.clone()),
            Expr::Case {
                when_then,
                else_expr,
            } => {
                if let Some((_, then_expr)) = when_then.first() {
                    then_expr.data_type(schema)
                } else if let Some(else_expr) = else_expr {
                    else_expr.data_type(schema)
                } else {
                    Ok(ArrowDataType::Null)
                }
            }
            Expr::InList { .. } | Expr::Between { .. } => Ok(ArrowDataType::Boolean),
            Expr::Alias { expr, .. } => expr.data_type(schema),
            Expr::Wildcard => Err(EngineError::Internal(
                "Cannot determine type of wildcard".to_string(),
            )),
        }
    }

    /// Create schema field for this expression
    pub fn to_field(&self, schema: &PlanSchema) -> crate::error::Result<SchemaField> {
        let name = self.output_name();
        let data_type = self.data_type(schema)?;
        Ok(SchemaField::new(name, data_type))
    }

    /// Check if expression contains an aggregate
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Aggregate { .. } => true,
            Expr::BinaryExpr { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            Expr::UnaryExpr { expr, .. } => expr.contains_aggregate(),
            Expr::Cast { expr, .. } => expr.contains_aggregate(),
            Expr::Case {
                when_then,
                else_expr,
            } => {
                when_then
                    .iter()
                    .any(|(w, t)| w.contains_aggregate() || t.contains_aggregate())
                    || else_expr.as_ref().is_some_and(|e| e.contains_aggregate())
            }
            Expr::InList { expr, list, .. } => {
                expr.contains_aggregate() || list.iter().any(|e| e.contains_aggregate())
            }
            Expr::Between {
                expr, low, high, ..
            } => {
                expr.contains_aggregate() || low.contains_aggregate() || high.contains_aggregate()
            }
            Expr::Alias { expr, .. } => expr.contains_aggregate(),
            _ => false,
        }
    }

    /// Collect names of all columns referenced by this expression
    pub fn referenced_columns(&self, out: &mut Vec<String>) {
        match self {
            Expr::Column(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Expr::Literal(_) | Expr::Wildcard => {}
            Expr::BinaryExpr { left, right, .. } => {
                left.referenced_columns(out);
                right.referenced_columns(out);
            }
            Expr::UnaryExpr { expr, .. } => expr.referenced_columns(out),
            Expr::Aggregate { args, .. } => {
                for arg in args {
                    arg.referenced_columns(out);
                }
            }
            Expr::Cast { expr, .. } => expr.referenced_columns(out),
            Expr::Case {
                when_then,
                else_expr,
            } => {
                for (w, t) in when_then {
                    w.referenced_columns(out);
                    t.referenced_columns(out);
                }
                if let Some(e) = else_expr {
                    e.referenced_columns(out);
                }
            }
            Expr::InList { expr, list, .. } => {
                expr.referenced_columns(out);
                for e in list {
                    e.referenced_columns(out);
                }
            }
            Expr::Between {
                expr, low, high, ..
            } => {
                expr.referenced_columns(out);
                low.referenced_columns(out);
                high.referenced_columns(out);
            }
            Expr::Alias { expr, .. } => expr.referenced_columns(out),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => write!(f, "{}", name),
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::BinaryExpr { left, op, right } => write!(f, "({} {} {})", left, op, right),
            Expr::UnaryExpr { op, expr } => write!(f, "({} {})", op, expr),
            Expr::Aggregate {
                func,
                args,
                distinct,
            } => {
                let distinct_str = if *distinct { "DISTINCT " } else { "" };
                let args_str: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({}{})", func, distinct_str, args_str.join(", "))
            }
            Expr::Cast { expr, data_type } => write!(f, "CAST({} AS {})", expr, data_type),
            Expr::Case {
                when_then,
                else_expr,
            } => {
                write!(f, "CASE ")?;
                for (when, then) in when_then {
                    write!(f, "WHEN {} THEN {} ", when, then)?;
                }
                if let Some(else_e) = else_expr {
                    write!(f, "ELSE {} ", else_e)?;
                }
                write!(f, "END")
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let not_str = if *negated { "NOT " } else { "" };
                let list_str: Vec<String> = list.iter().map(|e| e.to_string()).collect();
                write!(f, "{} {}IN ({})", expr, not_str, list_str.join(", "))
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let not_str = if *negated { "NOT " } else { "" };
                write!(f, "{} {}BETWEEN {} AND {}", expr, not_str, low, high)
            }
            Expr::Alias { expr, name } => write!(f, "{} AS {}", expr, name),
            Expr::Wildcard => write!(f, "*"),
        }
    }
}

/// Coerce numeric types for binary operations
pub fn coerce_numeric_types(left: &ArrowDataType, right: &ArrowDataType) -> ArrowDataType {
    use ArrowDataType::*;

    match (left, right) {
        (a, b) if a == b => a.clone(),
        (Float64, _) | (_, Float64) => Float64,
        (Float32, _) | (_, Float32) => Float64,
        (Int64, _) | (_, Int64) => Int64,
        (Int32, _) | (_, Int32) => Int64,
        (Int16, _) | (_, Int16) => Int32,
        (Int8, _) | (_, Int8) => Int16,
        _ => Float64,
    }
}

/// Promote type for SUM aggregation
pub fn promote_sum_type(input: &ArrowDataType) -> ArrowDataType {
    use ArrowDataType::*;

    match input {
        Int8 | Int16 | Int32 | Int64 => Int64,
        Float32 | Float64 => Float64,
        _ => Float64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expr_builders() {
        let expr = Expr::column("id").eq(Expr::literal(ScalarValue::Int64(10)));
        assert!(matches!(
            expr,
            Expr::BinaryExpr {
                op: BinaryOp::Eq,
                ..
            }
        ));
    }

    #[test]
    fn test_expr_display() {
        let expr = Expr::column("a").add(Expr::column("b"));
        assert_eq!(format!("{}", expr), "(a + b)");
    }

    #[test]
    fn test_aggregate_detection() {
        let agg = Expr::Aggregate {
            func: AggregateFunction::Sum,
            args: vec![Expr::column("amount")],
            distinct: false,
        };
        assert!(agg.contains_aggregate());
        assert!(!Expr::column("id").contains_aggregate());
    }

    #[test]
    fn test_data_type_inference() {
        let schema = PlanSchema::new(vec![
            SchemaField::new("a", ArrowDataType::Int32),
            SchemaField::new("b", ArrowDataType::Float64),
        ]);

        let cmp = Expr::column("a").gt(Expr::literal(ScalarValue::Int64(1)));
        assert_eq!(cmp.data_type(&schema).unwrap(), ArrowDataType::Boolean);

        let arith = Expr::column("a").add(Expr::column("b"));
        assert_eq!(arith.data_type(&schema).unwrap(), ArrowDataType::Float64);
    }

    #[test]
    fn test_referenced_columns() {
        let expr = Expr::column("a")
            .add(Expr::column("b"))
            .gt(Expr::column("a"));
        let mut cols = Vec::new();
        expr.referenced_columns(&mut cols);
        assert_eq!(cols, vec!["a".to_string(), "b".to_string()]);
    }
}
