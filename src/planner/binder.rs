//! SQL AST to logical plan binder

use crate::error::{EngineError, Result};
use crate::planner::expr::{
    AggregateFunction, BinaryOp, Expr, NullOrdering, ScalarValue, SortDirection, SortExpr, UnaryOp,
};
use crate::planner::plan::{
    AggregateNode, DistinctNode, FilterNode, LimitNode, LogicalPlan, ProjectNode, ScanNode,
    SortNode,
};
use crate::planner::schema::{PlanSchema, SchemaField};
use arrow::datatypes::{DataType as ArrowDataType, TimeUnit};
use sqlparser::ast::{self, Expr as SqlExpr, SelectItem, SetExpr, Statement, TableFactor};
use std::collections::HashMap;
use std::sync::Arc;

/// Catalog for table schemas
pub trait Catalog: Send + Sync {
    fn get_table_schema(&self, name: &str) -> Option<PlanSchema>;
    fn table_exists(&self, name: &str) -> bool;
}

/// Simple in-memory catalog
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    tables: HashMap<String, PlanSchema>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_table(&mut self, name: impl Into<String>, schema: PlanSchema) {
        self.tables.insert(name.into(), schema);
    }

    pub fn deregister_table(&mut self, name: &str) -> bool {
        self.tables.remove(name).is_some()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }
}

impl Catalog for MemoryCatalog {
    fn get_table_schema(&self, name: &str) -> Option<PlanSchema> {
        self.tables.get(name).cloned()
    }

    fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }
}

/// Bound DDL statement
#[derive(Debug, Clone, PartialEq)]
pub enum DdlStatement {
    CreateTable {
        name: String,
        schema: PlanSchema,
        if_not_exists: bool,
    },
    DropTable {
        names: Vec<String>,
        if_exists: bool,
    },
}

/// SQL binder - converts a query AST to a LogicalPlan
pub struct Binder<'a> {
    catalog: &'a dyn Catalog,
    /// Table name and optional alias of the current FROM relation
    relation: Option<(String, Option<String>)>,
}

impl<'a> Binder<'a> {
    pub fn new(catalog: &'a dyn Catalog) -> Self {
        Self {
            catalog,
            relation: None,
        }
    }

    /// Bind a SQL statement to a logical plan
    pub fn bind(&mut self, stmt: &Statement) -> Result<LogicalPlan> {
        match stmt {
            Statement::Query(query) => self.bind_query(query),
            _ => Err(EngineError::NotImplemented(format!(
                "Statement type not supported in DML: {}",
                stmt
            ))),
        }
    }

    /// Bind a SQL string to a logical plan
    pub fn bind_sql(&mut self, sql: &str) -> Result<LogicalPlan> {
        let stmt = crate::parser::parse_statement(sql)?;
        self.bind(&stmt)
    }

    fn bind_query(&mut self, query: &ast::Query) -> Result<LogicalPlan> {
        if query.with.is_some() {
            return Err(EngineError::NotImplemented(
                "WITH clauses not supported".to_string(),
            ));
        }

        let mut plan = match query.body.as_ref() {
            SetExpr::Select(select) => self.bind_select(select)?,
            other => {
                return Err(EngineError::NotImplemented(format!(
                    "Set expression not supported: {}",
                    other
                )))
            }
        };

        // ORDER BY binds against the projected schema, so select aliases are visible
        if let Some(ref order_by_clause) = query.order_by {
            if !order_by_clause.exprs.is_empty() {
                let schema = plan.schema();
                let order_by = self.bind_order_by(&order_by_clause.exprs, &schema)?;
                plan = LogicalPlan::Sort(SortNode {
                    input: Arc::new(plan),
                    order_by,
                });
            }
        }

        if query.limit.is_some() || query.offset.is_some() {
            let skip = query
                .offset
                .as_ref()
                .map(|o| expr_to_usize(&o.value))
                .transpose()?
                .unwrap_or(0);
            let fetch = query.limit.as_ref().map(expr_to_usize).transpose()?;

            plan = LogicalPlan::Limit(LimitNode {
                input: Arc::new(plan),
                skip,
                fetch,
            });
        }

        Ok(plan)
    }

    fn bind_select(&mut self, select: &ast::Select) -> Result<LogicalPlan> {
        // 1. FROM clause
        let mut plan = self.bind_from(&select.from)?;

        // 2. WHERE clause
        if let Some(selection) = &select.selection {
            let input_schema = plan.schema();
            let predicate = self.bind_expr(selection, &input_schema)?;
            plan = LogicalPlan::Filter(FilterNode {
                input: Arc::new(plan),
                predicate,
            });
        }

        let input_schema = plan.schema();

        // 3. SELECT list
        let select_exprs = self.bind_projection(&select.projection, &input_schema)?;

        // 4. GROUP BY
        let group_exprs = match &select.group_by {
            ast::GroupByExpr::Expressions(exprs, _) => exprs
                .iter()
                .map(|e| self.bind_expr(e, &input_schema))
                .collect::<Result<Vec<_>>>()?,
            ast::GroupByExpr::All(_) => {
                return Err(EngineError::NotImplemented(
                    "GROUP BY ALL not supported".to_string(),
                ))
            }
        };

        let having = select
            .having
            .as_ref()
            .map(|h| self.bind_expr(h, &input_schema))
            .transpose()?;

        let has_aggregates = !group_exprs.is_empty()
            || select_exprs.iter().any(|e| e.contains_aggregate())
            || having.as_ref().is_some_and(|h| h.contains_aggregate());

        plan = if has_aggregates {
            self.bind_aggregate(plan, select_exprs, group_exprs, having)?
        } else {
            if let Some(h) = having {
                return Err(EngineError::Bind(format!(
                    "HAVING without aggregation: {}",
                    h
                )));
            }
            plan.project(select_exprs)?
        };

        // 5. DISTINCT
        match &select.distinct {
            None => {}
            Some(ast::Distinct::Distinct) => {
                plan = LogicalPlan::Distinct(DistinctNode {
                    input: Arc::new(plan),
                });
            }
            Some(ast::Distinct::On(_)) => {
                return Err(EngineError::NotImplemented(
                    "DISTINCT ON not supported".to_string(),
                ))
            }
        }

        Ok(plan)
    }

    fn bind_from(&mut self, from: &[ast::TableWithJoins]) -> Result<LogicalPlan> {
        if from.len() != 1 {
            return Err(EngineError::NotImplemented(
                "Queries must reference exactly one table".to_string(),
            ));
        }

        let table = &from[0];
        if !table.joins.is_empty() {
            return Err(EngineError::NotImplemented(
                "JOIN not supported".to_string(),
            ));
        }

        match &table.relation {
            TableFactor::Table { name, alias, .. } => {
                let table_name = object_name(name);
                let schema = self
                    .catalog
                    .get_table_schema(&table_name)
                    .ok_or_else(|| EngineError::TableNotFound(table_name.clone()))?;

                let alias_name = alias.as_ref().map(|a| a.name.value.clone());
                self.relation = Some((table_name.clone(), alias_name));

                Ok(LogicalPlan::Scan(ScanNode {
                    table_name,
                    schema,
                    projection: None,
                    filter: None,
                }))
            }
            other => Err(EngineError::NotImplemented(format!(
                "Table factor not supported: {}",
                other
            ))),
        }
    }

    fn bind_projection(
        &mut self,
        projection: &[SelectItem],
        schema: &PlanSchema,
    ) -> Result<Vec<Expr>> {
        let mut exprs = Vec::new();

        for item in projection {
            match item {
                SelectItem::Wildcard(_) => {
                    for field in schema.fields() {
                        exprs.push(Expr::column(field.name.clone()));
                    }
                }
                SelectItem::QualifiedWildcard(name, _) => {
                    let qualifier = object_name(name);
                    if !self.matches_relation(&qualifier) {
                        return Err(EngineError::Bind(format!(
                            "Unknown table qualifier: {}",
                            qualifier
                        )));
                    }
                    for field in schema.fields() {
                        exprs.push(Expr::column(field.name.clone()));
                    }
                }
                SelectItem::UnnamedExpr(e) => exprs.push(self.bind_expr(e, schema)?),
                SelectItem::ExprWithAlias { expr, alias } => {
                    let bound = self.bind_expr(expr, schema)?;
                    exprs.push(bound.alias(alias.value.clone()));
                }
            }
        }

        if exprs.is_empty() {
            return Err(EngineError::Bind("Empty SELECT list".to_string()));
        }

        Ok(exprs)
    }

    /// Build Aggregate (+ optional HAVING filter) + Project
    fn bind_aggregate(
        &mut self,
        input: LogicalPlan,
        select_exprs: Vec<Expr>,
        group_exprs: Vec<Expr>,
        having: Option<Expr>,
    ) -> Result<LogicalPlan> {
        if select_exprs.iter().any(|e| matches!(e, Expr::Wildcard)) {
            return Err(EngineError::Bind(
                "Wildcard cannot be combined with aggregation".to_string(),
            ));
        }

        let input_schema = input.schema();

        // Collect the distinct aggregate calls appearing anywhere in the output
        let mut aggregates: Vec<Expr> = Vec::new();
        for expr in select_exprs.iter().chain(having.iter()) {
            collect_aggregates(expr, &mut aggregates);
        }

        let mut fields = Vec::new();
        for expr in group_exprs.iter().chain(aggregates.iter()) {
            fields.push(expr.to_field(&input_schema)?);
        }
        let agg_schema = PlanSchema::new(fields);

        let plan = LogicalPlan::Aggregate(AggregateNode {
            input: Arc::new(input),
            group_by: group_exprs.clone(),
            aggregates: aggregates.clone(),
            schema: agg_schema.clone(),
        });

        // Everything downstream of the aggregate sees its output columns
        let plan = match having {
            Some(h) => {
                let rewritten = rewrite_post_aggregate(&h, &group_exprs, &aggregates);
                check_post_aggregate(&rewritten, &agg_schema)?;
                LogicalPlan::Filter(FilterNode {
                    input: Arc::new(plan),
                    predicate: rewritten,
                })
            }
            None => plan,
        };

        let projected: Vec<Expr> = select_exprs
            .iter()
            .map(|e| rewrite_post_aggregate(e, &group_exprs, &aggregates))
            .collect();
        for expr in &projected {
            check_post_aggregate(expr, &agg_schema)?;
        }

        let fields: Result<Vec<SchemaField>> =
            projected.iter().map(|e| e.to_field(&agg_schema)).collect();

        Ok(LogicalPlan::Project(ProjectNode {
            input: Arc::new(plan),
            exprs: projected,
            schema: PlanSchema::new(fields?),
        }))
    }

    fn bind_order_by(
        &mut self,
        exprs: &[ast::OrderByExpr],
        schema: &PlanSchema,
    ) -> Result<Vec<SortExpr>> {
        exprs
            .iter()
            .map(|o| {
                let expr = self.bind_expr(&o.expr, schema)?;
                let direction = match o.asc {
                    Some(false) => SortDirection::Desc,
                    _ => SortDirection::Asc,
                };
                let nulls = match o.nulls_first {
                    Some(false) => NullOrdering::NullsLast,
                    _ => NullOrdering::NullsFirst,
                };
                Ok(SortExpr {
                    expr,
                    direction,
                    nulls,
                })
            })
            .collect()
    }

    fn matches_relation(&self, qualifier: &str) -> bool {
        match &self.relation {
            Some((name, alias)) => {
                name == qualifier || alias.as_deref() == Some(qualifier)
            }
            None => false,
        }
    }

    fn bind_expr(&mut self, expr: &SqlExpr, schema: &PlanSchema) -> Result<Expr> {
        match expr {
            SqlExpr::Identifier(ident) => self.bind_column(&ident.value, schema),

            SqlExpr::CompoundIdentifier(parts) => {
                if parts.len() == 2 && self.matches_relation(&parts[0].value) {
                    self.bind_column(&parts[1].value, schema)
                } else {
                    let name: Vec<String> = parts.iter().map(|p| p.value.clone()).collect();
                    Err(EngineError::Bind(format!(
                        "Cannot resolve column: {}",
                        name.join(".")
                    )))
                }
            }

            SqlExpr::Value(value) => Ok(Expr::Literal(bind_value(value)?)),

            SqlExpr::Nested(inner) => self.bind_expr(inner, schema),

            SqlExpr::BinaryOp { left, op, right } => {
                let left = self.bind_expr(left, schema)?;
                let right = self.bind_expr(right, schema)?;
                let op = bind_binary_op(op)?;
                Ok(Expr::BinaryExpr {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                })
            }

            SqlExpr::UnaryOp { op, expr } => {
                let inner = self.bind_expr(expr, schema)?;
                match op {
                    ast::UnaryOperator::Not => Ok(Expr::UnaryExpr {
                        op: UnaryOp::Not,
                        expr: Box::new(inner),
                    }),
                    ast::UnaryOperator::Minus => Ok(Expr::UnaryExpr {
                        op: UnaryOp::Negate,
                        expr: Box::new(inner),
                    }),
                    ast::UnaryOperator::Plus => Ok(inner),
                    other => Err(EngineError::NotImplemented(format!(
                        "Unary operator: {}",
                        other
                    ))),
                }
            }

            SqlExpr::IsNull(inner) => Ok(Expr::UnaryExpr {
                op: UnaryOp::IsNull,
                expr: Box::new(self.bind_expr(inner, schema)?),
            }),

            SqlExpr::IsNotNull(inner) => Ok(Expr::UnaryExpr {
                op: UnaryOp::IsNotNull,
                expr: Box::new(self.bind_expr(inner, schema)?),
            }),

            SqlExpr::Cast {
                expr, data_type, ..
            } => Ok(Expr::Cast {
                expr: Box::new(self.bind_expr(expr, schema)?),
                data_type: sql_type_to_arrow(data_type)?,
            }),

            SqlExpr::Case {
                operand,
                conditions,
                results,
                else_result,
            } => {
                let operand = operand
                    .as_ref()
                    .map(|o| self.bind_expr(o, schema))
                    .transpose()?;

                let mut when_then = Vec::with_capacity(conditions.len());
                for (cond, result) in conditions.iter().zip(results.iter()) {
                    let mut when = self.bind_expr(cond, schema)?;
                    // CASE x WHEN v ... desugars to CASE WHEN x = v ...
                    if let Some(op) = &operand {
                        when = op.clone().eq(when);
                    }
                    let then = self.bind_expr(result, schema)?;
                    when_then.push((when, then));
                }

                let else_expr = else_result
                    .as_ref()
                    .map(|e| self.bind_expr(e, schema))
                    .transpose()?
                    .map(Box::new);

                Ok(Expr::Case {
                    when_then,
                    else_expr,
                })
            }

            SqlExpr::Between {
                expr,
                negated,
                low,
                high,
            } => Ok(Expr::Between {
                expr: Box::new(self.bind_expr(expr, schema)?),
                low: Box::new(self.bind_expr(low, schema)?),
                high: Box::new(self.bind_expr(high, schema)?),
                negated: *negated,
            }),

            SqlExpr::InList {
                expr,
                list,
                negated,
            } => {
                let bound_list: Result<Vec<Expr>> =
                    list.iter().map(|e| self.bind_expr(e, schema)).collect();
                Ok(Expr::InList {
                    expr: Box::new(self.bind_expr(expr, schema)?),
                    list: bound_list?,
                    negated: *negated,
                })
            }

            SqlExpr::Like {
                negated,
                expr,
                pattern,
                ..
            } => {
                let left = self.bind_expr(expr, schema)?;
                let right = self.bind_expr(pattern, schema)?;
                Ok(Expr::BinaryExpr {
                    left: Box::new(left),
                    op: if *negated {
                        BinaryOp::NotLike
                    } else {
                        BinaryOp::Like
                    },
                    right: Box::new(right),
                })
            }

            SqlExpr::Function(func) => self.bind_function(func, schema),

            other => Err(EngineError::NotImplemented(format!(
                "Expression not supported: {}",
                other
            ))),
        }
    }

    fn bind_column(&self, name: &str, schema: &PlanSchema) -> Result<Expr> {
        if schema.index_of(name).is_none() {
            return Err(EngineError::ColumnNotFound(name.to_string()));
        }
        Ok(Expr::column(name))
    }

    fn bind_function(&mut self, func: &ast::Function, schema: &PlanSchema) -> Result<Expr> {
        let name = object_name(&func.name).to_uppercase();

        let (args, distinct) = match &func.args {
            ast::FunctionArguments::List(list) => {
                let distinct = matches!(
                    list.duplicate_treatment,
                    Some(ast::DuplicateTreatment::Distinct)
                );
                let mut bound = Vec::new();
                for arg in &list.args {
                    match arg {
                        ast::FunctionArg::Unnamed(ast::FunctionArgExpr::Expr(e)) => {
                            bound.push(self.bind_expr(e, schema)?)
                        }
                        ast::FunctionArg::Unnamed(ast::FunctionArgExpr::Wildcard) => {
                            bound.push(Expr::Wildcard)
                        }
                        other => {
                            return Err(EngineError::NotImplemented(format!(
                                "Function argument: {}",
                                other
                            )))
                        }
                    }
                }
                (bound, distinct)
            }
            ast::FunctionArguments::None => (Vec::new(), false),
            ast::FunctionArguments::Subquery(_) => {
                return Err(EngineError::NotImplemented(
                    "Subquery function arguments not supported".to_string(),
                ))
            }
        };

        let agg = match name.as_str() {
            "COUNT" => {
                if distinct {
                    AggregateFunction::CountDistinct
                } else {
                    AggregateFunction::Count
                }
            }
            "SUM" => AggregateFunction::Sum,
            "AVG" => AggregateFunction::Avg,
            "MIN" => AggregateFunction::Min,
            "MAX" => AggregateFunction::Max,
            other => {
                return Err(EngineError::NotImplemented(format!("Function: {}", other)))
            }
        };

        if distinct && !matches!(agg, AggregateFunction::CountDistinct) {
            return Err(EngineError::NotImplemented(format!(
                "DISTINCT is only supported for COUNT, not {}",
                name
            )));
        }

        Ok(Expr::Aggregate {
            func: agg,
            args,
            distinct,
        })
    }
}

/// Bind a DDL statement (CREATE TABLE / DROP TABLE)
pub fn bind_ddl(stmt: &Statement) -> Result<DdlStatement> {
    match stmt {
        Statement::CreateTable(create) => {
            let name = object_name(&create.name);
            let mut fields = Vec::with_capacity(create.columns.len());
            for col in &create.columns {
                let data_type = sql_type_to_arrow(&col.data_type)?;
                let nullable = !col
                    .options
                    .iter()
                    .any(|o| matches!(o.option, ast::ColumnOption::NotNull));
                fields.push(SchemaField::new(col.name.value.clone(), data_type).with_nullable(nullable));
            }
            if fields.is_empty() {
                return Err(EngineError::Bind(format!(
                    "CREATE TABLE {} has no columns",
                    name
                )));
            }
            Ok(DdlStatement::CreateTable {
                name,
                schema: PlanSchema::new(fields),
                if_not_exists: create.if_not_exists,
            })
        }
        Statement::Drop {
            object_type: ast::ObjectType::Table,
            if_exists,
            names,
            ..
        } => Ok(DdlStatement::DropTable {
            names: names.iter().map(object_name).collect(),
            if_exists: *if_exists,
        }),
        other => Err(EngineError::NotImplemented(format!(
            "Statement type not supported in DDL: {}",
            other
        ))),
    }
}

fn object_name(name: &ast::ObjectName) -> String {
    name.0
        .iter()
        .map(|i| i.value.clone())
        .collect::<Vec<_>>()
        .join(".")
}

fn bind_value(value: &ast::Value) -> Result<ScalarValue> {
    match value {
        ast::Value::Number(n, _) => {
            if let Ok(i) = n.parse::<i64>() {
                Ok(ScalarValue::Int64(i))
            } else {
                let f = n
                    .parse::<f64>()
                    .map_err(|_| EngineError::Parse(format!("Invalid number: {}", n)))?;
                Ok(ScalarValue::Float64(f.into()))
            }
        }
        ast::Value::SingleQuotedString(s) | ast::Value::DoubleQuotedString(s) => {
            Ok(ScalarValue::Utf8(s.clone()))
        }
        ast::Value::Boolean(b) => Ok(ScalarValue::Boolean(*b)),
        ast::Value::Null => Ok(ScalarValue::Null),
        other => Err(EngineError::NotImplemented(format!("Literal: {}", other))),
    }
}

fn bind_binary_op(op: &ast::BinaryOperator) -> Result<BinaryOp> {
    match op {
        ast::BinaryOperator::Plus => Ok(BinaryOp::Add),
        ast::BinaryOperator::Minus => Ok(BinaryOp::Subtract),
        ast::BinaryOperator::Multiply => Ok(BinaryOp::Multiply),
        ast::BinaryOperator::Divide => Ok(BinaryOp::Divide),
        ast::BinaryOperator::Modulo => Ok(BinaryOp::Modulo),
        ast::BinaryOperator::Eq => Ok(BinaryOp::Eq),
        ast::BinaryOperator::NotEq => Ok(BinaryOp::NotEq),
        ast::BinaryOperator::Lt => Ok(BinaryOp::Lt),
        ast::BinaryOperator::LtEq => Ok(BinaryOp::LtEq),
        ast::BinaryOperator::Gt => Ok(BinaryOp::Gt),
        ast::BinaryOperator::GtEq => Ok(BinaryOp::GtEq),
        ast::BinaryOperator::And => Ok(BinaryOp::And),
        ast::BinaryOperator::Or => Ok(BinaryOp::Or),
        ast::BinaryOperator::StringConcat => Ok(BinaryOp::StringConcat),
        other => Err(EngineError::NotImplemented(format!(
            "Binary operator: {}",
            other
        ))),
    }
}

/// Map a SQL column type to the engine's Arrow type set
pub fn sql_type_to_arrow(data_type: &ast::DataType) -> Result<ArrowDataType> {
    use ast::DataType::*;

    match data_type {
        Varchar(_) | Text | String(_) => Ok(ArrowDataType::Utf8),
        TinyInt(_) => Ok(ArrowDataType::Int8),
        SmallInt(_) => Ok(ArrowDataType::Int16),
        Int(_) | Integer(_) => Ok(ArrowDataType::Int32),
        BigInt(_) => Ok(ArrowDataType::Int64),
        Real | Float(_) => Ok(ArrowDataType::Float32),
        Double | DoublePrecision => Ok(ArrowDataType::Float64),
        Boolean => Ok(ArrowDataType::Boolean),
        Timestamp(precision, _) => match precision {
            None | Some(0) => Ok(ArrowDataType::Timestamp(TimeUnit::Second, None)),
            Some(9) => Ok(ArrowDataType::Timestamp(TimeUnit::Nanosecond, None)),
            Some(p) => Err(EngineError::NotImplemented(format!(
                "Timestamp precision {} (supported: 0, 9)",
                p
            ))),
        },
        other => Err(EngineError::NotImplemented(format!(
            "Column type: {}",
            other
        ))),
    }
}

/// Parse a LIMIT/OFFSET expression into a row count
fn expr_to_usize(expr: &SqlExpr) -> Result<usize> {
    match expr {
        SqlExpr::Value(ast::Value::Number(n, _)) => n
            .parse::<usize>()
            .map_err(|_| EngineError::Bind(format!("Invalid row count: {}", n))),
        other => Err(EngineError::Bind(format!(
            "LIMIT/OFFSET must be a literal number, got {}",
            other
        ))),
    }
}

/// Collect the distinct aggregate calls in an expression
fn collect_aggregates(expr: &Expr, out: &mut Vec<Expr>) {
    match expr {
        Expr::Aggregate { .. } => {
            if !out.contains(expr) {
                out.push(expr.clone());
            }
        }
        Expr::BinaryExpr { left, right, .. } => {
            collect_aggregates(left, out);
            collect_aggregates(right, out);
        }
        Expr::UnaryExpr { expr, .. } => collect_aggregates(expr, out),
        Expr::Cast { expr, .. } => collect_aggregates(expr, out),
        Expr::Case {
            when_then,
            else_expr,
        } => {
            for (w, t) in when_then {
                collect_aggregates(w, out);
                collect_aggregates(t, out);
            }
            if let Some(e) = else_expr {
                collect_aggregates(e, out);
            }
        }
        Expr::InList { expr, list, .. } => {
            collect_aggregates(expr, out);
            for e in list {
                collect_aggregates(e, out);
            }
        }
        Expr::Between {
            expr, low, high, ..
        } => {
            collect_aggregates(expr, out);
            collect_aggregates(low, out);
            collect_aggregates(high, out);
        }
        Expr::Alias { expr, .. } => collect_aggregates(expr, out),
        _ => {}
    }
}

/// Rewrite an output expression to reference the aggregate node's columns
fn rewrite_post_aggregate(expr: &Expr, group_by: &[Expr], aggregates: &[Expr]) -> Expr {
    if group_by.contains(expr) || aggregates.contains(expr) {
        return Expr::column(expr.output_name());
    }

    match expr {
        Expr::Alias { expr: inner, name } => Expr::Alias {
            expr: Box::new(rewrite_post_aggregate(inner, group_by, aggregates)),
            name: name.clone(),
        },
        Expr::BinaryExpr { left, op, right } => Expr::BinaryExpr {
            left: Box::new(rewrite_post_aggregate(left, group_by, aggregates)),
            op: *op,
            right: Box::new(rewrite_post_aggregate(right, group_by, aggregates)),
        },
        Expr::UnaryExpr { op, expr: inner } => Expr::UnaryExpr {
            op: *op,
            expr: Box::new(rewrite_post_aggregate(inner, group_by, aggregates)),
        },
        Expr::Cast {
            expr: inner,
            data_type,
        } => Expr::Cast {
            expr: Box::new(rewrite_post_aggregate(inner, group_by, aggregates)),
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
                        rewrite_post_aggregate(w, group_by, aggregates),
                        rewrite_post_aggregate(t, group_by, aggregates),
                    )
                })
                .collect(),
            else_expr: else_expr
                .as_ref()
                .map(|e| Box::new(rewrite_post_aggregate(e, group_by, aggregates))),
        },
        Expr::Between {
            expr: inner,
            low,
            high,
            negated,
        } => Expr::Between {
            expr: Box::new(rewrite_post_aggregate(inner, group_by, aggregates)),
            low: Box::new(rewrite_post_aggregate(low, group_by, aggregates)),
            high: Box::new(rewrite_post_aggregate(high, group_by, aggregates)),
            negated: *negated,
        },
        Expr::InList {
            expr: inner,
            list,
            negated,
        } => Expr::InList {
            expr: Box::new(rewrite_post_aggregate(inner, group_by, aggregates)),
            list: list
                .iter()
                .map(|e| rewrite_post_aggregate(e, group_by, aggregates))
                .collect(),
            negated: *negated,
        },
        other => other.clone(),
    }
}

/// Verify an expression only references the aggregate output
fn check_post_aggregate(expr: &Expr, agg_schema: &PlanSchema) -> Result<()> {
    let mut cols = Vec::new();
    expr.referenced_columns(&mut cols);
    for col in cols {
        if agg_schema.index_of(&col).is_none() {
            return Err(EngineError::Bind(format!(
                "Column '{}' must appear in GROUP BY or be used in an aggregate function",
                col
            )));
        }
    }
    Ok(())
}
