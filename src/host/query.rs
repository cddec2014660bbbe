//! Compiled statements of the reference host
//!
//! [`CompiledQuery::compile`] parses and types a statement once against the
//! declared parameter types; [`CompiledQuery::run`] evaluates it for one set
//! of bound arguments.

use std::cmp::Ordering;

use super::eval::{cast_datum, Analyzer, Evaluator, SourceColumn};
use super::sql::ast::*;
use super::sql::Parser;
use crate::error::{Error, Result};
use crate::types::{ColumnDesc, Datum, TypeTag};

/// Where an ORDER BY key comes from
#[derive(Debug, Clone)]
enum SortKey {
    /// Position in the output row
    Output(usize),
    /// Expression over the source row
    Expr(Expr),
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledQuery {
    select: SelectStatement,
    source: Option<SourceColumn>,
    source_args: Vec<Expr>,
    outputs: Vec<Expr>,
    sort_keys: Vec<(SortKey, bool)>,
    columns: Vec<ColumnDesc>,
    param_types: Vec<TypeTag>,
}

impl CompiledQuery {
    /// Parse and type `sql` against `param_types`
    pub fn compile(sql: &str, param_types: &[TypeTag]) -> Result<Self> {
        let Statement::Select(select) = Parser::new(sql)?.parse()?;

        let (source, source_args) = match &select.from {
            None => (None, Vec::new()),
            Some(from) => {
                let (source, args) = resolve_from(from, param_types)?;
                (Some(source), args)
            }
        };

        let analyzer = Analyzer::new(param_types, source.as_ref());

        let mut outputs = Vec::new();
        let mut columns = Vec::new();
        for item in &select.columns {
            match item {
                SelectItem::Wildcard => {
                    let source = source.as_ref().ok_or_else(|| {
                        Error::ExecutionError(
                            "SELECT * with no tables specified is not valid".to_string(),
                        )
                    })?;
                    outputs.push(Expr::Column(ColumnRef {
                        table: None,
                        column: source.name.clone(),
                    }));
                    columns.push(ColumnDesc::new(source.name.clone(), source.type_tag));
                }
                SelectItem::Expr { expr, alias } => {
                    // Untyped NULL columns are reported as text
                    let type_tag = analyzer.infer(expr)?.unwrap_or(TypeTag::Text);
                    let name = alias.clone().unwrap_or_else(|| column_name(expr));
                    outputs.push(expr.clone());
                    columns.push(ColumnDesc::new(name, type_tag));
                }
            }
        }

        if let Some(predicate) = &select.where_clause {
            match analyzer.infer(predicate)? {
                None | Some(TypeTag::Bool) => {}
                Some(other) => {
                    return Err(Error::ExecutionError(format!(
                        "argument of WHERE must be type boolean, not type {}",
                        other
                    )))
                }
            }
        }

        let mut sort_keys = Vec::new();
        for item in &select.order_by {
            let key = resolve_sort_key(&item.expr, &columns, &select.columns, &analyzer)?;
            sort_keys.push((key, item.ascending));
        }

        for (clause, expr) in [("LIMIT", &select.limit), ("OFFSET", &select.offset)] {
            if let Some(expr) = expr {
                match analyzer.infer(expr)? {
                    None => {}
                    Some(tag) if tag.is_integer() => {}
                    Some(other) => {
                        return Err(Error::ExecutionError(format!(
                            "argument of {} must be type bigint, not type {}",
                            clause, other
                        )))
                    }
                }
            }
        }

        Ok(Self {
            select,
            source,
            source_args,
            outputs,
            sort_keys,
            columns,
            param_types: param_types.to_vec(),
        })
    }

    /// Row descriptor
    pub fn columns(&self) -> &[ColumnDesc] {
        &self.columns
    }

    pub fn param_types(&self) -> &[TypeTag] {
        &self.param_types
    }

    /// Evaluate for one set of arguments, returning at most `row_limit`
    /// rows (0 means no limit)
    pub fn run(&self, args: &[Datum], row_limit: usize) -> Result<Vec<Vec<Datum>>> {
        let constants = Evaluator::new(args, None);
        let offset = self
            .eval_count("OFFSET", &self.select.offset, &constants)?
            .unwrap_or(0);
        let limit = self.eval_count("LIMIT", &self.select.limit, &constants)?;
        let take = match (limit, row_limit) {
            (limit, 0) => limit,
            (Some(limit), row_limit) => Some(limit.min(row_limit)),
            (None, row_limit) => Some(row_limit),
        };

        // Without sorting, nothing past offset + take is ever observed
        let cap = match (self.sort_keys.is_empty(), take) {
            (true, Some(take)) => Some(offset.saturating_add(take)),
            _ => None,
        };

        let evaluator = Evaluator::new(args, self.source.as_ref());
        let source_type = self.source.as_ref().map(|source| source.type_tag);
        let mut rows: Vec<(Vec<Datum>, Vec<Datum>)> = Vec::new();

        for value in self.scan(args)? {
            if cap.map_or(false, |cap| rows.len() >= cap) {
                break;
            }

            let input = match (value, source_type) {
                (Some(value), Some(type_tag)) => Some(cast_datum(Datum::Int8(value), type_tag)?),
                _ => None,
            };

            if let Some(predicate) = &self.select.where_clause {
                if evaluator.eval(predicate, input.as_ref())?.as_bool() != Some(true) {
                    continue;
                }
            }

            let mut output = Vec::with_capacity(self.outputs.len());
            for (expr, column) in self.outputs.iter().zip(&self.columns) {
                let value = evaluator.eval(expr, input.as_ref())?;
                output.push(cast_datum(value, column.type_tag)?);
            }

            let mut keys = Vec::with_capacity(self.sort_keys.len());
            for (key, _) in &self.sort_keys {
                keys.push(match key {
                    SortKey::Output(i) => output[*i].clone(),
                    SortKey::Expr(expr) => evaluator.eval(expr, input.as_ref())?,
                });
            }

            rows.push((output, keys));
        }

        if !self.sort_keys.is_empty() {
            rows.sort_by(|(_, a), (_, b)| self.compare_keys(a, b));
        }

        Ok(rows
            .into_iter()
            .skip(offset)
            .take(take.unwrap_or(usize::MAX))
            .map(|(output, _)| output)
            .collect())
    }

    /// Source values, one per input row; a single `None` for a FROM-less
    /// select. Series values are produced on demand.
    fn scan(&self, args: &[Datum]) -> Result<Box<dyn Iterator<Item = Option<i64>>>> {
        if self.source.is_none() {
            return Ok(Box::new(std::iter::once(None)));
        }

        let evaluator = Evaluator::new(args, None);
        let mut bounds = Vec::with_capacity(self.source_args.len());
        for expr in &self.source_args {
            match evaluator.eval(expr, None)?.as_i64() {
                Some(value) => bounds.push(value),
                // Any NULL bound yields an empty series
                None => return Ok(Box::new(std::iter::empty())),
            }
        }

        let step = bounds.get(2).copied().unwrap_or(1);
        if step == 0 {
            return Err(Error::ExecutionError(
                "step size cannot equal zero".to_string(),
            ));
        }

        let series = Series {
            next: Some(bounds[0]),
            stop: bounds[1],
            step,
        };
        Ok(Box::new(series.map(Some)))
    }

    fn eval_count(
        &self,
        clause: &str,
        expr: &Option<Expr>,
        evaluator: &Evaluator<'_>,
    ) -> Result<Option<usize>> {
        let Some(expr) = expr else {
            return Ok(None);
        };
        match evaluator.eval(expr, None)? {
            Datum::Null => Ok(None),
            value => {
                let n = value.as_i64().unwrap_or(0);
                usize::try_from(n).map(Some).map_err(|_| {
                    Error::ExecutionError(format!("{} must not be negative", clause))
                })
            }
        }
    }

    // NULLs sort after everything else in ascending order
    fn compare_keys(&self, a: &[Datum], b: &[Datum]) -> Ordering {
        for ((x, y), (_, ascending)) in a.iter().zip(b).zip(&self.sort_keys) {
            let ord = match (x.is_null(), y.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => x.compare(y).unwrap_or(Ordering::Equal),
            };
            let ord = if *ascending { ord } else { ord.reverse() };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// `generate_series` values; stops before overflowing
struct Series {
    next: Option<i64>,
    stop: i64,
    step: i64,
}

impl Iterator for Series {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        let value = self.next?;
        if (self.step > 0 && value > self.stop) || (self.step < 0 && value < self.stop) {
            self.next = None;
            return None;
        }
        self.next = value.checked_add(self.step);
        Some(value)
    }
}

/// Resolve the FROM item into its single column and the series bounds
fn resolve_from(from: &FromItem, param_types: &[TypeTag]) -> Result<(SourceColumn, Vec<Expr>)> {
    let (name, args, alias, column_alias) = match from {
        FromItem::Table { name, .. } => {
            return Err(Error::ExecutionError(format!(
                "relation \"{}\" does not exist",
                name
            )))
        }
        FromItem::Function {
            name,
            args,
            alias,
            column_alias,
        } => (name, args, alias, column_alias),
    };

    let analyzer = Analyzer::new(param_types, None);
    let types = args
        .iter()
        .map(|arg| analyzer.infer(arg))
        .collect::<Result<Vec<_>>>()?;

    let integral = types.iter().all(|t| t.map_or(true, |tag| tag.is_integer()));
    if name != "generate_series" || !(2..=3).contains(&types.len()) || !integral {
        let list = types
            .iter()
            .map(|t| t.map_or_else(|| "unknown".to_string(), |tag| tag.to_string()))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(Error::UnknownFunction(format!("{}({})", name, list)));
    }

    let type_tag = types
        .iter()
        .flatten()
        .copied()
        .try_fold(TypeTag::Int4, TypeTag::promote)
        .unwrap_or(TypeTag::Int8);

    let relation = alias.clone().unwrap_or_else(|| name.clone());
    let column = column_alias
        .clone()
        .or_else(|| alias.clone())
        .unwrap_or_else(|| name.clone());

    Ok((
        SourceColumn {
            relation,
            name: column,
            type_tag,
        },
        args.clone(),
    ))
}

/// ORDER BY accepts an output position, an output alias or any expression
fn resolve_sort_key(
    expr: &Expr,
    columns: &[ColumnDesc],
    items: &[SelectItem],
    analyzer: &Analyzer<'_>,
) -> Result<SortKey> {
    if let Expr::Literal(Literal::Integer(n)) = expr {
        return match usize::try_from(*n) {
            Ok(pos) if (1..=columns.len()).contains(&pos) => Ok(SortKey::Output(pos - 1)),
            _ => Err(Error::ExecutionError(format!(
                "ORDER BY position {} is not in select list",
                n
            ))),
        };
    }

    if let Expr::Column(ColumnRef {
        table: None,
        column,
    }) = expr
    {
        let aliased = items.iter().position(|item| {
            matches!(item, SelectItem::Expr { alias: Some(alias), .. } if alias == column)
        });
        if let Some(pos) = aliased {
            return Ok(SortKey::Output(pos));
        }
    }

    analyzer.infer(expr)?;
    Ok(SortKey::Expr(expr.clone()))
}

/// Output name of an unaliased select item
fn column_name(expr: &Expr) -> String {
    match expr {
        Expr::Column(col) => col.column.clone(),
        Expr::Function { name, .. } => name.clone(),
        Expr::Case { .. } => "case".to_string(),
        Expr::Nested(inner) => column_name(inner),
        Expr::Cast { expr, target } => match expr.as_ref() {
            Expr::Column(_) | Expr::Function { .. } | Expr::Nested(_) => column_name(expr),
            _ => target.to_string(),
        },
        _ => "?column?".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(sql: &str, types: &[TypeTag], args: &[Datum]) -> Result<Vec<Vec<Datum>>> {
        CompiledQuery::compile(sql, types)?.run(args, 0)
    }

    fn ints(rows: &[Vec<Datum>]) -> Vec<i64> {
        rows.iter().map(|row| row[0].as_i64().unwrap()).collect()
    }

    #[test]
    fn test_series_with_parameter() {
        let query = CompiledQuery::compile(
            "select $1 + i from generate_series(1,100) i",
            &[TypeTag::Int8],
        )
        .unwrap();
        assert_eq!(query.columns(), &[ColumnDesc::new("?column?", TypeTag::Int8)]);

        let rows = query.run(&[Datum::Int8(1)], 0).unwrap();
        assert_eq!(rows.len(), 100);
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row[0], Datum::Int8(i as i64 + 2));
        }
    }

    #[test]
    fn test_column_names() {
        let query = CompiledQuery::compile(
            "SELECT n, n * 2 AS doubled, upper('x'), 1::int8 FROM generate_series(1, 3) AS s(n)",
            &[],
        )
        .unwrap();
        let names: Vec<&str> = query.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["n", "doubled", "upper", "int8"]);
        assert_eq!(query.columns()[0].type_tag, TypeTag::Int4);
    }

    #[test]
    fn test_where_order_limit() {
        let rows = run(
            "SELECT i FROM generate_series(1, 10) i WHERE i % 2 = 0 ORDER BY i DESC LIMIT 3 OFFSET 1",
            &[],
            &[],
        )
        .unwrap();
        assert_eq!(ints(&rows), vec![8, 6, 4]);

        let rows = run(
            "SELECT i * -1 AS neg FROM generate_series(1, 4) i ORDER BY neg",
            &[],
            &[],
        )
        .unwrap();
        assert_eq!(ints(&rows), vec![-4, -3, -2, -1]);
    }

    #[test]
    fn test_series_steps() {
        let rows = run("SELECT * FROM generate_series(10, 1, -3) x", &[], &[]).unwrap();
        assert_eq!(ints(&rows), vec![10, 7, 4, 1]);

        let rows = run(
            "SELECT * FROM generate_series(1, $1) x",
            &[TypeTag::Int4],
            &[Datum::Null],
        )
        .unwrap();
        assert!(rows.is_empty());

        assert!(run("SELECT * FROM generate_series(1, 3, 0) x", &[], &[]).is_err());
    }

    #[test]
    fn test_row_limit() {
        let query = CompiledQuery::compile("SELECT i FROM generate_series(1, 50) i", &[]).unwrap();
        assert_eq!(query.run(&[], 5).unwrap().len(), 5);
        assert_eq!(query.run(&[], 0).unwrap().len(), 50);
    }

    #[test]
    fn test_limit_offset_without_order() {
        let rows = run("SELECT i FROM generate_series(1, 10) i LIMIT 2 OFFSET 3", &[], &[]).unwrap();
        assert_eq!(ints(&rows), vec![4, 5]);

        let rows = run("SELECT i FROM generate_series(1, 10) i OFFSET 8", &[], &[]).unwrap();
        assert_eq!(ints(&rows), vec![9, 10]);

        let rows = run("SELECT i FROM generate_series(1, 3) i OFFSET 5", &[], &[]).unwrap();
        assert!(rows.is_empty());

        let rows = run(
            "SELECT i FROM generate_series(1, 10) i LIMIT NULL OFFSET $1",
            &[TypeTag::Int8],
            &[Datum::Int8(7)],
        )
        .unwrap();
        assert_eq!(ints(&rows), vec![8, 9, 10]);
    }

    #[test]
    fn test_limit_stops_series_early() {
        let rows = run(
            "SELECT i FROM generate_series(1, 9223372036854775807) i LIMIT 1",
            &[],
            &[],
        )
        .unwrap();
        assert_eq!(ints(&rows), vec![1]);

        let query = CompiledQuery::compile(
            "SELECT i FROM generate_series(1, 9223372036854775807) i WHERE i % 2 = 0",
            &[],
        )
        .unwrap();
        assert_eq!(ints(&query.run(&[], 3).unwrap()), vec![2, 4, 6]);
    }

    #[test]
    fn test_series_ends_at_integer_bounds() {
        let rows = run(
            "SELECT i FROM generate_series(9223372036854775806, 9223372036854775807) i",
            &[],
            &[],
        )
        .unwrap();
        assert_eq!(ints(&rows), vec![i64::MAX - 1, i64::MAX]);
    }

    #[test]
    fn test_select_without_from() {
        let rows = run("SELECT 1, 'a', NULL", &[], &[]).unwrap();
        assert_eq!(
            rows,
            vec![vec![Datum::Int4(1), Datum::Text("a".to_string()), Datum::Null]]
        );
    }

    #[test]
    fn test_compile_errors() {
        assert!(matches!(
            CompiledQuery::compile("SELECT a FROM users", &[]),
            Err(Error::ExecutionError(_))
        ));
        assert!(matches!(
            CompiledQuery::compile("SELECT * FROM unnest(1, 2) x", &[]),
            Err(Error::UnknownFunction(_))
        ));
        assert!(matches!(
            CompiledQuery::compile("SELECT y FROM generate_series(1, 2) x", &[]),
            Err(Error::ColumnNotFound(_))
        ));
        assert!(matches!(
            CompiledQuery::compile("SELECT 1 WHERE 1", &[]),
            Err(Error::ExecutionError(_))
        ));
        assert!(matches!(
            CompiledQuery::compile("SELECT 1 ORDER BY 2", &[]),
            Err(Error::ExecutionError(_))
        ));
    }
}
