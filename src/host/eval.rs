//! Expression typing and evaluation
//!
//! The [`Analyzer`] assigns every expression a static type when a statement
//! is compiled, so the row descriptor is known before any row exists. The
//! [`Evaluator`] then computes values row by row.
//!
//! A static type of `None` means "unknown", the type of a bare NULL.

use std::cmp::Ordering;

use super::sql::ast::*;
use crate::error::{Error, Result};
use crate::types::{Datum, TypeTag};

/// The single column produced by a FROM item
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SourceColumn {
    pub relation: String,
    pub name: String,
    pub type_tag: TypeTag,
}

impl SourceColumn {
    fn matches(&self, col: &ColumnRef) -> bool {
        col.column == self.name
            && col
                .table
                .as_ref()
                .map_or(true, |table| *table == self.relation)
    }
}

fn column_not_found(col: &ColumnRef) -> Error {
    match &col.table {
        Some(table) => Error::ColumnNotFound(format!("{}.{}", table, col.column)),
        None => Error::ColumnNotFound(col.column.clone()),
    }
}

fn type_label(tag: Option<TypeTag>) -> String {
    tag.map_or_else(|| "unknown".to_string(), |t| t.to_string())
}

fn operator_mismatch(left: Option<TypeTag>, op: &str, right: Option<TypeTag>) -> Error {
    Error::OperatorMismatch {
        left: type_label(left),
        op: op.to_string(),
        right: type_label(right),
    }
}

/// Integer literals are int4 when they fit
fn literal_type(lit: &Literal) -> Option<TypeTag> {
    match lit {
        Literal::Null => None,
        Literal::Boolean(_) => Some(TypeTag::Bool),
        Literal::Integer(n) if i32::try_from(*n).is_ok() => Some(TypeTag::Int4),
        Literal::Integer(_) => Some(TypeTag::Int8),
        Literal::Float(_) => Some(TypeTag::Float8),
        Literal::String(_) => Some(TypeTag::Text),
    }
}

fn literal_value(lit: &Literal) -> Datum {
    match lit {
        Literal::Null => Datum::Null,
        Literal::Boolean(b) => Datum::Bool(*b),
        Literal::Integer(n) => match i32::try_from(*n) {
            Ok(i) => Datum::Int4(i),
            Err(_) => Datum::Int8(*n),
        },
        Literal::Float(f) => Datum::Float8(*f),
        Literal::String(s) => Datum::Text(s.clone()),
    }
}

/// Common type of two branches (CASE, COALESCE)
fn unify(a: Option<TypeTag>, b: Option<TypeTag>, context: &str) -> Result<Option<TypeTag>> {
    match (a, b) {
        (None, other) | (other, None) => Ok(other),
        (Some(x), Some(y)) if x == y => Ok(Some(x)),
        (Some(x), Some(y)) => TypeTag::promote(x, y).map(Some).ok_or_else(|| {
            Error::ExecutionError(format!("{} types {} and {} cannot be matched", context, x, y))
        }),
    }
}

/// Whether an explicit cast from `from` to `to` exists
pub(crate) fn can_cast(from: TypeTag, to: TypeTag) -> bool {
    from == to
        || (from.is_numeric() && to.is_numeric())
        || from == TypeTag::Text
        || to == TypeTag::Text
        || (from == TypeTag::Bool && to.is_integer())
        || (from.is_integer() && to == TypeTag::Bool)
}

/// Static typing of expressions against parameter types and a source column
pub(crate) struct Analyzer<'a> {
    params: &'a [TypeTag],
    source: Option<&'a SourceColumn>,
}

impl<'a> Analyzer<'a> {
    pub fn new(params: &'a [TypeTag], source: Option<&'a SourceColumn>) -> Self {
        Self { params, source }
    }

    pub fn infer(&self, expr: &Expr) -> Result<Option<TypeTag>> {
        match expr {
            Expr::Literal(lit) => Ok(literal_type(lit)),

            Expr::Parameter(n) => self
                .params
                .get(n - 1)
                .copied()
                .map(Some)
                .ok_or(Error::UndefinedParameter(*n)),

            Expr::Column(col) => match self.source {
                Some(source) if source.matches(col) => Ok(Some(source.type_tag)),
                _ => Err(column_not_found(col)),
            },

            Expr::BinaryOp { left, op, right } => {
                let l = self.infer(left)?;
                let r = self.infer(right)?;
                self.infer_binary(l, *op, r)
            }

            Expr::UnaryOp { op, expr } => {
                let t = self.infer(expr)?;
                match op {
                    UnaryOperator::Not => match t {
                        None | Some(TypeTag::Bool) => Ok(Some(TypeTag::Bool)),
                        Some(other) => Err(Error::ExecutionError(format!(
                            "argument of NOT must be type boolean, not type {}",
                            other
                        ))),
                    },
                    UnaryOperator::Minus | UnaryOperator::Plus => match t {
                        None => Ok(None),
                        Some(tag) if tag.is_numeric() => Ok(Some(tag)),
                        Some(tag) => Err(Error::OperatorMismatch {
                            left: String::new(),
                            op: if *op == UnaryOperator::Minus { "-" } else { "+" }.to_string(),
                            right: tag.to_string(),
                        }),
                    },
                }
            }

            Expr::Function { name, args } => {
                let types = args
                    .iter()
                    .map(|arg| self.infer(arg))
                    .collect::<Result<Vec<_>>>()?;
                infer_function(name, &types)
            }

            Expr::IsNull(inner) | Expr::IsNotNull(inner) => {
                self.infer(inner)?;
                Ok(Some(TypeTag::Bool))
            }

            Expr::Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                let operand_type = match operand {
                    Some(op) => Some(self.infer(op)?),
                    None => None,
                };

                let mut result = None;
                for (when, then) in when_clauses {
                    let when_type = self.infer(when)?;
                    match operand_type {
                        Some(op_type) => {
                            self.infer_binary(op_type, BinaryOperator::Eq, when_type)?;
                        }
                        None => {
                            if !matches!(when_type, None | Some(TypeTag::Bool)) {
                                return Err(Error::ExecutionError(format!(
                                    "argument of CASE/WHEN must be type boolean, not type {}",
                                    type_label(when_type)
                                )));
                            }
                        }
                    }
                    result = unify(result, self.infer(then)?, "CASE")?;
                }
                if let Some(else_expr) = else_clause {
                    result = unify(result, self.infer(else_expr)?, "CASE")?;
                }
                Ok(result)
            }

            Expr::Cast { expr, target } => match self.infer(expr)? {
                Some(from) if !can_cast(from, *target) => Err(Error::InvalidCast {
                    from: from.to_string(),
                    to: target.to_string(),
                }),
                _ => Ok(Some(*target)),
            },

            Expr::Nested(inner) => self.infer(inner),
        }
    }

    fn infer_binary(
        &self,
        l: Option<TypeTag>,
        op: BinaryOperator,
        r: Option<TypeTag>,
    ) -> Result<Option<TypeTag>> {
        match op {
            BinaryOperator::And | BinaryOperator::Or => {
                let ok = |t: Option<TypeTag>| matches!(t, None | Some(TypeTag::Bool));
                if ok(l) && ok(r) {
                    Ok(Some(TypeTag::Bool))
                } else {
                    Err(operator_mismatch(l, op.symbol(), r))
                }
            }
            _ if op.is_comparison() => match (l, r) {
                (Some(a), Some(b)) if !a.is_comparable_with(&b) => {
                    Err(operator_mismatch(l, op.symbol(), r))
                }
                _ => Ok(Some(TypeTag::Bool)),
            },
            BinaryOperator::Concat => match (l, r) {
                (Some(TypeTag::Bytea), Some(TypeTag::Bytea)) => Ok(Some(TypeTag::Bytea)),
                (Some(TypeTag::Text), _) | (_, Some(TypeTag::Text)) | (None, None) => {
                    Ok(Some(TypeTag::Text))
                }
                _ => Err(operator_mismatch(l, op.symbol(), r)),
            },
            _ => {
                let numeric = |t: Option<TypeTag>| t.map_or(true, |tag| tag.is_numeric());
                if !numeric(l) || !numeric(r) {
                    return Err(operator_mismatch(l, op.symbol(), r));
                }
                let result = match (l, r) {
                    (Some(a), Some(b)) => TypeTag::promote(a, b),
                    (known, None) | (None, known) => known,
                };
                if op == BinaryOperator::Mod && result.map_or(false, |t| t.is_float()) {
                    return Err(operator_mismatch(l, op.symbol(), r));
                }
                Ok(result)
            }
        }
    }
}

fn infer_function(name: &str, args: &[Option<TypeTag>]) -> Result<Option<TypeTag>> {
    let unknown = || {
        let list = args
            .iter()
            .map(|t| type_label(*t))
            .collect::<Vec<_>>()
            .join(", ");
        Error::UnknownFunction(format!("{}({})", name, list))
    };

    match (name, args) {
        ("abs", [t]) => match t {
            None => Ok(None),
            Some(tag) if tag.is_numeric() => Ok(Some(*tag)),
            _ => Err(unknown()),
        },
        ("upper" | "lower", [t]) => match t {
            None | Some(TypeTag::Text) => Ok(Some(TypeTag::Text)),
            _ => Err(unknown()),
        },
        ("length", [t]) => match t {
            None | Some(TypeTag::Text) | Some(TypeTag::Bytea) => Ok(Some(TypeTag::Int4)),
            _ => Err(unknown()),
        },
        ("coalesce", [_, ..]) => args
            .iter()
            .try_fold(None, |acc, t| unify(acc, *t, "COALESCE")),
        _ => Err(unknown()),
    }
}

/// Row-at-a-time evaluation
pub(crate) struct Evaluator<'a> {
    params: &'a [Datum],
    source: Option<&'a SourceColumn>,
}

impl<'a> Evaluator<'a> {
    pub fn new(params: &'a [Datum], source: Option<&'a SourceColumn>) -> Self {
        Self { params, source }
    }

    /// Evaluate `expr` against the current source value (if any)
    pub fn eval(&self, expr: &Expr, row: Option<&Datum>) -> Result<Datum> {
        match expr {
            Expr::Literal(lit) => Ok(literal_value(lit)),

            Expr::Parameter(n) => self
                .params
                .get(n - 1)
                .cloned()
                .ok_or(Error::UndefinedParameter(*n)),

            Expr::Column(col) => match (self.source, row) {
                (Some(source), Some(value)) if source.matches(col) => Ok(value.clone()),
                _ => Err(column_not_found(col)),
            },

            Expr::BinaryOp { left, op, right } => {
                let l = self.eval(left, row)?;
                let r = self.eval(right, row)?;
                evaluate_binary_op(&l, *op, &r)
            }

            Expr::UnaryOp { op, expr } => {
                let val = self.eval(expr, row)?;
                evaluate_unary_op(*op, val)
            }

            Expr::Function { name, args } => {
                let values = args
                    .iter()
                    .map(|arg| self.eval(arg, row))
                    .collect::<Result<Vec<_>>>()?;
                evaluate_function(name, values)
            }

            Expr::IsNull(inner) => Ok(Datum::Bool(self.eval(inner, row)?.is_null())),

            Expr::IsNotNull(inner) => Ok(Datum::Bool(!self.eval(inner, row)?.is_null())),

            Expr::Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                let operand_value = match operand {
                    Some(op) => Some(self.eval(op, row)?),
                    None => None,
                };

                for (when, then) in when_clauses {
                    let when_value = self.eval(when, row)?;
                    let hit = match &operand_value {
                        Some(value) => value.compare(&when_value) == Some(Ordering::Equal)
                            && !value.is_null(),
                        None => when_value.as_bool() == Some(true),
                    };
                    if hit {
                        return self.eval(then, row);
                    }
                }

                match else_clause {
                    Some(else_expr) => self.eval(else_expr, row),
                    None => Ok(Datum::Null),
                }
            }

            Expr::Cast { expr, target } => cast_datum(self.eval(expr, row)?, *target),

            Expr::Nested(inner) => self.eval(inner, row),
        }
    }
}

fn evaluate_binary_op(left: &Datum, op: BinaryOperator, right: &Datum) -> Result<Datum> {
    match op {
        // Three-valued logic
        BinaryOperator::And => Ok(match (left.as_bool(), right.as_bool()) {
            (Some(false), _) | (_, Some(false)) => Datum::Bool(false),
            (Some(true), Some(true)) => Datum::Bool(true),
            _ => Datum::Null,
        }),
        BinaryOperator::Or => Ok(match (left.as_bool(), right.as_bool()) {
            (Some(true), _) | (_, Some(true)) => Datum::Bool(true),
            (Some(false), Some(false)) => Datum::Bool(false),
            _ => Datum::Null,
        }),

        _ if left.is_null() || right.is_null() => Ok(Datum::Null),

        _ if op.is_comparison() => {
            let cmp = left.compare(right).ok_or_else(|| Error::OperatorMismatch {
                left: left.type_name(),
                op: op.symbol().to_string(),
                right: right.type_name(),
            })?;
            let result = match op {
                BinaryOperator::Eq => cmp == Ordering::Equal,
                BinaryOperator::Neq => cmp != Ordering::Equal,
                BinaryOperator::Lt => cmp == Ordering::Less,
                BinaryOperator::Gt => cmp == Ordering::Greater,
                BinaryOperator::Lte => cmp != Ordering::Greater,
                _ => cmp != Ordering::Less,
            };
            Ok(Datum::Bool(result))
        }

        BinaryOperator::Concat => match (left, right) {
            (Datum::Bytea(a), Datum::Bytea(b)) => {
                let mut bytes = a.clone();
                bytes.extend_from_slice(b);
                Ok(Datum::Bytea(bytes))
            }
            _ => Ok(Datum::Text(format!("{}{}", text_of(left), text_of(right)))),
        },

        _ => evaluate_arithmetic(left, op, right),
    }
}

fn evaluate_arithmetic(left: &Datum, op: BinaryOperator, right: &Datum) -> Result<Datum> {
    let mismatch = || Error::OperatorMismatch {
        left: left.type_name(),
        op: op.symbol().to_string(),
        right: right.type_name(),
    };

    let target = match (left.type_tag(), right.type_tag()) {
        (Some(a), Some(b)) => TypeTag::promote(a, b).ok_or_else(mismatch)?,
        _ => return Err(mismatch()),
    };

    if target.is_integer() {
        let (a, b) = match (left.as_i64(), right.as_i64()) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(mismatch()),
        };
        if matches!(op, BinaryOperator::Div | BinaryOperator::Mod) && b == 0 {
            return Err(Error::DivisionByZero);
        }
        let value = match op {
            BinaryOperator::Add => a.checked_add(b),
            BinaryOperator::Sub => a.checked_sub(b),
            BinaryOperator::Mul => a.checked_mul(b),
            BinaryOperator::Div => a.checked_div(b),
            BinaryOperator::Mod => a.checked_rem(b),
            _ => return Err(mismatch()),
        };
        let value = value.ok_or(Error::NumericOverflow(integer_name(target)))?;
        return narrow_integer(value, target);
    }

    let (a, b) = match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err(mismatch()),
    };
    let value = match op {
        BinaryOperator::Add => a + b,
        BinaryOperator::Sub => a - b,
        BinaryOperator::Mul => a * b,
        BinaryOperator::Div if b == 0.0 => return Err(Error::DivisionByZero),
        BinaryOperator::Div => a / b,
        _ => return Err(mismatch()),
    };
    Ok(match target {
        TypeTag::Float4 => Datum::Float4(value as f32),
        _ => Datum::Float8(value),
    })
}

fn evaluate_unary_op(op: UnaryOperator, val: Datum) -> Result<Datum> {
    match (op, val) {
        (_, Datum::Null) => Ok(Datum::Null),
        (UnaryOperator::Not, Datum::Bool(b)) => Ok(Datum::Bool(!b)),
        (UnaryOperator::Plus, val) if val.type_tag().map_or(false, |t| t.is_numeric()) => Ok(val),
        (UnaryOperator::Minus, Datum::Int2(i)) => i
            .checked_neg()
            .map(Datum::Int2)
            .ok_or(Error::NumericOverflow("smallint")),
        (UnaryOperator::Minus, Datum::Int4(i)) => i
            .checked_neg()
            .map(Datum::Int4)
            .ok_or(Error::NumericOverflow("integer")),
        (UnaryOperator::Minus, Datum::Int8(i)) => i
            .checked_neg()
            .map(Datum::Int8)
            .ok_or(Error::NumericOverflow("bigint")),
        (UnaryOperator::Minus, Datum::Float4(f)) => Ok(Datum::Float4(-f)),
        (UnaryOperator::Minus, Datum::Float8(f)) => Ok(Datum::Float8(-f)),
        (op, val) => Err(Error::OperatorMismatch {
            left: String::new(),
            op: match op {
                UnaryOperator::Not => "NOT",
                UnaryOperator::Minus => "-",
                UnaryOperator::Plus => "+",
            }
            .to_string(),
            right: val.type_name(),
        }),
    }
}

fn evaluate_function(name: &str, args: Vec<Datum>) -> Result<Datum> {
    if name == "coalesce" {
        return Ok(args
            .into_iter()
            .find(|arg| !arg.is_null())
            .unwrap_or(Datum::Null));
    }

    let mut args = args.into_iter();
    let (Some(arg), None) = (args.next(), args.next()) else {
        return Err(Error::UnknownFunction(name.to_string()));
    };

    match (name, arg) {
        (_, Datum::Null) => Ok(Datum::Null),
        ("abs", Datum::Int2(i)) => i
            .checked_abs()
            .map(Datum::Int2)
            .ok_or(Error::NumericOverflow("smallint")),
        ("abs", Datum::Int4(i)) => i
            .checked_abs()
            .map(Datum::Int4)
            .ok_or(Error::NumericOverflow("integer")),
        ("abs", Datum::Int8(i)) => i
            .checked_abs()
            .map(Datum::Int8)
            .ok_or(Error::NumericOverflow("bigint")),
        ("abs", Datum::Float4(f)) => Ok(Datum::Float4(f.abs())),
        ("abs", Datum::Float8(f)) => Ok(Datum::Float8(f.abs())),
        ("upper", Datum::Text(s)) => Ok(Datum::Text(s.to_uppercase())),
        ("lower", Datum::Text(s)) => Ok(Datum::Text(s.to_lowercase())),
        ("length", Datum::Text(s)) => Ok(Datum::Int4(s.chars().count() as i32)),
        ("length", Datum::Bytea(b)) => Ok(Datum::Int4(b.len() as i32)),
        (_, arg) => Err(Error::UnknownFunction(format!(
            "{}({})",
            name,
            arg.type_name()
        ))),
    }
}

fn integer_name(tag: TypeTag) -> &'static str {
    match tag {
        TypeTag::Int2 => "smallint",
        TypeTag::Int4 => "integer",
        _ => "bigint",
    }
}

fn narrow_integer(value: i64, target: TypeTag) -> Result<Datum> {
    let overflow = || Error::NumericOverflow(integer_name(target));
    match target {
        TypeTag::Int2 => i16::try_from(value).map(Datum::Int2).map_err(|_| overflow()),
        TypeTag::Int4 => i32::try_from(value).map(Datum::Int4).map_err(|_| overflow()),
        _ => Ok(Datum::Int8(value)),
    }
}

/// Text form used by casts and `||`; booleans spell out true/false
fn text_of(datum: &Datum) -> String {
    match datum {
        Datum::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn invalid_input(target: TypeTag, input: &str) -> Error {
    Error::ExecutionError(format!(
        "invalid input syntax for type {}: \"{}\"",
        target, input
    ))
}

/// Convert `datum` to `target`; NULL stays NULL
pub(crate) fn cast_datum(datum: Datum, target: TypeTag) -> Result<Datum> {
    let Some(from) = datum.type_tag() else {
        return Ok(Datum::Null);
    };
    if from == target {
        return Ok(datum);
    }
    if !can_cast(from, target) {
        return Err(Error::InvalidCast {
            from: from.to_string(),
            to: target.to_string(),
        });
    }

    match (datum, target) {
        (datum, TypeTag::Text) => Ok(Datum::Text(text_of(&datum))),

        (Datum::Text(s), target) => parse_text(&s, target),

        (Datum::Bool(b), target) => narrow_integer(b as i64, target),

        (datum, TypeTag::Bool) => Ok(Datum::Bool(datum.as_i64() != Some(0))),

        (datum, target) if target.is_integer() => match datum.as_i64() {
            Some(i) => narrow_integer(i, target),
            None => {
                let f = datum.as_f64().unwrap_or(f64::NAN).round();
                if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 {
                    narrow_integer(f as i64, target)
                } else {
                    Err(Error::NumericOverflow(integer_name(target)))
                }
            }
        },

        (datum, TypeTag::Float4) => Ok(Datum::Float4(datum.as_f64().unwrap_or(f64::NAN) as f32)),

        (datum, _) => Ok(Datum::Float8(datum.as_f64().unwrap_or(f64::NAN))),
    }
}

fn parse_text(s: &str, target: TypeTag) -> Result<Datum> {
    let trimmed = s.trim();
    match target {
        TypeTag::Bool => match trimmed.to_lowercase().as_str() {
            "t" | "true" | "yes" | "on" | "1" => Ok(Datum::Bool(true)),
            "f" | "false" | "no" | "off" | "0" => Ok(Datum::Bool(false)),
            _ => Err(invalid_input(target, s)),
        },
        TypeTag::Int2 | TypeTag::Int4 | TypeTag::Int8 => {
            let value = trimmed
                .parse::<i64>()
                .map_err(|_| invalid_input(target, s))?;
            narrow_integer(value, target)
        }
        TypeTag::Float4 => trimmed
            .parse::<f32>()
            .map(Datum::Float4)
            .map_err(|_| invalid_input(target, s)),
        TypeTag::Float8 => trimmed
            .parse::<f64>()
            .map(Datum::Float8)
            .map_err(|_| invalid_input(target, s)),
        TypeTag::Bytea => match s.strip_prefix("\\x") {
            Some(hex) => decode_hex(hex)
                .map(Datum::Bytea)
                .ok_or_else(|| invalid_input(target, s)),
            None => Ok(Datum::Bytea(s.as_bytes().to_vec())),
        },
        TypeTag::Text => Ok(Datum::Text(s.to_string())),
    }
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| hex.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::sql::Parser;

    fn select_expr(sql: &str) -> Expr {
        match Parser::new(sql).unwrap().parse().unwrap() {
            Statement::Select(s) => match s.columns.into_iter().next().unwrap() {
                SelectItem::Expr { expr, .. } => expr,
                SelectItem::Wildcard => panic!("unexpected wildcard"),
            },
        }
    }

    fn infer(sql: &str, params: &[TypeTag]) -> Result<Option<TypeTag>> {
        Analyzer::new(params, None).infer(&select_expr(sql))
    }

    fn eval(sql: &str, params: &[Datum]) -> Result<Datum> {
        Evaluator::new(params, None).eval(&select_expr(sql), None)
    }

    #[test]
    fn test_literal_types() {
        assert_eq!(infer("SELECT 1", &[]).unwrap(), Some(TypeTag::Int4));
        assert_eq!(infer("SELECT 3000000000", &[]).unwrap(), Some(TypeTag::Int8));
        assert_eq!(infer("SELECT 1.5", &[]).unwrap(), Some(TypeTag::Float8));
        assert_eq!(infer("SELECT NULL", &[]).unwrap(), None);
    }

    #[test]
    fn test_parameter_promotion() {
        assert_eq!(
            infer("SELECT $1 + 1", &[TypeTag::Int8]).unwrap(),
            Some(TypeTag::Int8)
        );
        assert_eq!(
            infer("SELECT $1 * 2", &[TypeTag::Float4]).unwrap(),
            Some(TypeTag::Float8)
        );
        assert!(matches!(
            infer("SELECT $2", &[TypeTag::Int4]),
            Err(Error::UndefinedParameter(2))
        ));
        assert!(matches!(
            infer("SELECT $1 + 1", &[TypeTag::Text]),
            Err(Error::OperatorMismatch { .. })
        ));
    }

    #[test]
    fn test_column_resolution() {
        let source = SourceColumn {
            relation: "s".to_string(),
            name: "n".to_string(),
            type_tag: TypeTag::Int8,
        };
        let analyzer = Analyzer::new(&[], Some(&source));
        assert_eq!(
            analyzer.infer(&select_expr("SELECT s.n")).unwrap(),
            Some(TypeTag::Int8)
        );
        assert!(matches!(
            analyzer.infer(&select_expr("SELECT x.n")),
            Err(Error::ColumnNotFound(_))
        ));
    }

    #[test]
    fn test_integer_overflow() {
        assert!(matches!(
            eval("SELECT 2147483647 + 1", &[]),
            Err(Error::NumericOverflow("integer"))
        ));
        assert_eq!(
            eval("SELECT 2147483647::int8 + 1", &[]).unwrap(),
            Datum::Int8(2147483648)
        );
        assert!(matches!(
            eval("SELECT $1 * 2", &[Datum::Int8(i64::MAX)]),
            Err(Error::NumericOverflow("bigint"))
        ));
    }

    #[test]
    fn test_division() {
        assert_eq!(eval("SELECT 7 / 2", &[]).unwrap(), Datum::Int4(3));
        assert_eq!(eval("SELECT 7 % 3", &[]).unwrap(), Datum::Int4(1));
        assert!(matches!(eval("SELECT 1 / 0", &[]), Err(Error::DivisionByZero)));
        assert!(matches!(eval("SELECT 1.0 / 0", &[]), Err(Error::DivisionByZero)));
    }

    #[test]
    fn test_null_semantics() {
        assert_eq!(eval("SELECT 1 + NULL", &[]).unwrap(), Datum::Null);
        assert_eq!(eval("SELECT NULL = NULL", &[]).unwrap(), Datum::Null);
        assert_eq!(eval("SELECT NULL AND FALSE", &[]).unwrap(), Datum::Bool(false));
        assert_eq!(eval("SELECT NULL OR TRUE", &[]).unwrap(), Datum::Bool(true));
        assert_eq!(eval("SELECT $1 IS NULL", &[Datum::Null]).unwrap(), Datum::Bool(true));
        assert_eq!(
            eval("SELECT coalesce($1, 'x')", &[Datum::Null]).unwrap(),
            Datum::Text("x".to_string())
        );
    }

    #[test]
    fn test_casts() {
        assert_eq!(eval("SELECT '42'::int8", &[]).unwrap(), Datum::Int8(42));
        assert_eq!(eval("SELECT 2.5::int4", &[]).unwrap(), Datum::Int4(3));
        assert_eq!(eval("SELECT TRUE::text", &[]).unwrap(), Datum::Text("true".to_string()));
        assert_eq!(
            eval("SELECT '\\x00ff'::bytea", &[]).unwrap(),
            Datum::Bytea(vec![0x00, 0xff])
        );
        assert!(matches!(
            eval("SELECT 70000::int2", &[]),
            Err(Error::NumericOverflow("smallint"))
        ));
        assert!(matches!(
            eval("SELECT 'abc'::int4", &[]),
            Err(Error::ExecutionError(_))
        ));
        assert!(matches!(
            infer("SELECT TRUE::float8", &[]),
            Err(Error::InvalidCast { .. })
        ));
    }

    #[test]
    fn test_functions_and_case() {
        assert_eq!(eval("SELECT abs(-5)", &[]).unwrap(), Datum::Int4(5));
        assert_eq!(
            eval("SELECT upper('abc') || lower('DEF')", &[]).unwrap(),
            Datum::Text("ABCdef".to_string())
        );
        assert_eq!(eval("SELECT length('héllo')", &[]).unwrap(), Datum::Int4(5));
        assert_eq!(
            eval("SELECT CASE $1 WHEN 1 THEN 'one' ELSE 'many' END", &[Datum::Int4(1)]).unwrap(),
            Datum::Text("one".to_string())
        );
        assert!(matches!(
            infer("SELECT nosuch(1)", &[]),
            Err(Error::UnknownFunction(_))
        ));
        assert_eq!(
            infer("SELECT coalesce($1, 1)", &[TypeTag::Int8]).unwrap(),
            Some(TypeTag::Int8)
        );
    }
}
