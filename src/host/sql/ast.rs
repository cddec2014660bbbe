//! Syntax tree of the host's SELECT dialect
//!
//! Types named in casts are resolved while parsing, so [`Expr::Cast`]
//! already carries a [`TypeTag`].

use crate::types::TypeTag;

/// The dialect has a single statement kind
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectStatement {
    pub columns: Vec<SelectItem>,
    /// At most one source; `None` selects a single row
    pub from: Option<FromItem>,
    pub where_clause: Option<Expr>,
    pub order_by: Vec<OrderByItem>,
    /// Evaluated once per execution, against the bound arguments only
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `*`, the source column
    Wildcard,
    Expr { expr: Expr, alias: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FromItem {
    /// Parsed so it can be rejected with a proper message; the host has no
    /// tables
    Table { name: String, alias: Option<String> },
    /// A set-returning function call, e.g. `generate_series(1, 10) AS s(i)`
    Function {
        name: String,
        args: Vec<Expr>,
        alias: Option<String>,
        column_alias: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    /// Output position, output alias or expression
    pub expr: Expr,
    pub ascending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnRef),
    Literal(Literal),
    /// `$n`, 1-based
    Parameter(usize),
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    UnaryOp { op: UnaryOperator, expr: Box<Expr> },
    /// Scalar function call; unquoted names arrive lower-cased from the lexer
    Function { name: String, args: Vec<Expr> },
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
    /// Searched CASE when `operand` is `None`, simple CASE otherwise
    Case {
        operand: Option<Box<Expr>>,
        when_clauses: Vec<(Expr, Expr)>,
        else_clause: Option<Box<Expr>>,
    },
    /// `expr::type` or `CAST(expr AS type)`
    Cast { expr: Box<Expr>, target: TypeTag },
    /// Parenthesized; kept so output column naming can see through it
    Nested(Box<Expr>),
}

/// `column` or `relation.column`
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Untyped until context gives it one
    Null,
    Boolean(bool),
    /// int4 if it fits, int8 otherwise
    Integer(i64),
    Float(f64),
    /// Text
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOperator {
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// `||` on text or bytea
    Concat,
}

impl BinaryOperator {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::Neq
                | BinaryOperator::Lt
                | BinaryOperator::Gt
                | BinaryOperator::Lte
                | BinaryOperator::Gte
        )
    }

    /// Spelling used in operator error messages
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Eq => "=",
            BinaryOperator::Neq => "<>",
            BinaryOperator::Lt => "<",
            BinaryOperator::Gt => ">",
            BinaryOperator::Lte => "<=",
            BinaryOperator::Gte => ">=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::Concat => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOperator {
    Not,
    Minus,
    Plus,
}
