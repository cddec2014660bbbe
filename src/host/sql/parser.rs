//! Recursive-descent parser for the host's SELECT dialect
//!
//! Precedence, loosest first: OR, AND, NOT, comparison and IS [NOT] NULL,
//! `+ - ||`, `* / %`, unary sign, `::type`.

use super::ast::*;
use super::lexer::Lexer;
use super::token::Token;
use crate::error::{Error, Result};
use crate::types::TypeTag;

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    /// Tokenize `sql` up front; lexer errors surface here
    pub fn new(sql: &str) -> Result<Self> {
        let mut lexer = Lexer::new(sql);
        let tokens = lexer.tokenize()?;

        Ok(Self {
            tokens,
            position: 0,
        })
    }

    /// Parse exactly one SQL statement
    pub fn parse(&mut self) -> Result<Statement> {
        let stmt = self.parse_statement()?;

        // Consume optional semicolon
        if self.check(&Token::Semicolon) {
            self.advance();
        }

        if !self.is_at_end() {
            return Err(Error::UnexpectedToken {
                expected: "end of statement".to_string(),
                found: format!("{}", self.current()),
            });
        }

        Ok(stmt)
    }

    /// Parse a single statement
    fn parse_statement(&mut self) -> Result<Statement> {
        match self.current() {
            Token::Select => self.parse_select().map(Statement::Select),
            _ => Err(Error::UnexpectedToken {
                expected: "SELECT".to_string(),
                found: format!("{}", self.current()),
            }),
        }
    }

    // ========== SELECT Statement ==========

    fn parse_select(&mut self) -> Result<SelectStatement> {
        self.expect(&Token::Select)?;

        let mut stmt = SelectStatement {
            columns: self.parse_select_list()?,
            ..Default::default()
        };

        if self.check(&Token::From) {
            stmt.from = Some(self.parse_from_clause()?);
        }

        if self.check(&Token::Where) {
            self.advance();
            stmt.where_clause = Some(self.parse_expr()?);
        }

        if self.check(&Token::Order) {
            self.advance();
            self.expect(&Token::By)?;
            stmt.order_by = self.parse_order_by_list()?;
        }

        if self.check(&Token::Limit) {
            self.advance();
            stmt.limit = Some(self.parse_expr()?);
        }

        if self.check(&Token::Offset) {
            self.advance();
            stmt.offset = Some(self.parse_expr()?);
        }

        Ok(stmt)
    }

    fn parse_select_list(&mut self) -> Result<Vec<SelectItem>> {
        let mut items = Vec::new();

        loop {
            items.push(self.parse_select_item()?);

            if !self.check(&Token::Comma) {
                break;
            }
            self.advance(); // consume comma
        }

        Ok(items)
    }

    fn parse_select_item(&mut self) -> Result<SelectItem> {
        if self.check(&Token::Asterisk) {
            self.advance();
            return Ok(SelectItem::Wildcard);
        }

        let expr = self.parse_expr()?;
        let alias = self.parse_optional_alias()?;

        Ok(SelectItem::Expr { expr, alias })
    }

    /// `AS name` or a bare identifier
    fn parse_optional_alias(&mut self) -> Result<Option<String>> {
        if self.check(&Token::As) {
            self.advance();
            return Ok(Some(self.expect_identifier()?));
        }
        if let Token::Identifier(_) = self.current() {
            return Ok(Some(self.expect_identifier()?));
        }
        Ok(None)
    }

    fn parse_from_clause(&mut self) -> Result<FromItem> {
        self.expect(&Token::From)?;

        let name = self.expect_identifier()?;

        if !self.check(&Token::LParen) {
            let alias = self.parse_optional_alias()?;
            return Ok(FromItem::Table { name, alias });
        }

        self.advance(); // consume (
        let args = if self.check(&Token::RParen) {
            Vec::new()
        } else {
            self.parse_expr_list()?
        };
        self.expect(&Token::RParen)?;

        let alias = self.parse_optional_alias()?;
        let column_alias = if alias.is_some() && self.check(&Token::LParen) {
            self.advance();
            let column = self.expect_identifier()?;
            self.expect(&Token::RParen)?;
            Some(column)
        } else {
            None
        };

        Ok(FromItem::Function {
            name,
            args,
            alias,
            column_alias,
        })
    }

    fn parse_order_by_list(&mut self) -> Result<Vec<OrderByItem>> {
        let mut items = Vec::new();

        loop {
            let expr = self.parse_expr()?;
            let ascending = if self.check(&Token::Desc) {
                self.advance();
                false
            } else {
                if self.check(&Token::Asc) {
                    self.advance();
                }
                true
            };
            items.push(OrderByItem { expr, ascending });

            if !self.check(&Token::Comma) {
                break;
            }
            self.advance();
        }

        Ok(items)
    }

    // ========== Expression Parsing ==========

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or_expr()
    }

    fn parse_or_expr(&mut self) -> Result<Expr> {
        self.parse_binary_chain(Self::parse_and_expr, |token| {
            matches!(token, Token::Or).then_some(BinaryOperator::Or)
        })
    }

    fn parse_and_expr(&mut self) -> Result<Expr> {
        self.parse_binary_chain(Self::parse_not_expr, |token| {
            matches!(token, Token::And).then_some(BinaryOperator::And)
        })
    }

    fn parse_not_expr(&mut self) -> Result<Expr> {
        if !self.check(&Token::Not) {
            return self.parse_comparison_expr();
        }
        self.advance();
        Ok(Expr::UnaryOp {
            op: UnaryOperator::Not,
            expr: Box::new(self.parse_not_expr()?),
        })
    }

    /// Comparisons do not chain: `a < b < c` is a syntax error
    fn parse_comparison_expr(&mut self) -> Result<Expr> {
        let left = self.parse_additive_expr()?;

        if self.check(&Token::Is) {
            self.advance();
            let negated = self.check(&Token::Not);
            if negated {
                self.advance();
            }
            self.expect(&Token::Null)?;
            let operand = Box::new(left);
            return Ok(if negated {
                Expr::IsNotNull(operand)
            } else {
                Expr::IsNull(operand)
            });
        }

        let Some(op) = comparison_operator(self.current()) else {
            return Ok(left);
        };
        self.advance();
        Ok(Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(self.parse_additive_expr()?),
        })
    }

    fn parse_additive_expr(&mut self) -> Result<Expr> {
        self.parse_binary_chain(Self::parse_multiplicative_expr, |token| match token {
            Token::Plus => Some(BinaryOperator::Add),
            Token::Minus => Some(BinaryOperator::Sub),
            Token::Concat => Some(BinaryOperator::Concat),
            _ => None,
        })
    }

    fn parse_multiplicative_expr(&mut self) -> Result<Expr> {
        self.parse_binary_chain(Self::parse_unary_expr, |token| match token {
            Token::Asterisk => Some(BinaryOperator::Mul),
            Token::Slash => Some(BinaryOperator::Div),
            Token::Percent => Some(BinaryOperator::Mod),
            _ => None,
        })
    }

    /// Left-associative `operand (op operand)*`
    fn parse_binary_chain(
        &mut self,
        operand: fn(&mut Self) -> Result<Expr>,
        operator: fn(&Token) -> Option<BinaryOperator>,
    ) -> Result<Expr> {
        let mut left = operand(self)?;
        while let Some(op) = operator(self.current()) {
            self.advance();
            left = Expr::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(operand(self)?),
            };
        }
        Ok(left)
    }

    fn parse_unary_expr(&mut self) -> Result<Expr> {
        let op = match self.current() {
            Token::Minus => UnaryOperator::Minus,
            Token::Plus => UnaryOperator::Plus,
            _ => return self.parse_postfix_expr(),
        };

        self.advance();
        let expr = self.parse_unary_expr()?;
        Ok(Expr::UnaryOp {
            op,
            expr: Box::new(expr),
        })
    }

    /// Primary expression followed by any number of `::type` casts
    fn parse_postfix_expr(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary_expr()?;

        while self.check(&Token::DoubleColon) {
            self.advance();
            let target = self.parse_type_name()?;
            expr = Expr::Cast {
                expr: Box::new(expr),
                target,
            };
        }

        Ok(expr)
    }

    fn parse_primary_expr(&mut self) -> Result<Expr> {
        match self.current().clone() {
            // Literals
            Token::IntegerLiteral(n) => {
                self.advance();
                Ok(Expr::Literal(Literal::Integer(n)))
            }
            Token::FloatLiteral(n) => {
                self.advance();
                Ok(Expr::Literal(Literal::Float(n)))
            }
            Token::StringLiteral(s) => {
                self.advance();
                Ok(Expr::Literal(Literal::String(s)))
            }
            Token::True => {
                self.advance();
                Ok(Expr::Literal(Literal::Boolean(true)))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Literal(Literal::Boolean(false)))
            }
            Token::Null => {
                self.advance();
                Ok(Expr::Literal(Literal::Null))
            }
            Token::Parameter(n) => {
                self.advance();
                Ok(Expr::Parameter(n))
            }

            // Parenthesized expression
            Token::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(Expr::Nested(Box::new(expr)))
            }

            // CAST(expr AS type)
            Token::Cast => {
                self.advance();
                self.expect(&Token::LParen)?;
                let expr = self.parse_expr()?;
                self.expect(&Token::As)?;
                let target = self.parse_type_name()?;
                self.expect(&Token::RParen)?;
                Ok(Expr::Cast {
                    expr: Box::new(expr),
                    target,
                })
            }

            // CASE
            Token::Case => self.parse_case_expr(),

            // Identifier (column or function)
            Token::Identifier(name) => {
                self.advance();

                if self.check(&Token::LParen) {
                    self.parse_function(name)
                } else if self.check(&Token::Dot) {
                    // Qualified column (table.column)
                    self.advance();
                    let column = self.expect_identifier()?;
                    Ok(Expr::Column(ColumnRef {
                        table: Some(name),
                        column,
                    }))
                } else {
                    Ok(Expr::Column(ColumnRef {
                        table: None,
                        column: name,
                    }))
                }
            }

            _ => Err(Error::UnexpectedToken {
                expected: "expression".to_string(),
                found: format!("{}", self.current()),
            }),
        }
    }

    fn parse_function(&mut self, name: String) -> Result<Expr> {
        self.expect(&Token::LParen)?;

        let args = if self.check(&Token::RParen) {
            vec![]
        } else {
            self.parse_expr_list()?
        };

        self.expect(&Token::RParen)?;

        Ok(Expr::Function { name, args })
    }

    fn parse_case_expr(&mut self) -> Result<Expr> {
        self.expect(&Token::Case)?;

        // Check for simple CASE (CASE expr WHEN ...)
        let operand = if !self.check(&Token::When) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };

        let mut when_clauses = Vec::new();
        while self.check(&Token::When) {
            self.advance();
            let when_expr = self.parse_expr()?;
            self.expect(&Token::Then)?;
            let then_expr = self.parse_expr()?;
            when_clauses.push((when_expr, then_expr));
        }

        if when_clauses.is_empty() {
            return Err(Error::UnexpectedToken {
                expected: "WHEN".to_string(),
                found: format!("{}", self.current()),
            });
        }

        let else_clause = if self.check(&Token::Else) {
            self.advance();
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };

        self.expect(&Token::End)?;

        Ok(Expr::Case {
            operand,
            when_clauses,
            else_clause,
        })
    }

    fn parse_type_name(&mut self) -> Result<TypeTag> {
        let mut name = self.expect_identifier()?;

        // The only two-word type name
        if name == "double" {
            if let Token::Identifier(next) = self.current() {
                if next == "precision" {
                    self.advance();
                    name.push_str(" precision");
                }
            }
        }

        TypeTag::from_name(&name)
            .ok_or_else(|| Error::ParseError(format!("type \"{}\" does not exist", name)))
    }

    // ========== Helper functions ==========

    fn parse_expr_list(&mut self) -> Result<Vec<Expr>> {
        let mut exprs = Vec::new();

        loop {
            exprs.push(self.parse_expr()?);

            if !self.check(&Token::Comma) {
                break;
            }
            self.advance();
        }

        Ok(exprs)
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current(), Token::Eof)
    }

    fn check(&self, token: &Token) -> bool {
        std::mem::discriminant(self.current()) == std::mem::discriminant(token)
    }

    fn expect(&mut self, token: &Token) -> Result<()> {
        if self.check(token) {
            self.advance();
            Ok(())
        } else {
            Err(Error::UnexpectedToken {
                expected: format!("{}", token),
                found: format!("{}", self.current()),
            })
        }
    }

    fn expect_identifier(&mut self) -> Result<String> {
        match self.current().clone() {
            Token::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(Error::UnexpectedToken {
                expected: "identifier".to_string(),
                found: format!("{}", self.current()),
            }),
        }
    }
}

fn comparison_operator(token: &Token) -> Option<BinaryOperator> {
    match token {
        Token::Eq => Some(BinaryOperator::Eq),
        Token::Neq => Some(BinaryOperator::Neq),
        Token::Lt => Some(BinaryOperator::Lt),
        Token::Gt => Some(BinaryOperator::Gt),
        Token::Lte => Some(BinaryOperator::Lte),
        Token::Gte => Some(BinaryOperator::Gte),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_select(sql: &str) -> SelectStatement {
        match Parser::new(sql).unwrap().parse().unwrap() {
            Statement::Select(s) => s,
        }
    }

    #[test]
    fn test_parse_generate_series() {
        let s = parse_select("select $1 + i from generate_series(1,100) i");

        assert_eq!(s.columns.len(), 1);
        match &s.columns[0] {
            SelectItem::Expr { expr, alias } => {
                assert!(alias.is_none());
                assert!(matches!(
                    expr,
                    Expr::BinaryOp {
                        op: BinaryOperator::Add,
                        ..
                    }
                ));
            }
            other => panic!("unexpected select item {:?}", other),
        }

        match s.from {
            Some(FromItem::Function {
                name, args, alias, ..
            }) => {
                assert_eq!(name, "generate_series");
                assert_eq!(args.len(), 2);
                assert_eq!(alias.as_deref(), Some("i"));
            }
            other => panic!("unexpected from clause {:?}", other),
        }
    }

    #[test]
    fn test_parse_column_alias() {
        let s = parse_select("SELECT s.n FROM generate_series(1, 3) AS s(n)");
        match s.from {
            Some(FromItem::Function {
                alias,
                column_alias,
                ..
            }) => {
                assert_eq!(alias.as_deref(), Some("s"));
                assert_eq!(column_alias.as_deref(), Some("n"));
            }
            other => panic!("unexpected from clause {:?}", other),
        }
    }

    #[test]
    fn test_parse_casts() {
        let s = parse_select("SELECT $1::int8, CAST(2 AS double precision) AS d");
        match &s.columns[0] {
            SelectItem::Expr { expr, .. } => assert!(matches!(
                expr,
                Expr::Cast {
                    target: TypeTag::Int8,
                    ..
                }
            )),
            other => panic!("unexpected select item {:?}", other),
        }
        match &s.columns[1] {
            SelectItem::Expr { expr, alias } => {
                assert_eq!(alias.as_deref(), Some("d"));
                assert!(matches!(
                    expr,
                    Expr::Cast {
                        target: TypeTag::Float8,
                        ..
                    }
                ));
            }
            other => panic!("unexpected select item {:?}", other),
        }
    }

    #[test]
    fn test_parse_where_order_limit() {
        let s = parse_select(
            "SELECT i FROM generate_series(1, 10) i WHERE i % 2 = 0 ORDER BY i DESC LIMIT 3 OFFSET 1",
        );
        assert!(s.where_clause.is_some());
        assert_eq!(s.order_by.len(), 1);
        assert!(!s.order_by[0].ascending);
        assert_eq!(s.limit, Some(Expr::Literal(Literal::Integer(3))));
        assert_eq!(s.offset, Some(Expr::Literal(Literal::Integer(1))));
    }

    #[test]
    fn test_parse_case() {
        let s = parse_select("SELECT CASE WHEN $1 IS NULL THEN 'none' ELSE 'some' END");
        match &s.columns[0] {
            SelectItem::Expr { expr, .. } => assert!(matches!(expr, Expr::Case { .. })),
            other => panic!("unexpected select item {:?}", other),
        }
    }

    #[test]
    fn test_parse_precedence() {
        let s = parse_select("SELECT 1 + 2 * 3 - 4, NOT $1 OR $2 AND $3 IS NOT NULL");
        let exprs: Vec<&Expr> = s
            .columns
            .iter()
            .map(|item| match item {
                SelectItem::Expr { expr, .. } => expr,
                other => panic!("unexpected select item {:?}", other),
            })
            .collect();

        // (1 + (2 * 3)) - 4
        match exprs[0] {
            Expr::BinaryOp {
                left,
                op: BinaryOperator::Sub,
                ..
            } => assert!(matches!(
                &**left,
                Expr::BinaryOp {
                    op: BinaryOperator::Add,
                    right,
                    ..
                } if matches!(&**right, Expr::BinaryOp { op: BinaryOperator::Mul, .. })
            )),
            other => panic!("unexpected expression {:?}", other),
        }

        // (NOT $1) OR ($2 AND ($3 IS NOT NULL))
        match exprs[1] {
            Expr::BinaryOp {
                left,
                op: BinaryOperator::Or,
                right,
            } => {
                assert!(matches!(
                    &**left,
                    Expr::UnaryOp {
                        op: UnaryOperator::Not,
                        ..
                    }
                ));
                assert!(matches!(
                    &**right,
                    Expr::BinaryOp {
                        op: BinaryOperator::And,
                        ..
                    }
                ));
            }
            other => panic!("unexpected expression {:?}", other),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(Parser::new("SELECT 1 < 2 < 3").unwrap().parse().is_err());
        assert!(Parser::new("UPDATE t SET a = 1").unwrap().parse().is_err());
        assert!(Parser::new("SELECT 1 2").unwrap().parse().is_err());
        assert!(Parser::new("SELECT 1::numeric").unwrap().parse().is_err());
        assert!(Parser::new("SELECT (1").unwrap().parse().is_err());
    }
}
