//! Recursive-descent parser producing side-effecting statements or a
//! [`Query`] AST.
//!
//! Expressions are parsed with binding powers, lowest to highest:
//! OR, AND, NOT, comparison (`= <> < <= > >= ~ !~` and IN), additive,
//! multiplicative, unary minus. The top-level statement terminator is
//! `;` (synthesized at end of input); a subquery's terminator is `)`.

use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::{
    BinaryOp, CallExpr, CaseBranch, Expr, FunctionDecl, InList, RefExpr, Statement, UnaryOp,
};
use crate::error::{Error, Pos, Result};
use crate::functions::FunctionRegistry;
use crate::lexer::{Keyword, Lexer, Token, TokenKind};
use crate::query::{FromClause, FromSource, Limit, OrderItem, Query, SelectItem};
use crate::scope::Scope;
use crate::source::loader::SourceLoader;
use crate::source::Reference;
use crate::value::{Type, Value};

/// The IQL parser over one input script.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    scope: Scope,
    functions: Rc<RefCell<FunctionRegistry>>,
    loader: Rc<dyn SourceLoader>,
}

impl<'a> Parser<'a> {
    /// Creates a parser. Queries it produces capture the given scope,
    /// function registry and loader.
    pub fn new(
        source: &str,
        input: &'a str,
        scope: Scope,
        functions: Rc<RefCell<FunctionRegistry>>,
        loader: Rc<dyn SourceLoader>,
    ) -> Result<Self> {
        let mut lexer = Lexer::new(source, input);
        let current = lexer.next_token()?;
        Ok(Self {
            lexer,
            current,
            scope,
            functions,
            loader,
        })
    }

    /// Parses the next statement, or `None` at end of input. The
    /// statement's `;` terminator is consumed.
    pub fn parse(&mut self) -> Result<Option<Statement>> {
        while self.current.kind == TokenKind::Semicolon {
            self.advance()?;
        }
        if self.current.kind == TokenKind::Eof {
            return Ok(None);
        }
        let statement = self.parse_statement()?;
        self.expect(&TokenKind::Semicolon)?;
        Ok(Some(statement))
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        match self.current.as_keyword() {
            Some(Keyword::Select) => Ok(Statement::Query(Rc::new(self.parse_query()?))),
            Some(Keyword::Declare) => self.parse_declare(),
            Some(Keyword::Set) => self.parse_set(),
            Some(Keyword::Print) => self.parse_print(),
            Some(Keyword::Create) => self.parse_create_function(),
            Some(Keyword::Drop) => self.parse_drop_function(),
            _ => Err(self.unexpected("a statement")),
        }
    }

    fn parse_declare(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Declare)?;
        let name = self.expect_identifier()?;
        let ty = self.parse_type()?;
        Ok(Statement::Declare { name, ty })
    }

    fn parse_set(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Set)?;
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::Eq)?;
        let value = self.parse_expression(0)?;
        Ok(Statement::Set { name, value })
    }

    fn parse_print(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Print)?;
        let mut values = vec![self.parse_expression(0)?];
        while self.consume(&TokenKind::Comma)? {
            values.push(self.parse_expression(0)?);
        }
        Ok(Statement::Print { values })
    }

    fn parse_create_function(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Create)?;
        self.expect_keyword(Keyword::Function)?;
        let name = self.expect_identifier()?;

        self.expect(&TokenKind::LeftParen)?;
        let mut params = Vec::new();
        if self.current.kind != TokenKind::RightParen {
            loop {
                let param = self.expect_identifier()?;
                let ty = self.parse_type()?;
                params.push((param, ty));
                if !self.consume(&TokenKind::Comma)? {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightParen)?;

        self.expect_keyword(Keyword::Returns)?;
        let returns = self.parse_type()?;
        self.consume_keyword(Keyword::As)?;
        self.expect_keyword(Keyword::Begin)?;

        let mut body = Vec::new();
        while self.current.as_keyword() != Some(Keyword::Return) {
            let statement = match self.current.as_keyword() {
                Some(Keyword::Declare) => self.parse_declare()?,
                Some(Keyword::Set) => self.parse_set()?,
                _ => return Err(self.unexpected("DECLARE, SET or RETURN in a function body")),
            };
            self.expect(&TokenKind::Semicolon)?;
            body.push(statement);
        }

        self.expect_keyword(Keyword::Return)?;
        let ret = self.parse_expression(0)?;
        self.consume(&TokenKind::Semicolon)?;
        self.expect_keyword(Keyword::End)?;

        Ok(Statement::CreateFunction(FunctionDecl {
            name,
            params,
            returns,
            body,
            ret,
        }))
    }

    fn parse_drop_function(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Drop)?;
        self.expect_keyword(Keyword::Function)?;
        let if_exists = if self.consume_keyword(Keyword::If)? {
            self.expect_keyword(Keyword::Exists)?;
            true
        } else {
            false
        };
        let name = self.expect_identifier()?;
        Ok(Statement::DropFunction { name, if_exists })
    }

    /// Parses a SELECT query. The terminator (`;` at the top level, `)`
    /// in a subquery) is left for the caller.
    fn parse_query(&mut self) -> Result<Query> {
        self.expect_keyword(Keyword::Select)?;

        let mut select = Vec::new();
        if self.consume(&TokenKind::Star)? {
            // SELECT * leaves the list empty; the evaluator expands it.
        } else {
            loop {
                let expr = self.parse_expression(0)?;
                let alias = if self.consume_keyword(Keyword::As)? {
                    Some(self.expect_identifier()?)
                } else {
                    None
                };
                select.push(SelectItem { expr, alias });
                if !self.consume(&TokenKind::Comma)? {
                    break;
                }
            }
        }

        let into = if self.consume_keyword(Keyword::Into)? {
            Some(self.expect_identifier()?)
        } else {
            None
        };

        let mut from = Vec::new();
        if self.consume_keyword(Keyword::From)? {
            loop {
                from.push(self.parse_from_clause()?);
                if !self.consume(&TokenKind::Comma)? {
                    break;
                }
            }
        }

        let where_clause = if self.consume_keyword(Keyword::Where)? {
            Some(self.parse_expression(0)?)
        } else {
            None
        };

        let mut group_by = Vec::new();
        if self.consume_keyword(Keyword::Group)? {
            self.expect_keyword(Keyword::By)?;
            loop {
                group_by.push(self.parse_expression(0)?);
                if !self.consume(&TokenKind::Comma)? {
                    break;
                }
            }
        }

        let mut order_by = Vec::new();
        if self.consume_keyword(Keyword::Order)? {
            self.expect_keyword(Keyword::By)?;
            loop {
                let expr = self.parse_expression(0)?;
                let descending = if self.consume_keyword(Keyword::Desc)? {
                    true
                } else {
                    self.consume_keyword(Keyword::Asc)?;
                    false
                };
                order_by.push(OrderItem { expr, descending });
                if !self.consume(&TokenKind::Comma)? {
                    break;
                }
            }
        }

        let limit = if self.consume_keyword(Keyword::Limit)? {
            let first = self.expect_limit_value()?;
            if self.consume(&TokenKind::Comma)? {
                let count = self.expect_limit_value()?;
                Some(Limit {
                    offset: first,
                    count,
                })
            } else {
                Some(Limit {
                    offset: 0,
                    count: first,
                })
            }
        } else {
            None
        };

        Ok(Query::new(
            select,
            from,
            where_clause,
            group_by,
            order_by,
            limit,
            into,
            self.scope.clone(),
            self.functions.clone(),
            self.loader.clone(),
        ))
    }

    fn parse_from_clause(&mut self) -> Result<FromClause> {
        if self.consume(&TokenKind::LeftParen)? {
            let query = self.parse_query()?;
            self.expect(&TokenKind::RightParen)?;
            self.expect_keyword(Keyword::As)?;
            let alias = self.expect_identifier()?;
            return Ok(FromClause {
                source: FromSource::Subquery(Rc::new(query)),
                filter: None,
                alias,
            });
        }

        let pos = self.current.pos.clone();
        let source = match &self.current.kind {
            TokenKind::String(url) => {
                let url = url.clone();
                self.advance()?;
                FromSource::Url(url)
            }
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance()?;
                FromSource::Reference(name)
            }
            _ => return Err(self.unexpected("a source string, identifier or subquery")),
        };

        let filter = if self.consume_keyword(Keyword::Filter)? {
            match &self.current.kind {
                TokenKind::String(filter) => {
                    let filter = filter.clone();
                    self.advance()?;
                    Some(filter)
                }
                _ => return Err(self.unexpected("a FILTER string")),
            }
        } else {
            None
        };

        let alias = if self.consume_keyword(Keyword::As)? {
            self.expect_identifier()?
        } else {
            match &source {
                // A table-valued identifier aliases as itself.
                FromSource::Reference(name) => name.clone(),
                _ => {
                    return Err(self
                        .lexer
                        .parse_error(pos, "a URL source requires AS alias".to_string()))
                }
            }
        };

        Ok(FromClause {
            source,
            filter,
            alias,
        })
    }

    fn expect_limit_value(&mut self) -> Result<u32> {
        let pos = self.current.pos.clone();
        match self.current.kind {
            TokenKind::Int(value) => {
                self.advance()?;
                u32::try_from(value).map_err(|_| {
                    self.lexer.parse_error(
                        pos,
                        format!("LIMIT value {value} must be a non-negative 32-bit integer"),
                    )
                })
            }
            _ => Err(self.unexpected("a non-negative integer")),
        }
    }

    fn parse_type(&mut self) -> Result<Type> {
        let ty = match self.current.as_keyword() {
            Some(Keyword::Boolean) => Type::Bool,
            Some(Keyword::Integer) => Type::Int,
            Some(Keyword::Real) => Type::Float,
            Some(Keyword::Datetime) => Type::Date,
            Some(Keyword::Varchar) => Type::String,
            _ => return Err(self.unexpected("a type name")),
        };
        self.advance()?;
        Ok(ty)
    }

    // ── Expressions ─────────────────────────────────────────────────────

    fn parse_expression(&mut self, min_bp: u8) -> Result<Expr> {
        let mut lhs = self.parse_prefix()?;

        loop {
            let (l_bp, r_bp) = match self.infix_binding_power() {
                Some(bp) => bp,
                None => break,
            };
            if l_bp < min_bp {
                break;
            }

            match &self.current.kind {
                TokenKind::Keyword(Keyword::And) => {
                    self.advance()?;
                    let rhs = self.parse_expression(r_bp)?;
                    lhs = Expr::And(Box::new(lhs), Box::new(rhs));
                }
                TokenKind::Keyword(Keyword::Or) => {
                    self.advance()?;
                    let rhs = self.parse_expression(r_bp)?;
                    lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
                }
                TokenKind::Keyword(Keyword::In) => {
                    self.advance()?;
                    lhs = self.parse_in_list(lhs, false)?;
                }
                TokenKind::Keyword(Keyword::Not) => {
                    self.advance()?;
                    self.expect_keyword(Keyword::In)?;
                    lhs = self.parse_in_list(lhs, true)?;
                }
                kind => {
                    let op = match kind {
                        TokenKind::Eq => BinaryOp::Eq,
                        TokenKind::Ne => BinaryOp::Ne,
                        TokenKind::Lt => BinaryOp::Lt,
                        TokenKind::Le => BinaryOp::Le,
                        TokenKind::Gt => BinaryOp::Gt,
                        TokenKind::Ge => BinaryOp::Ge,
                        TokenKind::Match => BinaryOp::Match,
                        TokenKind::NotMatch => BinaryOp::NotMatch,
                        TokenKind::Plus => BinaryOp::Add,
                        TokenKind::Minus => BinaryOp::Sub,
                        TokenKind::Star => BinaryOp::Mul,
                        TokenKind::Slash => BinaryOp::Div,
                        _ => break,
                    };
                    self.advance()?;
                    let rhs = self.parse_expression(r_bp)?;
                    lhs = Expr::Binary {
                        op,
                        left: Box::new(lhs),
                        right: Box::new(rhs),
                    };
                }
            }
        }

        Ok(lhs)
    }

    fn infix_binding_power(&self) -> Option<(u8, u8)> {
        match &self.current.kind {
            TokenKind::Keyword(Keyword::Or) => Some((1, 2)),
            TokenKind::Keyword(Keyword::And) => Some((3, 4)),
            TokenKind::Eq
            | TokenKind::Ne
            | TokenKind::Lt
            | TokenKind::Le
            | TokenKind::Gt
            | TokenKind::Ge
            | TokenKind::Match
            | TokenKind::NotMatch
            | TokenKind::Keyword(Keyword::In | Keyword::Not) => Some((7, 8)),
            TokenKind::Plus | TokenKind::Minus => Some((9, 10)),
            TokenKind::Star | TokenKind::Slash => Some((11, 12)),
            _ => None,
        }
    }

    fn parse_in_list(&mut self, lhs: Expr, negated: bool) -> Result<Expr> {
        self.expect(&TokenKind::LeftParen)?;
        let list = if self.current.as_keyword() == Some(Keyword::Select) {
            let query = self.parse_query()?;
            InList::Query(Rc::new(query))
        } else {
            let mut values = Vec::new();
            if self.current.kind != TokenKind::RightParen {
                loop {
                    values.push(self.parse_expression(0)?);
                    if !self.consume(&TokenKind::Comma)? {
                        break;
                    }
                }
            }
            InList::Values(values)
        };
        self.expect(&TokenKind::RightParen)?;
        Ok(Expr::In {
            expr: Box::new(lhs),
            list,
            negated,
        })
    }

    fn parse_prefix(&mut self) -> Result<Expr> {
        if self.consume_keyword(Keyword::Not)? {
            let operand = self.parse_expression(6)?;
            return Ok(Expr::Not(Box::new(operand)));
        }
        if self.consume(&TokenKind::Minus)? {
            let operand = self.parse_expression(13)?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(operand),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match &self.current.kind {
            TokenKind::Int(value) => {
                let value = *value;
                self.advance()?;
                Ok(Expr::Constant(Value::Int(value)))
            }
            TokenKind::Float(value) => {
                let value = *value;
                self.advance()?;
                Ok(Expr::Constant(Value::Float(value)))
            }
            TokenKind::String(value) => {
                let value = value.clone();
                self.advance()?;
                Ok(Expr::Constant(Value::String(value)))
            }
            TokenKind::Bool(value) => {
                let value = *value;
                self.advance()?;
                Ok(Expr::Constant(Value::Bool(value)))
            }
            TokenKind::Null => {
                self.advance()?;
                Ok(Expr::Constant(Value::Null))
            }
            TokenKind::LeftParen => {
                self.advance()?;
                let expr = self.parse_expression(0)?;
                self.expect(&TokenKind::RightParen)?;
                Ok(expr)
            }
            TokenKind::Keyword(Keyword::Cast) => self.parse_cast(),
            TokenKind::Keyword(Keyword::Case) => self.parse_case(),
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance()?;

                if self.current.kind == TokenKind::LeftParen {
                    self.advance()?;
                    let mut args = Vec::new();
                    if self.current.kind != TokenKind::RightParen {
                        loop {
                            args.push(self.parse_expression(0)?);
                            if !self.consume(&TokenKind::Comma)? {
                                break;
                            }
                        }
                    }
                    self.expect(&TokenKind::RightParen)?;
                    return Ok(Expr::Call(CallExpr::new(&name, args)));
                }

                if self.consume(&TokenKind::Dot)? {
                    let column = self.expect_identifier()?;
                    return Ok(Expr::Reference(RefExpr::new(Reference::qualified(
                        name, column,
                    ))));
                }
                Ok(Expr::Reference(RefExpr::new(Reference::new(name))))
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn parse_cast(&mut self) -> Result<Expr> {
        self.expect_keyword(Keyword::Cast)?;
        self.expect(&TokenKind::LeftParen)?;
        let expr = self.parse_expression(0)?;
        self.expect_keyword(Keyword::As)?;
        let ty = self.parse_type()?;
        self.expect(&TokenKind::RightParen)?;
        Ok(Expr::Cast {
            expr: Box::new(expr),
            ty,
        })
    }

    fn parse_case(&mut self) -> Result<Expr> {
        self.expect_keyword(Keyword::Case)?;

        let input = if self.current.as_keyword() == Some(Keyword::When) {
            None
        } else {
            Some(Box::new(self.parse_expression(0)?))
        };

        let mut branches = Vec::new();
        while self.consume_keyword(Keyword::When)? {
            let when = self.parse_expression(0)?;
            self.expect_keyword(Keyword::Then)?;
            let then = self.parse_expression(0)?;
            branches.push(CaseBranch { when, then });
        }

        let default = if self.consume_keyword(Keyword::Else)? {
            Some(Box::new(self.parse_expression(0)?))
        } else {
            None
        };

        self.expect_keyword(Keyword::End)?;
        Ok(Expr::Case {
            input,
            branches,
            default,
        })
    }

    // ── Token helpers ───────────────────────────────────────────────────

    fn advance(&mut self) -> Result<()> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn consume(&mut self, kind: &TokenKind) -> Result<bool> {
        if &self.current.kind == kind {
            self.advance()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn consume_keyword(&mut self, keyword: Keyword) -> Result<bool> {
        if self.current.as_keyword() == Some(keyword) {
            self.advance()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<()> {
        if &self.current.kind == kind {
            self.advance()?;
            return Ok(());
        }
        Err(self.unexpected(&kind.to_string()))
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<()> {
        if self.current.as_keyword() == Some(keyword) {
            self.advance()?;
            return Ok(());
        }
        Err(self.unexpected(keyword.as_str()))
    }

    fn expect_identifier(&mut self) -> Result<String> {
        match &self.current.kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance()?;
                Ok(name)
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    fn unexpected(&self, expected: &str) -> Error {
        let pos: Pos = self.current.pos.clone();
        self.lexer
            .parse_error(pos, format!("expected {expected}, found {}", self.current.kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::loader::NullLoader;

    fn parser(input: &str) -> Parser<'_> {
        Parser::new(
            "test",
            input,
            Scope::new(),
            Rc::new(RefCell::new(FunctionRegistry::new())),
            Rc::new(NullLoader),
        )
        .unwrap()
    }

    fn parse_one(input: &str) -> Statement {
        parser(input).parse().unwrap().unwrap()
    }

    fn parse_query(input: &str) -> Rc<Query> {
        match parse_one(input) {
            Statement::Query(query) => query,
            _ => panic!("expected a query"),
        }
    }

    #[test]
    fn test_select_without_terminator_parses() {
        // The lexer synthesizes the trailing ';'.
        let query = parse_query("SELECT 1 AS N");
        assert_eq!(query.select.borrow().len(), 1);
        assert_eq!(query.select.borrow()[0].alias.as_deref(), Some("N"));
    }

    #[test]
    fn test_select_star_leaves_list_empty() {
        let query = parse_query("SELECT * FROM 'x.csv' AS t;");
        assert!(query.select.borrow().is_empty());
        assert_eq!(query.from.len(), 1);
    }

    #[test]
    fn test_precedence() {
        let query = parse_query("SELECT 1 + 2 * 3;");
        let select = query.select.borrow();
        assert_eq!(select[0].expr.to_string(), "1 + 2 * 3");
        let Expr::Binary { op, right, .. } = &select[0].expr else {
            panic!("expected a binary expression");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            right.as_ref(),
            Expr::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn test_not_and_comparison_precedence() {
        // NOT binds looser than comparison: NOT (1 = 2).
        let query = parse_query("SELECT NOT 1 = 2;");
        let select = query.select.borrow();
        assert!(matches!(&select[0].expr, Expr::Not(inner)
            if matches!(inner.as_ref(), Expr::Binary { op: BinaryOp::Eq, .. })));
    }

    #[test]
    fn test_and_or_precedence() {
        let query = parse_query("SELECT TRUE OR FALSE AND FALSE;");
        let select = query.select.borrow();
        assert!(matches!(&select[0].expr, Expr::Or(_, rhs)
            if matches!(rhs.as_ref(), Expr::And(_, _))));
    }

    #[test]
    fn test_from_clause_shapes() {
        let query = parse_query(
            "SELECT a.X FROM 'u.csv' FILTER 'noheaders' AS a, (SELECT 1 AS Y) AS b, bound;",
        );
        assert_eq!(query.from.len(), 3);
        assert!(matches!(&query.from[0].source, FromSource::Url(u) if u == "u.csv"));
        assert_eq!(query.from[0].filter.as_deref(), Some("noheaders"));
        assert_eq!(query.from[0].alias, "a");
        assert!(matches!(&query.from[1].source, FromSource::Subquery(_)));
        // A bound identifier aliases as itself.
        assert!(matches!(&query.from[2].source, FromSource::Reference(n) if n == "bound"));
        assert_eq!(query.from[2].alias, "bound");
    }

    #[test]
    fn test_url_source_requires_alias() {
        assert!(parser("SELECT X FROM 'u.csv';").parse().is_err());
    }

    #[test]
    fn test_where_group_order_limit() {
        let query = parse_query(
            "SELECT Name FROM t WHERE Count > 1 GROUP BY Name ORDER BY Name DESC, Count LIMIT 2, 5;",
        );
        assert!(query.where_clause.is_some());
        assert_eq!(query.group_by.len(), 1);
        assert_eq!(query.order_by.len(), 2);
        assert!(query.order_by[0].descending);
        assert!(!query.order_by[1].descending);
        let limit = query.limit.unwrap();
        assert_eq!((limit.offset, limit.count), (2, 5));
    }

    #[test]
    fn test_limit_without_offset() {
        let query = parse_query("SELECT X FROM t LIMIT 7;");
        let limit = query.limit.unwrap();
        assert_eq!((limit.offset, limit.count), (0, 7));
    }

    #[test]
    fn test_limit_rejects_negative() {
        assert!(parser("SELECT X FROM t LIMIT -1;").parse().is_err());
    }

    #[test]
    fn test_into() {
        let query = parse_query("SELECT 1 AS N INTO result;");
        assert_eq!(query.into.as_deref(), Some("result"));
    }

    #[test]
    fn test_qualified_reference_with_quoted_selector() {
        let query = parse_query("SELECT t.\"td:nth-child(2)\" AS Name FROM t;");
        let select = query.select.borrow();
        let Expr::Reference(r) = &select[0].expr else {
            panic!("expected a reference");
        };
        assert_eq!(r.reference.source.as_deref(), Some("t"));
        assert_eq!(r.reference.column, "td:nth-child(2)");
    }

    #[test]
    fn test_in_expressions() {
        let query = parse_query("SELECT 1 IN (1, 2), 3 NOT IN (SELECT X FROM t);");
        let select = query.select.borrow();
        assert!(matches!(
            &select[0].expr,
            Expr::In {
                negated: false,
                list: InList::Values(v),
                ..
            } if v.len() == 2
        ));
        assert!(matches!(
            &select[1].expr,
            Expr::In {
                negated: true,
                list: InList::Query(_),
                ..
            }
        ));
    }

    #[test]
    fn test_case_and_cast() {
        let query =
            parse_query("SELECT CASE X WHEN 1 THEN 'one' ELSE 'many' END, CAST('1' AS INTEGER);");
        let select = query.select.borrow();
        assert!(matches!(&select[0].expr, Expr::Case { input: Some(_), .. }));
        assert!(matches!(
            &select[1].expr,
            Expr::Cast { ty: Type::Int, .. }
        ));
    }

    #[test]
    fn test_declare_set_print() {
        assert!(matches!(
            parse_one("DECLARE x INTEGER;"),
            Statement::Declare { ty: Type::Int, .. }
        ));
        assert!(matches!(parse_one("SET x = 1 + 2;"), Statement::Set { .. }));
        assert!(matches!(
            parse_one("PRINT 'a', 1;"),
            Statement::Print { values } if values.len() == 2
        ));
    }

    #[test]
    fn test_create_and_drop_function() {
        let statement = parse_one(
            "CREATE FUNCTION add(a INTEGER, b INTEGER) RETURNS INTEGER BEGIN RETURN a + b END;",
        );
        let Statement::CreateFunction(decl) = statement else {
            panic!("expected CREATE FUNCTION");
        };
        assert_eq!(decl.name, "add");
        assert_eq!(decl.params.len(), 2);
        assert_eq!(decl.returns, Type::Int);
        assert!(decl.body.is_empty());

        let statement = parse_one(
            "CREATE FUNCTION f(x REAL) RETURNS REAL AS BEGIN DECLARE y REAL; SET y = x * 2.0; RETURN y; END;",
        );
        let Statement::CreateFunction(decl) = statement else {
            panic!("expected CREATE FUNCTION");
        };
        assert_eq!(decl.body.len(), 2);

        assert!(matches!(
            parse_one("DROP FUNCTION IF EXISTS add;"),
            Statement::DropFunction {
                if_exists: true,
                ..
            }
        ));
        assert!(matches!(
            parse_one("DROP FUNCTION add;"),
            Statement::DropFunction {
                if_exists: false,
                ..
            }
        ));
    }

    #[test]
    fn test_multiple_statements() {
        let mut p = parser("DECLARE x INTEGER; SET x = 1; SELECT x;");
        assert!(matches!(p.parse().unwrap(), Some(Statement::Declare { .. })));
        assert!(matches!(p.parse().unwrap(), Some(Statement::Set { .. })));
        assert!(matches!(p.parse().unwrap(), Some(Statement::Query(_))));
        assert!(p.parse().unwrap().is_none());
    }

    #[test]
    fn test_parse_error_has_position() {
        let err = parser("SELECT FROM;").parse().unwrap_err();
        let Error::Parse(err) = err else {
            panic!("expected a parse error");
        };
        assert_eq!(err.pos.line, 1);
        assert_eq!(err.pos.column, 8);
        assert_eq!(err.line_text, "SELECT FROM;");
    }
}
