//! Baseline Lua 5.2 parser.
//!
//! Recursive descent over a [`TokenStream`], producing the tagged tree
//! vocabulary of [`crate::tree`]. Binary operators use the reference priority
//! table (`or` < `and` < comparison < `..` < `+ -` < `* / %` < unary < `^`).
//!
//! A few surface forms are normalized so that every tree produced here can be
//! rendered back and re-read to the same tree:
//!
//! - parentheses are kept as a `Paren` node only around calls, method calls
//!   and `...`, where they truncate multiple results;
//! - `a ~= b` reads as `not (a == b)`;
//! - `a > b` and `a >= b` read as `b < a` and `b <= a`.

use crate::lexer::{Token, TokenKind, TokenStream};
use crate::traits::ReadError;
use crate::tree::{Block, Span, Tag, Term};

type ParseResult<T> = Result<T, ReadError>;

/// Priority of unary operators.
const UNARY_PRIORITY: u8 = 8;

/// Deepest tree the parser builds. Every later stage walks the tree
/// recursively, so the bound also holds their native stack use.
pub const MAX_SYNTAX_DEPTH: usize = 200;

/// Parse a whole chunk.
pub fn parse(tokens: &TokenStream) -> ParseResult<Block> {
    let mut parser = Parser::new(tokens.tokens());
    let block = parser.block()?;
    if *parser.kind() != TokenKind::Eof {
        return Err(parser.error_near("'<eof>' expected"));
    }
    Ok(block)
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    prev_span: Span,
    depth: usize,
}

impl<'t> Parser<'t> {
    fn new(tokens: &'t [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            prev_span: Span::new(0, 0, 1),
            depth: 0,
        }
    }

    /// One level deeper into the tree. Callers release it with `leave`.
    fn enter(&mut self) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > MAX_SYNTAX_DEPTH {
            return Err(ReadError::Parse {
                line: self.line(),
                message: "chunk has too many syntax levels".into(),
            });
        }
        Ok(())
    }

    fn leave(&mut self, levels: usize) {
        self.depth -= levels;
    }

    // A `TokenStream` always ends with `Eof` and the cursor never moves past it.
    fn token(&self) -> &'t Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn kind(&self) -> &'t TokenKind {
        &self.token().kind
    }

    fn lookahead(&self) -> &'t TokenKind {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)].kind
    }

    fn line(&self) -> u32 {
        self.token().span.line
    }

    fn advance(&mut self) -> &'t Token {
        let token = self.token();
        self.prev_span = token.span;
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check(&mut self, kind: &TokenKind) -> bool {
        if self.kind() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<()> {
        if self.check(&kind) {
            Ok(())
        } else {
            Err(self.error_near(format!("'{}' expected", kind.as_str())))
        }
    }

    /// Expect the token closing a construct opened by `opener` at `line`.
    fn expect_closing(&mut self, closer: TokenKind, opener: TokenKind, line: u32) -> ParseResult<()> {
        if self.check(&closer) {
            return Ok(());
        }
        if line == self.line() {
            Err(self.error_near(format!("'{}' expected", closer.as_str())))
        } else {
            Err(self.error_near(format!(
                "'{}' expected (to close '{}' at line {line})",
                closer.as_str(),
                opener.as_str()
            )))
        }
    }

    fn expect_name(&mut self) -> ParseResult<String> {
        match self.kind() {
            TokenKind::Name(name) => {
                self.advance();
                Ok(name.clone())
            }
            _ => Err(self.error_near("<name> expected")),
        }
    }

    fn error_near(&self, message: impl AsRef<str>) -> ReadError {
        ReadError::Parse {
            line: self.line(),
            message: format!("{} near {}", message.as_ref(), self.kind()),
        }
    }

    /// Span from `start` to the last consumed token.
    fn span_from(&self, start: Span) -> Span {
        start.to(self.prev_span)
    }

    fn block_follows(&self, with_until: bool) -> bool {
        match self.kind() {
            TokenKind::Else | TokenKind::Elseif | TokenKind::End | TokenKind::Eof => true,
            TokenKind::Until => with_until,
            _ => false,
        }
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    fn block(&mut self) -> ParseResult<Block> {
        self.enter()?;
        let mut statements = Vec::new();
        while !self.block_follows(true) {
            match self.kind() {
                TokenKind::Semicolon => {
                    self.advance();
                }
                TokenKind::Return => {
                    statements.push(self.return_statement()?);
                    break;
                }
                _ => statements.push(self.statement()?),
            }
        }
        self.leave(1);
        Ok(statements)
    }

    fn statement(&mut self) -> ParseResult<Term> {
        let start = self.token().span;
        let stat = match self.kind() {
            TokenKind::If => self.if_statement()?,
            TokenKind::While => {
                let line = self.line();
                self.advance();
                let cond = self.expression()?;
                self.expect(TokenKind::Do)?;
                let body = self.block()?;
                self.expect_closing(TokenKind::End, TokenKind::While, line)?;
                Term::while_loop(cond, body)
            }
            TokenKind::Do => {
                let line = self.line();
                self.advance();
                let body = self.block()?;
                self.expect_closing(TokenKind::End, TokenKind::Do, line)?;
                Term::do_block(body)
            }
            TokenKind::For => self.for_statement()?,
            TokenKind::Repeat => {
                let line = self.line();
                self.advance();
                let body = self.block()?;
                self.expect_closing(TokenKind::Until, TokenKind::Repeat, line)?;
                let cond = self.expression()?;
                Term::repeat(body, cond)
            }
            TokenKind::Function => self.function_statement()?,
            TokenKind::Local => {
                self.advance();
                if self.check(&TokenKind::Function) {
                    let name_span = self.token().span;
                    let name = Term::id(self.expect_name()?).with_span(name_span);
                    let function = self.function_body(start, false)?;
                    Term::localrec(name, function)
                } else {
                    self.local_statement()?
                }
            }
            TokenKind::DoubleColon => {
                self.advance();
                let name = self.expect_name()?;
                self.expect(TokenKind::DoubleColon)?;
                Term::label(name)
            }
            TokenKind::Break => {
                self.advance();
                Term::break_stmt()
            }
            TokenKind::Goto => {
                self.advance();
                Term::goto(self.expect_name()?)
            }
            _ => self.expression_statement()?,
        };
        Ok(stat.with_span(self.span_from(start)))
    }

    fn if_statement(&mut self) -> ParseResult<Term> {
        let line = self.line();
        let mut clauses = Vec::new();
        let mut otherwise = None;

        // `if` or `elseif`
        loop {
            self.advance();
            let cond = self.expression()?;
            self.expect(TokenKind::Then)?;
            let body = self.block()?;
            clauses.push((cond, body));
            if *self.kind() != TokenKind::Elseif {
                break;
            }
        }
        if self.check(&TokenKind::Else) {
            otherwise = Some(self.block()?);
        }
        self.expect_closing(TokenKind::End, TokenKind::If, line)?;
        Ok(Term::if_chain(clauses, otherwise))
    }

    fn for_statement(&mut self) -> ParseResult<Term> {
        let line = self.line();
        self.advance();
        let first_span = self.token().span;
        let first = Term::id(self.expect_name()?).with_span(first_span);

        let stat = match self.kind() {
            TokenKind::Assign => {
                self.advance();
                let from = self.expression()?;
                self.expect(TokenKind::Comma)?;
                let to = self.expression()?;
                let step = if self.check(&TokenKind::Comma) {
                    Some(self.expression()?)
                } else {
                    None
                };
                self.expect(TokenKind::Do)?;
                let body = self.block()?;
                Term::fornum(first, from, to, step, body)
            }
            TokenKind::Comma | TokenKind::In => {
                let mut names = vec![first];
                while self.check(&TokenKind::Comma) {
                    let span = self.token().span;
                    names.push(Term::id(self.expect_name()?).with_span(span));
                }
                self.expect(TokenKind::In)?;
                let exprs = self.expression_list()?;
                self.expect(TokenKind::Do)?;
                let body = self.block()?;
                Term::forin(names, exprs, body)
            }
            _ => return Err(self.error_near("'=' or 'in' expected")),
        };
        self.expect_closing(TokenKind::End, TokenKind::For, line)?;
        Ok(stat)
    }

    /// `function a.b.c:m (params) body end`
    fn function_statement(&mut self) -> ParseResult<Term> {
        let start = self.token().span;
        self.advance();

        let name_span = self.token().span;
        let mut target = Term::id(self.expect_name()?).with_span(name_span);
        let mut is_method = false;
        while matches!(self.kind(), TokenKind::Dot | TokenKind::Colon) {
            is_method = *self.kind() == TokenKind::Colon;
            self.advance();
            let key = Term::string(self.expect_name()?).with_span(self.prev_span);
            target = Term::index(target, key).with_span(self.span_from(name_span));
            if is_method {
                break;
            }
        }

        let function = self.function_body(start, is_method)?;
        Ok(Term::set(vec![target], vec![function]))
    }

    fn local_statement(&mut self) -> ParseResult<Term> {
        let mut names = Vec::new();
        loop {
            let span = self.token().span;
            names.push(Term::id(self.expect_name()?).with_span(span));
            if !self.check(&TokenKind::Comma) {
                break;
            }
        }
        let values = if self.check(&TokenKind::Assign) {
            self.expression_list()?
        } else {
            Vec::new()
        };
        Ok(Term::local(names, values))
    }

    fn return_statement(&mut self) -> ParseResult<Term> {
        let start = self.token().span;
        self.advance();
        let values = if self.block_follows(true) || *self.kind() == TokenKind::Semicolon {
            Vec::new()
        } else {
            self.expression_list()?
        };
        self.check(&TokenKind::Semicolon);
        if !self.block_follows(true) {
            return Err(self.error_near("'<eof>' expected"));
        }
        Ok(Term::ret(values).with_span(self.span_from(start)))
    }

    fn expression_statement(&mut self) -> ParseResult<Term> {
        let first = self.suffixed_expression()?;
        if matches!(self.kind(), TokenKind::Assign | TokenKind::Comma) {
            let mut targets = vec![first];
            while self.check(&TokenKind::Comma) {
                targets.push(self.suffixed_expression()?);
            }
            if targets.iter().any(|t| !is_assignable(t)) {
                return Err(self.error_near("syntax error"));
            }
            self.expect(TokenKind::Assign)?;
            let values = self.expression_list()?;
            return Ok(Term::set(targets, values));
        }
        if matches!(first.tag(), Some(Tag::Call | Tag::Invoke)) {
            Ok(first)
        } else {
            Err(self.error_near("syntax error"))
        }
    }

    // ---------------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------------

    fn expression_list(&mut self) -> ParseResult<Vec<Term>> {
        let mut exprs = vec![self.expression()?];
        while self.check(&TokenKind::Comma) {
            exprs.push(self.expression()?);
        }
        Ok(exprs)
    }

    fn expression(&mut self) -> ParseResult<Term> {
        self.subexpression(0)
    }

    /// Operators binding tighter than `limit`.
    fn subexpression(&mut self, limit: u8) -> ParseResult<Term> {
        self.enter()?;
        let mut levels = 1;
        let start = self.token().span;
        let mut left = match unary_operator(self.kind()) {
            Some(op) => {
                self.advance();
                let operand = self.subexpression(UNARY_PRIORITY)?;
                Term::unop(op, operand).with_span(self.span_from(start))
            }
            None => self.simple_expression()?,
        };

        while let Some((op, left_priority, right_priority)) = binary_operator(self.kind()) {
            if left_priority <= limit {
                break;
            }
            // a left operand chain nests without recursing
            self.enter()?;
            levels += 1;
            self.advance();
            let right = self.subexpression(right_priority)?;
            left = build_binary(op, left, right).with_span(self.span_from(start));
        }
        self.leave(levels);
        Ok(left)
    }

    fn simple_expression(&mut self) -> ParseResult<Term> {
        let start = self.token().span;
        let expr = match self.kind() {
            TokenKind::Number(n) => Term::number(*n),
            TokenKind::Str(s) => Term::string(s.clone()),
            TokenKind::Nil => Term::nil(),
            TokenKind::True => Term::boolean(true),
            TokenKind::False => Term::boolean(false),
            TokenKind::Ellipsis => Term::dots(),
            TokenKind::LBrace => return self.table_constructor(),
            TokenKind::Function => {
                self.advance();
                return self.function_body(start, false);
            }
            _ => return self.suffixed_expression(),
        };
        self.advance();
        Ok(expr.with_span(start))
    }

    fn primary_expression(&mut self) -> ParseResult<Term> {
        let start = self.token().span;
        match self.kind() {
            TokenKind::Name(name) => {
                self.advance();
                Ok(Term::id(name.clone()).with_span(start))
            }
            TokenKind::LParen => {
                let line = self.line();
                self.advance();
                let inner = self.expression()?;
                self.expect_closing(TokenKind::RParen, TokenKind::LParen, line)?;
                if matches!(inner.tag(), Some(Tag::Call | Tag::Invoke | Tag::Dots)) {
                    Ok(Term::paren(inner).with_span(self.span_from(start)))
                } else {
                    Ok(inner)
                }
            }
            _ => Err(self.error_near("unexpected symbol")),
        }
    }

    fn suffixed_expression(&mut self) -> ParseResult<Term> {
        let start = self.token().span;
        let mut expr = self.primary_expression()?;
        let mut levels = 0;
        loop {
            if matches!(
                self.kind(),
                TokenKind::Dot
                    | TokenKind::LBracket
                    | TokenKind::Colon
                    | TokenKind::LParen
                    | TokenKind::Str(_)
                    | TokenKind::LBrace
            ) {
                self.enter()?;
                levels += 1;
            }
            expr = match self.kind() {
                TokenKind::Dot => {
                    self.advance();
                    let key = Term::string(self.expect_name()?).with_span(self.prev_span);
                    Term::index(expr, key)
                }
                TokenKind::LBracket => {
                    self.advance();
                    let key = self.expression()?;
                    self.expect(TokenKind::RBracket)?;
                    Term::index(expr, key)
                }
                TokenKind::Colon => {
                    self.advance();
                    let method = self.expect_name()?;
                    let args = self.call_arguments()?;
                    Term::invoke(expr, method, args)
                }
                TokenKind::LParen | TokenKind::Str(_) | TokenKind::LBrace => {
                    let args = self.call_arguments()?;
                    Term::call(expr, args)
                }
                _ => {
                    self.leave(levels);
                    return Ok(expr);
                }
            }
            .with_span(self.span_from(start));
        }
    }

    fn call_arguments(&mut self) -> ParseResult<Vec<Term>> {
        let start = self.token().span;
        match self.kind() {
            TokenKind::Str(s) => {
                self.advance();
                Ok(vec![Term::string(s.clone()).with_span(start)])
            }
            TokenKind::LBrace => Ok(vec![self.table_constructor()?]),
            TokenKind::LParen => {
                let line = self.line();
                self.advance();
                let args = if *self.kind() == TokenKind::RParen {
                    Vec::new()
                } else {
                    self.expression_list()?
                };
                self.expect_closing(TokenKind::RParen, TokenKind::LParen, line)?;
                Ok(args)
            }
            _ => Err(self.error_near("function arguments expected")),
        }
    }

    fn table_constructor(&mut self) -> ParseResult<Term> {
        let start = self.token().span;
        let line = self.line();
        self.expect(TokenKind::LBrace)?;
        self.enter()?;
        let mut items = Vec::new();
        while *self.kind() != TokenKind::RBrace {
            let item_start = self.token().span;
            let item = match (self.kind(), self.lookahead()) {
                (TokenKind::LBracket, _) => {
                    self.advance();
                    let key = self.expression()?;
                    self.expect(TokenKind::RBracket)?;
                    self.expect(TokenKind::Assign)?;
                    let value = self.expression()?;
                    Term::pair(key, value).with_span(self.span_from(item_start))
                }
                (TokenKind::Name(name), TokenKind::Assign) => {
                    self.advance();
                    let key = Term::string(name.clone()).with_span(item_start);
                    self.advance();
                    let value = self.expression()?;
                    Term::pair(key, value).with_span(self.span_from(item_start))
                }
                _ => self.expression()?,
            };
            items.push(item);
            if !self.check(&TokenKind::Comma) && !self.check(&TokenKind::Semicolon) {
                break;
            }
        }
        self.expect_closing(TokenKind::RBrace, TokenKind::LBrace, line)?;
        self.leave(1);
        Ok(Term::table(items).with_span(self.span_from(start)))
    }

    /// Parameter list and body, after the `function` keyword and name.
    fn function_body(&mut self, start: Span, is_method: bool) -> ParseResult<Term> {
        let line = start.line;
        let mut params = Vec::new();
        if is_method {
            params.push(Term::id("self"));
        }

        self.expect(TokenKind::LParen)?;
        if *self.kind() != TokenKind::RParen {
            loop {
                let span = self.token().span;
                match self.kind() {
                    TokenKind::Name(name) => {
                        self.advance();
                        params.push(Term::id(name.clone()).with_span(span));
                    }
                    TokenKind::Ellipsis => {
                        self.advance();
                        params.push(Term::dots().with_span(span));
                        break;
                    }
                    _ => return Err(self.error_near("<name> expected")),
                }
                if !self.check(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;

        let body = self.block()?;
        self.expect_closing(TokenKind::End, TokenKind::Function, line)?;
        Ok(Term::function(params, body).with_span(self.span_from(start)))
    }
}

fn is_assignable(term: &Term) -> bool {
    matches!(term.tag(), Some(Tag::Id | Tag::Index))
}

fn unary_operator(kind: &TokenKind) -> Option<&'static str> {
    match kind {
        TokenKind::Not => Some("not"),
        TokenKind::Minus => Some("unm"),
        TokenKind::Hash => Some("len"),
        _ => None,
    }
}

/// Operator token, left priority, right priority.
fn binary_operator(kind: &TokenKind) -> Option<(&'static str, u8, u8)> {
    let entry = match kind {
        TokenKind::Or => ("or", 1, 1),
        TokenKind::And => ("and", 2, 2),
        TokenKind::Lt => ("<", 3, 3),
        TokenKind::Gt => (">", 3, 3),
        TokenKind::LtEq => ("<=", 3, 3),
        TokenKind::GtEq => (">=", 3, 3),
        TokenKind::NotEq => ("~=", 3, 3),
        TokenKind::EqEq => ("==", 3, 3),
        TokenKind::Concat => ("..", 5, 4),
        TokenKind::Plus => ("+", 6, 6),
        TokenKind::Minus => ("-", 6, 6),
        TokenKind::Star => ("*", 7, 7),
        TokenKind::Slash => ("/", 7, 7),
        TokenKind::Percent => ("%", 7, 7),
        TokenKind::Caret => ("^", 10, 9),
        _ => return None,
    };
    Some(entry)
}

fn build_binary(op: &str, left: Term, right: Term) -> Term {
    match op {
        "or" => Term::binop("or", left, right),
        "and" => Term::binop("and", left, right),
        "<" => Term::binop("lt", left, right),
        ">" => Term::binop("lt", right, left),
        "<=" => Term::binop("le", left, right),
        ">=" => Term::binop("le", right, left),
        "==" => Term::binop("eq", left, right),
        "~=" => Term::unop("not", Term::binop("eq", left, right)),
        ".." => Term::binop("concat", left, right),
        "+" => Term::binop("add", left, right),
        "-" => Term::binop("sub", left, right),
        "*" => Term::binop("mul", left, right),
        "/" => Term::binop("div", left, right),
        "%" => Term::binop("mod", left, right),
        _ => Term::binop("pow", left, right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::structure_eq::StructureEq;

    fn read(source: &str) -> Block {
        parse(&lex(source).unwrap()).unwrap()
    }

    fn read_err(source: &str) -> ReadError {
        parse(&lex(source).unwrap()).unwrap_err()
    }

    fn assert_reads(source: &str, expected: Vec<Term>) {
        let block = read(source);
        assert!(
            block.structure_eq(&expected),
            "{source}\n got: {block:?}\n expected: {expected:?}"
        );
    }

    #[test]
    fn test_local_and_assignment() {
        assert_reads(
            "local a, b = 1; a, b = b, a",
            vec![
                Term::local(
                    vec![Term::id("a"), Term::id("b")],
                    vec![Term::number(1)],
                ),
                Term::set(
                    vec![Term::id("a"), Term::id("b")],
                    vec![Term::id("b"), Term::id("a")],
                ),
            ],
        );
    }

    #[test]
    fn test_operator_priorities() {
        assert_reads(
            "return 1 + 2 * 3 ^ 2 ^ 0.5",
            vec![Term::ret(vec![Term::binop(
                "add",
                Term::number(1),
                Term::binop(
                    "mul",
                    Term::number(2),
                    Term::binop(
                        "pow",
                        Term::number(3),
                        Term::binop("pow", Term::number(2), Term::number(0.5)),
                    ),
                ),
            )])],
        );
    }

    #[test]
    fn test_unary_binds_looser_than_pow() {
        assert_reads(
            "return -x ^ 2, not a == b",
            vec![Term::ret(vec![
                Term::unop("unm", Term::binop("pow", Term::id("x"), Term::number(2))),
                Term::binop("eq", Term::unop("not", Term::id("a")), Term::id("b")),
            ])],
        );
    }

    #[test]
    fn test_concat_is_right_associative() {
        assert_reads(
            "return a .. b .. c",
            vec![Term::ret(vec![Term::binop(
                "concat",
                Term::id("a"),
                Term::binop("concat", Term::id("b"), Term::id("c")),
            )])],
        );
    }

    #[test]
    fn test_comparison_normalization() {
        assert_reads(
            "return a ~= b, a > b, a >= b",
            vec![Term::ret(vec![
                Term::unop("not", Term::binop("eq", Term::id("a"), Term::id("b"))),
                Term::binop("lt", Term::id("b"), Term::id("a")),
                Term::binop("le", Term::id("b"), Term::id("a")),
            ])],
        );
    }

    #[test]
    fn test_parens_kept_only_where_they_matter() {
        assert_reads(
            "return (a + b) * c, (f()), (...)",
            vec![Term::ret(vec![
                Term::binop(
                    "mul",
                    Term::binop("add", Term::id("a"), Term::id("b")),
                    Term::id("c"),
                ),
                Term::paren(Term::call(Term::id("f"), vec![])),
                Term::paren(Term::dots()),
            ])],
        );
    }

    #[test]
    fn test_method_definition() {
        assert_reads(
            "function a.b:c(x) return self end",
            vec![Term::set(
                vec![Term::field(Term::field(Term::id("a"), "b"), "c")],
                vec![Term::function(
                    vec![Term::id("self"), Term::id("x")],
                    vec![Term::ret(vec![Term::id("self")])],
                )],
            )],
        );
    }

    #[test]
    fn test_local_function() {
        assert_reads(
            "local function f(...) end",
            vec![Term::localrec(
                Term::id("f"),
                Term::function(vec![Term::dots()], vec![]),
            )],
        );
    }

    #[test]
    fn test_calls_and_invokes() {
        assert_reads(
            "f 'x' t:m{1} g(a)(b)",
            vec![
                Term::call(Term::id("f"), vec![Term::string("x")]),
                Term::invoke(Term::id("t"), "m", vec![Term::table(vec![Term::number(1)])]),
                Term::call(Term::call(Term::id("g"), vec![Term::id("a")]), vec![Term::id("b")]),
            ],
        );
    }

    #[test]
    fn test_table_fields() {
        assert_reads(
            "t = { 1, x = 2, [3] = 4; 'five', }",
            vec![Term::set(
                vec![Term::id("t")],
                vec![Term::table(vec![
                    Term::number(1),
                    Term::pair(Term::string("x"), Term::number(2)),
                    Term::pair(Term::number(3), Term::number(4)),
                    Term::string("five"),
                ])],
            )],
        );
    }

    #[test]
    fn test_control_flow() {
        assert_reads(
            "if a then b() elseif c then d() else e() end",
            vec![Term::if_chain(
                vec![
                    (Term::id("a"), vec![Term::call(Term::id("b"), vec![])]),
                    (Term::id("c"), vec![Term::call(Term::id("d"), vec![])]),
                ],
                Some(vec![Term::call(Term::id("e"), vec![])]),
            )],
        );
        assert_reads(
            "for i = 1, 10, 2 do break end for k, v in pairs(t) do end",
            vec![
                Term::fornum(
                    Term::id("i"),
                    Term::number(1),
                    Term::number(10),
                    Some(Term::number(2)),
                    vec![Term::break_stmt()],
                ),
                Term::forin(
                    vec![Term::id("k"), Term::id("v")],
                    vec![Term::call(Term::id("pairs"), vec![Term::id("t")])],
                    vec![],
                ),
            ],
        );
        assert_reads(
            "repeat goto done until x ::done::",
            vec![
                Term::repeat(vec![Term::goto("done")], Term::id("x")),
                Term::label("done"),
            ],
        );
    }

    #[test]
    fn test_spans_recorded() {
        let block = read("x = 1\nreturn x");
        assert_eq!(block[0].span().map(|s| s.line), Some(1));
        assert_eq!(block[1].span().map(|s| s.line), Some(2));
    }

    #[test]
    fn test_error_unclosed_block() {
        let err = read_err("while x do\n  f()\n");
        assert_eq!(
            err,
            ReadError::Parse {
                line: 3,
                message: "'end' expected (to close 'while' at line 1) near <eof>".into()
            }
        );
    }

    #[test]
    fn test_error_non_call_statement() {
        let err = read_err("x + 1");
        assert!(err.to_string().contains("syntax error"), "{err}");
    }

    #[test]
    fn test_error_return_not_last() {
        let err = read_err("return 1 x = 2");
        assert!(err.to_string().contains("'<eof>' expected"), "{err}");
    }

    #[test]
    fn test_error_bad_assignment_target() {
        let err = read_err("f() = 1");
        assert!(err.to_string().contains("syntax error"), "{err}");
    }

    fn assert_too_deep(source: &str) {
        match read_err(source) {
            ReadError::Parse { message, .. } => {
                assert_eq!(message, "chunk has too many syntax levels")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_error_too_many_syntax_levels() {
        let n = 50_000;
        assert_too_deep(&format!("x = {}1{}", "(".repeat(n), ")".repeat(n)));
        assert_too_deep(&format!("x = {}1", "- ".repeat(n)));
        assert_too_deep(&format!("x = {}{}", "{".repeat(n), "}".repeat(n)));
        assert_too_deep(&"do ".repeat(n));
        assert_too_deep(&format!("x = 1{}", " + 1".repeat(n)));
        assert_too_deep(&format!("x = a{}", ".b".repeat(n)));
        assert_too_deep(&format!("f{}", "()".repeat(n)));
    }

    #[test]
    fn test_nesting_below_the_limit() {
        let n = 50;
        read(&format!("x = {}1{}", "(".repeat(n), ")".repeat(n)));
        read(&format!("x = a{} + 1", ".b".repeat(n)));
        read(&format!("{}{}", "do ".repeat(n), "end ".repeat(n)));
        read(&format!("x = 1{}", " .. 1".repeat(MAX_SYNTAX_DEPTH / 4)));

        // the counter unwinds between statements
        let line = format!("x = a{}\n", ".b".repeat(MAX_SYNTAX_DEPTH / 2));
        read(&line.repeat(10));
    }
}
