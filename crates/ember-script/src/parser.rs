use std::sync::Arc;

use crate::ast::{
    BinaryOp, Expr, ExprKind, FunctionDecl, LogicalOp, Pos, Stmt, StmtKind, UnaryOp,
};
use crate::error::ScriptError;
use crate::lexer::{Lexer, Token, TokenKind};
use crate::value::format_number;

const RESERVED: &[&str] = &[
    "var", "let", "const", "function", "return", "if", "else", "while", "do", "for", "break",
    "continue", "throw", "try", "catch", "finally", "debugger", "new", "typeof", "true", "false",
    "null",
];

const BINARY_LEVELS: &[&[(&str, BinaryOp)]] = &[
    &[
        ("===", BinaryOp::StrictEq),
        ("!==", BinaryOp::StrictNotEq),
        ("==", BinaryOp::Eq),
        ("!=", BinaryOp::NotEq),
    ],
    &[
        ("<=", BinaryOp::LtEq),
        (">=", BinaryOp::GtEq),
        ("<", BinaryOp::Lt),
        (">", BinaryOp::Gt),
    ],
    &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
    &[
        ("*", BinaryOp::Mul),
        ("/", BinaryOp::Div),
        ("%", BinaryOp::Rem),
    ],
];

type ParseResult<T> = Result<T, ScriptError>;

/// Parses a whole script. Function declarations remember `filename` for stack frames.
pub(crate) fn parse_program(filename: &str, source: &str) -> ParseResult<Vec<Stmt>> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser {
        tokens,
        index: 0,
        filename: Arc::from(filename),
    };
    let mut body = Vec::new();
    while !parser.at_eof() {
        body.push(parser.statement()?);
    }
    Ok(body)
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    filename: Arc<str>,
}

impl Parser {
    fn peek(&self) -> &Token {
        // The token stream always ends with `Eof`, and `advance` never moves past it.
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn is_punct(&self, punct: &str) -> bool {
        matches!(self.peek().kind, TokenKind::Punct(p) if p == punct)
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(name) if name == keyword)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.is_punct(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_at(&self, token: &Token, message: impl Into<String>) -> ScriptError {
        ScriptError::Syntax {
            message: message.into(),
            line: token.pos.line,
            column: token.pos.column,
        }
    }

    fn unexpected(&self) -> ScriptError {
        let token = self.peek();
        let found = match &token.kind {
            TokenKind::Number(n) => format_number(*n),
            TokenKind::Str(s) => format!("{s:?}"),
            TokenKind::Ident(name) => name.clone(),
            TokenKind::Punct(p) => (*p).to_string(),
            TokenKind::Eof => "end of input".to_string(),
        };
        self.error_at(token, format!("unexpected token {found}"))
    }

    fn expect_punct(&mut self, punct: &str) -> ParseResult<()> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            let token = self.peek();
            Err(self.error_at(token, format!("expected '{punct}'")))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> ParseResult<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            let token = self.peek();
            Err(self.error_at(token, format!("expected '{keyword}'")))
        }
    }

    fn binding_name(&mut self) -> ParseResult<String> {
        match &self.peek().kind {
            TokenKind::Ident(name) if !RESERVED.contains(&name.as_str()) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn at_statement_end(&self) -> bool {
        let token = self.peek();
        token.newline_before
            || matches!(token.kind, TokenKind::Eof | TokenKind::Punct(";" | "}"))
    }

    /// Consumes a statement terminator, allowing it to be implied by a newline or `}`.
    fn semicolon(&mut self) -> ParseResult<()> {
        if self.eat_punct(";") || self.at_statement_end() {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn statement(&mut self) -> ParseResult<Stmt> {
        let pos = self.peek().pos;
        let kind = match self.peek().kind.clone() {
            TokenKind::Punct("{") => StmtKind::Block(self.block()?),
            TokenKind::Punct(";") => {
                self.advance();
                StmtKind::Empty
            }
            TokenKind::Ident(keyword) => match keyword.as_str() {
                "var" | "let" | "const" => {
                    self.advance();
                    let decls = self.var_declarations()?;
                    self.semicolon()?;
                    StmtKind::Var(decls)
                }
                "function" => {
                    self.advance();
                    StmtKind::Function(self.function_rest(pos, true)?)
                }
                "return" => {
                    self.advance();
                    let value = if self.at_statement_end() {
                        None
                    } else {
                        Some(self.expression()?)
                    };
                    self.semicolon()?;
                    StmtKind::Return(value)
                }
                "if" => {
                    self.advance();
                    self.expect_punct("(")?;
                    let test = self.expression()?;
                    self.expect_punct(")")?;
                    let consequent = Box::new(self.statement()?);
                    let alternate = if self.eat_keyword("else") {
                        Some(Box::new(self.statement()?))
                    } else {
                        None
                    };
                    StmtKind::If {
                        test,
                        consequent,
                        alternate,
                    }
                }
                "while" => {
                    self.advance();
                    self.expect_punct("(")?;
                    let test = self.expression()?;
                    self.expect_punct(")")?;
                    let body = Box::new(self.statement()?);
                    StmtKind::While { test, body }
                }
                "do" => {
                    self.advance();
                    let body = Box::new(self.statement()?);
                    self.expect_keyword("while")?;
                    self.expect_punct("(")?;
                    let test = self.expression()?;
                    self.expect_punct(")")?;
                    self.eat_punct(";");
                    StmtKind::DoWhile { body, test }
                }
                "for" => self.for_statement()?,
                "break" => {
                    self.advance();
                    self.semicolon()?;
                    StmtKind::Break
                }
                "continue" => {
                    self.advance();
                    self.semicolon()?;
                    StmtKind::Continue
                }
                "debugger" => {
                    self.advance();
                    self.semicolon()?;
                    StmtKind::Debugger
                }
                "throw" => {
                    self.advance();
                    let value = self.expression()?;
                    self.semicolon()?;
                    StmtKind::Throw(value)
                }
                "try" => self.try_statement()?,
                _ => self.expression_statement()?,
            },
            _ => self.expression_statement()?,
        };
        Ok(Stmt { kind, pos })
    }

    fn expression_statement(&mut self) -> ParseResult<StmtKind> {
        let expr = self.expression()?;
        self.semicolon()?;
        Ok(StmtKind::Expr(expr))
    }

    fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect_punct("{")?;
        let mut body = Vec::new();
        while !self.is_punct("}") {
            if self.at_eof() {
                return Err(self.unexpected());
            }
            body.push(self.statement()?);
        }
        self.advance();
        Ok(body)
    }

    fn var_declarations(&mut self) -> ParseResult<Vec<(String, Option<Expr>)>> {
        let mut decls = Vec::new();
        loop {
            let name = self.binding_name()?;
            let init = if self.eat_punct("=") {
                Some(self.assignment()?)
            } else {
                None
            };
            decls.push((name, init));
            if !self.eat_punct(",") {
                return Ok(decls);
            }
        }
    }

    fn for_statement(&mut self) -> ParseResult<StmtKind> {
        self.advance();
        self.expect_punct("(")?;
        let init = if self.is_punct(";") {
            None
        } else {
            let pos = self.peek().pos;
            let kind = if self.eat_keyword("var")
                || self.eat_keyword("let")
                || self.eat_keyword("const")
            {
                StmtKind::Var(self.var_declarations()?)
            } else {
                StmtKind::Expr(self.expression()?)
            };
            Some(Box::new(Stmt { kind, pos }))
        };
        self.expect_punct(";")?;
        let test = if self.is_punct(";") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(";")?;
        let update = if self.is_punct(")") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(")")?;
        let body = Box::new(self.statement()?);
        Ok(StmtKind::For {
            init,
            test,
            update,
            body,
        })
    }

    fn try_statement(&mut self) -> ParseResult<StmtKind> {
        self.advance();
        let block = self.block()?;
        let mut param = None;
        let mut handler = None;
        if self.eat_keyword("catch") {
            if self.eat_punct("(") {
                param = Some(self.binding_name()?);
                self.expect_punct(")")?;
            }
            handler = Some(self.block()?);
        }
        let finalizer = if self.eat_keyword("finally") {
            Some(self.block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.error_at(self.peek(), "missing catch or finally after try"));
        }
        Ok(StmtKind::Try {
            block,
            param,
            handler,
            finalizer,
        })
    }

    fn function_rest(&mut self, pos: Pos, require_name: bool) -> ParseResult<Arc<FunctionDecl>> {
        let name = if require_name || matches!(self.peek().kind, TokenKind::Ident(_)) {
            Some(self.binding_name()?)
        } else {
            None
        };
        self.expect_punct("(")?;
        let mut params = Vec::new();
        if !self.eat_punct(")") {
            loop {
                params.push(self.binding_name()?);
                if self.eat_punct(")") {
                    break;
                }
                self.expect_punct(",")?;
            }
        }
        let body = self.block()?;
        Ok(Arc::new(FunctionDecl {
            name,
            params,
            body,
            filename: self.filename.clone(),
            pos,
        }))
    }

    fn expression(&mut self) -> ParseResult<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> ParseResult<Expr> {
        let target = self.conditional()?;
        let op = match self.peek().kind {
            TokenKind::Punct("=") => None,
            TokenKind::Punct("+=") => Some(BinaryOp::Add),
            TokenKind::Punct("-=") => Some(BinaryOp::Sub),
            TokenKind::Punct("*=") => Some(BinaryOp::Mul),
            TokenKind::Punct("/=") => Some(BinaryOp::Div),
            TokenKind::Punct("%=") => Some(BinaryOp::Rem),
            _ => return Ok(target),
        };
        let op_token = self.advance();
        if !is_assignable(&target) {
            return Err(self.error_at(&op_token, "invalid assignment target"));
        }
        let value = self.assignment()?;
        let pos = target.pos;
        Ok(Expr {
            kind: ExprKind::Assign(op, Box::new(target), Box::new(value)),
            pos,
        })
    }

    fn conditional(&mut self) -> ParseResult<Expr> {
        let test = self.logical(LogicalOp::Or)?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let consequent = self.assignment()?;
        self.expect_punct(":")?;
        let alternate = self.assignment()?;
        let pos = test.pos;
        Ok(Expr {
            kind: ExprKind::Conditional(Box::new(test), Box::new(consequent), Box::new(alternate)),
            pos,
        })
    }

    fn logical(&mut self, op: LogicalOp) -> ParseResult<Expr> {
        let (punct, next) = match op {
            LogicalOp::Or => ("||", Some(LogicalOp::And)),
            LogicalOp::And => ("&&", None),
        };
        let operand = |parser: &mut Self| match next {
            Some(next) => parser.logical(next),
            None => parser.binary(0),
        };
        let mut left = operand(self)?;
        while self.eat_punct(punct) {
            let right = operand(self)?;
            let pos = left.pos;
            left = Expr {
                kind: ExprKind::Logical(op, Box::new(left), Box::new(right)),
                pos,
            };
        }
        Ok(left)
    }

    fn binary(&mut self, level: usize) -> ParseResult<Expr> {
        let Some(ops) = BINARY_LEVELS.get(level) else {
            return self.unary();
        };
        let mut left = self.binary(level + 1)?;
        'outer: loop {
            for (punct, op) in ops.iter() {
                if self.eat_punct(punct) {
                    let right = self.binary(level + 1)?;
                    let pos = left.pos;
                    left = Expr {
                        kind: ExprKind::Binary(*op, Box::new(left), Box::new(right)),
                        pos,
                    };
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        let pos = self.peek().pos;
        let op = match &self.peek().kind {
            TokenKind::Punct("-") => UnaryOp::Neg,
            TokenKind::Punct("+") => UnaryOp::Plus,
            TokenKind::Punct("!") => UnaryOp::Not,
            TokenKind::Ident(name) if name == "typeof" => UnaryOp::TypeOf,
            TokenKind::Punct(p @ ("++" | "--")) => {
                let increment = *p == "++";
                self.advance();
                let target = self.unary()?;
                if !is_assignable(&target) {
                    return Err(self.error_at(self.peek(), "invalid update target"));
                }
                return Ok(Expr {
                    kind: ExprKind::Update {
                        increment,
                        prefix: true,
                        target: Box::new(target),
                    },
                    pos,
                });
            }
            _ => return self.postfix(),
        };
        self.advance();
        let operand = self.unary()?;
        Ok(Expr {
            kind: ExprKind::Unary(op, Box::new(operand)),
            pos,
        })
    }

    fn postfix(&mut self) -> ParseResult<Expr> {
        let expr = self.call_member()?;
        let token = self.peek();
        let increment = match token.kind {
            TokenKind::Punct("++") if !token.newline_before => true,
            TokenKind::Punct("--") if !token.newline_before => false,
            _ => return Ok(expr),
        };
        if !is_assignable(&expr) {
            return Err(self.error_at(token, "invalid update target"));
        }
        self.advance();
        let pos = expr.pos;
        Ok(Expr {
            kind: ExprKind::Update {
                increment,
                prefix: false,
                target: Box::new(expr),
            },
            pos,
        })
    }

    fn call_member(&mut self) -> ParseResult<Expr> {
        let mut expr = if self.is_keyword("new") {
            let pos = self.advance().pos;
            let callee = self.member_chain(false)?;
            let args = if self.is_punct("(") {
                self.arguments()?
            } else {
                Vec::new()
            };
            Expr {
                kind: ExprKind::New(Box::new(callee), args),
                pos,
            }
        } else {
            self.primary()?
        };
        expr = self.extend_chain(expr, true)?;
        Ok(expr)
    }

    fn member_chain(&mut self, calls: bool) -> ParseResult<Expr> {
        let base = self.primary()?;
        self.extend_chain(base, calls)
    }

    fn extend_chain(&mut self, mut expr: Expr, calls: bool) -> ParseResult<Expr> {
        loop {
            let pos = expr.pos;
            if self.eat_punct(".") {
                let name = match self.advance().kind {
                    TokenKind::Ident(name) => name,
                    _ => return Err(self.error_at(&self.tokens[self.index - 1], "expected property name")),
                };
                expr = Expr {
                    kind: ExprKind::Member(Box::new(expr), name),
                    pos,
                };
            } else if self.eat_punct("[") {
                let index = self.expression()?;
                self.expect_punct("]")?;
                expr = Expr {
                    kind: ExprKind::Index(Box::new(expr), Box::new(index)),
                    pos,
                };
            } else if calls && self.is_punct("(") {
                let args = self.arguments()?;
                expr = Expr {
                    kind: ExprKind::Call(Box::new(expr), args),
                    pos,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn arguments(&mut self) -> ParseResult<Vec<Expr>> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        if self.eat_punct(")") {
            return Ok(args);
        }
        loop {
            args.push(self.assignment()?);
            if self.eat_punct(")") {
                return Ok(args);
            }
            self.expect_punct(",")?;
        }
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let pos = self.peek().pos;
        let kind = match self.peek().kind.clone() {
            TokenKind::Number(n) => {
                self.advance();
                ExprKind::Number(n)
            }
            TokenKind::Str(s) => {
                self.advance();
                ExprKind::Str(s)
            }
            TokenKind::Ident(name) => match name.as_str() {
                "true" | "false" => {
                    self.advance();
                    ExprKind::Bool(name == "true")
                }
                "null" => {
                    self.advance();
                    ExprKind::Null
                }
                "undefined" => {
                    self.advance();
                    ExprKind::Undefined
                }
                "function" => {
                    self.advance();
                    ExprKind::Function(self.function_rest(pos, false)?)
                }
                _ if RESERVED.contains(&name.as_str()) => return Err(self.unexpected()),
                _ => {
                    self.advance();
                    ExprKind::Ident(name)
                }
            },
            TokenKind::Punct("(") => {
                self.advance();
                let expr = self.expression()?;
                self.expect_punct(")")?;
                return Ok(expr);
            }
            TokenKind::Punct("[") => {
                self.advance();
                let mut items = Vec::new();
                while !self.eat_punct("]") {
                    items.push(self.assignment()?);
                    if !self.is_punct("]") {
                        self.expect_punct(",")?;
                    }
                }
                ExprKind::Array(items)
            }
            TokenKind::Punct("{") => {
                self.advance();
                let mut props = Vec::new();
                while !self.eat_punct("}") {
                    let key = match self.advance().kind {
                        TokenKind::Ident(name) => name,
                        TokenKind::Str(s) => s,
                        TokenKind::Number(n) => format_number(n),
                        _ => {
                            return Err(self.error_at(
                                &self.tokens[self.index - 1],
                                "expected property key",
                            ))
                        }
                    };
                    self.expect_punct(":")?;
                    props.push((key, self.assignment()?));
                    if !self.is_punct("}") {
                        self.expect_punct(",")?;
                    }
                }
                ExprKind::Object(props)
            }
            _ => return Err(self.unexpected()),
        };
        Ok(Expr { kind, pos })
    }
}

fn is_assignable(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Ident(_) | ExprKind::Member(..) | ExprKind::Index(..)
    )
}
