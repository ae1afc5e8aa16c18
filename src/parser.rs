use std::rc::Rc;

use crate::{
    ast::{
        BinaryOp, DeclKind, Declarator, Expr, ExprKind, FunctionDecl, FunctionParam, Literal,
        LogicalOp, Program, Stmt, StmtKind, UnaryOp, UpdateOp,
    },
    diagnostics::{Diagnostic, DiagnosticKind, SourceSpan},
    lexer::{Keyword, Lexer, Token, TokenKind},
    stack,
};

/// Deepest statement and expression nesting accepted.
const MAX_NESTING: usize = 512;

/// Parses a statement list.
pub fn parse_program(source: &str) -> Result<Program, Diagnostic> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse_program()
}

/// Parses a source that must consist of exactly one function expression,
/// optionally followed by `;`.
pub fn parse_function_literal(source: &str) -> Result<Rc<FunctionDecl>, Diagnostic> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser::new(tokens);
    let decl = parser.parse_function(false)?;
    parser.consume_optional_semicolon();
    parser.expect_end("unexpected input after function literal")?;
    Ok(decl)
}

/// Parses a source that must consist of exactly one expression, optionally
/// followed by `;`.
pub fn parse_expression_source(source: &str) -> Result<Expr, Diagnostic> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expression()?;
    parser.consume_optional_semicolon();
    parser.expect_end("unexpected input after expression")?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    current: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            depth: 0,
        }
    }

    /// Runs `parse` one nesting level deeper.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, Diagnostic>,
    ) -> Result<T, Diagnostic> {
        if self.depth >= MAX_NESTING {
            return Err(self.error_here("nesting is too deep"));
        }
        self.depth += 1;
        let result = stack::ensure_sufficient_stack(|| parse(self));
        self.depth -= 1;
        result
    }

    fn parse_program(&mut self) -> Result<Program, Diagnostic> {
        let mut items = Vec::new();
        while !self.check(TokenKind::Eof) {
            items.push(self.parse_statement()?);
        }
        Ok(Program { items })
    }

    fn parse_block_items(&mut self, terminator: TokenKind) -> Result<Vec<Stmt>, Diagnostic> {
        let mut items = Vec::new();
        while !self.check(terminator.clone()) && !self.check(TokenKind::Eof) {
            items.push(self.parse_statement()?);
        }
        self.consume(terminator, "expected block terminator")?;
        Ok(items)
    }

    fn parse_block(&mut self) -> Result<(Vec<Stmt>, SourceSpan), Diagnostic> {
        let lbrace = self.consume(TokenKind::LBrace, "expected `{` to start block")?;
        let start = lbrace.span.start;
        let items = self.parse_block_items(TokenKind::RBrace)?;
        let end = self.previous().span.end;
        Ok((items, SourceSpan { start, end }))
    }

    /// Body of `if`/`while`/`for`: a block or a single statement.
    fn parse_branch(&mut self) -> Result<(Vec<Stmt>, SourceSpan), Diagnostic> {
        if self.check(TokenKind::LBrace) {
            self.parse_block()
        } else {
            let stmt = self.parse_statement()?;
            let span = stmt.span;
            Ok((vec![stmt], span))
        }
    }

    fn parse_statement(&mut self) -> Result<Stmt, Diagnostic> {
        self.nested(Self::statement)
    }

    fn statement(&mut self) -> Result<Stmt, Diagnostic> {
        if let Some(token) = self.peek() {
            match &token.kind {
                TokenKind::Keyword(Keyword::Var) => return self.parse_var_statement(DeclKind::Var),
                TokenKind::Keyword(Keyword::Let) => return self.parse_var_statement(DeclKind::Let),
                TokenKind::Keyword(Keyword::Const) => {
                    return self.parse_var_statement(DeclKind::Const);
                }
                TokenKind::Keyword(Keyword::Function)
                    if self.peek_next_kind() == Some(&TokenKind::Identifier) =>
                {
                    let decl = self.parse_function(true)?;
                    return Ok(Stmt {
                        span: decl.span,
                        kind: StmtKind::Function(decl),
                    });
                }
                TokenKind::Keyword(Keyword::If) => return self.parse_if(),
                TokenKind::Keyword(Keyword::While) => return self.parse_while(),
                TokenKind::Keyword(Keyword::For) => return self.parse_for(),
                TokenKind::Keyword(Keyword::Return) => return self.parse_return(),
                TokenKind::Keyword(Keyword::Throw) => return self.parse_throw(),
                TokenKind::Keyword(Keyword::Break) => {
                    let token = self.advance();
                    self.consume_optional_semicolon();
                    return Ok(Stmt {
                        span: token.span,
                        kind: StmtKind::Break,
                    });
                }
                TokenKind::Keyword(Keyword::Continue) => {
                    let token = self.advance();
                    self.consume_optional_semicolon();
                    return Ok(Stmt {
                        span: token.span,
                        kind: StmtKind::Continue,
                    });
                }
                TokenKind::Semicolon => {
                    let token = self.advance();
                    return Ok(Stmt {
                        span: token.span,
                        kind: StmtKind::Empty,
                    });
                }
                TokenKind::LBrace => {
                    let (items, span) = self.parse_block()?;
                    return Ok(Stmt {
                        kind: StmtKind::Block(items),
                        span,
                    });
                }
                _ => {}
            }
        }
        self.parse_expression_statement()
    }

    fn parse_var_statement(&mut self, kind: DeclKind) -> Result<Stmt, Diagnostic> {
        let stmt = self.parse_var_decl(kind)?;
        self.consume_optional_semicolon();
        Ok(stmt)
    }

    fn parse_var_decl(&mut self, kind: DeclKind) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span.start;
        let mut declarations = Vec::new();
        loop {
            let name_token = self.consume_identifier("expected variable name")?;
            let initializer = if self.matches(TokenKind::Assign) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            if kind == DeclKind::Const && initializer.is_none() {
                return Err(self.error(&name_token, "missing initializer in const declaration"));
            }
            let end = initializer
                .as_ref()
                .map(|expr| expr.span.end)
                .unwrap_or(name_token.span.end);
            declarations.push(Declarator {
                name: name_token.lexeme.clone(),
                initializer,
                span: SourceSpan::new(name_token.span.start, end),
            });
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        let end = self.previous().span.end;
        Ok(Stmt {
            kind: StmtKind::VarDecl { kind, declarations },
            span: SourceSpan { start, end },
        })
    }

    /// `function [name](params) { body }`. Declarations require the name.
    fn parse_function(&mut self, require_name: bool) -> Result<Rc<FunctionDecl>, Diagnostic> {
        let start_token = self.consume_keyword(Keyword::Function)?;
        let name = if self.check(TokenKind::Identifier) {
            Some(self.advance().lexeme)
        } else if require_name {
            return Err(self.error_here("expected function name"));
        } else {
            None
        };
        self.consume(TokenKind::LParen, "expected `(` after `function`")?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let param_name = self.consume_identifier("expected parameter name")?;
                params.push(FunctionParam {
                    name: param_name.lexeme.clone(),
                    span: param_name.span,
                });
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "expected `)` after parameters")?;
        let (body, span) = self.parse_block()?;
        Ok(Rc::new(FunctionDecl {
            name,
            params,
            body: Rc::new(body),
            span: SourceSpan {
                start: start_token.span.start,
                end: span.end,
            },
        }))
    }

    fn parse_if(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.consume_keyword(Keyword::If)?.span.start;
        let condition = self.parse_condition()?;
        let (then_branch, then_span) = self.parse_branch()?;
        let mut end = then_span.end;
        let else_branch = if self.matches_keyword(Keyword::Else) {
            let (branch, span) = self.parse_branch()?;
            end = span.end;
            Some(branch)
        } else {
            None
        };
        Ok(Stmt {
            span: SourceSpan { start, end },
            kind: StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
        })
    }

    fn parse_condition(&mut self) -> Result<Expr, Diagnostic> {
        self.consume(TokenKind::LParen, "expected `(` before condition")?;
        let condition = self.parse_expression()?;
        self.consume(TokenKind::RParen, "expected `)` after condition")?;
        Ok(condition)
    }

    fn parse_while(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.consume_keyword(Keyword::While)?.span.start;
        let condition = self.parse_condition()?;
        let (body, span) = self.parse_branch()?;
        Ok(Stmt {
            span: SourceSpan {
                start,
                end: span.end,
            },
            kind: StmtKind::While { condition, body },
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.consume_keyword(Keyword::For)?.span.start;
        self.consume(TokenKind::LParen, "expected `(` after `for`")?;
        let init = match self.peek().map(|token| &token.kind) {
            Some(TokenKind::Semicolon) => None,
            Some(TokenKind::Keyword(Keyword::Var)) => Some(self.parse_var_decl(DeclKind::Var)?),
            Some(TokenKind::Keyword(Keyword::Let)) => Some(self.parse_var_decl(DeclKind::Let)?),
            Some(TokenKind::Keyword(Keyword::Const)) => {
                Some(self.parse_var_decl(DeclKind::Const)?)
            }
            _ => {
                let expr = self.parse_expression()?;
                Some(Stmt {
                    span: expr.span,
                    kind: StmtKind::Expr(expr),
                })
            }
        };
        self.consume(TokenKind::Semicolon, "expected `;` after loop initializer")?;
        let condition = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(TokenKind::Semicolon, "expected `;` after loop condition")?;
        let update = if self.check(TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(TokenKind::RParen, "expected `)` after loop header")?;
        let (body, span) = self.parse_branch()?;
        Ok(Stmt {
            span: SourceSpan {
                start,
                end: span.end,
            },
            kind: StmtKind::For {
                init: init.map(Box::new),
                condition,
                update,
                body,
            },
        })
    }

    fn parse_return(&mut self) -> Result<Stmt, Diagnostic> {
        let token = self.consume_keyword(Keyword::Return)?;
        let expr = if self.check(TokenKind::Semicolon)
            || self.check(TokenKind::RBrace)
            || self.check(TokenKind::Eof)
        {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume_optional_semicolon();
        let end = expr.as_ref().map(|e| e.span.end).unwrap_or(token.span.end);
        Ok(Stmt {
            span: SourceSpan {
                start: token.span.start,
                end,
            },
            kind: StmtKind::Return(expr),
        })
    }

    fn parse_throw(&mut self) -> Result<Stmt, Diagnostic> {
        let token = self.consume_keyword(Keyword::Throw)?;
        let expr = self.parse_expression()?;
        self.consume_optional_semicolon();
        Ok(Stmt {
            span: SourceSpan {
                start: token.span.start,
                end: expr.span.end,
            },
            kind: StmtKind::Throw(expr),
        })
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt, Diagnostic> {
        let expr = self.parse_expression()?;
        self.consume_optional_semicolon();
        Ok(Stmt {
            span: expr.span,
            kind: StmtKind::Expr(expr),
        })
    }

    fn parse_expression(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, Diagnostic> {
        self.nested(Self::assignment)
    }

    fn assignment(&mut self) -> Result<Expr, Diagnostic> {
        let expr = self.parse_conditional()?;
        let op = if self.matches(TokenKind::Assign) {
            None
        } else if self.matches(TokenKind::PlusAssign) {
            Some(BinaryOp::Add)
        } else if self.matches(TokenKind::MinusAssign) {
            Some(BinaryOp::Sub)
        } else if self.matches(TokenKind::StarAssign) {
            Some(BinaryOp::Mul)
        } else if self.matches(TokenKind::SlashAssign) {
            Some(BinaryOp::Div)
        } else {
            return Ok(expr);
        };
        let operator = self.previous().span;
        let value = self.parse_assignment()?;
        match expr.kind {
            ExprKind::Variable(_) | ExprKind::Index { .. } | ExprKind::Field { .. } => Ok(Expr {
                span: SourceSpan {
                    start: expr.span.start,
                    end: value.span.end,
                },
                kind: ExprKind::Assign {
                    op,
                    target: Box::new(expr),
                    value: Box::new(value),
                },
            }),
            _ => Err(
                Diagnostic::new(DiagnosticKind::Parser, "invalid assignment target")
                    .with_span(operator),
            ),
        }
    }

    fn parse_conditional(&mut self) -> Result<Expr, Diagnostic> {
        let condition = self.parse_or()?;
        if !self.matches(TokenKind::Question) {
            return Ok(condition);
        }
        let then_expr = self.parse_assignment()?;
        self.consume(TokenKind::Colon, "expected `:` in conditional expression")?;
        let else_expr = self.parse_assignment()?;
        Ok(Expr {
            span: SourceSpan {
                start: condition.span.start,
                end: else_expr.span.end,
            },
            kind: ExprKind::Conditional {
                condition: Box::new(condition),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
        })
    }

    fn parse_or(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_and()?;
        while self.matches(TokenKind::DoublePipe) {
            let right = self.parse_and()?;
            expr = logical(LogicalOp::Or, expr, right);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_equality()?;
        while self.matches(TokenKind::DoubleAmpersand) {
            let right = self.parse_equality()?;
            expr = logical(LogicalOp::And, expr, right);
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_comparison()?;
        while let Some(op) = if self.matches(TokenKind::EqualEqualEqual) {
            Some(BinaryOp::StrictEqual)
        } else if self.matches(TokenKind::BangEqualEqual) {
            Some(BinaryOp::StrictNotEqual)
        } else if self.matches(TokenKind::EqualEqual) {
            Some(BinaryOp::Equal)
        } else if self.matches(TokenKind::BangEqual) {
            Some(BinaryOp::NotEqual)
        } else {
            None
        } {
            let right = self.parse_comparison()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_term()?;
        while let Some(op) = if self.matches(TokenKind::LessEqual) {
            Some(BinaryOp::LessEqual)
        } else if self.matches(TokenKind::GreaterEqual) {
            Some(BinaryOp::GreaterEqual)
        } else if self.matches(TokenKind::Less) {
            Some(BinaryOp::Less)
        } else if self.matches(TokenKind::Greater) {
            Some(BinaryOp::Greater)
        } else {
            None
        } {
            let right = self.parse_term()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_factor()?;
        while let Some(op) = if self.matches(TokenKind::Plus) {
            Some(BinaryOp::Add)
        } else if self.matches(TokenKind::Minus) {
            Some(BinaryOp::Sub)
        } else {
            None
        } {
            let right = self.parse_factor()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_factor(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_unary()?;
        while let Some(op) = if self.matches(TokenKind::Star) {
            Some(BinaryOp::Mul)
        } else if self.matches(TokenKind::Slash) {
            Some(BinaryOp::Div)
        } else if self.matches(TokenKind::Percent) {
            Some(BinaryOp::Mod)
        } else {
            None
        } {
            let right = self.parse_unary()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr, Diagnostic> {
        self.nested(Self::unary)
    }

    fn unary(&mut self) -> Result<Expr, Diagnostic> {
        let op = if self.matches(TokenKind::Minus) {
            UnaryOp::Negate
        } else if self.matches(TokenKind::Plus) {
            UnaryOp::Plus
        } else if self.matches(TokenKind::Bang) {
            UnaryOp::Not
        } else if self.matches_keyword(Keyword::Typeof) {
            UnaryOp::Typeof
        } else if self.check(TokenKind::PlusPlus) || self.check(TokenKind::MinusMinus) {
            let token = self.advance();
            let op = if token.kind == TokenKind::PlusPlus {
                UpdateOp::Increment
            } else {
                UpdateOp::Decrement
            };
            let target = self.parse_unary()?;
            return update(op, true, target, token.span);
        } else {
            return self.parse_postfix();
        };
        let operator = self.previous().span;
        let right = self.parse_unary()?;
        Ok(Expr {
            span: SourceSpan {
                start: operator.start,
                end: right.span.end,
            },
            kind: ExprKind::Unary {
                op,
                expr: Box::new(right),
            },
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, Diagnostic> {
        let expr = self.parse_call()?;
        if self.check(TokenKind::PlusPlus) || self.check(TokenKind::MinusMinus) {
            let token = self.advance();
            let op = if token.kind == TokenKind::PlusPlus {
                UpdateOp::Increment
            } else {
                UpdateOp::Decrement
            };
            return update(op, false, expr, token.span);
        }
        Ok(expr)
    }

    fn parse_call(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.matches(TokenKind::LParen) {
                let mut args = Vec::new();
                if !self.check(TokenKind::RParen) {
                    loop {
                        args.push(self.parse_assignment()?);
                        if !self.matches(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                let paren = self.consume(TokenKind::RParen, "expected `)` after arguments")?;
                expr = Expr {
                    span: SourceSpan {
                        start: expr.span.start,
                        end: paren.span.end,
                    },
                    kind: ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                };
            } else if self.matches(TokenKind::LBracket) {
                let index = self.parse_expression()?;
                let bracket = self.consume(TokenKind::RBracket, "expected `]` after index")?;
                expr = Expr {
                    span: SourceSpan {
                        start: expr.span.start,
                        end: bracket.span.end,
                    },
                    kind: ExprKind::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    },
                };
            } else if self.matches(TokenKind::Dot) {
                let ident = self.consume_property_name("expected property name after `.`")?;
                expr = Expr {
                    span: SourceSpan {
                        start: expr.span.start,
                        end: ident.span.end,
                    },
                    kind: ExprKind::Field {
                        target: Box::new(expr),
                        field: ident.lexeme.clone(),
                    },
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, Diagnostic> {
        let Some(token) = self.peek() else {
            return Err(self.error_eof("unexpected end of expression"));
        };
        let literal = match &token.kind {
            TokenKind::Keyword(Keyword::True) => Some(Literal::Bool(true)),
            TokenKind::Keyword(Keyword::False) => Some(Literal::Bool(false)),
            TokenKind::Keyword(Keyword::Null) => Some(Literal::Null),
            TokenKind::Number => match token.lexeme.parse() {
                Ok(n) => Some(Literal::Number(n)),
                Err(_) => return Err(self.error(token, "malformed number literal")),
            },
            TokenKind::String => Some(Literal::String(token.lexeme.clone())),
            _ => None,
        };
        if let Some(literal) = literal {
            let tok = self.advance();
            return Ok(Expr {
                span: tok.span,
                kind: ExprKind::Literal(literal),
            });
        }
        match &token.kind {
            TokenKind::Keyword(Keyword::This) => {
                let tok = self.advance();
                Ok(Expr {
                    span: tok.span,
                    kind: ExprKind::This,
                })
            }
            TokenKind::Identifier => {
                let tok = self.advance();
                Ok(Expr {
                    span: tok.span,
                    kind: ExprKind::Variable(tok.lexeme.clone()),
                })
            }
            TokenKind::Keyword(Keyword::Function) => {
                let decl = self.parse_function(false)?;
                Ok(Expr {
                    span: decl.span,
                    kind: ExprKind::Function(decl),
                })
            }
            TokenKind::LParen => {
                let lparen = self.advance();
                let inner = self.parse_expression()?;
                let rparen = self.consume(TokenKind::RParen, "expected `)` after expression")?;
                Ok(Expr {
                    span: SourceSpan {
                        start: lparen.span.start,
                        end: rparen.span.end,
                    },
                    kind: ExprKind::Group(Box::new(inner)),
                })
            }
            TokenKind::LBracket => {
                let lbracket = self.advance();
                let mut elements = Vec::new();
                while !self.check(TokenKind::RBracket) && !self.check(TokenKind::Eof) {
                    elements.push(self.parse_assignment()?);
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
                let rbracket =
                    self.consume(TokenKind::RBracket, "expected `]` after array literal")?;
                Ok(Expr {
                    span: SourceSpan {
                        start: lbracket.span.start,
                        end: rbracket.span.end,
                    },
                    kind: ExprKind::ArrayLiteral(elements),
                })
            }
            TokenKind::LBrace => self.parse_object_literal(),
            _ => Err(self.error(token, "unexpected token in expression")),
        }
    }

    fn parse_object_literal(&mut self) -> Result<Expr, Diagnostic> {
        let lbrace = self.advance();
        let mut entries = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            let key = self.consume_property_name("expected property name in object literal")?;
            self.consume(TokenKind::Colon, "expected `:` in object literal")?;
            let value = self.parse_assignment()?;
            entries.push((key.lexeme, value));
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        let rbrace = self.consume(TokenKind::RBrace, "expected `}` after object literal")?;
        Ok(Expr {
            span: SourceSpan {
                start: lbrace.span.start,
                end: rbrace.span.end,
            },
            kind: ExprKind::ObjectLiteral(entries),
        })
    }

    fn consume_optional_semicolon(&mut self) {
        let _ = self.matches(TokenKind::Semicolon);
    }

    fn expect_end(&self, message: &str) -> Result<(), Diagnostic> {
        match self.peek() {
            Some(token) if token.kind != TokenKind::Eof => Err(self.error(token, message)),
            _ => Ok(()),
        }
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn matches_keyword(&mut self, keyword: Keyword) -> bool {
        self.matches(TokenKind::Keyword(keyword))
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<Token, Diagnostic> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(message))
        }
    }

    fn consume_keyword(&mut self, keyword: Keyword) -> Result<Token, Diagnostic> {
        let message = format!("expected keyword `{keyword:?}`");
        self.consume(TokenKind::Keyword(keyword), &message)
    }

    fn consume_identifier(&mut self, message: &str) -> Result<Token, Diagnostic> {
        self.consume(TokenKind::Identifier, message)
    }

    /// Property names may be identifiers, keywords, strings or numbers.
    fn consume_property_name(&mut self, message: &str) -> Result<Token, Diagnostic> {
        match self.peek().map(|token| &token.kind) {
            Some(
                TokenKind::Identifier
                | TokenKind::Keyword(_)
                | TokenKind::String
                | TokenKind::Number,
            ) => Ok(self.advance()),
            _ => Err(self.error_here(message)),
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        if let Some(token) = self.peek() {
            token.kind == kind
        } else {
            false
        }
    }

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous().clone()
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.current)
    }

    fn peek_next_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.current + 1).map(|token| &token.kind)
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Eof) | None)
    }

    fn error(&self, token: &Token, message: &str) -> Diagnostic {
        let found = if token.kind == TokenKind::Eof {
            "end of input".to_string()
        } else {
            format!("`{}`", token.lexeme)
        };
        Diagnostic::new(DiagnosticKind::Parser, message.to_string())
            .with_span(token.span)
            .with_note(format!("found {found}"))
    }

    fn error_here(&self, message: &str) -> Diagnostic {
        self.peek()
            .map(|token| self.error(token, message))
            .unwrap_or_else(|| self.error_eof(message))
    }

    fn error_eof(&self, message: &str) -> Diagnostic {
        Diagnostic::new(DiagnosticKind::Parser, message.to_string())
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr {
        span: SourceSpan {
            start: left.span.start,
            end: right.span.end,
        },
        kind: ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    }
}

fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
    Expr {
        span: SourceSpan {
            start: left.span.start,
            end: right.span.end,
        },
        kind: ExprKind::Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    }
}

fn update(op: UpdateOp, prefix: bool, target: Expr, operator: SourceSpan) -> Result<Expr, Diagnostic> {
    if !matches!(
        target.kind,
        ExprKind::Variable(_) | ExprKind::Index { .. } | ExprKind::Field { .. }
    ) {
        return Err(
            Diagnostic::new(DiagnosticKind::Parser, "invalid update target").with_span(operator),
        );
    }
    let span = SourceSpan {
        start: operator.start.min(target.span.start),
        end: operator.end.max(target.span.end),
    };
    Ok(Expr {
        span,
        kind: ExprKind::Update {
            op,
            prefix,
            target: Box::new(target),
        },
    })
}
