//! Compiles host-supplied source text into callable handles.

use std::{fmt, rc::Rc};

use crate::{
    ast::{FunctionDecl, Stmt, StmtKind},
    diagnostics::{Result, ScriptError, SourceSpan},
    lexer::{Keyword, Lexer, TokenKind},
    parser,
    runtime::Interpreter,
    value::Value,
};

const ANONYMOUS: &str = "anonymous";

/// Compiled function owned by the scope that produced it.
#[derive(Clone)]
pub struct FunctionHandle {
    label: String,
    function: Value,
    scope_id: u64,
    generation: u64,
}

impl FunctionHandle {
    /// Declared function name, or `anonymous`.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn scope_id(&self) -> u64 {
        self.scope_id
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn function(&self) -> &Value {
        &self.function
    }
}

impl fmt::Debug for FunctionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionHandle")
            .field("label", &self.label)
            .field("scope_id", &self.scope_id)
            .field("generation", &self.generation)
            .finish()
    }
}

/// How a source text was understood.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceForm {
    /// `function [name](params) { ... }`
    Literal,
    /// A single expression, returned by a zero-argument function.
    Expression,
    /// A statement list used as the body of a zero-argument function.
    Body,
}

/// Classifies and parses `source` into a function declaration.
///
/// A leading `function` keyword means the whole source is one function
/// literal. Otherwise the source is tried as a single expression first and
/// then as a function body; a failure in both reports the body error.
pub fn parse_source(source: &str) -> Result<(Rc<FunctionDecl>, SourceForm)> {
    let compile_error = |err| ScriptError::compile(err, source);
    let tokens = Lexer::new(source).tokenize().map_err(compile_error)?;
    let whole = SourceSpan::new(0, source.len());

    if matches!(
        tokens.first().map(|token| &token.kind),
        Some(TokenKind::Keyword(Keyword::Function))
    ) {
        let decl = parser::parse_function_literal(source).map_err(compile_error)?;
        return Ok((decl, SourceForm::Literal));
    }

    if let Ok(expr) = parser::parse_expression_source(source) {
        let span = expr.span;
        let body = vec![Stmt {
            kind: StmtKind::Return(Some(expr)),
            span,
        }];
        return Ok((anonymous(body, whole), SourceForm::Expression));
    }

    let program = parser::parse_program(source).map_err(compile_error)?;
    Ok((anonymous(program.items, whole), SourceForm::Body))
}

fn anonymous(body: Vec<Stmt>, span: SourceSpan) -> Rc<FunctionDecl> {
    Rc::new(FunctionDecl {
        name: None,
        params: Vec::new(),
        body: Rc::new(body),
        span,
    })
}

/// Compiles `source` into a closure over the interpreter's global frame.
pub(crate) fn compile(
    interpreter: &Interpreter,
    source: &str,
    scope_id: u64,
    generation: u64,
) -> Result<FunctionHandle> {
    let (decl, form) = parse_source(source).inspect_err(|err| {
        tracing::debug!(scope = scope_id, error = %err, "function failed to compile");
    })?;
    let label = decl.name.clone().unwrap_or_else(|| ANONYMOUS.to_string());
    tracing::debug!(scope = scope_id, label = %label, ?form, "compiled function");
    Ok(FunctionHandle {
        label,
        function: interpreter.make_closure(&decl),
        scope_id,
        generation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(source: &str) -> SourceForm {
        parse_source(source).expect("source should compile").1
    }

    #[test]
    fn classifies_sources() {
        assert_eq!(form("function(){ return 1+1; }"), SourceForm::Literal);
        assert_eq!(form("  function named(a, b) { return a + b }"), SourceForm::Literal);
        assert_eq!(form("1+1"), SourceForm::Expression);
        assert_eq!(form("this.a * 2;"), SourceForm::Expression);
        assert_eq!(form("x = 1; return x * 2"), SourceForm::Body);
        assert_eq!(form("if (this.a) { return 1 } return 2"), SourceForm::Body);
    }

    #[test]
    fn function_literal_must_span_whole_source() {
        let err = parse_source("function() { return 1 } 2").expect_err("trailing input");
        assert!(matches!(err, ScriptError::Compile { .. }));
    }

    #[test]
    fn compile_errors_carry_line_and_column() {
        match parse_source("x = 1;\nreturn )") {
            Err(ScriptError::Compile { line, column, .. }) => {
                assert_eq!(line, 2);
                assert_eq!(column, 8);
            }
            other => panic!("expected compile error, got {other:?}"),
        }
    }
}
