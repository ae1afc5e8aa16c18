//! Embeddable script interpreter for working over host documents.
//!
//! A [`Runtime`] owns the heap budget; each [`Scope`] it creates is an
//! independent global namespace with an optional receiver document. Host
//! documents are exposed to scripts as lazy proxies: a field is converted
//! only when a script reads it, and the converted value is cached on the
//! proxy as an ordinary property.

pub mod ast;
pub mod diagnostics;
pub mod document;
pub mod engine;
pub mod environment;
pub mod function;
pub mod heap;
pub mod lexer;
pub mod marshal;
pub mod parser;
pub mod proxy;
pub mod repl;
pub mod runtime;
pub mod scope;
mod stack;
pub mod stdlib;
pub mod value;

pub use diagnostics::{Diagnostic, DiagnosticKind, Result, ScriptError, SourceSpan};
pub use document::{Document, Element, ElementType};
pub use engine::{Runtime, RuntimeConfig};
pub use function::FunctionHandle;
pub use marshal::ValueMarshaler;
pub use repl::Repl;
pub use scope::{Scope, ScriptType};
pub use value::Value;
