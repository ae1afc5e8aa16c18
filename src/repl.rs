use rustyline::{DefaultEditor, error::ReadlineError};

use crate::{
    diagnostics::{Result, ScriptError},
    engine::Runtime,
    scope::Scope,
};

/// Line-oriented session over one persistent scope.
pub struct Repl {
    scope: Scope,
}

impl Repl {
    pub fn new(runtime: &Runtime) -> Result<Self> {
        Ok(Self {
            scope: runtime.create_scope()?,
        })
    }

    pub fn run(&mut self) -> Result<()> {
        let mut editor = DefaultEditor::new().map_err(readline_error)?;
        loop {
            match editor.readline(">> ") {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed == ":quit" || trimmed == ":exit" {
                        break;
                    }
                    if trimmed.is_empty() {
                        continue;
                    }
                    editor.add_history_entry(trimmed).ok();
                    match self.scope.eval(trimmed) {
                        Ok(value) => println!("{value}"),
                        Err(ScriptError::Diagnostic(diag)) => {
                            eprintln!("{:?}: {}", diag.kind, diag.message);
                        }
                        Err(err) if err.is_fatal() => return Err(err),
                        Err(err) => eprintln!("error: {err}"),
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => return Err(readline_error(err)),
            }
        }
        Ok(())
    }
}

fn readline_error(err: ReadlineError) -> ScriptError {
    ScriptError::from(std::io::Error::other(err))
}
