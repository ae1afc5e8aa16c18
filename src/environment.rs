use std::{cell::RefCell, mem, rc::Rc};

use indexmap::IndexMap;

use crate::{
    diagnostics::{Diagnostic, Result, ScriptError, SourceSpan},
    value::Value,
};

pub type EnvironmentRef = Rc<RefCell<Environment>>;

/// Lexical binding frame. The root frame is the scope's global namespace;
/// function frames are where `var` declarations land.
#[derive(Default)]
pub struct Environment {
    parent: Option<EnvironmentRef>,
    bindings: IndexMap<String, Binding>,
    function_frame: bool,
}

impl Environment {
    pub fn new() -> EnvironmentRef {
        Rc::new(RefCell::new(Self {
            parent: None,
            bindings: IndexMap::new(),
            function_frame: true,
        }))
    }

    pub fn with_parent(parent: EnvironmentRef) -> EnvironmentRef {
        Rc::new(RefCell::new(Self {
            parent: Some(parent),
            bindings: IndexMap::new(),
            function_frame: false,
        }))
    }

    pub fn function_frame(parent: EnvironmentRef) -> EnvironmentRef {
        Rc::new(RefCell::new(Self {
            parent: Some(parent),
            bindings: IndexMap::new(),
            function_frame: true,
        }))
    }

    pub fn define(&mut self, name: String, value: Value, mutable: bool) {
        self.bindings.insert(name, Binding { value, mutable });
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name).map(|binding| &binding.value)
    }

    /// Drops every binding and the parent link.
    pub fn clear(&mut self) {
        drop(self.take_contents());
    }

    pub(crate) fn take_contents(&mut self) -> (IndexMap<String, Binding>, Option<EnvironmentRef>) {
        (mem::take(&mut self.bindings), self.parent.take())
    }

    pub(crate) fn parent(&self) -> Option<&EnvironmentRef> {
        self.parent.as_ref()
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &Value> {
        self.bindings.values().map(|binding| &binding.value)
    }

    /// Declares a `var` binding in the nearest function frame.
    pub fn declare_var(env: &EnvironmentRef, name: &str, value: Option<Value>) {
        let mut current = Rc::clone(env);
        loop {
            let next = {
                let frame = current.borrow();
                if frame.function_frame {
                    None
                } else {
                    frame.parent.clone()
                }
            };
            match next {
                Some(parent) => current = parent,
                None => break,
            }
        }
        let mut frame = current.borrow_mut();
        match (frame.bindings.get_mut(name), value) {
            (Some(binding), Some(value)) => binding.value = value,
            (Some(_), None) => {}
            (None, value) => {
                frame.define(name.to_string(), value.unwrap_or_else(Value::undefined), true);
            }
        }
    }

    /// Assigns to an existing binding. Names not bound anywhere in the chain
    /// become globals in the root frame.
    pub fn assign(env: &EnvironmentRef, name: &str, value: Value, span: SourceSpan) -> Result<()> {
        if let Some(binding) = env.borrow_mut().bindings.get_mut(name) {
            if !binding.mutable {
                return Err(ScriptError::from(
                    Diagnostic::runtime(format!("assignment to constant `{name}`"))
                        .with_span(span),
                ));
            }
            binding.value = value;
            return Ok(());
        }
        let parent = env.borrow().parent.clone();
        match parent {
            Some(parent) => Environment::assign(&parent, name, value, span),
            None => {
                env.borrow_mut().define(name.to_string(), value, true);
                Ok(())
            }
        }
    }

    pub fn get(env: &EnvironmentRef, name: &str, span: SourceSpan) -> Result<Value> {
        Environment::try_get(env, name).ok_or_else(|| {
            ScriptError::from(
                Diagnostic::runtime(format!("`{name}` is not defined")).with_span(span),
            )
        })
    }

    pub fn try_get(env: &EnvironmentRef, name: &str) -> Option<Value> {
        if let Some(binding) = env.borrow().bindings.get(name) {
            return Some(binding.value.clone());
        }
        let parent = env.borrow().parent.clone();
        parent.and_then(|parent| Environment::try_get(&parent, name))
    }
}

#[derive(Clone)]
pub struct Binding {
    pub value: Value,
    pub mutable: bool,
}
