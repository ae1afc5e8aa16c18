use std::{fmt, rc::Rc};

use crate::{
    diagnostics::{Result, ScriptError},
    document::Document,
    engine::RuntimeShared,
    function::{self, FunctionHandle},
    heap::Realm,
    marshal::ValueMarshaler,
    runtime::Interpreter,
    value::{ObjectKind, Value, ValueKind},
};

/// Name of the global that receives the result of [`Scope::invoke`].
pub const RETURN_GLOBAL: &str = "return";

/// Shape of a global as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptType {
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Object,
    Array,
    Function,
}

impl ScriptType {
    pub fn of(value: &Value) -> Self {
        match value.kind() {
            ValueKind::Undefined => ScriptType::Undefined,
            ValueKind::Null => ScriptType::Null,
            ValueKind::Bool(_) => ScriptType::Boolean,
            ValueKind::Number(_) => ScriptType::Number,
            ValueKind::String(_) => ScriptType::String,
            ValueKind::Object(object) => match object.borrow().kind() {
                ObjectKind::Array(_) => ScriptType::Array,
                _ => ScriptType::Object,
            },
            ValueKind::Function(_) | ValueKind::NativeFunction(_) => ScriptType::Function,
        }
    }
}

impl fmt::Display for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScriptType::Undefined => "undefined",
            ScriptType::Null => "null",
            ScriptType::Boolean => "boolean",
            ScriptType::Number => "number",
            ScriptType::String => "string",
            ScriptType::Object => "object",
            ScriptType::Array => "array",
            ScriptType::Function => "function",
        };
        f.write_str(name)
    }
}

/// One execution context: a global namespace, an optional receiver, and the
/// functions compiled against them.
///
/// Dropping the scope tears down everything its scripts allocated.
pub struct Scope {
    id: u64,
    generation: u64,
    interpreter: Interpreter,
    marshaler: ValueMarshaler,
    runtime: Rc<RuntimeShared>,
}

impl Scope {
    pub(crate) fn new(runtime: Rc<RuntimeShared>) -> Result<Self> {
        let realm = Realm::new(Rc::clone(&runtime.heap));
        let interpreter = Interpreter::new(Rc::clone(&realm), runtime.config.max_call_depth)?;
        let id = runtime.scope_opened();
        tracing::debug!(scope = id, "scope created");
        Ok(Self {
            id,
            generation: 0,
            interpreter,
            marshaler: ValueMarshaler::new(realm),
            runtime,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Restores the state of a freshly created scope. Handles compiled
    /// before the reset become stale.
    pub fn reset(&mut self) -> Result<()> {
        self.interpreter.reset()?;
        self.generation += 1;
        tracing::debug!(scope = self.id, generation = self.generation, "scope reset");
        Ok(())
    }

    pub fn destroy(self) {
        drop(self);
    }

    /// Raw value of a global, if bound.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.interpreter.global(name)
    }

    fn lookup(&self, name: &str) -> Value {
        self.global(name).unwrap_or_else(Value::undefined)
    }

    pub fn get_number(&self, name: &str) -> Result<f64> {
        let value = self.lookup(name);
        match value.kind() {
            ValueKind::Object(_) | ValueKind::Function(_) | ValueKind::NativeFunction(_) => {
                Err(ScriptError::NotAConvertibleType {
                    name: name.to_string(),
                    requested: "number",
                    actual: value.type_name(),
                })
            }
            _ => Ok(value.to_number()),
        }
    }

    pub fn get_string(&self, name: &str) -> Result<String> {
        self.marshaler.to_text(&self.lookup(name))
    }

    pub fn get_boolean(&self, name: &str) -> Result<bool> {
        Ok(self.lookup(name).is_truthy())
    }

    /// Shallow copy of an object global as a document.
    pub fn get_object(&self, name: &str) -> Result<Document> {
        self.marshaler.to_document(name, &self.lookup(name))
    }

    pub fn get_type(&self, name: &str) -> ScriptType {
        ScriptType::of(&self.lookup(name))
    }

    pub fn set_number(&mut self, name: &str, value: f64) {
        self.interpreter.define_global(name, Value::number(value));
    }

    pub fn set_string(&mut self, name: &str, value: &str) {
        self.interpreter.define_global(name, Value::string(value));
    }

    pub fn set_boolean(&mut self, name: &str, value: bool) {
        self.interpreter.define_global(name, Value::bool(value));
    }

    /// Binds a lazily resolving view of `document`. The document is not
    /// copied; fields are read on first access.
    pub fn set_object(&mut self, name: &str, document: &Rc<Document>) -> Result<()> {
        let proxy = self.marshaler.to_document_proxy(document)?;
        self.interpreter.define_global(name, proxy);
        Ok(())
    }

    /// Makes `document` the receiver (`this`) of evaluations and invocations.
    pub fn set_this(&mut self, document: &Rc<Document>) -> Result<()> {
        let proxy = self.marshaler.to_document_proxy(document)?;
        self.interpreter.set_this(proxy);
        Ok(())
    }

    pub fn clear_this(&mut self) {
        self.interpreter.set_this(Value::undefined());
    }

    /// Binds every top-level field of `document` as a global. Nothing is
    /// bound when any field fails to convert.
    pub fn init(&mut self, document: &Document) -> Result<()> {
        let mut converted = Vec::with_capacity(document.len());
        for (name, element) in document.iter() {
            if let Some(value) = self.marshaler.to_script_value(name, Some(element))? {
                converted.push((name, value));
            }
        }
        for (name, value) in converted {
            self.interpreter.define_global(name, value);
        }
        Ok(())
    }

    /// Evaluates a statement program against the globals and the receiver,
    /// returning the value of the last expression statement.
    pub fn eval(&mut self, source: &str) -> Result<Value> {
        self.interpreter.eval_source(source)
    }

    pub fn create_function(&mut self, source: &str) -> Result<FunctionHandle> {
        function::compile(&self.interpreter, source, self.id, self.generation)
    }

    /// Calls `handle` with the receiver as `this` and the fields of `args`
    /// as positional arguments. The result is returned and also stored in
    /// the `return` global.
    pub fn invoke(&mut self, handle: &FunctionHandle, args: Option<&Document>) -> Result<Value> {
        if handle.scope_id() != self.id {
            return Err(ScriptError::ForeignFunction {
                label: handle.label().to_string(),
            });
        }
        if handle.generation() != self.generation {
            return Err(ScriptError::StaleFunction {
                label: handle.label().to_string(),
            });
        }
        let mut call_args = Vec::new();
        if let Some(args) = args {
            for (name, element) in args.iter() {
                let value = self.marshaler.to_script_value(name, Some(element))?;
                call_args.push(value.unwrap_or_else(Value::undefined));
            }
        }
        tracing::debug!(
            scope = self.id,
            label = handle.label(),
            args = call_args.len(),
            "invoking function"
        );
        let this = self.interpreter.this().clone();
        let result = self
            .interpreter
            .call_function(handle.function(), this, call_args)?;
        self.interpreter.define_global(RETURN_GLOBAL, result.clone());
        Ok(result)
    }

    /// Objects currently alive in this scope's realm.
    pub fn live_objects(&self) -> usize {
        self.interpreter.realm().live_objects()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.interpreter.teardown();
        self.runtime.scope_closed();
        tracing::debug!(scope = self.id, "scope destroyed");
    }
}
