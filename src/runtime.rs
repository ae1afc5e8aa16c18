use std::{cmp::Ordering, mem, rc::Rc};

use crate::{
    ast::{
        BinaryOp, DeclKind, Expr, ExprKind, FunctionDecl, Literal, LogicalOp, Program, Stmt,
        StmtKind, UnaryOp, UpdateOp,
    },
    diagnostics::{Diagnostic, Result, ScriptError, SourceSpan},
    environment::{Environment, EnvironmentRef},
    heap::Realm,
    parser, proxy, stack, stdlib,
    value::{ObjectKind, UserFunction, Value, ValueKind},
};

/// Tree-walking evaluator bound to one realm.
///
/// `env` always points at the innermost active frame; every path that swaps
/// it (blocks, calls) puts the previous frame back, also on error.
pub struct Interpreter {
    globals: EnvironmentRef,
    env: EnvironmentRef,
    this: Value,
    realm: Rc<Realm>,
    depth: usize,
    max_call_depth: usize,
}

impl Interpreter {
    pub fn new(realm: Rc<Realm>, max_call_depth: usize) -> Result<Self> {
        let globals = fresh_globals(&realm)?;
        Ok(Self {
            env: Rc::clone(&globals),
            globals,
            this: Value::undefined(),
            realm,
            depth: 0,
            max_call_depth,
        })
    }

    pub fn realm(&self) -> &Rc<Realm> {
        &self.realm
    }

    pub fn this(&self) -> &Value {
        &self.this
    }

    pub fn set_this(&mut self, this: Value) {
        self.this = this;
    }

    /// Looks a global up without raising on absence.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.borrow().lookup(name).cloned()
    }

    pub fn define_global(&mut self, name: &str, value: Value) {
        self.globals
            .borrow_mut()
            .define(name.to_string(), value, true);
    }

    /// Drops everything the realm handed out and starts over with a fresh
    /// global namespace.
    pub fn reset(&mut self) -> Result<()> {
        self.teardown();
        self.globals = fresh_globals(&self.realm)?;
        self.env = Rc::clone(&self.globals);
        Ok(())
    }

    /// Breaks every reference cycle rooted in this interpreter.
    pub fn teardown(&mut self) {
        self.this = Value::undefined();
        self.realm.teardown();
        self.globals.borrow_mut().clear();
        self.env = Rc::clone(&self.globals);
        self.depth = 0;
    }

    pub fn eval_source(&mut self, source: &str) -> Result<Value> {
        let program =
            parser::parse_program(source).map_err(|err| ScriptError::compile(err, source))?;
        self.eval_program(&program)
    }

    /// Runs `program` in the global frame and returns its completion value.
    pub fn eval_program(&mut self, program: &Program) -> Result<Value> {
        let globals = Rc::clone(&self.globals);
        self.with_env(globals, |interp| {
            interp.hoist(&program.items, true);
            let mut last_value = Value::undefined();
            for stmt in &program.items {
                match interp.execute_statement(stmt)? {
                    FlowControl::Next => {}
                    FlowControl::NextValue(value) => last_value = value,
                    FlowControl::Return(_) => {
                        return Err(runtime_error("`return` outside function", stmt.span));
                    }
                    FlowControl::Break | FlowControl::Continue => {
                        return Err(runtime_error("loop control outside loop", stmt.span));
                    }
                }
            }
            Ok(last_value)
        })
    }

    /// Creates a closure over the current frame.
    pub fn make_closure(&self, decl: &FunctionDecl) -> Value {
        self.realm.track_environment(&self.env);
        Value::new(ValueKind::Function(UserFunction {
            name: decl.name.clone(),
            params: decl.params.iter().map(|param| param.name.clone()).collect(),
            body: Rc::clone(&decl.body),
            env: Rc::clone(&self.env),
        }))
    }

    pub fn call_function(&mut self, callee: &Value, this: Value, args: Vec<Value>) -> Result<Value> {
        self.call(callee, this, args, None)
    }

    fn with_env<T>(
        &mut self,
        env: EnvironmentRef,
        body: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let prev = mem::replace(&mut self.env, env);
        let result = body(self);
        self.env = prev;
        result
    }

    /// Function declarations of a statement list become bindings before any
    /// statement runs; function bodies also pre-declare their `var`s.
    fn hoist(&mut self, statements: &[Stmt], function_body: bool) {
        if function_body {
            hoist_vars(&self.env, statements);
        }
        for stmt in statements {
            if let StmtKind::Function(decl) = &stmt.kind {
                let closure = self.make_closure(decl);
                let name = decl.name.clone().unwrap_or_default();
                self.env.borrow_mut().define(name, closure, true);
            }
        }
    }

    fn execute_statement(&mut self, stmt: &Stmt) -> Result<FlowControl> {
        stack::ensure_sufficient_stack(|| self.run_statement(stmt))
    }

    fn run_statement(&mut self, stmt: &Stmt) -> Result<FlowControl> {
        match &stmt.kind {
            StmtKind::VarDecl { kind, declarations } => {
                for declarator in declarations {
                    let value = match &declarator.initializer {
                        Some(expr) => Some(self.evaluate(expr)?),
                        None => None,
                    };
                    match kind {
                        DeclKind::Var => Environment::declare_var(&self.env, &declarator.name, value),
                        DeclKind::Let | DeclKind::Const => self.env.borrow_mut().define(
                            declarator.name.clone(),
                            value.unwrap_or_else(Value::undefined),
                            *kind == DeclKind::Let,
                        ),
                    }
                }
                Ok(FlowControl::Next)
            }
            StmtKind::Function(_) | StmtKind::Empty => Ok(FlowControl::Next),
            StmtKind::Expr(expr) => {
                let value = self.evaluate(expr)?;
                Ok(FlowControl::NextValue(value))
            }
            StmtKind::Block(statements) => self.execute_block(statements),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute_block(then_branch)
                } else if let Some(branch) = else_branch {
                    self.execute_block(branch)
                } else {
                    Ok(FlowControl::Next)
                }
            }
            StmtKind::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    match self.execute_block(body)? {
                        FlowControl::Next | FlowControl::NextValue(_) | FlowControl::Continue => {}
                        FlowControl::Break => break,
                        FlowControl::Return(value) => return Ok(FlowControl::Return(value)),
                    }
                }
                Ok(FlowControl::Next)
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                let loop_env = Environment::with_parent(Rc::clone(&self.env));
                self.with_env(loop_env, |interp| {
                    if let Some(init) = init {
                        interp.execute_statement(init)?;
                    }
                    loop {
                        if let Some(condition) = condition {
                            if !interp.evaluate(condition)?.is_truthy() {
                                break;
                            }
                        }
                        match interp.execute_block(body)? {
                            FlowControl::Next
                            | FlowControl::NextValue(_)
                            | FlowControl::Continue => {}
                            FlowControl::Break => break,
                            FlowControl::Return(value) => return Ok(FlowControl::Return(value)),
                        }
                        if let Some(update) = update {
                            interp.evaluate(update)?;
                        }
                    }
                    Ok(FlowControl::Next)
                })
            }
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::undefined(),
                };
                Ok(FlowControl::Return(value))
            }
            StmtKind::Throw(expr) => {
                let value = self.evaluate(expr)?;
                Err(ScriptError::Uncaught(self.realm.text(&value)?))
            }
            StmtKind::Break => Ok(FlowControl::Break),
            StmtKind::Continue => Ok(FlowControl::Continue),
        }
    }

    fn execute_block(&mut self, statements: &[Stmt]) -> Result<FlowControl> {
        let child = Environment::with_parent(Rc::clone(&self.env));
        self.with_env(child, |interp| {
            interp.hoist(statements, false);
            let mut last_value: Option<Value> = None;
            for stmt in statements {
                match interp.execute_statement(stmt)? {
                    FlowControl::Next => {}
                    FlowControl::NextValue(value) => last_value = Some(value),
                    other => return Ok(other),
                }
            }
            Ok(match last_value {
                Some(value) => FlowControl::NextValue(value),
                None => FlowControl::Next,
            })
        })
    }

    fn evaluate(&mut self, expr: &Expr) -> Result<Value> {
        stack::ensure_sufficient_stack(|| self.evaluate_expr(expr))
    }

    fn evaluate_expr(&mut self, expr: &Expr) -> Result<Value> {
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(literal(lit)),
            ExprKind::Variable(name) => Environment::get(&self.env, name, expr.span),
            ExprKind::This => Ok(self.this.clone()),
            ExprKind::Binary { op, left, right } => {
                let left_value = self.evaluate(left)?;
                let right_value = self.evaluate(right)?;
                binary(&self.realm, *op, &left_value, &right_value)
            }
            ExprKind::Logical { op, left, right } => {
                let left_value = self.evaluate(left)?;
                let short_circuit = match op {
                    LogicalOp::And => !left_value.is_truthy(),
                    LogicalOp::Or => left_value.is_truthy(),
                };
                if short_circuit {
                    Ok(left_value)
                } else {
                    self.evaluate(right)
                }
            }
            ExprKind::Unary { op, expr: operand } => {
                if let (UnaryOp::Typeof, ExprKind::Variable(name)) = (op, &operand.kind) {
                    let value = Environment::try_get(&self.env, name);
                    let name = value.map_or("undefined", |value| value.typeof_name());
                    return Ok(Value::string(name));
                }
                let value = self.evaluate(operand)?;
                Ok(match op {
                    UnaryOp::Negate => Value::number(-value.to_number()),
                    UnaryOp::Plus => Value::number(value.to_number()),
                    UnaryOp::Not => Value::bool(!value.is_truthy()),
                    UnaryOp::Typeof => Value::string(value.typeof_name()),
                })
            }
            ExprKind::Update { op, prefix, target } => {
                let reference = self.reference(target)?;
                let old = self.get_reference(&reference, target.span)?.to_number();
                let new = match op {
                    UpdateOp::Increment => old + 1.0,
                    UpdateOp::Decrement => old - 1.0,
                };
                self.put_reference(&reference, Value::number(new), target.span)?;
                Ok(Value::number(if *prefix { new } else { old }))
            }
            ExprKind::Assign { op, target, value } => {
                let reference = self.reference(target)?;
                let value = match op {
                    None => self.evaluate(value)?,
                    Some(op) => {
                        let current = self.get_reference(&reference, target.span)?;
                        let rhs = self.evaluate(value)?;
                        binary(&self.realm, *op, &current, &rhs)?
                    }
                };
                self.put_reference(&reference, value.clone(), target.span)?;
                Ok(value)
            }
            ExprKind::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.evaluate(then_expr)
                } else {
                    self.evaluate(else_expr)
                }
            }
            ExprKind::Call { callee, args } => {
                let (callee_value, this) = match &callee.kind {
                    ExprKind::Field { target, field } => {
                        let receiver = self.evaluate(target)?;
                        let method = self.get_property(&receiver, field, callee.span)?;
                        (method, receiver)
                    }
                    ExprKind::Index { target, index } => {
                        let receiver = self.evaluate(target)?;
                        let key = self.evaluate(index)?;
                        let key = self.realm.text(&key)?;
                        let method = self.get_property(&receiver, &key, callee.span)?;
                        (method, receiver)
                    }
                    _ => (self.evaluate(callee)?, Value::undefined()),
                };
                let mut eval_args = Vec::with_capacity(args.len());
                for arg in args {
                    eval_args.push(self.evaluate(arg)?);
                }
                self.call(&callee_value, this, eval_args, Some(expr.span))
            }
            ExprKind::ArrayLiteral(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.evaluate(element)?);
                }
                let array = self.realm.alloc_object(ObjectKind::Array(values))?;
                Ok(Value::object(array))
            }
            ExprKind::ObjectLiteral(entries) => {
                let object = self.realm.alloc_object(ObjectKind::Plain)?;
                for (key, value_expr) in entries {
                    let value = self.evaluate(value_expr)?;
                    object.borrow_mut().set_own(key, value)?;
                }
                Ok(Value::object(object))
            }
            ExprKind::Group(inner) => self.evaluate(inner),
            ExprKind::Index { target, index } => {
                let target_value = self.evaluate(target)?;
                let key = self.evaluate(index)?;
                let key = self.realm.text(&key)?;
                self.get_property(&target_value, &key, expr.span)
            }
            ExprKind::Field { target, field } => {
                let target_value = self.evaluate(target)?;
                self.get_property(&target_value, field, expr.span)
            }
            ExprKind::Function(decl) => Ok(self.make_closure(decl)),
        }
    }

    fn call(
        &mut self,
        callee: &Value,
        this: Value,
        args: Vec<Value>,
        span: Option<SourceSpan>,
    ) -> Result<Value> {
        match callee.kind() {
            ValueKind::NativeFunction(fun) => fun.call(&self.realm, &this, &args),
            ValueKind::Function(fun) => {
                if self.depth >= self.max_call_depth {
                    let mut diagnostic = Diagnostic::runtime(format!(
                        "maximum call depth of {} exceeded",
                        self.max_call_depth
                    ));
                    if let Some(span) = span {
                        diagnostic = diagnostic.with_span(span);
                    }
                    return Err(ScriptError::from(diagnostic));
                }
                let frame = Environment::function_frame(Rc::clone(&fun.env));
                {
                    let mut frame = frame.borrow_mut();
                    let mut args = args.into_iter();
                    for name in &fun.params {
                        frame.define(name.clone(), args.next().unwrap_or_else(Value::undefined), true);
                    }
                }
                self.depth += 1;
                let prev_this = mem::replace(&mut self.this, this);
                let result = self.with_env(frame, |interp| interp.execute_body(&fun.body));
                self.this = prev_this;
                self.depth -= 1;
                result
            }
            _ => {
                let mut diagnostic = Diagnostic::runtime(format!(
                    "{} is not a function",
                    callee.type_name()
                ));
                if let Some(span) = span {
                    diagnostic = diagnostic.with_span(span);
                }
                Err(ScriptError::from(diagnostic))
            }
        }
    }

    fn execute_body(&mut self, body: &[Stmt]) -> Result<Value> {
        self.hoist(body, true);
        for stmt in body {
            match self.execute_statement(stmt)? {
                FlowControl::Next | FlowControl::NextValue(_) => {}
                FlowControl::Return(value) => return Ok(value),
                FlowControl::Break | FlowControl::Continue => {
                    return Err(runtime_error("loop control outside loop", stmt.span));
                }
            }
        }
        Ok(Value::undefined())
    }

    fn reference(&mut self, target: &Expr) -> Result<Reference> {
        match &target.kind {
            ExprKind::Variable(name) => Ok(Reference::Variable(name.clone())),
            ExprKind::Field { target, field } => {
                let owner = self.evaluate(target)?;
                Ok(Reference::Property(owner, field.clone()))
            }
            ExprKind::Index { target, index } => {
                let owner = self.evaluate(target)?;
                let key = self.evaluate(index)?;
                let key = self.realm.text(&key)?;
                Ok(Reference::Property(owner, key))
            }
            _ => Err(runtime_error("invalid assignment target", target.span)),
        }
    }

    fn get_reference(&mut self, reference: &Reference, span: SourceSpan) -> Result<Value> {
        match reference {
            Reference::Variable(name) => Environment::get(&self.env, name, span),
            Reference::Property(owner, key) => self.get_property(owner, key, span),
        }
    }

    fn put_reference(&mut self, reference: &Reference, value: Value, span: SourceSpan) -> Result<()> {
        match reference {
            Reference::Variable(name) => Environment::assign(&self.env, name, value, span),
            Reference::Property(owner, key) => set_property(owner, key, value, span),
        }
    }

    fn get_property(&mut self, target: &Value, key: &str, span: SourceSpan) -> Result<Value> {
        match target.kind() {
            ValueKind::Undefined | ValueKind::Null => Err(runtime_error(
                format!("cannot read property `{key}` of {}", target.type_name()),
                span,
            )),
            ValueKind::String(text) => {
                if key == "length" {
                    return Ok(Value::number(text.chars().count() as f64));
                }
                if let Some(idx) = array_index(key) {
                    return Ok(text
                        .chars()
                        .nth(idx)
                        .map(|ch| Value::string(ch.to_string()))
                        .unwrap_or_else(Value::undefined));
                }
                Ok(stdlib::string_method(key).unwrap_or_else(Value::undefined))
            }
            ValueKind::Object(object) => {
                let element = {
                    let borrowed = object.borrow();
                    match borrowed.elements() {
                        Some(items) if key == "length" => {
                            Some(Value::number(items.len() as f64))
                        }
                        Some(items) => match array_index(key) {
                            Some(idx) => Some(items.get(idx).cloned().unwrap_or_else(Value::undefined)),
                            None if !borrowed.has_own(key) => stdlib::array_method(key),
                            None => None,
                        },
                        None => None,
                    }
                };
                match element {
                    Some(value) => Ok(value),
                    None => proxy::get_property(object, key),
                }
            }
            ValueKind::Bool(_)
            | ValueKind::Number(_)
            | ValueKind::Function(_)
            | ValueKind::NativeFunction(_) => Ok(Value::undefined()),
        }
    }
}

fn fresh_globals(realm: &Realm) -> Result<EnvironmentRef> {
    let globals = Environment::new();
    realm.track_environment(&globals);
    stdlib::install(&globals, realm)?;
    Ok(globals)
}

fn set_property(target: &Value, key: &str, value: Value, span: SourceSpan) -> Result<()> {
    match target.kind() {
        ValueKind::Undefined | ValueKind::Null => Err(runtime_error(
            format!("cannot set property `{key}` of {}", target.type_name()),
            span,
        )),
        ValueKind::Object(object) => {
            let mut object = object.borrow_mut();
            match (object.elements().is_some(), array_index(key)) {
                (true, Some(idx)) => object.set_element(idx, value),
                _ => object.set_own(key, value),
            }
        }
        // Writes to primitives are dropped.
        _ => Ok(()),
    }
}

/// Canonical array index form of a property key.
fn array_index(key: &str) -> Option<usize> {
    let idx = key.parse::<usize>().ok()?;
    (idx.to_string() == key).then_some(idx)
}

fn hoist_vars(env: &EnvironmentRef, statements: &[Stmt]) {
    for stmt in statements {
        match &stmt.kind {
            StmtKind::VarDecl {
                kind: DeclKind::Var,
                declarations,
            } => {
                for declarator in declarations {
                    Environment::declare_var(env, &declarator.name, None);
                }
            }
            StmtKind::Block(items) | StmtKind::While { body: items, .. } => hoist_vars(env, items),
            StmtKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                hoist_vars(env, then_branch);
                if let Some(branch) = else_branch {
                    hoist_vars(env, branch);
                }
            }
            StmtKind::For { init, body, .. } => {
                if let Some(init) = init {
                    hoist_vars(env, std::slice::from_ref(&**init));
                }
                hoist_vars(env, body);
            }
            _ => {}
        }
    }
}

fn literal(literal: &Literal) -> Value {
    match literal {
        Literal::Number(n) => Value::number(*n),
        Literal::Bool(b) => Value::bool(*b),
        Literal::String(s) => Value::string(s.clone()),
        Literal::Null => Value::null(),
    }
}

fn binary(realm: &Realm, op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    use BinaryOp::*;
    Ok(match op {
        Add => return add(realm, left, right),
        Sub => Value::number(left.to_number() - right.to_number()),
        Mul => Value::number(left.to_number() * right.to_number()),
        Div => Value::number(left.to_number() / right.to_number()),
        Mod => Value::number(left.to_number() % right.to_number()),
        Equal => Value::bool(left.loose_equals(right)),
        NotEqual => Value::bool(!left.loose_equals(right)),
        StrictEqual => Value::bool(left.strict_equals(right)),
        StrictNotEqual => Value::bool(!left.strict_equals(right)),
        Less => Value::bool(compare(left, right) == Some(Ordering::Less)),
        LessEqual => Value::bool(matches!(
            compare(left, right),
            Some(Ordering::Less | Ordering::Equal)
        )),
        Greater => Value::bool(compare(left, right) == Some(Ordering::Greater)),
        GreaterEqual => Value::bool(matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        )),
    })
}

/// `+` concatenates as soon as either side is a string or an object.
fn add(realm: &Realm, left: &Value, right: &Value) -> Result<Value> {
    let concatenates = |value: &Value| {
        matches!(
            value.kind(),
            ValueKind::String(_)
                | ValueKind::Object(_)
                | ValueKind::Function(_)
                | ValueKind::NativeFunction(_)
        )
    };
    if concatenates(left) || concatenates(right) {
        let mut text = realm.text(left)?;
        text.push_str(&realm.text(right)?);
        realm.alloc_string(text)
    } else {
        Ok(Value::number(left.to_number() + right.to_number()))
    }
}

/// Strings compare by code point, everything else numerically. `None` when
/// either side is NaN.
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left.as_str(), right.as_str()) {
        (Some(a), Some(b)) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    }
}

fn runtime_error(message: impl Into<String>, span: SourceSpan) -> ScriptError {
    ScriptError::from(Diagnostic::runtime(message).with_span(span))
}

enum Reference {
    Variable(String),
    Property(Value, String),
}

enum FlowControl {
    Next,
    NextValue(Value),
    Return(Value),
    Break,
    Continue,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::format_number;

    #[test]
    fn array_index_rejects_non_canonical_keys() {
        assert_eq!(array_index("0"), Some(0));
        assert_eq!(array_index("12"), Some(12));
        assert_eq!(array_index("01"), None);
        assert_eq!(array_index("-1"), None);
        assert_eq!(array_index("length"), None);
    }

    #[test]
    fn number_keys_print_like_indices() {
        assert_eq!(format_number(2.0), "2");
        assert_eq!(array_index(&format_number(2.0)), Some(2));
    }
}
