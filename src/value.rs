use std::{cell::RefCell, fmt, ops::Deref, rc::Rc};

use indexmap::IndexMap;

use crate::{
    ast::Stmt,
    diagnostics::Result,
    environment::EnvironmentRef,
    heap::{HeapCharge, Realm, SLOT_COST},
    proxy::DocumentProxy,
};

pub type ObjectRef = Rc<RefCell<Object>>;

/// Script value. Cloning is cheap; objects are shared by reference.
#[derive(Clone)]
pub struct Value(pub Rc<ValueKind>);

impl Value {
    pub fn new(kind: ValueKind) -> Self {
        Self(Rc::new(kind))
    }

    pub fn undefined() -> Self {
        Self::new(ValueKind::Undefined)
    }

    pub fn null() -> Self {
        Self::new(ValueKind::Null)
    }

    pub fn bool(value: bool) -> Self {
        Self::new(ValueKind::Bool(value))
    }

    pub fn number(value: f64) -> Self {
        Self::new(ValueKind::Number(value))
    }

    /// Uncharged string, for literals and host-provided text.
    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ValueKind::String(ScriptString {
            text: value.into(),
            charge: None,
        }))
    }

    pub(crate) fn charged_string(text: String, charge: HeapCharge) -> Self {
        Self::new(ValueKind::String(ScriptString {
            text,
            charge: Some(charge),
        }))
    }

    pub fn object(object: ObjectRef) -> Self {
        Self::new(ValueKind::Object(object))
    }

    pub fn kind(&self) -> &ValueKind {
        &self.0
    }

    pub fn is_undefined(&self) -> bool {
        matches!(&*self.0, ValueKind::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(&*self.0, ValueKind::Undefined | ValueKind::Null)
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            &*self.0,
            ValueKind::Function(_) | ValueKind::NativeFunction(_)
        )
    }

    pub fn as_number(&self) -> Option<f64> {
        match &*self.0 {
            ValueKind::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &*self.0 {
            ValueKind::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match &*self.0 {
            ValueKind::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match &*self.0 {
            ValueKind::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match &*self.0 {
            ValueKind::Undefined | ValueKind::Null => false,
            ValueKind::Bool(b) => *b,
            ValueKind::Number(n) => *n != 0.0 && !n.is_nan(),
            ValueKind::String(s) => !s.is_empty(),
            ValueKind::Object(_) | ValueKind::Function(_) | ValueKind::NativeFunction(_) => true,
        }
    }

    /// Descriptive type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match &*self.0 {
            ValueKind::Undefined => "undefined",
            ValueKind::Null => "null",
            ValueKind::Bool(_) => "boolean",
            ValueKind::Number(_) => "number",
            ValueKind::String(_) => "string",
            ValueKind::Object(object) => match object.try_borrow().as_deref().map(Object::kind) {
                Ok(ObjectKind::Array(_)) => "array",
                Ok(ObjectKind::Document(_)) => "document",
                _ => "object",
            },
            ValueKind::Function(_) | ValueKind::NativeFunction(_) => "function",
        }
    }

    /// Result of the `typeof` operator.
    pub fn typeof_name(&self) -> &'static str {
        match &*self.0 {
            ValueKind::Undefined => "undefined",
            ValueKind::Null | ValueKind::Object(_) => "object",
            ValueKind::Bool(_) => "boolean",
            ValueKind::Number(_) => "number",
            ValueKind::String(_) => "string",
            ValueKind::Function(_) | ValueKind::NativeFunction(_) => "function",
        }
    }

    /// Standard numeric conversion. Objects and functions convert to NaN.
    pub fn to_number(&self) -> f64 {
        match &*self.0 {
            ValueKind::Undefined => f64::NAN,
            ValueKind::Null => 0.0,
            ValueKind::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            ValueKind::Number(n) => *n,
            ValueKind::String(s) => string_to_number(s),
            ValueKind::Object(_) | ValueKind::Function(_) | ValueKind::NativeFunction(_) => {
                f64::NAN
            }
        }
    }

    pub fn strict_equals(&self, other: &Value) -> bool {
        match (&*self.0, &*other.0) {
            (ValueKind::Undefined, ValueKind::Undefined) => true,
            (ValueKind::Null, ValueKind::Null) => true,
            (ValueKind::Bool(a), ValueKind::Bool(b)) => a == b,
            (ValueKind::Number(a), ValueKind::Number(b)) => a == b,
            (ValueKind::String(a), ValueKind::String(b)) => a.as_str() == b.as_str(),
            (ValueKind::Object(a), ValueKind::Object(b)) => Rc::ptr_eq(a, b),
            (ValueKind::Function(_), ValueKind::Function(_))
            | (ValueKind::NativeFunction(_), ValueKind::NativeFunction(_)) => {
                Rc::ptr_eq(&self.0, &other.0)
            }
            _ => false,
        }
    }

    pub fn loose_equals(&self, other: &Value) -> bool {
        match (&*self.0, &*other.0) {
            (
                ValueKind::Undefined | ValueKind::Null,
                ValueKind::Undefined | ValueKind::Null,
            ) => true,
            (ValueKind::Undefined | ValueKind::Null, _)
            | (_, ValueKind::Undefined | ValueKind::Null) => false,
            (ValueKind::Number(_), ValueKind::String(_))
            | (ValueKind::String(_), ValueKind::Number(_))
            | (ValueKind::Bool(_), _)
            | (_, ValueKind::Bool(_)) => {
                if matches!(&*self.0, ValueKind::Object(_))
                    || matches!(&*other.0, ValueKind::Object(_))
                {
                    return false;
                }
                self.to_number() == other.to_number()
            }
            _ => self.strict_equals(other),
        }
    }

    /// ToString, or `None` once the text would exceed `limit` bytes.
    pub fn to_text_within(&self, limit: usize) -> Option<String> {
        let mut out = BoundedText {
            text: String::new(),
            limit,
        };
        self.write_text(&mut out, 0).ok()?;
        Some(out.text)
    }

    fn write_text<W: fmt::Write>(&self, f: &mut W, depth: usize) -> fmt::Result {
        match &*self.0 {
            ValueKind::Undefined => write!(f, "undefined"),
            ValueKind::Null => write!(f, "null"),
            ValueKind::Bool(b) => write!(f, "{b}"),
            ValueKind::Number(n) => write!(f, "{}", format_number(*n)),
            ValueKind::String(s) => f.write_str(s),
            ValueKind::Object(object) => {
                let Ok(object) = object.try_borrow() else {
                    return Ok(());
                };
                match object.kind() {
                    ObjectKind::Array(items) => {
                        if depth > MAX_DISPLAY_DEPTH {
                            return Ok(());
                        }
                        for (idx, item) in items.iter().enumerate() {
                            if idx > 0 {
                                write!(f, ",")?;
                            }
                            if !item.is_nullish() {
                                item.write_text(f, depth + 1)?;
                            }
                        }
                        Ok(())
                    }
                    _ => write!(f, "[object Object]"),
                }
            }
            ValueKind::Function(fun) => write!(
                f,
                "function {}() {{ [script code] }}",
                fun.name.as_deref().unwrap_or("")
            ),
            ValueKind::NativeFunction(fun) => {
                write!(f, "function {}() {{ [native code] }}", fun.name)
            }
        }
    }
}

const MAX_DISPLAY_DEPTH: usize = 16;

struct BoundedText {
    text: String,
    limit: usize,
}

impl fmt::Write for BoundedText {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.text.len() + s.len() > self.limit {
            return Err(fmt::Error);
        }
        self.text.push_str(s);
        Ok(())
    }
}

/// Numeric conversion of a string: surrounding whitespace is ignored, an
/// empty string is zero, anything that is not a numeric literal is NaN.
pub fn string_to_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16)
            .map(|n| n as f64)
            .unwrap_or(f64::NAN);
    }
    let literal = trimmed
        .chars()
        .all(|ch| ch.is_ascii_digit() || matches!(ch, '.' | 'e' | 'E' | '+' | '-'));
    if !literal {
        return f64::NAN;
    }
    trimmed.parse().unwrap_or(f64::NAN)
}

/// Text form of a number: integral values print without a fraction.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        format!("{n}")
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            ValueKind::String(s) => write!(f, "{:?}", s.as_str()),
            ValueKind::Object(object) => match object.try_borrow() {
                Ok(object) => write!(f, "{object:?}"),
                Err(_) => write!(f, "<object>"),
            },
            _ => self.write_text(f, 0),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_text(f, 0)
    }
}

pub enum ValueKind {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(ScriptString),
    Object(ObjectRef),
    Function(UserFunction),
    NativeFunction(NativeFunction),
}

/// String payload. Text built by scripts carries its heap charge.
pub struct ScriptString {
    text: String,
    charge: Option<HeapCharge>,
}

impl ScriptString {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_charged(&self) -> bool {
        self.charge.is_some()
    }
}

impl Deref for ScriptString {
    type Target = str;

    fn deref(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for ScriptString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Debug)]
pub enum ObjectKind {
    Plain,
    Array(Vec<Value>),
    /// Object whose missing properties resolve lazily from a host document.
    Document(DocumentProxy),
}

/// Heap object: own properties plus a kind-specific payload.
pub struct Object {
    properties: IndexMap<String, Value>,
    kind: ObjectKind,
    charge: HeapCharge,
}

impl Object {
    pub(crate) fn new(kind: ObjectKind, charge: HeapCharge) -> Self {
        Self {
            properties: IndexMap::new(),
            kind,
            charge,
        }
    }

    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    pub fn proxy(&self) -> Option<&DocumentProxy> {
        match &self.kind {
            ObjectKind::Document(proxy) => Some(proxy),
            _ => None,
        }
    }

    pub fn get_own(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn has_own(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.properties
            .iter()
            .map(|(key, value)| (key.as_str(), value))
    }

    /// Defines or overwrites an own property.
    pub fn set_own(&mut self, name: &str, value: Value) -> Result<()> {
        if let Some(slot) = self.properties.get_mut(name) {
            *slot = value;
            return Ok(());
        }
        self.charge.grow(SLOT_COST + name.len())?;
        self.properties.insert(name.to_string(), value);
        Ok(())
    }

    pub fn elements(&self) -> Option<&[Value]> {
        match &self.kind {
            ObjectKind::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn push_element(&mut self, value: Value) -> Result<usize> {
        let ObjectKind::Array(items) = &mut self.kind else {
            return Ok(0);
        };
        self.charge.grow(SLOT_COST)?;
        items.push(value);
        Ok(items.len())
    }

    pub fn pop_element(&mut self) -> Option<Value> {
        let ObjectKind::Array(items) = &mut self.kind else {
            return None;
        };
        let value = items.pop()?;
        self.charge.shrink(SLOT_COST);
        Some(value)
    }

    /// Stores `value` at `index`, padding with `undefined` as needed.
    pub fn set_element(&mut self, index: usize, value: Value) -> Result<()> {
        let ObjectKind::Array(items) = &mut self.kind else {
            return Ok(());
        };
        if index < items.len() {
            items[index] = value;
            return Ok(());
        }
        let added = index.saturating_add(1) - items.len();
        self.charge.grow(added.saturating_mul(SLOT_COST))?;
        items.resize_with(index, Value::undefined);
        items.push(value);
        Ok(())
    }

    pub(crate) fn take_contents(&mut self) -> (IndexMap<String, Value>, ObjectKind) {
        let kind = match &self.kind {
            ObjectKind::Array(_) => std::mem::replace(&mut self.kind, ObjectKind::Array(Vec::new())),
            _ => std::mem::replace(&mut self.kind, ObjectKind::Plain),
        };
        (std::mem::take(&mut self.properties), kind)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ObjectKind::Array(items) => f.debug_list().entries(items.iter()).finish(),
            ObjectKind::Document(proxy) => f
                .debug_struct("DocumentProxy")
                .field("live", &proxy.is_live())
                .field("resolved", &self.properties.keys().collect::<Vec<_>>())
                .finish(),
            ObjectKind::Plain => f.debug_map().entries(self.properties.iter()).finish(),
        }
    }
}

#[derive(Clone)]
pub struct UserFunction {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Rc<Vec<Stmt>>,
    pub env: EnvironmentRef,
}

/// Host callback; strings it builds are charged through the realm.
pub type NativeCallback = fn(&Realm, &Value, &[Value]) -> Result<Value>;

#[derive(Clone)]
pub struct NativeFunction {
    pub name: &'static str,
    pub arity: usize,
    pub callback: NativeCallback,
}

impl NativeFunction {
    /// Missing arguments are passed as `undefined`, extra ones are ignored
    /// by the callbacks.
    pub fn call(&self, realm: &Realm, this: &Value, args: &[Value]) -> Result<Value> {
        if args.len() >= self.arity {
            return (self.callback)(realm, this, args);
        }
        let mut padded = args.to_vec();
        padded.resize_with(self.arity, Value::undefined);
        (self.callback)(realm, this, &padded)
    }
}
