//! Conversions between document elements and script values.

use std::rc::Rc;

use crate::{
    diagnostics::{Result, ScriptError},
    document::{Document, Element},
    heap::Realm,
    proxy::DocumentProxy,
    value::{ObjectKind, Value, ValueKind},
};

/// Converts one document field to a script value.
///
/// `None` (the end-of-object marker) maps to `Ok(None)`: the field is not
/// present, which is not an error. Kinds without a script counterpart fail
/// with [`ScriptError::UnsupportedType`].
pub fn element_to_value(name: &str, element: Option<&Element>) -> Result<Option<Value>> {
    let Some(element) = element else {
        return Ok(None);
    };
    let value = match element {
        Element::Double(n) => Value::number(*n),
        Element::Int32(n) => Value::number(f64::from(*n)),
        Element::Int64(n) => Value::number(*n as f64),
        Element::String(s) => Value::string(s.clone()),
        Element::Boolean(b) => Value::bool(*b),
        Element::Null => Value::null(),
        Element::Document(_) | Element::Array(_) | Element::DateTime(_) => {
            let element_type = element.element_type();
            tracing::warn!(field = name, %element_type, "unsupported document field type");
            return Err(ScriptError::UnsupportedType {
                field: name.to_string(),
                element_type,
            });
        }
    };
    Ok(Some(value))
}

/// Bidirectional converter bound to the realm that owns its allocations.
pub struct ValueMarshaler {
    realm: Rc<Realm>,
}

impl ValueMarshaler {
    pub fn new(realm: Rc<Realm>) -> Self {
        Self { realm }
    }

    pub fn to_script_value(&self, name: &str, element: Option<&Element>) -> Result<Option<Value>> {
        element_to_value(name, element)
    }

    /// Wraps `document` in a lazily resolving proxy object. Nothing is read
    /// from the document here.
    pub fn to_document_proxy(&self, document: &Rc<Document>) -> Result<Value> {
        let object = self
            .realm
            .alloc_object(ObjectKind::Document(DocumentProxy::new(document)))?;
        Ok(Value::object(object))
    }

    /// ToString, bounded by the space left in the heap.
    pub fn to_text(&self, value: &Value) -> Result<String> {
        self.realm.text(value)
    }

    /// Converts a primitive script value to a document element. `undefined`
    /// yields `None` so callers can skip the field.
    pub fn to_element(&self, name: &str, value: &Value) -> Result<Option<Element>> {
        let element = match value.kind() {
            ValueKind::Undefined => return Ok(None),
            ValueKind::Null => Element::Null,
            ValueKind::Bool(b) => Element::Boolean(*b),
            ValueKind::Number(n) => Element::Double(*n),
            ValueKind::String(s) => Element::String(s.as_str().to_string()),
            ValueKind::Object(_) | ValueKind::Function(_) | ValueKind::NativeFunction(_) => {
                return Err(ScriptError::NotAConvertibleType {
                    name: name.to_string(),
                    requested: "document field",
                    actual: value.type_name(),
                });
            }
        };
        Ok(Some(element))
    }

    /// Shallow conversion of an object to a document.
    ///
    /// A proxy yields its underlying document with the object's own
    /// properties applied on top; a plain object yields its own properties.
    pub fn to_document(&self, name: &str, value: &Value) -> Result<Document> {
        let not_convertible = || ScriptError::NotAConvertibleType {
            name: name.to_string(),
            requested: "document",
            actual: value.type_name(),
        };
        let object = value.as_object().ok_or_else(not_convertible)?;
        let object = object.borrow();
        let mut document = match object.kind() {
            ObjectKind::Document(proxy) => proxy.document()?.as_ref().clone(),
            ObjectKind::Plain => Document::new(),
            ObjectKind::Array(_) => return Err(not_convertible()),
        };
        for (key, property) in object.properties() {
            let path = format!("{name}.{key}");
            if let Some(element) = self.to_element(&path, property)? {
                document.insert(key, element);
            }
        }
        Ok(document)
    }
}
