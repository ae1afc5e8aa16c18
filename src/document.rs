//! Host-side documents: ordered, named, typed fields.
//!
//! The scope never copies or owns a document it exposes to scripts; it is
//! shared as `Rc<Document>` and proxies keep only a weak handle.

use std::fmt;

/// Type tag of a document element. Codes follow the usual binary-document
/// numbering so diagnostics line up with what other tools print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    EndOfObject,
    Double,
    String,
    Document,
    Array,
    Boolean,
    DateTime,
    Null,
    Int32,
    Int64,
}

impl ElementType {
    pub fn code(self) -> u8 {
        match self {
            ElementType::EndOfObject => 0,
            ElementType::Double => 1,
            ElementType::String => 2,
            ElementType::Document => 3,
            ElementType::Array => 4,
            ElementType::Boolean => 8,
            ElementType::DateTime => 9,
            ElementType::Null => 10,
            ElementType::Int32 => 16,
            ElementType::Int64 => 18,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementType::EndOfObject => "EOO",
            ElementType::Double => "Double",
            ElementType::String => "String",
            ElementType::Document => "Document",
            ElementType::Array => "Array",
            ElementType::Boolean => "Boolean",
            ElementType::DateTime => "DateTime",
            ElementType::Null => "Null",
            ElementType::Int32 => "Int32",
            ElementType::Int64 => "Int64",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Double(f64),
    String(String),
    Document(Document),
    Array(Vec<Element>),
    Boolean(bool),
    /// Milliseconds since the Unix epoch.
    DateTime(i64),
    Null,
    Int32(i32),
    Int64(i64),
}

impl Element {
    pub fn element_type(&self) -> ElementType {
        match self {
            Element::Double(_) => ElementType::Double,
            Element::String(_) => ElementType::String,
            Element::Document(_) => ElementType::Document,
            Element::Array(_) => ElementType::Array,
            Element::Boolean(_) => ElementType::Boolean,
            Element::DateTime(_) => ElementType::DateTime,
            Element::Null => ElementType::Null,
            Element::Int32(_) => ElementType::Int32,
            Element::Int64(_) => ElementType::Int64,
        }
    }

    /// Numeric value of the numeric kinds.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Element::Double(n) => Some(*n),
            Element::Int32(n) => Some(f64::from(*n)),
            Element::Int64(n) => Some(*n as f64),
            _ => None,
        }
    }
}

impl From<f64> for Element {
    fn from(value: f64) -> Self {
        Element::Double(value)
    }
}

impl From<i32> for Element {
    fn from(value: i32) -> Self {
        Element::Int32(value)
    }
}

impl From<i64> for Element {
    fn from(value: i64) -> Self {
        Element::Int64(value)
    }
}

impl From<bool> for Element {
    fn from(value: bool) -> Self {
        Element::Boolean(value)
    }
}

impl From<&str> for Element {
    fn from(value: &str) -> Self {
        Element::String(value.to_string())
    }
}

impl From<String> for Element {
    fn from(value: String) -> Self {
        Element::String(value)
    }
}

impl From<Document> for Element {
    fn from(value: Document) -> Self {
        Element::Document(value)
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Double(n) => write!(f, "{n}"),
            Element::String(s) => write!(f, "{s:?}"),
            Element::Document(doc) => write!(f, "{doc}"),
            Element::Array(items) => {
                write!(f, "[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Element::Boolean(b) => write!(f, "{b}"),
            Element::DateTime(ms) => write!(f, "Date({ms})"),
            Element::Null => write!(f, "null"),
            Element::Int32(n) => write!(f, "{n}"),
            Element::Int64(n) => write!(f, "NumberLong({n})"),
        }
    }
}

/// Ordered sequence of named fields. Field names are unique; `insert`
/// replaces an existing field in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    fields: Vec<(String, Element)>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Element>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Element>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(key, _)| *key == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Field lookup by name; `None` is the end-of-object marker.
    pub fn get(&self, name: &str) -> Option<&Element> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn element_type(&self, name: &str) -> ElementType {
        self.get(name)
            .map(Element::element_type)
            .unwrap_or(ElementType::EndOfObject)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Element)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(key, _)| key.as_str())
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fields.is_empty() {
            return write!(f, "{{}}");
        }
        write!(f, "{{ ")?;
        for (idx, (key, value)) in self.fields.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{key}: {value}")?;
        }
        write!(f, " }}")
    }
}

impl<K: Into<String>, V: Into<Element>> FromIterator<(K, V)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut doc = Document::new();
        for (key, value) in iter {
            doc.insert(key, value);
        }
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_in_place() {
        let mut doc = Document::new().with("a", 1).with("b", "x");
        doc.insert("a", true);
        assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(doc.get("a"), Some(&Element::Boolean(true)));
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn absent_fields_report_end_of_object() {
        let doc = Document::new().with("n", Element::Null);
        assert!(doc.contains("n"));
        assert!(!doc.contains("m"));
        assert_eq!(doc.element_type("n"), ElementType::Null);
        assert_eq!(doc.element_type("m"), ElementType::EndOfObject);
    }

    #[test]
    fn displays_fields_in_order() {
        let doc: Document = [("a", Element::Int32(1)), ("s", Element::from("x"))]
            .into_iter()
            .collect();
        assert_eq!(doc.to_string(), r#"{ a: 1, s: "x" }"#);
        assert_eq!(Document::new().to_string(), "{}");
    }
}
