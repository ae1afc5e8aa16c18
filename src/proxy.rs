use std::{
    cell::Cell,
    fmt,
    rc::{Rc, Weak},
};

use crate::{
    diagnostics::{Result, ScriptError},
    document::Document,
    marshal,
    value::{ObjectRef, Value},
};

/// Script-side view of a host document.
///
/// The proxy object's own properties double as the resolved-field cache: a
/// field read from the document is installed as an ordinary property and the
/// document is never consulted for that name again.
pub struct DocumentProxy {
    document: Weak<Document>,
    reads: Cell<usize>,
}

impl DocumentProxy {
    pub fn new(document: &Rc<Document>) -> Self {
        Self {
            document: Rc::downgrade(document),
            reads: Cell::new(0),
        }
    }

    pub fn is_live(&self) -> bool {
        self.document.strong_count() > 0
    }

    /// Number of times the underlying document has been consulted.
    pub fn reads(&self) -> usize {
        self.reads.get()
    }

    pub fn document(&self) -> Result<Rc<Document>> {
        self.document.upgrade().ok_or(ScriptError::DocumentReleased)
    }

    /// Looks `name` up in the document. `Ok(None)` means the field is absent.
    pub fn resolve(&self, name: &str) -> Result<Option<Value>> {
        let document = self.document()?;
        self.reads.set(self.reads.get() + 1);
        marshal::element_to_value(name, document.get(name))
    }
}

impl fmt::Debug for DocumentProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentProxy")
            .field("live", &self.is_live())
            .field("reads", &self.reads.get())
            .finish()
    }
}

/// Property read with lazy resolution for document proxies.
///
/// Own properties win. For a proxy, a miss is looked up in the document and,
/// when present, materialized as an own property. Absent fields read as
/// `undefined` and leave nothing behind.
pub fn get_property(object: &ObjectRef, name: &str) -> Result<Value> {
    let resolved = {
        let borrowed = object.borrow();
        if let Some(value) = borrowed.get_own(name) {
            return Ok(value.clone());
        }
        match borrowed.proxy() {
            Some(proxy) => proxy.resolve(name)?,
            None => return Ok(Value::undefined()),
        }
    };
    match resolved {
        Some(value) => {
            tracing::trace!(field = name, "materialized document field");
            object.borrow_mut().set_own(name, value.clone())?;
            Ok(value)
        }
        None => {
            tracing::trace!(field = name, "document field not present");
            Ok(Value::undefined())
        }
    }
}

