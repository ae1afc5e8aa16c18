use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    mem,
    rc::{Rc, Weak},
};

use crate::{
    diagnostics::{Result, ScriptError},
    environment::{Environment, EnvironmentRef},
    value::{Object, ObjectKind, ObjectRef, Value, ValueKind},
};

pub(crate) const OBJECT_COST: usize = mem::size_of::<Object>();
pub(crate) const SLOT_COST: usize = mem::size_of::<(String, Value)>();

/// Runtime-wide memory budget shared by every scope of one runtime.
#[derive(Debug)]
pub struct Heap {
    budget: usize,
    used: Cell<usize>,
    peak: Cell<usize>,
}

impl Heap {
    pub fn new(budget: usize) -> Rc<Self> {
        Rc::new(Self {
            budget,
            used: Cell::new(0),
            peak: Cell::new(0),
        })
    }

    pub fn used(&self) -> usize {
        self.used.get()
    }

    pub fn peak(&self) -> usize {
        self.peak.get()
    }

    pub fn charge(self: &Rc<Self>, bytes: usize) -> Result<HeapCharge> {
        self.reserve(bytes)?;
        Ok(HeapCharge {
            heap: Rc::clone(self),
            bytes,
        })
    }

    /// Bytes that can still be charged.
    pub fn available(&self) -> usize {
        self.budget.saturating_sub(self.used.get())
    }

    fn fits(&self, bytes: usize) -> bool {
        bytes <= self.available()
    }

    fn exhausted(&self, requested: usize) -> ScriptError {
        tracing::warn!(budget = self.budget, requested, "script heap budget exceeded");
        ScriptError::OutOfMemory {
            budget: self.budget,
        }
    }

    fn reserve(&self, bytes: usize) -> Result<()> {
        let used = self.used.get().saturating_add(bytes);
        if used > self.budget {
            return Err(self.exhausted(bytes));
        }
        self.used.set(used);
        if used > self.peak.get() {
            self.peak.set(used);
        }
        Ok(())
    }

    fn release(&self, bytes: usize) {
        self.used.set(self.used.get().saturating_sub(bytes));
    }
}

/// Bytes held against a [`Heap`]; returned when dropped.
#[derive(Debug)]
pub struct HeapCharge {
    heap: Rc<Heap>,
    bytes: usize,
}

impl HeapCharge {
    pub fn grow(&mut self, bytes: usize) -> Result<()> {
        self.heap.reserve(bytes)?;
        self.bytes += bytes;
        Ok(())
    }

    pub fn shrink(&mut self, bytes: usize) {
        let bytes = bytes.min(self.bytes);
        self.heap.release(bytes);
        self.bytes -= bytes;
    }
}

impl Drop for HeapCharge {
    fn drop(&mut self) {
        self.heap.release(self.bytes);
    }
}

/// Per-scope allocation registry.
///
/// Objects and closure environments can form `Rc` cycles (a closure stored in
/// the environment it captures, an object holding itself). The realm keeps
/// weak handles to everything it hands out. [`Realm::collect`] frees cycles
/// nothing outside the script graph refers to, and tearing a scope down clears
/// whatever is left.
#[derive(Debug)]
pub struct Realm {
    heap: Rc<Heap>,
    objects: RefCell<Vec<Weak<RefCell<Object>>>>,
    environments: RefCell<Vec<Weak<RefCell<Environment>>>>,
    collect_at: Cell<usize>,
}

const COLLECT_THRESHOLD: usize = 256;

/// Room always granted to text conversion, enough for any scalar.
const SCALAR_TEXT: usize = 256;

impl Realm {
    pub fn new(heap: Rc<Heap>) -> Rc<Self> {
        Rc::new(Self {
            heap,
            objects: RefCell::new(Vec::new()),
            environments: RefCell::new(Vec::new()),
            collect_at: Cell::new(COLLECT_THRESHOLD),
        })
    }

    pub fn alloc_object(&self, kind: ObjectKind) -> Result<ObjectRef> {
        let extra = match &kind {
            ObjectKind::Array(items) => items.len().saturating_mul(SLOT_COST),
            _ => 0,
        };
        let charge = self.charge(OBJECT_COST.saturating_add(extra))?;
        let object = Rc::new(RefCell::new(Object::new(kind, charge)));
        self.objects.borrow_mut().push(Rc::downgrade(&object));
        self.maybe_collect();
        Ok(object)
    }

    /// Wraps text produced by a script, charging its length to the heap.
    pub fn alloc_string(&self, text: String) -> Result<Value> {
        let charge = self.charge(text.len())?;
        Ok(Value::charged_string(text, charge))
    }

    /// ToString of `value`. Text rendered from arrays is refused once it
    /// would not fit in the heap.
    pub fn text(&self, value: &Value) -> Result<String> {
        if let Some(text) = value.as_str() {
            return Ok(text.to_string());
        }
        let limit = self.heap.available().max(SCALAR_TEXT);
        value
            .to_text_within(limit)
            .ok_or_else(|| self.heap.exhausted(limit.saturating_add(1)))
    }

    pub(crate) fn exhausted(&self, requested: usize) -> ScriptError {
        self.heap.exhausted(requested)
    }

    pub(crate) fn available(&self) -> usize {
        self.heap.available()
    }

    /// Charges `bytes`, collecting unreachable cycles first when the heap is
    /// too full.
    fn charge(&self, bytes: usize) -> Result<HeapCharge> {
        if !self.heap.fits(bytes) {
            self.collect();
        }
        self.heap.charge(bytes)
    }

    /// Records an environment captured by a closure.
    pub fn track_environment(&self, env: &EnvironmentRef) {
        {
            let mut environments = self.environments.borrow_mut();
            if environments
                .last()
                .is_some_and(|last| std::ptr::eq(last.as_ptr(), Rc::as_ptr(env)))
            {
                return;
            }
            environments.push(Rc::downgrade(env));
        }
        self.maybe_collect();
    }

    pub fn live_objects(&self) -> usize {
        self.objects
            .borrow()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    fn maybe_collect(&self) {
        let len = self.objects.borrow().len() + self.environments.borrow().len();
        if len < self.collect_at.get() {
            return;
        }
        self.collect();
        let live = self.objects.borrow().len() + self.environments.borrow().len();
        self.collect_at.set((live * 2).max(COLLECT_THRESHOLD));
    }

    /// Frees object and environment cycles that nothing outside the script
    /// graph can reach, returning the number of objects freed.
    ///
    /// Every node's strong count is compared with the references coming from
    /// other nodes. Anything with a surplus is held by the host or the
    /// interpreter and is a root; nodes not reachable from a root are
    /// cleared. Nodes that are borrowed right now count as roots.
    pub fn collect(&self) -> usize {
        let mut graph = Graph::default();
        for object in self.objects.borrow().iter().filter_map(Weak::upgrade) {
            graph.insert(Node::Object(object));
        }
        for env in self.environments.borrow().iter().filter_map(Weak::upgrade) {
            graph.insert(Node::Environment(env));
        }
        graph.expand();

        let garbage = graph.unreachable();
        let mut freed = 0;
        for &index in &garbage {
            if graph.nodes[index].clear() {
                freed += 1;
            }
        }
        drop(graph);

        self.objects.borrow_mut().retain(|weak| weak.strong_count() > 0);
        self.environments
            .borrow_mut()
            .retain(|weak| weak.strong_count() > 0);
        if freed > 0 {
            tracing::debug!(freed, "collected unreachable script objects");
        }
        freed
    }

    /// Clears every live object and captured environment.
    pub fn teardown(&self) {
        // Upgrade everything before clearing so no destructor recurses down a
        // long chain.
        let environments: Vec<_> = mem::take(&mut *self.environments.borrow_mut())
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        let objects: Vec<_> = mem::take(&mut *self.objects.borrow_mut())
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        for env in &environments {
            let contents = env.borrow_mut().take_contents();
            drop(contents);
        }
        for object in &objects {
            let contents = object.borrow_mut().take_contents();
            drop(contents);
        }
        self.collect_at.set(COLLECT_THRESHOLD);
    }
}

/// A strong reference into the script graph.
enum Node {
    Object(ObjectRef),
    Environment(EnvironmentRef),
    /// Shared value cell holding an object or a closure.
    Value(Value),
}

impl Node {
    fn from_value(value: &Value) -> Option<Self> {
        matches!(value.kind(), ValueKind::Object(_) | ValueKind::Function(_))
            .then(|| Node::Value(value.clone()))
    }

    fn key(&self) -> usize {
        match self {
            Node::Object(object) => Rc::as_ptr(object) as *const () as usize,
            Node::Environment(env) => Rc::as_ptr(env) as *const () as usize,
            Node::Value(value) => Rc::as_ptr(&value.0) as *const () as usize,
        }
    }

    fn strong_count(&self) -> usize {
        match self {
            Node::Object(object) => Rc::strong_count(object),
            Node::Environment(env) => Rc::strong_count(env),
            Node::Value(value) => Rc::strong_count(&value.0),
        }
    }

    /// Outgoing references, or `None` when the node is borrowed.
    fn children(&self) -> Option<Vec<Node>> {
        match self {
            Node::Object(object) => {
                let object = object.try_borrow().ok()?;
                let elements = object.elements().unwrap_or_default();
                let children: Vec<Node> = object
                    .properties()
                    .map(|(_, value)| value)
                    .chain(elements)
                    .filter_map(Node::from_value)
                    .collect();
                Some(children)
            }
            Node::Environment(env) => {
                let env = env.try_borrow().ok()?;
                let mut children: Vec<Node> = env.values().filter_map(Node::from_value).collect();
                children.extend(env.parent().cloned().map(Node::Environment));
                Some(children)
            }
            Node::Value(value) => Some(match value.kind() {
                ValueKind::Object(object) => vec![Node::Object(Rc::clone(object))],
                ValueKind::Function(function) => vec![Node::Environment(Rc::clone(&function.env))],
                _ => Vec::new(),
            }),
        }
    }

    /// Empties the node; true when it was an object.
    fn clear(&self) -> bool {
        match self {
            Node::Object(object) => {
                if let Ok(mut object) = object.try_borrow_mut() {
                    let contents = object.take_contents();
                    drop(object);
                    drop(contents);
                }
                true
            }
            Node::Environment(env) => {
                if let Ok(mut env) = env.try_borrow_mut() {
                    let contents = env.take_contents();
                    drop(env);
                    drop(contents);
                }
                false
            }
            Node::Value(_) => false,
        }
    }
}

#[derive(Default)]
struct Graph {
    nodes: Vec<Node>,
    index: HashMap<usize, usize>,
    /// Outgoing edges per node; `None` for nodes that could not be inspected.
    edges: Vec<Option<Vec<usize>>>,
}

impl Graph {
    fn insert(&mut self, node: Node) -> usize {
        let key = node.key();
        if let Some(&index) = self.index.get(&key) {
            return index;
        }
        self.nodes.push(node);
        self.index.insert(key, self.nodes.len() - 1);
        self.nodes.len() - 1
    }

    fn expand(&mut self) {
        let mut cursor = 0;
        while cursor < self.nodes.len() {
            let targets = self.nodes[cursor].children().map(|children| {
                children
                    .into_iter()
                    .map(|child| self.insert(child))
                    .collect::<Vec<_>>()
            });
            self.edges.push(targets);
            cursor += 1;
        }
    }

    fn unreachable(&self) -> Vec<usize> {
        let mut internal = vec![0usize; self.nodes.len()];
        for targets in self.edges.iter().flatten() {
            for &target in targets {
                internal[target] += 1;
            }
        }
        // The graph itself holds one reference to every node.
        let mut pending: Vec<usize> = (0..self.nodes.len())
            .filter(|&index| {
                self.edges[index].is_none()
                    || self.nodes[index].strong_count().saturating_sub(1) > internal[index]
            })
            .collect();
        let mut reachable = vec![false; self.nodes.len()];
        while let Some(index) = pending.pop() {
            if mem::replace(&mut reachable[index], true) {
                continue;
            }
            if let Some(targets) = &self.edges[index] {
                pending.extend(targets.iter().copied().filter(|&target| !reachable[target]));
            }
        }
        (0..self.nodes.len()).filter(|&index| !reachable[index]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::UserFunction;

    #[test]
    fn collect_frees_only_unreachable_cycles() {
        let heap = Heap::new(1 << 20);
        let realm = Realm::new(Rc::clone(&heap));
        let kept = realm.alloc_object(ObjectKind::Plain).expect("alloc");
        let lost = realm.alloc_object(ObjectKind::Plain).expect("alloc");
        for object in [&kept, &lost] {
            let me = Value::object(Rc::clone(object));
            object.borrow_mut().set_own("me", me).expect("set");
        }
        let used = heap.used();
        drop(lost);

        assert_eq!(realm.collect(), 1);
        assert_eq!(realm.live_objects(), 1);
        assert!(heap.used() < used);
        assert!(kept.borrow().get_own("me").is_some());
    }

    #[test]
    fn collect_breaks_closures_stored_in_their_own_frame() {
        let realm = Realm::new(Heap::new(1 << 20));
        let frame = Environment::new();
        realm.track_environment(&frame);
        let closure = Value::new(ValueKind::Function(UserFunction {
            name: None,
            params: Vec::new(),
            body: Rc::new(Vec::new()),
            env: Rc::clone(&frame),
        }));
        frame.borrow_mut().define("f".into(), closure, true);
        let weak = Rc::downgrade(&frame);

        realm.collect();
        assert!(weak.upgrade().is_some());

        drop(frame);
        realm.collect();
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn strings_charge_their_length() {
        let heap = Heap::new(1 << 10);
        let realm = Realm::new(Rc::clone(&heap));
        let text = realm.alloc_string("x".repeat(100)).expect("fits");
        assert_eq!(heap.used(), 100);
        assert!(matches!(
            realm.alloc_string("x".repeat(1 << 10)),
            Err(ScriptError::OutOfMemory { .. })
        ));
        drop(text);
        assert_eq!(heap.used(), 0);
    }
}
