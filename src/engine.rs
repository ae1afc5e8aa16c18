use std::{cell::Cell, rc::Rc};

use crate::{
    diagnostics::{Result, ScriptError},
    heap::Heap,
    scope::Scope,
};

/// Smallest heap budget a runtime accepts.
pub const MIN_MEMORY_BUDGET: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Bytes of script heap shared by every scope of the runtime.
    pub memory_budget: usize,
    /// Maximum nesting of script function calls.
    pub max_call_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            memory_budget: 8 * 1024 * 1024,
            max_call_depth: 200,
        }
    }
}

impl RuntimeConfig {
    fn validate(&self) -> Result<()> {
        if self.memory_budget < MIN_MEMORY_BUDGET {
            return Err(ScriptError::RuntimeInit(format!(
                "memory budget of {} bytes is below the {MIN_MEMORY_BUDGET} byte minimum",
                self.memory_budget
            )));
        }
        if self.max_call_depth == 0 {
            return Err(ScriptError::RuntimeInit(
                "maximum call depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

pub(crate) struct RuntimeShared {
    pub(crate) config: RuntimeConfig,
    pub(crate) heap: Rc<Heap>,
    live_scopes: Cell<usize>,
    next_scope_id: Cell<u64>,
    shut_down: Cell<bool>,
}

impl RuntimeShared {
    pub(crate) fn scope_opened(&self) -> u64 {
        let id = self.next_scope_id.get() + 1;
        self.next_scope_id.set(id);
        self.live_scopes.set(self.live_scopes.get() + 1);
        id
    }

    pub(crate) fn scope_closed(&self) {
        self.live_scopes.set(self.live_scopes.get().saturating_sub(1));
    }
}

/// Interpreter runtime: the heap budget and the registry of live scopes.
///
/// Scopes keep the shared state alive, so a runtime handle may be dropped
/// before its scopes without invalidating them. The handle is `!Send`; a
/// runtime and its scopes belong to one thread.
pub struct Runtime {
    shared: Rc<RuntimeShared>,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        tracing::debug!(
            memory_budget = config.memory_budget,
            max_call_depth = config.max_call_depth,
            "runtime created"
        );
        Ok(Self {
            shared: Rc::new(RuntimeShared {
                heap: Heap::new(config.memory_budget),
                config,
                live_scopes: Cell::new(0),
                next_scope_id: Cell::new(0),
                shut_down: Cell::new(false),
            }),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.shared.config
    }

    pub fn create_scope(&self) -> Result<Scope> {
        if self.shared.shut_down.get() {
            return Err(ScriptError::RuntimeInit(
                "runtime has been shut down".to_string(),
            ));
        }
        Scope::new(Rc::clone(&self.shared))
    }

    pub fn live_scopes(&self) -> usize {
        self.shared.live_scopes.get()
    }

    pub fn heap_used(&self) -> usize {
        self.shared.heap.used()
    }

    pub fn heap_peak(&self) -> usize {
        self.shared.heap.peak()
    }

    /// Marks the runtime as finished. Fails while any scope is alive; after
    /// success no further scopes can be created.
    pub fn shutdown(&self) -> Result<()> {
        let live = self.live_scopes();
        if live > 0 {
            return Err(ScriptError::RuntimeInUse { live });
        }
        self.shared.shut_down.set(true);
        tracing::debug!(heap_peak = self.heap_peak(), "runtime shut down");
        Ok(())
    }
}
