//! Activation records and the lexical-environment chain (§4.C).
//!
//! A `Namespace` is a name table plus an optional link to the enclosing
//! scope's namespace. Module-level code has no enclosing scope: every name
//! assigned there lives directly in the module namespace. A function's
//! namespace links back to whichever namespace was active when the `def`
//! statement ran, giving "read-through" access to outer variables without
//! a snapshot/closure copy, exactly as §4.C describes.
//!
//! Whether a name read inside a function resolves locally or walks the
//! parent chain is decided by the function's precomputed local-name set
//! (`namespace::collect_locals`): a name in that set is local — and unbound
//! if not yet assigned, which resolves to `NameError` — everything else
//! walks outward.

use std::{cell::RefCell, collections::HashSet, rc::Rc};

use indexmap::IndexMap;

use crate::{heap::Heap, value::Value};

#[derive(Debug, Default)]
pub(crate) struct Namespace {
    vars: IndexMap<String, Value>,
    parent: Option<NamespaceRef>,
}

pub(crate) type NamespaceRef = Rc<RefCell<Namespace>>;

impl Namespace {
    pub(crate) fn root() -> NamespaceRef {
        Rc::new(RefCell::new(Self::default()))
    }

    pub(crate) fn child(parent: NamespaceRef) -> NamespaceRef {
        Rc::new(RefCell::new(Self { vars: IndexMap::new(), parent: Some(parent) }))
    }

    /// Reads a name directly from this namespace only (no parent walk).
    pub(crate) fn get_local(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub(crate) fn contains_local(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Sets a name directly in this namespace, releasing any prior binding.
    pub(crate) fn set_local(&mut self, heap: &mut Heap, name: &str, value: Value) {
        if let Some(old) = self.vars.insert(name.to_owned(), value) {
            heap.release(old);
        }
    }

    pub(crate) fn remove_local(&mut self, heap: &mut Heap, name: &str) -> bool {
        match self.vars.shift_remove(name) {
            Some(old) => {
                heap.release(old);
                true
            }
            None => false,
        }
    }

    pub(crate) fn parent(&self) -> Option<NamespaceRef> {
        self.parent.clone()
    }

    /// Releases every binding this namespace owns. Called when a frame is
    /// torn down so locals drop their heap references promptly instead of
    /// waiting for the whole `Rc` to die (which may outlive the frame if an
    /// inner function captured it).
    pub(crate) fn drain(&mut self, heap: &mut Heap) {
        for (_, v) in self.vars.drain(..) {
            heap.release(v);
        }
    }
}

/// One call's activation record.
pub(crate) struct Frame {
    pub(crate) namespace: NamespaceRef,
    /// `None` for the module frame: every assigned name is local there.
    /// `Some(set)` for a function frame: names in the set are local
    /// (possibly still unbound); everything else reads through `namespace`'s
    /// parent chain.
    pub(crate) local_names: Option<Rc<HashSet<String>>>,
    pub(crate) function_name: String,
    pub(crate) depth: usize,
}

impl Frame {
    pub(crate) fn module(namespace: NamespaceRef) -> Self {
        Self { namespace, local_names: None, function_name: "<module>".to_owned(), depth: 0 }
    }

    pub(crate) fn function(namespace: NamespaceRef, local_names: Rc<HashSet<String>>, function_name: String, depth: usize) -> Self {
        Self { namespace, local_names: Some(local_names), function_name, depth }
    }

    pub(crate) fn is_local(&self, name: &str) -> bool {
        match &self.local_names {
            Some(set) => set.contains(name),
            None => true,
        }
    }
}
