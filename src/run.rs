//! Public interface for running Monty programs (§6).
//!
//! `Program::new` parses and scope-resolves source once; `Program::run` may
//! be called as many times as the host likes against the same parsed tree,
//! each call starting from a brand-new object store — per §6, no state
//! persists between runs.

use std::collections::HashMap;

use ruff_python_ast::Stmt;

use crate::{
    eval::{exec_module, Ctx},
    exception::{ExcType, Exception, RunError},
    frame::{Frame, Namespace},
    function::ExternalObj,
    heap::{Heap, HeapData, HeapId},
    io::PrintCallback,
    object::{self, Object},
    parse::parse,
    resolve::validate_module,
    resource::{LimitedTracker, NoLimitTracker, ResourceLimits},
};

/// Outcome of a host-supplied external function call: the value to return,
/// or a message describing why the host side failed.
pub type ExternalResult = Result<Object, String>;

/// A host callback invokable from Monty code under a declared name.
/// Receives the call's positional arguments and keyword arguments,
/// materialized one level deep (§9).
pub type ExternalFunction = Box<dyn FnMut(Vec<Object>, HashMap<String, Object>) -> ExternalResult>;

/// A parsed, scope-validated Monty program, ready to run.
///
/// Parsing and validation happen once in `new`; `run` may be called
/// repeatedly, each time against a fresh heap.
pub struct Program {
    body: Vec<Stmt>,
    declared_input_names: Vec<String>,
    declared_external_function_names: Vec<String>,
}

impl Program {
    /// Parses `source` and rejects anything outside the supported subset.
    ///
    /// # Errors
    /// Returns a `SyntaxError` `Exception` if `source` fails to parse, or
    /// uses a construct the evaluator doesn't support.
    pub fn new(
        source: &str,
        declared_input_names: impl IntoIterator<Item = impl Into<String>>,
        declared_external_function_names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, Exception> {
        let module = parse(source)?;
        validate_module(&module.body)?;
        Ok(Self {
            body: module.body.to_vec(),
            declared_input_names: declared_input_names.into_iter().map(Into::into).collect(),
            declared_external_function_names: declared_external_function_names.into_iter().map(Into::into).collect(),
        })
    }

    /// Runs the program to completion against a fresh object store.
    ///
    /// Returns the materialized value of the final top-level expression, or
    /// `Object::None` as the null sentinel if the last statement isn't an
    /// expression.
    ///
    /// # Errors
    /// Returns the program's uncaught `Exception` — including one raised by
    /// the resource governor, or one reporting an inputs/external-function
    /// declaration mismatch (§6, §7).
    pub fn run(
        &self,
        inputs: Option<HashMap<String, Object>>,
        external_functions: Option<HashMap<String, ExternalFunction>>,
        print_callback: Option<&mut dyn PrintCallback>,
        limits: Option<ResourceLimits>,
    ) -> Result<Object, Exception> {
        let tracker: Box<dyn crate::resource::ResourceTracker> = match limits {
            Some(limits) => Box::new(LimitedTracker::new(limits)),
            None => Box::new(NoLimitTracker::new()),
        };
        let mut heap = Heap::new(tracker);
        let declared_externals = self.declared_external_function_names.iter().cloned().collect();
        let namespace = Namespace::root();

        let outcome = self
            .bind_inputs(&mut heap, &namespace, inputs)
            .and_then(|()| self.bind_externals(&mut heap, &namespace, external_functions));

        let outcome = match outcome {
            Ok(()) => {
                let mut ctx = Ctx::new(heap, declared_externals, print_callback);
                let mut frame = Frame::module(namespace.clone());
                let result = match exec_module(&mut ctx, &mut frame, &self.body) {
                    Ok(Some(v)) => {
                        let obj = object::materialize(&ctx.heap, &v);
                        ctx.heap.release(v);
                        Ok(obj)
                    }
                    Ok(None) => Ok(Object::None),
                    Err(e) => Err(self.materialize_error(&mut ctx.heap, e)),
                };
                namespace.borrow_mut().drain(&mut ctx.heap);
                heap = ctx.heap;
                result
            }
            Err(exc) => {
                namespace.borrow_mut().drain(&mut heap);
                Err(exc)
            }
        };
        heap.collect_cycles();
        outcome
    }

    fn bind_inputs(&self, heap: &mut Heap, namespace: &crate::frame::NamespaceRef, inputs: Option<HashMap<String, Object>>) -> Result<(), Exception> {
        let inputs = inputs.unwrap_or_default();
        if self.declared_input_names.is_empty() && !inputs.is_empty() {
            return Err(Exception::new(ExcType::TypeError, "program declares no inputs but inputs were provided"));
        }
        for name in &self.declared_input_names {
            let Some(obj) = inputs.get(name) else {
                return Err(Exception::new(ExcType::KeyError, format!("missing required input '{name}'")));
            };
            let value = object::internalize(heap, obj).map_err(|e| self.materialize_error(heap, e))?;
            namespace.borrow_mut().set_local(heap, name, value);
        }
        Ok(())
    }

    /// Binds each declared external name whose callback the host actually
    /// supplied. A declared name left unbound (host omitted the whole map,
    /// or omitted just that key) surfaces as `RuntimeError` the first time
    /// Monty code reads it — see `eval::eval_name_fallback`.
    fn bind_externals(
        &self,
        heap: &mut Heap,
        namespace: &crate::frame::NamespaceRef,
        external_functions: Option<HashMap<String, ExternalFunction>>,
    ) -> Result<(), Exception> {
        let Some(mut externals) = external_functions else { return Ok(()) };
        for name in &self.declared_external_function_names {
            let Some(func) = externals.remove(name) else { continue };
            let id = heap
                .alloc(HeapData::External(ExternalObj { name: name.clone(), func }))
                .map_err(|e| self.materialize_error(heap, e))?;
            namespace.borrow_mut().set_local(heap, name, crate::value::Value::Ref(id));
        }
        Ok(())
    }

    /// Converts an internal `RunError` into the host-visible `Exception`,
    /// then releases the backing heap cell: once captured in an owned
    /// `Exception`, nothing still roots it, so invariant 9 (zero live cells
    /// after `run` returns or raises) requires the explicit release here
    /// rather than waiting on a GC pass that would never reclaim it.
    fn materialize_error(&self, heap: &mut Heap, err: RunError) -> Exception {
        match err {
            RunError::Internal(msg) => Exception::new(ExcType::RuntimeError, msg),
            RunError::Raise(id) | RunError::Uncatchable(id) => {
                let exc = exception_from_heap(heap, id);
                heap.release(crate::value::Value::Ref(id));
                exc
            }
        }
    }
}

fn exception_from_heap(heap: &Heap, id: HeapId) -> Exception {
    let HeapData::Exception(e) = heap.get(id) else {
        return Exception::new(ExcType::RuntimeError, "raised value is not an exception");
    };
    let message = heap.exception_message(e).map(str::to_owned);
    let cause = e.cause.map(|c| Box::new(exception_from_heap(heap, c)));
    Exception { kind: e.kind, message, cause }
}
