//! User-defined functions: signatures, defaults, and argument binding.
//!
//! Mirrors the shape of a Python signature — positional-only, positional-or-
//! keyword, `*args`, keyword-only, `**kwargs` — without the slot-compiled
//! fast paths a bytecode frontend would add; this interpreter tree-walks,
//! so the binding algorithm runs once per call directly against a name map.

use std::{collections::HashSet, rc::Rc};

use indexmap::IndexMap;
use ruff_python_ast as ast;

use crate::{
    exception::{ExcType, RunResult},
    frame::NamespaceRef,
    heap::{Heap, HeapData},
    run::ExternalFunction,
    types::{DictObj, TupleObj},
    value::Value,
};

#[derive(Debug, Default, Clone)]
pub(crate) struct Signature {
    pub(crate) pos_only: Vec<String>,
    pub(crate) pos_or_kw: Vec<String>,
    pub(crate) var_args: Option<String>,
    pub(crate) kw_only: Vec<String>,
    pub(crate) var_kwargs: Option<String>,
}

impl Signature {
    pub(crate) fn from_parameters(params: &ast::Parameters) -> Self {
        let name_of = |p: &ast::ParameterWithDefault| p.parameter.name.id.to_string();
        Self {
            pos_only: params.posonlyargs.iter().map(name_of).collect(),
            pos_or_kw: params.args.iter().map(name_of).collect(),
            var_args: params.vararg.as_ref().map(|v| v.name.id.to_string()),
            kw_only: params.kwonlyargs.iter().map(name_of).collect(),
            var_kwargs: params.kwarg.as_ref().map(|v| v.name.id.to_string()),
        }
    }

    pub(crate) fn positional_params(&self) -> impl Iterator<Item = &String> {
        self.pos_only.iter().chain(self.pos_or_kw.iter())
    }
}

/// A function's executable body: a `def`'s statement block, or a `lambda`'s
/// single expression (evaluated as if it were `return <expr>`).
#[derive(Clone)]
pub(crate) enum Body {
    Block(Rc<[ast::Stmt]>),
    Expr(Rc<ast::Expr>),
}

/// A user-defined (`def`/`lambda`) function, live on the heap.
pub(crate) struct FunctionObj {
    pub(crate) name: String,
    pub(crate) signature: Signature,
    /// Default values keyed by parameter name; only parameters that declared
    /// one appear here. Evaluated once at `def`-execution time.
    pub(crate) defaults: IndexMap<String, Value>,
    pub(crate) body: Body,
    pub(crate) locals: Rc<HashSet<String>>,
    /// The namespace active when `def` ran: module globals for a
    /// module-level function, or the enclosing function's locals for a
    /// nested one. Functions read through it for free variables.
    pub(crate) enclosing: NamespaceRef,
}

impl std::fmt::Debug for FunctionObj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionObj").field("name", &self.name).finish_non_exhaustive()
    }
}

/// A host-supplied external function, bound into the program as a callable
/// value (`BoundExternal`, §3).
pub(crate) struct ExternalObj {
    pub(crate) name: String,
    pub(crate) func: ExternalFunction,
}

impl std::fmt::Debug for ExternalObj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalObj").field("name", &self.name).finish_non_exhaustive()
    }
}

/// A reference to one of the fixed built-in functions (`len`, `abs`,
/// `sorted`, ...). Only materialized on the heap when a builtin is used as a
/// first-class value rather than called directly by name, e.g.
/// `sorted(xs, key=abs)`.
#[derive(Debug, Clone)]
pub(crate) struct BuiltinObj {
    pub(crate) name: String,
}

/// Outcome of binding a call's arguments against a signature: per-parameter
/// bindings ready to install into the callee's namespace.
pub(crate) struct BoundArgs {
    pub(crate) bindings: Vec<(String, Value)>,
}

/// Implements the positional/keyword/defaults/`*args`/`**kwargs` binding
/// algorithm (§4.C). `args`/`kwargs` are consumed; any values not bound to a
/// named parameter are folded into `*args`/`**kwargs` or raise `TypeError`.
pub(crate) fn bind_arguments(
    heap: &mut Heap,
    sig: &Signature,
    defaults: &IndexMap<String, Value>,
    func_name: &str,
    mut args: Vec<Value>,
    mut kwargs: Vec<(String, Value)>,
) -> RunResult<BoundArgs> {
    let positional: Vec<&String> = sig.positional_params().collect();
    let mut bindings: Vec<(String, Value)> = Vec::new();
    let mut bound: HashSet<String> = HashSet::new();

    let mut args_iter = args.drain(..);
    for name in &positional {
        if let Some(v) = args_iter.next() {
            bindings.push(((*name).clone(), v));
            bound.insert((*name).clone());
        } else {
            break;
        }
    }
    let leftover_positional: Vec<Value> = args_iter.collect();

    if !leftover_positional.is_empty() {
        match &sig.var_args {
            Some(name) => {
                let tuple = TupleObj::new(leftover_positional);
                let handle = heap.alloc(HeapData::Tuple(tuple))?;
                bindings.push((name.clone(), Value::Ref(handle)));
            }
            None => {
                for v in leftover_positional {
                    heap.release(v);
                }
                for (_, v) in kwargs {
                    heap.release(v);
                }
                for (_, v) in bindings {
                    heap.release(v);
                }
                return Err(heap.raise(
                    ExcType::TypeError,
                    format!("{func_name}() takes {} positional argument(s) but more were given", positional.len()),
                ));
            }
        }
    } else if let Some(name) = &sig.var_args {
        let handle = heap.alloc(HeapData::Tuple(TupleObj::new(Vec::new())))?;
        bindings.push((name.clone(), Value::Ref(handle)));
    }

    // Match remaining keyword arguments against pos_or_kw (not pos_only,
    // which can never be supplied by name) and kw_only parameters.
    let mut extra_kwargs: Vec<(String, Value)> = Vec::new();
    'outer: for (key, value) in kwargs.drain(..) {
        if sig.pos_only.iter().any(|p| *p == key) {
            extra_kwargs.push((key, value));
            continue;
        }
        for name in sig.pos_or_kw.iter().chain(sig.kw_only.iter()) {
            if *name == key {
                if bound.contains(name) {
                    for (_, v) in bindings {
                        heap.release(v);
                    }
                    heap.release(value);
                    for (_, v) in extra_kwargs {
                        heap.release(v);
                    }
                    return Err(heap.raise(ExcType::TypeError, format!("{func_name}() got multiple values for argument '{key}'")));
                }
                bound.insert(name.clone());
                bindings.push((name.clone(), value));
                continue 'outer;
            }
        }
        extra_kwargs.push((key, value));
    }

    if !extra_kwargs.is_empty() {
        match &sig.var_kwargs {
            Some(name) => {
                let mut dict = DictObj::new();
                for (k, v) in extra_kwargs {
                    let key_val = heap.alloc_str(&k)?;
                    dict.insert(heap, key_val, v);
                }
                let handle = heap.alloc(HeapData::Dict(dict))?;
                bindings.push((name.clone(), Value::Ref(handle)));
            }
            None => {
                let bad = extra_kwargs[0].0.clone();
                for (_, v) in extra_kwargs {
                    heap.release(v);
                }
                for (_, v) in bindings {
                    heap.release(v);
                }
                return Err(heap.raise(ExcType::TypeError, format!("{func_name}() got an unexpected keyword argument '{bad}'")));
            }
        }
    } else if let Some(name) = &sig.var_kwargs {
        let handle = heap.alloc(HeapData::Dict(DictObj::new()))?;
        bindings.push((name.clone(), Value::Ref(handle)));
    }

    // Fill remaining named parameters from defaults, or fail if required.
    for name in positional.iter().copied().chain(sig.kw_only.iter()) {
        if bound.contains(name) {
            continue;
        }
        match defaults.get(name) {
            Some(default) => bindings.push((name.clone(), heap.retain_clone(default))),
            None => {
                for (_, v) in bindings {
                    heap.release(v);
                }
                return Err(heap.raise(ExcType::TypeError, format!("{func_name}() missing required argument: '{name}'")));
            }
        }
    }

    Ok(BoundArgs { bindings })
}
