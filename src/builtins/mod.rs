//! The built-in function and method library (§4.B).
//!
//! Split by concern: [`arithmetic`] holds the operator tables; `globals`
//! holds the free functions (`len`, `sorted`, the exception constructors,
//! ...); the remaining modules hold each container type's method surface.
//! Everything here is reached only through the five entry points `eval`
//! calls by name — nothing in this module is itself part of the AST walk.

pub(crate) mod arithmetic;
mod dict_methods;
mod globals;
mod list_methods;
mod seq_methods;
mod set_methods;
mod str_methods;

use crate::{
    eval::Ctx,
    exception::{ExcType, RunError, RunResult},
    frame::Frame,
    heap::{Heap, HeapData},
    types::list::ListObj,
    value::Value,
};

/// Names this module resolves as a bare identifier when nothing in the
/// program's own scopes binds it (`eval::eval_name_fallback`), and that
/// `call_builtin` accepts by name.
pub(crate) fn is_builtin(name: &str) -> bool {
    globals::is_global_function(name) || name.parse::<ExcType>().is_ok_and(|k| k != ExcType::StopIteration)
}

/// Dispatches a call to a name resolved as a builtin (§4.B). Exception
/// names double as their own constructor: `ValueError("bad")` builds an
/// exception instance rather than raising one outright.
pub(crate) fn call_builtin(ctx: &mut Ctx, frame: &mut Frame, name: &str, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    if let Ok(kind) = name.parse::<ExcType>() {
        if kind != ExcType::StopIteration {
            return construct_exception(ctx, kind, args, kwargs);
        }
    }
    globals::call(ctx, frame, name, args, kwargs)
}

fn construct_exception(ctx: &mut Ctx, kind: ExcType, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    release_kwargs(&mut ctx.heap, kwargs);
    let id = ctx.heap.alloc(HeapData::Exception(crate::exception::ExceptionObject { kind, args, cause: None }))?;
    Ok(Value::Ref(id))
}

/// Dispatches a method call once the receiver is known (§4.B). `recv`,
/// `args`, and `kwargs` are always consumed — every arm releases them on
/// every path, success or failure.
pub(crate) fn call_method(ctx: &mut Ctx, frame: &mut Frame, recv: Value, attr: &str, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    let result = match &recv {
        Value::Str(_) => str_methods::call(ctx, &recv, attr, &args, &kwargs),
        Value::Ref(id) => {
            let id = *id;
            let kind = match ctx.heap.get(id) {
                HeapData::List(_) => 0,
                HeapData::Dict(_) => 1,
                HeapData::Set(_) => 2,
                HeapData::Tuple(_) | HeapData::Bytes(_) => 3,
                _ => 4,
            };
            match kind {
                0 => list_methods::call(ctx, frame, id, attr, &args, &kwargs),
                1 => dict_methods::call(ctx, id, attr, &args, &kwargs),
                2 => set_methods::call(ctx, id, attr, &args, &kwargs),
                3 => seq_methods::call(ctx, id, attr, &args, &kwargs),
                _ => {
                    let tn = ctx.heap.type_name(id);
                    Err(ctx.heap.raise(ExcType::AttributeError, format!("'{tn}' object has no attribute '{attr}'")))
                }
            }
        }
        _ => {
            let tn = recv.type_name(&ctx.heap);
            Err(ctx.heap.raise(ExcType::AttributeError, format!("'{tn}' object has no attribute '{attr}'")))
        }
    };
    for v in args {
        ctx.heap.release(v);
    }
    release_kwargs(&mut ctx.heap, kwargs);
    ctx.heap.release(recv);
    result
}

// --- shared argument helpers ------------------------------------------

pub(crate) fn release_kwargs(heap: &mut Heap, kwargs: Vec<(String, Value)>) {
    for (_, v) in kwargs {
        heap.release(v);
    }
}

pub(crate) fn release_all(heap: &mut Heap, args: Vec<Value>, kwargs: Vec<(String, Value)>) {
    for v in args {
        heap.release(v);
    }
    release_kwargs(heap, kwargs);
}

pub(crate) fn kwarg<'a>(kwargs: &'a [(String, Value)], name: &str) -> Option<&'a Value> {
    kwargs.iter().find(|(k, _)| k == name).map(|(_, v)| v)
}

pub(crate) fn too_many_args(ctx: &mut Ctx, func: &str, max: usize, got: usize) -> RunError {
    ctx.heap.raise(ExcType::TypeError, format!("{func}() takes at most {max} argument(s) ({got} given)"))
}

pub(crate) fn unexpected_kwarg(ctx: &mut Ctx, func: &str, name: &str) -> RunError {
    ctx.heap.raise(ExcType::TypeError, format!("{func}() got an unexpected keyword argument '{name}'"))
}

/// Reads an `i64` index/count argument, accepting `bool` the way real index
/// arguments do throughout this evaluator.
pub(crate) fn as_i64(ctx: &mut Ctx, v: &Value, what: &str) -> RunResult<i64> {
    match v {
        Value::Int(i) => Ok(*i),
        Value::Bool(b) => Ok(i64::from(*b)),
        _ => Err(ctx.heap.raise(ExcType::TypeError, format!("{what} must be an integer"))),
    }
}

pub(crate) fn as_f64_checked(ctx: &mut Ctx, v: &Value, what: &str) -> RunResult<f64> {
    match v {
        Value::Int(i) => Ok(*i as f64),
        Value::Bool(b) => Ok(f64::from(*b)),
        Value::Float(f) => Ok(*f),
        _ => Err(ctx.heap.raise(ExcType::TypeError, format!("{what} must be a number"))),
    }
}

pub(crate) fn as_str_arg(ctx: &mut Ctx, v: &Value, what: &str) -> RunResult<String> {
    match ctx.heap.str_of(v) {
        Some(s) => Ok(s.to_owned()),
        None => Err(ctx.heap.raise(ExcType::TypeError, format!("{what} must be a string"))),
    }
}

// --- indexing & slicing -------------------------------------------------

/// `recv[key]` (§4.A/§4.B): dispatches by receiver type, borrowed on both
/// sides so the caller (`eval::eval_subscript`) keeps ownership of both.
pub(crate) fn get_item(ctx: &mut Ctx, recv: &Value, key: &Value) -> RunResult<Value> {
    match recv {
        Value::Str(_) => {
            let idx = as_i64(ctx, key, "string index")?;
            let found = crate::types::str_ops::char_at(ctx.heap.str_of(recv).unwrap_or_default(), idx);
            match found {
                Some(c) => {
                    let mut buf = [0u8; 4];
                    let enc = c.encode_utf8(&mut buf).to_owned();
                    ctx.heap.alloc_str(&enc)
                }
                None => Err(ctx.heap.raise(ExcType::IndexError, "string index out of range")),
            }
        }
        Value::Ref(id) => {
            let id = *id;
            match ctx.heap.get(id) {
                HeapData::List(_) => {
                    let idx = as_i64(ctx, key, "list index")?;
                    let dup = match ctx.heap.get(id) {
                        HeapData::List(l) => l.get(idx).map(|v| ctx.heap.shallow_copy_of(v)),
                        _ => unreachable!(),
                    };
                    match dup {
                        Some(v) => Ok(ctx.heap.finish_retain(v)),
                        None => Err(ctx.heap.raise(ExcType::IndexError, "list index out of range")),
                    }
                }
                HeapData::Tuple(_) => {
                    let idx = as_i64(ctx, key, "tuple index")?;
                    let dup = match ctx.heap.get(id) {
                        HeapData::Tuple(t) => t.get(idx).map(|v| ctx.heap.shallow_copy_of(v)),
                        _ => unreachable!(),
                    };
                    match dup {
                        Some(v) => Ok(ctx.heap.finish_retain(v)),
                        None => Err(ctx.heap.raise(ExcType::IndexError, "tuple index out of range")),
                    }
                }
                HeapData::Bytes(_) => {
                    let idx = as_i64(ctx, key, "bytes index")?;
                    let byte = match ctx.heap.get(id) {
                        HeapData::Bytes(b) => b.get(idx),
                        _ => unreachable!(),
                    };
                    match byte {
                        Some(byte) => Ok(Value::Int(i64::from(byte))),
                        None => Err(ctx.heap.raise(ExcType::IndexError, "bytes index out of range")),
                    }
                }
                HeapData::Range(_) => {
                    let idx = as_i64(ctx, key, "range index")?;
                    let n = match ctx.heap.get(id) {
                        HeapData::Range(r) => r.get(idx),
                        _ => unreachable!(),
                    };
                    match n {
                        Some(n) => Ok(Value::Int(n)),
                        None => Err(ctx.heap.raise(ExcType::IndexError, "range object index out of range")),
                    }
                }
                HeapData::Dict(_) => {
                    if !ctx.heap.is_hashable(key) {
                        return Err(ctx.heap.raise(ExcType::TypeError, "unhashable type"));
                    }
                    let found = ctx.heap.with_dict(id, |d, heap| d.get(heap, key).map(|v| heap.shallow_copy_of(v)));
                    match found {
                        Some(v) => Ok(ctx.heap.finish_retain(v)),
                        None => {
                            let repr = ctx.heap.repr(key);
                            Err(ctx.heap.raise(ExcType::KeyError, repr))
                        }
                    }
                }
                _ => {
                    let tn = ctx.heap.type_name(id);
                    Err(ctx.heap.raise(ExcType::TypeError, format!("'{tn}' object is not subscriptable")))
                }
            }
        }
        _ => {
            let tn = recv.type_name(&ctx.heap);
            Err(ctx.heap.raise(ExcType::TypeError, format!("'{tn}' object is not subscriptable")))
        }
    }
}

/// `recv[lower:upper:step]`. All three bounds are borrowed and optional.
pub(crate) fn slice_get(
    ctx: &mut Ctx,
    recv: &Value,
    lower: Option<&Value>,
    upper: Option<&Value>,
    step: Option<&Value>,
) -> RunResult<Value> {
    let step = match step {
        Some(v) => as_i64(ctx, v, "slice step")?,
        None => 1,
    };
    if step == 0 {
        return Err(ctx.heap.raise(ExcType::ValueError, "slice step cannot be zero"));
    }
    let lower = lower.map(|v| as_i64(ctx, v, "slice index")).transpose()?;
    let upper = upper.map(|v| as_i64(ctx, v, "slice index")).transpose()?;

    match recv {
        Value::Str(_) => {
            let chars: Vec<char> = ctx.heap.str_of(recv).unwrap_or_default().chars().collect();
            let s: String = slice_indices(chars.len(), lower, upper, step).into_iter().map(|i| chars[i]).collect();
            ctx.heap.alloc_str(&s)
        }
        Value::Ref(id) => {
            let id = *id;
            match ctx.heap.get(id) {
                HeapData::List(l) => {
                    let indices = slice_indices(l.len(), lower, upper, step);
                    let items: Vec<Value> = indices.into_iter().map(|i| ctx.heap.shallow_copy_of(&l.items[i])).collect();
                    let items: Vec<Value> = items.into_iter().map(|v| ctx.heap.finish_retain(v)).collect();
                    Ok(Value::Ref(ctx.heap.alloc(HeapData::List(ListObj::new(items)))?))
                }
                HeapData::Tuple(t) => {
                    let indices = slice_indices(t.len(), lower, upper, step);
                    let items: Vec<Value> = indices.into_iter().map(|i| ctx.heap.shallow_copy_of(&t.items[i])).collect();
                    let items: Vec<Value> = items.into_iter().map(|v| ctx.heap.finish_retain(v)).collect();
                    Ok(Value::Ref(ctx.heap.alloc(HeapData::Tuple(crate::types::TupleObj::new(items)))?))
                }
                HeapData::Bytes(b) => {
                    let indices = slice_indices(b.len(), lower, upper, step);
                    let data: Vec<u8> = indices.into_iter().map(|i| b.data[i]).collect();
                    Ok(Value::Ref(ctx.heap.alloc(HeapData::Bytes(crate::types::BytesObj::new(data)))?))
                }
                HeapData::Range(r) => {
                    let len = r.len();
                    let indices = slice_indices(len, lower, upper, step);
                    let vals: Vec<i64> = indices.into_iter().map(|i| r.nth(i).expect("index within range length")).collect();
                    // A stepped slice of a range may not itself be representable
                    // as a single `(start, stop, step)` triple once its own step
                    // differs from 1, so materialize as a list instead, matching
                    // the pragmatic treatment the rest of this evaluator gives
                    // sliced sequences that don't need to stay lazy.
                    let items: Vec<Value> = vals.into_iter().map(Value::Int).collect();
                    Ok(Value::Ref(ctx.heap.alloc(HeapData::List(ListObj::new(items)))?))
                }
                _ => {
                    let tn = ctx.heap.type_name(id);
                    Err(ctx.heap.raise(ExcType::TypeError, format!("'{tn}' object is not subscriptable")))
                }
            }
        }
        _ => {
            let tn = recv.type_name(&ctx.heap);
            Err(ctx.heap.raise(ExcType::TypeError, format!("'{tn}' object is not subscriptable")))
        }
    }
}

/// CPython's slice-index normalization: explicit bounds clamp into
/// `[0, len]` for a forward step or `[-1, len-1]` for a backward one, so
/// walking from `start` toward `stop` by `step` never runs off either end.
pub(crate) fn slice_indices(len: usize, lower: Option<i64>, upper: Option<i64>, step: i64) -> Vec<usize> {
    let len_i = len as i64;
    let mut out = Vec::new();
    if step > 0 {
        let mut start = lower.map_or(0, |v| if v < 0 { (v + len_i).max(0) } else { v.min(len_i) });
        let stop = upper.map_or(len_i, |v| if v < 0 { (v + len_i).max(0) } else { v.min(len_i) });
        while start < stop {
            out.push(start as usize);
            start += step;
        }
    } else {
        let mut start = lower.map_or(len_i - 1, |v| if v < 0 { (v + len_i).max(-1) } else { v.min(len_i - 1) });
        let stop = upper.map_or(-1, |v| if v < 0 { (v + len_i).max(-1) } else { v.min(len_i - 1) });
        while start > stop {
            out.push(start as usize);
            start += step;
        }
    }
    out
}

/// Reads a positional-or-keyword argument: `args[pos]` if present, else
/// `kwargs` by `name`, else `default`. Used by the handful of builtins
/// (`sorted`, `round`-like numeric conversions) that accept either form.
pub(crate) fn pos_or_kw<'a>(args: &'a [Value], kwargs: &'a [(String, Value)], pos: usize, name: &str) -> Option<&'a Value> {
    args.get(pos).or_else(|| kwarg(kwargs, name))
}

pub(crate) fn call_value_with_one_arg(ctx: &mut Ctx, frame: &mut Frame, func: &Value, arg: Value) -> RunResult<Value> {
    let func = ctx.heap.retain_clone(func);
    crate::eval::call_value(ctx, frame, func, vec![arg], Vec::new())
}
