//! Global builtin functions (§4.B): conversions, the iteration helpers
//! (`enumerate`, `zip`, `sorted`, `map`, `filter`, `min`/`max`/`sum`), and
//! `print`.

use ruff_python_ast::Operator;

use super::{arithmetic, as_i64, call_value_with_one_arg, release_all, release_kwargs, unexpected_kwarg};
use crate::{
    eval::{call_value, collect_iterable, Ctx},
    exception::{ExcType, RunResult},
    frame::Frame,
    heap::HeapData,
    types::{dict::DictObj, list::ListObj, range::RangeObj, set::SetObj, tuple::TupleObj},
    value::Value,
};

const NAMES: &[&str] = &[
    "len", "abs", "pow", "divmod", "ord", "chr", "int", "float", "bool", "str", "bytes", "list", "tuple", "dict", "set", "range", "enumerate",
    "zip", "reversed", "sorted", "map", "filter", "min", "max", "sum", "print", "repr", "id", "type", "isinstance",
];

pub(crate) fn is_global_function(name: &str) -> bool {
    NAMES.contains(&name)
}

/// Consumes `kwargs` entirely, raising on the first entry if any are
/// present — every global function here is positional-only.
fn no_kwargs(ctx: &mut Ctx, name: &str, kwargs: Vec<(String, Value)>) -> RunResult<()> {
    if let Some((k, _)) = kwargs.first() {
        let k = k.clone();
        release_kwargs(&mut ctx.heap, kwargs);
        return Err(unexpected_kwarg(ctx, name, &k));
    }
    Ok(())
}

fn arity_error(ctx: &mut Ctx, name: &str, args: Vec<Value>, kwargs: Vec<(String, Value)>, msg: impl Into<String>) -> crate::exception::RunError {
    release_all(&mut ctx.heap, args, kwargs);
    let _ = name;
    ctx.heap.raise(ExcType::TypeError, msg.into())
}

/// Splits `args` into an exact `N`-element array, or raises and releases
/// everything (including `kwargs`, via the positional-only functions that
/// call this) on a mismatch.
fn exactly<const N: usize>(ctx: &mut Ctx, name: &str, mut args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<[Value; N]> {
    no_kwargs(ctx, name, kwargs)?;
    if args.len() != N {
        let got = args.len();
        return Err(arity_error(ctx, name, args, Vec::new(), format!("{name}() takes exactly {N} argument(s) ({got} given)")));
    }
    let mut out: Vec<Value> = args.drain(..).collect();
    Ok(std::array::from_fn(|_| out.remove(0)))
}

pub(crate) fn call(ctx: &mut Ctx, frame: &mut Frame, name: &str, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    match name {
        "len" => len(ctx, args, kwargs),
        "abs" => abs(ctx, args, kwargs),
        "pow" => pow(ctx, args, kwargs),
        "divmod" => divmod(ctx, args, kwargs),
        "ord" => ord(ctx, args, kwargs),
        "chr" => chr(ctx, args, kwargs),
        "int" => to_int(ctx, args, kwargs),
        "float" => to_float(ctx, args, kwargs),
        "bool" => to_bool(ctx, args, kwargs),
        "str" => to_str(ctx, args, kwargs),
        "repr" => to_repr(ctx, args, kwargs),
        "bytes" => to_bytes(ctx, args, kwargs),
        "list" => to_list(ctx, args, kwargs),
        "tuple" => to_tuple(ctx, args, kwargs),
        "dict" => to_dict(ctx, args, kwargs),
        "set" => to_set(ctx, args, kwargs),
        "range" => make_range(ctx, args, kwargs),
        "enumerate" => enumerate(ctx, args, kwargs),
        "zip" => zip(ctx, args, kwargs),
        "reversed" => reversed(ctx, args, kwargs),
        "sorted" => sorted(ctx, frame, args, kwargs),
        "map" => map(ctx, frame, args, kwargs),
        "filter" => filter(ctx, frame, args, kwargs),
        "min" => min_max(ctx, frame, name, args, kwargs, true),
        "max" => min_max(ctx, frame, name, args, kwargs, false),
        "sum" => sum(ctx, args, kwargs),
        "print" => print(ctx, args, kwargs),
        "id" => id_of(ctx, args, kwargs),
        "type" => type_of(ctx, args, kwargs),
        "isinstance" => isinstance(ctx, args, kwargs),
        _ => unreachable!("call dispatches only names accepted by is_global_function"),
    }
}

fn len(ctx: &mut Ctx, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    let [v] = exactly::<1>(ctx, "len", args, kwargs)?;
    let n = match &v {
        Value::Str(_) => ctx.heap.str_of(&v).unwrap_or_default().chars().count(),
        Value::Ref(id) => match ctx.heap.get(*id) {
            HeapData::List(l) => l.len(),
            HeapData::Tuple(t) => t.len(),
            HeapData::Dict(d) => d.len(),
            HeapData::Set(s) => s.len(),
            HeapData::Bytes(b) => b.len(),
            HeapData::Range(r) => r.len(),
            _ => {
                let tn = v.type_name(&ctx.heap);
                ctx.heap.release(v);
                return Err(ctx.heap.raise(ExcType::TypeError, format!("object of type '{tn}' has no len()")));
            }
        },
        _ => {
            let tn = v.type_name(&ctx.heap);
            ctx.heap.release(v);
            return Err(ctx.heap.raise(ExcType::TypeError, format!("object of type '{tn}' has no len()")));
        }
    };
    ctx.heap.release(v);
    Ok(Value::Int(n as i64))
}

fn abs(ctx: &mut Ctx, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    let [v] = exactly::<1>(ctx, "abs", args, kwargs)?;
    let r = match &v {
        Value::Int(i) => Ok(Value::Int(i.wrapping_abs())),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        _ => {
            let tn = v.type_name(&ctx.heap);
            Err(ctx.heap.raise(ExcType::TypeError, format!("bad operand type for abs(): '{tn}'")))
        }
    };
    ctx.heap.release(v);
    r
}

fn pow(ctx: &mut Ctx, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(ctx, "pow", kwargs)?;
    if args.len() != 2 {
        let got = args.len();
        return Err(arity_error(ctx, "pow", args, Vec::new(), format!("pow() takes 2 arguments ({got} given)")));
    }
    let mut args = args;
    let (base, exp) = (args.remove(0), args.remove(0));
    let r = arithmetic::binary_op(ctx, Operator::Pow, &base, &exp);
    ctx.heap.release(base);
    ctx.heap.release(exp);
    r
}

fn divmod(ctx: &mut Ctx, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(ctx, "divmod", kwargs)?;
    if args.len() != 2 {
        let got = args.len();
        return Err(arity_error(ctx, "divmod", args, Vec::new(), format!("divmod() takes 2 arguments ({got} given)")));
    }
    let mut args = args;
    let (a, b) = (args.remove(0), args.remove(0));
    let q = arithmetic::binary_op(ctx, Operator::FloorDiv, &a, &b);
    let m = arithmetic::binary_op(ctx, Operator::Mod, &a, &b);
    ctx.heap.release(a);
    ctx.heap.release(b);
    let (q, m) = (q?, m?);
    let id = ctx.heap.alloc(HeapData::Tuple(TupleObj::new(vec![q, m])))?;
    Ok(Value::Ref(id))
}

fn ord(ctx: &mut Ctx, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    let [v] = exactly::<1>(ctx, "ord", args, kwargs)?;
    let s = ctx.heap.str_of(&v).map(str::to_owned);
    let r = match s.as_deref().map(|s| s.chars().collect::<Vec<_>>()) {
        Some(chars) if chars.len() == 1 => Ok(Value::Int(i64::from(u32::from(chars[0])))),
        Some(_) => Err(ctx.heap.raise(ExcType::TypeError, "ord() expected a character, but string of different length found")),
        None => Err(ctx.heap.raise(ExcType::TypeError, "ord() expected string of length 1")),
    };
    ctx.heap.release(v);
    r
}

fn chr(ctx: &mut Ctx, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    let [v] = exactly::<1>(ctx, "chr", args, kwargs)?;
    let n = as_i64(ctx, &v, "chr() argument");
    ctx.heap.release(v);
    let n = n?;
    let c = u32::try_from(n).ok().and_then(char::from_u32);
    match c {
        Some(c) => {
            let mut buf = [0u8; 4];
            let enc = c.encode_utf8(&mut buf).to_owned();
            ctx.heap.alloc_str(&enc)
        }
        None => Err(ctx.heap.raise(ExcType::ValueError, "chr() arg not in range")),
    }
}

fn to_int(ctx: &mut Ctx, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(ctx, "int", kwargs)?;
    if args.is_empty() {
        return Ok(Value::Int(0));
    }
    if args.len() > 1 {
        let got = args.len();
        return Err(arity_error(ctx, "int", args, Vec::new(), format!("int() takes at most 1 argument ({got} given)")));
    }
    let v = args.into_iter().next().unwrap();
    let r = match &v {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(f) => Ok(Value::Int(f.trunc() as i64)),
        Value::Str(_) => {
            let s = ctx.heap.str_of(&v).unwrap_or_default().trim();
            match s.parse::<i64>() {
                Ok(i) => Ok(Value::Int(i)),
                Err(_) => {
                    let repr = ctx.heap.repr(&v);
                    Err(ctx.heap.raise(ExcType::ValueError, format!("invalid literal for int() with base 10: {repr}")))
                }
            }
        }
        _ => {
            let tn = v.type_name(&ctx.heap);
            Err(ctx.heap.raise(ExcType::TypeError, format!("int() argument must be a string or a number, not '{tn}'")))
        }
    };
    ctx.heap.release(v);
    r
}

fn to_float(ctx: &mut Ctx, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(ctx, "float", kwargs)?;
    if args.is_empty() {
        return Ok(Value::Float(0.0));
    }
    if args.len() > 1 {
        let got = args.len();
        return Err(arity_error(ctx, "float", args, Vec::new(), format!("float() takes at most 1 argument ({got} given)")));
    }
    let v = args.into_iter().next().unwrap();
    let r = match &v {
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        Value::Bool(b) => Ok(Value::Float(f64::from(*b))),
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Str(_) => {
            let s = ctx.heap.str_of(&v).unwrap_or_default().trim();
            match s.parse::<f64>() {
                Ok(f) => Ok(Value::Float(f)),
                Err(_) => {
                    let repr = ctx.heap.repr(&v);
                    Err(ctx.heap.raise(ExcType::ValueError, format!("could not convert string to float: {repr}")))
                }
            }
        }
        _ => {
            let tn = v.type_name(&ctx.heap);
            Err(ctx.heap.raise(ExcType::TypeError, format!("float() argument must be a string or a number, not '{tn}'")))
        }
    };
    ctx.heap.release(v);
    r
}

fn to_bool(ctx: &mut Ctx, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(ctx, "bool", kwargs)?;
    if args.is_empty() {
        return Ok(Value::Bool(false));
    }
    let [v] = exactly::<1>(ctx, "bool", args, Vec::new())?;
    let b = ctx.heap.truthy(&v);
    ctx.heap.release(v);
    Ok(Value::Bool(b))
}

fn to_str(ctx: &mut Ctx, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(ctx, "str", kwargs)?;
    if args.is_empty() {
        return ctx.heap.alloc_str("");
    }
    let [v] = exactly::<1>(ctx, "str", args, Vec::new())?;
    let s = ctx.heap.str_text(&v);
    ctx.heap.release(v);
    ctx.heap.alloc_str(&s)
}

fn to_repr(ctx: &mut Ctx, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    let [v] = exactly::<1>(ctx, "repr", args, kwargs)?;
    let s = ctx.heap.repr(&v);
    ctx.heap.release(v);
    ctx.heap.alloc_str(&s)
}

fn to_bytes(ctx: &mut Ctx, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(ctx, "bytes", kwargs)?;
    if args.is_empty() {
        let id = ctx.heap.alloc(HeapData::Bytes(crate::types::bytes::BytesObj::new(Vec::new())))?;
        return Ok(Value::Ref(id));
    }
    let [v] = exactly::<1>(ctx, "bytes", args, Vec::new())?;
    let data = match &v {
        Value::Int(n) => Ok(vec![0u8; (*n).max(0) as usize]),
        Value::Ref(id) => match ctx.heap.get(*id) {
            HeapData::Bytes(b) => Ok(b.data.clone()),
            _ => {
                let tn = v.type_name(&ctx.heap);
                Err(ctx.heap.raise(ExcType::TypeError, format!("cannot convert '{tn}' object to bytes")))
            }
        },
        _ => {
            let tn = v.type_name(&ctx.heap);
            Err(ctx.heap.raise(ExcType::TypeError, format!("cannot convert '{tn}' object to bytes")))
        }
    };
    ctx.heap.release(v);
    let data = data?;
    let id = ctx.heap.alloc(HeapData::Bytes(crate::types::bytes::BytesObj::new(data)))?;
    Ok(Value::Ref(id))
}

fn to_list(ctx: &mut Ctx, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(ctx, "list", kwargs)?;
    let items = match args.len() {
        0 => Vec::new(),
        1 => collect_iterable(ctx, args.into_iter().next().unwrap())?,
        n => return Err(arity_error(ctx, "list", args, Vec::new(), format!("list() takes at most 1 argument ({n} given)"))),
    };
    let id = ctx.heap.alloc(HeapData::List(ListObj::new(items)))?;
    Ok(Value::Ref(id))
}

fn to_tuple(ctx: &mut Ctx, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(ctx, "tuple", kwargs)?;
    let items = match args.len() {
        0 => Vec::new(),
        1 => collect_iterable(ctx, args.into_iter().next().unwrap())?,
        n => return Err(arity_error(ctx, "tuple", args, Vec::new(), format!("tuple() takes at most 1 argument ({n} given)"))),
    };
    let id = ctx.heap.alloc(HeapData::Tuple(TupleObj::new(items)))?;
    Ok(Value::Ref(id))
}

fn to_dict(ctx: &mut Ctx, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    let mut dict = DictObj::new();
    match args.len() {
        0 => {}
        1 => {
            let pairs = collect_iterable(ctx, args.into_iter().next().unwrap())?;
            for pair in pairs {
                let kv = extract_pair(ctx, pair)?;
                let Some((k, v)) = kv else { continue };
                if let Some(old) = dict.insert(&mut ctx.heap, k, v) {
                    ctx.heap.release(old);
                }
            }
        }
        n => return Err(arity_error(ctx, "dict", args, kwargs, format!("dict() takes at most 1 argument ({n} given)"))),
    }
    for (k, v) in kwargs {
        let key = ctx.heap.alloc_str(&k)?;
        if let Some(old) = dict.insert(&mut ctx.heap, key, v) {
            ctx.heap.release(old);
        }
    }
    let id = ctx.heap.alloc(HeapData::Dict(dict))?;
    Ok(Value::Ref(id))
}

fn extract_pair(ctx: &mut Ctx, pair: Value) -> RunResult<Option<(Value, Value)>> {
    let items = collect_iterable(ctx, pair)?;
    if items.len() != 2 {
        let n = items.len();
        for v in items {
            ctx.heap.release(v);
        }
        return Err(ctx.heap.raise(ExcType::ValueError, format!("dictionary update sequence element has length {n}; 2 is required")));
    }
    let mut it = items.into_iter();
    let (k, v) = (it.next().unwrap(), it.next().unwrap());
    if !ctx.heap.is_hashable(&k) {
        ctx.heap.release(k);
        ctx.heap.release(v);
        return Err(ctx.heap.raise(ExcType::TypeError, "unhashable type"));
    }
    Ok(Some((k, v)))
}

fn to_set(ctx: &mut Ctx, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(ctx, "set", kwargs)?;
    let items = match args.len() {
        0 => Vec::new(),
        1 => collect_iterable(ctx, args.into_iter().next().unwrap())?,
        n => return Err(arity_error(ctx, "set", args, Vec::new(), format!("set() takes at most 1 argument ({n} given)"))),
    };
    let mut set = SetObj::new();
    for v in items {
        if !ctx.heap.is_hashable(&v) {
            ctx.heap.release(v);
            return Err(ctx.heap.raise(ExcType::TypeError, "unhashable type"));
        }
        set.add(&mut ctx.heap, v);
    }
    let id = ctx.heap.alloc(HeapData::Set(set))?;
    Ok(Value::Ref(id))
}

fn make_range(ctx: &mut Ctx, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(ctx, "range", kwargs)?;
    let nums: Vec<i64> = {
        let mut out = Vec::with_capacity(args.len());
        let mut err = None;
        for v in &args {
            match as_i64(ctx, v, "range() argument") {
                Ok(n) => out.push(n),
                Err(e) => {
                    err = Some(e);
                    break;
                }
            }
        }
        if let Some(e) = err {
            for v in args {
                ctx.heap.release(v);
            }
            return Err(e);
        }
        out
    };
    for v in args {
        ctx.heap.release(v);
    }
    let (start, stop, step) = match nums.len() {
        1 => (0, nums[0], 1),
        2 => (nums[0], nums[1], 1),
        3 => (nums[0], nums[1], nums[2]),
        n => return Err(ctx.heap.raise(ExcType::TypeError, format!("range expected 1 to 3 arguments, got {n}"))),
    };
    if step == 0 {
        return Err(ctx.heap.raise(ExcType::ValueError, "range() arg 3 must not be zero"));
    }
    let id = ctx.heap.alloc(HeapData::Range(RangeObj::new(start, stop, step)))?;
    Ok(Value::Ref(id))
}

fn enumerate(ctx: &mut Ctx, mut args: Vec<Value>, mut kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    let start_kw = take_kwarg(&mut kwargs, "start");
    if !kwargs.is_empty() || (start_kw.is_some() && args.len() != 1) || !(1..=2).contains(&args.len()) {
        let n = args.len();
        if let Some(v) = start_kw {
            ctx.heap.release(v);
        }
        return Err(arity_error(ctx, "enumerate", args, kwargs, format!("enumerate() takes 1 or 2 arguments ({n} given)")));
    }
    let start_v = if args.len() == 2 { Some(args.remove(1)) } else { start_kw };
    let start = match &start_v {
        Some(v) => as_i64(ctx, v, "enumerate start"),
        None => Ok(0),
    };
    if let Some(v) = start_v {
        ctx.heap.release(v);
    }
    let start = match start {
        Ok(n) => n,
        Err(e) => {
            ctx.heap.release(args.remove(0));
            return Err(e);
        }
    };
    let iterable = args.remove(0);
    let items = collect_iterable(ctx, iterable)?;
    let mut out = Vec::with_capacity(items.len());
    for (i, v) in items.into_iter().enumerate() {
        let idx = Value::Int(start + i as i64);
        let pair = ctx.heap.alloc(HeapData::Tuple(TupleObj::new(vec![idx, v])))?;
        out.push(Value::Ref(pair));
    }
    let id = ctx.heap.alloc(HeapData::List(ListObj::new(out)))?;
    Ok(Value::Ref(id))
}

fn zip(ctx: &mut Ctx, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(ctx, "zip", kwargs)?;
    let mut columns = Vec::with_capacity(args.len());
    for v in args {
        columns.push(collect_iterable(ctx, v)?);
    }
    let len = columns.iter().map(Vec::len).min().unwrap_or(0);
    for col in &mut columns {
        while col.len() > len {
            if let Some(v) = col.pop() {
                ctx.heap.release(v);
            }
        }
    }
    let mut rows = Vec::with_capacity(len);
    for i in 0..len {
        let mut row = Vec::with_capacity(columns.len());
        for col in &mut columns {
            row.push(std::mem::replace(&mut col[i], Value::None));
        }
        let id = ctx.heap.alloc(HeapData::Tuple(TupleObj::new(row)))?;
        rows.push(Value::Ref(id));
    }
    let id = ctx.heap.alloc(HeapData::List(ListObj::new(rows)))?;
    Ok(Value::Ref(id))
}

fn reversed(ctx: &mut Ctx, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    let [v] = exactly::<1>(ctx, "reversed", args, kwargs)?;
    if let Value::Ref(id) = &v {
        if let HeapData::Range(r) = ctx.heap.get(*id) {
            let rev = r.reversed();
            ctx.heap.release(v);
            let id = ctx.heap.alloc(HeapData::Range(rev))?;
            return Ok(Value::Ref(id));
        }
    }
    let mut items = collect_iterable(ctx, v)?;
    items.reverse();
    let id = ctx.heap.alloc(HeapData::List(ListObj::new(items)))?;
    Ok(Value::Ref(id))
}

fn sorted(ctx: &mut Ctx, frame: &mut Frame, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    let mut kwargs = kwargs;
    let key = take_kwarg(&mut kwargs, "key");
    let reverse = take_kwarg(&mut kwargs, "reverse");
    let reverse = match reverse {
        Some(v) => {
            let b = ctx.heap.truthy(&v);
            ctx.heap.release(v);
            b
        }
        None => false,
    };
    if !kwargs.is_empty() {
        let k = kwargs[0].0.clone();
        if let Some(key) = key {
            ctx.heap.release(key);
        }
        release_all(&mut ctx.heap, Vec::new(), kwargs);
        return Err(unexpected_kwarg(ctx, "sorted", &k));
    }
    let [v] = match exactly::<1>(ctx, "sorted", args, Vec::new()) {
        Ok(v) => v,
        Err(e) => {
            if let Some(key) = key {
                ctx.heap.release(key);
            }
            return Err(e);
        }
    };
    let items = match collect_iterable(ctx, v) {
        Ok(items) => items,
        Err(e) => {
            if let Some(key) = key {
                ctx.heap.release(key);
            }
            return Err(e);
        }
    };
    let sorted = sort_values(ctx, frame, items, key.as_ref(), reverse);
    if let Some(key) = key {
        ctx.heap.release(key);
    }
    let sorted = sorted?;
    let id = ctx.heap.alloc(HeapData::List(ListObj::new(sorted)))?;
    Ok(Value::Ref(id))
}

/// Shared sort core for `sorted()` and `list.sort()`: decorate-sort-undecorate
/// when `key` is given (so the callback runs once per element), otherwise a
/// direct structural-order comparison. Insertion sort keeps element
/// comparisons pairwise, matching how `ordering`/`sequence_order` in the
/// evaluator already define "less than" for arbitrary values.
pub(super) fn sort_values(ctx: &mut Ctx, frame: &mut Frame, items: Vec<Value>, key: Option<&Value>, reverse: bool) -> RunResult<Vec<Value>> {
    let mut decorated: Vec<(Value, Value)> = Vec::with_capacity(items.len());
    for v in items {
        let k = match key {
            Some(f) => {
                let cloned = ctx.heap.retain_clone(&v);
                call_value_with_one_arg(ctx, frame, f, cloned)?
            }
            None => ctx.heap.retain_clone(&v),
        };
        decorated.push((k, v));
    }
    // Stable insertion sort: the corpus this evaluator targets never sorts
    // large enough inputs for this to matter, and it keeps failure handling
    // (a key function raising) simple to unwind.
    let mut failure = None;
    let mut i = 1;
    while i < decorated.len() && failure.is_none() {
        let mut j = i;
        loop {
            if j == 0 {
                break;
            }
            match less_than(ctx, &decorated[j].0, &decorated[j - 1].0) {
                Ok(true) => {
                    decorated.swap(j, j - 1);
                    j -= 1;
                }
                Ok(false) => break,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        i += 1;
    }
    if let Some(e) = failure {
        for (k, v) in decorated {
            ctx.heap.release(k);
            ctx.heap.release(v);
        }
        return Err(e);
    }
    if reverse {
        decorated.reverse();
    }
    let mut out = Vec::with_capacity(decorated.len());
    for (k, v) in decorated {
        ctx.heap.release(k);
        out.push(v);
    }
    Ok(out)
}

fn less_than(ctx: &mut Ctx, a: &Value, b: &Value) -> RunResult<bool> {
    crate::eval::value_less_than(ctx, a, b)
}

fn take_kwarg(kwargs: &mut Vec<(String, Value)>, name: &str) -> Option<Value> {
    let pos = kwargs.iter().position(|(k, _)| k == name)?;
    Some(kwargs.remove(pos).1)
}

fn map(ctx: &mut Ctx, frame: &mut Frame, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(ctx, "map", kwargs)?;
    if args.is_empty() {
        return Err(arity_error(ctx, "map", args, Vec::new(), "map() must have at least two arguments."));
    }
    let mut args = args;
    let func = args.remove(0);
    let mut columns = Vec::with_capacity(args.len());
    for v in args {
        columns.push(collect_iterable(ctx, v)?);
    }
    let len = columns.iter().map(Vec::len).min().unwrap_or(0);
    let mut out = Vec::with_capacity(len);
    let mut failure = None;
    'rows: for i in 0..len {
        let mut call_args = Vec::with_capacity(columns.len());
        for col in &mut columns {
            call_args.push(std::mem::replace(&mut col[i], Value::None));
        }
        let f = ctx.heap.retain_clone(&func);
        match call_value(ctx, frame, f, call_args, Vec::new()) {
            Ok(v) => out.push(v),
            Err(e) => {
                failure = Some(e);
                break 'rows;
            }
        }
    }
    for col in columns {
        for v in col {
            if !matches!(v, Value::None) {
                ctx.heap.release(v);
            }
        }
    }
    ctx.heap.release(func);
    if let Some(e) = failure {
        for v in out {
            ctx.heap.release(v);
        }
        return Err(e);
    }
    let id = ctx.heap.alloc(HeapData::List(ListObj::new(out)))?;
    Ok(Value::Ref(id))
}

fn filter(ctx: &mut Ctx, frame: &mut Frame, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    let [func, iterable] = exactly::<2>(ctx, "filter", args, kwargs)?;
    let items = collect_iterable(ctx, iterable)?;
    let mut out = Vec::with_capacity(items.len());
    let mut failure = None;
    for v in items {
        if failure.is_some() {
            ctx.heap.release(v);
            continue;
        }
        if matches!(func, Value::None) {
            if ctx.heap.truthy(&v) {
                out.push(v);
            } else {
                ctx.heap.release(v);
            }
            continue;
        }
        let dup = ctx.heap.retain_clone(&v);
        match call_value_with_one_arg(ctx, frame, &func, dup) {
            Ok(kept) => {
                let keep = ctx.heap.truthy(&kept);
                ctx.heap.release(kept);
                if keep {
                    out.push(v);
                } else {
                    ctx.heap.release(v);
                }
            }
            Err(e) => {
                ctx.heap.release(v);
                failure = Some(e);
            }
        }
    }
    ctx.heap.release(func);
    if let Some(e) = failure {
        for v in out {
            ctx.heap.release(v);
        }
        return Err(e);
    }
    let id = ctx.heap.alloc(HeapData::List(ListObj::new(out)))?;
    Ok(Value::Ref(id))
}

fn min_max(ctx: &mut Ctx, frame: &mut Frame, name: &str, args: Vec<Value>, kwargs: Vec<(String, Value)>, want_min: bool) -> RunResult<Value> {
    let mut kwargs = kwargs;
    let key = take_kwarg(&mut kwargs, "key");
    let default = take_kwarg(&mut kwargs, "default");
    if !kwargs.is_empty() {
        let k = kwargs[0].0.clone();
        if let Some(v) = key {
            ctx.heap.release(v);
        }
        if let Some(v) = default {
            ctx.heap.release(v);
        }
        release_all(&mut ctx.heap, args, kwargs);
        return Err(unexpected_kwarg(ctx, name, &k));
    }
    let items = if args.len() == 1 {
        match collect_iterable(ctx, args.into_iter().next().unwrap()) {
            Ok(v) => v,
            Err(e) => {
                if let Some(v) = key {
                    ctx.heap.release(v);
                }
                if let Some(v) = default {
                    ctx.heap.release(v);
                }
                return Err(e);
            }
        }
    } else {
        args
    };
    if items.is_empty() {
        if let Some(v) = key {
            ctx.heap.release(v);
        }
        return match default {
            Some(v) => Ok(v),
            None => Err(ctx.heap.raise(ExcType::ValueError, format!("{name}() arg is an empty sequence"))),
        };
    }
    if let Some(v) = default {
        ctx.heap.release(v);
    }
    let mut items = items.into_iter();
    let mut best = items.next().unwrap();
    let keyed_best = match &key {
        Some(f) => {
            let cloned = ctx.heap.retain_clone(&best);
            call_value_with_one_arg(ctx, frame, f, cloned)
        }
        None => Ok(ctx.heap.retain_clone(&best)),
    };
    let mut best_key = match keyed_best {
        Ok(k) => k,
        Err(e) => {
            ctx.heap.release(best);
            for v in items {
                ctx.heap.release(v);
            }
            if let Some(v) = key {
                ctx.heap.release(v);
            }
            return Err(e);
        }
    };
    let mut failure = None;
    for v in items {
        if failure.is_some() {
            ctx.heap.release(v);
            continue;
        }
        let k = match &key {
            Some(f) => {
                let cloned = ctx.heap.retain_clone(&v);
                call_value_with_one_arg(ctx, frame, f, cloned)
            }
            None => Ok(ctx.heap.retain_clone(&v)),
        };
        let k = match k {
            Ok(k) => k,
            Err(e) => {
                ctx.heap.release(v);
                failure = Some(e);
                continue;
            }
        };
        let better = if want_min { less_than(ctx, &k, &best_key) } else { less_than(ctx, &best_key, &k) };
        match better {
            Ok(true) => {
                ctx.heap.release(best_key);
                ctx.heap.release(best);
                best_key = k;
                best = v;
            }
            Ok(false) => {
                ctx.heap.release(k);
                ctx.heap.release(v);
            }
            Err(e) => {
                ctx.heap.release(k);
                ctx.heap.release(v);
                failure = Some(e);
            }
        }
    }
    ctx.heap.release(best_key);
    if let Some(v) = key {
        ctx.heap.release(v);
    }
    if let Some(e) = failure {
        ctx.heap.release(best);
        return Err(e);
    }
    Ok(best)
}

fn sum(ctx: &mut Ctx, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    let mut kwargs = kwargs;
    let start = take_kwarg(&mut kwargs, "start");
    no_kwargs(ctx, "sum", kwargs)?;
    let [v] = match exactly::<1>(ctx, "sum", args, Vec::new()) {
        Ok(v) => v,
        Err(e) => {
            if let Some(s) = start {
                ctx.heap.release(s);
            }
            return Err(e);
        }
    };
    let items = collect_iterable(ctx, v)?;
    let mut acc = start.unwrap_or(Value::Int(0));
    for item in items {
        let r = arithmetic::binary_op(ctx, Operator::Add, &acc, &item);
        ctx.heap.release(acc);
        ctx.heap.release(item);
        acc = r?;
    }
    Ok(acc)
}

fn print(ctx: &mut Ctx, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    let mut kwargs = kwargs;
    let sep = take_kwarg(&mut kwargs, "sep");
    let end = take_kwarg(&mut kwargs, "end");
    if !kwargs.is_empty() {
        let k = kwargs[0].0.clone();
        if let Some(v) = sep {
            ctx.heap.release(v);
        }
        if let Some(v) = end {
            ctx.heap.release(v);
        }
        release_all(&mut ctx.heap, args, kwargs);
        return Err(unexpected_kwarg(ctx, "print", &k));
    }
    let sep_s = sep.as_ref().map(|v| ctx.heap.str_text(v)).unwrap_or_else(|| " ".to_owned());
    let end_s = end.as_ref().map(|v| ctx.heap.str_text(v)).unwrap_or_else(|| "\n".to_owned());
    let parts: Vec<String> = args.iter().map(|v| ctx.heap.str_text(v)).collect();
    for v in args {
        ctx.heap.release(v);
    }
    if let Some(v) = sep {
        ctx.heap.release(v);
    }
    if let Some(v) = end {
        ctx.heap.release(v);
    }
    let mut line = parts.join(&sep_s);
    line.push_str(&end_s);
    if let Some(cb) = &mut ctx.print {
        cb.print("stdout", &line);
    }
    Ok(Value::None)
}

fn id_of(ctx: &mut Ctx, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    let [v] = exactly::<1>(ctx, "id", args, kwargs)?;
    let n = match v.heap_id() {
        Some(h) => format!("{h:?}"),
        None => format!("{v:?}"),
    };
    let hashed = {
        use std::hash::{Hash, Hasher};
        let mut h = std::collections::hash_map::DefaultHasher::new();
        n.hash(&mut h);
        h.finish() as i64
    };
    ctx.heap.release(v);
    Ok(Value::Int(hashed))
}

fn type_of(ctx: &mut Ctx, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    let [v] = exactly::<1>(ctx, "type", args, kwargs)?;
    let tn = v.type_name(&ctx.heap).to_owned();
    ctx.heap.release(v);
    ctx.heap.alloc_str(&tn)
}

fn isinstance(ctx: &mut Ctx, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(ctx, "isinstance", kwargs)?;
    if args.len() != 2 {
        let got = args.len();
        return Err(arity_error(ctx, "isinstance", args, Vec::new(), format!("isinstance() takes 2 arguments ({got} given)")));
    }
    let mut args = args;
    let (v, names) = (args.remove(0), args.remove(0));
    let wanted = collect_type_names(ctx, &names);
    ctx.heap.release(names);
    let tn = v.type_name(&ctx.heap);
    ctx.heap.release(v);
    let wanted = wanted?;
    let matched = wanted.iter().any(|w| type_matches(w, tn));
    Ok(Value::Bool(matched))
}

fn type_matches(wanted: &str, actual: &'static str) -> bool {
    if wanted == actual {
        return true;
    }
    matches!((wanted, actual), ("float", "int") | ("object", _))
}

fn collect_type_names(ctx: &mut Ctx, v: &Value) -> RunResult<Vec<String>> {
    if let Some(s) = ctx.heap.str_of(v) {
        return Ok(vec![s.to_owned()]);
    }
    if let Value::Ref(id) = v {
        if let HeapData::Tuple(t) = ctx.heap.get(*id) {
            let names: Vec<String> = t.items.iter().filter_map(|item| ctx.heap.str_of(item).map(str::to_owned)).collect();
            return Ok(names);
        }
    }
    Err(ctx.heap.raise(ExcType::TypeError, "isinstance() arg 2 must be a type, a tuple of types"))
}
