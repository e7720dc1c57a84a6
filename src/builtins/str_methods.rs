//! `str` methods (§4.B): thin argument-marshalling wrappers around the free
//! functions in [`crate::types::str_ops`], which hold the actual text
//! algorithms. `recv`/`args`/`kwargs` are borrowed — the caller releases
//! them once this returns.

use super::{as_i64, as_str_arg};
use crate::{
    eval::Ctx,
    exception::{ExcType, RunResult},
    types::str_ops,
    value::Value,
};

pub(crate) fn call(ctx: &mut Ctx, recv: &Value, attr: &str, args: &[Value], kwargs: &[(String, Value)]) -> RunResult<Value> {
    if !kwargs.is_empty() {
        let k = kwargs[0].0.clone();
        return Err(super::unexpected_kwarg(ctx, attr, &k));
    }
    let s = ctx.heap.str_of(recv).unwrap_or_default().to_owned();
    match attr {
        "upper" => text(ctx, s.to_uppercase()),
        "lower" => text(ctx, s.to_lowercase()),
        "swapcase" => text(ctx, str_ops::swapcase(&s)),
        "title" => text(ctx, str_ops::title(&s)),
        "capitalize" => text(ctx, str_ops::capitalize(&s)),
        "casefold" => text(ctx, s.to_lowercase()),
        "strip" => {
            let chars = opt_chars(ctx, args)?;
            text(ctx, str_ops::strip(&s, chars.as_deref()))
        }
        "lstrip" => {
            let chars = opt_chars(ctx, args)?;
            text(ctx, str_ops::lstrip(&s, chars.as_deref()))
        }
        "rstrip" => {
            let chars = opt_chars(ctx, args)?;
            text(ctx, str_ops::rstrip(&s, chars.as_deref()))
        }
        "removeprefix" => {
            let prefix = one_str(ctx, attr, args)?;
            text(ctx, str_ops::removeprefix(&s, &prefix))
        }
        "removesuffix" => {
            let suffix = one_str(ctx, attr, args)?;
            text(ctx, str_ops::removesuffix(&s, &suffix))
        }
        "replace" => replace(ctx, &s, args),
        "find" => find(ctx, &s, args, false, false),
        "rfind" => find(ctx, &s, args, true, false),
        "index" => find(ctx, &s, args, false, true),
        "rindex" => find(ctx, &s, args, true, true),
        "count" => count(ctx, &s, args),
        "startswith" => affix(ctx, &s, args, true),
        "endswith" => affix(ctx, &s, args, false),
        "split" => {
            let sep = sep_arg(ctx, args)?;
            let maxsplit = maxsplit_arg(ctx, args)?;
            split_list(ctx, str_ops::split(&s, sep.as_deref(), maxsplit))
        }
        "rsplit" => {
            let sep = sep_arg(ctx, args)?;
            let maxsplit = maxsplit_arg(ctx, args)?;
            split_list(ctx, str_ops::rsplit(&s, sep.as_deref(), maxsplit))
        }
        "splitlines" => {
            let keepends = args.first().map(|v| ctx.heap.truthy(v)).unwrap_or(false);
            split_list(ctx, str_ops::splitlines(&s, keepends))
        }
        "join" => join(ctx, &s, args),
        "partition" => {
            let sep = one_str(ctx, attr, args)?;
            partition_tuple(ctx, str_ops::partition(&s, &sep))
        }
        "rpartition" => {
            let sep = one_str(ctx, attr, args)?;
            partition_tuple(ctx, str_ops::rpartition(&s, &sep))
        }
        "center" => {
            let width = width_arg(ctx, args)?;
            let fill = fill_arg(ctx, args)?;
            text(ctx, str_ops::center(&s, width, fill))
        }
        "ljust" => {
            let width = width_arg(ctx, args)?;
            let fill = fill_arg(ctx, args)?;
            text(ctx, str_ops::ljust(&s, width, fill))
        }
        "rjust" => {
            let width = width_arg(ctx, args)?;
            let fill = fill_arg(ctx, args)?;
            text(ctx, str_ops::rjust(&s, width, fill))
        }
        "zfill" => {
            let width = width_arg(ctx, args)?;
            text(ctx, str_ops::zfill(&s, width))
        }
        "isalpha" => Ok(Value::Bool(str_ops::isalpha(&s))),
        "isdigit" => Ok(Value::Bool(str_ops::isdigit(&s))),
        "isdecimal" => Ok(Value::Bool(str_ops::isdecimal(&s))),
        "isnumeric" => Ok(Value::Bool(str_ops::isnumeric(&s))),
        "isalnum" => Ok(Value::Bool(str_ops::isalnum(&s))),
        "isspace" => Ok(Value::Bool(str_ops::isspace(&s))),
        "islower" => Ok(Value::Bool(str_ops::islower(&s))),
        "isupper" => Ok(Value::Bool(str_ops::isupper(&s))),
        "isascii" => Ok(Value::Bool(str_ops::isascii(&s))),
        "istitle" => Ok(Value::Bool(str_ops::istitle(&s))),
        "isidentifier" => Ok(Value::Bool(str_ops::is_identifier(&s))),
        "encode" => {
            let id = ctx.heap.alloc(crate::heap::HeapData::Bytes(crate::types::bytes::BytesObj::new(s.into_bytes())))?;
            Ok(Value::Ref(id))
        }
        _ => {
            let tn = recv.type_name(&ctx.heap);
            Err(ctx.heap.raise(ExcType::AttributeError, format!("'{tn}' object has no attribute '{attr}'")))
        }
    }
}

fn text(ctx: &mut Ctx, s: String) -> RunResult<Value> {
    ctx.heap.alloc_str(&s)
}

fn one_str(ctx: &mut Ctx, attr: &str, args: &[Value]) -> RunResult<String> {
    match args.first() {
        Some(v) => as_str_arg(ctx, v, "argument"),
        None => Err(ctx.heap.raise(ExcType::TypeError, format!("{attr}() missing required argument"))),
    }
}

fn opt_chars(ctx: &mut Ctx, args: &[Value]) -> RunResult<Option<String>> {
    match args.first() {
        Some(Value::None) | None => Ok(None),
        Some(v) => as_str_arg(ctx, v, "chars").map(Some),
    }
}

fn sep_arg(ctx: &mut Ctx, args: &[Value]) -> RunResult<Option<String>> {
    match args.first() {
        Some(Value::None) | None => Ok(None),
        Some(v) => as_str_arg(ctx, v, "separator").map(Some),
    }
}

fn maxsplit_arg(ctx: &mut Ctx, args: &[Value]) -> RunResult<Option<i64>> {
    match args.get(1) {
        Some(Value::None) | None => Ok(None),
        Some(v) => as_i64(ctx, v, "maxsplit").map(Some),
    }
}

fn width_arg(ctx: &mut Ctx, args: &[Value]) -> RunResult<usize> {
    match args.first() {
        Some(v) => Ok(as_i64(ctx, v, "width")?.max(0) as usize),
        None => Err(ctx.heap.raise(ExcType::TypeError, "width argument required")),
    }
}

fn fill_arg(ctx: &mut Ctx, args: &[Value]) -> RunResult<char> {
    match args.get(1) {
        None => Ok(' '),
        Some(v) => {
            let s = as_str_arg(ctx, v, "fillchar")?;
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(c),
                _ => Err(ctx.heap.raise(ExcType::TypeError, "the fill character must be exactly one character long")),
            }
        }
    }
}

fn start_end(ctx: &mut Ctx, args: &[Value], from: usize) -> RunResult<(Option<i64>, Option<i64>)> {
    let start = match args.get(from) {
        Some(Value::None) | None => None,
        Some(v) => Some(as_i64(ctx, v, "start")?),
    };
    let end = match args.get(from + 1) {
        Some(Value::None) | None => None,
        Some(v) => Some(as_i64(ctx, v, "end")?),
    };
    Ok((start, end))
}

fn replace(ctx: &mut Ctx, s: &str, args: &[Value]) -> RunResult<Value> {
    if args.len() < 2 {
        return Err(ctx.heap.raise(ExcType::TypeError, "replace() takes at least 2 arguments"));
    }
    let from = as_str_arg(ctx, &args[0], "old")?;
    let to = as_str_arg(ctx, &args[1], "new")?;
    let count = match args.get(2) {
        Some(Value::None) | None => None,
        Some(v) => Some(as_i64(ctx, v, "count")?),
    };
    text(ctx, str_ops::replace(s, &from, &to, count))
}

fn find(ctx: &mut Ctx, s: &str, args: &[Value], reverse: bool, raise_on_missing: bool) -> RunResult<Value> {
    if args.is_empty() {
        return Err(ctx.heap.raise(ExcType::TypeError, "find() missing required argument"));
    }
    let needle = as_str_arg(ctx, &args[0], "sub")?;
    let (start, end) = start_end(ctx, args, 1)?;
    let idx = if reverse { str_ops::rfind(s, &needle, start, end) } else { str_ops::find(s, &needle, start, end) };
    if idx < 0 && raise_on_missing {
        return Err(ctx.heap.raise(ExcType::ValueError, "substring not found"));
    }
    Ok(Value::Int(idx))
}

fn count(ctx: &mut Ctx, s: &str, args: &[Value]) -> RunResult<Value> {
    if args.is_empty() {
        return Err(ctx.heap.raise(ExcType::TypeError, "count() missing required argument"));
    }
    let needle = as_str_arg(ctx, &args[0], "sub")?;
    let (start, end) = start_end(ctx, args, 1)?;
    Ok(Value::Int(str_ops::count_substr(s, &needle, start, end) as i64))
}

fn affix(ctx: &mut Ctx, s: &str, args: &[Value], is_start: bool) -> RunResult<Value> {
    if args.is_empty() {
        return Err(ctx.heap.raise(ExcType::TypeError, "missing required argument"));
    }
    let mut owned = Vec::new();
    let prefixes: Vec<&str> = match &args[0] {
        Value::Ref(id) if matches!(ctx.heap.get(*id), crate::heap::HeapData::Tuple(_)) => {
            let crate::heap::HeapData::Tuple(t) = ctx.heap.get(*id) else { unreachable!() };
            for v in &t.items {
                owned.push(ctx.heap.str_of(v).unwrap_or_default().to_owned());
            }
            owned.iter().map(String::as_str).collect()
        }
        v => {
            owned.push(as_str_arg(ctx, v, "prefix")?);
            owned.iter().map(String::as_str).collect()
        }
    };
    let (start, end) = start_end(ctx, args, 1)?;
    let hit = if is_start { str_ops::startswith(s, &prefixes, start, end) } else { str_ops::endswith(s, &prefixes, start, end) };
    Ok(Value::Bool(hit))
}

fn split_list(ctx: &mut Ctx, parts: Vec<String>) -> RunResult<Value> {
    let mut items = Vec::with_capacity(parts.len());
    for p in parts {
        items.push(ctx.heap.alloc_str(&p)?);
    }
    let id = ctx.heap.alloc(crate::heap::HeapData::List(crate::types::list::ListObj::new(items)))?;
    Ok(Value::Ref(id))
}

fn partition_tuple(ctx: &mut Ctx, (a, b, c): (String, String, String)) -> RunResult<Value> {
    let a = ctx.heap.alloc_str(&a)?;
    let b = ctx.heap.alloc_str(&b)?;
    let c = ctx.heap.alloc_str(&c)?;
    let id = ctx.heap.alloc(crate::heap::HeapData::Tuple(crate::types::TupleObj::new(vec![a, b, c])))?;
    Ok(Value::Ref(id))
}

fn join(ctx: &mut Ctx, sep: &str, args: &[Value]) -> RunResult<Value> {
    if args.is_empty() {
        return Err(ctx.heap.raise(ExcType::TypeError, "join() missing required argument"));
    }
    let cloned = ctx.heap.retain_clone(&args[0]);
    let items = crate::eval::collect_iterable(ctx, cloned)?;
    let mut parts = Vec::with_capacity(items.len());
    let mut err = None;
    for v in &items {
        match ctx.heap.str_of(v) {
            Some(s) => parts.push(s.to_owned()),
            None => {
                let tn = v.type_name(&ctx.heap);
                err = Some(ctx.heap.raise(ExcType::TypeError, format!("sequence item: expected str instance, {tn} found")));
                break;
            }
        }
    }
    for v in items {
        ctx.heap.release(v);
    }
    if let Some(e) = err {
        return Err(e);
    }
    text(ctx, parts.join(sep))
}
