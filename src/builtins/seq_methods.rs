//! Shared `tuple`/`bytes` methods (§4.B). Both are immutable sequences, so
//! their method surface is the read-only half of `list`'s. `args`/`kwargs`
//! are borrowed — the caller releases them once this returns.

use super::as_i64;
use crate::{
    eval::Ctx,
    exception::{ExcType, RunResult},
    heap::{HeapData, HeapId},
    value::Value,
};

pub(crate) fn call(ctx: &mut Ctx, id: HeapId, attr: &str, args: &[Value], kwargs: &[(String, Value)]) -> RunResult<Value> {
    if !kwargs.is_empty() {
        let k = kwargs[0].0.clone();
        return Err(super::unexpected_kwarg(ctx, attr, &k));
    }
    let is_bytes = matches!(ctx.heap.get(id), HeapData::Bytes(_));
    match attr {
        "count" => count(ctx, id, args, is_bytes),
        "index" => index_of(ctx, id, args, is_bytes),
        "decode" if is_bytes => decode(ctx, id, args),
        "hex" if is_bytes => hex(ctx, id, args),
        _ => {
            let tn = ctx.heap.type_name(id);
            Err(ctx.heap.raise(ExcType::AttributeError, format!("'{tn}' object has no attribute '{attr}'")))
        }
    }
}

fn len_of(ctx: &Ctx, id: HeapId) -> usize {
    match ctx.heap.get(id) {
        HeapData::Tuple(t) => t.len(),
        HeapData::Bytes(b) => b.len(),
        _ => unreachable!(),
    }
}

fn byte_needle(ctx: &mut Ctx, v: &Value, what: &str) -> RunResult<u8> {
    let n = as_i64(ctx, v, what)?;
    if !(0..=255).contains(&n) {
        return Err(ctx.heap.raise(ExcType::ValueError, "byte must be in range(0, 256)"));
    }
    Ok(n as u8)
}

fn count(ctx: &mut Ctx, id: HeapId, args: &[Value], is_bytes: bool) -> RunResult<Value> {
    if args.len() != 1 {
        return Err(ctx.heap.raise(ExcType::TypeError, format!("count() takes exactly 1 argument ({} given)", args.len())));
    }
    let n = if is_bytes {
        let needle = byte_needle(ctx, &args[0], "byte")?;
        let HeapData::Bytes(b) = ctx.heap.get(id) else { unreachable!() };
        b.data.iter().filter(|&&x| x == needle).count()
    } else {
        ctx.heap.with_tuple(id, |t, heap| t.items.iter().filter(|v| heap.values_equal(v, &args[0])).count())
    };
    Ok(Value::Int(n as i64))
}

fn index_of(ctx: &mut Ctx, id: HeapId, args: &[Value], is_bytes: bool) -> RunResult<Value> {
    if args.is_empty() || args.len() > 3 {
        return Err(ctx.heap.raise(ExcType::TypeError, format!("index() takes 1 to 3 arguments ({} given)", args.len())));
    }
    let len = len_of(ctx, id);
    let start = args.get(1).map(|v| as_i64(ctx, v, "index() start")).transpose()?;
    let stop = args.get(2).map(|v| as_i64(ctx, v, "index() stop")).transpose()?;
    let range = super::slice_indices(len, start, stop, 1);
    let found = if is_bytes {
        let needle = byte_needle(ctx, &args[0], "byte")?;
        let HeapData::Bytes(b) = ctx.heap.get(id) else { unreachable!() };
        range.iter().find(|&&i| b.data[i] == needle).copied()
    } else {
        ctx.heap.with_tuple(id, |t, heap| range.iter().find(|&&i| heap.values_equal(&t.items[i], &args[0])).copied())
    };
    match found {
        Some(i) => Ok(Value::Int(i as i64)),
        None => {
            let repr = ctx.heap.repr(&args[0]);
            Err(ctx.heap.raise(ExcType::ValueError, format!("{repr} is not in sequence")))
        }
    }
}

fn decode(ctx: &mut Ctx, id: HeapId, args: &[Value]) -> RunResult<Value> {
    if let Some(enc) = args.first() {
        let enc = super::as_str_arg(ctx, enc, "encoding")?;
        if !crate::types::str_ops::is_utf8_alias(&enc) {
            return Err(ctx.heap.raise(ExcType::ValueError, format!("unknown encoding: {enc}")));
        }
    }
    let HeapData::Bytes(b) = ctx.heap.get(id) else { unreachable!() };
    let decoded = std::str::from_utf8(&b.data).map(str::to_owned);
    match decoded {
        Ok(s) => ctx.heap.alloc_str(&s),
        Err(_) => Err(ctx.heap.raise(ExcType::ValueError, "invalid utf-8 in bytes literal")),
    }
}

fn hex(ctx: &mut Ctx, id: HeapId, args: &[Value]) -> RunResult<Value> {
    if !args.is_empty() {
        return Err(ctx.heap.raise(ExcType::TypeError, "hex() takes no arguments"));
    }
    let HeapData::Bytes(b) = ctx.heap.get(id) else { unreachable!() };
    let s: String = b.data.iter().map(|byte| format!("{byte:02x}")).collect();
    ctx.heap.alloc_str(&s)
}
