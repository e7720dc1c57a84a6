//! Binary and unary operators (§4.B, §4.D).
//!
//! Both entry points are borrowed and non-consuming: `eval`'s `binary_op`/
//! `unary_op` wrappers own the operand `Value`s and release them themselves
//! once this module hands back a result (or an error).

use ruff_python_ast::{Operator, UnaryOp};

use crate::{
    eval::Ctx,
    exception::{ExcType, RunResult},
    heap::HeapData,
    types::{BytesObj, ListObj, TupleObj},
    value::Value,
};

/// Arithmetic promotes `Bool` -> `Int` -> `Float` (§4.B).
#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

fn to_num(v: &Value) -> Option<Num> {
    match v {
        Value::Bool(b) => Some(Num::Int(i64::from(*b))),
        Value::Int(i) => Some(Num::Int(*i)),
        Value::Float(f) => Some(Num::Float(*f)),
        _ => None,
    }
}

fn type_name(ctx: &Ctx, v: &Value) -> &'static str {
    v.type_name(&ctx.heap)
}

fn unsupported(ctx: &mut Ctx, op: &str, left: &Value, right: &Value) -> crate::exception::RunError {
    let (lt, rt) = (type_name(ctx, left), type_name(ctx, right));
    ctx.heap.raise(ExcType::TypeError, format!("unsupported operand type(s) for {op}: '{lt}' and '{rt}'"))
}

pub(crate) fn binary_op(ctx: &mut Ctx, op: Operator, left: &Value, right: &Value) -> RunResult<Value> {
    match op {
        Operator::Add => add(ctx, left, right),
        Operator::Mult => mult(ctx, left, right),
        Operator::Sub | Operator::BitAnd | Operator::BitOr | Operator::BitXor => match (to_num(left), to_num(right)) {
            (Some(a), Some(b)) => numeric_op(ctx, op, a, b, left, right),
            _ => set_or_fail(ctx, op, left, right),
        },
        Operator::Div | Operator::FloorDiv | Operator::Mod | Operator::Pow | Operator::LShift | Operator::RShift => match (to_num(left), to_num(right)) {
            (Some(a), Some(b)) => numeric_op(ctx, op, a, b, left, right),
            _ => Err(unsupported(ctx, op_symbol(op), left, right)),
        },
        Operator::MatMult => Err(unsupported(ctx, "@", left, right)),
    }
}

fn set_or_fail(ctx: &mut Ctx, op: Operator, left: &Value, right: &Value) -> RunResult<Value> {
    let (Value::Ref(a), Value::Ref(b)) = (left, right) else {
        return Err(unsupported(ctx, op_symbol(op), left, right));
    };
    let (a, b) = (*a, *b);
    if !matches!(ctx.heap.get(a), HeapData::Set(_)) || !matches!(ctx.heap.get(b), HeapData::Set(_)) {
        return Err(unsupported(ctx, op_symbol(op), left, right));
    }
    let entries = ctx.heap.with_set(a, |sa, heap| {
        heap.with_set(b, |sb, heap| match op {
            Operator::BitOr => {
                let mut out: Vec<Value> = sa.entries.iter().map(|v| heap.shallow_copy_of(v)).collect();
                for v in &sb.entries {
                    if !sa.entries.iter().any(|w| heap.values_equal(v, w)) {
                        out.push(heap.shallow_copy_of(v));
                    }
                }
                out
            }
            Operator::BitAnd => sa.entries.iter().filter(|v| sb.entries.iter().any(|w| heap.values_equal(v, w))).map(|v| heap.shallow_copy_of(v)).collect(),
            Operator::BitXor => {
                let mut out: Vec<Value> = sa.entries.iter().filter(|v| !sb.entries.iter().any(|w| heap.values_equal(v, w))).map(|v| heap.shallow_copy_of(v)).collect();
                out.extend(sb.entries.iter().filter(|v| !sa.entries.iter().any(|w| heap.values_equal(v, w))).map(|v| heap.shallow_copy_of(v)));
                out
            }
            Operator::Sub => sa.entries.iter().filter(|v| !sb.entries.iter().any(|w| heap.values_equal(v, w))).map(|v| heap.shallow_copy_of(v)).collect(),
            _ => unreachable!("only set algebra operators reach here"),
        })
    });
    let entries: Vec<Value> = entries.into_iter().map(|v| ctx.heap.finish_retain(v)).collect();
    let mut set = crate::types::set::SetObj::new();
    for v in entries {
        set.add(&mut ctx.heap, v);
    }
    Ok(Value::Ref(ctx.heap.alloc(HeapData::Set(set))?))
}

fn op_symbol(op: Operator) -> &'static str {
    match op {
        Operator::Add => "+",
        Operator::Sub => "-",
        Operator::Mult => "*",
        Operator::MatMult => "@",
        Operator::Div => "/",
        Operator::Mod => "%",
        Operator::Pow => "**",
        Operator::LShift => "<<",
        Operator::RShift => ">>",
        Operator::BitOr => "|",
        Operator::BitXor => "^",
        Operator::BitAnd => "&",
        Operator::FloorDiv => "//",
    }
}

fn add(ctx: &mut Ctx, left: &Value, right: &Value) -> RunResult<Value> {
    if let (Some(a), Some(b)) = (to_num(left), to_num(right)) {
        return numeric_op(ctx, Operator::Add, a, b, left, right);
    }
    if matches!(left, Value::Str(_)) && matches!(right, Value::Str(_)) {
        let mut s = ctx.heap.str_of(left).unwrap_or_default().to_owned();
        s.push_str(ctx.heap.str_of(right).unwrap_or_default());
        return ctx.heap.alloc_str(&s);
    }
    if let (Value::Ref(a), Value::Ref(b)) = (left, right) {
        let (a, b) = (*a, *b);
        let kinds = (ctx.heap.get(a), ctx.heap.get(b));
        if matches!(kinds, (HeapData::List(_), HeapData::List(_))) {
            let items = ctx.heap.with_list(a, |la, heap| heap.with_list(b, |lb, heap2| la.concat(heap2, lb)));
            return Ok(Value::Ref(ctx.heap.alloc(HeapData::List(ListObj::new(items)))?));
        }
        if matches!(kinds, (HeapData::Tuple(_), HeapData::Tuple(_))) {
            let items = ctx.heap.with_tuple(a, |ta, heap| heap.with_tuple(b, |tb, heap2| ta.concat(heap2, tb)));
            return Ok(Value::Ref(ctx.heap.alloc(HeapData::Tuple(TupleObj::new(items)))?));
        }
        if let (HeapData::Bytes(ba), HeapData::Bytes(bb)) = kinds {
            let data = ba.concat(bb);
            return Ok(Value::Ref(ctx.heap.alloc(HeapData::Bytes(BytesObj::new(data)))?));
        }
    }
    Err(unsupported(ctx, "+", left, right))
}

fn mult(ctx: &mut Ctx, left: &Value, right: &Value) -> RunResult<Value> {
    if let (Some(a), Some(b)) = (to_num(left), to_num(right)) {
        return numeric_op(ctx, Operator::Mult, a, b, left, right);
    }
    let (seq, n) = match (left, right) {
        (Value::Ref(_) | Value::Str(_), Value::Int(n)) => (left, *n),
        (Value::Ref(_) | Value::Str(_), Value::Bool(b)) => (left, i64::from(*b)),
        (Value::Int(n), Value::Ref(_) | Value::Str(_)) => (right, *n),
        (Value::Bool(b), Value::Ref(_) | Value::Str(_)) => (right, i64::from(*b)),
        _ => return Err(unsupported(ctx, "*", left, right)),
    };
    match seq {
        Value::Str(_) => {
            let s = ctx.heap.str_of(seq).unwrap_or_default().repeat(n.max(0) as usize);
            ctx.heap.alloc_str(&s)
        }
        Value::Ref(id) => {
            let id = *id;
            match ctx.heap.get(id) {
                HeapData::List(_) => {
                    let items = ctx.heap.with_list(id, |l, heap| l.repeated(heap, n));
                    Ok(Value::Ref(ctx.heap.alloc(HeapData::List(ListObj::new(items)))?))
                }
                HeapData::Tuple(_) => {
                    let items = ctx.heap.with_tuple(id, |t, heap| t.repeated(heap, n));
                    Ok(Value::Ref(ctx.heap.alloc(HeapData::Tuple(TupleObj::new(items)))?))
                }
                HeapData::Bytes(b) => {
                    let data = b.repeated(n);
                    Ok(Value::Ref(ctx.heap.alloc(HeapData::Bytes(BytesObj::new(data)))?))
                }
                _ => Err(unsupported(ctx, "*", left, right)),
            }
        }
        _ => unreachable!(),
    }
}

fn numeric_op(ctx: &mut Ctx, op: Operator, a: Num, b: Num, left: &Value, right: &Value) -> RunResult<Value> {
    match op {
        Operator::LShift | Operator::RShift | Operator::BitAnd | Operator::BitOr | Operator::BitXor => {
            let (Num::Int(x), Num::Int(y)) = (a, b) else {
                return Err(unsupported(ctx, op_symbol(op), left, right));
            };
            return bitwise(ctx, op, x, y);
        }
        _ => {}
    }
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => int_op(ctx, op, x, y),
        _ => {
            let (x, y) = (num_to_f64(a), num_to_f64(b));
            float_op(ctx, op, x, y)
        }
    }
}

fn num_to_f64(n: Num) -> f64 {
    match n {
        Num::Int(i) => i as f64,
        Num::Float(f) => f,
    }
}

fn bitwise(ctx: &mut Ctx, op: Operator, x: i64, y: i64) -> RunResult<Value> {
    let r = match op {
        Operator::LShift => {
            if !(0..64).contains(&y) {
                return Err(ctx.heap.raise(ExcType::ValueError, "negative shift count"));
            }
            x.wrapping_shl(y as u32)
        }
        Operator::RShift => {
            if !(0..64).contains(&y) {
                return Err(ctx.heap.raise(ExcType::ValueError, "negative shift count"));
            }
            x.wrapping_shr(y as u32)
        }
        Operator::BitAnd => x & y,
        Operator::BitOr => x | y,
        Operator::BitXor => x ^ y,
        _ => unreachable!(),
    };
    Ok(Value::Int(r))
}

fn int_op(ctx: &mut Ctx, op: Operator, x: i64, y: i64) -> RunResult<Value> {
    match op {
        Operator::Add => Ok(Value::Int(x.wrapping_add(y))),
        Operator::Sub => Ok(Value::Int(x.wrapping_sub(y))),
        Operator::Mult => Ok(Value::Int(x.wrapping_mul(y))),
        Operator::Div => {
            if y == 0 {
                return Err(ctx.heap.raise(ExcType::ZeroDivisionError, "division by zero"));
            }
            Ok(Value::Float(x as f64 / y as f64))
        }
        Operator::FloorDiv => {
            if y == 0 {
                return Err(ctx.heap.raise(ExcType::ZeroDivisionError, "integer division or modulo by zero"));
            }
            Ok(Value::Int(x.div_euclid(y)))
        }
        Operator::Mod => {
            if y == 0 {
                return Err(ctx.heap.raise(ExcType::ZeroDivisionError, "integer division or modulo by zero"));
            }
            Ok(Value::Int(x.rem_euclid(y)))
        }
        Operator::Pow => {
            if y < 0 {
                return Ok(Value::Float((x as f64).powf(y as f64)));
            }
            match u32::try_from(y).ok().and_then(|e| x.checked_pow(e)) {
                Some(r) => Ok(Value::Int(r)),
                None => Ok(Value::Float((x as f64).powf(y as f64))),
            }
        }
        _ => unreachable!("bitwise handled before int_op"),
    }
}

fn float_op(ctx: &mut Ctx, op: Operator, x: f64, y: f64) -> RunResult<Value> {
    match op {
        Operator::Add => Ok(Value::Float(x + y)),
        Operator::Sub => Ok(Value::Float(x - y)),
        Operator::Mult => Ok(Value::Float(x * y)),
        Operator::Div => {
            if y == 0.0 {
                return Err(ctx.heap.raise(ExcType::ZeroDivisionError, "float division by zero"));
            }
            Ok(Value::Float(x / y))
        }
        Operator::FloorDiv => {
            if y == 0.0 {
                return Err(ctx.heap.raise(ExcType::ZeroDivisionError, "float floor division by zero"));
            }
            Ok(Value::Float((x / y).floor()))
        }
        Operator::Mod => {
            if y == 0.0 {
                return Err(ctx.heap.raise(ExcType::ZeroDivisionError, "float modulo"));
            }
            Ok(Value::Float(x.rem_euclid(y)))
        }
        Operator::Pow => Ok(Value::Float(x.powf(y))),
        _ => unreachable!("bitwise handled before float_op"),
    }
}

pub(crate) fn unary_op(ctx: &mut Ctx, op: UnaryOp, operand: &Value) -> RunResult<Value> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!ctx.heap.truthy(operand))),
        UnaryOp::UAdd => match to_num(operand) {
            Some(Num::Int(i)) => Ok(Value::Int(i)),
            Some(Num::Float(f)) => Ok(Value::Float(f)),
            None => {
                let tn = type_name(ctx, operand);
                Err(ctx.heap.raise(ExcType::TypeError, format!("bad operand type for unary +: '{tn}'")))
            }
        },
        UnaryOp::USub => match to_num(operand) {
            Some(Num::Int(i)) => Ok(Value::Int(i.wrapping_neg())),
            Some(Num::Float(f)) => Ok(Value::Float(-f)),
            None => {
                let tn = type_name(ctx, operand);
                Err(ctx.heap.raise(ExcType::TypeError, format!("bad operand type for unary -: '{tn}'")))
            }
        },
        UnaryOp::Invert => match operand {
            Value::Int(i) => Ok(Value::Int(!i)),
            Value::Bool(b) => Ok(Value::Int(!i64::from(*b))),
            _ => {
                let tn = type_name(ctx, operand);
                Err(ctx.heap.raise(ExcType::TypeError, format!("bad operand type for unary ~: '{tn}'")))
            }
        },
    }
}
