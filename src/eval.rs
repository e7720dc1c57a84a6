//! The tree-walking evaluator (§4.D): control flow, operator dispatch, the
//! iteration protocol, and exception unwinding, all driven directly off the
//! `ruff_python_ast` tree `resolve` has already validated.
//!
//! There is no bytecode or lowering step — every `exec_stmt`/`eval_expr` call
//! pattern-matches the AST node it's handed. This keeps the evaluator a
//! straightforward recursive walk at the cost of re-matching node shape on
//! every visit, an acceptable trade for a sandboxed scripting interpreter
//! that isn't competing on raw throughput.

use std::{collections::HashSet, rc::Rc};

use ruff_python_ast::{self as ast, BoolOp, CmpOp, Expr, Operator, Stmt, UnaryOp};

use crate::{
    exception::{ExcType, RunError, RunResult},
    frame::{Frame, Namespace, NamespaceRef},
    function::{bind_arguments, Body, BuiltinObj, ExternalObj, FunctionObj, Signature},
    heap::{Heap, HeapData, HeapId},
    io::PrintCallback,
    namespace::collect_locals,
    object,
    types::{iter::StepResult, DictObj, IterObj, ListObj, SetObj, TupleObj},
    value::Value,
};

/// How a statement or block finished: fell through, or is unwinding toward
/// an enclosing loop/call boundary.
pub(crate) enum Flow {
    Next,
    Break,
    Continue,
    Return(Value),
}

/// Everything the evaluator needs threaded through every call, owned by
/// value so `run::Program::run` can destructure `heap` back out once
/// `exec_module` returns.
pub(crate) struct Ctx<'a> {
    pub(crate) heap: Heap,
    pub(crate) declared_externals: HashSet<String>,
    pub(crate) print: Option<&'a mut dyn PrintCallback>,
    /// The exception currently being handled, one entry per nested
    /// `except` body, consulted by a bare `raise`.
    reraise_stack: Vec<HeapId>,
}

impl<'a> Ctx<'a> {
    pub(crate) fn new(heap: Heap, declared_externals: HashSet<String>, print: Option<&'a mut dyn PrintCallback>) -> Self {
        Self { heap, declared_externals, print, reraise_stack: Vec::new() }
    }
}

/// Runs a module body (§6): executes every statement but the last for
/// effect, then — if the last statement is a bare expression — evaluates
/// and returns its materialized value. Anything else (including an early
/// `return`, meaningless at module scope but not structurally rejected)
/// yields no value.
pub(crate) fn exec_module(ctx: &mut Ctx, frame: &mut Frame, body: &[Stmt]) -> RunResult<Option<Value>> {
    let Some((last, head)) = body.split_last() else { return Ok(None) };
    for stmt in head {
        match exec_stmt(ctx, frame, stmt)? {
            Flow::Return(v) => return Ok(Some(v)),
            _ => continue,
        }
    }
    if let Stmt::Expr(e) = last {
        return Ok(Some(eval_expr(ctx, frame, &e.value)?));
    }
    match exec_stmt(ctx, frame, last)? {
        Flow::Return(v) => Ok(Some(v)),
        _ => Ok(None),
    }
}

fn exec_stmts(ctx: &mut Ctx, frame: &mut Frame, body: &[Stmt]) -> RunResult<Flow> {
    for stmt in body {
        match exec_stmt(ctx, frame, stmt)? {
            Flow::Next => continue,
            other => return Ok(other),
        }
    }
    Ok(Flow::Next)
}

fn exec_stmt(ctx: &mut Ctx, frame: &mut Frame, stmt: &Stmt) -> RunResult<Flow> {
    ctx.heap.check_time()?;
    match stmt {
        Stmt::FunctionDef(f) => {
            let sig = Signature::from_parameters(&f.parameters);
            let mut defaults = indexmap::IndexMap::new();
            let all_params = f.parameters.posonlyargs.iter().chain(&f.parameters.args).chain(&f.parameters.kwonlyargs);
            for p in all_params {
                if let Some(default_expr) = &p.default {
                    let v = eval_expr(ctx, frame, default_expr)?;
                    defaults.insert(p.parameter.name.id.to_string(), v);
                }
            }
            let mut locals = collect_locals(&f.body);
            bind_params_as_locals(&f.parameters, &mut locals);
            let locals = Rc::new(locals);
            let func = FunctionObj {
                name: f.name.id.to_string(),
                signature: sig,
                defaults,
                body: Body::Block(Rc::from(Box::<[_]>::from(f.body.clone()))),
                locals,
                enclosing: frame.namespace.clone(),
            };
            let id = ctx.heap.alloc(HeapData::Function(func))?;
            set_name(ctx, frame, f.name.id.as_str(), Value::Ref(id));
            Ok(Flow::Next)
        }
        Stmt::Return(r) => {
            let v = match &r.value {
                Some(e) => eval_expr(ctx, frame, e)?,
                None => Value::None,
            };
            Ok(Flow::Return(v))
        }
        Stmt::Delete(d) => {
            for target in &d.targets {
                delete_target(ctx, frame, target)?;
            }
            Ok(Flow::Next)
        }
        Stmt::Assign(a) => {
            let value = eval_expr(ctx, frame, &a.value)?;
            let (last, rest) = a.targets.split_last().expect("Assign always has >= 1 target");
            for target in rest {
                let dup = ctx.heap.retain_clone(&value);
                assign_target(ctx, frame, target, dup)?;
            }
            assign_target(ctx, frame, last, value)?;
            Ok(Flow::Next)
        }
        Stmt::AugAssign(a) => {
            exec_aug_assign(ctx, frame, &a.target, a.op, &a.value)?;
            Ok(Flow::Next)
        }
        Stmt::AnnAssign(a) => {
            if let Some(v) = &a.value {
                let value = eval_expr(ctx, frame, v)?;
                assign_target(ctx, frame, &a.target, value)?;
            }
            Ok(Flow::Next)
        }
        Stmt::For(f) => exec_for(ctx, frame, f),
        Stmt::While(w) => exec_while(ctx, frame, w),
        Stmt::If(i) => {
            let cond = eval_expr(ctx, frame, &i.test)?;
            if ctx.heap.truthy(&cond) {
                ctx.heap.release(cond);
                return exec_stmts(ctx, frame, &i.body);
            }
            ctx.heap.release(cond);
            for clause in &i.elif_else_clauses {
                match &clause.test {
                    Some(test) => {
                        let c = eval_expr(ctx, frame, test)?;
                        let truthy = ctx.heap.truthy(&c);
                        ctx.heap.release(c);
                        if truthy {
                            return exec_stmts(ctx, frame, &clause.body);
                        }
                    }
                    None => return exec_stmts(ctx, frame, &clause.body),
                }
            }
            Ok(Flow::Next)
        }
        Stmt::Raise(r) => exec_raise(ctx, frame, r),
        Stmt::Try(t) => exec_try(ctx, frame, t),
        Stmt::Assert(a) => {
            let cond = eval_expr(ctx, frame, &a.test)?;
            let truthy = ctx.heap.truthy(&cond);
            ctx.heap.release(cond);
            if truthy {
                return Ok(Flow::Next);
            }
            let err = match &a.msg {
                Some(msg_expr) => {
                    let msg = eval_expr(ctx, frame, msg_expr)?;
                    let text = ctx.heap.str_text(&msg);
                    ctx.heap.release(msg);
                    ctx.heap.raise(ExcType::AssertionError, text)
                }
                None => ctx.heap.raise_bare(ExcType::AssertionError),
            };
            Err(err)
        }
        Stmt::Expr(e) => {
            let v = eval_expr(ctx, frame, &e.value)?;
            ctx.heap.release(v);
            Ok(Flow::Next)
        }
        Stmt::Pass(_) => Ok(Flow::Next),
        Stmt::Break(_) => Ok(Flow::Break),
        Stmt::Continue(_) => Ok(Flow::Continue),
        _ => Err(RunError::Internal("unsupported statement reached the evaluator")),
    }
}

fn exec_for(ctx: &mut Ctx, frame: &mut Frame, f: &ast::StmtFor) -> RunResult<Flow> {
    let iterable = eval_expr(ctx, frame, &f.iter)?;
    let iter_id = make_iterator(ctx, iterable)?;
    let mut broke = false;
    loop {
        ctx.heap.check_time()?;
        match ctx.heap.iter_next(iter_id) {
            StepResult::Exhausted => break,
            StepResult::SizeChanged => {
                ctx.heap.release(Value::Ref(iter_id));
                return Err(ctx.heap.raise(ExcType::RuntimeError, "container changed size during iteration"));
            }
            StepResult::Value(v) => {
                assign_target(ctx, frame, &f.target, v)?;
                match exec_stmts(ctx, frame, &f.body)? {
                    Flow::Next => continue,
                    Flow::Continue => continue,
                    Flow::Break => {
                        broke = true;
                        break;
                    }
                    Flow::Return(v) => {
                        ctx.heap.release(Value::Ref(iter_id));
                        return Ok(Flow::Return(v));
                    }
                }
            }
        }
    }
    ctx.heap.release(Value::Ref(iter_id));
    if !broke {
        return exec_stmts(ctx, frame, &f.orelse);
    }
    Ok(Flow::Next)
}

fn exec_while(ctx: &mut Ctx, frame: &mut Frame, w: &ast::StmtWhile) -> RunResult<Flow> {
    loop {
        ctx.heap.check_time()?;
        let cond = eval_expr(ctx, frame, &w.test)?;
        let truthy = ctx.heap.truthy(&cond);
        ctx.heap.release(cond);
        if !truthy {
            break;
        }
        match exec_stmts(ctx, frame, &w.body)? {
            Flow::Next | Flow::Continue => continue,
            Flow::Break => return Ok(Flow::Next),
            Flow::Return(v) => return Ok(Flow::Return(v)),
        }
    }
    exec_stmts(ctx, frame, &w.orelse)
}

fn exec_aug_assign(ctx: &mut Ctx, frame: &mut Frame, target: &Expr, op: Operator, value_expr: &Expr) -> RunResult<()> {
    let current = eval_expr(ctx, frame, target)?;
    let rhs = eval_expr(ctx, frame, value_expr)?;
    // Mutable sequences (list) mutate in place for `+=`/`*=`; everything
    // else rebinds through ordinary binary-operator dispatch.
    if op == Operator::Add
        && let Value::Ref(id) = &current
        && matches!(ctx.heap.get(*id), HeapData::List(_))
    {
        let id = *id;
        let items = match collect_iterable(ctx, rhs) {
            Ok(items) => items,
            Err(e) => {
                ctx.heap.release(current);
                return Err(e);
            }
        };
        if let HeapData::List(list) = ctx.heap.get_mut(id) {
            list.extend(items);
        }
        ctx.heap.release(current);
        ctx.heap.retain(id);
        return assign_target(ctx, frame, target, Value::Ref(id));
    }
    if op == Operator::Mult
        && let Value::Ref(id) = &current
        && matches!(ctx.heap.get(*id), HeapData::List(_))
    {
        let id = *id;
        let n = match as_index(ctx, &rhs) {
            Ok(n) => n,
            Err(e) => {
                ctx.heap.release(rhs);
                ctx.heap.release(current);
                return Err(e);
            }
        };
        ctx.heap.release(rhs);
        let repeated = ctx.heap.with_list(id, |list, heap| list.repeated(heap, n));
        let HeapData::List(list) = ctx.heap.get_mut(id) else { unreachable!() };
        let old_items = std::mem::replace(&mut list.items, repeated);
        for v in old_items {
            ctx.heap.release(v);
        }
        ctx.heap.release(current);
        ctx.heap.retain(id);
        return assign_target(ctx, frame, target, Value::Ref(id));
    }
    let result = binary_op(ctx, op, current, rhs)?;
    assign_target(ctx, frame, target, result)
}

fn exec_raise(ctx: &mut Ctx, frame: &mut Frame, r: &ast::StmtRaise) -> RunResult<Flow> {
    let Some(exc_expr) = &r.exc else {
        return Err(reraise(ctx));
    };
    let exc_val = eval_expr(ctx, frame, exc_expr)?;
    let cause_val = match &r.cause {
        Some(c) => Some(eval_expr(ctx, frame, c)?),
        None => None,
    };
    Err(raise_value(ctx, exc_val, cause_val))
}

fn reraise(ctx: &mut Ctx) -> RunError {
    match ctx.reraise_stack.last().copied() {
        Some(id) => {
            ctx.heap.retain(id);
            RunError::Raise(id)
        }
        None => ctx.heap.raise(ExcType::RuntimeError, "no active exception to re-raise"),
    }
}

/// `raise E` (§4.D): a bare builtin-exception name instantiates with no
/// message; an existing exception instance re-raises. Anything else is a
/// `TypeError`.
fn raise_value(ctx: &mut Ctx, exc_val: Value, cause_val: Option<Value>) -> RunError {
    match &exc_val {
        Value::Ref(id) if matches!(ctx.heap.get(*id), HeapData::Exception(_)) => {
            let id = *id;
            attach_cause(ctx, RunError::Raise(id), cause_val)
        }
        Value::Ref(id) if matches!(ctx.heap.get(*id), HeapData::Builtin(_)) => {
            let HeapData::Builtin(BuiltinObj { name }) = ctx.heap.get(*id) else { unreachable!() };
            let kind: Result<ExcType, _> = name.parse();
            ctx.heap.release(exc_val);
            match kind {
                Ok(kind) => {
                    let err = ctx.heap.raise_bare(kind);
                    attach_cause(ctx, err, cause_val)
                }
                Err(_) => {
                    if let Some(c) = cause_val {
                        ctx.heap.release(c);
                    }
                    ctx.heap.raise(ExcType::TypeError, "exceptions must derive from BaseException")
                }
            }
        }
        _ => {
            ctx.heap.release(exc_val);
            if let Some(c) = cause_val {
                ctx.heap.release(c);
            }
            ctx.heap.raise(ExcType::TypeError, "exceptions must derive from BaseException")
        }
    }
}

/// Records `raise ... from cause` (§4.D) on a freshly built exception. The
/// cause is only kept when it's itself an exception instance; otherwise it's
/// silently dropped, matching the looseness the rest of this evaluator
/// affords host-facing error messages.
fn attach_cause(ctx: &mut Ctx, err: RunError, cause_val: Option<Value>) -> RunError {
    let Some(cause) = cause_val else { return err };
    let RunError::Raise(id) = err else {
        ctx.heap.release(cause);
        return err;
    };
    let cause_id = cause.heap_id().filter(|h| matches!(ctx.heap.get(*h), HeapData::Exception(_)));
    match cause_id {
        Some(cid) => {
            if let HeapData::Exception(e) = ctx.heap.get_mut(id) {
                e.cause = Some(cid);
            }
        }
        None => ctx.heap.release(cause),
    }
    RunError::Raise(id)
}

fn exec_try(ctx: &mut Ctx, frame: &mut Frame, t: &ast::StmtTry) -> RunResult<Flow> {
    let body_result = exec_stmts(ctx, frame, &t.body);
    let after_body = match body_result {
        Ok(flow) => match flow {
            Flow::Next => exec_stmts(ctx, frame, &t.orelse),
            other => Ok(other),
        },
        Err(RunError::Raise(id)) => handle_except(ctx, frame, t, id),
        Err(other) => Err(other),
    };
    run_finally(ctx, frame, &t.finalbody, after_body)
}

fn handle_except(ctx: &mut Ctx, frame: &mut Frame, t: &ast::StmtTry, id: HeapId) -> RunResult<Flow> {
    for handler in &t.handlers {
        let ast::ExceptHandler::ExceptHandler(h) = handler;
        let matches = match &h.type_ {
            Some(type_expr) => exception_type_matches(ctx, type_expr, id),
            None => true,
        };
        if !matches {
            continue;
        }
        if let Some(name) = &h.name {
            ctx.heap.retain(id);
            set_name(ctx, frame, name.as_str(), Value::Ref(id));
        }
        ctx.reraise_stack.push(id);
        let result = exec_stmts(ctx, frame, &h.body);
        ctx.reraise_stack.pop();
        if let Some(name) = &h.name {
            remove_name(ctx, frame, name.as_str());
        }
        ctx.heap.release(Value::Ref(id));
        return result;
    }
    Err(RunError::Raise(id))
}

/// `except Name:` / `except (A, B):` clauses are matched directly against
/// the AST rather than evaluated to a value — the runtime has no class
/// objects to hold, only the fixed `ExcType` names.
fn exception_type_matches(ctx: &Ctx, type_expr: &Expr, id: HeapId) -> bool {
    let HeapData::Exception(e) = ctx.heap.get(id) else { return false };
    match type_expr {
        Expr::Tuple(t) => t.elts.iter().any(|e2| single_type_matches(e2, e.kind)),
        other => single_type_matches(other, e.kind),
    }
}

fn single_type_matches(expr: &Expr, kind: ExcType) -> bool {
    match expr {
        Expr::Name(n) => kind.matches_clause(n.id.as_str()),
        _ => false,
    }
}

fn run_finally(ctx: &mut Ctx, frame: &mut Frame, finalbody: &[Stmt], outcome: RunResult<Flow>) -> RunResult<Flow> {
    if finalbody.is_empty() {
        return outcome;
    }
    match exec_stmts(ctx, frame, finalbody) {
        Ok(Flow::Next) => outcome,
        Ok(overriding) => {
            if let Err(RunError::Raise(id)) = outcome {
                ctx.heap.release(Value::Ref(id));
            }
            Ok(overriding)
        }
        Err(e) => {
            if let Err(RunError::Raise(id)) = outcome {
                ctx.heap.release(Value::Ref(id));
            }
            Err(e)
        }
    }
}

// --- names & targets -----------------------------------------------------

fn read_name(ctx: &mut Ctx, frame: &Frame, name: &str) -> RunResult<Value> {
    if frame.is_local(name) {
        if let Some(v) = frame.namespace.borrow().get_local(name) {
            return Ok(ctx.heap.retain_clone(v));
        }
        return Err(ctx.heap.raise(ExcType::NameError, format!("local variable '{name}' referenced before assignment")));
    }
    let mut ns = frame.namespace.borrow().parent();
    while let Some(current) = ns {
        if let Some(v) = current.borrow().get_local(name) {
            return Ok(ctx.heap.retain_clone(v));
        }
        ns = current.borrow().parent();
    }
    eval_name_fallback(ctx, name)
}

fn eval_name_fallback(ctx: &mut Ctx, name: &str) -> RunResult<Value> {
    if ctx.declared_externals.contains(name) {
        return Err(ctx.heap.raise(ExcType::RuntimeError, "no external_functions provided"));
    }
    if crate::builtins::is_builtin(name) {
        let id = ctx.heap.alloc(HeapData::Builtin(BuiltinObj { name: name.to_owned() }))?;
        return Ok(Value::Ref(id));
    }
    Err(ctx.heap.raise(ExcType::NameError, format!("name '{name}' is not defined")))
}

fn set_name(ctx: &mut Ctx, frame: &mut Frame, name: &str, value: Value) {
    if frame.is_local(name) {
        frame.namespace.borrow_mut().set_local(&mut ctx.heap, name, value);
        return;
    }
    let mut ns = frame.namespace.clone();
    loop {
        let found = ns.borrow().contains_local(name);
        if found {
            ns.borrow_mut().set_local(&mut ctx.heap, name, value);
            return;
        }
        let parent = ns.borrow().parent();
        match parent {
            Some(p) => ns = p,
            None => {
                frame.namespace.borrow_mut().set_local(&mut ctx.heap, name, value);
                return;
            }
        }
    }
}

fn remove_name(ctx: &mut Ctx, frame: &mut Frame, name: &str) {
    frame.namespace.borrow_mut().remove_local(&mut ctx.heap, name);
}

fn delete_target(ctx: &mut Ctx, frame: &mut Frame, target: &Expr) -> RunResult<()> {
    match target {
        Expr::Name(n) => {
            if !remove_name_anywhere(ctx, frame, n.id.as_str()) {
                return Err(ctx.heap.raise(ExcType::NameError, format!("name '{}' is not defined", n.id.as_str())));
            }
            Ok(())
        }
        Expr::Subscript(s) => {
            let recv = eval_expr(ctx, frame, &s.value)?;
            let key = eval_expr(ctx, frame, &s.slice)?;
            delete_subscript(ctx, recv, key)
        }
        _ => Err(ctx.heap.raise(ExcType::TypeError, "invalid delete target")),
    }
}

fn remove_name_anywhere(ctx: &mut Ctx, frame: &mut Frame, name: &str) -> bool {
    if frame.is_local(name) {
        return frame.namespace.borrow_mut().remove_local(&mut ctx.heap, name);
    }
    let mut ns = Some(frame.namespace.clone());
    while let Some(current) = ns {
        if current.borrow_mut().remove_local(&mut ctx.heap, name) {
            return true;
        }
        ns = current.borrow().parent();
    }
    false
}

fn delete_subscript(ctx: &mut Ctx, recv: Value, key: Value) -> RunResult<()> {
    let result = match &recv {
        Value::Ref(id) if matches!(ctx.heap.get(*id), HeapData::List(_)) => {
            let id = *id;
            match as_index(ctx, &key) {
                Ok(idx) => {
                    let HeapData::List(list) = ctx.heap.get_mut(id) else { unreachable!() };
                    let len = list.len();
                    match ListObj::normalize_index(len, idx) {
                        Some(i) => {
                            let removed = list.remove_at(i);
                            ctx.heap.release(removed);
                            Ok(())
                        }
                        None => Err(ctx.heap.raise(ExcType::IndexError, "list assignment index out of range")),
                    }
                }
                Err(e) => Err(e),
            }
        }
        Value::Ref(id) if matches!(ctx.heap.get(*id), HeapData::Dict(_)) => {
            let id = *id;
            let removed = ctx.heap.with_dict_mut(id, |dict, heap| dict.remove(heap, &key));
            match removed {
                Some((k, v)) => {
                    ctx.heap.release(k);
                    ctx.heap.release(v);
                    Ok(())
                }
                None => {
                    let repr = ctx.heap.repr(&key);
                    Err(ctx.heap.raise(ExcType::KeyError, repr))
                }
            }
        }
        _ => Err(ctx.heap.raise(ExcType::TypeError, "object does not support item deletion")),
    };
    ctx.heap.release(key);
    ctx.heap.release(recv);
    result
}

fn assign_target(ctx: &mut Ctx, frame: &mut Frame, target: &Expr, value: Value) -> RunResult<()> {
    match target {
        Expr::Name(n) => {
            set_name(ctx, frame, n.id.as_str(), value);
            Ok(())
        }
        Expr::Tuple(t) => unpack_targets(ctx, frame, &t.elts, value),
        Expr::List(l) => unpack_targets(ctx, frame, &l.elts, value),
        Expr::Subscript(s) => {
            let recv = eval_expr(ctx, frame, &s.value)?;
            let key = eval_expr(ctx, frame, &s.slice)?;
            assign_subscript(ctx, recv, key, value)
        }
        Expr::Attribute(_) => {
            ctx.heap.release(value);
            Err(ctx.heap.raise(ExcType::AttributeError, "object attributes are not assignable"))
        }
        Expr::Starred(s) => assign_target(ctx, frame, &s.value, value),
        _ => {
            ctx.heap.release(value);
            Err(RunError::Internal("unsupported assignment target reached the evaluator"))
        }
    }
}

fn unpack_targets(ctx: &mut Ctx, frame: &mut Frame, targets: &[Expr], value: Value) -> RunResult<()> {
    let items = collect_iterable(ctx, value)?;
    let star_pos = targets.iter().position(|t| matches!(t, Expr::Starred(_)));
    match star_pos {
        None => {
            if items.len() != targets.len() {
                for v in items {
                    ctx.heap.release(v);
                }
                return Err(ctx.heap.raise(ExcType::ValueError, format!("expected {} values to unpack, got a different count", targets.len())));
            }
            for (target, v) in targets.iter().zip(items) {
                assign_target(ctx, frame, target, v)?;
            }
            Ok(())
        }
        Some(pos) => {
            let before = pos;
            let after = targets.len() - pos - 1;
            if items.len() < before + after {
                for v in items {
                    ctx.heap.release(v);
                }
                return Err(ctx.heap.raise(ExcType::ValueError, "not enough values to unpack"));
            }
            let mut iter = items.into_iter();
            for target in &targets[..before] {
                assign_target(ctx, frame, target, iter.next().expect("checked length"))?;
            }
            let middle_count = iter.len() - after;
            let middle: Vec<Value> = iter.by_ref().take(middle_count).collect();
            let list_id = ctx.heap.alloc(HeapData::List(ListObj::new(middle)))?;
            assign_target(ctx, frame, &targets[pos], Value::Ref(list_id))?;
            for target in &targets[pos + 1..] {
                assign_target(ctx, frame, target, iter.next().expect("checked length"))?;
            }
            Ok(())
        }
    }
}

fn assign_subscript(ctx: &mut Ctx, recv: Value, key: Value, value: Value) -> RunResult<()> {
    let result = match &recv {
        Value::Ref(id) if matches!(ctx.heap.get(*id), HeapData::List(_)) => {
            let id = *id;
            match as_index(ctx, &key) {
                Ok(idx) => {
                    let HeapData::List(list) = ctx.heap.get_mut(id) else { unreachable!() };
                    match list.set(idx, value) {
                        Ok(old) => {
                            ctx.heap.release(old);
                            Ok(())
                        }
                        Err(value) => {
                            ctx.heap.release(value);
                            Err(ctx.heap.raise(ExcType::IndexError, "list assignment index out of range"))
                        }
                    }
                }
                Err(e) => {
                    ctx.heap.release(value);
                    Err(e)
                }
            }
        }
        Value::Ref(id) if matches!(ctx.heap.get(*id), HeapData::Dict(_)) => {
            let id = *id;
            if !ctx.heap.is_hashable(&key) {
                ctx.heap.release(key);
                ctx.heap.release(value);
                ctx.heap.release(recv);
                return Err(ctx.heap.raise(ExcType::TypeError, "unhashable type"));
            }
            // `DictObj::insert` consumes `key` outright (stores it or
            // releases it on update), so it must not also pass through the
            // shared tail below.
            let old = ctx.heap.with_dict_mut(id, |dict, heap| dict.insert(heap, key, value));
            if let Some(old) = old {
                ctx.heap.release(old);
            }
            ctx.heap.release(recv);
            return Ok(());
        }
        _ => {
            ctx.heap.release(value);
            Err(ctx.heap.raise(ExcType::TypeError, "object does not support item assignment"))
        }
    };
    ctx.heap.release(key);
    ctx.heap.release(recv);
    result
}

fn as_index(ctx: &mut Ctx, v: &Value) -> RunResult<i64> {
    match v {
        Value::Int(i) => Ok(*i),
        Value::Bool(b) => Ok(i64::from(*b)),
        _ => Err(ctx.heap.raise(ExcType::TypeError, "indices must be integers")),
    }
}

// --- expressions -----------------------------------------------------------

pub(crate) fn eval_expr(ctx: &mut Ctx, frame: &mut Frame, expr: &Expr) -> RunResult<Value> {
    ctx.heap.check_time()?;
    match expr {
        Expr::BoolOp(b) => eval_bool_op(ctx, frame, b.op, &b.values),
        Expr::BinOp(b) => {
            let left = eval_expr(ctx, frame, &b.left)?;
            let right = eval_expr(ctx, frame, &b.right)?;
            binary_op(ctx, b.op, left, right)
        }
        Expr::UnaryOp(u) => {
            let operand = eval_expr(ctx, frame, &u.operand)?;
            unary_op(ctx, u.op, operand)
        }
        Expr::Lambda(l) => {
            let params = l.parameters.clone().unwrap_or_default();
            let sig = Signature::from_parameters(&params);
            let mut defaults = indexmap::IndexMap::new();
            let all_params = params.posonlyargs.iter().chain(&params.args).chain(&params.kwonlyargs);
            for p in all_params {
                if let Some(default_expr) = &p.default {
                    let v = eval_expr(ctx, frame, default_expr)?;
                    defaults.insert(p.parameter.name.id.to_string(), v);
                }
            }
            let mut locals = HashSet::new();
            bind_params_as_locals(&params, &mut locals);
            let func = FunctionObj {
                name: "<lambda>".to_owned(),
                signature: sig,
                defaults,
                body: Body::Expr(Rc::new((*l.body).clone())),
                locals: Rc::new(locals),
                enclosing: frame.namespace.clone(),
            };
            let id = ctx.heap.alloc(HeapData::Function(func))?;
            Ok(Value::Ref(id))
        }
        Expr::If(i) => {
            let cond = eval_expr(ctx, frame, &i.test)?;
            let truthy = ctx.heap.truthy(&cond);
            ctx.heap.release(cond);
            if truthy { eval_expr(ctx, frame, &i.body) } else { eval_expr(ctx, frame, &i.orelse) }
        }
        Expr::Dict(d) => eval_dict(ctx, frame, d),
        Expr::Set(s) => {
            let mut set = SetObj::new();
            for e in &s.elts {
                let v = eval_expr(ctx, frame, e)?;
                if !ctx.heap.is_hashable(&v) {
                    ctx.heap.release(v);
                    return Err(ctx.heap.raise(ExcType::TypeError, "unhashable type"));
                }
                set.add(&mut ctx.heap, v);
            }
            Ok(Value::Ref(ctx.heap.alloc(HeapData::Set(set))?))
        }
        Expr::Compare(c) => eval_compare(ctx, frame, c),
        Expr::Call(c) => eval_call(ctx, frame, c),
        Expr::NumberLiteral(n) => eval_number(ctx, n),
        Expr::StringLiteral(s) => ctx.heap.alloc_str(&s.value.to_string()),
        Expr::BytesLiteral(b) => {
            let data = std::borrow::Cow::<[u8]>::from(&b.value).into_owned();
            Ok(Value::Ref(ctx.heap.alloc(HeapData::Bytes(crate::types::BytesObj::new(data)))?))
        }
        Expr::BooleanLiteral(b) => Ok(Value::Bool(b.value)),
        Expr::NoneLiteral(_) => Ok(Value::None),
        Expr::Attribute(a) => eval_attribute(ctx, frame, a),
        Expr::Subscript(s) => eval_subscript(ctx, frame, s),
        Expr::Starred(s) => eval_expr(ctx, frame, &s.value),
        Expr::Name(n) => read_name(ctx, frame, n.id.as_str()),
        Expr::List(l) => {
            let mut items = Vec::with_capacity(l.elts.len());
            for e in &l.elts {
                items.push(eval_expr(ctx, frame, e)?);
            }
            Ok(Value::Ref(ctx.heap.alloc(HeapData::List(ListObj::new(items)))?))
        }
        Expr::Tuple(t) => {
            let mut items = Vec::with_capacity(t.elts.len());
            for e in &t.elts {
                items.push(eval_expr(ctx, frame, e)?);
            }
            Ok(Value::Ref(ctx.heap.alloc(HeapData::Tuple(TupleObj::new(items)))?))
        }
        _ => Err(RunError::Internal("unsupported expression reached the evaluator")),
    }
}

fn bind_params_as_locals(params: &ast::Parameters, locals: &mut HashSet<String>) {
    for p in params.posonlyargs.iter().chain(&params.args).chain(&params.kwonlyargs) {
        locals.insert(p.parameter.name.id.to_string());
    }
    if let Some(v) = &params.vararg {
        locals.insert(v.name.id.to_string());
    }
    if let Some(v) = &params.kwarg {
        locals.insert(v.name.id.to_string());
    }
}

fn eval_number(ctx: &mut Ctx, n: &ast::ExprNumberLiteral) -> RunResult<Value> {
    match &n.value {
        ast::Number::Int(i) => match i.as_i64() {
            Some(v) => Ok(Value::Int(v)),
            None => Err(ctx.heap.raise(ExcType::ValueError, "integer literal too large")),
        },
        ast::Number::Float(f) => Ok(Value::Float(*f)),
        ast::Number::Complex { .. } => Err(RunError::Internal("complex literal reached the evaluator")),
    }
}

fn eval_dict(ctx: &mut Ctx, frame: &mut Frame, d: &ast::ExprDict) -> RunResult<Value> {
    let mut dict = DictObj::new();
    for item in &d.items {
        match &item.key {
            Some(key_expr) => {
                let key = eval_expr(ctx, frame, key_expr)?;
                let value = eval_expr(ctx, frame, &item.value)?;
                if !ctx.heap.is_hashable(&key) {
                    ctx.heap.release(key);
                    ctx.heap.release(value);
                    return Err(ctx.heap.raise(ExcType::TypeError, "unhashable type"));
                }
                if let Some(old) = dict.insert(&mut ctx.heap, key, value) {
                    ctx.heap.release(old);
                }
            }
            None => {
                // `{**mapping}`: merge the other dict's entries in.
                let mapping = eval_expr(ctx, frame, &item.value)?;
                let Value::Ref(id) = mapping else {
                    ctx.heap.release(mapping);
                    return Err(ctx.heap.raise(ExcType::TypeError, "argument of type is not a mapping"));
                };
                if !matches!(ctx.heap.get(id), HeapData::Dict(_)) {
                    ctx.heap.release(Value::Ref(id));
                    return Err(ctx.heap.raise(ExcType::TypeError, "argument of type is not a mapping"));
                }
                let entries = ctx.heap.with_dict(id, |other, heap| other.copy_shallow(heap));
                for (k, v) in entries {
                    if let Some(old) = dict.insert(&mut ctx.heap, k, v) {
                        ctx.heap.release(old);
                    }
                }
                ctx.heap.release(Value::Ref(id));
            }
        }
    }
    Ok(Value::Ref(ctx.heap.alloc(HeapData::Dict(dict))?))
}

fn eval_bool_op(ctx: &mut Ctx, frame: &mut Frame, op: BoolOp, values: &[Expr]) -> RunResult<Value> {
    let (first, rest) = values.split_first().expect("BoolOp always has >= 2 values");
    let mut current = eval_expr(ctx, frame, first)?;
    for expr in rest {
        let truthy = ctx.heap.truthy(&current);
        let stop = match op {
            BoolOp::And => !truthy,
            BoolOp::Or => truthy,
        };
        if stop {
            return Ok(current);
        }
        ctx.heap.release(current);
        current = eval_expr(ctx, frame, expr)?;
    }
    Ok(current)
}

fn eval_compare(ctx: &mut Ctx, frame: &mut Frame, c: &ast::ExprCompare) -> RunResult<Value> {
    let mut left = eval_expr(ctx, frame, &c.left)?;
    for (op, comparator) in c.ops.iter().zip(c.comparators.iter()) {
        let right = eval_expr(ctx, frame, comparator)?;
        let result = compare_op(ctx, *op, &left, &right)?;
        ctx.heap.release(left);
        if !result {
            ctx.heap.release(right);
            return Ok(Value::Bool(false));
        }
        left = right;
    }
    ctx.heap.release(left);
    Ok(Value::Bool(true))
}

/// `left < right` per the evaluator's own ordering rules (§4.B), exposed so
/// `sorted`/`min`/`max` can reuse the exact comparison `<` uses in source.
pub(crate) fn value_less_than(ctx: &mut Ctx, left: &Value, right: &Value) -> RunResult<bool> {
    ordering(ctx, CmpOp::Lt, left, right)
}

fn compare_op(ctx: &mut Ctx, op: CmpOp, left: &Value, right: &Value) -> RunResult<bool> {
    match op {
        CmpOp::Eq => Ok(ctx.heap.values_equal(left, right)),
        CmpOp::NotEq => Ok(!ctx.heap.values_equal(left, right)),
        CmpOp::Is => Ok(identical(left, right)),
        CmpOp::IsNot => Ok(!identical(left, right)),
        CmpOp::In => membership(ctx, left, right),
        CmpOp::NotIn => membership(ctx, left, right).map(|b| !b),
        CmpOp::Lt | CmpOp::LtE | CmpOp::Gt | CmpOp::GtE => ordering(ctx, op, left, right),
    }
}

fn identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Ref(x), Value::Ref(y)) => x == y,
        _ => false,
    }
}

fn membership(ctx: &mut Ctx, needle: &Value, haystack: &Value) -> RunResult<bool> {
    let Value::Ref(id) = haystack else {
        return Err(ctx.heap.raise(ExcType::TypeError, "argument is not iterable"));
    };
    let id = *id;
    match ctx.heap.get(id) {
        HeapData::List(l) => Ok(l.items.iter().any(|v| ctx.heap.values_equal(v, needle))),
        HeapData::Tuple(t) => Ok(t.items.iter().any(|v| ctx.heap.values_equal(v, needle))),
        HeapData::Set(s) => Ok(s.contains(&ctx.heap, needle)),
        HeapData::Dict(d) => Ok(d.contains(&ctx.heap, needle)),
        HeapData::Range(r) => match needle {
            Value::Int(i) => Ok(r.contains(*i)),
            Value::Bool(b) => Ok(r.contains(i64::from(*b))),
            _ => Ok(false),
        },
        HeapData::Str(outer) => match ctx.heap.str_of(needle) {
            Some(inner) => Ok(outer.value.contains(inner)),
            None => Err(ctx.heap.raise(ExcType::TypeError, "'in <string>' requires string as left operand")),
        },
        HeapData::Bytes(outer) => match needle {
            Value::Int(i) => Ok((0..=255).contains(i) && outer.data.contains(&(*i as u8))),
            _ => Err(ctx.heap.raise(ExcType::TypeError, "argument should be an integer")),
        },
        _ => Err(ctx.heap.raise(ExcType::TypeError, "argument is not iterable")),
    }
}

fn numeric_order(ctx: &mut Ctx, left: &Value, right: &Value) -> RunResult<std::cmp::Ordering> {
    let lf = as_f64(left);
    let rf = as_f64(right);
    match (lf, rf) {
        (Some(a), Some(b)) => a.partial_cmp(&b).ok_or_else(|| ctx.heap.raise(ExcType::ValueError, "cannot order NaN")),
        _ => Err(ctx.heap.raise(ExcType::TypeError, "comparison not supported between these types")),
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(*i as f64),
        Value::Bool(b) => Some(f64::from(*b)),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn ordering(ctx: &mut Ctx, op: CmpOp, left: &Value, right: &Value) -> RunResult<bool> {
    // Strings, lists and tuples order lexicographically; numerics order by
    // value; everything else is a `TypeError`.
    let ord = match (left, right) {
        (Value::Str(_), Value::Str(_)) => ctx.heap.str_of(left).cmp(&ctx.heap.str_of(right)),
        (Value::Ref(a), Value::Ref(b)) => match (ctx.heap.get(*a), ctx.heap.get(*b)) {
            (HeapData::List(_), HeapData::List(_)) | (HeapData::Tuple(_), HeapData::Tuple(_)) => {
                sequence_order(ctx, left, right)?
            }
            _ => numeric_order(ctx, left, right)?,
        },
        _ => numeric_order(ctx, left, right)?,
    };
    Ok(match op {
        CmpOp::Lt => ord.is_lt(),
        CmpOp::LtE => ord.is_le(),
        CmpOp::Gt => ord.is_gt(),
        CmpOp::GtE => ord.is_ge(),
        _ => unreachable!(),
    })
}

fn sequence_order(ctx: &mut Ctx, left: &Value, right: &Value) -> RunResult<std::cmp::Ordering> {
    let (a, b) = match (left, right) {
        (Value::Ref(x), Value::Ref(y)) => match (ctx.heap.get(*x), ctx.heap.get(*y)) {
            (HeapData::List(l), HeapData::List(r)) => (&l.items, &r.items),
            (HeapData::Tuple(l), HeapData::Tuple(r)) => (&l.items, &r.items),
            _ => return Err(ctx.heap.raise(ExcType::TypeError, "comparison not supported between these types")),
        },
        _ => unreachable!(),
    };
    let len = a.len().min(b.len());
    for i in 0..len {
        if ctx.heap.values_equal(&a[i], &b[i]) {
            continue;
        }
        return ordering_fallback(ctx, left, right, i);
    }
    Ok(a.len().cmp(&b.len()))
}

fn ordering_fallback(ctx: &mut Ctx, left: &Value, right: &Value, index: usize) -> RunResult<std::cmp::Ordering> {
    let (ai, bi) = match (left, right) {
        (Value::Ref(x), Value::Ref(y)) => match (ctx.heap.get(*x), ctx.heap.get(*y)) {
            (HeapData::List(l), HeapData::List(r)) => (ctx.heap.shallow_copy_of(&l.items[index]), ctx.heap.shallow_copy_of(&r.items[index])),
            (HeapData::Tuple(l), HeapData::Tuple(r)) => (ctx.heap.shallow_copy_of(&l.items[index]), ctx.heap.shallow_copy_of(&r.items[index])),
            _ => unreachable!(),
        },
        _ => unreachable!(),
    };
    ordering_value(ctx, &ai, &bi)
}

fn ordering_value(ctx: &mut Ctx, a: &Value, b: &Value) -> RunResult<std::cmp::Ordering> {
    match (a, b) {
        (Value::Str(_), Value::Str(_)) => Ok(ctx.heap.str_of(a).cmp(&ctx.heap.str_of(b))),
        _ => numeric_order(ctx, a, b),
    }
}

fn eval_attribute(ctx: &mut Ctx, frame: &mut Frame, a: &ast::ExprAttribute) -> RunResult<Value> {
    let recv = eval_expr(ctx, frame, &a.value)?;
    let attr = a.attr.id().as_str();
    let result = match &recv {
        Value::Ref(id) if matches!(ctx.heap.get(*id), HeapData::Exception(_)) => match attr {
            "args" => {
                let HeapData::Exception(e) = ctx.heap.get(*id) else { unreachable!() };
                let items: Vec<Value> = e.args.iter().map(|v| ctx.heap.shallow_copy_of(v)).collect();
                let items: Vec<Value> = items.into_iter().map(|v| ctx.heap.finish_retain(v)).collect();
                Ok(Value::Ref(ctx.heap.alloc(HeapData::Tuple(TupleObj::new(items)))?))
            }
            _ => Err(ctx.heap.raise(ExcType::AttributeError, format!("exception object has no attribute '{attr}'"))),
        },
        _ => Err(ctx.heap.raise(ExcType::AttributeError, format!("object has no attribute '{attr}'"))),
    };
    ctx.heap.release(recv);
    result
}

fn eval_subscript(ctx: &mut Ctx, frame: &mut Frame, s: &ast::ExprSubscript) -> RunResult<Value> {
    let recv = eval_expr(ctx, frame, &s.value)?;
    if let Expr::Slice(slice) = s.slice.as_ref() {
        return eval_slice_get(ctx, frame, recv, slice);
    }
    let key = match eval_expr(ctx, frame, &s.slice) {
        Ok(key) => key,
        Err(e) => {
            ctx.heap.release(recv);
            return Err(e);
        }
    };
    let result = crate::builtins::get_item(ctx, &recv, &key);
    ctx.heap.release(key);
    ctx.heap.release(recv);
    result
}

fn eval_slice_get(ctx: &mut Ctx, frame: &mut Frame, recv: Value, slice: &ast::ExprSlice) -> RunResult<Value> {
    let lower = slice.lower.as_deref().map(|e| eval_expr(ctx, frame, e)).transpose()?;
    let upper = slice.upper.as_deref().map(|e| eval_expr(ctx, frame, e)).transpose()?;
    let step = slice.step.as_deref().map(|e| eval_expr(ctx, frame, e)).transpose()?;
    let result = crate::builtins::slice_get(ctx, &recv, lower.as_ref(), upper.as_ref(), step.as_ref());
    if let Some(v) = lower {
        ctx.heap.release(v);
    }
    if let Some(v) = upper {
        ctx.heap.release(v);
    }
    if let Some(v) = step {
        ctx.heap.release(v);
    }
    ctx.heap.release(recv);
    result
}

fn eval_call(ctx: &mut Ctx, frame: &mut Frame, c: &ast::ExprCall) -> RunResult<Value> {
    if let Expr::Attribute(a) = c.func.as_ref() {
        let recv = eval_expr(ctx, frame, &a.value)?;
        let (args, kwargs) = eval_call_args(ctx, frame, &c.arguments)?;
        let attr = a.attr.id().to_owned();
        let result = crate::builtins::call_method(ctx, frame, recv, &attr, args, kwargs);
        return result;
    }
    let callee = eval_expr(ctx, frame, &c.func)?;
    let (args, kwargs) = eval_call_args(ctx, frame, &c.arguments)?;
    call_value(ctx, frame, callee, args, kwargs)
}

fn eval_call_args(ctx: &mut Ctx, frame: &mut Frame, arguments: &ast::Arguments) -> RunResult<(Vec<Value>, Vec<(String, Value)>)> {
    let mut args = Vec::with_capacity(arguments.args.len());
    for a in &arguments.args {
        args.push(eval_expr(ctx, frame, a)?);
    }
    let mut kwargs = Vec::with_capacity(arguments.keywords.len());
    for k in &arguments.keywords {
        let name = k.arg.as_ref().expect("resolve rejects **kwargs call unpacking").to_string();
        kwargs.push((name, eval_expr(ctx, frame, &k.value)?));
    }
    Ok((args, kwargs))
}

/// Dispatches a call once the callee and its arguments are evaluated:
/// user functions bind and run a fresh frame, external/builtin callees
/// delegate to their respective surfaces.
pub(crate) fn call_value(ctx: &mut Ctx, frame: &mut Frame, callee: Value, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    let Value::Ref(id) = &callee else {
        for v in args {
            ctx.heap.release(v);
        }
        for (_, v) in kwargs {
            ctx.heap.release(v);
        }
        let err = Err(ctx.heap.raise(ExcType::TypeError, format!("'{}' object is not callable", callee.type_name(&ctx.heap))));
        ctx.heap.release(callee);
        return err;
    };
    let id = *id;
    let result = match ctx.heap.get(id) {
        HeapData::Function(_) => call_function(ctx, frame, id, args, kwargs),
        HeapData::External(_) => call_external(ctx, id, args, kwargs),
        HeapData::Builtin(b) => {
            let name = b.name.clone();
            crate::builtins::call_builtin(ctx, frame, &name, args, kwargs)
        }
        _ => {
            for v in args {
                ctx.heap.release(v);
            }
            for (_, v) in kwargs {
                ctx.heap.release(v);
            }
            Err(ctx.heap.raise(ExcType::TypeError, "object is not callable"))
        }
    };
    ctx.heap.release(callee);
    result
}

fn call_function(ctx: &mut Ctx, frame: &Frame, id: HeapId, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    let HeapData::Function(f) = ctx.heap.get(id) else { unreachable!() };
    let sig = f.signature.clone();
    let name = f.name.clone();
    let locals = f.locals.clone();
    let enclosing = f.enclosing.clone();
    let body = f.body.clone();
    // Duplicate the defaults into fresh, independently-owned values while
    // `f` still borrows the heap immutably; `finish_retain` needs `&mut
    // Heap`, so it has to wait until `f`'s last use (the line below) ends
    // that borrow.
    let raw_defaults: Vec<(String, Value)> = f.defaults.iter().map(|(k, v)| (k.clone(), ctx.heap.shallow_copy_of(v))).collect();
    let defaults: indexmap::IndexMap<String, Value> = raw_defaults.into_iter().map(|(k, v)| (k, ctx.heap.finish_retain(v))).collect();

    let bound = bind_arguments(&mut ctx.heap, &sig, &defaults, &name, args, kwargs);
    for (_, v) in defaults {
        ctx.heap.release(v);
    }
    let bound = bound?;

    ctx.heap.push_call()?;
    let namespace = Namespace::child(enclosing);
    for (param_name, v) in bound.bindings {
        namespace.borrow_mut().set_local(&mut ctx.heap, &param_name, v);
    }
    let mut callee_frame = Frame::function(namespace, locals, name, frame.depth + 1);

    let result = match &body {
        Body::Block(stmts) => match exec_stmts(ctx, &mut callee_frame, stmts) {
            Ok(Flow::Return(v)) => Ok(v),
            Ok(_) => Ok(Value::None),
            Err(e) => Err(e),
        },
        Body::Expr(expr) => eval_expr(ctx, &mut callee_frame, expr),
    };
    callee_frame.namespace.borrow_mut().drain(&mut ctx.heap);
    ctx.heap.pop_call();
    result
}

fn call_external(ctx: &mut Ctx, id: HeapId, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RunResult<Value> {
    let arg_objects: Vec<crate::Object> = args.iter().map(|v| object::materialize(&ctx.heap, v)).collect();
    let kwarg_objects: std::collections::HashMap<String, crate::Object> =
        kwargs.iter().map(|(k, v)| (k.clone(), object::materialize(&ctx.heap, v))).collect();
    for v in args {
        ctx.heap.release(v);
    }
    for (_, v) in kwargs {
        ctx.heap.release(v);
    }
    let HeapData::External(ExternalObj { func, .. }) = ctx.heap.get_mut(id) else { unreachable!() };
    let outcome = func(arg_objects, kwarg_objects);
    match outcome {
        Ok(obj) => object::internalize(&mut ctx.heap, &obj),
        // Open question resolved (§9): a host-side error is surfaced as a
        // plain `RuntimeError` carrying the host's message.
        Err(msg) => Err(ctx.heap.raise(ExcType::RuntimeError, msg)),
    }
}

fn binary_op(ctx: &mut Ctx, op: Operator, left: Value, right: Value) -> RunResult<Value> {
    let result = crate::builtins::arithmetic::binary_op(ctx, op, &left, &right);
    ctx.heap.release(left);
    ctx.heap.release(right);
    result
}

fn unary_op(ctx: &mut Ctx, op: UnaryOp, operand: Value) -> RunResult<Value> {
    let result = crate::builtins::arithmetic::unary_op(ctx, op, &operand);
    ctx.heap.release(operand);
    result
}

// --- iteration protocol ----------------------------------------------------

/// Obtains a fresh iterator cell over `v` (§4.D), consuming `v`'s reference.
pub(crate) fn make_iterator(ctx: &mut Ctx, v: Value) -> RunResult<HeapId> {
    match &v {
        Value::Str(crate::value::EitherStr::Inline(s)) => {
            let chars: Vec<char> = s.as_str().chars().collect();
            ctx.heap.alloc(HeapData::Iterator(IterObj::InlineStr { chars, cursor: 0 }))
        }
        Value::Str(crate::value::EitherStr::Heap(h)) => {
            let h = *h;
            ctx.heap.retain(h);
            ctx.heap.release(v);
            ctx.heap.alloc(HeapData::Iterator(IterObj::Str { handle: h, cursor: 0 }))
        }
        Value::Ref(id) => {
            let id = *id;
            let result = match ctx.heap.get(id) {
                HeapData::List(_) => {
                    ctx.heap.retain(id);
                    ctx.heap.alloc(HeapData::Iterator(IterObj::List { handle: id, cursor: 0 }))
                }
                HeapData::Tuple(_) => {
                    ctx.heap.retain(id);
                    ctx.heap.alloc(HeapData::Iterator(IterObj::Tuple { handle: id, cursor: 0 }))
                }
                HeapData::Dict(d) => {
                    let version = d.version;
                    ctx.heap.retain(id);
                    ctx.heap.alloc(HeapData::Iterator(IterObj::Dict { handle: id, version, cursor: 0, view: crate::types::iter::DictView::Keys }))
                }
                HeapData::Set(s) => {
                    let version = s.version;
                    ctx.heap.retain(id);
                    ctx.heap.alloc(HeapData::Iterator(IterObj::Set { handle: id, version, cursor: 0 }))
                }
                HeapData::Range(r) => ctx.heap.alloc(HeapData::Iterator(IterObj::range(*r))),
                HeapData::Bytes(_) => {
                    ctx.heap.retain(id);
                    ctx.heap.alloc(HeapData::Iterator(IterObj::Bytes { handle: id, cursor: 0 }))
                }
                HeapData::Iterator(_) => {
                    ctx.heap.retain(id);
                    return Ok(id);
                }
                _ => return Err(ctx.heap.raise(ExcType::TypeError, "object is not iterable")),
            };
            ctx.heap.release(v);
            result
        }
        _ => Err(ctx.heap.raise(ExcType::TypeError, "object is not iterable")),
    }
}

/// Drains an iterable into an owned `Vec<Value>`, each element retained for
/// the caller. Used by unpacking, `list()`/`set()`/`dict()` constructors,
/// and `extend`.
pub(crate) fn collect_iterable(ctx: &mut Ctx, v: Value) -> RunResult<Vec<Value>> {
    let iter_id = make_iterator(ctx, v)?;
    let mut out = Vec::new();
    loop {
        match ctx.heap.iter_next(iter_id) {
            StepResult::Value(item) => out.push(item),
            StepResult::Exhausted => break,
            StepResult::SizeChanged => {
                ctx.heap.release(Value::Ref(iter_id));
                for item in out {
                    ctx.heap.release(item);
                }
                return Err(ctx.heap.raise(ExcType::RuntimeError, "container changed size during iteration"));
            }
        }
    }
    ctx.heap.release(Value::Ref(iter_id));
    Ok(out)
}
