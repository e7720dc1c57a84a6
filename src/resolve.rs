//! AST-subset validation (§1 non-goals): walks a parsed module and rejects
//! any construct outside the supported subset before the evaluator ever
//! sees it, so an unsupported feature fails fast as a `SyntaxError` rather
//! than surfacing as a confusing runtime panic or silent misbehavior.
//!
//! Name resolution itself isn't a separate pass here — `namespace` computes
//! each function's local-name set lazily at `def`-time instead of carrying
//! frontend-annotated slots, so this module's only job is the reject list.

use ruff_python_ast::{self as ast, Expr, Stmt};

use crate::exception::{ExcType, Exception};

fn unsupported(what: &str) -> Exception {
    Exception::new(ExcType::SyntaxError, format!("{what} is not supported"))
}

/// Validates every statement reachable from a module body, recursing into
/// nested blocks and expressions.
pub(crate) fn validate_module(body: &[Stmt]) -> Result<(), Exception> {
    for stmt in body {
        validate_stmt(stmt)?;
    }
    Ok(())
}

fn validate_stmts(body: &[Stmt]) -> Result<(), Exception> {
    body.iter().try_for_each(validate_stmt)
}

fn validate_stmt(stmt: &Stmt) -> Result<(), Exception> {
    match stmt {
        Stmt::FunctionDef(f) => {
            if f.is_async {
                return Err(unsupported("async def"));
            }
            if !f.decorator_list.is_empty() {
                return Err(unsupported("function decorators"));
            }
            if f.type_params.is_some() {
                return Err(unsupported("generic type parameters"));
            }
            validate_params(&f.parameters)?;
            validate_stmts(&f.body)
        }
        Stmt::ClassDef(_) => Err(unsupported("class definitions")),
        Stmt::Return(r) => r.value.as_deref().map_or(Ok(()), validate_expr),
        Stmt::Delete(d) => d.targets.iter().try_for_each(validate_expr),
        Stmt::Assign(a) => {
            a.targets.iter().try_for_each(validate_expr)?;
            validate_expr(&a.value)
        }
        Stmt::AugAssign(a) => {
            validate_expr(&a.target)?;
            validate_expr(&a.value)
        }
        Stmt::AnnAssign(a) => {
            validate_expr(&a.target)?;
            if let Some(v) = &a.value {
                validate_expr(v)?;
            }
            Ok(())
        }
        Stmt::For(f) => {
            if f.is_async {
                return Err(unsupported("async for"));
            }
            validate_expr(&f.target)?;
            validate_expr(&f.iter)?;
            validate_stmts(&f.body)?;
            validate_stmts(&f.orelse)
        }
        Stmt::While(w) => {
            validate_expr(&w.test)?;
            validate_stmts(&w.body)?;
            validate_stmts(&w.orelse)
        }
        Stmt::If(i) => {
            validate_expr(&i.test)?;
            validate_stmts(&i.body)?;
            for clause in &i.elif_else_clauses {
                if let Some(test) = &clause.test {
                    validate_expr(test)?;
                }
                validate_stmts(&clause.body)?;
            }
            Ok(())
        }
        Stmt::With(_) => Err(unsupported("with statements")),
        Stmt::Match(_) => Err(unsupported("match statements")),
        Stmt::Raise(r) => {
            if let Some(exc) = &r.exc {
                validate_expr(exc)?;
            }
            if let Some(cause) = &r.cause {
                validate_expr(cause)?;
            }
            Ok(())
        }
        Stmt::Try(t) => {
            if t.is_star {
                return Err(unsupported("except* groups"));
            }
            validate_stmts(&t.body)?;
            for handler in &t.handlers {
                let ast::ExceptHandler::ExceptHandler(h) = handler;
                if let Some(exc_type) = &h.type_ {
                    validate_expr(exc_type)?;
                }
                validate_stmts(&h.body)?;
            }
            validate_stmts(&t.orelse)?;
            validate_stmts(&t.finalbody)
        }
        Stmt::Assert(a) => {
            validate_expr(&a.test)?;
            if let Some(msg) = &a.msg {
                validate_expr(msg)?;
            }
            Ok(())
        }
        Stmt::Import(_) | Stmt::ImportFrom(_) => Err(unsupported("import statements")),
        Stmt::Global(_) => Err(unsupported("global declarations")),
        Stmt::Nonlocal(_) => Err(unsupported("nonlocal declarations")),
        Stmt::Expr(e) => validate_expr(&e.value),
        Stmt::Pass(_) | Stmt::Break(_) | Stmt::Continue(_) => Ok(()),
        Stmt::TypeAlias(_) => Err(unsupported("type alias statements")),
        Stmt::IpyEscapeCommand(_) => Err(unsupported("IPython escape commands")),
    }
}

fn validate_params(params: &ast::Parameters) -> Result<(), Exception> {
    let all = params.posonlyargs.iter().chain(&params.args).chain(&params.kwonlyargs);
    for p in all {
        if p.parameter.annotation.is_some() {
            validate_expr(p.parameter.annotation.as_deref().unwrap())?;
        }
        if let Some(default) = &p.default {
            validate_expr(default)?;
        }
    }
    Ok(())
}

fn validate_expr(expr: &Expr) -> Result<(), Exception> {
    match expr {
        Expr::BoolOp(b) => b.values.iter().try_for_each(validate_expr),
        Expr::Named(_) => Err(unsupported("named expressions (`:=`)")),
        Expr::BinOp(b) => {
            validate_expr(&b.left)?;
            validate_expr(&b.right)
        }
        Expr::UnaryOp(u) => validate_expr(&u.operand),
        Expr::Lambda(l) => {
            validate_params(&l.parameters.clone().unwrap_or_default())?;
            validate_expr(&l.body)
        }
        Expr::If(i) => {
            validate_expr(&i.test)?;
            validate_expr(&i.body)?;
            validate_expr(&i.orelse)
        }
        Expr::Dict(d) => {
            for item in &d.items {
                if let Some(key) = &item.key {
                    validate_expr(key)?;
                }
                validate_expr(&item.value)?;
            }
            Ok(())
        }
        Expr::Set(s) => s.elts.iter().try_for_each(validate_expr),
        Expr::ListComp(_) | Expr::SetComp(_) | Expr::DictComp(_) | Expr::Generator(_) => {
            Err(unsupported("comprehensions and generator expressions"))
        }
        Expr::Await(_) => Err(unsupported("await expressions")),
        Expr::Yield(_) | Expr::YieldFrom(_) => Err(unsupported("yield expressions")),
        Expr::Compare(c) => {
            validate_expr(&c.left)?;
            c.comparators.iter().try_for_each(validate_expr)
        }
        Expr::Call(c) => {
            validate_expr(&c.func)?;
            for arg in &c.arguments.args {
                if matches!(arg, Expr::Starred(_)) {
                    return Err(unsupported("argument unpacking in a call (*expr)"));
                }
                validate_expr(arg)?;
            }
            for k in &c.arguments.keywords {
                if k.arg.is_none() {
                    return Err(unsupported("dict-unpacking in a call (**expr)"));
                }
                validate_expr(&k.value)?;
            }
            Ok(())
        }
        Expr::FString(f) => {
            for part in &f.value {
                let ast::FStringPart::FString(fstring) = part else { continue };
                for element in &fstring.elements {
                    let ast::InterpolatedStringElement::Interpolation(interp) = element else { continue };
                    if interp.format_spec.is_some() {
                        return Err(unsupported("f-string format specs"));
                    }
                    validate_expr(&interp.expression)?;
                }
            }
            Ok(())
        }
        Expr::NumberLiteral(n) => match &n.value {
            ast::Number::Complex { .. } => Err(unsupported("complex number literals")),
            ast::Number::Int(_) | ast::Number::Float(_) => Ok(()),
        },
        Expr::StringLiteral(_) | Expr::BytesLiteral(_) | Expr::BooleanLiteral(_) | Expr::NoneLiteral(_) => Ok(()),
        Expr::EllipsisLiteral(_) => Err(unsupported("ellipsis literals")),
        Expr::Attribute(a) => validate_expr(&a.value),
        Expr::Subscript(s) => {
            validate_expr(&s.value)?;
            validate_expr(&s.slice)
        }
        Expr::Starred(s) => validate_expr(&s.value),
        Expr::Name(_) => Ok(()),
        Expr::List(l) => l.elts.iter().try_for_each(validate_expr),
        Expr::Tuple(t) => t.elts.iter().try_for_each(validate_expr),
        Expr::Slice(s) => {
            for part in [&s.lower, &s.upper, &s.step] {
                if let Some(p) = part {
                    validate_expr(p)?;
                }
            }
            Ok(())
        }
        Expr::IpyEscapeCommand(_) => Err(unsupported("IPython escape commands")),
    }
}
