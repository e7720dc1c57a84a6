//! Lexical-scope analysis: which names a function body binds locally.
//!
//! §4.C: "assignment in a function creates a local binding unless the name
//! resolves only in an enclosing scope." Monty doesn't carry per-name
//! resolution from a separate compile pass the way a bytecode frontend
//! would; instead each function computes its local-name set once (at
//! `def`-time, cached on the `FunctionObj`) by walking its own statements
//! without descending into nested `def`s, which have their own scope.

use std::collections::HashSet;

use ruff_python_ast::{self as ast, Expr, Stmt};

/// Returns every name this body assigns to directly (not through a nested
/// `def`), used to decide whether a read inside the function resolves
/// locally or walks out to the enclosing scope.
pub(crate) fn collect_locals(body: &[Stmt]) -> HashSet<String> {
    let mut locals = HashSet::new();
    for stmt in body {
        collect_stmt(stmt, &mut locals);
    }
    locals
}

fn bind_target(expr: &Expr, locals: &mut HashSet<String>) {
    match expr {
        Expr::Name(name) => {
            locals.insert(name.id.to_string());
        }
        Expr::Tuple(t) => {
            for e in &t.elts {
                bind_target(e, locals);
            }
        }
        Expr::List(l) => {
            for e in &l.elts {
                bind_target(e, locals);
            }
        }
        Expr::Starred(s) => bind_target(&s.value, locals),
        // Attribute/subscript targets (`obj.attr = x`, `obj[i] = x`) don't
        // bind a new local name.
        _ => {}
    }
}

fn collect_stmt(stmt: &Stmt, locals: &mut HashSet<String>) {
    match stmt {
        Stmt::Assign(a) => {
            for t in &a.targets {
                bind_target(t, locals);
            }
        }
        Stmt::AugAssign(a) => bind_target(&a.target, locals),
        Stmt::AnnAssign(a) => bind_target(&a.target, locals),
        Stmt::For(f) => {
            bind_target(&f.target, locals);
            for s in &f.body {
                collect_stmt(s, locals);
            }
            for s in &f.orelse {
                collect_stmt(s, locals);
            }
        }
        Stmt::While(w) => {
            for s in &w.body {
                collect_stmt(s, locals);
            }
            for s in &w.orelse {
                collect_stmt(s, locals);
            }
        }
        Stmt::If(i) => {
            for s in &i.body {
                collect_stmt(s, locals);
            }
            for clause in &i.elif_else_clauses {
                for s in &clause.body {
                    collect_stmt(s, locals);
                }
            }
        }
        Stmt::Try(t) => {
            for s in &t.body {
                collect_stmt(s, locals);
            }
            for handler in &t.handlers {
                let ast::ExceptHandler::ExceptHandler(h) = handler;
                if let Some(name) = &h.name {
                    locals.insert(name.to_string());
                }
                for s in &h.body {
                    collect_stmt(s, locals);
                }
            }
            for s in &t.orelse {
                collect_stmt(s, locals);
            }
            for s in &t.finalbody {
                collect_stmt(s, locals);
            }
        }
        Stmt::FunctionDef(f) => {
            // The inner `def` binds its own name in the outer scope; its
            // body is a separate scope and is not walked here.
            locals.insert(f.name.to_string());
        }
        // Module-level-only or unsupported-in-function statements; the
        // resolver rejects anything we shouldn't see by the time this runs.
        _ => {}
    }
}
