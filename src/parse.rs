//! Frontend boundary (§4.A, §6): hands source text to `ruff_python_parser`
//! and turns a syntax failure into a `SyntaxError` before anything else in
//! the crate sees the source. The resulting `ruff_python_ast::ModModule` is
//! used directly as the working tree — there is no separate lowering pass
//! duplicating what the parser already built.

use ruff_python_ast::ModModule;
use ruff_python_parser::parse_module;
use ruff_text_size::{Ranged, TextSize};

use crate::exception::{ExcType, Exception};

/// Parses `source` into a module tree, or a `SyntaxError` describing where
/// it failed. Line/column are 1-indexed to match the conventional reading of
/// a source listing.
pub(crate) fn parse(source: &str) -> Result<ModModule, Exception> {
    let parsed = parse_module(source).map_err(|err| {
        let (line, column) = line_col(source, err.range().start());
        Exception::new(ExcType::SyntaxError, format!("{err} (line {line}, column {column})"))
    })?;
    Ok(parsed.into_syntax())
}

/// Converts a byte offset into a 1-indexed `(line, column)` pair by counting
/// newlines up to it. `source` is typically small (sandboxed scripts), so a
/// linear scan avoids the overhead of building a line-offset table that only
/// ever serves one lookup per syntax error.
fn line_col(source: &str, offset: TextSize) -> (usize, usize) {
    let offset = usize::from(offset).min(source.len());
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let column = before.rfind('\n').map_or(offset, |nl| offset - nl - 1) + 1;
    (line, column)
}
