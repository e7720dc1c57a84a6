//! The iterator protocol (§3, §4.D, §9).
//!
//! Each variant tracks only a cursor plus the handle of the value it walks,
//! so `next` always reads the *current* state of the underlying container:
//! `List` iteration rechecks length on every step (mutation-during-iteration
//! is allowed); `Dict`/`Set` iteration records the container's `version` at
//! creation and raises `RuntimeError` the moment it no longer matches.

use crate::{heap::HeapId, value::Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DictView {
    Keys,
    Values,
    Items,
}

#[derive(Debug)]
pub(crate) enum IterObj {
    List { handle: HeapId, cursor: usize },
    Tuple { handle: HeapId, cursor: usize },
    Dict { handle: HeapId, version: u64, cursor: usize, view: DictView },
    Set { handle: HeapId, version: u64, cursor: usize },
    Range { start: i64, stop: i64, step: i64 },
    Str { handle: HeapId, cursor: usize },
    InlineStr { chars: Vec<char>, cursor: usize },
    Bytes { handle: HeapId, cursor: usize },
}

/// Outcome of advancing an iterator one step.
pub(crate) enum StepResult {
    Value(Value),
    Exhausted,
    /// The backing `Dict`/`Set` changed size since iteration started.
    SizeChanged,
}

impl IterObj {
    pub(crate) fn range(r: crate::types::RangeObj) -> Self {
        Self::Range { start: r.start, stop: r.stop, step: r.step }
    }
}
