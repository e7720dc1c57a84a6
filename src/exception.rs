//! The exception taxonomy and the runtime's internal control-flow error type.

use std::fmt;

use strum::{Display, EnumString, IntoStaticStr};

use crate::{heap::HeapId, object::Object, value::Value};

/// Exception kinds the interpreter can raise or that a program can catch.
///
/// `Exception` is the universal base: every kind matches a bare `except:` or
/// `except Exception:` clause, but a specific `except TypeName:` clause
/// matches only its own kind (there is no class hierarchy to walk).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum ExcType {
    Exception,
    SyntaxError,
    NameError,
    TypeError,
    ValueError,
    KeyError,
    IndexError,
    AttributeError,
    ZeroDivisionError,
    AssertionError,
    RuntimeError,
    NotImplementedError,
    MemoryError,
    RecursionError,
    /// Wall-clock budget exceeded. See `ResourceLimits::max_duration_secs`;
    /// the open question in the resource-governor design is resolved in
    /// favor of a dedicated kind rather than overloading `RuntimeError`.
    TimeoutError,
    /// Iterator exhaustion. Internal: the evaluator consumes this to stop a
    /// `for` loop or drive `next()`; it is not normally surfaced to the host.
    StopIteration,
}

impl ExcType {
    /// Whether `except name:` (source text `name`) catches this kind.
    pub(crate) fn matches_clause(self, name: &str) -> bool {
        name == "Exception" || name == <&'static str>::from(self)
    }
}

/// A materialized exception instance: kind, message, and optional cause.
///
/// This is the host-visible form, returned from `Program::run` on an
/// uncaught error and reachable from Monty code via `.args`/`str(e)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
    pub kind: ExcType,
    pub message: Option<String>,
    pub cause: Option<Box<Exception>>,
}

impl Exception {
    #[must_use]
    pub fn new(kind: ExcType, message: impl Into<String>) -> Self {
        Self { kind, message: Some(message.into()), cause: None }
    }

    #[must_use]
    pub fn bare(kind: ExcType) -> Self {
        Self { kind, message: None, cause: None }
    }

    #[must_use]
    pub fn with_cause(mut self, cause: Exception) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{}: {msg}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for Exception {}

/// Heap-resident payload for the `Exception` value variant: an exception
/// instance live on the object store, as seen by a `try`/`except` handler
/// and reachable through `.args`/`.cause` attribute access.
#[derive(Debug)]
pub(crate) struct ExceptionObject {
    pub kind: ExcType,
    pub args: Vec<Value>,
    pub cause: Option<HeapId>,
}

impl ExceptionObject {
    /// The first constructor argument, if there was one and it was a string.
    /// Needs heap context to resolve a forced-heap string, so lives as a
    /// method on [`crate::heap::Heap`] (see `Heap::exception_message`).
    pub(crate) fn first_arg(&self) -> Option<&Value> {
        self.args.first()
    }
}

/// Crate-internal result alias for operations that can raise.
pub(crate) type RunResult<T> = Result<T, RunError>;

/// The interpreter's internal propagation type.
///
/// Distinguishes three cases the evaluator must treat differently:
/// - `Internal` marks a bug in the interpreter itself, not user code.
/// - `Raise` is a catchable Monty exception: `try`/`except` may intercept it.
/// - `Uncatchable` is a resource-governor fault (`MemoryError`,
///   `TimeoutError`) that sandboxed code must never be able to swallow with
///   a broad `except:` clause; `RecursionError` is deliberately excluded
///   from this case so CPython-style `except RecursionError:` still works.
#[derive(Debug)]
pub(crate) enum RunError {
    Internal(&'static str),
    Raise(HeapId),
    Uncatchable(HeapId),
}

impl RunError {
    pub(crate) fn heap_id(&self) -> Option<HeapId> {
        match self {
            Self::Raise(h) | Self::Uncatchable(h) => Some(*h),
            Self::Internal(_) => None,
        }
    }
}

/// Converts a materialized [`Exception`] into an [`Object`] for round-tripping
/// through host callback boundaries (see `run::materialize`).
pub(crate) fn exception_to_object(exc: &Exception) -> Object {
    Object::Exception {
        kind: exc.kind.to_string(),
        message: exc.message.clone(),
        cause: exc.cause.as_ref().map(|c| Box::new(exception_to_object(c))),
    }
}
