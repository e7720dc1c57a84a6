//! The internal, runtime-only value representation.
//!
//! `Value` is never `Clone`: heap variants carry a strong reference and must
//! go through [`crate::heap::Heap::retain`]/`release` so the store's
//! refcounts stay honest. Use `Value::retain_clone` when a genuine second
//! owning reference is needed (e.g. storing a value into a container).

use crate::heap::HeapId;

/// The short-string inline bound (§3, §9 open question: "short-string
/// inlining bound is an implementation choice"). Strings at or under this
/// many bytes live inline in the `Value`; longer strings are heap-allocated
/// and tracked by the object store/governor, matching the `iterate over
/// heap string` test's expectation that concatenation can force heap
/// allocation.
pub(crate) const INLINE_STR_BOUND: usize = 22;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct InlineStr {
    len: u8,
    bytes: [u8; INLINE_STR_BOUND],
}

impl InlineStr {
    pub(crate) fn try_new(s: &str) -> Option<Self> {
        if s.len() > INLINE_STR_BOUND {
            return None;
        }
        let mut bytes = [0u8; INLINE_STR_BOUND];
        bytes[..s.len()].copy_from_slice(s.as_bytes());
        Some(Self { len: s.len() as u8, bytes })
    }

    pub(crate) fn as_str(&self) -> &str {
        // SAFETY: constructed only from a valid `&str` slice of the same bytes.
        std::str::from_utf8(&self.bytes[..self.len as usize]).expect("inline str is valid utf-8")
    }
}

/// Either an inline short string or a handle to a heap `Str` cell.
///
/// Exposed as a single `as_str`-capable type so callers rarely need to match
/// on which representation they hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EitherStr {
    Inline(InlineStr),
    Heap(HeapId),
}

/// Tagged runtime value. Immediate variants are copy-by-value; the rest hold
/// a handle into the object store and must be retained/released explicitly.
#[derive(Debug)]
pub(crate) enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Short strings inline; long/forced-heap strings carry a `HeapId`.
    Str(EitherStr),
    /// Heap handle for `Bytes`, `List`, `Tuple`, `Dict`, `Set`, `Range`,
    /// `Function`, `BoundExternal`, `Exception`, `Iterator`, and forced-heap
    /// `Str` cells (see `EitherStr::Heap`, which duplicates the tag for
    /// direct string dispatch without a heap lookup).
    Ref(HeapId),
}

impl Value {
    pub(crate) fn str_inline_or_ref(s: &str, heap_id_if_long: impl FnOnce() -> HeapId) -> Self {
        match InlineStr::try_new(s) {
            Some(inline) => Self::Str(EitherStr::Inline(inline)),
            None => Self::Str(EitherStr::Heap(heap_id_if_long())),
        }
    }

    pub(crate) fn is_heap(&self) -> bool {
        matches!(self, Self::Ref(_) | Self::Str(EitherStr::Heap(_)))
    }

    pub(crate) fn heap_id(&self) -> Option<HeapId> {
        match self {
            Self::Ref(h) | Self::Str(EitherStr::Heap(h)) => Some(*h),
            _ => None,
        }
    }

    /// Truthiness per §"Truthiness": `None`, zero numerics, and empty
    /// containers/strings/bytes are false; everything else is true.
    /// Containers require heap access, so this only handles the immediate
    /// cases; `Heap::truthy` covers the rest.
    pub(crate) fn immediate_truthy(&self) -> Option<bool> {
        match self {
            Self::None => Some(false),
            Self::Bool(b) => Some(*b),
            Self::Int(i) => Some(*i != 0),
            Self::Float(f) => Some(*f != 0.0),
            Self::Str(EitherStr::Inline(s)) => Some(!s.as_str().is_empty()),
            _ => None,
        }
    }

    pub(crate) fn type_name(&self, heap: &crate::heap::Heap) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Ref(h) => heap.type_name(*h),
        }
    }
}
