//! The resource governor (§4.E): allocation, memory, wall-clock, GC
//! cadence, and recursion-depth enforcement.

use std::{
    fmt,
    time::{Duration, Instant},
};

use crate::exception::ExcType;

/// Recommended maximum recursion depth if the host doesn't override it.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 1000;

/// Configuration accepted by [`crate::Program::run`]. All fields are
/// optional; an absent field means "unbounded" except `max_recursion_depth`,
/// which defaults to [`DEFAULT_MAX_RECURSION_DEPTH`].
#[derive(Debug, Clone, Default)]
pub struct ResourceLimits {
    pub max_allocations: Option<usize>,
    pub max_memory: Option<usize>,
    pub max_duration_secs: Option<f64>,
    pub gc_interval: Option<usize>,
    pub max_recursion_depth: Option<usize>,
}

impl ResourceLimits {
    pub(crate) fn recursion_depth(&self) -> usize {
        self.max_recursion_depth.unwrap_or(DEFAULT_MAX_RECURSION_DEPTH)
    }
}

/// A resource limit was exceeded. Converted to an [`ExcType`] at the point
/// it's raised; see [`ResourceError::into_exc`].
#[derive(Debug, Clone)]
pub enum ResourceError {
    Allocation { limit: usize, count: usize },
    Time { limit: Duration, elapsed: Duration },
    Memory { limit: usize, used: usize },
    Recursion { limit: usize, depth: usize },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocation { limit, count } => write!(f, "allocation limit exceeded: {count} > {limit}"),
            Self::Time { limit, elapsed } => write!(f, "time limit exceeded: {elapsed:?} > {limit:?}"),
            Self::Memory { limit, used } => write!(f, "memory limit exceeded: {used} bytes > {limit} bytes"),
            Self::Recursion { limit, .. } => write!(f, "maximum recursion depth exceeded ({limit})"),
        }
    }
}

impl std::error::Error for ResourceError {}

impl ResourceError {
    /// Maps a resource fault to the exception kind that surfaces to Monty
    /// code. The open question on the timeout kind (§9) is resolved in
    /// favor of a dedicated `TimeoutError` rather than overloading
    /// `RuntimeError`.
    #[must_use]
    pub(crate) fn into_exc(self) -> (ExcType, String) {
        match self {
            Self::Allocation { .. } | Self::Memory { .. } => (ExcType::MemoryError, self.to_string()),
            Self::Time { .. } => (ExcType::TimeoutError, self.to_string()),
            Self::Recursion { .. } => (ExcType::RecursionError, self.to_string()),
        }
    }

    /// `MemoryError`/`TimeoutError` are uncatchable: sandboxed code must not
    /// be able to swallow a resource-exhaustion fault with a broad
    /// `except:` and keep running past its budget. `RecursionError` stays
    /// catchable so ordinary `try: f() except RecursionError:` works.
    #[must_use]
    pub(crate) fn catchable(&self) -> bool {
        matches!(self, Self::Recursion { .. })
    }
}

/// The governor's interface, consulted on every heap allocation, container
/// growth, call-frame push, and loop iteration.
pub trait ResourceTracker: fmt::Debug {
    fn on_allocate(&mut self, size: usize) -> Result<(), ResourceError>;
    fn on_free(&mut self, size: usize);
    /// Checked at statement boundaries and loop iterations (§4.E, §5).
    fn check_time(&mut self) -> Result<(), ResourceError>;
    fn check_recursion(&mut self, depth: usize) -> Result<(), ResourceError>;
    /// Whether the allocation count since the last GC pass has crossed
    /// `gc_interval`, in which case the heap should run the cycle collector.
    fn should_collect(&mut self) -> bool;
    fn note_collected(&mut self);
}

/// Enforces [`ResourceLimits`]; installed whenever the host supplies any.
#[derive(Debug)]
pub struct LimitedTracker {
    limits: ResourceLimits,
    start_time: Instant,
    allocation_count: usize,
    current_memory: usize,
    allocations_since_gc: usize,
}

impl LimitedTracker {
    #[must_use]
    pub fn new(limits: ResourceLimits) -> Self {
        Self { limits, start_time: Instant::now(), allocation_count: 0, current_memory: 0, allocations_since_gc: 0 }
    }
}

impl ResourceTracker for LimitedTracker {
    fn on_allocate(&mut self, size: usize) -> Result<(), ResourceError> {
        if let Some(max) = self.limits.max_allocations
            && self.allocation_count >= max
        {
            return Err(ResourceError::Allocation { limit: max, count: self.allocation_count + 1 });
        }
        let new_memory = self.current_memory + size;
        if let Some(max) = self.limits.max_memory
            && new_memory > max
        {
            return Err(ResourceError::Memory { limit: max, used: new_memory });
        }
        self.allocation_count += 1;
        self.current_memory = new_memory;
        self.allocations_since_gc += 1;
        Ok(())
    }

    fn on_free(&mut self, size: usize) {
        self.current_memory = self.current_memory.saturating_sub(size);
    }

    fn check_time(&mut self) -> Result<(), ResourceError> {
        if let Some(secs) = self.limits.max_duration_secs {
            let limit = Duration::from_secs_f64(secs.max(0.0));
            let elapsed = self.start_time.elapsed();
            if elapsed > limit {
                return Err(ResourceError::Time { limit, elapsed });
            }
        }
        Ok(())
    }

    fn check_recursion(&mut self, depth: usize) -> Result<(), ResourceError> {
        let limit = self.limits.recursion_depth();
        if depth > limit {
            return Err(ResourceError::Recursion { limit, depth });
        }
        Ok(())
    }

    fn should_collect(&mut self) -> bool {
        match self.limits.gc_interval {
            Some(n) if n > 0 => self.allocations_since_gc >= n,
            _ => false,
        }
    }

    fn note_collected(&mut self) {
        self.allocations_since_gc = 0;
    }
}

/// No limits installed: allocation/time/recursion checks always succeed
/// except the default recursion ceiling, which still applies so a runaway
/// `def f(): return f()` doesn't blow the Rust call stack.
#[derive(Debug, Default)]
pub struct NoLimitTracker {
    allocations_since_gc: usize,
    gc_interval: usize,
}

impl NoLimitTracker {
    #[must_use]
    pub fn new() -> Self {
        Self { allocations_since_gc: 0, gc_interval: 50_000 }
    }
}

impl ResourceTracker for NoLimitTracker {
    fn on_allocate(&mut self, _size: usize) -> Result<(), ResourceError> {
        self.allocations_since_gc += 1;
        Ok(())
    }
    fn on_free(&mut self, _size: usize) {}
    fn check_time(&mut self) -> Result<(), ResourceError> {
        Ok(())
    }
    fn check_recursion(&mut self, depth: usize) -> Result<(), ResourceError> {
        if depth > DEFAULT_MAX_RECURSION_DEPTH {
            return Err(ResourceError::Recursion { limit: DEFAULT_MAX_RECURSION_DEPTH, depth });
        }
        Ok(())
    }
    fn should_collect(&mut self) -> bool {
        self.allocations_since_gc >= self.gc_interval
    }
    fn note_collected(&mut self) {
        self.allocations_since_gc = 0;
    }
}
