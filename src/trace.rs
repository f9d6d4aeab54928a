//! Conditional tracing macros (zero-cost when feature disabled).
//!
//! Coarse search, refinement and batch tracking open spans through these
//! macros; search outcomes, convergence and per-point failures are events.
//! Without the `tracing` feature everything compiles to nothing.

/// Info-level span around one search stage.
///
/// Expands to `tracing::info_span!` with the feature, otherwise to a
/// `NoopSpan` whose `entered()` is free.
#[cfg(feature = "tracing")]
macro_rules! trace_span {
    ($name:expr $(, $($field:tt)*)?) => {
        tracing::info_span!($name $(, $($field)*)?)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_span {
    ($name:expr $(, $($field:tt)*)?) => {
        $crate::trace::NoopSpan
    };
}

/// Debug-level event carrying per-point measurements.
///
/// Field values are still evaluated when the feature is off.
#[cfg(feature = "tracing")]
macro_rules! trace_event {
    ($name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        tracing::debug!(name: $name, $($key = $value),+)
    };
    ($name:expr) => {
        tracing::debug!(name: $name)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_event {
    ($name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        let _ = ($($value,)+);
    };
    ($name:expr) => {};
}

pub(crate) use trace_event;
pub(crate) use trace_span;

/// Span guard stand-in when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub struct NoopSpan;

#[cfg(not(feature = "tracing"))]
impl NoopSpan {
    /// Returns self, mimicking `Span::entered()`.
    #[inline]
    pub fn entered(self) -> Self {
        self
    }
}
