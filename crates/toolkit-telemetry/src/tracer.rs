//! Call tracing for function-level telemetry context
//!
//! [`with_telemetry_context`] wraps a callable so each call runs inside a
//! non-emitting `function_call` span. The span records the function on the
//! tracer's call stack, which later metrics read to attribute where they were
//! raised from.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, debug_span};

/// Span name used for wrapped function calls
pub const FUNCTION_CALL_SPAN: &str = "function_call";

/// Identifies a traced function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
}

impl FunctionEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class: None,
        }
    }

    pub fn method(class: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class: Some(class.into()),
        }
    }
}

impl fmt::Display for FunctionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.class {
            Some(class) => write!(f, "{}#{}", class, self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SpanOptions {
    /// Whether closing the span emits a metric
    pub emit: bool,
    pub function_id: Option<FunctionEntry>,
}

/// Runs a callback inside a named telemetry span
pub trait SpanRunner {
    fn run<R>(&self, span_name: &str, options: SpanOptions, f: impl FnOnce() -> R) -> R;
}

/// A span runner that keeps the stack of traced functions
#[derive(Debug, Default)]
pub struct FunctionTracer {
    stack: Mutex<Vec<FunctionEntry>>,
}

impl FunctionTracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Functions currently being traced, outermost first
    pub fn function_stack(&self) -> Vec<FunctionEntry> {
        self.stack.lock().clone()
    }
}

/// Pops the pushed entry even when the traced call unwinds
struct StackGuard<'a> {
    stack: &'a Mutex<Vec<FunctionEntry>>,
    pushed: bool,
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        if self.pushed {
            self.stack.lock().pop();
        }
    }
}

impl SpanRunner for FunctionTracer {
    fn run<R>(&self, span_name: &str, options: SpanOptions, f: impl FnOnce() -> R) -> R {
        let function = options
            .function_id
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        let span = debug_span!("telemetry", span = span_name, emit = options.emit, function = %function);
        let _entered = span.enter();

        let pushed = match options.function_id {
            Some(entry) => {
                self.stack.lock().push(entry);
                true
            }
            None => false,
        };
        let guard = StackGuard {
            stack: &self.stack,
            pushed,
        };

        let result = f();

        drop(guard);
        if options.emit {
            debug!(span = span_name, "telemetry: span closed");
        }
        result
    }
}

/// Wrap `f` so every call runs in a non-emitting `function_call` span that
/// records `function_id`. Arguments, results and errors pass through as-is.
pub fn with_telemetry_context<'a, T, A, R, F>(
    tracer: &'a T,
    function_id: FunctionEntry,
    f: F,
) -> impl Fn(A) -> R + 'a
where
    T: SpanRunner + 'a,
    F: Fn(A) -> R + 'a,
    A: 'a,
    R: 'a,
{
    move |args| {
        let options = SpanOptions {
            emit: false,
            function_id: Some(function_id.clone()),
        };
        tracer.run(FUNCTION_CALL_SPAN, options, || f(args))
    }
}
