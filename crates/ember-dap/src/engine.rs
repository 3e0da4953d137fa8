//! The seam between the protocol bridge and whatever engine runs the script.
//!
//! [`DebugTarget`] is the control surface the protocol thread uses at any time. [`DebugContext`]
//! only exists inside the stop hook, on the execution thread, while the engine is suspended.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugEvent {
    Breakpoint,
    DebuggerStatement,
    Step,
    Pause,
    Exception,
}

impl DebugEvent {
    /// The `reason` of the `stopped` event.
    pub fn reason(self) -> &'static str {
        match self {
            DebugEvent::Breakpoint | DebugEvent::DebuggerStatement => "breakpoint",
            DebugEvent::Step => "step",
            DebugEvent::Pause => "pause",
            DebugEvent::Exception => "exception",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugAction {
    #[default]
    Continue,
    StepOver,
    StepIn,
    StepOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DebugPosition {
    pub filename: String,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    /// Empty for top-level code and anonymous functions.
    pub name: String,
    pub position: DebugPosition,
}

#[derive(Debug, Clone)]
pub struct ScopeSnapshot {
    pub name: String,
    pub global: bool,
    pub variables: Vec<(String, DebugValue)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakpointSpec {
    pub path: String,
    pub line: u32,
    /// Zero matches any column.
    pub column: u32,
    pub condition: Option<String>,
    pub hit_condition: Option<String>,
    pub log_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExceptionFilters {
    pub all: bool,
    pub uncaught: bool,
}

impl ExceptionFilters {
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        let has = |wanted: &str| names.iter().any(|name| name.as_ref() == wanted);
        Self {
            all: has("all"),
            uncaught: has("uncaught"),
        }
    }
}

/// A structured value owned by the engine.
///
/// `class_name` must not run user code; `keys`, `get` and `set` are only called on the execution
/// thread while the engine is suspended.
pub trait DebugObject: Send + Sync {
    fn class_name(&self) -> String;
    fn keys(&self) -> Vec<String>;
    fn get(&self, key: &str) -> DebugValue;
    fn set(&self, key: &str, value: DebugValue) -> Result<(), String>;
    fn as_any(&self) -> &dyn Any;
}

#[derive(Clone, Default)]
pub enum DebugValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Object(Arc<dyn DebugObject>),
}

impl fmt::Debug for DebugValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DebugValue::Undefined => f.write_str("Undefined"),
            DebugValue::Null => f.write_str("Null"),
            DebugValue::Bool(b) => write!(f, "Bool({b})"),
            DebugValue::Number(n) => write!(f, "Number({n})"),
            DebugValue::String(s) => write!(f, "String({s:?})"),
            DebugValue::Object(obj) => write!(f, "Object({})", obj.class_name()),
        }
    }
}

/// Inspection surface of a suspended engine.
pub trait DebugContext {
    /// Innermost frame first.
    fn call_stack(&self) -> Vec<FrameInfo>;
    fn scopes(&self, frame: usize) -> Vec<ScopeSnapshot>;
    /// Errors carry the engine's message for the client.
    fn eval(&mut self, frame: usize, expression: &str) -> Result<DebugValue, String>;
    fn set_variable(&mut self, frame: usize, scope: usize, name: &str, value: DebugValue) -> Result<(), String>;
}

/// Called on the execution thread when the engine stops; it blocks until the returned action.
pub type StopHook = Arc<dyn Fn(&mut dyn DebugContext, DebugEvent, DebugPosition) -> DebugAction + Send + Sync>;

/// Receives interpolated log-point messages; the engine keeps running.
pub type LogHook = Arc<dyn Fn(String, DebugPosition) + Send + Sync>;

/// Control surface used by the protocol thread, whether or not the engine is running.
pub trait DebugTarget: Send + Sync {
    fn install_hooks(&self, stop: StopHook, log: LogHook);
    /// No hook invocation starts after this returns.
    fn remove_hooks(&self);
    /// Returns the engine's id for the new breakpoint.
    fn set_breakpoint(&self, breakpoint: &BreakpointSpec) -> u64;
    fn clear_breakpoints(&self, path: &str);
    fn set_exception_filters(&self, filters: ExceptionFilters);
    fn request_pause(&self);
    fn interrupt(&self, reason: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debugger_statements_report_as_breakpoints() {
        assert_eq!(DebugEvent::DebuggerStatement.reason(), "breakpoint");
        assert_eq!(DebugEvent::Exception.reason(), "exception");
    }

    #[test]
    fn exception_filters_from_names() {
        assert_eq!(
            ExceptionFilters::from_names(&["uncaught"]),
            ExceptionFilters { all: false, uncaught: true }
        );
        assert_eq!(ExceptionFilters::from_names::<&str>(&[]), ExceptionFilters::default());
    }
}
