//! [`DebugTarget`] implementation for the bundled `ember-script` engine.

use std::any::Any;
use std::sync::Arc;

use ember_script::{
    BreakpointOptions, DebugHandle, ObjectRef, Runtime, ScopeKind, ScriptError, Value,
};

use crate::engine::{
    BreakpointSpec, DebugAction, DebugContext, DebugEvent, DebugObject, DebugPosition,
    DebugTarget, DebugValue, ExceptionFilters, FrameInfo, LogHook, ScopeSnapshot, StopHook,
};
use crate::server::RunFn;

#[derive(Debug, Clone)]
pub struct ScriptTarget {
    handle: DebugHandle,
}

impl ScriptTarget {
    pub fn new(handle: DebugHandle) -> Self {
        Self { handle }
    }

    pub fn for_runtime(runtime: &Runtime) -> Self {
        Self::new(runtime.debug_handle())
    }
}

/// A run callback that executes `source` as `filename` on `runtime`.
///
/// An interrupt from the debugger counts as a normal end. Any other script error is returned,
/// which the session reports to the client on stderr before `terminated`.
pub fn script_runner(mut runtime: Runtime, filename: impl Into<String>, source: impl Into<String>) -> RunFn {
    let filename = filename.into();
    let source = source.into();
    Box::new(move || {
        match runtime.run_script(&filename, &source) {
            Ok(_) => {}
            Err(ScriptError::Interrupted(reason)) => {
                tracing::info!(target: "ember.dap", %reason, "script interrupted");
            }
            Err(err) => {
                tracing::warn!(target: "ember.dap", error = %err, "script failed");
                return Err(err.into());
            }
        }
        Ok(())
    })
}

impl DebugTarget for ScriptTarget {
    fn install_hooks(&self, stop: StopHook, log: LogHook) {
        let debug: ember_script::DebugHook = Arc::new(
            move |ctx: &mut ember_script::DebugContext<'_>,
                  event: ember_script::DebugEvent,
                  position: ember_script::DebugPosition| {
                let mut ctx = ScriptContext { inner: ctx };
                match stop(&mut ctx, event_from_script(event), position_from_script(position)) {
                    DebugAction::Continue => ember_script::DebugAction::Continue,
                    DebugAction::StepOver => ember_script::DebugAction::StepOver,
                    DebugAction::StepIn => ember_script::DebugAction::StepIn,
                    DebugAction::StepOut => ember_script::DebugAction::StepOut,
                }
            },
        );
        let log: ember_script::LogHook = Arc::new(move |message: String, position: ember_script::DebugPosition| {
            log(message, position_from_script(position))
        });
        self.handle.install_hooks(debug, log);
    }

    fn remove_hooks(&self) {
        self.handle.remove_hooks();
    }

    fn set_breakpoint(&self, breakpoint: &BreakpointSpec) -> u64 {
        self.handle.set_breakpoint(
            &breakpoint.path,
            breakpoint.line,
            breakpoint.column,
            BreakpointOptions {
                condition: breakpoint.condition.clone(),
                hit_condition: breakpoint.hit_condition.clone(),
                log_message: breakpoint.log_message.clone(),
            },
        )
    }

    fn clear_breakpoints(&self, path: &str) {
        self.handle.clear_breakpoints(path);
    }

    fn set_exception_filters(&self, filters: ExceptionFilters) {
        self.handle.set_exception_filters(ember_script::ExceptionFilters {
            all: filters.all,
            uncaught: filters.uncaught,
        });
    }

    fn request_pause(&self) {
        self.handle.request_pause();
    }

    fn interrupt(&self, reason: &str) {
        self.handle.interrupt(reason);
    }
}

fn event_from_script(event: ember_script::DebugEvent) -> DebugEvent {
    match event {
        ember_script::DebugEvent::Breakpoint => DebugEvent::Breakpoint,
        ember_script::DebugEvent::Step => DebugEvent::Step,
        ember_script::DebugEvent::Pause => DebugEvent::Pause,
        ember_script::DebugEvent::DebuggerStatement => DebugEvent::DebuggerStatement,
        ember_script::DebugEvent::Exception => DebugEvent::Exception,
    }
}

fn position_from_script(position: ember_script::DebugPosition) -> DebugPosition {
    DebugPosition {
        filename: position.filename,
        line: position.line,
        column: position.column,
    }
}

fn scope_name(kind: ScopeKind) -> &'static str {
    match kind {
        ScopeKind::Local => "Local",
        ScopeKind::Catch => "Catch",
        ScopeKind::Closure => "Closure",
        ScopeKind::Global => "Global",
    }
}

struct ScriptContext<'a, 'rt> {
    inner: &'a mut ember_script::DebugContext<'rt>,
}

impl DebugContext for ScriptContext<'_, '_> {
    fn call_stack(&self) -> Vec<FrameInfo> {
        self.inner
            .call_stack()
            .into_iter()
            .map(|frame| FrameInfo {
                name: frame.function_name,
                position: position_from_script(frame.position),
            })
            .collect()
    }

    fn scopes(&self, frame: usize) -> Vec<ScopeSnapshot> {
        self.inner
            .scopes(frame)
            .into_iter()
            .map(|scope| ScopeSnapshot {
                name: scope_name(scope.kind).to_string(),
                global: scope.kind == ScopeKind::Global,
                variables: scope
                    .variables
                    .into_iter()
                    .map(|(name, value)| (name, to_debug_value(value)))
                    .collect(),
            })
            .collect()
    }

    fn eval(&mut self, frame: usize, expression: &str) -> Result<DebugValue, String> {
        self.inner
            .eval(frame, expression)
            .map(to_debug_value)
            .map_err(|err| err.to_string())
    }

    fn set_variable(&mut self, frame: usize, scope: usize, name: &str, value: DebugValue) -> Result<(), String> {
        self.inner
            .set_variable(frame, scope, name, from_debug_value(value))
            .map_err(|err| err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct ScriptObject(ObjectRef);

impl DebugObject for ScriptObject {
    fn class_name(&self) -> String {
        self.0.class_name().to_string()
    }

    fn keys(&self) -> Vec<String> {
        self.0.keys()
    }

    fn get(&self, key: &str) -> DebugValue {
        to_debug_value(self.0.get(key))
    }

    fn set(&self, key: &str, value: DebugValue) -> Result<(), String> {
        self.0.set(key, from_debug_value(value));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn to_debug_value(value: Value) -> DebugValue {
    match value {
        Value::Undefined => DebugValue::Undefined,
        Value::Null => DebugValue::Null,
        Value::Bool(b) => DebugValue::Bool(b),
        Value::Number(n) => DebugValue::Number(n),
        Value::String(s) => DebugValue::String(s.to_string()),
        Value::Object(object) => DebugValue::Object(Arc::new(ScriptObject(object))),
    }
}

/// Objects that did not come from this engine become `undefined`.
pub fn from_debug_value(value: DebugValue) -> Value {
    match value {
        DebugValue::Undefined => Value::Undefined,
        DebugValue::Null => Value::Null,
        DebugValue::Bool(b) => Value::Bool(b),
        DebugValue::Number(n) => Value::Number(n),
        DebugValue::String(s) => Value::from(s),
        DebugValue::Object(object) => object
            .as_any()
            .downcast_ref::<ScriptObject>()
            .map(|ScriptObject(object)| Value::Object(object.clone()))
            .unwrap_or_default(),
    }
}
