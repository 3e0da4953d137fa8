//! A small embeddable script engine with statement-level debugger hooks.
//!
//! The language is a JavaScript subset: `var`/`let`/`const`, functions and closures, objects
//! and arrays, the usual operators, loops, `try`/`catch`/`finally`, `throw` and `debugger`.

mod ast;
mod builtins;
mod debug;
mod error;
mod interp;
mod lexer;
mod parser;
mod value;

pub use ast::Pos;
pub use debug::{
    BreakpointOptions, DebugAction, DebugEvent, DebugHandle, DebugHook, DebugPosition,
    ExceptionFilters, HitCondition, LogHook, ScopeInfo, ScopeKind, StackFrameInfo,
};
pub use error::ScriptError;
pub use interp::{ConsoleSink, DebugContext, Runtime};
pub use value::{format_number, ObjectRef, Value};
