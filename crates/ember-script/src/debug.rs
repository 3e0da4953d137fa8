//! Debugger hooks exposed by the runtime.
//!
//! A [`DebugHandle`] is cheap to clone and safe to use from any thread: breakpoints, pause
//! requests and interrupts set through it are observed by the executing runtime at the start of
//! the next statement.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::interp::DebugContext;

/// Why the runtime stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugEvent {
    Breakpoint,
    Step,
    Pause,
    DebuggerStatement,
    Exception,
}

/// What the runtime should do when the debug hook returns.
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
pub struct StackFrameInfo {
    /// Empty for top-level code and anonymous functions.
    pub function_name: String,
    pub position: DebugPosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Local,
    Catch,
    Closure,
    Global,
}

#[derive(Debug, Clone)]
pub struct ScopeInfo {
    pub kind: ScopeKind,
    pub variables: Vec<(String, crate::Value)>,
}

pub type DebugHook =
    Arc<dyn Fn(&mut DebugContext<'_>, DebugEvent, DebugPosition) -> DebugAction + Send + Sync>;
pub type LogHook = Arc<dyn Fn(String, DebugPosition) + Send + Sync>;

#[derive(Clone)]
pub(crate) struct Hooks {
    pub debug: DebugHook,
    pub log: LogHook,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakpointOptions {
    pub condition: Option<String>,
    pub hit_condition: Option<String>,
    pub log_message: Option<String>,
}

/// When a breakpoint fires, based on how many times its condition has held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitCondition {
    Equal(u64),
    Every(u64),
    AtLeast(u64),
    Greater(u64),
    Less(u64),
    AtMost(u64),
}

impl HitCondition {
    /// Accepts `N` and `%N` (every Nth hit), `==N`, `>=N`, `>N`, `<N` and `<=N`.
    /// Anything else is ignored.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (ctor, rest): (fn(u64) -> HitCondition, &str) =
            if let Some(rest) = text.strip_prefix(">=") {
                (HitCondition::AtLeast, rest)
            } else if let Some(rest) = text.strip_prefix("<=") {
                (HitCondition::AtMost, rest)
            } else if let Some(rest) = text.strip_prefix("==") {
                (HitCondition::Equal, rest)
            } else if let Some(rest) = text.strip_prefix('>') {
                (HitCondition::Greater, rest)
            } else if let Some(rest) = text.strip_prefix('<') {
                (HitCondition::Less, rest)
            } else if let Some(rest) = text.strip_prefix('%') {
                (HitCondition::Every, rest)
            } else {
                (HitCondition::Every, text)
            };
        let n = rest.trim().parse::<u64>().ok()?;
        let condition = ctor(n);
        if condition == HitCondition::Every(0) {
            return None;
        }
        Some(condition)
    }

    pub fn matches(self, hits: u64) -> bool {
        match self {
            HitCondition::Equal(n) => hits == n,
            HitCondition::Every(n) => hits % n == 0,
            HitCondition::AtLeast(n) => hits >= n,
            HitCondition::Greater(n) => hits > n,
            HitCondition::Less(n) => hits < n,
            HitCondition::AtMost(n) => hits <= n,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Breakpoint {
    pub path: String,
    pub line: u32,
    pub column: u32,
    pub condition: Option<String>,
    pub hit_condition: Option<HitCondition>,
    pub log_message: Option<String>,
    pub hits: AtomicU64,
}

impl Breakpoint {
    fn matches(&self, filename: &str, line: u32, column: u32) -> bool {
        self.line == line && (self.column == 0 || self.column == column) && paths_match(&self.path, filename)
    }
}

/// Script names are matched exactly, or by file name when the directories differ.
fn paths_match(breakpoint: &str, filename: &str) -> bool {
    if breakpoint == filename {
        return true;
    }
    match (Path::new(breakpoint).file_name(), Path::new(filename).file_name()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExceptionFilters {
    pub all: bool,
    pub uncaught: bool,
}

#[derive(Default)]
struct DebugShared {
    hooks: Mutex<Option<Hooks>>,
    breakpoints: Mutex<Vec<(u64, Arc<Breakpoint>)>>,
    next_breakpoint_id: AtomicU64,
    exception_filters: Mutex<ExceptionFilters>,
    pause_requested: AtomicBool,
    interrupted: AtomicBool,
    interrupt_reason: Mutex<Option<String>>,
}

#[derive(Clone, Default)]
pub struct DebugHandle {
    shared: Arc<DebugShared>,
}

impl std::fmt::Debug for DebugHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugHandle")
            .field("hooks_installed", &self.shared.hooks.lock().is_some())
            .field("breakpoints", &self.shared.breakpoints.lock().len())
            .finish()
    }
}

impl DebugHandle {
    pub fn install_hooks(&self, debug: DebugHook, log: LogHook) {
        *self.shared.hooks.lock() = Some(Hooks { debug, log });
    }

    /// After this returns, no new hook invocation starts.
    pub fn remove_hooks(&self) {
        self.shared.hooks.lock().take();
    }

    /// Registers a breakpoint and returns its id. Unparseable hit conditions are ignored.
    pub fn set_breakpoint(&self, path: &str, line: u32, column: u32, options: BreakpointOptions) -> u64 {
        let id = self.shared.next_breakpoint_id.fetch_add(1, Ordering::Relaxed) + 1;
        let breakpoint = Breakpoint {
            path: path.to_string(),
            line,
            column,
            condition: options.condition.filter(|c| !c.trim().is_empty()),
            hit_condition: options.hit_condition.as_deref().and_then(HitCondition::parse),
            log_message: options.log_message.filter(|m| !m.is_empty()),
            hits: AtomicU64::new(0),
        };
        self.shared.breakpoints.lock().push((id, Arc::new(breakpoint)));
        id
    }

    /// Removes every breakpoint registered for `path`.
    pub fn clear_breakpoints(&self, path: &str) {
        self.shared
            .breakpoints
            .lock()
            .retain(|(_, bp)| bp.path != path);
    }

    pub fn set_exception_filters(&self, filters: ExceptionFilters) {
        *self.shared.exception_filters.lock() = filters;
    }

    pub fn request_pause(&self) {
        self.shared.pause_requested.store(true, Ordering::SeqCst);
    }

    /// Aborts the running script at its next statement or loop iteration.
    pub fn interrupt(&self, reason: impl Into<String>) {
        *self.shared.interrupt_reason.lock() = Some(reason.into());
        self.shared.interrupted.store(true, Ordering::SeqCst);
    }

    pub(crate) fn hooks(&self) -> Option<Hooks> {
        self.shared.hooks.lock().clone()
    }

    pub(crate) fn take_pause(&self) -> bool {
        self.shared.pause_requested.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn take_interrupt(&self) -> Option<String> {
        if !self.shared.interrupted.swap(false, Ordering::SeqCst) {
            return None;
        }
        Some(
            self.shared
                .interrupt_reason
                .lock()
                .take()
                .unwrap_or_else(|| "interrupted".to_string()),
        )
    }

    pub(crate) fn exception_filters(&self) -> ExceptionFilters {
        *self.shared.exception_filters.lock()
    }

    pub(crate) fn matching_breakpoints(&self, filename: &str, line: u32, column: u32) -> Vec<Arc<Breakpoint>> {
        self.shared
            .breakpoints
            .lock()
            .iter()
            .filter(|(_, bp)| bp.matches(filename, line, column))
            .map(|(_, bp)| bp.clone())
            .collect()
    }
}
