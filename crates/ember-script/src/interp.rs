use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::ast::{
    collect_var_names, BinaryOp, Expr, ExprKind, FunctionDecl, LogicalOp, Pos, Stmt, StmtKind,
    UnaryOp,
};
use crate::builtins;
use crate::debug::{
    DebugAction, DebugEvent, DebugHandle, DebugPosition, Hooks, ScopeInfo, ScopeKind,
    StackFrameInfo,
};
use crate::error::ScriptError;
use crate::parser::parse_program;
use crate::value::{format_number, Callable, ObjectRef, Value};

/// Calls nested deeper than this raise a `RangeError` instead of exhausting the native stack.
const MAX_CALL_DEPTH: usize = 200;

pub(crate) type EnvRef = Arc<Mutex<Env>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EnvKind {
    Function,
    Catch,
    Global,
}

pub(crate) struct Env {
    vars: Vec<(String, Value)>,
    parent: Option<EnvRef>,
    kind: EnvKind,
}

fn new_env(kind: EnvKind, parent: Option<EnvRef>) -> EnvRef {
    Arc::new(Mutex::new(Env {
        vars: Vec::new(),
        parent,
        kind,
    }))
}

/// Adds `name` to `env` as `undefined` unless it is already bound there.
fn env_declare(env: &EnvRef, name: &str) {
    let mut env = env.lock();
    if !env.vars.iter().any(|(n, _)| n == name) {
        env.vars.push((name.to_string(), Value::Undefined));
    }
}

fn env_define(env: &EnvRef, name: &str, value: Value) {
    let mut env = env.lock();
    match env.vars.iter_mut().find(|(n, _)| n == name) {
        Some((_, slot)) => *slot = value,
        None => env.vars.push((name.to_string(), value)),
    }
}

fn env_lookup(env: &EnvRef, name: &str) -> Option<Value> {
    let mut current = env.clone();
    loop {
        let parent = {
            let guard = current.lock();
            if let Some((_, value)) = guard.vars.iter().find(|(n, _)| n == name) {
                return Some(value.clone());
            }
            guard.parent.clone()
        };
        current = parent?;
    }
}

/// Overwrites the nearest binding of `name`; returns false when none exists.
fn env_assign(env: &EnvRef, name: &str, value: Value) -> bool {
    let mut current = env.clone();
    loop {
        let parent = {
            let mut guard = current.lock();
            if let Some((_, slot)) = guard.vars.iter_mut().find(|(n, _)| n == name) {
                *slot = value;
                return true;
            }
            guard.parent.clone()
        };
        match parent {
            Some(parent) => current = parent,
            None => return false,
        }
    }
}

pub(crate) enum Abort {
    Throw { value: Value, pos: Pos },
    Interrupted(String),
}

pub(crate) type Exec<T> = Result<T, Abort>;

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

struct Frame {
    name: String,
    env: EnvRef,
    pos: Pos,
    filename: Arc<str>,
}

#[derive(Debug, Clone, Copy)]
struct StepState {
    action: DebugAction,
    depth: usize,
}

impl StepState {
    fn should_stop(self, depth: usize) -> bool {
        match self.action {
            DebugAction::StepIn => true,
            DebugAction::StepOver => depth <= self.depth,
            DebugAction::StepOut => depth < self.depth,
            DebugAction::Continue => false,
        }
    }
}

enum Place {
    Var(String),
    Prop(Value, String),
}

pub type ConsoleSink = Arc<dyn Fn(&str) + Send + Sync>;

/// A single-threaded script runtime. Debugger control happens through [`Runtime::debug_handle`],
/// which may be used from other threads while a script runs.
pub struct Runtime {
    global: EnvRef,
    builtins: Vec<(String, Value)>,
    frames: Vec<Frame>,
    debug: DebugHandle,
    step: Option<StepState>,
    /// Line and call depth of the last statement boundary that was checked for stops.
    last_checked: Option<(u32, usize)>,
    try_depth: usize,
    suppress_debug: usize,
    console: ConsoleSink,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        let mut runtime = Self {
            global: new_env(EnvKind::Global, None),
            builtins: Vec::new(),
            frames: Vec::new(),
            debug: DebugHandle::default(),
            step: None,
            last_checked: None,
            try_depth: 0,
            suppress_debug: 0,
            console: Arc::new(|line: &str| eprintln!("{line}")),
        };
        runtime.builtins = builtins::globals();
        runtime
    }

    pub fn debug_handle(&self) -> DebugHandle {
        self.debug.clone()
    }

    /// Replaces where `console.log` output goes (stderr by default).
    pub fn set_console(&mut self, sink: impl Fn(&str) + Send + Sync + 'static) {
        self.console = Arc::new(sink);
    }

    pub(crate) fn console(&self) -> ConsoleSink {
        self.console.clone()
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.global
            .lock()
            .vars
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        env_define(&self.global, name, value);
    }

    /// Runs `source` as a script named `filename` and returns the value of its last
    /// expression statement.
    pub fn run_script(&mut self, filename: &str, source: &str) -> Result<Value, ScriptError> {
        let body = parse_program(filename, source)?;
        let base = self.frames.len();
        self.frames.push(Frame {
            name: String::new(),
            env: self.global.clone(),
            pos: body.first().map(|s| s.pos).unwrap_or_default(),
            filename: Arc::from(filename),
        });
        self.last_checked = None;
        let result = self.exec_program(&body);
        self.frames.truncate(base);
        self.step = None;
        self.try_depth = 0;
        result.map_err(abort_to_error)
    }

    fn current_env(&self) -> EnvRef {
        self.frames
            .last()
            .map(|frame| frame.env.clone())
            .unwrap_or_else(|| self.global.clone())
    }

    fn current_filename(&self) -> Arc<str> {
        self.frames
            .last()
            .map(|frame| frame.filename.clone())
            .unwrap_or_else(|| Arc::from(""))
    }

    fn position(&self, pos: Pos) -> DebugPosition {
        DebugPosition {
            filename: self.current_filename().to_string(),
            line: pos.line,
            column: pos.column,
        }
    }

    fn hoist(&self, body: &[Stmt], env: &EnvRef) {
        let mut names = Vec::new();
        collect_var_names(body, &mut names);
        for name in &names {
            env_declare(env, name);
        }
        for stmt in body {
            if let StmtKind::Function(decl) = &stmt.kind {
                if let Some(name) = &decl.name {
                    env_define(env, name, closure(decl, env));
                }
            }
        }
    }

    fn exec_program(&mut self, body: &[Stmt]) -> Exec<Value> {
        let env = self.current_env();
        self.hoist(body, &env);
        let mut last = Value::Undefined;
        for stmt in body {
            match &stmt.kind {
                StmtKind::Expr(expr) => {
                    self.enter_statement(stmt)?;
                    last = self.eval(expr)?;
                }
                _ => {
                    if let Flow::Return(value) = self.exec_stmt(stmt)? {
                        return Ok(value);
                    }
                }
            }
        }
        Ok(last)
    }

    fn exec_block(&mut self, body: &[Stmt]) -> Exec<Flow> {
        for stmt in body {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn enter_statement(&mut self, stmt: &Stmt) -> Exec<()> {
        if !stmt.kind.is_pausable() {
            return Ok(());
        }
        if self.suppress_debug == 0 {
            if let Some(frame) = self.frames.last_mut() {
                frame.pos = stmt.pos;
            }
        }
        self.boundary(stmt.pos, matches!(stmt.kind, StmtKind::Debugger))
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Exec<Flow> {
        self.enter_statement(stmt)?;
        match &stmt.kind {
            StmtKind::Var(decls) => {
                self.declare_vars(decls)?;
                Ok(Flow::Normal)
            }
            StmtKind::Function(decl) => {
                if let Some(name) = &decl.name {
                    let env = self.current_env();
                    env_define(&env, name, closure(decl, &env));
                }
                Ok(Flow::Normal)
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            StmtKind::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test)?.truthy() {
                    self.exec_stmt(consequent)
                } else if let Some(alternate) = alternate {
                    self.exec_stmt(alternate)
                } else {
                    Ok(Flow::Normal)
                }
            }
            StmtKind::While { test, body } => {
                let mut first = true;
                loop {
                    self.check_interrupt()?;
                    if !first {
                        self.boundary(test.pos, false)?;
                    }
                    first = false;
                    if !self.eval(test)?.truthy() {
                        return Ok(Flow::Normal);
                    }
                    match self.exec_stmt(body)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            StmtKind::DoWhile { body, test } => loop {
                self.check_interrupt()?;
                match self.exec_stmt(body)? {
                    Flow::Break => return Ok(Flow::Normal),
                    Flow::Return(value) => return Ok(Flow::Return(value)),
                    Flow::Normal | Flow::Continue => {}
                }
                self.boundary(test.pos, false)?;
                if !self.eval(test)?.truthy() {
                    return Ok(Flow::Normal);
                }
            },
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => {
                if let Some(init) = init {
                    match &init.kind {
                        StmtKind::Var(decls) => self.declare_vars(decls)?,
                        StmtKind::Expr(expr) => {
                            self.eval(expr)?;
                        }
                        _ => {}
                    }
                }
                let header = test.as_ref().map_or(stmt.pos, |t| t.pos);
                loop {
                    self.check_interrupt()?;
                    if let Some(test) = test {
                        if !self.eval(test)?.truthy() {
                            return Ok(Flow::Normal);
                        }
                    }
                    match self.exec_stmt(body)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    self.boundary(header, false)?;
                    if let Some(update) = update {
                        self.eval(update)?;
                    }
                }
            }
            StmtKind::Block(body) => self.exec_block(body),
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
                Ok(Flow::Normal)
            }
            StmtKind::Throw(expr) => {
                let value = self.eval(expr)?;
                self.throw(value, stmt.pos)
            }
            StmtKind::Try {
                block,
                param,
                handler,
                finalizer,
            } => self.exec_try(block, param.as_deref(), handler.as_deref(), finalizer.as_deref()),
            StmtKind::Debugger | StmtKind::Empty => Ok(Flow::Normal),
            StmtKind::Break => Ok(Flow::Break),
            StmtKind::Continue => Ok(Flow::Continue),
        }
    }

    fn declare_vars(&mut self, decls: &[(String, Option<Expr>)]) -> Exec<()> {
        for (name, init) in decls {
            if let Some(init) = init {
                let value = self.eval(init)?;
                self.set_var(name, value);
            }
        }
        Ok(())
    }

    fn exec_try(
        &mut self,
        block: &[Stmt],
        param: Option<&str>,
        handler: Option<&[Stmt]>,
        finalizer: Option<&[Stmt]>,
    ) -> Exec<Flow> {
        if handler.is_some() {
            self.try_depth += 1;
        }
        let result = self.exec_block(block);
        if handler.is_some() {
            self.try_depth -= 1;
        }

        let result = match (result, handler) {
            (Err(Abort::Throw { value, .. }), Some(handler)) => {
                let env = new_env(EnvKind::Catch, Some(self.current_env()));
                if let Some(param) = param {
                    env_define(&env, param, value);
                }
                let saved = self.swap_frame_env(env);
                let result = self.exec_block(handler);
                if let Some(saved) = saved {
                    self.swap_frame_env(saved);
                }
                result
            }
            (other, _) => other,
        };

        if let Some(finalizer) = finalizer {
            match self.exec_block(finalizer)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        result
    }

    fn swap_frame_env(&mut self, env: EnvRef) -> Option<EnvRef> {
        self.frames
            .last_mut()
            .map(|frame| std::mem::replace(&mut frame.env, env))
    }

    fn check_interrupt(&self) -> Exec<()> {
        match self.debug.take_interrupt() {
            Some(reason) => {
                tracing::debug!(target: "ember.script", %reason, "script interrupted");
                Err(Abort::Interrupted(reason))
            }
            None => Ok(()),
        }
    }

    /// A statement boundary: the only place where the debugger can stop.
    fn boundary(&mut self, pos: Pos, debugger_stmt: bool) -> Exec<()> {
        self.check_interrupt()?;
        if self.suppress_debug > 0 {
            return Ok(());
        }
        let Some(hooks) = self.debug.hooks() else {
            return Ok(());
        };

        let depth = self.frames.len();
        let new_line = self.last_checked != Some((pos.line, depth));
        self.last_checked = Some((pos.line, depth));

        let mut event = None;
        if self.debug.take_pause() {
            event = Some(DebugEvent::Pause);
        } else if debugger_stmt {
            event = Some(DebugEvent::DebuggerStatement);
        } else if new_line {
            if self.hit_breakpoints(&hooks, pos)? {
                event = Some(DebugEvent::Breakpoint);
            } else if self.step.is_some_and(|step| step.should_stop(depth)) {
                event = Some(DebugEvent::Step);
            }
        }

        match event {
            Some(event) => self.fire(&hooks, event, pos),
            None => Ok(()),
        }
    }

    fn hit_breakpoints(&mut self, hooks: &Hooks, pos: Pos) -> Exec<bool> {
        let filename = self.current_filename();
        let candidates = self
            .debug
            .matching_breakpoints(&filename, pos.line, pos.column);
        let mut stop = false;
        for bp in candidates {
            if let Some(condition) = &bp.condition {
                if !self.eval_condition(condition)? {
                    continue;
                }
            }
            let hits = bp.hits.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(hit_condition) = bp.hit_condition {
                if !hit_condition.matches(hits) {
                    continue;
                }
            }
            if let Some(message) = &bp.log_message {
                let text = self.interpolate(message)?;
                (hooks.log)(text, self.position(pos));
                continue;
            }
            stop = true;
        }
        Ok(stop)
    }

    /// Conditions that fail to parse or throw count as false.
    fn eval_condition(&mut self, condition: &str) -> Exec<bool> {
        match self.eval_in_frame(0, condition) {
            Ok(value) => Ok(value.truthy()),
            Err(Abort::Interrupted(reason)) => Err(Abort::Interrupted(reason)),
            Err(Abort::Throw { .. }) => Ok(false),
        }
    }

    /// Replaces each `{expression}` in a log message with its evaluated value.
    fn interpolate(&mut self, message: &str) -> Exec<String> {
        let mut out = String::with_capacity(message.len());
        let mut rest = message;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                out.push_str(&rest[open..]);
                return Ok(out);
            };
            let expr = &after[..close];
            match self.eval_in_frame(0, expr) {
                Ok(value) => out.push_str(&value.to_js_string()),
                Err(Abort::Interrupted(reason)) => return Err(Abort::Interrupted(reason)),
                Err(Abort::Throw { value, .. }) => {
                    out.push_str(&format!("<{}>", value.to_js_string()))
                }
            }
            rest = &after[close + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    fn fire(&mut self, hooks: &Hooks, event: DebugEvent, pos: Pos) -> Exec<()> {
        let position = self.position(pos);
        tracing::trace!(
            target: "ember.script",
            ?event,
            file = %position.filename,
            line = position.line,
            "debug stop"
        );
        self.step = None;
        self.suppress_debug += 1;
        let action = {
            let mut ctx = DebugContext { runtime: self };
            (hooks.debug)(&mut ctx, event, position)
        };
        self.suppress_debug -= 1;
        let depth = self.frames.len();
        self.step = match action {
            DebugAction::Continue => None,
            action => Some(StepState { action, depth }),
        };
        self.check_interrupt()
    }

    /// Stops at the call site when a step leaves the frame it started in.
    fn after_return(&mut self) -> Exec<()> {
        if self.suppress_debug > 0 {
            return Ok(());
        }
        let depth = self.frames.len();
        let Some(step) = self.step else {
            return Ok(());
        };
        if depth >= step.depth {
            return Ok(());
        }
        let Some(hooks) = self.debug.hooks() else {
            return Ok(());
        };
        let pos = self.frames.last().map(|f| f.pos).unwrap_or_default();
        self.last_checked = Some((pos.line, depth));
        self.fire(&hooks, DebugEvent::Step, pos)
    }

    pub(crate) fn throw<T>(&mut self, value: Value, pos: Pos) -> Exec<T> {
        self.on_exception(pos)?;
        Err(Abort::Throw { value, pos })
    }

    pub(crate) fn throw_error<T>(&mut self, name: &str, message: impl AsRef<str>, pos: Pos) -> Exec<T> {
        let value = Value::Object(ObjectRef::error(name, message.as_ref()));
        self.throw(value, pos)
    }

    fn on_exception(&mut self, pos: Pos) -> Exec<()> {
        if self.suppress_debug > 0 {
            return Ok(());
        }
        let Some(hooks) = self.debug.hooks() else {
            return Ok(());
        };
        let filters = self.debug.exception_filters();
        let caught = self.try_depth > 0;
        if filters.all || (filters.uncaught && !caught) {
            self.fire(&hooks, DebugEvent::Exception, pos)
        } else {
            Ok(())
        }
    }

    /// Evaluates `source` against the scope of the frame `frame_index` levels below the top,
    /// with debug stops suppressed.
    fn eval_in_frame(&mut self, frame_index: usize, source: &str) -> Exec<Value> {
        let Some(target) = self.frame_at(frame_index) else {
            return Err(Abort::Throw {
                value: Value::Object(ObjectRef::error("Error", "invalid frame")),
                pos: Pos::default(),
            });
        };
        let env = target.env.clone();
        let filename = target.filename.clone();
        let pos = target.pos;

        let body = parse_program(&filename, source).map_err(|err| Abort::Throw {
            value: Value::Object(ObjectRef::error("SyntaxError", &err.to_string())),
            pos,
        })?;

        let base = self.frames.len();
        self.suppress_debug += 1;
        self.frames.push(Frame {
            name: String::new(),
            env,
            pos,
            filename,
        });
        let result = self.exec_program(&body);
        self.frames.truncate(base);
        self.suppress_debug -= 1;
        result
    }

    fn frame_at(&self, frame_index: usize) -> Option<&Frame> {
        let len = self.frames.len();
        if frame_index >= len {
            return None;
        }
        self.frames.get(len - 1 - frame_index)
    }

    fn lookup(&mut self, name: &str, pos: Pos) -> Exec<Value> {
        if let Some(value) = self.try_lookup(name) {
            return Ok(value);
        }
        self.throw_error("ReferenceError", format!("{name} is not defined"), pos)
    }

    fn try_lookup(&self, name: &str) -> Option<Value> {
        env_lookup(&self.current_env(), name).or_else(|| {
            self.builtins
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
        })
    }

    /// Assigns to the nearest binding, creating a global for undeclared names.
    fn set_var(&mut self, name: &str, value: Value) {
        if !env_assign(&self.current_env(), name, value.clone()) {
            env_define(&self.global, name, value);
        }
    }

    fn eval(&mut self, expr: &Expr) -> Exec<Value> {
        let pos = expr.pos;
        match &expr.kind {
            ExprKind::Number(n) => Ok(Value::Number(*n)),
            ExprKind::Str(s) => Ok(Value::from(s.as_str())),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Undefined => Ok(Value::Undefined),
            ExprKind::Ident(name) => self.lookup(name, pos),
            ExprKind::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Ok(Value::Object(ObjectRef::array(values)))
            }
            ExprKind::Object(props) => {
                let obj = ObjectRef::ordinary(Vec::with_capacity(props.len()));
                for (key, value) in props {
                    let value = self.eval(value)?;
                    obj.set(key, value);
                }
                Ok(Value::Object(obj))
            }
            ExprKind::Function(decl) => Ok(closure(decl, &self.current_env())),
            ExprKind::Unary(UnaryOp::TypeOf, operand) => {
                let value = match &operand.kind {
                    ExprKind::Ident(name) => self.try_lookup(name).unwrap_or_default(),
                    _ => self.eval(operand)?,
                };
                Ok(Value::from(value.type_of()))
            }
            ExprKind::Unary(op, operand) => {
                let value = self.eval(operand)?;
                Ok(match op {
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                    UnaryOp::TypeOf => Value::from(value.type_of()),
                })
            }
            ExprKind::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                Ok(binary(*op, &left, &right))
            }
            ExprKind::Logical(op, left, right) => {
                let left = self.eval(left)?;
                match (op, left.truthy()) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(left),
                    _ => self.eval(right),
                }
            }
            ExprKind::Assign(op, target, value) => {
                let place = self.resolve_place(target)?;
                let new_value = match op {
                    None => self.eval(value)?,
                    Some(op) => {
                        let current = self.read_place(&place, target.pos)?;
                        let rhs = self.eval(value)?;
                        binary(*op, &current, &rhs)
                    }
                };
                self.write_place(place, new_value.clone(), pos)?;
                Ok(new_value)
            }
            ExprKind::Update {
                increment,
                prefix,
                target,
            } => {
                let place = self.resolve_place(target)?;
                let old = self.read_place(&place, target.pos)?.to_number();
                let new = if *increment { old + 1.0 } else { old - 1.0 };
                self.write_place(place, Value::Number(new), pos)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            ExprKind::Conditional(test, consequent, alternate) => {
                if self.eval(test)?.truthy() {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            }
            ExprKind::Member(object, name) => {
                let object = self.eval(object)?;
                self.get_property(&object, name, pos)
            }
            ExprKind::Index(object, index) => {
                let object = self.eval(object)?;
                let key = property_key(&self.eval(index)?);
                self.get_property(&object, &key, pos)
            }
            ExprKind::Call(callee, args) => {
                let (function, this, description) = match &callee.kind {
                    ExprKind::Member(object, name) => {
                        let object = self.eval(object)?;
                        let function = self.get_property(&object, name, pos)?;
                        (function, object, name.clone())
                    }
                    ExprKind::Index(object, index) => {
                        let object = self.eval(object)?;
                        let key = property_key(&self.eval(index)?);
                        let function = self.get_property(&object, &key, pos)?;
                        (function, object, key)
                    }
                    ExprKind::Ident(name) => (self.eval(callee)?, Value::Undefined, name.clone()),
                    _ => (self.eval(callee)?, Value::Undefined, "expression".to_string()),
                };
                let args = self.eval_args(args)?;
                self.call_value(&function, this, args, pos, &description)
            }
            ExprKind::New(callee, args) => {
                let function = self.eval(callee)?;
                let args = self.eval_args(args)?;
                let callable = match &function {
                    Value::Object(obj) => obj.callable(),
                    _ => None,
                };
                match callable.as_deref() {
                    Some(Callable::Native { func, .. }) => func(self, Value::Undefined, args),
                    Some(Callable::Script { decl, env }) => {
                        let result = self.call_script(decl, env, args)?;
                        match result {
                            Value::Object(_) => Ok(result),
                            _ => Ok(Value::Object(ObjectRef::ordinary(Vec::new()))),
                        }
                    }
                    None => self.throw_error("TypeError", "value is not a constructor", pos),
                }
            }
        }
    }

    fn eval_args(&mut self, args: &[Expr]) -> Exec<Vec<Value>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg)?);
        }
        Ok(values)
    }

    fn resolve_place(&mut self, target: &Expr) -> Exec<Place> {
        match &target.kind {
            ExprKind::Ident(name) => Ok(Place::Var(name.clone())),
            ExprKind::Member(object, name) => Ok(Place::Prop(self.eval(object)?, name.clone())),
            ExprKind::Index(object, index) => {
                let object = self.eval(object)?;
                let key = property_key(&self.eval(index)?);
                Ok(Place::Prop(object, key))
            }
            _ => self.throw_error("SyntaxError", "invalid assignment target", target.pos),
        }
    }

    fn read_place(&mut self, place: &Place, pos: Pos) -> Exec<Value> {
        match place {
            Place::Var(name) => self.lookup(name, pos),
            Place::Prop(object, key) => self.get_property(object, key, pos),
        }
    }

    fn write_place(&mut self, place: Place, value: Value, pos: Pos) -> Exec<()> {
        match place {
            Place::Var(name) => {
                self.set_var(&name, value);
                Ok(())
            }
            Place::Prop(Value::Object(obj), key) => {
                obj.set(&key, value);
                Ok(())
            }
            Place::Prop(target @ (Value::Undefined | Value::Null), key) => self.throw_error(
                "TypeError",
                format!(
                    "Cannot set properties of {} (setting '{key}')",
                    target.to_js_string()
                ),
                pos,
            ),
            // Writes to primitives are silently dropped.
            Place::Prop(..) => Ok(()),
        }
    }

    pub(crate) fn get_property(&mut self, object: &Value, key: &str, pos: Pos) -> Exec<Value> {
        match object {
            Value::Undefined | Value::Null => self.throw_error(
                "TypeError",
                format!(
                    "Cannot read properties of {} (reading '{key}')",
                    object.to_js_string()
                ),
                pos,
            ),
            Value::String(s) => Ok(match key {
                "length" => Value::Number(s.chars().count() as f64),
                _ => key
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| s.chars().nth(i))
                    .map(|c| Value::from(c.to_string()))
                    .unwrap_or_default(),
            }),
            Value::Object(obj) => {
                if obj.is_array() && !obj.has(key) {
                    if let Some(method) = builtins::array_method(key) {
                        return Ok(method);
                    }
                }
                Ok(obj.get(key))
            }
            Value::Bool(_) | Value::Number(_) => Ok(Value::Undefined),
        }
    }

    pub(crate) fn call_value(
        &mut self,
        function: &Value,
        this: Value,
        args: Vec<Value>,
        pos: Pos,
        description: &str,
    ) -> Exec<Value> {
        let callable = match function {
            Value::Object(obj) => obj.callable(),
            _ => None,
        };
        match callable.as_deref() {
            Some(Callable::Native { func, .. }) => func(self, this, args),
            Some(Callable::Script { decl, env }) => self.call_script(decl, env, args),
            None => self.throw_error("TypeError", format!("{description} is not a function"), pos),
        }
    }

    fn call_script(&mut self, decl: &Arc<FunctionDecl>, closure_env: &EnvRef, args: Vec<Value>) -> Exec<Value> {
        if self.frames.len() >= MAX_CALL_DEPTH {
            let pos = self.frames.last().map(|f| f.pos).unwrap_or_default();
            return self.throw_error("RangeError", "Maximum call stack size exceeded", pos);
        }

        let env = new_env(EnvKind::Function, Some(closure_env.clone()));
        let mut args = args.into_iter();
        for param in &decl.params {
            env_define(&env, param, args.next().unwrap_or_default());
        }
        self.hoist(&decl.body, &env);

        let saved_line = self.last_checked;
        self.frames.push(Frame {
            name: decl.name.clone().unwrap_or_default(),
            env,
            pos: decl.pos,
            filename: decl.filename.clone(),
        });
        let result = self.exec_block(&decl.body);
        self.frames.pop();
        // While stepping, the caller's line must be re-checked so the step can stop there.
        self.last_checked = if self.step.is_none() { saved_line } else { None };

        let value = match result? {
            Flow::Return(value) => value,
            _ => Value::Undefined,
        };
        self.after_return()?;
        Ok(value)
    }
}

fn closure(decl: &Arc<FunctionDecl>, env: &EnvRef) -> Value {
    Value::Object(ObjectRef::function(Callable::Script {
        decl: decl.clone(),
        env: env.clone(),
    }))
}

fn property_key(value: &Value) -> String {
    match value {
        Value::Number(n) => format_number(*n),
        other => other.to_js_string(),
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Add => {
            let stringy = |v: &Value| matches!(v, Value::String(_) | Value::Object(_));
            if stringy(left) || stringy(right) {
                Value::from(format!("{}{}", left.to_js_string(), right.to_js_string()))
            } else {
                Value::Number(left.to_number() + right.to_number())
            }
        }
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::Eq => Value::Bool(left.loose_equals(right)),
        BinaryOp::NotEq => Value::Bool(!left.loose_equals(right)),
        BinaryOp::StrictEq => Value::Bool(left.strict_equals(right)),
        BinaryOp::StrictNotEq => Value::Bool(!left.strict_equals(right)),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let ordering = match (left, right) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => left.to_number().partial_cmp(&right.to_number()),
            };
            let Some(ordering) = ordering else {
                return Value::Bool(false);
            };
            Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::LtEq => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
    }
}

fn abort_to_error(abort: Abort) -> ScriptError {
    match abort {
        Abort::Throw { value, pos } => ScriptError::Thrown {
            message: value.to_js_string(),
            line: pos.line,
            column: pos.column,
        },
        Abort::Interrupted(reason) => ScriptError::Interrupted(reason),
    }
}

/// Access to a paused runtime, handed to the debug hook for the duration of one stop.
pub struct DebugContext<'a> {
    runtime: &'a mut Runtime,
}

impl DebugContext<'_> {
    /// Frames from the innermost outwards.
    pub fn call_stack(&self) -> Vec<StackFrameInfo> {
        self.runtime
            .frames
            .iter()
            .rev()
            .map(|frame| StackFrameInfo {
                function_name: frame.name.clone(),
                position: DebugPosition {
                    filename: frame.filename.to_string(),
                    line: frame.pos.line,
                    column: frame.pos.column,
                },
            })
            .collect()
    }

    /// Scopes visible from `frame`, innermost first. Empty for an unknown frame.
    pub fn scopes(&self, frame: usize) -> Vec<ScopeInfo> {
        let Some(frame) = self.runtime.frame_at(frame) else {
            return Vec::new();
        };
        let mut scopes = Vec::new();
        let mut seen_local = false;
        let mut next = Some(frame.env.clone());
        while let Some(env) = next {
            let guard = env.lock();
            let kind = match guard.kind {
                EnvKind::Global => ScopeKind::Global,
                EnvKind::Catch => ScopeKind::Catch,
                EnvKind::Function if seen_local => ScopeKind::Closure,
                EnvKind::Function => {
                    seen_local = true;
                    ScopeKind::Local
                }
            };
            scopes.push(ScopeInfo {
                kind,
                variables: guard.vars.clone(),
            });
            next = guard.parent.clone();
        }
        scopes
    }

    pub fn eval(&mut self, frame: usize, source: &str) -> Result<Value, ScriptError> {
        match self.runtime.eval_in_frame(frame, source) {
            Ok(value) => Ok(value),
            Err(Abort::Interrupted(reason)) => {
                // Re-arm so the paused script still observes the interrupt once it resumes.
                self.runtime.debug.interrupt(reason.clone());
                Err(ScriptError::Interrupted(reason))
            }
            Err(abort) => Err(abort_to_error(abort)),
        }
    }

    /// Writes an existing binding in scope number `scope` of `frame` (as listed by [`Self::scopes`]).
    pub fn set_variable(&mut self, frame: usize, scope: usize, name: &str, value: Value) -> Result<(), ScriptError> {
        let Some(frame_ref) = self.runtime.frame_at(frame) else {
            return Err(ScriptError::Unsupported(format!("invalid frame {frame}")));
        };
        let mut env = frame_ref.env.clone();
        for _ in 0..scope {
            let parent = env.lock().parent.clone();
            env = parent.ok_or_else(|| ScriptError::Unsupported(format!("invalid scope {scope}")))?;
        }
        let mut guard = env.lock();
        match guard.vars.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => {
                *slot = value;
                Ok(())
            }
            None => Err(ScriptError::Unsupported(format!("{name} is not defined in scope"))),
        }
    }
}
