//! Request dispatch. Runs on the protocol thread; anything that touches the engine's paused
//! state goes through [`crate::coordinator::Coordinator::inspect`].

use std::panic::{self, AssertUnwindSafe};

use anyhow::{bail, Context as _};
use serde_json::{json, Value};

use crate::dap::codec::sanitize_json_error_message;
use crate::dap::messages::{Event, Request, Response};
use crate::dap::requests::{
    DapRequest, EvaluateArguments, LaunchArguments, ScopesArguments, SetBreakpointsArguments,
    SetExceptionBreakpointsArguments, SetVariableArguments, StackTraceArguments, VariablesArguments,
};
use crate::dap::types::{Breakpoint, Capabilities, Scope, Source, StackFrame, Thread, Variable};
use crate::engine::{BreakpointSpec, DebugAction, DebugValue, ExceptionFilters};
use crate::error::InspectError;
use crate::paths::{base_name, normalize_source_path};
use crate::refs::RefEntry;
use crate::render::{render_value, render_variable};
use crate::server::{DapServer, THREAD_ID};

const ANONYMOUS_FRAME: &str = "<anonymous>";

fn sanitize_anyhow_error_message(err: &anyhow::Error) -> String {
    if err.chain().any(|cause| cause.is::<serde_json::Error>()) {
        sanitize_json_error_message(&err.to_string())
    } else {
        err.to_string()
    }
}

/// Frame ids are 1-based; anything below 1 means the top frame.
fn frame_index(frame_id: i64) -> usize {
    usize::try_from(frame_id.saturating_sub(1)).unwrap_or(0)
}

impl DapServer {
    /// Answers one request. Returns true when the session should end.
    pub(crate) fn handle(&mut self, request: Request) -> bool {
        tracing::debug!(target: "ember.dap", seq = request.seq, command = %request.command, "request");

        if self.state.terminated && request.command != "disconnect" {
            self.transport.send(Response::error(&request, "Program has terminated"));
            return false;
        }

        let parsed = match DapRequest::parse(&request) {
            Ok(parsed) => parsed,
            Err(err) => {
                let message = sanitize_json_error_message(&err.to_string());
                self.transport.send(Response::error(&request, message));
                return false;
            }
        };

        match panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(&parsed))) {
            Ok(Ok(body)) => {
                self.transport.send(Response::success(&request, body));
                self.after_success(parsed)
            }
            Ok(Err(err)) => {
                self.transport
                    .send(Response::error(&request, sanitize_anyhow_error_message(&err)));
                false
            }
            Err(_) => {
                tracing::error!(target: "ember.dap", command = %request.command, "panic in DAP request handler");
                self.transport
                    .send(Response::error(&request, "Internal error (panic) while handling request"));
                false
            }
        }
    }

    fn dispatch(&mut self, request: &DapRequest) -> anyhow::Result<Option<Value>> {
        match request {
            DapRequest::Initialize => Ok(Some(serde_json::to_value(Capabilities::adapter())?)),
            DapRequest::Launch(args) => Ok(self.launch(args)),
            DapRequest::Attach => {
                self.state.launched = true;
                Ok(None)
            }
            DapRequest::SetBreakpoints(args) => self.set_breakpoints(args).map(Some),
            DapRequest::SetExceptionBreakpoints(args) => Ok(self.set_exception_breakpoints(args)),
            DapRequest::ConfigurationDone => {
                self.state.configured = true;
                Ok(None)
            }
            DapRequest::Threads => {
                let threads = [Thread {
                    id: THREAD_ID,
                    name: "main".to_string(),
                }];
                Ok(Some(json!({ "threads": threads })))
            }
            DapRequest::StackTrace(args) => self.stack_trace(args).map(Some),
            DapRequest::Scopes(args) => self.scopes(args).map(Some),
            DapRequest::Variables(args) => self.variables(args).map(Some),
            DapRequest::Evaluate(args) => self.evaluate(args).map(Some),
            DapRequest::SetVariable(args) => self.set_variable(args).map(Some),
            DapRequest::Continue => {
                self.ensure_paused()?;
                Ok(Some(json!({ "allThreadsContinued": true })))
            }
            DapRequest::Next | DapRequest::StepIn | DapRequest::StepOut => {
                self.ensure_paused()?;
                Ok(None)
            }
            DapRequest::Pause => {
                self.target.request_pause();
                Ok(None)
            }
            DapRequest::Terminate => {
                self.target.interrupt("terminated by debugger");
                Ok(None)
            }
            DapRequest::Disconnect => {
                self.coordinator.disconnect();
                self.state.paused = false;
                if self.state.owns_execution && !self.state.vm_done {
                    self.target.interrupt("debugger disconnected");
                }
                Ok(None)
            }
            DapRequest::Unsupported(command) => bail!("Unsupported request: {command}"),
        }
    }

    /// Work that must follow the response on the wire.
    fn after_success(&mut self, request: DapRequest) -> bool {
        let action = match request {
            DapRequest::Initialize => {
                self.transport.send(Event::new("initialized", None));
                return false;
            }
            DapRequest::ConfigurationDone => {
                tracing::debug!(
                    target: "ember.dap",
                    launched = self.state.launched,
                    stop_on_entry = self.state.stop_on_entry,
                    "configuration done; starting execution"
                );
                if self.state.stop_on_entry {
                    self.target.request_pause();
                }
                self.start_execution();
                return false;
            }
            DapRequest::Disconnect => return true,
            DapRequest::Continue => DebugAction::Continue,
            DapRequest::Next => DebugAction::StepOver,
            DapRequest::StepIn => DebugAction::StepIn,
            DapRequest::StepOut => DebugAction::StepOut,
            _ => return false,
        };
        self.state.paused = false;
        tracing::debug!(target: "ember.dap", ?action, "resuming");
        if !self.coordinator.resume(action) {
            tracing::warn!(target: "ember.dap", ?action, "execution thread was not waiting for a resume");
        }
        false
    }

    fn ensure_paused(&self) -> Result<(), InspectError> {
        if self.state.paused {
            Ok(())
        } else {
            Err(InspectError::NotPaused)
        }
    }

    fn launch(&mut self, args: &LaunchArguments) -> Option<Value> {
        self.state.stop_on_entry = args.stop_on_entry;
        self.state.launched = true;
        None
    }

    fn set_breakpoints(&mut self, args: &SetBreakpointsArguments) -> anyhow::Result<Value> {
        let path = args
            .source
            .path
            .as_deref()
            .map(normalize_source_path)
            .filter(|path| !path.is_empty())
            .or_else(|| args.source.name.clone().filter(|name| !name.is_empty()))
            .context("setBreakpoints requires a source path or name")?;

        self.sources.record(&path);
        self.target.clear_breakpoints(&path);

        let source = Source {
            name: Some(base_name(&path)),
            path: Some(path.clone()),
        };
        let breakpoints: Vec<Breakpoint> = args
            .breakpoints
            .iter()
            .map(|bp| {
                let id = self.target.set_breakpoint(&BreakpointSpec {
                    path: path.clone(),
                    line: bp.line,
                    column: bp.column.unwrap_or(0),
                    condition: bp.condition.clone(),
                    hit_condition: bp.hit_condition.clone(),
                    log_message: bp.log_message.clone(),
                });
                Breakpoint {
                    id,
                    verified: true,
                    source: Some(source.clone()),
                    line: bp.line,
                }
            })
            .collect();
        tracing::debug!(target: "ember.dap", %path, count = breakpoints.len(), "breakpoints replaced");
        Ok(json!({ "breakpoints": breakpoints }))
    }

    fn set_exception_breakpoints(&mut self, args: &SetExceptionBreakpointsArguments) -> Option<Value> {
        self.target
            .set_exception_filters(ExceptionFilters::from_names(&args.filters));
        None
    }

    fn stack_trace(&mut self, args: &StackTraceArguments) -> anyhow::Result<Value> {
        self.ensure_paused()?;
        let frames = self.coordinator.inspect(|ctx| ctx.call_stack())?;
        let total_frames = frames.len();
        let levels = args.levels.filter(|&levels| levels > 0).unwrap_or(usize::MAX);

        let stack_frames: Vec<StackFrame> = frames
            .into_iter()
            .enumerate()
            .skip(args.start_frame.unwrap_or(0))
            .take(levels)
            .map(|(index, frame)| {
                let path = self.sources.resolve(&frame.position.filename);
                let name = if frame.name.is_empty() {
                    ANONYMOUS_FRAME.to_string()
                } else {
                    frame.name
                };
                StackFrame {
                    id: index as i64 + 1,
                    name,
                    source: Some(Source {
                        name: Some(base_name(&path)),
                        path: Some(path),
                    }),
                    line: frame.position.line,
                    column: frame.position.column,
                }
            })
            .collect();
        Ok(json!({ "stackFrames": stack_frames, "totalFrames": total_frames }))
    }

    fn scopes(&mut self, args: &ScopesArguments) -> anyhow::Result<Value> {
        self.ensure_paused()?;
        let frame = frame_index(args.frame_id);
        let snapshots = self.coordinator.inspect(move |ctx| ctx.scopes(frame))?;

        let mut scopes = Vec::with_capacity(snapshots.len());
        for (index, snapshot) in snapshots.into_iter().enumerate() {
            scopes.push(Scope {
                name: snapshot.name,
                expensive: snapshot.global,
                variables_reference: self.refs.add_scope(frame, index, snapshot.variables),
            });
        }
        Ok(json!({ "scopes": scopes }))
    }

    fn variables(&mut self, args: &VariablesArguments) -> anyhow::Result<Value> {
        let entry = self
            .refs
            .get(args.variables_reference)
            .cloned()
            .context("Invalid variable reference")?;
        let members = match entry {
            RefEntry::Scope { variables, .. } => variables,
            RefEntry::Object(object) => {
                self.ensure_paused()?;
                self.coordinator.inspect(move |_| {
                    object
                        .keys()
                        .into_iter()
                        .map(|key| {
                            let value = object.get(&key);
                            (key, value)
                        })
                        .collect::<Vec<_>>()
                })?
            }
        };

        let variables: Vec<Variable> = members
            .iter()
            .map(|(name, value)| render_variable(name.as_str(), value, &mut self.refs))
            .collect();
        Ok(json!({ "variables": variables }))
    }

    fn evaluate(&mut self, args: &EvaluateArguments) -> anyhow::Result<Value> {
        self.ensure_paused()?;
        let frame = args.frame_id.map(frame_index).unwrap_or(0);
        let expression = args.expression.clone();
        let value = self
            .coordinator
            .inspect(move |ctx| ctx.eval(frame, &expression))?
            .map_err(anyhow::Error::msg)?;

        let rendered = render_value(&value, &mut self.refs);
        Ok(json!({
            "result": rendered.value,
            "type": rendered.type_,
            "variablesReference": rendered.variables_reference,
        }))
    }

    fn set_variable(&mut self, args: &SetVariableArguments) -> anyhow::Result<Value> {
        let entry = self
            .refs
            .get(args.variables_reference)
            .cloned()
            .context("Invalid variable reference")?;
        self.ensure_paused()?;

        let name = args.name.clone();
        let expression = args.value.clone();
        let (frame, scope) = match &entry {
            RefEntry::Scope {
                frame_index,
                scope_index,
                ..
            } => (*frame_index, Some(*scope_index)),
            RefEntry::Object(_) => (0, None),
        };
        let write_name = name.clone();
        let value = self
            .coordinator
            .inspect(move |ctx| -> Result<DebugValue, String> {
                let value = ctx.eval(frame, &expression)?;
                match (&entry, scope) {
                    (RefEntry::Object(object), _) => object.set(&write_name, value.clone())?,
                    (_, Some(scope)) => ctx.set_variable(frame, scope, &write_name, value.clone())?,
                    (_, None) => return Err("Invalid variable reference".to_string()),
                }
                Ok(value)
            })?
            .map_err(anyhow::Error::msg)?;

        self.refs
            .update_scope_variable(args.variables_reference, &name, value.clone());
        let rendered = render_value(&value, &mut self.refs);
        Ok(json!({
            "value": rendered.value,
            "type": rendered.type_,
            "variablesReference": rendered.variables_reference,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_ids_map_to_indices() {
        assert_eq!(frame_index(1), 0);
        assert_eq!(frame_index(3), 2);
        assert_eq!(frame_index(0), 0);
        assert_eq!(frame_index(-5), 0);
    }

    #[test]
    fn anyhow_serde_errors_are_redacted() {
        let err = serde_json::from_str::<u64>("\"secret\"").unwrap_err();
        let err = anyhow::Error::new(err).context("decoding arguments");
        let message = sanitize_anyhow_error_message(&err);
        assert!(!message.contains("secret"), "{message}");

        let plain = anyhow::anyhow!("Invalid variable reference");
        assert_eq!(sanitize_anyhow_error_message(&plain), "Invalid variable reference");
    }
}
