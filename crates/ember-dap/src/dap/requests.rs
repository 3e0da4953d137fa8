use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::messages::Request;
use super::types::{Source, SourceBreakpoint};

/// Launch arguments are free-form; only `stopOnEntry` is read, and only when it is a boolean.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchArguments {
    pub stop_on_entry: bool,
}

impl LaunchArguments {
    fn from_value(arguments: Option<&Value>) -> Self {
        let stop_on_entry = arguments
            .and_then(|args| args.get("stopOnEntry"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Self { stop_on_entry }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsArguments {
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub breakpoints: Vec<SourceBreakpoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetExceptionBreakpointsArguments {
    #[serde(default)]
    pub filters: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceArguments {
    #[serde(default)]
    pub thread_id: Option<i64>,
    #[serde(default)]
    pub start_frame: Option<usize>,
    #[serde(default)]
    pub levels: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopesArguments {
    pub frame_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesArguments {
    pub variables_reference: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateArguments {
    pub expression: String,
    #[serde(default)]
    pub frame_id: Option<i64>,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVariableArguments {
    pub variables_reference: i64,
    pub name: String,
    pub value: String,
}

/// Every request the adapter dispatches on. Commands it does not know decode to
/// [`DapRequest::Unsupported`] instead of failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DapRequest {
    Initialize,
    Launch(LaunchArguments),
    Attach,
    SetBreakpoints(SetBreakpointsArguments),
    SetExceptionBreakpoints(SetExceptionBreakpointsArguments),
    ConfigurationDone,
    Threads,
    StackTrace(StackTraceArguments),
    Scopes(ScopesArguments),
    Variables(VariablesArguments),
    Evaluate(EvaluateArguments),
    SetVariable(SetVariableArguments),
    Continue,
    Next,
    StepIn,
    StepOut,
    Pause,
    Terminate,
    Disconnect,
    Unsupported(String),
}

fn arguments<T: DeserializeOwned>(request: &Request) -> Result<T, serde_json::Error> {
    match &request.arguments {
        Some(value) => T::deserialize(value),
        None => T::deserialize(Value::Object(Default::default())),
    }
}

impl DapRequest {
    /// Fails only when a known command carries arguments of the wrong shape.
    pub fn parse(request: &Request) -> Result<Self, serde_json::Error> {
        Ok(match request.command.as_str() {
            "initialize" => DapRequest::Initialize,
            "launch" => DapRequest::Launch(LaunchArguments::from_value(request.arguments.as_ref())),
            "attach" => DapRequest::Attach,
            "setBreakpoints" => DapRequest::SetBreakpoints(arguments(request)?),
            "setExceptionBreakpoints" => DapRequest::SetExceptionBreakpoints(arguments(request)?),
            "configurationDone" => DapRequest::ConfigurationDone,
            "threads" => DapRequest::Threads,
            "stackTrace" => DapRequest::StackTrace(arguments(request)?),
            "scopes" => DapRequest::Scopes(arguments(request)?),
            "variables" => DapRequest::Variables(arguments(request)?),
            "evaluate" => DapRequest::Evaluate(arguments(request)?),
            "setVariable" => DapRequest::SetVariable(arguments(request)?),
            "continue" => DapRequest::Continue,
            "next" => DapRequest::Next,
            "stepIn" => DapRequest::StepIn,
            "stepOut" => DapRequest::StepOut,
            "pause" => DapRequest::Pause,
            "terminate" => DapRequest::Terminate,
            "disconnect" => DapRequest::Disconnect,
            other => DapRequest::Unsupported(other.to_string()),
        })
    }
}
