//! Turning engine values into DAP variables without running user code.

use ember_script::format_number;

use crate::dap::types::Variable;
use crate::engine::DebugValue;
use crate::refs::RefTable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub value: String,
    pub type_: String,
    /// Zero when the value cannot be expanded.
    pub variables_reference: i64,
}

/// Renders `value`, registering a fresh handle in `refs` when it is structured.
pub fn render_value(value: &DebugValue, refs: &mut RefTable) -> Rendered {
    let plain = |value: String, type_: &str| Rendered {
        value,
        type_: type_.to_string(),
        variables_reference: 0,
    };
    match value {
        DebugValue::Undefined => plain("undefined".to_string(), "undefined"),
        DebugValue::Null => plain("null".to_string(), "null"),
        DebugValue::Bool(b) => plain(b.to_string(), "boolean"),
        DebugValue::Number(n) => plain(format_number(*n), "number"),
        DebugValue::String(s) => plain(s.clone(), "string"),
        DebugValue::Object(object) => {
            let class = object.class_name();
            let (value, type_) = match class.as_str() {
                "Function" => ("function".to_string(), "function"),
                "Array" => ("Array".to_string(), "array"),
                _ => (class.clone(), "object"),
            };
            Rendered {
                value,
                type_: type_.to_string(),
                variables_reference: refs.add_object(object.clone()),
            }
        }
    }
}

pub fn render_variable(name: impl Into<String>, value: &DebugValue, refs: &mut RefTable) -> Variable {
    let rendered = render_value(value, refs);
    Variable {
        name: name.into(),
        value: rendered.value,
        type_: rendered.type_,
        variables_reference: rendered.variables_reference,
    }
}
