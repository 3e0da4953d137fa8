use crate::interp::{Exec, Runtime};
use crate::value::{format_number, Callable, NativeFn, ObjectRef, Value};

fn native(name: &'static str, func: NativeFn) -> Value {
    Value::Object(ObjectRef::function(Callable::Native { name, func }))
}

/// Names resolved after every script scope. They never show up in scope listings.
pub(crate) fn globals() -> Vec<(String, Value)> {
    let console = ObjectRef::ordinary(vec![("log".to_string(), native("log", console_log))]);
    let math = ObjectRef::ordinary(vec![
        ("floor".to_string(), native("floor", math_floor)),
        ("abs".to_string(), native("abs", math_abs)),
        ("max".to_string(), native("max", math_max)),
        ("min".to_string(), native("min", math_min)),
    ]);
    vec![
        ("console".to_string(), Value::Object(console)),
        ("Math".to_string(), Value::Object(math)),
        ("Error".to_string(), native("Error", error_ctor)),
        ("TypeError".to_string(), native("TypeError", type_error_ctor)),
        ("RangeError".to_string(), native("RangeError", range_error_ctor)),
        ("ReferenceError".to_string(), native("ReferenceError", reference_error_ctor)),
        ("String".to_string(), native("String", string_fn)),
        ("Number".to_string(), native("Number", number_fn)),
        ("NaN".to_string(), Value::Number(f64::NAN)),
        ("Infinity".to_string(), Value::Number(f64::INFINITY)),
    ]
}

pub(crate) fn array_method(name: &str) -> Option<Value> {
    match name {
        "push" => Some(native("push", array_push)),
        "join" => Some(native("join", array_join)),
        _ => None,
    }
}

fn console_log(rt: &mut Runtime, _this: Value, args: Vec<Value>) -> Exec<Value> {
    let line = args
        .iter()
        .map(Value::to_js_string)
        .collect::<Vec<_>>()
        .join(" ");
    (rt.console())(&line);
    Ok(Value::Undefined)
}

fn make_error(name: &str, args: &[Value]) -> Value {
    let message = match args.first() {
        None | Some(Value::Undefined) => String::new(),
        Some(value) => value.to_js_string(),
    };
    Value::Object(ObjectRef::error(name, &message))
}

fn error_ctor(_rt: &mut Runtime, _this: Value, args: Vec<Value>) -> Exec<Value> {
    Ok(make_error("Error", &args))
}

fn type_error_ctor(_rt: &mut Runtime, _this: Value, args: Vec<Value>) -> Exec<Value> {
    Ok(make_error("TypeError", &args))
}

fn range_error_ctor(_rt: &mut Runtime, _this: Value, args: Vec<Value>) -> Exec<Value> {
    Ok(make_error("RangeError", &args))
}

fn reference_error_ctor(_rt: &mut Runtime, _this: Value, args: Vec<Value>) -> Exec<Value> {
    Ok(make_error("ReferenceError", &args))
}

fn string_fn(_rt: &mut Runtime, _this: Value, args: Vec<Value>) -> Exec<Value> {
    Ok(Value::from(
        args.first().map(Value::to_js_string).unwrap_or_default(),
    ))
}

fn number_fn(_rt: &mut Runtime, _this: Value, args: Vec<Value>) -> Exec<Value> {
    Ok(Value::Number(args.first().map_or(0.0, Value::to_number)))
}

fn first_number(args: &[Value]) -> f64 {
    args.first().map_or(f64::NAN, Value::to_number)
}

fn math_floor(_rt: &mut Runtime, _this: Value, args: Vec<Value>) -> Exec<Value> {
    Ok(Value::Number(first_number(&args).floor()))
}

fn math_abs(_rt: &mut Runtime, _this: Value, args: Vec<Value>) -> Exec<Value> {
    Ok(Value::Number(first_number(&args).abs()))
}

fn math_max(_rt: &mut Runtime, _this: Value, args: Vec<Value>) -> Exec<Value> {
    Ok(Value::Number(args.iter().map(Value::to_number).fold(
        f64::NEG_INFINITY,
        |acc, n| if acc.is_nan() || n.is_nan() { f64::NAN } else { acc.max(n) },
    )))
}

fn math_min(_rt: &mut Runtime, _this: Value, args: Vec<Value>) -> Exec<Value> {
    Ok(Value::Number(args.iter().map(Value::to_number).fold(
        f64::INFINITY,
        |acc, n| if acc.is_nan() || n.is_nan() { f64::NAN } else { acc.min(n) },
    )))
}

fn array_push(_rt: &mut Runtime, this: Value, args: Vec<Value>) -> Exec<Value> {
    let Value::Object(array) = this else {
        return Ok(Value::Undefined);
    };
    let len = array.with_array(|items| {
        items.extend(args);
        items.len()
    });
    Ok(len.map_or(Value::Undefined, |len| Value::Number(len as f64)))
}

fn array_join(_rt: &mut Runtime, this: Value, args: Vec<Value>) -> Exec<Value> {
    let Value::Object(array) = this else {
        return Ok(Value::Undefined);
    };
    let separator = match args.first() {
        None | Some(Value::Undefined) => ",".to_string(),
        Some(value) => value.to_js_string(),
    };
    let items = array.with_array(|items| items.clone()).unwrap_or_default();
    let parts: Vec<String> = items
        .iter()
        .map(|item| match item {
            Value::Undefined | Value::Null => String::new(),
            Value::Number(n) => format_number(*n),
            other => other.to_js_string(),
        })
        .collect();
    Ok(Value::from(parts.join(&separator)))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use crate::Runtime;

    #[test]
    fn console_log_goes_to_sink() {
        let lines: Arc<Mutex<Vec<String>>> = Arc::default();
        let sink = lines.clone();
        let mut rt = Runtime::new();
        rt.set_console(move |line| sink.lock().unwrap().push(line.to_string()));
        rt.run_script("t.js", "console.log('x is', 1 + 1, [1, 2]);")
            .unwrap();
        assert_eq!(*lines.lock().unwrap(), vec!["x is 2 1,2".to_string()]);
    }

    #[test]
    fn array_push_and_join() {
        let mut rt = Runtime::new();
        let value = rt
            .run_script("t.js", "var a = [];\na.push(1, 2);\na.push('x');\na.join('-')")
            .unwrap();
        assert_eq!(value.to_js_string(), "1-2-x");
    }

    #[test]
    fn error_constructors_work_with_and_without_new() {
        let mut rt = Runtime::new();
        let value = rt
            .run_script("t.js", "var e = TypeError('bad');\nvar f = new Error('worse');\ne.name + ':' + f.message")
            .unwrap();
        assert_eq!(value.to_js_string(), "TypeError:worse");
    }
}
