use serde_json::json;

use crate::harness::{find_variable, launch_script};

#[test]
fn scopes_and_variables_render_values() {
    let source = "var x = 42;\nvar y = \"hello\";\nvar obj = {a: 1, b: 2};\ndebugger;";
    let mut session = launch_script(source, json!([]), json!({}));
    let client = &mut session.client;
    client.stopped();

    let scopes = client.scopes(1);
    assert_eq!(scopes.len(), 1);
    assert_eq!(scopes[0]["name"], "Global");
    assert_eq!(scopes[0]["expensive"], true);

    let reference = scopes[0]["variablesReference"].as_i64().unwrap();
    assert!(reference > 0);
    let variables = client.variables(reference);

    let x = find_variable(&variables, "x");
    assert_eq!(x["value"], "42");
    assert_eq!(x["type"], "number");
    assert_eq!(x["variablesReference"], 0);

    let y = find_variable(&variables, "y");
    assert_eq!(y["value"], "hello");
    assert_eq!(y["type"], "string");

    let obj = find_variable(&variables, "obj");
    assert_eq!(obj["type"], "object");
    let obj_ref = obj["variablesReference"].as_i64().unwrap();
    assert!(obj_ref > 0);

    let members = client.variables(obj_ref);
    assert_eq!(find_variable(&members, "a")["value"], "1");
    assert_eq!(find_variable(&members, "b")["value"], "2");

    session.disconnect().expect("session ends cleanly");
}

#[test]
fn function_scopes_list_local_before_global() {
    let source = "var g = 1;\nfunction f(p) {\n  var local = p * 2;\n  debugger;\n}\nf(21);";
    let mut session = launch_script(source, json!([]), json!({}));
    let client = &mut session.client;
    client.stopped();

    let scopes = client.scopes(1);
    let names: Vec<&str> = scopes.iter().map(|s| s["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["Local", "Global"]);
    assert_eq!(scopes[0]["expensive"], false);

    let locals = client.variables(scopes[0]["variablesReference"].as_i64().unwrap());
    assert_eq!(find_variable(&locals, "local")["value"], "42");
    assert_eq!(find_variable(&locals, "p")["value"], "21");

    // The caller's frame sees only globals.
    let caller = client.scopes(2);
    assert_eq!(caller.len(), 1);
    assert_eq!(caller[0]["name"], "Global");

    session.disconnect().expect("session ends cleanly");
}

#[test]
fn evaluate_reads_and_assigns() {
    let source = "var x = 10;\nvar y = 20;\ndebugger;";
    let mut session = launch_script(source, json!([]), json!({}));
    let client = &mut session.client;
    client.stopped();

    let sum = client.evaluate("x + y", None);
    assert_eq!(sum["result"], "30");
    assert_eq!(sum["variablesReference"], 0);

    assert_eq!(client.evaluate("x = 100", Some(1))["result"], "100");
    assert_eq!(client.evaluate("x", None)["result"], "100");

    let object = client.evaluate("({k: 'v'})", None);
    assert_eq!(object["type"], "object");
    let members = client.variables(object["variablesReference"].as_i64().unwrap());
    assert_eq!(find_variable(&members, "k")["value"], "v");

    let message = client.request_err("evaluate", json!({"expression": "missing + 1"}));
    assert!(message.contains("missing"), "{message}");

    session.disconnect().expect("session ends cleanly");
}

#[test]
fn set_variable_writes_through_scope_reference() {
    let source = "var x = 1;\ndebugger;\nvar y = x;";
    let mut session = launch_script(source, json!([]), json!({}));
    let client = &mut session.client;
    client.stopped();

    let scopes = client.scopes(1);
    let reference = scopes[0]["variablesReference"].as_i64().unwrap();
    let body = client.request_ok(
        "setVariable",
        json!({"variablesReference": reference, "name": "x", "value": "40 + 2"}),
    );
    assert_eq!(body["value"], "42");
    assert_eq!(body["type"], "number");

    assert_eq!(client.evaluate("x", None)["result"], "42");
    // The cached scope listing reflects the write too.
    let variables = client.variables(reference);
    assert_eq!(find_variable(&variables, "x")["value"], "42");

    session.disconnect().expect("session ends cleanly");
}

#[test]
fn set_variable_on_object_members() {
    let source = "var obj = {count: 1};\ndebugger;";
    let mut session = launch_script(source, json!([]), json!({}));
    let client = &mut session.client;
    client.stopped();

    let variables = client.top_scope_variables();
    let obj_ref = find_variable(&variables, "obj")["variablesReference"]
        .as_i64()
        .unwrap();
    client.request_ok(
        "setVariable",
        json!({"variablesReference": obj_ref, "name": "count", "value": "7"}),
    );
    assert_eq!(client.evaluate("obj.count", None)["result"], "7");

    session.disconnect().expect("session ends cleanly");
}

#[test]
fn references_do_not_survive_a_resume() {
    let source = "var obj = {a: 1};\ndebugger;\ndebugger;";
    let mut session = launch_script(source, json!([]), json!({}));
    let client = &mut session.client;
    client.stopped();

    let variables = client.top_scope_variables();
    let obj_ref = find_variable(&variables, "obj")["variablesReference"]
        .as_i64()
        .unwrap();

    client.request_ok("continue", json!({"threadId": 1}));
    client.stopped();
    let message = client.request_err("variables", json!({"variablesReference": obj_ref}));
    assert_eq!(message, "Invalid variable reference");

    session.disconnect().expect("session ends cleanly");
}
