use serde_json::json;

use crate::harness::{launch_script, spawn_script};

#[test]
fn inspection_requires_a_paused_vm() {
    let mut session = spawn_script("var a = 1;");
    let client = &mut session.client;
    client.initialize();

    for (command, arguments) in [
        ("stackTrace", json!({"threadId": 1})),
        ("scopes", json!({"frameId": 1})),
        ("evaluate", json!({"expression": "1 + 1"})),
        ("continue", json!({"threadId": 1})),
        ("next", json!({"threadId": 1})),
    ] {
        assert_eq!(client.request_err(command, arguments), "VM is not paused", "{command}");
    }
    session.disconnect().expect("session ends cleanly");
}

#[test]
fn unknown_commands_are_rejected_by_name() {
    let mut session = spawn_script("var a = 1;");
    let client = &mut session.client;
    client.initialize();
    assert_eq!(
        client.request_err("restartFrame", json!({"frameId": 1})),
        "Unsupported request: restartFrame"
    );
    session.disconnect().expect("session ends cleanly");
}

#[test]
fn invalid_references_are_rejected() {
    let mut session = spawn_script("var a = 1;");
    let client = &mut session.client;
    client.initialize();
    assert_eq!(
        client.request_err("variables", json!({"variablesReference": 99})),
        "Invalid variable reference"
    );
    assert_eq!(
        client.request_err(
            "setVariable",
            json!({"variablesReference": 99, "name": "a", "value": "1"})
        ),
        "Invalid variable reference"
    );
    session.disconnect().expect("session ends cleanly");
}

#[test]
fn argument_errors_do_not_echo_client_values() {
    let mut session = spawn_script("var a = 1;");
    let client = &mut session.client;
    client.initialize();
    let message = client.request_err("scopes", json!({"frameId": "super-secret-token"}));
    assert!(!message.contains("super-secret-token"), "{message}");
    assert!(message.contains("<redacted>"), "{message}");
    session.disconnect().expect("session ends cleanly");
}

#[test]
fn set_breakpoints_requires_a_source() {
    let mut session = spawn_script("var a = 1;");
    let client = &mut session.client;
    client.initialize();
    assert_eq!(
        client.request_err("setBreakpoints", json!({"source": {}, "breakpoints": [{"line": 1}]})),
        "setBreakpoints requires a source path or name"
    );

    // A bare name is accepted when there is no path.
    let body = client.request_ok(
        "setBreakpoints",
        json!({"source": {"name": "test.js"}, "breakpoints": [{"line": 1}]}),
    );
    assert_eq!(body["breakpoints"][0]["source"]["path"], "test.js");
    session.disconnect().expect("session ends cleanly");
}

#[test]
fn requests_after_termination_are_refused() {
    let mut session = launch_script("var a = 1;", json!([]), json!({}));
    let client = &mut session.client;
    client.terminated();
    for command in ["threads", "stackTrace", "pause", "restartFrame"] {
        assert_eq!(
            client.request_err(command, json!({})),
            "Program has terminated",
            "{command}"
        );
    }
    session.disconnect().expect("disconnect is still answered after termination");
}

#[test]
fn evaluate_errors_use_the_engine_message() {
    let mut session = launch_script("debugger;", json!([]), json!({}));
    let client = &mut session.client;
    client.stopped();
    let message = client.request_err("evaluate", json!({"expression": "nope()"}));
    assert!(message.contains("nope is not defined"), "{message}");
    session.disconnect().expect("session ends cleanly");
}
