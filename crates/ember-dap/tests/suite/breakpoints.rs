use serde_json::json;

use crate::harness::{launch_script, spawn_script};

#[test]
fn multiple_breakpoints_stop_in_order() {
    let source = "var a = 1;\nvar b = 2;\nvar c = 3;\nvar d = 4;\nvar e = 5;";
    let mut session = launch_script(source, json!([{"line": 2}, {"line": 4}]), json!({}));
    let client = &mut session.client;

    for line in [2, 4] {
        assert_eq!(client.stopped()["reason"], "breakpoint");
        assert_eq!(client.stack_trace()[0]["line"], line);
        client.request_ok("continue", json!({"threadId": 1}));
    }
    client.terminated();
    session.disconnect().expect("session ends cleanly");
}

#[test]
fn conditional_breakpoint_stops_only_when_true() {
    let source = "var sum = 0;\nfor (var i = 0; i < 5; i++) {\n  sum += i;\n}";
    let mut session = launch_script(
        source,
        json!([{"line": 3, "condition": "i == 3"}]),
        json!({}),
    );
    let client = &mut session.client;

    assert_eq!(client.stopped()["reason"], "breakpoint");
    let value = client.evaluate("i", Some(1));
    assert_eq!(value["result"], "3");
    assert_eq!(value["type"], "number");

    client.request_ok("continue", json!({"threadId": 1}));
    client.terminated();
    let stops = client
        .seen()
        .iter()
        .filter(|msg| msg["event"] == "stopped")
        .count();
    assert_eq!(stops, 1);
    session.disconnect().expect("session ends cleanly");
}

#[test]
fn debugger_statement_reports_breakpoint_reason() {
    let mut session = launch_script("var a = 1;\ndebugger;\nvar b = 2;", json!([]), json!({}));
    let client = &mut session.client;

    assert_eq!(client.stopped()["reason"], "breakpoint");
    assert_eq!(client.stack_trace()[0]["line"], 2);
    client.request_ok("continue", json!({"threadId": 1}));
    client.terminated();
    session.disconnect().expect("session ends cleanly");
}

#[test]
fn stop_on_entry_pauses_at_first_line() {
    let mut session = launch_script(
        "var a = 1;\nvar b = 2;",
        json!([]),
        json!({"stopOnEntry": true, "program": "test.js"}),
    );
    let client = &mut session.client;

    assert_eq!(client.stopped()["reason"], "pause");
    assert_eq!(client.stack_trace()[0]["line"], 1);
    client.request_ok("continue", json!({"threadId": 1}));
    client.terminated();
    session.disconnect().expect("session ends cleanly");
}

#[test]
fn non_boolean_stop_on_entry_is_ignored() {
    let mut session = launch_script("var a = 1;", json!([]), json!({"stopOnEntry": "yes"}));
    let client = &mut session.client;
    client.terminated();
    assert!(!client.saw_event("stopped"));
    session.disconnect().expect("session ends cleanly");
}

#[test]
fn pause_interrupts_a_running_loop() {
    let source = "var i = 0;\nwhile (i < 1000000000) {\n  i++;\n}";
    let mut session = launch_script(source, json!([]), json!({}));
    let client = &mut session.client;

    client.request_ok("pause", json!({"threadId": 1}));
    assert_eq!(client.stopped()["reason"], "pause");
    let line = client.stack_trace()[0]["line"].as_u64().unwrap();
    assert!((2..=3).contains(&line), "paused at line {line}");

    // Skip the rest of the loop so continuing runs to completion.
    client.evaluate("i = 1000000000", None);
    client.request_ok("continue", json!({"threadId": 1}));
    client.terminated();
    session.disconnect().expect("session ends cleanly");
}

#[test]
fn disconnect_ends_a_paused_loop() {
    let source = "var i = 0;\nwhile (i >= 0) {\n  i++;\n}";
    let mut session = launch_script(source, json!([]), json!({}));
    session.client.request_ok("pause", json!({"threadId": 1}));
    session.client.stopped();
    session.disconnect().expect("disconnect ends a paused session");
}

#[test]
fn breakpoints_can_be_set_before_launch() {
    let mut session = spawn_script("var a = 1;\nvar b = 2;");
    let client = &mut session.client;
    client.initialize();
    client.set_breakpoints(json!([{"line": 2}]));
    client.request_ok("launch", json!({}));
    client.request_ok("configurationDone", json!({}));

    assert_eq!(client.stopped()["reason"], "breakpoint");
    session.disconnect().expect("session ends cleanly");
}
