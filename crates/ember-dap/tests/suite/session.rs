use serde_json::{json, Value};

use crate::harness::{is_event, launch_script, spawn_script, SCRIPT_PATH};

const THREE_LINES: &str = "var x = 1;\nvar y = 2;\nvar z = 3;";

#[test]
fn full_session_stops_at_breakpoint_and_runs_to_completion() {
    let mut session = launch_script(THREE_LINES, json!([{"line": 2}]), json!({}));
    let client = &mut session.client;

    let stopped = client.stopped();
    assert_eq!(stopped["reason"], "breakpoint");
    assert_eq!(stopped["threadId"], 1);
    assert_eq!(stopped["allThreadsStopped"], true);

    let threads = client.request_ok("threads", json!({}));
    assert_eq!(threads["threads"], json!([{"id": 1, "name": "main"}]));

    let frames = client.stack_trace();
    assert_eq!(frames[0]["line"], 2);
    assert_eq!(frames[0]["id"], 1);
    assert_eq!(frames[0]["source"]["path"], SCRIPT_PATH);
    assert_eq!(frames[0]["source"]["name"], "test.js");

    let body = client.request_ok("continue", json!({"threadId": 1}));
    assert_eq!(body["allThreadsContinued"], true);
    client.terminated();

    session.disconnect().expect("session ends cleanly");
}

#[test]
fn initialize_advertises_capabilities_before_initialized_event() {
    let mut session = spawn_script(THREE_LINES);
    let client = &mut session.client;

    let capabilities = client.initialize();
    assert_eq!(capabilities["supportsConfigurationDoneRequest"], true);
    assert_eq!(capabilities["supportsConditionalBreakpoints"], true);
    assert_eq!(capabilities["supportsHitConditionalBreakpoints"], true);
    assert_eq!(capabilities["supportsLogPoints"], true);
    assert_eq!(capabilities["supportsSetVariable"], true);
    assert_eq!(capabilities["supportsTerminateRequest"], true);
    let filters: Vec<&str> = capabilities["exceptionBreakpointFilters"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["filter"].as_str().unwrap())
        .collect();
    assert_eq!(filters, vec!["all", "uncaught"]);

    let seen = client.seen();
    assert_eq!(seen[0]["type"], "response");
    assert_eq!(seen[0]["command"], "initialize");
    assert_eq!(seen[1]["event"], "initialized");

    session.disconnect().expect("session ends cleanly");
}

#[test]
fn outgoing_seq_numbers_are_gap_free() {
    let mut session = launch_script(THREE_LINES, json!([{"line": 1}, {"line": 3}]), json!({}));
    let client = &mut session.client;
    client.stopped();
    client.request_ok("continue", json!({"threadId": 1}));
    client.stopped();
    client.request_ok("continue", json!({"threadId": 1}));
    client.terminated();

    let seqs: Vec<u64> = client
        .seen()
        .iter()
        .map(|msg| msg["seq"].as_u64().unwrap())
        .collect();
    let expected: Vec<u64> = (1..=seqs.len() as u64).collect();
    assert_eq!(seqs, expected);

    session.disconnect().expect("session ends cleanly");
}

#[test]
fn breakpoint_responses_echo_the_client_path() {
    let mut session = spawn_script(THREE_LINES);
    let client = &mut session.client;
    client.initialize();
    let breakpoints = client.set_breakpoints(json!([{"line": 1}, {"line": 3}]));
    assert_eq!(breakpoints.len(), 2);
    for (bp, line) in breakpoints.iter().zip([1, 3]) {
        assert_eq!(bp["verified"], true);
        assert_eq!(bp["line"], line);
        assert_eq!(bp["source"], json!({"name": "test.js", "path": SCRIPT_PATH}));
        assert!(bp["id"].as_u64().unwrap() > 0);
    }

    // Replacing the set for a file drops the old breakpoints.
    let replaced = client.set_breakpoints(json!([]));
    assert_eq!(replaced, Vec::<Value>::new());
    client.request_ok("configurationDone", json!({}));
    client.terminated();
    assert!(!client.saw_event("stopped"));

    session.disconnect().expect("session ends cleanly");
}

#[test]
fn replacing_breakpoints_moves_the_stop() {
    let mut session = spawn_script(THREE_LINES);
    let client = &mut session.client;
    client.initialize();
    client.request_ok("launch", json!({}));
    client.set_breakpoints(json!([{"line": 2}]));
    let replaced = client.set_breakpoints(json!([{"line": 3}]));
    assert_eq!(replaced.len(), 1);
    assert_eq!(replaced[0]["line"], 3);
    client.request_ok("configurationDone", json!({}));

    assert_eq!(client.stopped()["reason"], "breakpoint");
    assert_eq!(client.stack_trace()[0]["line"], 3);
    client.request_ok("continue", json!({"threadId": 1}));
    client.terminated();

    let stops = client
        .seen()
        .iter()
        .filter(|msg| is_event(msg, "stopped"))
        .count();
    assert_eq!(stops, 1);
    session.disconnect().expect("session ends cleanly");
}

#[test]
fn set_breakpoints_accepts_uri_paths() {
    let mut session = spawn_script(THREE_LINES);
    let client = &mut session.client;
    client.initialize();
    let body = client.request_ok(
        "setBreakpoints",
        json!({
            "source": {"path": "file:///work/my%20scripts/test.js"},
            "breakpoints": [{"line": 2}],
        }),
    );
    assert_eq!(body["breakpoints"][0]["source"]["path"], "/work/my scripts/test.js");

    client.request_ok("configurationDone", json!({}));
    client.stopped();
    let frames = client.stack_trace();
    assert_eq!(frames[0]["source"]["path"], "/work/my scripts/test.js");

    session.disconnect().expect("session ends cleanly");
}
