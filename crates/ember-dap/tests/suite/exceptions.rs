use serde_json::json;

use crate::harness::{is_event, spawn_script, ScriptSession};

const CAUGHT: &str = "try {\n  throw new Error('boom');\n} catch (e) {\n  var handled = true;\n}";

fn run_with_filters(source: &str, filters: &[&str]) -> ScriptSession {
    let mut session = spawn_script(source);
    let client = &mut session.client;
    client.initialize();
    client.request_ok("launch", json!({}));
    client.request_ok("setExceptionBreakpoints", json!({"filters": filters}));
    client.request_ok("configurationDone", json!({}));
    session
}

#[test]
fn all_filter_stops_on_caught_exception() {
    let mut session = run_with_filters(CAUGHT, &["all"]);
    let client = &mut session.client;

    assert_eq!(client.stopped()["reason"], "exception");
    assert_eq!(client.stack_trace()[0]["line"], 2);
    client.request_ok("continue", json!({"threadId": 1}));
    client.terminated();
    session.disconnect().expect("session ends cleanly");
}

#[test]
fn uncaught_filter_ignores_caught_exception() {
    let mut session = run_with_filters(CAUGHT, &["uncaught"]);
    let client = &mut session.client;

    client.terminated();
    assert!(!client.saw_event("stopped"));
    session.disconnect().expect("session ends cleanly");
}

#[test]
fn uncaught_error_is_reported_before_terminated() {
    let mut session = run_with_filters("var a = 1;\nthrow new TypeError('bad input');", &[]);
    let client = &mut session.client;

    let output = client.event("output");
    assert_eq!(output["body"]["category"], "stderr");
    let text = output["body"]["output"].as_str().unwrap();
    assert!(text.contains("bad input"), "{text}");
    client.terminated();

    let seen = client.seen();
    let output_at = seen.iter().position(|m| is_event(m, "output")).unwrap();
    let terminated_at = seen.iter().position(|m| is_event(m, "terminated")).unwrap();
    assert!(output_at < terminated_at);

    session.disconnect().expect("session ends cleanly");
}
