use serde_json::json;

use crate::harness::{is_event, launch_script, SCRIPT_PATH};

#[test]
fn hit_count_stops_on_every_nth_hit() {
    let source = "for (var i = 0; i < 10; i++) {\n  var x = i;\n}";
    let mut session = launch_script(source, json!([{"line": 2, "hitCondition": "3"}]), json!({}));
    let client = &mut session.client;

    for expected in ["2", "5", "8"] {
        assert_eq!(client.stopped()["reason"], "breakpoint");
        assert_eq!(client.evaluate("i", Some(1))["result"], expected);
        client.request_ok("continue", json!({"threadId": 1}));
    }
    client.terminated();
    session.disconnect().expect("session ends cleanly");
}

#[test]
fn hit_count_with_comparison_operator() {
    let source = "for (var i = 0; i < 5; i++) {\n  var x = i;\n}";
    let mut session = launch_script(source, json!([{"line": 2, "hitCondition": ">=4"}]), json!({}));
    let client = &mut session.client;

    for expected in ["3", "4"] {
        client.stopped();
        assert_eq!(client.evaluate("i", None)["result"], expected);
        client.request_ok("continue", json!({"threadId": 1}));
    }
    client.terminated();
    session.disconnect().expect("session ends cleanly");
}

#[test]
fn log_point_emits_output_without_stopping() {
    let source = "var a = 10;\nvar b = a + 1;";
    let mut session = launch_script(
        source,
        json!([{"line": 2, "logMessage": "value of a is {a}"}]),
        json!({}),
    );
    let client = &mut session.client;

    let output = client.event("output");
    assert_eq!(output["body"]["category"], "console");
    assert_eq!(output["body"]["output"], "value of a is 10\n");
    assert_eq!(output["body"]["line"], 2);
    assert_eq!(output["body"]["source"]["path"], SCRIPT_PATH);
    assert_eq!(output["body"]["source"]["name"], "test.js");

    client.terminated();
    assert!(!client.saw_event("stopped"));

    let seen = client.seen();
    let output_at = seen.iter().position(|m| is_event(m, "output")).unwrap();
    let terminated_at = seen.iter().position(|m| is_event(m, "terminated")).unwrap();
    assert!(output_at < terminated_at);

    session.disconnect().expect("session ends cleanly");
}

#[test]
fn log_point_in_a_loop_logs_every_hit() {
    let source = "for (var i = 0; i < 4; i++) {\n  var x = i * 2;\n}";
    let mut session = launch_script(
        source,
        json!([{"line": 2, "logMessage": "i={i}"}]),
        json!({}),
    );
    let client = &mut session.client;
    client.terminated();

    let outputs: Vec<&str> = client
        .seen()
        .iter()
        .filter(|msg| is_event(msg, "output"))
        .filter_map(|msg| msg["body"]["output"].as_str())
        .collect();
    assert_eq!(outputs, ["i=0\n", "i=1\n", "i=2\n", "i=3\n"]);
    assert!(!client.saw_event("stopped"));

    session.disconnect().expect("session ends cleanly");
}

#[test]
fn log_points_before_a_stop_arrive_first() {
    let source = "var a = 1;\nvar b = 2;\nvar c = 3;";
    let mut session = launch_script(
        source,
        json!([{"line": 1, "logMessage": "a={a}"}, {"line": 3}]),
        json!({}),
    );
    let client = &mut session.client;
    client.stopped();

    let seen = client.seen();
    let output_at = seen.iter().position(|m| is_event(m, "output")).expect("output event");
    let stopped_at = seen.iter().position(|m| is_event(m, "stopped")).unwrap();
    assert!(output_at < stopped_at);
    assert_eq!(seen[output_at]["body"]["output"], "a=undefined\n");

    session.disconnect().expect("session ends cleanly");
}
