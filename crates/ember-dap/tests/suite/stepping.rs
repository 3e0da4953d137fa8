use serde_json::json;

use crate::harness::launch_script;

#[test]
fn next_walks_line_by_line() {
    let mut session = launch_script("var a = 1;\nvar b = 2;\nvar c = 3;", json!([{"line": 1}]), json!({}));
    let client = &mut session.client;

    assert_eq!(client.stopped()["reason"], "breakpoint");
    assert_eq!(client.stack_trace()[0]["line"], 1);

    for line in [2, 3] {
        client.request_ok("next", json!({"threadId": 1}));
        assert_eq!(client.stopped()["reason"], "step");
        assert_eq!(client.stack_trace()[0]["line"], line);
    }

    client.request_ok("next", json!({"threadId": 1}));
    client.terminated();
    session.disconnect().expect("session ends cleanly");
}

#[test]
fn step_in_enters_function_and_step_out_returns() {
    let source = "function foo() {\n  var inner = 42;\n  return inner;\n}\nvar result = foo();";
    let mut session = launch_script(source, json!([{"line": 5}]), json!({}));
    let client = &mut session.client;

    client.stopped();
    assert_eq!(client.stack_trace().len(), 1);

    client.request_ok("stepIn", json!({"threadId": 1}));
    assert_eq!(client.stopped()["reason"], "step");
    let frames = client.stack_trace();
    assert!(frames.len() >= 2, "{frames:#?}");
    assert_eq!(frames[0]["name"], "foo");
    assert_eq!(frames[0]["line"], 2);
    assert_eq!(frames[1]["name"], "<anonymous>");
    assert_eq!(frames[1]["id"], 2);

    client.request_ok("stepOut", json!({"threadId": 1}));
    assert_eq!(client.stopped()["reason"], "step");
    let frames = client.stack_trace();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["line"], 5);

    client.request_ok("continue", json!({"threadId": 1}));
    client.terminated();
    session.disconnect().expect("session ends cleanly");
}

#[test]
fn stack_trace_pages_through_frames() {
    let source = "function a() {\n  debugger;\n}\nfunction b() {\n  a();\n}\nb();";
    let mut session = launch_script(source, json!([]), json!({}));
    let client = &mut session.client;
    client.stopped();

    let all = client.request_ok("stackTrace", json!({"threadId": 1}));
    assert_eq!(all["totalFrames"], 3);
    let names: Vec<&str> = all["stackFrames"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["a", "b", "<anonymous>"]);

    let page = client.request_ok("stackTrace", json!({"threadId": 1, "startFrame": 1, "levels": 1}));
    assert_eq!(page["totalFrames"], 3);
    assert_eq!(page["stackFrames"].as_array().unwrap().len(), 1);
    assert_eq!(page["stackFrames"][0]["name"], "b");
    assert_eq!(page["stackFrames"][0]["id"], 2);
    assert_eq!(page["stackFrames"][0]["line"], 5);

    session.disconnect().expect("session ends cleanly");
}
