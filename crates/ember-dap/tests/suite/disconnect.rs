use serde_json::json;

use ember_dap::ServerError;

use crate::harness::{launch_script, spawn_script};

#[test]
fn disconnect_while_paused_ends_session() {
    let mut session = launch_script("var a = 1;\ndebugger;\nvar b = 2;", json!([]), json!({}));
    session.client.stopped();
    session.disconnect().expect("disconnect ends a paused session");
}

#[test]
fn disconnect_before_configuration_done() {
    let mut session = spawn_script("var a = 1;");
    session.client.initialize();
    session.disconnect().expect("session ends cleanly");
}

#[test]
fn terminate_interrupts_running_script() {
    let source = "var i = 0;\nwhile (true) {\n  i++;\n}";
    let mut session = launch_script(source, json!([]), json!({}));
    let client = &mut session.client;

    client.request_ok("terminate", json!({}));
    client.terminated();
    assert!(!client.saw_event("stopped"));
    assert_eq!(
        client.request_err("threads", json!({})),
        "Program has terminated"
    );
    session.disconnect().expect("disconnect is still answered after termination");
}

#[test]
fn terminate_while_paused_takes_effect_on_resume() {
    let mut session = launch_script("debugger;\nwhile (true) {}", json!([]), json!({}));
    let client = &mut session.client;
    client.stopped();

    client.request_ok("terminate", json!({}));
    client.request_ok("continue", json!({"threadId": 1}));
    client.terminated();
    session.disconnect().expect("session ends cleanly");
}

#[test]
fn closing_the_connection_reports_connection_closed() {
    let mut session = launch_script("debugger;", json!([]), json!({}));
    session.client.stopped();
    let err = session.finish().expect_err("dropped client is an error");
    assert!(matches!(err, ServerError::ConnectionClosed), "{err:?}");
}

#[test]
fn malformed_frame_is_a_transport_error() {
    use std::io::Write;

    let (server_reader, mut client_writer) = std::io::pipe().unwrap();
    let (_client_reader, server_writer) = std::io::pipe().unwrap();
    let runtime = ember_script::Runtime::new();
    let target = std::sync::Arc::new(ember_dap::ScriptTarget::for_runtime(&runtime));
    let run = ember_dap::script_runner(runtime, "test.js", "");
    let server = std::thread::spawn(move || {
        ember_dap::run_session(target, server_reader, server_writer, run)
    });

    client_writer
        .write_all(b"Content-Length: 5\r\n\r\n{oops")
        .unwrap();
    drop(client_writer);
    let err = server.join().unwrap().expect_err("bad JSON ends the session");
    assert!(matches!(err, ServerError::Io(_)), "{err:?}");
}
