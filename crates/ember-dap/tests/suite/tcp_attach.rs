use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ember_dap::{attach_tcp, listen_tcp, script_runner, serve_tcp, ScriptTarget, ServerError};
use ember_script::Runtime;
use serde_json::json;

use crate::harness::{DapClient, SCRIPT_NAME};

fn connect(addr: SocketAddr) -> DapClient {
    let stream = TcpStream::connect(addr).expect("connect");
    let reader = stream.try_clone().expect("clone stream");
    DapClient::new(reader, stream)
}

fn connect_with_retry(addr: SocketAddr) -> DapClient {
    for _ in 0..100 {
        if let Ok(stream) = TcpStream::connect(addr) {
            let reader = stream.try_clone().expect("clone stream");
            return DapClient::new(reader, stream);
        }
        thread::sleep(Duration::from_millis(20));
    }
    panic!("server never listened on {addr}");
}

/// Drives a launch of a script with a `debugger;` statement to completion.
fn debug_to_completion(client: &mut DapClient) {
    client.initialize();
    client.request_ok("launch", json!({}));
    client.request_ok("configurationDone", json!({}));
    assert_eq!(client.stopped()["reason"], "breakpoint");
    client.request_ok("continue", json!({"threadId": 1}));
    client.terminated();
    client.request_ok("disconnect", json!({}));
}

fn script(source: &str) -> (Arc<ScriptTarget>, ember_dap::RunFn) {
    let runtime = Runtime::new();
    let target = Arc::new(ScriptTarget::for_runtime(&runtime));
    (target, script_runner(runtime, SCRIPT_NAME, source))
}

#[test]
fn serve_tcp_reports_bind_failures() {
    let taken = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = taken.local_addr().unwrap().to_string();
    let (target, run) = script("var a = 1;");
    let err = serve_tcp(&addr, target, run).expect_err("address is in use");
    assert!(matches!(err, ServerError::Bind { .. }), "{err:?}");
}

#[test]
fn serve_tcp_runs_one_session() {
    let addr = {
        let probe = TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap()
    };
    let (target, run) = script("var a = 1;\ndebugger;");
    let server = thread::spawn(move || serve_tcp(&addr.to_string(), target, run));

    let mut client = connect_with_retry(addr);
    debug_to_completion(&mut client);
    server.join().unwrap().expect("session ends cleanly");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn listen_tcp_skips_probe_connections() {
    let (target, run) = script("var a = 1;\ndebugger;");
    let session = listen_tcp("127.0.0.1:0", target, run, Duration::from_millis(200))
        .await
        .expect("listen");
    let addr = session.local_addr();
    assert_ne!(addr.port(), 0);

    tokio::task::spawn_blocking(move || {
        // Connects and hangs up without a byte.
        drop(TcpStream::connect(addr).unwrap());
        // Connects and stays silent past the probe timeout.
        let silent = TcpStream::connect(addr).unwrap();
        thread::sleep(Duration::from_millis(400));
        drop(silent);

        let mut client = connect(addr);
        debug_to_completion(&mut client);
    })
    .await
    .unwrap();

    session.wait().await.expect("session ends cleanly");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn closing_an_idle_listener_ends_it() {
    let (target, run) = script("var a = 1;");
    let session = listen_tcp("127.0.0.1:0", target, run, Duration::from_millis(200))
        .await
        .expect("listen");
    session.close();
    let err = session.wait().await.expect_err("nobody connected");
    assert!(matches!(err, ServerError::ConnectionClosed), "{err:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn attach_debugs_scripts_run_by_the_host() {
    let mut runtime = Runtime::new();
    let target = Arc::new(ScriptTarget::for_runtime(&runtime));
    let mut attach = attach_tcp("127.0.0.1:0", target, Duration::from_millis(500))
        .await
        .expect("listen");
    let addr = attach.local_addr();

    let client = tokio::task::spawn_blocking(move || {
        let mut client = connect(addr);
        client.initialize();
        client.request_ok("attach", json!({}));
        client.set_breakpoints(json!([{"line": 2}]));
        client.request_ok("configurationDone", json!({}));

        assert_eq!(client.stopped()["reason"], "breakpoint");
        assert_eq!(client.stack_trace()[0]["line"], 2);
        assert_eq!(client.evaluate("a", None)["result"], "1");
        client.request_ok("continue", json!({"threadId": 1}));

        client.terminated();
        client.request_ok("disconnect", json!({}));
    });

    assert!(attach.ready().await, "client configured the session");
    let result = tokio::task::spawn_blocking(move || {
        runtime.run_script(SCRIPT_NAME, "var a = 1;\nvar b = a + 1;\nb")
    })
    .await
    .unwrap()
    .expect("host script runs");
    assert_eq!(result.to_number(), 2.0);

    attach.detach();
    attach.released().await;
    client.await.unwrap();
    attach.wait().await.expect("session ends cleanly");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn attach_is_released_when_the_client_leaves_first() {
    let mut runtime = Runtime::new();
    let target = Arc::new(ScriptTarget::for_runtime(&runtime));
    let mut attach = attach_tcp("127.0.0.1:0", target, Duration::from_millis(500))
        .await
        .expect("listen");
    let addr = attach.local_addr();

    tokio::task::spawn_blocking(move || {
        let mut client = connect(addr);
        client.initialize();
        client.request_ok("attach", json!({}));
        client.request_ok("configurationDone", json!({}));
        client.request_ok("disconnect", json!({}));
    })
    .await
    .unwrap();

    assert!(attach.ready().await, "client configured the session");
    // The host never calls `detach`; the program still has to end.
    tokio::time::timeout(Duration::from_secs(10), attach.released())
        .await
        .expect("program ended without a detach");
    attach.wait().await.expect("session ends cleanly");

    // The engine is free for the host again.
    let value = runtime
        .run_script(SCRIPT_NAME, "1 + 1")
        .expect("host script runs");
    assert_eq!(value.to_number(), 2.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn attach_reports_not_ready_when_the_client_never_configures() {
    let runtime = Runtime::new();
    let target = Arc::new(ScriptTarget::for_runtime(&runtime));
    let mut attach = attach_tcp("127.0.0.1:0", target, Duration::from_millis(500))
        .await
        .expect("listen");
    let addr = attach.local_addr();

    tokio::task::spawn_blocking(move || {
        let mut client = connect(addr);
        client.initialize();
        client.request_ok("disconnect", json!({}));
    })
    .await
    .unwrap();

    assert!(!attach.ready().await, "session ended before configurationDone");
    attach.released().await;
    attach.wait().await.expect("session ends cleanly");
}
