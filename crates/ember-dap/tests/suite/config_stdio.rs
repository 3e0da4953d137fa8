use std::fs;
use std::process::{Command, Stdio};

use ember_dap::config::ConfigError;
use ember_dap::DapConfig;
use serde_json::json;
use tempfile::TempDir;

use crate::harness::DapClient;

#[test]
fn stdio_binary_loads_config_and_runs_script() {
    let temp = TempDir::new().expect("tempdir");
    let config_path = temp.path().join("ember-dap.toml");
    let log_path = temp.path().join("ember-dap.log");
    fs::write(
        &config_path,
        format!(
            "[logging]\nlevel = \"debug\"\nstderr = false\nfile = {:?}\n",
            log_path.display().to_string()
        ),
    )
    .expect("write config");
    let script_path = temp.path().join("main.js");
    fs::write(&script_path, "var a = 1;\ndebugger;\nconsole.log('done');\n").expect("write script");

    let mut child = Command::new(env!("CARGO_BIN_EXE_ember-dap"))
        .arg("--config")
        .arg(&config_path)
        .arg(&script_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn ember-dap");

    let stdin = child.stdin.take().expect("stdin");
    let stdout = child.stdout.take().expect("stdout");
    let mut client = DapClient::new(stdout, stdin);

    client.initialize();
    client.request_ok("launch", json!({"program": script_path}));
    client.request_ok("configurationDone", json!({}));
    assert_eq!(client.stopped()["reason"], "breakpoint");
    let frames = client.stack_trace();
    assert_eq!(frames[0]["line"], 2);
    client.request_ok("continue", json!({"threadId": 1}));
    client.terminated();
    client.request_ok("disconnect", json!({}));
    drop(client);

    let status = child.wait().expect("wait");
    assert!(status.success());

    let log = fs::read_to_string(&log_path).expect("log file written");
    assert!(log.contains("debug session ended"), "{log}");
}

#[test]
fn config_loads_from_file() {
    let temp = TempDir::new().expect("tempdir");
    let path = temp.path().join("ember-dap.toml");
    fs::write(
        &path,
        "[session]\nlisten = \"0.0.0.0:9229\"\nprobe_timeout_ms = 1500\n",
    )
    .expect("write config");

    let config = DapConfig::load_from_path(&path).expect("load config");
    assert_eq!(config.session.listen, "0.0.0.0:9229");
    assert_eq!(config.session.probe_timeout().as_millis(), 1500);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn config_errors_name_the_file_or_redact_values() {
    let temp = TempDir::new().expect("tempdir");
    let missing = temp.path().join("missing.toml");
    let err = DapConfig::load_from_path(&missing).expect_err("file is missing");
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("missing.toml"));

    let unknown = temp.path().join("unknown.toml");
    fs::write(&unknown, "[logging]\nlevel = \"debug\"\napi_key = \"s3cr3t\"\n").expect("write");
    let err = DapConfig::load_from_path(&unknown).expect_err("unknown key");
    let message = err.to_string();
    assert!(!message.contains("s3cr3t"), "{message}");
}
