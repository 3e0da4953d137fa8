use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use ember_dap::{config::CONFIG_ENV_VAR, script_runner, DapConfig, ScriptTarget};
use ember_script::Runtime;

/// Debug adapter for ember-script programs.
///
/// Speaks DAP over stdio by default. With `--listen`, waits for an IDE to connect over TCP
/// instead and ignores connections that never send a request.
#[derive(Debug, Parser)]
#[command(name = "ember-dap", version, about)]
struct Cli {
    /// Path to a TOML config file.
    ///
    /// If unset, `EMBER_DAP_CONFIG` is used as a fallback. When neither are provided the
    /// adapter uses in-memory defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen for a debugger on this address (defaults to `session.listen` from the config).
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    listen: Option<String>,

    /// Script to debug.
    script: PathBuf,
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config);
    ember_dap::hardening::init(&config);

    let source = std::fs::read_to_string(&cli.script)
        .with_context(|| format!("failed to read {}", cli.script.display()))?;
    let filename = cli.script.display().to_string();

    let mut runtime = Runtime::new();
    // stdout carries the protocol in stdio mode.
    runtime.set_console(|line: &str| eprintln!("{line}"));
    let target = Arc::new(ScriptTarget::for_runtime(&runtime));
    let run = script_runner(runtime, filename, source);

    match cli.listen {
        Some(addr) => {
            let addr = if addr.is_empty() {
                config.session.listen.clone()
            } else {
                addr
            };
            let session =
                ember_dap::listen_tcp(&addr, target, run, config.session.probe_timeout()).await?;
            eprintln!("ember-dap: listening on {}", session.local_addr());
            session.wait().await?;
        }
        None => {
            tokio::task::spawn_blocking(move || {
                ember_dap::run_session(target, std::io::stdin(), std::io::stdout(), run)
            })
            .await??;
        }
    }
    Ok(())
}

fn load_config(cli_path: Option<PathBuf>) -> DapConfig {
    let path = cli_path.or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));
    let Some(path) = path else {
        return DapConfig::default();
    };

    match DapConfig::load_from_path(&path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!(
                "ember-dap: failed to load config from {}: {err}; continuing with defaults",
                path.display()
            );
            DapConfig::default()
        }
    }
}
