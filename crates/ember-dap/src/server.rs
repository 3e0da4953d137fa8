//! One debug session over a caller-supplied byte stream.
//!
//! Three threads cooperate: a reader thread decodes frames into an ordered queue, the protocol
//! thread (the caller of [`DapServer::run`]) dispatches requests and forwards execution events,
//! and the execution thread runs the script once the client finishes configuring.

use std::io::{self, BufReader, Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, select, Receiver};
use parking_lot::Mutex;
use serde_json::json;

use crate::coordinator::{Coordinator, HookBridge, LogEntry, RunOutcome, StopInfo};
use crate::dap::codec::{read_json_message, write_json_message};
use crate::dap::messages::{Event, Outgoing, Request};
use crate::engine::{DebugContext, DebugEvent, DebugPosition, DebugTarget};
use crate::error::{ServerError, ServerResult};
use crate::paths::{base_name, SourcePathMap};
use crate::refs::RefTable;

/// Runs the debuggee. Called once, on a dedicated thread, after `configurationDone`.
pub type RunFn = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

pub(crate) const THREAD_ID: i64 = 1;

/// Serializes outgoing messages and numbers them; `seq` is assigned under the same lock as the
/// write, so it is gap-free and matches the order on the wire.
pub(crate) struct Transport {
    inner: Mutex<TransportInner>,
}

struct TransportInner {
    writer: Box<dyn Write + Send>,
    last_seq: u64,
}

impl Transport {
    fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            inner: Mutex::new(TransportInner { writer, last_seq: 0 }),
        }
    }

    pub(crate) fn send(&self, message: impl Into<Outgoing>) {
        let mut message = message.into();
        let mut inner = self.inner.lock();
        inner.last_seq += 1;
        message.set_seq(inner.last_seq);
        if let Err(err) = write_json_message(&mut inner.writer, &message) {
            tracing::warn!(target: "ember.dap", error = %err, "failed to write DAP message");
        }
    }
}

#[derive(Debug)]
pub(crate) struct SessionState {
    pub configured: bool,
    pub launched: bool,
    pub stop_on_entry: bool,
    /// True exactly while the execution thread is blocked in the stop hook.
    pub paused: bool,
    pub terminated: bool,
    pub vm_done: bool,
    /// Cleared for attach sessions, where the host owns the engine and a departing client must
    /// not abort its scripts.
    pub owns_execution: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            configured: false,
            launched: false,
            stop_on_entry: false,
            paused: false,
            terminated: false,
            vm_done: false,
            owns_execution: true,
        }
    }
}

pub struct DapServer {
    pub(crate) target: Arc<dyn DebugTarget>,
    pub(crate) transport: Transport,
    pub(crate) coordinator: Coordinator,
    pub(crate) refs: RefTable,
    pub(crate) sources: SourcePathMap,
    pub(crate) state: SessionState,
    bridge: HookBridge,
    run: Option<RunFn>,
}

/// Runs a whole session over `reader`/`writer`. Returns when the client disconnects (`Ok`) or
/// the transport fails.
pub fn run_session<R, W>(target: Arc<dyn DebugTarget>, reader: R, writer: W, run: RunFn) -> ServerResult<()>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    DapServer::new(target, writer, run).run(reader)
}

impl DapServer {
    pub fn new(target: Arc<dyn DebugTarget>, writer: impl Write + Send + 'static, run: RunFn) -> Self {
        let (coordinator, bridge) = Coordinator::new();
        Self {
            target,
            transport: Transport::new(Box::new(writer)),
            coordinator,
            refs: RefTable::new(),
            sources: SourcePathMap::default(),
            state: SessionState::default(),
            bridge,
            run: Some(run),
        }
    }

    /// Marks the session as attached to a host-driven engine: disconnecting or dropping the
    /// connection leaves running scripts alone. `terminate` still interrupts them.
    pub fn attached(mut self) -> Self {
        self.state.owns_execution = false;
        self
    }

    pub fn run<R: Read + Send + 'static>(mut self, reader: R) -> ServerResult<()> {
        let stop_bridge = self.bridge.clone();
        let log_bridge = self.bridge.clone();
        self.target.install_hooks(
            Arc::new(move |ctx: &mut dyn DebugContext, event: DebugEvent, position: DebugPosition| {
                stop_bridge.on_stop(ctx, event, position)
            }),
            Arc::new(move |message: String, position: DebugPosition| log_bridge.on_log(message, position)),
        );

        let result = spawn_reader(reader).map_err(ServerError::Io).and_then(|requests| self.serve(&requests));
        self.teardown();
        match &result {
            Ok(()) => tracing::info!(target: "ember.dap", "debug session ended"),
            Err(err) => tracing::warn!(target: "ember.dap", error = %err, "debug session failed"),
        }
        result
    }

    fn serve(&mut self, requests: &Receiver<io::Result<Request>>) -> ServerResult<()> {
        let stopped = self.coordinator.stopped_rx.clone();
        let logs = self.coordinator.log_rx.clone();
        let done = self.coordinator.done_rx.clone();
        loop {
            select! {
                recv(requests) -> message => match message {
                    Ok(Ok(request)) => {
                        if self.handle(request) {
                            return Ok(());
                        }
                    }
                    Ok(Err(err)) => return Err(ServerError::Io(err)),
                    Err(_) => return Err(ServerError::ConnectionClosed),
                },
                recv(stopped) -> stop => {
                    if let Ok(stop) = stop {
                        self.flush_logs();
                        self.on_stopped(stop);
                    }
                }
                recv(logs) -> entry => {
                    if let Ok(entry) = entry {
                        self.send_log(entry);
                    }
                }
                recv(done) -> outcome => {
                    if let Ok(outcome) = outcome {
                        self.flush_logs();
                        self.on_run_finished(outcome);
                    }
                }
            }
        }
    }

    /// Log points hit before a stop or before the end of the run are reported first.
    fn flush_logs(&mut self) {
        while let Ok(entry) = self.coordinator.log_rx.try_recv() {
            self.send_log(entry);
        }
    }

    fn on_stopped(&mut self, stop: StopInfo) {
        tracing::debug!(
            target: "ember.dap",
            reason = stop.event.reason(),
            file = %stop.position.filename,
            line = stop.position.line,
            "execution stopped"
        );
        self.refs.clear();
        self.transport.send(Event::new(
            "stopped",
            Some(json!({
                "reason": stop.event.reason(),
                "threadId": THREAD_ID,
                "allThreadsStopped": true,
            })),
        ));
        self.state.paused = true;
    }

    fn send_log(&mut self, entry: LogEntry) {
        let path = self.sources.resolve(&entry.position.filename);
        self.transport.send(Event::new(
            "output",
            Some(json!({
                "category": "console",
                "output": format!("{}\n", entry.message),
                "source": {"name": base_name(&path), "path": path},
                "line": entry.position.line,
            })),
        ));
    }

    fn on_run_finished(&mut self, outcome: RunOutcome) {
        if let Err(message) = outcome {
            tracing::info!(target: "ember.dap", error = %message, "debuggee finished with an error");
            self.transport.send(Event::new(
                "output",
                Some(json!({"category": "stderr", "output": format!("{message}\n")})),
            ));
        }
        self.transport.send(Event::new("terminated", None));
        self.state.paused = false;
        self.state.terminated = true;
        self.state.vm_done = true;
    }

    /// Starts the execution thread. Only the first call has an effect.
    pub(crate) fn start_execution(&mut self) {
        let Some(run) = self.run.take() else {
            return;
        };
        let done = self.coordinator.done_sender();
        let spawn_failed = done.clone();
        let spawned = thread::Builder::new()
            .name("ember-dap-exec".to_string())
            .spawn(move || {
                let outcome = match panic::catch_unwind(AssertUnwindSafe(run)) {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(err)) => Err(format!("{err:#}")),
                    Err(_) => Err("debuggee panicked".to_string()),
                };
                let _ = done.send(outcome);
            });
        if let Err(err) = spawned {
            tracing::error!(target: "ember.dap", error = %err, "failed to spawn execution thread");
            let _ = spawn_failed.send(Err(format!("failed to start execution: {err}")));
        }
    }

    /// Leaves the engine runnable without a debugger: hooks gone, nothing blocked, handles freed.
    fn teardown(&mut self) {
        self.coordinator.disconnect();
        if self.state.owns_execution && self.state.configured && !self.state.vm_done {
            self.target.interrupt("debugger session ended");
        }
        self.target.remove_hooks();
        self.refs.clear();
        self.state.paused = false;
    }
}

fn spawn_reader<R: Read + Send + 'static>(reader: R) -> io::Result<Receiver<io::Result<Request>>> {
    let (tx, rx) = bounded(1);
    thread::Builder::new()
        .name("ember-dap-reader".to_string())
        .spawn(move || {
            let mut reader = BufReader::new(reader);
            loop {
                match read_json_message::<_, Request>(&mut reader) {
                    Ok(Some(request)) => {
                        if tx.send(Ok(request)).is_err() {
                            return;
                        }
                    }
                    Ok(None) => return,
                    Err(err) => {
                        let _ = tx.send(Err(err));
                        return;
                    }
                }
            }
        })?;
    Ok(rx)
}
