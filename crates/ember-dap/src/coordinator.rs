//! Hand-off between the protocol thread and the execution thread.
//!
//! The execution thread only talks to the protocol thread from inside engine hooks, through a
//! [`HookBridge`]. The protocol thread owns the matching [`Coordinator`]. Every wait on the
//! execution side also watches the disconnect channel, which is closed (never sent on) when the
//! session ends, so no hook can outlive the session blocked.

use std::panic::{self, AssertUnwindSafe};

use crossbeam_channel::{bounded, select, Receiver, Sender};

use crate::engine::{DebugAction, DebugContext, DebugEvent, DebugPosition};
use crate::error::InspectError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopInfo {
    pub event: DebugEvent,
    pub position: DebugPosition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub message: String,
    pub position: DebugPosition,
}

/// Outcome of the run callback, reported once.
pub type RunOutcome = Result<(), String>;

type InspectJob = Box<dyn FnOnce(&mut dyn DebugContext) + Send>;

const LOG_BUFFER: usize = 16;

/// Execution-thread half, captured by the installed hooks.
#[derive(Clone)]
pub struct HookBridge {
    stopped_tx: Sender<StopInfo>,
    inspect_rx: Receiver<InspectJob>,
    resume_rx: Receiver<DebugAction>,
    log_tx: Sender<LogEntry>,
    disconnect_rx: Receiver<()>,
}

impl HookBridge {
    /// Publishes the stop, then serves inspections until the protocol thread resumes or the
    /// session disconnects. Disconnect resumes with [`DebugAction::Continue`].
    pub fn on_stop(&self, ctx: &mut dyn DebugContext, event: DebugEvent, position: DebugPosition) -> DebugAction {
        let stop = StopInfo { event, position };
        select! {
            send(self.stopped_tx, stop) -> sent => {
                if sent.is_err() {
                    return DebugAction::Continue;
                }
            }
            recv(self.disconnect_rx) -> _ => return DebugAction::Continue,
        }

        loop {
            select! {
                recv(self.inspect_rx) -> job => match job {
                    Ok(job) => job(ctx),
                    Err(_) => return DebugAction::Continue,
                },
                recv(self.resume_rx) -> action => return action.unwrap_or_default(),
                recv(self.disconnect_rx) -> _ => return DebugAction::Continue,
            }
        }
    }

    /// Queues a log-point message; dropped if the session disconnects first.
    pub fn on_log(&self, message: String, position: DebugPosition) {
        let entry = LogEntry { message, position };
        select! {
            send(self.log_tx, entry) -> _ => {}
            recv(self.disconnect_rx) -> _ => {}
        }
    }
}

/// Protocol-thread half.
pub struct Coordinator {
    pub(crate) stopped_rx: Receiver<StopInfo>,
    pub(crate) log_rx: Receiver<LogEntry>,
    pub(crate) done_rx: Receiver<RunOutcome>,
    done_tx: Sender<RunOutcome>,
    inspect_tx: Sender<InspectJob>,
    resume_tx: Sender<DebugAction>,
    disconnect_tx: Option<Sender<()>>,
}

impl Coordinator {
    pub fn new() -> (Self, HookBridge) {
        let (stopped_tx, stopped_rx) = bounded(1);
        let (inspect_tx, inspect_rx) = bounded(0);
        let (resume_tx, resume_rx) = bounded(0);
        let (log_tx, log_rx) = bounded(LOG_BUFFER);
        let (done_tx, done_rx) = bounded(1);
        let (disconnect_tx, disconnect_rx) = bounded(0);
        let coordinator = Self {
            stopped_rx,
            log_rx,
            done_rx,
            done_tx,
            inspect_tx,
            resume_tx,
            disconnect_tx: Some(disconnect_tx),
        };
        let bridge = HookBridge {
            stopped_tx,
            inspect_rx,
            resume_rx,
            log_tx,
            disconnect_rx,
        };
        (coordinator, bridge)
    }

    /// Where the run callback reports how it ended.
    pub fn done_sender(&self) -> Sender<RunOutcome> {
        self.done_tx.clone()
    }

    /// Runs `f` on the execution thread, which must currently be blocked in
    /// [`HookBridge::on_stop`]. A panic inside `f` is caught there and reported as
    /// [`InspectError::Panicked`].
    pub fn inspect<R, F>(&self, f: F) -> Result<R, InspectError>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn DebugContext) -> R + Send + 'static,
    {
        let (result_tx, result_rx) = bounded(1);
        let job: InspectJob = Box::new(move |ctx| {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(ctx)));
            let _ = result_tx.send(outcome.map_err(|_| InspectError::Panicked));
        });
        self.inspect_tx
            .send(job)
            .map_err(|_| InspectError::Failed("execution thread is gone".to_string()))?;
        result_rx
            .recv()
            .map_err(|_| InspectError::Failed("inspection was dropped".to_string()))?
    }

    /// Hands `action` to the paused execution thread.
    pub fn resume(&self, action: DebugAction) -> bool {
        self.resume_tx.send(action).is_ok()
    }

    /// Wakes every wait on the execution side. Idempotent.
    pub fn disconnect(&mut self) {
        self.disconnect_tx.take();
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnect_tx.is_none()
    }
}
