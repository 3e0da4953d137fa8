//! Session lifecycles over TCP.
//!
//! [`serve_tcp`] is the blocking single-shot form: bind, accept one client, run the session.
//! [`listen_tcp`] and [`attach_tcp`] run in the background on tokio and skip connections that
//! never send a byte (port scanners and IDE reachability checks).

use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener as StdTcpListener, TcpStream as StdTcpStream};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, select, Sender};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::engine::DebugTarget;
use crate::error::{ServerError, ServerResult};
use crate::server::{DapServer, RunFn};

/// How long an accepted connection may stay silent before it is treated as a probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Accepts exactly one client on `addr` and runs a session with it on the calling thread.
pub fn serve_tcp(addr: &str, target: Arc<dyn DebugTarget>, run: RunFn) -> ServerResult<()> {
    let listener = StdTcpListener::bind(addr).map_err(|source| ServerError::Bind {
        addr: addr.to_string(),
        source,
    })?;
    let (stream, peer) = listener.accept().map_err(ServerError::Accept)?;
    drop(listener);
    tracing::info!(target: "ember.dap", %peer, "debugger connected");

    let reader = stream.try_clone()?;
    DapServer::new(target, stream, run).run(reader)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionMode {
    Launch,
    Attach,
}

/// A background listener and, once a real client shows up, its session.
#[derive(Debug)]
pub struct TcpSession {
    addr: SocketAddr,
    cancel: CancellationToken,
    done: oneshot::Receiver<ServerResult<()>>,
}

impl TcpSession {
    /// The bound address; useful when listening on port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stops accepting, or ends the active session by shutting its socket down.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Resolves with the session's result. Closing before a client connected yields
    /// [`ServerError::ConnectionClosed`].
    pub async fn wait(self) -> ServerResult<()> {
        self.done
            .await
            .map_err(|_| ServerError::Join("listener task dropped".to_string()))?
    }
}

/// Binds `addr` and serves the first connection that sends data within `probe_timeout`.
pub async fn listen_tcp(
    addr: &str,
    target: Arc<dyn DebugTarget>,
    run: RunFn,
    probe_timeout: Duration,
) -> ServerResult<TcpSession> {
    spawn_listener(addr, target, run, probe_timeout, SessionMode::Launch, None).await
}

async fn spawn_listener(
    addr: &str,
    target: Arc<dyn DebugTarget>,
    run: RunFn,
    probe_timeout: Duration,
    mode: SessionMode,
    finished: Option<Sender<()>>,
) -> ServerResult<TcpSession> {
    let listener = TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
        addr: addr.to_string(),
        source,
    })?;
    let local = listener.local_addr()?;
    tracing::info!(target: "ember.dap", addr = %local, ?mode, "listening for debugger");

    let cancel = CancellationToken::new();
    let (done_tx, done_rx) = oneshot::channel();
    let task_cancel = cancel.clone();
    tokio::spawn(async move {
        let result = accept_and_serve(listener, target, run, probe_timeout, mode, task_cancel).await;
        // Closing `finished` tells a still-running program that nobody is debugging it anymore.
        drop(finished);
        let _ = done_tx.send(result);
    });

    Ok(TcpSession {
        addr: local,
        cancel,
        done: done_rx,
    })
}

async fn accept_and_serve(
    listener: TcpListener,
    target: Arc<dyn DebugTarget>,
    run: RunFn,
    probe_timeout: Duration,
    mode: SessionMode,
    cancel: CancellationToken,
) -> ServerResult<()> {
    let (stream, peer) = loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => return Err(ServerError::ConnectionClosed),
            accepted = listener.accept() => accepted.map_err(ServerError::Accept)?,
        };
        if sends_data(&stream, probe_timeout).await {
            break (stream, peer);
        }
        tracing::debug!(target: "ember.dap", %peer, "ignoring probe connection");
    };
    drop(listener);
    tracing::info!(target: "ember.dap", %peer, "debugger connected");

    let stream = into_blocking(stream)?;
    let shutdown = stream.try_clone()?;
    let reader = stream.try_clone()?;
    let mut session = tokio::task::spawn_blocking(move || {
        let server = DapServer::new(target, stream, run);
        let server = match mode {
            SessionMode::Launch => server,
            SessionMode::Attach => server.attached(),
        };
        server.run(reader)
    });
    let finished = tokio::select! {
        joined = &mut session => Some(joined),
        _ = cancel.cancelled() => None,
    };
    let joined = match finished {
        Some(joined) => joined,
        None => {
            tracing::debug!(target: "ember.dap", %peer, "closing debug session");
            let _ = shutdown.shutdown(Shutdown::Both);
            session.await
        }
    };
    joined.map_err(|err| ServerError::Join(err.to_string()))?
}

/// A connection counts as a client once it has at least one readable byte; EOF, errors and
/// silence past `timeout` mark it as a probe.
async fn sends_data(stream: &TcpStream, timeout: Duration) -> bool {
    let mut byte = [0u8; 1];
    matches!(
        tokio::time::timeout(timeout, stream.peek(&mut byte)).await,
        Ok(Ok(n)) if n > 0
    )
}

fn into_blocking(stream: TcpStream) -> io::Result<StdTcpStream> {
    let stream = stream.into_std()?;
    stream.set_nonblocking(false)?;
    Ok(stream)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttachPhase {
    Configuring,
    Running,
    Released,
}

/// A debug server for an engine the host keeps driving itself.
///
/// The session's program starts when the client sends `configurationDone` ([`AttachSession::ready`]
/// resolves then) and lasts until [`AttachSession::detach`], so the client sees `terminated`
/// only when the host says it is done. A client that leaves first releases it as well.
#[derive(Debug)]
pub struct AttachSession {
    session: TcpSession,
    phase: watch::Receiver<AttachPhase>,
    release: Option<Sender<()>>,
}

impl AttachSession {
    pub fn local_addr(&self) -> SocketAddr {
        self.session.local_addr()
    }

    /// Resolves once the client has finished configuring breakpoints, or with `false` if the
    /// session ended first.
    pub async fn ready(&mut self) -> bool {
        self.phase
            .wait_for(|phase| *phase != AttachPhase::Configuring)
            .await
            .is_ok()
    }

    /// Resolves once the session's program has ended, through [`AttachSession::detach`] or
    /// because the client went away. Also resolves if the session ended before it started.
    pub async fn released(&mut self) {
        let _ = self
            .phase
            .wait_for(|phase| *phase == AttachPhase::Released)
            .await;
    }

    /// Ends the debuggee from the client's point of view; it receives `terminated`.
    pub fn detach(&mut self) {
        self.release.take();
    }

    pub fn close(&self) {
        self.session.close();
    }

    pub async fn wait(self) -> ServerResult<()> {
        let AttachSession { session, release, .. } = self;
        let result = session.wait().await;
        drop(release);
        result
    }
}

/// Listens on `addr` for a client that debugs scripts the host runs on `target`'s engine.
pub async fn attach_tcp(
    addr: &str,
    target: Arc<dyn DebugTarget>,
    probe_timeout: Duration,
) -> ServerResult<AttachSession> {
    let (phase_tx, phase_rx) = watch::channel(AttachPhase::Configuring);
    let (release_tx, release_rx) = bounded::<()>(0);
    let (finished_tx, finished_rx) = bounded::<()>(0);
    let run: RunFn = Box::new(move || {
        phase_tx.send_replace(AttachPhase::Running);
        select! {
            recv(release_rx) -> _ => tracing::debug!(target: "ember.dap", "host detached"),
            recv(finished_rx) -> _ => {
                tracing::debug!(target: "ember.dap", "client left before the host detached")
            }
        }
        phase_tx.send_replace(AttachPhase::Released);
        Ok(())
    });
    let session = spawn_listener(
        addr,
        target,
        run,
        probe_timeout,
        SessionMode::Attach,
        Some(finished_tx),
    )
    .await?;
    Ok(AttachSession {
        session,
        phase: phase_rx,
        release: Some(release_tx),
    })
}
