//! Debug Adapter Protocol bridge for embedded script engines.
//!
//! This crate provides:
//! - A DAP server that drives any engine implementing [`engine::DebugTarget`] over a
//!   caller-supplied byte stream, stdio or TCP.
//! - [`ScriptTarget`], the binding for the `ember-script` runtime.
//! - Session lifecycles: single-shot [`serve_tcp`], background [`listen_tcp`] with probe
//!   filtering, and [`attach_tcp`] for engines the host keeps running itself.
//!
//! The engine is only ever touched from its own thread. While it is paused, the protocol thread
//! reaches it through [`coordinator::Coordinator::inspect`].

pub mod config;
pub mod coordinator;
pub mod dap;
pub mod engine;
pub mod error;
mod handlers;
pub mod hardening;
pub mod paths;
pub mod refs;
pub mod render;
pub mod script;
pub mod server;
pub mod tcp;

pub use crate::config::DapConfig;
pub use crate::error::{InspectError, ServerError, ServerResult};
pub use crate::script::{script_runner, ScriptTarget};
pub use crate::server::{run_session, DapServer, RunFn};
pub use crate::tcp::{attach_tcp, listen_tcp, serve_tcp, AttachSession, TcpSession};
