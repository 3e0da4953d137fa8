//! Process-wide logging and panic reporting for the adapter binary.
//!
//! Request handlers still isolate their own panics with `catch_unwind`; the hook installed here
//! only makes sure every panic, caught or not, lands in the log.

use std::fs::File;
use std::io::{self, Write};
use std::sync::{Arc, Once};

use parking_lot::{Mutex, MutexGuard};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriter, MakeWriterExt};
use tracing_subscriber::prelude::*;

use crate::config::{DapConfig, LoggingConfig};

static TRACING_INIT: Once = Once::new();
static PANIC_HOOK_INIT: Once = Once::new();

/// Installs the global subscriber and panic hook. Only the first call has an effect.
pub fn init(config: &DapConfig) {
    init_tracing(&config.logging);
    install_panic_hook();
}

struct FileMakeWriter {
    file: Arc<Mutex<File>>,
}

struct FileWriter<'a> {
    guard: MutexGuard<'a, File>,
}

impl<'a> MakeWriter<'a> for FileMakeWriter {
    type Writer = FileWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        FileWriter {
            guard: self.file.lock(),
        }
    }
}

impl Write for FileWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.guard.flush()
    }
}

fn make_writer(logging: &LoggingConfig) -> BoxMakeWriter {
    let file = logging.file.as_ref().and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });

    // DAP owns stdout in `--stdio` mode, so stderr is the only console sink.
    match (logging.stderr, file) {
        (true, Some(file)) => BoxMakeWriter::new(BoxMakeWriter::new(io::stderr).and(FileMakeWriter {
            file: Arc::new(Mutex::new(file)),
        })),
        (false, Some(file)) => BoxMakeWriter::new(FileMakeWriter {
            file: Arc::new(Mutex::new(file)),
        }),
        (true, None) => BoxMakeWriter::new(io::stderr),
        (false, None) => BoxMakeWriter::new(io::sink),
    }
}

fn init_tracing(logging: &LoggingConfig) {
    TRACING_INIT.call_once(|| {
        let writer = make_writer(logging);
        let layer: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = if logging.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .boxed()
        };
        let subscriber = tracing_subscriber::registry()
            .with(logging.env_filter())
            .with(layer);
        if tracing::subscriber::set_global_default(subscriber).is_ok() {
            tracing::debug!(target: "ember.dap", level = %logging.level, json = logging.json, "logging initialized");
        }
    });
}

fn install_panic_hook() {
    PANIC_HOOK_INIT.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if cfg!(debug_assertions) {
                previous(info);
            }
            let message = if let Some(text) = info.payload().downcast_ref::<&str>() {
                (*text).to_string()
            } else if let Some(text) = info.payload().downcast_ref::<String>() {
                text.clone()
            } else {
                "<non-string panic payload>".to_string()
            };
            let location = info.location().map(|loc| loc.to_string());
            tracing::error!(
                target: "ember.panic",
                { panic.message = %message, panic.location = %location.as_deref().unwrap_or("<unknown>") },
                "panic captured"
            );
        }));
    });
}
