use std::io::{self, Write};

use crossbeam_channel::{Receiver, Sender};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;

/// `MakeWriter` that forwards formatted log lines to a debug console channel.
#[derive(Clone)]
pub struct SessionConsoleWriter {
    sender: Sender<String>,
}

impl SessionConsoleWriter {
    pub fn new() -> (Self, Receiver<String>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { sender: tx }, rx)
    }
}

impl Write for SessionConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let message = String::from_utf8_lossy(buf);
        if self.sender.send(message.to_string()).is_err() {
            // The console went away; logging must keep working.
            eprintln!("Warning: Log channel is closed, message dropped: {}", message);
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for SessionConsoleWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Installs the global subscriber writing to a console channel.
///
/// `RUST_LOG` overrides `level`. Returns `None` when a global subscriber is already set.
pub fn init(level: tracing::Level) -> Option<Receiver<String>> {
    let (writer, rx) = SessionConsoleWriter::new();
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(writer)
        .try_init()
        .ok()
        .map(|_| rx)
}
