//! Logging for Ebbtide, built on `tracing`.
//!
//! Log output is security sensitive here: announce URLs routinely embed
//! private tracker passkeys. An optional process-wide redactor therefore
//! rewrites every formatted record before it reaches a sink, and call sites
//! additionally pass URLs through [`redacted`] when they become structured
//! fields. Console output goes to stderr at a user-chosen level; a TRACE
//! file sink can be added for post-mortem reading.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer};

/// Rewrites a string before it is emitted to any log sink.
pub type Redactor = Box<dyn Fn(&str) -> String + Send + Sync>;

static REDACTOR: OnceLock<Redactor> = OnceLock::new();

/// Installs a process-wide redactor applied to log output and to URLs at log
/// call sites. Returns `false` if a redactor was already installed.
pub fn set_redactor(redactor: impl Fn(&str) -> String + Send + Sync + 'static) -> bool {
    REDACTOR.set(Box::new(redactor)).is_ok()
}

/// Applies the installed redactor, or returns the input unchanged.
pub fn redacted(text: &str) -> String {
    match REDACTOR.get() {
        Some(redactor) => redactor(text),
        None => text.to_string(),
    }
}

/// Shared handle to the log file. `&File` is `Write`, so every worker thread
/// can append through its own clone of the handle.
struct SharedFile(Arc<File>);

impl Write for SharedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&*self.0).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&*self.0).flush()
    }
}

/// Writer adapter that routes each formatted record through the installed
/// redactor on its way to the sink. `fmt` hands records over as whole lines,
/// so rewriting here covers message text and field values alike.
struct LineRedactor<W> {
    sink: W,
}

impl<W: Write> LineRedactor<W> {
    fn new(sink: W) -> Self {
        Self { sink }
    }
}

impl<W: Write> Write for LineRedactor<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if REDACTOR.get().is_none() {
            return self.sink.write(buf);
        }
        match std::str::from_utf8(buf) {
            Ok(text) => {
                self.sink.write_all(redacted(text).as_bytes())?;
                Ok(buf.len())
            }
            // Non-UTF-8 output cannot be redacted; pass it along unchanged.
            Err(_) => self.sink.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

/// Installs the global subscriber: a stderr console sink at `console_level`,
/// plus a TRACE file sink when `logs_dir` is given.
///
/// The file sink writes everything to `<logs_dir>/ebbtide.log` (truncated
/// per run) with thread names and no ANSI escapes, so a quiet console can
/// coexist with a complete on-disk record. Both sinks write through the
/// installed redactor.
///
/// # Errors
///
/// - `std::io::Error` - The logs directory or the log file could not be created
pub fn init_tracing(console_level: LogLevel, logs_dir: Option<&Path>) -> io::Result<()> {
    let console = fmt::layer()
        .with_writer(|| LineRedactor::new(io::stderr()))
        .with_filter(console_level.as_filter());

    let file = match logs_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let log_file = Arc::new(File::create(dir.join("ebbtide.log"))?);
            let layer = fmt::layer()
                .with_thread_names(true)
                .with_ansi(false)
                .with_writer(move || LineRedactor::new(SharedFile(Arc::clone(&log_file))))
                .with_filter(LevelFilter::TRACE);
            Some(layer)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .init();

    tracing::debug!(level = %console_level, file_sink = logs_dir.is_some(), "tracing initialized");
    Ok(())
}

/// Console log levels for user control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// No console output
    Off,
    /// Only error messages
    Error,
    /// Warning and error messages
    Warn,
    /// Informational, warning, and error messages
    Info,
    /// Debug, informational, warning, and error messages
    Debug,
    /// All messages including detailed tracing
    Trace,
}

impl LogLevel {
    /// The canonical lowercase name of the level.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// The equivalent subscriber filter.
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" | "none" => Ok(LogLevel::Off),
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!("Invalid log level: {s}")),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("info".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("none".parse::<LogLevel>().unwrap(), LogLevel::Off);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_log_level_display_matches_name() {
        for level in [
            LogLevel::Off,
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ] {
            assert_eq!(level.to_string(), level.as_str());
        }
    }

    #[test]
    fn test_log_level_filters() {
        assert_eq!(LogLevel::Off.as_filter(), LevelFilter::OFF);
        assert_eq!(LogLevel::Trace.as_filter(), LevelFilter::TRACE);
    }

    #[test]
    fn test_line_redactor_passes_through_without_hook() {
        let mut out = Vec::new();
        LineRedactor::new(&mut out)
            .write_all(b"announce ok\n")
            .unwrap();
        assert_eq!(out, b"announce ok\n");
    }

    #[test]
    fn test_redacted_passes_through_without_hook() {
        assert_eq!(
            redacted("http://t.example/announce?pass=1"),
            "http://t.example/announce?pass=1"
        );
    }
}
