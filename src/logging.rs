//! Logging port handed to every component.
//!
//! Components never reach for the global `log` macros. They hold a [`Logger`]
//! which either forwards to whatever `log` implementation the process
//! installed (usually `env_logger`) or to a sink injected by the caller.

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

const DEFAULT_TARGET: &str = "ceph_rest_sdk";

#[derive(Clone)]
enum Sink {
    Global,
    Custom(Arc<dyn Log>),
}

/// Cloneable, leveled logging handle.
#[derive(Clone)]
pub struct Logger {
    sink: Sink,
    target: &'static str,
}

impl Logger {
    /// Forward to the process-wide `log` implementation.
    pub fn global() -> Self {
        Self {
            sink: Sink::Global,
            target: DEFAULT_TARGET,
        }
    }

    /// Forward to an explicit sink.
    pub fn with_sink(sink: Arc<dyn Log>) -> Self {
        Self {
            sink: Sink::Custom(sink),
            target: DEFAULT_TARGET,
        }
    }

    /// Same sink, different record target.
    pub fn scoped(&self, target: &'static str) -> Self {
        Self {
            sink: self.sink.clone(),
            target,
        }
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }

    fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        let record = Record::builder()
            .level(level)
            .target(self.target)
            .args(args)
            .build();

        match &self.sink {
            Sink::Global => {
                if level <= log::max_level() {
                    log::logger().log(&record);
                }
            }
            Sink::Custom(sink) => {
                if sink.enabled(record.metadata()) {
                    sink.log(&record);
                }
            }
        }
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::global()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sink = match self.sink {
            Sink::Global => "global",
            Sink::Custom(_) => "custom",
        };
        f.debug_struct("Logger")
            .field("sink", &sink)
            .field("target", &self.target)
            .finish()
    }
}

/// In-memory sink keeping the most recent formatted records.
pub struct BufferedLog {
    level: LevelFilter,
    capacity: usize,
    buffer: Mutex<VecDeque<String>>,
}

impl BufferedLog {
    pub fn new(level: LevelFilter, capacity: usize) -> Self {
        Self {
            level,
            capacity,
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Snapshot of buffered lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.buffer
            .lock()
            .map(|buf| buf.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }
}

impl Log for BufferedLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let msg = format!("{} - {}", record.level(), record.args());
        if let Ok(mut buf) = self.buffer.lock() {
            buf.push_back(msg);
            while buf.len() > self.capacity {
                buf.pop_front();
            }
        }
    }

    fn flush(&self) {}
}

/// Install `env_logger` honouring `RUST_LOG`, defaulting to `info`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_from_env() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_log_respects_level() {
        let sink = Arc::new(BufferedLog::new(LevelFilter::Info, 10));
        let logger = Logger::with_sink(sink.clone());

        logger.debug(format_args!("hidden {}", 1));
        logger.info(format_args!("shown {}", 2));
        logger.error(format_args!("failed {}", 3));

        assert_eq!(sink.lines(), vec!["INFO - shown 2", "ERROR - failed 3"]);
    }

    #[test]
    fn test_buffered_log_drops_oldest() {
        let sink = Arc::new(BufferedLog::new(LevelFilter::Debug, 2));
        let logger = Logger::with_sink(sink.clone()).scoped("ceph_rest_sdk::test");

        for i in 0..4 {
            logger.warn(format_args!("line {}", i));
        }

        assert_eq!(sink.lines(), vec!["WARN - line 2", "WARN - line 3"]);
        assert!(!sink.contains("line 0"));
    }

    #[test]
    fn test_init_from_env_is_idempotent() {
        init_from_env();
        init_from_env();
        Logger::global().info(format_args!("logging initialised"));
    }
}
