use chrono::{DateTime, Local};
use log::{Level, LevelFilter, Metadata, Record};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: Level,
    pub target: String,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:<5} {}: {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.level,
            self.target,
            self.message
        )
    }
}

/// Logger printing to stderr and keeping the most recent entries, so a
/// failed run can dump what led up to it
#[derive(Clone)]
pub struct ConsoleLogger {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
    max_entries: usize,
    level: LevelFilter,
}

impl ConsoleLogger {
    pub fn new(max_entries: usize, level: LevelFilter) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(max_entries))),
            max_entries,
            level,
        }
    }

    /// Install a clone as the global logger; `self` keeps reading the
    /// shared history
    pub fn init(&self) -> Result<(), log::SetLoggerError> {
        log::set_boxed_logger(Box::new(self.clone()))?;
        log::set_max_level(self.level);
        Ok(())
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().iter().cloned().collect()
    }

    /// Recent entries, one line each
    pub fn history(&self) -> String {
        self.entries()
            .iter()
            .map(|entry| format!("{entry}\n"))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, entry: LogEntry) {
        let mut entries = self.lock();
        if entries.len() == self.max_entries {
            entries.pop_front();
        }
        entries.push_back(entry);
    }
}

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let entry = LogEntry {
            timestamp: Local::now(),
            level: record.level(),
            target: record.target().to_string(),
            message: format!("{}", record.args()),
        };
        eprintln!("{entry}");
        if self.max_entries > 0 {
            self.push(entry);
        }
    }

    fn flush(&self) {}
}
