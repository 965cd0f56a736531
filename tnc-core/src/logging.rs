//! In-process structured logging for the packet engine.
//!
//! Mirrors the daemon's `StructuredLogger` in spirit but stays inside
//! `tnc-core` so unit and integration tests can assert on what the engine
//! logged without going through the daemon's event-stream formatting.

use std::fmt;

/// Log level for filtering messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Per-subsystem enable flags, one per component named in §2 of the system
/// overview. Subsystems not listed here (e.g. ad-hoc test tags) always log.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub enable_demod: bool,
    pub enable_hdlc: bool,
    pub enable_digi: bool,
    pub enable_igate: bool,
    pub enable_beacon: bool,
    pub enable_ptt: bool,
    pub enable_filter: bool,
    pub enable_satgate: bool,
    pub max_entries: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            enable_demod: true,
            enable_hdlc: true,
            enable_digi: true,
            enable_igate: true,
            enable_beacon: true,
            enable_ptt: true,
            enable_filter: true,
            enable_satgate: true,
            max_entries: 1000,
        }
    }
}

impl LogConfig {
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            max_entries: 5000,
            ..Default::default()
        }
    }

    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Warn,
            enable_demod: false,
            enable_hdlc: false,
            max_entries: 100,
            ..Default::default()
        }
    }

    pub fn disabled() -> Self {
        Self {
            level: LogLevel::Error,
            enable_demod: false,
            enable_hdlc: false,
            enable_digi: false,
            enable_igate: false,
            enable_beacon: false,
            enable_ptt: false,
            enable_filter: false,
            enable_satgate: false,
            max_entries: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub subsystem: &'static str,
    pub message: String,
}

/// Bounded ring of recent log entries with subsystem/level filtering.
///
/// Not a global logger: each engine component that needs one owns its own
/// `TncLogger`, following the per-channel/per-connection state ownership
/// used throughout the engine.
#[derive(Debug, Clone)]
pub struct TncLogger {
    config: LogConfig,
    entries: Vec<LogEntry>,
}

impl TncLogger {
    pub fn new(config: LogConfig) -> Self {
        let capacity = config.max_entries.min(1000);
        Self {
            config,
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn log(&mut self, level: LogLevel, subsystem: &'static str, message: impl fmt::Display) {
        if level < self.config.level {
            return;
        }

        let enabled = match subsystem {
            "DEMOD" | "PLL" | "AGC" => self.config.enable_demod,
            "HDLC" | "FIX_BITS" => self.config.enable_hdlc,
            "DIGI" => self.config.enable_digi,
            "IGATE" | "SATGATE" => self.config.enable_igate,
            "BEACON" | "SMARTBEACON" => self.config.enable_beacon,
            "PTT" => self.config.enable_ptt,
            "FILTER" => self.config.enable_filter,
            _ => true,
        };
        if !enabled {
            return;
        }

        let entry = LogEntry {
            level,
            subsystem,
            message: message.to_string(),
        };

        if self.config.max_entries > 0 {
            if self.entries.len() >= self.config.max_entries {
                self.entries.remove(0);
            }
            self.entries.push(entry);
        }

        #[cfg(any(test, debug_assertions))]
        {
            eprintln!("[{}] {}: {}", level, subsystem, message);
        }
    }

    pub fn trace(&mut self, subsystem: &'static str, message: impl fmt::Display) {
        self.log(LogLevel::Trace, subsystem, message);
    }

    pub fn debug(&mut self, subsystem: &'static str, message: impl fmt::Display) {
        self.log(LogLevel::Debug, subsystem, message);
    }

    pub fn info(&mut self, subsystem: &'static str, message: impl fmt::Display) {
        self.log(LogLevel::Info, subsystem, message);
    }

    pub fn warn(&mut self, subsystem: &'static str, message: impl fmt::Display) {
        self.log(LogLevel::Warn, subsystem, message);
    }

    pub fn error(&mut self, subsystem: &'static str, message: impl fmt::Display) {
        self.log(LogLevel::Error, subsystem, message);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn entries_for_subsystem(&self, subsystem: &str) -> Vec<&LogEntry> {
        self.entries.iter().filter(|e| e.subsystem == subsystem).collect()
    }

    pub fn entries_at_level(&self, level: LogLevel) -> Vec<&LogEntry> {
        self.entries.iter().filter(|e| e.level >= level).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for TncLogger {
    fn default() -> Self {
        Self::new(LogConfig::default())
    }
}

impl fmt::Display for TncLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for e in &self.entries {
            writeln!(f, "[{}] {}: {}", e.level, e.subsystem, e.message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_by_level() {
        let mut logger = TncLogger::new(LogConfig {
            level: LogLevel::Info,
            ..Default::default()
        });
        logger.trace("HDLC", "a");
        logger.debug("HDLC", "b");
        logger.info("HDLC", "c");
        logger.warn("HDLC", "d");
        assert_eq!(logger.entries().len(), 2);
    }

    #[test]
    fn filters_by_subsystem() {
        let mut logger = TncLogger::new(LogConfig {
            level: LogLevel::Debug,
            enable_demod: false,
            ..Default::default()
        });
        logger.info("DEMOD", "suppressed");
        logger.info("DIGI", "kept");
        assert_eq!(logger.entries().len(), 1);
        assert_eq!(logger.entries()[0].subsystem, "DIGI");
    }

    #[test]
    fn ring_buffer_drops_oldest() {
        let mut logger = TncLogger::new(LogConfig {
            level: LogLevel::Debug,
            max_entries: 2,
            ..Default::default()
        });
        logger.info("HDLC", "1");
        logger.info("HDLC", "2");
        logger.info("HDLC", "3");
        assert_eq!(logger.entries().len(), 2);
        assert!(logger.entries()[0].message.contains('2'));
    }
}
