//! Structured logging: one JSON/logfmt/pretty event stream for everything
//! the daemon's orchestration threads want an operator to see.

use crate::config::{LogFormat, LogTarget, LoggingConfig};
use chrono::{DateTime, Utc};
use color_eyre::eyre::Result;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter, Write};

/// Structured log event types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEvent {
    /// A frame came off a channel's demodulator and reached the processor.
    PacketReceived(PacketReceivedEvent),

    /// A received frame was rewritten and re-enqueued by the digipeater.
    PacketDigipeated(PacketDigipeatedEvent),

    /// A frame crossed the RF<->APRS-IS boundary in either direction.
    PacketGated(PacketGatedEvent),

    /// A candidate packet was dropped by a duplicate-suppression cache.
    DuplicateDropped(DuplicateDroppedEvent),

    /// An IS->RF transmission was withheld by the rate limiter.
    RateLimited(RateLimitedEvent),

    /// The APRS-IS connection changed state.
    IgateConnection(IgateConnectionEvent),

    /// General info message.
    Info { message: String },

    /// Warning message.
    Warn { message: String },

    /// Error message.
    Error { message: String, details: Option<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketReceivedEvent {
    pub timestamp: DateTime<Utc>,
    pub chan: u16,
    pub subchan: u8,
    pub slicer: u8,
    pub retries: u32,
    pub audio_level: u8,
    pub tnc2: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketDigipeatedEvent {
    pub timestamp: DateTime<Utc>,
    pub from_chan: u16,
    pub to_chan: u16,
    pub tnc2: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GateDirection {
    RxToIs,
    IsToRf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketGatedEvent {
    pub timestamp: DateTime<Utc>,
    pub direction: GateDirection,
    pub chan: u16,
    pub line: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DedupeCacheKind {
    Digipeat,
    RxToIs,
    IsToTx,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateDroppedEvent {
    pub timestamp: DateTime<Utc>,
    pub cache: DedupeCacheKind,
    pub chan: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitedEvent {
    pub timestamp: DateTime<Utc>,
    pub line: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConnectionState {
    Connecting,
    Connected,
    LoginSent,
    Disconnected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IgateConnectionEvent {
    pub timestamp: DateTime<Utc>,
    pub server: String,
    pub state: ConnectionState,
    pub detail: Option<String>,
}

/// Logger that dispatches every event to the configured target/format.
pub struct StructuredLogger {
    config: LoggingConfig,
    writer: Box<dyn Write + Send>,
    start_time: DateTime<Utc>,
}

impl StructuredLogger {
    pub fn new(config: LoggingConfig) -> Result<Self> {
        let writer: Box<dyn Write + Send> = match &config.target {
            LogTarget::Stdout => Box::new(io::stdout()),
            LogTarget::Stderr => Box::new(io::stderr()),
            LogTarget::File => {
                let path = config
                    .file_path
                    .as_ref()
                    .ok_or_else(|| color_eyre::eyre::eyre!("file path required for file logging"))?;
                Box::new(BufWriter::new(File::create(path)?))
            }
        };

        Ok(Self {
            config,
            writer,
            start_time: Utc::now(),
        })
    }

    pub fn log(&mut self, event: LogEvent) -> Result<()> {
        let output = match self.config.format {
            LogFormat::Json => self.format_json(&event)?,
            LogFormat::Logfmt => self.format_logfmt(&event)?,
            LogFormat::Pretty => self.format_pretty(&event)?,
        };

        writeln!(self.writer, "{output}")?;
        self.writer.flush()?;

        Ok(())
    }

    fn format_json(&self, event: &LogEvent) -> Result<String> {
        Ok(serde_json::to_string(event)?)
    }

    fn format_logfmt(&self, event: &LogEvent) -> Result<String> {
        let ts = Utc::now().to_rfc3339();

        let msg = match event {
            LogEvent::PacketReceived(e) => format!(
                "ts=\"{ts}\" type=packet_received chan={} subchan={} slicer={} retries={} level={} tnc2=\"{}\"",
                e.chan, e.subchan, e.slicer, e.retries, e.audio_level, e.tnc2
            ),
            LogEvent::PacketDigipeated(e) => format!(
                "ts=\"{ts}\" type=digipeated from_chan={} to_chan={} tnc2=\"{}\"",
                e.from_chan, e.to_chan, e.tnc2
            ),
            LogEvent::PacketGated(e) => format!(
                "ts=\"{ts}\" type=gated direction={:?} chan={} line=\"{}\"",
                e.direction, e.chan, e.line
            ),
            LogEvent::DuplicateDropped(e) => format!(
                "ts=\"{ts}\" type=duplicate_dropped cache={:?} chan={}",
                e.cache, e.chan
            ),
            LogEvent::RateLimited(e) => format!("ts=\"{ts}\" type=rate_limited line=\"{}\"", e.line),
            LogEvent::IgateConnection(e) => format!(
                "ts=\"{ts}\" type=igate_connection server=\"{}\" state={:?} detail=\"{}\"",
                e.server,
                e.state,
                e.detail.as_deref().unwrap_or("")
            ),
            LogEvent::Info { message } => format!("ts=\"{ts}\" level=info msg=\"{message}\""),
            LogEvent::Warn { message } => format!("ts=\"{ts}\" level=warn msg=\"{message}\""),
            LogEvent::Error { message, details } => match details {
                Some(d) => format!("ts=\"{ts}\" level=error msg=\"{message}\" details=\"{d}\""),
                None => format!("ts=\"{ts}\" level=error msg=\"{message}\""),
            },
        };

        Ok(msg)
    }

    fn format_pretty(&self, event: &LogEvent) -> Result<String> {
        let ts = Utc::now().format("%Y-%m-%d %H:%M:%S%.3f");

        let msg = match event {
            LogEvent::PacketReceived(e) => format!(
                "[{ts}] RX chan={} subchan={} slicer={} retries={}: {}",
                e.chan, e.subchan, e.slicer, e.retries, e.tnc2
            ),
            LogEvent::PacketDigipeated(e) => format!(
                "[{ts}] DIGI chan{} -> chan{}: {}",
                e.from_chan, e.to_chan, e.tnc2
            ),
            LogEvent::PacketGated(e) => format!("[{ts}] GATE[{:?}] chan={}: {}", e.direction, e.chan, e.line),
            LogEvent::DuplicateDropped(e) => format!("[{ts}] DUP[{:?}] chan={} dropped", e.cache, e.chan),
            LogEvent::RateLimited(e) => format!("[{ts}] RATE-LIMITED: {}", e.line),
            LogEvent::IgateConnection(e) => format!(
                "[{ts}] IGATE {} -> {:?}{}",
                e.server,
                e.state,
                e.detail.as_ref().map(|d| format!(" ({d})")).unwrap_or_default()
            ),
            LogEvent::Info { message } => format!("[{ts}] INFO: {message}"),
            LogEvent::Warn { message } => format!("[{ts}] WARN: {message}"),
            LogEvent::Error { message, details } => match details {
                Some(d) => format!("[{ts}] ERROR: {message} | {d}"),
                None => format!("[{ts}] ERROR: {message}"),
            },
        };

        Ok(msg)
    }

    pub fn elapsed(&self) -> f64 {
        (Utc::now() - self.start_time).num_milliseconds() as f64 / 1000.0
    }
}
