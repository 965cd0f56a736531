//! Error taxonomy for the packet engine.
//!
//! Every fallible boundary (config parsing, IGate I/O, filter compilation)
//! returns `Result<T, TncError>`. Hot per-sample/per-bit paths in the
//! demodulator and HDLC layer are infallible transforms by construction and
//! do not participate in this hierarchy.

use thiserror::Error;

/// Top-level error type for all packet-engine operations.
#[derive(Debug, Error)]
pub enum TncError {
    #[error("AX.25 error: {0}")]
    Ax25(#[from] Ax25Error),

    #[error("HDLC error: {0}")]
    Hdlc(#[from] HdlcError),

    #[error("demodulator error: {0}")]
    Demod(#[from] DemodError),

    #[error("filter error: {0}")]
    Filter(#[from] FilterError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IGate error: {0}")]
    Igate(#[from] IgateError),
}

/// AX.25 address/packet model errors.
#[derive(Debug, Error)]
pub enum Ax25Error {
    #[error("address {0:?} is not 1-6 uppercase alphanumeric characters")]
    InvalidCallsign(String),

    #[error("SSID {0} out of range 0..=15")]
    InvalidSsid(u8),

    #[error("digipeater path has {0} addresses, maximum is 8")]
    TooManyRepeaters(usize),

    #[error("frame has {0} address bytes, not a multiple of 7")]
    MisalignedAddressField(usize),

    #[error("address field never set its end-of-address bit")]
    MissingEndOfAddress,

    #[error("control byte {0:#04x} is not a UI frame (expected 0x03)")]
    NotUiFrame(u8),

    #[error("TNC2 text {0:?} could not be parsed")]
    InvalidTnc2(String),

    #[error("third-party payload does not begin with '}}'")]
    NotThirdParty,

    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

/// HDLC receiver errors.
#[derive(Debug, Error)]
pub enum HdlcError {
    #[error("abort sequence seen (seven or more consecutive 1 bits)")]
    AbortSequence,

    #[error("frame is {actual} bytes, minimum is {minimum}")]
    FrameTooShort { actual: usize, minimum: usize },

    #[error("FCS mismatch: expected {expected:#06x}, computed {computed:#06x}")]
    BadFcs { expected: u16, computed: u16 },

    #[error("sanity check failed: frame is neither AX.25 nor APRS shaped")]
    SanityCheckFailed,
}

/// Demodulator errors.
#[derive(Debug, Error)]
pub enum DemodError {
    #[error("PLL failed to reach lock within the configured search window")]
    PllLockFailed,

    #[error("buffer underrun: requested {requested} samples, {available} available")]
    BufferUnderrun { requested: usize, available: usize },

    #[error("audio device read failed: {reason}")]
    DeviceReadFailed { reason: String },
}

/// Packet-filter expression engine errors.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("syntax error at byte {offset} in {expr:?}: {reason}")]
    Syntax {
        expr: String,
        offset: usize,
        reason: String,
    },
}

/// Configuration parsing errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("line {line}: {reason}")]
    InvalidDirective { line: usize, reason: String },

    #[error("line {line}: unknown directive {keyword:?}")]
    UnknownDirective { line: usize, keyword: String },
}

/// IGate client errors.
#[derive(Debug, Error)]
pub enum IgateError {
    #[error("DNS lookup for {host:?} failed: {reason}")]
    DnsLookupFailed { host: String, reason: String },

    #[error("connect to {addr} failed: {reason}")]
    ConnectFailed { addr: String, reason: String },

    #[error("socket write failed: {0}")]
    WriteFailed(String),

    #[error("socket read failed or EOF: {0}")]
    ReadFailed(String),
}

/// Result type alias for packet-engine operations.
pub type Result<T> = std::result::Result<T, TncError>;
