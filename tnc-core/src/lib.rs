//! tnc-core: the packet engine at the heart of a software TNC (Terminal
//! Node Controller) for amateur packet radio.
//!
//! This crate owns the protocol logic — AX.25 framing, HDLC bit-level
//! encode/decode, AFSK/9600-baud demodulation, digipeating, the IGate
//! relay, the beacon/SmartBeaconing scheduler, and the packet-filter
//! expression engine — and nothing host-specific. Audio I/O, the KISS/AGW
//! listener sockets, the directive-file config parser, and process
//! orchestration are the daemon's job (the `tncd` crate); this crate only
//! defines the traits those pieces are built against.

pub mod address;
pub mod audio;
pub mod beacon;
pub mod config;
pub mod demod;
pub mod digipeat;
pub mod dlq;
pub mod dupe_cache;
pub mod errors;
pub mod filter;
pub mod hdlc;
pub mod igate;
pub mod kiss;
pub mod logging;
pub mod modulate;
pub mod packet;
pub mod processor;
pub mod ptt;
pub mod txqueue;
pub mod utils;

pub use address::Address;
pub use errors::{Ax25Error, ConfigError, DemodError, FilterError, HdlcError, IgateError, TncError};
pub use packet::Packet;
