//! Plain data structures describing engine configuration.
//!
//! These are produced by `tncd::config`'s directive-file parser (or by
//! tests constructing them directly) and consumed by the engine. They
//! derive `Serialize`/`Deserialize` purely for round-tripping in tests and
//! snapshots — the on-disk format is the line-oriented directive grammar
//! described in the daemon crate, not serde's.

use serde::{Deserialize, Serialize};

/// Which modem variant a channel's demodulator bank runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModemKind {
    /// Bell 202, 1200 baud AFSK.
    Afsk1200,
    /// Bell 103, 300 baud AFSK.
    Afsk300,
    /// Scrambled NRZI baseband, 9600 baud.
    Baseband9600,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModemConfig {
    pub kind: ModemKind,
    /// Number of parallel slicers/sub-decoders for multi-modem diversity.
    pub subchans: u8,
    /// Per-slicer center-frequency offsets in Hz, relative to the nominal
    /// mark/space pair (AFSK) or discriminator center (9600). Length should
    /// equal `subchans`; a shorter list implies 0 Hz offset for the rest.
    pub offsets_hz: Vec<f64>,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            kind: ModemKind::Afsk1200,
            subchans: 1,
            offsets_hz: vec![0.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreemptMode {
    Off,
    Drop,
    Mark,
    Trace,
}

/// One (from_chan, to_chan) digipeat rule, per §4.4.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigipeatRule {
    pub from_chan: u16,
    pub to_chan: u16,
    /// Regex matching alias addresses (e.g. `WIDE|RELAY|TRACE`).
    pub alias_pattern: String,
    /// Regex matching `WIDEn-N` style addresses.
    pub wide_pattern: String,
    pub enabled: bool,
    pub preempt: PreemptMode,
    /// Optional packet-filter expression (§4.7) gating what gets digipeated.
    pub filter: Option<String>,
}

impl Default for DigipeatRule {
    fn default() -> Self {
        Self {
            from_chan: 0,
            to_chan: 0,
            alias_pattern: "^WIDE$|^RELAY$|^TRACE$".to_string(),
            wide_pattern: r"^WIDE([1-7])-([1-7])$".to_string(),
            enabled: true,
            preempt: PreemptMode::Off,
            filter: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub default_1min: u32,
    pub default_5min: u32,
    pub hard_cap_1min: u32,
    pub hard_cap_5min: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_1min: 6,
            default_5min: 20,
            hard_cap_1min: 20,
            hard_cap_5min: 80,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IgateConfig {
    pub server: String,
    pub port: u16,
    pub login_call: String,
    pub passcode: String,
    pub software_name: String,
    pub software_version: String,
    /// Optional APRS-IS server-side filter sent on the login line.
    pub login_filter: Option<String>,
    /// Optional RF→IS filter expression (§4.7), evaluated locally.
    pub rx_filter: Option<String>,
    /// Optional IS→RF filter expression.
    pub tx_filter: Option<String>,
    /// Channel packets gated from IS are enqueued on.
    pub tx_chan: u16,
    /// Destination/TOCALL the wrapped third-party packet is addressed to
    /// on the outer header, e.g. `APDW17` (§4.5 step 7, §8 scenario 5).
    pub tx_tocall: String,
    /// Outer via path the wrapped third-party packet carries, e.g.
    /// `WIDE1-1` (§4.5 step 7).
    pub tx_via: String,
    pub rate_limit: RateLimitConfig,
    pub satgate_enabled: bool,
    pub satgate_delay_secs: u64,
}

impl Default for IgateConfig {
    fn default() -> Self {
        Self {
            server: "rotate.aprs2.net".to_string(),
            port: 14580,
            login_call: "N0CALL".to_string(),
            passcode: "-1".to_string(),
            software_name: "tncd".to_string(),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
            login_filter: None,
            rx_filter: None,
            tx_filter: None,
            tx_chan: 0,
            tx_tocall: "APDW17".to_string(),
            tx_via: "WIDE1-1".to_string(),
            rate_limit: RateLimitConfig::default(),
            satgate_enabled: false,
            satgate_delay_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BeaconKind {
    Position,
    Object,
    Tracker,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BeaconDestination {
    /// Enqueue on a transmit channel.
    Channel(u16),
    /// Hand to the IGate RX→IS path as if heard on RF.
    Igate,
    /// Inject as a simulated receive on the given channel, running the
    /// beacon back through digipeating/IGate/filters as if heard on RF
    /// (§3, §4.8 step 5) without keying any transmitter.
    Loopback(u16),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaconConfig {
    pub kind: BeaconKind,
    pub destination: BeaconDestination,
    /// Seconds after startup before the first transmission.
    pub delay_secs: u64,
    /// Seconds between transmissions for fixed-interval beacons.
    pub every_secs: u64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_ft: Option<f64>,
    /// Object name, padded/truncated to 9 characters on transmit. Only
    /// meaningful for `BeaconKind::Object`.
    pub object_name: String,
    pub symbol_table: char,
    pub symbol_code: char,
    pub phg: Option<String>,
    pub comment: String,
    /// Optional shell command whose stdout replaces `comment` at beacon
    /// time (external to the engine; the engine only invokes the contract
    /// described in §6, not a shell itself).
    pub comment_command: Option<String>,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            kind: BeaconKind::Position,
            destination: BeaconDestination::Channel(0),
            delay_secs: 60,
            every_secs: 1800,
            latitude: 0.0,
            longitude: 0.0,
            altitude_ft: None,
            object_name: String::new(),
            symbol_table: '/',
            symbol_code: '-',
            phg: None,
            comment: String::new(),
            comment_command: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartBeaconConfig {
    pub fast_speed_kph: f64,
    pub fast_rate_secs: u64,
    pub slow_speed_kph: f64,
    pub slow_rate_secs: u64,
    pub turn_time_secs: u64,
    pub turn_angle_deg: f64,
    pub turn_slope: f64,
}

impl Default for SmartBeaconConfig {
    fn default() -> Self {
        Self {
            fast_speed_kph: 100.0,
            fast_rate_secs: 180,
            slow_speed_kph: 5.0,
            slow_rate_secs: 1800,
            turn_time_secs: 15,
            turn_angle_deg: 25.0,
            turn_slope: 255.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PttLine {
    Rts,
    Dtr,
    Gpio,
    Lpt,
    RigControl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PttConfig {
    pub line: PttLine,
    pub inverted: bool,
    /// Optional second line driven with opposite polarity.
    pub paired_line: Option<PttLine>,
    /// Milliseconds of flag preamble before data (TXDELAY).
    pub txdelay_ms: u32,
    /// Additional flag octets after the closing flag (TXTAIL).
    pub txtail_ms: u32,
    pub dwait_ms: u32,
    pub slottime_ms: u32,
    /// CSMA persistence parameter in [0, 255]; transmit when a uniform
    /// random byte is ≤ this value.
    pub persist: u8,
}

impl Default for PttConfig {
    fn default() -> Self {
        Self {
            line: PttLine::Rts,
            inverted: false,
            paired_line: None,
            txdelay_ms: 300,
            txtail_ms: 50,
            dwait_ms: 0,
            slottime_ms: 100,
            persist: 63,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioDeviceConfig {
    pub device_name: String,
    pub sample_rate: u32,
    /// Number of interleaved channels carried by this device (1 or 2).
    pub num_channels: u8,
}

impl Default for AudioDeviceConfig {
    fn default() -> Self {
        Self {
            device_name: "default".to_string(),
            sample_rate: 44_100,
            num_channels: 1,
        }
    }
}

/// One radio channel: its modem, audio routing, and station identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub chan: u16,
    pub mycall: String,
    pub modem: ModemConfig,
    pub ptt: PttConfig,
    /// FIX_BITS retry mode for this channel's HDLC receiver.
    pub fix_bits: crate::hdlc::FixBitsMode,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            chan: 0,
            mycall: "N0CALL".to_string(),
            modem: ModemConfig::default(),
            ptt: PttConfig::default(),
            fix_bits: crate::hdlc::FixBitsMode::default(),
        }
    }
}

/// Duplicate-cache tuning, per §3 "Duplicate cache". Exposed as config so
/// tests can shrink the windows instead of waiting on wall-clock time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DedupeConfig {
    pub digipeat_capacity: usize,
    pub digipeat_window_secs: u64,
    pub rx_to_is_capacity: usize,
    pub rx_to_is_window_secs: u64,
    pub is_to_tx_capacity: usize,
    pub is_to_tx_window_secs: u64,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            digipeat_capacity: 25,
            digipeat_window_secs: 30,
            rx_to_is_capacity: 30,
            rx_to_is_window_secs: 60,
            is_to_tx_capacity: 50,
            is_to_tx_window_secs: 60,
        }
    }
}
