//! Directive-file config loader.
//!
//! The on-disk format is a flat, line-oriented keyword grammar in the
//! tradition of classic TNC config files: one directive per line, `#`
//! introduces a comment, and a line whose first non-blank character is
//! `*` is a comment line too. Unlike the engine's own `tnc_core::config`
//! structs (which are just data), this parser has to tolerate operator
//! typos gracefully — an invalid or unrecognized directive is logged
//! with its line number and skipped, never a hard abort, so a
//! mostly-right config file still brings up every channel it can.

use std::fs;
use std::path::Path;

use tnc_core::config::{
    AudioDeviceConfig, BeaconConfig, BeaconDestination, BeaconKind, ChannelConfig, DedupeConfig,
    DigipeatRule, IgateConfig, ModemConfig, ModemKind, PreemptMode, PttConfig, PttLine,
    RateLimitConfig, SmartBeaconConfig,
};
use tnc_core::hdlc::FixBitsMode;
use tnc_core::ConfigError;

/// Where a reference audio backend should pull/push samples for one
/// `ADEVICE` directive. Real sound-card access is out of scope; these are
/// the stand-ins the daemon actually ships (§6 treats "the
/// platform-specific audio I/O driver" as an external collaborator).
#[derive(Debug, Clone)]
pub enum AudioDeviceKind {
    /// A continuously generated sine tone, useful for smoke-testing a
    /// channel's modem chain without any real audio.
    Tone,
    /// Samples read from / written to a PCM WAV file via `hound`.
    WavFile(String),
    /// Samples decoded from a compressed file (MP3/AAC/FLAC/etc.) via
    /// `symphonia`. Only meaningful as a source.
    CompressedFile(String),
    /// Silence in, discarded out — channels that exist only to be
    /// digipeat/IGate sources under test.
    Null,
}

#[derive(Debug, Clone)]
pub struct AudioDeviceDirective {
    pub id: u16,
    pub kind: AudioDeviceKind,
    pub audio: AudioDeviceConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    Stderr,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Logfmt,
    Pretty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub target: LogTarget,
    pub file_path: Option<String>,
    pub format: LogFormat,
    pub level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            target: LogTarget::Stdout,
            file_path: None,
            format: LogFormat::Pretty,
            level: LogLevel::Info,
        }
    }
}

impl LoggingConfig {
    /// Map the daemon's own level (which has no `Trace`) onto one of the
    /// engine's `LogConfig` verbosity presets.
    pub fn to_core_log_config(&self) -> tnc_core::logging::LogConfig {
        match self.level {
            LogLevel::Debug => tnc_core::logging::LogConfig::verbose(),
            LogLevel::Info => tnc_core::logging::LogConfig::default(),
            LogLevel::Warn => tnc_core::logging::LogConfig::quiet(),
            LogLevel::Error => tnc_core::logging::LogConfig::disabled(),
        }
    }
}

/// One channel's worth of everything the directive file can say about it:
/// the engine-facing [`ChannelConfig`] plus which [`AudioDeviceDirective`]
/// feeds it.
#[derive(Debug, Clone)]
pub struct ChannelDirective {
    pub channel: ChannelConfig,
    pub adevice: u16,
}

/// Everything parsed out of a directive file, ready to hand to the
/// orchestrator.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    pub audio_devices: Vec<AudioDeviceDirective>,
    pub channels: Vec<ChannelDirective>,
    pub digipeat_rules: Vec<DigipeatRule>,
    pub igate: Option<IgateConfig>,
    pub beacons: Vec<BeaconConfig>,
    pub smartbeacon: Option<SmartBeaconConfig>,
    pub dedupe: DedupeConfig,
    pub kiss_listen_port: Option<u16>,
    pub logging: LoggingConfig,
}

impl RuntimeConfig {
    /// Read and parse a directive file from disk. I/O failure (file
    /// missing, unreadable) is the one error this returns; malformed
    /// directives inside a file that *did* open are collected as
    /// warnings instead, per the "log, substitute default, continue"
    /// contract.
    pub fn load(path: impl AsRef<Path>) -> Result<(Self, Vec<ConfigError>), std::io::Error> {
        let text = fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    pub fn parse(text: &str) -> (Self, Vec<ConfigError>) {
        let mut parser = Parser::default();
        for (idx, raw_line) in text.lines().enumerate() {
            parser.line_no = idx + 1;
            parser.process_line(raw_line);
        }
        (parser.config, parser.warnings)
    }
}

#[derive(Default)]
struct Parser {
    config: RuntimeConfig,
    warnings: Vec<ConfigError>,
    line_no: usize,
}

impl Parser {
    fn warn(&mut self, reason: impl Into<String>) {
        self.warnings.push(ConfigError::InvalidDirective {
            line: self.line_no,
            reason: reason.into(),
        });
    }

    fn unknown(&mut self, keyword: &str) {
        self.warnings.push(ConfigError::UnknownDirective {
            line: self.line_no,
            keyword: keyword.to_string(),
        });
    }

    fn process_line(&mut self, raw_line: &str) {
        let trimmed_start = raw_line.trim_start();
        if trimmed_start.starts_with('*') {
            return;
        }
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            return;
        }
        let mut tokens = line.split_whitespace();
        let Some(keyword) = tokens.next() else { return };
        let rest: Vec<&str> = tokens.collect();
        let upper = keyword.to_ascii_uppercase();

        match upper.as_str() {
            "ADEVICE" => self.directive_adevice(&rest),
            "CHANNEL" => self.directive_channel(&rest),
            "MYCALL" => self.directive_mycall(&rest),
            "MODEM" => self.directive_modem(&rest),
            "PTT" => self.directive_ptt(&rest),
            "FIXBITS" => self.directive_fixbits(&rest),
            "DIGIPEAT" => self.directive_digipeat(&rest, line),
            "FILTER" => self.directive_filter(line),
            "IGSERVER" => self.directive_igserver(&rest),
            "IGLOGIN" => self.directive_iglogin(&rest),
            "IGTXVIA" => self.directive_igtxvia(&rest),
            "IGTOCALL" => self.directive_igtocall(&rest),
            "IGFILTER" => self.directive_igfilter(&rest, line),
            "IGTXLIMIT" => self.directive_igtxlimit(&rest),
            "SATGATE" => self.directive_satgate(&rest),
            "PBEACON" => self.directive_beacon(BeaconKind::Position, &rest, line),
            "OBEACON" => self.directive_beacon(BeaconKind::Object, &rest, line),
            "TBEACON" => self.directive_beacon(BeaconKind::Tracker, &rest, line),
            "CBEACON" => self.directive_beacon(BeaconKind::Custom, &rest, line),
            "SMARTBEACON" | "SMARTBEACONING" => self.directive_smartbeacon(&rest),
            "KISSPORT" => self.directive_kissport(&rest),
            "LOGFILE" | "LOGTARGET" => self.directive_logtarget(&rest),
            "LOGFORMAT" => self.directive_logformat(&rest),
            "LOGLEVEL" => self.directive_loglevel(&rest),
            kw if kw.starts_with("TT") => {
                // APRStt (DTMF touch-tone) configuration is accepted for
                // compatibility but not acted on (§1 non-goal).
                self.warn(format!(
                    "{kw} accepted but ignored: touch-tone configuration is not implemented"
                ));
            }
            other => self.unknown(other),
        }
    }

    fn directive_adevice(&mut self, rest: &[&str]) {
        let Some(id_str) = rest.first() else {
            return self.warn("ADEVICE requires an id");
        };
        let Ok(id) = id_str.parse::<u16>() else {
            return self.warn(format!("ADEVICE id {id_str:?} is not a number"));
        };
        let kind = match rest.get(1).map(|s| s.to_ascii_uppercase()) {
            Some(k) if k == "TONE" => AudioDeviceKind::Tone,
            Some(k) if k == "NULL" => AudioDeviceKind::Null,
            Some(k) if k == "WAVIN" || k == "WAVOUT" => match rest.get(2) {
                Some(path) => AudioDeviceKind::WavFile(path.to_string()),
                None => return self.warn("WAVIN/WAVOUT requires a file path"),
            },
            Some(k) if k == "FILEIN" => match rest.get(2) {
                Some(path) => AudioDeviceKind::CompressedFile(path.to_string()),
                None => return self.warn("FILEIN requires a file path"),
            },
            Some(other) => return self.warn(format!("unknown ADEVICE kind {other:?}")),
            None => {
                return self.warn("ADEVICE requires a kind (TONE, WAVIN, WAVOUT, FILEIN, NULL)")
            }
        };
        let sample_rate = kv_u32(rest, "RATE").unwrap_or(44_100);
        self.config.audio_devices.push(AudioDeviceDirective {
            id,
            kind,
            audio: AudioDeviceConfig {
                device_name: format!("adevice{id}"),
                sample_rate,
                num_channels: 1,
            },
        });
    }

    fn directive_channel(&mut self, rest: &[&str]) {
        let Some(chan) = rest.first().and_then(|s| s.parse::<u16>().ok()) else {
            return self.warn("CHANNEL requires a numeric channel id");
        };
        let adevice = kv_u32(rest, "ADEVICE").unwrap_or(0) as u16;
        self.config.channels.push(ChannelDirective {
            channel: ChannelConfig {
                chan,
                ..Default::default()
            },
            adevice,
        });
    }

    fn channel_mut(&mut self, chan: u16) -> Option<&mut ChannelConfig> {
        self.config
            .channels
            .iter_mut()
            .find(|c| c.channel.chan == chan)
            .map(|c| &mut c.channel)
    }

    fn directive_mycall(&mut self, rest: &[&str]) {
        let (Some(chan_str), Some(call)) = (rest.first(), rest.get(1)) else {
            return self.warn("MYCALL requires a channel and a callsign");
        };
        let Ok(chan) = chan_str.parse::<u16>() else {
            return self.warn(format!("MYCALL channel {chan_str:?} is not numeric"));
        };
        let call = call.to_string();
        match self.channel_mut(chan) {
            Some(c) => c.mycall = call,
            None => self.warn(format!("MYCALL refers to undeclared channel {chan}")),
        }
    }

    fn directive_modem(&mut self, rest: &[&str]) {
        let Some(chan_str) = rest.first() else {
            return self.warn("MODEM requires a channel");
        };
        let Ok(chan) = chan_str.parse::<u16>() else {
            return self.warn(format!("MODEM channel {chan_str:?} is not numeric"));
        };
        let kind = match rest.get(1).map(|s| s.to_ascii_uppercase()) {
            Some(k) if k == "AFSK1200" => ModemKind::Afsk1200,
            Some(k) if k == "AFSK300" => ModemKind::Afsk300,
            Some(k) if k == "9600" || k == "BASEBAND9600" => ModemKind::Baseband9600,
            Some(other) => return self.warn(format!("unknown MODEM kind {other:?}")),
            None => return self.warn("MODEM requires a kind (AFSK1200, AFSK300, 9600)"),
        };
        let subchans = kv_u32(rest, "SUBCHANS").unwrap_or(1).max(1) as u8;
        let offsets_hz = match kv_str(rest, "OFFSETS") {
            Some(list) => list.split(',').filter_map(|s| s.parse::<f64>().ok()).collect(),
            None => vec![0.0],
        };
        match self.channel_mut(chan) {
            Some(c) => {
                c.modem = ModemConfig {
                    kind,
                    subchans,
                    offsets_hz,
                };
            }
            None => self.warn(format!("MODEM refers to undeclared channel {chan}")),
        }
    }

    fn directive_ptt(&mut self, rest: &[&str]) {
        let Some(chan_str) = rest.first() else {
            return self.warn("PTT requires a channel");
        };
        let Ok(chan) = chan_str.parse::<u16>() else {
            return self.warn(format!("PTT channel {chan_str:?} is not numeric"));
        };
        let line = match rest.get(1).map(|s| s.to_ascii_uppercase()) {
            Some(k) if k == "RTS" => PttLine::Rts,
            Some(k) if k == "DTR" => PttLine::Dtr,
            Some(k) if k == "GPIO" => PttLine::Gpio,
            Some(k) if k == "LPT" => PttLine::Lpt,
            Some(k) if k == "RIG" || k == "RIGCONTROL" => PttLine::RigControl,
            Some(other) => return self.warn(format!("unknown PTT line {other:?}")),
            None => return self.warn("PTT requires a line (RTS, DTR, GPIO, LPT, RIG)"),
        };
        let inverted = rest.iter().any(|t| t.eq_ignore_ascii_case("INVERTED"));
        let paired_line = match kv_str(rest, "PAIRED").map(|s| s.to_ascii_uppercase()) {
            Some(k) if k == "RTS" => Some(PttLine::Rts),
            Some(k) if k == "DTR" => Some(PttLine::Dtr),
            Some(k) if k == "GPIO" => Some(PttLine::Gpio),
            Some(k) if k == "LPT" => Some(PttLine::Lpt),
            Some(k) if k == "RIG" => Some(PttLine::RigControl),
            _ => None,
        };
        let txdelay_ms = kv_u32(rest, "TXDELAY").unwrap_or(300);
        let txtail_ms = kv_u32(rest, "TXTAIL").unwrap_or(50);
        let dwait_ms = kv_u32(rest, "DWAIT").unwrap_or(0);
        let slottime_ms = kv_u32(rest, "SLOTTIME").unwrap_or(100);
        let persist = kv_u32(rest, "PERSIST").unwrap_or(63).min(255) as u8;
        match self.channel_mut(chan) {
            Some(c) => {
                c.ptt = PttConfig {
                    line,
                    inverted,
                    paired_line,
                    txdelay_ms,
                    txtail_ms,
                    dwait_ms,
                    slottime_ms,
                    persist,
                };
            }
            None => self.warn(format!("PTT refers to undeclared channel {chan}")),
        }
    }

    fn directive_fixbits(&mut self, rest: &[&str]) {
        let Some(chan_str) = rest.first() else {
            return self.warn("FIXBITS requires a channel");
        };
        let Ok(chan) = chan_str.parse::<u16>() else {
            return self.warn(format!("FIXBITS channel {chan_str:?} is not numeric"));
        };
        let mode = match rest.get(1).map(|s| s.to_ascii_uppercase()) {
            Some(m) if m == "OFF" => FixBitsMode::Off,
            Some(m) if m == "SINGLE" => FixBitsMode::RetryInvertSingle,
            Some(m) if m == "DOUBLE" => FixBitsMode::RetryInvertDouble,
            Some(other) => return self.warn(format!("unknown FIXBITS mode {other:?}")),
            None => return self.warn("FIXBITS requires a mode (OFF, SINGLE, DOUBLE)"),
        };
        match self.channel_mut(chan) {
            Some(c) => c.fix_bits = mode,
            None => self.warn(format!("FIXBITS refers to undeclared channel {chan}")),
        }
    }

    fn directive_digipeat(&mut self, rest: &[&str], full_line: &str) {
        let (Some(from_str), Some(to_str)) = (rest.first(), rest.get(1)) else {
            return self.warn("DIGIPEAT requires from_chan and to_chan");
        };
        let (Ok(from_chan), Ok(to_chan)) = (from_str.parse::<u16>(), to_str.parse::<u16>()) else {
            return self.warn("DIGIPEAT channel numbers must be numeric");
        };
        let alias_pattern = rest
            .get(2)
            .map(|s| s.to_string())
            .unwrap_or_else(|| "^WIDE$|^RELAY$|^TRACE$".to_string());
        let wide_pattern = rest
            .get(3)
            .map(|s| s.to_string())
            .unwrap_or_else(|| r"^WIDE([1-7])-([1-7])$".to_string());
        let preempt = match kv_str(rest, "PREEMPT").map(|s| s.to_ascii_uppercase()) {
            Some(p) if p == "DROP" => PreemptMode::Drop,
            Some(p) if p == "MARK" => PreemptMode::Mark,
            Some(p) if p == "TRACE" => PreemptMode::Trace,
            _ => PreemptMode::Off,
        };
        let filter = filter_tail(full_line);
        self.config.digipeat_rules.push(DigipeatRule {
            from_chan,
            to_chan,
            alias_pattern,
            wide_pattern,
            enabled: true,
            preempt,
            filter,
        });
    }

    fn directive_filter(&mut self, full_line: &str) {
        // A bare FILTER line attaches a filter expression to the most
        // recently declared DIGIPEAT rule, mirroring how an operator
        // reads the file top-to-bottom.
        let Some(last) = self.config.digipeat_rules.last_mut() else {
            return self.warn("FILTER with no preceding DIGIPEAT rule");
        };
        last.filter = filter_tail(full_line);
    }

    fn ensure_igate(&mut self) -> &mut IgateConfig {
        if self.config.igate.is_none() {
            self.config.igate = Some(IgateConfig::default());
        }
        self.config.igate.as_mut().unwrap()
    }

    fn directive_igserver(&mut self, rest: &[&str]) {
        let Some(host) = rest.first() else {
            return self.warn("IGSERVER requires a host");
        };
        let port = rest.get(1).and_then(|s| s.parse::<u16>().ok()).unwrap_or(14580);
        let host = host.to_string();
        let igate = self.ensure_igate();
        igate.server = host;
        igate.port = port;
    }

    fn directive_iglogin(&mut self, rest: &[&str]) {
        let (Some(call), Some(pass)) = (rest.first(), rest.get(1)) else {
            return self.warn("IGLOGIN requires a callsign and passcode");
        };
        let (call, pass) = (call.to_string(), pass.to_string());
        let igate = self.ensure_igate();
        igate.login_call = call;
        igate.passcode = pass;
    }

    fn directive_igtxvia(&mut self, rest: &[&str]) {
        let Some(via) = rest.first() else {
            return self.warn("IGTXVIA requires a via path");
        };
        let via = via.to_string();
        self.ensure_igate().tx_via = via;
    }

    fn directive_igtocall(&mut self, rest: &[&str]) {
        let Some(tocall) = rest.first() else {
            return self.warn("IGTOCALL requires a destination callsign");
        };
        let tocall = tocall.to_ascii_uppercase();
        self.ensure_igate().tx_tocall = tocall;
    }

    fn directive_igfilter(&mut self, rest: &[&str], full_line: &str) {
        let Some(direction) = rest.first().map(|s| s.to_ascii_uppercase()) else {
            return self.warn("IGFILTER requires RX or TX");
        };
        let expr = filter_tail(full_line).or_else(|| {
            // filter_tail looks for the literal "FILTER" keyword; here the
            // directive itself is IGFILTER, so fall back to everything
            // after the RX/TX token.
            let idx = full_line.to_ascii_uppercase().find(&direction)?;
            let after = full_line[idx + direction.len()..].trim();
            (!after.is_empty()).then(|| after.to_string())
        });
        let igate = self.ensure_igate();
        match direction.as_str() {
            "RX" => igate.rx_filter = expr,
            "TX" => igate.tx_filter = expr,
            other => self.warn(format!("IGFILTER direction {other:?} must be RX or TX")),
        }
    }

    fn directive_igtxlimit(&mut self, rest: &[&str]) {
        let one = rest.first().and_then(|s| s.parse::<u32>().ok());
        let five = rest.get(1).and_then(|s| s.parse::<u32>().ok());
        let (Some(one), Some(five)) = (one, five) else {
            return self.warn("IGTXLIMIT requires <1min> <5min>");
        };
        let igate = self.ensure_igate();
        let hard = RateLimitConfig::default();
        igate.rate_limit = RateLimitConfig {
            default_1min: one,
            default_5min: five,
            hard_cap_1min: hard.hard_cap_1min,
            hard_cap_5min: hard.hard_cap_5min,
        };
    }

    fn directive_satgate(&mut self, rest: &[&str]) {
        let enabled = match rest.first().map(|s| s.to_ascii_uppercase()) {
            Some(v) if v == "ON" => true,
            Some(v) if v == "OFF" => false,
            _ => return self.warn("SATGATE requires ON or OFF"),
        };
        let delay = rest.get(1).and_then(|s| s.parse::<u64>().ok()).unwrap_or(10);
        let igate = self.ensure_igate();
        igate.satgate_enabled = enabled;
        igate.satgate_delay_secs = delay;
    }

    fn directive_beacon(&mut self, kind: BeaconKind, rest: &[&str], full_line: &str) {
        let destination = match rest.first().map(|s| s.to_ascii_uppercase()) {
            Some(d) if d == "IGATE" => BeaconDestination::Igate,
            Some(d) if d.starts_with("LOOPBACK") => {
                let chan_str = d.strip_prefix("LOOPBACK:").unwrap_or("0");
                match chan_str.parse::<u16>() {
                    Ok(chan) => BeaconDestination::Loopback(chan),
                    Err(_) => {
                        return self.warn(format!(
                            "LOOPBACK destination channel {chan_str:?} is not numeric"
                        ))
                    }
                }
            }
            Some(d) => match d.parse::<u16>() {
                Ok(chan) => BeaconDestination::Channel(chan),
                Err(_) => {
                    return self.warn(format!(
                        "beacon destination {d:?} is not IGATE, LOOPBACK, or a channel number"
                    ))
                }
            },
            None => return self.warn("beacon directive requires a destination"),
        };

        let delay_secs = kv_u64(rest, "DELAY").unwrap_or(60);
        let every_secs = kv_u64(rest, "EVERY").unwrap_or(1800);
        let latitude = kv_coord(self, rest, "LAT").unwrap_or(0.0);
        let longitude = kv_coord(self, rest, "LON").unwrap_or(0.0);
        let altitude_ft = kv_str(rest, "ALT").and_then(|s| s.parse::<f64>().ok());
        let object_name = kv_str(rest, "NAME").unwrap_or_default().to_string();
        let (symbol_table, symbol_code) = kv_str(rest, "SYMBOL")
            .and_then(|s| {
                let mut chars = s.chars();
                Some((chars.next()?, chars.next()?))
            })
            .unwrap_or(('/', '-'));
        let phg = kv_str(rest, "PHG").map(|s| s.to_string());
        let comment_command = if kind == BeaconKind::Custom {
            extract_quoted(full_line, "CMD")
        } else {
            None
        };
        let comment = extract_quoted(full_line, "COMMENT").unwrap_or_default();

        self.config.beacons.push(BeaconConfig {
            kind,
            destination,
            delay_secs,
            every_secs,
            latitude,
            longitude,
            altitude_ft,
            object_name,
            symbol_table,
            symbol_code,
            phg,
            comment,
            comment_command,
        });
    }

    fn directive_smartbeacon(&mut self, rest: &[&str]) {
        if rest.len() < 7 {
            return self.warn(
                "SMARTBEACON requires 7 values: fast_speed fast_rate slow_speed slow_rate turn_time turn_angle turn_slope",
            );
        }
        let parsed: Vec<Option<f64>> = rest[..7].iter().map(|s| s.parse::<f64>().ok()).collect();
        if parsed.iter().any(|v| v.is_none()) {
            return self.warn("SMARTBEACON values must all be numeric");
        }
        let v: Vec<f64> = parsed.into_iter().map(|v| v.unwrap()).collect();
        self.config.smartbeacon = Some(SmartBeaconConfig {
            fast_speed_kph: v[0],
            fast_rate_secs: v[1] as u64,
            slow_speed_kph: v[2],
            slow_rate_secs: v[3] as u64,
            turn_time_secs: v[4] as u64,
            turn_angle_deg: v[5],
            turn_slope: v[6],
        });
    }

    fn directive_kissport(&mut self, rest: &[&str]) {
        match rest.first().and_then(|s| s.parse::<u16>().ok()) {
            Some(port) => self.config.kiss_listen_port = Some(port),
            None => self.warn("KISSPORT requires a numeric port"),
        }
    }

    fn directive_logtarget(&mut self, rest: &[&str]) {
        match rest.first().map(|s| s.to_ascii_uppercase()) {
            Some(t) if t == "STDOUT" => self.config.logging.target = LogTarget::Stdout,
            Some(t) if t == "STDERR" => self.config.logging.target = LogTarget::Stderr,
            Some(_) => {
                self.config.logging.target = LogTarget::File;
                self.config.logging.file_path = rest.first().map(|s| s.to_string());
            }
            None => self.warn("LOGFILE requires a target or path"),
        }
    }

    fn directive_logformat(&mut self, rest: &[&str]) {
        match rest.first().map(|s| s.to_ascii_uppercase()) {
            Some(f) if f == "JSON" => self.config.logging.format = LogFormat::Json,
            Some(f) if f == "LOGFMT" => self.config.logging.format = LogFormat::Logfmt,
            Some(f) if f == "PRETTY" => self.config.logging.format = LogFormat::Pretty,
            _ => self.warn("LOGFORMAT must be JSON, LOGFMT, or PRETTY"),
        }
    }

    fn directive_loglevel(&mut self, rest: &[&str]) {
        match rest.first().map(|s| s.to_ascii_uppercase()) {
            Some(l) if l == "DEBUG" => self.config.logging.level = LogLevel::Debug,
            Some(l) if l == "INFO" => self.config.logging.level = LogLevel::Info,
            Some(l) if l == "WARN" => self.config.logging.level = LogLevel::Warn,
            Some(l) if l == "ERROR" => self.config.logging.level = LogLevel::Error,
            _ => self.warn("LOGLEVEL must be DEBUG, INFO, WARN, or ERROR"),
        }
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn kv_str<'a>(rest: &[&'a str], key: &str) -> Option<&'a str> {
    rest.iter().find_map(|tok| {
        let (k, v) = tok.split_once('=')?;
        k.eq_ignore_ascii_case(key).then_some(v)
    })
}

fn kv_u32(rest: &[&str], key: &str) -> Option<u32> {
    kv_str(rest, key).and_then(|v| v.parse().ok())
}

fn kv_u64(rest: &[&str], key: &str) -> Option<u64> {
    kv_str(rest, key).and_then(|v| v.parse().ok())
}

/// Parse a `LAT=`/`LON=` value, accepting both signed decimal degrees
/// (`42.619`) and a `DDMM.mmH`-style value with a trailing hemisphere
/// letter (`4237.14N`), matching what a beacon actually transmits on the
/// wire (§9's `parse_ll`/hemisphere-letter Open Question). Anything else
/// is logged and defaulted to 0.0 rather than aborting the load.
fn kv_coord(parser: &mut Parser, rest: &[&str], key: &str) -> Option<f64> {
    let raw = kv_str(rest, key)?;
    if let Ok(v) = raw.parse::<f64>() {
        return Some(v);
    }
    let upper = raw.to_ascii_uppercase();
    let (digits, sign) = if let Some(d) = upper.strip_suffix(['N', 'E']) {
        (d, 1.0)
    } else if let Some(d) = upper.strip_suffix(['S', 'W']) {
        (d, -1.0)
    } else {
        parser.warn(format!(
            "{key}={raw:?} has no recognizable hemisphere letter, defaulting to 0.0"
        ));
        return None;
    };
    match digits.parse::<f64>() {
        Ok(deg_min) => {
            let degrees = (deg_min / 100.0).floor();
            let minutes = deg_min - degrees * 100.0;
            Some(sign * (degrees + minutes / 60.0))
        }
        Err(_) => {
            parser.warn(format!("{key}={raw:?} is not a parseable coordinate"));
            None
        }
    }
}

/// Everything after `COMMENT "..."` or `CMD "..."` on the line, double
/// quotes stripped.
fn extract_quoted(line: &str, key: &str) -> Option<String> {
    let upper = line.to_ascii_uppercase();
    let idx = upper.find(key)?;
    let after = &line[idx + key.len()..];
    let start = after.find('"')? + 1;
    let end = after[start..].find('"')? + start;
    Some(after[start..end].to_string())
}

/// Remaining tokens after the literal `FILTER` keyword, joined back into
/// a filter expression. A filter expression can contain `/` and parens
/// but never a `=`, so this deliberately doesn't try to be KEY=VALUE
/// aware beyond that point.
fn filter_tail(line: &str) -> Option<String> {
    let upper = line.to_ascii_uppercase();
    let idx = upper.find("FILTER")?;
    let after = &line[idx + "FILTER".len()..];
    let trimmed = after.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
