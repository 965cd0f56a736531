//! APRS-IS gateway client (§4.5): connection life cycle, the RX→IS and
//! IS→RF relay paths, the bidirectional duplicate/rate gates, and the
//! SATgate delay queue.
//!
//! The socket itself is abstracted behind [`IgateTransport`] so the
//! protocol logic — login handshake, heartbeat cadence, line parsing,
//! dedup/rate gating — can be exercised without a real TCP connection.

use std::collections::VecDeque;
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use rand::Rng;

use crate::address::Address;
use crate::config::IgateConfig;
use crate::dupe_cache::DedupeCache;
use crate::errors::{Ax25Error, IgateError, TncError};
use crate::filter::{self, Filter, HeardTracker, NullHeardTracker};
use crate::packet::{self, Packet};

/// One socket's worth of I/O, abstracted so the connection loop is
/// testable without a real network. A production implementation is
/// [`TcpTransport`]; tests use an in-memory stand-in.
pub trait IgateTransport: Send {
    fn connect(&mut self, addr: SocketAddr) -> io::Result<()>;
    fn write_line(&mut self, line: &str) -> io::Result<()>;
    /// Returns `Ok(None)` on a clean EOF, `Ok(Some(line))` with the
    /// trailing CR/LF stripped otherwise.
    fn read_line(&mut self) -> io::Result<Option<String>>;
}

/// Real TCP transport: `TCP_NODELAY` per §4.5, line-buffered reads.
pub struct TcpTransport {
    stream: Option<TcpStream>,
    buf: Vec<u8>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self {
            stream: None,
            buf: Vec::new(),
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl IgateTransport for TcpTransport {
    fn connect(&mut self, addr: SocketAddr) -> io::Result<()> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        self.buf.clear();
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        use std::io::Write;
        let stream = self.stream.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "igate socket not connected")
        })?;
        stream.write_all(line.as_bytes())?;
        if !line.ends_with('\n') {
            stream.write_all(b"\n")?;
        }
        Ok(())
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        use std::io::Read;
        let stream = self.stream.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "igate socket not connected")
        })?;
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let line_bytes: Vec<u8> = self.buf.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line_bytes);
                return Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()));
            }
            let mut chunk = [0u8; 1024];
            let n = stream.read(&mut chunk)?;
            if n == 0 {
                return Ok(None);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

/// Resolve `host:port` to its addresses and shuffle them (Fisher-Yates)
/// so repeated connect attempts spread load across a DNS round-robin
/// (§4.5 "Connection life cycle").
pub fn resolve_shuffled(host: &str, port: u16, rng: &mut impl Rng) -> Result<Vec<SocketAddr>, IgateError> {
    let mut addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| IgateError::DnsLookupFailed {
            host: host.to_string(),
            reason: e.to_string(),
        })?
        .collect();
    addrs.shuffle(rng);
    Ok(addrs)
}

pub fn login_line(config: &IgateConfig) -> String {
    let mut line = format!(
        "user {} pass {} vers {} {}",
        config.login_call, config.passcode, config.software_name, config.software_version
    );
    if let Some(filter) = &config.login_filter {
        line.push_str(" filter ");
        line.push_str(filter);
    }
    line
}

const LOGIN_WAIT: Duration = Duration::from_secs(7);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Tracks whether the login window has closed; drives heartbeat cadence.
/// Split out from [`IgateClient`] so the connection thread (which needs
/// wall-clock `Instant`s) and the protocol-logic tests (which don't) stay
/// independent.
pub struct ConnectionState {
    connected_at: Option<Instant>,
    last_heartbeat: Option<Instant>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self {
            connected_at: None,
            last_heartbeat: None,
        }
    }

    pub fn mark_connected(&mut self, now: Instant) {
        self.connected_at = Some(now);
        self.last_heartbeat = Some(now);
    }

    pub fn mark_disconnected(&mut self) {
        self.connected_at = None;
        self.last_heartbeat = None;
    }

    /// True once `LOGIN_WAIT` has elapsed since connecting — the RX→IS
    /// path's "login incomplete" rejection (§4.5 step 1) and the point
    /// past which `#` lines are genuine server status rather than part
    /// of the login handshake window (§4.5 IS→RF step 2).
    pub fn login_complete(&self, now: Instant) -> bool {
        self.connected_at.map(|t| now.duration_since(t) >= LOGIN_WAIT).unwrap_or(false)
    }

    pub fn heartbeat_due(&self, now: Instant) -> bool {
        self.last_heartbeat.map(|t| now.duration_since(t) >= HEARTBEAT_INTERVAL).unwrap_or(false)
    }

    pub fn mark_heartbeat(&mut self, now: Instant) {
        self.last_heartbeat = Some(now);
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives one connect-login-pump-reconnect cycle against a transport and
/// address list, forever, until `shutdown` returns true. `on_line` is
/// called with every non-heartbeat line received from the server
/// (typically the IS→RF path). This function owns the socket for its
/// entire `read_line`-blocked lifetime, so a caller that also needs to
/// write IS→RF or SATgate traffic onto the same connection should drive
/// its own loop around [`IgateTransport`]/[`ConnectionState`] instead —
/// see `tncd`'s igate runtime.
pub fn run_connection_loop(
    transport: &mut dyn IgateTransport,
    config: &IgateConfig,
    mut rng: impl Rng,
    mut shutdown: impl FnMut() -> bool,
    mut on_line: impl FnMut(&str),
) {
    while !shutdown() {
        let addrs = match resolve_shuffled(&config.server, config.port, &mut rng) {
            Ok(a) if !a.is_empty() => a,
            _ => {
                std::thread::sleep(RECONNECT_BACKOFF);
                continue;
            }
        };

        let mut connected = false;
        for addr in addrs {
            if transport.connect(addr).is_ok() {
                connected = true;
                break;
            }
        }
        if !connected {
            std::thread::sleep(RECONNECT_BACKOFF);
            continue;
        }

        if transport.write_line(&login_line(config)).is_err() {
            std::thread::sleep(RECONNECT_BACKOFF);
            continue;
        }

        let mut state = ConnectionState::new();
        state.mark_connected(Instant::now());

        loop {
            if shutdown() {
                return;
            }
            match transport.read_line() {
                Ok(Some(line)) => on_line(&line),
                Ok(None) => break,
                Err(_) => break,
            }
            if state.heartbeat_due(Instant::now()) {
                if transport.write_line("#\n").is_err() {
                    break;
                }
                state.mark_heartbeat(Instant::now());
            }
        }
        std::thread::sleep(RECONNECT_BACKOFF);
    }
}

/// Sliding-window counter enforcing both a configurable soft default and
/// an absolute hard cap over 1-minute and 5-minute windows (§4.5 IS→RF
/// step 8).
struct RateLimiter {
    one_min: VecDeque<Instant>,
    five_min: VecDeque<Instant>,
}

impl RateLimiter {
    fn new() -> Self {
        Self {
            one_min: VecDeque::new(),
            five_min: VecDeque::new(),
        }
    }

    fn prune(queue: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(&front) = queue.front() {
            if now.duration_since(front) > window {
                queue.pop_front();
            } else {
                break;
            }
        }
    }

    /// True if a new transmission is permitted right now, in which case
    /// it is recorded. The hard cap always wins over the configured
    /// default even if the default was raised above it by mistake.
    fn check_and_record(&mut self, now: Instant, config: &crate::config::RateLimitConfig) -> bool {
        Self::prune(&mut self.one_min, now, Duration::from_secs(60));
        Self::prune(&mut self.five_min, now, Duration::from_secs(300));

        let limit_1min = config.default_1min.min(config.hard_cap_1min) as usize;
        let limit_5min = config.default_5min.min(config.hard_cap_5min) as usize;

        if self.one_min.len() >= limit_1min || self.five_min.len() >= limit_5min {
            return false;
        }
        self.one_min.push_back(now);
        self.five_min.push_back(now);
        true
    }
}

/// One packet awaiting SATgate release.
struct SatgateEntry {
    packet: Packet,
    from_chan: u16,
    release_at: Instant,
}

/// SATgate delay queue: strict FIFO, no reordering by release time
/// (§4.6 "Ordering guarantees" — mirrored here for the delay queue
/// itself per §4.5's delay-thread description).
struct SatgateQueue {
    entries: VecDeque<SatgateEntry>,
}

impl SatgateQueue {
    fn new() -> Self {
        Self { entries: VecDeque::new() }
    }

    fn insert(&mut self, packet: Packet, from_chan: u16, release_at: Instant) {
        self.entries.push_back(SatgateEntry { packet, from_chan, release_at });
    }

    /// Remove and return every entry whose release time has arrived, in
    /// FIFO order.
    fn drain_due(&mut self, now: Instant) -> Vec<(Packet, u16)> {
        let mut due = Vec::new();
        while let Some(front) = self.entries.front() {
            if front.release_at <= now {
                let entry = self.entries.pop_front().unwrap();
                due.push((entry.packet, entry.from_chan));
            } else {
                break;
            }
        }
        due
    }
}

const RX_TO_IS_DEDUPE_CAPACITY: usize = 30;
const RX_TO_IS_DEDUPE_WINDOW_SECS: u64 = 60;
const IS_TO_TX_DEDUPE_CAPACITY: usize = 50;
const IS_TO_TX_DEDUPE_WINDOW_SECS: u64 = 60;
const DEFAULT_SATGATE_DELAY_SECS: u64 = 10;

/// Owns both dedup caches, the rate limiter, and the SATgate queue for
/// one APRS-IS connection. The connection thread and the calling
/// digipeater/processor share this behind a lock in the daemon; the
/// logic here is otherwise self-contained and socket-free.
pub struct IgateClient {
    config: IgateConfig,
    mycall: Address,
    rx_filter: Option<Filter>,
    tx_filter: Option<Filter>,
    rx_to_is_cache: DedupeCache,
    is_to_tx_cache: DedupeCache,
    rate_limiter: RateLimiter,
    satgate: SatgateQueue,
}

impl IgateClient {
    pub fn new(config: IgateConfig, mycall: Address) -> Result<Self, TncError> {
        let rx_filter = match &config.rx_filter {
            Some(expr) => Some(Filter::compile(expr)?),
            None => None,
        };
        let tx_filter = match &config.tx_filter {
            Some(expr) => Some(Filter::compile(expr)?),
            None => None,
        };
        Ok(Self {
            config,
            mycall,
            rx_filter,
            tx_filter,
            rx_to_is_cache: DedupeCache::new(RX_TO_IS_DEDUPE_CAPACITY, RX_TO_IS_DEDUPE_WINDOW_SECS),
            is_to_tx_cache: DedupeCache::new(IS_TO_TX_DEDUPE_CAPACITY, IS_TO_TX_DEDUPE_WINDOW_SECS),
            rate_limiter: RateLimiter::new(),
            satgate: SatgateQueue::new(),
        })
    }

    /// Register a packet the digipeater just transmitted on `chan` (§4.4
    /// "insert into the cache and also into the IS→TX cache (marked
    /// 'by-digi')"), so the IS→RF path won't re-send what we just put on
    /// the air. A no-op if `chan` isn't this gateway's configured
    /// transmit channel.
    pub fn note_digipeated(&mut self, chan: u16, packet: &Packet) {
        if chan == self.config.tx_chan {
            self.is_to_tx_cache.check_and_insert(packet, chan, true);
        }
    }

    /// RX→IS path (§4.5 steps 1-10). `login_ok` reflects the connection's
    /// current state (step 1); `now` is injected so SATgate scheduling is
    /// testable. Returns the TNC2 line to write to the socket, or `None`
    /// if the packet was rejected, deferred, or deduplicated.
    pub fn rx_to_is(&mut self, packet: &Packet, from_chan: u16, login_ok: bool, now: Instant) -> Option<String> {
        if !login_ok {
            return None;
        }

        if let Some(filter) = &self.rx_filter {
            if !filter.evaluate(packet, None, &NullHeardTracker as &dyn HeardTracker).permits() {
                return None;
            }
        }

        let unwrapped;
        let effective: &Packet = if packet::third_party::is_third_party(packet) {
            match packet::third_party::unwrap(packet) {
                Ok(inner) => {
                    if packet_has_non_rf_via(&inner) {
                        return None;
                    }
                    unwrapped = inner;
                    &unwrapped
                }
                Err(_) => return None,
            }
        } else {
            packet
        };

        if packet_has_non_rf_via(effective) {
            return None;
        }

        if effective.info.first() == Some(&b'?') {
            return None;
        }

        let info = truncate_at_newline(effective.info_trimmed());
        if info.is_empty() {
            return None;
        }

        let heard_directly = !effective.repeaters.is_empty() && !effective.repeaters.iter().any(|a| a.h_bit);
        if self.config.satgate_enabled && heard_directly {
            let delay = if self.config.satgate_delay_secs > 0 {
                self.config.satgate_delay_secs
            } else {
                DEFAULT_SATGATE_DELAY_SECS
            };
            self.satgate.insert(effective.clone(), from_chan, now + Duration::from_secs(delay));
            return None;
        }

        if !self.rx_to_is_cache.check_and_insert(effective, from_chan, false) {
            return None;
        }

        Some(emit_rx_to_is_line(effective, &self.mycall))
    }

    /// Poll the SATgate queue and feed every due entry back through
    /// `rx_to_is` (§4.5 "SATgate delay thread"). Returns the TNC2 lines
    /// to write, in release order.
    pub fn drain_satgate(&mut self, now: Instant) -> Vec<String> {
        let due = self.satgate.drain_due(now);
        let mut lines = Vec::new();
        for (packet, from_chan) in due {
            if !self.rx_to_is_cache.check_and_insert(&packet, from_chan, false) {
                continue;
            }
            lines.push(emit_rx_to_is_line(&packet, &self.mycall));
        }
        lines
    }

    /// IS→RF path (§4.5 steps 1-9 of that subsection). `line` has already
    /// had its trailing CR/LF stripped by the transport. Returns the
    /// channel to enqueue on and the wrapped packet to transmit.
    pub fn is_to_rf(&mut self, line: &str, login_complete: bool, now: Instant) -> Option<(u16, Packet)> {
        if line.starts_with('#') {
            return None;
        }
        if !login_complete {
            return None;
        }

        let parsed = Packet::from_tnc2(line).ok()?;

        if let Some(filter) = &self.tx_filter {
            if !filter.evaluate(&parsed, None, &NullHeardTracker as &dyn HeardTracker).permits() {
                return None;
            }
        }

        // §4.5 steps 5-6: strip the inner packet's via path entirely and
        // prepend TCPIP*,MYCALL* in its place.
        let inner_via: Vec<Address> = std::iter::once(Address::new("TCPIP", 0).ok()?.with_h_bit(true))
            .chain(std::iter::once(self.mycall.clone().with_h_bit(true)))
            .collect();
        let inner = Packet {
            repeaters: inner_via,
            ..parsed.clone()
        };

        // §4.5 step 7: wrap as third-party from our own call, addressed to
        // the configured TOCALL, via the configured IGTXVIA path.
        let outer_tocall: Address = self.config.tx_tocall.parse().ok()?;
        let outer_via = parse_via_list(&self.config.tx_via).ok()?;
        let wrapped = packet::third_party::wrap(self.mycall.clone(), outer_tocall, outer_via, &inner).ok()?;

        if !self.is_to_tx_cache.check_and_insert(&wrapped, self.config.tx_chan, false) {
            return None;
        }

        if !self.rate_limiter.check_and_record(now, &self.config.rate_limit) {
            return None;
        }

        Some((self.config.tx_chan, wrapped))
    }
}

fn packet_has_non_rf_via(packet: &Packet) -> bool {
    packet.repeaters.iter().any(|a| packet::via_is_non_rf(&a.callsign))
}

fn truncate_at_newline(info: &[u8]) -> Vec<u8> {
    let end = info.iter().position(|&b| b == b'\r' || b == b'\n').unwrap_or(info.len());
    info[..end].to_vec()
}

/// Render the §4.5 step 10 `SRC>DEST,via1,via2,...,qAR,MYCALL:info` text.
fn emit_rx_to_is_line(packet: &Packet, mycall: &Address) -> String {
    let mut via = packet.via_path_text();
    if !via.is_empty() {
        via.push(',');
    }
    via.push_str("qAR,");
    via.push_str(&mycall.to_string());
    format!(
        "{}>{},{}:{}",
        packet.source,
        packet.destination,
        via,
        String::from_utf8_lossy(packet.info_trimmed())
    )
}

fn parse_via_list(text: &str) -> Result<Vec<Address>, Ax25Error> {
    text.split(',')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;

    fn igate_config() -> IgateConfig {
        IgateConfig {
            server: "noam.aprs2.net".to_string(),
            port: 14580,
            login_call: "MYCALL".to_string(),
            passcode: "12345".to_string(),
            software_name: "tncd".to_string(),
            software_version: "1.0".to_string(),
            login_filter: None,
            rx_filter: None,
            tx_filter: None,
            tx_chan: 0,
            tx_tocall: "APDW17".to_string(),
            tx_via: "WIDE1-1".to_string(),
            rate_limit: RateLimitConfig {
                default_1min: 6,
                default_5min: 20,
                hard_cap_1min: 20,
                hard_cap_5min: 80,
            },
            satgate_enabled: false,
            satgate_delay_secs: 10,
        }
    }

    fn mycall() -> Address {
        Address::new("MYCALL", 0).unwrap()
    }

    fn heard_packet(via: &str) -> Packet {
        Packet::new_ui("W1ABC".parse().unwrap(), "APRS".parse().unwrap(), b"!4237.14N/07120.83W-test".to_vec())
            .with_repeaters(via.split(',').filter(|s| !s.is_empty()).map(|s| s.parse().unwrap()).collect())
            .unwrap()
    }

    #[test]
    fn rx_to_is_emits_qar_line() {
        let mut client = IgateClient::new(igate_config(), mycall()).unwrap();
        let packet = heard_packet("");
        let line = client.rx_to_is(&packet, 0, true, Instant::now()).unwrap();
        assert_eq!(line, "W1ABC>APRS,qAR,MYCALL:!4237.14N/07120.83W-test");
    }

    #[test]
    fn rx_to_is_rejects_when_login_incomplete() {
        let mut client = IgateClient::new(igate_config(), mycall()).unwrap();
        let packet = heard_packet("");
        assert!(client.rx_to_is(&packet, 0, false, Instant::now()).is_none());
    }

    #[test]
    fn rx_to_is_rejects_tcpip_via() {
        let mut client = IgateClient::new(igate_config(), mycall()).unwrap();
        let packet = heard_packet("TCPIP*");
        assert!(client.rx_to_is(&packet, 0, true, Instant::now()).is_none());
    }

    #[test]
    fn rx_to_is_rejects_query_dti() {
        let mut client = IgateClient::new(igate_config(), mycall()).unwrap();
        let packet = Packet::new_ui("W1ABC".parse().unwrap(), "APRS".parse().unwrap(), b"?APRSD".to_vec());
        assert!(client.rx_to_is(&packet, 0, true, Instant::now()).is_none());
    }

    #[test]
    fn rx_to_is_dedupes_within_window() {
        let mut client = IgateClient::new(igate_config(), mycall()).unwrap();
        let packet = heard_packet("");
        let now = Instant::now();
        assert!(client.rx_to_is(&packet, 0, true, now).is_some());
        assert!(client.rx_to_is(&packet, 0, true, now).is_none());
    }

    #[test]
    fn satgate_defers_directly_heard_digipeated_packet() {
        let mut config = igate_config();
        config.satgate_enabled = true;
        let mut client = IgateClient::new(config, mycall()).unwrap();
        let packet = heard_packet("WIDE2-1");
        let now = Instant::now();
        assert!(client.rx_to_is(&packet, 0, true, now).is_none());

        assert!(client.drain_satgate(now).is_empty());
        let later = now + Duration::from_secs(11);
        let lines = client.drain_satgate(later);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("qAR,MYCALL"));
    }

    #[test]
    fn satgate_not_applied_when_digipeated_hbit_set() {
        let mut config = igate_config();
        config.satgate_enabled = true;
        let mut client = IgateClient::new(config, mycall()).unwrap();
        let packet = heard_packet("WIDE2-1*");
        let now = Instant::now();
        // Already digipeated (h_bit set) -> not "heard directly", goes
        // straight through instead of being deferred.
        assert!(client.rx_to_is(&packet, 0, true, now).is_some());
    }

    #[test]
    fn note_digipeated_suppresses_later_is_to_rf_duplicate() {
        let mut client = IgateClient::new(igate_config(), mycall()).unwrap();
        let digipeated = Packet::new_ui("W1XYZ".parse().unwrap(), "APRS".parse().unwrap(), b"!4237.14N/07120.83W-hello".to_vec());
        client.note_digipeated(0, &digipeated);

        let line = "W1XYZ>APRS,WIDE2-1:!4237.14N/07120.83W-hello";
        assert!(client.is_to_rf(line, true, Instant::now()).is_none());
    }

    #[test]
    fn note_digipeated_ignores_other_channels() {
        let mut client = IgateClient::new(igate_config(), mycall()).unwrap();
        let digipeated = Packet::new_ui("W1XYZ".parse().unwrap(), "APRS".parse().unwrap(), b"!4237.14N/07120.83W-hello".to_vec());
        client.note_digipeated(99, &digipeated);

        let line = "W1XYZ>APRS,WIDE2-1:!4237.14N/07120.83W-hello";
        assert!(client.is_to_rf(line, true, Instant::now()).is_some());
    }

    #[test]
    fn is_to_rf_wraps_third_party_with_tcpip_mycall_via() {
        // §8 scenario 5: the outer header carries our own call, the
        // configured TOCALL, and the configured IGTXVIA path; TCPIP*,MYCALL*
        // moves onto the inner (original) packet's via path.
        let mut client = IgateClient::new(igate_config(), mycall()).unwrap();
        let line = "W1XYZ>APRS,WIDE2-1:!4237.14N/07120.83W-hello";
        let (chan, packet) = client.is_to_rf(line, true, Instant::now()).unwrap();
        assert_eq!(chan, 0);
        assert_eq!(packet.source.callsign, "MYCALL");
        assert_eq!(packet.destination.callsign, "APDW17");
        assert_eq!(packet.via_path_text(), "WIDE1-1");
        assert!(packet::third_party::is_third_party(&packet));
        let inner = packet::third_party::unwrap(&packet).unwrap();
        assert_eq!(inner.source.callsign, "W1XYZ");
        assert_eq!(inner.via_path_text(), "TCPIP*,MYCALL*");
    }

    #[test]
    fn is_to_rf_ignores_heartbeat_lines() {
        let mut client = IgateClient::new(igate_config(), mycall()).unwrap();
        assert!(client.is_to_rf("# aprsc 2.1.4-g implementing igate", true, Instant::now()).is_none());
    }

    #[test]
    fn is_to_rf_enforces_one_minute_rate_cap() {
        let mut config = igate_config();
        config.rate_limit.default_1min = 1;
        let mut client = IgateClient::new(config, mycall()).unwrap();
        let now = Instant::now();
        // Distinct info fields so the second call fails on the rate cap
        // rather than being rejected by the dedupe gate first.
        assert!(client.is_to_rf("W1XYZ>APRS:!4237.14N/07120.83W-one", true, now).is_some());
        assert!(client.is_to_rf("W1XYZ>APRS:!4237.14N/07120.83W-two", true, now).is_none());
    }

    #[test]
    fn connection_state_tracks_login_window_and_heartbeat() {
        let mut state = ConnectionState::new();
        let t0 = Instant::now();
        state.mark_connected(t0);
        assert!(!state.login_complete(t0));
        assert!(state.login_complete(t0 + Duration::from_secs(8)));
        assert!(!state.heartbeat_due(t0 + Duration::from_secs(1)));
        assert!(state.heartbeat_due(t0 + Duration::from_secs(31)));
    }
}
