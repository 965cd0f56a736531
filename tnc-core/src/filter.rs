//! Packet-filter expression engine (§4.7): a tiny recursive-descent
//! evaluator over the `b/o/d/v/g/u/t/r/s/i` primitives, combined with
//! `|` (or), `&` (and), `!` (not), and parentheses.
//!
//! Primitives are whitespace-terminated tokens, e.g. `b/W1ABC*/ & t/pom`.
//! A compiled [`Filter`] is cheap to evaluate repeatedly against many
//! packets; compilation itself is the only fallible step.

use crate::errors::FilterError;
use crate::packet::{is_mic_e, Packet};

/// Result of evaluating a filter against a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Permit,
    Deny,
    /// Syntax error — per §4.7 "treated as deny + log", callers should log
    /// the originating error and deny.
    SyntaxError,
}

impl Verdict {
    pub fn permits(self) -> bool {
        matches!(self, Verdict::Permit)
    }
}

/// A station's position, used by the `r/` (range) primitive.
#[derive(Debug, Clone, Copy)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

/// Context the `i/` (IGate messaging) primitive needs: whether an
/// addressee has been heard directly on RF recently, and at how many
/// hops / how far away. Supplied by the caller (the IGate RX path knows
/// who it has heard); the filter engine itself tracks none of this.
pub trait HeardTracker {
    /// `None` if `call` has not been heard within `max_minutes`.
    /// `Some((hops, position))` otherwise; `position` is `None` if the
    /// heard station's position is unknown.
    fn heard_within(&self, call: &str, max_minutes: u32) -> Option<(u8, Option<Position>)>;
}

/// No-op tracker: `i/` always fails to match. Useful for RF→IS/IS→RF
/// filters that never use the primitive, and in unit tests.
pub struct NullHeardTracker;
impl HeardTracker for NullHeardTracker {
    fn heard_within(&self, _call: &str, _max_minutes: u32) -> Option<(u8, Option<Position>)> {
        None
    }
}

#[derive(Debug, Clone)]
enum Node {
    Or(Box<Node>, Box<Node>),
    And(Box<Node>, Box<Node>),
    Not(Box<Node>),
    Primitive(Primitive),
}

#[derive(Debug, Clone)]
enum Primitive {
    /// `b/X/Y/...` — source matches one of the listed calls, trailing `*`
    /// wildcard allowed.
    Budlist(Vec<String>),
    /// `o/X/...` — object/item name.
    Object(Vec<String>),
    /// `d/X/...` — used (H=1) digipeater address.
    UsedDigi(Vec<String>),
    /// `v/X/...` — unused (H=0) digipeater address.
    UnusedDigi(Vec<String>),
    /// `g/X/...` — message addressee.
    Addressee(Vec<String>),
    /// `u/X/...` — destination (unproto), unless Mic-E.
    Unproto(Vec<String>),
    /// `t/TYPES` — packet type letters.
    Types(String),
    /// `r/lat/lon/km`.
    Range { lat: f64, lon: f64, km: f64 },
    /// `s/PRI/ALT/OVR` — APRS symbol selector.
    Symbol {
        primary: Option<char>,
        alternate: Option<char>,
        overlay: Option<char>,
    },
    /// `i/minutes[/hops[/lat/lon/km]]`.
    Igate {
        minutes: u32,
        max_hops: Option<u8>,
        range: Option<(f64, f64, f64)>,
    },
}

/// A compiled packet-filter expression.
#[derive(Debug, Clone)]
pub struct Filter {
    root: Node,
}

impl Filter {
    pub fn compile(expr: &str) -> Result<Self, FilterError> {
        let mut parser = Parser::new(expr);
        let root = parser.parse_or()?;
        parser.skip_ws();
        if parser.pos < parser.bytes.len() {
            return Err(parser.err(parser.pos, "trailing input after complete expression"));
        }
        Ok(Filter { root })
    }

    /// Evaluate against a packet. A filter compiled successfully never
    /// returns `SyntaxError` here — that variant exists for callers that
    /// want to fold [`compile`]'s error and evaluation into one call via
    /// [`evaluate_expr`].
    pub fn evaluate(
        &self,
        packet: &Packet,
        station: Option<Position>,
        heard: &dyn HeardTracker,
    ) -> Verdict {
        if eval_node(&self.root, packet, station, heard) {
            Verdict::Permit
        } else {
            Verdict::Deny
        }
    }
}

/// Compile and evaluate in one step, collapsing a syntax error into
/// [`Verdict::SyntaxError`] rather than propagating `Result` — the
/// ergonomic entry point for call sites that just want §7's
/// "deny + log" disposition.
pub fn evaluate_expr(
    expr: &str,
    packet: &Packet,
    station: Option<Position>,
    heard: &dyn HeardTracker,
) -> Verdict {
    match Filter::compile(expr) {
        Ok(filter) => filter.evaluate(packet, station, heard),
        Err(_) => Verdict::SyntaxError,
    }
}

fn eval_node(node: &Node, packet: &Packet, station: Option<Position>, heard: &dyn HeardTracker) -> bool {
    match node {
        Node::Or(a, b) => eval_node(a, packet, station, heard) || eval_node(b, packet, station, heard),
        Node::And(a, b) => eval_node(a, packet, station, heard) && eval_node(b, packet, station, heard),
        Node::Not(a) => !eval_node(a, packet, station, heard),
        Node::Primitive(p) => eval_primitive(p, packet, station, heard),
    }
}

fn matches_any(patterns: &[String], value: &str) -> bool {
    patterns.iter().any(|pat| {
        if let Some(prefix) = pat.strip_suffix('*') {
            value.starts_with(prefix)
        } else {
            value == pat
        }
    })
}

fn dti(packet: &Packet) -> Option<u8> {
    packet.info.first().copied()
}

/// Best-effort APRS packet-type classification for the `t/` primitive.
/// This is deliberately coarse — full APRS data-type parsing is the job
/// of an external APRS decoder, not this engine; the filter only needs
/// to bucket by the leading DTI byte per the table in §4.7.
fn packet_type_letters(packet: &Packet) -> Vec<char> {
    let mut letters = Vec::new();
    if is_mic_e(packet) {
        letters.push('p');
        return letters;
    }
    match dti(packet) {
        Some(b'!') | Some(b'=') | Some(b'/') | Some(b'@') => letters.push('p'),
        Some(b';') => letters.push('o'),
        Some(b')') => letters.push('i'),
        Some(b':') => {
            // Messages starting "BLN" or the addressee being a bulletin
            // name are still type 'm' for filtering purposes; telemetry
            // messages (addressee "T" equivalents) are left as 'm' too —
            // only the explicit telemetry DTI below gets 't'.
            letters.push('m');
            if packet.info.len() >= 10 {
                let addressee = String::from_utf8_lossy(&packet.info[1..10]);
                if addressee.trim_end().starts_with("NWS") {
                    letters.push('n');
                }
            }
        }
        Some(b'?') => letters.push('q'),
        Some(b'<') => letters.push('c'),
        Some(b'>') => letters.push('s'),
        Some(b'T') => letters.push('t'),
        Some(b'_') => letters.push('w'),
        Some(b'{') => letters.push('u'),
        _ => {}
    }
    if crate::packet::third_party::is_third_party(packet) {
        letters.push('h');
    }
    letters
}

fn haversine_km(a: Position, b: Position) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

fn eval_primitive(p: &Primitive, packet: &Packet, station: Option<Position>, heard: &dyn HeardTracker) -> bool {
    match p {
        Primitive::Budlist(calls) => matches_any(calls, &packet.source.callsign),
        Primitive::Object(names) => {
            // Object/item name occupies the first 9 bytes of the info
            // field after the ';' or ')' DTI, space-padded.
            if !matches!(dti(packet), Some(b';') | Some(b')')) {
                return false;
            }
            let name_field = &packet.info[1..];
            let name = String::from_utf8_lossy(name_field)
                .chars()
                .take(9)
                .collect::<String>();
            matches_any(names, name.trim_end())
        }
        Primitive::UsedDigi(calls) => packet
            .repeaters
            .iter()
            .any(|a| a.h_bit && matches_any(calls, &a.callsign)),
        Primitive::UnusedDigi(calls) => packet
            .repeaters
            .iter()
            .any(|a| !a.h_bit && matches_any(calls, &a.callsign)),
        Primitive::Addressee(calls) => {
            if dti(packet) != Some(b':') || packet.info.len() < 10 {
                return false;
            }
            let addressee = String::from_utf8_lossy(&packet.info[1..10]);
            matches_any(calls, addressee.trim_end())
        }
        Primitive::Unproto(calls) => {
            if is_mic_e(packet) {
                return false;
            }
            matches_any(calls, &packet.destination.callsign)
        }
        Primitive::Types(types) => {
            let letters = packet_type_letters(packet);
            types.chars().any(|want| letters.contains(&want))
        }
        Primitive::Range { lat, lon, km } => match station {
            Some(pos) => haversine_km(pos, Position { lat: *lat, lon: *lon }) <= *km,
            None => false,
        },
        Primitive::Symbol {
            primary,
            alternate,
            overlay,
        } => {
            let (table, code) = symbol_of(packet);
            match table {
                '/' => primary.map(|c| c == code).unwrap_or(false),
                '\\' => alternate.map(|c| c == code).unwrap_or(false),
                other => overlay.map(|c| c == other).unwrap_or(false),
            }
        }
        Primitive::Igate {
            minutes,
            max_hops,
            range,
        } => {
            if dti(packet) != Some(b':') || packet.info.len() < 10 {
                return false;
            }
            let addressee = String::from_utf8_lossy(&packet.info[1..10]).trim_end().to_string();
            match heard.heard_within(&addressee, *minutes) {
                Some((hops, pos)) => {
                    if let Some(max_hops) = max_hops {
                        if hops > *max_hops {
                            return false;
                        }
                    }
                    if let Some((lat, lon, km)) = range {
                        match pos {
                            Some(p) => haversine_km(p, Position { lat: *lat, lon: *lon }) <= *km,
                            None => return false,
                        }
                    } else {
                        true
                    }
                }
                None => false,
            }
        }
    }
}

/// Extract the APRS symbol table char and code char from a position-style
/// info field (`!lat.../lon...symbol` at a fixed offset after the DTI).
/// Best-effort: returns `('/', ' ')` for anything not shaped like a
/// position packet, which simply never matches a real `s/` filter.
fn symbol_of(packet: &Packet) -> (char, char) {
    if !matches!(dti(packet), Some(b'!') | Some(b'=') | Some(b'/') | Some(b'@')) {
        return ('/', ' ');
    }
    let text = String::from_utf8_lossy(&packet.info);
    let chars: Vec<char> = text.chars().collect();
    // `!DDMM.mmN/DDDMM.mmWs` - symbol table is byte 9 (index from DTI),
    // symbol code is the last char of this minimal slice.
    if chars.len() < 20 {
        return ('/', ' ');
    }
    (chars[8], chars[19])
}

struct Parser<'a> {
    bytes: &'a [u8],
    expr: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(expr: &'a str) -> Self {
        Self {
            bytes: expr.as_bytes(),
            expr,
            pos: 0,
        }
    }

    fn err(&self, offset: usize, reason: &str) -> FilterError {
        FilterError::Syntax {
            expr: self.expr.to_string(),
            offset,
            reason: reason.to_string(),
        }
    }

    fn skip_ws(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    /// `|` is right-associative and the lowest-precedence operator.
    fn parse_or(&mut self) -> Result<Node, FilterError> {
        let mut left = self.parse_and()?;
        self.skip_ws();
        while self.peek() == Some(b'|') {
            self.pos += 1;
            let right = self.parse_or()?; // right-associative
            left = Node::Or(Box::new(left), Box::new(right));
            self.skip_ws();
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Node, FilterError> {
        let mut left = self.parse_not()?;
        self.skip_ws();
        while self.peek() == Some(b'&') {
            self.pos += 1;
            let right = self.parse_and()?; // right-associative
            left = Node::And(Box::new(left), Box::new(right));
            self.skip_ws();
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Node, FilterError> {
        self.skip_ws();
        if self.peek() == Some(b'!') {
            self.pos += 1;
            let inner = self.parse_not()?;
            return Ok(Node::Not(Box::new(inner)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Node, FilterError> {
        self.skip_ws();
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let inner = self.parse_or()?;
                self.skip_ws();
                if self.peek() != Some(b')') {
                    return Err(self.err(self.pos, "expected closing ')'"));
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(_) => self.parse_primitive(),
            None => Err(self.err(self.pos, "unexpected end of expression")),
        }
    }

    fn take_token(&mut self) -> &'a str {
        let start = self.pos;
        while self.pos < self.bytes.len() && !self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        &self.expr[start..self.pos]
    }

    fn parse_primitive(&mut self) -> Result<Node, FilterError> {
        let start = self.pos;
        let token = self.take_token();
        let kind = token.as_bytes().first().copied();
        let Some(kind) = kind else {
            return Err(self.err(start, "empty token"));
        };
        if token.len() < 2 || token.as_bytes()[1] != b'/' {
            return Err(self.err(start, "expected TYPE/ARG form, e.g. b/W1ABC*/"));
        }
        let body = &token[2..];
        let parts: Vec<&str> = body.split('/').collect();

        let primitive = match kind {
            b'b' => Primitive::Budlist(non_empty_strings(&parts)),
            b'o' => Primitive::Object(non_empty_strings(&parts)),
            b'd' => Primitive::UsedDigi(non_empty_strings(&parts)),
            b'v' => Primitive::UnusedDigi(non_empty_strings(&parts)),
            b'g' => Primitive::Addressee(non_empty_strings(&parts)),
            b'u' => Primitive::Unproto(non_empty_strings(&parts)),
            b't' => Primitive::Types(body.to_string()),
            b'r' => {
                if parts.len() != 3 {
                    return Err(self.err(start, "r/lat/lon/km requires exactly 3 fields"));
                }
                Primitive::Range {
                    lat: parse_f64(parts[0], self, start)?,
                    lon: parse_f64(parts[1], self, start)?,
                    km: parse_f64(parts[2], self, start)?,
                }
            }
            b's' => {
                if parts.len() != 3 {
                    return Err(self.err(start, "s/PRI/ALT/OVR requires exactly 3 fields"));
                }
                Primitive::Symbol {
                    primary: parts[0].chars().next(),
                    alternate: parts[1].chars().next(),
                    overlay: parts[2].chars().next(),
                }
            }
            b'i' => {
                if parts.is_empty() || parts[0].is_empty() {
                    return Err(self.err(start, "i/minutes requires at least the minutes field"));
                }
                let minutes: u32 = parts[0]
                    .parse()
                    .map_err(|_| self.err(start, "i/ minutes field must be an integer"))?;
                let max_hops = if parts.len() > 1 && !parts[1].is_empty() {
                    Some(
                        parts[1]
                            .parse::<u8>()
                            .map_err(|_| self.err(start, "i/ hops field must be an integer"))?,
                    )
                } else {
                    None
                };
                let range = if parts.len() >= 5 {
                    Some((
                        parse_f64(parts[2], self, start)?,
                        parse_f64(parts[3], self, start)?,
                        parse_f64(parts[4], self, start)?,
                    ))
                } else {
                    None
                };
                Primitive::Igate {
                    minutes,
                    max_hops,
                    range,
                }
            }
            other => {
                return Err(self.err(start, &format!("unknown filter type '{}'", other as char)));
            }
        };
        Ok(Node::Primitive(primitive))
    }
}

fn non_empty_strings(parts: &[&str]) -> Vec<String> {
    parts.iter().filter(|s| !s.is_empty()).map(|s| s.to_string()).collect()
}

fn parse_f64(s: &str, parser: &Parser, start: usize) -> Result<f64, FilterError> {
    s.parse::<f64>().map_err(|_| parser.err(start, "expected a floating-point number"))
}
