//! Digipeater: alias and WIDEn-N path rewriting, preemption, and
//! duplicate suppression (§4.4).
//!
//! The rewriting itself ([`rewrite_path`]) is a pure function so it can be
//! property-tested without a dedupe cache or logger in the loop; [`Digipeater`]
//! wraps it with the per-(from_chan, to_chan) rule set and the dedupe cache
//! that the full algorithm requires.

use regex::Regex;

use crate::address::Address;
use crate::config::{DigipeatRule, PreemptMode};
use crate::dupe_cache::DedupeCache;
use crate::errors::{ConfigError, TncError};
use crate::filter::{self, HeardTracker, NullHeardTracker};
use crate::logging::TncLogger;
use crate::packet::Packet;

/// A [`DigipeatRule`] with its regexes pre-compiled, since the same rule
/// is evaluated against every received frame on its `from_chan`.
pub struct CompiledRule {
    pub from_chan: u16,
    pub to_chan: u16,
    alias: Regex,
    wide: Regex,
    enabled: bool,
    preempt: PreemptMode,
    filter: Option<filter::Filter>,
}

impl CompiledRule {
    pub fn compile(rule: &DigipeatRule) -> Result<Self, TncError> {
        let alias = Regex::new(&rule.alias_pattern).map_err(|e| {
            ConfigError::InvalidDirective {
                line: 0,
                reason: format!("bad alias_pattern {:?}: {e}", rule.alias_pattern),
            }
        })?;
        let wide = Regex::new(&rule.wide_pattern).map_err(|e| ConfigError::InvalidDirective {
            line: 0,
            reason: format!("bad wide_pattern {:?}: {e}", rule.wide_pattern),
        })?;
        let filter = match &rule.filter {
            Some(expr) => Some(filter::Filter::compile(expr)?),
            None => None,
        };
        Ok(Self {
            from_chan: rule.from_chan,
            to_chan: rule.to_chan,
            alias,
            wide,
            enabled: rule.enabled,
            preempt: rule.preempt,
            filter,
        })
    }
}

/// Text an address is matched against: bare callsign when SSID is 0
/// (`"WIDE"`, `"RELAY"`), else `CALL-SSID` (`"WIDE2-2"`), ignoring any
/// H-bit asterisk — matching is always against the *unused* form.
fn match_text(addr: &Address) -> String {
    if addr.ssid == 0 {
        addr.callsign.clone()
    } else {
        format!("{}-{}", addr.callsign, addr.ssid)
    }
}

struct WideMatch {
    n: u8,
    remaining: u8,
}

fn match_wide(wide: &Regex, addr: &Address) -> Option<WideMatch> {
    let caps = wide.captures(&match_text(addr))?;
    let n: u8 = caps.get(1)?.as_str().parse().ok()?;
    let remaining: u8 = caps.get(2)?.as_str().parse().ok()?;
    Some(WideMatch { n, remaining })
}

/// Rewrite one packet's digipeater path per §4.4's five-step algorithm.
/// Returns `None` if the packet should be dropped (step 5, or idempotence:
/// our call already appears used in the path).
pub fn rewrite_path(packet: &Packet, mycall: &Address, rule: &CompiledRule) -> Option<Packet> {
    // §8 idempotence invariant: never re-digipeat a packet we already
    // repeated through this (from, to) pair.
    if packet
        .repeaters
        .iter()
        .any(|a| a.h_bit && a.callsign == mycall.callsign && a.ssid == mycall.ssid)
    {
        return None;
    }

    let idx = packet.next_unused_repeater()?;
    let addr = &packet.repeaters[idx];

    // Step 2: simple alias match.
    if rule.alias.is_match(&match_text(addr)) {
        let mut repeaters = packet.repeaters.clone();
        if rule.preempt == PreemptMode::Trace {
            repeaters[idx] = mycall.clone().with_h_bit(true);
        } else {
            repeaters[idx].h_bit = true;
        }
        return Some(Packet {
            repeaters,
            ..packet.clone()
        });
    }

    // Step 3: WIDEn-N.
    if let Some(wm) = match_wide(&rule.wide, addr) {
        if wm.n > 0 && wm.remaining > 0 {
            let new_remaining = wm.remaining - 1;
            let mut decremented = addr.clone();
            decremented.ssid = new_remaining;
            decremented.h_bit = new_remaining == 0;

            let mut repeaters = packet.repeaters.clone();
            repeaters[idx] = decremented;
            repeaters.insert(idx, mycall.clone().with_h_bit(true));
            return Some(Packet {
                repeaters,
                ..packet.clone()
            });
        }
    }

    // Step 4: preemption — look further down the path for an alias match.
    if rule.preempt != PreemptMode::Off {
        for scan in (idx + 1)..packet.repeaters.len() {
            if packet.repeaters[scan].h_bit {
                continue;
            }
            if rule.alias.is_match(&match_text(&packet.repeaters[scan])) {
                let mut repeaters = packet.repeaters.clone();
                match rule.preempt {
                    PreemptMode::Drop => {
                        repeaters.drain(idx..scan);
                        repeaters[idx].h_bit = true;
                    }
                    PreemptMode::Mark => {
                        for r in &mut repeaters[idx..scan] {
                            r.h_bit = true;
                        }
                        repeaters[scan].h_bit = true;
                    }
                    PreemptMode::Trace => {
                        for r in &mut repeaters[idx..scan] {
                            r.h_bit = true;
                        }
                        repeaters[scan] = mycall.clone().with_h_bit(true);
                    }
                    PreemptMode::Off => unreachable!("guarded above"),
                }
                return Some(Packet {
                    repeaters,
                    ..packet.clone()
                });
            }
        }
    }

    // Step 5.
    None
}

/// Owns the compiled rule set and the digipeat dedupe cache for one
/// engine instance. `from_chan`/`to_chan` pairs with no matching rule are
/// simply never considered for a given received frame.
pub struct Digipeater {
    rules: Vec<CompiledRule>,
    dedupe: DedupeCache,
}

impl Digipeater {
    pub fn new(rules: Vec<CompiledRule>, dedupe_capacity: usize, dedupe_window_secs: u64) -> Self {
        Self {
            rules,
            dedupe: DedupeCache::new(dedupe_capacity, dedupe_window_secs),
        }
    }

    /// Process one received frame against every enabled rule whose
    /// `from_chan` matches. Returns the `(to_chan, packet)` pairs to
    /// enqueue for transmission; duplicates (per the digipeat dedupe
    /// cache) are silently dropped and logged at debug level.
    pub fn process_received(
        &mut self,
        packet: &Packet,
        from_chan: u16,
        mycall: &Address,
        logger: &mut TncLogger,
    ) -> Vec<(u16, Packet)> {
        let mut out = Vec::new();
        for rule in self.rules.iter().filter(|r| r.enabled && r.from_chan == from_chan) {
            let Some(candidate) = rewrite_path(packet, mycall, rule) else {
                continue;
            };

            if let Some(filter) = &rule.filter {
                if !filter
                    .evaluate(&candidate, None, &NullHeardTracker as &dyn HeardTracker)
                    .permits()
                {
                    logger.debug("DIGI", format!("filter denied packet from {}", candidate.source));
                    continue;
                }
            }

            if !self.dedupe.check_and_insert(&candidate, rule.to_chan, true) {
                logger.debug("DIGI", format!("duplicate suppressed: {}", candidate.to_tnc2()));
                continue;
            }

            logger.info("DIGI", format!("digipeated {} -> chan {}", candidate.to_tnc2(), rule.to_chan));
            out.push((rule.to_chan, candidate));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mycall() -> Address {
        Address::new("MYCALL", 0).unwrap()
    }

    fn rule() -> CompiledRule {
        CompiledRule::compile(&DigipeatRule {
            from_chan: 0,
            to_chan: 0,
            ..Default::default()
        })
        .unwrap()
    }

    fn packet_with_via(via: &str) -> Packet {
        Packet::new_ui(
            "W1ABC".parse().unwrap(),
            "APRS".parse().unwrap(),
            b"!4237.14N/07120.83W-test".to_vec(),
        )
        .with_repeaters(via.split(',').filter(|s| !s.is_empty()).map(|s| s.parse().unwrap()).collect())
        .unwrap()
    }

    #[test]
    fn scenario_digipeat_wide2_2() {
        // §8 scenario 1.
        let packet = packet_with_via("WIDE2-2");
        let out = rewrite_path(&packet, &mycall(), &rule()).unwrap();
        assert_eq!(out.to_tnc2(), "W1ABC>APRS,MYCALL*,WIDE2-1:!4237.14N/07120.83W-test");
    }

    #[test]
    fn boundary_wide1_1_exhausts_without_dash_zero() {
        let packet = packet_with_via("WIDE1-1");
        let out = rewrite_path(&packet, &mycall(), &rule()).unwrap();
        assert_eq!(out.to_tnc2(), "W1ABC>APRS,MYCALL*,WIDE1*:!4237.14N/07120.83W-test");
    }

    #[test]
    fn alias_match_marks_used_without_trace() {
        let packet = packet_with_via("WIDE");
        let out = rewrite_path(&packet, &mycall(), &rule()).unwrap();
        assert_eq!(out.to_tnc2(), "W1ABC>APRS,WIDE*:!4237.14N/07120.83W-test");
    }

    #[test]
    fn alias_match_substitutes_in_trace_mode() {
        let mut dr = DigipeatRule {
            from_chan: 0,
            to_chan: 0,
            preempt: PreemptMode::Trace,
            ..Default::default()
        };
        dr.alias_pattern = "^WIDE$".to_string();
        let rule = CompiledRule::compile(&dr).unwrap();
        let packet = packet_with_via("WIDE");
        let out = rewrite_path(&packet, &mycall(), &rule).unwrap();
        assert_eq!(out.to_tnc2(), "W1ABC>APRS,MYCALL*:!4237.14N/07120.83W-test");
    }

    #[test]
    fn idempotence_already_repeated_is_never_repeated_again() {
        let packet = packet_with_via("MYCALL*,WIDE2-1");
        assert!(rewrite_path(&packet, &mycall(), &rule()).is_none());
    }

    #[test]
    fn no_match_drops() {
        let packet = packet_with_via("OTHERALIAS");
        assert!(rewrite_path(&packet, &mycall(), &rule()).is_none());
    }

    #[test]
    fn fully_used_path_drops() {
        let packet = packet_with_via("WIDE2-1*");
        assert!(rewrite_path(&packet, &mycall(), &rule()).is_none());
    }

    #[test]
    fn preempt_drop_strips_intermediate_unused() {
        let mut dr = DigipeatRule {
            from_chan: 0,
            to_chan: 0,
            preempt: PreemptMode::Drop,
            ..Default::default()
        };
        dr.alias_pattern = "^WIDE$".to_string();
        dr.wide_pattern = "^NEVERMATCHES$".to_string();
        let rule = CompiledRule::compile(&dr).unwrap();
        let packet = packet_with_via("FOO,BAR,WIDE,BAZ");
        let out = rewrite_path(&packet, &mycall(), &rule).unwrap();
        assert_eq!(out.via_path_text(), "WIDE*,BAZ");
    }

    #[test]
    fn digipeater_process_received_dedupes_across_calls() {
        let mut digi = Digipeater::new(vec![rule()], 25, 30);
        let mut logger = TncLogger::default();
        let packet = packet_with_via("WIDE2-2");
        let first = digi.process_received(&packet, 0, &mycall(), &mut logger);
        assert_eq!(first.len(), 1);
        let second = digi.process_received(&packet, 0, &mycall(), &mut logger);
        assert!(second.is_empty());
    }
}
