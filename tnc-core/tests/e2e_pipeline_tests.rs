//! Cross-module end-to-end scenarios: these exercise two or more real
//! components wired together (never mocks standing in for the component
//! under test), as opposed to the single-module unit tests colocated with
//! each source file. Scenario numbering follows the worked examples in
//! the packet engine's design document.

use std::time::{Duration, Instant};

use tnc_core::address::Address;
use tnc_core::config::{DigipeatRule, IgateConfig, RateLimitConfig};
use tnc_core::digipeat::{CompiledRule, Digipeater};
use tnc_core::hdlc::receiver::{FixBitsMode, HdlcReceiver};
use tnc_core::hdlc::transmitter::HdlcTransmitter;
use tnc_core::hdlc::NrziDecoder;
use tnc_core::igate::IgateClient;
use tnc_core::kiss;
use tnc_core::logging::TncLogger;
use tnc_core::packet::Packet;

fn mycall() -> Address {
    Address::new("MYCALL", 0).unwrap()
}

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

/// Bit-exact TX→RX loopback through the full HDLC transmitter/receiver
/// pair, for several frame shapes: empty info, a full 8-deep repeater
/// path, and a non-zero-SSID source — the invariant from §8 ("for every
/// transmitted frame and the same bits re-fed into the receive pipeline,
/// the decoded packet equals the input packet, including all address
/// H-bits and info bytes").
#[test]
fn hdlc_loopback_recovers_packet_for_several_frame_shapes() {
    let packets = vec![
        Packet::new_ui("W1ABC".parse().unwrap(), "APRS".parse().unwrap(), Vec::new()),
        Packet::new_ui("W1ABC-9".parse().unwrap(), "APZ191".parse().unwrap(), b"!4237.14N/07120.83W-test".to_vec())
            .with_repeaters(
                (1..=8)
                    .map(|n| format!("DIGI{n}-{n}").parse::<Address>().unwrap())
                    .collect(),
            )
            .unwrap(),
        Packet::new_ui("N0CALL".parse().unwrap(), "APRS".parse().unwrap(), b"status text".to_vec())
            .with_repeaters(vec!["WIDE1-1".parse().unwrap(), "WIDE2-2".parse().unwrap()])
            .unwrap(),
    ];

    for packet in packets {
        let levels = HdlcTransmitter::frame_bits(&packet, 3, 3);
        let mut decoder = NrziDecoder::new(false);
        let bits: Vec<u8> = levels.iter().map(|&l| decoder.decode_level(l)).collect();

        let mut rx = HdlcReceiver::new(FixBitsMode::Off);
        let mut logger = TncLogger::default();
        let mut decoded = Vec::new();
        for bit in bits {
            if let Some(frame) = rx.process_bit(bit, &mut logger) {
                decoded.push(frame);
            }
        }
        assert_eq!(decoded.len(), 1, "expected exactly one recovered frame for {packet:?}");
        assert_eq!(decoded[0].packet, packet);
        assert_eq!(decoded[0].retries, 0);
    }
}

/// A packet carried as a KISS frame to an attached client and back still
/// decodes to the same AX.25 packet — the boundary named in §6 between
/// the core engine and client transport.
#[test]
fn kiss_framing_preserves_packet_across_the_client_boundary() {
    let packet = Packet::new_ui("W1ABC".parse().unwrap(), "APRS".parse().unwrap(), b"!4237.14N/07120.83W-test".to_vec())
        .with_repeaters(vec!["WIDE2-2".parse().unwrap()])
        .unwrap();

    let stuffed = kiss::encode_packet(0, &packet);
    let mut decoder = kiss::KissDecoder::new();
    let frames = decoder.feed(&stuffed);
    assert_eq!(frames.len(), 1);
    let recovered = kiss::decode_packet(&frames[0]).unwrap();
    assert_eq!(recovered, packet);
}

/// Scenario 1 + the §4.4 closing sentence: digipeating `WIDE2-2` through
/// a real [`Digipeater`] produces the expected `WIDE2-1` rewrite, and the
/// packet it emits is then registered with a real [`IgateClient`] (via
/// the same `note_digipeated` hook `processor.rs` calls) so that an
/// identical packet arriving later from APRS-IS is suppressed rather than
/// being re-transmitted — "so the IGate won't re-send what we just
/// transmitted".
#[test]
fn digipeated_packet_suppresses_later_is_to_rf_duplicate() {
    let rule = CompiledRule::compile(&DigipeatRule {
        from_chan: 0,
        to_chan: 0,
        ..Default::default()
    })
    .unwrap();
    let mut digipeater = Digipeater::new(vec![rule], 25, 30);
    let mut logger = TncLogger::default();

    let received = Packet::new_ui("W1ABC".parse().unwrap(), "APRS".parse().unwrap(), b"!4237.14N/07120.83W-test".to_vec())
        .with_repeaters(vec!["WIDE2-2".parse().unwrap()])
        .unwrap();

    let outbound = digipeater.process_received(&received, 0, &mycall(), &mut logger);
    assert_eq!(outbound.len(), 1);
    let (to_chan, digipeated) = &outbound[0];
    assert_eq!(digipeated.to_tnc2(), "W1ABC>APRS,MYCALL*,WIDE2-1:!4237.14N/07120.83W-test");

    let mut igate = IgateClient::new(igate_config(), mycall()).unwrap();
    igate.note_digipeated(*to_chan, digipeated);

    // The same info content arriving later from APRS-IS, bound for the
    // same RF channel, must be suppressed — we already put it on the air.
    let is_line = "W1ABC>APRS,WIDE2-1:!4237.14N/07120.83W-test";
    assert!(igate.is_to_rf(is_line, true, Instant::now()).is_none());
}

/// A digipeat rule's optional filter expression (§4.7) still gates what
/// gets digipeated even when the WIDEn-N rewrite itself would otherwise
/// succeed — the filter runs after rewriting, before the dedupe cache.
#[test]
fn digipeat_rule_filter_denies_non_matching_source() {
    let rule = CompiledRule::compile(&DigipeatRule {
        from_chan: 0,
        to_chan: 0,
        filter: Some("b/W1ABC*".to_string()),
        ..Default::default()
    })
    .unwrap();
    let mut digipeater = Digipeater::new(vec![rule], 25, 30);
    let mut logger = TncLogger::default();

    let allowed = Packet::new_ui("W1ABC-5".parse().unwrap(), "APRS".parse().unwrap(), b"!test".to_vec())
        .with_repeaters(vec!["WIDE2-2".parse().unwrap()])
        .unwrap();
    let denied = Packet::new_ui("N0CALL".parse().unwrap(), "APRS".parse().unwrap(), b"!test".to_vec())
        .with_repeaters(vec!["WIDE2-2".parse().unwrap()])
        .unwrap();

    assert_eq!(digipeater.process_received(&allowed, 0, &mycall(), &mut logger).len(), 1);
    assert!(digipeater.process_received(&denied, 0, &mycall(), &mut logger).is_empty());
}

/// §4.5's SATgate delay thread note: "if a digipeated copy was seen
/// meanwhile, the original is quietly suppressed in favor of the
/// digipeated one". A packet heard directly is deferred; before the
/// delay elapses, the same content arrives already digipeated (H-bit
/// set) and is gated to APRS-IS immediately; when the delay finally
/// fires, the deferred original is dropped as a duplicate.
#[test]
fn satgate_deferred_original_is_dropped_once_digipeated_copy_preempts_it() {
    let mut config = igate_config();
    config.satgate_enabled = true;
    let mut igate = IgateClient::new(config, mycall()).unwrap();

    let now = Instant::now();
    let direct = Packet::new_ui("W1ABC".parse().unwrap(), "APRS".parse().unwrap(), b"!4237.14N/07120.83W-test".to_vec())
        .with_repeaters(vec!["WIDE2-1".parse().unwrap()])
        .unwrap();
    assert!(igate.rx_to_is(&direct, 0, true, now).is_none(), "directly-heard packet with an unused via should defer");

    let digipeated = Packet::new_ui("W1ABC".parse().unwrap(), "APRS".parse().unwrap(), b"!4237.14N/07120.83W-test".to_vec())
        .with_repeaters(vec!["WIDE2-1*".parse().unwrap()])
        .unwrap();
    // Same receiving channel as the deferred original, so the dedupe
    // cache's (CRC, channel) key collides at drain time.
    let line = igate.rx_to_is(&digipeated, 0, true, now + Duration::from_secs(2));
    assert!(line.is_some(), "already-digipeated copy should gate through immediately");

    let released = igate.drain_satgate(now + Duration::from_secs(11));
    assert!(released.is_empty(), "deferred original must be dropped once the digipeated copy already gated");
}

/// Rate-limit scenario: with a 1-minute cap of 6, ten IS-sourced packets
/// in the same minute yield exactly six transmitted and four dropped.
#[test]
fn rate_limit_caps_is_to_rf_at_configured_per_minute_maximum() {
    let mut igate = IgateClient::new(igate_config(), mycall()).unwrap();
    let now = Instant::now();
    let mut accepted = 0;
    for i in 0..10 {
        let line = format!("W1ABC>APRS:!4237.14N/07120.83W-msg{i}");
        if igate.is_to_rf(&line, true, now).is_some() {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 6);
}
