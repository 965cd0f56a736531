//! Duplicate-suppression ring cache, shared shape for the digipeater and
//! both IGate directions (§3 "Duplicate cache"). Expiry is a timestamp
//! comparison at lookup time, not proactive pruning — an expired entry
//! still occupies its ring slot until capacity forces it out.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::hdlc::compute_fcs;
use crate::packet::Packet;

#[derive(Debug, Clone, Copy)]
struct DedupeEntry {
    crc: u16,
    chan: u16,
    inserted_at: Instant,
    by_digi: bool,
}

/// A fixed-capacity ring of recently-seen packet fingerprints.
#[derive(Debug)]
pub struct DedupeCache {
    entries: VecDeque<DedupeEntry>,
    capacity: usize,
    window: Duration,
}

impl DedupeCache {
    pub fn new(capacity: usize, window_secs: u64) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            window: Duration::from_secs(window_secs),
        }
    }

    /// CRC16 over source + destination + trailing-whitespace-trimmed info,
    /// deliberately excluding the digipeater path (§8: "depends only on
    /// source, destination, and info... not on the digipeater list").
    pub fn dedupe_crc(packet: &Packet) -> u16 {
        let mut buf = Vec::with_capacity(14 + packet.info.len());
        buf.extend_from_slice(&packet.source.encode(true));
        buf.extend_from_slice(&packet.destination.encode(true));
        buf.extend_from_slice(packet.info_trimmed());
        compute_fcs(&buf)
    }

    /// True if a non-expired entry with this CRC and channel is already in
    /// the ring.
    pub fn contains(&self, crc: u16, chan: u16) -> bool {
        let now = Instant::now();
        self.entries
            .iter()
            .any(|e| e.crc == crc && e.chan == chan && now.duration_since(e.inserted_at) < self.window)
    }

    /// Insert a fingerprint, evicting the oldest entry if the ring is at
    /// capacity. `by_digi` distinguishes who produced the fingerprint, for
    /// the IS→TX cache's "by-digi" vs "not-by-digi" marking.
    pub fn insert(&mut self, crc: u16, chan: u16, by_digi: bool) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(DedupeEntry {
            crc,
            chan,
            inserted_at: Instant::now(),
            by_digi,
        });
    }

    /// Convenience: compute the CRC, check, and insert if absent. Returns
    /// true if the packet was a fresh (non-duplicate) insertion.
    pub fn check_and_insert(&mut self, packet: &Packet, chan: u16, by_digi: bool) -> bool {
        let crc = Self::dedupe_crc(packet);
        if self.contains(crc, chan) {
            return false;
        }
        self.insert(crc, chan, by_digi);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Packet {
        Packet::new_ui(
            "W1ABC".parse().unwrap(),
            "APRS".parse().unwrap(),
            b"!4237.14N/07120.83W-test".to_vec(),
        )
    }

    #[test]
    fn crc_ignores_digipeater_path() {
        let bare = sample();
        let with_via = sample().with_repeaters(vec!["WIDE2-2".parse().unwrap()]).unwrap();
        assert_eq!(DedupeCache::dedupe_crc(&bare), DedupeCache::dedupe_crc(&with_via));
    }

    #[test]
    fn second_insert_within_window_is_duplicate() {
        let mut cache = DedupeCache::new(25, 30);
        let packet = sample();
        assert!(cache.check_and_insert(&packet, 0, false));
        assert!(!cache.check_and_insert(&packet, 0, false));
    }

    #[test]
    fn different_channel_is_not_a_duplicate() {
        let mut cache = DedupeCache::new(25, 30);
        let packet = sample();
        assert!(cache.check_and_insert(&packet, 0, false));
        assert!(cache.check_and_insert(&packet, 1, false));
    }

    #[test]
    fn ring_evicts_oldest_past_capacity() {
        let mut cache = DedupeCache::new(2, 30);
        let a = Packet::new_ui("W1AAA".parse().unwrap(), "APRS".parse().unwrap(), b"a".to_vec());
        let b = Packet::new_ui("W1BBB".parse().unwrap(), "APRS".parse().unwrap(), b"b".to_vec());
        let c = Packet::new_ui("W1CCC".parse().unwrap(), "APRS".parse().unwrap(), b"c".to_vec());
        cache.insert(DedupeCache::dedupe_crc(&a), 0, false);
        cache.insert(DedupeCache::dedupe_crc(&b), 0, false);
        cache.insert(DedupeCache::dedupe_crc(&c), 0, false);
        assert!(!cache.contains(DedupeCache::dedupe_crc(&a), 0));
        assert!(cache.contains(DedupeCache::dedupe_crc(&b), 0));
        assert!(cache.contains(DedupeCache::dedupe_crc(&c), 0));
    }

    #[test]
    fn monotonicity_insert_does_not_change_other_keys() {
        let mut cache = DedupeCache::new(25, 30);
        let a = sample();
        let b = Packet::new_ui("W1ZZZ".parse().unwrap(), "APRS".parse().unwrap(), b"other".to_vec());
        let crc_b = DedupeCache::dedupe_crc(&b);
        let before = cache.contains(crc_b, 0);
        cache.insert(DedupeCache::dedupe_crc(&a), 0, false);
        assert_eq!(before, cache.contains(crc_b, 0));
    }
}
