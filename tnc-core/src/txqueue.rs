//! Per-channel transmit queue and CSMA contract (§4.6).
//!
//! A channel's outgoing traffic is two priority levels: HI for digipeat /
//! immediate retransmission, LO for beacon / IGate-gated traffic. Within a
//! level, FIFO. Priority is consulted only at dequeue time — an
//! in-progress transmission is never preempted (§5 "Ordering guarantees").

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use rand::Rng;

use crate::packet::Packet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Lo = 0,
    Hi = 1,
}

struct Inner {
    hi: VecDeque<Packet>,
    lo: VecDeque<Packet>,
    closed: bool,
}

/// A single channel's transmit queue, shared between whatever threads
/// enqueue packets (digipeater, IGate, beacon scheduler) and the one
/// transmit thread that dequeues and keys the radio.
pub struct TxQueue {
    inner: Mutex<Inner>,
    not_empty: Condvar,
}

impl TxQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                hi: VecDeque::new(),
                lo: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
        }
    }

    pub fn enqueue(&self, packet: Packet, priority: Priority) {
        let mut inner = self.inner.lock().unwrap();
        match priority {
            Priority::Hi => inner.hi.push_back(packet),
            Priority::Lo => inner.lo.push_back(packet),
        }
        self.not_empty.notify_one();
    }

    /// Block until a packet is available (highest priority first) or the
    /// queue is closed for shutdown, in which case `None` is returned.
    pub fn dequeue_blocking(&self) -> Option<Packet> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(p) = inner.hi.pop_front() {
                return Some(p);
            }
            if let Some(p) = inner.lo.pop_front() {
                return Some(p);
            }
            if inner.closed {
                return None;
            }
            inner = self.not_empty.wait(inner).unwrap();
        }
    }

    /// Signal every blocked `dequeue_blocking` caller to wake up and
    /// return `None`, per the global shutdown design (§9).
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        self.not_empty.notify_all();
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.hi.len() + inner.lo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TxQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Carrier-sense contention parameters (§4.6 "CSMA contract").
#[derive(Debug, Clone, Copy)]
pub struct CsmaConfig {
    /// Fixed delay after squelch drop before contention begins.
    pub dwait_ms: u32,
    /// Contention slot length.
    pub slottime_ms: u32,
    /// Transmit iff a uniform random byte is <= this value.
    pub persist: u8,
}

/// Decides, slot by slot, whether the channel is clear to key up. Callers
/// drive this from the transmit thread: sleep `dwait` once after squelch
/// drop, then repeatedly call [`CsmaState::try_slot`] sleeping
/// `slottime_ms` between calls until it returns `true`.
pub struct CsmaState {
    config: CsmaConfig,
    dwait_elapsed: bool,
}

impl CsmaState {
    pub fn new(config: CsmaConfig) -> Self {
        Self {
            config,
            dwait_elapsed: false,
        }
    }

    pub fn dwait(&self) -> Duration {
        Duration::from_millis(self.config.dwait_ms as u64)
    }

    pub fn slot_time(&self) -> Duration {
        Duration::from_millis(self.config.slottime_ms as u64)
    }

    /// One contention slot: true means "transmit now". `rng` is injected
    /// so tests can pin the outcome instead of depending on real
    /// randomness.
    pub fn try_slot(&mut self, rng: &mut impl Rng) -> bool {
        self.dwait_elapsed = true;
        let sample: u8 = rng.gen();
        sample <= self.config.persist
    }
}

/// Convenience: drive DWAIT + repeated CSMA slots against the real clock
/// and RNG, blocking until the slot check permits transmission. Tests
/// exercise [`CsmaState::try_slot`] directly instead of sleeping.
pub fn wait_for_clear_channel(state: &mut CsmaState) {
    std::thread::sleep(state.dwait());
    let mut rng = rand::thread_rng();
    while !state.try_slot(&mut rng) {
        std::thread::sleep(state.slot_time());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn hi_priority_dequeues_before_lo() {
        let q = TxQueue::new();
        let lo = Packet::new_ui("W1LO".parse().unwrap(), "APRS".parse().unwrap(), b"lo".to_vec());
        let hi = Packet::new_ui("W1HI".parse().unwrap(), "APRS".parse().unwrap(), b"hi".to_vec());
        q.enqueue(lo, Priority::Lo);
        q.enqueue(hi, Priority::Hi);
        let first = q.dequeue_blocking().unwrap();
        assert_eq!(first.source.callsign, "W1HI");
        let second = q.dequeue_blocking().unwrap();
        assert_eq!(second.source.callsign, "W1LO");
    }

    #[test]
    fn fifo_within_priority_level() {
        let q = TxQueue::new();
        for i in 0..3 {
            let p = Packet::new_ui(
                format!("W1AA{i}").as_str().parse().unwrap(),
                "APRS".parse().unwrap(),
                b"x".to_vec(),
            );
            q.enqueue(p, Priority::Lo);
        }
        for i in 0..3 {
            let p = q.dequeue_blocking().unwrap();
            assert_eq!(p.source.callsign, format!("W1AA{i}"));
        }
    }

    #[test]
    fn close_unblocks_waiting_dequeue() {
        let q = std::sync::Arc::new(TxQueue::new());
        let q2 = q.clone();
        let handle = std::thread::spawn(move || q2.dequeue_blocking());
        std::thread::sleep(Duration::from_millis(50));
        q.close();
        assert!(handle.join().unwrap().is_none());
    }

    #[test]
    fn persist_gates_on_random_byte() {
        let config = CsmaConfig {
            dwait_ms: 0,
            slottime_ms: 0,
            persist: 63,
        };
        let mut state = CsmaState::new(config);
        let mut low_rng = StepRng::new(0, 0);
        assert!(state.try_slot(&mut low_rng));

        let mut high_rng = StepRng::new(u64::MAX, 0);
        assert!(!state.try_slot(&mut high_rng));
    }
}
