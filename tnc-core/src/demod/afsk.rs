//! AFSK (Bell 202 1200-baud, Bell 103-style 300-baud) demodulator: a tone
//! correlator drives a DPLL bit clock, and each bit-sample point is fed
//! through an NRZI decoder before reaching the HDLC layer.

use super::pll::Pll;
use super::filters::ToneCorrelator;
use super::BitSink;
use crate::hdlc::NrziDecoder;

pub struct AfskDemod {
    chan: u16,
    correlator: ToneCorrelator,
    pll: Pll,
    nrzi: NrziDecoder,
    prev_mark: bool,
    locked: bool,
}

impl AfskDemod {
    pub fn new(chan: u16, sample_rate: u32, mark_freq: f32, space_freq: f32, baud_rate: u32) -> Self {
        let (locked_inertia, searching_inertia) = if baud_rate == 9600 {
            (0.88, 0.67)
        } else {
            (0.74, 0.50)
        };
        Self {
            chan,
            correlator: ToneCorrelator::new(mark_freq, space_freq, sample_rate as f32),
            pll: Pll::new(sample_rate, baud_rate, locked_inertia, searching_inertia),
            nrzi: NrziDecoder::new(false),
            prev_mark: true,
            locked: false,
        }
    }

    /// Called by the packet processor once a frame boundary is being
    /// tracked, so transitions nudge the clock less aggressively.
    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    pub fn process_sample(&mut self, sample: i16, sink: &mut impl BitSink) {
        let normalized = sample as f32 / i16::MAX as f32;
        let discriminant = self.correlator.process(normalized);
        let mark = discriminant >= 0.0;
        if mark != self.prev_mark {
            self.pll.on_transition(self.locked);
        }
        self.prev_mark = mark;

        if self.pll.advance() {
            let raw_bit = mark as u8;
            let bit = self.nrzi.decode_level(mark);
            sink.hdlc_rx_bit(self.chan, 0, 0, bit, raw_bit, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LastBitSink {
        count: u32,
    }
    impl BitSink for LastBitSink {
        fn hdlc_rx_bit(&mut self, _chan: u16, _subchan: u8, _slicer: u8, _bit: u8, _raw_bit: u8, _lfsr_state: u32) {
            self.count += 1;
        }
    }

    #[test]
    fn tracks_mark_tone_and_emits_bits() {
        let sample_rate = 44_100;
        let mut demod = AfskDemod::new(0, sample_rate, 1200.0, 2200.0, 1200);
        let mut sink = LastBitSink { count: 0 };
        for i in 0..sample_rate {
            let t = i as f32 / sample_rate as f32;
            let sample = (2.0 * std::f32::consts::PI * 1200.0 * t).sin() * i16::MAX as f32 * 0.8;
            demod.process_sample(sample as i16, &mut sink);
        }
        // Roughly one bit emitted per baud interval over a second of audio.
        assert!(sink.count > 1000 && sink.count < 1400, "count={}", sink.count);
    }
}
