//! Scrambled NRZI 9600-baud baseband demodulator: FIR lowpass shaping,
//! AGC-normalized zero-threshold slicing, DPLL bit-clock recovery, NRZI
//! line decode, and self-synchronizing descrambling, in that order.

use super::agc::Agc;
use super::filters::FirFilter;
use super::pll::Pll;
use super::lfsr::Lfsr;
use super::BitSink;
use crate::hdlc::NrziDecoder;

const BAUD_RATE: u32 = 9600;

pub struct Baseband9600Demod {
    chan: u16,
    lowpass: FirFilter,
    agc: Agc,
    pll: Pll,
    nrzi: NrziDecoder,
    lfsr: Lfsr,
    prev_level: bool,
    locked: bool,
}

impl Baseband9600Demod {
    pub fn new(chan: u16, sample_rate: u32) -> Self {
        let cutoff = 0.59 * BAUD_RATE as f32 / sample_rate as f32;
        Self {
            chan,
            lowpass: FirFilter::lowpass(cutoff, 31),
            agc: Agc::new(0.08, 0.00012),
            pll: Pll::new(sample_rate, BAUD_RATE, 0.88, 0.67),
            nrzi: NrziDecoder::new(false),
            lfsr: Lfsr::new(),
            prev_level: false,
            locked: false,
        }
    }

    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    pub fn process_sample(&mut self, sample: i16, sink: &mut impl BitSink) {
        let normalized = sample as f32 / i16::MAX as f32;
        let shaped = self.lowpass.process(normalized);
        let slice_input = self.agc.process(shaped);
        let level = slice_input >= 0.0;

        if level != self.prev_level {
            self.pll.on_transition(self.locked);
        }
        self.prev_level = level;

        if self.pll.advance() {
            let raw_bit = self.nrzi.decode_level(level);
            let bit = self.lfsr.descramble(raw_bit);
            sink.hdlc_rx_bit(self.chan, 0, 0, bit, raw_bit, self.lfsr.state());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingSink {
        bits: u32,
    }
    impl BitSink for CountingSink {
        fn hdlc_rx_bit(&mut self, _chan: u16, _subchan: u8, _slicer: u8, _bit: u8, _raw_bit: u8, _lfsr_state: u32) {
            self.bits += 1;
        }
    }

    #[test]
    fn emits_roughly_one_bit_per_baud_interval() {
        let sample_rate = 48_000;
        let mut demod = Baseband9600Demod::new(0, sample_rate);
        let mut sink = CountingSink { bits: 0 };
        let samples_per_bit = sample_rate / BAUD_RATE;
        for i in 0..sample_rate {
            let level = (i / samples_per_bit) % 2 == 0;
            let sample = if level { i16::MAX / 2 } else { i16::MIN / 2 };
            demod.process_sample(sample, &mut sink);
        }
        let diff = (sink.bits as i64 - BAUD_RATE as i64).abs();
        assert!(diff < (BAUD_RATE / 5) as i64, "bits={}", sink.bits);
    }
}
