//! Demodulator bank: one modem instance per radio channel, each possibly
//! running several slicers/sub-decoders in parallel for diversity copy
//! (§4.1).

pub mod afsk;
pub mod agc;
pub mod baseband9600;
pub mod filters;
pub mod lfsr;
pub mod pll;
pub mod spectrum;

use crate::config::{ModemConfig, ModemKind};

/// Receives recovered data bits from a demodulator slicer, mirroring the
/// `hdlc_rx_bit(chan, subchan, slicer, bit, raw_bit, lfsr_state)` callback
/// contract described in §4.1.
pub trait BitSink {
    fn hdlc_rx_bit(&mut self, chan: u16, subchan: u8, slicer: u8, bit: u8, raw_bit: u8, lfsr_state: u32);
}

/// One channel's demodulator bank: the tagged-enum polymorphism the design
/// notes call for (§9 "Polymorphism") over the three modem variants, each
/// potentially running multiple sub-decoders.
pub enum ModemBank {
    Afsk1200(Vec<afsk::AfskDemod>),
    Afsk300(Vec<afsk::AfskDemod>),
    Baseband9600(Vec<baseband9600::Baseband9600Demod>),
}

impl ModemBank {
    pub fn new(chan: u16, config: &ModemConfig, sample_rate: u32) -> Self {
        let subchans = config.subchans.max(1) as usize;
        let offsets = if config.offsets_hz.is_empty() {
            vec![0.0; subchans]
        } else {
            let mut v = config.offsets_hz.clone();
            v.resize(subchans, 0.0);
            v
        };
        match config.kind {
            ModemKind::Afsk1200 => ModemBank::Afsk1200(
                offsets
                    .iter()
                    .map(|&offset| afsk::AfskDemod::new(chan, sample_rate, 1200.0 + offset, 2200.0 + offset, 1200))
                    .collect(),
            ),
            ModemKind::Afsk300 => ModemBank::Afsk300(
                offsets
                    .iter()
                    .map(|&offset| afsk::AfskDemod::new(chan, sample_rate, 1600.0 + offset, 1800.0 + offset, 300))
                    .collect(),
            ),
            ModemKind::Baseband9600 => ModemBank::Baseband9600(
                (0..subchans)
                    .map(|_| baseband9600::Baseband9600Demod::new(chan, sample_rate))
                    .collect(),
            ),
        }
    }

    /// Feed one signed 16-bit PCM sample to every sub-decoder, invoking
    /// `sink.hdlc_rx_bit` for each slicer that produced a bit this sample.
    pub fn process_sample(&mut self, sample: i16, sink: &mut impl BitSink) {
        match self {
            ModemBank::Afsk1200(decoders) | ModemBank::Afsk300(decoders) => {
                for decoder in decoders {
                    decoder.process_sample(sample, sink);
                }
            }
            ModemBank::Baseband9600(decoders) => {
                for decoder in decoders {
                    decoder.process_sample(sample, sink);
                }
            }
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
    fn afsk_bank_produces_bits_over_a_tone() {
        let config = ModemConfig {
            kind: ModemKind::Afsk1200,
            subchans: 1,
            offsets_hz: vec![0.0],
        };
        let mut bank = ModemBank::new(0, &config, 44_100);
        let mut sink = CountingSink { bits: 0 };
        for i in 0..44_100 {
            let t = i as f32 / 44_100.0;
            let sample = (2.0 * std::f32::consts::PI * 1200.0 * t).sin() * i16::MAX as f32;
            bank.process_sample(sample as i16, &mut sink);
        }
        assert!(sink.bits > 0);
    }

    #[test]
    fn baseband9600_bank_produces_bits() {
        let config = ModemConfig {
            kind: ModemKind::Baseband9600,
            subchans: 1,
            offsets_hz: vec![0.0],
        };
        let mut bank = ModemBank::new(0, &config, 48_000);
        let mut sink = CountingSink { bits: 0 };
        for i in 0..48_000 {
            let sample = if (i / 5) % 2 == 0 { i16::MAX / 2 } else { i16::MIN / 2 };
            bank.process_sample(sample, &mut sink);
        }
        assert!(sink.bits > 0);
    }
}
