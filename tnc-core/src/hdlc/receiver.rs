//! HDLC receiver: flag/abort detection, online bit destuffing, FCS
//! validation, and the bounded FIX_BITS retry-by-bit-inversion pass.

use serde::{Deserialize, Serialize};

use super::{compute_fcs, MIN_FRAME_BYTES};
use crate::logging::TncLogger;
use crate::packet::Packet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SearchingForFlag,
    InFrame,
}

/// How aggressively the receiver retries a bad-FCS frame by flipping bits.
/// Bounded per the spec's combinatorial-cost warning: single-bit is O(n),
/// double-bit is O(n²), and anything past double is refused by
/// construction (no variant exists for it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FixBitsMode {
    #[default]
    Off,
    RetryInvertSingle,
    RetryInvertDouble,
}

/// A frame accepted by the receiver, with the metadata the DLQ records
/// alongside it (§4.2 "Output").
#[derive(Debug, Clone)]
pub struct ReceivedFrame {
    pub packet: Packet,
    /// Number of bit flips FIX_BITS needed to validate the FCS (0 if the
    /// frame validated cleanly).
    pub retries: u32,
}

/// One HDLC deframer instance: one per (channel, subchannel, slicer).
pub struct HdlcReceiver {
    state: State,
    ones_run: u32,
    bit_accum: Vec<u8>,
    fix_bits: FixBitsMode,
}

impl HdlcReceiver {
    pub fn new(fix_bits: FixBitsMode) -> Self {
        Self {
            state: State::SearchingForFlag,
            ones_run: 0,
            bit_accum: Vec::new(),
            fix_bits,
        }
    }

    /// Feed one descrambled/NRZI-decoded data bit. Returns `Some` exactly
    /// when a flag closes a non-empty, FCS-valid (possibly after
    /// bit-inversion retry) frame.
    pub fn process_bit(&mut self, bit: u8, logger: &mut TncLogger) -> Option<ReceivedFrame> {
        if bit == 1 {
            self.ones_run += 1;
            if self.ones_run == 7 {
                if self.state == State::InFrame {
                    logger.debug("HDLC", "abort sequence seen, discarding frame");
                }
                self.bit_accum.clear();
                self.state = State::SearchingForFlag;
                self.ones_run = 0;
            }
            return None;
        }

        // bit == 0
        let result = match self.ones_run {
            0..=4 => {
                if self.state == State::InFrame {
                    self.push_ones(self.ones_run);
                    self.bit_accum.push(0);
                }
                None
            }
            5 => {
                // Stuffed zero: the preceding five ones were real data,
                // this bit is dropped.
                if self.state == State::InFrame {
                    self.push_ones(5);
                }
                None
            }
            6 => {
                // Flag: 0 1111110. The six ones were held (never pushed),
                // but the flag's own leading zero was speculatively pushed
                // as data one step ago — remove it before closing.
                let frame = if self.state == State::InFrame {
                    if !self.bit_accum.is_empty() {
                        self.bit_accum.pop();
                    }
                    self.try_close_frame(logger)
                } else {
                    None
                };
                self.bit_accum.clear();
                self.state = State::InFrame;
                frame
            }
            _ => unreachable!("ones_run capped at 7 by the abort branch above"),
        };
        self.ones_run = 0;
        result
    }

    fn push_ones(&mut self, n: u32) {
        for _ in 0..n {
            self.bit_accum.push(1);
        }
    }

    fn try_close_frame(&mut self, logger: &mut TncLogger) -> Option<ReceivedFrame> {
        if self.bit_accum.len() % 8 != 0 {
            logger.debug("HDLC", "frame bit count not byte-aligned, discarding");
            return None;
        }
        let bytes = crate::utils::pack_bits(&self.bit_accum);
        if bytes.len() < MIN_FRAME_BYTES {
            return None;
        }
        let (data, fcs_bytes) = bytes.split_at(bytes.len() - 2);
        let received_fcs = u16::from_le_bytes([fcs_bytes[0], fcs_bytes[1]]);
        let computed_fcs = compute_fcs(data);

        if computed_fcs == received_fcs {
            return Packet::from_ax25_bytes(data).ok().map(|packet| ReceivedFrame {
                packet,
                retries: 0,
            });
        }

        logger.debug("HDLC", "FCS mismatch, attempting FIX_BITS retry");
        self.retry_with_bit_flips(data, received_fcs, logger)
    }

    fn retry_with_bit_flips(
        &self,
        data: &[u8],
        received_fcs: u16,
        logger: &mut TncLogger,
    ) -> Option<ReceivedFrame> {
        if self.fix_bits == FixBitsMode::Off {
            return None;
        }
        let total_bits = data.len() * 8;

        for i in 0..total_bits {
            let mut trial = data.to_vec();
            flip_bit(&mut trial, i);
            if compute_fcs(&trial) == received_fcs {
                if let Ok(packet) = Packet::from_ax25_bytes(&trial) {
                    logger.debug("HDLC", format!("FIX_BITS accepted after 1 flip at bit {i}"));
                    return Some(ReceivedFrame { packet, retries: 1 });
                }
            }
        }

        if self.fix_bits != FixBitsMode::RetryInvertDouble {
            return None;
        }
        for i in 0..total_bits {
            for j in (i + 1)..total_bits {
                let mut trial = data.to_vec();
                flip_bit(&mut trial, i);
                flip_bit(&mut trial, j);
                if compute_fcs(&trial) == received_fcs {
                    if let Ok(packet) = Packet::from_ax25_bytes(&trial) {
                        logger.debug(
                            "HDLC",
                            format!("FIX_BITS accepted after 2 flips at bits {i},{j}"),
                        );
                        return Some(ReceivedFrame { packet, retries: 2 });
                    }
                }
            }
        }
        None
    }
}

fn flip_bit(bytes: &mut [u8], bit_index: usize) {
    let byte_index = bit_index / 8;
    let shift = 7 - (bit_index % 8);
    bytes[byte_index] ^= 1 << shift;
}
