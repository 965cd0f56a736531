//! HDLC transmitter: TXDELAY/TXTAIL flag padding, bit-stuffing, and NRZI
//! encoding of an outgoing packet into a line-level bit stream. Tone
//! generation from that stream is [`crate::modulate`]'s job.

use super::{compute_fcs, stuff_bits, NrziEncoder, FLAG};
use crate::packet::Packet;

fn flag_bits() -> [u8; 8] {
    let mut bits = [0u8; 8];
    for (i, bit) in bits.iter_mut().enumerate() {
        *bit = (FLAG >> (7 - i)) & 1;
    }
    bits
}

pub struct HdlcTransmitter;

impl HdlcTransmitter {
    /// Build the full NRZI line-level bit stream for one transmission:
    /// `flag_count` leading flags (TXDELAY), the bit-stuffed frame itself,
    /// one closing flag, and `tail_flag_count` trailing flags (TXTAIL).
    /// Flags are never bit-stuffed; only the address/control/PID/info/FCS
    /// region between them is.
    pub fn frame_bits(packet: &Packet, flag_count: u32, tail_flag_count: u32) -> Vec<bool> {
        let header = packet.to_ax25_bytes();
        let fcs = compute_fcs(&header);
        let mut raw = header;
        raw.extend_from_slice(&fcs.to_le_bytes());

        let data_bits = crate::utils::unpack_bits(&raw);
        let stuffed = stuff_bits(&data_bits);

        let mut all_bits = Vec::with_capacity(
            (flag_count as usize + tail_flag_count as usize + 1) * 8 + stuffed.len(),
        );
        for _ in 0..flag_count {
            all_bits.extend_from_slice(&flag_bits());
        }
        all_bits.extend(stuffed);
        all_bits.extend_from_slice(&flag_bits());
        for _ in 0..tail_flag_count {
            all_bits.extend_from_slice(&flag_bits());
        }

        let mut nrzi = NrziEncoder::new(false);
        all_bits.iter().map(|&bit| nrzi.encode_bit(bit)).collect()
    }

    /// Number of flag octets that fit in `delay_ms` of preamble at
    /// `baud_rate` bits/sec.
    pub fn flags_for_delay_ms(delay_ms: u32, baud_rate: u32) -> u32 {
        let bits = (delay_ms as u64) * (baud_rate as u64) / 1000;
        (bits / 8) as u32
    }
}
