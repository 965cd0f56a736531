//! KISS framing codec (§2, §6 "KISS frame (to attached apps)"): the byte
//! format client applications speak over the TNC's serial/TCP listener.
//!
//! Only the codec lives here — the listener socket and the attach/detach
//! lifecycle are out of scope (spec.md §1) and belong to the daemon.

use crate::errors::{Ax25Error, TncError};
use crate::packet::Packet;

pub const FEND: u8 = 0xC0;
pub const FESC: u8 = 0xDB;
pub const TFEND: u8 = 0xDC;
pub const TFESC: u8 = 0xDD;

/// The low nibble of a KISS frame's type/channel byte. `0x0` (data) is
/// the only command carrying a packet; the others are host<->TNC control
/// frames a listener may still want to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KissCommand {
    Data,
    TxDelay,
    Persistence,
    SlotTime,
    TxTail,
    FullDuplex,
    SetHardware,
    Return,
    Other(u8),
}

impl KissCommand {
    fn to_nibble(self) -> u8 {
        match self {
            KissCommand::Data => 0x0,
            KissCommand::TxDelay => 0x1,
            KissCommand::Persistence => 0x2,
            KissCommand::SlotTime => 0x3,
            KissCommand::TxTail => 0x4,
            KissCommand::FullDuplex => 0x5,
            KissCommand::SetHardware => 0x6,
            KissCommand::Return => 0xF,
            KissCommand::Other(n) => n & 0x0F,
        }
    }

    fn from_nibble(n: u8) -> Self {
        match n {
            0x0 => KissCommand::Data,
            0x1 => KissCommand::TxDelay,
            0x2 => KissCommand::Persistence,
            0x3 => KissCommand::SlotTime,
            0x4 => KissCommand::TxTail,
            0x5 => KissCommand::FullDuplex,
            0x6 => KissCommand::SetHardware,
            0xF => KissCommand::Return,
            other => KissCommand::Other(other),
        }
    }
}

/// One decoded KISS frame: a channel-tagged command plus its payload.
/// For [`KissCommand::Data`], the payload is raw AX.25 frame bytes
/// ([`Packet::to_ax25_bytes`] / [`Packet::from_ax25_bytes`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KissFrame {
    pub chan: u8,
    pub command: KissCommand,
    pub payload: Vec<u8>,
}

/// Byte-stuff `data` (`FEND`->`FESC TFEND`, `FESC`->`FESC TFESC`) and wrap
/// it in `FEND ... FEND`, with the leading type/channel byte prepended
/// before stuffing.
pub fn encode(frame: &KissFrame) -> Vec<u8> {
    let type_byte = ((frame.chan & 0x0F) << 4) | frame.command.to_nibble();
    let mut out = Vec::with_capacity(frame.payload.len() + 4);
    out.push(FEND);
    out.push(type_byte);
    for &b in &frame.payload {
        match b {
            FEND => {
                out.push(FESC);
                out.push(TFEND);
            }
            FESC => {
                out.push(FESC);
                out.push(TFESC);
            }
            other => out.push(other),
        }
    }
    out.push(FEND);
    out
}

/// Encode a data frame carrying `packet` on `chan`.
pub fn encode_packet(chan: u8, packet: &Packet) -> Vec<u8> {
    encode(&KissFrame {
        chan,
        command: KissCommand::Data,
        payload: packet.to_ax25_bytes(),
    })
}

/// Decode one complete `FEND ... FEND`-delimited frame (leading/trailing
/// `FEND` already stripped by the caller, as [`KissDecoder`] does).
/// Returns `None` for a frame with no type byte (KISS permits an empty
/// frame as a keep-alive).
pub fn decode(stuffed: &[u8]) -> Option<KissFrame> {
    let mut unstuffed = Vec::with_capacity(stuffed.len());
    let mut iter = stuffed.iter().copied();
    while let Some(b) = iter.next() {
        if b == FESC {
            match iter.next() {
                Some(TFEND) => unstuffed.push(FEND),
                Some(TFESC) => unstuffed.push(FESC),
                Some(other) => unstuffed.push(other),
                None => break,
            }
        } else {
            unstuffed.push(b);
        }
    }
    if unstuffed.is_empty() {
        return None;
    }
    let type_byte = unstuffed[0];
    Some(KissFrame {
        chan: (type_byte & 0xF0) >> 4,
        command: KissCommand::from_nibble(type_byte & 0x0F),
        payload: unstuffed[1..].to_vec(),
    })
}

/// Decode a [`KissCommand::Data`] frame's payload as an AX.25 packet.
pub fn decode_packet(frame: &KissFrame) -> Result<Packet, TncError> {
    if frame.command != KissCommand::Data {
        return Err(Ax25Error::InvalidFrame("not a KISS data frame".to_string()).into());
    }
    Ok(Packet::from_ax25_bytes(&frame.payload)?)
}

/// Incremental framer for a byte stream (serial port or TCP socket): feed
/// bytes as they arrive, get back every complete frame found so far.
/// KISS frames are `FEND`-delimited; a run of consecutive `FEND`s is
/// just empty frames and skipped, matching common TNC firmware behavior.
#[derive(Debug, Default)]
pub struct KissDecoder {
    buf: Vec<u8>,
    in_frame: bool,
}

impl KissDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<KissFrame> {
        let mut frames = Vec::new();
        for &b in bytes {
            if b == FEND {
                if self.in_frame && !self.buf.is_empty() {
                    if let Some(frame) = decode(&self.buf) {
                        frames.push(frame);
                    }
                }
                self.buf.clear();
                self.in_frame = true;
            } else if self.in_frame {
                self.buf.push(b);
            }
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plain_payload() {
        let frame = KissFrame {
            chan: 0,
            command: KissCommand::Data,
            payload: vec![1, 2, 3, 4],
        };
        let encoded = encode(&frame);
        assert_eq!(encoded.first(), Some(&FEND));
        assert_eq!(encoded.last(), Some(&FEND));
        let decoded = decode(&encoded[1..encoded.len() - 1]).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn stuffs_fend_and_fesc_bytes() {
        let frame = KissFrame {
            chan: 2,
            command: KissCommand::Data,
            payload: vec![FEND, FESC, 0x55],
        };
        let encoded = encode(&frame);
        // type byte 0x20, then FESC TFEND, FESC TFESC, 0x55
        assert_eq!(&encoded[2..], &[FESC, TFEND, FESC, TFESC, 0x55, FEND]);
        let decoded = decode(&encoded[1..encoded.len() - 1]).unwrap();
        assert_eq!(decoded.payload, vec![FEND, FESC, 0x55]);
        assert_eq!(decoded.chan, 2);
    }

    #[test]
    fn decoder_splits_stream_into_frames() {
        let mut decoder = KissDecoder::new();
        let frame_a = KissFrame { chan: 0, command: KissCommand::Data, payload: vec![0xAA] };
        let frame_b = KissFrame { chan: 1, command: KissCommand::Data, payload: vec![0xBB, 0xCC] };
        let mut stream = encode(&frame_a);
        stream.extend(encode(&frame_b));

        let frames = decoder.feed(&stream);
        assert_eq!(frames, vec![frame_a, frame_b]);
    }

    #[test]
    fn decoder_handles_bytes_arriving_in_pieces() {
        let mut decoder = KissDecoder::new();
        let frame = KissFrame { chan: 0, command: KissCommand::Data, payload: vec![1, 2, 3] };
        let stream = encode(&frame);
        let (first, second) = stream.split_at(stream.len() / 2);
        assert!(decoder.feed(first).is_empty());
        let frames = decoder.feed(second);
        assert_eq!(frames, vec![frame]);
    }

    #[test]
    fn encode_packet_decode_packet_roundtrip() {
        let packet = Packet::new_ui("W1ABC".parse().unwrap(), "APRS".parse().unwrap(), b"test".to_vec());
        let bytes = encode_packet(3, &packet);
        let frame = decode(&bytes[1..bytes.len() - 1]).unwrap();
        assert_eq!(frame.chan, 3);
        let decoded = decode_packet(&frame).unwrap();
        assert_eq!(decoded.source.callsign, "W1ABC");
    }

    #[test]
    fn non_data_command_rejected_by_decode_packet() {
        let frame = KissFrame { chan: 0, command: KissCommand::TxDelay, payload: vec![50] };
        assert!(decode_packet(&frame).is_err());
    }
}
