//! AX.25 UI-frame packet model, TNC2 text codec, and third-party wrapping.
//!
//! A [`Packet`] owns its addresses and info field outright — per the
//! concurrency model, packets move between queues rather than being shared,
//! so there is no reference counting here, just plain ownership.

use crate::address::Address;
use crate::errors::Ax25Error;

/// Control byte for an unnumbered-information frame. The engine only ever
/// handles UI traffic (APRS), never numbered I/S frames.
pub const UI_CONTROL: u8 = 0x03;
/// PID for "no layer 3" — the overwhelming majority of APRS traffic.
pub const PID_NO_LAYER3: u8 = 0xF0;

pub const MAX_REPEATERS: usize = 8;

/// An AX.25 UI frame: one source, one destination, up to 8 digipeater
/// addresses, and an information field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub source: Address,
    pub destination: Address,
    pub repeaters: Vec<Address>,
    pub control: u8,
    pub pid: u8,
    pub info: Vec<u8>,
}

impl Packet {
    pub fn new_ui(source: Address, destination: Address, info: Vec<u8>) -> Self {
        Self {
            source,
            destination,
            repeaters: Vec::new(),
            control: UI_CONTROL,
            pid: PID_NO_LAYER3,
            info,
        }
    }

    pub fn with_repeaters(mut self, repeaters: Vec<Address>) -> Result<Self, Ax25Error> {
        if repeaters.len() > MAX_REPEATERS {
            return Err(Ax25Error::TooManyRepeaters(repeaters.len()));
        }
        self.repeaters = repeaters;
        Ok(self)
    }

    /// Index of the first repeater address with `h_bit == false`, i.e. the
    /// next hop that hasn't repeated this frame yet. `None` if the path is
    /// empty or fully used.
    pub fn next_unused_repeater(&self) -> Option<usize> {
        self.repeaters.iter().position(|a| !a.h_bit)
    }

    /// Encode the AX.25 header + info (destination, source, repeaters,
    /// control, PID, info) as plain bytes, with no FCS, flags, bit-stuffing,
    /// or NRZI — those are the HDLC transmitter's job.
    pub fn to_ax25_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(7 * (2 + self.repeaters.len()) + 2 + self.info.len());
        // Destination is never the last address (source always follows).
        out.extend_from_slice(&self.destination.encode(false));
        out.extend_from_slice(&self.source.encode(self.repeaters.is_empty()));
        for (i, rep) in self.repeaters.iter().enumerate() {
            let is_last = i + 1 == self.repeaters.len();
            out.extend_from_slice(&rep.encode(is_last));
        }
        out.push(self.control);
        out.push(self.pid);
        out.extend_from_slice(&self.info);
        out
    }

    /// Decode an AX.25 header + info byte sequence (post-FCS-validation,
    /// post-destuffing) into a `Packet`.
    pub fn from_ax25_bytes(bytes: &[u8]) -> Result<Self, Ax25Error> {
        if bytes.len() < 15 {
            // 2 addresses (14) + control, minimum before PID/info.
            return Err(Ax25Error::MisalignedAddressField(bytes.len()));
        }
        let (destination, _) = Address::decode(&bytes[0..7])?;
        let (source, mut ext) = Address::decode(&bytes[7..14])?;
        let mut offset = 14;
        let mut repeaters = Vec::new();
        while !ext {
            if offset + 7 > bytes.len() {
                return Err(Ax25Error::MissingEndOfAddress);
            }
            let (addr, next_ext) = Address::decode(&bytes[offset..offset + 7])?;
            repeaters.push(addr);
            offset += 7;
            ext = next_ext;
            if repeaters.len() > MAX_REPEATERS {
                return Err(Ax25Error::TooManyRepeaters(repeaters.len()));
            }
        }

        if offset + 2 > bytes.len() {
            return Err(Ax25Error::MisalignedAddressField(bytes.len()));
        }
        let control = bytes[offset];
        let pid = bytes[offset + 1];
        if control != UI_CONTROL {
            return Err(Ax25Error::NotUiFrame(control));
        }
        let info = bytes[offset + 2..].to_vec();

        Ok(Packet {
            source,
            destination,
            repeaters,
            control,
            pid,
            info,
        })
    }

    /// Info field with trailing CR/LF/whitespace removed, used by the
    /// duplicate-cache CRC (§3 "Duplicate cache", §8 dedupe CRC invariant).
    pub fn info_trimmed(&self) -> &[u8] {
        let mut end = self.info.len();
        while end > 0 && self.info[end - 1].is_ascii_whitespace() {
            end -= 1;
        }
        &self.info[..end]
    }

    /// The via-path rendered as TNC2 text: `WIDE1-1,WIDE2-2*,...`.
    pub fn via_path_text(&self) -> String {
        self.repeaters
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Render as TNC2 text: `SRC>DEST,via1,via2,...:INFO` (no trailing
    /// CR/LF — callers append the wire-specific terminator).
    pub fn to_tnc2(&self) -> String {
        let mut s = format!("{}>{}", self.source, self.destination);
        if !self.repeaters.is_empty() {
            s.push(',');
            s.push_str(&self.via_path_text());
        }
        s.push(':');
        s.push_str(&String::from_utf8_lossy(&self.info));
        s
    }

    /// Parse TNC2 text of the form `SRC>DEST[,VIA...]:INFO`. Permissive
    /// about via addresses: anything that isn't a valid `CALL[-SSID][*]`
    /// token is rejected, but q-construct tokens like `qAR` or `qAO` parse
    /// fine since they're just alphanumeric with no SSID.
    pub fn from_tnc2(line: &str) -> Result<Self, Ax25Error> {
        let (header, info) = line
            .split_once(':')
            .ok_or_else(|| Ax25Error::InvalidTnc2(line.to_string()))?;
        let (src_dest, via) = match header.split_once(',') {
            Some((sd, v)) => (sd, Some(v)),
            None => (header, None),
        };
        let (src, dest) = src_dest
            .split_once('>')
            .ok_or_else(|| Ax25Error::InvalidTnc2(line.to_string()))?;
        let source: Address = src.parse()?;
        let destination: Address = dest.parse()?;
        let mut repeaters = Vec::new();
        if let Some(via) = via {
            for token in via.split(',') {
                if token.is_empty() {
                    continue;
                }
                repeaters.push(token.parse()?);
            }
        }
        Ok(Packet {
            source,
            destination,
            repeaters,
            control: UI_CONTROL,
            pid: PID_NO_LAYER3,
            info: info.as_bytes().to_vec(),
        })
    }
}

/// Addresses that mark a packet as already having traversed the Internet —
/// an RF→IS relay must never re-gate one of these (§4.5 step 4, scenario 3).
pub const NON_RF_VIA_TOKENS: [&str; 4] = ["TCPIP", "TCPXX", "RFONLY", "NOGATE"];

pub fn via_is_non_rf(callsign: &str) -> bool {
    NON_RF_VIA_TOKENS.contains(&callsign)
}

pub mod third_party {
    //! Recursive unwrap/rewrap of AX.25 third-party (`}`) payloads, shared
    //! by the digipeater-to-IGate handoff and the IGate IS→RF path.

    use super::Packet;
    use crate::errors::Ax25Error;

    /// True if the info field's data-type indicator is `}`.
    pub fn is_third_party(packet: &Packet) -> bool {
        packet.info.first() == Some(&b'}')
    }

    /// Strip the leading `}` and parse the remaining TNC2 text as the
    /// encapsulated packet. Recurses if the inner packet is itself
    /// third-party.
    pub fn unwrap(packet: &Packet) -> Result<Packet, Ax25Error> {
        if !is_third_party(packet) {
            return Err(Ax25Error::NotThirdParty);
        }
        let inner_text = String::from_utf8_lossy(&packet.info[1..]).to_string();
        let inner = Packet::from_tnc2(&inner_text)?;
        if is_third_party(&inner) {
            return unwrap(&inner);
        }
        Ok(inner)
    }

    /// Wrap `inner` as a third-party payload originated by `source` with
    /// the given destination and via path, per §4.5 step 7:
    /// `SOURCE>DEST,via:}inner_tnc2`.
    pub fn wrap(
        source: super::Address,
        destination: super::Address,
        via: Vec<super::Address>,
        inner: &Packet,
    ) -> Result<Packet, Ax25Error> {
        let mut info = Vec::with_capacity(inner.to_tnc2().len() + 1);
        info.push(b'}');
        info.extend_from_slice(inner.to_tnc2().as_bytes());
        Packet::new_ui(source, destination, info).with_repeaters(via)
    }
}

/// Minimal Mic-E detector: Mic-E position packets encode part of the
/// position into the *destination* address using a restricted character
/// set (digits, and uppercase letters A-L/N-Z in place of digits to signal
/// north/south/east/west and ambiguity), and the DTI is one of a small set
/// of control characters rather than a printable APRS data type. Full
/// Mic-E position decoding is out of scope; this only answers "is this
/// Mic-E" for the filter engine's `u/` primitive.
pub fn is_mic_e(packet: &Packet) -> bool {
    let dti = match packet.info.first() {
        Some(&b) => b,
        None => return false,
    };
    if !matches!(dti, 0x1c | 0x1d | b'\'' | b'`') {
        return false;
    }
    let call = packet.destination.callsign.as_bytes();
    if call.is_empty() || call.len() > 6 {
        return false;
    }
    call.iter()
        .all(|&c| c.is_ascii_digit() || (c.is_ascii_uppercase() && c != b'O' && c != b'I'))
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
        .with_repeaters(vec!["WIDE2-2".parse().unwrap()])
        .unwrap()
    }

    #[test]
    fn ax25_bytes_roundtrip() {
        let pkt = sample();
        let bytes = pkt.to_ax25_bytes();
        let decoded = Packet::from_ax25_bytes(&bytes).unwrap();
        assert_eq!(decoded, pkt);
    }

    #[test]
    fn tnc2_roundtrip() {
        let pkt = sample();
        let text = pkt.to_tnc2();
        assert_eq!(text, "W1ABC>APRS,WIDE2-2:!4237.14N/07120.83W-test");
        let parsed = Packet::from_tnc2(&text).unwrap();
        assert_eq!(parsed, pkt);
    }

    #[test]
    fn info_trimmed_strips_trailing_whitespace() {
        let pkt = Packet::new_ui(
            "W1ABC".parse().unwrap(),
            "APRS".parse().unwrap(),
            b"hello \r\n".to_vec(),
        );
        assert_eq!(pkt.info_trimmed(), b"hello");
    }

    #[test]
    fn third_party_wrap_unwrap_roundtrip() {
        let inner = sample();
        let wrapped = third_party::wrap(
            "MYCALL".parse().unwrap(),
            "APDW17".parse().unwrap(),
            vec!["WIDE1-1".parse().unwrap()],
            &inner,
        )
        .unwrap();
        assert!(third_party::is_third_party(&wrapped));
        let unwrapped = third_party::unwrap(&wrapped).unwrap();
        assert_eq!(unwrapped, inner);
    }

    #[test]
    fn scenario_igate_is_to_rf_wrap() {
        // §8 scenario 5.
        let wrapped = third_party::wrap(
            "MYCALL".parse().unwrap(),
            "APDW17".parse().unwrap(),
            vec!["WIDE1-1".parse().unwrap()],
            &Packet::from_tnc2("K1USN-1>APWW10,TCPIP,MYCALL*:T#479,100,048,002,500,000,10000000")
                .unwrap(),
        )
        .unwrap();
        assert_eq!(
            wrapped.to_tnc2(),
            "MYCALL>APDW17,WIDE1-1:}K1USN-1>APWW10,TCPIP,MYCALL*:T#479,100,048,002,500,000,10000000"
        );
    }

    #[test]
    fn mic_e_destination_detected() {
        let pkt = Packet::new_ui(
            "W1ABC".parse().unwrap(),
            "T6PRSV".parse().unwrap(),
            vec![0x60, b'x'],
        );
        assert!(is_mic_e(&pkt));
    }

    #[test]
    fn non_mic_e_position_not_detected() {
        let pkt = sample();
        assert!(!is_mic_e(&pkt));
    }

    #[test]
    fn via_non_rf_tokens() {
        assert!(via_is_non_rf("TCPIP"));
        assert!(!via_is_non_rf("WIDE1"));
    }
}
