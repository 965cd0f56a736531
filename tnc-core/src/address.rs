//! AX.25 address encoding: the 7-byte shifted-ASCII address field used for
//! source, destination, and the up to 8 digipeater addresses in a UI frame.

use crate::errors::Ax25Error;

/// One AX.25 address: a callsign, an SSID, and (for digipeater addresses)
/// the "has-been-repeated" bit.
///
/// The two reserved bits (AX.25 calls them the `RR` bits, always 1 on
/// transmit per the spec used here) are not modeled — they are fixed at 1
/// on encode and ignored on decode, matching real-world TNC behavior.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    /// 1-6 uppercase alphanumeric characters, no padding.
    pub callsign: String,
    /// Secondary Station Identifier, 0..=15.
    pub ssid: u8,
    /// For digipeater addresses: has this hop already repeated the frame?
    /// Meaningless (but still encoded/decoded) for source/destination.
    pub h_bit: bool,
}

const ADDRESS_LEN: usize = 7;

impl Address {
    pub fn new(callsign: &str, ssid: u8) -> Result<Self, Ax25Error> {
        Self::validate_callsign(callsign)?;
        if ssid > 15 {
            return Err(Ax25Error::InvalidSsid(ssid));
        }
        Ok(Self {
            callsign: callsign.to_uppercase(),
            ssid,
            h_bit: false,
        })
    }

    pub fn with_h_bit(mut self, h_bit: bool) -> Self {
        self.h_bit = h_bit;
        self
    }

    fn validate_callsign(callsign: &str) -> Result<(), Ax25Error> {
        if callsign.is_empty()
            || callsign.len() > 6
            || !callsign.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(Ax25Error::InvalidCallsign(callsign.to_string()));
        }
        Ok(())
    }

    /// Encode as 7 bytes: 6 space-padded shifted-ASCII characters followed
    /// by the SSID octet. `extension_bit` is the low bit of the last byte
    /// (1 only for the final address in the field).
    pub fn encode(&self, extension_bit: bool) -> [u8; ADDRESS_LEN] {
        let mut out = [0u8; ADDRESS_LEN];
        let padded = format!("{:<6}", self.callsign);
        for (i, c) in padded.chars().enumerate() {
            out[i] = (c as u8) << 1;
        }
        let ssid_octet = 0b0110_0000 // reserved RR bits
            | ((self.ssid & 0x0F) << 1)
            | if self.h_bit { 0x80 } else { 0 }
            | if extension_bit { 0x01 } else { 0 };
        out[6] = ssid_octet;
        out
    }

    /// Decode one 7-byte address field. Returns the address and whether
    /// the extension (end-of-address) bit was set.
    pub fn decode(bytes: &[u8]) -> Result<(Self, bool), Ax25Error> {
        if bytes.len() != ADDRESS_LEN {
            return Err(Ax25Error::MisalignedAddressField(bytes.len()));
        }
        let callsign: String = bytes[..6]
            .iter()
            .map(|&b| (b >> 1) as char)
            .collect::<String>()
            .trim_end()
            .to_string();
        Self::validate_callsign(&callsign)?;
        let ssid_octet = bytes[6];
        let ssid = (ssid_octet >> 1) & 0x0F;
        let h_bit = ssid_octet & 0x80 != 0;
        let extension_bit = ssid_octet & 0x01 != 0;
        Ok((
            Self {
                callsign,
                ssid,
                h_bit,
            },
            extension_bit,
        ))
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.ssid > 0 {
            write!(f, "{}-{}", self.callsign, self.ssid)?;
        } else {
            write!(f, "{}", self.callsign)?;
        }
        if self.h_bit {
            write!(f, "*")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Address {
    type Err = Ax25Error;

    /// Parse `CALL`, `CALL-SSID`, or either form with a trailing `*`
    /// marking the has-been-repeated bit (the TNC2-text convention).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (body, h_bit) = match s.strip_suffix('*') {
            Some(stripped) => (stripped, true),
            None => (s, false),
        };
        let (callsign, ssid) = match body.split_once('-') {
            Some((call, ssid_str)) => {
                let ssid = ssid_str
                    .parse::<u8>()
                    .map_err(|_| Ax25Error::InvalidCallsign(s.to_string()))?;
                (call, ssid)
            }
            None => (body, 0),
        };
        Ok(Address::new(callsign, ssid)?.with_h_bit(h_bit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let addr = Address::new("W1ABC", 5).unwrap().with_h_bit(true);
        let bytes = addr.encode(true);
        let (decoded, ext) = Address::decode(&bytes).unwrap();
        assert_eq!(decoded, addr);
        assert!(ext);
    }

    #[test]
    fn short_callsign_is_space_padded() {
        let addr = Address::new("W1AW", 0).unwrap();
        let bytes = addr.encode(false);
        assert_eq!(bytes[4] >> 1, b' ');
    }

    #[test]
    fn rejects_ssid_over_15() {
        assert!(Address::new("W1ABC", 16).is_err());
    }

    #[test]
    fn rejects_non_alphanumeric() {
        assert!(Address::new("W1-BC", 0).is_err());
    }

    #[test]
    fn display_and_parse_roundtrip() {
        let addr: Address = "WIDE1-1*".parse().unwrap();
        assert_eq!(addr.callsign, "WIDE1");
        assert_eq!(addr.ssid, 1);
        assert!(addr.h_bit);
        assert_eq!(addr.to_string(), "WIDE1-1*");
    }

    #[test]
    fn display_without_ssid_or_h_bit() {
        let addr = Address::new("APRS", 0).unwrap();
        assert_eq!(addr.to_string(), "APRS");
    }
}
