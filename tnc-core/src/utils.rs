//! Small bit-level helpers shared by the HDLC, KISS, and address codecs.

/// Pack MSB-first bits into bytes, padding the final byte with zero bits.
pub fn pack_bits(bits: &[u8]) -> Vec<u8> {
    bits.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |acc, (i, &b)| acc | ((b & 1) << (7 - i)))
        })
        .collect()
}

/// Unpack bytes into MSB-first bits.
pub fn unpack_bits(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .flat_map(|byte| (0..8).rev().map(move |shift| (byte >> shift) & 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_roundtrip() {
        let bytes = [0xA5u8, 0x3C, 0xFF];
        let bits = unpack_bits(&bytes);
        assert_eq!(bits.len(), 24);
        assert_eq!(pack_bits(&bits), bytes);
    }

    #[test]
    fn pack_pads_final_byte() {
        let bits = [1u8, 0, 1, 1];
        assert_eq!(pack_bits(&bits), vec![0b1011_0000]);
    }
}
