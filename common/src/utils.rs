//! Common Utilities
//!
//! Bit-level helpers shared by the DCI packers and the transport code.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

/// Convert a byte slice to hex string for debugging
pub fn bytes_to_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Pack bits into bytes (MSB first)
pub fn pack_bits(bits: &[bool]) -> Bytes {
    let mut bytes = BytesMut::with_capacity(bits.len().div_ceil(8));

    for chunk in bits.chunks(8) {
        let mut byte = 0u8;
        for (i, &bit) in chunk.iter().enumerate() {
            if bit {
                byte |= 1 << (7 - i);
            }
        }
        bytes.put_u8(byte);
    }

    bytes.freeze()
}

/// Calculate resource blocks from bandwidth and subcarrier spacing
pub fn calculate_nrb(bandwidth_hz: u32, scs_khz: u16) -> u16 {
    // Each RB has 12 subcarriers
    const SUBCARRIERS_PER_RB: u32 = 12;

    let scs_hz = scs_khz as u32 * 1000;
    let total_subcarriers = bandwidth_hz / scs_hz;
    let nrb = total_subcarriers / SUBCARRIERS_PER_RB;

    trace!(
        "Calculated {} RBs for {}Hz bandwidth with {}kHz SCS",
        nrb,
        bandwidth_hz,
        scs_khz
    );

    nrb as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_hex() {
        let data = vec![0x12, 0x34, 0xAB, 0xCD];
        assert_eq!(bytes_to_hex(&data), "12 34 ab cd");
    }

    #[test]
    fn test_pack_bits_msb_first() {
        let bits = vec![true, false, true, false, true, false, true, false];
        let packed = pack_bits(&bits);
        assert_eq!(packed.len(), 1);
        assert_eq!(packed[0], 0xAA); // 10101010
    }

    #[test]
    fn test_pack_bits_pads_trailing_zero() {
        let bits = vec![true, true, true];
        let packed = pack_bits(&bits);
        assert_eq!(packed.len(), 1);
        assert_eq!(packed[0], 0xE0);
    }

    #[test]
    fn test_calculate_nrb() {
        // 20 MHz bandwidth with 30 kHz SCS
        assert_eq!(calculate_nrb(20_000_000, 30), 55);

        // 10 MHz bandwidth with 15 kHz SCS
        assert_eq!(calculate_nrb(10_000_000, 15), 55);
    }
}
