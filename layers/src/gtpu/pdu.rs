//! GTP-U Wire Format
//!
//! Minimal GTP-U v1 header handling (TS 29.281): the demux only needs
//! the TEID; the tunnel adapter additionally strips the header chain to
//! reach the T-PDU.

use common::types::Teid;
use tracing::debug;

/// UDP port GTP-U is served on
pub const GTPU_PORT: u16 = 2152;

/// Message type of a G-PDU (carries a T-PDU)
pub const GTPU_MSG_TYPE_GPDU: u8 = 0xFF;

/// Mandatory GTP-U header length
pub const GTPU_BASE_HEADER_LEN: usize = 8;

/// Length of the optional field block present when any of E/S/PN is set
const GTPU_OPT_FIELDS_LEN: usize = 4;

/// Read the TEID of a GTP-U v1 PDU. Validates the version and protocol
/// type bits and the minimum length; anything else is left to the
/// tunnel.
pub fn gtpu_read_teid(pdu: &[u8]) -> Option<Teid> {
    if pdu.len() < GTPU_BASE_HEADER_LEN {
        debug!("GTP-U PDU shorter than mandatory header: {} bytes", pdu.len());
        return None;
    }
    // Version must be 1 and PT must indicate GTP (not GTP').
    if pdu[0] >> 5 != 1 {
        debug!("Unsupported GTP-U version: {}", pdu[0] >> 5);
        return None;
    }
    if pdu[0] & 0x10 == 0 {
        debug!("GTP' protocol type not supported");
        return None;
    }
    Some(Teid(u32::from_be_bytes([pdu[4], pdu[5], pdu[6], pdu[7]])))
}

/// Offset of the T-PDU behind the header chain of a G-PDU, or `None` if
/// the PDU is malformed or not a G-PDU.
pub fn gtpu_tpdu_offset(pdu: &[u8]) -> Option<usize> {
    gtpu_read_teid(pdu)?;
    if pdu[1] != GTPU_MSG_TYPE_GPDU {
        debug!("Not a G-PDU: message type {:#04x}", pdu[1]);
        return None;
    }

    // Without E/S/PN flags the T-PDU follows the mandatory header.
    if pdu[0] & 0x07 == 0 {
        return Some(GTPU_BASE_HEADER_LEN);
    }

    // Optional sequence number / N-PDU number / next extension type.
    let mut offset = GTPU_BASE_HEADER_LEN + GTPU_OPT_FIELDS_LEN;
    if pdu.len() < offset {
        return None;
    }
    let mut next_ext = pdu[offset - 1];

    // Walk the extension header chain; each length unit is 4 bytes.
    while next_ext != 0 {
        let ext_len = 4 * (*pdu.get(offset)? as usize);
        if ext_len == 0 {
            return None;
        }
        offset += ext_len;
        next_ext = *pdu.get(offset - 1)?;
    }
    Some(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gpdu(teid: u32, payload: &[u8]) -> Vec<u8> {
        let mut pdu = vec![0x30, GTPU_MSG_TYPE_GPDU, 0, payload.len() as u8];
        pdu.extend_from_slice(&teid.to_be_bytes());
        pdu.extend_from_slice(payload);
        pdu
    }

    #[test]
    fn test_read_teid() {
        let pdu = gpdu(0xDEADBEEF, &[1, 2, 3]);
        assert_eq!(gtpu_read_teid(&pdu), Some(Teid(0xDEADBEEF)));
    }

    #[test]
    fn test_read_teid_rejects_short_pdu() {
        assert_eq!(gtpu_read_teid(&[0x30, 0xFF, 0, 0]), None);
    }

    #[test]
    fn test_read_teid_rejects_wrong_version() {
        let mut pdu = gpdu(1, &[]);
        pdu[0] = 0x50; // version 2
        assert_eq!(gtpu_read_teid(&pdu), None);
    }

    #[test]
    fn test_read_teid_rejects_gtp_prime() {
        let mut pdu = gpdu(1, &[]);
        pdu[0] = 0x20; // PT = 0
        assert_eq!(gtpu_read_teid(&pdu), None);
    }

    #[test]
    fn test_tpdu_offset_without_options() {
        let pdu = gpdu(7, &[0xAA, 0xBB]);
        assert_eq!(gtpu_tpdu_offset(&pdu), Some(8));
    }

    #[test]
    fn test_tpdu_offset_with_sequence_number() {
        let mut pdu = gpdu(7, &[]);
        pdu[0] |= 0x02; // S flag
        pdu.extend_from_slice(&[0x00, 0x01, 0x00, 0x00]); // seq, n-pdu, next-ext = 0
        pdu.extend_from_slice(&[0xAA]);
        assert_eq!(gtpu_tpdu_offset(&pdu), Some(12));
    }

    #[test]
    fn test_tpdu_offset_with_extension_header() {
        let mut pdu = gpdu(7, &[]);
        pdu[0] |= 0x04; // E flag
        pdu.extend_from_slice(&[0x00, 0x00, 0x00, 0x85]); // next-ext = PDU session container
        pdu.extend_from_slice(&[0x01, 0x00, 0x00, 0x00]); // 4-byte extension, next-ext = 0
        pdu.extend_from_slice(&[0xAA]);
        assert_eq!(gtpu_tpdu_offset(&pdu), Some(16));
    }

    #[test]
    fn test_tpdu_offset_rejects_non_gpdu() {
        let mut pdu = gpdu(7, &[]);
        pdu[1] = 0x01; // echo request
        assert_eq!(gtpu_tpdu_offset(&pdu), None);
    }

    #[test]
    fn test_tpdu_offset_rejects_truncated_extension() {
        let mut pdu = gpdu(7, &[]);
        pdu[0] |= 0x04;
        pdu.extend_from_slice(&[0x00, 0x00, 0x00, 0x85]); // announces an extension that is missing
        assert_eq!(gtpu_tpdu_offset(&pdu), None);
    }
}
