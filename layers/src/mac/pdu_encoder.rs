//! MAC PDU Encoders
//!
//! Builds the DL-SCH payloads the cell processor hands to the PHY: the
//! BCCH (SIB) PDU padded to the granted transport block size and the MAC
//! RAR PDU per TS 38.321 Sections 6.1.5 and 6.2.3.

use bytes::{BufMut, Bytes, BytesMut};

use crate::scheduler::result::RarInformation;

/// Wraps the cell's encoded BCCH-DL-SCH payload and pads it to the
/// transport block size of each grant.
pub struct SibPduEncoder {
    payload: Bytes,
}

impl SibPduEncoder {
    pub fn new(bcch_dl_sch_payload: Bytes) -> Self {
        Self {
            payload: bcch_dl_sch_payload,
        }
    }

    /// Length of the configured payload in bytes
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Encode the SIB PDU for a grant of `tb_size_bytes`. The scheduler
    /// dimensions grants from the payload length, so a smaller TB is a
    /// contract violation.
    pub fn encode_sib_pdu(&self, tb_size_bytes: usize) -> Bytes {
        assert!(
            tb_size_bytes >= self.payload.len(),
            "SIB grant of {} bytes cannot carry a {} byte payload",
            tb_size_bytes,
            self.payload.len()
        );
        let mut pdu = BytesMut::with_capacity(tb_size_bytes);
        pdu.put_slice(&self.payload);
        pdu.resize(tb_size_bytes, 0);
        pdu.freeze()
    }
}

/// MAC RAR subheader and subPDU sizes on the DL-SCH
const RAR_SUBHEADER_LEN: usize = 1;
const RAR_PAYLOAD_LEN: usize = 7;

/// Encode the MAC RAR PDU for one RA-RNTI. Each responded preamble
/// becomes one subPDU: an E/T/RAPID subheader followed by the 7-byte MAC
/// RAR (R + 12-bit TA, 27-bit UL grant, TC-RNTI).
pub fn encode_rar_pdu(rar: &RarInformation) -> Bytes {
    let mut pdu = BytesMut::with_capacity(rar.grants.len() * (RAR_SUBHEADER_LEN + RAR_PAYLOAD_LEN));

    for (i, grant) in rar.grants.iter().enumerate() {
        let last = i + 1 == rar.grants.len();
        // E/T/RAPID subheader: E set while more subPDUs follow, T=1 for
        // a RAPID subheader.
        let mut subheader = 0x40 | (grant.rapid & 0x3F);
        if !last {
            subheader |= 0x80;
        }
        pdu.put_u8(subheader);

        // 27-bit UL grant, TS 38.213 Table 8.2-1.
        let ul_grant: u32 = ((grant.freq_hopping as u32) << 26)
            | ((grant.freq_resource as u32 & 0x3FFF) << 12)
            | ((grant.time_resource as u32 & 0xF) << 8)
            | ((grant.mcs_index as u32 & 0xF) << 4)
            | ((grant.tpc as u32 & 0x7) << 1)
            | grant.csi_request as u32;

        // R bit, 12-bit TA and the UL grant share the first five bytes.
        let ta = grant.ta & 0x0FFF;
        pdu.put_u8((ta >> 5) as u8 & 0x7F);
        pdu.put_u8(((ta & 0x1F) as u8) << 3 | ((ul_grant >> 24) as u8 & 0x07));
        pdu.put_u8((ul_grant >> 16) as u8);
        pdu.put_u8((ul_grant >> 8) as u8);
        pdu.put_u8(ul_grant as u8);

        // Temporary C-RNTI.
        pdu.put_u16(grant.tc_rnti.0);
    }

    pdu.freeze()
}
