//! DCI Payload Packing
//!
//! Bit-level packing of the DCI format 1_0 variants the DL scheduler
//! emits, following TS 38.212 Section 7.3.1.2.1. Payloads are built MSB
//! first; the frequency-domain field width derives from the bandwidth
//! part size.

use bytes::Bytes;
use common::utils::pack_bits;

use crate::scheduler::result::{
    Dci10CRntiConfig, Dci10PRntiConfig, Dci10RaRntiConfig, Dci10SiRntiConfig, DciDlInfo,
};

/// Packed DCI bits in transmission order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DciPayload {
    bits: Vec<bool>,
}

impl DciPayload {
    /// Append `nof_bits` of `value`, MSB first
    fn push_bits(&mut self, value: u32, nof_bits: u8) {
        for i in (0..nof_bits).rev() {
            self.bits.push((value >> i) & 1 != 0);
        }
    }

    /// Read `nof_bits` starting at `offset`, MSB first
    fn extract_bits(&self, offset: usize, nof_bits: u8) -> u32 {
        let mut value = 0;
        for i in 0..nof_bits as usize {
            value = (value << 1) | self.bits[offset + i] as u32;
        }
        value
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Byte-packed payload for the PHY, zero-padded in the last byte
    pub fn to_bytes(&self) -> Bytes {
        pack_bits(&self.bits)
    }
}

/// Width of the frequency domain resource assignment field:
/// ceil(log2(N * (N + 1) / 2)) bits.
fn freq_resource_bits(n_rb_bwp: u16) -> u8 {
    let n = n_rb_bwp as u32;
    let values = n * (n + 1) / 2;
    (32 - (values - 1).leading_zeros()) as u8
}

/// Pack DCI 1_0 with CRC scrambled by SI-RNTI
pub fn dci_1_0_si_rnti_pack(cfg: &Dci10SiRntiConfig) -> DciPayload {
    let mut payload = DciPayload::default();
    payload.push_bits(cfg.frequency_resource as u32, freq_resource_bits(cfg.n_rb_bwp));
    payload.push_bits(cfg.time_resource as u32, 4);
    payload.push_bits(cfg.vrb_to_prb_mapping as u32, 1);
    payload.push_bits(cfg.mcs_index as u32, 5);
    payload.push_bits(cfg.redundancy_version as u32, 2);
    payload.push_bits(cfg.system_information_indicator as u32, 1);
    // Reserved bits.
    payload.push_bits(0, 15);
    payload
}

/// Unpack a DCI 1_0 SI-RNTI payload produced by [`dci_1_0_si_rnti_pack`]
pub fn dci_1_0_si_rnti_unpack(payload: &DciPayload, n_rb_bwp: u16) -> Dci10SiRntiConfig {
    let freq_bits = freq_resource_bits(n_rb_bwp);
    let mut offset = 0;
    let mut take = |nof_bits: u8| {
        let v = payload.extract_bits(offset, nof_bits);
        offset += nof_bits as usize;
        v
    };
    Dci10SiRntiConfig {
        n_rb_bwp,
        frequency_resource: take(freq_bits) as u16,
        time_resource: take(4) as u8,
        vrb_to_prb_mapping: take(1) != 0,
        mcs_index: take(5) as u8,
        redundancy_version: take(2) as u8,
        system_information_indicator: take(1) as u8,
    }
}

/// Pack DCI 1_0 with CRC scrambled by RA-RNTI
pub fn dci_1_0_ra_rnti_pack(cfg: &Dci10RaRntiConfig) -> DciPayload {
    let mut payload = DciPayload::default();
    payload.push_bits(cfg.frequency_resource as u32, freq_resource_bits(cfg.n_rb_bwp));
    payload.push_bits(cfg.time_resource as u32, 4);
    payload.push_bits(cfg.vrb_to_prb_mapping as u32, 1);
    payload.push_bits(cfg.mcs_index as u32, 5);
    payload.push_bits(cfg.tb_scaling as u32, 2);
    // Reserved bits.
    payload.push_bits(0, 16);
    payload
}

/// Pack DCI 1_0 with CRC scrambled by P-RNTI
pub fn dci_1_0_p_rnti_pack(cfg: &Dci10PRntiConfig) -> DciPayload {
    let mut payload = DciPayload::default();
    payload.push_bits(cfg.short_messages_indicator as u32, 2);
    payload.push_bits(cfg.short_messages as u32, 8);
    payload.push_bits(cfg.frequency_resource as u32, freq_resource_bits(cfg.n_rb_bwp));
    payload.push_bits(cfg.time_resource as u32, 4);
    payload.push_bits(cfg.vrb_to_prb_mapping as u32, 1);
    payload.push_bits(cfg.mcs_index as u32, 5);
    payload.push_bits(cfg.tb_scaling as u32, 2);
    // Reserved bits.
    payload.push_bits(0, 6);
    payload
}

/// Pack DCI 1_0 with CRC scrambled by C-RNTI
pub fn dci_1_0_c_rnti_pack(cfg: &Dci10CRntiConfig) -> DciPayload {
    let mut payload = DciPayload::default();
    // DCI format identifier: 1 indicates a DL format.
    payload.push_bits(1, 1);
    payload.push_bits(cfg.frequency_resource as u32, freq_resource_bits(cfg.n_rb_bwp));
    payload.push_bits(cfg.time_resource as u32, 4);
    payload.push_bits(cfg.vrb_to_prb_mapping as u32, 1);
    payload.push_bits(cfg.mcs_index as u32, 5);
    payload.push_bits(cfg.new_data_indicator as u32, 1);
    payload.push_bits(cfg.redundancy_version as u32, 2);
    payload.push_bits(cfg.harq_process_id as u32, 4);
    payload.push_bits(cfg.dai as u32, 2);
    payload.push_bits(cfg.tpc as u32, 2);
    payload.push_bits(cfg.pucch_resource as u32, 3);
    payload.push_bits(cfg.harq_feedback_timing as u32, 3);
    payload
}

/// Encode the DCI of a DL PDCCH by its RNTI configuration type.
pub fn encode_dci(dci: &DciDlInfo) -> DciPayload {
    match dci {
        DciDlInfo::SiF10(cfg) => dci_1_0_si_rnti_pack(cfg),
        DciDlInfo::RaF10(cfg) => dci_1_0_ra_rnti_pack(cfg),
        DciDlInfo::PF10(cfg) => dci_1_0_p_rnti_pack(cfg),
        DciDlInfo::UeF10(cfg) => dci_1_0_c_rnti_pack(cfg),
    }
}
