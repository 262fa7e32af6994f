//! SSB PDU Assembly
//!
//! Expands a scheduler SSB entry into the full PHY-layer SSB PDU,
//! combining the per-slot scheduling info with the cell's static SSB and
//! MIB parameters.

use common::types::{Pci, SubcarrierSpacing};

use super::MacCellCreationRequest;
use crate::scheduler::result::SsbInformation;

/// PSS power profile relative to SSS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BetaPssProfile {
    Db0,
    Db3,
}

/// SSB time-domain pattern case, TS 38.213 Section 4.1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsbCase {
    A,
    B,
    C,
}

/// First DMRS position of PDSCH/PUSCH type A mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmrsTypeAPosition {
    Pos2,
    Pos3,
}

/// MIB content carried in the BCH payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsbMibDataPdu {
    pub dmrs_type_a_position: DmrsTypeAPosition,
    pub pdcch_config_sib1: u8,
    pub cell_barred: bool,
    pub intra_freq_reselection: bool,
}

/// Complete SSB PDU handed to the PHY
#[derive(Debug, Clone)]
pub struct DlSsbPdu {
    pub pci: Pci,
    pub beta_pss_profile: BetaPssProfile,
    pub ssb_index: u8,
    pub ssb_subcarrier_offset: u8,
    pub offset_to_point_a: u16,
    pub ssb_case: SsbCase,
    pub scs: SubcarrierSpacing,
    pub l_max: u8,
    pub mib_data: SsbMibDataPdu,
}

/// Fills SSB PDUs from the cell configuration
pub struct SsbHelper {
    pci: Pci,
    scs: SubcarrierSpacing,
    ssb_subcarrier_offset: u8,
    offset_to_point_a: u16,
    beta_pss_profile: BetaPssProfile,
    ssb_case: SsbCase,
    l_max: u8,
    mib_data: SsbMibDataPdu,
}

impl SsbHelper {
    pub fn new(cell_cfg: &MacCellCreationRequest) -> Self {
        Self {
            pci: cell_cfg.pci,
            scs: cell_cfg.scs,
            ssb_subcarrier_offset: cell_cfg.ssb_cfg.ssb_subcarrier_offset,
            offset_to_point_a: cell_cfg.ssb_cfg.offset_to_point_a,
            beta_pss_profile: cell_cfg.ssb_cfg.beta_pss_profile,
            ssb_case: cell_cfg.ssb_cfg.ssb_case,
            l_max: cell_cfg.ssb_cfg.l_max,
            mib_data: SsbMibDataPdu {
                dmrs_type_a_position: cell_cfg.mib.dmrs_type_a_position,
                pdcch_config_sib1: cell_cfg.mib.pdcch_config_sib1,
                cell_barred: cell_cfg.mib.cell_barred,
                intra_freq_reselection: cell_cfg.mib.intra_freq_reselection,
            },
        }
    }

    /// Assemble the PHY SSB PDU for one scheduled SSB occasion.
    pub fn assemble_ssb(&self, ssb_info: &SsbInformation) -> DlSsbPdu {
        DlSsbPdu {
            pci: self.pci,
            beta_pss_profile: self.beta_pss_profile,
            ssb_index: ssb_info.ssb_index,
            ssb_subcarrier_offset: self.ssb_subcarrier_offset,
            offset_to_point_a: self.offset_to_point_a,
            ssb_case: self.ssb_case,
            scs: self.scs,
            l_max: self.l_max,
            mib_data: self.mib_data.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::{MacMibConfig, MacSsbConfig};
    use bytes::Bytes;
    use common::types::CellIndex;

    fn cell_cfg() -> MacCellCreationRequest {
        MacCellCreationRequest {
            cell_index: CellIndex(0),
            pci: Pci(42),
            scs: SubcarrierSpacing::Scs15,
            ssb_cfg: MacSsbConfig {
                ssb_subcarrier_offset: 6,
                offset_to_point_a: 12,
                beta_pss_profile: BetaPssProfile::Db0,
                ssb_case: SsbCase::A,
                l_max: 4,
            },
            mib: MacMibConfig {
                dmrs_type_a_position: DmrsTypeAPosition::Pos2,
                pdcch_config_sib1: 1,
                cell_barred: false,
                intra_freq_reselection: true,
            },
            bcch_dl_sch_payload: Bytes::new(),
        }
    }

    #[test]
    fn test_assemble_ssb_combines_static_and_scheduled_fields() {
        let helper = SsbHelper::new(&cell_cfg());
        let pdu = helper.assemble_ssb(&SsbInformation {
            ssb_index: 3,
            start_symbol: 2,
        });

        assert_eq!(pdu.pci, Pci(42));
        assert_eq!(pdu.ssb_index, 3);
        assert_eq!(pdu.ssb_subcarrier_offset, 6);
        assert_eq!(pdu.offset_to_point_a, 12);
        assert_eq!(pdu.l_max, 4);
        assert_eq!(pdu.mib_data.pdcch_config_sib1, 1);
        assert!(!pdu.mib_data.cell_barred);
    }
}
