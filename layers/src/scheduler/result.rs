//! Scheduling Result Model
//!
//! Per-slot, per-cell output of the scheduler consumed by the MAC DL
//! processor and forwarded to the PHY.

use common::prb::PrbGrant;
use common::types::{HarqProcessId, Lcid, Rnti};

/// Range of OFDM symbols `[start, stop)` within a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfdmSymbols {
    pub start: u8,
    pub stop: u8,
}

impl OfdmSymbols {
    pub fn new(start: u8, stop: u8) -> Self {
        assert!(start <= stop && stop <= 14, "Invalid OFDM symbol range");
        Self { start, stop }
    }

    pub fn length(&self) -> u8 {
        self.stop - self.start
    }
}

/// PDSCH allocation parameters of one DL grant
#[derive(Debug, Clone)]
pub struct PdschInformation {
    pub rnti: Rnti,
    pub prbs: PrbGrant,
    pub symbols: OfdmSymbols,
    pub mcs_index: u8,
    pub tb_size_bytes: usize,
}

/// PUSCH allocation parameters of one UL grant
#[derive(Debug, Clone)]
pub struct PuschInformation {
    pub rnti: Rnti,
    pub prbs: PrbGrant,
    pub symbols: OfdmSymbols,
    pub mcs_index: u8,
    pub new_data_indicator: bool,
    pub redundancy_version: u8,
    pub harq_id: HarqProcessId,
    pub tb_size_bytes: usize,
}

/// SSB transmission scheduled in this slot
#[derive(Debug, Clone, Copy)]
pub struct SsbInformation {
    /// SSB beam index (0-7 for FR1)
    pub ssb_index: u8,
    /// First OFDM symbol of the SSB
    pub start_symbol: u8,
}

/// Distinguishes SIB1 from the other SI messages in a BCCH grant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiIndicator {
    Sib1,
    SiMessage,
}

/// BCCH-DL-SCH grant (SIB1 or an SI message)
#[derive(Debug, Clone)]
pub struct SibInformation {
    pub si_indicator: SiIndicator,
    /// Index into the configured SI message list; `None` for SIB1
    pub si_msg_index: Option<usize>,
    pub pdsch_cfg: PdschInformation,
}

/// One MAC RAR subPDU worth of content
#[derive(Debug, Clone)]
pub struct RarUlGrant {
    /// Preamble index this response answers
    pub rapid: u8,
    /// Timing advance command, 12 bits
    pub ta: u16,
    pub tc_rnti: Rnti,
    pub freq_hopping: bool,
    /// Msg3 PUSCH frequency resource, 14 bits
    pub freq_resource: u16,
    pub time_resource: u8,
    pub mcs_index: u8,
    pub tpc: u8,
    pub csi_request: bool,
}

/// RAR allocation for one RA-RNTI
#[derive(Debug, Clone)]
pub struct RarInformation {
    pub ra_rnti: Rnti,
    pub pdsch_cfg: PdschInformation,
    pub grants: Vec<RarUlGrant>,
}

/// Paging allocation
#[derive(Debug, Clone)]
pub struct PagingInformation {
    pub ue_identity_index: u64,
    pub pdsch_cfg: PdschInformation,
}

/// DCI format 1_0 scrambled by SI-RNTI, TS 38.212 Section 7.3.1.2.1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dci10SiRntiConfig {
    /// Size of CORESET#0 in RBs, sets the frequency-resource field width
    pub n_rb_bwp: u16,
    /// Frequency domain resource assignment (RIV)
    pub frequency_resource: u16,
    pub time_resource: u8,
    pub vrb_to_prb_mapping: bool,
    pub mcs_index: u8,
    pub redundancy_version: u8,
    /// 0 for SIB1, 1 for other SI messages
    pub system_information_indicator: u8,
}

/// DCI format 1_0 scrambled by RA-RNTI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dci10RaRntiConfig {
    pub n_rb_bwp: u16,
    pub frequency_resource: u16,
    pub time_resource: u8,
    pub vrb_to_prb_mapping: bool,
    pub mcs_index: u8,
    pub tb_scaling: u8,
}

/// DCI format 1_0 scrambled by P-RNTI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dci10PRntiConfig {
    pub n_rb_bwp: u16,
    pub short_messages_indicator: u8,
    pub short_messages: u8,
    pub frequency_resource: u16,
    pub time_resource: u8,
    pub vrb_to_prb_mapping: bool,
    pub mcs_index: u8,
    pub tb_scaling: u8,
}

/// DCI format 1_0 scrambled by C-RNTI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dci10CRntiConfig {
    pub n_rb_bwp: u16,
    pub frequency_resource: u16,
    pub time_resource: u8,
    pub vrb_to_prb_mapping: bool,
    pub mcs_index: u8,
    pub new_data_indicator: bool,
    pub redundancy_version: u8,
    pub harq_process_id: u8,
    pub dai: u8,
    pub tpc: u8,
    pub pucch_resource: u8,
    pub harq_feedback_timing: u8,
}

/// DCI content of a DL PDCCH, tagged by the scrambling RNTI type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DciDlInfo {
    SiF10(Dci10SiRntiConfig),
    RaF10(Dci10RaRntiConfig),
    PF10(Dci10PRntiConfig),
    UeF10(Dci10CRntiConfig),
}

/// One allocated DL PDCCH candidate
#[derive(Debug, Clone)]
pub struct PdcchDlInformation {
    pub rnti: Rnti,
    pub ss_id: u8,
    pub aggr_lvl: u8,
    pub cce_index: u16,
    pub dci: DciDlInfo,
}

/// Broadcast portion of the DL result
#[derive(Debug, Clone, Default)]
pub struct DlBroadcastAllocation {
    pub ssb_info: Vec<SsbInformation>,
    pub sibs: Vec<SibInformation>,
}

/// Per-logical-channel share of a transport block
#[derive(Debug, Clone)]
pub struct DlMsgLcInfo {
    pub lcid: Lcid,
    pub sched_bytes: usize,
}

/// One transport block of a UE grant
#[derive(Debug, Clone)]
pub struct DlMsgTbInfo {
    pub tb_size_bytes: usize,
    pub lc_lst: Vec<DlMsgLcInfo>,
}

/// DL data grant for one UE
#[derive(Debug, Clone)]
pub struct DlMsgAlloc {
    pub crnti: Rnti,
    pub pdsch_cfg: PdschInformation,
    pub tbs: Vec<DlMsgTbInfo>,
}

/// DL half of the per-slot scheduling decision
#[derive(Debug, Clone, Default)]
pub struct DlSchedResult {
    pub bc: DlBroadcastAllocation,
    pub dl_pdcchs: Vec<PdcchDlInformation>,
    pub rar_grants: Vec<RarInformation>,
    pub paging_grants: Vec<PagingInformation>,
    pub ue_grants: Vec<DlMsgAlloc>,
}

/// One UL grant, opaque to the MAC DL path
#[derive(Debug, Clone)]
pub struct UlSchedInfo {
    pub pusch_cfg: PuschInformation,
}

/// UL half of the per-slot scheduling decision
#[derive(Debug, Clone, Default)]
pub struct UlSchedResult {
    pub puschs: Vec<UlSchedInfo>,
}

/// Complete scheduling decision for one `(slot, cell)`
#[derive(Debug, Clone, Default)]
pub struct SchedResult {
    pub dl: DlSchedResult,
    pub ul: UlSchedResult,
}
