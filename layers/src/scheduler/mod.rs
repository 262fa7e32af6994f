//! MAC Scheduler
//!
//! The contract the MAC consumes ([`MacScheduler`]) and its reference
//! implementation. Event handlers may be called from any thread; they
//! enqueue into an internally serialized pending list that is drained at
//! the start of the next `slot_indication`, so every configuration or
//! feedback change is visible to the following slot of the affected
//! cell.

mod cell;
pub mod result;
mod si_scheduler;
pub mod support;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use common::slot_point::SlotPoint;
use common::types::{CellIndex, HarqProcessId, Lcid, Pci, Rnti, SubcarrierSpacing, UeIndex, MAX_CELLS};
use tracing::{debug, error, info, warn};

use crate::LayerError;
use cell::{CellScheduler, SchedUe};
use result::SchedResult;

/// CORESET#0 configuration based on 3GPP TS 38.213
#[derive(Debug, Clone)]
pub struct Coreset0Config {
    /// Number of resource blocks
    pub num_rbs: u32,
    /// Number of symbols
    pub num_symbols: u32,
    /// RB offset from point A
    pub rb_offset: u32,
}

impl Coreset0Config {
    /// Get CORESET#0 configuration from table index
    /// Based on 3GPP TS 38.213 Table 13-1 for {15, 15} kHz SCS
    pub fn from_index(index: u8) -> Result<Self, LayerError> {
        let config = match index {
            0 => Self { num_rbs: 24, num_symbols: 2, rb_offset: 0 },
            1 => Self { num_rbs: 24, num_symbols: 2, rb_offset: 2 },
            2 => Self { num_rbs: 24, num_symbols: 2, rb_offset: 4 },
            3 => Self { num_rbs: 24, num_symbols: 3, rb_offset: 0 },
            4 => Self { num_rbs: 24, num_symbols: 3, rb_offset: 2 },
            5 => Self { num_rbs: 24, num_symbols: 3, rb_offset: 4 },
            6 => Self { num_rbs: 48, num_symbols: 1, rb_offset: 12 },
            7 => Self { num_rbs: 48, num_symbols: 1, rb_offset: 16 },
            8 => Self { num_rbs: 48, num_symbols: 2, rb_offset: 12 },
            9 => Self { num_rbs: 48, num_symbols: 2, rb_offset: 16 },
            10 => Self { num_rbs: 48, num_symbols: 3, rb_offset: 12 },
            11 => Self { num_rbs: 48, num_symbols: 3, rb_offset: 16 },
            12 => Self { num_rbs: 96, num_symbols: 1, rb_offset: 38 },
            13 => Self { num_rbs: 96, num_symbols: 2, rb_offset: 38 },
            14 => Self { num_rbs: 96, num_symbols: 3, rb_offset: 38 },
            _ => {
                return Err(LayerError::InvalidConfiguration(format!(
                    "Invalid CORESET#0 index: {}",
                    index
                )))
            }
        };
        Ok(config)
    }

    /// Control channel elements available in this CORESET (6 REGs each)
    pub fn nof_cces(&self) -> u32 {
        self.num_rbs * self.num_symbols / 6
    }
}

/// Scheduling parameters of one SI message
#[derive(Debug, Clone)]
pub struct SiMessageSchedulingConfig {
    /// Periodicity T in radio frames
    pub period_radio_frames: u32,
    /// BCCH-DL-SCH payload length in bytes
    pub msg_len: usize,
}

/// SI scheduling information carried in SIB1
#[derive(Debug, Clone)]
pub struct SiSchedulingConfig {
    /// Common window length w in slots
    pub si_window_len_slots: u32,
    pub si_messages: Vec<SiMessageSchedulingConfig>,
}

/// Static configuration of one cell
#[derive(Debug, Clone)]
pub struct SchedCellConfigurationRequest {
    pub cell_index: CellIndex,
    pub pci: Pci,
    pub scs: SubcarrierSpacing,
    pub nof_dl_prbs: u16,
    pub nof_ul_prbs: u16,
    pub coreset0: Coreset0Config,
    /// First PRB of the SSB in the DL grid
    pub ssb_offset_prbs: u16,
    pub ssb_period_ms: u32,
    pub sib1_payload_len: usize,
    pub sib1_period_ms: u32,
    pub other_si_search_space_id: u8,
    pub si_scheduling: Option<SiSchedulingConfig>,
}

/// Tuning knobs of the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerExpertConfig {
    pub sib1_mcs_index: u8,
    pub sib1_dci_aggr_lev: u8,
    pub si_message_mcs_index: u8,
    pub si_message_dci_aggr_lev: u8,
    pub rar_mcs_index: u8,
    pub rar_dci_aggr_lev: u8,
    pub paging_mcs_index: u8,
    pub paging_dci_aggr_lev: u8,
    pub ue_mcs_index: u8,
    pub ue_dci_aggr_lev: u8,
    pub max_ue_grants_per_slot: usize,
}

impl Default for SchedulerExpertConfig {
    fn default() -> Self {
        Self {
            sib1_mcs_index: 5,
            sib1_dci_aggr_lev: 4,
            si_message_mcs_index: 5,
            si_message_dci_aggr_lev: 4,
            rar_mcs_index: 0,
            rar_dci_aggr_lev: 4,
            paging_mcs_index: 2,
            paging_dci_aggr_lev: 4,
            ue_mcs_index: 10,
            ue_dci_aggr_lev: 2,
            max_ue_grants_per_slot: 8,
        }
    }
}

/// UE creation parameters
#[derive(Debug, Clone)]
pub struct SchedUeCreationRequest {
    pub ue_index: UeIndex,
    pub crnti: Rnti,
    pub cell_index: CellIndex,
    pub lcids: Vec<Lcid>,
}

/// UE reconfiguration: replaces the set of scheduled logical channels
#[derive(Debug, Clone)]
pub struct SchedUeReconfigurationRequest {
    pub ue_index: UeIndex,
    pub lcids: Vec<Lcid>,
}

/// UL Buffer Status Report
#[derive(Debug, Clone, Copy)]
pub struct UlBsrIndication {
    pub ue_index: UeIndex,
    pub crnti: Rnti,
    pub bsr_bytes: usize,
}

/// DL buffer state of one logical channel
#[derive(Debug, Clone, Copy)]
pub struct DlBufferStateIndication {
    pub ue_index: UeIndex,
    pub rnti: Rnti,
    pub lcid: Lcid,
    pub bsr: usize,
}

/// Pending MAC CE bytes for one UE
#[derive(Debug, Clone, Copy)]
pub struct DlMacCeIndication {
    pub ue_index: UeIndex,
    pub ce_bytes: usize,
}

/// Detected PRACH preamble
#[derive(Debug, Clone, Copy)]
pub struct RachIndication {
    pub cell_index: CellIndex,
    pub slot_rx: SlotPoint,
    pub preamble_id: u8,
    pub timing_advance: u16,
}

/// PUSCH decode outcome
#[derive(Debug, Clone, Copy)]
pub struct UlCrcIndication {
    pub ue_index: UeIndex,
    pub harq_id: HarqProcessId,
    pub tb_crc_ok: bool,
}

/// HARQ-ACK feedback carried in UCI
#[derive(Debug, Clone, Copy)]
pub struct UciIndication {
    pub ue_index: UeIndex,
    pub harq_ack: bool,
}

/// Paging request from the CU
#[derive(Debug, Clone, Copy)]
pub struct PagingIndication {
    pub cell_index: CellIndex,
    pub ue_identity_index: u64,
    pub paging_msg_len: usize,
}

/// MAC-facing scheduler contract. All operations are non-blocking; the
/// event handlers are safe to invoke from any thread and take effect in
/// the next `slot_indication` of the affected cell.
pub trait MacScheduler: Send + Sync {
    /// Install a cell's static config.
    fn handle_cell_configuration_request(&self, cfg: SchedCellConfigurationRequest) -> bool;

    /// Add new UE to scheduler.
    fn handle_ue_creation_request(&self, ue_request: SchedUeCreationRequest);

    /// Reconfigure existing UE.
    fn handle_ue_reconfiguration_request(&self, ue_request: SchedUeReconfigurationRequest);

    /// Remove UE from scheduler.
    fn handle_ue_removal_request(&self, ue_index: UeIndex);

    /// UE UL Buffer Status Report.
    fn handle_ul_bsr_indication(&self, bsr: UlBsrIndication);

    /// UE DL buffer state update.
    fn handle_dl_buffer_state_indication(&self, bs: DlBufferStateIndication);

    /// Pending DL MAC CE for a UE.
    fn handle_dl_mac_ce_indication(&self, mac_ce: DlMacCeIndication);

    /// Called when a RACH preamble is detected.
    fn handle_rach_indication(&self, rach: RachIndication);

    /// PUSCH CRC outcome.
    fn handle_crc_indication(&self, crc: UlCrcIndication);

    /// UCI (HARQ-ACK) feedback.
    fn handle_uci_indication(&self, uci: UciIndication);

    /// Handle scheduling of paging message.
    fn handle_paging_indication(&self, pi: PagingIndication);

    /// Obtain scheduling result for a given slot. `None` means the slot
    /// could not be computed; the MAC treats it as an empty slot.
    fn slot_indication(&self, sl_tx: SlotPoint, cell_index: CellIndex) -> Option<Arc<SchedResult>>;
}

enum SchedEvent {
    UeCreate(SchedUeCreationRequest),
    UeReconf(SchedUeReconfigurationRequest),
    UeRemove(UeIndex),
    UlBsr(UlBsrIndication),
    DlBufferState(DlBufferStateIndication),
    DlMacCe(DlMacCeIndication),
    Rach(RachIndication),
    Crc(UlCrcIndication),
    Uci(UciIndication),
    Paging(PagingIndication),
}

struct SchedulerState {
    cells: Vec<Option<CellScheduler>>,
    ues: BTreeMap<UeIndex, SchedUe>,
    pending_events: Vec<SchedEvent>,
}

impl SchedulerState {
    fn apply_event(&mut self, ev: SchedEvent) {
        match ev {
            SchedEvent::UeCreate(req) => {
                info!("Scheduler: UE created ue_index={:?} rnti={}", req.ue_index, req.crnti);
                self.ues.insert(req.ue_index, SchedUe::new(&req));
            }
            SchedEvent::UeReconf(req) => {
                if let Some(ue) = self.ues.get_mut(&req.ue_index) {
                    let old = std::mem::take(&mut ue.dl_buffer_state);
                    ue.dl_buffer_state = req
                        .lcids
                        .iter()
                        .map(|lcid| (*lcid, old.get(lcid).copied().unwrap_or(0)))
                        .collect();
                } else {
                    warn!("Reconfiguration for unknown ue_index={:?}", req.ue_index);
                }
            }
            SchedEvent::UeRemove(ue_index) => {
                if self.ues.remove(&ue_index).is_some() {
                    info!("Scheduler: UE removed ue_index={:?}", ue_index);
                } else {
                    warn!("Removal of unknown ue_index={:?}", ue_index);
                }
            }
            SchedEvent::UlBsr(bsr) => {
                if let Some(ue) = self.ues.get_mut(&bsr.ue_index) {
                    ue.ul_pending_bytes = bsr.bsr_bytes;
                }
            }
            SchedEvent::DlBufferState(bs) => {
                if let Some(ue) = self.ues.get_mut(&bs.ue_index) {
                    ue.dl_buffer_state.insert(bs.lcid, bs.bsr);
                }
            }
            SchedEvent::DlMacCe(ce) => {
                if let Some(ue) = self.ues.get_mut(&ce.ue_index) {
                    ue.pending_ce_bytes += ce.ce_bytes;
                }
            }
            SchedEvent::Rach(rach) => {
                if let Some(Some(cell)) = self.cells.get_mut(rach.cell_index.0 as usize) {
                    cell.pending_rachs.push(rach);
                }
            }
            SchedEvent::Crc(crc) => {
                if let Some(ue) = self.ues.get_mut(&crc.ue_index) {
                    if crc.tb_crc_ok {
                        ue.crc_ok += 1;
                    } else {
                        ue.crc_nok += 1;
                    }
                    debug!(
                        "CRC harq={:?} ok={} for ue={:?} (totals ok={} nok={})",
                        crc.harq_id, crc.tb_crc_ok, crc.ue_index, ue.crc_ok, ue.crc_nok
                    );
                }
            }
            SchedEvent::Uci(uci) => {
                if let Some(ue) = self.ues.get_mut(&uci.ue_index) {
                    if uci.harq_ack {
                        ue.harq_acks += 1;
                    } else {
                        ue.harq_nacks += 1;
                    }
                    debug!(
                        "HARQ-ACK {} for ue={:?} (totals ack={} nack={})",
                        uci.harq_ack, uci.ue_index, ue.harq_acks, ue.harq_nacks
                    );
                }
            }
            SchedEvent::Paging(pi) => {
                if let Some(Some(cell)) = self.cells.get_mut(pi.cell_index.0 as usize) {
                    cell.pending_pagings.push(pi);
                }
            }
        }
    }
}

/// Reference scheduler implementation
pub struct SchedulerImpl {
    expert_cfg: SchedulerExpertConfig,
    inner: Mutex<SchedulerState>,
}

impl SchedulerImpl {
    pub fn new(expert_cfg: SchedulerExpertConfig) -> Self {
        Self {
            expert_cfg,
            inner: Mutex::new(SchedulerState {
                cells: (0..MAX_CELLS).map(|_| None).collect(),
                ues: BTreeMap::new(),
                pending_events: Vec::new(),
            }),
        }
    }

    fn push_event(&self, ev: SchedEvent) {
        self.inner.lock().unwrap().pending_events.push(ev);
    }
}

impl MacScheduler for SchedulerImpl {
    fn handle_cell_configuration_request(&self, cfg: SchedCellConfigurationRequest) -> bool {
        if cfg.nof_dl_prbs == 0 || cfg.nof_ul_prbs == 0 {
            error!("Rejecting cell {}: empty bandwidth part", cfg.cell_index);
            return false;
        }
        if cfg.coreset0.nof_cces() == 0 {
            error!("Rejecting cell {}: CORESET#0 has no CCEs", cfg.cell_index);
            return false;
        }
        let mut state = self.inner.lock().unwrap();
        let slot = &mut state.cells[cfg.cell_index.0 as usize];
        if slot.is_some() {
            error!("Cell {} already configured", cfg.cell_index);
            return false;
        }
        info!("Scheduler: cell {} configured", cfg.cell_index);
        *slot = Some(CellScheduler::new(cfg, &self.expert_cfg));
        true
    }

    fn handle_ue_creation_request(&self, ue_request: SchedUeCreationRequest) {
        self.push_event(SchedEvent::UeCreate(ue_request));
    }

    fn handle_ue_reconfiguration_request(&self, ue_request: SchedUeReconfigurationRequest) {
        self.push_event(SchedEvent::UeReconf(ue_request));
    }

    fn handle_ue_removal_request(&self, ue_index: UeIndex) {
        self.push_event(SchedEvent::UeRemove(ue_index));
    }

    fn handle_ul_bsr_indication(&self, bsr: UlBsrIndication) {
        self.push_event(SchedEvent::UlBsr(bsr));
    }

    fn handle_dl_buffer_state_indication(&self, bs: DlBufferStateIndication) {
        self.push_event(SchedEvent::DlBufferState(bs));
    }

    fn handle_dl_mac_ce_indication(&self, mac_ce: DlMacCeIndication) {
        self.push_event(SchedEvent::DlMacCe(mac_ce));
    }

    fn handle_rach_indication(&self, rach: RachIndication) {
        self.push_event(SchedEvent::Rach(rach));
    }

    fn handle_crc_indication(&self, crc: UlCrcIndication) {
        self.push_event(SchedEvent::Crc(crc));
    }

    fn handle_uci_indication(&self, uci: UciIndication) {
        self.push_event(SchedEvent::Uci(uci));
    }

    fn handle_paging_indication(&self, pi: PagingIndication) {
        self.push_event(SchedEvent::Paging(pi));
    }

    fn slot_indication(&self, sl_tx: SlotPoint, cell_index: CellIndex) -> Option<Arc<SchedResult>> {
        let mut state = self.inner.lock().unwrap();
        let state = &mut *state;

        // Serialize every pending event before computing the slot.
        for ev in std::mem::take(&mut state.pending_events) {
            state.apply_event(ev);
        }

        let cell = state.cells[cell_index.0 as usize]
            .as_mut()
            .unwrap_or_else(|| panic!("Slot indication for unconfigured cell {}", cell_index));

        let result = Arc::new(cell.run_slot(sl_tx, &mut state.ues));
        debug!(
            "slot={} cell={}: scheduled {} DL PDCCHs, {} UE grants",
            sl_tx,
            cell_index,
            result.dl.dl_pdcchs.len(),
            result.dl.ue_grants.len()
        );
        cell.last_result = Some(result.clone());
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sl(sfn: u16, slot: u32) -> SlotPoint {
        SlotPoint::new(SubcarrierSpacing::Scs15, sfn, slot)
    }

    fn configured_scheduler() -> SchedulerImpl {
        let sched = SchedulerImpl::new(SchedulerExpertConfig::default());
        assert!(sched.handle_cell_configuration_request(SchedCellConfigurationRequest {
            cell_index: CellIndex(0),
            pci: Pci(1),
            scs: SubcarrierSpacing::Scs15,
            nof_dl_prbs: 52,
            nof_ul_prbs: 52,
            coreset0: Coreset0Config::from_index(1).unwrap(),
            ssb_offset_prbs: 0,
            ssb_period_ms: 20,
            sib1_payload_len: 100,
            sib1_period_ms: 160,
            other_si_search_space_id: 3,
            si_scheduling: None,
        }));
        sched
    }

    #[test]
    fn test_coreset0_config() {
        let config = Coreset0Config::from_index(1).unwrap();
        assert_eq!(config.num_rbs, 24);
        assert_eq!(config.num_symbols, 2);
        assert_eq!(config.rb_offset, 2);
        assert_eq!(config.nof_cces(), 8);

        assert!(Coreset0Config::from_index(20).is_err());
    }

    #[test]
    fn test_duplicate_cell_configuration_rejected() {
        let sched = configured_scheduler();
        assert!(!sched.handle_cell_configuration_request(SchedCellConfigurationRequest {
            cell_index: CellIndex(0),
            pci: Pci(1),
            scs: SubcarrierSpacing::Scs15,
            nof_dl_prbs: 52,
            nof_ul_prbs: 52,
            coreset0: Coreset0Config::from_index(1).unwrap(),
            ssb_offset_prbs: 0,
            ssb_period_ms: 20,
            sib1_payload_len: 100,
            sib1_period_ms: 160,
            other_si_search_space_id: 3,
            si_scheduling: None,
        }));
    }

    #[test]
    fn test_ue_creation_visible_in_next_slot() {
        let sched = configured_scheduler();
        sched.handle_ue_creation_request(SchedUeCreationRequest {
            ue_index: UeIndex(0),
            crnti: Rnti(0x4601),
            cell_index: CellIndex(0),
            lcids: vec![Lcid(4)],
        });
        sched.handle_dl_buffer_state_indication(DlBufferStateIndication {
            ue_index: UeIndex(0),
            rnti: Rnti(0x4601),
            lcid: Lcid(4),
            bsr: 200,
        });

        let res = sched.slot_indication(sl(0, 1), CellIndex(0)).unwrap();
        assert_eq!(res.dl.ue_grants.len(), 1);
        assert_eq!(res.dl.ue_grants[0].crnti, Rnti(0x4601));
    }

    #[test]
    fn test_ue_removal_visible_in_next_slot() {
        let sched = configured_scheduler();
        sched.handle_ue_creation_request(SchedUeCreationRequest {
            ue_index: UeIndex(0),
            crnti: Rnti(0x4601),
            cell_index: CellIndex(0),
            lcids: vec![Lcid(4)],
        });
        sched.handle_dl_buffer_state_indication(DlBufferStateIndication {
            ue_index: UeIndex(0),
            rnti: Rnti(0x4601),
            lcid: Lcid(4),
            bsr: 200,
        });
        let res = sched.slot_indication(sl(0, 1), CellIndex(0)).unwrap();
        assert_eq!(res.dl.ue_grants.len(), 1);

        sched.handle_ue_removal_request(UeIndex(0));
        let res = sched.slot_indication(sl(0, 2), CellIndex(0)).unwrap();
        assert!(res.dl.ue_grants.is_empty());
    }

    #[test]
    fn test_rach_produces_rar() {
        let sched = configured_scheduler();
        sched.handle_rach_indication(RachIndication {
            cell_index: CellIndex(0),
            slot_rx: sl(0, 1),
            preamble_id: 7,
            timing_advance: 12,
        });
        let res = sched.slot_indication(sl(0, 3), CellIndex(0)).unwrap();
        assert_eq!(res.dl.rar_grants.len(), 1);
        assert_eq!(res.dl.rar_grants[0].grants[0].rapid, 7);
    }

    #[test]
    fn test_paging_produces_grant() {
        let sched = configured_scheduler();
        sched.handle_paging_indication(PagingIndication {
            cell_index: CellIndex(0),
            ue_identity_index: 0x1234,
            paging_msg_len: 32,
        });
        let res = sched.slot_indication(sl(0, 1), CellIndex(0)).unwrap();
        assert_eq!(res.dl.paging_grants.len(), 1);
        assert_eq!(res.dl.paging_grants[0].ue_identity_index, 0x1234);
    }

    #[test]
    fn test_mac_ce_biases_allocation() {
        let sched = configured_scheduler();
        sched.handle_ue_creation_request(SchedUeCreationRequest {
            ue_index: UeIndex(0),
            crnti: Rnti(0x4601),
            cell_index: CellIndex(0),
            lcids: vec![Lcid(4)],
        });
        sched.handle_dl_mac_ce_indication(DlMacCeIndication {
            ue_index: UeIndex(0),
            ce_bytes: 6,
        });
        let res = sched.slot_indication(sl(0, 1), CellIndex(0)).unwrap();
        // CE bytes alone are enough to trigger a grant.
        assert_eq!(res.dl.ue_grants.len(), 1);
    }

    #[test]
    fn test_ssb_appears_periodically() {
        let sched = configured_scheduler();
        let res = sched.slot_indication(sl(0, 0), CellIndex(0)).unwrap();
        assert_eq!(res.dl.bc.ssb_info.len(), 1);
        let res = sched.slot_indication(sl(1, 0), CellIndex(0)).unwrap();
        assert!(res.dl.bc.ssb_info.is_empty());
        let res = sched.slot_indication(sl(2, 0), CellIndex(0)).unwrap();
        assert_eq!(res.dl.bc.ssb_info.len(), 1);
    }
}
