//! Per-Cell Scheduling
//!
//! Slot resource bookkeeping and the per-cell allocation passes:
//! broadcast (SSB, SIB1, SI messages), paging, RAR, UE data and UL
//! grants. Broadcast allocations take precedence over UE data; PDCCH
//! CCEs are reserved before PDSCH PRBs so either side of a failed
//! allocation can be undone.

use std::collections::BTreeMap;
use std::sync::Arc;

use common::prb::{PrbBitmap, PrbGrant, PrbInterval};
use common::slot_point::SlotPoint;
use common::types::{CellIndex, HarqProcessId, Lcid, Rnti, UeIndex};
use tracing::{debug, trace};

use super::result::*;
use super::si_scheduler::{allocate_si_pdsch, SiMessageScheduler};
use super::support::*;
use super::{
    PagingIndication, RachIndication, SchedCellConfigurationRequest, SchedUeCreationRequest,
    SchedulerExpertConfig,
};

/// Number of slots the resource grid ring covers
pub(crate) const RING_ALLOCATOR_SIZE: usize = 40;

/// PRBs occupied by one SSB in frequency
const SSB_NOF_PRBS: u16 = 20;

/// MAC subheader overhead accounted per scheduled logical channel
const MAC_SUBHEADER_BYTES: usize = 3;

/// Length of one RAR subPDU on the DL-SCH: subheader plus MAC RAR
const RAR_SUBPDU_BYTES: usize = 8;

/// PRBs granted to a Msg3 PUSCH
const MSG3_NOF_PRBS: usize = 2;

/// First TC-RNTI handed out to contention-based random access
const INITIAL_TC_RNTI: u16 = 0x4601;

/// Resource usage of one slot: PRBs per direction and PDCCH CCEs.
pub(crate) struct SlotResourceAllocator {
    slot: Option<SlotPoint>,
    pub dl_prbs: PrbBitmap,
    pub ul_prbs: PrbBitmap,
    cce_used: Vec<bool>,
    last_pdcch: Option<(u16, u8)>,
}

impl SlotResourceAllocator {
    fn new(nof_dl_prbs: u16, nof_ul_prbs: u16, nof_cces: u32) -> Self {
        Self {
            slot: None,
            dl_prbs: PrbBitmap::new(nof_dl_prbs as usize),
            ul_prbs: PrbBitmap::new(nof_ul_prbs as usize),
            cce_used: vec![false; nof_cces as usize],
            last_pdcch: None,
        }
    }

    /// Prepare the entry for `sl`, wiping stale state of a previous ring
    /// lap if necessary.
    fn ensure_slot(&mut self, sl: SlotPoint) {
        if self.slot != Some(sl) {
            self.slot = Some(sl);
            self.dl_prbs.reset();
            self.ul_prbs.reset();
            self.cce_used.iter_mut().for_each(|c| *c = false);
            self.last_pdcch = None;
        }
    }

    /// Reserve a PDCCH candidate of `aggr_lvl` CCEs. Candidates start at
    /// multiples of the aggregation level within the CORESET.
    pub fn alloc_dl_pdcch(&mut self, aggr_lvl: u8) -> Option<u16> {
        let l = aggr_lvl as usize;
        assert!(l > 0 && l.is_power_of_two(), "Invalid aggregation level {}", aggr_lvl);
        let mut start = 0;
        while start + l <= self.cce_used.len() {
            if self.cce_used[start..start + l].iter().all(|c| !*c) {
                self.cce_used[start..start + l].iter_mut().for_each(|c| *c = true);
                self.last_pdcch = Some((start as u16, aggr_lvl));
                return Some(start as u16);
            }
            start += l;
        }
        None
    }

    /// Undo the most recent PDCCH reservation. Used when the matching
    /// PDSCH allocation fails.
    pub fn cancel_last_dl_pdcch(&mut self) {
        if let Some((cce, aggr)) = self.last_pdcch.take() {
            let start = cce as usize;
            self.cce_used[start..start + aggr as usize]
                .iter_mut()
                .for_each(|c| *c = false);
        }
    }
}

#[cfg(test)]
impl SlotResourceAllocator {
    pub(crate) fn new_for_test(
        nof_dl_prbs: u16,
        nof_ul_prbs: u16,
        nof_cces: u32,
        sl: SlotPoint,
    ) -> Self {
        let mut alloc = Self::new(nof_dl_prbs, nof_ul_prbs, nof_cces);
        alloc.ensure_slot(sl);
        alloc
    }
}

/// Per-UE scheduling context
pub(crate) struct SchedUe {
    pub ue_index: UeIndex,
    pub crnti: Rnti,
    pub cell_index: CellIndex,
    /// DL backlog per logical channel, refreshed by buffer state indications
    pub dl_buffer_state: BTreeMap<Lcid, usize>,
    /// Pending MAC CE bytes to piggyback on the next grant
    pub pending_ce_bytes: usize,
    /// UL backlog reported through BSRs
    pub ul_pending_bytes: usize,
    dl_harq: u8,
    ul_harq: u8,
    /// L1 feedback counters
    pub crc_ok: u32,
    pub crc_nok: u32,
    pub harq_acks: u32,
    pub harq_nacks: u32,
}

impl SchedUe {
    pub fn new(req: &SchedUeCreationRequest) -> Self {
        Self {
            ue_index: req.ue_index,
            crnti: req.crnti,
            cell_index: req.cell_index,
            dl_buffer_state: req.lcids.iter().map(|lcid| (*lcid, 0)).collect(),
            pending_ce_bytes: 0,
            ul_pending_bytes: 0,
            dl_harq: 0,
            ul_harq: 0,
            crc_ok: 0,
            crc_nok: 0,
            harq_acks: 0,
            harq_nacks: 0,
        }
    }

    pub fn has_dl_traffic(&self) -> bool {
        self.pending_ce_bytes > 0 || self.dl_buffer_state.values().any(|b| *b > 0)
    }

    /// Bytes worth requesting for the next grant, subheaders included
    fn pending_dl_bytes(&self) -> usize {
        let lc_bytes: usize = self
            .dl_buffer_state
            .values()
            .filter(|b| **b > 0)
            .map(|b| b + MAC_SUBHEADER_BYTES)
            .sum();
        self.pending_ce_bytes + lc_bytes
    }

    fn next_dl_harq(&mut self) -> HarqProcessId {
        let id = self.dl_harq;
        self.dl_harq = (self.dl_harq + 1) % 16;
        HarqProcessId(id)
    }

    fn next_ul_harq(&mut self) -> HarqProcessId {
        let id = self.ul_harq;
        self.ul_harq = (self.ul_harq + 1) % 16;
        HarqProcessId(id)
    }
}

/// Scheduler state of one active cell
pub(crate) struct CellScheduler {
    pub cell_cfg: SchedCellConfigurationRequest,
    expert_cfg: SchedulerExpertConfig,
    ring: Vec<SlotResourceAllocator>,
    si_sched: SiMessageScheduler,
    pub pending_rachs: Vec<RachIndication>,
    pub pending_pagings: Vec<PagingIndication>,
    next_tc_rnti: u16,
    last_slot: Option<SlotPoint>,
    rr_offset: usize,
    /// Keeps the most recent result alive for the PHY round-trip
    pub last_result: Option<Arc<SchedResult>>,
}

impl CellScheduler {
    pub fn new(cell_cfg: SchedCellConfigurationRequest, expert_cfg: &SchedulerExpertConfig) -> Self {
        let nof_cces = cell_cfg.coreset0.nof_cces();
        let ring = (0..RING_ALLOCATOR_SIZE)
            .map(|_| SlotResourceAllocator::new(cell_cfg.nof_dl_prbs, cell_cfg.nof_ul_prbs, nof_cces))
            .collect();
        let si_sched = SiMessageScheduler::new(
            cell_cfg.si_scheduling.clone(),
            expert_cfg.si_message_mcs_index,
            expert_cfg.si_message_dci_aggr_lev,
            cell_cfg.other_si_search_space_id,
            cell_cfg.nof_dl_prbs,
        );
        Self {
            cell_cfg,
            expert_cfg: expert_cfg.clone(),
            ring,
            si_sched,
            pending_rachs: Vec::new(),
            pending_pagings: Vec::new(),
            next_tc_rnti: INITIAL_TC_RNTI,
            last_slot: None,
            rr_offset: 0,
            last_result: None,
        }
    }

    /// Produce the scheduling decision for `sl`.
    pub fn run_slot(&mut self, sl: SlotPoint, ues: &mut BTreeMap<UeIndex, SchedUe>) -> SchedResult {
        if let Some(last) = self.last_slot {
            assert!(
                sl > last,
                "Non-monotonic slot indication: slot={} after slot={} cell={}",
                sl,
                last,
                self.cell_cfg.cell_index
            );
        }
        self.last_slot = Some(sl);

        let Self {
            cell_cfg,
            expert_cfg,
            ring,
            si_sched,
            pending_rachs,
            pending_pagings,
            next_tc_rnti,
            rr_offset,
            ..
        } = self;

        let slot_alloc = &mut ring[sl.ring_idx(RING_ALLOCATOR_SIZE)];
        slot_alloc.ensure_slot(sl);

        let mut result = SchedResult::default();

        // Broadcast allocations come first and take precedence over UE data.
        schedule_ssb(cell_cfg, sl, slot_alloc, &mut result);
        schedule_sib1(cell_cfg, expert_cfg, sl, slot_alloc, &mut result);
        si_sched.run_slot(sl, slot_alloc, &mut result);
        schedule_paging(cell_cfg, expert_cfg, pending_pagings, slot_alloc, &mut result);

        schedule_rars(cell_cfg, expert_cfg, pending_rachs, next_tc_rnti, slot_alloc, &mut result);

        schedule_ue_data(cell_cfg, expert_cfg, ues, rr_offset, slot_alloc, &mut result);
        schedule_ul_grants(cell_cfg, expert_cfg, ues, slot_alloc, &mut result);

        trace!(
            "Cell {} slot {}: {} pdcchs, {} sibs, {} rars, {} ue grants, {} puschs",
            cell_cfg.cell_index,
            sl,
            result.dl.dl_pdcchs.len(),
            result.dl.bc.sibs.len(),
            result.dl.rar_grants.len(),
            result.dl.ue_grants.len(),
            result.ul.puschs.len()
        );
        result
    }
}

fn is_ssb_slot(cfg: &SchedCellConfigurationRequest, sl: SlotPoint) -> bool {
    let period_slots = cfg.ssb_period_ms * sl.nof_slots_per_frame() / 10;
    sl.to_uint() % period_slots == 0
}

fn is_sib1_slot(cfg: &SchedCellConfigurationRequest, sl: SlotPoint) -> bool {
    // SIB1 goes out two slots after the SSB of its period, giving the UE
    // time to decode the MIB first.
    let period_slots = cfg.sib1_period_ms * sl.nof_slots_per_frame() / 10;
    sl.to_uint() % period_slots == 2
}

fn schedule_ssb(
    cfg: &SchedCellConfigurationRequest,
    sl: SlotPoint,
    slot_alloc: &mut SlotResourceAllocator,
    result: &mut SchedResult,
) {
    if !is_ssb_slot(cfg, sl) {
        return;
    }
    result.dl.bc.ssb_info.push(SsbInformation {
        ssb_index: 0,
        start_symbol: 2,
    });
    let ssb_prbs = PrbInterval::with_length(cfg.ssb_offset_prbs as u32, SSB_NOF_PRBS as u32);
    slot_alloc.dl_prbs |= ssb_prbs;
    debug!("Scheduled SSB at slot {}", sl);
}

fn schedule_sib1(
    cfg: &SchedCellConfigurationRequest,
    expert_cfg: &SchedulerExpertConfig,
    sl: SlotPoint,
    slot_alloc: &mut SlotResourceAllocator,
    result: &mut SchedResult,
) {
    if !is_sib1_slot(cfg, sl) {
        return;
    }
    if allocate_si_pdsch(
        slot_alloc,
        result,
        cfg.nof_dl_prbs,
        cfg.sib1_payload_len,
        expert_cfg.sib1_mcs_index,
        expert_cfg.sib1_dci_aggr_lev,
        0,
        SiIndicator::Sib1,
        None,
    ) {
        debug!("Scheduled SIB1 at slot {}", sl);
    }
}

fn schedule_paging(
    cfg: &SchedCellConfigurationRequest,
    expert_cfg: &SchedulerExpertConfig,
    pending: &mut Vec<PagingIndication>,
    slot_alloc: &mut SlotResourceAllocator,
    result: &mut SchedResult,
) {
    pending.retain(|pi| {
        let Some(cce_index) = slot_alloc.alloc_dl_pdcch(expert_cfg.paging_dci_aggr_lev) else {
            return true;
        };
        let mcs = pdsch_mcs_get_config_qam64(expert_cfg.paging_mcs_index);
        let calc = get_nof_prbs(PrbsCalculatorSchConfig {
            payload_size_bytes: pi.paging_msg_len,
            nof_symb_sh: 12,
            nof_dmrs_prb: calculate_nof_dmrs_per_rb(),
            nof_oh_prb: 0,
            mcs,
            nof_layers: 1,
        });
        let prbs = slot_alloc
            .dl_prbs
            .find_empty_interval_of_length(calc.nof_prbs as usize, 0);
        if (prbs.length()) < calc.nof_prbs {
            slot_alloc.cancel_last_dl_pdcch();
            debug!("Postponing paging, not enough PDSCH space");
            return true;
        }
        slot_alloc.dl_prbs |= prbs;

        let n_bwp = cfg.nof_dl_prbs as u32;
        result.dl.dl_pdcchs.push(PdcchDlInformation {
            rnti: Rnti::P_RNTI,
            ss_id: 0,
            aggr_lvl: expert_cfg.paging_dci_aggr_lev,
            cce_index,
            dci: DciDlInfo::PF10(Dci10PRntiConfig {
                n_rb_bwp: cfg.nof_dl_prbs,
                short_messages_indicator: 0b10,
                short_messages: 0,
                frequency_resource: rb_alloc_riv(n_bwp, prbs.start(), prbs.length()) as u16,
                time_resource: 0,
                vrb_to_prb_mapping: false,
                mcs_index: expert_cfg.paging_mcs_index,
                tb_scaling: 0,
            }),
        });
        result.dl.paging_grants.push(PagingInformation {
            ue_identity_index: pi.ue_identity_index,
            pdsch_cfg: PdschInformation {
                rnti: Rnti::P_RNTI,
                prbs: PrbGrant::from(prbs),
                symbols: OfdmSymbols::new(2, 14),
                mcs_index: expert_cfg.paging_mcs_index,
                tb_size_bytes: calc.tbs_bytes,
            },
        });
        false
    });
}

fn schedule_rars(
    cfg: &SchedCellConfigurationRequest,
    expert_cfg: &SchedulerExpertConfig,
    pending: &mut Vec<RachIndication>,
    next_tc_rnti: &mut u16,
    slot_alloc: &mut SlotResourceAllocator,
    result: &mut SchedResult,
) {
    pending.retain(|rach| {
        let Some(cce_index) = slot_alloc.alloc_dl_pdcch(expert_cfg.rar_dci_aggr_lev) else {
            return true;
        };
        let mcs = pdsch_mcs_get_config_qam64(expert_cfg.rar_mcs_index);
        let calc = get_nof_prbs(PrbsCalculatorSchConfig {
            payload_size_bytes: RAR_SUBPDU_BYTES,
            nof_symb_sh: 12,
            nof_dmrs_prb: calculate_nof_dmrs_per_rb(),
            nof_oh_prb: 0,
            mcs,
            nof_layers: 1,
        });
        let prbs = slot_alloc
            .dl_prbs
            .find_empty_interval_of_length(calc.nof_prbs as usize, 0);
        if prbs.length() < calc.nof_prbs {
            slot_alloc.cancel_last_dl_pdcch();
            debug!("Postponing RAR, not enough PDSCH space");
            return true;
        }

        // Msg3 PUSCH resources for the responded preamble.
        let msg3_prbs = slot_alloc
            .ul_prbs
            .find_empty_interval_of_length(MSG3_NOF_PRBS, 0);
        if (msg3_prbs.length() as usize) < MSG3_NOF_PRBS {
            slot_alloc.cancel_last_dl_pdcch();
            debug!("Postponing RAR, not enough Msg3 PUSCH space");
            return true;
        }
        slot_alloc.dl_prbs |= prbs;
        slot_alloc.ul_prbs |= msg3_prbs;

        let ra_rnti = Rnti::ra_rnti(rach.slot_rx.slot_index() as u8);
        let tc_rnti = Rnti::new(*next_tc_rnti);
        *next_tc_rnti = next_tc_rnti.wrapping_add(1);

        let n_dl = cfg.nof_dl_prbs as u32;
        let n_ul = cfg.nof_ul_prbs as u32;
        result.dl.dl_pdcchs.push(PdcchDlInformation {
            rnti: ra_rnti,
            ss_id: 1,
            aggr_lvl: expert_cfg.rar_dci_aggr_lev,
            cce_index,
            dci: DciDlInfo::RaF10(Dci10RaRntiConfig {
                n_rb_bwp: cfg.nof_dl_prbs,
                frequency_resource: rb_alloc_riv(n_dl, prbs.start(), prbs.length()) as u16,
                time_resource: 0,
                vrb_to_prb_mapping: false,
                mcs_index: expert_cfg.rar_mcs_index,
                tb_scaling: 0,
            }),
        });
        result.dl.rar_grants.push(RarInformation {
            ra_rnti,
            pdsch_cfg: PdschInformation {
                rnti: ra_rnti,
                prbs: PrbGrant::from(prbs),
                symbols: OfdmSymbols::new(2, 14),
                mcs_index: expert_cfg.rar_mcs_index,
                tb_size_bytes: calc.tbs_bytes,
            },
            grants: vec![RarUlGrant {
                rapid: rach.preamble_id,
                ta: rach.timing_advance,
                tc_rnti,
                freq_hopping: false,
                freq_resource: rb_alloc_riv(n_ul, msg3_prbs.start(), msg3_prbs.length()) as u16,
                time_resource: 0,
                mcs_index: 0,
                tpc: 1,
                csi_request: false,
            }],
        });
        debug!("Scheduled RAR ra_rnti={} tc_rnti={}", ra_rnti, tc_rnti);
        false
    });
}

fn schedule_ue_data(
    cfg: &SchedCellConfigurationRequest,
    expert_cfg: &SchedulerExpertConfig,
    ues: &mut BTreeMap<UeIndex, SchedUe>,
    rr_offset: &mut usize,
    slot_alloc: &mut SlotResourceAllocator,
    result: &mut SchedResult,
) {
    let mut candidates: Vec<UeIndex> = ues
        .iter()
        .filter(|(_, ue)| ue.cell_index == cfg.cell_index && ue.has_dl_traffic())
        .map(|(idx, _)| *idx)
        .collect();
    if candidates.is_empty() {
        return;
    }
    let candidates_len = candidates.len();
    candidates.rotate_left(*rr_offset % candidates_len);
    *rr_offset = rr_offset.wrapping_add(1);

    for ue_index in candidates {
        if result.dl.ue_grants.len() >= expert_cfg.max_ue_grants_per_slot {
            break;
        }
        let ue = ues.get_mut(&ue_index).expect("candidate UE disappeared");

        // CCEs are reserved before the PDSCH PRBs; a PDSCH failure below
        // rolls the reservation back.
        let Some(cce_index) = slot_alloc.alloc_dl_pdcch(expert_cfg.ue_dci_aggr_lev) else {
            break;
        };
        let mcs = pdsch_mcs_get_config_qam64(expert_cfg.ue_mcs_index);
        let calc_cfg = PrbsCalculatorSchConfig {
            payload_size_bytes: ue.pending_dl_bytes(),
            nof_symb_sh: 12,
            nof_dmrs_prb: calculate_nof_dmrs_per_rb(),
            nof_oh_prb: 0,
            mcs,
            nof_layers: 1,
        };
        let calc = get_nof_prbs(calc_cfg);
        let mut prbs = slot_alloc
            .dl_prbs
            .find_empty_interval_of_length(calc.nof_prbs as usize, 0);
        if prbs.length() < calc.nof_prbs {
            // Not enough room for the full backlog; shrink the grant to
            // the largest free run.
            prbs = slot_alloc.dl_prbs.find_largest_empty_interval();
        }
        let tb_size = estimate_tbs_bytes(prbs.length(), &calc_cfg);
        if tb_size <= MAC_SUBHEADER_BYTES {
            slot_alloc.cancel_last_dl_pdcch();
            debug!("No PDSCH space left for rnti={}", ue.crnti);
            break;
        }
        slot_alloc.dl_prbs |= prbs;
        let mut rem = tb_size;
        let ce = ue.pending_ce_bytes.min(rem);
        ue.pending_ce_bytes -= ce;
        rem -= ce;

        let mut lc_lst = Vec::new();
        for (lcid, pending) in ue.dl_buffer_state.iter_mut() {
            if *pending == 0 || rem <= MAC_SUBHEADER_BYTES {
                continue;
            }
            let sched_bytes = (*pending + MAC_SUBHEADER_BYTES).min(rem);
            *pending -= (sched_bytes - MAC_SUBHEADER_BYTES).min(*pending);
            rem -= sched_bytes;
            lc_lst.push(DlMsgLcInfo {
                lcid: *lcid,
                sched_bytes,
            });
        }

        let harq_id = ue.next_dl_harq();
        trace!(
            "DL grant ue={:?} rnti={} harq={:?} tb={}B prbs={}",
            ue.ue_index,
            ue.crnti,
            harq_id,
            tb_size,
            prbs.length()
        );
        result.dl.dl_pdcchs.push(PdcchDlInformation {
            rnti: ue.crnti,
            ss_id: 2,
            aggr_lvl: expert_cfg.ue_dci_aggr_lev,
            cce_index,
            dci: DciDlInfo::UeF10(Dci10CRntiConfig {
                n_rb_bwp: cfg.nof_dl_prbs,
                frequency_resource: rb_alloc_riv(cfg.nof_dl_prbs as u32, prbs.start(), prbs.length())
                    as u16,
                time_resource: 0,
                vrb_to_prb_mapping: false,
                mcs_index: expert_cfg.ue_mcs_index,
                new_data_indicator: true,
                redundancy_version: 0,
                harq_process_id: harq_id.0,
                dai: 0,
                tpc: 1,
                pucch_resource: 0,
                harq_feedback_timing: 1,
            }),
        });
        result.dl.ue_grants.push(DlMsgAlloc {
            crnti: ue.crnti,
            pdsch_cfg: PdschInformation {
                rnti: ue.crnti,
                prbs: PrbGrant::from(prbs),
                symbols: OfdmSymbols::new(2, 14),
                mcs_index: expert_cfg.ue_mcs_index,
                tb_size_bytes: tb_size,
            },
            tbs: vec![DlMsgTbInfo {
                tb_size_bytes: tb_size,
                lc_lst,
            }],
        });
    }
}

fn schedule_ul_grants(
    cfg: &SchedCellConfigurationRequest,
    expert_cfg: &SchedulerExpertConfig,
    ues: &mut BTreeMap<UeIndex, SchedUe>,
    slot_alloc: &mut SlotResourceAllocator,
    result: &mut SchedResult,
) {
    for ue in ues.values_mut() {
        if ue.cell_index != cfg.cell_index || ue.ul_pending_bytes == 0 {
            continue;
        }
        let mcs = pdsch_mcs_get_config_qam64(expert_cfg.ue_mcs_index);
        let calc_cfg = PrbsCalculatorSchConfig {
            payload_size_bytes: ue.ul_pending_bytes,
            nof_symb_sh: 14,
            nof_dmrs_prb: calculate_nof_dmrs_per_rb(),
            nof_oh_prb: 0,
            mcs,
            nof_layers: 1,
        };
        let calc = get_nof_prbs(calc_cfg);
        let mut prbs = slot_alloc
            .ul_prbs
            .find_empty_interval_of_length(calc.nof_prbs as usize, 0);
        if prbs.length() < calc.nof_prbs {
            prbs = slot_alloc.ul_prbs.find_largest_empty_interval();
        }
        let tb_size = estimate_tbs_bytes(prbs.length(), &calc_cfg);
        if tb_size == 0 {
            debug!("No PUSCH space left for rnti={}", ue.crnti);
            break;
        }
        slot_alloc.ul_prbs |= prbs;
        ue.ul_pending_bytes -= tb_size.min(ue.ul_pending_bytes);
        result.ul.puschs.push(UlSchedInfo {
            pusch_cfg: PuschInformation {
                rnti: ue.crnti,
                prbs: PrbGrant::from(prbs),
                symbols: OfdmSymbols::new(0, 14),
                mcs_index: expert_cfg.ue_mcs_index,
                new_data_indicator: true,
                redundancy_version: 0,
                harq_id: ue.next_ul_harq(),
                tb_size_bytes: tb_size,
            },
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{Coreset0Config, SiSchedulingConfig};
    use common::types::SubcarrierSpacing;

    fn test_cell_cfg() -> SchedCellConfigurationRequest {
        SchedCellConfigurationRequest {
            cell_index: CellIndex(0),
            pci: common::types::Pci(1),
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
        }
    }

    fn sl(sfn: u16, slot: u32) -> SlotPoint {
        SlotPoint::new(SubcarrierSpacing::Scs15, sfn, slot)
    }

    #[test]
    fn test_pdcch_allocator_reserve_and_cancel() {
        let mut alloc = SlotResourceAllocator::new(52, 52, 8);
        alloc.ensure_slot(sl(0, 0));
        assert_eq!(alloc.alloc_dl_pdcch(4), Some(0));
        assert_eq!(alloc.alloc_dl_pdcch(4), Some(4));
        assert_eq!(alloc.alloc_dl_pdcch(4), None);
        alloc.cancel_last_dl_pdcch();
        assert_eq!(alloc.alloc_dl_pdcch(4), Some(4));
    }

    #[test]
    fn test_ssb_and_sib1_slots() {
        let cfg = test_cell_cfg();
        assert!(is_ssb_slot(&cfg, sl(0, 0)));
        assert!(!is_ssb_slot(&cfg, sl(1, 0)));
        assert!(is_ssb_slot(&cfg, sl(2, 0)));
        assert!(is_sib1_slot(&cfg, sl(0, 2)));
        assert!(!is_sib1_slot(&cfg, sl(0, 3)));
        assert!(is_sib1_slot(&cfg, sl(16, 2)));
    }

    #[test]
    fn test_run_slot_broadcast_precedence_and_no_prb_overlap() {
        let expert = SchedulerExpertConfig::default();
        let mut cell = CellScheduler::new(test_cell_cfg(), &expert);
        let mut ues = BTreeMap::new();
        let mut ue = SchedUe::new(&SchedUeCreationRequest {
            ue_index: UeIndex(0),
            crnti: Rnti(0x4601),
            cell_index: CellIndex(0),
            lcids: vec![Lcid(4)],
        });
        ue.dl_buffer_state.insert(Lcid(4), 5000);
        ues.insert(UeIndex(0), ue);

        // Slot 0 carries the SSB; slot 2 carries SIB1 plus UE data.
        let res = cell.run_slot(sl(0, 0), &mut ues);
        assert_eq!(res.dl.bc.ssb_info.len(), 1);

        let res = cell.run_slot(sl(0, 2), &mut ues);
        assert_eq!(res.dl.bc.sibs.len(), 1);
        assert_eq!(res.dl.ue_grants.len(), 1);

        // SIB1 and the UE grant must not overlap in PRBs.
        let sib_prbs = res.dl.bc.sibs[0].pdsch_cfg.prbs.prbs();
        let ue_prbs = res.dl.ue_grants[0].pdsch_cfg.prbs.prbs();
        let mut overlap = sib_prbs;
        overlap.intersect(ue_prbs);
        assert!(overlap.is_empty());

        let ue_pdcch = res
            .dl
            .dl_pdcchs
            .iter()
            .find(|p| p.rnti == Rnti(0x4601))
            .unwrap();
        assert!(matches!(ue_pdcch.dci, DciDlInfo::UeF10(_)));
    }

    #[test]
    fn test_rar_scheduled_for_pending_rach() {
        let expert = SchedulerExpertConfig::default();
        let mut cell = CellScheduler::new(test_cell_cfg(), &expert);
        let mut ues = BTreeMap::new();
        cell.pending_rachs.push(RachIndication {
            cell_index: CellIndex(0),
            slot_rx: sl(0, 1),
            preamble_id: 17,
            timing_advance: 31,
        });

        let res = cell.run_slot(sl(0, 3), &mut ues);
        assert_eq!(res.dl.rar_grants.len(), 1);
        let rar = &res.dl.rar_grants[0];
        assert_eq!(rar.ra_rnti, Rnti::ra_rnti(1));
        assert_eq!(rar.grants[0].rapid, 17);
        assert_eq!(rar.grants[0].tc_rnti, Rnti(INITIAL_TC_RNTI));
        assert!(cell.pending_rachs.is_empty());
        assert!(res
            .dl
            .dl_pdcchs
            .iter()
            .any(|p| matches!(p.dci, DciDlInfo::RaF10(_))));
    }

    #[test]
    fn test_ue_grant_consumes_backlog() {
        let expert = SchedulerExpertConfig::default();
        let mut cell = CellScheduler::new(test_cell_cfg(), &expert);
        let mut ues = BTreeMap::new();
        let mut ue = SchedUe::new(&SchedUeCreationRequest {
            ue_index: UeIndex(0),
            crnti: Rnti(0x4601),
            cell_index: CellIndex(0),
            lcids: vec![Lcid(4)],
        });
        ue.dl_buffer_state.insert(Lcid(4), 100);
        ues.insert(UeIndex(0), ue);

        let res = cell.run_slot(sl(0, 1), &mut ues);
        assert_eq!(res.dl.ue_grants.len(), 1);
        let tb = &res.dl.ue_grants[0].tbs[0];
        assert_eq!(tb.lc_lst.len(), 1);
        assert!(tb.lc_lst[0].sched_bytes >= 100);
        assert!(tb.tb_size_bytes >= tb.lc_lst[0].sched_bytes);

        // Backlog was consumed; the next slot carries no grant.
        let res = cell.run_slot(sl(0, 2), &mut ues);
        assert!(res.dl.ue_grants.is_empty());
    }

    #[test]
    fn test_ul_grant_from_bsr() {
        let expert = SchedulerExpertConfig::default();
        let mut cell = CellScheduler::new(test_cell_cfg(), &expert);
        let mut ues = BTreeMap::new();
        let mut ue = SchedUe::new(&SchedUeCreationRequest {
            ue_index: UeIndex(0),
            crnti: Rnti(0x4601),
            cell_index: CellIndex(0),
            lcids: vec![Lcid(4)],
        });
        ue.ul_pending_bytes = 300;
        ues.insert(UeIndex(0), ue);

        let res = cell.run_slot(sl(0, 1), &mut ues);
        assert_eq!(res.ul.puschs.len(), 1);
        assert!(res.ul.puschs[0].pusch_cfg.tb_size_bytes >= 300);
        assert_eq!(ues[&UeIndex(0)].ul_pending_bytes, 0);
    }

    #[test]
    #[should_panic]
    fn test_non_monotonic_slot_panics() {
        let expert = SchedulerExpertConfig::default();
        let mut cell = CellScheduler::new(test_cell_cfg(), &expert);
        let mut ues = BTreeMap::new();
        let _ = cell.run_slot(sl(0, 5), &mut ues);
        let _ = cell.run_slot(sl(0, 4), &mut ues);
    }

    #[test]
    fn test_si_messages_flow_through_cell() {
        let mut cfg = test_cell_cfg();
        cfg.scs = SubcarrierSpacing::Scs30;
        cfg.si_scheduling = Some(SiSchedulingConfig {
            si_window_len_slots: 10,
            si_messages: vec![crate::scheduler::SiMessageSchedulingConfig {
                period_radio_frames: 8,
                msg_len: 64,
            }],
        });
        let expert = SchedulerExpertConfig::default();
        let mut cell = CellScheduler::new(cfg, &expert);
        let mut ues = BTreeMap::new();

        let res = cell.run_slot(SlotPoint::new(SubcarrierSpacing::Scs30, 0, 0), &mut ues);
        assert!(res
            .dl
            .bc
            .sibs
            .iter()
            .any(|s| s.si_indicator == SiIndicator::SiMessage && s.si_msg_index == Some(0)));
    }
}
