//! SI Message Window Scheduler
//!
//! Computes the transmission windows of the configured SI messages and
//! places one BCCH-DL-SCH grant per open window. Window timing follows
//! TS 38.331 Section 5.2.2.3.2: for SI message n (1-based), with
//! x = (n - 1) * w, the window opens at slot `a = x mod N` of the frame
//! satisfying `SFN mod T = floor(x / N)` and stays open for w slots.

use common::prb::PrbGrant;
use common::slot_point::SlotPoint;
use common::types::Rnti;
use tracing::{debug, info};

use super::cell::SlotResourceAllocator;
use super::result::*;
use super::support::*;
use super::SiSchedulingConfig;

/// Tracks the currently open window of one SI message
#[derive(Debug, Clone, Copy, Default)]
struct MessageWindowContext {
    window_start: Option<SlotPoint>,
    nof_tx: u32,
}

/// Sub-scheduler for SI messages other than SIB1
pub(crate) struct SiMessageScheduler {
    cfg: Option<SiSchedulingConfig>,
    mcs_index: u8,
    dci_aggr_lev: u8,
    other_si_ss_id: u8,
    bwp_prbs: u16,
    pending_messages: Vec<MessageWindowContext>,
}

impl SiMessageScheduler {
    pub fn new(
        cfg: Option<SiSchedulingConfig>,
        mcs_index: u8,
        dci_aggr_lev: u8,
        other_si_ss_id: u8,
        bwp_prbs: u16,
    ) -> Self {
        let nof_messages = cfg.as_ref().map_or(0, |c| c.si_messages.len());
        Self {
            cfg,
            mcs_index,
            dci_aggr_lev,
            other_si_ss_id,
            bwp_prbs,
            pending_messages: vec![MessageWindowContext::default(); nof_messages],
        }
    }

    /// Update windows and attempt the pending placements for this slot.
    pub fn run_slot(
        &mut self,
        sl: SlotPoint,
        slot_alloc: &mut SlotResourceAllocator,
        result: &mut SchedResult,
    ) {
        if self.cfg.is_none() {
            return;
        }
        self.update_si_message_windows(sl);
        self.schedule_pending_si_messages(slot_alloc, result);
    }

    fn update_si_message_windows(&mut self, sl: SlotPoint) {
        let cfg = self.cfg.as_ref().expect("checked by caller");
        let sfn = sl.sfn() as u32;

        for (i, ctxt) in self.pending_messages.iter_mut().enumerate() {
            let si_msg = &cfg.si_messages[i];

            if let Some(window_start) = ctxt.window_start {
                // Message is already in its window; check for the end.
                if window_start + cfg.si_window_len_slots < sl {
                    if ctxt.nof_tx == 0 {
                        info!("SI message {} window closed without transmission", i);
                    }
                    ctxt.window_start = None;
                    ctxt.nof_tx = 0;
                }
                continue;
            }

            // n is the 1-based order of entry in the SI scheduling list.
            let n = (i + 1) as u32;
            let x = (n - 1) * cfg.si_window_len_slots;

            let nof_slots = sl.nof_slots_per_frame();
            let a = x % nof_slots;
            if sl.slot_index() != a {
                continue;
            }

            let t = si_msg.period_radio_frames;
            if sfn % t != x / nof_slots {
                continue;
            }

            ctxt.window_start = Some(sl);
            ctxt.nof_tx = 0;
            debug!("SI message {} window opened at slot {}", i, sl);
        }
    }

    /// Place each open window's message once, in configured index order.
    fn schedule_pending_si_messages(
        &mut self,
        slot_alloc: &mut SlotResourceAllocator,
        result: &mut SchedResult,
    ) {
        let cfg = self.cfg.as_ref().expect("checked by caller");
        for (i, ctxt) in self.pending_messages.iter_mut().enumerate() {
            if ctxt.window_start.is_none() || ctxt.nof_tx > 0 {
                continue;
            }
            if allocate_si_pdsch(
                slot_alloc,
                result,
                self.bwp_prbs,
                cfg.si_messages[i].msg_len,
                self.mcs_index,
                self.dci_aggr_lev,
                self.other_si_ss_id,
                SiIndicator::SiMessage,
                Some(i),
            ) {
                ctxt.nof_tx += 1;
            }
        }
    }
}

/// Place one BCCH-DL-SCH grant (SIB1 or an SI message): dimension the
/// PDSCH, reserve a PDCCH candidate, mark the PRBs and record the DCI
/// and grant. Failures leave the slot untouched and are retried by the
/// caller on a later slot.
#[allow(clippy::too_many_arguments)]
pub(crate) fn allocate_si_pdsch(
    slot_alloc: &mut SlotResourceAllocator,
    result: &mut SchedResult,
    bwp_prbs: u16,
    payload_len: usize,
    mcs_index: u8,
    aggr_lvl: u8,
    ss_id: u8,
    si_indicator: SiIndicator,
    si_msg_index: Option<usize>,
) -> bool {
    // nof_oh_prb = 0: PDSCH scheduled by SI-RNTI-scrambled PDCCH carries
    // no configured overhead (TS 38.214 Section 5.1.3.2).
    let nof_oh_prb = 0;
    let nof_layers = 1;
    let symbols = OfdmSymbols::new(2, 14);

    let mcs = pdsch_mcs_get_config_qam64(mcs_index);
    let si_prbs_tbs = get_nof_prbs(PrbsCalculatorSchConfig {
        payload_size_bytes: payload_len,
        nof_symb_sh: symbols.length() as u32,
        nof_dmrs_prb: calculate_nof_dmrs_per_rb(),
        nof_oh_prb,
        mcs,
        nof_layers,
    });

    // Find available RBs in PDSCH for the BCCH grant.
    let si_prbs = slot_alloc
        .dl_prbs
        .find_empty_interval_of_length(si_prbs_tbs.nof_prbs as usize, 0);
    if si_prbs.length() < si_prbs_tbs.nof_prbs {
        info!(
            "Skipping SI scheduling. Cause: Not enough PDSCH space for message index {:?}",
            si_msg_index
        );
        return false;
    }

    // Allocate the DCI 1_0 candidate on PDCCH.
    let Some(cce_index) = slot_alloc.alloc_dl_pdcch(aggr_lvl) else {
        info!(
            "Skipping SI scheduling. Cause: Not enough PDCCH space for message index {:?}",
            si_msg_index
        );
        return false;
    };

    // Space exists on both channels; commit the PRBs.
    slot_alloc.dl_prbs |= si_prbs;

    let system_information_indicator = match si_indicator {
        SiIndicator::Sib1 => 0,
        SiIndicator::SiMessage => 1,
    };
    result.dl.dl_pdcchs.push(PdcchDlInformation {
        rnti: Rnti::SI_RNTI,
        ss_id,
        aggr_lvl,
        cce_index,
        dci: DciDlInfo::SiF10(Dci10SiRntiConfig {
            n_rb_bwp: bwp_prbs,
            frequency_resource: rb_alloc_riv(bwp_prbs as u32, si_prbs.start(), si_prbs.length())
                as u16,
            time_resource: 0,
            vrb_to_prb_mapping: false,
            mcs_index,
            redundancy_version: 0,
            system_information_indicator,
        }),
    });
    result.dl.bc.sibs.push(SibInformation {
        si_indicator,
        si_msg_index,
        pdsch_cfg: PdschInformation {
            rnti: Rnti::SI_RNTI,
            prbs: PrbGrant::from(si_prbs),
            symbols,
            mcs_index,
            tb_size_bytes: si_prbs_tbs.tbs_bytes,
        },
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SiMessageSchedulingConfig;
    use common::types::SubcarrierSpacing;

    // N = 20 slots per frame at 30 kHz SCS.
    fn sl30(sfn: u16, slot: u32) -> SlotPoint {
        SlotPoint::new(SubcarrierSpacing::Scs30, sfn, slot)
    }

    fn scheduler_with(nof_msgs: usize, period: u32, window: u32) -> SiMessageScheduler {
        SiMessageScheduler::new(
            Some(SiSchedulingConfig {
                si_window_len_slots: window,
                si_messages: (0..nof_msgs)
                    .map(|_| SiMessageSchedulingConfig {
                        period_radio_frames: period,
                        msg_len: 64,
                    })
                    .collect(),
            }),
            5,
            4,
            3,
            52,
        )
    }

    fn fresh_alloc() -> SlotResourceAllocator {
        SlotResourceAllocator::new_for_test(52, 52, 8, sl30(0, 0))
    }

    #[test]
    fn test_window_open_slots() {
        // W = 10, N = 20, T = 8 frames.
        let mut sched = scheduler_with(3, 8, 10);

        // Message 0: x = 0 -> slot 0 of frames with SFN mod 8 == 0.
        sched.update_si_message_windows(sl30(0, 0));
        assert_eq!(sched.pending_messages[0].window_start, Some(sl30(0, 0)));
        // Message 1: x = 10 -> slot 10 of the same frame.
        sched.update_si_message_windows(sl30(0, 10));
        assert_eq!(sched.pending_messages[1].window_start, Some(sl30(0, 10)));
        // Message 2: x = 20 -> slot 0 of frames with SFN mod 8 == 1.
        sched.update_si_message_windows(sl30(1, 0));
        assert_eq!(sched.pending_messages[2].window_start, Some(sl30(1, 0)));
    }

    #[test]
    fn test_window_does_not_open_elsewhere() {
        let mut sched = scheduler_with(1, 8, 10);
        sched.update_si_message_windows(sl30(0, 1));
        sched.update_si_message_windows(sl30(1, 0));
        sched.update_si_message_windows(sl30(7, 0));
        assert!(sched.pending_messages[0].window_start.is_none());
        // Next period: SFN 8 qualifies again.
        sched.update_si_message_windows(sl30(8, 0));
        assert_eq!(sched.pending_messages[0].window_start, Some(sl30(8, 0)));
    }

    #[test]
    fn test_window_closes_after_length() {
        let mut sched = scheduler_with(1, 8, 10);
        sched.update_si_message_windows(sl30(0, 0));
        assert!(sched.pending_messages[0].window_start.is_some());
        // Still open at the last covered slot.
        sched.update_si_message_windows(sl30(0, 10));
        assert!(sched.pending_messages[0].window_start.is_some());
        // One slot later the window has expired.
        sched.update_si_message_windows(sl30(0, 11));
        assert!(sched.pending_messages[0].window_start.is_none());
    }

    #[test]
    fn test_placement_once_per_window() {
        let mut sched = scheduler_with(1, 8, 10);
        let mut alloc = fresh_alloc();
        let mut result = SchedResult::default();

        sched.run_slot(sl30(0, 0), &mut alloc, &mut result);
        assert_eq!(result.dl.bc.sibs.len(), 1);
        assert_eq!(result.dl.bc.sibs[0].si_msg_index, Some(0));
        assert_eq!(result.dl.bc.sibs[0].si_indicator, SiIndicator::SiMessage);

        // Window still open, but the message already went out.
        let mut result2 = SchedResult::default();
        sched.run_slot(sl30(0, 1), &mut alloc, &mut result2);
        assert!(result2.dl.bc.sibs.is_empty());
    }

    #[test]
    fn test_placement_failure_retries_within_window() {
        let mut sched = scheduler_with(1, 8, 10);
        let mut alloc = fresh_alloc();

        // Fill the grid so the first attempt fails.
        alloc.dl_prbs.fill(0, 52);
        let mut result = SchedResult::default();
        sched.run_slot(sl30(0, 0), &mut alloc, &mut result);
        assert!(result.dl.bc.sibs.is_empty());

        // Next slot inside the window succeeds on a clean grid.
        let mut alloc2 = fresh_alloc();
        let mut result2 = SchedResult::default();
        sched.run_slot(sl30(0, 1), &mut alloc2, &mut result2);
        assert_eq!(result2.dl.bc.sibs.len(), 1);
    }

    #[test]
    fn test_allocate_rolls_back_nothing_on_pdcch_failure() {
        let mut alloc = fresh_alloc();
        // Exhaust all CCEs.
        while alloc.alloc_dl_pdcch(4).is_some() {}
        let used_before = alloc.dl_prbs.count_ones();
        let mut result = SchedResult::default();
        let ok = allocate_si_pdsch(
            &mut alloc,
            &mut result,
            52,
            64,
            5,
            4,
            3,
            SiIndicator::SiMessage,
            Some(0),
        );
        assert!(!ok);
        assert_eq!(alloc.dl_prbs.count_ones(), used_before);
        assert!(result.dl.bc.sibs.is_empty());
    }

    #[test]
    fn test_dci_fields_of_placed_message() {
        let mut sched = scheduler_with(1, 8, 10);
        let mut alloc = fresh_alloc();
        let mut result = SchedResult::default();
        sched.run_slot(sl30(0, 0), &mut alloc, &mut result);

        let pdcch = &result.dl.dl_pdcchs[0];
        assert_eq!(pdcch.rnti, Rnti::SI_RNTI);
        assert_eq!(pdcch.ss_id, 3);
        let DciDlInfo::SiF10(dci) = &pdcch.dci else {
            panic!("expected SI-RNTI DCI");
        };
        assert_eq!(dci.system_information_indicator, 1);
        assert_eq!(dci.mcs_index, 5);
    }
}
