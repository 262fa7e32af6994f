//! MAC DL Cell Processor
//!
//! Slot-driven pipeline of one cell: on every slot indication it pulls
//! the scheduler result, assembles the DL control (SSB PDUs, packed
//! DCIs), data (SIB/RAR/UE PDUs) and UL messages, and submits them to
//! the PHY in that order. All slot work runs on the cell's own executor,
//! so the DL state needs no locking; `start()`/`stop()` hop to the cell
//! executor and resume on the control executor.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use common::executor::TaskExecutor;
use common::slot_point::SlotPoint;
use common::types::Rnti;
use tokio::sync::oneshot;
use tracing::warn;

use super::dci::encode_dci;
use super::pdu_encoder::{encode_rar_pdu, SibPduEncoder};
use super::ssb::SsbHelper;
use super::ue_manager::MacDlUeManager;
use super::{
    MacCellCreationRequest, MacCellResultNotifier, MacDlDataResult, MacDlSchedResult,
    MacUlSchedResult, MAX_SIB1_PDUS_PER_SLOT, MIN_MAC_SDU_SIZE,
};
use crate::scheduler::result::{DlSchedResult, SchedResult};
use crate::scheduler::{DlBufferStateIndication, MacScheduler};
use crate::LayerError;

const CELL_INACTIVE: u8 = 0;
const CELL_ACTIVE: u8 = 1;

/// Per-cell MAC DL processor
pub struct MacCellProcessor {
    cell_cfg: MacCellCreationRequest,
    state: AtomicU8,
    cell_exec: TaskExecutor,
    ctrl_exec: TaskExecutor,
    phy_cell: Arc<dyn MacCellResultNotifier>,
    ssb_helper: SsbHelper,
    sib_encoder: SibPduEncoder,
    sched_obj: Arc<dyn MacScheduler>,
    ue_mng: Arc<MacDlUeManager>,
}

impl MacCellProcessor {
    pub fn new(
        cell_cfg: MacCellCreationRequest,
        cell_exec: TaskExecutor,
        ctrl_exec: TaskExecutor,
        phy_cell: Arc<dyn MacCellResultNotifier>,
        sched_obj: Arc<dyn MacScheduler>,
        ue_mng: Arc<MacDlUeManager>,
    ) -> Arc<Self> {
        let ssb_helper = SsbHelper::new(&cell_cfg);
        let sib_encoder = SibPduEncoder::new(cell_cfg.bcch_dl_sch_payload.clone());
        Arc::new(Self {
            cell_cfg,
            state: AtomicU8::new(CELL_INACTIVE),
            cell_exec,
            ctrl_exec,
            phy_cell,
            ssb_helper,
            sib_encoder,
            sched_obj,
            ue_mng,
        })
    }

    /// Activate the cell: hop to the cell executor, flip the state and
    /// resume on the control executor.
    pub async fn start(self: Arc<Self>) -> Result<(), LayerError> {
        self.transition(CELL_ACTIVE).await
    }

    /// Deactivate the cell with the same two-hop handshake.
    pub async fn stop(self: Arc<Self>) -> Result<(), LayerError> {
        self.transition(CELL_INACTIVE).await
    }

    async fn transition(self: Arc<Self>, new_state: u8) -> Result<(), LayerError> {
        let (done_tx, done_rx) = oneshot::channel();
        let this = Arc::clone(&self);
        let ctrl_exec = self.ctrl_exec.clone();

        let dispatched = self.cell_exec.execute(Box::new(move || {
            this.state.store(new_state, Ordering::Release);
            // Resume the caller from the control executor. If its queue
            // is full the sender drops and the await below reports it.
            let _ = ctrl_exec.execute(Box::new(move || {
                let _ = done_tx.send(());
            }));
        }));
        if !dispatched {
            return Err(LayerError::QueueFull("cell executor"));
        }

        done_rx
            .await
            .map_err(|_| LayerError::InvalidState("cell state handshake aborted".into()))
    }

    /// Entry point for the PHY's slot indications. Re-dispatches the
    /// slot work onto the cell executor and returns immediately.
    pub fn handle_slot_indication(self: Arc<Self>, sl_tx: SlotPoint) {
        let cell_exec = self.cell_exec.clone();
        let cell_index = self.cell_cfg.cell_index;
        let this = self;
        if !cell_exec.execute(Box::new(move || this.handle_slot_indication_impl(sl_tx))) {
            warn!("Cell {} executor full, slot={} skipped", cell_index, sl_tx);
        }
    }

    fn handle_slot_indication_impl(&self, sl_tx: SlotPoint) {
        if self.state.load(Ordering::Acquire) != CELL_ACTIVE {
            // The PHY clock must keep ticking while the cell is down.
            self.phy_cell
                .on_new_downlink_scheduler_results(MacDlSchedResult::empty(sl_tx));
            return;
        }

        // Generate DL scheduling result for provided slot and cell.
        let Some(sl_res) = self
            .sched_obj
            .slot_indication(sl_tx, self.cell_cfg.cell_index)
        else {
            warn!(
                "Unable to compute scheduling result for slot={}, cell={}",
                sl_tx, self.cell_cfg.cell_index
            );
            self.phy_cell
                .on_new_downlink_scheduler_results(MacDlSchedResult::empty(sl_tx));
            return;
        };

        // Assemble and send the DL control result first so the PHY can
        // start encoding DCIs while the SDUs are pulled below.
        let mac_dl_res = self.assemble_dl_sched_request(sl_tx, &sl_res);
        self.phy_cell.on_new_downlink_scheduler_results(mac_dl_res);

        // Assemble and send the slot data result.
        let data_res = self.assemble_dl_data_request(sl_tx, &sl_res.dl);
        self.phy_cell.on_new_downlink_data(data_res);

        // Send UL scheduler result to PHY.
        self.phy_cell.on_new_uplink_scheduler_results(MacUlSchedResult {
            slot: sl_tx,
            ul_res: Some(sl_res.clone()),
        });

        // Update DL buffer state for the allocated logical channels.
        self.update_logical_channel_dl_buffer_states(&sl_res.dl);
    }

    fn assemble_dl_sched_request(
        &self,
        sl_tx: SlotPoint,
        sl_res: &Arc<SchedResult>,
    ) -> MacDlSchedResult {
        let mut mac_res = MacDlSchedResult {
            slot: sl_tx,
            dl_res: Some(sl_res.clone()),
            ssb_pdus: Vec::new(),
            pdcch_pdus: Vec::new(),
        };

        // Assemble SSB scheduling info and the SSB/MIB parameters the
        // PHY needs on top of it.
        for ssb in &sl_res.dl.bc.ssb_info {
            mac_res.ssb_pdus.push(self.ssb_helper.assemble_ssb(ssb));
        }

        // Encode PDCCH DCI payloads.
        for pdcch in &sl_res.dl.dl_pdcchs {
            mac_res.pdcch_pdus.push(encode_dci(&pdcch.dci));
        }

        mac_res
    }

    fn assemble_dl_data_request(&self, sl_tx: SlotPoint, dl_res: &DlSchedResult) -> MacDlDataResult {
        let mut data_res = MacDlDataResult::new(sl_tx);

        // Assemble scheduled BCCH-DL-SCH messages carrying SIB payload.
        for sib_info in &dl_res.bc.sibs {
            assert!(
                data_res.sib1_pdus.len() < MAX_SIB1_PDUS_PER_SLOT,
                "No SIB1 added as SIB1 list in MAC DL data results is already full"
            );
            data_res
                .sib1_pdus
                .push(self.sib_encoder.encode_sib_pdu(sib_info.pdsch_cfg.tb_size_bytes));
        }

        // Assemble scheduled RARs' payload.
        for rar in &dl_res.rar_grants {
            data_res.rar_pdus.push(encode_rar_pdu(rar));
        }

        // Assemble data grants.
        for grant in &dl_res.ue_grants {
            for tb_info in &grant.tbs {
                for bearer_alloc in &tb_info.lc_lst {
                    let bearer = self.get_bearer_or_die(grant.crnti, bearer_alloc);

                    let mut rem_bytes = bearer_alloc.sched_bytes;
                    while rem_bytes >= MIN_MAC_SDU_SIZE {
                        let sdu = bearer.on_new_tx_sdu(bearer_alloc.sched_bytes);
                        if sdu.is_empty() {
                            break;
                        }
                        rem_bytes -= sdu.len().min(rem_bytes);
                        data_res.ue_pdus.push(sdu);
                    }
                }
            }
        }

        data_res
    }

    fn update_logical_channel_dl_buffer_states(&self, dl_res: &DlSchedResult) {
        for grant in &dl_res.ue_grants {
            for tb_info in &grant.tbs {
                for bearer_alloc in &tb_info.lc_lst {
                    let bearer = self.get_bearer_or_die(grant.crnti, bearer_alloc);

                    let ue_index = self
                        .ue_mng
                        .get_ue_index(grant.crnti)
                        .unwrap_or_else(|| panic!("No UE index for rnti={}", grant.crnti));

                    // Feed the post-pull backlog to the scheduler so the
                    // next slot works from fresh values.
                    self.sched_obj
                        .handle_dl_buffer_state_indication(DlBufferStateIndication {
                            ue_index,
                            rnti: grant.crnti,
                            lcid: bearer_alloc.lcid,
                            bsr: bearer.on_buffer_state_update(),
                        });
                }
            }
        }
    }

    fn get_bearer_or_die(
        &self,
        crnti: Rnti,
        bearer_alloc: &crate::scheduler::result::DlMsgLcInfo,
    ) -> Arc<dyn super::MacSduTxBuilder> {
        self.ue_mng
            .get_bearer(crnti, bearer_alloc.lcid)
            .unwrap_or_else(|| {
                panic!(
                    "Scheduler is allocating inexistent bearer rnti={} lcid={:?}",
                    crnti, bearer_alloc.lcid
                )
            })
    }
}
