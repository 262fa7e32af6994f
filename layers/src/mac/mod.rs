//! Medium Access Control (MAC) Layer Implementation
//!
//! Implements the 5G NR MAC downlink path according to 3GPP TS 38.321:
//! the slot-driven cell processor, DCI payload packing, SIB/RAR PDU
//! encoding and the UE/bearer registry the scheduler output is resolved
//! against.

pub mod cell_processor;
pub mod dci;
pub mod pdu_encoder;
pub mod ssb;
pub mod ue_manager;

use std::sync::Arc;

use bytes::Bytes;
use common::slot_point::SlotPoint;
use common::types::{CellIndex, Pci, SubcarrierSpacing};

use crate::scheduler::result::SchedResult;

pub use cell_processor::MacCellProcessor;
pub use dci::DciPayload;
pub use pdu_encoder::{encode_rar_pdu, SibPduEncoder};
pub use ssb::{BetaPssProfile, DlSsbPdu, DmrsTypeAPosition, SsbCase, SsbHelper, SsbMibDataPdu};
pub use ue_manager::MacDlUeManager;

/// Smallest MAC SDU worth pulling from RLC: subheader plus one byte
pub const MIN_MAC_SDU_SIZE: usize = 3;

/// Capacity of the per-slot SIB1 PDU list handed to the PHY
pub const MAX_SIB1_PDUS_PER_SLOT: usize = 4;

/// SSB-related parameters of a cell
#[derive(Debug, Clone)]
pub struct MacSsbConfig {
    pub ssb_subcarrier_offset: u8,
    pub offset_to_point_a: u16,
    pub beta_pss_profile: BetaPssProfile,
    pub ssb_case: SsbCase,
    /// Maximum number of SSB beams (L_max)
    pub l_max: u8,
}

/// MIB fields carried on every SSB
#[derive(Debug, Clone)]
pub struct MacMibConfig {
    pub dmrs_type_a_position: DmrsTypeAPosition,
    pub pdcch_config_sib1: u8,
    pub cell_barred: bool,
    pub intra_freq_reselection: bool,
}

/// Static cell parameters owned by the MAC DL processor
#[derive(Debug, Clone)]
pub struct MacCellCreationRequest {
    pub cell_index: CellIndex,
    pub pci: Pci,
    pub scs: SubcarrierSpacing,
    pub ssb_cfg: MacSsbConfig,
    pub mib: MacMibConfig,
    /// Encoded BCCH-DL-SCH (SIB1) payload
    pub bcch_dl_sch_payload: Bytes,
}

/// DL control-plane result of one slot, first of the three per-slot PHY
/// submissions.
#[derive(Debug, Clone)]
pub struct MacDlSchedResult {
    pub slot: SlotPoint,
    /// The scheduler result this slot is built from; `None` when the
    /// cell is inactive or the scheduler produced nothing.
    pub dl_res: Option<Arc<SchedResult>>,
    pub ssb_pdus: Vec<DlSsbPdu>,
    pub pdcch_pdus: Vec<DciPayload>,
}

impl MacDlSchedResult {
    /// Empty result used to keep the PHY clock ticking
    pub fn empty(slot: SlotPoint) -> Self {
        Self {
            slot,
            dl_res: None,
            ssb_pdus: Vec::new(),
            pdcch_pdus: Vec::new(),
        }
    }
}

/// DL data result of one slot, second PHY submission
#[derive(Debug, Clone)]
pub struct MacDlDataResult {
    pub slot: SlotPoint,
    pub sib1_pdus: Vec<Bytes>,
    pub rar_pdus: Vec<Bytes>,
    pub ue_pdus: Vec<Bytes>,
}

impl MacDlDataResult {
    pub fn new(slot: SlotPoint) -> Self {
        Self {
            slot,
            sib1_pdus: Vec::new(),
            rar_pdus: Vec::new(),
            ue_pdus: Vec::new(),
        }
    }
}

/// UL scheduling result of one slot, third PHY submission
#[derive(Debug, Clone)]
pub struct MacUlSchedResult {
    pub slot: SlotPoint,
    /// UL grants are opaque to the MAC DL path and passed through.
    pub ul_res: Option<Arc<SchedResult>>,
}

/// PHY-side sink of the per-slot MAC results. The three calls for a
/// given slot arrive in order: scheduler results, data, UL results.
pub trait MacCellResultNotifier: Send + Sync {
    fn on_new_downlink_scheduler_results(&self, dl_res: MacDlSchedResult);
    fn on_new_downlink_data(&self, dl_data: MacDlDataResult);
    fn on_new_uplink_scheduler_results(&self, ul_res: MacUlSchedResult);
}

/// TX side of an RLC bearer as seen by the MAC multiplexer
pub trait MacSduTxBuilder: Send + Sync {
    /// Pull up to `nof_bytes` of RLC PDUs. An empty buffer means the
    /// bearer has nothing to send right now.
    fn on_new_tx_sdu(&self, nof_bytes: usize) -> Bytes;

    /// Current TX backlog in bytes
    fn on_buffer_state_update(&self) -> usize;
}
