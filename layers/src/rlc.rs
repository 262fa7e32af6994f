//! Radio Link Control (RLC) Layer Implementation
//!
//! TX side of a transparent-mode bearer: a FIFO of DL SDUs the MAC
//! multiplexer pulls from at slot time, plus the adapter that feeds it
//! from a GTP-U tunnel and keeps the scheduler's view of the backlog
//! fresh.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::{BufMut, Bytes, BytesMut};
use common::types::{Lcid, Rnti, UeIndex};
use tracing::{debug, warn};

use crate::gtpu::{gtpu_tpdu_offset, GtpuTunnelRxUpperLayer};
use crate::mac::MacSduTxBuilder;
use crate::scheduler::{DlBufferStateIndication, MacScheduler};

/// Transparent-mode TX bearer: SDUs are served in order and never
/// segmented, so a pull smaller than the head SDU returns empty.
#[derive(Default)]
pub struct RlcTxQueue {
    sdus: Mutex<VecDeque<Bytes>>,
}

impl RlcTxQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue one DL SDU.
    pub fn push_sdu(&self, sdu: Bytes) {
        if sdu.is_empty() {
            return;
        }
        self.sdus.lock().unwrap().push_back(sdu);
    }

    /// Queued bytes
    pub fn buffer_state(&self) -> usize {
        self.sdus.lock().unwrap().iter().map(|s| s.len()).sum()
    }
}

impl MacSduTxBuilder for RlcTxQueue {
    fn on_new_tx_sdu(&self, nof_bytes: usize) -> Bytes {
        let mut sdus = self.sdus.lock().unwrap();
        let mut pdu = BytesMut::new();

        while let Some(front) = sdus.front() {
            if pdu.len() + front.len() > nof_bytes {
                break;
            }
            let sdu = sdus.pop_front().expect("front checked above");
            pdu.put_slice(&sdu);
        }

        debug!("RLC TX pull: requested {} bytes, served {}", nof_bytes, pdu.len());
        pdu.freeze()
    }

    fn on_buffer_state_update(&self) -> usize {
        self.buffer_state()
    }
}

/// Connects a GTP-U tunnel to a TX bearer: strips the GTP-U header,
/// enqueues the T-PDU as a DL SDU and reports the new backlog to the
/// scheduler so the next slot can allocate for it.
pub struct GtpuRlcBearerAdapter {
    ue_index: UeIndex,
    rnti: Rnti,
    lcid: Lcid,
    tx_queue: Arc<RlcTxQueue>,
    sched: Arc<dyn MacScheduler>,
}

impl GtpuRlcBearerAdapter {
    pub fn new(
        ue_index: UeIndex,
        rnti: Rnti,
        lcid: Lcid,
        tx_queue: Arc<RlcTxQueue>,
        sched: Arc<dyn MacScheduler>,
    ) -> Self {
        Self {
            ue_index,
            rnti,
            lcid,
            tx_queue,
            sched,
        }
    }
}

impl GtpuTunnelRxUpperLayer for GtpuRlcBearerAdapter {
    fn handle_pdu(&self, pdu: Bytes, _src_addr: SocketAddr) {
        let Some(offset) = gtpu_tpdu_offset(&pdu) else {
            warn!("Dropped malformed GTP-U PDU on bearer rnti={}", self.rnti);
            return;
        };
        if offset >= pdu.len() {
            warn!("Dropped empty T-PDU on bearer rnti={}", self.rnti);
            return;
        }

        self.tx_queue.push_sdu(pdu.slice(offset..));
        self.sched
            .handle_dl_buffer_state_indication(DlBufferStateIndication {
                ue_index: self.ue_index,
                rnti: self.rnti,
                lcid: self.lcid,
                bsr: self.tx_queue.buffer_state(),
            });
    }
}
