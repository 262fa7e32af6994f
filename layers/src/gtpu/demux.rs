//! GTP-U Demultiplexer
//!
//! Routes inbound GTP-U datagrams to per-tunnel executors by TEID.
//! Lookup happens twice: once on the socket reader thread to pick the
//! executor, and again on the tunnel executor right before delivery,
//! because the tunnel may be removed while the packet sits in the queue.
//! The guarantee is no dangling handler access, not zero packet loss
//! during removal.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use common::executor::TaskExecutor;
use common::types::Teid;
use common::utils::bytes_to_hex;
use tracing::{debug, error, info, warn};

use super::pdu::{gtpu_read_teid, GTPU_BASE_HEADER_LEN};
use super::{GtpuDemuxConfig, GtpuPcap, GtpuTunnelRxUpperLayer};

struct GtpuTunnelEntry {
    tunnel_exec: TaskExecutor,
    tunnel: Arc<dyn GtpuTunnelRxUpperLayer>,
}

/// TEID-keyed tunnel table with per-tunnel executor dispatch
pub struct GtpuDemux {
    cfg: GtpuDemuxConfig,
    gtpu_pcap: Arc<dyn GtpuPcap>,
    teid_to_tunnel: Mutex<HashMap<Teid, GtpuTunnelEntry>>,
}

impl GtpuDemux {
    pub fn new(cfg: GtpuDemuxConfig, gtpu_pcap: Arc<dyn GtpuPcap>) -> Arc<Self> {
        info!("GTP-U demux. warn_on_drop={}", cfg.warn_on_drop);
        Arc::new(Self {
            cfg,
            gtpu_pcap,
            teid_to_tunnel: Mutex::new(HashMap::new()),
        })
    }

    /// Register a tunnel. Fails if the TEID is already in use.
    pub fn add_tunnel(
        &self,
        teid: Teid,
        tunnel_exec: TaskExecutor,
        tunnel: Arc<dyn GtpuTunnelRxUpperLayer>,
    ) -> bool {
        let mut map = self.teid_to_tunnel.lock().unwrap();
        if map.contains_key(&teid) {
            error!("Tunnel already exists. teid={}", teid);
            return false;
        }
        info!("Tunnel added. teid={}", teid);
        map.insert(teid, GtpuTunnelEntry { tunnel_exec, tunnel });
        true
    }

    /// Remove a tunnel. After this returns no new dispatch for the TEID
    /// happens; in-flight packets are dropped at the dispatch-time
    /// re-lookup.
    pub fn remove_tunnel(&self, teid: Teid) -> bool {
        let mut map = self.teid_to_tunnel.lock().unwrap();
        if map.remove(&teid).is_none() {
            error!("Tunnel not found. teid={}", teid);
            return false;
        }
        info!("Tunnel removed. teid={}", teid);
        true
    }

    /// Entry point for the socket reader thread: parse the TEID, look up
    /// the tunnel and defer the per-packet work onto its executor.
    pub fn handle_pdu(self: Arc<Self>, pdu: Bytes, src_addr: SocketAddr) {
        let Some(teid) = gtpu_read_teid(&pdu) else {
            error!(
                "Failed to read TEID from GTP-U PDU. pdu_len={} hdr=[{}]",
                pdu.len(),
                bytes_to_hex(&pdu[..pdu.len().min(GTPU_BASE_HEADER_LEN)])
            );
            return;
        };

        let map = self.teid_to_tunnel.lock().unwrap();
        let Some(entry) = map.get(&teid) else {
            info!("Dropped GTP-U PDU, tunnel not found. teid={}", teid);
            return;
        };

        let this = Arc::clone(&self);
        let deferred =
            entry
                .tunnel_exec
                .defer(Box::new(move || this.handle_pdu_impl(teid, pdu, src_addr)));
        if !deferred {
            if self.cfg.warn_on_drop {
                warn!("Dropped GTP-U PDU, queue is full. teid={}", teid);
            } else {
                info!("Dropped GTP-U PDU, queue is full. teid={}", teid);
            }
        }
    }

    /// Per-packet work on the tunnel executor.
    fn handle_pdu_impl(&self, teid: Teid, pdu: Bytes, src_addr: SocketAddr) {
        if self.gtpu_pcap.is_write_enabled() {
            self.gtpu_pcap.push_pdu(Bytes::copy_from_slice(&pdu));
        }

        debug!("Forwarding PDU. pdu_len={} teid={}", pdu.len(), teid);

        // Look the tunnel up again: it may have been removed between the
        // time PDU processing was enqueued and the time the task runs.
        let tunnel = {
            let map = self.teid_to_tunnel.lock().unwrap();
            let Some(entry) = map.get(&teid) else {
                info!("Dropped GTP-U PDU, tunnel not found. teid={}", teid);
                return;
            };
            entry.tunnel.clone()
        };
        // The lock is released before entering the tunnel so its
        // processing never blocks add/remove on other TEIDs.
        tunnel.handle_pdu(pdu, src_addr);
    }
}
