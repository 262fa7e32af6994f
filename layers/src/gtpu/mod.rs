//! GTP-U User Plane
//!
//! TEID-based demultiplexing of inbound GTP-U traffic onto per-tunnel
//! executors, plus the minimal wire-format handling the demux needs.

pub mod demux;
pub mod pdu;

use std::net::SocketAddr;

use bytes::Bytes;

pub use demux::GtpuDemux;
pub use pdu::{gtpu_read_teid, gtpu_tpdu_offset, GTPU_PORT};

/// GTP-U demux options
#[derive(Debug, Clone, Default)]
pub struct GtpuDemuxConfig {
    /// Log queue-full drops at warning instead of info level
    pub warn_on_drop: bool,
}

/// Upper-layer entry point of one RX tunnel. Called on the tunnel's
/// executor, never under the demux lock.
pub trait GtpuTunnelRxUpperLayer: Send + Sync {
    fn handle_pdu(&self, pdu: Bytes, src_addr: SocketAddr);
}

/// PCAP sink for inbound GTP-U traffic
pub trait GtpuPcap: Send + Sync {
    fn is_write_enabled(&self) -> bool;
    fn push_pdu(&self, pdu: Bytes);
}

/// Disabled PCAP sink
pub struct NullGtpuPcap;

impl GtpuPcap for NullGtpuPcap {
    fn is_write_enabled(&self) -> bool {
        false
    }

    fn push_pdu(&self, _pdu: Bytes) {}
}
