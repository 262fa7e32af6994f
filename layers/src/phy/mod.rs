//! PHY Support Components
//!
//! The PHY proper (OFDM, channel coding, channel estimation) lives
//! behind external interfaces; this module carries the uplink receive
//! soft-buffer pool the PUSCH decoder combines HARQ retransmissions in.

pub mod softbuffer;

pub use softbuffer::{RxSoftbufferPool, RxSoftbufferPoolConfig, SoftbufferId};
