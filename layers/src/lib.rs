//! Protocol Stack Layers Library
//!
//! This crate implements the L2 downlink path of the gNB: the MAC cell
//! processor and its scheduler, the GTP-U user-plane demultiplexer, the
//! RLC TX bearers feeding the MAC, and the PHY-side receive soft-buffer
//! pool.

pub mod gtpu;
pub mod mac;
pub mod phy;
pub mod rlc;
pub mod scheduler;

use thiserror::Error;

/// Common errors for protocol layers
#[derive(Error, Debug)]
pub enum LayerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Executor queue full: {0}")]
    QueueFull(&'static str),
}
