//! Common Types for 5G GNodeB
//!
//! Defines fundamental types used throughout the protocol stack

use num_derive::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};

/// Radio Network Temporary Identifier (RNTI)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rnti(pub u16);

impl Rnti {
    /// SI-RNTI used for broadcast system information (TS 38.321 Table 7.1-1)
    pub const SI_RNTI: Self = Self(0xFFFF);
    /// P-RNTI used for paging
    pub const P_RNTI: Self = Self(0xFFFE);

    /// Create a new RNTI
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    /// Get the RNTI value
    pub fn value(&self) -> u16 {
        self.0
    }

    /// RA-RNTI for a PRACH occasion, TS 38.321 Section 5.1.3.
    /// Single-carrier FDD with one occasion per slot: s_id and f_id are zero.
    pub fn ra_rnti(prach_slot_index: u8) -> Self {
        Self(1 + 14 * prach_slot_index as u16)
    }
}

impl std::fmt::Display for Rnti {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Maximum number of cells a DU instance can serve
pub const MAX_CELLS: u16 = 16;

/// Cell index within the DU, in `[0, MAX_CELLS)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellIndex(pub u16);

impl CellIndex {
    /// Create a new cell index with validation
    pub fn new(value: u16) -> Option<Self> {
        if value < MAX_CELLS {
            Some(Self(value))
        } else {
            None
        }
    }
}

impl std::fmt::Display for CellIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maximum number of UEs per DU
pub const MAX_UES: u16 = 1024;

/// DU-scoped UE index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UeIndex(pub u16);

/// Logical Channel Identifier, TS 38.321 Table 6.2.1-1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Lcid(pub u8);

impl Lcid {
    /// Highest LCID identifying a logical channel
    pub const MAX: u8 = 32;

    /// Create a new LCID with validation
    pub fn new(value: u8) -> Option<Self> {
        if value <= Self::MAX {
            Some(Self(value))
        } else {
            None
        }
    }
}

/// Physical Cell Identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pci(pub u16);

impl Pci {
    /// Maximum valid PCI value (0-1007)
    pub const MAX: u16 = 1007;

    /// Create a new PCI with validation
    pub fn new(value: u16) -> Option<Self> {
        if value <= Self::MAX {
            Some(Self(value))
        } else {
            None
        }
    }
}

/// HARQ process identifier (0-15 for NR)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HarqProcessId(pub u8);

/// GTP-U Tunnel Endpoint Identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Teid(pub u32);

impl std::fmt::Display for Teid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Subcarrier spacing values in kHz
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive, Serialize, Deserialize)]
pub enum SubcarrierSpacing {
    /// 15 kHz
    Scs15 = 15,
    /// 30 kHz
    Scs30 = 30,
    /// 60 kHz
    Scs60 = 60,
    /// 120 kHz
    Scs120 = 120,
    /// 240 kHz
    Scs240 = 240,
}

impl SubcarrierSpacing {
    /// Numerology index mu, TS 38.211 Table 4.2-1
    pub fn to_numerology(self) -> u8 {
        match self {
            SubcarrierSpacing::Scs15 => 0,
            SubcarrierSpacing::Scs30 => 1,
            SubcarrierSpacing::Scs60 => 2,
            SubcarrierSpacing::Scs120 => 3,
            SubcarrierSpacing::Scs240 => 4,
        }
    }

    /// Subcarrier spacing for a numerology index
    pub fn from_numerology(mu: u8) -> Option<Self> {
        match mu {
            0 => Some(SubcarrierSpacing::Scs15),
            1 => Some(SubcarrierSpacing::Scs30),
            2 => Some(SubcarrierSpacing::Scs60),
            3 => Some(SubcarrierSpacing::Scs120),
            4 => Some(SubcarrierSpacing::Scs240),
            _ => None,
        }
    }

    /// Number of slots per 10 ms frame
    pub fn nof_slots_per_frame(self) -> u32 {
        10 << self.to_numerology()
    }

    /// Slot duration in microseconds
    pub fn slot_duration_us(self) -> u32 {
        1000 >> self.to_numerology()
    }
}

/// Bandwidth values in MHz
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bandwidth {
    /// 5 MHz
    Bw5,
    /// 10 MHz
    Bw10,
    /// 15 MHz
    Bw15,
    /// 20 MHz
    Bw20,
    /// 40 MHz
    Bw40,
    /// 50 MHz
    Bw50,
    /// 80 MHz
    Bw80,
    /// 100 MHz
    Bw100,
}

impl Bandwidth {
    /// Get bandwidth in Hz
    pub fn as_hz(&self) -> u32 {
        match self {
            Bandwidth::Bw5 => 5_000_000,
            Bandwidth::Bw10 => 10_000_000,
            Bandwidth::Bw15 => 15_000_000,
            Bandwidth::Bw20 => 20_000_000,
            Bandwidth::Bw40 => 40_000_000,
            Bandwidth::Bw50 => 50_000_000,
            Bandwidth::Bw80 => 80_000_000,
            Bandwidth::Bw100 => 100_000_000,
        }
    }

    /// Parse from the `channel_bandwidth_MHz` config value
    pub fn from_mhz(mhz: u32) -> Option<Self> {
        match mhz {
            5 => Some(Bandwidth::Bw5),
            10 => Some(Bandwidth::Bw10),
            15 => Some(Bandwidth::Bw15),
            20 => Some(Bandwidth::Bw20),
            40 => Some(Bandwidth::Bw40),
            50 => Some(Bandwidth::Bw50),
            80 => Some(Bandwidth::Bw80),
            100 => Some(Bandwidth::Bw100),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pci_validation() {
        assert!(Pci::new(0).is_some());
        assert!(Pci::new(1007).is_some());
        assert!(Pci::new(1008).is_none());
    }

    #[test]
    fn test_cell_index_validation() {
        assert!(CellIndex::new(0).is_some());
        assert!(CellIndex::new(MAX_CELLS).is_none());
    }

    #[test]
    fn test_scs_derived_values() {
        assert_eq!(SubcarrierSpacing::Scs15.nof_slots_per_frame(), 10);
        assert_eq!(SubcarrierSpacing::Scs30.nof_slots_per_frame(), 20);
        assert_eq!(SubcarrierSpacing::Scs120.nof_slots_per_frame(), 80);
        assert_eq!(SubcarrierSpacing::Scs15.slot_duration_us(), 1000);
        assert_eq!(SubcarrierSpacing::Scs120.slot_duration_us(), 125);
    }

    #[test]
    fn test_ra_rnti() {
        assert_eq!(Rnti::ra_rnti(0), Rnti(1));
        assert_eq!(Rnti::ra_rnti(3), Rnti(43));
    }

    #[test]
    fn test_bandwidth_conversion() {
        assert_eq!(Bandwidth::Bw20.as_hz(), 20_000_000);
        assert_eq!(Bandwidth::from_mhz(10), Some(Bandwidth::Bw10));
        assert_eq!(Bandwidth::from_mhz(37), None);
    }
}
