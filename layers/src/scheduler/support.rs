//! Scheduler Support Math
//!
//! MCS lookup, DMRS overhead and PRB/TBS sizing used when dimensioning
//! PDSCH and PUSCH allocations.

/// Modulation order and target code rate of one MCS entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchMcsDescription {
    /// Bits per modulation symbol (2 = QPSK, 4 = 16QAM, 6 = 64QAM)
    pub modulation_order: u8,
    /// Target code rate times 1024
    pub target_code_rate_x1024: u16,
}

/// MCS table for PDSCH with max 64QAM, TS 38.214 Table 5.1.3.1-1
const PDSCH_MCS_TABLE_QAM64: [SchMcsDescription; 29] = [
    SchMcsDescription { modulation_order: 2, target_code_rate_x1024: 120 },
    SchMcsDescription { modulation_order: 2, target_code_rate_x1024: 157 },
    SchMcsDescription { modulation_order: 2, target_code_rate_x1024: 193 },
    SchMcsDescription { modulation_order: 2, target_code_rate_x1024: 251 },
    SchMcsDescription { modulation_order: 2, target_code_rate_x1024: 308 },
    SchMcsDescription { modulation_order: 2, target_code_rate_x1024: 379 },
    SchMcsDescription { modulation_order: 2, target_code_rate_x1024: 449 },
    SchMcsDescription { modulation_order: 2, target_code_rate_x1024: 526 },
    SchMcsDescription { modulation_order: 2, target_code_rate_x1024: 602 },
    SchMcsDescription { modulation_order: 2, target_code_rate_x1024: 679 },
    SchMcsDescription { modulation_order: 4, target_code_rate_x1024: 340 },
    SchMcsDescription { modulation_order: 4, target_code_rate_x1024: 378 },
    SchMcsDescription { modulation_order: 4, target_code_rate_x1024: 434 },
    SchMcsDescription { modulation_order: 4, target_code_rate_x1024: 490 },
    SchMcsDescription { modulation_order: 4, target_code_rate_x1024: 553 },
    SchMcsDescription { modulation_order: 4, target_code_rate_x1024: 616 },
    SchMcsDescription { modulation_order: 4, target_code_rate_x1024: 658 },
    SchMcsDescription { modulation_order: 6, target_code_rate_x1024: 438 },
    SchMcsDescription { modulation_order: 6, target_code_rate_x1024: 466 },
    SchMcsDescription { modulation_order: 6, target_code_rate_x1024: 517 },
    SchMcsDescription { modulation_order: 6, target_code_rate_x1024: 567 },
    SchMcsDescription { modulation_order: 6, target_code_rate_x1024: 616 },
    SchMcsDescription { modulation_order: 6, target_code_rate_x1024: 666 },
    SchMcsDescription { modulation_order: 6, target_code_rate_x1024: 719 },
    SchMcsDescription { modulation_order: 6, target_code_rate_x1024: 772 },
    SchMcsDescription { modulation_order: 6, target_code_rate_x1024: 822 },
    SchMcsDescription { modulation_order: 6, target_code_rate_x1024: 873 },
    SchMcsDescription { modulation_order: 6, target_code_rate_x1024: 910 },
    SchMcsDescription { modulation_order: 6, target_code_rate_x1024: 948 },
];

/// Look up one entry of the QAM64 PDSCH MCS table. Indices 29-31 are
/// reserved for retransmissions and not valid here.
pub fn pdsch_mcs_get_config_qam64(mcs_index: u8) -> SchMcsDescription {
    assert!(
        (mcs_index as usize) < PDSCH_MCS_TABLE_QAM64.len(),
        "Invalid QAM64 MCS index {}",
        mcs_index
    );
    PDSCH_MCS_TABLE_QAM64[mcs_index as usize]
}

/// Number of resource elements per RB taken by DMRS: configuration
/// type 1 with a single front-loaded symbol occupies every second
/// subcarrier of that symbol.
pub fn calculate_nof_dmrs_per_rb() -> u32 {
    6
}

/// Maximum resource elements per PRB counted towards TBS, TS 38.214
/// Section 5.1.3.2.
const MAX_NOF_RE_PER_PRB: u32 = 156;

/// Outcome of the PRB dimensioning: PRB count and the transport block
/// size those PRBs carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchPrbsTbs {
    pub nof_prbs: u32,
    pub tbs_bytes: usize,
}

/// Inputs for [`get_nof_prbs`]
#[derive(Debug, Clone, Copy)]
pub struct PrbsCalculatorSchConfig {
    pub payload_size_bytes: usize,
    /// OFDM symbols of the time-domain resource
    pub nof_symb_sh: u32,
    /// DMRS resource elements per PRB
    pub nof_dmrs_prb: u32,
    /// Extra overhead resource elements per PRB
    pub nof_oh_prb: u32,
    pub mcs: SchMcsDescription,
    pub nof_layers: u32,
}

/// Compute the smallest PRB count whose transport block fits
/// `payload_size_bytes`, together with the resulting TBS. The TBS is
/// never smaller than the payload.
pub fn get_nof_prbs(cfg: PrbsCalculatorSchConfig) -> SchPrbsTbs {
    let bits_per_prb = bits_per_prb(&cfg);
    let payload_bits = (cfg.payload_size_bytes * 8) as f64;
    let nof_prbs = (payload_bits / bits_per_prb).ceil() as u32;
    let nof_prbs = nof_prbs.max(1);
    SchPrbsTbs {
        nof_prbs,
        tbs_bytes: (nof_prbs as f64 * bits_per_prb / 8.0).floor() as usize,
    }
}

/// Transport block size carried by `nof_prbs` PRBs under `cfg`
pub fn estimate_tbs_bytes(nof_prbs: u32, cfg: &PrbsCalculatorSchConfig) -> usize {
    (nof_prbs as f64 * bits_per_prb(cfg) / 8.0).floor() as usize
}

fn bits_per_prb(cfg: &PrbsCalculatorSchConfig) -> f64 {
    let re_per_prb = (12 * cfg.nof_symb_sh)
        .saturating_sub(cfg.nof_dmrs_prb)
        .saturating_sub(cfg.nof_oh_prb)
        .min(MAX_NOF_RE_PER_PRB);
    re_per_prb as f64
        * cfg.mcs.modulation_order as f64
        * (cfg.mcs.target_code_rate_x1024 as f64 / 1024.0)
        * cfg.nof_layers as f64
}

/// Resource indication value for a contiguous allocation, TS 38.214
/// Section 5.1.2.2.2.
pub fn rb_alloc_riv(n_bwp: u32, start: u32, len: u32) -> u32 {
    assert!(len >= 1 && start + len <= n_bwp, "Invalid RB allocation");
    if len - 1 <= n_bwp / 2 {
        n_bwp * (len - 1) + start
    } else {
        n_bwp * (n_bwp - len + 1) + (n_bwp - 1 - start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mcs_table_entries() {
        assert_eq!(
            pdsch_mcs_get_config_qam64(0),
            SchMcsDescription { modulation_order: 2, target_code_rate_x1024: 120 }
        );
        assert_eq!(
            pdsch_mcs_get_config_qam64(10),
            SchMcsDescription { modulation_order: 4, target_code_rate_x1024: 340 }
        );
        assert_eq!(
            pdsch_mcs_get_config_qam64(28),
            SchMcsDescription { modulation_order: 6, target_code_rate_x1024: 948 }
        );
    }

    #[test]
    #[should_panic]
    fn test_mcs_table_rejects_reserved_indices() {
        let _ = pdsch_mcs_get_config_qam64(29);
    }

    fn calc_cfg(payload: usize, mcs_index: u8) -> PrbsCalculatorSchConfig {
        PrbsCalculatorSchConfig {
            payload_size_bytes: payload,
            nof_symb_sh: 12,
            nof_dmrs_prb: calculate_nof_dmrs_per_rb(),
            nof_oh_prb: 0,
            mcs: pdsch_mcs_get_config_qam64(mcs_index),
            nof_layers: 1,
        }
    }

    #[test]
    fn test_prbs_calculator_fits_payload() {
        for payload in [1usize, 17, 64, 100, 500] {
            let res = get_nof_prbs(calc_cfg(payload, 5));
            assert!(res.tbs_bytes >= payload, "payload={}", payload);
            // One PRB fewer must not fit.
            if res.nof_prbs > 1 {
                let smaller = estimate_tbs_bytes(res.nof_prbs - 1, &calc_cfg(payload, 5));
                assert!(smaller < payload);
            }
        }
    }

    #[test]
    fn test_prbs_calculator_monotonic_in_mcs() {
        let low = get_nof_prbs(calc_cfg(200, 2));
        let high = get_nof_prbs(calc_cfg(200, 20));
        assert!(high.nof_prbs <= low.nof_prbs);
    }

    #[test]
    fn test_riv() {
        // Short allocations: RIV = N * (L - 1) + S.
        assert_eq!(rb_alloc_riv(24, 0, 1), 0);
        assert_eq!(rb_alloc_riv(24, 4, 2), 28);
        // Long allocation uses the mirrored encoding.
        assert_eq!(rb_alloc_riv(24, 0, 24), 24 * 1 + 23);
    }
}
