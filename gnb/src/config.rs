//! YAML Configuration Structures
//!
//! Mirrors the gnb.yml layout: cell parameters, scheduler expert
//! options, GTP-U and soft-buffer settings and per-layer log levels.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GnbConfig {
    /// Cell configuration
    pub cell_cfg: CellConfig,
    /// Scheduler configuration
    #[serde(default)]
    pub sched: SchedConfig,
    /// GTP-U configuration
    pub gtpu: GtpuConfig,
    /// Uplink soft-buffer pool configuration
    #[serde(default)]
    pub softbuffer: SoftbufferConfig,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

/// Cell configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CellConfig {
    /// Physical Cell ID
    pub pci: u16,
    /// Common subcarrier spacing in kHz
    pub common_scs: u32,
    /// Channel bandwidth in MHz
    #[serde(rename = "channel_bandwidth_MHz")]
    pub channel_bandwidth_mhz: u32,
    /// CORESET#0 index, TS 38.213 Table 13-1
    pub coreset0_index: u8,
    /// First PRB of the SSB
    #[serde(default)]
    pub ssb_offset_prbs: u16,
    /// SSB periodicity in ms
    #[serde(default = "default_ssb_period_ms")]
    pub ssb_period_ms: u32,
    /// SIB1 periodicity in ms
    #[serde(default = "default_sib1_period_ms")]
    pub sib1_period_ms: u32,
    /// Encoded SIB1 payload as a hex string; a placeholder payload is
    /// generated when absent
    pub sib1_payload_hex: Option<String>,
    /// SI message scheduling; empty list disables SI messages
    #[serde(default)]
    pub si_scheduling: Option<SiSchedulingYaml>,
}

fn default_ssb_period_ms() -> u32 {
    20
}

fn default_sib1_period_ms() -> u32 {
    160
}

/// SI scheduling information
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiSchedulingYaml {
    /// Common SI window length in slots
    pub si_window_len_slots: u32,
    /// Per-message scheduling entries
    pub si_messages: Vec<SiMessageYaml>,
}

/// One SI message entry
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiMessageYaml {
    /// Periodicity in radio frames
    pub period_radio_frames: u32,
    /// Payload length in bytes
    pub msg_len: usize,
}

/// Scheduler expert options
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedConfig {
    #[serde(default = "default_si_mcs")]
    pub si_message_mcs_index: u8,
    #[serde(default = "default_si_aggr")]
    pub si_message_dci_aggr_lev: u8,
    #[serde(default = "default_si_mcs")]
    pub sib1_mcs_index: u8,
    #[serde(default = "default_si_aggr")]
    pub sib1_dci_aggr_lev: u8,
    #[serde(default = "default_ue_mcs")]
    pub ue_mcs_index: u8,
}

fn default_si_mcs() -> u8 {
    5
}

fn default_si_aggr() -> u8 {
    4
}

fn default_ue_mcs() -> u8 {
    10
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self {
            si_message_mcs_index: default_si_mcs(),
            si_message_dci_aggr_lev: default_si_aggr(),
            sib1_mcs_index: default_si_mcs(),
            sib1_dci_aggr_lev: default_si_aggr(),
            ue_mcs_index: default_ue_mcs(),
        }
    }
}

/// GTP-U configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GtpuConfig {
    /// GTP-U bind address
    pub bind_addr: String,
    /// Promote queue-full drops from info to warning
    #[serde(default)]
    pub warn_on_drop: bool,
    /// Tunnel executor queue depth
    #[serde(default = "default_gtpu_queue_size")]
    pub queue_size: usize,
    /// Demo bearer TEID pre-provisioned at startup
    #[serde(default = "default_teid")]
    pub initial_teid: u32,
}

fn default_gtpu_queue_size() -> usize {
    2048
}

fn default_teid() -> u32 {
    1
}

/// Uplink soft-buffer pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SoftbufferConfig {
    #[serde(default = "default_max_softbuffers")]
    pub max_softbuffers: usize,
    #[serde(default = "default_max_codeblocks")]
    pub max_nof_codeblocks: usize,
    #[serde(default = "default_codeblock_size")]
    pub max_codeblock_size: usize,
    /// Slots a reserved soft buffer survives without refresh
    #[serde(default = "default_expire_timeout_slots")]
    pub expire_timeout_slots: u32,
}

fn default_max_softbuffers() -> usize {
    32
}

fn default_max_codeblocks() -> usize {
    64
}

fn default_codeblock_size() -> usize {
    8448
}

fn default_expire_timeout_slots() -> u32 {
    100
}

impl Default for SoftbufferConfig {
    fn default() -> Self {
        Self {
            max_softbuffers: default_max_softbuffers(),
            max_nof_codeblocks: default_max_codeblocks(),
            max_codeblock_size: default_codeblock_size(),
            expire_timeout_slots: default_expire_timeout_slots(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LogConfig {
    /// All layers log level
    #[serde(default = "default_log_level")]
    pub all_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl GnbConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: GnbConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Decode the configured SIB1 payload, falling back to a fixed
    /// placeholder pattern.
    pub fn sib1_payload(&self) -> anyhow::Result<Vec<u8>> {
        match &self.cell_cfg.sib1_payload_hex {
            Some(hex) => parse_hex(hex),
            None => Ok(vec![0x68, 0x0C, 0x40, 0x04, 0x90, 0x40, 0x22, 0x0A]),
        }
    }
}

fn parse_hex(hex: &str) -> anyhow::Result<Vec<u8>> {
    let cleaned: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.len() % 2 != 0 {
        return Err(anyhow::anyhow!("Odd number of hex digits"));
    }
    (0..cleaned.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&cleaned[i..i + 2], 16)
                .map_err(|e| anyhow::anyhow!("Invalid hex byte: {}", e))
        })
        .collect()
}
