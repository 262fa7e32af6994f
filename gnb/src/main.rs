//! 5G GNodeB Main Application
//!
//! Brings up the DU downlink path: executors, scheduler, MAC cell
//! processor, GTP-U demux and the slot ticker that stands in for the
//! PHY's slot indications.

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use num_traits::FromPrimitive;
use std::sync::{Arc, Mutex};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use common::executor::TaskWorker;
use common::slot_point::SlotPoint;
use common::types::{Bandwidth, CellIndex, Lcid, Pci, Rnti, SubcarrierSpacing, Teid, UeIndex};
use common::utils::calculate_nrb;
use layers::gtpu::{GtpuDemux, GtpuDemuxConfig, NullGtpuPcap, GTPU_PORT};
use layers::mac::ssb::{BetaPssProfile, DmrsTypeAPosition, SsbCase};
use layers::mac::{
    MacCellCreationRequest, MacCellProcessor, MacCellResultNotifier, MacDlDataResult,
    MacDlSchedResult, MacDlUeManager, MacMibConfig, MacSsbConfig, MacUlSchedResult,
};
use layers::phy::{RxSoftbufferPool, RxSoftbufferPoolConfig};
use layers::rlc::{GtpuRlcBearerAdapter, RlcTxQueue};
use layers::scheduler::{
    Coreset0Config, MacScheduler, SchedCellConfigurationRequest, SchedUeCreationRequest,
    SchedulerExpertConfig, SchedulerImpl, SiMessageSchedulingConfig, SiSchedulingConfig,
};

mod config;
use config::GnbConfig;

/// 5G GNodeB DU downlink stack
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to YAML configuration file
    #[arg(short, long)]
    config: String,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

/// PHY stand-in: logs the three per-slot MAC submissions.
struct PhyCellLogger;

impl MacCellResultNotifier for PhyCellLogger {
    fn on_new_downlink_scheduler_results(&self, dl_res: MacDlSchedResult) {
        if !dl_res.pdcch_pdus.is_empty() || !dl_res.ssb_pdus.is_empty() {
            debug!(
                "PHY DL sched slot={}: {} SSB PDUs, {} DCIs",
                dl_res.slot,
                dl_res.ssb_pdus.len(),
                dl_res.pdcch_pdus.len()
            );
        }
    }

    fn on_new_downlink_data(&self, dl_data: MacDlDataResult) {
        if !dl_data.sib1_pdus.is_empty() || !dl_data.rar_pdus.is_empty() || !dl_data.ue_pdus.is_empty()
        {
            debug!(
                "PHY DL data slot={}: {} SIB, {} RAR, {} UE PDUs",
                dl_data.slot,
                dl_data.sib1_pdus.len(),
                dl_data.rar_pdus.len(),
                dl_data.ue_pdus.len()
            );
        }
    }

    fn on_new_uplink_scheduler_results(&self, ul_res: MacUlSchedResult) {
        if let Some(res) = &ul_res.ul_res {
            if !res.ul.puschs.is_empty() {
                debug!(
                    "PHY UL sched slot={}: {} PUSCH grants",
                    ul_res.slot,
                    res.ul.puschs.len()
                );
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = GnbConfig::from_yaml_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;

    // Initialize logging with level from config or override.
    let log_level = args.log_level.as_ref().unwrap_or(&config.log.all_level);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    fmt().with_env_filter(env_filter).with_target(true).init();

    info!("Starting GNodeB DU");
    info!("Configuration loaded from: {}", args.config);

    // Validate and derive cell parameters.
    let pci = Pci::new(config.cell_cfg.pci)
        .ok_or_else(|| anyhow::anyhow!("Invalid PCI: {}", config.cell_cfg.pci))?;
    let scs = SubcarrierSpacing::from_u32(config.cell_cfg.common_scs).ok_or_else(|| {
        anyhow::anyhow!("Invalid subcarrier spacing: {} kHz", config.cell_cfg.common_scs)
    })?;
    let bandwidth = Bandwidth::from_mhz(config.cell_cfg.channel_bandwidth_mhz).ok_or_else(|| {
        anyhow::anyhow!("Invalid bandwidth: {} MHz", config.cell_cfg.channel_bandwidth_mhz)
    })?;
    let nof_prbs = calculate_nrb(bandwidth.as_hz(), config.cell_cfg.common_scs as u16);
    let coreset0 = Coreset0Config::from_index(config.cell_cfg.coreset0_index)
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let cell_index = CellIndex(0);
    let sib1_payload = config.sib1_payload()?;

    info!("Cell configuration:");
    info!("  PCI: {}", pci.0);
    info!("  Subcarrier spacing: {} kHz", config.cell_cfg.common_scs);
    info!("  Bandwidth: {} MHz ({} PRBs)", config.cell_cfg.channel_bandwidth_mhz, nof_prbs);
    info!("  CORESET#0 index: {}", config.cell_cfg.coreset0_index);
    info!("  SSB period: {} ms", config.cell_cfg.ssb_period_ms);
    info!("  SIB1 period: {} ms, payload {} bytes", config.cell_cfg.sib1_period_ms, sib1_payload.len());

    // Executors: one control, one per cell, one per tunnel group.
    let mut ctrl_worker = TaskWorker::new("gnb_ctrl", 128);
    let mut cell_worker = TaskWorker::new("cell_0", 256);
    let mut tunnel_worker = TaskWorker::new("gtpu_0", config.gtpu.queue_size);

    // Scheduler.
    let expert_cfg = SchedulerExpertConfig {
        sib1_mcs_index: config.sched.sib1_mcs_index,
        sib1_dci_aggr_lev: config.sched.sib1_dci_aggr_lev,
        si_message_mcs_index: config.sched.si_message_mcs_index,
        si_message_dci_aggr_lev: config.sched.si_message_dci_aggr_lev,
        ue_mcs_index: config.sched.ue_mcs_index,
        ..SchedulerExpertConfig::default()
    };
    let sched: Arc<dyn MacScheduler> = Arc::new(SchedulerImpl::new(expert_cfg));

    let si_scheduling = config.cell_cfg.si_scheduling.as_ref().map(|si| SiSchedulingConfig {
        si_window_len_slots: si.si_window_len_slots,
        si_messages: si
            .si_messages
            .iter()
            .map(|m| SiMessageSchedulingConfig {
                period_radio_frames: m.period_radio_frames,
                msg_len: m.msg_len,
            })
            .collect(),
    });
    if !sched.handle_cell_configuration_request(SchedCellConfigurationRequest {
        cell_index,
        pci,
        scs,
        nof_dl_prbs: nof_prbs,
        nof_ul_prbs: nof_prbs,
        coreset0,
        ssb_offset_prbs: config.cell_cfg.ssb_offset_prbs,
        ssb_period_ms: config.cell_cfg.ssb_period_ms,
        sib1_payload_len: sib1_payload.len(),
        sib1_period_ms: config.cell_cfg.sib1_period_ms,
        other_si_search_space_id: 3,
        si_scheduling,
    }) {
        anyhow::bail!("Scheduler rejected the cell configuration");
    }

    // MAC DL cell processor.
    let ue_mng = Arc::new(MacDlUeManager::new());
    let phy_cell: Arc<dyn MacCellResultNotifier> = Arc::new(PhyCellLogger);
    let mac_cell = MacCellProcessor::new(
        MacCellCreationRequest {
            cell_index,
            pci,
            scs,
            ssb_cfg: MacSsbConfig {
                ssb_subcarrier_offset: 0,
                offset_to_point_a: config.cell_cfg.ssb_offset_prbs * 12,
                beta_pss_profile: BetaPssProfile::Db0,
                ssb_case: SsbCase::A,
                l_max: 4,
            },
            mib: MacMibConfig {
                dmrs_type_a_position: DmrsTypeAPosition::Pos2,
                pdcch_config_sib1: config.cell_cfg.coreset0_index,
                cell_barred: false,
                intra_freq_reselection: false,
            },
            bcch_dl_sch_payload: Bytes::from(sib1_payload),
        },
        cell_worker.executor(),
        ctrl_worker.executor(),
        phy_cell,
        sched.clone(),
        ue_mng.clone(),
    );
    mac_cell
        .clone()
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start MAC cell: {}", e))?;
    info!("MAC cell {} active", cell_index);

    // Uplink soft-buffer pool, swept by the slot ticker.
    let softbuffer_pool = Arc::new(Mutex::new(RxSoftbufferPool::new(&RxSoftbufferPoolConfig {
        max_softbuffers: config.softbuffer.max_softbuffers,
        max_nof_codeblocks: config.softbuffer.max_nof_codeblocks,
        max_codeblock_size: config.softbuffer.max_codeblock_size,
        expire_timeout_slots: config.softbuffer.expire_timeout_slots,
    })));

    // GTP-U demux with one pre-provisioned demo bearer: DL packets on
    // the configured TEID land in the UE's RLC queue and the scheduler
    // learns about the backlog.
    let demux = GtpuDemux::new(
        GtpuDemuxConfig {
            warn_on_drop: config.gtpu.warn_on_drop,
        },
        Arc::new(NullGtpuPcap),
    );
    let ue_index = UeIndex(0);
    let crnti = Rnti(0x4601);
    let drb_lcid = Lcid(4);
    let tx_queue = Arc::new(RlcTxQueue::new());
    assert!(ue_mng.add_ue(ue_index, crnti, vec![(drb_lcid, tx_queue.clone())]));
    sched.handle_ue_creation_request(SchedUeCreationRequest {
        ue_index,
        crnti,
        cell_index,
        lcids: vec![drb_lcid],
    });
    let bearer_adapter = Arc::new(GtpuRlcBearerAdapter::new(
        ue_index,
        crnti,
        drb_lcid,
        tx_queue,
        sched.clone(),
    ));
    assert!(demux.add_tunnel(
        Teid(config.gtpu.initial_teid),
        tunnel_worker.executor(),
        bearer_adapter,
    ));

    // Socket reader feeding the demux.
    let bind_addr = format!("{}:{}", config.gtpu.bind_addr, GTPU_PORT);
    let socket = UdpSocket::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!("Serving GTP-U on {}", bind_addr);
    let reader_demux = demux.clone();
    let reader = tokio::spawn(async move {
        let mut buf = [0u8; 9000];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, src_addr)) => {
                    reader_demux
                        .clone()
                        .handle_pdu(Bytes::copy_from_slice(&buf[..len]), src_addr);
                }
                Err(e) => {
                    warn!("GTP-U socket error: {}", e);
                    break;
                }
            }
        }
    });

    // Slot ticker standing in for the PHY clock.
    let slot_duration = std::time::Duration::from_micros(scs.slot_duration_us() as u64);
    let ticker_mac = mac_cell.clone();
    let ticker_pool = softbuffer_pool.clone();
    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(slot_duration);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut sl = SlotPoint::new(scs, 0, 0);
        loop {
            interval.tick().await;
            ticker_mac.clone().handle_slot_indication(sl);
            ticker_pool.lock().unwrap().run_slot(sl);
            sl += 1;
        }
    });

    info!("GNodeB running, Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    ticker.abort();
    reader.abort();
    mac_cell
        .clone()
        .stop()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to stop MAC cell: {}", e))?;

    tunnel_worker.stop();
    cell_worker.stop();
    ctrl_worker.stop();
    info!("GNodeB stopped");
    Ok(())
}
