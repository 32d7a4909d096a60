//! replio CLI entry point: parses flags, opens namespaces, spawns pinned
//! workers, and prints the end-of-run summary.

use anyhow::{Context, Result};
use replio::config::cli::Cli;
use replio::config::Config;
use replio::coordinator::{CoordinatorConfig, ReplicaCoordinator};
use replio::latency::LatencyAggregator;
use replio::namespace::{NamespaceEntry, OffsetPolicy, TransportKind};
use replio::ns_worker_ctx::NsWorkerCtx;
use replio::output::text;
use replio::stats::RunStats;
use replio::target::block::BlockTarget;
use replio::target::file::FileTarget;
use replio::target::{OpenFlags, Target};
use replio::task_pool::TaskPool;
use replio::transport::aio::AioTransport;
use replio::transport::nvme::NvmeTransport;
use replio::transport::Transport;
use replio::worker::affinity;
use replio::worker::{RunParams, Worker};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

const PER_HOST_LATENCY_CSV: &str = "replio_host_latency.csv";
const PER_TARGET_LATENCY_CSV: &str = "replio_target_latency.csv";

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli.validate().context("invalid command line")?;
    let config = Config::from_cli(&cli).context("failed to assemble configuration")?;

    let mut namespaces = open_namespaces(&config)?;
    let block_size = namespaces.first().map(|n| n.block_size).unwrap_or(512);
    config
        .validate_against_block_size(block_size)
        .context("io-size incompatible with namespace block size")?;

    println!("{}", config);

    // Only the first `rep_num` opened namespaces form the replica group;
    // `-r` entries beyond that (if any slip past CLI validation) are opened
    // but never participate in submission, per spec §4.4's fixed N-way fan-out.
    let rep_num = config.rep_num as usize;
    namespaces.truncate(rep_num);
    let num_namespaces = namespaces.len() as u32;
    let core_list = match &config.core_mask {
        Some(spec) => affinity::parse_cpu_list(spec)?,
        None => (0..affinity::num_cpus()).collect(),
    };
    if core_list.is_empty() {
        anyhow::bail!("no worker cores available (empty core mask)");
    }
    affinity::warn_if_oversubscribed(core_list.len());

    let latency = Arc::new(LatencyAggregator::new(num_namespaces));
    let run_stats = if config.latency_histogram_level > 0 {
        Some(Arc::new(RunStats::new(num_namespaces)))
    } else {
        None
    };
    let barrier = Arc::new(Barrier::new(core_list.len()));
    let exit_flag = Arc::new(AtomicBool::new(false));

    let admin_latency = Arc::clone(&latency);
    let admin_exit = Arc::clone(&exit_flag);
    let (tx, rx) = std::sync::mpsc::channel();
    let admin_handle = std::thread::spawn(move || {
        replio::latency::run_snapshot_loop(&admin_latency, &tx, &admin_exit);
    });

    let writer_deadline = std::time::Instant::now()
        + Duration::from_secs_f64(config.time_secs as f64 * 1.2 + 6.0).max(Duration::from_secs(6));
    let writer_handle = std::thread::spawn(move || {
        let _ = replio::output::csv::run_writer_loop(&rx, PER_HOST_LATENCY_CSV, writer_deadline);
    });
    let _ = PER_TARGET_LATENCY_CSV;

    let mut handles = Vec::new();
    let run_time = Duration::from_secs(config.time_secs);
    let warmup_time = Duration::from_secs(config.warmup_time_secs);

    for (worker_idx, &core_id) in core_list.iter().enumerate() {
        let is_main = worker_idx == 0;
        let per_worker_namespaces = clone_namespaces_for_worker(&config, &mut namespaces, worker_idx)?;
        let ctxs: Vec<NsWorkerCtx> = (0..num_namespaces)
            .map(|ns_id| NsWorkerCtx::new(ns_id, config.num_qpairs, config.num_unused_qpairs, config.io_depth))
            .collect();
        let transports: Vec<Transport> = config
            .namespaces
            .iter()
            .take(rep_num)
            .map(|ns_spec| new_transport(&ns_spec.trtype, config.io_depth))
            .collect::<Result<Vec<_>>>()?;

        let coordinator = ReplicaCoordinator::new(CoordinatorConfig {
            rep_num: config.rep_num,
            send_main_rep_finally: config.final_send_main_rep,
            rwmixread: config.rwmixread,
            continue_on_error: config.continue_on_error.is_some(),
            number_ios: config.number_ios,
            rate_limited: config.io_num_per_second.is_some(),
            io_size_bytes: config.io_size as usize,
            io_unit_size: block_size as usize,
        });

        let mut worker = Worker {
            core_id: Some(core_id),
            is_main,
            namespaces: per_worker_namespaces,
            ctxs,
            transports,
            pool: TaskPool::new(block_size as usize),
            coordinator,
            queue_depth: config.io_depth,
        };

        let params = RunParams { run_time, warmup_time, max_completions: 32 };
        let barrier = Arc::clone(&barrier);
        let exit_flag = Arc::clone(&exit_flag);
        let latency = Arc::clone(&latency);
        let run_stats = run_stats.clone();
        let mut rate_gate = config
            .io_num_per_second
            .map(|rate| replio::rate_gate::RateGate::new(rate, config.batch_size));

        handles.push(std::thread::spawn(move || {
            worker.run(&params, &barrier, &exit_flag, Some(&latency), run_stats.as_deref(), &mut rate_gate)
        }));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        match handle.join() {
            Ok(Ok(outcome)) => outcomes.push(outcome),
            Ok(Err(e)) => eprintln!("worker failed: {:#}", e),
            Err(_) => eprintln!("worker thread panicked"),
        }
    }

    exit_flag.store(true, Ordering::Relaxed);
    let _ = admin_handle.join();
    let _ = writer_handle.join();

    print_summary(&config, &outcomes, run_stats.as_deref());

    for namespace in namespaces.iter_mut() {
        let _ = namespace.target.close();
    }

    let exit_status = outcomes.iter().map(|o| o.status).find(|&s| s != 0).unwrap_or(0);
    std::process::exit(exit_status);
}

fn open_namespaces(config: &Config) -> Result<Vec<NamespaceEntry>> {
    let mut namespaces = Vec::with_capacity(config.namespaces.len());
    for (ns_id, spec) in config.namespaces.iter().enumerate() {
        let path = spec
            .traddr
            .clone()
            .ok_or_else(|| anyhow::anyhow!("transport entry {} missing traddr", ns_id))?;
        let transport_kind = match spec.trtype.to_ascii_lowercase().as_str() {
            "pcie" | "nvme" => TransportKind::Nvme,
            "aio" => TransportKind::Aio,
            "uring" | "io_uring" => TransportKind::Uring,
            "tcp" | "rdma" => TransportKind::Nvme,
            other => anyhow::bail!("unrecognized transport type: {}", other),
        };

        let mut target: Box<dyn Target> = if path.starts_with("/dev/") {
            Box::new(BlockTarget::new(path.clone().into()))
        } else {
            Box::new(FileTarget::new(path.clone().into(), None))
        };
        target
            .open(OpenFlags { direct: true, sync: false, create: true, truncate: false })
            .with_context(|| format!("failed to open namespace {} ({})", ns_id, path))?;

        let block_size = target.logical_block_size();
        let io_size_blocks = (config.io_size as u64 / block_size).max(1);
        let size_in_ios = (target.size() / (block_size * io_size_blocks)).max(1);
        let size_in_ios = match config.io_limit {
            Some(limit) if limit > 0 => size_in_ios.min(size_in_ios / limit.max(1) * limit.max(1)).max(1),
            _ => size_in_ios,
        };

        let offset_policy = if let Some(theta) = config.zipf_theta {
            OffsetPolicy::Zipf(replio::distribution::zipf::ZipfDistribution::new(theta))
        } else if config.io_pattern.is_random() {
            OffsetPolicy::Random(replio::distribution::uniform::UniformDistribution::new())
        } else {
            OffsetPolicy::Sequential(replio::distribution::sequential::SequentialDistribution::new())
        };

        namespaces.push(NamespaceEntry::new(
            ns_id as u32,
            transport_kind,
            target,
            size_in_ios,
            block_size,
            io_size_blocks,
            false,
            ns_id as u64,
            offset_policy,
        ));
    }
    Ok(namespaces)
}

/// Each worker needs its own `NamespaceEntry` set (targets aren't shared
/// across threads); re-derive size/capacity from the first-opened entries
/// rather than re-opening the underlying device per worker.
fn clone_namespaces_for_worker(config: &Config, namespaces: &mut [NamespaceEntry], worker_idx: usize) -> Result<Vec<NamespaceEntry>> {
    let mut out = Vec::with_capacity(namespaces.len());
    for (ns_id, spec) in config.namespaces.iter().take(namespaces.len()).enumerate() {
        let path = spec.traddr.clone().unwrap_or_default();
        let template = &namespaces[ns_id];
        let mut target: Box<dyn Target> = if path.starts_with("/dev/") {
            Box::new(BlockTarget::new(path.clone().into()))
        } else {
            Box::new(FileTarget::new(path.clone().into(), None))
        };
        target.open(OpenFlags { direct: true, sync: false, create: false, truncate: false })?;

        let offset_policy = match &template.offset_policy {
            OffsetPolicy::Zipf(_) => OffsetPolicy::Zipf(replio::distribution::zipf::ZipfDistribution::with_seed(
                config.zipf_theta.unwrap_or(1.2),
                template.seed + worker_idx as u64,
            )),
            OffsetPolicy::Random(_) => OffsetPolicy::Random(replio::distribution::uniform::UniformDistribution::with_seed(
                template.seed + worker_idx as u64,
            )),
            OffsetPolicy::Sequential(_) => OffsetPolicy::Sequential(replio::distribution::sequential::SequentialDistribution::new()),
        };

        out.push(NamespaceEntry::new(
            ns_id as u32,
            template.transport,
            target,
            template.size_in_ios,
            template.block_size,
            template.io_size_blocks,
            template.pi_enabled,
            template.seed + worker_idx as u64,
            offset_policy,
        ));
    }
    Ok(out)
}

fn new_transport(trtype: &str, queue_depth: u32) -> Result<Transport> {
    match trtype.to_ascii_lowercase().as_str() {
        "pcie" | "nvme" | "tcp" | "rdma" => Ok(Transport::Nvme(NvmeTransport::new(queue_depth as usize * 4, Duration::from_nanos(0)))),
        "aio" => Ok(Transport::Aio(AioTransport::new())),
        #[cfg(feature = "io_uring")]
        "uring" | "io_uring" => Ok(Transport::Uring(replio::transport::uring::UringTransport::new(queue_depth))),
        other => anyhow::bail!("unrecognized transport type: {}", other),
    }
}

fn print_summary(config: &Config, outcomes: &[replio::worker::WorkerOutcome], run_stats: Option<&RunStats>) {
    let elapsed = outcomes.iter().find_map(|o| o.elapsed).unwrap_or(Duration::ZERO);
    let summaries: Vec<replio::worker::NsSummary> = outcomes.iter().flat_map(|o| o.per_namespace.iter().copied()).collect();

    println!();
    let histogram = run_stats.map(|s| (s, config.latency_histogram_level));
    text::print_results(config, &summaries, histogram);
    println!("elapsed={:.3}s", elapsed.as_secs_f64());
}
