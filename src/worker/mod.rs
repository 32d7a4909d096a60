//! Worker loop: drives one core's work from startup through drain.

pub mod affinity;

use crate::coordinator::ReplicaCoordinator;
use crate::latency::LatencyAggregator;
use crate::namespace::NamespaceEntry;
use crate::ns_worker_ctx::NsWorkerCtx;
use crate::rate_gate::RateGate;
use crate::stats::RunStats;
use crate::task_pool::TaskPool;
use crate::transport::{Transport, TransportOps};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Barrier;
use std::time::{Duration, Instant};

/// What a worker reports back to `main` after it joins.
pub struct WorkerOutcome {
    pub core_id: Option<usize>,
    pub status: i32,
    pub io_submitted: u64,
    pub io_completed: u64,
    pub elapsed: Option<Duration>,
    pub per_namespace: Vec<NsSummary>,
}

pub struct RunParams {
    pub run_time: Duration,
    pub warmup_time: Duration,
    pub max_completions: usize,
}

/// One pinned execution unit: the namespace-worker contexts it owns plus the
/// shared coordinator/transport/namespace state that drives them.
pub struct Worker {
    pub core_id: Option<usize>,
    pub is_main: bool,
    pub namespaces: Vec<NamespaceEntry>,
    pub ctxs: Vec<NsWorkerCtx>,
    pub transports: Vec<Transport>,
    pub pool: TaskPool,
    pub coordinator: ReplicaCoordinator,
    pub queue_depth: u32,
}

impl Worker {
    /// Steps 1-6 of the worker lifecycle.
    pub fn run(
        &mut self,
        params: &RunParams,
        barrier: &Barrier,
        exit_flag: &AtomicBool,
        latency: Option<&LatencyAggregator>,
        run_stats: Option<&RunStats>,
        rate_gate: &mut Option<RateGate>,
    ) -> anyhow::Result<WorkerOutcome> {
        if let Some(core_id) = self.core_id {
            if let Err(e) = affinity::set_cpu_affinity(&[core_id]) {
                eprintln!("worker core={}: failed to set CPU affinity: {:#}", core_id, e);
            }
        }

        let Worker { pool, namespaces, ctxs, transports, coordinator, is_main, queue_depth, core_id, .. } = self;
        let is_main = *is_main;
        let queue_depth = *queue_depth;

        for (ns_id, ctx) in ctxs.iter_mut().enumerate() {
            if let Err(e) = transports[ns_id].init_ns_worker_ctx(&namespaces[ns_id], ctx) {
                barrier.wait();
                anyhow::bail!("worker core={:?}: init_ns_worker_ctx failed: {:#}", core_id, e);
            }
        }

        barrier.wait();

        let tsc_start = Instant::now();
        let mut deadline = tsc_start + if params.warmup_time > Duration::ZERO { params.warmup_time } else { params.run_time };
        let mut warmed_up = params.warmup_time == Duration::ZERO;

        coordinator.emit_initial(queue_depth, pool, namespaces, ctxs, transports);

        let mut last_print = Instant::now();
        let mut iops_accum: u64 = 0;
        let mut bytes_accum: u64 = 0;

        loop {
            if exit_flag.load(Ordering::Relaxed) {
                break;
            }
            if ctxs.iter().all(|c| c.is_draining) {
                break;
            }
            if Instant::now() > deadline {
                if !warmed_up {
                    warmed_up = true;
                    for ctx in ctxs.iter_mut() {
                        ctx.io_submitted = 0;
                        ctx.io_completed = 0;
                        ctx.min_latency_nanos = u64::MAX;
                        ctx.max_latency_nanos = 0;
                        ctx.total_latency_nanos = 0;
                    }
                    deadline = Instant::now() + params.run_time;
                    continue;
                }
                break;
            }

            if let Some(gate) = rate_gate.as_mut() {
                if gate.tick() {
                    let batch = gate.batch_size();
                    for _ in 0..batch {
                        let Some(primary_id) = coordinator.pending.pop_front() else { break };
                        coordinator.submit_replicated(primary_id, pool, namespaces, ctxs, transports, latency);
                    }
                }
            }

            for ns_id in 0..ctxs.len() {
                if coordinator.config.continue_on_error && !ctxs[ns_id].is_draining {
                    let queued: Vec<_> = ctxs[ns_id].queued_tasks.drain(..).collect();
                    for sid in queued {
                        let primary_id = pool.sibling(sid).primary_id;
                        let (offset, is_read) = {
                            let p = pool.primary(primary_id);
                            (p.offset_in_ios, p.is_read)
                        };
                        let rc = transports[ns_id].submit_io(pool, sid, &mut ctxs[ns_id], &namespaces[ns_id], offset, is_read, ns_id as u32, latency);
                        if rc == crate::transport::ENOMEM {
                            ctxs[ns_id].queued_tasks.push_back(sid);
                        } else if rc == 0 {
                            pool.sibling_mut(sid).submit_time = Some(crate::util::fast_time::FastInstant::now());
                            ctxs[ns_id].current_queue_depth += 1;
                            ctxs[ns_id].io_submitted += 1;
                        } else {
                            ctxs[ns_id].status = rc;
                        }
                    }
                }

                match transports[ns_id].check_io(&mut ctxs[ns_id], params.max_completions, ns_id as u32, latency) {
                    Ok(completions) => {
                        for c in completions {
                            iops_accum += 1;
                            bytes_accum += namespaces[ns_id].block_size * namespaces[ns_id].io_size_blocks;
                            if let Some(stats) = run_stats {
                                if let Some(t0) = pool.sibling(c.sibling_id).submit_time {
                                    stats.record(ns_id as u32, t0.elapsed());
                                }
                            }
                            coordinator.on_sibling_complete(c.sibling_id, c.ok, pool, namespaces, ctxs, transports, latency);
                        }
                    }
                    Err(()) => {
                        ctxs[ns_id].is_draining = true;
                        ctxs[ns_id].status = -1;
                    }
                }
            }

            // A fatal (non-ENOMEM) submit or poll error on any one context
            // is a whole-worker event (spec §7 `Fatal(other)`): stop issuing
            // new work everywhere and let the forced-drain phase wind down
            // whatever is still outstanding.
            if ctxs.iter().any(|c| c.status != 0) {
                for ctx in ctxs.iter_mut() {
                    ctx.is_draining = true;
                }
            }

            if is_main && last_print.elapsed() >= Duration::from_secs(1) {
                let mib_s = bytes_accum as f64 / (1024.0 * 1024.0);
                print!("\r{} IOPS, {:.2} MiB/s", iops_accum, mib_s);
                use std::io::Write;
                let _ = std::io::stdout().flush();
                iops_accum = 0;
                bytes_accum = 0;
                last_print = Instant::now();
            }
        }

        for ctx in ctxs.iter_mut() {
            ctx.is_draining = true;
        }
        let mut idle_rounds = 0;
        loop {
            let pending: u32 = ctxs.iter().map(|c| c.current_queue_depth).sum();
            if pending == 0 || idle_rounds > 10_000 {
                break;
            }
            let mut any = false;
            for ns_id in 0..ctxs.len() {
                if let Ok(completions) = transports[ns_id].check_io(&mut ctxs[ns_id], 64, ns_id as u32, latency) {
                    if !completions.is_empty() {
                        any = true;
                    }
                    for c in completions {
                        coordinator.on_sibling_complete(c.sibling_id, c.ok, pool, namespaces, ctxs, transports, latency);
                    }
                }
            }
            idle_rounds = if any { 0 } else { idle_rounds + 1 };
        }
        for (ns_id, ctx) in ctxs.iter_mut().enumerate() {
            transports[ns_id].cleanup_ns_worker_ctx(ctx);
        }

        if is_main {
            println!();
        }

        let status = ctxs.iter().map(|c| c.status).find(|&s| s != 0).unwrap_or(0);
        let io_submitted = ctxs.iter().map(|c| c.io_submitted).sum();
        let io_completed = ctxs.iter().map(|c| c.io_completed).sum();
        let per_namespace = ctxs
            .iter()
            .map(|c| NsSummary {
                ns_id: c.ns_id,
                submitted: c.io_submitted,
                completed: c.io_completed,
                min_nanos: c.min_latency_nanos,
                max_nanos: c.max_latency_nanos,
                total_nanos: c.total_latency_nanos,
            })
            .collect();

        Ok(WorkerOutcome {
            core_id: *core_id,
            status,
            io_submitted,
            io_completed,
            elapsed: if is_main { Some(tsc_start.elapsed()) } else { None },
            per_namespace,
        })
    }
}

/// One namespace's totals from a single worker, rolled up by `main` across
/// every worker into the end-of-run summary.
#[derive(Debug, Clone, Copy)]
pub struct NsSummary {
    pub ns_id: u32,
    pub submitted: u64,
    pub completed: u64,
    pub min_nanos: u64,
    pub max_nanos: u64,
    pub total_nanos: u64,
}
