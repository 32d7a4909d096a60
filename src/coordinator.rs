//! Replica coordinator: turns one logical I/O into N ordered sibling
//! submissions and enforces "at most one in-flight logical I/O per slot
//! until all N siblings complete."

use crate::latency::LatencyAggregator;
use crate::namespace::NamespaceEntry;
use crate::ns_worker_ctx::NsWorkerCtx;
use crate::task_pool::{SiblingId, TaskPool};
use crate::transport::{Transport, TransportOps, ENOMEM};
use crate::util::fast_time::FastInstant;
use std::collections::VecDeque;

/// Per-worker configuration the coordinator needs but does not own.
pub struct CoordinatorConfig {
    pub rep_num: u32,
    pub send_main_rep_finally: bool,
    pub rwmixread: u32,
    pub continue_on_error: bool,
    pub number_ios: Option<u64>,
    pub rate_limited: bool,
    /// Bytes per logical I/O; the primary's DMA payload is allocated at this size.
    pub io_size_bytes: usize,
    /// Chunk size the payload is split into iovecs by (transport unit, e.g. block size).
    pub io_unit_size: usize,
}

/// Fans a logical I/O across the contexts owned by one worker.
pub struct ReplicaCoordinator {
    pub config: CoordinatorConfig,
    /// Pending-logical-I/O FIFO, used only when the rate limiter is enabled.
    pub pending: VecDeque<SiblingId>,
    pub batch_count: u32,
}

impl ReplicaCoordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self { config, pending: VecDeque::new(), batch_count: 0 }
    }

    /// `emit_initial(worker, depth)`.
    pub fn emit_initial(
        &mut self,
        depth: u32,
        pool: &mut TaskPool,
        namespaces: &mut [NamespaceEntry],
        ctxs: &mut [NsWorkerCtx],
        transports: &mut [Transport],
    ) {
        let mut next_io_id: u64 = 1;
        for _ in 0..depth {
            let io_id = next_io_id;
            next_io_id += 1;

            let pattern = (ctxs[0].queue_depth % 8 + 1) as u8;
            let primary = pool.allocate_primary(
                io_id,
                ctxs[0].ns_id,
                self.config.io_size_bytes,
                self.config.io_unit_size,
                pattern,
                true,
                0,
            );
            for ctx in ctxs.iter().skip(1) {
                pool.clone_into(primary, ctx.ns_id);
            }
            if self.config.send_main_rep_finally {
                pool.reorder_primary_last(primary);
            }

            if self.config.rate_limited {
                self.pending.push_back(primary);
            } else {
                self.submit_replicated(primary, pool, namespaces, ctxs, transports, None);
            }
        }
    }

    /// `submit_replicated(primary)` — computes the shared `(offset, rw)`
    /// once, then walks the sibling list in order submitting each.
    pub fn submit_replicated(
        &mut self,
        primary_id: SiblingId,
        pool: &mut TaskPool,
        namespaces: &mut [NamespaceEntry],
        ctxs: &mut [NsWorkerCtx],
        transports: &mut [Transport],
        latency: Option<&LatencyAggregator>,
    ) {
        let sibling_ids = pool.primary(primary_id).sibling_ids.clone();
        let primary_ns_id = pool.sibling(primary_id).ns_id as usize;

        let offset_in_ios = {
            let ns = &mut namespaces[primary_ns_id];
            let size = ns.size_in_ios;
            match &mut ns.offset_policy {
                crate::namespace::OffsetPolicy::Zipf(_) | crate::namespace::OffsetPolicy::Random(_) => {
                    ns.offset_policy.next(size)
                }
                crate::namespace::OffsetPolicy::Sequential(_) => {
                    let min_capacity = namespaces.iter().map(|n| n.size_in_ios).min().unwrap_or(size);
                    let ctx = &mut ctxs[primary_ns_id];
                    let offset = ctx.offset_in_ios;
                    ctx.offset_in_ios = if ctx.offset_in_ios + 1 >= min_capacity { 0 } else { ctx.offset_in_ios + 1 };
                    offset
                }
            }
        };

        let is_read = {
            let pct = self.config.rwmixread;
            if pct == 100 {
                true
            } else if pct > 0 {
                namespaces[primary_ns_id].roll_read_percent(pct)
            } else {
                false
            }
        };

        pool.primary_mut(primary_id).offset_in_ios = offset_in_ios;
        pool.primary_mut(primary_id).is_read = is_read;

        for &sid in &sibling_ids {
            let ns_id = pool.sibling(sid).ns_id as usize;
            pool.sibling_mut(sid).create_time = FastInstant::now();
            if let Some(agg) = latency {
                agg.record(ns_id as u32, crate::latency::Stage::TaskQueue, 0);
            }

            let rc = transports[ns_id].submit_io(pool, sid, &mut ctxs[ns_id], &namespaces[ns_id], offset_in_ios, is_read, ns_id as u32, latency);
            if rc == 0 {
                pool.sibling_mut(sid).submit_time = Some(FastInstant::now());
                ctxs[ns_id].current_queue_depth += 1;
                ctxs[ns_id].io_submitted += 1;
                if let Some(limit) = self.config.number_ios {
                    if ctxs[ns_id].io_submitted >= limit {
                        ctxs[ns_id].is_draining = true;
                    }
                }
            } else if rc == ENOMEM && self.config.continue_on_error {
                ctxs[ns_id].queued_tasks.push_back(sid);
            } else {
                // Fatal, non-ENOMEM submission failure (spec §7 `Fatal(other)`):
                // mark the context failed and draining, and count this sibling
                // as done so the group's fan-in still reaches N and the
                // payload is freed exactly once, even though it never submitted.
                ctxs[ns_id].status = rc;
                ctxs[ns_id].is_draining = true;
                if Self::count_sibling_done(sid, pool) {
                    break;
                }
            }
        }
    }

    /// Accounts for a sibling that will never get a transport completion
    /// (fatal submit failure) as if it had completed, so the replica
    /// group's fan-in counter still reaches N. Returns `true` if this freed
    /// the group, in which case the caller must stop touching `sibling_ids`.
    fn count_sibling_done(sibling_id: SiblingId, pool: &mut TaskPool) -> bool {
        let primary_id = pool.sibling(sibling_id).primary_id;
        pool.primary_mut(primary_id).rep_completed_num += 1;
        let n = pool.primary(primary_id).sibling_ids.len() as u32;
        if pool.primary(primary_id).rep_completed_num >= n {
            pool.release_replica_group(primary_id);
            true
        } else {
            false
        }
    }

    /// `on_sibling_complete(sibling)`.
    pub fn on_sibling_complete(
        &mut self,
        sibling_id: SiblingId,
        ok: bool,
        pool: &mut TaskPool,
        namespaces: &mut [NamespaceEntry],
        ctxs: &mut [NsWorkerCtx],
        transports: &mut [Transport],
        latency: Option<&LatencyAggregator>,
    ) {
        let ns_id = pool.sibling(sibling_id).ns_id as usize;
        let primary_id = pool.sibling(sibling_id).primary_id;

        ctxs[ns_id].current_queue_depth = ctxs[ns_id].current_queue_depth.saturating_sub(1);
        ctxs[ns_id].io_completed += 1;
        if !ok {
            ctxs[ns_id].is_draining = true;
        }

        let submit_time = pool.sibling(sibling_id).submit_time;
        if let Some(t0) = submit_time {
            let nanos = FastInstant::now().duration_since(t0).as_nanos() as u64;
            ctxs[ns_id].record_latency(nanos);
            if let Some(agg) = latency {
                agg.record(ns_id as u32, crate::latency::Stage::TaskComplete, nanos);
            }
        }

        if ok && namespaces[ns_id].pi_enabled {
            let _ = transports[ns_id].verify_io(pool, sibling_id, &namespaces[ns_id]);
        }

        pool.primary_mut(primary_id).rep_completed_num += 1;
        let n = pool.primary(primary_id).sibling_ids.len() as u32;
        if pool.primary(primary_id).rep_completed_num < n {
            return;
        }

        pool.primary_mut(primary_id).rep_completed_num = 0;
        let queue_depth = ctxs.iter().map(|c| c.queue_depth).max().unwrap_or(1) as u64;
        let mut next_io_id = pool.sibling(primary_id).io_id + queue_depth;
        if next_io_id == 0 {
            next_io_id = 1;
        }

        let sibling_ids = pool.primary(primary_id).sibling_ids.clone();
        let any_draining = sibling_ids.iter().any(|&sid| {
            let ns = pool.sibling(sid).ns_id as usize;
            ctxs[ns].is_draining
        });
        if any_draining {
            pool.release_replica_group(primary_id);
            return;
        }

        for &sid in &sibling_ids {
            pool.sibling_mut(sid).io_id = next_io_id;
        }

        if self.config.rate_limited {
            self.pending.push_back(primary_id);
            self.batch_count += 1;
        } else {
            self.submit_replicated(primary_id, pool, namespaces, ctxs, transports, latency);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::{OffsetPolicy, TransportKind};
    use crate::target::file::FileTarget;
    use crate::target::{OpenFlags, Target};
    use crate::transport::nvme::NvmeTransport;
    use std::time::Duration;

    fn make_namespace(ns_id: u32, path: &std::path::Path) -> NamespaceEntry {
        let mut target = FileTarget::new(path.to_path_buf(), Some(1024 * 1024));
        target.set_preallocate(true);
        target
            .open(OpenFlags { direct: false, sync: false, create: true, truncate: false })
            .unwrap();
        NamespaceEntry::new(
            ns_id,
            TransportKind::Nvme,
            Box::new(target),
            256,
            4096,
            1,
            false,
            42 + ns_id as u64,
            OffsetPolicy::Sequential(crate::distribution::sequential::SequentialDistribution::new()),
        )
    }

    #[test]
    fn three_way_replica_completes_and_frees_payload_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut namespaces = vec![
            make_namespace(0, &dir.path().join("a")),
            make_namespace(1, &dir.path().join("b")),
            make_namespace(2, &dir.path().join("c")),
        ];
        let mut ctxs: Vec<NsWorkerCtx> = (0..3).map(|i| NsWorkerCtx::new(i, 1, 0, 4)).collect();
        let mut transports: Vec<Transport> = (0..3)
            .map(|_| Transport::Nvme(NvmeTransport::new(64, Duration::from_nanos(0))))
            .collect();
        let mut pool = TaskPool::new(512);

        let mut coordinator = ReplicaCoordinator::new(CoordinatorConfig {
            rep_num: 3,
            send_main_rep_finally: false,
            rwmixread: 0,
            continue_on_error: false,
            number_ios: None,
            rate_limited: false,
            io_size_bytes: 4096,
            io_unit_size: 4096,
        });

        coordinator.emit_initial(1, &mut pool, &mut namespaces, &mut ctxs, &mut transports);

        let mut total_completions = 0;
        for _ in 0..32 {
            for ns in 0..3 {
                let completions = transports[ns].check_io(&mut ctxs[ns], 16, ns as u32, None).unwrap();
                for c in completions {
                    total_completions += 1;
                    coordinator.on_sibling_complete(
                        c.sibling_id,
                        c.ok,
                        &mut pool,
                        &mut namespaces,
                        &mut ctxs,
                        &mut transports,
                        None,
                    );
                }
            }
            if total_completions >= 3 {
                break;
            }
        }
        assert_eq!(total_completions, 3);
    }
}
