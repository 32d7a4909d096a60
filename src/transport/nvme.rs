//! Simulated NVMe-oF transport.
//!
//! The real RDMA/PCIe/TCP queue-pair transport is out of scope; this stands
//! in for it the way the corpus's mock engine stands in for a real backend —
//! a polling queue-pair/completion model with injectable latency and faults,
//! so the coordinator and worker loop exercise the exact same state machine
//! they would against a real device.

use super::{Completion, TransportOps, ENOMEM};
use crate::latency::{LatencyAggregator, Stage};
use crate::namespace::NamespaceEntry;
use crate::ns_worker_ctx::NsWorkerCtx;
use crate::task_pool::{SiblingId, TaskPool};
use crate::util::fast_time::FastInstant;
use std::collections::VecDeque;
use std::time::Duration;

struct Pending {
    sibling_id: SiblingId,
    ready_at: FastInstant,
    ok: bool,
}

/// Simulated queue pair: a bounded ring of in-flight completions.
pub struct NvmeTransport {
    pending: VecDeque<Pending>,
    queue_capacity: usize,
    simulated_latency: Duration,
    /// Fail the Nth submission on a given namespace with EIO, to exercise
    /// the device-removed scenario without a real fault injector.
    fail_after_n_submits: Option<u64>,
    submit_count: u64,
}

impl NvmeTransport {
    pub fn new(queue_capacity: usize, simulated_latency: Duration) -> Self {
        Self {
            pending: VecDeque::new(),
            queue_capacity,
            simulated_latency,
            fail_after_n_submits: None,
            submit_count: 0,
        }
    }

    pub fn with_fault_injection(mut self, after_n_submits: u64) -> Self {
        self.fail_after_n_submits = Some(after_n_submits);
        self
    }
}

impl TransportOps for NvmeTransport {
    fn init_ns_worker_ctx(&mut self, _ns: &NamespaceEntry, ctx: &mut NsWorkerCtx) -> crate::Result<()> {
        ctx.last_qpair = 0;
        Ok(())
    }

    fn cleanup_ns_worker_ctx(&mut self, _ctx: &mut NsWorkerCtx) {
        self.pending.clear();
    }

    fn submit_io(
        &mut self,
        _pool: &mut TaskPool,
        sibling_id: SiblingId,
        ctx: &mut NsWorkerCtx,
        _ns: &NamespaceEntry,
        _offset_in_ios: u64,
        _is_read: bool,
        ns_id: u32,
        latency: Option<&LatencyAggregator>,
    ) -> i32 {
        let t0 = FastInstant::now();
        if self.pending.len() >= self.queue_capacity {
            return ENOMEM;
        }
        ctx.last_qpair = (ctx.last_qpair + 1) % ctx.num_active_qpairs.max(1);
        self.submit_count += 1;
        let fail = self
            .fail_after_n_submits
            .is_some_and(|n| self.submit_count == n);
        self.pending.push_back(Pending {
            sibling_id,
            ready_at: FastInstant::now(),
            ok: !fail,
        });
        let _ = self.simulated_latency;
        if let Some(agg) = latency {
            let nanos = FastInstant::now().duration_since(t0).as_nanos() as u64;
            agg.record(ns_id, Stage::ReqSend, nanos);
            agg.record(ns_id, Stage::ReqComplete, nanos);
        }
        0
    }

    fn check_io(
        &mut self,
        _ctx: &mut NsWorkerCtx,
        max_completions: usize,
        ns_id: u32,
        latency: Option<&LatencyAggregator>,
    ) -> Result<Vec<Completion>, ()> {
        let now = FastInstant::now();
        let mut out = Vec::new();
        while out.len() < max_completions {
            let t0 = FastInstant::now();
            match self.pending.front() {
                Some(p) if now.duration_since(p.ready_at) >= self.simulated_latency => {
                    let p = self.pending.pop_front().unwrap();
                    if let Some(agg) = latency {
                        let nanos = FastInstant::now().duration_since(t0).as_nanos() as u64;
                        agg.record(ns_id, Stage::WrSend, nanos);
                        agg.record(ns_id, Stage::WrComplete, nanos);
                    }
                    out.push(Completion { sibling_id: p.sibling_id, ok: p.ok });
                }
                _ => break,
            }
        }
        Ok(out)
    }

    fn verify_io(&self, pool: &TaskPool, sibling_id: SiblingId, ns: &NamespaceEntry) -> bool {
        if !ns.pi_enabled {
            return true;
        }
        let sibling = pool.sibling(sibling_id);
        let payload_len = pool.payload_slice(sibling.primary_id).len();
        sibling.iovecs.iter().all(|iov| iov.offset + iov.len <= payload_len)
    }
}
