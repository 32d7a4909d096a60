//! io_uring transport, grounded on the corpus's io_uring engine: one ring per
//! namespace-worker context, `user_data` carries the sibling id.

use super::{Completion, TransportOps, ENOMEM};
use crate::latency::{LatencyAggregator, Stage};
use crate::namespace::NamespaceEntry;
use crate::ns_worker_ctx::NsWorkerCtx;
use crate::task_pool::{SiblingId, TaskPool};
use crate::util::fast_time::FastInstant;
use anyhow::Context;
use io_uring::{opcode, types, IoUring};

pub struct UringTransport {
    ring: Option<IoUring>,
    queue_depth: u32,
}

impl UringTransport {
    pub fn new(queue_depth: u32) -> Self {
        Self { ring: None, queue_depth }
    }
}

impl TransportOps for UringTransport {
    fn init_ns_worker_ctx(&mut self, _ns: &NamespaceEntry, ctx: &mut NsWorkerCtx) -> crate::Result<()> {
        let ring = IoUring::new(self.queue_depth.max(1)).context("Failed to create io_uring instance")?;
        self.ring = Some(ring);
        ctx.last_qpair = 0;
        Ok(())
    }

    fn cleanup_ns_worker_ctx(&mut self, _ctx: &mut NsWorkerCtx) {
        self.ring = None;
    }

    fn submit_io(
        &mut self,
        pool: &mut TaskPool,
        sibling_id: SiblingId,
        ctx: &mut NsWorkerCtx,
        ns: &NamespaceEntry,
        offset_in_ios: u64,
        is_read: bool,
        ns_id: u32,
        latency: Option<&LatencyAggregator>,
    ) -> i32 {
        let ring = match self.ring.as_mut() {
            Some(r) => r,
            None => return -1,
        };
        ctx.last_qpair = (ctx.last_qpair + 1) % ctx.num_active_qpairs.max(1);

        let fd = types::Fd(ns.target.fd());
        let byte_offset = offset_in_ios * ns.io_size_blocks * ns.block_size;
        let primary_id = pool.sibling(sibling_id).primary_id;
        let len = pool.payload_slice(primary_id).len() as u32;
        let entry = if is_read {
            let ptr = pool.payload_slice_mut(primary_id).as_mut_ptr();
            opcode::Read::new(fd, ptr, len).offset(byte_offset).build()
        } else {
            let ptr = pool.payload_slice(primary_id).as_ptr();
            opcode::Write::new(fd, ptr, len).offset(byte_offset).build()
        }
        .user_data(sibling_id as u64);

        let t0 = FastInstant::now();
        let push_result = unsafe { ring.submission().push(&entry) };
        if push_result.is_err() {
            return ENOMEM;
        }
        let result = match ring.submit() {
            Ok(_) => 0,
            Err(_) => -1,
        };
        if result == 0 {
            if let Some(agg) = latency {
                let nanos = FastInstant::now().duration_since(t0).as_nanos() as u64;
                agg.record(ns_id, Stage::ReqSend, nanos);
                agg.record(ns_id, Stage::ReqComplete, nanos);
            }
        }
        result
    }

    fn check_io(
        &mut self,
        _ctx: &mut NsWorkerCtx,
        max_completions: usize,
        ns_id: u32,
        latency: Option<&LatencyAggregator>,
    ) -> Result<Vec<Completion>, ()> {
        let ring = match self.ring.as_mut() {
            Some(r) => r,
            None => return Err(()),
        };
        let t0 = FastInstant::now();
        let mut out = Vec::new();
        for cqe in ring.completion().take(max_completions) {
            out.push(Completion {
                sibling_id: cqe.user_data() as SiblingId,
                ok: cqe.result() >= 0,
            });
        }
        if let Some(agg) = latency {
            if !out.is_empty() {
                let nanos = FastInstant::now().duration_since(t0).as_nanos() as u64 / out.len() as u64;
                for _ in &out {
                    agg.record(ns_id, Stage::WrSend, nanos);
                    agg.record(ns_id, Stage::WrComplete, nanos);
                }
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
