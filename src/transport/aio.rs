//! Blocking pread/pwrite transport (the "aio" backend).
//!
//! Submission performs the syscall inline and completes synchronously —
//! grounded in the corpus's synchronous-engine pattern — then the completion
//! is handed back on the next `check_io` poll so the coordinator's
//! submit/poll split stays identical across transports.

use super::{Completion, TransportOps};
use crate::latency::{LatencyAggregator, Stage};
use crate::namespace::NamespaceEntry;
use crate::ns_worker_ctx::NsWorkerCtx;
use crate::task_pool::{SiblingId, TaskPool};
use crate::util::fast_time::FastInstant;
use std::collections::VecDeque;
use std::os::unix::io::RawFd;

pub struct AioTransport {
    ready: VecDeque<Completion>,
}

impl AioTransport {
    pub fn new() -> Self {
        Self { ready: VecDeque::new() }
    }
}

impl Default for AioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportOps for AioTransport {
    fn init_ns_worker_ctx(&mut self, _ns: &NamespaceEntry, ctx: &mut NsWorkerCtx) -> crate::Result<()> {
        ctx.last_qpair = 0;
        Ok(())
    }

    fn cleanup_ns_worker_ctx(&mut self, _ctx: &mut NsWorkerCtx) {
        self.ready.clear();
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
        ctx.last_qpair = (ctx.last_qpair + 1) % ctx.num_active_qpairs.max(1);

        let fd: RawFd = ns.target.fd();
        let byte_offset = (offset_in_ios * ns.io_size_blocks * ns.block_size) as libc::off_t;
        let primary_id = pool.sibling(sibling_id).primary_id;
        let t0 = FastInstant::now();
        let ok = if is_read {
            let buf = pool.payload_slice_mut(primary_id);
            let ret = unsafe {
                libc::pread(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), byte_offset)
            };
            ret >= 0
        } else {
            let buf = pool.payload_slice(primary_id);
            let ret = unsafe {
                libc::pwrite(fd, buf.as_ptr() as *const libc::c_void, buf.len(), byte_offset)
            };
            ret >= 0
        };
        if let Some(agg) = latency {
            let nanos = FastInstant::now().duration_since(t0).as_nanos() as u64;
            agg.record(ns_id, Stage::ReqSend, nanos);
            agg.record(ns_id, Stage::ReqComplete, nanos);
        }
        self.ready.push_back(Completion { sibling_id, ok });
        0
    }

    fn check_io(
        &mut self,
        _ctx: &mut NsWorkerCtx,
        max_completions: usize,
        ns_id: u32,
        latency: Option<&LatencyAggregator>,
    ) -> Result<Vec<Completion>, ()> {
        let mut out = Vec::new();
        while out.len() < max_completions {
            let t0 = FastInstant::now();
            match self.ready.pop_front() {
                Some(c) => {
                    if let Some(agg) = latency {
                        let nanos = FastInstant::now().duration_since(t0).as_nanos() as u64;
                        agg.record(ns_id, Stage::WrSend, nanos);
                        agg.record(ns_id, Stage::WrComplete, nanos);
                    }
                    out.push(c)
                }
                None => break,
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
