//! Per-(worker, namespace) state: the handle passed into the transport vtable.

use crate::task_pool::SiblingId;
use std::collections::VecDeque;

/// One queue-pair handle. Real queue-pair state lives in the transport;
/// the context only tracks which handles exist and which are in use.
pub type QpairHandle = u32;

pub struct NsWorkerCtx {
    pub ns_id: u32,
    pub num_active_qpairs: u32,
    pub num_unused_qpairs: u32,
    pub active_qpairs: Vec<QpairHandle>,
    pub unused_qpairs: Vec<QpairHandle>,
    pub last_qpair: u32,
    pub current_queue_depth: u32,
    pub queue_depth: u32,
    /// Sequential-offset cursor; shared across all namespaces by the primary's context.
    pub offset_in_ios: u64,
    pub is_draining: bool,
    pub status: i32,
    /// Siblings that hit `ENOMEM` on submission and must be retried.
    pub queued_tasks: VecDeque<SiblingId>,
    pub io_submitted: u64,
    pub io_completed: u64,
    pub min_latency_nanos: u64,
    pub max_latency_nanos: u64,
    pub total_latency_nanos: u64,
}

impl NsWorkerCtx {
    pub fn new(ns_id: u32, num_active_qpairs: u32, num_unused_qpairs: u32, queue_depth: u32) -> Self {
        Self {
            ns_id,
            num_active_qpairs,
            num_unused_qpairs,
            active_qpairs: (0..num_active_qpairs).collect(),
            unused_qpairs: (num_active_qpairs..num_active_qpairs + num_unused_qpairs).collect(),
            last_qpair: 0,
            current_queue_depth: 0,
            queue_depth,
            offset_in_ios: 0,
            is_draining: false,
            status: 0,
            queued_tasks: VecDeque::new(),
            io_submitted: 0,
            io_completed: 0,
            min_latency_nanos: u64::MAX,
            max_latency_nanos: 0,
            total_latency_nanos: 0,
        }
    }

    pub fn record_latency(&mut self, nanos: u64) {
        self.min_latency_nanos = self.min_latency_nanos.min(nanos);
        self.max_latency_nanos = self.max_latency_nanos.max(nanos);
        self.total_latency_nanos += nanos;
    }

    pub fn mean_latency_nanos(&self) -> u64 {
        if self.io_completed == 0 {
            0
        } else {
            self.total_latency_nanos / self.io_completed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_current_depth_equals_submitted_minus_completed() {
        let mut ctx = NsWorkerCtx::new(0, 4, 0, 32);
        ctx.io_submitted = 10;
        ctx.current_queue_depth = 10;
        ctx.io_completed = 4;
        ctx.current_queue_depth -= 4;
        assert_eq!(ctx.current_queue_depth as u64, ctx.io_submitted - ctx.io_completed);
    }
}
