//! Transport vtable: one interface over three closed-at-build-time backends.
//!
//! The source represents this as a virtual table; since the transport set
//! (`Nvme`, `Aio`, `Uring`) is closed at build time we dispatch at a tagged
//! variant boundary instead of behind a trait object.

pub mod aio;
pub mod nvme;
#[cfg(feature = "io_uring")]
pub mod uring;

use crate::latency::LatencyAggregator;
use crate::namespace::NamespaceEntry;
use crate::ns_worker_ctx::NsWorkerCtx;
use crate::task_pool::{SiblingId, TaskPool};

/// Submission result: `0` on enqueue, `-ENOMEM` means "queue full, may retry",
/// any other negative value is fatal for the namespace.
pub const ENOMEM: i32 = -12;

/// One reaped completion, as `check_io` would have handed to `io_complete`.
pub struct Completion {
    pub sibling_id: SiblingId,
    pub ok: bool,
}

/// Operations every transport backend implements.
pub trait TransportOps {
    fn init_ns_worker_ctx(&mut self, ns: &NamespaceEntry, ctx: &mut NsWorkerCtx) -> crate::Result<()>;
    fn cleanup_ns_worker_ctx(&mut self, ctx: &mut NsWorkerCtx);

    /// Issues the read/write at LBA `offset_in_ios * io_size_blocks`, picking
    /// a queue pair round-robin via `ctx.last_qpair`. Returns `0`, `ENOMEM`,
    /// or another negative value per the vtable contract.
    ///
    /// Records the `req_send`/`req_complete` driver stages (spec §4.7)
    /// around the actual enqueue/syscall, when `latency` is given.
    #[allow(clippy::too_many_arguments)]
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
    ) -> i32;

    /// Polls up to `max_completions`, returning the reaped completions.
    /// Returns `-1` on transport error (the caller marks `ctx.status`/`is_draining`).
    ///
    /// Records the `wr_send`/`wr_complete` driver stages (spec §4.7) around
    /// the detection of each completion, when `latency` is given.
    fn check_io(
        &mut self,
        ctx: &mut NsWorkerCtx,
        max_completions: usize,
        ns_id: u32,
        latency: Option<&LatencyAggregator>,
    ) -> Result<Vec<Completion>, ()>;

    /// DIF/DIX verification over a completed read's iovecs, when protection
    /// information is enabled. A no-op everywhere but the narrow PI path.
    fn verify_io(&self, pool: &TaskPool, sibling_id: SiblingId, ns: &NamespaceEntry) -> bool;
}

/// Tagged variant over the three supported backends.
pub enum Transport {
    Nvme(nvme::NvmeTransport),
    Aio(aio::AioTransport),
    #[cfg(feature = "io_uring")]
    Uring(uring::UringTransport),
}

impl TransportOps for Transport {
    fn init_ns_worker_ctx(&mut self, ns: &NamespaceEntry, ctx: &mut NsWorkerCtx) -> crate::Result<()> {
        match self {
            Transport::Nvme(t) => t.init_ns_worker_ctx(ns, ctx),
            Transport::Aio(t) => t.init_ns_worker_ctx(ns, ctx),
            #[cfg(feature = "io_uring")]
            Transport::Uring(t) => t.init_ns_worker_ctx(ns, ctx),
        }
    }

    fn cleanup_ns_worker_ctx(&mut self, ctx: &mut NsWorkerCtx) {
        match self {
            Transport::Nvme(t) => t.cleanup_ns_worker_ctx(ctx),
            Transport::Aio(t) => t.cleanup_ns_worker_ctx(ctx),
            #[cfg(feature = "io_uring")]
            Transport::Uring(t) => t.cleanup_ns_worker_ctx(ctx),
        }
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
        match self {
            Transport::Nvme(t) => t.submit_io(pool, sibling_id, ctx, ns, offset_in_ios, is_read, ns_id, latency),
            Transport::Aio(t) => t.submit_io(pool, sibling_id, ctx, ns, offset_in_ios, is_read, ns_id, latency),
            #[cfg(feature = "io_uring")]
            Transport::Uring(t) => t.submit_io(pool, sibling_id, ctx, ns, offset_in_ios, is_read, ns_id, latency),
        }
    }

    fn check_io(
        &mut self,
        ctx: &mut NsWorkerCtx,
        max_completions: usize,
        ns_id: u32,
        latency: Option<&LatencyAggregator>,
    ) -> Result<Vec<Completion>, ()> {
        match self {
            Transport::Nvme(t) => t.check_io(ctx, max_completions, ns_id, latency),
            Transport::Aio(t) => t.check_io(ctx, max_completions, ns_id, latency),
            #[cfg(feature = "io_uring")]
            Transport::Uring(t) => t.check_io(ctx, max_completions, ns_id, latency),
        }
    }

    fn verify_io(&self, pool: &TaskPool, sibling_id: SiblingId, ns: &NamespaceEntry) -> bool {
        match self {
            Transport::Nvme(t) => t.verify_io(pool, sibling_id, ns),
            Transport::Aio(t) => t.verify_io(pool, sibling_id, ns),
            #[cfg(feature = "io_uring")]
            Transport::Uring(t) => t.verify_io(pool, sibling_id, ns),
        }
    }
}
