//! replio - per-core polling engine for replicated NVMe-oF I/O measurement
//!
//! # Architecture
//!
//! - **Task pool**: arena of logical I/Os, each fanned out into N sibling sub-operations
//! - **Transport**: closed set of backends (simulated NVMe-oF, AIO, io_uring) behind one trait
//! - **Replica coordinator**: submits siblings, tracks fan-in, reissues on completion
//! - **Worker loop**: one per pinned core, run-to-completion, no cross-worker locks
//! - **Latency pipeline**: six-stage per-sibling timestamps, aggregated and flushed to CSV

pub mod config;
pub mod coordinator;
pub mod distribution;
pub mod latency;
pub mod namespace;
pub mod ns_worker_ctx;
pub mod output;
pub mod rate_gate;
pub mod stats;
pub mod target;
pub mod task_pool;
pub mod transport;
pub mod util;
pub mod worker;

pub use config::Config;
pub use transport::Transport;

/// Result type used throughout replio
pub type Result<T> = anyhow::Result<T>;
