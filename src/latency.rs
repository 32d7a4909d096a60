//! Per-namespace, per-stage latency accumulation.
//!
//! Six named stages are tracked per namespace: `task_queue`, `task_complete`,
//! `req_send`, `req_complete`, `wr_send`, `wr_complete`. Each `(ns, stage)`
//! pair accumulates a running `(total_duration, io_count)` under one mutex.
//! Once a second the admin thread snapshots and zeroes every accumulator in
//! one lock hold, then ships the snapshot across an mpsc channel to the
//! CSV-writer thread.

use std::sync::mpsc::Sender;
use std::sync::Mutex;
use std::time::Duration;

/// The six stages of a sibling's life cycle, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    TaskQueue,
    TaskComplete,
    ReqSend,
    ReqComplete,
    WrSend,
    WrComplete,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::TaskQueue,
        Stage::TaskComplete,
        Stage::ReqSend,
        Stage::ReqComplete,
        Stage::WrSend,
        Stage::WrComplete,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::TaskQueue => "task_queue",
            Stage::TaskComplete => "task_complete",
            Stage::ReqSend => "req_send",
            Stage::ReqComplete => "req_complete",
            Stage::WrSend => "wr_send",
            Stage::WrComplete => "wr_complete",
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    total_nanos: u64,
    io_count: u64,
}

/// One row of a flushed snapshot: a namespace/stage pair with its
/// accumulated total and count since the previous flush.
#[derive(Debug, Clone)]
pub struct SnapshotRow {
    pub ns_id: u32,
    pub stage: Stage,
    pub total_nanos: u64,
    pub io_count: u64,
}

struct Table {
    /// Indexed by `ns_id * 6 + stage index`.
    cells: Vec<Accumulator>,
    num_namespaces: u32,
}

/// Mutex-protected stage accumulators, shared by every worker thread.
pub struct LatencyAggregator {
    table: Mutex<Table>,
}

impl LatencyAggregator {
    pub fn new(num_namespaces: u32) -> Self {
        let cells = vec![Accumulator::default(); num_namespaces as usize * Stage::ALL.len()];
        Self { table: Mutex::new(Table { cells, num_namespaces }) }
    }

    fn index(ns_id: u32, stage: Stage) -> usize {
        let stage_idx = Stage::ALL.iter().position(|&s| s == stage).unwrap();
        ns_id as usize * Stage::ALL.len() + stage_idx
    }

    /// Adds one sample of `nanos` duration to `(ns_id, stage)`.
    pub fn record(&self, ns_id: u32, stage: Stage, nanos: u64) {
        let idx = Self::index(ns_id, stage);
        let mut table = self.table.lock().unwrap();
        let cell = &mut table.cells[idx];
        cell.total_nanos += nanos;
        cell.io_count += 1;
    }

    /// Snapshots every accumulator and zeroes it, all under one lock hold.
    pub fn snapshot_and_reset(&self) -> Vec<SnapshotRow> {
        let mut table = self.table.lock().unwrap();
        let num_namespaces = table.num_namespaces;
        let mut rows = Vec::with_capacity(table.cells.len());
        for ns_id in 0..num_namespaces {
            for &stage in &Stage::ALL {
                let idx = ns_id as usize * Stage::ALL.len()
                    + Stage::ALL.iter().position(|&s| s == stage).unwrap();
                let cell = &mut table.cells[idx];
                rows.push(SnapshotRow { ns_id, stage, total_nanos: cell.total_nanos, io_count: cell.io_count });
                *cell = Accumulator::default();
            }
        }
        rows
    }
}

/// Periodic snapshot message sent to the CSV-writer thread.
pub struct LatencyTick {
    pub rows: Vec<SnapshotRow>,
}

/// Drives the 1 Hz snapshot loop until told to stop; runs on the admin thread.
pub fn run_snapshot_loop(aggregator: &LatencyAggregator, tx: &Sender<LatencyTick>, stop: &std::sync::atomic::AtomicBool) {
    use std::sync::atomic::Ordering;
    while !stop.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_secs(1));
        let rows = aggregator.snapshot_and_reset();
        if tx.send(LatencyTick { rows }).is_err() {
            break;
        }
    }
    let rows = aggregator.snapshot_and_reset();
    let _ = tx.send(LatencyTick { rows });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_accumulates_and_reset_zeroes() {
        let agg = LatencyAggregator::new(2);
        agg.record(0, Stage::TaskQueue, 100);
        agg.record(0, Stage::TaskQueue, 200);
        agg.record(1, Stage::WrComplete, 50);

        let rows = agg.snapshot_and_reset();
        let tq0 = rows.iter().find(|r| r.ns_id == 0 && r.stage == Stage::TaskQueue).unwrap();
        assert_eq!(tq0.total_nanos, 300);
        assert_eq!(tq0.io_count, 2);
        let wc1 = rows.iter().find(|r| r.ns_id == 1 && r.stage == Stage::WrComplete).unwrap();
        assert_eq!(wc1.total_nanos, 50);

        let rows2 = agg.snapshot_and_reset();
        assert!(rows2.iter().all(|r| r.io_count == 0));
    }
}
