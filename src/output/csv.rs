//! Per-stage latency CSV writer.
//!
//! Row format: `id, ns_id, stage_name, latency.sec:latency.nsec, io_num,
//! avg.sec:avg.nsec`, six rows per namespace per tick, each namespace-group
//! terminated by a blank line. The writer reopens the file for every flush
//! (open/append/write/close) instead of holding a handle open; this is
//! intentional crash-durability and must be preserved.

use crate::latency::LatencyTick;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct CsvWriter {
    path: PathBuf,
    next_id: u64,
}

impl CsvWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), next_id: 1 }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Formats one tick's rows and appends them via a fresh open/write/close.
    pub fn write_tick(&mut self, tick: &LatencyTick) -> std::io::Result<()> {
        let mut buf = String::new();
        for chunk in tick.rows.chunks(crate::latency::Stage::ALL.len()) {
            for row in chunk {
                let avg_nanos = if row.io_count > 0 { row.total_nanos / row.io_count } else { 0 };
                buf.push_str(&format!(
                    "{},{},{},{}:{},{},{}:{}\n",
                    self.next_id,
                    row.ns_id,
                    row.stage.name(),
                    row.total_nanos / 1_000_000_000,
                    row.total_nanos % 1_000_000_000,
                    row.io_count,
                    avg_nanos / 1_000_000_000,
                    avg_nanos % 1_000_000_000,
                ));
                self.next_id += 1;
            }
            buf.push('\n');
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(buf.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }
}

/// Drives the consumer side of the latency-tick channel: reads until the
/// channel closes or `deadline` passes, appending every tick to `path`.
pub fn run_writer_loop(rx: &std::sync::mpsc::Receiver<LatencyTick>, path: impl Into<PathBuf>, deadline: std::time::Instant) -> std::io::Result<()> {
    let mut writer = CsvWriter::new(path);
    loop {
        let remaining = deadline.saturating_duration_since(std::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match rx.recv_timeout(remaining) {
            Ok(tick) => writer.write_tick(&tick)?,
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => break,
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::latency::{SnapshotRow, Stage};

    #[test]
    fn writes_six_rows_per_namespace_with_blank_separator() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latency.csv");
        let mut writer = CsvWriter::new(&path);

        let rows: Vec<SnapshotRow> = Stage::ALL
            .iter()
            .map(|&stage| SnapshotRow { ns_id: 0, stage, total_nanos: 1000, io_count: 10 })
            .collect();
        writer.write_tick(&LatencyTick { rows }).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[6], "");
        assert!(lines[0].starts_with("1,0,task_queue,"));
        assert!(lines[5].starts_with("6,0,wr_complete,"));
    }

    #[test]
    fn reopens_file_across_calls_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latency.csv");
        let mut writer = CsvWriter::new(&path);

        let row = |stage| SnapshotRow { ns_id: 0, stage, total_nanos: 0, io_count: 0 };
        writer.write_tick(&LatencyTick { rows: vec![row(Stage::TaskQueue)] }).unwrap();
        writer.write_tick(&LatencyTick { rows: vec![row(Stage::TaskQueue)] }).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().filter(|l| l.starts_with(|c: char| c.is_ascii_digit())).count(), 2);
    }
}
