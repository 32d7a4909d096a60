//! Run-level statistics: per-namespace histograms for the optional `-L`/`-LL`
//! end-of-run percentile summary, layered on top of the per-stage
//! [`crate::latency`] accumulators that drive the CSV log.

pub mod histogram;

use histogram::LatencyHistogram;
use std::sync::Mutex;

/// One histogram per namespace, filled from completion latencies when `-L`
/// is enabled. Kept separate from [`crate::latency::LatencyAggregator`]
/// since histograms are comparatively expensive and only needed for the
/// human-facing summary, not the per-second CSV log.
pub struct RunStats {
    per_namespace: Vec<Mutex<LatencyHistogram>>,
}

impl RunStats {
    pub fn new(num_namespaces: u32) -> Self {
        let per_namespace = (0..num_namespaces).map(|_| Mutex::new(LatencyHistogram::new())).collect();
        Self { per_namespace }
    }

    pub fn record(&self, ns_id: u32, latency: std::time::Duration) {
        if let Some(hist) = self.per_namespace.get(ns_id as usize) {
            hist.lock().unwrap().record(latency);
        }
    }

    pub fn percentile(&self, ns_id: u32, pct: f64) -> Option<std::time::Duration> {
        self.per_namespace.get(ns_id as usize)?.lock().unwrap().percentile(pct)
    }

    pub fn len(&self, ns_id: u32) -> u64 {
        self.per_namespace.get(ns_id as usize).map(|h| h.lock().unwrap().len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.per_namespace.iter().all(|h| h.lock().unwrap().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn records_go_to_their_own_namespace() {
        let stats = RunStats::new(2);
        stats.record(0, Duration::from_micros(100));
        stats.record(1, Duration::from_micros(500));

        assert_eq!(stats.len(0), 1);
        assert_eq!(stats.len(1), 1);
        assert!(stats.percentile(0, 50.0).unwrap() < stats.percentile(1, 50.0).unwrap());
    }
}
