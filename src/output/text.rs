//! Human-readable end-of-run summary.

use crate::config::Config;
use crate::stats::RunStats;
use crate::worker::NsSummary;
use std::collections::BTreeMap;

/// Prints a per-namespace totals table plus one aggregate row. `summaries`
/// holds one [`NsSummary`] per (worker, namespace) pair; rows sharing an
/// `ns_id` are rolled up into a single line.
pub fn print_results(config: &Config, summaries: &[NsSummary], histogram: Option<(&RunStats, u8)>) {
    println!("===============================================================");
    println!("                         RUN RESULTS");
    println!("===============================================================");
    println!("{}", config);

    println!(
        "{:<6} {:>12} {:>12} {:>8} {:>10} {:>10} {:>10}",
        "ns", "submitted", "completed", "errors", "min_us", "max_us", "mean_us"
    );

    let mut by_ns: BTreeMap<u32, NsSummary> = BTreeMap::new();
    for s in summaries {
        let entry = by_ns.entry(s.ns_id).or_insert(NsSummary { ns_id: s.ns_id, submitted: 0, completed: 0, min_nanos: u64::MAX, max_nanos: 0, total_nanos: 0 });
        entry.submitted += s.submitted;
        entry.completed += s.completed;
        entry.min_nanos = entry.min_nanos.min(s.min_nanos);
        entry.max_nanos = entry.max_nanos.max(s.max_nanos);
        entry.total_nanos += s.total_nanos;
    }

    let mut total_submitted = 0u64;
    let mut total_completed = 0u64;
    let mut total_errors = 0u64;
    let mut agg_min = u64::MAX;
    let mut agg_max = 0u64;
    let mut agg_total_nanos = 0u64;

    for (ns_id, s) in &by_ns {
        let errors = s.submitted.saturating_sub(s.completed);
        let min_nanos = if s.min_nanos == u64::MAX { 0 } else { s.min_nanos };
        let mean_nanos = if s.completed > 0 { s.total_nanos / s.completed } else { 0 };

        println!(
            "{:<6} {:>12} {:>12} {:>8} {:>10.2} {:>10.2} {:>10.2}",
            ns_id,
            s.submitted,
            s.completed,
            errors,
            min_nanos as f64 / 1000.0,
            s.max_nanos as f64 / 1000.0,
            mean_nanos as f64 / 1000.0,
        );

        total_submitted += s.submitted;
        total_completed += s.completed;
        total_errors += errors;
        if s.min_nanos != u64::MAX {
            agg_min = agg_min.min(s.min_nanos);
        }
        agg_max = agg_max.max(s.max_nanos);
        agg_total_nanos += s.total_nanos;
    }

    let agg_mean = if total_completed > 0 { agg_total_nanos / total_completed } else { 0 };
    println!("---------------------------------------------------------------");
    println!(
        "{:<6} {:>12} {:>12} {:>8} {:>10.2} {:>10.2} {:>10.2}",
        "all",
        total_submitted,
        total_completed,
        total_errors,
        if agg_min == u64::MAX { 0.0 } else { agg_min as f64 / 1000.0 },
        agg_max as f64 / 1000.0,
        agg_mean as f64 / 1000.0,
    );

    if let Some((stats, level)) = histogram {
        print_histogram(stats, level, by_ns.len());
    }
}

fn print_histogram(stats: &RunStats, level: u8, num_namespaces: usize) {
    println!();
    println!("latency histogram (software, -L{})", if level > 1 { "L" } else { "" });
    for ns_id in 0..num_namespaces {
        if stats.is_empty() {
            continue;
        }
        let p50 = stats.percentile(ns_id as u32, 50.0);
        let p99 = stats.percentile(ns_id as u32, 99.0);
        let p999 = stats.percentile(ns_id as u32, 99.9);
        println!(
            "  ns[{}]: p50={:?} p99={:?} p99.9={:?} n={}",
            ns_id, p50, p99, p999, stats.len(ns_id as u32)
        );
        if level > 1 {
            for pct in [10.0, 25.0, 50.0, 75.0, 90.0, 95.0, 99.0, 99.9, 99.99] {
                if let Some(d) = stats.percentile(ns_id as u32, pct) {
                    println!("    {:>6.2}%  {:>10?}", pct, d);
                }
            }
        }
    }
}
