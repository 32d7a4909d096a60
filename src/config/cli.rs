//! CLI argument parsing using clap

use clap::{Parser, ValueEnum};

/// replio - replicated NVMe-oF I/O measurement engine
#[derive(Parser, Debug)]
#[command(name = "replio")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// In-flight logical I/O budget per worker
    #[arg(short = 'q', long = "io-depth", default_value = "1")]
    pub io_depth: u32,

    /// Bytes per I/O; must be a positive multiple of each namespace's block size
    #[arg(short = 'o', long = "io-size", default_value = "4096")]
    pub io_size: u32,

    /// Access pattern
    #[arg(short = 'w', long = "io-pattern", value_enum, default_value = "read")]
    pub io_pattern: IoPattern,

    /// Read percentage for rw/randrw
    #[arg(short = 'M', long = "rwmixread", default_value = "50")]
    pub rwmixread: u32,

    /// Run duration in seconds
    #[arg(short = 't', long = "time", default_value = "0")]
    pub time: u64,

    /// Warm-up duration in seconds
    #[arg(short = 'a', long = "warmup-time", default_value = "0")]
    pub warmup_time: u64,

    /// Hex mask of cores to run workers on
    #[arg(short = 'c', long = "core-mask")]
    pub core_mask: Option<String>,

    /// Transport spec, repeatable: "key:value key:value ..." (trtype, adrfam, traddr, trsvcid, subnqn, ns, hostnqn)
    #[arg(short = 'r', long = "transport")]
    pub transport: Vec<String>,

    /// Replica count
    #[arg(short = 'n', long = "rep-num", default_value = "3")]
    pub rep_num: u32,

    /// Emit primary sibling last
    #[arg(short = 'f', long = "final-send-main-rep")]
    pub final_send_main_rep: bool,

    /// Restrict each namespace's logical capacity to capacity/N
    #[arg(short = 'K', long = "io-limit")]
    pub io_limit: Option<u64>,

    /// Enable open-loop rate limiter (I/Os per second)
    #[arg(short = 'E', long = "io-num-per-second")]
    pub io_num_per_second: Option<u64>,

    /// Submission batch size for the rate limiter
    #[arg(short = 'B', long = "batch-size", default_value = "1")]
    pub batch_size: u32,

    /// Submission budget per context (additional exit criterion)
    #[arg(short = 'd', long = "number-ios")]
    pub number_ios: Option<u64>,

    /// Active queue pairs per namespace
    #[arg(short = 'P', long = "num-qpairs", default_value = "1")]
    pub num_qpairs: u32,

    /// Additional idle queue pairs per namespace
    #[arg(short = 'U', long = "num-unused-qpairs", default_value = "0")]
    pub num_unused_qpairs: u32,

    /// Use Zipf distribution for random offsets, with the given theta
    #[arg(short = 'F', long = "zipf")]
    pub zipf: Option<f64>,

    /// Enable software latency histogram (repeat for full bucket dump: -L -L)
    #[arg(short = 'L', action = clap::ArgAction::Count)]
    pub latency_histogram: u8,

    /// On submission error, re-queue instead of aborting; rate-limit error messages to every Nth
    #[arg(short = 'Q', long = "continue-on-error")]
    pub continue_on_error: Option<u32>,

    /// Transport/runtime tuning pass-through flags, collected verbatim and not interpreted
    #[arg(long = "transport-stats", hide = true)]
    pub transport_stats: bool,
    #[arg(long = "iova-mode", hide = true)]
    pub iova_mode: Option<String>,
    #[arg(long = "io-queue-size", hide = true)]
    pub io_queue_size: Option<u32>,
    #[arg(long = "no-huge", hide = true)]
    pub no_huge: bool,
    #[arg(long = "use-every-core", hide = true)]
    pub use_every_core: bool,
    #[arg(long = "disable-ktls", hide = true)]
    pub disable_ktls: bool,
    #[arg(long = "enable-ktls", hide = true)]
    pub enable_ktls: bool,
    #[arg(long = "tls-version", hide = true)]
    pub tls_version: Option<String>,
    #[arg(long = "psk-path", hide = true)]
    pub psk_path: Option<String>,
    #[arg(long = "psk-identity", hide = true)]
    pub psk_identity: Option<String>,
    #[arg(long = "zerocopy-threshold", hide = true)]
    pub zerocopy_threshold: Option<u32>,
    #[arg(long = "zerocopy-threshold-sock-impl", hide = true)]
    pub zerocopy_threshold_sock_impl: Option<u32>,
    #[arg(long = "transport-tos", hide = true)]
    pub transport_tos: Option<String>,
    #[arg(long = "rdma-srq-size", hide = true)]
    pub rdma_srq_size: Option<u32>,

    /// Remaining single-letter transport/runtime tuning flags from the source
    /// CLI surface (`-R -V -D -H -I -N -S -Z -z -k -A -s -g -C -i -e -m -G -T`):
    /// accepted verbatim as an optional value and passed through uninterpreted.
    #[arg(short = 'R', hide = true)]
    pub opt_r: Option<String>,
    #[arg(short = 'V', hide = true)]
    pub opt_v: Option<String>,
    #[arg(short = 'D', hide = true)]
    pub opt_d: Option<String>,
    #[arg(short = 'H', hide = true)]
    pub opt_h: Option<String>,
    #[arg(short = 'I', hide = true)]
    pub opt_i_upper: Option<String>,
    #[arg(short = 'N', hide = true)]
    pub opt_n: Option<String>,
    #[arg(short = 'S', hide = true)]
    pub opt_s_upper: Option<String>,
    #[arg(short = 'Z', hide = true)]
    pub opt_z_upper: Option<String>,
    #[arg(short = 'z', hide = true)]
    pub opt_z: Option<String>,
    #[arg(short = 'k', hide = true)]
    pub opt_k: Option<String>,
    #[arg(short = 'A', hide = true)]
    pub opt_a: Option<String>,
    #[arg(short = 's', hide = true)]
    pub opt_s: Option<String>,
    #[arg(short = 'g', hide = true)]
    pub opt_g: Option<String>,
    #[arg(short = 'C', hide = true)]
    pub opt_c: Option<String>,
    #[arg(short = 'i', hide = true)]
    pub opt_i: Option<String>,
    #[arg(short = 'e', hide = true)]
    pub opt_e: Option<String>,
    #[arg(short = 'm', hide = true)]
    pub opt_m: Option<String>,
    #[arg(short = 'G', hide = true)]
    pub opt_g_upper: Option<String>,
    #[arg(short = 'T', hide = true)]
    pub opt_t: Option<String>,
}

impl Cli {
    /// Collects every pass-through transport/runtime tuning flag that was
    /// actually given into a `key:value` bag, for attachment to [`super::Config`].
    pub fn passthrough_flags(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        if self.transport_stats {
            out.push(("transport-stats".to_string(), "true".to_string()));
        }
        if self.no_huge {
            out.push(("no-huge".to_string(), "true".to_string()));
        }
        if self.use_every_core {
            out.push(("use-every-core".to_string(), "true".to_string()));
        }
        if self.disable_ktls {
            out.push(("disable-ktls".to_string(), "true".to_string()));
        }
        if self.enable_ktls {
            out.push(("enable-ktls".to_string(), "true".to_string()));
        }
        for (name, value) in [
            ("iova-mode", &self.iova_mode),
            ("tls-version", &self.tls_version),
            ("psk-path", &self.psk_path),
            ("psk-identity", &self.psk_identity),
            ("transport-tos", &self.transport_tos),
            ("R", &self.opt_r),
            ("V", &self.opt_v),
            ("D", &self.opt_d),
            ("H", &self.opt_h),
            ("I", &self.opt_i_upper),
            ("N", &self.opt_n),
            ("S", &self.opt_s_upper),
            ("Z", &self.opt_z_upper),
            ("z", &self.opt_z),
            ("k", &self.opt_k),
            ("A", &self.opt_a),
            ("s", &self.opt_s),
            ("g", &self.opt_g),
            ("C", &self.opt_c),
            ("i", &self.opt_i),
            ("e", &self.opt_e),
            ("m", &self.opt_m),
            ("G", &self.opt_g_upper),
            ("T", &self.opt_t),
        ] {
            if let Some(v) = value {
                out.push((name.to_string(), v.clone()));
            }
        }
        for (name, value) in [
            ("io-queue-size", self.io_queue_size),
            ("zerocopy-threshold", self.zerocopy_threshold),
            ("zerocopy-threshold-sock-impl", self.zerocopy_threshold_sock_impl),
            ("rdma-srq-size", self.rdma_srq_size),
        ] {
            if let Some(v) = value {
                out.push((name.to_string(), v.to_string()));
            }
        }
        out
    }
}

/// Access pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IoPattern {
    Read,
    Write,
    Rw,
    Randread,
    Randwrite,
    Randrw,
}

impl IoPattern {
    pub fn is_random(self) -> bool {
        matches!(self, IoPattern::Randread | IoPattern::Randwrite | IoPattern::Randrw)
    }

    /// Effective rwmixread implied by the pattern itself (read-only / write-only
    /// patterns override whatever `-M` was given).
    pub fn fixed_rwmixread(self) -> Option<u32> {
        match self {
            IoPattern::Read | IoPattern::Randread => Some(100),
            IoPattern::Write | IoPattern::Randwrite => Some(0),
            IoPattern::Rw | IoPattern::Randrw => None,
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate CLI arguments that can be checked before namespaces are opened.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.io_depth == 0 {
            anyhow::bail!("io-depth must be at least 1");
        }
        if self.io_size == 0 {
            anyhow::bail!("io-size must be greater than 0");
        }
        if self.rwmixread > 100 {
            anyhow::bail!("rwmixread must be between 0 and 100");
        }
        if self.rep_num == 0 {
            anyhow::bail!("rep-num must be at least 1");
        }
        if self.transport.is_empty() {
            anyhow::bail!("at least one -r/--transport must be given");
        }
        if (self.transport.len() as u32) != self.rep_num {
            anyhow::bail!(
                "rep-num ({}) must equal the number of -r/--transport entries given ({})",
                self.rep_num,
                self.transport.len()
            );
        }
        if let Some(theta) = self.zipf {
            if !(0.0..=3.0).contains(&theta) {
                anyhow::bail!("zipf theta must be between 0.0 and 3.0");
            }
        }
        if self.num_qpairs == 0 {
            anyhow::bail!("num-qpairs must be at least 1");
        }
        if self.io_num_per_second.is_some() && self.batch_size == 0 {
            anyhow::bail!("batch-size must be at least 1 when a rate is set");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_pattern_fixes_rwmixread_for_pure_patterns() {
        assert_eq!(IoPattern::Read.fixed_rwmixread(), Some(100));
        assert_eq!(IoPattern::Randwrite.fixed_rwmixread(), Some(0));
        assert_eq!(IoPattern::Randrw.fixed_rwmixread(), None);
    }

    #[test]
    fn is_random_covers_rand_variants() {
        assert!(IoPattern::Randread.is_random());
        assert!(IoPattern::Randwrite.is_random());
        assert!(IoPattern::Randrw.is_random());
        assert!(!IoPattern::Read.is_random());
        assert!(!IoPattern::Rw.is_random());
    }
}
