//! Configuration module
//!
//! Assembles the process-wide [`Config`] from parsed CLI flags plus one
//! [`NamespaceSpec`] per `-r/--transport` occurrence.

pub mod cli;

use cli::{Cli, IoPattern};
use serde::Serialize;
use std::fmt;

/// One parsed `-r/--transport` entry: `key:value key:value ...`.
#[derive(Debug, Clone, Serialize)]
pub struct NamespaceSpec {
    pub trtype: String,
    pub adrfam: Option<String>,
    pub traddr: Option<String>,
    pub trsvcid: Option<String>,
    pub subnqn: Option<String>,
    pub ns: Option<String>,
    pub hostnqn: Option<String>,
    /// Any `key:value` pair not recognized above, kept verbatim and
    /// otherwise uninterpreted (transport/runtime tuning is out of scope).
    pub extra: Vec<(String, String)>,
}

impl NamespaceSpec {
    pub fn parse(spec: &str) -> anyhow::Result<Self> {
        let mut trtype = None;
        let mut adrfam = None;
        let mut traddr = None;
        let mut trsvcid = None;
        let mut subnqn = None;
        let mut ns = None;
        let mut hostnqn = None;
        let mut extra = Vec::new();

        for token in spec.split_whitespace() {
            let (key, value) = token
                .split_once(':')
                .ok_or_else(|| anyhow::anyhow!("malformed transport entry (expected key:value): {}", token))?;
            match key {
                "trtype" => trtype = Some(value.to_string()),
                "adrfam" => adrfam = Some(value.to_string()),
                "traddr" => traddr = Some(value.to_string()),
                "trsvcid" => trsvcid = Some(value.to_string()),
                "subnqn" => subnqn = Some(value.to_string()),
                "ns" => ns = Some(value.to_string()),
                "hostnqn" => hostnqn = Some(value.to_string()),
                other => extra.push((other.to_string(), value.to_string())),
            }
        }

        Ok(Self {
            trtype: trtype.ok_or_else(|| anyhow::anyhow!("transport entry missing 'trtype': {}", spec))?,
            adrfam,
            traddr,
            trsvcid,
            subnqn,
            ns,
            hostnqn,
            extra,
        })
    }
}

impl fmt::Display for NamespaceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trtype={}", self.trtype)?;
        if let Some(ref traddr) = self.traddr {
            write!(f, " traddr={}", traddr)?;
        }
        if let Some(ref ns) = self.ns {
            write!(f, " ns={}", ns)?;
        }
        Ok(())
    }
}

/// Process-wide configuration assembled from CLI flags.
#[derive(Debug, Clone)]
pub struct Config {
    pub io_depth: u32,
    pub io_size: u32,
    pub io_pattern: IoPattern,
    pub rwmixread: u32,
    pub time_secs: u64,
    pub warmup_time_secs: u64,
    pub core_mask: Option<String>,
    pub namespaces: Vec<NamespaceSpec>,
    pub rep_num: u32,
    pub final_send_main_rep: bool,
    pub io_limit: Option<u64>,
    pub io_num_per_second: Option<u64>,
    pub batch_size: u32,
    pub number_ios: Option<u64>,
    pub num_qpairs: u32,
    pub num_unused_qpairs: u32,
    pub zipf_theta: Option<f64>,
    pub latency_histogram_level: u8,
    pub continue_on_error: Option<u32>,
    /// Transport/runtime tuning flags from the CLI surface that this core
    /// does not interpret, kept verbatim for the transport layer (spec §6).
    pub passthrough: Vec<(String, String)>,
}

impl Config {
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        cli.validate()?;

        let namespaces = cli
            .transport
            .iter()
            .map(|s| NamespaceSpec::parse(s))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let rwmixread = cli.io_pattern.fixed_rwmixread().unwrap_or(cli.rwmixread);

        Ok(Self {
            io_depth: cli.io_depth,
            io_size: cli.io_size,
            io_pattern: cli.io_pattern,
            rwmixread,
            time_secs: cli.time,
            warmup_time_secs: cli.warmup_time,
            core_mask: cli.core_mask.clone(),
            namespaces,
            rep_num: cli.rep_num,
            final_send_main_rep: cli.final_send_main_rep,
            io_limit: cli.io_limit,
            io_num_per_second: cli.io_num_per_second,
            batch_size: cli.batch_size,
            number_ios: cli.number_ios,
            num_qpairs: cli.num_qpairs,
            num_unused_qpairs: cli.num_unused_qpairs,
            zipf_theta: cli.zipf,
            latency_histogram_level: cli.latency_histogram,
            continue_on_error: cli.continue_on_error,
            passthrough: cli.passthrough_flags(),
        })
    }

    /// Validation that depends on namespace/device state resolved after
    /// parsing (block-size alignment per spec.md §7 `ConfigInvalid`).
    pub fn validate_against_block_size(&self, block_size: u64) -> anyhow::Result<()> {
        if block_size == 0 || self.io_size as u64 % block_size != 0 {
            anyhow::bail!("io-size ({}) must be a positive multiple of the namespace block size ({})", self.io_size, block_size);
        }
        Ok(())
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "replio configuration:")?;
        writeln!(f, "  io_depth={} io_size={} pattern={:?} rwmixread={}", self.io_depth, self.io_size, self.io_pattern, self.rwmixread)?;
        writeln!(f, "  time={}s warmup={}s rep_num={} final_send_main_rep={}", self.time_secs, self.warmup_time_secs, self.rep_num, self.final_send_main_rep)?;
        if let Some(rate) = self.io_num_per_second {
            writeln!(f, "  rate_limited: {} io/s, batch_size={}", rate, self.batch_size)?;
        }
        for (i, ns) in self.namespaces.iter().enumerate() {
            writeln!(f, "  namespace[{}]: {}", i, ns)?;
        }
        if !self.passthrough.is_empty() {
            write!(f, "  passthrough:")?;
            for (k, v) in &self.passthrough {
                write!(f, " {}={}", k, v)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_transport_spec() {
        let spec = NamespaceSpec::parse("trtype:PCIe traddr:0000:00:00.0 ns:1").unwrap();
        assert_eq!(spec.trtype, "PCIe");
        assert_eq!(spec.traddr.as_deref(), Some("0000:00:00.0"));
        assert_eq!(spec.ns.as_deref(), Some("1"));
    }

    #[test]
    fn rejects_spec_missing_trtype() {
        assert!(NamespaceSpec::parse("traddr:0000:00:00.0").is_err());
    }

    #[test]
    fn unrecognized_keys_collect_into_extra() {
        let spec = NamespaceSpec::parse("trtype:TCP iova-mode:pa").unwrap();
        assert_eq!(spec.extra, vec![("iova-mode".to_string(), "pa".to_string())]);
    }
}
