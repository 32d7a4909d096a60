//! Namespace entry: an opened I/O target plus the policy used to drive it.

use crate::distribution::sequential::SequentialDistribution;
use crate::distribution::uniform::UniformDistribution;
use crate::distribution::zipf::ZipfDistribution;
use crate::distribution::Distribution;
use crate::target::Target;
use rand::Rng;
use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

/// Which transport drives this namespace. Closed set, chosen at startup from `-r trtype:...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Nvme,
    Aio,
    Uring,
}

/// Offset-generation policy for a namespace, selected once from CLI flags.
pub enum OffsetPolicy {
    Zipf(ZipfDistribution),
    Random(UniformDistribution),
    Sequential(SequentialDistribution),
}

impl OffsetPolicy {
    pub fn next(&mut self, num_blocks: u64) -> u64 {
        match self {
            OffsetPolicy::Zipf(d) => d.next_block(num_blocks),
            OffsetPolicy::Random(d) => d.next_block(num_blocks),
            OffsetPolicy::Sequential(d) => d.next_block(num_blocks),
        }
    }
}

/// An opened I/O target: transport kind, capacity, and the policy used to pick offsets.
///
/// Created once at startup when a `-r/--transport` spec is resolved to an opened
/// target handle, read-mostly thereafter, destroyed at teardown.
pub struct NamespaceEntry {
    pub ns_id: u32,
    pub transport: TransportKind,
    pub target: Box<dyn Target>,
    /// `device_capacity / io_size_bytes / io_limit`
    pub size_in_ios: u64,
    pub block_size: u64,
    pub io_size_blocks: u64,
    pub pi_enabled: bool,
    pub seed: u64,
    pub offset_policy: OffsetPolicy,
    rng: Xoshiro256PlusPlus,
}

impl NamespaceEntry {
    pub fn new(
        ns_id: u32,
        transport: TransportKind,
        target: Box<dyn Target>,
        size_in_ios: u64,
        block_size: u64,
        io_size_blocks: u64,
        pi_enabled: bool,
        seed: u64,
        offset_policy: OffsetPolicy,
    ) -> Self {
        Self {
            ns_id,
            transport,
            target,
            size_in_ios,
            block_size,
            io_size_blocks,
            pi_enabled,
            seed,
            offset_policy,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        }
    }

    /// `rand_r(&primary_ns.seed) mod 100 < rwmixread` read decision.
    pub fn roll_read_percent(&mut self, pct: u32) -> bool {
        self.rng.gen_range(0..100) < pct
    }
}
