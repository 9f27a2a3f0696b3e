use std::fmt;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::addr::Addr;

/// Address sequences fed to the cache. They carry no cache logic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessPattern {
    Sequential {
        start: usize,
        count: usize,
    },
    /// `repetitions` addresses in total, cycling through `bases`
    RoundRobin {
        bases: Vec<usize>,
        repetitions: usize,
    },
    Strided {
        start: usize,
        stride: usize,
        count: usize,
    },
    /// uniform over `[0, memory_size)`, reproducible for a given seed
    Random {
        count: usize,
        memory_size: usize,
        seed: u64,
    },
    Trace {
        name: String,
        addresses: Vec<usize>,
    },
}

impl AccessPattern {
    pub fn name(&self) -> &str {
        match self {
            AccessPattern::Sequential { .. } => "Sequential Access",
            AccessPattern::RoundRobin { .. } => "Round Robin Access",
            AccessPattern::Strided { .. } => "Strided Access",
            AccessPattern::Random { .. } => "Random Access",
            AccessPattern::Trace { name, .. } => name,
        }
    }

    /// Addresses past `usize::MAX` saturate, so they fail the cache's bounds
    /// check instead of wrapping around to low memory.
    pub fn addresses(&self) -> Vec<Addr> {
        match self {
            AccessPattern::Sequential { start, count } => {
                (0..*count)
                    .map(|i| Addr::new(start.saturating_add(i)))
                    .collect()
            }
            AccessPattern::RoundRobin { bases, repetitions } => {
                if bases.is_empty() {
                    return Vec::new();
                }
                bases
                    .iter()
                    .cycle()
                    .take(*repetitions)
                    .map(|&a| Addr::new(a))
                    .collect()
            }
            AccessPattern::Strided {
                start,
                stride,
                count,
            } => (0..*count)
                .map(|i| Addr::new(start.saturating_add(i.saturating_mul(*stride))))
                .collect(),
            AccessPattern::Random {
                count,
                memory_size,
                seed,
            } => {
                if *memory_size == 0 {
                    return Vec::new();
                }
                let mut rng = StdRng::seed_from_u64(*seed);
                (0..*count)
                    .map(|_| Addr::new(rng.gen_range(0..*memory_size)))
                    .collect()
            }
            AccessPattern::Trace { addresses, .. } => {
                addresses.iter().map(|&a| Addr::new(a)).collect()
            }
        }
    }
}

impl fmt::Display for AccessPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessPattern::Sequential { start, count } => {
                write!(f, "{} ({count} from {})", self.name(), Addr::new(*start))
            }
            AccessPattern::RoundRobin { bases, repetitions } => {
                write!(f, "{} ({repetitions} over {bases:?})", self.name())
            }
            AccessPattern::Strided {
                start,
                stride,
                count,
            } => write!(
                f,
                "{} ({count} from {} by {stride})",
                self.name(),
                Addr::new(*start)
            ),
            AccessPattern::Random { count, seed, .. } => {
                write!(f, "{} ({count}, seed {seed})", self.name())
            }
            AccessPattern::Trace { addresses, .. } => {
                write!(f, "{} ({} addresses)", self.name(), addresses.len())
            }
        }
    }
}
