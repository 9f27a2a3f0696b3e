use std::fmt;

use anyhow::{Context, Result};

use crate::{
    addr::Addr,
    cache::{CacheCounters, SetAssociativeCache},
    config::SimConfig,
    memory::{BackingMemory, MainMemory},
    pattern::AccessPattern,
    stat::{AddStats, Rate, Stats},
};

/// Hits and misses of one pattern, measured from a fresh `reset_stats`.
#[derive(Clone, Debug, PartialEq)]
pub struct PatternReport {
    pub name: String,
    pub counters: CacheCounters,
}

impl PatternReport {
    pub fn hits(&self) -> usize {
        self.counters.hits
    }
    pub fn misses(&self) -> usize {
        self.counters.misses
    }
    pub fn hit_rate(&self) -> Option<f64> {
        self.counters.hit_rate()
    }
}

impl fmt::Display for PatternReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cache Stats for {}: Hits: {}, Misses: {}, Hit Rate: {}",
            self.name,
            self.hits(),
            self.misses(),
            Rate(self.hit_rate())
        )
    }
}

pub struct Simulator<M> {
    cache: SetAssociativeCache<M>,
    reports: Vec<PatternReport>,
}

impl<M: BackingMemory> Simulator<M> {
    pub fn new(cache: SetAssociativeCache<M>) -> Self {
        Self {
            cache,
            reports: Vec::new(),
        }
    }

    pub fn preload(&mut self, start: usize, num_blocks: usize) -> Result<()> {
        self.cache
            .preload(Addr::new(start), num_blocks)
            .with_context(|| format!("failed to preload {num_blocks} blocks"))
    }

    /// Resets the hit/miss counters, replays `pattern` and records the result.
    pub fn run(&mut self, pattern: &AccessPattern) -> Result<PatternReport> {
        self.cache.reset_stats();
        for addr in pattern.addresses() {
            self.cache
                .read(addr)
                .with_context(|| format!("{} aborted", pattern.name()))?;
        }
        let report = PatternReport {
            name: pattern.name().to_string(),
            counters: self.cache.counters(),
        };
        log::info!("finished {pattern}: {report}");
        self.reports.push(report.clone());
        Ok(report)
    }

    pub fn run_all<'p>(
        &mut self,
        patterns: impl IntoIterator<Item = &'p AccessPattern>,
    ) -> Result<()> {
        for p in patterns {
            self.run(p)?;
        }
        Ok(())
    }
}

impl<M> Simulator<M> {
    pub fn reports(&self) -> &[PatternReport] {
        &self.reports
    }

    /// sum over every pattern run so far
    pub fn overall(&self) -> PatternReport {
        let counters = self
            .reports
            .iter()
            .fold(CacheCounters::default(), |acc, r| CacheCounters {
                hits: acc.hits + r.hits(),
                misses: acc.misses + r.misses(),
            });
        PatternReport {
            name: "Overall".to_string(),
            counters,
        }
    }

    pub fn cache(&self) -> &SetAssociativeCache<M> {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut SetAssociativeCache<M> {
        &mut self.cache
    }

    pub fn collect_stat(&self) -> Stats {
        let mut ss = Stats::default();
        self.add_stats(&mut ss);
        ss
    }
}

/// sequential, round robin, random, strided; in that order
pub fn default_patterns(cfg: &SimConfig) -> Vec<AccessPattern> {
    vec![
        AccessPattern::Sequential {
            start: cfg.preload_start,
            count: cfg.sequential_count,
        },
        AccessPattern::RoundRobin {
            bases: cfg.round_robin_bases.clone(),
            repetitions: cfg.round_robin_repetitions,
        },
        AccessPattern::Random {
            count: cfg.random_count,
            memory_size: cfg.cache.memory_size,
            seed: cfg.seed,
        },
        AccessPattern::Strided {
            start: cfg.preload_start,
            stride: cfg.stride,
            count: cfg.stride_count,
        },
    ]
}

/// Builds memory and cache from `cfg` and warms the cache up.
pub fn prepare(cfg: &SimConfig) -> Result<Simulator<MainMemory>> {
    let decoder = cfg.cache.validate()?;
    let memory = MainMemory::new(cfg.cache.memory_size);
    let mut sim = Simulator::new(SetAssociativeCache::with_decoder(decoder, memory));
    sim.preload(cfg.preload_start, cfg.preload_blocks)?;
    Ok(sim)
}

impl<M> AddStats for Simulator<M> {
    fn add_stats(&self, buf: &mut Stats) {
        let d = self.cache.decoder();
        buf.push(Box::new(stat::CacheStat {
            num_sets: d.num_sets(),
            block_size: d.block_size(),
            total_accesses: self.cache.total_accesses(),
            counters: self.cache.counters(),
        }));
        buf.push(Box::new(stat::PatternStat {
            reports: self.reports.clone(),
            overall: self.overall(),
        }));
        buf.push(Box::new(stat::OccupancyStat {
            sets: self
                .cache
                .sets()
                .iter()
                .map(|s| (s.occupancy(), s.plru().bits()))
                .collect(),
        }));
    }
}

mod stat {
    use std::fmt;

    use super::PatternReport;
    use crate::{
        cache::CacheCounters,
        plru::NUM_WAYS,
        stat::*,
    };

    pub struct CacheStat {
        pub num_sets: usize,
        pub block_size: usize,
        pub total_accesses: usize,
        pub counters: CacheCounters,
    }

    impl Stat for CacheStat {
        fn view(&self, _: usize) -> Box<dyn StatView + '_> {
            Box::new(self)
        }
    }

    impl StatView for &'_ CacheStat {
        fn header(&self) -> &'static str {
            "cache"
        }
        fn width(&self) -> usize {
            36
        }
    }

    impl fmt::Display for &'_ CacheStat {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let geometry = format!(
                "{} x {NUM_WAYS} x {} B",
                self.num_sets, self.block_size
            );
            writeln!(f, "  geometry: {geometry:>22}")?;
            writeln!(f, "  accesses total: {:>16}", self.total_accesses)?;
            writeln!(f, "  since reset: {:>19}", self.counters.accesses())?;
            write!(f, "  hit rate: {:>22}", Rate(self.counters.hit_rate()))
        }
    }

    pub struct PatternStat {
        pub reports: Vec<PatternReport>,
        pub overall: PatternReport,
    }

    impl Stat for PatternStat {
        fn view(&self, _: usize) -> Box<dyn StatView + '_> {
            Box::new(self)
        }
    }

    impl StatView for &'_ PatternStat {
        fn header(&self) -> &'static str {
            "access patterns (format: `hits / misses  hit rate`)"
        }
        fn width(&self) -> usize {
            52
        }
    }

    impl fmt::Display for &'_ PatternStat {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            for r in self.reports.iter().chain([&self.overall]) {
                writeln!(
                    f,
                    "  {:>20}:{:>8} /{:>8}{:>9}",
                    r.name,
                    r.hits(),
                    r.misses(),
                    Rate(r.hit_rate())
                )?;
            }
            Ok(())
        }
    }

    pub struct OccupancyStat {
        /// valid lines and PLRU bits, per set
        pub sets: Vec<(usize, [bool; 3])>,
    }

    impl Stat for OccupancyStat {
        fn view(&self, max_width: usize) -> Box<dyn StatView + '_> {
            Box::new(OccupancyStatView::new(self, max_width))
        }
    }

    pub struct OccupancyStatView<'a> {
        stat: &'a OccupancyStat,
        chunk_size: usize,
    }

    impl<'a> OccupancyStatView<'a> {
        pub fn new(stat: &'a OccupancyStat, max_width: usize) -> Self {
            Self {
                stat,
                chunk_size: Self::chunk_size(max_width),
            }
        }
    }

    impl StatView for OccupancyStatView<'_> {
        fn header(&self) -> &'static str {
            "set occupancy (format: `set: valid/ways plru`)"
        }
        fn width(&self) -> usize {
            Self::width_by_chunk_size(self.chunk_size)
        }
    }

    impl Width for OccupancyStatView<'_> {
        fn width_by_chunk_size(chunk_size: usize) -> usize {
            chunk_size * 14 + (chunk_size - 1) * 2 + 2
        }
    }

    impl fmt::Display for OccupancyStatView<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let cells: Vec<_> = self
                .stat
                .sets
                .iter()
                .enumerate()
                .map(|(i, (n, [b0, b1, b2]))| {
                    format!(
                        "{i:>4}: {n}/{NUM_WAYS} {}{}{}",
                        *b0 as u8, *b1 as u8, *b2 as u8
                    )
                })
                .collect();
            for chunk in cells.chunks(self.chunk_size.max(1)) {
                let s = chunk.join(", ");
                writeln!(f, "  {s}")?;
            }
            Ok(())
        }
    }
}
