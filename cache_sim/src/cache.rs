use std::fmt;

use thiserror::Error;

use crate::{
    addr::{Addr, AddressDecoder},
    config::{CacheConfig, ConfigError},
    memory::{BackingMemory, MemoryAccessError},
    plru::{Way, NUM_WAYS},
    set::CacheSet,
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CacheError {
    #[error("address {address} out of range for memory of {memory_size} bytes")]
    AddressOutOfBounds { address: Addr, memory_size: usize },
    #[error(transparent)]
    Memory(#[from] MemoryAccessError),
}

pub type Result<T, E = CacheError> = std::result::Result<T, E>;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Access {
    Hit(Way),
    Miss { victim: Way, evicted: Option<usize> },
}

impl Access {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }
    pub fn way(&self) -> Way {
        match *self {
            Access::Hit(w) => w,
            Access::Miss { victim, .. } => victim,
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Hit(w) => write!(f, "hit in {w}"),
            Access::Miss {
                victim,
                evicted: None,
            } => write!(f, "miss, filled empty {victim}"),
            Access::Miss {
                victim,
                evicted: Some(tag),
            } => write!(f, "miss, filled {victim} evicting tag {tag:#x}"),
        }
    }
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct CacheCounters {
    pub hits: usize,
    pub misses: usize,
}

impl CacheCounters {
    pub fn accesses(&self) -> usize {
        self.hits + self.misses
    }
    /// percentage of hits, `None` when nothing was accessed
    pub fn hit_rate(&self) -> Option<f64> {
        match self.accesses() {
            0 => None,
            n => Some(self.hits as f64 * 100.0 / n as f64),
        }
    }
}

/// Read-only, read-allocate 4-way set-associative cache with PLRU replacement.
pub struct SetAssociativeCache<M> {
    decoder: AddressDecoder,
    sets: Vec<CacheSet>,
    memory: M,
    counters: CacheCounters,
    total_accesses: usize,
}

impl<M: BackingMemory> SetAssociativeCache<M> {
    pub fn new(block_size: usize, cache_size: usize, memory: M) -> Result<Self, ConfigError> {
        let decoder = CacheConfig::new(block_size, cache_size).validate()?;
        Ok(Self::with_decoder(decoder, memory))
    }

    pub fn with_decoder(decoder: AddressDecoder, memory: M) -> Self {
        log::debug!(
            "cache: {} sets x {NUM_WAYS} ways x {} bytes",
            decoder.num_sets(),
            decoder.block_size()
        );
        Self {
            sets: vec![CacheSet::new(decoder.block_size()); decoder.num_sets()],
            decoder,
            memory,
            counters: CacheCounters::default(),
            total_accesses: 0,
        }
    }

    pub fn read(&mut self, addr: Addr) -> Result<u8> {
        self.read_traced(addr).map(|(byte, _)| byte)
    }

    /// same as [`Self::read`], also reporting where the access landed
    pub fn read_traced(&mut self, addr: Addr) -> Result<(u8, Access)> {
        self.bounds_check(addr)?;
        let dec = self.decoder.decode(addr);
        self.total_accesses += 1;
        let set = &mut self.sets[dec.set_index];
        if let Some(way) = set.lookup(dec.tag) {
            self.counters.hits += 1;
            set.touch(way);
            log::trace!("hit  {addr} (set {}, {way})", dec.set_index);
            return Ok((set.line(way).data()[dec.block_offset], Access::Hit(way)));
        }
        self.counters.misses += 1;
        let access = self.allocate(addr)?;
        let byte = self.sets[dec.set_index].line(access.way()).data()[dec.block_offset];
        Ok((byte, access))
    }

    /// Fills `num_blocks` consecutive blocks from `start` without touching the counters.
    /// A block already resident is only marked as used.
    pub fn preload(&mut self, start: Addr, num_blocks: usize) -> Result<()> {
        let block_size = self.decoder.block_size();
        for i in 0..num_blocks {
            let addr = i
                .checked_mul(block_size)
                .and_then(|off| start.checked_disp(off))
                .ok_or(CacheError::AddressOutOfBounds {
                    address: Addr::new(usize::MAX),
                    memory_size: self.memory.size(),
                })?;
            self.bounds_check(addr)?;
            let dec = self.decoder.decode(addr);
            let set = &mut self.sets[dec.set_index];
            match set.lookup(dec.tag) {
                Some(way) => set.touch(way),
                None => {
                    self.allocate(addr)?;
                }
            }
        }
        log::info!("preloaded {num_blocks} blocks from {start}");
        Ok(())
    }

    /// Picks a victim in the set `addr` maps to and loads its block there.
    fn allocate(&mut self, addr: Addr) -> Result<Access> {
        let dec = self.decoder.decode(addr);
        let block_start = self.decoder.block_start(addr);
        let set = &mut self.sets[dec.set_index];
        let victim = set.victim();
        let evicted = set.line(victim).tag();
        let memory = &self.memory;
        set.install(victim, dec.tag, |buf| memory.read_block(block_start, buf))?;
        set.touch(victim);
        match evicted {
            Some(old) => log::debug!(
                "fill {block_start} into set {} {victim}, evicting tag {old:#x}",
                dec.set_index
            ),
            None => log::debug!("fill {block_start} into set {} {victim}", dec.set_index),
        }
        Ok(Access::Miss { victim, evicted })
    }

    fn bounds_check(&self, addr: Addr) -> Result<()> {
        if self.memory.contains(addr) {
            Ok(())
        } else {
            Err(CacheError::AddressOutOfBounds {
                address: addr,
                memory_size: self.memory.size(),
            })
        }
    }

    /// way holding `addr`, if resident; no side effects
    pub fn resident_way(&self, addr: Addr) -> Option<Way> {
        let dec = self.decoder.decode(addr);
        self.sets[dec.set_index].lookup(dec.tag)
    }
}

impl<M> SetAssociativeCache<M> {
    /// zeroes hits and misses; `total_accesses` keeps counting
    pub fn reset_stats(&mut self) {
        self.counters = CacheCounters::default();
    }
    pub fn hit_rate(&self) -> Option<f64> {
        self.counters.hit_rate()
    }
    pub fn hits(&self) -> usize {
        self.counters.hits
    }
    pub fn misses(&self) -> usize {
        self.counters.misses
    }
    pub fn counters(&self) -> CacheCounters {
        self.counters
    }
    pub fn total_accesses(&self) -> usize {
        self.total_accesses
    }
    pub fn decoder(&self) -> &AddressDecoder {
        &self.decoder
    }
    pub fn sets(&self) -> &[CacheSet] {
        &self.sets
    }
    pub fn memory(&self) -> &M {
        &self.memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{self, MainMemory};

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// every byte of block `b` reads as `b`
    struct BlockIdMemory {
        block_size: usize,
        size: usize,
    }

    impl BackingMemory for BlockIdMemory {
        fn size(&self) -> usize {
            self.size
        }
        fn read_block(&self, start: Addr, buf: &mut [u8]) -> memory::Result<()> {
            if start.inner() + buf.len() > self.size {
                return Err(MemoryAccessError::OutOfBounds {
                    start,
                    len: buf.len(),
                    size: self.size,
                });
            }
            buf.fill((start.inner() / self.block_size) as u8);
            Ok(())
        }
    }

    fn assert_no_duplicate_tags<M>(c: &SetAssociativeCache<M>) {
        for (i, set) in c.sets().iter().enumerate() {
            let mut tags: Vec<_> = set.lines().filter_map(|(_, l)| l.tag()).collect();
            let n = tags.len();
            tags.sort_unstable();
            tags.dedup();
            assert_eq!(n, tags.len(), "duplicate tag in set {i}");
        }
    }

    #[test]
    fn test_geometry() {
        let c = SetAssociativeCache::new(64, 8192, MainMemory::default()).unwrap();
        assert_eq!(32, c.sets().len());
        assert!(c.sets().iter().all(|s| s.occupancy() == 0));
    }
    #[test]
    fn test_bad_geometry() {
        assert!(matches!(
            SetAssociativeCache::new(24, 8192, MainMemory::default()),
            Err(ConfigError::BlockSizeNotPowerOfTwo { block_size: 24 })
        ));
        assert!(matches!(
            SetAssociativeCache::new(64, 1000, MainMemory::default()),
            Err(ConfigError::UnevenCapacity { .. })
        ));
    }
    #[test]
    fn test_miss_then_hit() {
        init_logger();
        let mem = MainMemory::default();
        let mut c = SetAssociativeCache::new(64, 8192, &mem).unwrap();
        assert_eq!(Ok(0x42), c.read(Addr::new(0x1042)));
        assert_eq!((0, 1), (c.hits(), c.misses()));
        assert_eq!(Ok(0x7f), c.read(Addr::new(0x107f)));
        assert_eq!((1, 1), (c.hits(), c.misses()));
        assert_eq!(2, c.total_accesses());
        assert_eq!(Some(50.0), c.hit_rate());
    }
    #[test]
    fn test_repeated_hits_stay_put() {
        let mut c = SetAssociativeCache::new(64, 8192, MainMemory::default()).unwrap();
        c.read(Addr::new(300)).unwrap();
        let way = c.resident_way(Addr::new(300)).unwrap();
        for _ in 0..10 {
            let (_, a) = c.read_traced(Addr::new(300)).unwrap();
            assert_eq!(Access::Hit(way), a);
        }
        assert_eq!((10, 1), (c.hits(), c.misses()));
    }
    #[test]
    fn test_plru_eviction_order() {
        init_logger();
        // one set, so blocks 0..=4 all collide
        let mem = BlockIdMemory {
            block_size: 64,
            size: 4096,
        };
        let mut c = SetAssociativeCache::new(64, 256, mem).unwrap();
        for (b, way) in Way::ALL.into_iter().enumerate() {
            let (byte, a) = c.read_traced(Addr::new(b * 64)).unwrap();
            assert_eq!(b as u8, byte);
            assert_eq!(
                Access::Miss {
                    victim: way,
                    evicted: None
                },
                a
            );
        }
        // the tree last saw way 3 and points back at it
        let (byte, a) = c.read_traced(Addr::new(4 * 64)).unwrap();
        assert_eq!(4, byte);
        assert_eq!(
            Access::Miss {
                victim: Way::W3,
                evicted: Some(3)
            },
            a
        );
        assert_eq!(Some(Way::W0), c.resident_way(Addr::new(0)));
        assert_eq!(None, c.resident_way(Addr::new(3 * 64)));
        // touching way 0 steers the next victim to way 0
        assert!(c.read_traced(Addr::new(0)).unwrap().1.is_hit());
        let (_, a) = c.read_traced(Addr::new(5 * 64)).unwrap();
        assert_eq!(Way::W0, a.way());
        assert_no_duplicate_tags(&c);
    }
    #[test]
    fn test_preload_then_sequential() {
        let mut c = SetAssociativeCache::new(64, 8192, MainMemory::default()).unwrap();
        c.preload(Addr::new(0), 100).unwrap();
        assert_eq!((0, 0, 0), (c.hits(), c.misses(), c.total_accesses()));
        for a in 0..100 {
            assert_eq!(Ok(a as u8), c.read(Addr::new(a)));
        }
        assert_eq!((100, 0), (c.hits(), c.misses()));
        assert_eq!(Some(100.0), c.hit_rate());
        // 100 blocks over 32 sets: sets 0..4 take four, the rest three
        for (i, s) in c.sets().iter().enumerate() {
            assert_eq!(if i < 4 { 4 } else { 3 }, s.occupancy(), "set {i}");
        }
        assert_no_duplicate_tags(&c);
    }
    #[test]
    fn test_preload_twice_keeps_tags_unique() {
        let mut c = SetAssociativeCache::new(64, 8192, MainMemory::default()).unwrap();
        c.preload(Addr::new(0), 100).unwrap();
        c.preload(Addr::new(0), 100).unwrap();
        assert_no_duplicate_tags(&c);
        assert_eq!(4, c.sets()[0].occupancy());
        assert_eq!(3, c.sets()[4].occupancy());
        assert_eq!(0, c.total_accesses());
    }
    #[test]
    fn test_preload_after_read() {
        let mut c = SetAssociativeCache::new(64, 8192, MainMemory::default()).unwrap();
        c.read(Addr::new(0)).unwrap();
        let way = c.resident_way(Addr::new(0)).unwrap();
        c.preload(Addr::new(0), 1).unwrap();
        assert_no_duplicate_tags(&c);
        assert_eq!(1, c.sets()[0].occupancy());
        assert_eq!(Some(way), c.resident_way(Addr::new(0)));
        assert_eq!(Ok(0), c.read(Addr::new(0)));
        assert_eq!((1, 1), (c.hits(), c.misses()));
    }
    #[test]
    fn test_preload_refreshes_plru() {
        // one set: fill four ways, then re-preload block 0 so way 0 is last used
        let mut c = SetAssociativeCache::new(64, 256, MainMemory::default()).unwrap();
        c.preload(Addr::new(0), 4).unwrap();
        c.preload(Addr::new(0), 1).unwrap();
        let (_, a) = c.read_traced(Addr::new(4 * 64)).unwrap();
        assert_eq!(Way::W0, a.way());
        assert_no_duplicate_tags(&c);
    }
    #[test]
    fn test_preload_offset_overflow() {
        let mut c = SetAssociativeCache::new(64, 8192, MainMemory::default()).unwrap();
        assert!(matches!(
            c.preload(Addr::new(usize::MAX - 10), 2),
            Err(CacheError::AddressOutOfBounds { .. })
        ));
    }
    #[test]
    fn test_reset_stats() {
        let mut c = SetAssociativeCache::new(64, 8192, MainMemory::default()).unwrap();
        c.read(Addr::new(0)).unwrap();
        c.read(Addr::new(1)).unwrap();
        c.reset_stats();
        assert_eq!(None, c.hit_rate());
        assert_eq!(0, c.counters().accesses());
        assert_eq!(2, c.total_accesses());
        c.read(Addr::new(2)).unwrap();
        assert_eq!(Some(100.0), c.hit_rate());
    }
    #[test]
    fn test_out_of_bounds() {
        let mut c = SetAssociativeCache::new(64, 8192, MainMemory::new(1000)).unwrap();
        assert_eq!(
            Err(CacheError::AddressOutOfBounds {
                address: Addr::new(1000),
                memory_size: 1000
            }),
            c.read(Addr::new(1000))
        );
        // in range, but its block runs past the end
        assert!(matches!(
            c.read(Addr::new(999)),
            Err(CacheError::Memory(MemoryAccessError::OutOfBounds { .. }))
        ));
        assert_eq!(None, c.resident_way(Addr::new(999)));
        assert!(c.preload(Addr::new(0), 100).is_err());
    }
    #[test]
    fn test_counters_add_up() {
        let mut c = SetAssociativeCache::new(16, 256, MainMemory::new(4096)).unwrap();
        for a in (0..4096).step_by(37) {
            c.read(Addr::new(a)).unwrap();
        }
        assert_eq!(c.total_accesses(), c.hits() + c.misses());
        assert_no_duplicate_tags(&c);
    }
}
