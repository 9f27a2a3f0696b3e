use std::{fs::File, io::BufReader, path::Path};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{addr::AddressDecoder, memory::DEFAULT_MEMORY_SIZE, plru::NUM_WAYS};

pub const DEFAULT_BLOCK_SIZE: usize = 64usize;
pub const DEFAULT_CACHE_SIZE: usize = 8192usize;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("block size {block_size} is not a power of two")]
    BlockSizeNotPowerOfTwo { block_size: usize },
    #[error("cache size {cache_size} is not a multiple of the {set_bytes}-byte set size")]
    UnevenCapacity { cache_size: usize, set_bytes: usize },
    #[error("cache size {cache_size} leaves no room for a single set")]
    NoSets { cache_size: usize },
    #[error("block size {block_size} is too large to form a set")]
    BlockSizeTooLarge { block_size: usize },
}

/// Cache geometry and the memory it fronts. All sizes in bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub block_size: usize,
    pub cache_size: usize,
    pub memory_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            cache_size: DEFAULT_CACHE_SIZE,
            memory_size: DEFAULT_MEMORY_SIZE,
        }
    }
}

impl CacheConfig {
    pub fn new(block_size: usize, cache_size: usize) -> Self {
        Self {
            block_size,
            cache_size,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> std::result::Result<AddressDecoder, ConfigError> {
        let block_size = self.block_size;
        if !block_size.is_power_of_two() {
            return Err(ConfigError::BlockSizeNotPowerOfTwo { block_size });
        }
        let set_bytes = NUM_WAYS
            .checked_mul(block_size)
            .ok_or(ConfigError::BlockSizeTooLarge { block_size })?;
        if self.cache_size < set_bytes {
            return Err(ConfigError::NoSets {
                cache_size: self.cache_size,
            });
        }
        if self.cache_size % set_bytes != 0 {
            return Err(ConfigError::UnevenCapacity {
                cache_size: self.cache_size,
                set_bytes,
            });
        }
        Ok(AddressDecoder::new(block_size, self.cache_size / set_bytes))
    }
}

/// Parameters of the driver sequence run on top of a cache.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub cache: CacheConfig,
    pub preload_start: usize,
    pub preload_blocks: usize,
    pub sequential_count: usize,
    pub round_robin_bases: Vec<usize>,
    pub round_robin_repetitions: usize,
    pub random_count: usize,
    pub seed: u64,
    pub stride: usize,
    pub stride_count: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            preload_start: 0,
            preload_blocks: 100,
            sequential_count: 100,
            round_robin_bases: vec![0, 64, 128, 192],
            round_robin_repetitions: 20,
            random_count: 50,
            seed: 0,
            stride: 16,
            stride_count: 50,
        }
    }
}

impl SimConfig {
    /// reads a JSON document; absent fields keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}
