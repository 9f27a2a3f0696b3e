use thiserror::Error;

use crate::addr::Addr;

pub const DEFAULT_MEMORY_SIZE: usize = 65536usize;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MemoryAccessError {
    #[error("block [{start}, +{len}) out of range for memory of {size} bytes")]
    OutOfBounds { start: Addr, len: usize, size: usize },
}

pub type Result<T> = std::result::Result<T, MemoryAccessError>;

/// Anything able to supply the bytes of a contiguous range.
pub trait BackingMemory {
    /// size in bytes
    fn size(&self) -> usize;
    /// fills `buf` with `buf.len()` bytes starting at `start`.
    fn read_block(&self, start: Addr, buf: &mut [u8]) -> Result<()>;

    fn contains(&self, addr: Addr) -> bool {
        addr.inner() < self.size()
    }
}

impl<M: BackingMemory + ?Sized> BackingMemory for &M {
    fn size(&self) -> usize {
        (**self).size()
    }
    fn read_block(&self, start: Addr, buf: &mut [u8]) -> Result<()> {
        (**self).read_block(start, buf)
    }
}

macro_rules! bounds_check {
    ($start:ident + $len:ident < $size:expr) => {
        let size = $size;
        match $start.inner().checked_add($len) {
            Some(end) if end <= size => {}
            _ => {
                return Err(MemoryAccessError::OutOfBounds {
                    start: $start,
                    len: $len,
                    size,
                })
            }
        }
    };
}

/// Flat byte-addressable main memory.
pub struct MainMemory {
    inner: Vec<u8>,
}

impl MainMemory {
    /// byte `i` holds `i as u8`, so every read can be checked against its address.
    pub fn new(size: usize) -> Self {
        Self {
            inner: (0..size).map(|i| i as u8).collect(),
        }
    }
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { inner: bytes }
    }
}

impl Default for MainMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_SIZE)
    }
}

impl BackingMemory for MainMemory {
    fn size(&self) -> usize {
        self.inner.len()
    }
    fn read_block(&self, start: Addr, buf: &mut [u8]) -> Result<()> {
        let len = buf.len();
        bounds_check!(start + len < self.inner.len());
        let s = start.inner();
        buf.copy_from_slice(&self.inner[s..s + len]);
        Ok(())
    }
}
