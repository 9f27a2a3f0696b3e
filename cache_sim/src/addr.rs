use std::fmt::{self, Display};

#[derive(Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
/// byte address into the backing memory
pub struct Addr(usize);

impl Addr {
    pub fn new(v: usize) -> Self {
        Self(v)
    }
    pub fn inner(self) -> usize {
        self.0
    }
    pub fn checked_disp(&self, amount: usize) -> Option<Self> {
        self.0.checked_add(amount).map(Self)
    }
}

impl Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Splits an address into `(tag, set index, block offset)`.
///
/// `block_size` must be a power of two: the set index is taken by shifting
/// out the offset bits. [`crate::config::CacheConfig::validate`] is the only
/// place a decoder is built from user input, and it rejects other sizes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AddressDecoder {
    block_size: usize,
    num_sets: usize,
    offset_bits: u32,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Decoded {
    pub tag: usize,
    pub set_index: usize,
    pub block_offset: usize,
}

impl AddressDecoder {
    pub(crate) fn new(block_size: usize, num_sets: usize) -> Self {
        debug_assert!(block_size.is_power_of_two());
        debug_assert!(num_sets > 0);
        Self {
            block_size,
            num_sets,
            offset_bits: block_size.trailing_zeros(),
        }
    }
    pub fn block_size(&self) -> usize {
        self.block_size
    }
    pub fn num_sets(&self) -> usize {
        self.num_sets
    }
    pub fn offset_bits(&self) -> u32 {
        self.offset_bits
    }
    #[inline]
    pub fn tag(&self, addr: Addr) -> usize {
        addr.inner() / (self.block_size * self.num_sets)
    }
    #[inline]
    pub fn set_index(&self, addr: Addr) -> usize {
        (addr.inner() >> self.offset_bits) % self.num_sets
    }
    #[inline]
    pub fn block_offset(&self, addr: Addr) -> usize {
        addr.inner() & (self.block_size - 1)
    }
    #[inline]
    pub fn block_start(&self, addr: Addr) -> Addr {
        Addr::new((addr.inner() >> self.offset_bits) << self.offset_bits)
    }
    pub fn decode(&self, addr: Addr) -> Decoded {
        Decoded {
            tag: self.tag(addr),
            set_index: self.set_index(addr),
            block_offset: self.block_offset(addr),
        }
    }
}

impl Display for Decoded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tag: {:#x}, set: {}, offset: {}",
            self.tag, self.set_index, self.block_offset
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_64b_32sets() {
        let d = AddressDecoder::new(64, 32);
        assert_eq!(6, d.offset_bits());
        let a = Addr::new(0x1234);
        assert_eq!(0x1234 / 2048, d.tag(a));
        assert_eq!((0x1234 / 64) % 32, d.set_index(a));
        assert_eq!(0x1234 % 64, d.block_offset(a));
        assert_eq!(Addr::new(0x1200), d.block_start(a));
    }
    #[test]
    fn test_block_start_is_aligned() {
        let d = AddressDecoder::new(16, 8);
        for v in [0usize, 1, 15, 16, 17, 255, 1000] {
            let s = d.block_start(Addr::new(v)).inner();
            assert_eq!(0, s % 16);
            assert!(s <= v && v < s + 16, "{v} not in block starting at {s}");
        }
    }
    #[test]
    fn test_strided_arithmetic() {
        let d = AddressDecoder::new(64, 32);
        for i in 0..50 {
            let a = Addr::new(i * 16);
            let dec = d.decode(a);
            assert_eq!(i * 16 % 64, dec.block_offset);
            assert_eq!((i * 16 / 64) % 32, dec.set_index);
            assert_eq!(0, dec.tag);
        }
    }
    #[test]
    fn test_addr_display() {
        assert_eq!("0x000000c0", Addr::new(192).to_string());
    }
}
