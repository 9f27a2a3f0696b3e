use crate::plru::{PlruState, Way, NUM_WAYS};

#[derive(Clone, Debug)]
pub struct CacheLine {
    valid: bool,
    tag: usize,
    data: Box<[u8]>,
}

impl CacheLine {
    fn new(block_size: usize) -> Self {
        Self {
            valid: false,
            tag: 0,
            data: vec![0; block_size].into_boxed_slice(),
        }
    }
    /// `None` while the line has never been filled
    pub fn tag(&self) -> Option<usize> {
        self.valid.then_some(self.tag)
    }
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Four line slots sharing one PLRU tree.
#[derive(Clone, Debug)]
pub struct CacheSet {
    lines: [CacheLine; NUM_WAYS],
    plru: PlruState,
}

impl CacheSet {
    pub fn new(block_size: usize) -> Self {
        Self {
            lines: std::array::from_fn(|_| CacheLine::new(block_size)),
            plru: PlruState::new(),
        }
    }

    pub fn lookup(&self, tag: usize) -> Option<Way> {
        Way::ALL
            .into_iter()
            .find(|w| self.lines[w.index()].tag() == Some(tag))
    }

    pub fn empty_way(&self) -> Option<Way> {
        Way::ALL
            .into_iter()
            .find(|w| !self.lines[w.index()].valid)
    }

    /// first invalid slot, else whatever the PLRU tree points at
    pub fn victim(&self) -> Way {
        self.empty_way().unwrap_or_else(|| self.plru.find_victim())
    }

    pub fn touch(&mut self, way: Way) {
        self.plru.update(way);
    }

    /// Overwrites `way` with a freshly fetched block. `fill` lets the caller
    /// write the bytes in place; when it fails the line is left untouched.
    pub fn install<E>(
        &mut self,
        way: Way,
        tag: usize,
        fill: impl FnOnce(&mut [u8]) -> Result<(), E>,
    ) -> Result<(), E> {
        debug_assert!(
            self.lookup(tag).map_or(true, |w| w == way),
            "tag {tag:#x} already resident in another way"
        );
        let line = &mut self.lines[way.index()];
        fill(&mut line.data[..])?;
        line.valid = true;
        line.tag = tag;
        Ok(())
    }

    pub fn line(&self, way: Way) -> &CacheLine {
        &self.lines[way.index()]
    }

    pub fn lines(&self) -> impl Iterator<Item = (Way, &CacheLine)> {
        Way::ALL.into_iter().zip(self.lines.iter())
    }

    pub fn occupancy(&self) -> usize {
        self.lines.iter().filter(|l| l.valid).count()
    }

    pub fn plru(&self) -> &PlruState {
        &self.plru
    }
}
