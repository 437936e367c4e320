//! Flat occupancy bitmap backing every fixed-capacity slot table.

#[derive(Debug, Clone)]
pub struct BitMap {
    bits    : Vec<u64>,
    length  : usize,
}

impl BitMap {
    pub fn new(length: usize) -> Self {
        Self {
            bits: vec![0; (length + 63) / 64],
            length
        }
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn mark(&mut self, pos: usize) {
        assert!(pos < self.length, "index out of bound");
        self.bits[pos / 64] |= 1 << (pos % 64);
    }

    pub fn clear(&mut self, pos: usize) {
        assert!(pos < self.length, "index out of bound");
        self.bits[pos / 64] &= !(1 << (pos % 64));
    }

    pub fn test(&self, pos: usize) -> bool {
        pos < self.length && self.bits[pos / 64] & (1 << (pos % 64)) != 0
    }

    /// Find the lowest clear bit, mark it and return its index.
    pub fn find(&mut self) -> Option<usize> {
        for (word_idx, word) in self.bits.iter_mut().enumerate() {
            if *word == u64::MAX {
                continue;
            }
            let bit = (!*word).trailing_zeros() as usize;
            let pos = word_idx * 64 + bit;
            if pos >= self.length {
                return None;
            }
            *word |= 1 << bit;
            return Some(pos);
        }
        None
    }

    /// Like [`BitMap::find`] but only considers bits from `start` on.
    pub fn find_from(&mut self, start: usize) -> Option<usize> {
        let pos = (start..self.length).find(|&i| !self.test(i))?;
        self.mark(pos);
        Some(pos)
    }

    pub fn num_clear(&self) -> usize {
        let set: usize = self.bits.iter().map(|w| w.count_ones() as usize).sum();
        self.length - set
    }

    pub fn is_full(&self) -> bool {
        self.num_clear() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_hands_out_lowest_free_slot() {
        let mut map = BitMap::new(70);
        for i in 0..70 {
            assert_eq!(map.find(), Some(i));
        }
        assert_eq!(map.find(), None);
        assert!(map.is_full());
        map.clear(65);
        map.clear(3);
        assert_eq!(map.num_clear(), 2);
        assert_eq!(map.find(), Some(3));
        assert_eq!(map.find(), Some(65));
    }

    #[test]
    fn find_from_skips_reserved_prefix() {
        let mut map = BitMap::new(4);
        assert_eq!(map.find_from(2), Some(2));
        assert_eq!(map.find_from(2), Some(3));
        assert_eq!(map.find_from(2), None);
        assert!(!map.test(0));
        assert!(!map.test(100));
    }
}
