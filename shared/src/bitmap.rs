use alloc::{vec, vec::Vec};

const WORD_BITS: usize = u64::BITS as usize;

/// A fixed-length array of bits packed into 64-bit words. A set bit marks a
/// slot as taken.
#[derive(Clone, Debug)]
pub struct Bitmap {
    words: Vec<u64>,
    len: usize,
}

impl Bitmap {
    /// Creates a bitmap of `len` clear bits.
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(WORD_BITS)],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Panics if `idx` is out of range.
    pub fn test(&self, idx: usize) -> bool {
        assert!(idx < self.len, "bit {idx} out of range (len {})", self.len);
        self.words[idx / WORD_BITS] >> (idx % WORD_BITS) & 1 != 0
    }

    /// Panics if `idx` is out of range.
    pub fn set(&mut self, idx: usize, value: bool) {
        assert!(idx < self.len, "bit {idx} out of range (len {})", self.len);
        let mask = 1 << (idx % WORD_BITS);
        let word = &mut self.words[idx / WORD_BITS];
        if value {
            *word |= mask;
        } else {
            *word &= !mask;
        }
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Finds the lowest clear bit, sets it, and returns its index.
    pub fn scan_and_flip(&mut self) -> Option<usize> {
        for (i, word) in self.words.iter_mut().enumerate() {
            if *word == u64::MAX {
                continue;
            }
            let bit = word.trailing_ones() as usize;
            let idx = i * WORD_BITS + bit;
            // Only the last word can have bits past the end.
            if idx >= self.len {
                return None;
            }
            *word |= 1 << bit;
            return Some(idx);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_and_flip_is_first_fit() {
        let mut bitmap = Bitmap::new(130);
        for i in 0..130 {
            assert_eq!(bitmap.scan_and_flip(), Some(i));
        }
        assert_eq!(bitmap.scan_and_flip(), None);
        assert_eq!(bitmap.count_ones(), 130);

        bitmap.set(70, false);
        bitmap.set(3, false);
        assert_eq!(bitmap.scan_and_flip(), Some(3));
        assert_eq!(bitmap.scan_and_flip(), Some(70));
        assert_eq!(bitmap.scan_and_flip(), None);
    }

    #[test]
    fn set_and_test() {
        let mut bitmap = Bitmap::new(64);
        assert!(!bitmap.test(63));
        bitmap.set(63, true);
        assert!(bitmap.test(63));
        assert_eq!(bitmap.count_ones(), 1);
        bitmap.set(63, false);
        assert!(!bitmap.test(63));
    }

    #[test]
    fn empty_bitmap_has_nothing_to_give() {
        let mut bitmap = Bitmap::new(0);
        assert!(bitmap.is_empty());
        assert_eq!(bitmap.scan_and_flip(), None);
    }

    #[test]
    #[should_panic]
    fn out_of_range() {
        Bitmap::new(10).test(10);
    }
}
