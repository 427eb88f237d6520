#![forbid(unsafe_code)]

/// A compact bit vector used for validity masks and boolean payloads.
///
/// Bits are stored little-endian within each `u64` word:
/// - bit 0 is the LSB of word 0
/// - bit 63 is the MSB of word 0
///
/// The number of set bits is tracked eagerly so "does this column have nulls" is `O(1)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitVec {
    words: Vec<u64>,
    len: usize,
    ones: usize,
}

impl BitVec {
    pub fn new() -> Self {
        Self {
            words: Vec::new(),
            len: 0,
            ones: 0,
        }
    }

    pub fn with_capacity_bits(bits: usize) -> Self {
        Self {
            words: Vec::with_capacity(bits.div_ceil(64)),
            len: 0,
            ones: 0,
        }
    }

    pub fn with_len_all_true(bits: usize) -> Self {
        let mut words = vec![u64::MAX; bits.div_ceil(64)];
        let rem = bits % 64;
        if rem != 0 {
            if let Some(last) = words.last_mut() {
                *last = (1u64 << rem) - 1;
            }
        }
        Self {
            words,
            len: bits,
            ones: bits,
        }
    }

    pub fn with_len_all_false(bits: usize) -> Self {
        Self {
            words: vec![0u64; bits.div_ceil(64)],
            len: bits,
            ones: 0,
        }
    }

    pub fn from_bools(bits: impl IntoIterator<Item = bool>) -> Self {
        let iter = bits.into_iter();
        let mut out = Self::with_capacity_bits(iter.size_hint().0);
        for bit in iter {
            out.push(bit);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, value: bool) {
        let bit = self.len % 64;
        if bit == 0 {
            self.words.push(0);
        }
        if value {
            self.words[self.len / 64] |= 1u64 << bit;
            self.ones += 1;
        }
        self.len += 1;
    }

    pub fn get(&self, index: usize) -> bool {
        debug_assert!(index < self.len, "BitVec index out of bounds");
        (self.words[index / 64] >> (index % 64)) & 1 == 1
    }

    pub fn set(&mut self, index: usize, value: bool) {
        debug_assert!(index < self.len, "BitVec index out of bounds");
        let word = &mut self.words[index / 64];
        let mask = 1u64 << (index % 64);
        let was_set = *word & mask != 0;
        if was_set == value {
            return;
        }
        if value {
            *word |= mask;
            self.ones += 1;
        } else {
            *word &= !mask;
            self.ones -= 1;
        }
    }

    pub fn count_ones(&self) -> usize {
        self.ones
    }

    pub fn count_zeros(&self) -> usize {
        self.len - self.ones
    }

    pub fn all_true(&self) -> bool {
        self.ones == self.len
    }

    /// Intersect with `other` (same length) in place.
    pub fn and_inplace(&mut self, other: &BitVec) {
        debug_assert_eq!(self.len, other.len, "BitVec length mismatch");
        let mut ones = 0usize;
        for (w, o) in self.words.iter_mut().zip(other.words.iter()) {
            *w &= *o;
            ones += w.count_ones() as usize;
        }
        self.ones = ones;
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |idx| self.get(idx))
    }

    /// Positions of the set bits, in ascending order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words
            .iter()
            .enumerate()
            .flat_map(|(word_idx, &word)| {
                let mut rest = word;
                std::iter::from_fn(move || {
                    if rest == 0 {
                        return None;
                    }
                    let bit = rest.trailing_zeros() as usize;
                    rest &= rest - 1;
                    Some(word_idx * 64 + bit)
                })
            })
            .take_while(move |&idx| idx < self.len)
    }
}

impl Default for BitVec {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<bool> for BitVec {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        Self::from_bools(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_get_set_track_ones() {
        let mut bits = BitVec::new();
        for i in 0..130 {
            bits.push(i % 3 == 0);
        }
        assert_eq!(bits.len(), 130);
        assert_eq!(bits.count_ones(), 44);
        assert!(bits.get(129));
        assert!(!bits.get(128));

        bits.set(128, true);
        bits.set(0, false);
        bits.set(0, false);
        assert_eq!(bits.count_ones(), 44);
        assert!(bits.get(128));
    }

    #[test]
    fn all_true_masks_tail_bits() {
        let bits = BitVec::with_len_all_true(70);
        assert!(bits.all_true());
        assert_eq!(bits.iter_ones().count(), 70);
        assert_eq!(BitVec::with_len_all_false(70).count_zeros(), 70);
    }

    #[test]
    fn and_inplace_recounts() {
        let mut a: BitVec = [true, true, false, true].into_iter().collect();
        let b: BitVec = [true, false, false, true].into_iter().collect();
        a.and_inplace(&b);
        assert_eq!(a.iter_ones().collect::<Vec<_>>(), vec![0, 3]);
        assert_eq!(a.count_ones(), 2);
    }
}
