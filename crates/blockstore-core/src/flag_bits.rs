//! Fixed-length bitset backing a chunk's placed flags.
//!
//! One bit per block position, packed little-endian into `u64` words. Bits past
//! `len` in the last word are always zero.

/// A compact array of booleans stored one bit each.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlagBits {
    /// Raw storage, 64 flags per word.
    words: Vec<u64>,
    /// Total number of logical flags.
    len: usize,
}

impl FlagBits {
    /// Creates `len` flags, all cleared.
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0u64; len.div_ceil(64)],
            len,
        }
    }

    /// Returns the flag at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn get(&self, index: usize) -> bool {
        assert!(index < self.len, "flag index {index} out of bounds ({})", self.len);
        (self.words[index / 64] >> (index % 64)) & 1 == 1
    }

    /// Sets the flag at `index`, returning the previous value.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn set(&mut self, index: usize, value: bool) -> bool {
        assert!(index < self.len, "flag index {index} out of bounds ({})", self.len);
        let word = &mut self.words[index / 64];
        let mask = 1u64 << (index % 64);
        let previous = *word & mask != 0;
        if value {
            *word |= mask;
        } else {
            *word &= !mask;
        }
        previous
    }

    /// Number of logical flags.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the bitset holds no flags at all.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of set flags.
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns `true` if no flag is set.
    pub fn none(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Iterates over the indices of set flags in ascending order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            let mut rest = word;
            std::iter::from_fn(move || {
                if rest == 0 {
                    return None;
                }
                let bit = rest.trailing_zeros() as usize;
                rest &= rest - 1;
                Some(i * 64 + bit)
            })
        })
    }

    /// Size of the backing storage in bytes.
    pub fn storage_bytes(&self) -> usize {
        self.words.len() * 8
    }

    /// Returns the raw `u64` words.
    pub fn raw_words(&self) -> &[u64] {
        &self.words
    }

    /// Rebuilds a bitset from raw words.
    ///
    /// Missing words read as zero, surplus words are dropped, and bits past
    /// `len` are cleared.
    pub fn from_raw(len: usize, mut words: Vec<u64>) -> Self {
        words.resize(len.div_ceil(64), 0);
        let tail = len % 64;
        if tail != 0
            && let Some(last) = words.last_mut()
        {
            *last &= (1u64 << tail) - 1;
        }
        Self { words, len }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
