//! Fixed-width BIER bitstring.

use crate::BierError;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor};

/// Number of 32-bit words in a bitstring.
pub const BITSTRING_WORDS: usize = 4;

/// Number of addressable bit positions.
pub const BITSTRING_BITS: u32 = 32 * BITSTRING_WORDS as u32;

/// A 128-bit set of BIER bit positions.
///
/// Bit position `p` lives in word `p / 32` at bit `p % 32`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Bitstring {
    words: [u32; BITSTRING_WORDS],
}

impl Bitstring {
    pub const ZERO: Self = Self {
        words: [0; BITSTRING_WORDS],
    };

    pub fn from_words(words: [u32; BITSTRING_WORDS]) -> Self {
        Self { words }
    }

    pub fn words(&self) -> [u32; BITSTRING_WORDS] {
        self.words
    }

    /// Bitstring with exactly the given positions set.
    pub fn from_positions(
        positions: impl IntoIterator<Item = u32>,
    ) -> Result<Self, BierError> {
        let mut bits = Self::ZERO;
        for position in positions {
            bits.set(position)?;
        }
        Ok(bits)
    }

    fn locate(bit_position: u32) -> Result<(usize, u32), BierError> {
        if bit_position >= BITSTRING_BITS {
            return Err(BierError::BitOutOfRange { bit_position });
        }
        Ok(((bit_position / 32) as usize, 1u32 << (bit_position % 32)))
    }

    pub fn set(&mut self, bit_position: u32) -> Result<(), BierError> {
        let (word, mask) = Self::locate(bit_position)?;
        self.words[word] |= mask;
        Ok(())
    }

    pub fn clear(&mut self, bit_position: u32) -> Result<(), BierError> {
        let (word, mask) = Self::locate(bit_position)?;
        self.words[word] &= !mask;
        Ok(())
    }

    /// Whether `bit_position` is set. Out-of-range positions are never set.
    pub fn test(&self, bit_position: u32) -> bool {
        Self::locate(bit_position)
            .map(|(word, mask)| self.words[word] & mask != 0)
            .unwrap_or(false)
    }

    pub fn is_zero(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Lowest set bit position, or `None` for the empty bitstring.
    pub fn lowest_set_bit(&self) -> Option<u32> {
        self.words
            .iter()
            .enumerate()
            .find(|(_, w)| **w != 0)
            .map(|(index, w)| index as u32 * 32 + w.trailing_zeros())
    }

    pub fn count(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    /// Set positions in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..BITSTRING_BITS).filter(move |&p| self.test(p))
    }
}

impl BitAnd for Bitstring {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        let mut words = self.words;
        for (w, r) in words.iter_mut().zip(rhs.words) {
            *w &= r;
        }
        Self { words }
    }
}

impl BitOr for Bitstring {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        let mut words = self.words;
        for (w, r) in words.iter_mut().zip(rhs.words) {
            *w |= r;
        }
        Self { words }
    }
}

impl BitXor for Bitstring {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self {
        let mut words = self.words;
        for (w, r) in words.iter_mut().zip(rhs.words) {
            *w ^= r;
        }
        Self { words }
    }
}

impl fmt::Debug for Bitstring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bitstring(")?;
        for (i, word) in self.words.iter().rev().enumerate() {
            if i > 0 {
                write!(f, "_")?;
            }
            write!(f, "{word:08x}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Bitstring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
