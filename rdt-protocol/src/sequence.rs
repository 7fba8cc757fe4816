//! Sequence Number Handling
//!
//! RDT numbers bytes, not frames, and the sequence space wraps at a
//! configurable modulus (`maxseqnum`). Internally both endpoints track
//! absolute 64-bit byte offsets; [`SeqSpace`] converts between those offsets
//! and the cyclic numbers carried on the wire.

use std::fmt;

/// Sequence number as carried on the wire, in `[0, modulus)`
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct SeqNumber(u32);

impl SeqNumber {
    /// Create a sequence number from its raw wire value
    ///
    /// The value is not checked against any modulus; use
    /// [`SeqSpace::contains`] for that.
    #[inline]
    pub const fn new(value: u32) -> Self {
        SeqNumber(value)
    }

    /// Get the raw sequence number value
    #[inline]
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeqNumber({})", self.0)
    }
}

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SeqNumber {
    fn from(value: u32) -> Self {
        SeqNumber(value)
    }
}

impl From<SeqNumber> for u32 {
    fn from(seq: SeqNumber) -> u32 {
        seq.0
    }
}

/// Cyclic sequence space `[0, modulus)`
///
/// Unwrapping a wire number is only unambiguous within one modulus of the
/// reference offset, so callers must keep every live offset within that
/// distance of the window base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqSpace {
    modulus: u32,
}

impl SeqSpace {
    /// Create a sequence space
    ///
    /// # Panics
    /// Panics if `modulus` is less than 2
    pub fn new(modulus: u32) -> Self {
        assert!(modulus >= 2, "Sequence space modulus {} is too small", modulus);
        SeqSpace { modulus }
    }

    /// Size of the sequence space
    #[inline]
    pub fn modulus(&self) -> u32 {
        self.modulus
    }

    /// Check that a wire value lies inside the space
    #[inline]
    pub fn contains(&self, seq: SeqNumber) -> bool {
        seq.0 < self.modulus
    }

    /// Map an absolute byte offset to its wire sequence number
    #[inline]
    pub fn wrap(&self, offset: u64) -> SeqNumber {
        SeqNumber((offset % self.modulus as u64) as u32)
    }

    /// `seq + n` with wraparound
    #[inline]
    pub fn add(&self, seq: SeqNumber, n: u64) -> SeqNumber {
        SeqNumber(((seq.0 as u64 + n) % self.modulus as u64) as u32)
    }

    /// Forward distance from `from` to `to`, in `[0, modulus)`
    #[inline]
    pub fn distance(&self, from: SeqNumber, to: SeqNumber) -> u32 {
        let m = self.modulus as u64;
        ((to.0 as u64 % m + m - from.0 as u64 % m) % m) as u32
    }

    /// Absolute offset of `seq`, taken as the first offset at or after `base`
    #[inline]
    pub fn unwrap_from(&self, base: u64, seq: SeqNumber) -> u64 {
        base + self.distance(self.wrap(base), seq) as u64
    }
}
