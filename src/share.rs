//! Secret shares and the correlated randomness consumed by AND gates.
//!
//! Arithmetic on shares is split into operations that combine two secret shares
//! ([`RingShare::add_share`], [`RingShare::sub_share`]) and operations that combine a share with a
//! public constant ([`RingShare::add_scalar`], [`RingShare::sub_scalar`], [`RingShare::mul_scalar`]). The two are never
//! overloaded: adding a public constant must be done by exactly one party, combining shares is
//! done by every party.

use std::ops::BitXor;

use serde::{Deserialize, Serialize};

use crate::Error;

/// A power-of-two ring modulus `M = 2^bits`, with `1 <= bits <= 64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Modulus {
    bits: u32,
}

impl Modulus {
    /// The widest supported ring, `2^64`.
    pub const RING_64: Modulus = Modulus { bits: 64 };

    /// Creates the modulus `2^bits`.
    pub fn new(bits: u32) -> Result<Self, Error> {
        if bits == 0 || bits > 64 {
            Err(Error::ModulusOverflow { bits, max: 64 })
        } else {
            Ok(Self { bits })
        }
    }

    /// The width of ring elements in bits.
    pub fn bits(self) -> u32 {
        self.bits
    }

    /// The largest ring element, `M - 1`.
    pub fn max(self) -> u64 {
        u64::MAX >> (64 - self.bits)
    }

    /// Reduces a value into `[0, M)`.
    pub fn reduce(self, value: u64) -> u64 {
        value & self.max()
    }

    /// Maps a signed integer to its two's-complement ring element.
    pub fn encode(self, value: i64) -> u64 {
        self.reduce(value as u64)
    }

    /// Re-centers a ring element into `[-M/2, M/2)`.
    ///
    /// Elements `>= M/2` are read as negative numbers.
    pub fn decode(self, value: u64) -> i64 {
        let shift = 64 - self.bits;
        ((self.reduce(value) << shift) as i64) >> shift
    }
}

impl Default for Modulus {
    fn default() -> Self {
        Self::RING_64
    }
}

/// One party's additive share of a secret ring element.
///
/// The shares of all computing parties sum up to the secret modulo `M`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingShare {
    value: u64,
    modulus: Modulus,
}

impl RingShare {
    /// Wraps a share value, reducing it modulo `M`.
    pub fn new(value: u64, modulus: Modulus) -> Self {
        Self {
            value: modulus.reduce(value),
            modulus,
        }
    }

    /// The share value, always in `[0, M)`.
    pub fn value(&self) -> u64 {
        self.value
    }

    /// The ring this share lives in.
    pub fn modulus(&self) -> Modulus {
        self.modulus
    }

    /// Adds another party-local share of a (different) secret.
    pub fn add_share(self, other: RingShare) -> Self {
        debug_assert_eq!(self.modulus, other.modulus);
        Self::new(self.value.wrapping_add(other.value), self.modulus)
    }

    /// Subtracts another party-local share of a (different) secret.
    pub fn sub_share(self, other: RingShare) -> Self {
        debug_assert_eq!(self.modulus, other.modulus);
        Self::new(self.value.wrapping_sub(other.value), self.modulus)
    }

    /// Adds a public constant.
    ///
    /// Exactly one party may apply this to its share, otherwise the constant is added once per
    /// party.
    pub fn add_scalar(self, scalar: u64) -> Self {
        Self::new(self.value.wrapping_add(scalar), self.modulus)
    }

    /// Subtracts a public constant.
    ///
    /// Exactly one party may apply this to its share.
    pub fn sub_scalar(self, scalar: u64) -> Self {
        Self::new(self.value.wrapping_sub(scalar), self.modulus)
    }

    /// Multiplies by a public constant. Every party applies this to its share.
    pub fn mul_scalar(self, scalar: u64) -> Self {
        Self::new(self.value.wrapping_mul(scalar), self.modulus)
    }

    /// The lowest `bit_length` bits of this party's own share value, least significant first.
    ///
    /// These are the bits of the local share only, not bits of the secret.
    pub(crate) fn local_bits(&self, bit_length: u32) -> Vec<bool> {
        (0..bit_length).map(|i| (self.value >> i) & 1 == 1).collect()
    }
}

/// One party's XOR share of a secret bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BitShare(bool);

impl BitShare {
    /// A share of the public bit `false` that every party can create without communication.
    pub const ZERO: BitShare = BitShare(false);

    /// Wraps a share bit.
    pub fn new(bit: bool) -> Self {
        Self(bit)
    }

    /// The share bit.
    pub fn bit(self) -> bool {
        self.0
    }

    /// XORs a public constant into the share.
    ///
    /// Exactly one party may apply this, otherwise the constant cancels out.
    pub fn xor_scalar(self, bit: bool) -> Self {
        Self(self.0 ^ bit)
    }
}

impl BitXor for BitShare {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self::Output {
        Self(self.0 ^ rhs.0)
    }
}

/// A Beaver triple `(a, b, c)` with `c = a & b`, or one party's XOR share of such a triple.
///
/// The invariant `c = a & b` only holds for the XOR of all parties' shares. A triple must be
/// consumed by exactly one AND gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BeaverTriple {
    /// The mask for the left input.
    pub a: bool,
    /// The mask for the right input.
    pub b: bool,
    /// The product of both masks.
    pub c: bool,
}

impl BeaverTriple {
    /// Returns true if `c = a & b`, i.e. if this is a valid (combined) triple.
    pub fn is_consistent(&self) -> bool {
        self.c == (self.a & self.b)
    }
}

impl BitXor for BeaverTriple {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self::Output {
        Self {
            a: self.a ^ rhs.a,
            b: self.b ^ rhs.b,
            c: self.c ^ rhs.c,
        }
    }
}
