//! The immutable configuration of a protocol run.

use crate::{Error, and_gate::AND_CORRECTION_PARTY, share::Modulus};

/// The part a rank plays in a protocol run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Holds shares, evaluates gates and consumes triples.
    Computing,
    /// Only supplies triples, never holds secret shares.
    Dealer,
}

/// The configuration every party of a run must agree on, plus the party's own rank.
///
/// A config is built once with the `with_*` methods and then only read. Call
/// [`ProtocolConfig::validate`] before using it, or let [`crate::protocol`] do it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    rank: usize,
    world_size: usize,
    computing_parties: Vec<usize>,
    dealer: Option<usize>,
    output_party: usize,
    and_correction_party: usize,
    modulus: Modulus,
    bit_length: u32,
}

impl ProtocolConfig {
    /// The default number of bits of the compared values, including the sign bit.
    pub const DEFAULT_BIT_LENGTH: u32 = 32;

    /// A run where ranks `0..world_size - 1` compute and the last rank is the dealer.
    ///
    /// Party 0 receives the output and the ring is `2^64`.
    pub fn with_dealer(rank: usize, world_size: usize) -> Self {
        let parties = world_size.saturating_sub(1);
        Self {
            rank,
            world_size,
            computing_parties: (0..parties).collect(),
            dealer: Some(parties),
            output_party: 0,
            and_correction_party: AND_CORRECTION_PARTY,
            modulus: Modulus::RING_64,
            bit_length: Self::DEFAULT_BIT_LENGTH,
        }
    }

    /// A run without dealer where all ranks compute.
    ///
    /// Triples have to come from some other [`crate::dealer::TripleSource`].
    pub fn without_dealer(rank: usize, world_size: usize) -> Self {
        Self {
            computing_parties: (0..world_size).collect(),
            dealer: None,
            ..Self::with_dealer(rank, world_size)
        }
    }

    /// Sets the party that learns the result.
    pub fn with_output_party(self, output_party: usize) -> Self {
        Self {
            output_party,
            ..self
        }
    }

    /// Sets the ring modulus.
    pub fn with_modulus(self, modulus: Modulus) -> Self {
        Self { modulus, ..self }
    }

    /// Sets the number of bits (including the sign bit) the decomposition produces.
    pub fn with_bit_length(self, bit_length: u32) -> Self {
        Self { bit_length, ..self }
    }

    /// Checks that every role points to a computing party and that the bit length fits the ring.
    pub fn validate(&self) -> Result<(), Error> {
        if self.rank >= self.world_size {
            return Err(Error::InvalidParty(self.rank));
        }
        if self.computing_parties.len() < 2 {
            return Err(Error::TooFewParties(self.computing_parties.len()));
        }
        if let Some(&p) = self.computing_parties.iter().find(|p| **p >= self.world_size) {
            return Err(Error::InvalidParty(p));
        }
        if let Some(dealer) = self.dealer
            && (dealer >= self.world_size || self.is_computing(dealer))
        {
            return Err(Error::InvalidParty(dealer));
        }
        for party in [self.output_party, self.and_correction_party] {
            if !self.is_computing(party) {
                return Err(Error::InvalidParty(party));
            }
        }
        if self.bit_length < 2 {
            return Err(Error::BitLengthTooSmall {
                bit_length: self.bit_length,
                required: 2,
            });
        }
        if self.bit_length > self.modulus.bits() {
            return Err(Error::ModulusOverflow {
                bits: self.bit_length,
                max: self.modulus.bits(),
            });
        }
        Ok(())
    }

    /// The rank of the party using this config.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// The number of ranks, including the dealer.
    pub fn world_size(&self) -> usize {
        self.world_size
    }

    /// The ranks holding shares, in increasing order.
    pub fn computing_parties(&self) -> &[usize] {
        &self.computing_parties
    }

    /// All computing parties except the given one, in increasing order.
    pub(crate) fn computing_parties_except(&self, party: usize) -> impl Iterator<Item = usize> {
        self.computing_parties
            .iter()
            .copied()
            .filter(move |p| *p != party)
    }

    /// The rank of the dealer, if the run has one.
    pub fn dealer(&self) -> Option<usize> {
        self.dealer
    }

    /// The party that learns the comparison result.
    pub fn output_party(&self) -> usize {
        self.output_party
    }

    /// The party that applies public corrections and aggregates openings.
    pub fn and_correction_party(&self) -> usize {
        self.and_correction_party
    }

    /// The ring modulus.
    pub fn modulus(&self) -> Modulus {
        self.modulus
    }

    /// The number of bits of the decomposed difference, including the sign bit.
    pub fn bit_length(&self) -> u32 {
        self.bit_length
    }

    /// Whether the given rank holds shares.
    pub fn is_computing(&self, party: usize) -> bool {
        self.computing_parties.binary_search(&party).is_ok()
    }

    /// The role of this config's own rank.
    pub fn role(&self) -> Result<Role, Error> {
        if self.is_computing(self.rank) {
            Ok(Role::Computing)
        } else if self.dealer == Some(self.rank) {
            Ok(Role::Dealer)
        } else {
            Err(Error::InvalidParty(self.rank))
        }
    }

    /// Whether this config's own rank applies the one-sided public corrections.
    pub(crate) fn is_correction_party(&self) -> bool {
        self.rank == self.and_correction_party
    }
}
