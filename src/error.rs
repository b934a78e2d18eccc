//! The error type shared by all protocol components.

use crate::channel;

/// Errors that abort a protocol run.
///
/// None of these errors can be recovered from within a run: a half-opened share or a partially
/// consumed triple batch must never be reused, so callers have to start over with fresh shares
/// and fresh triples.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A party supplied or omitted a secret value inconsistently with its role.
    #[error("party {party} {reason}")]
    RoleMismatch {
        /// The rank of the party calling the operation.
        party: usize,
        /// What the party did wrong.
        reason: &'static str,
    },
    /// More AND gates were evaluated than triples were supplied.
    #[error("the triple batch was exhausted after {consumed} triples")]
    TripleExhausted {
        /// The number of triples consumed before the batch ran out.
        consumed: u64,
    },
    /// The dealer delivered a triple out of sequence.
    #[error("expected triple {expected} from the dealer, but received triple {actual}")]
    TripleOutOfOrder {
        /// The id that follows the last consumed triple.
        expected: u64,
        /// The id of the triple that actually arrived.
        actual: u64,
    },
    /// The parties requested a different number of triples from the dealer.
    #[error("unequal number of requested triples: {0} vs {1}")]
    TriplesMismatch(u64, u64),
    /// The dealer aborted the batch and told the parties why.
    #[error("the dealer aborted: {0}")]
    DealerAborted(String),
    /// A message could not be sent, received or (de-)serialized.
    #[error("channel failure: {0}")]
    ChannelFailure(#[from] channel::Error),
    /// A width in bits exceeds what the ring can represent.
    #[error("{bits} bits exceed the maximum of {max} bits")]
    ModulusOverflow {
        /// The requested width.
        bits: u32,
        /// The largest width that is supported.
        max: u32,
    },
    /// The bit length cannot represent the range of the compared difference.
    #[error("a bit length of {bit_length} is too small, at least {required} bits are needed")]
    BitLengthTooSmall {
        /// The configured bit length.
        bit_length: u32,
        /// The smallest bit length that would work.
        required: u32,
    },
    /// The rank does not belong to a party that may play the requested role.
    #[error("party {0} is not a valid party for this role")]
    InvalidParty(usize),
    /// Sharing needs at least two computing parties.
    #[error("at least 2 computing parties are required, found {0}")]
    TooFewParties(usize),
    /// An earlier step of this run failed, the run cannot continue.
    #[error("the run was aborted by an earlier failure")]
    Aborted,
}
