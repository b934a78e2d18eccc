//! Secure comparison of two secret integers, `a > b`, revealing only the result.
//!
//! Every computing party runs the same [`ComparisonProtocol`] state machine:
//!
//! 1. Sharing: the owners of `a` and `b` additively share their values.
//! 2. Subtracting: every party locally computes its share of `d = a - b - 1`. Only the correction
//!    party subtracts the public `1`.
//! 3. Decomposing: the parties obliviously convert `d` into XOR shares of its bits, consuming
//!    Beaver triples from a [`TripleSource`].
//! 4. Sign extracting: the most significant bit is the sign of `d`, and `a > b` iff `d >= 0`, i.e.
//!    iff the sign bit is `0`. The correction party flips its share of the sign bit, all others
//!    keep theirs.
//! 5. Opening: the result bit is revealed to the output party only.
//!
//! Any failure aborts the whole run. Shares and triples of an aborted run must not be reused, so
//! a failed comparison has to be started from scratch.
//!
//! For tests and experiments, [`simulate_comparison`] runs the dealer and all parties in a single
//! process.

use futures::future::{try_join, try_join_all};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing::{Level, debug, error, instrument};

use crate::{
    Error,
    channel::{Channel, SimpleChannel},
    config::{ProtocolConfig, Role},
    coordinator::ShareCoordinator,
    dealer::{Dealer, DealerTriples, TripleSource},
    decompose::{BitDecomposer, triples_required},
    random::{RandomSource, os_rng},
    share::{BitShare, RingShare},
};

/// Who owns the two compared values, and this party's own value if it owns one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComparisonInputs {
    /// The party that shares `a`.
    pub a_owner: usize,
    /// The party that shares `b`.
    pub b_owner: usize,
    /// `Some(a)` at the owner of `a`, `None` everywhere else.
    pub a: Option<i64>,
    /// `Some(b)` at the owner of `b`, `None` everywhere else.
    pub b: Option<i64>,
}

impl ComparisonInputs {
    /// The inputs of `rank`, with party 0 owning `a` and party 1 owning `b`.
    ///
    /// `value` is ignored for every other party.
    pub fn for_party(rank: usize, value: i64) -> Self {
        Self {
            a_owner: 0,
            b_owner: 1,
            a: (rank == 0).then_some(value),
            b: (rank == 1).then_some(value),
        }
    }
}

/// The state of a [`ComparisonProtocol`], carrying the intermediate shares of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    /// Not started yet.
    Idle,
    /// The inputs are about to be shared.
    Sharing,
    /// Both inputs are shared.
    Subtracting {
        /// This party's share of `a`.
        a: RingShare,
        /// This party's share of `b`.
        b: RingShare,
    },
    /// The difference `d = a - b - 1` is shared.
    Decomposing {
        /// This party's share of `d`.
        d: RingShare,
    },
    /// The bits of `d` are shared, least significant bit first.
    SignExtracting {
        /// This party's shares of the bits of `d`.
        bits: Vec<BitShare>,
    },
    /// The result bit is shared.
    Opening {
        /// This party's share of `a > b`.
        result: BitShare,
    },
    /// The run is complete. Only the output party holds `Some(result)`.
    Done(Option<bool>),
    /// A step failed, the run cannot continue.
    Aborted,
}

/// The comparison state machine of a single computing party.
#[derive(Debug)]
pub struct ComparisonProtocol<'a, C: Channel, R: RandomSource, T: TripleSource> {
    channel: &'a C,
    config: &'a ProtocolConfig,
    inputs: ComparisonInputs,
    rng: R,
    triples: &'a mut T,
    state: State,
}

impl<'a, C: Channel, R: RandomSource, T: TripleSource> ComparisonProtocol<'a, C, R, T> {
    /// Prepares a comparison for the party described by `config`.
    pub fn new(
        channel: &'a C,
        config: &'a ProtocolConfig,
        inputs: ComparisonInputs,
        rng: R,
        triples: &'a mut T,
    ) -> Self {
        Self {
            channel,
            config,
            inputs,
            rng,
            triples,
            state: State::Idle,
        }
    }

    /// The current state.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Performs the work of the current state and moves to the next one.
    ///
    /// Stepping a finished run is a no-op. After a failed step the run is [`State::Aborted`] and
    /// every further step fails with [`Error::Aborted`].
    pub async fn step(&mut self) -> Result<&State, Error> {
        let state = std::mem::replace(&mut self.state, State::Aborted);
        match self.advance(state).await {
            Ok(next) => {
                self.state = next;
                Ok(&self.state)
            }
            Err(e) => {
                error!("Comparison aborted: {e}");
                Err(e)
            }
        }
    }

    /// Runs all remaining steps and returns the result, which is only present at the output party.
    #[instrument(level = Level::DEBUG, skip_all, fields(rank = self.config.rank()), err)]
    pub async fn run(mut self) -> Result<Option<bool>, Error> {
        loop {
            if let State::Done(result) = self.step().await? {
                return Ok(*result);
            }
        }
    }

    async fn advance(&mut self, state: State) -> Result<State, Error> {
        let &mut Self {
            channel,
            config,
            inputs,
            ..
        } = self;
        let coordinator = ShareCoordinator::new(channel, config);
        match state {
            State::Idle => {
                config.validate()?;
                if config.role()? != Role::Computing {
                    return Err(Error::InvalidParty(config.rank()));
                }
                for value in [inputs.a, inputs.b].into_iter().flatten() {
                    check_input_range(value, config.bit_length())?;
                }
                Ok(State::Sharing)
            }
            State::Sharing => {
                let modulus = config.modulus();
                let a = coordinator
                    .share(inputs.a.map(|a| modulus.encode(a)), inputs.a_owner, &mut self.rng)
                    .await?;
                let b = coordinator
                    .share(inputs.b.map(|b| modulus.encode(b)), inputs.b_owner, &mut self.rng)
                    .await?;
                debug!("Shared both inputs");
                Ok(State::Subtracting { a, b })
            }
            State::Subtracting { a, b } => {
                let mut d = a.sub_share(b);
                if config.is_correction_party() {
                    d = d.sub_scalar(1);
                }
                Ok(State::Decomposing { d })
            }
            State::Decomposing { d } => {
                let decomposer = BitDecomposer::new(channel, config);
                let bits = decomposer
                    .decompose(d, config.bit_length(), &mut self.rng, &mut *self.triples)
                    .await?;
                debug!("Decomposed the difference into {} bits", bits.len());
                Ok(State::SignExtracting { bits })
            }
            State::SignExtracting { bits } => {
                let Some(&sign) = bits.last() else {
                    return Err(Error::BitLengthTooSmall {
                        bit_length: 0,
                        required: 2,
                    });
                };
                let result = sign.xor_scalar(config.is_correction_party());
                Ok(State::Opening { result })
            }
            State::Opening { result } => {
                let result = coordinator
                    .reconstruct_boolean(result, config.output_party())
                    .await?;
                if let Some(result) = result {
                    debug!("Comparison result: {result}");
                }
                Ok(State::Done(result))
            }
            State::Done(result) => Ok(State::Done(result)),
            State::Aborted => Err(Error::Aborted),
        }
    }
}

/// Checks that `value` lies in `[-2^(bit_length-2), 2^(bit_length-2))`.
///
/// For inputs in that range, `a - b - 1` fits into `bit_length` bits of two's complement.
fn check_input_range(value: i64, bit_length: u32) -> Result<(), Error> {
    let magnitude = (if value < 0 { !value } else { value }) as u64;
    let required = u64::BITS - magnitude.leading_zeros() + 2;
    if required > bit_length {
        Err(Error::BitLengthTooSmall {
            bit_length,
            required,
        })
    } else {
        Ok(())
    }
}

/// Runs one comparison for the party described by `config`, drawing randomness from the OS.
///
/// Returns `Some(a > b)` at the output party and `None` at every other computing party.
pub async fn compare(
    channel: &impl Channel,
    config: &ProtocolConfig,
    inputs: ComparisonInputs,
    triples: &mut impl TripleSource,
) -> Result<Option<bool>, Error> {
    ComparisonProtocol::new(channel, config, inputs, os_rng(), triples)
        .run()
        .await
}

/// Compares `a > b` among `parties` computing parties and a dealer, all in this process.
///
/// Party 0 owns `a` and receives the result, party 1 owns `b`, the dealer has rank `parties`.
pub async fn simulate_comparison(
    a: i64,
    b: i64,
    parties: usize,
    bit_length: u32,
) -> Result<bool, Error> {
    let seed = os_rng().uniform(0, u64::MAX);
    simulate_comparison_with_seed(a, b, parties, bit_length, seed).await
}

/// Like [`simulate_comparison`], but derives all randomness (shares and triples) from `seed`.
pub async fn simulate_comparison_with_seed(
    a: i64,
    b: i64,
    parties: usize,
    bit_length: u32,
    seed: u64,
) -> Result<bool, Error> {
    let world_size = parties + 1;
    let channels = SimpleChannel::channels(world_size);
    let configs: Vec<_> = (0..world_size)
        .map(|rank| ProtocolConfig::with_dealer(rank, world_size).with_bit_length(bit_length))
        .collect();
    configs[0].validate()?;
    let (dealer_channel, party_channels) = channels.split_last().ok_or(Error::TooFewParties(0))?;
    let computing = configs[0].computing_parties();

    let mut dealer = Dealer::new(ChaCha20Rng::seed_from_u64(seed));
    let num_triples = triples_required(parties, bit_length);
    let dealing = dealer.run(dealer_channel, num_triples, computing);
    let comparing = try_join_all(party_channels.iter().zip(&configs).map(
        async |(channel, config)| {
            let rank = config.rank();
            let rng = ChaCha20Rng::seed_from_u64(seed.wrapping_add(1 + rank as u64));
            let mut triples = DealerTriples::new(channel, parties);
            let inputs = ComparisonInputs::for_party(rank, if rank == 0 { a } else { b });
            ComparisonProtocol::new(channel, config, inputs, rng, &mut triples)
                .run()
                .await
        },
    ));
    let (_, results) = try_join(dealing, comparing).await?;
    results
        .into_iter()
        .next()
        .flatten()
        .ok_or(Error::InvalidParty(0))
}

#[cfg(test)]
mod tests {
    use super::{
        ComparisonInputs, ComparisonProtocol, State, check_input_range,
        simulate_comparison_with_seed,
    };
    use crate::{
        Error, channel::SimpleChannel, config::ProtocolConfig, dealer::TripleQueue,
        random::os_rng,
    };

    #[tokio::test]
    async fn compares_like_plaintext() -> Result<(), Error> {
        for (a, b) in [(100, 50), (50, 100), (100, 100), (0, 0), (1, 0), (1000, 999)] {
            let result = simulate_comparison_with_seed(a, b, 2, 16, (a * 31 + b) as u64).await?;
            assert_eq!(result, a > b, "{a} > {b}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn compares_negative_integers() -> Result<(), Error> {
        let cases = [
            (-5, -10),
            (-10, -5),
            (-10, 5),
            (5, -10),
            (-1, 0),
            (0, -1),
            (-7, -7),
        ];
        for (a, b) in cases {
            for parties in [2, 3] {
                let result = simulate_comparison_with_seed(a, b, parties, 32, 17).await?;
                assert_eq!(result, a > b, "{a} > {b} with {parties} parties");
            }
        }
        Ok(())
    }

    #[tokio::test]
    async fn steps_through_all_states() -> Result<(), Error> {
        let channels = SimpleChannel::channels(2);
        let configs: Vec<_> = (0..2)
            .map(|rank| ProtocolConfig::without_dealer(rank, 2).with_bit_length(8))
            .collect();
        let mut queues = crate::dealer::Dealer::new(os_rng()).deal(7, 2);
        let mut q1 = queues.pop().unwrap();
        let mut q0 = queues.pop().unwrap();
        let mut p0 = ComparisonProtocol::new(
            &channels[0],
            &configs[0],
            ComparisonInputs::for_party(0, 9),
            os_rng(),
            &mut q0,
        );
        let mut p1 = ComparisonProtocol::new(
            &channels[1],
            &configs[1],
            ComparisonInputs::for_party(1, 4),
            os_rng(),
            &mut q1,
        );
        let mut names = vec![];
        loop {
            let (s0, s1) = futures::try_join!(p0.step(), p1.step())?;
            let name = format!("{s0:?}");
            names.push(name.split([' ', '(']).next().unwrap_or_default().to_string());
            if let (State::Done(r0), State::Done(r1)) = (s0, s1) {
                assert_eq!((*r0, *r1), (Some(true), None));
                break;
            }
        }
        assert_eq!(
            names,
            [
                "Sharing",
                "Subtracting",
                "Decomposing",
                "SignExtracting",
                "Opening",
                "Done"
            ]
        );
        assert_eq!(p0.step().await?, &State::Done(Some(true)));
        Ok(())
    }

    #[tokio::test]
    async fn too_few_triples_abort_the_run() -> Result<(), Error> {
        let channels = SimpleChannel::channels(2);
        let configs: Vec<_> = (0..2)
            .map(|rank| ProtocolConfig::without_dealer(rank, 2).with_bit_length(8))
            .collect();
        let mut queues = crate::dealer::Dealer::new(os_rng()).deal(3, 2);
        let mut q1 = queues.pop().unwrap();
        let mut q0 = queues.pop().unwrap();
        let mut p0 = ComparisonProtocol::new(
            &channels[0],
            &configs[0],
            ComparisonInputs::for_party(0, 9),
            os_rng(),
            &mut q0,
        );
        let mut p1 = ComparisonProtocol::new(
            &channels[1],
            &configs[1],
            ComparisonInputs::for_party(1, 4),
            os_rng(),
            &mut q1,
        );
        let err = loop {
            if let Err(e) = futures::try_join!(p0.step(), p1.step()) {
                break e;
            }
        };
        assert!(matches!(err, Error::TripleExhausted { consumed: 3 }));
        assert_eq!(p0.state(), &State::Aborted);
        assert!(matches!(p0.step().await, Err(Error::Aborted)));
        Ok(())
    }

    #[tokio::test]
    async fn dealer_cannot_compare() {
        let channels = SimpleChannel::channels(3);
        let config = ProtocolConfig::with_dealer(2, 3);
        let mut triples = TripleQueue::default();
        let inputs = ComparisonInputs::for_party(2, 0);
        let protocol = ComparisonProtocol::new(&channels[2], &config, inputs, os_rng(), &mut triples);
        assert!(matches!(protocol.run().await, Err(Error::InvalidParty(2))));
    }

    #[test]
    fn inputs_must_leave_room_for_the_sign() {
        assert!(check_input_range(63, 8).is_ok());
        assert!(check_input_range(-64, 8).is_ok());
        assert!(matches!(
            check_input_range(64, 8),
            Err(Error::BitLengthTooSmall {
                bit_length: 8,
                required: 9
            })
        ));
        assert!(matches!(
            check_input_range(-65, 8),
            Err(Error::BitLengthTooSmall {
                bit_length: 8,
                required: 9
            })
        ));
        assert!(check_input_range((1 << 62) - 1, 64).is_ok());
        assert!(check_input_range(-(1 << 62), 64).is_ok());
        assert!(check_input_range(1 << 62, 64).is_err());
        assert!(check_input_range(i64::MIN, 64).is_err());
    }
}
