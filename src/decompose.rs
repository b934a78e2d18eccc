//! Oblivious conversion of an additive share into XOR shares of the secret's bits.
//!
//! The bits of a secret are not the XOR of the bits of its additive shares, because adding the
//! shares produces carries. Instead, every party XOR-shares the bits of its own additive share
//! (with itself as source), and the parties then add these boolean-shared bit vectors with a
//! ripple-carry adder. XOR gates are local, every carry costs one [`SecureAndGate`] evaluation.
//!
//! For one full adder with inputs `x`, `y` and carry-in `c`:
//!
//! ```text
//! sum   = x ^ y ^ c
//! carry = ((x ^ c) & (y ^ c)) ^ c
//! ```
//!
//! The carry is the majority of `x`, `y` and `c` using a single AND. The carry out of the most
//! significant bit is discarded, as the result is computed modulo `2^bit_length`.

use tracing::{Level, debug, instrument};

use crate::{
    Error,
    and_gate::SecureAndGate,
    channel::Channel,
    config::ProtocolConfig,
    coordinator::ShareCoordinator,
    dealer::TripleSource,
    random::RandomSource,
    share::{BitShare, RingShare},
};

/// The number of triples one decomposition of a `bit_length`-bit value among `parties` consumes.
///
/// Adding `parties` bit vectors takes `parties - 1` adders, each with `bit_length - 1` carries.
pub fn triples_required(parties: usize, bit_length: u32) -> u64 {
    (parties.saturating_sub(1) as u64) * u64::from(bit_length.saturating_sub(1))
}

/// Converts ring shares into XOR shares of the bits of the shared value.
#[derive(Debug)]
pub struct BitDecomposer<'a, C: Channel> {
    coordinator: ShareCoordinator<'a, C>,
    gate: SecureAndGate<'a, C>,
    config: &'a ProtocolConfig,
}

impl<'a, C: Channel> BitDecomposer<'a, C> {
    /// Creates a decomposer for the party described by `config`.
    pub fn new(channel: &'a C, config: &'a ProtocolConfig) -> Self {
        Self {
            coordinator: ShareCoordinator::new(channel, config),
            gate: SecureAndGate::new(channel, config),
            config,
        }
    }

    /// Returns XOR shares of the lowest `bit_length` bits of the shared value, least significant
    /// bit first.
    ///
    /// Must be called by every computing party, consuming
    /// [`triples_required`]`(parties, bit_length)` triples from `triples`. If the shared value
    /// needs more than `bit_length` bits, the result is silently truncated. Fails with
    /// [`Error::ModulusOverflow`] if `bit_length` exceeds the width of the ring.
    #[instrument(level = Level::DEBUG, skip_all, fields(rank = self.config.rank(), bit_length = bit_length), err)]
    pub async fn decompose(
        &self,
        share: RingShare,
        bit_length: u32,
        rng: &mut impl RandomSource,
        triples: &mut impl TripleSource,
    ) -> Result<Vec<BitShare>, Error> {
        let max = share.modulus().bits();
        if bit_length > max {
            return Err(Error::ModulusOverflow {
                bits: bit_length,
                max,
            });
        }
        let own_bits = share.local_bits(bit_length);
        let len = own_bits.len();
        let mut sum: Option<Vec<BitShare>> = None;
        for &p in self.config.computing_parties() {
            let bits = (p == self.config.rank()).then_some(own_bits.as_slice());
            let addend = self.coordinator.share_bits(bits, p, len, rng).await?;
            sum = Some(match sum {
                None => addend,
                Some(sum) => self.add(&sum, &addend, triples).await?,
            });
            debug!("Added the bits of party {p}");
        }
        sum.ok_or(Error::TooFewParties(0))
    }

    /// Adds two XOR-shared bit vectors of equal length modulo `2^len`.
    async fn add(
        &self,
        x: &[BitShare],
        y: &[BitShare],
        triples: &mut impl TripleSource,
    ) -> Result<Vec<BitShare>, Error> {
        let len = x.len();
        let mut sum = Vec::with_capacity(len);
        let mut carry = BitShare::ZERO;
        for (i, (&xi, &yi)) in x.iter().zip(y).enumerate() {
            sum.push(xi ^ yi ^ carry);
            if i + 1 < len {
                let triple = triples.next_triple().await?;
                carry = self.gate.evaluate(xi ^ carry, yi ^ carry, triple).await? ^ carry;
            }
        }
        Ok(sum)
    }
}

#[cfg(test)]
mod tests {
    use futures::future::try_join_all;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use tokio::runtime::Runtime;

    use super::{BitDecomposer, triples_required};
    use crate::{
        Error,
        channel::SimpleChannel,
        config::ProtocolConfig,
        coordinator::ShareCoordinator,
        dealer::{Dealer, TripleQueue},
        share::{Modulus, RingShare},
    };

    /// Shares `secret` from party 0, decomposes it and opens all bits at party 0.
    async fn decompose_and_open(
        secret: u64,
        parties: usize,
        modulus: Modulus,
        bit_length: u32,
        seed: u64,
    ) -> Result<(Vec<bool>, Vec<u64>), Error> {
        let channels = SimpleChannel::channels(parties);
        let configs: Vec<_> = (0..parties)
            .map(|rank| {
                ProtocolConfig::without_dealer(rank, parties)
                    .with_modulus(modulus)
                    .with_bit_length(bit_length)
            })
            .collect();
        let mut dealer = Dealer::new(ChaCha20Rng::seed_from_u64(seed));
        let queues = dealer.deal(triples_required(parties, bit_length), parties);
        let results = try_join_all(channels.iter().zip(&configs).zip(queues).map(
            async |((channel, config), mut triples)| {
                let mut rng = ChaCha20Rng::seed_from_u64(seed + 1 + config.rank() as u64);
                let coordinator = ShareCoordinator::new(channel, config);
                let value = (config.rank() == 0).then_some(secret);
                let share = coordinator.share(value, 0, &mut rng).await?;
                let decomposer = BitDecomposer::new(channel, config);
                let bits = decomposer
                    .decompose(share, bit_length, &mut rng, &mut triples)
                    .await?;
                let mut opened = vec![];
                for bit in bits {
                    opened.push(coordinator.reconstruct_boolean(bit, 0).await?);
                }
                Ok::<_, Error>((opened, triples.len() as u64))
            },
        ))
        .await?;
        let bits = results[0].0.iter().map(|b| b.unwrap_or_default()).collect();
        let leftover = results.iter().map(|(_, left)| *left).collect();
        Ok((bits, leftover))
    }

    fn recombine(bits: &[bool]) -> u64 {
        bits.iter()
            .enumerate()
            .fold(0, |acc, (i, bit)| acc | (u64::from(*bit) << i))
    }

    #[tokio::test]
    async fn decomposes_small_values() -> Result<(), Error> {
        for secret in [0u64, 1, 2, 5, 100, 255] {
            let (bits, _) = decompose_and_open(secret, 2, Modulus::RING_64, 8, secret).await?;
            assert_eq!(bits.len(), 8);
            assert_eq!(recombine(&bits), secret);
        }
        Ok(())
    }

    #[tokio::test]
    async fn negative_values_have_the_sign_bit_set() -> Result<(), Error> {
        let m = Modulus::RING_64;
        let (bits, _) = decompose_and_open(m.encode(-50), 3, m, 16, 7).await?;
        assert!(bits[15]);
        assert_eq!(recombine(&bits), m.encode(-50) & 0xffff);
        Ok(())
    }

    #[tokio::test]
    async fn consumes_exactly_the_required_triples() -> Result<(), Error> {
        assert_eq!(triples_required(2, 64), 63);
        assert_eq!(triples_required(3, 32), 62);
        let (_, leftover) = decompose_and_open(12345, 3, Modulus::RING_64, 32, 1).await?;
        assert!(leftover.iter().all(|left| *left == 0));
        Ok(())
    }

    #[tokio::test]
    async fn full_width_in_a_small_ring() -> Result<(), Error> {
        let m = Modulus::new(12)?;
        for secret in [0, 1, 2047, 2048, 4095] {
            let (bits, _) = decompose_and_open(secret, 2, m, 12, secret).await?;
            assert_eq!(recombine(&bits), secret);
        }
        Ok(())
    }

    #[tokio::test]
    async fn adds_shared_bit_vectors_with_carries() -> Result<(), Error> {
        let parties = 2;
        let channels = SimpleChannel::channels(parties);
        let configs: Vec<_> = (0..parties)
            .map(|rank| ProtocolConfig::without_dealer(rank, parties))
            .collect();
        let mut dealer = Dealer::new(ChaCha20Rng::seed_from_u64(11));
        let queues = dealer.deal(3, parties);
        // 0b1011 + 0b0111 = 0b1_0010, the top carry is dropped
        let x = [true, true, false, true];
        let y = [true, true, true, false];
        let results = try_join_all(channels.iter().zip(&configs).zip(queues).map(
            async |((channel, config), mut triples)| {
                let mut rng = ChaCha20Rng::seed_from_u64(12 + config.rank() as u64);
                let coordinator = ShareCoordinator::new(channel, config);
                let xs = coordinator
                    .share_bits((config.rank() == 0).then_some(&x[..]), 0, 4, &mut rng)
                    .await?;
                let ys = coordinator
                    .share_bits((config.rank() == 1).then_some(&y[..]), 1, 4, &mut rng)
                    .await?;
                let decomposer = BitDecomposer::new(channel, config);
                let sum = decomposer.add(&xs, &ys, &mut triples).await?;
                let mut opened = vec![];
                for bit in sum {
                    opened.push(coordinator.reconstruct_boolean(bit, 0).await?);
                }
                Ok::<_, Error>((opened, triples.len()))
            },
        ))
        .await?;
        let bits: Vec<bool> = results[0].0.iter().map(|b| b.unwrap_or_default()).collect();
        assert_eq!(bits, vec![false, true, false, false]);
        assert!(results.iter().all(|(_, left)| *left == 0));
        Ok(())
    }

    #[tokio::test]
    async fn bit_length_beyond_the_ring_is_rejected() -> Result<(), Error> {
        let channels = SimpleChannel::channels(2);
        let config = ProtocolConfig::without_dealer(0, 2);
        let decomposer = BitDecomposer::new(&channels[0], &config);
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        let mut triples = TripleQueue::default();
        let err = decomposer
            .decompose(RingShare::new(1, Modulus::RING_64), 65, &mut rng, &mut triples)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ModulusOverflow { bits: 65, max: 64 }));
        let small = Modulus::new(12)?;
        let err = decomposer
            .decompose(RingShare::new(1, small), 13, &mut rng, &mut triples)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ModulusOverflow { bits: 13, max: 12 }));
        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn recombined_bits_equal_the_secret(secret: u64, parties in 2usize..5, seed: u64) {
            let rt = Runtime::new().unwrap();
            let (bits, _) = rt
                .block_on(decompose_and_open(secret, parties, Modulus::RING_64, 64, seed >> 1))
                .unwrap();
            prop_assert_eq!(recombine(&bits), secret);
        }
    }
}
