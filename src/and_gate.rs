//! Secure AND of two XOR-shared bits, consuming one Beaver triple.

use tracing::trace;

use crate::{
    Error,
    channel::Channel,
    config::ProtocolConfig,
    coordinator::ShareCoordinator,
    share::{BeaverTriple, BitShare},
};

/// The party that XORs the public term `e & f` into its output share.
///
/// All parties must agree on this party, otherwise the term is counted zero or several times. The
/// same party aggregates openings and applies every other one-sided public correction.
pub const AND_CORRECTION_PARTY: usize = 0;

/// Evaluates AND gates on XOR shares using dealer-supplied Beaver triples.
#[derive(Debug)]
pub struct SecureAndGate<'a, C: Channel> {
    coordinator: ShareCoordinator<'a, C>,
    config: &'a ProtocolConfig,
}

impl<'a, C: Channel> SecureAndGate<'a, C> {
    /// Creates a gate evaluator for the party described by `config`.
    pub fn new(channel: &'a C, config: &'a ProtocolConfig) -> Self {
        Self {
            coordinator: ShareCoordinator::new(channel, config),
            config,
        }
    }

    /// Returns this party's share of `x & y`.
    ///
    /// `triple` is this party's share of a fresh triple. Every party must use its share of the
    /// same triple for the same gate, and the triple must not be used for any other gate.
    pub async fn evaluate(
        &self,
        x: BitShare,
        y: BitShare,
        triple: BeaverTriple,
    ) -> Result<BitShare, Error> {
        let BeaverTriple { a, b, c } = triple;
        let e = x.bit() ^ a;
        let f = y.bit() ^ b;
        let opened = self.coordinator.open_bits(&[e, f]).await?;
        let &[e, f] = opened.as_slice() else {
            unreachable!("open_bits returns as many bits as it was given")
        };
        trace!("AND gate opened e and f");
        let mut z = c ^ (e & b) ^ (f & a);
        if self.config.is_correction_party() {
            z ^= e & f;
        }
        Ok(BitShare::new(z))
    }
}

#[cfg(test)]
mod tests {
    use futures::future::try_join_all;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::SecureAndGate;
    use crate::{
        Error,
        channel::SimpleChannel,
        config::ProtocolConfig,
        coordinator::ShareCoordinator,
        dealer::{Dealer, TripleSource},
    };

    #[tokio::test]
    async fn and_of_all_bit_pairs() -> Result<(), Error> {
        for parties in [2, 3] {
            let channels = SimpleChannel::channels(parties);
            let configs: Vec<_> = (0..parties)
                .map(|rank| ProtocolConfig::without_dealer(rank, parties))
                .collect();
            for (x, y) in [(false, false), (false, true), (true, false), (true, true)] {
                let mut dealer = Dealer::new(ChaCha20Rng::seed_from_u64(99));
                let queues = dealer.deal(1, parties);
                let results = try_join_all(channels.iter().zip(&configs).zip(queues).map(
                    async |((channel, config), mut triples)| {
                        let mut rng = ChaCha20Rng::seed_from_u64(config.rank() as u64);
                        let coordinator = ShareCoordinator::new(channel, config);
                        let x = coordinator
                            .share_bit((config.rank() == 0).then_some(x), 0, &mut rng)
                            .await?;
                        let y = coordinator
                            .share_bit((config.rank() == parties - 1).then_some(y), parties - 1, &mut rng)
                            .await?;
                        let gate = SecureAndGate::new(channel, config);
                        let z = gate.evaluate(x, y, triples.next_triple().await?).await?;
                        coordinator.reconstruct_boolean(z, 0).await
                    },
                ))
                .await?;
                assert_eq!(results[0], Some(x & y), "{x} & {y} with {parties} parties");
            }
        }
        Ok(())
    }
}
