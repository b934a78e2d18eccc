//! Sharing secrets among the computing parties and reconstructing them.
//!
//! Whenever one party sends to or receives from all other computing parties, it does so in
//! increasing rank order. The message pattern of every operation is therefore fixed and the same
//! on every run, which is what lets all parties agree on which message belongs to which step
//! without sequence numbers.

use tracing::{Level, instrument};

use crate::{
    Error,
    channel::{Channel, recv_from, recv_vec_from, send_to},
    config::ProtocolConfig,
    random::RandomSource,
    share::{BitShare, RingShare},
    utils::xor_inplace,
};

/// Splits secrets into shares at their source and recombines shares at a designated party.
#[derive(Debug)]
pub struct ShareCoordinator<'a, C: Channel> {
    channel: &'a C,
    config: &'a ProtocolConfig,
}

impl<'a, C: Channel> ShareCoordinator<'a, C> {
    /// Creates a coordinator for the party described by `config`.
    pub fn new(channel: &'a C, config: &'a ProtocolConfig) -> Self {
        Self { channel, config }
    }

    /// Additively shares `value` from `source` among all computing parties.
    ///
    /// Must be called by every computing party. The source passes `Some(value)` and every other
    /// party passes `None`. The source keeps `value` minus the random shares it sent out.
    #[instrument(level = Level::DEBUG, skip_all, fields(rank = self.config.rank(), source = source), err)]
    pub async fn share(
        &self,
        value: Option<u64>,
        source: usize,
        rng: &mut impl RandomSource,
    ) -> Result<RingShare, Error> {
        let &Self { channel, config } = self;
        self.check_parties(source)?;
        let modulus = config.modulus();
        if config.rank() == source {
            let Some(value) = value else {
                return Err(Error::RoleMismatch {
                    party: source,
                    reason: "is the source of a share, but supplied no value",
                });
            };
            let mut own = RingShare::new(value, modulus);
            for p in config.computing_parties_except(source) {
                let share = RingShare::new(rng.uniform(0, modulus.max()), modulus);
                send_to(channel, p, "share (ring)", &share.value()).await?;
                own = own.sub_share(share);
            }
            Ok(own)
        } else {
            if value.is_some() {
                return Err(Error::RoleMismatch {
                    party: config.rank(),
                    reason: "is not the source of a share, but supplied a value",
                });
            }
            let value: u64 = recv_from(channel, source, "share (ring)").await?;
            Ok(RingShare::new(value, modulus))
        }
    }

    /// XOR-shares `len` bits from `source` among all computing parties.
    ///
    /// The source passes `Some(bits)` with `bits.len() == len`, every other party passes `None`.
    /// Each recipient gets all of its `len` shares in a single message.
    #[instrument(level = Level::DEBUG, skip_all, fields(rank = self.config.rank(), source = source, len = len), err)]
    pub async fn share_bits(
        &self,
        bits: Option<&[bool]>,
        source: usize,
        len: usize,
        rng: &mut impl RandomSource,
    ) -> Result<Vec<BitShare>, Error> {
        let &Self { channel, config } = self;
        self.check_parties(source)?;
        let own = if config.rank() == source {
            let Some(bits) = bits else {
                return Err(Error::RoleMismatch {
                    party: source,
                    reason: "is the source of a bit share, but supplied no bits",
                });
            };
            if bits.len() != len {
                return Err(Error::RoleMismatch {
                    party: source,
                    reason: "supplied a different number of bits than announced",
                });
            }
            let mut own = bits.to_vec();
            for p in config.computing_parties_except(source) {
                let shares: Vec<bool> = (0..len).map(|_| rng.bit()).collect();
                send_to(channel, p, "share (bits)", &shares).await?;
                xor_inplace(&mut own, &shares);
            }
            own
        } else {
            if bits.is_some() {
                return Err(Error::RoleMismatch {
                    party: config.rank(),
                    reason: "is not the source of a bit share, but supplied bits",
                });
            }
            recv_vec_from(channel, source, "share (bits)", len).await?
        };
        Ok(own.into_iter().map(BitShare::new).collect())
    }

    /// XOR-shares a single bit from `source`, see [`ShareCoordinator::share_bits`].
    pub async fn share_bit(
        &self,
        bit: Option<bool>,
        source: usize,
        rng: &mut impl RandomSource,
    ) -> Result<BitShare, Error> {
        let bits = bit.map(|bit| [bit]);
        let shares = self
            .share_bits(bits.as_ref().map(|b| &b[..]), source, 1, rng)
            .await?;
        let &[share] = shares.as_slice() else {
            unreachable!("share_bits returns exactly `len` shares")
        };
        Ok(share)
    }

    /// Sums all parties' shares at `output` and re-centers the sum into `[-M/2, M/2)`.
    ///
    /// Returns `Some` only at the output party.
    #[instrument(level = Level::DEBUG, skip_all, fields(rank = self.config.rank(), output = output), err)]
    pub async fn reconstruct_arithmetic(
        &self,
        share: RingShare,
        output: usize,
    ) -> Result<Option<i64>, Error> {
        let &Self { channel, config } = self;
        self.check_parties(output)?;
        if config.rank() == output {
            let mut sum = share;
            for p in config.computing_parties_except(output) {
                let value: u64 = recv_from(channel, p, "reconstruct (ring)").await?;
                sum = sum.add_share(RingShare::new(value, config.modulus()));
            }
            Ok(Some(config.modulus().decode(sum.value())))
        } else {
            send_to(channel, output, "reconstruct (ring)", &share.value()).await?;
            Ok(None)
        }
    }

    /// XORs all parties' shares at `output`.
    ///
    /// Returns `Some` only at the output party.
    #[instrument(level = Level::DEBUG, skip_all, fields(rank = self.config.rank(), output = output), err)]
    pub async fn reconstruct_boolean(
        &self,
        share: BitShare,
        output: usize,
    ) -> Result<Option<bool>, Error> {
        let &Self { channel, config } = self;
        self.check_parties(output)?;
        if config.rank() == output {
            let mut bit = share;
            for p in config.computing_parties_except(output) {
                let theirs: bool = recv_from(channel, p, "reconstruct (bit)").await?;
                bit = bit ^ BitShare::new(theirs);
            }
            Ok(Some(bit.bit()))
        } else {
            send_to(channel, output, "reconstruct (bit)", &share.bit()).await?;
            Ok(None)
        }
    }

    /// Reveals XOR-shared bits to every computing party.
    ///
    /// The correction party gathers all shares, XORs them and sends the opened bits back, so an
    /// opening costs one round trip regardless of how many bits are opened at once.
    pub async fn open_bits(&self, bits: &[bool]) -> Result<Vec<bool>, Error> {
        let &Self { channel, config } = self;
        let aggregator = config.and_correction_party();
        self.check_parties(aggregator)?;
        if config.rank() == aggregator {
            let mut opened = bits.to_vec();
            for p in config.computing_parties_except(aggregator) {
                let theirs: Vec<bool> = recv_vec_from(channel, p, "open (gather)", bits.len()).await?;
                xor_inplace(&mut opened, &theirs);
            }
            for p in config.computing_parties_except(aggregator) {
                send_to(channel, p, "open (broadcast)", &opened).await?;
            }
            Ok(opened)
        } else {
            send_to(channel, aggregator, "open (gather)", bits).await?;
            Ok(recv_vec_from(channel, aggregator, "open (broadcast)", bits.len()).await?)
        }
    }

    /// Checks that both this party and the party it talks to hold shares.
    fn check_parties(&self, other: usize) -> Result<(), Error> {
        for party in [self.config.rank(), other] {
            if !self.config.is_computing(party) {
                return Err(Error::InvalidParty(party));
            }
        }
        Ok(())
    }
}
