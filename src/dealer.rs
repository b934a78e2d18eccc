//! The dealer as a (semi-)trusted party, providing Beaver triples.
//!
//! The dealer generates triples `(a, b, c = a & b)`, XOR-splits every component among the
//! computing parties and delivers the shares round-robin: triple 0 to every party, then triple 1
//! to every party, and so on. Since messages between two parties arrive in the order they were
//! sent, the `k`-th triple a party receives is always its share of global triple `k`. Every
//! triple carries its index as id, which the receiving side checks against its own count.
//!
//! A batch always ends with an explicit end-of-batch message, so a party that needs more triples
//! than the dealer generated fails with [`Error::TripleExhausted`] instead of waiting forever.
//!
//! Parties do not have to use the dealer at all: anything implementing [`TripleSource`] can
//! supply triples.

use std::{collections::VecDeque, future::Future};

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{Level, debug, instrument};

use crate::{
    Error,
    channel::{Channel, recv_from, send_to},
    random::RandomSource,
    share::BeaverTriple,
};

/// A message sent from the dealer to a computing party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum DealerMsg {
    /// The recipient's share of the triple with the given (global) id.
    Triple {
        /// The index of the triple within its batch.
        id: u64,
        /// The recipient's XOR share of the triple.
        share: BeaverTriple,
    },
    /// No more triples will follow.
    EndOfBatch,
    /// The dealer gave up, no triples will follow.
    Abort(String),
}

/// Supplies a party's shares of Beaver triples, one per AND gate.
///
/// Implementations must hand out every triple at most once and in the same order to all parties.
pub trait TripleSource {
    /// Takes the next triple, which must not be used again afterwards.
    fn next_triple(&mut self) -> impl Future<Output = Result<BeaverTriple, Error>> + Send;
}

/// A party's shares of an already dealt batch of triples.
#[derive(Debug, Clone, Default)]
pub struct TripleQueue {
    triples: VecDeque<BeaverTriple>,
    consumed: u64,
}

impl TripleQueue {
    /// The number of triples left in the queue.
    pub fn len(&self) -> usize {
        self.triples.len()
    }

    /// Whether all triples have been consumed.
    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// The number of triples taken so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }
}

impl FromIterator<BeaverTriple> for TripleQueue {
    fn from_iter<I: IntoIterator<Item = BeaverTriple>>(iter: I) -> Self {
        Self {
            triples: iter.into_iter().collect(),
            consumed: 0,
        }
    }
}

impl TripleSource for TripleQueue {
    fn next_triple(&mut self) -> impl Future<Output = Result<BeaverTriple, Error>> + Send {
        let next = match self.triples.pop_front() {
            Some(triple) => {
                self.consumed += 1;
                Ok(triple)
            }
            None => Err(Error::TripleExhausted {
                consumed: self.consumed,
            }),
        };
        std::future::ready(next)
    }
}

/// Receives triples from a dealer over the channel.
#[derive(Debug)]
pub struct DealerTriples<'a, C: Channel> {
    channel: &'a C,
    dealer: usize,
    next_id: u64,
    exhausted: bool,
}

impl<'a, C: Channel> DealerTriples<'a, C> {
    /// Creates a source that reads the triples sent by the dealer with the given rank.
    pub fn new(channel: &'a C, dealer: usize) -> Self {
        Self {
            channel,
            dealer,
            next_id: 0,
            exhausted: false,
        }
    }

    /// Asks a dealer running [`Dealer::serve`] for `count` triples.
    ///
    /// All computing parties must request the same number of triples.
    pub async fn request(&self, count: u64) -> Result<(), Error> {
        send_to(self.channel, self.dealer, "triple request (dealer)", &count).await?;
        Ok(())
    }

    /// The number of triples taken so far.
    pub fn consumed(&self) -> u64 {
        self.next_id
    }
}

impl<C: Channel + Sync> TripleSource for DealerTriples<'_, C> {
    async fn next_triple(&mut self) -> Result<BeaverTriple, Error> {
        if self.exhausted {
            return Err(Error::TripleExhausted {
                consumed: self.next_id,
            });
        }
        match recv_from(self.channel, self.dealer, "beaver triple (dealer)").await? {
            DealerMsg::Triple { id, share } if id == self.next_id => {
                self.next_id += 1;
                Ok(share)
            }
            DealerMsg::Triple { id, .. } => Err(Error::TripleOutOfOrder {
                expected: self.next_id,
                actual: id,
            }),
            DealerMsg::EndOfBatch => {
                self.exhausted = true;
                Err(Error::TripleExhausted {
                    consumed: self.next_id,
                })
            }
            DealerMsg::Abort(reason) => Err(Error::DealerAborted(reason)),
        }
    }
}

/// Generates Beaver triples and distributes XOR shares of them to the computing parties.
#[derive(Debug)]
pub struct Dealer<R: RandomSource> {
    rng: R,
}

impl<R: RandomSource> Dealer<R> {
    /// Creates a dealer drawing all its randomness from `rng`.
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Generates a fresh (unshared) triple with `c = a & b`.
    pub fn generate_triple(&mut self) -> BeaverTriple {
        let a = self.rng.bit();
        let b = self.rng.bit();
        BeaverTriple { a, b, c: a & b }
    }

    /// Splits a triple into `parties` XOR shares, using fresh randomness for every component.
    pub fn split(&mut self, triple: BeaverTriple, parties: usize) -> Vec<BeaverTriple> {
        let mut shares = Vec::with_capacity(parties);
        let mut last = triple;
        for _ in 1..parties {
            let share = BeaverTriple {
                a: self.rng.bit(),
                b: self.rng.bit(),
                c: self.rng.bit(),
            };
            last = last ^ share;
            shares.push(share);
        }
        shares.push(last);
        shares
    }

    /// Deals `num_triples` triples locally, returning one queue per party.
    pub fn deal(&mut self, num_triples: u64, parties: usize) -> Vec<TripleQueue> {
        let mut queues = vec![TripleQueue::default(); parties];
        for _ in 0..num_triples {
            let triple = self.generate_triple();
            for (queue, share) in queues.iter_mut().zip(self.split(triple, parties)) {
                queue.triples.push_back(share);
            }
        }
        queues
    }

    /// Generates `num_triples` triples and pushes them to `parties`, followed by the end of batch.
    ///
    /// Triples are delivered round-robin, one triple per party per round, in the order of
    /// `parties`.
    #[instrument(level = Level::DEBUG, skip_all, fields(num_triples = num_triples), err)]
    pub async fn run(
        &mut self,
        channel: &impl Channel,
        num_triples: u64,
        parties: &[usize],
    ) -> Result<(), Error> {
        debug!("Dealer with {} parties", parties.len());
        for id in 0..num_triples {
            let triple = self.generate_triple();
            let shares = self.split(triple, parties.len());
            for (&p, share) in parties.iter().zip(shares) {
                let msg = DealerMsg::Triple { id, share };
                send_to(channel, p, "beaver triple (dealer)", &msg).await?;
            }
        }
        for &p in parties {
            send_to(channel, p, "beaver triple (dealer)", &DealerMsg::EndOfBatch).await?;
        }
        debug!("Dealer sent {num_triples} triples to all parties");
        Ok(())
    }

    /// Waits for every party to request a number of triples, then runs a batch of that size.
    ///
    /// If the parties disagree, they all receive an abort message instead. Returns the number of
    /// triples that were dealt.
    #[instrument(level = Level::DEBUG, skip_all, err)]
    pub async fn serve(&mut self, channel: &impl Channel, parties: &[usize]) -> Result<u64, Error> {
        let requests: Vec<u64> = try_join_all(parties.iter().map(async |&p| {
            recv_from(channel, p, "triple request (dealer)").await
        }))
        .await?;
        for window in requests.windows(2) {
            let &[a, b] = window else {
                unreachable!("window is size 2")
            };
            if a != b {
                let e = Error::TriplesMismatch(a, b);
                let msg = DealerMsg::Abort(e.to_string());
                try_join_all(
                    parties
                        .iter()
                        .map(async |&p| send_to(channel, p, "beaver triple (dealer)", &msg).await),
                )
                .await?;
                return Err(e);
            }
        }
        let num_triples = requests.first().copied().unwrap_or_default();
        self.run(channel, num_triples, parties).await?;
        Ok(num_triples)
    }
}
