//! Secure multi-party comparison of two secret integers, based on additive secret sharing, XOR bit
//! sharing and Beaver-triple AND gates supplied by a trusted dealer.
//!
//! Two parties each hold a private integer. Together with any number of further computing parties
//! they compute whether `a > b`, revealing nothing but that single bit to a designated output
//! party. No computing party ever sees `a`, `b` or their difference in the clear.
//!
//! ## Features
//!
//! - Additive secret sharing over power-of-two rings `Z_{2^k}` with `k <= 64`
//! - XOR sharing of bits and secure AND gates using Beaver triples
//! - A trusted dealer that pushes triples to the parties, or serves them on request
//! - Oblivious bit decomposition of additive shares via ripple-carry adders
//! - An explicit, steppable state machine for the comparison protocol
//!
//! ## Main Components
//!
//! The crate is structured into several modules:
//!
//! * [`protocol`]: The [`protocol::compare`] function which runs a comparison for a single party.
//! * [`dealer`]: The [`dealer::Dealer`] and the [`dealer::TripleSource`]s reading its triples.
//! * [`decompose`]: Conversion from arithmetic shares to XOR shares of the bits.
//! * [`and_gate`]: Secure AND gates on XOR shares.
//! * [`coordinator`]: Sharing and reconstructing secrets.
//! * [`channel`]: Communication abstractions for exchanging data between parties.
//!
//! ## Basic Usage
//!
//! To run a comparison, each participating party needs to:
//!
//! 1. Set up communication channels with all other parties (including the dealer)
//! 2. Describe its role with a [`config::ProtocolConfig`]
//! 3. Request triples from the dealer (or obtain them in some other way)
//! 4. Call [`protocol::compare`] with its private input
//!
//! For simulated environments (testing/development), you can use the
//! [`protocol::simulate_comparison`] function.
//!
//! ## Example
//!
//! ```ignore
//! use beaver_cmp::{
//!     config::ProtocolConfig,
//!     dealer::DealerTriples,
//!     decompose::triples_required,
//!     protocol::{ComparisonInputs, compare},
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Set up a channel for communication, e.g. over TCP
//! let channel = /* ... */
//!
//! // Party 0 of two computing parties, the dealer has rank 2
//! let config = ProtocolConfig::with_dealer(0, 3);
//! let mut triples = DealerTriples::new(&channel, config.dealer().unwrap());
//! triples.request(triples_required(2, config.bit_length())).await?;
//!
//! // Party 0 owns `a`, party 1 owns `b`
//! let inputs = ComparisonInputs::for_party(0, 100);
//! let result = compare(&channel, &config, inputs, &mut triples).await?;
//!
//! println!("a > b: {:?}", result);
//! # Ok(())
//! # }
//! ```
//!
//! ## Security Properties
//!
//! This implementation provides security against semi-honest adversaries, as long as the dealer
//! does not collude with any computing party. A malicious party can make the result wrong or
//! abort the run, but it cannot learn the inputs of the other parties.
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod and_gate;
pub mod channel;
pub mod config;
pub mod coordinator;
pub mod dealer;
pub mod decompose;
pub mod error;
pub mod protocol;
pub mod random;
pub mod share;
mod utils;

pub use error::Error;
