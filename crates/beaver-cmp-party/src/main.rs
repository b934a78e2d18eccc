//! Runs the dealer or a computing party of a secure comparison over TCP.
use std::net::IpAddr;

use anyhow::{Context, bail};
use beaver_cmp::{
    config::{ProtocolConfig, Role},
    dealer::{Dealer, DealerTriples},
    decompose::triples_required,
    protocol::{ComparisonInputs, compare, simulate_comparison},
    random::os_rng,
};
use channel::TcpChannel;
use clap::{Args, Parser, Subcommand};
use tracing::{Instrument, error, info, info_span};
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

mod channel;

/// Compares two private integers `a > b` without revealing them.
///
/// Ranks `0..WORLD_SIZE - 1` are computing parties, the last rank is the dealer. Party 0 owns `a`
/// and learns the result, party 1 owns `b`. Logging can be controlled with an EnvFilter via the
/// `BEAVER_CMP_LOG` environment variable.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Runs the trusted dealer, serving Beaver triples to the computing parties.
    Dealer {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Runs a computing party.
    Party {
        #[command(flatten)]
        run: RunArgs,
        /// The private input (ignored by every party except 0 and 1).
        #[arg(long, short, default_value_t = 0, allow_negative_numbers = true)]
        input: i64,
    },
    /// Runs all parties and the dealer in this process on a set of sample comparisons.
    Demo {
        /// The number of computing parties.
        #[arg(long, default_value_t = 2)]
        parties: usize,
        /// The number of bits of the compared values, including the sign bit.
        #[arg(long, default_value_t = ProtocolConfig::DEFAULT_BIT_LENGTH)]
        bit_length: u32,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// The rank of this process.
    #[arg(long, env = "RANK")]
    rank: usize,
    /// The number of ranks, including the dealer.
    #[arg(long, env = "WORLD_SIZE")]
    world_size: usize,
    /// The address all ranks listen on.
    #[arg(long, env = "MASTER_ADDR", default_value = "127.0.0.1")]
    master_addr: IpAddr,
    /// Rank `r` listens on this port plus `r`.
    #[arg(long, env = "MASTER_PORT", default_value_t = 29500)]
    master_port: u16,
    /// The number of bits of the compared values, including the sign bit.
    #[arg(long, default_value_t = ProtocolConfig::DEFAULT_BIT_LENGTH)]
    bit_length: u32,
}

impl RunArgs {
    fn config(&self) -> anyhow::Result<ProtocolConfig> {
        let config = ProtocolConfig::with_dealer(self.rank, self.world_size)
            .with_bit_length(self.bit_length);
        config.validate()?;
        Ok(config)
    }

    async fn connect(&self) -> anyhow::Result<TcpChannel> {
        TcpChannel::connect(
            self.rank,
            self.world_size,
            self.master_addr,
            self.master_port,
        )
        .await
        .context("could not connect to all ranks")
    }
}

const DEMO_CASES: [(i64, i64); 8] = [
    (100, 50),
    (50, 100),
    (100, 100),
    (0, 0),
    (1, 0),
    (1000, 999),
    (-5, -10),
    (-10, 5),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing().context("tracing initialization")?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Dealer { run } => {
            let span = info_span!("dealer", rank = run.rank);
            run_dealer(run).instrument(span).await
        }
        Commands::Party { run, input } => {
            let span = info_span!("party", rank = run.rank);
            run_party(run, input).instrument(span).await
        }
        Commands::Demo {
            parties,
            bit_length,
        } => demo(parties, bit_length).await,
    }
}

async fn run_dealer(run: RunArgs) -> anyhow::Result<()> {
    let config = run.config()?;
    if config.role()? != Role::Dealer {
        bail!("rank {} is a computing party, the dealer is the last rank", run.rank);
    }
    let channel = run.connect().await?;
    let mut dealer = Dealer::new(os_rng());
    let dealt = dealer.serve(&channel, config.computing_parties()).await?;
    info!("Dealt {dealt} triples");
    Ok(())
}

async fn run_party(run: RunArgs, input: i64) -> anyhow::Result<()> {
    let config = run.config()?;
    if config.role()? != Role::Computing {
        bail!("rank {} is the dealer, not a computing party", run.rank);
    }
    let dealer = config.dealer().context("the run has no dealer")?;
    let channel = run.connect().await?;
    let mut triples = DealerTriples::new(&channel, dealer);
    let num_triples = triples_required(config.computing_parties().len(), config.bit_length());
    triples.request(num_triples).await?;

    let inputs = ComparisonInputs::for_party(config.rank(), input);
    match compare(&channel, &config, inputs, &mut triples).await? {
        Some(result) => {
            info!("Used {} triples", triples.consumed());
            println!("a > b: {result}");
        }
        None => info!("Done, the result is only revealed to party {}", config.output_party()),
    }
    Ok(())
}

async fn demo(parties: usize, bit_length: u32) -> anyhow::Result<()> {
    let mut failed = 0;
    for (a, b) in DEMO_CASES {
        let result = simulate_comparison(a, b, parties, bit_length).await?;
        if result == (a > b) {
            info!("PASSED: {a} > {b} is {result}");
        } else {
            error!("FAILED: {a} > {b} computed as {result}");
            failed += 1;
        }
    }
    if failed > 0 {
        bail!("{failed} of {} comparisons failed", DEMO_CASES.len());
    }
    info!("All {} comparisons passed", DEMO_CASES.len());
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = EnvFilter::builder()
        .with_env_var("BEAVER_CMP_LOG")
        .with_default_directive("info".parse()?)
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .init();

    Ok(())
}
