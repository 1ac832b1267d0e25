use std::collections::BTreeSet;

use clap::{Parser, Subcommand};
use govsmith_deploy::{Redeploy, governance::VoteType};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "govsmith")]
#[command(
    author,
    version,
    about = "Deploy a governed DeFi stack and drive its proposals"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "GOVSMITH_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to the configuration file.
    ///
    /// Defaults to ./Govsmith.toml. A missing file leaves the built-in defaults in place.
    #[arg(long, alias = "conf", env = "GOVSMITH_CONFIG")]
    pub config: Option<String>,

    /// The network to operate on. Overrides the `network` configuration key.
    #[arg(short, long)]
    pub network: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Deploy every contract of the stack and wire them together.
    DeployAll {
        /// Redeploy every contract, even those already recorded.
        #[arg(long, default_value_t = false)]
        redeploy: bool,

        /// Redeploy only the given step. Can be repeated.
        #[arg(long = "redeploy-step", value_name = "STEP", conflicts_with = "redeploy")]
        redeploy_steps: Vec<String>,
    },

    /// Submit the withdraw fee proposal.
    CreateProposal,

    /// Vote on the most recent proposal.
    VoteForProposal {
        /// Ballot to cast: for, against or abstain.
        #[arg(long, default_value_t = VoteType::For)]
        support: VoteType,
    },

    /// Queue the most recent proposal in the timelock and execute it.
    QueueAndExecute,
}

impl Command {
    pub fn redeploy(&self) -> Redeploy {
        match self {
            Command::DeployAll { redeploy: true, .. } => Redeploy::All,
            Command::DeployAll { redeploy_steps, .. } if !redeploy_steps.is_empty() => {
                Redeploy::Only(redeploy_steps.iter().cloned().collect::<BTreeSet<_>>())
            }
            _ => Redeploy::None,
        }
    }
}
