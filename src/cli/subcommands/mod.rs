// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod context;
mod gaps_cmd;
mod index_cmd;
mod walk_cmd;
mod watch_cmd;

use std::time::Duration;

use clap::{Args, Parser};

use self::context::IndexerContext;
pub(super) use self::{
    gaps_cmd::{FillGapsCommand, FindGapsCommand},
    index_cmd::IndexTipSetCommand,
    walk_cmd::WalkCommand,
    watch_cmd::WatchCommand,
};
use crate::cli_shared::cli::{CliOpts, Config};
use crate::shim::clock::ChainEpoch;

/// CLI structure generated when interacting with the indexer binary
#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"), author = env!("CARGO_PKG_AUTHORS"), version = env!("CARGO_PKG_VERSION"), about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    #[command(flatten)]
    pub opts: CliOpts,
    #[command(subcommand)]
    pub cmd: Subcommand,
}

/// Indexer sub-commands available.
#[derive(clap::Subcommand, Debug)]
pub enum Subcommand {
    /// Follow the chain head and index tipsets once they are confirmed
    Watch(WatchCommand),
    /// Index every tipset in a height range, highest first
    Walk(WalkCommand),
    /// Record the tasks that never completed in a height range
    FindGaps(FindGapsCommand),
    /// Re-index the recorded gaps in a height range
    FillGaps(FillGapsCommand),
    /// Index the tipset at one height
    IndexTs(IndexTipSetCommand),
}

impl Subcommand {
    pub async fn run(self, config: Config) -> anyhow::Result<()> {
        match self {
            Self::Watch(cmd) => cmd.run(config).await,
            Self::Walk(cmd) => cmd.run(config).await,
            Self::FindGaps(cmd) => cmd.run(config).await,
            Self::FillGaps(cmd) => cmd.run(config).await,
            Self::IndexTs(cmd) => cmd.run(config).await,
        }
    }
}

/// Bad configuration or arguments.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ConfigError(#[from] pub anyhow::Error);

/// Flags every command accepts. They override the configuration file.
#[derive(Debug, Default, Clone, Args)]
pub struct IndexArgs {
    /// Comma separated tasks to run, every task by default
    #[arg(long)]
    pub tasks: Option<String>,
    /// Lowest height of the range
    #[arg(long)]
    pub min_height: Option<ChainEpoch>,
    /// Highest height of the range, the chain head by default
    #[arg(long)]
    pub max_height: Option<ChainEpoch>,
    /// Reporter name recorded on processing and gap reports
    #[arg(long)]
    pub name: Option<String>,
    /// Time budget of one tipset, e.g. `30s`
    #[arg(long, value_parser = humantime::parse_duration)]
    pub window: Option<Duration>,
    /// Tipsets applied on top of a head before it is indexed
    #[arg(long)]
    pub confidence: Option<usize>,
}

impl IndexArgs {
    pub fn apply(&self, config: &mut Config) {
        let indexer = &mut config.indexer;
        if let Some(tasks) = &self.tasks {
            indexer.tasks = tasks
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(name) = &self.name {
            indexer.reporter.clone_from(name);
        }
        if let Some(window) = self.window {
            indexer.window = Some(window);
        }
        if let Some(confidence) = self.confidence {
            indexer.confidence = confidence;
        }
    }

    /// `[min, max]`, `max` defaulting to `head`.
    pub fn range(&self, head: ChainEpoch) -> Result<(ChainEpoch, ChainEpoch), ConfigError> {
        let min = self.min_height.unwrap_or(0);
        let max = self.max_height.unwrap_or(head);
        if min < 0 || min > max {
            return Err(ConfigError(anyhow::anyhow!(
                "invalid height range [{min}, {max}]"
            )));
        }
        Ok((min, max))
    }
}
