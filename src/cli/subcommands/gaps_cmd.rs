// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use clap::Args;
use itertools::Itertools as _;
use tracing::{info, warn};

use super::{IndexArgs, IndexerContext};
use crate::cli_shared::cli::Config;
use crate::gaps::{GapFiller, GapFinder};

#[derive(Debug, Args)]
pub struct FindGapsCommand {
    #[command(flatten)]
    pub args: IndexArgs,
}

impl FindGapsCommand {
    pub async fn run(self, mut config: Config) -> anyhow::Result<()> {
        self.args.apply(&mut config);
        let ctx = IndexerContext::new(config).await?;
        let head = ctx.ds.chain_head().await?;
        let (min, max) = self.args.range(head.epoch())?;
        let found = GapFinder::new(
            ctx.ds.clone(),
            ctx.stores.reports.clone(),
            ctx.tasks.clone(),
            ctx.config.indexer.reporter.clone(),
            min,
            max,
        )
        .find()
        .await?;
        let heights = found.gaps.iter().map(|gap| gap.height).dedup().count();
        info!(
            "recorded {} gaps at {heights} heights, {} new null rounds",
            found.gaps.len(),
            found.null_rounds.len()
        );
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct FillGapsCommand {
    #[command(flatten)]
    pub args: IndexArgs,
}

impl FillGapsCommand {
    pub async fn run(self, mut config: Config) -> anyhow::Result<()> {
        self.args.apply(&mut config);
        let ctx = IndexerContext::new(config).await?;
        let head = ctx.ds.chain_head().await?;
        let (min, max) = self.args.range(head.epoch())?;
        let summary = GapFiller::new(ctx.manager.clone(), ctx.stores.reports.clone(), min, max)
            .run()
            .await?;
        info!("filled gaps at {} heights", summary.filled.len());
        if !summary.incomplete.is_empty() {
            warn!("gaps remain at heights {:?}", summary.incomplete);
        }
        if !summary.failed.is_empty() {
            warn!("filling failed at heights {:?}", summary.failed);
        }
        ctx.finish().await
    }
}
