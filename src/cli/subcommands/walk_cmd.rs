// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use clap::Args;

use super::{IndexArgs, IndexerContext};
use crate::chain_follow::Walker;
use crate::cli_shared::cli::Config;

#[derive(Debug, Args)]
pub struct WalkCommand {
    #[command(flatten)]
    pub args: IndexArgs,
}

impl WalkCommand {
    pub async fn run(self, mut config: Config) -> anyhow::Result<()> {
        self.args.apply(&mut config);
        let ctx = IndexerContext::new(config).await?;
        let head = ctx.ds.chain_head().await?;
        let (min, max) = self.args.range(head.epoch())?;
        let walked = Walker::new(ctx.ds.clone(), ctx.manager.clone(), min, max)
            .run()
            .await;
        let stopped = ctx.manager.shutdown().await;
        ctx.finish().await?;
        walked.and(stopped)
    }
}
