// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use clap::Args;
use tracing::{info, warn};

use super::{IndexArgs, IndexerContext};
use crate::chain_follow::Watcher;
use crate::cli_shared::cli::Config;

#[derive(Debug, Args)]
pub struct WatchCommand {
    #[command(flatten)]
    pub args: IndexArgs,
}

impl WatchCommand {
    pub async fn run(self, mut config: Config) -> anyhow::Result<()> {
        if self.args.min_height.is_some() || self.args.max_height.is_some() {
            warn!("height range ignored while watching");
        }
        self.args.apply(&mut config);
        let ctx = IndexerContext::new(config).await?;
        let mut watcher = Watcher::new(
            ctx.ds.clone(),
            ctx.manager.clone(),
            ctx.config.indexer.confidence,
        );
        let watched: anyhow::Result<()> = tokio::select! {
            result = watcher.run() => result,
            result = tokio::signal::ctrl_c() => {
                info!("interrupted, finishing queued tipsets");
                result.map_err(Into::into)
            }
        };
        let stopped = ctx.manager.shutdown().await;
        ctx.finish().await?;
        watched.and(stopped)
    }
}
