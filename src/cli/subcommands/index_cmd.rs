// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use clap::Args;
use tracing::{info, warn};

use super::{ConfigError, IndexArgs, IndexerContext};
use crate::cli_shared::cli::Config;
use crate::shim::clock::ChainEpoch;

#[derive(Debug, Args)]
pub struct IndexTipSetCommand {
    /// Height of the tipset
    pub height: ChainEpoch,
    #[command(flatten)]
    pub args: IndexArgs,
}

impl IndexTipSetCommand {
    pub async fn run(self, mut config: Config) -> anyhow::Result<()> {
        self.args.apply(&mut config);
        let ctx = IndexerContext::new(config).await?;
        let head = ctx.ds.chain_head().await?;
        if self.height < 0 || self.height > head.epoch() {
            return Err(ConfigError(anyhow::anyhow!(
                "height {} is not in [0, {}]",
                self.height,
                head.epoch()
            ))
            .into());
        }
        let ts = ctx.ds.tipset_by_height(self.height, head.key()).await?;
        if ts.epoch() != self.height {
            info!("height {} is a null round", self.height);
            return Ok(());
        }
        if ctx.manager.index(ts).await? {
            info!("indexed height {}", self.height);
        } else {
            warn!("indexed height {} with failed tasks", self.height);
        }
        ctx.finish().await
    }
}
