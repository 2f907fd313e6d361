// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use ahash::{HashSet, HashSetExt as _};
use async_trait::async_trait;

use super::{Extracted, TipSetPairExtractor, atto};
use crate::blocks::TipSet;
use crate::datasource::DataSource;
use crate::gas::{BLOCK_GAS_LIMIT, BLOCK_GAS_TARGET};
use crate::model::chain::ChainEconomics;
use crate::model::messages::MessageGasEconomy;

/// Circulating supply breakdown at the parent state of a tipset.
pub struct ChainEconomicsExtractor;

#[async_trait]
impl TipSetPairExtractor for ChainEconomicsExtractor {
    async fn extract(
        &self,
        ds: &DataSource,
        current: &TipSet,
        _executed: &TipSet,
    ) -> anyhow::Result<Extracted> {
        let supply = ds.circulating_supply(current).await?;
        let mut out = Extracted::default();
        out.push(ChainEconomics {
            height: current.epoch(),
            parent_state_root: current.parent_state_root().to_string(),
            circulating_fil: atto(&supply.fil_circulating),
            vested_fil: atto(&supply.fil_vested),
            mined_fil: atto(&supply.fil_mined),
            burnt_fil: atto(&supply.fil_burnt),
            locked_fil: atto(&supply.fil_locked),
            fil_reserve_disbursed: atto(&supply.fil_reserve_disbursed),
        });
        Ok(out)
    }
}

/// How full the blocks of the executed tipset were.
pub struct MessageGasEconomyExtractor;

fn ratio(num: u64, denom: u64) -> String {
    if denom == 0 {
        return format!("{:.6}", 0.0);
    }
    format!("{:.6}", num as f64 / denom as f64)
}

#[async_trait]
impl TipSetPairExtractor for MessageGasEconomyExtractor {
    async fn extract(
        &self,
        ds: &DataSource,
        current: &TipSet,
        executed: &TipSet,
    ) -> anyhow::Result<Extracted> {
        let messages = ds.executed_and_block_messages(current, executed).await?;
        let mut seen = HashSet::new();
        let (mut total, mut unique) = (0u64, 0u64);
        for msg in messages.block.iter().flat_map(|block| block.messages()) {
            total += msg.message.gas_limit;
            if seen.insert(msg.cid) {
                unique += msg.message.gas_limit;
            }
        }
        let blocks = executed.len() as u64;
        let mut out = Extracted::default();
        out.push(MessageGasEconomy {
            height: executed.epoch(),
            state_root: executed.parent_state_root().to_string(),
            base_fee: atto(executed.parent_base_fee()),
            gas_limit_total: total,
            gas_limit_unique_total: unique,
            gas_fill_ratio: ratio(unique, blocks * BLOCK_GAS_LIMIT),
            gas_capacity_ratio: ratio(unique, blocks * BLOCK_GAS_TARGET),
            gas_waste_ratio: ratio(total - unique, blocks * BLOCK_GAS_LIMIT),
        });
        Ok(out)
    }
}
