// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use async_trait::async_trait;

use super::{Extracted, TipSetExtractor, atto};
use crate::blocks::TipSet;
use crate::datasource::DataSource;
use crate::model::blocks::{BlockHeader, BlockParent, DrandBlockEntry};

pub struct BlockHeaderExtractor;

#[async_trait]
impl TipSetExtractor for BlockHeaderExtractor {
    async fn extract(&self, _ds: &DataSource, current: &TipSet) -> anyhow::Result<Extracted> {
        let mut out = Extracted::default();
        for header in current.block_headers() {
            out.push(BlockHeader {
                height: header.epoch,
                cid: header.cid().to_string(),
                miner: header.miner_address.to_string(),
                parent_weight: header.weight.to_string(),
                parent_state_root: header.state_root.to_string(),
                parent_base_fee: atto(&header.parent_base_fee),
                timestamp: header.timestamp,
                win_count: header.win_count,
                fork_signaling: header.fork_signal,
            });
        }
        Ok(out)
    }
}

pub struct BlockParentsExtractor;

#[async_trait]
impl TipSetExtractor for BlockParentsExtractor {
    async fn extract(&self, _ds: &DataSource, current: &TipSet) -> anyhow::Result<Extracted> {
        let mut out = Extracted::default();
        for header in current.block_headers() {
            for parent in header.parents.cids() {
                out.push(BlockParent {
                    height: header.epoch,
                    block: header.cid().to_string(),
                    parent: parent.to_string(),
                });
            }
        }
        Ok(out)
    }
}

pub struct DrandBlockEntriesExtractor;

#[async_trait]
impl TipSetExtractor for DrandBlockEntriesExtractor {
    async fn extract(&self, _ds: &DataSource, current: &TipSet) -> anyhow::Result<Extracted> {
        let mut out = Extracted::default();
        for header in current.block_headers() {
            for entry in &header.beacon_entries {
                out.push(DrandBlockEntry {
                    round: entry.round,
                    block: header.cid().to_string(),
                });
            }
        }
        Ok(out)
    }
}
