// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use async_trait::async_trait;

use super::{Extracted, TipSetPairExtractor};
use crate::blocks::TipSet;
use crate::datasource::DataSource;
use crate::model::chain::ChainConsensus;

/// One record per height between `executed` and `current`. Heights without a
/// tipset are null rounds and share the parent of `current`.
pub struct ConsensusExtractor;

#[async_trait]
impl TipSetPairExtractor for ConsensusExtractor {
    async fn extract(
        &self,
        _ds: &DataSource,
        current: &TipSet,
        executed: &TipSet,
    ) -> anyhow::Result<Extracted> {
        let parent_state_root = current.parent_state_root().to_string();
        let parent_tipset = executed.key().to_string();
        let mut out = Extracted::default();
        for height in executed.epoch() + 1..=current.epoch() {
            out.push(ChainConsensus {
                height,
                parent_state_root: parent_state_root.clone(),
                parent_tipset: parent_tipset.clone(),
                tipset: (height == current.epoch()).then(|| current.key().to_string()),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeChain;
    use std::sync::Arc;

    #[tokio::test]
    async fn null_rounds_have_no_tipset() {
        let chain = FakeChain::linear([3, 6]);
        let (current, executed) = (chain.tipset_at(6), chain.tipset_at(3));
        let ds = DataSource::new(Arc::new(chain)).unwrap();
        let out = ConsensusExtractor
            .extract(&ds, &current, &executed)
            .await
            .unwrap();
        let rows: Vec<ChainConsensus> = out
            .models
            .iter()
            .map(|m| (**m).downcast_ref::<ChainConsensus>().unwrap().clone())
            .collect();
        assert_eq!(
            rows.iter().map(|r| r.height).collect::<Vec<_>>(),
            vec![4, 5, 6]
        );
        assert_eq!(rows[0].tipset, None);
        assert_eq!(rows[1].tipset, None);
        assert_eq!(rows[2].tipset, Some(current.key().to_string()));
        assert!(rows.iter().all(|r| r.parent_tipset == executed.key().to_string()));
    }
}
