// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::*;
use crate::blocks::{BlockHeader, RawBlockHeader, TipSet};
use crate::shim::clock::ChainEpoch;
use ::cid::Cid;
use anyhow::Context as _;

/// A tipset as the node returns it. Block CIDs come from `Cids`, in block order.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TipSetLotusJson {
    cids: LotusJson<Vec<Cid>>,
    blocks: LotusJson<Vec<RawBlockHeader>>,
    height: ChainEpoch,
}

impl TipSetLotusJson {
    pub fn into_tipset(self) -> anyhow::Result<TipSet> {
        let cids = self.cids.into_inner();
        let blocks = self.blocks.into_inner();
        anyhow::ensure!(
            cids.len() == blocks.len(),
            "tipset at {} lists {} CIDs for {} blocks",
            self.height,
            cids.len(),
            blocks.len()
        );
        let headers = cids
            .into_iter()
            .zip(blocks)
            .map(|(cid, raw)| BlockHeader::with_cid(cid, raw))
            .collect();
        TipSet::new(headers).with_context(|| format!("malformed tipset at {}", self.height))
    }
}

impl From<&TipSet> for TipSetLotusJson {
    fn from(ts: &TipSet) -> Self {
        Self {
            cids: ts.key().cids().to_vec().into(),
            blocks: ts
                .block_headers()
                .iter()
                .map(|h| RawBlockHeader::clone(h))
                .collect::<Vec<_>>()
                .into(),
            height: ts.epoch(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::tipset_at;

    #[test]
    fn keeps_node_cids() {
        let ts = tipset_at(12);
        let json = serde_json::to_value(TipSetLotusJson::from(ts.as_ref())).unwrap();
        assert_eq!(json["Height"], json!(12));
        assert_eq!(json["Cids"][0]["/"], json!(ts.key().cids()[0].to_string()));

        let back: TipSetLotusJson = serde_json::from_value(json).unwrap();
        assert_eq!(back.into_tipset().unwrap(), *ts);
    }

    #[test]
    fn rejects_mismatched_cids() {
        let ts = tipset_at(3);
        let mut json = serde_json::to_value(TipSetLotusJson::from(ts.as_ref())).unwrap();
        json["Cids"] = json!(null);
        let back: TipSetLotusJson = serde_json::from_value(json).unwrap();
        assert!(back.into_tipset().is_err());
    }
}
