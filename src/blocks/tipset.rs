// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::fmt;

use super::{BlockHeader, Error};
use crate::shim::{bigint::BigInt, clock::ChainEpoch, econ::TokenAmount};
use cid::Cid;
use itertools::Itertools as _;
use serde::{Deserialize, Serialize};

/// A set of CIDs forming a unique key for a tipset.
///
/// The empty key is used to request the chain head.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TipSetKey(Vec<Cid>);

impl TipSetKey {
    pub const EMPTY: TipSetKey = TipSetKey(Vec::new());

    pub fn new(cids: Vec<Cid>) -> Self {
        Self(cids)
    }

    pub fn cids(&self) -> &[Cid] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<Cid>> for TipSetKey {
    fn from(cids: Vec<Cid>) -> Self {
        Self(cids)
    }
}

impl fmt::Display for TipSetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.0.iter().join(","))
    }
}

/// An immutable set of blocks at the same height with the same parent set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TipSet {
    headers: Vec<BlockHeader>,
    key: TipSetKey,
}

impl TipSet {
    /// Builds a tipset from its blocks, in the order the chain lists them.
    pub fn new(headers: Vec<BlockHeader>) -> Result<Self, Error> {
        let first = headers.first().ok_or(Error::NoBlocks)?;
        for header in headers.iter().skip(1) {
            if header.epoch != first.epoch {
                return Err(Error::InvalidTipset(format!(
                    "block {} has epoch {}, expected {}",
                    header.cid(),
                    header.epoch,
                    first.epoch
                )));
            }
            if header.parents != first.parents {
                return Err(Error::InvalidTipset(format!(
                    "block {} has parents {}, expected {}",
                    header.cid(),
                    header.parents,
                    first.parents
                )));
            }
            if header.state_root != first.state_root {
                return Err(Error::InvalidTipset(format!(
                    "block {} has parent state root {}, expected {}",
                    header.cid(),
                    header.state_root,
                    first.state_root
                )));
            }
        }
        if !headers.iter().map(BlockHeader::cid).all_unique() {
            return Err(Error::InvalidTipset("duplicate block".into()));
        }
        let key = TipSetKey(headers.iter().map(|h| *h.cid()).collect());
        Ok(Self { headers, key })
    }

    fn first(&self) -> &BlockHeader {
        // non-empty by construction
        &self.headers[0]
    }

    pub fn epoch(&self) -> ChainEpoch {
        self.first().epoch
    }

    pub fn key(&self) -> &TipSetKey {
        &self.key
    }

    pub fn block_headers(&self) -> &[BlockHeader] {
        &self.headers
    }

    pub fn parents(&self) -> &TipSetKey {
        &self.first().parents
    }

    pub fn parent_state_root(&self) -> &Cid {
        &self.first().state_root
    }

    pub fn parent_message_receipts(&self) -> &Cid {
        &self.first().message_receipts
    }

    pub fn parent_base_fee(&self) -> &TokenAmount {
        &self.first().parent_base_fee
    }

    pub fn weight(&self) -> &BigInt {
        &self.first().weight
    }

    pub fn min_timestamp(&self) -> u64 {
        self.headers
            .iter()
            .map(|h| h.timestamp)
            .min()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::RawBlockHeader;
    use crate::shim::address::Address;
    use crate::utils::encoding::cbor_cid;

    fn header(miner: u64, epoch: ChainEpoch, parents: &TipSetKey) -> BlockHeader {
        BlockHeader::new(RawBlockHeader {
            miner_address: Address::new_id(miner),
            epoch,
            parents: parents.clone(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn empty_tipset_is_rejected() {
        assert_eq!(TipSet::new(vec![]), Err(Error::NoBlocks));
    }

    #[test]
    fn mixed_epochs_are_rejected() {
        let parents = TipSetKey::new(vec![cbor_cid(b"p")]);
        let result = TipSet::new(vec![header(1, 10, &parents), header(2, 11, &parents)]);
        assert!(matches!(result, Err(Error::InvalidTipset(_))));
    }

    #[test]
    fn mixed_parents_are_rejected() {
        let a = TipSetKey::new(vec![cbor_cid(b"a")]);
        let b = TipSetKey::new(vec![cbor_cid(b"b")]);
        let result = TipSet::new(vec![header(1, 10, &a), header(2, 10, &b)]);
        assert!(matches!(result, Err(Error::InvalidTipset(_))));
    }

    #[test]
    fn key_follows_block_order() {
        let parents = TipSetKey::new(vec![cbor_cid(b"p")]);
        let blocks = vec![header(1, 10, &parents), header(2, 10, &parents)];
        let cids: Vec<Cid> = blocks.iter().map(|b| *b.cid()).collect();
        let ts = TipSet::new(blocks).unwrap();
        assert_eq!(ts.key().cids(), cids.as_slice());
        assert_eq!(ts.epoch(), 10);
        assert_eq!(ts.parents(), &parents);
        assert_eq!(ts.len(), 2);
    }

    #[test]
    fn key_display() {
        let a = cbor_cid(b"a");
        let b = cbor_cid(b"b");
        assert_eq!(TipSetKey::EMPTY.to_string(), "{}");
        assert_eq!(TipSetKey::new(vec![a, b]).to_string(), format!("{{{a},{b}}}"));
    }
}
