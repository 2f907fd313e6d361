// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::ops::Deref;

use super::TipSetKey;
use crate::shim::{
    address::Address,
    bigint::{BigInt, bigint_ser},
    clock::ChainEpoch,
    econ::TokenAmount,
};
use crate::utils::encoding::cbor_cid;
use cid::Cid;
use fvm_ipld_encoding::tuple::*;

/// A drand beacon entry carried by a block.
#[derive(Deserialize_tuple, Serialize_tuple, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct BeaconEntry {
    pub round: u64,
    #[serde(with = "fvm_ipld_encoding::strict_bytes")]
    pub signature: Vec<u8>,
}

/// The subset of a Filecoin block header the indexer reads.
#[derive(Deserialize_tuple, Serialize_tuple, Clone, Hash, Eq, PartialEq, Debug)]
pub struct RawBlockHeader {
    /// The address of the miner actor that mined this block
    pub miner_address: Address,
    /// The verifiable oracle randomness used to elect this block's author leader
    pub beacon_entries: Vec<BeaconEntry>,
    /// The set of parents this block was based on.
    pub parents: TipSetKey,
    /// The aggregate chain weight of the parent set
    #[serde(with = "bigint_ser")]
    pub weight: BigInt,
    pub epoch: ChainEpoch,
    /// The CID of the parent state root after calculating parent tipset.
    pub state_root: Cid,
    /// The CID of the root of an array of `MessageReceipts`
    pub message_receipts: Cid,
    /// The CID of the Merkle links for `bls_messages` and `secp_messages`
    pub messages: Cid,
    /// Block creation time, in seconds since the Unix epoch
    pub timestamp: u64,
    pub win_count: i64,
    pub fork_signal: u64,
    /// The base fee of the parent block
    pub parent_base_fee: TokenAmount,
}

impl Default for RawBlockHeader {
    fn default() -> Self {
        Self {
            miner_address: Address::new_id(0),
            beacon_entries: Default::default(),
            parents: Default::default(),
            weight: Default::default(),
            epoch: Default::default(),
            state_root: Default::default(),
            message_receipts: Default::default(),
            messages: Default::default(),
            timestamp: Default::default(),
            win_count: 1,
            fork_signal: Default::default(),
            parent_base_fee: Default::default(),
        }
    }
}

/// A [`RawBlockHeader`] paired with the CID the chain knows it by.
///
/// Headers fetched from a node keep the node's CID; headers built locally
/// derive it from their own CBOR encoding.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockHeader {
    cid: Cid,
    header: RawBlockHeader,
}

impl Deref for BlockHeader {
    type Target = RawBlockHeader;

    fn deref(&self) -> &Self::Target {
        &self.header
    }
}

impl BlockHeader {
    pub fn new(header: RawBlockHeader) -> anyhow::Result<Self> {
        let cid = cbor_cid(&fvm_ipld_encoding::to_vec(&header)?);
        Ok(Self { cid, header })
    }

    pub fn with_cid(cid: Cid, header: RawBlockHeader) -> Self {
        Self { cid, header }
    }

    pub fn cid(&self) -> &Cid {
        &self.cid
    }

    pub fn into_raw(self) -> RawBlockHeader {
        self.header
    }
}
