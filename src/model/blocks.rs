// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::tuple::*;

use super::model;

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub height: i64,
    pub cid: String,
    pub miner: String,
    pub parent_weight: String,
    pub parent_state_root: String,
    pub parent_base_fee: String,
    pub timestamp: u64,
    pub win_count: i64,
    pub fork_signaling: u64,
}

model!(
    BlockHeader,
    version = 1,
    kind = Tipset,
    table = "block_headers",
    key = ["height", "cid"],
    columns = [
        height,
        cid,
        miner,
        parent_weight,
        parent_state_root,
        parent_base_fee,
        timestamp,
        win_count,
        fork_signaling,
    ]
);

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug, PartialEq, Eq)]
pub struct BlockParent {
    pub height: i64,
    pub block: String,
    pub parent: String,
}

model!(
    BlockParent,
    version = 1,
    kind = Tipset,
    table = "block_parents",
    key = ["height", "block", "parent"],
    columns = [height, block, parent]
);

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug, PartialEq, Eq)]
pub struct DrandBlockEntry {
    pub round: u64,
    pub block: String,
}

model!(
    DrandBlockEntry,
    version = 1,
    kind = Tipset,
    table = "drand_block_entries",
    key = ["round", "block"],
    columns = [round, block]
);
