// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::tuple::*;

use super::model;

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug, PartialEq, Eq)]
pub struct ChainEconomics {
    pub height: i64,
    pub parent_state_root: String,
    pub circulating_fil: String,
    pub vested_fil: String,
    pub mined_fil: String,
    pub burnt_fil: String,
    pub locked_fil: String,
    pub fil_reserve_disbursed: String,
}

model!(
    ChainEconomics,
    version = 1,
    kind = Tipset,
    table = "chain_economics",
    key = ["height", "parent_state_root"],
    columns = [
        height,
        parent_state_root,
        circulating_fil,
        vested_fil,
        mined_fil,
        burnt_fil,
        locked_fil,
        fil_reserve_disbursed,
    ]
);

/// Consensus outcome at a height. Null rounds have no tipset.
#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug, PartialEq, Eq)]
pub struct ChainConsensus {
    pub height: i64,
    pub parent_state_root: String,
    pub parent_tipset: String,
    pub tipset: Option<String>,
}

model!(
    ChainConsensus,
    version = 1,
    kind = Tipset,
    table = "chain_consensus",
    key = ["height"],
    columns = [height, parent_state_root, parent_tipset, tipset]
);
