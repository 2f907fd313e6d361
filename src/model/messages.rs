// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::tuple::*;

use super::model;

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub height: i64,
    pub cid: String,
    pub from: String,
    pub to: String,
    pub value: String,
    pub gas_fee_cap: String,
    pub gas_premium: String,
    pub gas_limit: u64,
    pub size_bytes: u64,
    pub nonce: u64,
    pub method: u64,
    /// Base64 encoded parameters.
    pub params: String,
}

model!(
    Message,
    version = 1,
    kind = Tipset,
    table = "messages",
    key = ["height", "cid"],
    columns = [
        height,
        cid,
        from,
        to,
        value,
        gas_fee_cap,
        gas_premium,
        gas_limit,
        size_bytes,
        nonce,
        method,
        params,
    ]
);

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug, PartialEq, Eq)]
pub struct BlockMessage {
    pub height: i64,
    pub block: String,
    pub message: String,
}

model!(
    BlockMessage,
    version = 1,
    kind = Tipset,
    table = "block_messages",
    key = ["height", "block", "message"],
    columns = [height, block, message]
);

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub height: i64,
    pub message: String,
    pub state_root: String,
    pub idx: u64,
    pub exit_code: u32,
    pub gas_used: u64,
}

model!(
    Receipt,
    version = 1,
    kind = Tipset,
    table = "receipts",
    key = ["height", "message", "state_root"],
    columns = [height, message, state_root, idx, exit_code, gas_used]
);

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug, PartialEq, Eq)]
pub struct DerivedGasOutputs {
    pub height: i64,
    pub cid: String,
    pub state_root: String,
    pub from: String,
    pub to: String,
    pub value: String,
    pub gas_fee_cap: String,
    pub gas_premium: String,
    pub gas_limit: u64,
    pub size_bytes: u64,
    pub nonce: u64,
    pub method: u64,
    pub actor_name: String,
    pub exit_code: u32,
    pub gas_used: u64,
    pub parent_base_fee: String,
    pub base_fee_burn: String,
    pub over_estimation_burn: String,
    pub miner_penalty: String,
    pub miner_tip: String,
    pub refund: String,
    pub gas_refund: u64,
    pub gas_burned: u64,
}

model!(
    DerivedGasOutputs,
    version = 1,
    kind = Tipset,
    table = "derived_gas_outputs",
    key = ["height", "cid", "state_root"],
    columns = [
        height,
        cid,
        state_root,
        from,
        to,
        value,
        gas_fee_cap,
        gas_premium,
        gas_limit,
        size_bytes,
        nonce,
        method,
        actor_name,
        exit_code,
        gas_used,
        parent_base_fee,
        base_fee_burn,
        over_estimation_burn,
        miner_penalty,
        miner_tip,
        refund,
        gas_refund,
        gas_burned,
    ]
);

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug, PartialEq, Eq)]
pub struct MessageGasEconomy {
    pub height: i64,
    pub state_root: String,
    pub base_fee: String,
    pub gas_limit_total: u64,
    pub gas_limit_unique_total: u64,
    pub gas_fill_ratio: String,
    pub gas_capacity_ratio: String,
    pub gas_waste_ratio: String,
}

model!(
    MessageGasEconomy,
    version = 1,
    kind = Tipset,
    table = "message_gas_economy",
    key = ["height", "state_root"],
    columns = [
        height,
        state_root,
        base_fee,
        gas_limit_total,
        gas_limit_unique_total,
        gas_fill_ratio,
        gas_capacity_ratio,
        gas_waste_ratio,
    ]
);

/// A call made while executing a message, excluding the top level call.
#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug, PartialEq, Eq)]
pub struct VmMessage {
    pub height: i64,
    pub state_root: String,
    pub source: String,
    /// Position of the call in a depth first walk of the trace.
    pub index: u64,
    pub from: String,
    pub to: String,
    pub value: String,
    pub method: u64,
    pub actor_code: Option<String>,
    pub exit_code: u32,
    pub gas_used: u64,
    pub params: String,
    pub returns: String,
    pub implicit: bool,
}

model!(
    VmMessage,
    version = 1,
    kind = Tipset,
    table = "vm_messages",
    key = ["height", "state_root", "source", "index"],
    columns = [
        height,
        state_root,
        source,
        index,
        from,
        to,
        value,
        method,
        actor_code,
        exit_code,
        gas_used,
        params,
        returns,
        implicit,
    ]
);
