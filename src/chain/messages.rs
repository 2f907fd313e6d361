// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;

use crate::shim::{
    address::Address,
    bigint::BigInt,
    econ::TokenAmount,
    error::ExitCode,
    message::{Message, MethodNum},
    receipt::Receipt,
};

/// A message as included in a block.
#[derive(Clone, Debug, PartialEq)]
pub struct ChainMessage {
    /// CID of the signed message for secp messages, of the unsigned one otherwise.
    pub cid: Cid,
    pub message: Message,
    /// Size of the encoded (signed) message.
    pub size_bytes: usize,
}

/// The messages a single block includes.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockMessages {
    pub block: Cid,
    pub miner: Address,
    pub bls_messages: Vec<ChainMessage>,
    pub secp_messages: Vec<ChainMessage>,
}

impl BlockMessages {
    /// BLS messages first, then secp messages, in block order.
    pub fn messages(&self) -> impl Iterator<Item = &ChainMessage> {
        self.bls_messages.iter().chain(self.secp_messages.iter())
    }

    pub fn len(&self) -> usize {
        self.bls_messages.len() + self.secp_messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A message executed as part of a tipset, with the receipt its child commits to.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutedMessage {
    pub cid: Cid,
    pub message: Message,
    pub size_bytes: usize,
    pub receipt: Receipt,
    /// Position in execution order.
    pub index: u64,
    /// Blocks of the executed tipset that include the message.
    pub blocks: Vec<Cid>,
    pub from_actor_code: Option<Cid>,
    pub to_actor_code: Option<Cid>,
}

/// Executed messages of a tipset plus the per-block inclusion lists.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TipSetMessages {
    pub executed: Vec<ExecutedMessage>,
    pub block: Vec<BlockMessages>,
}

/// A message and the receipt of its execution.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageReceipt {
    pub message: ChainMessage,
    pub receipt: Receipt,
    pub index: u64,
}

/// Receipts of the messages one block contributed to execution.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockMessageReceipts {
    pub block: Cid,
    pub receipts: Vec<MessageReceipt>,
}

/// One call in a VM execution trace.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionTrace {
    pub from: Address,
    pub to: Address,
    pub value: TokenAmount,
    pub method: MethodNum,
    pub params: Vec<u8>,
    pub params_codec: u64,
    pub exit_code: ExitCode,
    pub return_data: Vec<u8>,
    pub return_codec: u64,
    pub gas_used: u64,
    pub to_actor_code: Option<Cid>,
    pub subcalls: Vec<ExecutionTrace>,
}

/// A message the VM executed, including implicit cron and reward messages.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageExecution {
    pub cid: Cid,
    /// Not included in any block.
    pub implicit: bool,
    pub message: Message,
    pub receipt: Receipt,
    pub from_actor_code: Option<Cid>,
    pub to_actor_code: Option<Cid>,
    pub trace: ExecutionTrace,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MinerPower {
    pub miner_raw_bytes: BigInt,
    pub miner_quality_adj: BigInt,
    pub total_raw_bytes: BigInt,
    pub total_quality_adj: BigInt,
    pub has_min_power: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CirculatingSupply {
    pub fil_vested: TokenAmount,
    pub fil_mined: TokenAmount,
    pub fil_burnt: TokenAmount,
    pub fil_locked: TokenAmount,
    pub fil_circulating: TokenAmount,
    pub fil_reserve_disbursed: TokenAmount,
}

/// Decoded actor state, as the node renders it.
#[derive(Clone, Debug, PartialEq)]
pub struct ActorState {
    pub balance: TokenAmount,
    pub code: Cid,
    pub state: serde_json::Value,
}
