// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Method names and response shapes of the node API.

use cid::Cid;
use serde::Deserialize;

use crate::actors::Actor;
use crate::chain::{ActorState, CirculatingSupply, ExecutionTrace, MinerPower};
use crate::lotus_json::{LotusJson, SignedMessageLotusJson, base64_standard};
use crate::shim::{
    address::Address, bigint::BigInt, econ::TokenAmount, error::ExitCode, message::Message,
    receipt::Receipt,
};

pub const CHAIN_HEAD: &str = "Filecoin.ChainHead";
pub const CHAIN_GET_TIPSET: &str = "Filecoin.ChainGetTipSet";
pub const CHAIN_GET_TIPSET_AFTER_HEIGHT: &str = "Filecoin.ChainGetTipSetAfterHeight";
pub const CHAIN_READ_OBJ: &str = "Filecoin.ChainReadObj";
pub const CHAIN_GET_BLOCK_MESSAGES: &str = "Filecoin.ChainGetBlockMessages";
pub const CHAIN_GET_PARENT_MESSAGES: &str = "Filecoin.ChainGetParentMessages";
pub const CHAIN_GET_PARENT_RECEIPTS: &str = "Filecoin.ChainGetParentReceipts";
pub const STATE_GET_ACTOR: &str = "Filecoin.StateGetActor";
pub const STATE_MINER_POWER: &str = "Filecoin.StateMinerPower";
pub const STATE_READ_STATE: &str = "Filecoin.StateReadState";
pub const STATE_CHANGED_ACTORS: &str = "Filecoin.StateChangedActors";
pub const STATE_NETWORK_VERSION: &str = "Filecoin.StateNetworkVersion";
pub const STATE_ACTOR_CODE_CIDS: &str = "Filecoin.StateActorCodeCIDs";
pub const STATE_COMPUTE: &str = "Filecoin.StateCompute";
pub const STATE_VM_CIRCULATING_SUPPLY_INTERNAL: &str = "Filecoin.StateVMCirculatingSupplyInternal";

/// A raw IPLD block.
#[derive(Deserialize)]
#[serde(transparent)]
pub struct RawObject(#[serde(with = "base64_standard")] pub Vec<u8>);

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BlockMessagesLotusJson {
    pub bls_messages: LotusJson<Vec<Message>>,
    #[serde(default)]
    pub secpk_messages: Option<Vec<SignedMessageLotusJson>>,
    /// BLS message CIDs first, then secp ones.
    pub cids: LotusJson<Vec<Cid>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParentMessageLotusJson {
    pub cid: LotusJson<Cid>,
    pub message: LotusJson<Message>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ClaimLotusJson {
    raw_byte_power: LotusJson<BigInt>,
    quality_adj_power: LotusJson<BigInt>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MinerPowerLotusJson {
    miner_power: ClaimLotusJson,
    total_power: ClaimLotusJson,
    has_min_power: bool,
}

impl From<MinerPowerLotusJson> for MinerPower {
    fn from(value: MinerPowerLotusJson) -> Self {
        Self {
            miner_raw_bytes: value.miner_power.raw_byte_power.into_inner(),
            miner_quality_adj: value.miner_power.quality_adj_power.into_inner(),
            total_raw_bytes: value.total_power.raw_byte_power.into_inner(),
            total_quality_adj: value.total_power.quality_adj_power.into_inner(),
            has_min_power: value.has_min_power,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActorStateLotusJson {
    balance: LotusJson<TokenAmount>,
    code: LotusJson<Cid>,
    #[serde(default)]
    state: serde_json::Value,
}

impl From<ActorStateLotusJson> for ActorState {
    fn from(value: ActorStateLotusJson) -> Self {
        Self {
            balance: value.balance.into_inner(),
            code: value.code.into_inner(),
            state: value.state,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CirculatingSupplyLotusJson {
    fil_vested: LotusJson<TokenAmount>,
    fil_mined: LotusJson<TokenAmount>,
    fil_burnt: LotusJson<TokenAmount>,
    fil_locked: LotusJson<TokenAmount>,
    fil_circulating: LotusJson<TokenAmount>,
    fil_reserve_disbursed: LotusJson<TokenAmount>,
}

impl From<CirculatingSupplyLotusJson> for CirculatingSupply {
    fn from(value: CirculatingSupplyLotusJson) -> Self {
        Self {
            fil_vested: value.fil_vested.into_inner(),
            fil_mined: value.fil_mined.into_inner(),
            fil_burnt: value.fil_burnt.into_inner(),
            fil_locked: value.fil_locked.into_inner(),
            fil_circulating: value.fil_circulating.into_inner(),
            fil_reserve_disbursed: value.fil_reserve_disbursed.into_inner(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ComputeStateOutputLotusJson {
    #[serde(default)]
    pub trace: Option<Vec<InvocResultLotusJson>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvocResultLotusJson {
    pub msg_cid: LotusJson<Cid>,
    pub msg: LotusJson<Message>,
    pub msg_rct: LotusJson<Option<Receipt>>,
    pub execution_trace: ExecutionTraceLotusJson,
    #[serde(default)]
    pub error: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MessageTraceLotusJson {
    from: LotusJson<Address>,
    to: LotusJson<Address>,
    #[serde(default)]
    value: LotusJson<TokenAmount>,
    method: u64,
    #[serde(with = "base64_standard", default)]
    params: Vec<u8>,
    #[serde(default)]
    params_codec: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReturnTraceLotusJson {
    exit_code: u32,
    #[serde(with = "base64_standard", default)]
    r#return: Vec<u8>,
    #[serde(default)]
    return_codec: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InvokedActorLotusJson {
    state: LotusJson<Actor>,
}

#[derive(Deserialize)]
struct GasTraceLotusJson {
    #[serde(rename = "tg")]
    total_gas: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecutionTraceLotusJson {
    msg: MessageTraceLotusJson,
    msg_rct: ReturnTraceLotusJson,
    #[serde(default)]
    invoked_actor: Option<InvokedActorLotusJson>,
    #[serde(default)]
    gas_charges: Option<Vec<GasTraceLotusJson>>,
    #[serde(default)]
    subcalls: Option<Vec<ExecutionTraceLotusJson>>,
}

impl From<ExecutionTraceLotusJson> for ExecutionTrace {
    fn from(value: ExecutionTraceLotusJson) -> Self {
        let ExecutionTraceLotusJson {
            msg,
            msg_rct,
            invoked_actor,
            gas_charges,
            subcalls,
        } = value;
        Self {
            from: msg.from.into_inner(),
            to: msg.to.into_inner(),
            value: msg.value.into_inner(),
            method: msg.method,
            params: msg.params,
            params_codec: msg.params_codec,
            exit_code: ExitCode::new(msg_rct.exit_code),
            return_data: msg_rct.r#return,
            return_codec: msg_rct.return_codec,
            gas_used: gas_charges
                .unwrap_or_default()
                .iter()
                .map(|charge| charge.total_gas)
                .sum(),
            to_actor_code: invoked_actor.map(|actor| actor.state.into_inner().code),
            subcalls: subcalls
                .unwrap_or_default()
                .into_iter()
                .map(Into::into)
                .collect(),
        }
    }
}
