// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_ipld_encoding::{RawBytes, tuple::*};

use crate::shim::{address::Address, econ::TokenAmount};
use crate::utils::encoding::cbor_cid;

/// Method number indicator for calling actor methods.
pub type MethodNum = u64;

pub const METHOD_SEND: MethodNum = 0;

/// An unsigned message, in its on-chain tuple encoding.
#[derive(Clone, PartialEq, Eq, Debug, Hash, Serialize_tuple, Deserialize_tuple)]
pub struct Message {
    pub version: u64,
    pub to: Address,
    pub from: Address,
    pub sequence: u64,
    pub value: TokenAmount,
    pub gas_limit: u64,
    pub gas_fee_cap: TokenAmount,
    pub gas_premium: TokenAmount,
    pub method_num: MethodNum,
    pub params: RawBytes,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            version: 0,
            to: Address::new_id(0),
            from: Address::new_id(0),
            sequence: 0,
            value: TokenAmount::default(),
            gas_limit: 0,
            gas_fee_cap: TokenAmount::default(),
            gas_premium: TokenAmount::default(),
            method_num: METHOD_SEND,
            params: RawBytes::default(),
        }
    }
}

impl Message {
    /// CID of the DAG-CBOR encoding of the message.
    pub fn cid(&self) -> anyhow::Result<Cid> {
        Ok(cbor_cid(&fvm_ipld_encoding::to_vec(self)?))
    }
}
