// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::*;
use crate::shim::{address::Address, econ::TokenAmount, message::Message};
use fvm_ipld_encoding::RawBytes;

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageLotusJson {
    #[serde(default)]
    version: u64,
    to: LotusJson<Address>,
    from: LotusJson<Address>,
    #[serde(default)]
    nonce: u64,
    #[serde(default)]
    value: LotusJson<TokenAmount>,
    #[serde(default)]
    gas_limit: u64,
    #[serde(default)]
    gas_fee_cap: LotusJson<TokenAmount>,
    #[serde(default)]
    gas_premium: LotusJson<TokenAmount>,
    #[serde(default)]
    method: u64,
    #[serde(with = "base64_standard", default)]
    params: Vec<u8>,
}

impl HasLotusJson for Message {
    type LotusJson = MessageLotusJson;

    #[cfg(test)]
    fn snapshots() -> Vec<(serde_json::Value, Self)> {
        vec![(
            json!({
                "Version": 0,
                "To": "f01",
                "From": "f0100",
                "Nonce": 3,
                "Value": "5",
                "GasLimit": 10,
                "GasFeeCap": "2",
                "GasPremium": "1",
                "Method": 2,
                "Params": "AQI=",
            }),
            Message {
                to: Address::new_id(1),
                from: Address::new_id(100),
                sequence: 3,
                value: TokenAmount::from_atto(5),
                gas_limit: 10,
                gas_fee_cap: TokenAmount::from_atto(2),
                gas_premium: TokenAmount::from_atto(1),
                method_num: 2,
                params: RawBytes::new(vec![1, 2]),
                ..Default::default()
            },
        )]
    }

    fn into_lotus_json(self) -> Self::LotusJson {
        let Self {
            version,
            to,
            from,
            sequence,
            value,
            gas_limit,
            gas_fee_cap,
            gas_premium,
            method_num,
            params,
        } = self;
        MessageLotusJson {
            version,
            to: to.into(),
            from: from.into(),
            nonce: sequence,
            value: value.into(),
            gas_limit,
            gas_fee_cap: gas_fee_cap.into(),
            gas_premium: gas_premium.into(),
            method: method_num,
            params: params.to_vec(),
        }
    }

    fn from_lotus_json(lotus_json: Self::LotusJson) -> Self {
        let MessageLotusJson {
            version,
            to,
            from,
            nonce,
            value,
            gas_limit,
            gas_fee_cap,
            gas_premium,
            method,
            params,
        } = lotus_json;
        Self {
            version,
            to: to.into_inner(),
            from: from.into_inner(),
            sequence: nonce,
            value: value.into_inner(),
            gas_limit,
            gas_fee_cap: gas_fee_cap.into_inner(),
            gas_premium: gas_premium.into_inner(),
            method_num: method,
            params: RawBytes::new(params),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SignatureLotusJson {
    r#type: u8,
    #[serde(with = "base64_standard", default)]
    data: Vec<u8>,
}

/// A secp message with its signature.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SignedMessageLotusJson {
    message: LotusJson<Message>,
    signature: SignatureLotusJson,
}

impl SignedMessageLotusJson {
    pub fn message(&self) -> &Message {
        &self.message.0
    }

    /// Length of the on-chain encoding of the signed message.
    pub fn encoded_len(&self) -> anyhow::Result<usize> {
        let mut signature = Vec::with_capacity(self.signature.data.len() + 1);
        signature.push(self.signature.r#type);
        signature.extend_from_slice(&self.signature.data);
        Ok(fvm_ipld_encoding::to_vec(&(
            &self.message.0,
            fvm_ipld_encoding::BytesSer(&signature),
        ))?
        .len())
    }

    pub fn into_message(self) -> Message {
        self.message.into_inner()
    }
}
