// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::*;
use crate::actors::Actor;
use crate::shim::{address::Address, econ::TokenAmount};
use ::cid::Cid;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActorLotusJson {
    code: LotusJson<Cid>,
    head: LotusJson<Cid>,
    nonce: u64,
    balance: LotusJson<TokenAmount>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    delegated_address: Option<LotusJson<Address>>,
}

impl HasLotusJson for Actor {
    type LotusJson = ActorLotusJson;

    #[cfg(test)]
    fn snapshots() -> Vec<(serde_json::Value, Self)> {
        vec![(
            json!({
                "Code": {"/": "baeaaaaa"},
                "Head": {"/": "baeaaaaa"},
                "Nonce": 1,
                "Balance": "1000",
            }),
            Actor {
                code: Cid::default(),
                head: Cid::default(),
                nonce: 1,
                balance: TokenAmount::from_atto(1000),
            },
        )]
    }

    fn into_lotus_json(self) -> Self::LotusJson {
        ActorLotusJson {
            code: self.code.into(),
            head: self.head.into(),
            nonce: self.nonce,
            balance: self.balance.into(),
            delegated_address: None,
        }
    }

    fn from_lotus_json(lotus_json: Self::LotusJson) -> Self {
        Self {
            code: lotus_json.code.into_inner(),
            head: lotus_json.head.into_inner(),
            nonce: lotus_json.nonce,
            balance: lotus_json.balance.into_inner(),
        }
    }
}
