// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::*;
use crate::shim::{error::ExitCode, receipt::Receipt};
use ::cid::Cid;
use fvm_ipld_encoding::RawBytes;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReceiptLotusJson {
    exit_code: u32,
    #[serde(with = "base64_standard", default)]
    r#return: Vec<u8>,
    gas_used: u64,
    // Lotus still sends `"EventsRoot": null`
    #[serde(default)]
    events_root: LotusJson<Option<Cid>>,
}

impl HasLotusJson for Receipt {
    type LotusJson = ReceiptLotusJson;

    #[cfg(test)]
    fn snapshots() -> Vec<(serde_json::Value, Self)> {
        vec![
            (
                json!({
                    "ExitCode": 0,
                    "Return": "aGVsbG8gd29ybGQh",
                    "GasUsed": 0,
                    "EventsRoot": null,
                }),
                Receipt {
                    exit_code: ExitCode::new(0),
                    return_data: RawBytes::new(b"hello world!".to_vec()),
                    gas_used: 0,
                    events_root: None,
                },
            ),
            (
                json!({
                    "ExitCode": 16,
                    "Return": "",
                    "GasUsed": 42,
                    "EventsRoot": {"/": "baeaaaaa"},
                }),
                Receipt {
                    exit_code: ExitCode::new(16),
                    return_data: RawBytes::default(),
                    gas_used: 42,
                    events_root: Some(Cid::default()),
                },
            ),
        ]
    }

    fn into_lotus_json(self) -> Self::LotusJson {
        ReceiptLotusJson {
            exit_code: self.exit_code.value(),
            r#return: self.return_data.to_vec(),
            gas_used: self.gas_used,
            events_root: self.events_root.into(),
        }
    }

    fn from_lotus_json(lotus_json: Self::LotusJson) -> Self {
        Self {
            exit_code: ExitCode::new(lotus_json.exit_code),
            return_data: RawBytes::new(lotus_json.r#return),
            gas_used: lotus_json.gas_used,
            events_root: lotus_json.events_root.into_inner(),
        }
    }
}
