// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::*;
use crate::blocks::{BeaconEntry, RawBlockHeader, TipSetKey};
use crate::shim::{address::Address, bigint::BigInt, clock::ChainEpoch, econ::TokenAmount};
use ::cid::Cid;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BeaconEntryLotusJson {
    round: u64,
    #[serde(with = "base64_standard", default)]
    data: Vec<u8>,
}

impl HasLotusJson for BeaconEntry {
    type LotusJson = BeaconEntryLotusJson;

    #[cfg(test)]
    fn snapshots() -> Vec<(serde_json::Value, Self)> {
        vec![(
            json!({"Round": 7, "Data": "AQI="}),
            BeaconEntry {
                round: 7,
                signature: vec![1, 2],
            },
        )]
    }

    fn into_lotus_json(self) -> Self::LotusJson {
        BeaconEntryLotusJson {
            round: self.round,
            data: self.signature,
        }
    }

    fn from_lotus_json(BeaconEntryLotusJson { round, data }: Self::LotusJson) -> Self {
        Self {
            round,
            signature: data,
        }
    }
}

/// Only the win count is kept from the election proof.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ElectionProofLotusJson {
    win_count: i64,
    #[serde(rename = "VRFProof", with = "base64_standard", default)]
    vrf_proof: Vec<u8>,
}

/// The fields of a Lotus block header the indexer reads. Tickets, proofs
/// and signatures are dropped.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BlockHeaderLotusJson {
    miner: LotusJson<Address>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    election_proof: Option<ElectionProofLotusJson>,
    beacon_entries: LotusJson<Vec<BeaconEntry>>,
    parents: LotusJson<TipSetKey>,
    parent_weight: LotusJson<BigInt>,
    height: ChainEpoch,
    parent_state_root: LotusJson<Cid>,
    parent_message_receipts: LotusJson<Cid>,
    messages: LotusJson<Cid>,
    timestamp: u64,
    fork_signaling: u64,
    parent_base_fee: LotusJson<TokenAmount>,
}

impl HasLotusJson for RawBlockHeader {
    type LotusJson = BlockHeaderLotusJson;

    #[cfg(test)]
    fn snapshots() -> Vec<(serde_json::Value, Self)> {
        vec![(
            json!({
                "Miner": "f00",
                "ElectionProof": {"WinCount": 1, "VRFProof": ""},
                "BeaconEntries": null,
                "Parents": null,
                "ParentWeight": "0",
                "Height": 0,
                "ParentStateRoot": {"/": "baeaaaaa"},
                "ParentMessageReceipts": {"/": "baeaaaaa"},
                "Messages": {"/": "baeaaaaa"},
                "Timestamp": 0,
                "ForkSignaling": 0,
                "ParentBaseFee": "0",
            }),
            RawBlockHeader::default(),
        )]
    }

    fn into_lotus_json(self) -> Self::LotusJson {
        let Self {
            miner_address,
            beacon_entries,
            parents,
            weight,
            epoch,
            state_root,
            message_receipts,
            messages,
            timestamp,
            win_count,
            fork_signal,
            parent_base_fee,
        } = self;
        BlockHeaderLotusJson {
            miner: miner_address.into(),
            election_proof: Some(ElectionProofLotusJson {
                win_count,
                vrf_proof: vec![],
            }),
            beacon_entries: beacon_entries.into(),
            parents: parents.into(),
            parent_weight: weight.into(),
            height: epoch,
            parent_state_root: state_root.into(),
            parent_message_receipts: message_receipts.into(),
            messages: messages.into(),
            timestamp,
            fork_signaling: fork_signal,
            parent_base_fee: parent_base_fee.into(),
        }
    }

    fn from_lotus_json(lotus_json: Self::LotusJson) -> Self {
        let BlockHeaderLotusJson {
            miner,
            election_proof,
            beacon_entries,
            parents,
            parent_weight,
            height,
            parent_state_root,
            parent_message_receipts,
            messages,
            timestamp,
            fork_signaling,
            parent_base_fee,
        } = lotus_json;
        Self {
            miner_address: miner.into_inner(),
            beacon_entries: beacon_entries.into_inner(),
            parents: parents.into_inner(),
            weight: parent_weight.into_inner(),
            epoch: height,
            state_root: parent_state_root.into_inner(),
            message_receipts: parent_message_receipts.into_inner(),
            messages: messages.into_inner(),
            timestamp,
            // genesis carries no election proof
            win_count: election_proof.map_or(0, |proof| proof.win_count),
            fork_signal: fork_signaling,
            parent_base_fee: parent_base_fee.into_inner(),
        }
    }
}
