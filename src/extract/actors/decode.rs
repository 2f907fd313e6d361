// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Decoding of actor state into keyed collections, which is what actor event
//! tasks diff between two states.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use ahash::HashMap;
use anyhow::Context as _;
use cid::Cid;
use fvm_ipld_amt::{Amt, Amtv0};
use fvm_ipld_blockstore::Blockstore;
use ipld_core::ipld::Ipld;

use crate::actors::ActorKind;
use crate::datasource::NodeBlockstore;
use crate::ipld::hamt;
use crate::shim::address::Address;
use crate::utils::encoding::ipld_to_json;

/// Collection name to entry key to entry value.
pub type DecodedState = BTreeMap<String, BTreeMap<String, serde_json::Value>>;

/// Collection holding the plain fields of a state.
pub const FIELDS: &str = "state";

pub trait ActorStateDecoder: Send + Sync {
    /// Decodes the state rooted at `head`. Blocks on the node.
    fn decode(&self, store: &NodeBlockstore, head: &Cid) -> anyhow::Result<DecodedState>;
}

pub(crate) fn load_ipld(store: &impl Blockstore, cid: &Cid) -> anyhow::Result<Ipld> {
    let bytes = store
        .get(cid)?
        .with_context(|| format!("block {cid} not found"))?;
    serde_ipld_dagcbor::from_slice(&bytes).with_context(|| format!("malformed block {cid}"))
}

/// Renders a map key, as an address when it parses as one.
pub(crate) fn render_key(key: &[u8]) -> String {
    if let Ok(addr) = Address::from_bytes(key) {
        return addr.to_string();
    }
    key.iter().fold(String::with_capacity(key.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    /// Stored as is in the `state` collection.
    Value,
    /// Link to a HAMT whose entries form a collection.
    Hamt,
    /// Link to an AMT whose entries form a collection.
    Amt,
}

/// Decodes tuple encoded state by field position. Fields past the end of the
/// encoded state are skipped, which covers older actor versions that lack them.
pub struct LayoutDecoder {
    fields: &'static [(&'static str, Field)],
}

impl LayoutDecoder {
    pub const fn new(fields: &'static [(&'static str, Field)]) -> Self {
        Self { fields }
    }
}

fn hamt_collection(
    store: &impl Blockstore,
    root: &Cid,
) -> anyhow::Result<BTreeMap<String, serde_json::Value>> {
    Ok(hamt::entries(store, root)?
        .into_iter()
        .map(|(key, value)| (render_key(&key), ipld_to_json(&value)))
        .collect())
}

fn amt_collection(
    store: &impl Blockstore,
    root: &Cid,
) -> anyhow::Result<BTreeMap<String, serde_json::Value>> {
    let mut out = BTreeMap::new();
    match Amt::<Ipld, _>::load(root, store) {
        Ok(amt) => amt.for_each(|idx, value| {
            out.insert(idx.to_string(), ipld_to_json(value));
            Ok(())
        })?,
        Err(_) => Amtv0::<Ipld, _>::load(root, store)
            .with_context(|| format!("loading array {root}"))?
            .for_each(|idx, value| {
                out.insert(idx.to_string(), ipld_to_json(value));
                Ok(())
            })?,
    }
    Ok(out)
}

impl ActorStateDecoder for LayoutDecoder {
    fn decode(&self, store: &NodeBlockstore, head: &Cid) -> anyhow::Result<DecodedState> {
        let Ipld::List(values) = load_ipld(store, head)? else {
            anyhow::bail!("state {head} is not tuple encoded");
        };
        let mut out = DecodedState::new();
        for ((name, field), value) in self.fields.iter().zip(&values) {
            match (field, value) {
                (Field::Hamt, Ipld::Link(root)) => {
                    let entries = hamt_collection(store, root)
                        .with_context(|| format!("decoding {name}"))?;
                    out.insert((*name).into(), entries);
                }
                (Field::Amt, Ipld::Link(root)) => {
                    let entries = amt_collection(store, root)
                        .with_context(|| format!("decoding {name}"))?;
                    out.insert((*name).into(), entries);
                }
                _ => {
                    out.entry(FIELDS.into())
                        .or_default()
                        .insert((*name).into(), ipld_to_json(value));
                }
            }
        }
        Ok(out)
    }
}

/// Top level fields of any state, keyed by position or map key.
pub struct RawStateDecoder;

impl ActorStateDecoder for RawStateDecoder {
    fn decode(&self, store: &NodeBlockstore, head: &Cid) -> anyhow::Result<DecodedState> {
        let fields = match load_ipld(store, head)? {
            Ipld::List(values) => values
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), ipld_to_json(v)))
                .collect(),
            Ipld::Map(map) => map.iter().map(|(k, v)| (k.clone(), ipld_to_json(v))).collect(),
            other => BTreeMap::from([("0".to_string(), ipld_to_json(&other))]),
        };
        Ok(DecodedState::from([(FIELDS.to_string(), fields)]))
    }
}

use Field::{Amt as A, Hamt as H, Value as V};

pub const INIT: &[(&str, Field)] = &[("address_map", H), ("next_id", V), ("network_name", V)];

pub const MINER: &[(&str, Field)] = &[
    ("info", V),
    ("pre_commit_deposits", V),
    ("locked_funds", V),
    ("vesting_funds", V),
    ("fee_debt", V),
    ("initial_pledge", V),
    ("pre_committed_sectors", H),
    ("pre_committed_sectors_cleanup", V),
    ("allocated_sectors", V),
    ("sectors", A),
    ("proving_period_start", V),
    ("current_deadline", V),
    ("deadlines", V),
    ("early_terminations", V),
    ("deadline_cron_active", V),
];

pub const POWER: &[(&str, Field)] = &[
    ("total_raw_byte_power", V),
    ("total_bytes_committed", V),
    ("total_quality_adj_power", V),
    ("total_qa_bytes_committed", V),
    ("total_pledge_collateral", V),
    ("this_epoch_raw_byte_power", V),
    ("this_epoch_quality_adj_power", V),
    ("this_epoch_pledge_collateral", V),
    ("this_epoch_qa_power_smoothed", V),
    ("miner_count", V),
    ("miner_above_min_power_count", V),
    ("cron_event_queue", V),
    ("first_cron_epoch", V),
    ("claims", H),
    ("proof_validation_batch", V),
];

pub const MARKET: &[(&str, Field)] = &[
    ("proposals", A),
    ("states", A),
    ("pending_proposals", V),
    ("escrow_table", H),
    ("locked_table", H),
    ("next_id", V),
    ("deal_ops_by_epoch", V),
    ("last_cron", V),
    ("total_client_locked_collateral", V),
    ("total_provider_locked_collateral", V),
    ("total_client_storage_fee", V),
];

pub const REWARD: &[(&str, Field)] = &[
    ("cumsum_baseline", V),
    ("cumsum_realized", V),
    ("effective_network_time", V),
    ("effective_baseline_power", V),
    ("this_epoch_reward", V),
    ("this_epoch_reward_smoothed", V),
    ("this_epoch_baseline_power", V),
    ("epoch", V),
    ("total_storage_power_reward", V),
    ("simple_total", V),
    ("baseline_total", V),
];

pub const VERIFREG: &[(&str, Field)] = &[
    ("root_key", V),
    ("verifiers", H),
    ("remove_data_cap_proposal_ids", V),
    ("allocations", V),
    ("next_allocation_id", V),
    ("claims", V),
];

pub const MULTISIG: &[(&str, Field)] = &[
    ("signers", V),
    ("num_approvals_threshold", V),
    ("next_tx_id", V),
    ("initial_balance", V),
    ("start_epoch", V),
    ("unlock_duration", V),
    ("pending_txs", H),
];

/// Decoders by actor kind. Kinds without one decode with [`RawStateDecoder`].
#[derive(Clone)]
pub struct ActorDecoders {
    decoders: HashMap<ActorKind, Arc<dyn ActorStateDecoder>>,
    raw: Arc<dyn ActorStateDecoder>,
}

impl Default for ActorDecoders {
    fn default() -> Self {
        let mut decoders = Self::empty();
        for (kind, layout) in [
            (ActorKind::Init, INIT),
            (ActorKind::Miner, MINER),
            (ActorKind::Power, POWER),
            (ActorKind::Market, MARKET),
            (ActorKind::Reward, REWARD),
            (ActorKind::VerifiedRegistry, VERIFREG),
            (ActorKind::Multisig, MULTISIG),
        ] {
            decoders.register(kind, Arc::new(LayoutDecoder::new(layout)));
        }
        decoders
    }
}

impl ActorDecoders {
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::default(),
            raw: Arc::new(RawStateDecoder),
        }
    }

    pub fn register(&mut self, kind: ActorKind, decoder: Arc<dyn ActorStateDecoder>) {
        self.decoders.insert(kind, decoder);
    }

    pub fn get(&self, kind: ActorKind) -> Arc<dyn ActorStateDecoder> {
        self.decoders
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| self.raw.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_render_as_addresses_or_hex() {
        assert_eq!(render_key(&Address::new_id(42).to_bytes()), "f042");
        assert_eq!(render_key(&[0xff, 0x01]), "ff01");
    }
}
