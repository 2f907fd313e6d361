// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Extractors run once per changed actor.

pub mod decode;

pub use decode::{ActorDecoders, ActorStateDecoder, DecodedState, RawStateDecoder};

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use cid::Cid;
use ipld_core::ipld::Ipld;

use super::{ActorExtractor, ActorInfo, atto};
use crate::actors::{Actor, ActorKind};
use crate::datasource::DataSource;
use crate::ipld::hamt::{self, ChangeType as HamtChange};
use crate::model::{Model, ModelBatch};
use crate::model::actors::{self as records, ActorEvent, IdAddress};
use crate::shim::address::Address;
use crate::statediff::ChangeType;
use crate::utils::encoding::ipld_to_json;
use decode::load_ipld;

/// The actor as it was before `info.executed` ran, if it existed.
async fn previous_actor(ds: &DataSource, info: &ActorInfo) -> anyhow::Result<Option<Actor>> {
    match info.change {
        ChangeType::Added => Ok(None),
        ChangeType::Removed => Ok(Some(info.actor.clone())),
        ChangeType::Modified | ChangeType::Unknown => {
            ds.try_actor(&info.address, info.executed.key()).await
        }
    }
}

/// One row per changed actor.
pub struct ActorRecordExtractor;

#[async_trait]
impl ActorExtractor for ActorRecordExtractor {
    async fn extract(&self, _ds: &DataSource, info: &ActorInfo) -> anyhow::Result<ModelBatch> {
        Ok(vec![Arc::new(records::Actor {
            height: info.current.epoch(),
            id: info.address.to_string(),
            state_root: info.current.parent_state_root().to_string(),
            code: info.actor.code.to_string(),
            head: info.actor.head.to_string(),
            balance: atto(&info.actor.balance),
            nonce: info.actor.nonce,
            change: info.change.to_string(),
        })])
    }
}

/// JSON rendering of the new state of each changed actor. Removed actors have
/// no state and are skipped.
pub struct ActorStateExtractor;

#[async_trait]
impl ActorExtractor for ActorStateExtractor {
    async fn extract(&self, ds: &DataSource, info: &ActorInfo) -> anyhow::Result<ModelBatch> {
        if info.change == ChangeType::Removed {
            return Ok(vec![]);
        }
        let store = ds.store();
        let head = info.actor.head;
        let state = tokio::task::spawn_blocking(move || load_ipld(&store, &head))
            .await?
            .with_context(|| format!("loading state of {}", info.address))?;
        Ok(vec![Arc::new(records::ActorState {
            height: info.current.epoch(),
            head: head.to_string(),
            code: info.actor.code.to_string(),
            state: ipld_to_json(&state).to_string(),
        })])
    }
}

fn address_map(ipld: &Ipld) -> anyhow::Result<Cid> {
    match ipld {
        Ipld::List(fields) => match fields.first() {
            Some(Ipld::Link(root)) => Ok(*root),
            _ => anyhow::bail!("init state has no address map"),
        },
        _ => anyhow::bail!("init state is not tuple encoded"),
    }
}

/// New robust address to ID address assignments of the init actor.
pub struct IdAddressExtractor;

#[async_trait]
impl ActorExtractor for IdAddressExtractor {
    async fn extract(&self, ds: &DataSource, info: &ActorInfo) -> anyhow::Result<ModelBatch> {
        if info.change == ChangeType::Removed {
            return Ok(vec![]);
        }
        let prev_head = previous_actor(ds, info).await?.map(|actor| actor.head);
        let curr_head = info.actor.head;
        let store = ds.store();
        let assigned = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<(Vec<u8>, u64)>> {
            let curr = address_map(&load_ipld(&store, &curr_head)?)?;
            let changes = match prev_head {
                Some(prev_head) => {
                    let prev = address_map(&load_ipld(&store, &prev_head)?)?;
                    hamt::diff(&store, &prev, &curr)?
                        .into_iter()
                        .filter(|c| c.kind != HamtChange::Remove)
                        .filter_map(|c| c.after.map(|after| (c.key, after)))
                        .collect::<Vec<_>>()
                }
                None => hamt::entries(&store, &curr)?
                    .into_iter()
                    .map(|(key, value)| Ok((key, serde_ipld_dagcbor::to_vec(&value)?)))
                    .collect::<anyhow::Result<Vec<_>>>()?,
            };
            changes
                .into_iter()
                .map(|(key, value)| Ok((key, fvm_ipld_encoding::from_slice::<u64>(&value)?)))
                .collect()
        })
        .await??;

        let mut out: ModelBatch = Vec::with_capacity(assigned.len());
        for (key, id) in assigned {
            let address = Address::from_bytes(&key).context("malformed address map key")?;
            out.push(Arc::new(IdAddress {
                height: info.current.epoch(),
                id: Address::new_id(id).to_string(),
                address: address.to_string(),
                state_root: info.current.parent_state_root().to_string(),
            }));
        }
        Ok(out)
    }
}

/// Diffs the decoded previous and current state of an actor of one kind.
pub struct ActorEventsExtractor {
    kind: ActorKind,
    decoder: Arc<dyn ActorStateDecoder>,
}

impl ActorEventsExtractor {
    pub fn new(kind: ActorKind, decoder: Arc<dyn ActorStateDecoder>) -> Self {
        Self { kind, decoder }
    }
}

/// Added, modified and removed entries between two decoded states.
pub fn diff_decoded(prev: &DecodedState, curr: &DecodedState) -> Vec<(String, String, ChangeType, serde_json::Value)> {
    let empty = Default::default();
    let collections: BTreeSet<&String> = prev.keys().chain(curr.keys()).collect();
    let mut out = vec![];
    for collection in collections {
        let before = prev.get(collection).unwrap_or(&empty);
        let after = curr.get(collection).unwrap_or(&empty);
        let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
        for key in keys {
            let event = match (before.get(key), after.get(key)) {
                (None, Some(value)) => (ChangeType::Added, value),
                (Some(value), None) => (ChangeType::Removed, value),
                (Some(old), Some(new)) if old != new => (ChangeType::Modified, new),
                _ => continue,
            };
            out.push((collection.clone(), key.clone(), event.0, event.1.clone()));
        }
    }
    out
}

#[async_trait]
impl ActorExtractor for ActorEventsExtractor {
    async fn extract(&self, ds: &DataSource, info: &ActorInfo) -> anyhow::Result<ModelBatch> {
        let prev_head = previous_actor(ds, info).await?.map(|actor| actor.head);
        let curr_head = (info.change != ChangeType::Removed).then_some(info.actor.head);
        if prev_head == curr_head {
            return Ok(vec![]);
        }
        let store = ds.store();
        let decoder = self.decoder.clone();
        let (prev, curr) = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
            let decode = |head: Option<Cid>| match head {
                Some(head) => decoder.decode(&store, &head),
                None => Ok(DecodedState::new()),
            };
            Ok((decode(prev_head)?, decode(curr_head)?))
        })
        .await?
        .with_context(|| format!("decoding {} state of {}", self.kind, info.address))?;

        Ok(diff_decoded(&prev, &curr)
            .into_iter()
            .map(|(collection, key, event, value)| {
                Arc::new(ActorEvent {
                    height: info.current.epoch(),
                    state_root: info.current.parent_state_root().to_string(),
                    actor: info.address.to_string(),
                    actor_kind: self.kind.to_string(),
                    collection,
                    key,
                    event: event.to_string(),
                    value: value.to_string(),
                }) as Arc<dyn Model>
            })
            .collect())
    }
}
