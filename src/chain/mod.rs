// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The chain node as the indexer sees it.

mod messages;
pub mod tipset_cache;

pub use messages::*;

use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::HashMap;
use async_trait::async_trait;
use cid::Cid;
use futures::stream::BoxStream;

use crate::actors::Actor;
use crate::blocks::{TipSet, TipSetKey};
use crate::shim::{NetworkVersion, address::Address, clock::ChainEpoch, econ::TokenAmount};

/// A head change notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeadChange {
    /// The current head, sent once when subscribing.
    Current(Arc<TipSet>),
    Apply(Arc<TipSet>),
    Revert(Arc<TipSet>),
}

impl HeadChange {
    pub fn tipset(&self) -> &Arc<TipSet> {
        match self {
            Self::Current(ts) | Self::Apply(ts) | Self::Revert(ts) => ts,
        }
    }
}

pub type HeadChangeStream = BoxStream<'static, anyhow::Result<Vec<HeadChange>>>;

/// Read-only chain node API the indexer consumes.
///
/// Lookups by [`TipSetKey::EMPTY`] resolve against the current head.
#[async_trait]
pub trait ChainNode: Send + Sync + 'static {
    async fn chain_head(&self) -> anyhow::Result<Arc<TipSet>>;

    async fn chain_get_tipset(&self, key: &TipSetKey) -> anyhow::Result<Arc<TipSet>>;

    /// Returns the tipset at `epoch` on the chain ending at `key`. For a null
    /// round, the nearest non-null tipset is returned, which has a different epoch.
    async fn chain_get_tipset_by_height(
        &self,
        epoch: ChainEpoch,
        key: &TipSetKey,
    ) -> anyhow::Result<Arc<TipSet>>;

    async fn chain_notify(&self) -> anyhow::Result<HeadChangeStream>;

    /// Raw IPLD block by CID.
    async fn chain_read_obj(&self, cid: &Cid) -> anyhow::Result<Vec<u8>>;

    /// BLS and secp messages included in each block of `ts`.
    async fn chain_get_block_messages(&self, ts: &TipSet) -> anyhow::Result<Vec<BlockMessages>>;

    async fn state_get_actor(&self, addr: &Address, key: &TipSetKey)
    -> anyhow::Result<Option<Actor>>;

    async fn state_miner_power(&self, addr: &Address, key: &TipSetKey)
    -> anyhow::Result<MinerPower>;

    async fn state_read_state(&self, addr: &Address, key: &TipSetKey)
    -> anyhow::Result<ActorState>;

    /// Actors that differ between two state roots. Removed actors are not reported.
    async fn state_changed_actors(
        &self,
        prev: &Cid,
        curr: &Cid,
    ) -> anyhow::Result<HashMap<Address, Actor>>;

    async fn state_network_version(&self, key: &TipSetKey) -> anyhow::Result<NetworkVersion>;

    /// Built-in actor code CIDs of the bundle used at `version`.
    async fn state_actor_code_cids(
        &self,
        version: NetworkVersion,
    ) -> anyhow::Result<BTreeMap<String, Cid>>;

    async fn circulating_supply(&self, key: &TipSetKey) -> anyhow::Result<CirculatingSupply>;

    /// Messages included in `executed` together with the receipts `current` commits to.
    async fn get_executed_and_block_messages_for_tipset(
        &self,
        current: &TipSet,
        executed: &TipSet,
    ) -> anyhow::Result<TipSetMessages>;

    /// Every message the VM ran while executing `executed`, implicit ones included.
    async fn get_message_executions_for_tipset(
        &self,
        current: &TipSet,
        executed: &TipSet,
    ) -> anyhow::Result<Vec<MessageExecution>>;

    /// Base fee the child of `ts` pays.
    async fn compute_base_fee(&self, ts: &TipSet) -> anyhow::Result<TokenAmount>;
}
