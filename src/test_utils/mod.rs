// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! An in-memory chain node and builders for tests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use ahash::HashMap;
use anyhow::Context as _;
use async_trait::async_trait;
use cid::Cid;
use futures::StreamExt as _;
use fvm_ipld_blockstore::Blockstore as _;
use fvm_ipld_hamt::{BytesKey, Hamt};
use parking_lot::{Mutex, RwLock};

use crate::actors::Actor;
use crate::blocks::{BlockHeader, RawBlockHeader, TipSet, TipSetKey};
use crate::chain::{
    ActorState, BlockMessages, ChainNode, CirculatingSupply, HeadChange, HeadChangeStream,
    MessageExecution, MinerPower, TipSetMessages,
};
use crate::ipld::hamt;
use crate::shim::{
    NetworkVersion, address::Address, clock::ChainEpoch, econ::TokenAmount,
};
use crate::statediff::{self, ChangeType, StateRoot};
use crate::utils::db::MemoryDB;
use crate::utils::encoding::{cbor_cid, put_cbor};

pub fn header(epoch: ChainEpoch, parents: TipSetKey, state_root: Cid, miner: u64) -> BlockHeader {
    BlockHeader::new(RawBlockHeader {
        miner_address: Address::new_id(miner),
        parents,
        epoch,
        state_root,
        message_receipts: cbor_cid(b"receipts"),
        messages: cbor_cid(b"messages"),
        timestamp: 1_598_306_400 + epoch as u64 * 30,
        parent_base_fee: TokenAmount::from_atto(100),
        ..Default::default()
    })
    .unwrap()
}

/// A single block tipset that only depends on `epoch`.
pub fn tipset_at(epoch: ChainEpoch) -> Arc<TipSet> {
    Arc::new(
        TipSet::new(vec![header(
            epoch,
            TipSetKey::EMPTY,
            cbor_cid(&epoch.to_be_bytes()),
            1000,
        )])
        .unwrap(),
    )
}

pub fn actor(id: u64, nonce: u64) -> Actor {
    Actor {
        code: cbor_cid(b"fil/account"),
        head: cbor_cid(&id.to_be_bytes()),
        nonce,
        balance: TokenAmount::from_atto(id * 1_000),
    }
}

/// Stores a version 5 state tree holding `actors` and returns its root.
pub fn state_tree(store: &MemoryDB, actors: &[(u64, Actor)]) -> Cid {
    let mut tree = Hamt::<_, Actor>::new_with_bit_width(store, 5);
    for (id, actor) in actors {
        tree.set(BytesKey(Address::new_id(*id).to_bytes()), actor.clone())
            .unwrap();
    }
    let actors_root = tree.flush().unwrap();
    put_cbor(store, &(5u64, actors_root, cbor_cid(b"info"))).unwrap()
}

/// Appends a tipset at `epoch` whose parent state holds `actors`.
pub fn tipset_with_state(chain: &FakeChain, epoch: ChainEpoch, actors: &[(u64, Actor)]) -> Arc<TipSet> {
    let root = state_tree(&chain.store, actors);
    chain.push(epoch, root)
}

/// An in-memory chain. Tipsets are kept by epoch and missing epochs are null
/// rounds.
#[derive(Default)]
pub struct FakeChain {
    pub store: MemoryDB,
    tipsets: RwLock<BTreeMap<ChainEpoch, Arc<TipSet>>>,
    /// Tipsets resolvable by key that are not on the main chain.
    forks: RwLock<HashMap<TipSetKey, Arc<TipSet>>>,
    messages: RwLock<HashMap<TipSetKey, TipSetMessages>>,
    executions: RwLock<HashMap<TipSetKey, Vec<MessageExecution>>>,
    block_messages: RwLock<HashMap<TipSetKey, Vec<BlockMessages>>>,
    notify: Mutex<Option<flume::Receiver<Vec<HeadChange>>>>,
    /// Number of memoizable calls served.
    pub calls: AtomicUsize,
    delay: Option<Duration>,
    network_version: NetworkVersion,
}

impl FakeChain {
    /// A chain with one tipset at each of `epochs`.
    pub fn linear(epochs: impl IntoIterator<Item = ChainEpoch>) -> Self {
        let chain = Self::default();
        for epoch in epochs {
            chain.push(epoch, cbor_cid(&epoch.to_be_bytes()));
        }
        chain
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_network_version(mut self, version: NetworkVersion) -> Self {
        self.network_version = version;
        self
    }

    /// Appends a tipset at `epoch` on top of the current head.
    pub fn push(&self, epoch: ChainEpoch, state_root: Cid) -> Arc<TipSet> {
        let mut tipsets = self.tipsets.write();
        let parents = tipsets
            .values()
            .next_back()
            .map(|ts| ts.key().clone())
            .unwrap_or_default();
        let ts = Arc::new(TipSet::new(vec![header(epoch, parents, state_root, 1000)]).unwrap());
        tipsets.insert(epoch, ts.clone());
        ts
    }

    /// Adds `ts` as is, replacing the tipset at its epoch.
    pub fn insert(&self, ts: Arc<TipSet>) {
        self.tipsets.write().insert(ts.epoch(), ts);
    }

    /// Makes `ts` resolvable by key while leaving the main chain as is.
    pub fn insert_fork(&self, ts: Arc<TipSet>) {
        self.forks.write().insert(ts.key().clone(), ts);
    }

    pub fn tipset_at(&self, epoch: ChainEpoch) -> Arc<TipSet> {
        self.tipsets.read()[&epoch].clone()
    }

    pub fn set_messages(&self, current: &TipSet, messages: TipSetMessages) {
        self.messages.write().insert(current.key().clone(), messages);
    }

    pub fn set_executions(&self, current: &TipSet, executions: Vec<MessageExecution>) {
        self.executions
            .write()
            .insert(current.key().clone(), executions);
    }

    pub fn set_block_messages(&self, ts: &TipSet, messages: Vec<BlockMessages>) {
        self.block_messages.write().insert(ts.key().clone(), messages);
    }

    /// Sender feeding the stream returned by `chain_notify`.
    pub fn notifier(&self) -> flume::Sender<Vec<HeadChange>> {
        let (tx, rx) = flume::unbounded();
        *self.notify.lock() = Some(rx);
        tx
    }

    async fn memoizable_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn lookup(&self, key: &TipSetKey) -> anyhow::Result<Arc<TipSet>> {
        let tipsets = self.tipsets.read();
        if key.is_empty() {
            return tipsets.values().next_back().cloned().context("empty chain");
        }
        if let Some(ts) = tipsets.values().find(|ts| ts.key() == key) {
            return Ok(ts.clone());
        }
        self.forks
            .read()
            .get(key)
            .cloned()
            .with_context(|| format!("tipset {key} not found"))
    }
}

#[async_trait]
impl ChainNode for FakeChain {
    async fn chain_head(&self) -> anyhow::Result<Arc<TipSet>> {
        self.lookup(&TipSetKey::EMPTY)
    }

    async fn chain_get_tipset(&self, key: &TipSetKey) -> anyhow::Result<Arc<TipSet>> {
        self.lookup(key)
    }

    async fn chain_get_tipset_by_height(
        &self,
        epoch: ChainEpoch,
        _key: &TipSetKey,
    ) -> anyhow::Result<Arc<TipSet>> {
        self.tipsets
            .read()
            .range(epoch..)
            .next()
            .map(|(_, ts)| ts.clone())
            .with_context(|| format!("no tipset at or above {epoch}"))
    }

    async fn chain_notify(&self) -> anyhow::Result<HeadChangeStream> {
        let rx = self.notify.lock().take().context("no notifier")?;
        Ok(rx.into_stream().map(Ok).boxed())
    }

    async fn chain_read_obj(&self, cid: &Cid) -> anyhow::Result<Vec<u8>> {
        self.store
            .get(cid)?
            .with_context(|| format!("block {cid} not found"))
    }

    async fn chain_get_block_messages(&self, ts: &TipSet) -> anyhow::Result<Vec<BlockMessages>> {
        Ok(self
            .block_messages
            .read()
            .get(ts.key())
            .cloned()
            .unwrap_or_default())
    }

    async fn state_get_actor(
        &self,
        addr: &Address,
        key: &TipSetKey,
    ) -> anyhow::Result<Option<Actor>> {
        let ts = self.lookup(key)?;
        let root = StateRoot::load(&self.store, ts.parent_state_root())?;
        let wanted = addr.to_bytes();
        let mut found = None;
        hamt::for_each(&self.store, &root.actors, |key, value| {
            if key == wanted.as_slice() {
                found = Some(Actor::from_cbor(&serde_ipld_dagcbor::to_vec(value)?)?);
            }
            Ok(())
        })?;
        Ok(found)
    }

    async fn state_miner_power(
        &self,
        _addr: &Address,
        _key: &TipSetKey,
    ) -> anyhow::Result<MinerPower> {
        Ok(MinerPower::default())
    }

    async fn state_read_state(&self, addr: &Address, key: &TipSetKey) -> anyhow::Result<ActorState> {
        let actor = self
            .state_get_actor(addr, key)
            .await?
            .context("actor not found")?;
        Ok(ActorState {
            balance: actor.balance,
            code: actor.code,
            state: serde_json::Value::Null,
        })
    }

    async fn state_changed_actors(
        &self,
        prev: &Cid,
        curr: &Cid,
    ) -> anyhow::Result<HashMap<Address, Actor>> {
        Ok(statediff::diff_state_roots(&self.store, prev, curr)?
            .into_iter()
            .filter(|(_, change)| change.change != ChangeType::Removed)
            .map(|(addr, change)| (addr, change.actor))
            .collect())
    }

    async fn state_network_version(&self, _key: &TipSetKey) -> anyhow::Result<NetworkVersion> {
        Ok(self.network_version)
    }

    async fn state_actor_code_cids(
        &self,
        _version: NetworkVersion,
    ) -> anyhow::Result<BTreeMap<String, Cid>> {
        Ok(BTreeMap::new())
    }

    async fn circulating_supply(&self, _key: &TipSetKey) -> anyhow::Result<CirculatingSupply> {
        Ok(CirculatingSupply::default())
    }

    async fn get_executed_and_block_messages_for_tipset(
        &self,
        current: &TipSet,
        _executed: &TipSet,
    ) -> anyhow::Result<TipSetMessages> {
        self.memoizable_call().await;
        Ok(self
            .messages
            .read()
            .get(current.key())
            .cloned()
            .unwrap_or_default())
    }

    async fn get_message_executions_for_tipset(
        &self,
        current: &TipSet,
        _executed: &TipSet,
    ) -> anyhow::Result<Vec<MessageExecution>> {
        self.memoizable_call().await;
        Ok(self
            .executions
            .read()
            .get(current.key())
            .cloned()
            .unwrap_or_default())
    }

    async fn compute_base_fee(&self, ts: &TipSet) -> anyhow::Result<TokenAmount> {
        Ok(crate::gas::compute_next_base_fee(
            ts.parent_base_fee(),
            0,
            ts.len(),
        ))
    }
}
