// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Read-only view of the chain node used by every extractor.
//!
//! Node calls are retried, and the two expensive per-tipset computations
//! (message executions and executed messages) are memoized in small
//! single-flight LRUs keyed by the `(current, executed)` pair.

mod cache;
mod store;

pub use cache::{SingleFlightCache, pair_key};
pub use store::NodeBlockstore;

use std::future::Future;
use std::sync::Arc;

use ahash::{HashMap, HashSet, HashSetExt as _};
use anyhow::Context as _;
use cid::Cid;
use parking_lot::Mutex;
use tracing::warn;

use crate::actors::{Actor, ActorCodes, ActorKind, actors_version};
use crate::blocks::{TipSet, TipSetKey};
use crate::chain::{
    ActorState, BlockMessageReceipts, BlockMessages, ChainNode, CirculatingSupply,
    ExecutedMessage, MessageExecution, MessageReceipt, MinerPower, TipSetMessages,
};
use crate::metrics::values;
use crate::shim::{
    NetworkVersion, address::Address, clock::ChainEpoch, econ::TokenAmount, error::ExitCode,
};
use crate::statediff::{self, ActorChange, ActorStateChanges, ChangeType};
use crate::utils::{RetryArgs, RetryError, retry};

/// Memoized results per cache.
pub const MEMO_CACHE_SIZE: usize = 4;

/// Mainnet epoch of the Claus upgrade.
pub const UPGRADE_CLAUS_HEIGHT: ChainEpoch = 343_200;

/// First network version whose actor code CIDs come from a bundle manifest.
const FIRST_BUNDLE_NETWORK_VERSION: NetworkVersion = 16;

/// Storage miner `SubmitWindowedPoSt`.
const SUBMIT_WINDOWED_POST: u64 = 5;

/// Decides whether the base fee of an executed message is burned.
#[derive(Clone, Debug)]
pub struct ShouldBurn {
    network_version: NetworkVersion,
    epoch: ChainEpoch,
    claus_height: ChainEpoch,
    miner_codes: HashSet<Cid>,
}

impl ShouldBurn {
    pub fn should_burn(&self, msg: &ExecutedMessage) -> bool {
        let exempt = self.network_version <= 12
            && self.epoch > self.claus_height
            && msg.receipt.exit_code == ExitCode::OK
            && msg.message.method_num == SUBMIT_WINDOWED_POST
            && msg
                .to_actor_code
                .is_some_and(|code| self.miner_codes.contains(&code));
        !exempt
    }
}

pub struct DataSource {
    node: Arc<dyn ChainNode>,
    store: NodeBlockstore,
    executions: SingleFlightCache<Arc<Vec<MessageExecution>>>,
    executed: SingleFlightCache<Arc<TipSetMessages>>,
    codes: Mutex<HashMap<NetworkVersion, Arc<ActorCodes>>>,
    retry: RetryArgs,
    claus_height: ChainEpoch,
}

impl DataSource {
    /// Must be called from within a tokio runtime.
    pub fn new(node: Arc<dyn ChainNode>) -> anyhow::Result<Self> {
        let handle = tokio::runtime::Handle::try_current()
            .context("the data source needs a tokio runtime")?;
        Ok(Self {
            store: NodeBlockstore::new(node.clone(), handle),
            node,
            executions: SingleFlightCache::new(MEMO_CACHE_SIZE, values::MESSAGE_EXECUTIONS),
            executed: SingleFlightCache::new(MEMO_CACHE_SIZE, values::EXECUTED_MESSAGES),
            codes: Default::default(),
            retry: RetryArgs::default(),
            claus_height: UPGRADE_CLAUS_HEIGHT,
        })
    }

    pub fn with_retry(mut self, retry: RetryArgs) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_claus_height(mut self, height: ChainEpoch) -> Self {
        self.claus_height = height;
        self
    }

    pub fn node(&self) -> &Arc<dyn ChainNode> {
        &self.node
    }

    /// Block store reading through the node. Only usable from blocking threads.
    pub fn store(&self) -> NodeBlockstore {
        self.store.clone()
    }

    async fn call<T, F, Fut>(&self, method: &'static str, make_fut: F) -> anyhow::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        retry(self.retry, make_fut).await.map_err(|e| match e {
            RetryError::RetriesExceeded(Some(e)) => e.context(method),
            e => anyhow::anyhow!("{method}: {e}"),
        })
    }

    pub async fn chain_head(&self) -> anyhow::Result<Arc<TipSet>> {
        self.call("ChainHead", || self.node.chain_head()).await
    }

    pub async fn tipset(&self, key: &TipSetKey) -> anyhow::Result<Arc<TipSet>> {
        self.call("ChainGetTipSet", || self.node.chain_get_tipset(key))
            .await
    }

    pub async fn tipset_by_height(
        &self,
        epoch: ChainEpoch,
        key: &TipSetKey,
    ) -> anyhow::Result<Arc<TipSet>> {
        self.call("ChainGetTipSetByHeight", || {
            self.node.chain_get_tipset_by_height(epoch, key)
        })
        .await
    }

    /// The actor at `addr`, failing if it does not exist.
    pub async fn actor(&self, addr: &Address, key: &TipSetKey) -> anyhow::Result<Actor> {
        self.try_actor(addr, key)
            .await?
            .with_context(|| format!("actor {addr} not found at {key}"))
    }

    pub async fn try_actor(&self, addr: &Address, key: &TipSetKey) -> anyhow::Result<Option<Actor>> {
        self.call("StateGetActor", || self.node.state_get_actor(addr, key))
            .await
    }

    pub async fn miner_power(&self, addr: &Address, ts: &TipSet) -> anyhow::Result<MinerPower> {
        self.call("StateMinerPower", || {
            self.node.state_miner_power(addr, ts.key())
        })
        .await
    }

    pub async fn actor_state(&self, addr: &Address, ts: &TipSet) -> anyhow::Result<ActorState> {
        self.call("StateReadState", || self.node.state_read_state(addr, ts.key()))
            .await
    }

    pub async fn circulating_supply(&self, ts: &TipSet) -> anyhow::Result<CirculatingSupply> {
        self.call("StateVMCirculatingSupplyInternal", || {
            self.node.circulating_supply(ts.key())
        })
        .await
    }

    pub async fn chain_read_obj(&self, cid: &Cid) -> anyhow::Result<Vec<u8>> {
        self.call("ChainReadObj", || self.node.chain_read_obj(cid))
            .await
    }

    pub async fn network_version(&self, ts: &TipSet) -> anyhow::Result<NetworkVersion> {
        self.call("StateNetworkVersion", || {
            self.node.state_network_version(ts.key())
        })
        .await
    }

    pub async fn compute_base_fee(&self, ts: &TipSet) -> anyhow::Result<TokenAmount> {
        self.call("ComputeBaseFee", || self.node.compute_base_fee(ts))
            .await
    }

    pub async fn tipset_block_messages(&self, ts: &TipSet) -> anyhow::Result<Vec<BlockMessages>> {
        self.call("ChainGetBlockMessages", || {
            self.node.chain_get_block_messages(ts)
        })
        .await
    }

    /// Every message the VM ran for `executed`, implicit messages included.
    pub async fn message_executions(
        &self,
        current: &TipSet,
        executed: &TipSet,
    ) -> anyhow::Result<Arc<Vec<MessageExecution>>> {
        self.executions
            .get_or_else(pair_key(current, executed), || async {
                let executions = self
                    .call("GetMessageExecutionsForTipSet", || {
                        self.node
                            .get_message_executions_for_tipset(current, executed)
                    })
                    .await?;
                Ok(Arc::new(executions))
            })
            .await
    }

    pub async fn executed_and_block_messages(
        &self,
        current: &TipSet,
        executed: &TipSet,
    ) -> anyhow::Result<Arc<TipSetMessages>> {
        self.executed
            .get_or_else(pair_key(current, executed), || async {
                let messages = self
                    .call("GetExecutedAndBlockMessagesForTipSet", || {
                        self.node
                            .get_executed_and_block_messages_for_tipset(current, executed)
                    })
                    .await?;
                Ok(Arc::new(messages))
            })
            .await
    }

    /// Messages of each block of `executed` with their receipts. A message
    /// included by several blocks is listed under the first one only.
    pub async fn tipset_message_receipts(
        &self,
        current: &TipSet,
        executed: &TipSet,
    ) -> anyhow::Result<Vec<BlockMessageReceipts>> {
        let messages = self.executed_and_block_messages(current, executed).await?;
        let by_cid: HashMap<Cid, &ExecutedMessage> =
            messages.executed.iter().map(|m| (m.cid, m)).collect();
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(messages.block.len());
        for block in &messages.block {
            let mut receipts = vec![];
            for msg in block.messages() {
                if !seen.insert(msg.cid) {
                    continue;
                }
                let executed = by_cid
                    .get(&msg.cid)
                    .with_context(|| format!("no receipt for message {}", msg.cid))?;
                receipts.push(MessageReceipt {
                    message: msg.clone(),
                    receipt: executed.receipt.clone(),
                    index: executed.index,
                });
            }
            out.push(BlockMessageReceipts {
                block: block.block,
                receipts,
            });
        }
        Ok(out)
    }

    /// Actors changed by executing `executed`, whose result is the parent
    /// state of `current`.
    pub async fn actor_state_changes(
        &self,
        current: &TipSet,
        executed: &TipSet,
    ) -> anyhow::Result<Arc<ActorStateChanges>> {
        let prev = *executed.parent_state_root();
        let curr = *current.parent_state_root();
        let genesis = executed.epoch() == 0;
        let store = self.store();
        let local = tokio::task::spawn_blocking(move || {
            if genesis {
                statediff::genesis_actors(&store, &prev)
            } else {
                statediff::diff_state_roots(&store, &prev, &curr)
            }
        })
        .await?;
        match local {
            Ok(changes) => Ok(Arc::new(changes)),
            Err(e) if !genesis => {
                warn!("local state diff {prev} -> {curr} failed, asking the node: {e:#}");
                let changed = self
                    .call("StateChangedActors", || {
                        self.node.state_changed_actors(&prev, &curr)
                    })
                    .await?;
                Ok(Arc::new(
                    changed
                        .into_iter()
                        .map(|(addr, actor)| {
                            (
                                addr,
                                ActorChange {
                                    actor,
                                    change: ChangeType::Unknown,
                                },
                            )
                        })
                        .collect(),
                ))
            }
            Err(e) => Err(e),
        }
    }

    /// Code CIDs of every actor version up to the network version of `ts`.
    pub async fn actor_codes(&self, ts: &TipSet) -> anyhow::Result<Arc<ActorCodes>> {
        let version = self.network_version(ts).await?;
        if let Some(codes) = self.codes.lock().get(&version) {
            return Ok(codes.clone());
        }
        let mut codes = ActorCodes::legacy()?;
        for nv in FIRST_BUNDLE_NETWORK_VERSION..=version {
            match self
                .call("StateActorCodeCIDs", || self.node.state_actor_code_cids(nv))
                .await
            {
                Ok(manifest) => codes.extend_from_manifest(actors_version(nv), &manifest),
                Err(e) => warn!("no actor manifest for network version {nv}: {e:#}"),
            }
        }
        let codes = Arc::new(codes);
        self.codes.lock().insert(version, codes.clone());
        Ok(codes)
    }

    pub async fn should_burn_fn(&self, executed: &TipSet) -> anyhow::Result<ShouldBurn> {
        let network_version = self.network_version(executed).await?;
        let miner_codes = self.actor_codes(executed).await?.codes_of(ActorKind::Miner);
        Ok(ShouldBurn {
            network_version,
            epoch: executed.epoch(),
            claus_height: self.claus_height,
            miner_codes,
        })
    }
}
