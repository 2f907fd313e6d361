// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use ahash::{HashMap, HashMapExt as _, HashSet, HashSetExt as _};
use anyhow::Context as _;
use async_trait::async_trait;
use cid::Cid;
use futures::StreamExt as _;
use serde_json::json;
use tracing::warn;

use super::methods::*;
use super::{LotusClient, RpcRequest, head_changes};
use crate::actors::Actor;
use crate::blocks::{TipSet, TipSetKey};
use crate::chain::{
    ActorState, BlockMessages, ChainMessage, ChainNode, CirculatingSupply, ExecutedMessage,
    ExecutionTrace, HeadChange, HeadChangeStream, MessageExecution, MinerPower, TipSetMessages,
};
use crate::lotus_json::{LotusJson, TipSetLotusJson};
use crate::shim::{
    NetworkVersion, address::Address, clock::ChainEpoch, econ::TokenAmount, receipt::Receipt,
};

/// Re-executing a tipset can take far longer than a lookup.
const STATE_COMPUTE_TIMEOUT: Duration = Duration::from_secs(600);

impl LotusClient {
    async fn tipset(&self, req: RpcRequest<TipSetLotusJson>) -> anyhow::Result<Arc<TipSet>> {
        Ok(Arc::new(self.call(req).await?.into_tipset()?))
    }

    async fn block_messages(&self, block: &Cid) -> anyhow::Result<BlockMessagesLotusJson> {
        self.call(RpcRequest::new(
            CHAIN_GET_BLOCK_MESSAGES,
            json!([LotusJson(*block)]),
        ))
        .await
    }

    /// Code of the actor at `addr` in the parent state of `key`, memoized in `codes`.
    async fn actor_code(
        &self,
        codes: &mut HashMap<Address, Option<Cid>>,
        addr: &Address,
        key: &TipSetKey,
    ) -> anyhow::Result<Option<Cid>> {
        if let Some(code) = codes.get(addr) {
            return Ok(*code);
        }
        let code = self.state_get_actor(addr, key).await?.map(|actor| actor.code);
        codes.insert(*addr, code);
        Ok(code)
    }
}

#[async_trait]
impl ChainNode for LotusClient {
    async fn chain_head(&self) -> anyhow::Result<Arc<TipSet>> {
        self.tipset(RpcRequest::new(CHAIN_HEAD, json!([]))).await
    }

    async fn chain_get_tipset(&self, key: &TipSetKey) -> anyhow::Result<Arc<TipSet>> {
        self.tipset(RpcRequest::new(
            CHAIN_GET_TIPSET,
            json!([LotusJson(key.clone())]),
        ))
        .await
    }

    async fn chain_get_tipset_by_height(
        &self,
        epoch: ChainEpoch,
        key: &TipSetKey,
    ) -> anyhow::Result<Arc<TipSet>> {
        self.tipset(RpcRequest::new(
            CHAIN_GET_TIPSET_AFTER_HEIGHT,
            json!([epoch, LotusJson(key.clone())]),
        ))
        .await
    }

    /// Polls the head and turns every move into the head changes leading to it.
    async fn chain_notify(&self) -> anyhow::Result<HeadChangeStream> {
        let head = self.chain_head().await?;
        let (tx, rx) = flume::bounded(16);
        tx.send_async(Ok(vec![HeadChange::Current(head.clone())]))
            .await
            .context("head change receiver dropped")?;
        let client = self.clone();
        tokio::spawn(async move {
            let mut last = head;
            let mut ticker = tokio::time::interval(client.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let head = match client.chain_head().await {
                    Ok(head) => head,
                    Err(e) => {
                        warn!("polling the chain head failed: {e:#}");
                        continue;
                    }
                };
                if head.key() == last.key() {
                    continue;
                }
                let changes = head_changes(&client, last.clone(), head.clone()).await;
                let failed = changes.is_err();
                if tx.send_async(changes).await.is_err() || failed {
                    return;
                }
                last = head;
            }
        });
        Ok(rx.into_stream().boxed())
    }

    async fn chain_read_obj(&self, cid: &Cid) -> anyhow::Result<Vec<u8>> {
        let RawObject(bytes) = self
            .call(RpcRequest::new(CHAIN_READ_OBJ, json!([LotusJson(*cid)])))
            .await?;
        Ok(bytes)
    }

    async fn chain_get_block_messages(&self, ts: &TipSet) -> anyhow::Result<Vec<BlockMessages>> {
        let mut out = Vec::with_capacity(ts.len());
        for header in ts.block_headers() {
            let BlockMessagesLotusJson {
                bls_messages,
                secpk_messages,
                cids,
            } = self.block_messages(header.cid()).await?;
            let bls_messages = bls_messages.into_inner();
            let secpk_messages = secpk_messages.unwrap_or_default();
            let cids = cids.into_inner();
            anyhow::ensure!(
                cids.len() == bls_messages.len() + secpk_messages.len(),
                "block {} lists {} CIDs for {} messages",
                header.cid(),
                cids.len(),
                bls_messages.len() + secpk_messages.len()
            );
            let (bls_cids, secp_cids) = cids.split_at(bls_messages.len());
            let bls_messages = bls_cids
                .iter()
                .zip(bls_messages)
                .map(|(cid, message)| {
                    Ok(ChainMessage {
                        cid: *cid,
                        size_bytes: fvm_ipld_encoding::to_vec(&message)?.len(),
                        message,
                    })
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            let secp_messages = secp_cids
                .iter()
                .zip(secpk_messages)
                .map(|(cid, signed)| {
                    Ok(ChainMessage {
                        cid: *cid,
                        size_bytes: signed.encoded_len()?,
                        message: signed.into_message(),
                    })
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            out.push(BlockMessages {
                block: *header.cid(),
                miner: header.miner_address,
                bls_messages,
                secp_messages,
            });
        }
        Ok(out)
    }

    async fn state_get_actor(
        &self,
        addr: &Address,
        key: &TipSetKey,
    ) -> anyhow::Result<Option<Actor>> {
        let LotusJson(actor) = self
            .call(RpcRequest::new(
                STATE_GET_ACTOR,
                json!([LotusJson(*addr), LotusJson(key.clone())]),
            ))
            .await?;
        Ok(actor)
    }

    async fn state_miner_power(
        &self,
        addr: &Address,
        key: &TipSetKey,
    ) -> anyhow::Result<MinerPower> {
        let power: MinerPowerLotusJson = self
            .call(RpcRequest::new(
                STATE_MINER_POWER,
                json!([LotusJson(*addr), LotusJson(key.clone())]),
            ))
            .await?;
        Ok(power.into())
    }

    async fn state_read_state(
        &self,
        addr: &Address,
        key: &TipSetKey,
    ) -> anyhow::Result<ActorState> {
        let state: ActorStateLotusJson = self
            .call(RpcRequest::new(
                STATE_READ_STATE,
                json!([LotusJson(*addr), LotusJson(key.clone())]),
            ))
            .await?;
        Ok(state.into())
    }

    async fn state_changed_actors(
        &self,
        prev: &Cid,
        curr: &Cid,
    ) -> anyhow::Result<HashMap<Address, Actor>> {
        let changed: BTreeMap<String, LotusJson<Actor>> = self
            .call(RpcRequest::new(
                STATE_CHANGED_ACTORS,
                json!([LotusJson(*prev), LotusJson(*curr)]),
            ))
            .await?;
        changed
            .into_iter()
            .map(|(addr, actor)| {
                let addr = crate::shim::address::parse(&addr)
                    .with_context(|| format!("invalid address {addr}"))?;
                Ok((addr, actor.into_inner()))
            })
            .collect()
    }

    async fn state_network_version(&self, key: &TipSetKey) -> anyhow::Result<NetworkVersion> {
        self.call(RpcRequest::new(
            STATE_NETWORK_VERSION,
            json!([LotusJson(key.clone())]),
        ))
        .await
    }

    async fn state_actor_code_cids(
        &self,
        version: NetworkVersion,
    ) -> anyhow::Result<BTreeMap<String, Cid>> {
        let codes: BTreeMap<String, LotusJson<Cid>> = self
            .call(RpcRequest::new(STATE_ACTOR_CODE_CIDS, json!([version])))
            .await?;
        Ok(codes
            .into_iter()
            .map(|(name, code)| (name, code.into_inner()))
            .collect())
    }

    async fn circulating_supply(&self, key: &TipSetKey) -> anyhow::Result<CirculatingSupply> {
        let supply: CirculatingSupplyLotusJson = self
            .call(RpcRequest::new(
                STATE_VM_CIRCULATING_SUPPLY_INTERNAL,
                json!([LotusJson(key.clone())]),
            ))
            .await?;
        Ok(supply.into())
    }

    async fn get_executed_and_block_messages_for_tipset(
        &self,
        current: &TipSet,
        executed: &TipSet,
    ) -> anyhow::Result<TipSetMessages> {
        let block = self.chain_get_block_messages(executed).await?;
        let mut included: HashMap<Cid, (usize, Vec<Cid>)> = HashMap::new();
        for messages in &block {
            for message in messages.messages() {
                included
                    .entry(message.cid)
                    .or_insert_with(|| (message.size_bytes, vec![]))
                    .1
                    .push(messages.block);
            }
        }

        // every block of `current` commits to the same parent messages
        let first = current
            .block_headers()
            .first()
            .context("tipset without blocks")?
            .cid();
        let parent_messages: Option<Vec<ParentMessageLotusJson>> = self
            .call(RpcRequest::new(
                CHAIN_GET_PARENT_MESSAGES,
                json!([LotusJson(*first)]),
            ))
            .await?;
        let receipts: LotusJson<Vec<Receipt>> = self
            .call(RpcRequest::new(
                CHAIN_GET_PARENT_RECEIPTS,
                json!([LotusJson(*first)]),
            ))
            .await?;
        let parent_messages = parent_messages.unwrap_or_default();
        let receipts = receipts.into_inner();
        anyhow::ensure!(
            parent_messages.len() == receipts.len(),
            "{} parent messages but {} receipts at height {}",
            parent_messages.len(),
            receipts.len(),
            current.epoch()
        );

        let mut codes = HashMap::new();
        let mut out = Vec::with_capacity(parent_messages.len());
        for (index, (parent, receipt)) in
            parent_messages.into_iter().zip(receipts).enumerate()
        {
            let cid = parent.cid.into_inner();
            let message = parent.message.into_inner();
            let (size_bytes, blocks) = match included.remove(&cid) {
                Some(it) => it,
                None => (fvm_ipld_encoding::to_vec(&message)?.len(), vec![]),
            };
            out.push(ExecutedMessage {
                cid,
                from_actor_code: self.actor_code(&mut codes, &message.from, current.key()).await?,
                to_actor_code: self.actor_code(&mut codes, &message.to, current.key()).await?,
                index: index as u64,
                size_bytes,
                blocks,
                receipt,
                message,
            });
        }
        Ok(TipSetMessages {
            executed: out,
            block,
        })
    }

    async fn get_message_executions_for_tipset(
        &self,
        current: &TipSet,
        executed: &TipSet,
    ) -> anyhow::Result<Vec<MessageExecution>> {
        let mut included = HashSet::new();
        for messages in self.chain_get_block_messages(executed).await? {
            included.extend(messages.messages().map(|m| m.cid));
        }
        let output: ComputeStateOutputLotusJson = self
            .call(
                RpcRequest::new(
                    STATE_COMPUTE,
                    json!([executed.epoch(), null, LotusJson(executed.key().clone())]),
                )
                .with_timeout(STATE_COMPUTE_TIMEOUT),
            )
            .await?;

        let mut codes = HashMap::new();
        let mut out = vec![];
        for invocation in output.trace.unwrap_or_default() {
            let cid = invocation.msg_cid.into_inner();
            let message = invocation.msg.into_inner();
            if !invocation.error.is_empty() {
                warn!("message {cid} failed to execute: {}", invocation.error);
            }
            let receipt = invocation
                .msg_rct
                .into_inner()
                .with_context(|| format!("no receipt for message {cid}"))?;
            let trace = ExecutionTrace::from(invocation.execution_trace);
            out.push(MessageExecution {
                cid,
                implicit: !included.contains(&cid),
                from_actor_code: self.actor_code(&mut codes, &message.from, current.key()).await?,
                to_actor_code: match trace.to_actor_code {
                    Some(code) => Some(code),
                    None => self.actor_code(&mut codes, &message.to, current.key()).await?,
                },
                message,
                receipt,
                trace,
            });
        }
        Ok(out)
    }

    async fn compute_base_fee(&self, ts: &TipSet) -> anyhow::Result<TokenAmount> {
        let mut seen = HashSet::new();
        let mut gas_limit = 0u64;
        for messages in self.chain_get_block_messages(ts).await? {
            for message in messages.messages() {
                if seen.insert(message.cid) {
                    gas_limit = gas_limit.saturating_add(message.message.gas_limit);
                }
            }
        }
        Ok(crate::gas::compute_next_base_fee(
            ts.parent_base_fee(),
            gas_limit,
            ts.len(),
        ))
    }
}
