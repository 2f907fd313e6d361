// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use anyhow::Context as _;
use async_trait::async_trait;
use base64::{Engine as _, prelude::BASE64_STANDARD};

use super::{Extracted, TipSetPairExtractor, atto};
use crate::actors::ActorCodes;
use crate::blocks::TipSet;
use crate::datasource::DataSource;
use crate::gas::compute_gas_outputs;
use crate::model::messages::{BlockMessage, DerivedGasOutputs, Message, Receipt};
use crate::shim::error::ExitCode;
use cid::Cid;

/// Messages included in the blocks of `executed`, once each.
pub struct MessageExtractor;

#[async_trait]
impl TipSetPairExtractor for MessageExtractor {
    async fn extract(
        &self,
        ds: &DataSource,
        current: &TipSet,
        executed: &TipSet,
    ) -> anyhow::Result<Extracted> {
        let messages = ds.executed_and_block_messages(current, executed).await?;
        let mut out = Extracted::default();
        for msg in &messages.executed {
            out.push(Message {
                height: executed.epoch(),
                cid: msg.cid.to_string(),
                from: msg.message.from.to_string(),
                to: msg.message.to.to_string(),
                value: atto(&msg.message.value),
                gas_fee_cap: atto(&msg.message.gas_fee_cap),
                gas_premium: atto(&msg.message.gas_premium),
                gas_limit: msg.message.gas_limit,
                size_bytes: msg.size_bytes as u64,
                nonce: msg.message.sequence,
                method: msg.message.method_num,
                params: BASE64_STANDARD.encode(msg.message.params.bytes()),
            });
        }
        Ok(out)
    }
}

/// One row per block of `current` and message it includes.
pub struct BlockMessageExtractor;

#[async_trait]
impl TipSetPairExtractor for BlockMessageExtractor {
    async fn extract(
        &self,
        ds: &DataSource,
        current: &TipSet,
        _executed: &TipSet,
    ) -> anyhow::Result<Extracted> {
        let blocks = ds.tipset_block_messages(current).await?;
        let mut out = Extracted::default();
        for block in &blocks {
            for msg in block.messages() {
                out.push(BlockMessage {
                    height: current.epoch(),
                    block: block.block.to_string(),
                    message: msg.cid.to_string(),
                });
            }
        }
        Ok(out)
    }
}

/// Receipts `current` commits to for the messages of `executed`.
pub struct ReceiptExtractor;

#[async_trait]
impl TipSetPairExtractor for ReceiptExtractor {
    async fn extract(
        &self,
        ds: &DataSource,
        current: &TipSet,
        executed: &TipSet,
    ) -> anyhow::Result<Extracted> {
        let blocks = ds.tipset_message_receipts(current, executed).await?;
        let mut out = Extracted::default();
        for receipt in blocks.iter().flat_map(|block| &block.receipts) {
            out.push(Receipt {
                height: current.epoch(),
                message: receipt.message.cid.to_string(),
                state_root: current.parent_state_root().to_string(),
                idx: receipt.index,
                exit_code: receipt.receipt.exit_code.value(),
                gas_used: receipt.receipt.gas_used,
            });
        }
        Ok(out)
    }
}

pub(crate) fn actor_name(codes: &ActorCodes, code: &Cid) -> String {
    match (codes.kind(code), codes.version(code)) {
        (Some(kind), Some(version)) => format!("fil/{version}/{}", kind.manifest_name()),
        _ => "<unknown>".into(),
    }
}

/// Gas accounting of every executed message.
pub struct GasOutputsExtractor;

#[async_trait]
impl TipSetPairExtractor for GasOutputsExtractor {
    async fn extract(
        &self,
        ds: &DataSource,
        current: &TipSet,
        executed: &TipSet,
    ) -> anyhow::Result<Extracted> {
        let messages = ds.executed_and_block_messages(current, executed).await?;
        let should_burn = ds.should_burn_fn(executed).await?;
        let codes = ds.actor_codes(executed).await?;
        let base_fee = executed.parent_base_fee();
        let mut out = Extracted::default();
        for msg in &messages.executed {
            let actor_name = match &msg.to_actor_code {
                Some(code) => actor_name(&codes, code),
                None if msg.receipt.exit_code == ExitCode::OK => {
                    return Err(anyhow::anyhow!(
                        "no actor code for recipient {} of successful message {}",
                        msg.message.to,
                        msg.cid
                    ))
                    .context("deriving gas outputs");
                }
                // a failed send to an address that never became an actor
                None => "<unknown>".into(),
            };
            let gas = compute_gas_outputs(
                msg.receipt.gas_used,
                msg.message.gas_limit,
                base_fee,
                &msg.message.gas_fee_cap,
                &msg.message.gas_premium,
                should_burn.should_burn(msg),
            );
            out.push(DerivedGasOutputs {
                height: executed.epoch(),
                cid: msg.cid.to_string(),
                state_root: current.parent_state_root().to_string(),
                from: msg.message.from.to_string(),
                to: msg.message.to.to_string(),
                value: atto(&msg.message.value),
                gas_fee_cap: atto(&msg.message.gas_fee_cap),
                gas_premium: atto(&msg.message.gas_premium),
                gas_limit: msg.message.gas_limit,
                size_bytes: msg.size_bytes as u64,
                nonce: msg.message.sequence,
                method: msg.message.method_num,
                actor_name,
                exit_code: msg.receipt.exit_code.value(),
                gas_used: msg.receipt.gas_used,
                parent_base_fee: atto(base_fee),
                base_fee_burn: atto(&gas.base_fee_burn),
                over_estimation_burn: atto(&gas.over_estimation_burn),
                miner_penalty: atto(&gas.miner_penalty),
                miner_tip: atto(&gas.miner_tip),
                refund: atto(&gas.refund),
                gas_refund: gas.gas_refund,
                gas_burned: gas.gas_burned,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{BlockMessages, ChainMessage, ExecutedMessage, TipSetMessages};
    use crate::model::Model;
    use crate::shim::{address::Address, econ::TokenAmount, message, receipt};
    use crate::test_utils::FakeChain;
    use crate::utils::encoding::cbor_cid;
    use std::sync::Arc;

    fn executed_msg(nonce: u64, exit_code: ExitCode, to_code: Option<Cid>) -> ExecutedMessage {
        let message = message::Message {
            to: Address::new_id(1001),
            from: Address::new_id(1002),
            sequence: nonce,
            gas_limit: 2000,
            gas_fee_cap: TokenAmount::from_atto(150),
            gas_premium: TokenAmount::from_atto(10),
            ..Default::default()
        };
        ExecutedMessage {
            cid: message.cid().unwrap(),
            message,
            size_bytes: 100,
            receipt: receipt::Receipt {
                exit_code,
                return_data: Default::default(),
                gas_used: 1000,
                events_root: None,
            },
            index: nonce,
            blocks: vec![],
            from_actor_code: None,
            to_actor_code: to_code,
        }
    }

    fn setup(messages: Vec<ExecutedMessage>) -> (DataSource, Arc<TipSet>, Arc<TipSet>) {
        let chain = FakeChain::linear([9, 10]);
        let (current, executed) = (chain.tipset_at(10), chain.tipset_at(9));
        let block = BlockMessages {
            block: *executed.block_headers()[0].cid(),
            miner: Address::new_id(1000),
            bls_messages: messages
                .iter()
                .map(|m| ChainMessage {
                    cid: m.cid,
                    message: m.message.clone(),
                    size_bytes: m.size_bytes,
                })
                .collect(),
            secp_messages: vec![],
        };
        chain.set_messages(
            &current,
            TipSetMessages {
                executed: messages,
                block: vec![block],
            },
        );
        (
            DataSource::new(Arc::new(chain)).unwrap(),
            current,
            executed,
        )
    }

    #[tokio::test]
    async fn gas_outputs_per_message() {
        let (ds, current, executed) =
            setup(vec![executed_msg(0, ExitCode::OK, Some(cbor_cid(b"account")))]);
        let out = GasOutputsExtractor
            .extract(&ds, &current, &executed)
            .await
            .unwrap();
        assert_eq!(out.models.len(), 1);
        let row = (*out.models[0])
            .downcast_ref::<DerivedGasOutputs>()
            .unwrap()
            .clone();
        assert_eq!(row.height, 9);
        assert_eq!(row.base_fee_burn, "100000");
        assert_eq!(row.gas_burned, 900);
        assert_eq!(row.actor_name, "<unknown>");
    }

    #[tokio::test]
    async fn unresolved_recipient_of_successful_message_fails() {
        let (ds, current, executed) = setup(vec![executed_msg(0, ExitCode::OK, None)]);
        assert!(
            GasOutputsExtractor
                .extract(&ds, &current, &executed)
                .await
                .is_err()
        );

        let (ds, current, executed) =
            setup(vec![executed_msg(0, ExitCode::SYS_INVALID_RECEIVER, None)]);
        let out = GasOutputsExtractor
            .extract(&ds, &current, &executed)
            .await
            .unwrap();
        assert_eq!(out.models.len(), 1);
    }

    #[tokio::test]
    async fn messages_and_receipts() {
        let (ds, current, executed) = setup(vec![
            executed_msg(0, ExitCode::OK, None),
            executed_msg(1, ExitCode::OK, None),
        ]);
        let messages = MessageExtractor
            .extract(&ds, &current, &executed)
            .await
            .unwrap();
        assert_eq!(messages.models.len(), 2);
        assert!(messages.models.iter().all(|m| m.meta() == Message::META));

        let receipts = ReceiptExtractor
            .extract(&ds, &current, &executed)
            .await
            .unwrap();
        let idx: Vec<u64> = receipts
            .models
            .iter()
            .map(|m| (**m).downcast_ref::<Receipt>().unwrap().idx)
            .collect();
        assert_eq!(idx, vec![0, 1]);
    }
}
