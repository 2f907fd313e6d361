// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Transformers turn the records of one model type into what a sink stores.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use strum::{AsRefStr, Display};

use crate::blocks::TipSet;
use crate::bus::{self, Handler};
use crate::model::reports::ProcessingReport;
use crate::model::{
    Model, ModelBatch, ModelMeta, Row, ToRow, actors, blocks, chain, messages,
};

/// Records of one model type produced for one tipset pair. Published under
/// the string form of `meta`.
#[derive(Clone, Debug)]
pub struct ModelBatchMessage {
    pub meta: ModelMeta,
    pub current: Arc<TipSet>,
    pub executed: Arc<TipSet>,
    pub data: ModelBatch,
}

pub type ModelMessage = Arc<ModelBatchMessage>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum TransformKind {
    /// Table rows.
    Persistable,
    /// Records for the archive.
    Cborable,
}

/// Rows stored in one transaction, with the report of the task that
/// produced them once the export session has joined them.
#[derive(Clone, Debug, Default)]
pub struct PersistBatch {
    pub report: Option<ProcessingReport>,
    pub rows: Vec<Row>,
}

#[derive(Clone, Debug)]
pub enum Transformed {
    Persistable(PersistBatch),
    Cborable(ModelMessage),
}

impl Transformed {
    pub fn kind(&self) -> TransformKind {
        match self {
            Self::Persistable(_) => TransformKind::Persistable,
            Self::Cborable(_) => TransformKind::Cborable,
        }
    }
}

pub type Transformer = Arc<dyn Handler<ModelMessage, Transformed>>;

/// Turns records of type `M` into table rows.
pub struct RowTransformer<M> {
    meta: ModelMeta,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model + ToRow> RowTransformer<M> {
    pub fn new(meta: ModelMeta) -> Self {
        Self {
            meta,
            _model: PhantomData,
        }
    }
}

#[async_trait]
impl<M: Model + ToRow> Handler<ModelMessage, Transformed> for RowTransformer<M> {
    fn name(&self) -> String {
        format!("rows({})", self.meta)
    }

    fn matcher(&self) -> anyhow::Result<Regex> {
        bus::exact(&self.meta.to_string())
    }

    async fn handle(
        self: Arc<Self>,
        input: flume::Receiver<ModelMessage>,
        output: flume::Sender<Transformed>,
    ) -> anyhow::Result<()> {
        while let Ok(msg) = input.recv_async().await {
            let rows = msg
                .data
                .iter()
                .map(|model| {
                    (**model)
                        .downcast_ref::<M>()
                        .map(ToRow::to_row)
                        .ok_or_else(|| {
                            anyhow::anyhow!("expected {} but got {}", self.meta, model.meta())
                        })
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            if rows.is_empty() {
                continue;
            }
            output
                .send_async(Transformed::Persistable(PersistBatch { report: None, rows }))
                .await
                .map_err(|_| anyhow::anyhow!("transform output closed"))?;
        }
        Ok(())
    }
}

/// Forwards every batch to the archive.
pub struct CborTransformer;

#[async_trait]
impl Handler<ModelMessage, Transformed> for CborTransformer {
    fn name(&self) -> String {
        "cbor".into()
    }

    fn matcher(&self) -> anyhow::Result<Regex> {
        Ok(Regex::new(".*")?)
    }

    async fn handle(
        self: Arc<Self>,
        input: flume::Receiver<ModelMessage>,
        output: flume::Sender<Transformed>,
    ) -> anyhow::Result<()> {
        while let Ok(msg) = input.recv_async().await {
            output
                .send_async(Transformed::Cborable(msg))
                .await
                .map_err(|_| anyhow::anyhow!("transform output closed"))?;
        }
        Ok(())
    }
}

fn rows<M: Model + ToRow>(meta: ModelMeta) -> Transformer {
    Arc::new(RowTransformer::<M>::new(meta))
}

pub fn cbor_transformer() -> Transformer {
    Arc::new(CborTransformer)
}

/// A row transformer for every record type.
pub fn row_transformers() -> Vec<Transformer> {
    vec![
        rows::<blocks::BlockHeader>(blocks::BlockHeader::META),
        rows::<blocks::BlockParent>(blocks::BlockParent::META),
        rows::<blocks::DrandBlockEntry>(blocks::DrandBlockEntry::META),
        rows::<messages::Message>(messages::Message::META),
        rows::<messages::BlockMessage>(messages::BlockMessage::META),
        rows::<messages::Receipt>(messages::Receipt::META),
        rows::<messages::DerivedGasOutputs>(messages::DerivedGasOutputs::META),
        rows::<messages::MessageGasEconomy>(messages::MessageGasEconomy::META),
        rows::<messages::VmMessage>(messages::VmMessage::META),
        rows::<chain::ChainEconomics>(chain::ChainEconomics::META),
        rows::<chain::ChainConsensus>(chain::ChainConsensus::META),
        rows::<actors::Actor>(actors::Actor::META),
        rows::<actors::ActorState>(actors::ActorState::META),
        rows::<actors::IdAddress>(actors::IdAddress::META),
        rows::<actors::ActorEvent>(actors::ActorEvent::META),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Router;
    use crate::model::blocks::BlockParent;
    use crate::test_utils::tipset_at;

    fn batch(meta: ModelMeta, data: ModelBatch) -> ModelMessage {
        Arc::new(ModelBatchMessage {
            meta,
            current: tipset_at(2),
            executed: tipset_at(1),
            data,
        })
    }

    fn parent(block: &str) -> Arc<dyn Model> {
        Arc::new(BlockParent {
            height: 2,
            block: block.into(),
            parent: "p".into(),
        })
    }

    #[tokio::test]
    async fn rows_and_archive_batches() {
        let mut handlers = row_transformers();
        handlers.push(Arc::new(CborTransformer));
        let (router, output) = Router::new(handlers).unwrap();
        let meta = BlockParent::META;
        let delivered = router
            .emit(&meta.to_string(), batch(meta.clone(), vec![parent("a"), parent("b")]))
            .await
            .unwrap();
        assert_eq!(delivered, 2);
        router.stop().await.unwrap();

        let out: Vec<Transformed> = output.drain().collect();
        assert_eq!(out.len(), 2);
        let rows = out
            .iter()
            .find_map(|t| match t {
                Transformed::Persistable(batch) => Some(&batch.rows),
                _ => None,
            })
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].table, "block_parents");
        assert!(out.iter().any(|t| t.kind() == TransformKind::Cborable));
    }

    #[tokio::test]
    async fn mismatched_records_fail_the_transformer() {
        let (router, _output) =
            Router::new(vec![rows::<blocks::BlockHeader>(blocks::BlockHeader::META)]).unwrap();
        let meta = blocks::BlockHeader::META;
        router
            .emit(&meta.to_string(), batch(meta, vec![parent("a")]))
            .await
            .unwrap();
        assert!(router.stop().await.is_err());
    }
}
