// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Extractors turn a tipset, a tipset pair or a changed actor into records.
//!
//! An extractor returning `Err` fails its task for the tipset, which is
//! reported as `ERROR`. Errors wrapped in [`FatalTaskError`] abort the whole
//! tipset instead. Problems with single records go to [`Extracted::errors`].

pub mod actors;
pub mod blocks;
pub mod consensus;
pub mod economics;
pub mod messages;
pub mod vm;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::actors::Actor;
use crate::blocks::TipSet;
use crate::datasource::DataSource;
use crate::model::{Model, ModelBatch};
use crate::shim::address::Address;
use crate::statediff::ChangeType;

/// Output of one extraction.
#[derive(Debug, Default)]
pub struct Extracted {
    pub models: ModelBatch,
    pub errors: Vec<anyhow::Error>,
    pub status_info: Option<String>,
}

impl Extracted {
    pub fn models(models: impl IntoIterator<Item = Arc<dyn Model>>) -> Self {
        Self {
            models: models.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn push(&mut self, model: impl Model) {
        self.models.push(Arc::new(model));
    }
}

/// An error that must stop indexing instead of failing a single task.
#[derive(Debug, Error)]
#[error("fatal: {0:#}")]
pub struct FatalTaskError(pub anyhow::Error);

impl FatalTaskError {
    pub fn is_fatal(err: &anyhow::Error) -> bool {
        err.downcast_ref::<FatalTaskError>().is_some()
    }
}

#[async_trait]
pub trait TipSetExtractor: Send + Sync {
    async fn extract(&self, ds: &DataSource, current: &TipSet) -> anyhow::Result<Extracted>;
}

/// Extractor over `current` and its parent `executed`, whose messages the
/// state of `current` reflects.
#[async_trait]
pub trait TipSetPairExtractor: Send + Sync {
    async fn extract(
        &self,
        ds: &DataSource,
        current: &TipSet,
        executed: &TipSet,
    ) -> anyhow::Result<Extracted>;
}

/// A changed actor, as handed to actor extractors.
#[derive(Clone, Debug)]
pub struct ActorInfo {
    pub address: Address,
    /// The previous value for removed actors, the current one otherwise.
    pub actor: Actor,
    pub change: ChangeType,
    pub current: Arc<TipSet>,
    pub executed: Arc<TipSet>,
}

#[async_trait]
pub trait ActorExtractor: Send + Sync {
    async fn extract(&self, ds: &DataSource, info: &ActorInfo) -> anyhow::Result<ModelBatch>;
}

/// Renders an amount or big integer for storage.
pub(crate) fn atto(amount: &crate::shim::econ::TokenAmount) -> String {
    amount.atto().to_string()
}
