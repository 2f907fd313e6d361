// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The closed set of indexing tasks and the table of extractors behind them.

use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::HashSet;
use anyhow::Context as _;
use cid::Cid;
use itertools::Itertools as _;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator as _, IntoStaticStr};

use crate::actors::{ActorCodes, ActorKind};
use crate::extract::actors::{
    ActorDecoders, ActorEventsExtractor, ActorRecordExtractor, ActorStateExtractor,
    IdAddressExtractor,
};
use crate::extract::blocks::{
    BlockHeaderExtractor, BlockParentsExtractor, DrandBlockEntriesExtractor,
};
use crate::extract::consensus::ConsensusExtractor;
use crate::extract::economics::{ChainEconomicsExtractor, MessageGasEconomyExtractor};
use crate::extract::messages::{
    BlockMessageExtractor, GasOutputsExtractor, MessageExtractor, ReceiptExtractor,
};
use crate::extract::vm::VmMessageExtractor;
use crate::extract::{ActorExtractor, TipSetExtractor, TipSetPairExtractor};

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    AsRefStr,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum TaskName {
    Blocks,
    BlockParents,
    DrandBlockEntries,
    Messages,
    BlockMessages,
    Receipts,
    DerivedGasOutputs,
    MessageGasEconomy,
    ChainEconomics,
    Consensus,
    VmMessages,
    Actor,
    ActorState,
    IdAddresses,
    MinerActorEvents,
    PowerActorEvents,
    MarketActorEvents,
    RewardActorEvents,
    VerifregActorEvents,
    MultisigActorEvents,
}

impl TaskName {
    pub fn all() -> Vec<Self> {
        Self::iter().collect()
    }

    /// Actor kind whose events the task records.
    pub fn event_kind(self) -> Option<ActorKind> {
        Some(match self {
            Self::MinerActorEvents => ActorKind::Miner,
            Self::PowerActorEvents => ActorKind::Power,
            Self::MarketActorEvents => ActorKind::Market,
            Self::RewardActorEvents => ActorKind::Reward,
            Self::VerifregActorEvents => ActorKind::VerifiedRegistry,
            Self::MultisigActorEvents => ActorKind::Multisig,
            _ => return None,
        })
    }
}

/// Parses a comma separated task list. Duplicates are dropped, order is kept.
pub fn parse_tasks(csv: &str) -> anyhow::Result<Vec<TaskName>> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().with_context(|| format!("unknown task {s:?}")))
        .process_results(|tasks| tasks.unique().collect())
}

/// Actors an actor task runs for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActorFilter {
    All,
    Kind(ActorKind),
    Codes(HashSet<Cid>),
}

impl ActorFilter {
    pub fn matches(&self, codes: &ActorCodes, code: &Cid) -> bool {
        match self {
            Self::All => true,
            Self::Kind(kind) => codes.is(code, *kind),
            Self::Codes(set) => set.contains(code),
        }
    }
}

#[derive(Clone)]
pub enum Extractor {
    TipSet(Arc<dyn TipSetExtractor>),
    TipSetPair(Arc<dyn TipSetPairExtractor>),
    Actor {
        extractor: Arc<dyn ActorExtractor>,
        filter: ActorFilter,
    },
}

impl Extractor {
    pub fn is_actor(&self) -> bool {
        matches!(self, Self::Actor { .. })
    }
}

/// Extractors by task name.
#[derive(Clone)]
pub struct TaskRegistry {
    tasks: BTreeMap<TaskName, Extractor>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new(&ActorDecoders::default())
    }
}

impl TaskRegistry {
    pub fn new(decoders: &ActorDecoders) -> Self {
        use Extractor::{TipSet, TipSetPair};
        let actor = |extractor: Arc<dyn ActorExtractor>, filter| Extractor::Actor { extractor, filter };

        let mut tasks = BTreeMap::new();
        tasks.insert(TaskName::Blocks, TipSet(Arc::new(BlockHeaderExtractor)));
        tasks.insert(TaskName::BlockParents, TipSet(Arc::new(BlockParentsExtractor)));
        tasks.insert(
            TaskName::DrandBlockEntries,
            TipSet(Arc::new(DrandBlockEntriesExtractor)),
        );
        tasks.insert(TaskName::Messages, TipSetPair(Arc::new(MessageExtractor)));
        tasks.insert(TaskName::BlockMessages, TipSetPair(Arc::new(BlockMessageExtractor)));
        tasks.insert(TaskName::Receipts, TipSetPair(Arc::new(ReceiptExtractor)));
        tasks.insert(
            TaskName::DerivedGasOutputs,
            TipSetPair(Arc::new(GasOutputsExtractor)),
        );
        tasks.insert(
            TaskName::MessageGasEconomy,
            TipSetPair(Arc::new(MessageGasEconomyExtractor)),
        );
        tasks.insert(
            TaskName::ChainEconomics,
            TipSetPair(Arc::new(ChainEconomicsExtractor)),
        );
        tasks.insert(TaskName::Consensus, TipSetPair(Arc::new(ConsensusExtractor)));
        tasks.insert(TaskName::VmMessages, TipSetPair(Arc::new(VmMessageExtractor)));
        tasks.insert(
            TaskName::Actor,
            actor(Arc::new(ActorRecordExtractor), ActorFilter::All),
        );
        tasks.insert(
            TaskName::ActorState,
            actor(Arc::new(ActorStateExtractor), ActorFilter::All),
        );
        tasks.insert(
            TaskName::IdAddresses,
            actor(Arc::new(IdAddressExtractor), ActorFilter::Kind(ActorKind::Init)),
        );
        for task in TaskName::iter() {
            if let Some(kind) = task.event_kind() {
                tasks.insert(
                    task,
                    actor(
                        Arc::new(ActorEventsExtractor::new(kind, decoders.get(kind))),
                        ActorFilter::Kind(kind),
                    ),
                );
            }
        }
        Self { tasks }
    }

    /// Replaces the extractor of `task`.
    pub fn register(&mut self, task: TaskName, extractor: Extractor) {
        self.tasks.insert(task, extractor);
    }

    pub fn get(&self, task: TaskName) -> Option<&Extractor> {
        self.tasks.get(&task)
    }

    /// Extractors of `tasks`, failing on a task with none registered.
    pub fn select(&self, tasks: &[TaskName]) -> anyhow::Result<Vec<(TaskName, Extractor)>> {
        tasks
            .iter()
            .map(|task| {
                self.get(*task)
                    .cloned()
                    .map(|extractor| (*task, extractor))
                    .with_context(|| format!("no extractor registered for task {task}"))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::encoding::cbor_cid;
    use rstest::rstest;

    #[test]
    fn every_task_has_an_extractor() {
        let registry = TaskRegistry::default();
        let selected = registry.select(&TaskName::all()).unwrap();
        assert_eq!(selected.len(), 20);
        assert_eq!(
            selected.iter().filter(|(_, e)| e.is_actor()).count(),
            9
        );
    }

    #[rstest]
    #[case("blocks", vec![TaskName::Blocks])]
    #[case("blocks, receipts,blocks", vec![TaskName::Blocks, TaskName::Receipts])]
    #[case("verifreg_actor_events", vec![TaskName::VerifregActorEvents])]
    #[case("", vec![])]
    fn parses_task_lists(#[case] input: &str, #[case] expected: Vec<TaskName>) {
        assert_eq!(parse_tasks(input).unwrap(), expected);
    }

    #[test]
    fn rejects_unknown_tasks() {
        assert!(parse_tasks("blocks,nope").is_err());
    }

    #[test]
    fn filters() {
        let mut codes = ActorCodes::default();
        let miner = cbor_cid(b"miner");
        codes.insert(miner, ActorKind::Miner, 9);
        assert!(ActorFilter::All.matches(&codes, &miner));
        assert!(ActorFilter::Kind(ActorKind::Miner).matches(&codes, &miner));
        assert!(!ActorFilter::Kind(ActorKind::Power).matches(&codes, &miner));
        let only = ActorFilter::Codes([miner].into_iter().collect());
        assert!(only.matches(&codes, &miner));
        assert!(!only.matches(&codes, &cbor_cid(b"other")));
    }
}
