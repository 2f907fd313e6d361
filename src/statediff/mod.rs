// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Actor changes between two state roots.

use ahash::HashMap;
use anyhow::Context as _;
use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use ipld_core::ipld::Ipld;
use itertools::{EitherOrBoth, Itertools as _};
use strum::{AsRefStr, Display};

use crate::actors::Actor;
use crate::ipld::hamt::{self, ChangeType as HamtChange};
use crate::shim::address::Address;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, AsRefStr, Display)]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
    /// The actor differs but the walk that found it cannot tell how.
    Unknown,
}

/// An actor that changed. Removed actors carry their previous value, all
/// others their current one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActorChange {
    pub actor: Actor,
    pub change: ChangeType,
}

pub type ActorStateChanges = HashMap<Address, ActorChange>;

/// Versions below this use HAMT encodings the structural diff does not support.
const FIRST_HAMTV3_VERSION: u64 = 2;

/// The state tree root: `[version, actors, info]` from version 1 on, the bare
/// actors HAMT before that.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateRoot {
    pub version: u64,
    pub actors: Cid,
}

impl StateRoot {
    pub fn load(store: &impl Blockstore, root: &Cid) -> anyhow::Result<Self> {
        let bytes = store
            .get(root)?
            .with_context(|| format!("state root {root} not found"))?;
        let ipld: Ipld = serde_ipld_dagcbor::from_slice(&bytes)
            .with_context(|| format!("malformed state root {root}"))?;
        match ipld {
            Ipld::List(fields) if fields.len() == 3 => match (&fields[0], &fields[1]) {
                (Ipld::Integer(version), Ipld::Link(actors)) => Ok(Self {
                    version: u64::try_from(*version)?,
                    actors: *actors,
                }),
                _ => Ok(Self::legacy(root)),
            },
            _ => Ok(Self::legacy(root)),
        }
    }

    fn legacy(root: &Cid) -> Self {
        Self {
            version: 0,
            actors: *root,
        }
    }

    fn supports_structural_diff(&self) -> bool {
        self.version >= FIRST_HAMTV3_VERSION
    }
}

fn decode_address(key: &[u8]) -> anyhow::Result<Address> {
    Address::from_bytes(key).with_context(|| format!("invalid address key {key:?}"))
}

fn decode_actor(bytes: Option<&[u8]>) -> anyhow::Result<Actor> {
    Actor::from_cbor(bytes.context("change carries no actor")?)
}

/// Diffs the state trees under `prev` and `curr`, using the structural HAMT
/// diff when both trees support it and a full walk otherwise.
pub fn diff_state_roots(
    store: &impl Blockstore,
    prev: &Cid,
    curr: &Cid,
) -> anyhow::Result<ActorStateChanges> {
    let prev = StateRoot::load(store, prev)?;
    let curr = StateRoot::load(store, curr)?;
    if prev.version == curr.version && prev.supports_structural_diff() {
        fast_diff(store, &prev.actors, &curr.actors)
    } else {
        tracing::debug!(
            "state tree versions {} and {}, walking both trees",
            prev.version,
            curr.version
        );
        full_walk_diff(store, &prev.actors, &curr.actors)
    }
}

/// Structural diff of two actor HAMTs, with precise change types.
pub fn fast_diff(
    store: &impl Blockstore,
    prev: &Cid,
    curr: &Cid,
) -> anyhow::Result<ActorStateChanges> {
    hamt::diff(store, prev, curr)?
        .into_iter()
        .map(|change| {
            let address = decode_address(&change.key)?;
            let actor_change = match change.kind {
                HamtChange::Add => ActorChange {
                    actor: decode_actor(change.after.as_deref())?,
                    change: ChangeType::Added,
                },
                HamtChange::Remove => ActorChange {
                    actor: decode_actor(change.before.as_deref())?,
                    change: ChangeType::Removed,
                },
                HamtChange::Modify => ActorChange {
                    actor: decode_actor(change.after.as_deref())?,
                    change: ChangeType::Modified,
                },
            };
            Ok((address, actor_change))
        })
        .collect()
}

fn actors(store: &impl Blockstore, root: &Cid) -> anyhow::Result<Vec<(Vec<u8>, Actor)>> {
    let mut out = vec![];
    hamt::for_each(store, root, |key, value| {
        let bytes = serde_ipld_dagcbor::to_vec(value)?;
        out.push((key.to_vec(), Actor::from_cbor(&bytes)?));
        Ok(())
    })?;
    out.sort_by(|(a, _), (b, _)| a.cmp(b));
    Ok(out)
}

/// Enumerates both actor HAMTs and compares them by address. Every
/// difference is reported as [`ChangeType::Unknown`].
pub fn full_walk_diff(
    store: &impl Blockstore,
    prev: &Cid,
    curr: &Cid,
) -> anyhow::Result<ActorStateChanges> {
    let mut changes = ActorStateChanges::default();
    if prev == curr {
        return Ok(changes);
    }
    for entry in actors(store, prev)?
        .into_iter()
        .merge_join_by(actors(store, curr)?, |(a, _), (b, _)| a.cmp(b))
    {
        let (key, actor) = match entry {
            EitherOrBoth::Left(removed) => removed,
            EitherOrBoth::Right(added) => added,
            EitherOrBoth::Both((_, before), after) if before != after.1 => after,
            EitherOrBoth::Both(..) => continue,
        };
        changes.insert(
            decode_address(&key)?,
            ActorChange {
                actor,
                change: ChangeType::Unknown,
            },
        );
    }
    Ok(changes)
}

/// Every actor in the state tree under `root`, reported as added.
pub fn genesis_actors(store: &impl Blockstore, root: &Cid) -> anyhow::Result<ActorStateChanges> {
    let root = StateRoot::load(store, root)?;
    actors(store, &root.actors)?
        .into_iter()
        .map(|(key, actor)| {
            Ok((
                decode_address(&key)?,
                ActorChange {
                    actor,
                    change: ChangeType::Added,
                },
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::db::MemoryDB;
    use crate::utils::encoding::{cbor_cid, put_cbor};
    use crate::shim::econ::TokenAmount;
    use fvm_ipld_hamt::{BytesKey, Hamt};
    use pretty_assertions::assert_eq;

    fn actor(id: u64, nonce: u64) -> Actor {
        Actor {
            code: cbor_cid(b"account"),
            head: cbor_cid(&id.to_be_bytes()),
            nonce,
            balance: TokenAmount::from_atto(id * 10),
        }
    }

    fn state_tree(store: &MemoryDB, version: u64, actors: &[(u64, Actor)]) -> Cid {
        let mut hamt = Hamt::<_, Actor>::new_with_bit_width(store, 5);
        for (id, actor) in actors {
            hamt.set(BytesKey(Address::new_id(*id).to_bytes()), actor.clone())
                .unwrap();
        }
        let actors_root = hamt.flush().unwrap();
        if version == 0 {
            return actors_root;
        }
        put_cbor(store, &(version, actors_root, cbor_cid(b"info"))).unwrap()
    }

    fn fixture(store: &MemoryDB, version: u64) -> (Cid, Cid) {
        let prev: Vec<_> = (1..60).map(|id| (id, actor(id, 0))).collect();
        let curr: Vec<_> = (1..60)
            .filter(|id| *id != 3)
            .map(|id| (id, actor(id, u64::from(id == 10))))
            .chain([(100, actor(100, 0))])
            .collect();
        (
            state_tree(store, version, &prev),
            state_tree(store, version, &curr),
        )
    }

    #[test]
    fn structural_diff_is_precise() {
        let store = MemoryDB::default();
        let (prev, curr) = fixture(&store, 5);
        let changes = diff_state_roots(&store, &prev, &curr).unwrap();
        assert_eq!(changes.len(), 3);
        assert_eq!(
            changes[&Address::new_id(3)],
            ActorChange {
                actor: actor(3, 0),
                change: ChangeType::Removed
            }
        );
        assert_eq!(
            changes[&Address::new_id(10)],
            ActorChange {
                actor: actor(10, 1),
                change: ChangeType::Modified
            }
        );
        assert_eq!(changes[&Address::new_id(100)].change, ChangeType::Added);
    }

    #[test]
    fn fast_and_full_walk_agree() {
        let store = MemoryDB::default();
        let (prev, curr) = fixture(&store, 5);
        let prev = StateRoot::load(&store, &prev).unwrap();
        let curr = StateRoot::load(&store, &curr).unwrap();
        let fast = fast_diff(&store, &prev.actors, &curr.actors).unwrap();
        let slow = full_walk_diff(&store, &prev.actors, &curr.actors).unwrap();
        let strip = |changes: ActorStateChanges| {
            changes
                .into_iter()
                .map(|(addr, change)| (addr, change.actor))
                .collect::<HashMap<_, _>>()
        };
        assert_eq!(strip(fast), strip(slow));
    }

    #[test]
    fn legacy_trees_are_walked() {
        let store = MemoryDB::default();
        let (prev, curr) = fixture(&store, 0);
        assert_eq!(StateRoot::load(&store, &prev).unwrap().version, 0);
        let changes = diff_state_roots(&store, &prev, &curr).unwrap();
        assert_eq!(changes.len(), 3);
        assert!(changes.values().all(|c| c.change == ChangeType::Unknown));
    }

    #[test]
    fn version_mismatch_is_walked() {
        let store = MemoryDB::default();
        let (prev, _) = fixture(&store, 4);
        let (_, curr) = fixture(&store, 5);
        let changes = diff_state_roots(&store, &prev, &curr).unwrap();
        assert_eq!(changes.len(), 3);
        assert!(changes.values().all(|c| c.change == ChangeType::Unknown));
    }

    #[test]
    fn genesis_reports_everything_added() {
        let store = MemoryDB::default();
        let (root, _) = fixture(&store, 5);
        let changes = genesis_actors(&store, &root).unwrap();
        assert_eq!(changes.len(), 59);
        assert!(changes.values().all(|c| c.change == ChangeType::Added));
    }

    #[test]
    fn identical_roots() {
        let store = MemoryDB::default();
        let (root, _) = fixture(&store, 5);
        assert!(diff_state_roots(&store, &root, &root).unwrap().is_empty());
    }
}
