// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Schema-free reading and diffing of HAMT nodes.
//!
//! Nodes are `[bitfield, pointers]`, where the bitfield is a big-endian byte
//! string and each pointer is either a link to a child node or a bucket of
//! `[key, value]` pairs. Pre-v3 nodes wrap each pointer in a single entry map
//! keyed `"0"` (link) or `"1"` (bucket); both encodings are accepted.
//!
//! Only the bitfield positions are compared, never key hashes, so two trees
//! can be diffed as long as they share bit width and hash function.

use std::collections::BTreeMap;

use anyhow::{Context as _, bail};
use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use ipld_core::ipld::Ipld;
use itertools::{EitherOrBoth, Itertools as _};

#[derive(Debug, Clone, PartialEq)]
pub enum Pointer {
    Link(Cid),
    Bucket(Vec<(Vec<u8>, Ipld)>),
}

impl Pointer {
    fn from_ipld(ipld: Ipld) -> anyhow::Result<Self> {
        match ipld {
            Ipld::Link(cid) => Ok(Self::Link(cid)),
            Ipld::List(pairs) => Ok(Self::Bucket(
                pairs
                    .into_iter()
                    .map(key_value_from_ipld)
                    .collect::<anyhow::Result<_>>()?,
            )),
            Ipld::Map(map) if map.len() == 1 => {
                let (key, value) = map.into_iter().next().context("empty pointer map")?;
                match (key.as_str(), value) {
                    ("0", Ipld::Link(cid)) => Ok(Self::Link(cid)),
                    ("1", bucket @ Ipld::List(_)) => Self::from_ipld(bucket),
                    (key, value) => bail!("unexpected legacy pointer {key}: {value:?}"),
                }
            }
            other => bail!("expected a link or a bucket, got {other:?}"),
        }
    }
}

fn key_value_from_ipld(ipld: Ipld) -> anyhow::Result<(Vec<u8>, Ipld)> {
    match ipld {
        Ipld::List(kv) if kv.len() == 2 => {
            let mut kv = kv.into_iter();
            match (kv.next(), kv.next()) {
                (Some(Ipld::Bytes(key)), Some(value)) => Ok((key, value)),
                (key, _) => bail!("expected a byte string key, got {key:?}"),
            }
        }
        other => bail!("expected a key-value pair, got {other:?}"),
    }
}

/// Set bit positions of a big-endian bitfield, in ascending order.
fn set_bits(bitfield: &[u8]) -> Vec<u32> {
    let mut bits = vec![];
    for (i, byte) in bitfield.iter().rev().enumerate() {
        for bit in 0..8u32 {
            if byte & (1 << bit) != 0 {
                bits.push(i as u32 * 8 + bit);
            }
        }
    }
    bits
}

/// A decoded HAMT node: each occupied slot with its pointer.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    slots: Vec<(u32, Pointer)>,
}

impl Node {
    pub fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        let ipld: Ipld = serde_ipld_dagcbor::from_slice(bytes)?;
        let Ipld::List(fields) = ipld else {
            bail!("HAMT node is not a list");
        };
        let mut fields = fields.into_iter();
        let (Some(Ipld::Bytes(bitfield)), Some(Ipld::List(pointers)), None) =
            (fields.next(), fields.next(), fields.next())
        else {
            bail!("HAMT node must be [bitfield, pointers]");
        };
        let bits = set_bits(&bitfield);
        anyhow::ensure!(
            bits.len() == pointers.len(),
            "bitfield has {} bits set but node has {} pointers",
            bits.len(),
            pointers.len()
        );
        let slots = bits
            .into_iter()
            .zip(pointers)
            .map(|(bit, ptr)| Ok((bit, Pointer::from_ipld(ptr)?)))
            .collect::<anyhow::Result<_>>()?;
        Ok(Self { slots })
    }

    pub fn load(store: &impl Blockstore, cid: &Cid) -> anyhow::Result<Self> {
        let bytes = store
            .get(cid)?
            .with_context(|| format!("HAMT node {cid} not found"))?;
        Self::decode(&bytes).with_context(|| format!("malformed HAMT node {cid}"))
    }

    pub fn slots(&self) -> &[(u32, Pointer)] {
        &self.slots
    }
}

/// Visits every key-value pair under `root`.
pub fn for_each<BS, F>(store: &BS, root: &Cid, mut f: F) -> anyhow::Result<()>
where
    BS: Blockstore,
    F: FnMut(&[u8], &Ipld) -> anyhow::Result<()>,
{
    fn walk<BS: Blockstore>(
        store: &BS,
        cid: &Cid,
        f: &mut dyn FnMut(&[u8], &Ipld) -> anyhow::Result<()>,
    ) -> anyhow::Result<()> {
        for (_, ptr) in Node::load(store, cid)?.slots {
            match ptr {
                Pointer::Link(child) => walk(store, &child, f)?,
                Pointer::Bucket(pairs) => {
                    for (key, value) in pairs {
                        f(&key, &value)?;
                    }
                }
            }
        }
        Ok(())
    }
    walk(store, root, &mut f)
}

/// Every key-value pair under `root`, sorted by key.
pub fn entries(store: &impl Blockstore, root: &Cid) -> anyhow::Result<BTreeMap<Vec<u8>, Ipld>> {
    let mut out = BTreeMap::new();
    for_each(store, root, |key, value| {
        out.insert(key.to_vec(), value.clone());
        Ok(())
    })?;
    Ok(out)
}

fn pointer_entries(
    store: &impl Blockstore,
    ptr: &Pointer,
) -> anyhow::Result<BTreeMap<Vec<u8>, Ipld>> {
    match ptr {
        Pointer::Link(cid) => entries(store, cid),
        Pointer::Bucket(pairs) => Ok(pairs.iter().cloned().collect()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    Add,
    Remove,
    Modify,
}

/// One differing key, with the DAG-CBOR encoding of its values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub kind: ChangeType,
    pub key: Vec<u8>,
    pub before: Option<Vec<u8>>,
    pub after: Option<Vec<u8>>,
}

impl Change {
    fn new(key: Vec<u8>, before: Option<&Ipld>, after: Option<&Ipld>) -> anyhow::Result<Self> {
        let kind = match (before, after) {
            (None, Some(_)) => ChangeType::Add,
            (Some(_), None) => ChangeType::Remove,
            (Some(_), Some(_)) => ChangeType::Modify,
            (None, None) => bail!("a change needs a value on at least one side"),
        };
        let encode = |v: &Ipld| serde_ipld_dagcbor::to_vec(v);
        Ok(Self {
            kind,
            key,
            before: before.map(encode).transpose()?,
            after: after.map(encode).transpose()?,
        })
    }
}

/// Structural diff of two HAMTs built with the same bit width and hash function.
///
/// Subtrees whose links are equal are skipped without being loaded.
pub fn diff(store: &impl Blockstore, prev: &Cid, curr: &Cid) -> anyhow::Result<Vec<Change>> {
    let mut changes = vec![];
    diff_links(store, prev, curr, &mut changes)?;
    Ok(changes)
}

fn diff_links(
    store: &impl Blockstore,
    prev: &Cid,
    curr: &Cid,
    out: &mut Vec<Change>,
) -> anyhow::Result<()> {
    if prev == curr {
        return Ok(());
    }
    let prev = Node::load(store, prev)?;
    let curr = Node::load(store, curr)?;
    diff_nodes(store, &prev, &curr, out)
}

fn diff_nodes(
    store: &impl Blockstore,
    prev: &Node,
    curr: &Node,
    out: &mut Vec<Change>,
) -> anyhow::Result<()> {
    for slot in prev
        .slots
        .iter()
        .merge_join_by(curr.slots.iter(), |(a, _), (b, _)| a.cmp(b))
    {
        match slot {
            EitherOrBoth::Left((_, ptr)) => {
                for (key, value) in pointer_entries(store, ptr)? {
                    out.push(Change::new(key, Some(&value), None)?);
                }
            }
            EitherOrBoth::Right((_, ptr)) => {
                for (key, value) in pointer_entries(store, ptr)? {
                    out.push(Change::new(key, None, Some(&value))?);
                }
            }
            EitherOrBoth::Both((_, Pointer::Link(a)), (_, Pointer::Link(b))) => {
                diff_links(store, a, b, out)?;
            }
            EitherOrBoth::Both((_, a), (_, b)) => {
                if a != b {
                    diff_entries(pointer_entries(store, a)?, pointer_entries(store, b)?, out)?;
                }
            }
        }
    }
    Ok(())
}

fn diff_entries(
    prev: BTreeMap<Vec<u8>, Ipld>,
    curr: BTreeMap<Vec<u8>, Ipld>,
    out: &mut Vec<Change>,
) -> anyhow::Result<()> {
    for entry in prev
        .into_iter()
        .merge_join_by(curr, |(a, _), (b, _)| a.cmp(b))
    {
        match entry {
            EitherOrBoth::Left((key, before)) => out.push(Change::new(key, Some(&before), None)?),
            EitherOrBoth::Right((key, after)) => out.push(Change::new(key, None, Some(&after))?),
            EitherOrBoth::Both((key, before), (_, after)) => {
                if before != after {
                    out.push(Change::new(key, Some(&before), Some(&after))?);
                }
            }
        }
    }
    Ok(())
}
