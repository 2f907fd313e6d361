// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! CARv1 archives of exported records.
//!
//! The single root of an archive is the `stateMap`, a HAMT keyed by the
//! string form of a tipset key. Each value links to a [`ModelStateContainer`]
//! whose `models` field is the root of the `modelMap`, a HAMT keyed by the
//! string form of a [`ModelMeta`] whose values are AMTs of records. Records
//! are stored in ascending CID order, duplicates included, which makes the
//! root CID a function of the staged records alone.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use cid::Cid;
use fvm_ipld_amt::Amt;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::tuple::*;
use fvm_ipld_hamt::{BytesKey, Hamt};
use ipld_core::ipld::Ipld;
use parking_lot::Mutex;
use regex::Regex;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt as _, BufReader, BufWriter};
use tracing::{debug, info};

use crate::blocks::TipSet;
use crate::bus::{self, Handler};
use crate::ipld::hamt;
use crate::model::{Model, ModelMeta};
use crate::shim::clock::ChainEpoch;
use crate::transform::{TransformKind, Transformed};
use crate::utils::db::{
    MemoryDB, load_car,
    car::{CarBlock, write_car},
};
use crate::utils::encoding::{cbor_cid, collect_links, put_cbor};

/// Bit width of both the `stateMap` and the `modelMap`.
pub const MAP_BIT_WIDTH: u32 = 8;

/// The tipset pair an archive entry was produced for and the root of its
/// `modelMap`.
#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug, PartialEq, Eq)]
pub struct ModelStateContainer {
    pub height: ChainEpoch,
    pub current: String,
    pub parent: String,
    pub models: Cid,
}

#[derive(Debug, Default)]
struct StagedTipSet {
    height: ChainEpoch,
    parent: String,
    /// CIDs and encodings of the records, per meta string.
    models: BTreeMap<String, Vec<(Cid, Vec<u8>)>>,
}

/// Collects records per tipset and writes them out as one archive.
#[derive(Debug, Default)]
pub struct ArchiveWriter {
    staged: Mutex<BTreeMap<String, StagedTipSet>>,
}

impl ArchiveWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages `models` under the key of `current`.
    pub fn stage(
        &self,
        current: &TipSet,
        executed: &TipSet,
        models: &[Arc<dyn Model>],
    ) -> anyhow::Result<()> {
        let mut encoded = Vec::with_capacity(models.len());
        for model in models {
            let bytes = model.to_cbor()?;
            encoded.push((model.meta().to_string(), cbor_cid(&bytes), bytes));
        }
        let mut staged = self.staged.lock();
        let entry = staged
            .entry(current.key().to_string())
            .or_insert_with(|| StagedTipSet {
                height: current.epoch(),
                parent: executed.key().to_string(),
                models: BTreeMap::new(),
            });
        for (meta, cid, bytes) in encoded {
            entry.models.entry(meta).or_default().push((cid, bytes));
        }
        Ok(())
    }

    pub fn staged_tipsets(&self) -> usize {
        self.staged.lock().len()
    }

    /// Builds the maps and returns the root with every block reachable from
    /// it, root first.
    pub fn build(&self) -> anyhow::Result<(Cid, Vec<CarBlock>)> {
        let store = MemoryDB::default();
        let mut state_map = Hamt::<_, Cid>::new_with_bit_width(&store, MAP_BIT_WIDTH);
        for (key, staged) in self.staged.lock().iter() {
            let mut model_map = Hamt::<_, Cid>::new_with_bit_width(&store, MAP_BIT_WIDTH);
            for (meta, records) in &staged.models {
                let mut records = records.clone();
                records.sort_by(|(a, _), (b, _)| a.cmp(b));
                let mut array = Amt::<Ipld, _>::new(&store);
                for (idx, (_, bytes)) in records.iter().enumerate() {
                    let record: Ipld = serde_ipld_dagcbor::from_slice(bytes)?;
                    array.set(idx as u64, record)?;
                }
                model_map.set(BytesKey(meta.as_bytes().to_vec()), array.flush()?)?;
            }
            let container = ModelStateContainer {
                height: staged.height,
                current: key.clone(),
                parent: staged.parent.clone(),
                models: model_map.flush()?,
            };
            state_map.set(
                BytesKey(key.as_bytes().to_vec()),
                put_cbor(&store, &container)?,
            )?;
        }
        let root = state_map.flush()?;
        let blocks = reachable_blocks(&store, root)?;
        Ok((root, blocks))
    }

    /// Writes the archive to `writer` and returns its root.
    pub async fn write<W: AsyncWrite + Unpin>(&self, writer: W) -> anyhow::Result<Cid> {
        let (root, blocks) = self.build()?;
        let count = blocks.len();
        write_car(writer, vec![root], blocks).await?;
        debug!("wrote {count} blocks under root {root}");
        Ok(root)
    }

    pub async fn write_file(&self, path: impl AsRef<Path>) -> anyhow::Result<Cid> {
        let path = path.as_ref();
        let file = tokio::fs::File::create(path)
            .await
            .with_context(|| format!("creating {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        let root = self.write(&mut writer).await?;
        writer.flush().await?;
        info!(
            "archived {} tipsets to {}",
            self.staged_tipsets(),
            path.display()
        );
        Ok(root)
    }
}

/// Blocks reachable from `root` in depth-first pre-order.
fn reachable_blocks(store: &MemoryDB, root: Cid) -> anyhow::Result<Vec<CarBlock>> {
    let mut seen = HashSet::new();
    let mut stack = vec![root];
    let mut blocks = vec![];
    while let Some(cid) = stack.pop() {
        if !seen.insert(cid) {
            continue;
        }
        let data = store
            .get(&cid)?
            .with_context(|| format!("block {cid} missing from archive store"))?;
        let ipld: Ipld = serde_ipld_dagcbor::from_slice(&data)?;
        let mut links = vec![];
        collect_links(&ipld, &mut links);
        stack.extend(links.into_iter().rev());
        blocks.push(CarBlock { cid, data });
    }
    Ok(blocks)
}

/// Read access to an archive loaded in memory.
#[derive(Debug)]
pub struct ArchiveReader {
    store: MemoryDB,
    root: Cid,
    containers: Vec<ModelStateContainer>,
}

impl ArchiveReader {
    pub async fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("opening {}", path.display()))?;
        Self::from_reader(BufReader::new(file)).await
    }

    pub async fn from_reader<R: AsyncBufRead + Unpin>(reader: R) -> anyhow::Result<Self> {
        let store = MemoryDB::default();
        let header = load_car(&store, reader).await?;
        let [root] = header.roots.as_slice() else {
            anyhow::bail!("archive must have one root, found {}", header.roots.len());
        };
        let root = *root;
        let mut containers = vec![];
        hamt::for_each(&store, &root, |_, value| {
            let Ipld::Link(cid) = value else {
                anyhow::bail!("state map value is not a link: {value:?}");
            };
            containers.push(load_cbor::<ModelStateContainer>(&store, cid)?);
            Ok(())
        })?;
        containers.sort_by(|a, b| (a.height, &a.current).cmp(&(b.height, &b.current)));
        Ok(Self {
            store,
            root,
            containers,
        })
    }

    pub fn root(&self) -> Cid {
        self.root
    }

    /// Every archived tipset, by ascending height.
    pub fn containers(&self) -> &[ModelStateContainer] {
        &self.containers
    }

    fn container(&self, tipset_key: &str) -> anyhow::Result<&ModelStateContainer> {
        self.containers
            .iter()
            .find(|c| c.current == tipset_key)
            .with_context(|| format!("tipset {tipset_key} is not archived"))
    }

    fn model_map(&self, tipset_key: &str) -> anyhow::Result<BTreeMap<Vec<u8>, Ipld>> {
        hamt::entries(&self.store, &self.container(tipset_key)?.models)
    }

    pub fn model_metas_for_tipset(&self, tipset_key: &str) -> anyhow::Result<Vec<ModelMeta>> {
        self.model_map(tipset_key)?
            .into_keys()
            .map(|key| Ok(String::from_utf8(key)?.parse()?))
            .collect()
    }

    /// Records of type `meta` archived for the tipset, in CID order.
    pub fn get_models(&self, tipset_key: &str, meta: &ModelMeta) -> anyhow::Result<Vec<Ipld>> {
        let map = self.model_map(tipset_key)?;
        let Some(value) = map.get(meta.to_string().as_bytes()) else {
            return Ok(vec![]);
        };
        let Ipld::Link(array) = value else {
            anyhow::bail!("model map value for {meta} is not a link");
        };
        let mut records = vec![];
        Amt::<Ipld, _>::load(array, &self.store)?.for_each(|_, record| {
            records.push(record.clone());
            Ok(())
        })?;
        Ok(records)
    }

    /// Like [`Self::get_models`], decoded into `M`.
    pub fn get_records<M: DeserializeOwned>(
        &self,
        tipset_key: &str,
        meta: &ModelMeta,
    ) -> anyhow::Result<Vec<M>> {
        self.get_models(tipset_key, meta)?
            .into_iter()
            .map(|record| {
                let bytes = serde_ipld_dagcbor::to_vec(&record)?;
                Ok(fvm_ipld_encoding::from_slice(&bytes)?)
            })
            .collect()
    }
}

fn load_cbor<T: DeserializeOwned>(store: &impl Blockstore, cid: &Cid) -> anyhow::Result<T> {
    let bytes = store
        .get(cid)?
        .with_context(|| format!("block {cid} not found"))?;
    Ok(fvm_ipld_encoding::from_slice(&bytes)?)
}

/// Stages every archive contribution into a shared writer.
pub struct ArchiveSink {
    writer: Arc<ArchiveWriter>,
}

impl ArchiveSink {
    pub fn new(writer: Arc<ArchiveWriter>) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl Handler<Arc<Transformed>, ()> for ArchiveSink {
    fn name(&self) -> String {
        "archive".into()
    }

    fn matcher(&self) -> anyhow::Result<Regex> {
        bus::exact(TransformKind::Cborable.as_ref())
    }

    async fn handle(
        self: Arc<Self>,
        input: flume::Receiver<Arc<Transformed>>,
        _output: flume::Sender<()>,
    ) -> anyhow::Result<()> {
        while let Ok(msg) = input.recv_async().await {
            match msg.as_ref() {
                Transformed::Cborable(batch) => {
                    self.writer
                        .stage(&batch.current, &batch.executed, &batch.data)?
                }
                other => anyhow::bail!("archive cannot store {}", other.kind()),
            }
        }
        Ok(())
    }
}
