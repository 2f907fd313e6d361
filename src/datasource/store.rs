// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use hashlink::LruCache;
use parking_lot::Mutex;
use tokio::runtime::Handle;

use crate::chain::ChainNode;
use crate::metrics::{self, values};
use crate::utils::encoding::IDENTITY_HASH;

const DEFAULT_BLOCK_CACHE_SIZE: usize = 4096;

/// Read-only block store backed by the node's `ChainReadObj`.
///
/// Reads block on the node, so the store must only be used from blocking
/// threads, e.g. inside [`tokio::task::spawn_blocking`].
#[derive(Clone)]
pub struct NodeBlockstore {
    node: Arc<dyn ChainNode>,
    handle: Handle,
    cache: Arc<Mutex<LruCache<Cid, Vec<u8>>>>,
}

impl NodeBlockstore {
    pub fn new(node: Arc<dyn ChainNode>, handle: Handle) -> Self {
        Self {
            node,
            handle,
            cache: Arc::new(Mutex::new(LruCache::new(DEFAULT_BLOCK_CACHE_SIZE))),
        }
    }
}

impl Blockstore for NodeBlockstore {
    fn get(&self, k: &Cid) -> anyhow::Result<Option<Vec<u8>>> {
        if k.hash().code() == IDENTITY_HASH {
            return Ok(Some(k.hash().digest().to_vec()));
        }
        if let Some(data) = self.cache.lock().get(k).cloned() {
            metrics::LRU_CACHE_HIT.get_or_create(&values::NODE_BLOCKS).inc();
            return Ok(Some(data));
        }
        metrics::LRU_CACHE_MISS.get_or_create(&values::NODE_BLOCKS).inc();
        let data = self.handle.block_on(self.node.chain_read_obj(k))?;
        self.cache.lock().insert(*k, data.clone());
        Ok(Some(data))
    }

    fn put_keyed(&self, k: &Cid, _block: &[u8]) -> anyhow::Result<()> {
        anyhow::bail!("cannot write {k}: the node block store is read-only")
    }
}
