// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub mod car;

use ahash::HashMap;
use cid::Cid;
use futures::TryStreamExt as _;
use fvm_ipld_blockstore::Blockstore;
use parking_lot::RwLock;
use tokio::io::AsyncBufRead;

use self::car::{CarBlock, CarHeader, read_car};

/// Thread-safe in-memory block store.
#[derive(Debug, Default)]
pub struct MemoryDB {
    blocks: RwLock<HashMap<Cid, Vec<u8>>>,
}

impl MemoryDB {
    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }

    /// Snapshot of every stored block.
    pub fn blocks(&self) -> Vec<CarBlock> {
        self.blocks
            .read()
            .iter()
            .map(|(&cid, data)| CarBlock {
                cid,
                data: data.clone(),
            })
            .collect()
    }
}

impl Blockstore for MemoryDB {
    fn get(&self, k: &Cid) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.blocks.read().get(k).cloned())
    }

    fn put_keyed(&self, k: &Cid, block: &[u8]) -> anyhow::Result<()> {
        self.blocks.write().insert(*k, block.to_vec());
        Ok(())
    }

    fn has(&self, k: &Cid) -> anyhow::Result<bool> {
        Ok(self.blocks.read().contains_key(k))
    }
}

/// Stream every block of a CAR archive into a block store.
/// The block store is not restored to its original state in case of errors.
pub async fn load_car<R>(db: &impl Blockstore, reader: R) -> anyhow::Result<CarHeader>
where
    R: AsyncBufRead + Unpin,
{
    let (header, mut blocks) = read_car(reader).await?;
    while let Some(block) = blocks.try_next().await? {
        block.validate()?;
        db.put_keyed(&block.cid, &block.data)?;
    }
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::car::write_car;
    use super::*;
    use crate::utils::encoding::cbor_cid;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn load_car_fills_store() {
        let blocks: Vec<CarBlock> = (0u8..10)
            .map(|i| CarBlock {
                cid: cbor_cid(&[i]),
                data: vec![i],
            })
            .collect();
        let mut buffer = vec![];
        write_car(&mut buffer, vec![blocks[0].cid], blocks.clone())
            .await
            .unwrap();

        let db = MemoryDB::default();
        let header = load_car(&db, buffer.as_slice()).await.unwrap();
        assert_eq!(header.roots, vec![blocks[0].cid]);
        assert_eq!(db.len(), blocks.len());
        for block in blocks {
            assert_eq!(db.get(&block.cid).unwrap(), Some(block.data));
        }
    }
}
