// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! CARv1 framing: a varint framed DAG-CBOR header followed by varint framed
//! `cid || data` blocks. Readers accept zstd compressed input.

use std::io;

use async_compression::tokio::bufread::ZstdDecoder;
use bytes::{Buf as _, BufMut as _, Bytes, BytesMut};
use cid::Cid;
use futures::{SinkExt as _, Stream, StreamExt as _};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};
use tokio_util::either::Either;
use unsigned_varint::codec::UviBytes;

use crate::utils::encoding::verify_cid;

/// <https://ipld.io/specs/transport/car/carv1/#header>
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CarHeader {
    pub roots: Vec<Cid>,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CarBlock {
    pub cid: Cid,
    pub data: Vec<u8>,
}

impl CarBlock {
    pub fn validate(&self) -> anyhow::Result<()> {
        verify_cid(&self.cid, &self.data)
    }
}

fn invalid_data(e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

/// Block frames on top of [`UviBytes`].
#[derive(Default)]
pub struct CarBlockCodec {
    frames: UviBytes<Bytes>,
}

impl Decoder for CarBlockCodec {
    type Item = CarBlock;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<CarBlock>> {
        let Some(frame) = self.frames.decode(src)? else {
            return Ok(None);
        };
        let mut reader = frame.reader();
        let cid = Cid::read_bytes(&mut reader).map_err(invalid_data)?;
        Ok(Some(CarBlock {
            cid,
            data: reader.into_inner().to_vec(),
        }))
    }
}

impl Encoder<CarBlock> for CarBlockCodec {
    type Error = io::Error;

    fn encode(&mut self, block: CarBlock, dst: &mut BytesMut) -> io::Result<()> {
        let mut frame = BytesMut::with_capacity(block.cid.encoded_len() + block.data.len());
        block
            .cid
            .write_bytes((&mut frame).writer())
            .map_err(invalid_data)?;
        frame.put_slice(&block.data);
        self.frames.encode(frame.freeze(), dst)
    }
}

// A zstd frame header is at most 18 bytes, so the first buffer is enough.
fn is_zstd(buf: &[u8]) -> bool {
    zstd::zstd_safe::get_frame_content_size(buf).is_ok()
}

/// Reads the header of a CAR and returns it with the stream of its blocks.
pub async fn read_car<R>(
    mut reader: R,
) -> io::Result<(CarHeader, impl Stream<Item = io::Result<CarBlock>> + Unpin)>
where
    R: AsyncBufRead + Unpin,
{
    let reader = if is_zstd(reader.fill_buf().await?) {
        let mut zstd = ZstdDecoder::new(reader);
        zstd.multiple_members(true);
        Either::Right(zstd)
    } else {
        Either::Left(reader)
    };
    let mut frames = FramedRead::new(reader, UviBytes::<Bytes>::default());
    let frame = frames
        .next()
        .await
        .ok_or_else(|| invalid_data("missing CAR header"))??;
    let header: CarHeader = fvm_ipld_encoding::from_slice(&frame).map_err(invalid_data)?;
    if header.version != 1 || header.roots.is_empty() {
        return Err(invalid_data(format!(
            "unsupported CAR header: version {} with {} roots",
            header.version,
            header.roots.len()
        )));
    }
    let blocks = frames.map_decoder(|_| CarBlockCodec::default());
    Ok((header, blocks))
}

/// Writes a CARv1 with `roots` and `blocks`, in order.
pub async fn write_car<W>(
    writer: W,
    roots: Vec<Cid>,
    blocks: impl IntoIterator<Item = CarBlock>,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if roots.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "a CARv1 header needs at least one root",
        ));
    }
    let header = fvm_ipld_encoding::to_vec(&CarHeader { roots, version: 1 })?;
    let mut header_frame = FramedWrite::new(writer, UviBytes::<Bytes>::default());
    header_frame.send(Bytes::from(header)).await?;
    let mut block_frames = header_frame.map_encoder(|_| CarBlockCodec::default());
    for block in blocks {
        block_frames.feed(block).await?;
    }
    block_frames.close().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::encoding::cbor_cid;
    use futures::TryStreamExt as _;
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    #[derive(Debug, Clone)]
    struct Blocks(Vec<CarBlock>);

    impl Arbitrary for Blocks {
        fn arbitrary(g: &mut Gen) -> Self {
            let mut blocks: Vec<CarBlock> = Vec::<Vec<u8>>::arbitrary(g)
                .into_iter()
                .map(|data| CarBlock {
                    cid: cbor_cid(&data),
                    data,
                })
                .collect();
            if blocks.is_empty() {
                blocks.push(CarBlock {
                    cid: cbor_cid(&[]),
                    data: vec![],
                });
            }
            Self(blocks)
        }
    }

    async fn car_bytes(blocks: &[CarBlock]) -> Vec<u8> {
        let mut buffer = vec![];
        write_car(&mut buffer, vec![blocks[0].cid], blocks.to_vec())
            .await
            .unwrap();
        buffer
    }

    #[quickcheck]
    fn written_blocks_are_read_back(blocks: Blocks) -> bool {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let bytes = car_bytes(&blocks.0).await;
            let (header, stream) = read_car(bytes.as_slice()).await.unwrap();
            assert_eq!(header.roots, vec![blocks.0[0].cid]);
            let read: Vec<CarBlock> = stream.try_collect().await.unwrap();
            read == blocks.0 && read.iter().all(|b| b.validate().is_ok())
        })
    }

    #[tokio::test]
    async fn zstd_compressed_car_is_detected() {
        use async_compression::tokio::write::ZstdEncoder;
        use tokio::io::AsyncWriteExt as _;

        let blocks = vec![CarBlock {
            cid: cbor_cid(b"data"),
            data: b"data".to_vec(),
        }];
        let mut encoder = ZstdEncoder::new(vec![]);
        encoder.write_all(&car_bytes(&blocks).await).await.unwrap();
        encoder.shutdown().await.unwrap();
        let compressed = encoder.into_inner();

        let (_, stream) = read_car(compressed.as_slice()).await.unwrap();
        let read: Vec<CarBlock> = stream.try_collect().await.unwrap();
        assert_eq!(read, blocks);
    }

    #[tokio::test]
    async fn empty_roots_are_rejected() {
        assert!(write_car(Vec::<u8>::new(), vec![], vec![]).await.is_err());
    }

    #[tokio::test]
    async fn garbage_header_is_rejected() {
        let garbage = [0x05u8, 0x01, 0x02, 0x03, 0x04, 0x05];
        assert!(read_car(&garbage[..]).await.is_err());
        assert!(read_car(&[0u8; 0][..]).await.is_err());
    }
}
