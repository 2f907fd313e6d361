// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use cid::multihash::Multihash;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::DAG_CBOR;
use ipld_core::ipld::Ipld;
use multihash_codetable::{Code, MultihashDigest as _};
use serde::Serialize;

/// Multihash code of the identity "hash".
pub const IDENTITY_HASH: u64 = 0x0;

/// `blake2b-256` DAG-CBOR CID of `bytes`.
pub fn cbor_cid(bytes: &[u8]) -> Cid {
    Cid::new_v1(DAG_CBOR, Code::Blake2b256.digest(bytes))
}

/// CID of a raw block whose multihash is the identity of `bytes`.
pub fn identity_cid(codec: u64, bytes: &[u8]) -> anyhow::Result<Cid> {
    Ok(Cid::new_v1(codec, Multihash::<64>::wrap(IDENTITY_HASH, bytes)?))
}

/// Serializes `obj` as DAG-CBOR and stores it under its `blake2b-256` CID.
pub fn put_cbor<BS, T>(store: &BS, obj: &T) -> anyhow::Result<Cid>
where
    BS: Blockstore + ?Sized,
    T: Serialize + ?Sized,
{
    let bytes = fvm_ipld_encoding::to_vec(obj)?;
    let cid = cbor_cid(&bytes);
    store.put_keyed(&cid, &bytes)?;
    Ok(cid)
}

/// Recomputes `cid` over `data` with the same codec and hash function.
pub fn verify_cid(cid: &Cid, data: &[u8]) -> anyhow::Result<()> {
    let code = cid.hash().code();
    let actual = if code == IDENTITY_HASH {
        identity_cid(cid.codec(), data)?
    } else {
        Cid::new_v1(cid.codec(), Code::try_from(code)?.digest(data))
    };
    anyhow::ensure!(
        actual.hash() == cid.hash(),
        "CID/Block mismatch for block {cid}, actual: {actual}"
    );
    Ok(())
}

/// Appends every CID linked from `ipld` to `out`, depth first.
pub fn collect_links(ipld: &Ipld, out: &mut Vec<Cid>) {
    match ipld {
        Ipld::Link(cid) => out.push(*cid),
        Ipld::List(items) => items.iter().for_each(|item| collect_links(item, out)),
        Ipld::Map(map) => map.values().for_each(|item| collect_links(item, out)),
        _ => {}
    }
}

/// JSON rendering of an IPLD value. Links become `{"/": cid}` and bytes are
/// base64 encoded.
pub fn ipld_to_json(ipld: &Ipld) -> serde_json::Value {
    use base64::{Engine as _, prelude::BASE64_STANDARD};
    use serde_json::Value;

    match ipld {
        Ipld::Null => Value::Null,
        Ipld::Bool(b) => Value::Bool(*b),
        Ipld::Integer(i) => i64::try_from(*i)
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(i.to_string())),
        Ipld::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Ipld::String(s) => Value::String(s.clone()),
        Ipld::Bytes(b) => Value::String(BASE64_STANDARD.encode(b)),
        Ipld::List(items) => Value::Array(items.iter().map(ipld_to_json).collect()),
        Ipld::Map(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), ipld_to_json(v)))
                .collect(),
        ),
        Ipld::Link(cid) => serde_json::json!({ "/": cid.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::db::MemoryDB;
    use quickcheck_macros::quickcheck;

    #[quickcheck]
    fn cbor_cid_verifies(data: Vec<u8>) -> bool {
        verify_cid(&cbor_cid(&data), &data).is_ok()
    }

    #[test]
    fn verify_rejects_mismatch() {
        let cid = cbor_cid(b"hello");
        assert!(verify_cid(&cid, b"world").is_err());
    }

    #[test]
    fn identity_cid_round_trip() {
        let cid = identity_cid(fvm_ipld_encoding::IPLD_RAW, b"fil/1/account").unwrap();
        assert_eq!(cid.hash().digest(), b"fil/1/account");
        verify_cid(&cid, b"fil/1/account").unwrap();
    }

    #[test]
    fn put_cbor_is_addressable() {
        let store = MemoryDB::default();
        let cid = put_cbor(&store, &(1u64, "two")).unwrap();
        let bytes = store.get(&cid).unwrap().unwrap();
        assert_eq!(cid, cbor_cid(&bytes));
    }

    #[test]
    fn links_are_collected_in_order() {
        let a = cbor_cid(b"a");
        let b = cbor_cid(b"b");
        let ipld = Ipld::List(vec![
            Ipld::Link(a),
            Ipld::Integer(3),
            Ipld::List(vec![Ipld::Link(b)]),
        ]);
        let mut links = vec![];
        collect_links(&ipld, &mut links);
        assert_eq!(links, vec![a, b]);
    }

    #[test]
    fn ipld_as_json() {
        let cid = cbor_cid(b"a");
        let ipld = Ipld::Map(std::collections::BTreeMap::from([
            ("bytes".to_string(), Ipld::Bytes(vec![1, 2, 3])),
            ("big".to_string(), Ipld::Integer(i128::from(u64::MAX))),
            ("link".to_string(), Ipld::Link(cid)),
            ("list".to_string(), Ipld::List(vec![Ipld::Null, Ipld::Bool(true)])),
        ]));
        assert_eq!(
            ipld_to_json(&ipld),
            serde_json::json!({
                "bytes": "AQID",
                "big": u64::MAX.to_string(),
                "link": { "/": cid.to_string() },
                "list": [null, true],
            })
        );
    }
}
