// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! On-chain actor records and the table mapping actor code CIDs to kinds.

use std::collections::BTreeMap;

use ahash::{HashMap, HashSet};
use anyhow::Context as _;
use cid::Cid;
use fvm_ipld_encoding::tuple::*;
use ipld_core::ipld::Ipld;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator as _};

use crate::shim::{address::Address, econ::TokenAmount};
use crate::utils::encoding::identity_cid;

/// An actor as stored in the state tree.
#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Actor {
    /// Identifies the actor kind and version.
    pub code: Cid,
    /// Root of the actor's typed state.
    pub head: Cid,
    pub nonce: u64,
    pub balance: TokenAmount,
}

/// State tree entries written by v5 state trees also carry a delegated address.
#[derive(Deserialize_tuple)]
struct ActorWithDelegatedAddress {
    code: Cid,
    head: Cid,
    nonce: u64,
    balance: TokenAmount,
    #[allow(dead_code)]
    delegated_address: Option<Address>,
}

impl Actor {
    /// Decodes a state tree value, accepting both the four and five field layouts.
    pub fn from_cbor(bytes: &[u8]) -> anyhow::Result<Self> {
        let ipld: Ipld = serde_ipld_dagcbor::from_slice(bytes).context("malformed actor")?;
        match &ipld {
            Ipld::List(fields) if fields.len() == 4 => Ok(fvm_ipld_encoding::from_slice(bytes)?),
            Ipld::List(fields) if fields.len() == 5 => {
                let actor: ActorWithDelegatedAddress = fvm_ipld_encoding::from_slice(bytes)?;
                Ok(Self {
                    code: actor.code,
                    head: actor.head,
                    nonce: actor.nonce,
                    balance: actor.balance,
                })
            }
            _ => anyhow::bail!("unexpected actor encoding: {ipld:?}"),
        }
    }
}

/// Built-in actor kinds the indexer distinguishes.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, AsRefStr, Display, EnumIter, EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum ActorKind {
    System,
    Init,
    Cron,
    Account,
    Miner,
    Power,
    Market,
    Reward,
    #[strum(serialize = "verifreg")]
    VerifiedRegistry,
    Multisig,
    PaymentChannel,
    Datacap,
    Eam,
    Evm,
    EthAccount,
    Placeholder,
}

impl ActorKind {
    /// Name used in the identity-hashed code CIDs of actors v1 to v7.
    fn legacy_name(self) -> Option<&'static str> {
        Some(match self {
            Self::System => "system",
            Self::Init => "init",
            Self::Cron => "cron",
            Self::Account => "account",
            Self::Miner => "storageminer",
            Self::Power => "storagepower",
            Self::Market => "storagemarket",
            Self::Reward => "reward",
            Self::VerifiedRegistry => "verifiedregistry",
            Self::Multisig => "multisig",
            Self::PaymentChannel => "paymentchannel",
            _ => return None,
        })
    }

    /// Name used in bundle manifests (`StateActorCodeCIDs`).
    pub fn manifest_name(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Init => "init",
            Self::Cron => "cron",
            Self::Account => "account",
            Self::Miner => "storageminer",
            Self::Power => "storagepower",
            Self::Market => "storagemarket",
            Self::Reward => "reward",
            Self::VerifiedRegistry => "verifiedregistry",
            Self::Multisig => "multisig",
            Self::PaymentChannel => "paymentchannel",
            Self::Datacap => "datacap",
            Self::Eam => "eam",
            Self::Evm => "evm",
            Self::EthAccount => "ethaccount",
            Self::Placeholder => "placeholder",
        }
    }

    pub fn from_manifest_name(name: &str) -> Option<Self> {
        Self::iter().find(|kind| kind.manifest_name() == name)
    }
}

/// Built-in actors version shipped with a bundle based network version.
pub fn actors_version(network_version: u32) -> u64 {
    match network_version {
        0..=16 => 8,
        17 => 9,
        18 => 10,
        19 | 20 => 11,
        nv => u64::from(nv) - 9,
    }
}

/// Maps actor code CIDs to their kind and version.
#[derive(Clone, Debug, Default)]
pub struct ActorCodes {
    by_code: HashMap<Cid, (ActorKind, u64)>,
}

impl ActorCodes {
    /// Code CIDs of actors v1 to v7, which are identity hashes of `fil/<version>/<name>`.
    pub fn legacy() -> anyhow::Result<Self> {
        let mut codes = Self::default();
        for version in 1..=7u64 {
            for kind in ActorKind::iter() {
                if let Some(name) = kind.legacy_name() {
                    let cid = identity_cid(
                        fvm_ipld_encoding::IPLD_RAW,
                        format!("fil/{version}/{name}").as_bytes(),
                    )?;
                    codes.insert(cid, kind, version);
                }
            }
        }
        Ok(codes)
    }

    /// Adds the codes of a bundle manifest, as returned by `StateActorCodeCIDs`.
    pub fn extend_from_manifest(&mut self, version: u64, manifest: &BTreeMap<String, Cid>) {
        for (name, cid) in manifest {
            match ActorKind::from_manifest_name(name) {
                Some(kind) => self.insert(*cid, kind, version),
                None => tracing::debug!("unknown actor {name} in manifest v{version}"),
            }
        }
    }

    pub fn insert(&mut self, code: Cid, kind: ActorKind, version: u64) {
        self.by_code.insert(code, (kind, version));
    }

    pub fn kind(&self, code: &Cid) -> Option<ActorKind> {
        self.by_code.get(code).map(|(kind, _)| *kind)
    }

    pub fn version(&self, code: &Cid) -> Option<u64> {
        self.by_code.get(code).map(|(_, version)| *version)
    }

    pub fn is(&self, code: &Cid, kind: ActorKind) -> bool {
        self.kind(code) == Some(kind)
    }

    /// Every known code of `kind`.
    pub fn codes_of(&self, kind: ActorKind) -> HashSet<Cid> {
        self.by_code
            .iter()
            .filter(|(_, (k, _))| *k == kind)
            .map(|(cid, _)| *cid)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}
