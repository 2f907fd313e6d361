// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use strum::{AsRefStr, EnumString};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ModelKind {
    /// One or more records per tipset.
    Tipset,
    /// Records derived from actor state changes.
    Actor,
}

/// Stable identifier of a record type, rendered `v{version}:{type}:{kind}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelMeta {
    pub version: u16,
    pub type_name: Cow<'static, str>,
    pub kind: ModelKind,
}

impl ModelMeta {
    pub const fn new(version: u16, type_name: &'static str, kind: ModelKind) -> Self {
        Self {
            version,
            type_name: Cow::Borrowed(type_name),
            kind,
        }
    }
}

impl fmt::Display for ModelMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "v{}:{}:{}",
            self.version,
            self.type_name,
            self.kind.as_ref()
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelMetaParseError {
    #[error("model meta {0:?} must have three `:` separated parts")]
    Parts(String),
    #[error("invalid model version in {0:?}")]
    Version(String),
    #[error("empty model type in {0:?}")]
    Type(String),
    #[error("invalid model kind in {0:?}")]
    Kind(String),
}

impl FromStr for ModelMeta {
    type Err = ModelMetaParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<_> = s.split(':').collect();
        let [version, type_name, kind] = parts.as_slice() else {
            return Err(ModelMetaParseError::Parts(s.into()));
        };
        let version = version
            .strip_prefix('v')
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| ModelMetaParseError::Version(s.into()))?;
        if type_name.is_empty() {
            return Err(ModelMetaParseError::Type(s.into()));
        }
        let kind = kind
            .parse()
            .map_err(|_| ModelMetaParseError::Kind(s.into()))?;
        Ok(Self {
            version,
            type_name: Cow::Owned(type_name.to_string()),
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use rstest::rstest;

    #[test]
    fn display() {
        let meta = ModelMeta::new(1, "BlockHeader", ModelKind::Tipset);
        assert_eq!(meta.to_string(), "v1:BlockHeader:tipset");
        assert_eq!(
            ModelMeta::new(2, "MinerEvent", ModelKind::Actor).to_string(),
            "v2:MinerEvent:actor"
        );
    }

    #[quickcheck]
    fn parse_inverts_display(version: u16, name: String, actor: bool) -> bool {
        if name.is_empty() || name.contains(':') {
            return true;
        }
        let meta = ModelMeta {
            version,
            type_name: Cow::Owned(name),
            kind: if actor {
                ModelKind::Actor
            } else {
                ModelKind::Tipset
            },
        };
        meta.to_string().parse::<ModelMeta>() == Ok(meta)
    }

    #[rstest]
    #[case("v1:BlockHeader")]
    #[case("1:BlockHeader:tipset")]
    #[case("vx:BlockHeader:tipset")]
    #[case("v1::tipset")]
    #[case("v1:BlockHeader:block")]
    #[case("v1:a:b:c")]
    fn rejects_malformed(#[case] input: &str) {
        assert!(input.parse::<ModelMeta>().is_err());
    }
}
