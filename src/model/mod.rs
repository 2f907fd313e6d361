// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Records the extractors produce and the identifiers they travel under.

pub mod actors;
pub mod blocks;
pub mod chain;
pub mod messages;
mod meta;
pub mod reports;
mod row;

pub use meta::{ModelKind, ModelMeta, ModelMetaParseError};
pub use row::{Row, ToRow, Value};

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use ipld_core::ipld::Ipld;

/// A record produced by an extractor.
pub trait Model: Any + fmt::Debug + Send + Sync {
    fn meta(&self) -> ModelMeta;

    /// DAG-CBOR encoding of the record.
    fn to_cbor(&self) -> anyhow::Result<Vec<u8>>;

    fn as_any(&self) -> &dyn Any;
}

impl dyn Model {
    pub fn downcast_ref<M: Model>(&self) -> Option<&M> {
        self.as_any().downcast_ref()
    }

    pub fn to_ipld(&self) -> anyhow::Result<Ipld> {
        Ok(serde_ipld_dagcbor::from_slice(&self.to_cbor()?)?)
    }
}

pub type ModelBatch = Vec<Arc<dyn Model>>;

/// Implements [`Model`] and [`ToRow`] for a tuple-encoded record.
macro_rules! model {
    (
        $ty:ident, version = $version:literal, kind = $kind:ident, table = $table:literal,
        key = [$($key:literal),* $(,)?], columns = [$($field:ident),* $(,)?]
    ) => {
        impl $crate::model::Model for $ty {
            fn meta(&self) -> $crate::model::ModelMeta {
                <$ty>::META
            }

            fn to_cbor(&self) -> anyhow::Result<Vec<u8>> {
                Ok(fvm_ipld_encoding::to_vec(self)?)
            }

            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
        }

        impl $ty {
            pub const META: $crate::model::ModelMeta = $crate::model::ModelMeta::new(
                $version,
                stringify!($ty),
                $crate::model::ModelKind::$kind,
            );
        }

        impl $crate::model::ToRow for $ty {
            fn to_row(&self) -> $crate::model::Row {
                $crate::model::Row {
                    table: $table,
                    key: &[$($key),*],
                    columns: vec![$((stringify!($field), self.$field.clone().into())),*],
                }
            }
        }
    };
}
pub(crate) use model;
