// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::tuple::*;

use super::model;

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub height: i64,
    pub id: String,
    pub state_root: String,
    pub code: String,
    pub head: String,
    pub balance: String,
    pub nonce: u64,
    /// How the actor changed, `Added`, `Removed`, `Modified` or `Unknown`.
    pub change: String,
}

model!(
    Actor,
    version = 1,
    kind = Actor,
    table = "actors",
    key = ["height", "id", "state_root"],
    columns = [height, id, state_root, code, head, balance, nonce, change]
);

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug, PartialEq, Eq)]
pub struct ActorState {
    pub height: i64,
    pub head: String,
    pub code: String,
    /// JSON rendering of the decoded state.
    pub state: String,
}

model!(
    ActorState,
    version = 1,
    kind = Actor,
    table = "actor_states",
    key = ["height", "head"],
    columns = [height, head, code, state]
);

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug, PartialEq, Eq)]
pub struct IdAddress {
    pub height: i64,
    pub id: String,
    pub address: String,
    pub state_root: String,
}

model!(
    IdAddress,
    version = 1,
    kind = Actor,
    table = "id_addresses",
    key = ["id", "address", "state_root"],
    columns = [height, id, address, state_root]
);

/// A keyed entry of an actor's state that was added, modified or removed.
#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug, PartialEq, Eq)]
pub struct ActorEvent {
    pub height: i64,
    pub state_root: String,
    pub actor: String,
    /// Kind of the actor, as in `miner` or `verifreg`.
    pub actor_kind: String,
    /// Collection of the actor state the entry belongs to.
    pub collection: String,
    pub key: String,
    /// `Added`, `Modified` or `Removed`.
    pub event: String,
    /// JSON rendering of the value, the previous one for removals.
    pub value: String,
}

model!(
    ActorEvent,
    version = 1,
    kind = Actor,
    table = "actor_events",
    key = ["height", "state_root", "actor", "collection", "key"],
    columns = [
        height, state_root, actor, actor_kind, collection, key, event, value
    ]
);
