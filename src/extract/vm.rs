// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use async_trait::async_trait;
use base64::{Engine as _, prelude::BASE64_STANDARD};

use super::{Extracted, TipSetPairExtractor, atto};
use crate::blocks::TipSet;
use crate::chain::{ExecutionTrace, MessageExecution};
use crate::datasource::DataSource;
use crate::model::messages::VmMessage;

/// Internal calls made while executing the messages of `executed`.
pub struct VmMessageExtractor;

struct TraceWalk<'a> {
    height: i64,
    state_root: String,
    execution: &'a MessageExecution,
    source: String,
    index: u64,
    out: Extracted,
}

impl TraceWalk<'_> {
    fn visit(&mut self, trace: &ExecutionTrace) {
        for call in &trace.subcalls {
            self.out.push(VmMessage {
                height: self.height,
                state_root: self.state_root.clone(),
                source: self.source.clone(),
                index: self.index,
                from: call.from.to_string(),
                to: call.to.to_string(),
                value: atto(&call.value),
                method: call.method,
                actor_code: call.to_actor_code.map(|code| code.to_string()),
                exit_code: call.exit_code.value(),
                gas_used: call.gas_used,
                params: BASE64_STANDARD.encode(&call.params),
                returns: BASE64_STANDARD.encode(&call.return_data),
                implicit: self.execution.implicit,
            });
            self.index += 1;
            self.visit(call);
        }
    }
}

#[async_trait]
impl TipSetPairExtractor for VmMessageExtractor {
    async fn extract(
        &self,
        ds: &DataSource,
        current: &TipSet,
        executed: &TipSet,
    ) -> anyhow::Result<Extracted> {
        let executions = ds.message_executions(current, executed).await?;
        let mut out = Extracted::default();
        for execution in executions.iter() {
            let mut walk = TraceWalk {
                height: current.epoch(),
                state_root: current.parent_state_root().to_string(),
                execution,
                source: execution.cid.to_string(),
                index: 0,
                out: Extracted::default(),
            };
            walk.visit(&execution.trace);
            out.models.append(&mut walk.out.models);
        }
        Ok(out)
    }
}
