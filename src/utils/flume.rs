// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use async_trait::async_trait;

#[async_trait]
pub trait FlumeSenderExt<T> {
    /// Sends without blocking; a closed or full channel is logged and the message dropped.
    fn try_send_or_warn(&self, msg: T);

    /// Waits for capacity; a disconnected receiver is logged and the message dropped.
    /// Returns `false` when the message could not be delivered.
    async fn send_async_or_warn(&self, msg: T) -> bool;
}

#[async_trait]
impl<T: Send + 'static> FlumeSenderExt<T> for flume::Sender<T> {
    fn try_send_or_warn(&self, msg: T) {
        if let Err(e) = self.try_send(msg) {
            tracing::warn!("{e}");
        }
    }

    async fn send_async_or_warn(&self, msg: T) -> bool {
        match self.send_async(msg).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("{e}");
                false
            }
        }
    }
}
