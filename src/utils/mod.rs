// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub mod db;
pub mod encoding;
pub mod flume;

use std::{pin::Pin, time::Duration};

use futures::{
    Future, FutureExt,
    future::{FusedFuture, pending},
    select,
};
use tokio::time::sleep;
use tracing::warn;

/// Keep running the future created by `make_fut` until the timeout or retry
/// limit in `args` is reached.
/// `F` _must_ be cancel safe.
#[tracing::instrument(skip_all)]
pub async fn retry<F, T, E>(
    args: RetryArgs,
    mut make_fut: impl FnMut() -> F,
) -> Result<T, RetryError<E>>
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Debug,
{
    let mut timeout: Pin<Box<dyn FusedFuture<Output = ()> + Send>> = match args.timeout {
        Some(duration) => Box::pin(sleep(duration).fuse()),
        None => Box::pin(pending()),
    };
    let max_retries = args.max_retries.unwrap_or(usize::MAX).max(1);
    let mut task = Box::pin(
        async {
            let mut last = None;
            for attempt in 0..max_retries {
                match make_fut().await {
                    Ok(ok) => return Ok(ok),
                    Err(err) => {
                        warn!("attempt {} failed: {err:?}", attempt + 1);
                        last = Some(err);
                    }
                }
                if let Some(delay) = args.delay
                    && attempt + 1 < max_retries
                {
                    sleep(delay).await;
                }
            }
            Err(RetryError::RetriesExceeded(last))
        }
        .fuse(),
    );
    select! {
        _ = timeout => Err(RetryError::TimeoutExceeded),
        res = task => res,
    }
}

#[derive(Debug, Clone, Copy, smart_default::SmartDefault, PartialEq, Eq)]
pub struct RetryArgs {
    #[default(Some(Duration::from_secs(30)))]
    pub timeout: Option<Duration>,
    #[default(Some(3))]
    pub max_retries: Option<usize>,
    #[default(Some(Duration::from_millis(200)))]
    pub delay: Option<Duration>,
}

impl RetryArgs {
    /// A single attempt without a timeout.
    pub fn once() -> Self {
        Self {
            timeout: None,
            max_retries: Some(1),
            delay: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetryError<E: std::fmt::Debug> {
    #[error("operation timed out")]
    TimeoutExceeded,
    #[error("retry limit exceeded, last error: {0:?}")]
    RetriesExceeded(Option<E>),
}

#[cfg(test)]
mod tests {
    use std::{future::ready, sync::atomic::AtomicUsize};

    use super::*;

    impl RetryArgs {
        fn new_ms(
            timeout: impl Into<Option<u64>>,
            max_retries: impl Into<Option<usize>>,
            delay: impl Into<Option<u64>>,
        ) -> Self {
            Self {
                timeout: timeout.into().map(Duration::from_millis),
                max_retries: max_retries.into(),
                delay: delay.into().map(Duration::from_millis),
            }
        }
    }

    #[tokio::test]
    async fn timeout() {
        let res = retry(RetryArgs::new_ms(1, None, None), pending::<Result<(), ()>>).await;
        assert_eq!(Err(RetryError::TimeoutExceeded), res);
    }

    #[tokio::test]
    async fn retries_keep_last_error() {
        let res = retry(RetryArgs::new_ms(None, 2, None), || ready(Err::<(), _>("boom"))).await;
        assert_eq!(Err(RetryError::RetriesExceeded(Some("boom"))), res);
    }

    #[tokio::test]
    async fn ok() {
        let res = retry(RetryArgs::default(), || ready(Ok::<_, ()>(()))).await;
        assert_eq!(Ok(()), res);
    }

    #[tokio::test]
    async fn single_attempt() {
        use std::sync::atomic::Ordering::SeqCst;
        let count = AtomicUsize::new(0);
        let res = retry(RetryArgs::once(), || {
            count.fetch_add(1, SeqCst);
            ready(Err::<(), _>(()))
        })
        .await;
        assert!(res.is_err());
        assert_eq!(count.load(SeqCst), 1);
    }

    #[tokio::test]
    async fn needs_retry() {
        use std::sync::atomic::Ordering::SeqCst;
        let count = AtomicUsize::new(0);
        let res = retry(RetryArgs::new_ms(None, None, None), || async {
            match count.fetch_add(1, SeqCst) > 5 {
                true => Ok(()),
                false => Err(()),
            }
        })
        .await;
        assert_eq!(Ok(()), res);
        assert!(count.load(SeqCst) > 5);
    }
}
