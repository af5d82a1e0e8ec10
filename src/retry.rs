//! Admission and rate-limit recovery around a single dispatch.

use crate::error::Result;
use crate::quota::Quota;
use log::warn;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Sends requests through a [`Quota`] and absorbs rate-limit responses.
#[derive(Debug, Clone)]
pub struct RetryCoordinator {
    quota: Arc<Quota>,
    cooldown: Duration,
    max_retries: Option<u32>,
}

impl RetryCoordinator {
    pub fn new(quota: Arc<Quota>, cooldown: Duration, max_retries: Option<u32>) -> Self {
        Self {
            quota,
            cooldown,
            max_retries,
        }
    }

    /// Run `dispatch` behind the quota. A rate-limited attempt resets the
    /// quota, sleeps for the cooldown and goes back through admission; any
    /// other outcome is returned as is.
    pub async fn execute<F, Fut, T>(&self, mut dispatch: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries: u32 = 0;
        loop {
            self.quota.wait().await;
            match dispatch().await {
                Err(e) if e.is_rate_limited() => {
                    if self.max_retries.is_some_and(|max| retries >= max) {
                        warn!("giving up after {} rate-limited retries: {}", retries, e);
                        return Err(e);
                    }
                    retries += 1;
                    warn!(
                        "{}; retrying in {:?} (retry {})",
                        e, self.cooldown, retries
                    );
                    self.quota.reset();
                    tokio::time::sleep(self.cooldown).await;
                }
                other => return other,
            }
        }
    }
}
