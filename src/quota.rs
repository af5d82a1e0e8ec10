//! Token-bucket admission gate shared by every outbound request.
//!
//! Waiters queue on a fair turnstile, so tokens are handed out in the order
//! `wait()` was called. Only the head of the queue looks at the bucket; it
//! sleeps until the next token is due or until `reset`/`set_max` wakes it.
//! Dropping a pending `wait()` leaves the queue without consuming a token.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug)]
struct Bucket {
    capacity: u32,
    available: u32,
    refill_interval: Duration,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant) {
        if self.available >= self.capacity {
            self.last_refill = now;
            return;
        }
        let elapsed = now.saturating_duration_since(self.last_refill);
        let interval = self.refill_interval.as_nanos().max(1);
        let new_tokens = elapsed.as_nanos() / interval;
        if new_tokens == 0 {
            return;
        }
        let missing = u128::from(self.capacity - self.available);
        if new_tokens >= missing {
            self.available = self.capacity;
            self.last_refill = now;
        } else {
            // new_tokens < missing <= u32::MAX
            let n = new_tokens as u32;
            self.available += n;
            self.last_refill += self.refill_interval * n;
        }
    }

    fn until_next_token(&self, now: Instant) -> Duration {
        (self.last_refill + self.refill_interval).saturating_duration_since(now)
    }
}

/// Rate gate for one client session; see the module docs for ordering.
#[derive(Debug)]
pub struct Quota {
    bucket: Mutex<Bucket>,
    turnstile: tokio::sync::Mutex<()>,
    wake: Notify,
}

impl Quota {
    /// A full bucket of `capacity` tokens regenerating one per `refill_interval`.
    pub fn new(capacity: u32, refill_interval: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            bucket: Mutex::new(Bucket {
                capacity,
                available: capacity,
                refill_interval: refill_interval.max(Duration::from_millis(1)),
                last_refill: Instant::now(),
            }),
            turnstile: tokio::sync::Mutex::new(()),
            wake: Notify::new(),
        }
    }

    fn bucket(&self) -> MutexGuard<'_, Bucket> {
        self.bucket.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Suspend until a token is available, then take it.
    pub async fn wait(&self) {
        let _turn = self.turnstile.lock().await;
        loop {
            let delay = {
                let now = Instant::now();
                let mut bucket = self.bucket();
                bucket.refill(now);
                if bucket.available > 0 {
                    bucket.available -= 1;
                    return;
                }
                bucket.until_next_token(now)
            };
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.wake.notified() => {}
            }
        }
    }

    /// Change the capacity for future admissions. Tokens above the new
    /// capacity are dropped; tokens already granted are not revoked.
    pub fn set_max(&self, capacity: u32) {
        {
            let mut bucket = self.bucket();
            bucket.refill(Instant::now());
            bucket.capacity = capacity.max(1);
            bucket.available = bucket.available.min(bucket.capacity);
        }
        self.wake.notify_one();
    }

    /// Refill the bucket completely and restart refill accounting.
    pub fn reset(&self) {
        {
            let mut bucket = self.bucket();
            bucket.available = bucket.capacity;
            bucket.last_refill = Instant::now();
        }
        self.wake.notify_one();
    }

    /// Tokens available right now, including any refill due.
    pub fn available(&self) -> u32 {
        let mut bucket = self.bucket();
        bucket.refill(Instant::now());
        bucket.available
    }

    pub fn capacity(&self) -> u32 {
        self.bucket().capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::{advance, timeout};

    const SEC: Duration = Duration::from_millis(1000);

    async fn drain(q: &Quota, n: u32) {
        for _ in 0..n {
            q.wait().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn full_bucket_admits_without_delay() {
        let q = Quota::new(3, SEC);
        let start = Instant::now();
        drain(&q, 3).await;
        assert_eq!(Instant::now(), start);
        assert_eq!(q.available(), 0);
        assert_eq!(q.capacity(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn second_grant_waits_a_full_interval() {
        let q = Arc::new(Quota::new(1, SEC));
        let a = tokio::spawn({
            let q = q.clone();
            async move {
                q.wait().await;
                Instant::now()
            }
        });
        let b = tokio::spawn({
            let q = q.clone();
            async move {
                q.wait().await;
                Instant::now()
            }
        });
        let (x, y) = (a.await.unwrap(), b.await.unwrap());
        let (first, second) = (x.min(y), x.max(y));
        assert!(second.duration_since(first) >= SEC);
    }

    #[tokio::test(start_paused = true)]
    async fn tokens_are_granted_in_arrival_order() {
        let q = Arc::new(Quota::new(1, Duration::from_millis(100)));
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for id in 0..5 {
            let q = q.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                q.wait().await;
                order.lock().unwrap().push(id);
            }));
            // let the task enqueue before spawning the next
            tokio::task::yield_now().await;
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn refill_is_lazy_and_capped() {
        let q = Quota::new(5, SEC);
        drain(&q, 5).await;
        advance(Duration::from_millis(2500)).await;
        assert_eq!(q.available(), 2);
        // partial progress toward the third token is kept
        advance(Duration::from_millis(500)).await;
        assert_eq!(q.available(), 3);
        advance(SEC * 100).await;
        assert_eq!(q.available(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn set_max_clamps_outstanding_tokens() {
        let q = Quota::new(30, SEC);
        q.set_max(5);
        assert_eq!(q.capacity(), 5);
        assert_eq!(q.available(), 5);
        drain(&q, 5).await;
        assert!(timeout(Duration::from_millis(900), q.wait()).await.is_err());
        assert!(q.available() <= q.capacity());
    }

    #[tokio::test(start_paused = true)]
    async fn raising_capacity_allows_more_outstanding_tokens() {
        let q = Quota::new(30, SEC);
        drain(&q, 30).await;
        q.set_max(300);
        assert_eq!(q.available(), 0);
        advance(SEC * 300).await;
        let start = Instant::now();
        drain(&q, 300).await;
        assert_eq!(Instant::now(), start);
        assert!(timeout(Duration::from_millis(900), q.wait()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_refills_immediately() {
        let q = Quota::new(4, SEC * 60);
        drain(&q, 4).await;
        q.reset();
        assert_eq!(q.available(), q.capacity());
        let start = Instant::now();
        q.wait().await;
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_wakes_a_blocked_waiter() {
        let q = Arc::new(Quota::new(1, SEC * 3600));
        q.wait().await;
        let start = Instant::now();
        let waiter = tokio::spawn({
            let q = q.clone();
            async move {
                q.wait().await;
                Instant::now()
            }
        });
        tokio::task::yield_now().await;
        advance(Duration::from_millis(10)).await;
        q.reset();
        let granted = waiter.await.unwrap();
        assert!(granted.duration_since(start) < SEC);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_waiter_consumes_no_token() {
        let q = Quota::new(1, SEC);
        q.wait().await;
        assert!(timeout(Duration::from_millis(10), q.wait()).await.is_err());
        advance(SEC).await;
        assert_eq!(q.available(), 1);
        let start = Instant::now();
        q.wait().await;
        assert_eq!(Instant::now(), start);
    }
}
