//! Bounded session pool for the execution backend.
//!
//! Boost attempts may each hold a browser session on the automation agent, so
//! the number of concurrent executions across all accounts is capped.
//! Serialization per account is handled by the supervisor's execution gate;
//! this pool only bounds cross-account parallelism.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Caps how many boost executions run at the same time.
#[derive(Clone)]
pub struct SessionPool {
    permits: Arc<Semaphore>,
}

impl SessionPool {
    /// Create a pool allowing up to `ceiling` concurrent executions.
    /// A ceiling of zero would deadlock every attempt, so it is raised to one.
    pub fn new(ceiling: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(ceiling.max(1))),
        }
    }

    /// Wait for an execution slot.  The slot is released when the returned
    /// permit is dropped.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .expect("session pool semaphore closed")
    }

    /// Number of currently free slots.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_pool_bounds_concurrency() {
        let pool = SessionPool::new(1);
        let held = pool.acquire().await;
        assert_eq!(pool.available(), 0);

        // A second acquire must not complete while the permit is held.
        let pool2 = pool.clone();
        let pending = tokio::spawn(async move { pool2.acquire().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pending.is_finished());

        drop(held);
        let _second = assert_ok!(pending.await);
    }

    #[tokio::test]
    async fn test_zero_ceiling_is_raised_to_one() {
        let pool = SessionPool::new(0);
        let _permit = pool.acquire().await;
    }

    #[tokio::test]
    async fn test_permits_are_released_on_drop() {
        let pool = SessionPool::new(2);
        {
            let _a = pool.acquire().await;
            let _b = pool.acquire().await;
            assert_eq!(pool.available(), 0);
        }
        assert_eq!(pool.available(), 2);
    }
}
