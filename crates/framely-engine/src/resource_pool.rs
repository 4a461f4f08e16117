//! Bounded accelerator pool.
//!
//! A counting gate in front of the accelerator. Holding a [`PoolPermit`]
//! grants one slot; dropping it returns the slot on every exit path.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{ShotError, ShotResult};
use crate::metrics;

/// Default number of concurrent accelerator holders.
pub const DEFAULT_MAX_CONCURRENCY: usize = 2;

/// Name of the pool created by [`ResourcePool::new`].
pub const DEFAULT_POOL_NAME: &str = "accelerator";

/// Counting gate bounding accelerator-bound work.
///
/// Cloning shares the underlying slots. Independent pools are created with
/// [`ResourcePool::new`] or [`ResourcePool::named`]; the occupancy gauge is
/// labeled with the pool name.
#[derive(Debug, Clone)]
pub struct ResourcePool {
    name: Arc<str>,
    semaphore: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    max: usize,
}

impl ResourcePool {
    /// Create a pool with `max` slots (at least one).
    pub fn new(max: usize) -> Self {
        Self::named(DEFAULT_POOL_NAME, max)
    }

    pub fn named(name: impl Into<Arc<str>>, max: usize) -> Self {
        let max = max.max(1);
        Self {
            name: name.into(),
            semaphore: Arc::new(Semaphore::new(max)),
            active: Arc::new(AtomicUsize::new(0)),
            max,
        }
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> ShotResult<PoolPermit> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ShotError::PoolClosed)?;

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_pool_active(&self.name, active);

        Ok(PoolPermit {
            _permit: permit,
            pool: Arc::clone(&self.name),
            active: Arc::clone(&self.active),
        })
    }

    /// Refuse further acquisitions. Pending waiters fail with `PoolClosed`.
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Slots currently held. For observability only.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Slots currently free. For observability only.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Default for ResourcePool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENCY)
    }
}

/// One held pool slot.
#[derive(Debug)]
pub struct PoolPermit {
    _permit: OwnedSemaphorePermit,
    pool: Arc<str>,
    active: Arc<AtomicUsize>,
}

impl Drop for PoolPermit {
    fn drop(&mut self) {
        let active = self.active.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_pool_active(&self.pool, active);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_acquire_and_release() {
        let pool = ResourcePool::new(2);
        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        assert_eq!(pool.active(), 2);
        assert_eq!(pool.available(), 0);
        drop(a);
        assert_eq!(pool.active(), 1);
        drop(b);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_never_exceeds_max_under_contention() {
        let pool = ResourcePool::new(3);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..200 {
            let pool = pool.clone();
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _permit = pool.acquire().await.unwrap();
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1)).await;
                current.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(pool.active(), 0);
    }

    #[tokio::test]
    async fn test_slot_released_when_holder_fails() {
        let pool = ResourcePool::new(1);

        async fn failing_work(pool: &ResourcePool) -> Result<(), &'static str> {
            let _permit = pool.acquire().await.map_err(|_| "closed")?;
            Err("boom")
        }

        assert!(failing_work(&pool).await.is_err());
        assert_eq!(pool.available(), 1);
        let permit = tokio::time::timeout(Duration::from_secs(1), pool.acquire()).await;
        assert!(permit.is_ok());
    }

    #[tokio::test]
    async fn test_independent_instances() {
        let a = ResourcePool::new(1);
        let b = ResourcePool::new(1);
        let _held = a.acquire().await.unwrap();
        assert_eq!(b.available(), 1);
    }

    #[tokio::test]
    async fn test_closed_pool() {
        let pool = ResourcePool::new(1);
        pool.close();
        assert!(matches!(pool.acquire().await, Err(ShotError::PoolClosed)));
    }

    #[test]
    fn test_acquire_waits_until_slot_returns() {
        let pool = ResourcePool::new(1);
        let held = tokio_test::block_on(pool.acquire()).unwrap();

        let mut waiting = tokio_test::task::spawn(pool.acquire());
        tokio_test::assert_pending!(waiting.poll());

        drop(held);
        assert!(waiting.is_woken());
        let _permit = tokio_test::assert_ready_ok!(waiting.poll());
        assert_eq!(pool.active(), 1);
    }

    #[test]
    fn test_occupancy_gauge_is_per_pool() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        let (gpu, scenes) = (ResourcePool::named("gpu", 2), ResourcePool::named("scenes", 2));
        let held = ::metrics::with_local_recorder(&recorder, || {
            let held = tokio_test::block_on(gpu.acquire()).unwrap();
            drop(tokio_test::block_on(scenes.acquire()).unwrap());
            held
        });

        let rendered = handle.render();
        let gauge = |pool: &str| -> f64 {
            let prefix = format!("{}{{pool=\"{}\"}} ", crate::metrics::names::POOL_ACTIVE, pool);
            rendered
                .lines()
                .find_map(|line| line.strip_prefix(prefix.as_str()))
                .and_then(|value| value.trim().parse().ok())
                .unwrap()
        };
        assert_eq!(gauge("gpu"), 1.0);
        assert_eq!(gauge("scenes"), 0.0);
        assert_eq!(gpu.name(), "gpu");
        drop(held);
    }

    #[test]
    fn test_zero_max_is_clamped() {
        assert_eq!(ResourcePool::new(0).max(), 1);
        assert_eq!(ResourcePool::default().max(), DEFAULT_MAX_CONCURRENCY);
        assert_eq!(ResourcePool::default().name(), DEFAULT_POOL_NAME);
    }
}
