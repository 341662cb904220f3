//! Pool of exclusive, reusable pipeline instances.

use parking_lot::Mutex;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Clears request-scoped state before an instance is reused.
pub trait Recycle {
    /// Resets the instance for the next request.
    fn recycle(&mut self);
}

type Factory<P> = Arc<dyn Fn() -> P + Send + Sync>;

struct PoolInner<P> {
    idle: Mutex<Vec<P>>,
    factory: Factory<P>,
    max_idle: usize,
}

/// Hands out pipeline instances to one request at a time.
///
/// [`PipelinePool::checkout`] returns a [`Pooled`] handle with exclusive
/// ownership of an instance. Dropping the handle recycles the instance and
/// returns it to the idle list, unless `max_idle` instances are already idle.
pub struct PipelinePool<P> {
    inner: Arc<PoolInner<P>>,
}

impl<P: Recycle> PipelinePool<P> {
    /// Creates a pool that builds new instances with `factory`.
    pub fn new<F>(max_idle: usize, factory: F) -> Self
    where
        F: Fn() -> P + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(Vec::new()),
                factory: Arc::new(factory),
                max_idle,
            }),
        }
    }

    /// Takes an idle instance, or builds one if none is idle.
    #[must_use]
    pub fn checkout(&self) -> Pooled<P> {
        let item = self
            .inner
            .idle
            .lock()
            .pop()
            .unwrap_or_else(|| (self.inner.factory)());
        Pooled {
            item: Some(item),
            pool: Arc::clone(&self.inner),
        }
    }

    /// Number of instances waiting to be checked out.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().len()
    }
}

impl<P> Clone for PipelinePool<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P> fmt::Debug for PipelinePool<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelinePool")
            .field("idle", &self.inner.idle.lock().len())
            .field("max_idle", &self.inner.max_idle)
            .finish()
    }
}

/// Exclusive handle to a pooled instance.
pub struct Pooled<P: Recycle> {
    item: Option<P>,
    pool: Arc<PoolInner<P>>,
}

impl<P: Recycle> Pooled<P> {
    /// Takes the instance out of the pool for good.
    #[must_use]
    pub fn detach(mut self) -> P {
        match self.item.take() {
            Some(item) => item,
            None => unreachable!("pooled item is only taken on detach or drop"),
        }
    }
}

impl<P: Recycle> Deref for Pooled<P> {
    type Target = P;

    fn deref(&self) -> &P {
        match &self.item {
            Some(item) => item,
            None => unreachable!("pooled item is only taken on detach or drop"),
        }
    }
}

impl<P: Recycle> DerefMut for Pooled<P> {
    fn deref_mut(&mut self) -> &mut P {
        match &mut self.item {
            Some(item) => item,
            None => unreachable!("pooled item is only taken on detach or drop"),
        }
    }
}

impl<P: Recycle> Drop for Pooled<P> {
    fn drop(&mut self) {
        let Some(mut item) = self.item.take() else {
            return;
        };
        item.recycle();
        let mut idle = self.pool.idle.lock();
        if idle.len() < self.pool.max_idle {
            idle.push(item);
        }
    }
}

impl<P: Recycle + fmt::Debug> fmt::Debug for Pooled<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pooled").field(&self.item).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::events::CollectingEventSink;
    use crate::pipeline::{CacheStatus, EventPipeline};
    use crate::testing::{StageProbe, TestRegistry};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct Counter {
        value: usize,
        recycled: usize,
    }

    impl Recycle for Counter {
        fn recycle(&mut self) {
            self.value = 0;
            self.recycled += 1;
        }
    }

    #[test]
    fn test_checkout_reuses_recycled_instance() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let pool = PipelinePool::new(4, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Counter::default()
        });

        {
            let mut handle = pool.checkout();
            handle.value = 42;
        }
        assert_eq!(pool.idle_count(), 1);

        let handle = pool.checkout();
        assert_eq!(handle.value, 0);
        assert_eq!(handle.recycled, 1);
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_checkouts_are_exclusive() {
        let pool = PipelinePool::new(4, Counter::default);

        let mut first = pool.checkout();
        let mut second = pool.checkout();
        first.value = 1;
        second.value = 2;

        assert_eq!(first.value, 1);
        assert_eq!(second.value, 2);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn test_max_idle_bounds_returned_instances() {
        let pool = PipelinePool::new(1, Counter::default);

        let first = pool.checkout();
        let second = pool.checkout();
        drop(first);
        drop(second);

        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_detach_keeps_instance_out_of_pool() {
        let pool = PipelinePool::new(4, Counter::default);
        let item = pool.checkout().detach();

        assert_eq!(item.recycled, 0);
        assert_eq!(pool.idle_count(), 0);
    }

    #[tokio::test]
    async fn test_pooled_event_pipeline_is_reset_between_requests() {
        let probe = StageProbe::uncacheable();
        let registry = TestRegistry::new().source("src", &probe).build();
        let pool = PipelinePool::new(2, move || EventPipeline::new(Arc::clone(&registry)));

        for _ in 0..2 {
            let mut pipeline = pool.checkout();
            pipeline.set_source("src").unwrap();
            let status = pipeline
                .process(&RequestContext::new(), &mut CollectingEventSink::new())
                .await
                .unwrap();
            assert_eq!(status, CacheStatus::Bypassed);
        }

        assert_eq!(probe.run_count(), 2);
        assert_eq!(pool.idle_count(), 1);
    }
}
