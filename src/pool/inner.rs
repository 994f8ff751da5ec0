use std::{
    collections::VecDeque,
    fmt,
    ops::{Deref, DerefMut},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Weak,
    },
};

use parking_lot::Mutex;
use tokio::sync::{Semaphore, SemaphorePermit, TryAcquireError};

use super::errors::{PoolError, RecycleResult, TimeoutType};
use super::types::{Metrics, PoolConfig, QueueMode, Status, Timeouts};

/// Things a pool knows how to create and recycle.
///
/// Implemented once per backend kind (here, a single RESP TCP connection);
/// the pool itself is otherwise unaware of what it holds.
pub trait Manager: Send + Sync + 'static {
    type Type: Send;

    /// Dials a brand new connection.
    fn create(&self) -> impl std::future::Future<Output = Result<Self::Type, std::io::Error>> + Send;

    /// Validates a connection pulled from the idle slots before handing it
    /// back out. Returning an error drops the connection instead of reusing it.
    fn recycle(
        &self,
        obj: &mut Self::Type,
        metrics: &Metrics,
    ) -> impl std::future::Future<Output = RecycleResult> + Send;
}

struct ObjectInner<T> {
    obj: T,
    metrics: Metrics,
}

/// Wrapper around a pooled connection. Returns it to the pool on drop.
pub struct Object<M: Manager> {
    inner: Option<ObjectInner<M::Type>>,
    pool: Weak<PoolInner<M>>,
}

impl<M: Manager> Object<M> {
    /// Takes ownership of the wrapped connection, bypassing recycling.
    #[allow(dead_code)]
    pub fn take(mut this: Self) -> M::Type {
        this.inner.take().unwrap().obj
    }
}

impl<M: Manager> Drop for Object<M> {
    fn drop(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            if let Some(pool) = self.pool.upgrade() {
                inner.metrics.recycled = Some(std::time::Instant::now());
                inner.metrics.recycle_count += 1;
                pool.return_object(inner);
            }
        }
    }
}

impl<M: Manager> Deref for Object<M> {
    type Target = M::Type;
    fn deref(&self) -> &Self::Target {
        &self.inner.as_ref().unwrap().obj
    }
}

impl<M: Manager> DerefMut for Object<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner.as_mut().unwrap().obj
    }
}

struct Slots<T> {
    vec: VecDeque<ObjectInner<T>>,
    size: usize,
}

struct PoolInner<M: Manager> {
    manager: M,
    slots: Mutex<Slots<M::Type>>,
    semaphore: Semaphore,
    config: PoolConfig,
    /// Callers currently inside [`Pool::timeout_get`], counting both those
    /// still waiting on a permit and those dialing/recycling. Used only for
    /// [`Status::waiting`]; never gates acquisition itself.
    users: AtomicUsize,
}

impl<M: Manager> PoolInner<M> {
    fn return_object(&self, inner: ObjectInner<M::Type>) {
        let mut slots = self.slots.lock();
        match self.config.queue_mode {
            QueueMode::Fifo => slots.vec.push_back(inner),
            QueueMode::Lifo => slots.vec.push_front(inner),
        }
        drop(slots);
        self.semaphore.add_permits(1);
    }
}

/// A generic object pool, cloneable and cheap to share across tasks.
pub struct Pool<M: Manager> {
    inner: Arc<PoolInner<M>>,
}

impl<M: Manager> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<M: Manager> fmt::Debug for Pool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.inner.slots.lock();
        f.debug_struct("Pool")
            .field("size", &slots.size)
            .field("max_size", &self.inner.config.max_size)
            .finish()
    }
}

impl<M: Manager> Pool<M> {
    pub fn builder(manager: M) -> PoolBuilder<M> {
        PoolBuilder::new(manager)
    }

    fn timeouts(&self) -> Timeouts {
        self.inner.config.timeouts
    }

    /// Acquires a connection, dialing a new one if the idle slots are empty.
    pub async fn get(&self) -> Result<Object<M>, PoolError> {
        self.timeout_get(&self.timeouts()).await
    }

    pub async fn timeout_get(&self, timeouts: &Timeouts) -> Result<Object<M>, PoolError> {
        self.inner.users.fetch_add(1, Ordering::Relaxed);
        scopeguard::defer! {
            self.inner.users.fetch_sub(1, Ordering::Relaxed);
        }

        let permit = self.acquire_permit(timeouts).await?;

        loop {
            let existing = {
                let mut slots = self.inner.slots.lock();
                slots.vec.pop_front()
            };

            let Some(mut inner) = existing else {
                let obj = match timeouts.create {
                    Some(duration) => match tokio::time::timeout(duration, self.inner.manager.create()).await {
                        Ok(r) => r?,
                        Err(_) => return Err(PoolError::Timeout(TimeoutType::Create)),
                    },
                    None => self.inner.manager.create().await?,
                };
                self.inner.slots.lock().size += 1;
                permit.forget();
                return Ok(Object {
                    inner: Some(ObjectInner {
                        obj,
                        metrics: Metrics::default(),
                    }),
                    pool: Arc::downgrade(&self.inner),
                });
            };

            let recycled = match timeouts.recycle {
                Some(duration) => {
                    match tokio::time::timeout(duration, self.inner.manager.recycle(&mut inner.obj, &inner.metrics))
                        .await
                    {
                        Ok(r) => r,
                        Err(_) => Err(super::errors::RecycleError::Message("recycle timed out".into())),
                    }
                }
                None => self.inner.manager.recycle(&mut inner.obj, &inner.metrics).await,
            };

            match recycled {
                Ok(()) => {
                    permit.forget();
                    return Ok(Object {
                        inner: Some(inner),
                        pool: Arc::downgrade(&self.inner),
                    });
                }
                Err(_) => {
                    let mut slots = self.inner.slots.lock();
                    slots.size = slots.size.saturating_sub(1);
                    continue;
                }
            }
        }
    }

    async fn acquire_permit(&self, timeouts: &Timeouts) -> Result<SemaphorePermit<'_>, PoolError> {
        let non_blocking = timeouts.wait.is_some_and(|t| t.is_zero());
        if non_blocking {
            return self.inner.semaphore.try_acquire().map_err(|e| match e {
                TryAcquireError::Closed => PoolError::Closed,
                TryAcquireError::NoPermits => PoolError::Timeout(TimeoutType::Wait),
            });
        }

        match timeouts.wait {
            Some(duration) => match tokio::time::timeout(duration, self.inner.semaphore.acquire()).await {
                Ok(Ok(p)) => Ok(p),
                Ok(Err(_)) => Err(PoolError::Closed),
                Err(_) => Err(PoolError::Timeout(TimeoutType::Wait)),
            },
            None => self.inner.semaphore.acquire().await.map_err(|_| PoolError::Closed),
        }
    }

    /// A snapshot of the pool's current occupancy.
    pub fn status(&self) -> Status {
        let slots = self.inner.slots.lock();
        let available = self.inner.semaphore.available_permits();
        let users = self.inner.users.load(Ordering::Relaxed);
        Status {
            max_size: self.inner.config.max_size,
            size: slots.size,
            available,
            waiting: users.saturating_sub(available.min(users)),
        }
    }
}

/// Builder for [`Pool`].
pub struct PoolBuilder<M: Manager> {
    manager: M,
    config: PoolConfig,
}

impl<M: Manager> PoolBuilder<M> {
    fn new(manager: M) -> Self {
        Self {
            manager,
            config: PoolConfig::default(),
        }
    }

    pub fn max_size(mut self, max_size: usize) -> Self {
        self.config.max_size = max_size;
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.config.timeouts = timeouts;
        self
    }

    pub fn build(self) -> Pool<M> {
        Pool {
            inner: Arc::new(PoolInner {
                manager: self.manager,
                slots: Mutex::new(Slots {
                    vec: VecDeque::with_capacity(self.config.max_size),
                    size: 0,
                }),
                semaphore: Semaphore::new(self.config.max_size),
                config: self.config,
                users: AtomicUsize::new(0),
            }),
        }
    }
}
