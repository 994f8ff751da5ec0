//! Backend Pool Facade (spec.md §4.A): a thin, named wrapper around the
//! generic object pool in [`inner`] that dials [`backend::BackendConnection`]s.

mod backend;
pub mod errors;
mod inner;
mod types;

pub use backend::{BackendConnection, BackendManager};
pub use errors::{PoolError, RecycleError, RecycleResult};
pub use inner::{Manager, Object, Pool as InnerPool};
pub use types::{Metrics, PoolConfig, QueueMode, Status, Timeouts};

use crate::config::BackendConfig;
use crate::metrics::Target;

/// One backend's pool, named so callers (and the metrics sink) know which
/// side of the migration it talks to.
#[derive(Clone)]
pub struct BackendPool {
    pub target: Target,
    inner: InnerPool<BackendManager>,
}

impl BackendPool {
    pub fn new(target: Target, config: &BackendConfig) -> Self {
        let inner = InnerPool::builder(BackendManager::new(config.clone()))
            .max_size(config.max_idle_conns)
            .timeouts(Timeouts {
                wait: None,
                create: None,
                recycle: None,
            })
            .build();
        Self { target, inner }
    }

    /// Acquires a connection, dialing a new one if the idle slots are empty
    /// (spec.md §4.A `Acquire`). Dropping the returned guard is `Release`.
    pub async fn acquire(&self) -> Result<Object<BackendManager>, PoolError> {
        self.inner.get().await
    }

    pub fn status(&self) -> Status {
        self.inner.status()
    }
}
