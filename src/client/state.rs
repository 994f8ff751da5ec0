//! Process-wide state shared by every client connection: the two backend
//! pools, the Auth Table, the Deletion Memo, and the migration policy flags
//! (spec.md §5 "Shared resources").

use std::sync::Arc;

use crate::auth::AuthTable;
use crate::config::Config;
use crate::memo::DeletionMemo;
use crate::metrics::Target;
use crate::pool::BackendPool;

pub struct ProxyState {
    pub password: String,
    pub delete_on_get: bool,
    pub delete_on_set: bool,
    pub source: BackendPool,
    pub destination: BackendPool,
    pub auth: AuthTable,
    pub memo: DeletionMemo,
}

impl ProxyState {
    pub fn new(config: &Config) -> Arc<Self> {
        Arc::new(Self {
            password: config.password.clone(),
            delete_on_get: config.delete_on_get,
            delete_on_set: config.delete_on_set,
            source: BackendPool::new(Target::Source, &config.source),
            destination: BackendPool::new(Target::Destination, &config.destination),
            auth: AuthTable::new(),
            memo: DeletionMemo::new(),
        })
    }

    pub fn auth_required(&self) -> bool {
        !self.password.is_empty()
    }
}
