//! Identity-keyed access to many stores.

use crate::binding::{Binding, ConsumedState};
use crate::error::{Result, StoreError};
use crate::middleware::Middleware;
use crate::store::{Store, StoreConfig};
use crate::types::{State, StateChange, StoreId};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Owns stores and resolves them by [`StoreId`].
///
/// Every operation on an identity the registry does not hold fails with
/// [`StoreError::UnknownStore`].
pub struct StoreRegistry {
    stores: RwLock<HashMap<StoreId, Store>>,
    /// Config for stores created without one.
    default_config: StoreConfig,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Create a registry whose stores use `config` unless told otherwise.
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
            default_config: config,
        }
    }

    /// Register a new store and return its identity.
    pub fn create_store(
        &self,
        initial: State,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> Result<StoreId> {
        self.create_store_with(initial, middlewares, self.default_config.clone())
    }

    pub fn create_store_with(
        &self,
        initial: State,
        middlewares: Vec<Arc<dyn Middleware>>,
        config: StoreConfig,
    ) -> Result<StoreId> {
        let id = StoreId::next();
        let store = Store::with_id(id, initial, middlewares, config)?;
        self.stores.write().insert(id, store);
        Ok(id)
    }

    /// Handle to a registered store.
    pub fn get(&self, id: StoreId) -> Result<Store> {
        self.stores
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::UnknownStore(id))
    }

    pub fn contains(&self, id: StoreId) -> bool {
        self.stores.read().contains_key(&id)
    }

    /// Register middleware for a store created without any.
    pub fn register_middleware(
        &self,
        id: StoreId,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> Result<()> {
        self.get(id)?.register_middleware(middlewares)
    }

    #[track_caller]
    pub fn update(&self, id: StoreId, change: StateChange) -> Result<()> {
        self.get(id)?.update(change)
    }

    #[track_caller]
    pub fn set(&self, id: StoreId, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        self.get(id)?.set(key, value)
    }

    pub fn state(&self, id: StoreId) -> Result<State> {
        Ok(self.get(id)?.state())
    }

    pub fn provider_pass(&self, id: StoreId) -> Result<Binding> {
        self.get(id)?.provider_pass()
    }

    pub fn mount(&self, id: StoreId) -> Result<Binding> {
        self.get(id)?.mount()
    }

    pub fn consume(&self, id: StoreId) -> Result<ConsumedState> {
        Ok(self.get(id)?.consume())
    }

    /// Drop a store. Handles already given out keep working.
    pub fn remove(&self, id: StoreId) -> Result<Store> {
        let store = self
            .stores
            .write()
            .remove(&id)
            .ok_or(StoreError::UnknownStore(id))?;
        info!(store = %id, "Removed store");
        Ok(store)
    }

    pub fn ids(&self) -> Vec<StoreId> {
        let mut ids: Vec<_> = self.stores.read().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.stores.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.read().is_empty()
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}
