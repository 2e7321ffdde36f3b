//! Purpose: Resolve a model type to its single store instance.
//! Exports: `StoreRegistry`.
//! Role: Process-lifetime, append-only cache owned by the `ApiContext`.
//! Invariants: One store per type id; repeated lookups return the same `Arc`.
//! Invariants: Discriminated subtypes get their own store seeded with the root's store.
#![allow(clippy::result_large_err)]

use super::descriptor::ModelCatalog;
use super::store::{ModelStore, Store, StoreOptions};
use crate::api::{Bus, Multiplexer};
use crate::core::error::{Error, ErrorKind};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

pub struct StoreRegistry {
    catalog: ModelCatalog,
    api: Multiplexer,
    bus: Bus,
    stores: Mutex<HashMap<String, Arc<dyn Store>>>,
}

impl StoreRegistry {
    pub fn new(catalog: ModelCatalog, api: Multiplexer, bus: Bus) -> Self {
        Self {
            catalog,
            api,
            bus,
            stores: Mutex::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn cached_len(&self) -> usize {
        self.stores
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .len()
    }

    pub fn get_store(&self, type_id: &str) -> Result<Arc<dyn Store>, Error> {
        if let Some(store) = self
            .stores
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .get(type_id)
        {
            return Ok(Arc::clone(store));
        }

        let model = self.catalog.get(type_id).ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message("model type is not registered")
                .with_type_id(type_id)
        })?;
        // Root entries always declare their own map, so this recurses at most once.
        let root_store = match self.catalog.root_of(type_id) {
            Some(root_id) if root_id != type_id => Some(self.get_store(root_id)?),
            _ => None,
        };
        let options = StoreOptions {
            model: Arc::clone(model),
            root_store,
            discriminator: self.catalog.discriminator_map(type_id).cloned(),
            api: self.api.clone(),
            bus: self.bus.clone(),
        };
        let built: Arc<dyn Store> = match model.store_factory() {
            Some(factory) => factory.build(options),
            None => Arc::new(ModelStore::new(options)),
        };

        let mut stores = self
            .stores
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let store = stores.entry(type_id.to_string()).or_insert(built);
        tracing::debug!(model = type_id, channel = store.channel(), "store ready");
        Ok(Arc::clone(store))
    }
}

impl fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("types", &self.catalog.len())
            .field("stores", &self.cached_len())
            .finish()
    }
}
