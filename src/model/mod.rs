//! Purpose: Model type descriptors, per-type stores, and the store registry.
//! Exports: `ModelType`, `ModelCatalog`, `Store`, `ModelStore`, `StoreRegistry`, factories.
//! Role: Maps each model type to exactly one store owning its change channel.

mod descriptor;
mod registry;
mod store;

pub use descriptor::{
    DEFAULT_DISCRIMINATOR_FIELD, Discriminator, DiscriminatorMap, ModelCatalog, ModelType,
};
pub use registry::StoreRegistry;
pub use store::{ModelStore, Store, StoreEvent, StoreFactory, StoreOptions};
