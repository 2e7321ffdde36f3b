//! Purpose: Describe model types and resolve their discriminator roots at registration.
//! Exports: `ModelType`, `Discriminator`, `DiscriminatorMap`, `ModelCatalog`.
//! Role: Load-time table consumed by the store registry.
//! Invariants: Parents register before children, so the parent graph is acyclic.
//! Invariants: A type's root is the nearest ancestor declaring a discriminator map.
//! Invariants: Roots are computed once per type; lookups never walk the hierarchy.
#![allow(clippy::result_large_err)]

use super::store::StoreFactory;
use crate::core::error::{Error, ErrorKind};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_DISCRIMINATOR_FIELD: &str = "type";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscriminatorMap {
    pub field: String,
    /// Discriminant value -> concrete model type id.
    pub variants: BTreeMap<String, String>,
}

impl DiscriminatorMap {
    pub fn new() -> Self {
        Self {
            field: DEFAULT_DISCRIMINATOR_FIELD.to_string(),
            variants: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    pub fn with_variant(mut self, key: impl Into<String>, type_id: impl Into<String>) -> Self {
        self.variants.insert(key.into(), type_id.into());
        self
    }

    pub fn type_for(&self, key: &str) -> Option<&str> {
        self.variants.get(key).map(String::as_str)
    }

    /// Discriminant value that selects `type_id`, if any.
    pub fn key_for(&self, type_id: &str) -> Option<&str> {
        self.variants
            .iter()
            .find(|(_, variant)| variant.as_str() == type_id)
            .map(|(key, _)| key.as_str())
    }
}

impl Default for DiscriminatorMap {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Discriminator {
    /// Nothing declared here; an ancestor's map still applies if one exists.
    #[default]
    None,
    Declared(DiscriminatorMap),
    /// Asserts that an ancestor declares the map; registration fails otherwise.
    Inherited,
}

#[derive(Clone)]
pub struct ModelType {
    id: String,
    parent: Option<String>,
    discriminator: Discriminator,
    module: Option<String>,
    channel: Option<String>,
    store: Option<Arc<dyn StoreFactory>>,
}

impl ModelType {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent: None,
            discriminator: Discriminator::None,
            module: None,
            channel: None,
            store: None,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn declaring(mut self, map: DiscriminatorMap) -> Self {
        self.discriminator = Discriminator::Declared(map);
        self
    }

    pub fn inheriting_discriminator(mut self) -> Self {
        self.discriminator = Discriminator::Inherited;
        self
    }

    /// API module the store's requests address; defaults to the type id.
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_store<F>(mut self, factory: F) -> Self
    where
        F: StoreFactory + 'static,
    {
        self.store = Some(Arc::new(factory));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn discriminator(&self) -> &Discriminator {
        &self.discriminator
    }

    pub fn declared_map(&self) -> Option<&DiscriminatorMap> {
        match &self.discriminator {
            Discriminator::Declared(map) => Some(map),
            _ => None,
        }
    }

    pub fn module(&self) -> &str {
        self.module.as_deref().unwrap_or(&self.id)
    }

    pub fn channel(&self) -> String {
        self.channel
            .clone()
            .unwrap_or_else(|| format!("model/{}", self.id))
    }

    pub(crate) fn store_factory(&self) -> Option<&Arc<dyn StoreFactory>> {
        self.store.as_ref()
    }
}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelType")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("discriminator", &self.discriminator)
            .field("module", &self.module)
            .field("custom_store", &self.store.is_some())
            .finish()
    }
}

#[derive(Clone, Debug)]
struct Entry {
    model: Arc<ModelType>,
    root: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ModelCatalog {
    entries: HashMap<String, Entry>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, model: ModelType) -> Result<Self, Error> {
        self.register(model)?;
        Ok(self)
    }

    pub fn register(&mut self, model: ModelType) -> Result<(), Error> {
        if self.entries.contains_key(model.id()) {
            return Err(Error::new(ErrorKind::Config)
                .with_message("model type registered twice")
                .with_type_id(model.id()));
        }
        let root = self.resolve_root(&model)?;
        tracing::trace!(model = model.id(), root = ?root, "registered model type");
        self.entries.insert(
            model.id().to_string(),
            Entry {
                model: Arc::new(model),
                root,
            },
        );
        Ok(())
    }

    pub fn get(&self, type_id: &str) -> Option<&Arc<ModelType>> {
        self.entries.get(type_id).map(|entry| &entry.model)
    }

    pub fn contains(&self, type_id: &str) -> bool {
        self.entries.contains_key(type_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Root type of a discriminated subtype; `None` for declaring or plain types.
    pub fn root_of(&self, type_id: &str) -> Option<&str> {
        self.entries
            .get(type_id)
            .and_then(|entry| entry.root.as_deref())
    }

    /// Discriminator map in effect for a type, declared or inherited.
    pub fn discriminator_map(&self, type_id: &str) -> Option<&DiscriminatorMap> {
        let entry = self.entries.get(type_id)?;
        if let Some(map) = entry.model.declared_map() {
            return Some(map);
        }
        let root = entry.root.as_deref()?;
        self.entries.get(root)?.model.declared_map()
    }

    fn resolve_root(&self, model: &ModelType) -> Result<Option<String>, Error> {
        if model.declared_map().is_some() {
            return Ok(None);
        }
        let root = match model.parent() {
            None => None,
            Some(parent_id) => {
                let parent = self.entries.get(parent_id).ok_or_else(|| {
                    Error::new(ErrorKind::Config)
                        .with_message(format!("parent type {parent_id:?} is not registered"))
                        .with_hint("Register parent model types before their subtypes.")
                        .with_type_id(model.id())
                })?;
                if parent.model.declared_map().is_some() {
                    Some(parent_id.to_string())
                } else {
                    parent.root.clone()
                }
            }
        };
        if root.is_none() && *model.discriminator() == Discriminator::Inherited {
            return Err(Error::new(ErrorKind::Config)
                .with_message("inherited discriminator map is not declared by any ancestor")
                .with_type_id(model.id()));
        }
        Ok(root)
    }
}
