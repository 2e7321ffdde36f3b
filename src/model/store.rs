//! Purpose: Per-model stores that issue data-access calls and announce object changes.
//! Exports: `Store`, `StoreFactory`, `StoreOptions`, `ModelStore`, `StoreEvent`.
//! Role: Custom stores wrap a `ModelStore` and override the calls they specialize.
//! Invariants: A subtype store with a root store publishes on the root's channel.
//! Invariants: Change events are published only for `ok` responses.
#![allow(clippy::result_large_err)]

use super::descriptor::{DiscriminatorMap, ModelType};
use crate::api::{ApiCall, ApiResponse, Bus, Multiplexer, RequestOptions};
use crate::core::completion::Completion;
use crate::core::error::{Error, ErrorKind};
use serde_json::{Map, Value, json};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StoreEvent {
    Create,
    Update,
    Delete,
}

impl StoreEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreEvent::Create => "create",
            StoreEvent::Update => "update",
            StoreEvent::Delete => "delete",
        }
    }
}

#[derive(Clone)]
pub struct StoreOptions {
    pub model: Arc<ModelType>,
    pub root_store: Option<Arc<dyn Store>>,
    /// Map in effect for the type, declared or inherited from the root.
    pub discriminator: Option<DiscriminatorMap>,
    pub api: Multiplexer,
    pub bus: Bus,
}

pub trait StoreFactory: Send + Sync {
    fn build(&self, options: StoreOptions) -> Arc<dyn Store>;
}

impl<F> StoreFactory for F
where
    F: Fn(StoreOptions) -> Arc<dyn Store> + Send + Sync,
{
    fn build(&self, options: StoreOptions) -> Arc<dyn Store> {
        self(options)
    }
}

pub trait Store: Send + Sync + 'static {
    fn base(&self) -> &ModelStore;

    fn as_any(&self) -> &dyn Any;

    fn model(&self) -> &Arc<ModelType> {
        self.base().model()
    }

    fn channel(&self) -> &str {
        self.base().channel()
    }

    fn root_store(&self) -> Option<&Arc<dyn Store>> {
        self.base().root_store()
    }

    fn query(&self, filter: Map<String, Value>) -> Completion<ApiResponse> {
        self.base().query(filter)
    }

    fn get(&self, id: &str) -> Completion<ApiResponse> {
        self.base().get(id)
    }

    fn add(&self, object: Map<String, Value>) -> Completion<ApiResponse> {
        self.base().add(object)
    }

    fn put(&self, object: Map<String, Value>) -> Completion<ApiResponse> {
        self.base().put(object)
    }

    fn remove(&self, id: &str) -> Completion<ApiResponse> {
        self.base().remove(id)
    }
}

pub struct ModelStore {
    model: Arc<ModelType>,
    root_store: Option<Arc<dyn Store>>,
    discriminator: Option<DiscriminatorMap>,
    channel: String,
    api: Multiplexer,
    bus: Bus,
}

impl ModelStore {
    pub fn new(options: StoreOptions) -> Self {
        let channel = match &options.root_store {
            Some(root) => root.channel().to_string(),
            None => options.model.channel(),
        };
        Self {
            model: options.model,
            root_store: options.root_store,
            discriminator: options.discriminator,
            channel,
            api: options.api,
            bus: options.bus,
        }
    }

    pub fn model(&self) -> &Arc<ModelType> {
        &self.model
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn root_store(&self) -> Option<&Arc<dyn Store>> {
        self.root_store.as_ref()
    }

    pub fn discriminator(&self) -> Option<&DiscriminatorMap> {
        self.discriminator.as_ref()
    }

    pub fn api(&self) -> &Multiplexer {
        &self.api
    }

    pub fn call(&self, action: &str) -> ApiCall {
        ApiCall::new(self.model.module(), action)
    }

    pub fn query(&self, filter: Map<String, Value>) -> Completion<ApiResponse> {
        let call = self.call("query").with_arg("filter", Value::Object(filter));
        self.api.request(call, RequestOptions::default())
    }

    pub fn get(&self, id: &str) -> Completion<ApiResponse> {
        let call = self.call("get").with_arg("id", id);
        self.api.request(call, RequestOptions::default())
    }

    pub fn add(&self, object: Map<String, Value>) -> Completion<ApiResponse> {
        self.mutate("add", StoreEvent::Create, object)
    }

    pub fn put(&self, object: Map<String, Value>) -> Completion<ApiResponse> {
        self.mutate("put", StoreEvent::Update, object)
    }

    pub fn remove(&self, id: &str) -> Completion<ApiResponse> {
        let call = self.call("delete").with_arg("id", id);
        let completion = self.api.request(call, RequestOptions::default());
        let mut object = Map::new();
        object.insert("id".to_string(), Value::from(id));
        self.announce(&completion, StoreEvent::Delete, object);
        completion
    }

    /// Local object of this store's type seeded with `props`; nothing is sent.
    /// A concrete subtype fills in its discriminator value unless `props` sets one.
    pub fn make_object(&self, mut props: Map<String, Value>) -> Map<String, Value> {
        if let Some(map) = &self.discriminator {
            if !props.contains_key(&map.field) {
                if let Some(key) = map.key_for(self.model.id()) {
                    props.insert(map.field.clone(), Value::from(key));
                }
            }
        }
        props
    }

    /// Local object tagged for a concrete subtype of a discriminated hierarchy.
    pub fn create_object(&self, discriminator_key: Option<&str>) -> Result<Map<String, Value>, Error> {
        let mut object = Map::new();
        let Some(key) = discriminator_key else {
            return Ok(object);
        };
        let map = self.discriminator.as_ref().ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message("model has no discriminator map")
                .with_type_id(self.model.id())
        })?;
        if map.type_for(key).is_none() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unknown discriminator value {key:?}"))
                .with_type_id(self.model.id()));
        }
        object.insert(map.field.clone(), Value::from(key));
        Ok(object)
    }

    fn mutate(
        &self,
        action: &str,
        event: StoreEvent,
        object: Map<String, Value>,
    ) -> Completion<ApiResponse> {
        let call = self
            .call(action)
            .with_arg("object", Value::Object(object.clone()));
        let completion = self.api.request(call, RequestOptions::default());
        self.announce(&completion, event, object);
        completion
    }

    fn announce(
        &self,
        completion: &Completion<ApiResponse>,
        event: StoreEvent,
        sent: Map<String, Value>,
    ) {
        let bus = self.bus.clone();
        let channel = self.channel.clone();
        completion.on_resolve(move |response| {
            if !response.status.is_success() {
                return;
            }
            let object = response
                .get("object")
                .cloned()
                .unwrap_or(Value::Object(sent));
            bus.publish(&channel, json!({"type": event.as_str(), "object": object}));
        });
    }
}

impl Store for ModelStore {
    fn base(&self) -> &ModelStore {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for ModelStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelStore")
            .field("model", &self.model.id())
            .field("channel", &self.channel)
            .field(
                "root_store",
                &self.root_store.as_ref().map(|root| root.model().id().to_string()),
            )
            .finish()
    }
}
