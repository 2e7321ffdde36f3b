//! Purpose: Process-wide client context bundling window id, multiplexer, bus, and stores.
//! Exports: `ApiContext`, `ContextBuilder`.
//! Role: Built once at startup and cloned into consumers instead of module-level globals.
//! Invariants: The window id is generated once per context and never changes.
//! Invariants: Building requires a tokio runtime; flushes and timers run on it.
#![allow(clippy::result_large_err)]

use crate::api::{
    ApiRequest, ApiResponse, Bus, ExceptionReporter, HttpTransport, LogExceptionReporter,
    Multiplexer, RequestOptions, TopicMessage, Transport,
};
use crate::config::ApiConfig;
use crate::core::completion::Completion;
use crate::core::error::{Error, ErrorKind};
use crate::core::ids::WindowId;
use crate::model::{ModelCatalog, Store, StoreRegistry};
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct ApiContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    bus: Bus,
    api: Multiplexer,
    stores: StoreRegistry,
}

pub struct ContextBuilder {
    config: ApiConfig,
    catalog: ModelCatalog,
    transport: Option<Arc<dyn Transport>>,
    reporter: Option<Arc<dyn ExceptionReporter>>,
    window_id: Option<WindowId>,
    runtime: Option<Handle>,
}

impl ApiContext {
    pub fn builder(config: ApiConfig) -> ContextBuilder {
        ContextBuilder {
            config,
            catalog: ModelCatalog::new(),
            transport: None,
            reporter: None,
            window_id: None,
            runtime: None,
        }
    }

    pub fn window_id(&self) -> &WindowId {
        self.inner.api.window_id()
    }

    pub fn config(&self) -> &ApiConfig {
        self.inner.api.config()
    }

    pub fn bus(&self) -> &Bus {
        &self.inner.bus
    }

    pub fn api(&self) -> &Multiplexer {
        &self.inner.api
    }

    pub fn stores(&self) -> &StoreRegistry {
        &self.inner.stores
    }

    pub fn request(
        &self,
        request: impl Into<ApiRequest>,
        options: RequestOptions,
    ) -> Completion<ApiResponse> {
        self.inner.api.request(request, options)
    }

    pub fn store(&self, type_id: &str) -> Result<Arc<dyn Store>, Error> {
        self.inner.stores.get_store(type_id)
    }

    /// Busy notices: `true` when a batch goes out, `false` when it settles.
    pub fn subscribe_busy(&self) -> broadcast::Receiver<TopicMessage> {
        self.inner.bus.subscribe(&self.config().notice_topic)
    }
}

impl fmt::Debug for ApiContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiContext")
            .field("api", &self.inner.api)
            .field("stores", &self.inner.stores)
            .finish()
    }
}

impl ContextBuilder {
    pub fn catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn exception_reporter(mut self, reporter: Arc<dyn ExceptionReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn window_id(mut self, window_id: WindowId) -> Self {
        self.window_id = Some(window_id);
        self
    }

    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<ApiContext, Error> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|err| {
                Error::new(ErrorKind::Usage)
                    .with_message("API context must be built inside a tokio runtime")
                    .with_source(err)
            })?,
        };
        let transport: Arc<dyn Transport> = match (self.transport, &self.config.base_url) {
            (Some(transport), _) => transport,
            (None, Some(base_url)) => Arc::new(HttpTransport::new(base_url.clone())?),
            (None, None) => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("no transport configured")
                    .with_hint("Set `baseUrl` in the config or pass a transport."));
            }
        };
        let reporter = self.reporter.unwrap_or_else(|| {
            Arc::new(LogExceptionReporter {
                verbose: self.config.show_exceptions,
            })
        });
        let window_id = match self.window_id {
            Some(window_id) => window_id,
            None => WindowId::generate()?,
        };
        tracing::debug!(window_id = %window_id, url = %self.config.url, "API context ready");

        let bus = Bus::new();
        let api = Multiplexer::new(
            self.config,
            window_id,
            transport,
            reporter,
            bus.clone(),
            runtime,
        );
        let stores = StoreRegistry::new(self.catalog, api.clone(), bus.clone());
        Ok(ApiContext {
            inner: Arc::new(ContextInner { bus, api, stores }),
        })
    }
}
