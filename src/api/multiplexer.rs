//! Purpose: Coalesce logical API requests issued in one scheduling tick into one transport call.
//! Exports: `Multiplexer`, `RequestOptions`, `FlushReport`.
//! Role: Core of the client; stores and the CLI issue every request through it.
//! Invariants: At most one batch is open; a flush detaches it before the transport call starts.
//! Invariants: `request` never fails; transport and decode problems are logged, not raised.
//! Invariants: Every routed response resolves its handle, whatever its status or shape.
//! Invariants: A panicking continuation is logged; the rest of the batch is still routed.
//! Invariants: Handles whose id is missing from the reply stay pending (logged at warn).
//! Notes: "Same tick" means before the issuing task yields; exact on a current-thread runtime.

use super::bus::Bus;
use super::envelope::{ApiRequest, ApiResponse, Status};
use super::hooks::{ExceptionReporter, TransportErrorHandler};
use super::keepalive::KeepAlive;
use super::transport::{Transport, TransportReply, TransportRequest};
use crate::config::ApiConfig;
use crate::core::completion::Completion;
use crate::core::error::{Error, ErrorKind};
use crate::core::ids::{WindowId, random_uuid};
use crate::json::parse;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::runtime::Handle;

#[derive(Clone, Default)]
pub struct RequestOptions {
    /// Skip the exception reporter for this request.
    pub ignore_exception: bool,
    /// Send the request as a bare object when it is alone in its batch.
    pub bare: bool,
    /// Endpoint override; honored when this request opens the batch.
    pub url: Option<String>,
    /// Forwarded verbatim to the transport when this request opens the batch.
    pub settings: Map<String, Value>,
    pub transport_error: Option<TransportErrorHandler>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ignore_exception(mut self) -> Self {
        self.ignore_exception = true;
        self
    }

    pub fn bare(mut self) -> Self {
        self.bare = true;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn on_transport_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, &TransportReply) + Send + Sync + 'static,
    {
        self.transport_error = Some(Arc::new(handler));
        self
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("ignore_exception", &self.ignore_exception)
            .field("bare", &self.bare)
            .field("url", &self.url)
            .field("settings", &self.settings)
            .field("transport_error", &self.transport_error.is_some())
            .finish()
    }
}

/// Ids of the requests a flush carried; resolves once the reply was handled.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub request_ids: Vec<String>,
}

#[derive(Clone)]
pub struct Multiplexer {
    inner: Arc<Inner>,
}

struct Inner {
    config: ApiConfig,
    window_id: WindowId,
    transport: Arc<dyn Transport>,
    reporter: Arc<dyn ExceptionReporter>,
    bus: Bus,
    keepalive: KeepAlive,
    runtime: Handle,
    fallback_ids: AtomicU64,
    open: Mutex<OpenBatch>,
}

struct OpenBatch {
    pending: Vec<PendingRequest>,
    flush_scheduled: bool,
    done: Completion<FlushReport>,
}

struct PendingRequest {
    id: String,
    request: ApiRequest,
    options: RequestOptions,
    completion: Completion<ApiResponse>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum BatchShape {
    Bare,
    Keyed,
}

impl Multiplexer {
    pub fn new(
        config: ApiConfig,
        window_id: WindowId,
        transport: Arc<dyn Transport>,
        reporter: Arc<dyn ExceptionReporter>,
        bus: Bus,
        runtime: Handle,
    ) -> Self {
        let keepalive = KeepAlive::new(runtime.clone());
        Self {
            inner: Arc::new(Inner {
                config,
                window_id,
                transport,
                reporter,
                bus,
                keepalive,
                runtime,
                fallback_ids: AtomicU64::new(0),
                open: Mutex::new(OpenBatch {
                    pending: Vec::new(),
                    flush_scheduled: false,
                    done: Completion::new(),
                }),
            }),
        }
    }

    pub fn window_id(&self) -> &WindowId {
        &self.inner.window_id
    }

    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    pub fn keepalive(&self) -> &KeepAlive {
        &self.inner.keepalive
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock_open().pending.len()
    }

    pub fn is_flush_scheduled(&self) -> bool {
        self.inner.lock_open().flush_scheduled
    }

    /// Handle for the batch currently accepting requests.
    pub fn next_flush(&self) -> Completion<FlushReport> {
        self.inner.lock_open().done.clone()
    }

    pub fn request(
        &self,
        request: impl Into<ApiRequest>,
        options: RequestOptions,
    ) -> Completion<ApiResponse> {
        self.inner.keepalive.cancel();
        let request = request.into();
        let completion = Completion::new();
        let id = self.inner.next_request_id();
        tracing::trace!(
            request_id = %id,
            module = request.module(),
            action = request.action(),
            "queued API request"
        );

        let mut open = self.inner.lock_open();
        open.pending.push(PendingRequest {
            id,
            request,
            options,
            completion: completion.clone(),
        });
        if !open.flush_scheduled {
            open.flush_scheduled = true;
            let inner = Arc::clone(&self.inner);
            let delay = self.inner.config.debug_delay;
            self.inner.runtime.spawn(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Inner::flush(inner).await;
            });
        }
        completion
    }

    pub fn ping(&self) -> Completion<ApiResponse> {
        self.request(ApiRequest::Ping, RequestOptions::default())
    }
}

impl fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Multiplexer")
            .field("window_id", &self.inner.window_id)
            .field("url", &self.inner.config.url)
            .field("pending", &self.pending_len())
            .finish()
    }
}

impl Inner {
    fn lock_open(&self) -> MutexGuard<'_, OpenBatch> {
        self.open.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    fn next_request_id(&self) -> String {
        match random_uuid() {
            Ok(id) => id,
            Err(err) => {
                let seq = self.fallback_ids.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %err, "falling back to sequential request id");
                format!("{}-{seq}", self.window_id)
            }
        }
    }

    async fn flush(inner: Arc<Inner>) {
        let (pending, done) = {
            let mut open = inner.lock_open();
            open.flush_scheduled = false;
            (
                std::mem::take(&mut open.pending),
                std::mem::replace(&mut open.done, Completion::new()),
            )
        };
        let report = FlushReport {
            request_ids: pending.iter().map(|entry| entry.id.clone()).collect(),
        };
        if pending.is_empty() {
            let _ = done.resolve(report);
            return;
        }

        let network = Completion::<()>::new();
        if let Err(err) = done.depends_on(&network) {
            tracing::error!(error = %err, "flush handle already settled");
        }
        let _ = done.resolve(report);

        let shape = if pending.len() == 1 && pending[0].options.bare {
            BatchShape::Bare
        } else {
            BatchShape::Keyed
        };
        let payload = inner.encode(&pending, shape);
        let body = match serde_json::to_string(&payload) {
            Ok(body) => body,
            Err(err) => {
                tracing::error!(error = %err, "failed to encode API batch");
                let _ = network.resolve(());
                return;
            }
        };
        let first = &pending[0].options;
        let request = TransportRequest {
            url: first.url.clone().unwrap_or_else(|| inner.config.url.clone()),
            body,
            settings: first.settings.clone(),
        };
        tracing::debug!(
            url = %request.url,
            requests = pending.len(),
            bare = shape == BatchShape::Bare,
            "flushing API batch"
        );

        inner.publish_busy(true);
        let reply = inner.transport.post(request).await;
        inner.publish_busy(false);

        match reply {
            Ok(reply) => {
                if inner.deliver(pending, shape, &reply) {
                    Inner::arm_keepalive(&inner);
                }
            }
            Err(err) => {
                tracing::error!(
                    error = %err,
                    requests = pending.len(),
                    "API transport failed; requests not resolved"
                );
            }
        }
        let _ = network.resolve(());
    }

    fn encode(&self, pending: &[PendingRequest], shape: BatchShape) -> Value {
        let common = &self.config.request_common_params;
        match shape {
            BatchShape::Bare => pending[0].request.to_wire(&self.window_id, common),
            BatchShape::Keyed => Value::Object(
                pending
                    .iter()
                    .map(|entry| {
                        (
                            entry.id.clone(),
                            entry.request.to_wire(&self.window_id, common),
                        )
                    })
                    .collect(),
            ),
        }
    }

    /// Routes the reply to its handles; `false` when the reply was unusable.
    fn deliver(
        &self,
        mut pending: Vec<PendingRequest>,
        shape: BatchShape,
        reply: &TransportReply,
    ) -> bool {
        let data: Value = match parse::from_str(&reply.body) {
            Ok(data) => data,
            Err(err) => {
                let err = Error::new(ErrorKind::Decode)
                    .with_message("API reply is not valid JSON")
                    .with_hint(parse::hint_for_error(&err, "api.reply"))
                    .with_source(err);
                tracing::error!(
                    status = reply.status,
                    error = %err,
                    hint = err.hint().unwrap_or_default(),
                    "unusable API reply"
                );
                notify_transport_error(&pending, reply);
                return false;
            }
        };

        match shape {
            BatchShape::Bare => {
                let entry = pending.remove(0);
                self.route(entry, data);
            }
            BatchShape::Keyed => {
                let Value::Object(entries) = data else {
                    let err = Error::new(ErrorKind::Decode)
                        .with_message("batched API reply is not an object keyed by request id");
                    tracing::error!(status = reply.status, error = %err, "unusable API reply");
                    notify_transport_error(&pending, reply);
                    return false;
                };
                let mut by_id: HashMap<String, PendingRequest> = pending
                    .into_iter()
                    .map(|entry| (entry.id.clone(), entry))
                    .collect();
                for (id, value) in entries {
                    match by_id.remove(&id) {
                        Some(entry) => self.route(entry, value),
                        None => tracing::warn!(request_id = %id, "reply carries unknown request id"),
                    }
                }
                for (id, entry) in by_id {
                    tracing::warn!(
                        request_id = %id,
                        module = entry.request.module(),
                        action = entry.request.action(),
                        "reply omitted request; its handle stays pending"
                    );
                }
            }
        }
        true
    }

    fn route(&self, entry: PendingRequest, value: Value) {
        let response = ApiResponse::from_value(value);
        match &response.status {
            Status::Error => {
                tracing::error!(
                    request_id = %entry.id,
                    module = entry.request.module(),
                    action = entry.request.action(),
                    "error status from API"
                );
            }
            Status::Exception if !entry.options.ignore_exception => {
                self.reporter.report(&entry.request, &response);
            }
            _ => {}
        }
        // Continuations run inside resolve; a panic stays with this entry.
        let resolved = panic::catch_unwind(AssertUnwindSafe(|| entry.completion.resolve(response)));
        match resolved {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let err = err.with_request_id(&entry.id);
                tracing::error!(error = %err, "API handle resolved twice");
            }
            Err(_) => {
                let err = Error::new(ErrorKind::Internal)
                    .with_message("exception in API request callback")
                    .with_request_id(&entry.id);
                tracing::error!(
                    error = %err,
                    module = entry.request.module(),
                    action = entry.request.action(),
                    "continuation panicked; routing continues"
                );
            }
        }
    }

    fn publish_busy(&self, busy: bool) {
        self.bus.publish(&self.config.notice_topic, Value::Bool(busy));
    }

    fn arm_keepalive(inner: &Arc<Inner>) {
        let Some(delay) = inner.config.ping_delay else {
            return;
        };
        let weak: Weak<Inner> = Arc::downgrade(inner);
        inner.keepalive.delay(delay, move || {
            if let Some(inner) = weak.upgrade() {
                let _ = Multiplexer { inner }.ping();
            }
        });
    }
}

fn notify_transport_error(pending: &[PendingRequest], reply: &TransportReply) {
    for entry in pending {
        if let Some(handler) = &entry.options.transport_error {
            handler(&reply.body, reply);
        }
    }
}
